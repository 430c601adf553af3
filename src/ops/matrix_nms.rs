//! # Matrix NMS
//!
//! Matrix non-maximum suppression: instead of discarding overlapping boxes,
//! every candidate's score is decayed by its overlap with higher-scoring
//! candidates of the same class.
//!
//! Inputs: `boxes [B, N, 4]` and `scores [B, C, N]`, both f32.
//! Outputs:
//! - `selected_outputs [R, 6]`: class, score, x1, y1, x2, y2
//! - `selected_indices [R, 1]`: `batch * N + box`
//! - `valid_outputs [B]`: number of kept boxes per batch

use std::str::FromStr;

use strum_macros::{Display, EnumIter, EnumString};

use crate::error::{Error, Result};
use crate::model::{Node, PortDesc};
use crate::shape::{Dimension, PartialShape};

use super::registry::{check_input_count, check_rank, merge_or_fail, Operator};
use super::tensor::DataType;
use super::{OpAttributes, OpKind};

pub const BOXES_ID: usize = 0;
pub const SCORES_ID: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum SortResultType {
    ClassId,
    Score,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum DecayFunction {
    Gaussian,
    Linear,
}

impl DecayFunction {
    pub fn decay(&self, iou: f32, max_iou: f32, sigma: f32) -> f32 {
        match self {
            DecayFunction::Linear => (1.0 - iou) / (1.0 - max_iou + 1e-10),
            DecayFunction::Gaussian => ((max_iou * max_iou - iou * iou) * sigma).exp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatrixNmsAttrs {
    pub sort_result_type: SortResultType,
    pub sort_result_across_batch: bool,
    /// Precision of `selected_indices` and `valid_outputs`
    pub output_type: DataType,
    pub score_threshold: f32,
    /// Candidates kept per class before decay, -1 for all
    pub nms_top_k: i64,
    /// Boxes kept per batch after decay, -1 for all
    pub keep_top_k: i64,
    /// Class skipped entirely, -1 for none
    pub background_class: i64,
    pub decay_function: DecayFunction,
    pub gaussian_sigma: f32,
    pub post_threshold: f32,
    /// Box coordinates are normalized; otherwise areas use `+1` pixel sizes
    pub normalized: bool,
    /// Trim outputs to the selected boxes instead of padding with -1
    pub dynamic_output: bool,
}

impl Default for MatrixNmsAttrs {
    fn default() -> Self {
        Self {
            sort_result_type: SortResultType::None,
            sort_result_across_batch: false,
            output_type: DataType::I64,
            score_threshold: 0.0,
            nms_top_k: -1,
            keep_top_k: -1,
            background_class: -1,
            decay_function: DecayFunction::Linear,
            gaussian_sigma: 2.0,
            post_threshold: 0.0,
            normalized: true,
            dynamic_output: false,
        }
    }
}

impl MatrixNmsAttrs {
    /// Classes that take part in suppression.
    pub fn real_num_classes(&self, num_classes: usize) -> usize {
        match usize::try_from(self.background_class) {
            Ok(bg) if bg < num_classes => num_classes - 1,
            _ => num_classes,
        }
    }

    /// Upper bound of candidates kept per class.
    pub fn max_boxes_per_class(&self, num_boxes: usize) -> usize {
        match usize::try_from(self.nms_top_k) {
            Ok(k) => num_boxes.min(k),
            Err(_) => num_boxes,
        }
    }

    /// Output rows reserved per batch in static output mode.
    pub fn max_boxes_per_batch(&self, num_boxes: usize, num_classes: usize) -> usize {
        let per_batch = self.max_boxes_per_class(num_boxes) * self.real_num_classes(num_classes);
        match usize::try_from(self.keep_top_k) {
            Ok(k) => per_batch.min(k),
            Err(_) => per_batch,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatrixNms {
    pub attrs: MatrixNmsAttrs,
}

impl MatrixNms {
    pub fn new(attrs: MatrixNmsAttrs) -> Result<Self> {
        if !matches!(attrs.output_type, DataType::I32 | DataType::I64) {
            return Err(Error::ValidationError(format!(
                "MatrixNms output_type must be i32 or i64, got {}",
                attrs.output_type
            )));
        }
        Ok(Self { attrs })
    }

    pub fn from_node(node: &Node) -> Result<Self> {
        let defaults = MatrixNmsAttrs::default();
        let parse_err = |what: &str, v: &str| Error::ValidationError(format!("Unknown {}: {}", what, v));

        let sort_result_type = match node.get_string("sort_result_type")? {
            Some(s) => SortResultType::from_str(&s.to_lowercase()).map_err(|_| parse_err("sort_result_type", s))?,
            None => defaults.sort_result_type,
        };
        let decay_function = match node.get_string("decay_function")? {
            Some(s) => DecayFunction::from_str(&s.to_lowercase()).map_err(|_| parse_err("decay_function", s))?,
            None => defaults.decay_function,
        };
        let output_type = match node.get_string("output_type")? {
            Some(s) => DataType::from_str(&s.to_lowercase()).map_err(|_| parse_err("output_type", s))?,
            None => defaults.output_type,
        };

        Self::new(MatrixNmsAttrs {
            sort_result_type,
            sort_result_across_batch: node
                .get_bool("sort_result_across_batch")?
                .unwrap_or(defaults.sort_result_across_batch),
            output_type,
            score_threshold: node.get_float("score_threshold")?.unwrap_or(defaults.score_threshold),
            nms_top_k: node.get_int("nms_top_k")?.unwrap_or(defaults.nms_top_k),
            keep_top_k: node.get_int("keep_top_k")?.unwrap_or(defaults.keep_top_k),
            background_class: node.get_int("background_class")?.unwrap_or(defaults.background_class),
            decay_function,
            gaussian_sigma: node.get_float("gaussian_sigma")?.unwrap_or(defaults.gaussian_sigma),
            post_threshold: node.get_float("post_threshold")?.unwrap_or(defaults.post_threshold),
            normalized: node.get_bool("normalized")?.unwrap_or(defaults.normalized),
            dynamic_output: node.get_bool("dynamic_output")?.unwrap_or(defaults.dynamic_output),
        })
    }
}

impl Operator for MatrixNms {
    fn op_kind(&self) -> OpKind {
        OpKind::MatrixNms
    }

    fn attributes(&self) -> OpAttributes {
        OpAttributes::MatrixNms(self.attrs.clone())
    }

    fn output_shapes(&self, input_shapes: &[PartialShape]) -> Result<Vec<PartialShape>> {
        shape_infer(&self.attrs, input_shapes)
    }

    fn output_ports(&self, inputs: &[PortDesc]) -> Result<Vec<PortDesc>> {
        let shapes: Vec<PartialShape> = inputs.iter().map(|p| p.shape.clone()).collect();
        let out = self.output_shapes(&shapes)?;
        let types = [DataType::F32, self.attrs.output_type, self.attrs.output_type];
        Ok(out
            .into_iter()
            .zip(types)
            .map(|(shape, dt)| PortDesc::new(shape, dt))
            .collect())
    }
}

pub fn shape_infer(attrs: &MatrixNmsAttrs, input_shapes: &[PartialShape]) -> Result<Vec<PartialShape>> {
    let kind = OpKind::MatrixNms;
    check_input_count(kind, input_shapes.len(), 2, 2)?;
    let boxes = &input_shapes[BOXES_ID];
    let scores = &input_shapes[SCORES_ID];
    check_rank(kind, "boxes", boxes, 3)?;
    check_rank(kind, "scores", scores, 3)?;

    let mut batch = PartialShape::new(vec![boxes.dim(0).unwrap_or(Dimension::Dynamic)]);
    let mut num_boxes = PartialShape::new(vec![boxes.dim(1).unwrap_or(Dimension::Dynamic)]);
    merge_or_fail(
        kind,
        "batch dimensions of boxes and scores",
        &mut batch,
        &PartialShape::new(vec![scores.dim(0).unwrap_or(Dimension::Dynamic)]),
    )?;
    merge_or_fail(
        kind,
        "box counts of boxes and scores",
        &mut num_boxes,
        &PartialShape::new(vec![scores.dim(2).unwrap_or(Dimension::Dynamic)]),
    )?;
    if let Some(Dimension::Static(d)) = boxes.dim(2) {
        if d != 4 {
            return Err(Error::ValidationError(format!(
                "MatrixNms: last dimension of boxes must be 4, got {}",
                boxes
            )));
        }
    }

    let b = batch.dim(0).unwrap_or(Dimension::Dynamic);
    let rows = match (b, num_boxes.dim(0), scores.dim(1)) {
        (Dimension::Static(b), Some(Dimension::Static(n)), Some(Dimension::Static(c))) if !attrs.dynamic_output => {
            Dimension::Static(b * attrs.max_boxes_per_batch(n, c))
        }
        _ => Dimension::Dynamic,
    };

    Ok(vec![
        PartialShape::new(vec![rows, 6.into()]),
        PartialShape::new(vec![rows, 1.into()]),
        PartialShape::new(vec![b]),
    ])
}
