//! # Reorder
//!
//! Converts a tensor between memory formats and precisions in one pass,
//! optionally applying a per-channel mean operation on the way.

use std::str::FromStr;

use strum_macros::{Display, EnumIter, EnumString};

use crate::error::{Error, Result};
use crate::layout::MemoryFormat;
use crate::model::{Node, PortDesc};
use crate::shape::PartialShape;

use super::registry::{check_input_count, Operator};
use super::tensor::DataType;
use super::{OpAttributes, OpKind};

pub const DATA_ID: usize = 0;
pub const MEAN_ID: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum MeanMode {
    None,
    Subtract,
    Mul,
    Div,
}

impl MeanMode {
    pub fn apply(&self, value: f64, mean: f64) -> f64 {
        match self {
            MeanMode::None => value,
            MeanMode::Subtract => value - mean,
            MeanMode::Mul => value * mean,
            MeanMode::Div => value / mean,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReorderAttrs {
    pub output_type: DataType,
    pub output_format: MemoryFormat,
    pub mean_mode: MeanMode,
    /// Per-channel constant values; empty when the mean comes from input 1
    pub mean_values: Vec<f32>,
    /// Truncate instead of rounding when narrowing to integers
    pub truncate: bool,
}

impl ReorderAttrs {
    pub fn new(output_type: DataType, output_format: MemoryFormat) -> Self {
        Self {
            output_type,
            output_format,
            mean_mode: MeanMode::None,
            mean_values: Vec::new(),
            truncate: false,
        }
    }

    pub fn with_mean(mut self, mode: MeanMode, values: Vec<f32>) -> Self {
        self.mean_mode = mode;
        self.mean_values = values;
        self
    }

    pub fn with_truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Reorder {
    pub attrs: ReorderAttrs,
}

impl Reorder {
    pub fn new(attrs: ReorderAttrs) -> Self {
        Self { attrs }
    }

    pub fn from_node(node: &Node) -> Result<Self> {
        check_input_count(OpKind::Reorder, node.inputs.len(), 1, 2)?;
        let data = &node.inputs[DATA_ID];

        let output_type = match node.get_string("output_type")? {
            Some(s) => DataType::from_str(&s.to_lowercase())
                .map_err(|_| Error::ValidationError(format!("Unknown output_type: {}", s)))?,
            None => data.data_type,
        };
        let output_format = match node.get_string("output_format")? {
            Some(s) => MemoryFormat::from_str(&s.to_lowercase())
                .map_err(|_| Error::ValidationError(format!("Unknown output_format: {}", s)))?,
            None => data.format,
        };
        let mean_mode = match node.get_string("mean_mode")? {
            Some(s) => MeanMode::from_str(&s.to_lowercase())
                .map_err(|_| Error::ValidationError(format!("Unknown mean_mode: {}", s)))?,
            None => MeanMode::None,
        };
        let mean_values = node.get_floats("mean_values")?.map(|v| v.to_vec()).unwrap_or_default();

        if mean_mode != MeanMode::None && mean_values.is_empty() && node.inputs.len() <= MEAN_ID {
            return Err(Error::ValidationError(format!(
                "Reorder '{}': mean mode {} needs mean_values or a mean input",
                node.name, mean_mode
            )));
        }

        Ok(Self::new(ReorderAttrs {
            output_type,
            output_format,
            mean_mode,
            mean_values,
            truncate: node.get_bool("truncate")?.unwrap_or(false),
        }))
    }
}

impl Operator for Reorder {
    fn op_kind(&self) -> OpKind {
        OpKind::Reorder
    }

    fn attributes(&self) -> OpAttributes {
        OpAttributes::Reorder(self.attrs.clone())
    }

    fn output_shapes(&self, input_shapes: &[PartialShape]) -> Result<Vec<PartialShape>> {
        shape_infer(&self.attrs, input_shapes)
    }

    fn output_ports(&self, inputs: &[PortDesc]) -> Result<Vec<PortDesc>> {
        let shapes: Vec<PartialShape> = inputs.iter().map(|p| p.shape.clone()).collect();
        Ok(self
            .output_shapes(&shapes)?
            .into_iter()
            .map(|s| PortDesc::new(s, self.attrs.output_type).with_format(self.attrs.output_format))
            .collect())
    }
}

/// Number of mean values accepted for data dims `[N, C, spatial...]`:
/// one per channel, or one per channel and spatial position.
pub fn accepted_mean_sizes(dims: &[usize]) -> Option<(usize, usize)> {
    if dims.len() < 2 {
        return None;
    }
    let channels = dims[1];
    let spatial: usize = dims[2..].iter().product();
    Some((channels, channels * spatial))
}

pub fn shape_infer(attrs: &ReorderAttrs, input_shapes: &[PartialShape]) -> Result<Vec<PartialShape>> {
    check_input_count(OpKind::Reorder, input_shapes.len(), 1, 2)?;
    let data = &input_shapes[DATA_ID];

    if let Some(rank) = data.rank() {
        if !attrs.output_format.supports_rank(rank) {
            return Err(Error::ValidationError(format!(
                "Reorder: format {} cannot hold shape {}",
                attrs.output_format, data
            )));
        }
    }

    let mean_count = if attrs.mean_mode == MeanMode::None {
        None
    } else if let Some(mean) = input_shapes.get(MEAN_ID) {
        mean.element_count()
    } else {
        Some(attrs.mean_values.len())
    };

    if let (Some(count), Some(dims)) = (mean_count, data.to_shape()) {
        match accepted_mean_sizes(&dims) {
            Some((per_channel, per_element)) if count == per_channel || count == per_element => {}
            _ => {
                return Err(Error::ValidationError(format!(
                    "Reorder: {} mean values do not match data shape {}",
                    count, data
                )))
            }
        }
    }

    Ok(vec![data.clone()])
}
