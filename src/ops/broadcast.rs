//! # Broadcast
//!
//! Replicates the data tensor to a target shape. The target shape comes from
//! an attribute or from input 1; an optional axes mapping (attribute or
//! constant input 2) names the output axes along which the input is
//! replicated.

use crate::error::{Error, Result};
use crate::layout::MemoryFormat;
use crate::model::{Node, PortDesc};
use crate::planner::broadcast::output_format;
use crate::shape::{Dimension, PartialShape};

use super::registry::{check_input_count, check_rank, Operator};
use super::{OpAttributes, OpKind};

pub const DATA_ID: usize = 0;
pub const TARGET_SHAPE_ID: usize = 1;
pub const AXES_ID: usize = 2;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BroadcastAttrs {
    /// `None` when read from input 1 at execution time
    pub target_shape: Option<Vec<usize>>,
    /// Output axes along which the input is replicated
    pub axes: Option<Vec<usize>>,
}

impl BroadcastAttrs {
    pub fn to_shape(target_shape: Vec<usize>) -> Self {
        Self {
            target_shape: Some(target_shape),
            axes: None,
        }
    }

    pub fn with_axes(mut self, axes: Vec<usize>) -> Self {
        self.axes = Some(axes);
        self
    }

    pub fn is_data_dependent(&self) -> bool {
        self.target_shape.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct Broadcast {
    pub attrs: BroadcastAttrs,
}

impl Broadcast {
    pub fn new(attrs: BroadcastAttrs) -> Self {
        Self { attrs }
    }

    pub fn from_node(node: &Node) -> Result<Self> {
        let target_shape = match node.get_ints("target_shape")? {
            Some(v) => Some(to_dims(v, "target_shape")?),
            None => match node.constant_input(TARGET_SHAPE_ID) {
                Some(t) => Some(to_dims(&t.to_i64_vec()?, "target_shape")?),
                None => None,
            },
        };

        let axes = match node.get_ints("axes")? {
            Some(v) => Some(to_dims(v, "axes")?),
            None => match node.constant_input(AXES_ID) {
                Some(t) => Some(to_dims(&t.to_i64_vec()?, "axes")?),
                None if node.inputs.len() > AXES_ID => {
                    return Err(Error::ValidationError(format!(
                        "Broadcast '{}': axes mapping must be constant",
                        node.name
                    )))
                }
                None => None,
            },
        };

        Ok(Self::new(BroadcastAttrs { target_shape, axes }))
    }
}

fn to_dims(values: &[i64], what: &str) -> Result<Vec<usize>> {
    values
        .iter()
        .map(|&v| {
            usize::try_from(v).map_err(|_| {
                Error::ValidationError(format!("Broadcast {} must be non-negative: {:?}", what, values))
            })
        })
        .collect()
}

/// Align the input dims with the output rank and check that every output
/// axis can be produced by replicating the input.
///
/// - equal rank: dims are used as is
/// - `rank + |axes| == out_rank`: size-1 dims are inserted at `axes`
/// - lower rank without axes: leading size-1 dims are prepended
/// - single-element input: all dims become 1
///
/// Axes in the broadcast set need input size 1, all others need
/// `out % in == 0`.
pub fn normalize_input_dims(in_dims: &[usize], out_dims: &[usize], axes: Option<&[usize]>) -> Result<Vec<usize>> {
    let axes = axes.unwrap_or(&[]);
    let out_rank = out_dims.len();
    if let Some(&bad) = axes.iter().find(|&&a| a >= out_rank) {
        return Err(Error::ConfigurationError(format!(
            "Broadcast axis {} is out of range for output shape {:?}",
            bad, out_dims
        )));
    }

    let normalized = if in_dims.len() == out_rank {
        in_dims.to_vec()
    } else if !axes.is_empty() && in_dims.len() + axes.len() == out_rank {
        let mut src = in_dims.iter();
        (0..out_rank)
            .map(|i| if axes.contains(&i) { 1 } else { src.next().copied().unwrap_or(1) })
            .collect()
    } else if axes.is_empty() && in_dims.len() < out_rank {
        let mut dims = vec![1; out_rank - in_dims.len()];
        dims.extend_from_slice(in_dims);
        dims
    } else if in_dims.iter().product::<usize>() == 1 {
        vec![1; out_rank]
    } else {
        return Err(Error::ConfigurationError(format!(
            "Cannot align input shape {:?} with output shape {:?} (axes {:?})",
            in_dims, out_dims, axes
        )));
    };

    for (i, (&inp, &out)) in normalized.iter().zip(out_dims).enumerate() {
        if axes.contains(&i) {
            if inp != 1 {
                return Err(Error::ConfigurationError(format!(
                    "Input size along broadcast axis {} must be 1, got {} (input {:?})",
                    i, inp, in_dims
                )));
            }
        } else if inp == 0 {
            if out != 0 {
                return Err(Error::ConfigurationError(format!(
                    "Cannot broadcast empty axis {} of {:?} to {}",
                    i, in_dims, out
                )));
            }
        } else if out % inp != 0 {
            return Err(Error::ConfigurationError(format!(
                "Output size {} is not dividable by input size {} along axis {}",
                out, inp, i
            )));
        }
    }
    Ok(normalized)
}

impl Operator for Broadcast {
    fn op_kind(&self) -> OpKind {
        OpKind::Broadcast
    }

    fn attributes(&self) -> OpAttributes {
        OpAttributes::Broadcast(self.attrs.clone())
    }

    fn output_shapes(&self, input_shapes: &[PartialShape]) -> Result<Vec<PartialShape>> {
        shape_infer(&self.attrs, input_shapes)
    }

    fn output_ports(&self, inputs: &[PortDesc]) -> Result<Vec<PortDesc>> {
        let shapes: Vec<PartialShape> = inputs.iter().map(|p| p.shape.clone()).collect();
        let out_shapes = self.output_shapes(&shapes)?;
        let data = &inputs[DATA_ID];
        Ok(out_shapes
            .into_iter()
            .map(|shape| {
                let format = match shape.rank() {
                    Some(rank) => output_format(data.format, rank),
                    None => MemoryFormat::Ncsp,
                };
                PortDesc::new(shape, data.data_type).with_format(format)
            })
            .collect())
    }
}

pub fn shape_infer(attrs: &BroadcastAttrs, input_shapes: &[PartialShape]) -> Result<Vec<PartialShape>> {
    let kind = OpKind::Broadcast;
    let min_inputs = if attrs.target_shape.is_some() { 1 } else { 2 };
    check_input_count(kind, input_shapes.len(), min_inputs, 3)?;
    if let Some(target) = input_shapes.get(TARGET_SHAPE_ID) {
        check_rank(kind, "target_shape", target, 1)?;
    }

    let data = &input_shapes[DATA_ID];
    match &attrs.target_shape {
        Some(target) => {
            if let Some(in_dims) = data.to_shape() {
                normalize_input_dims(&in_dims, target, attrs.axes.as_deref())?;
            }
            Ok(vec![PartialShape::from_static(target)])
        }
        None => {
            let out = match input_shapes.get(TARGET_SHAPE_ID).and_then(|s| s.dim(0)) {
                Some(Dimension::Static(rank)) => PartialShape::dynamic_of_rank(rank),
                _ => PartialShape::dynamic(),
            };
            Ok(vec![out])
        }
    }
}
