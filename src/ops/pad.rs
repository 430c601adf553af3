//! # Pad
//!
//! Extends every axis of the data tensor by `pads_begin[i]` elements in
//! front and `pads_end[i]` elements behind. The fill content depends on the
//! mode:
//! - `constant`: a single pad value
//! - `edge`: replicate the border element
//! - `reflect`: mirror without repeating the border element
//! - `symmetric`: mirror including the border element
//!
//! Pad amounts and the pad value are either attributes, constant inputs, or
//! runtime inputs. Runtime pad amounts make the output shape data dependent.

use std::str::FromStr;

use strum_macros::{Display, EnumIter, EnumString};

use crate::error::{Error, Result};
use crate::model::Node;
use crate::shape::{Dimension, PartialShape};

use super::registry::{check_input_count, check_rank, Operator};
use super::{OpAttributes, OpKind};

pub const DATA_ID: usize = 0;
pub const PADS_BEGIN_ID: usize = 1;
pub const PADS_END_ID: usize = 2;
pub const PAD_VALUE_ID: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum PadMode {
    Constant,
    Edge,
    Reflect,
    Symmetric,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PadAttrs {
    pub mode: PadMode,
    /// `None` when read from input 1 at execution time
    pub pads_begin: Option<Vec<i64>>,
    /// `None` when read from input 2 at execution time
    pub pads_end: Option<Vec<i64>>,
    /// `None` when read from input 3 at execution time
    pub pad_value: Option<f64>,
}

impl Default for PadAttrs {
    fn default() -> Self {
        Self {
            mode: PadMode::Constant,
            pads_begin: None,
            pads_end: None,
            pad_value: Some(0.0),
        }
    }
}

impl PadAttrs {
    pub fn new(mode: PadMode, pads_begin: Vec<i64>, pads_end: Vec<i64>) -> Self {
        Self {
            mode,
            pads_begin: Some(pads_begin),
            pads_end: Some(pads_end),
            pad_value: Some(0.0),
        }
    }

    pub fn with_pad_value(mut self, value: f64) -> Self {
        self.pad_value = Some(value);
        self
    }

    /// Whether planning needs the content of input tensors.
    pub fn is_data_dependent(&self) -> bool {
        self.pads_begin.is_none() || self.pads_end.is_none() || self.pad_value.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct Pad {
    pub attrs: PadAttrs,
}

impl Pad {
    pub fn new(attrs: PadAttrs) -> Self {
        Self { attrs }
    }

    pub fn from_node(node: &Node) -> Result<Self> {
        let mode = match node.get_string("mode")? {
            Some(m) => PadMode::from_str(&m.to_lowercase())
                .map_err(|_| Error::ValidationError(format!("Unknown pad mode: {}", m)))?,
            None => PadMode::Constant,
        };

        let pads_begin = pads_from_node(node, "pads_begin", PADS_BEGIN_ID)?;
        let pads_end = pads_from_node(node, "pads_end", PADS_END_ID)?;

        let pad_value = if let Some(v) = node.get_float("pad_value")? {
            Some(v as f64)
        } else if node.inputs.len() > PAD_VALUE_ID {
            match node.constant_input(PAD_VALUE_ID) {
                Some(t) => Some(scalar_pad_value(&t.to_f64_vec())?),
                None => None,
            }
        } else {
            Some(0.0)
        };

        Ok(Self::new(PadAttrs {
            mode,
            pads_begin,
            pads_end,
            pad_value,
        }))
    }
}

fn pads_from_node(node: &Node, name: &str, port: usize) -> Result<Option<Vec<i64>>> {
    if let Some(pads) = node.get_ints(name)? {
        return Ok(Some(pads.to_vec()));
    }
    match node.constant_input(port) {
        Some(t) => Ok(Some(t.to_i64_vec()?)),
        None => Ok(None),
    }
}

/// The pad value must be given as a single element.
pub(crate) fn scalar_pad_value(values: &[f64]) -> Result<f64> {
    match values {
        [v] => Ok(*v),
        _ => Err(Error::ConfigurationError(format!(
            "Pad value must be a scalar, got {} elements",
            values.len()
        ))),
    }
}

impl Operator for Pad {
    fn op_kind(&self) -> OpKind {
        OpKind::Pad
    }

    fn attributes(&self) -> OpAttributes {
        OpAttributes::Pad(self.attrs.clone())
    }

    fn output_shapes(&self, input_shapes: &[PartialShape]) -> Result<Vec<PartialShape>> {
        shape_infer(&self.attrs, input_shapes)
    }
}

pub fn shape_infer(attrs: &PadAttrs, input_shapes: &[PartialShape]) -> Result<Vec<PartialShape>> {
    let kind = OpKind::Pad;
    let has_pad_inputs = attrs.pads_begin.is_none() || attrs.pads_end.is_none();
    let min_inputs = if has_pad_inputs { 3 } else { 1 };
    check_input_count(kind, input_shapes.len(), min_inputs, 4)?;

    let data = &input_shapes[DATA_ID];
    for (port, what) in [(PADS_BEGIN_ID, "pads_begin"), (PADS_END_ID, "pads_end")] {
        if let Some(shape) = input_shapes.get(port) {
            check_rank(kind, what, shape, 1)?;
            if let (Some(rank), Some(Dimension::Static(len))) = (data.rank(), shape.dim(0)) {
                if rank != len {
                    return Err(Error::ValidationError(format!(
                        "Pad: {} length {} does not match data shape {}",
                        what, len, data
                    )));
                }
            }
        }
    }
    if let Some(value_shape) = input_shapes.get(PAD_VALUE_ID) {
        check_rank(kind, "pad_value", value_shape, 0)?;
    }

    let (begin, end) = match (&attrs.pads_begin, &attrs.pads_end) {
        (Some(b), Some(e)) => (b, e),
        _ => {
            // pad amounts are runtime data: only the rank survives
            let rank = data.rank().or_else(|| {
                input_shapes
                    .get(PADS_BEGIN_ID)
                    .and_then(|s| s.dim(0))
                    .and_then(|d| d.get_length())
            });
            return Ok(vec![match rank {
                Some(r) => PartialShape::dynamic_of_rank(r),
                None => PartialShape::dynamic(),
            }]);
        }
    };

    if begin.len() != end.len() {
        return Err(Error::ValidationError(format!(
            "Pad: pads_begin {:?} and pads_end {:?} differ in length",
            begin, end
        )));
    }

    let mut data = data.clone();
    if !data.merge_rank(begin.len()) {
        return Err(Error::ValidationError(format!(
            "Pad: {} pad entries for data shape {}",
            begin.len(),
            data
        )));
    }

    let dims = data.dims().unwrap_or(&[]);
    let mut out = Vec::with_capacity(dims.len());
    for (i, dim) in dims.iter().enumerate() {
        out.push(match dim {
            Dimension::Static(d) => {
                let padded = *d as i64 + begin[i] + end[i];
                if padded < 0 {
                    return Err(Error::ValidationError(format!(
                        "Pad: axis {} of {} becomes negative with pads {} / {}",
                        i, data, begin[i], end[i]
                    )));
                }
                Dimension::Static(padded as usize)
            }
            Dimension::Dynamic => Dimension::Dynamic,
        });
    }
    Ok(vec![PartialShape::new(out)])
}
