//! GatherTree: rebuilds full beams from per-step ids and parent pointers.
//!
//! Inputs: `step_ids [T, B, W]`, `parent_ids [T, B, W]`,
//! `max_seq_len [B]` and a scalar `end_token`.

use crate::error::Result;
use crate::model::Node;
use crate::shape::{Dimension, PartialShape};

use super::registry::{check_input_count, check_rank, merge_or_fail, Operator};
use super::{OpAttributes, OpKind};

#[derive(Debug, Clone, Default)]
pub struct GatherTree;

impl GatherTree {
    pub fn from_node(_node: &Node) -> Result<Self> {
        Ok(Self)
    }
}

impl Operator for GatherTree {
    fn op_kind(&self) -> OpKind {
        OpKind::GatherTree
    }

    fn attributes(&self) -> OpAttributes {
        OpAttributes::GatherTree
    }

    fn output_shapes(&self, input_shapes: &[PartialShape]) -> Result<Vec<PartialShape>> {
        shape_infer(input_shapes)
    }
}

pub fn shape_infer(input_shapes: &[PartialShape]) -> Result<Vec<PartialShape>> {
    let kind = OpKind::GatherTree;
    check_input_count(kind, input_shapes.len(), 4, 4)?;

    let step_ids = &input_shapes[0];
    let parent_ids = &input_shapes[1];
    let max_seq_len = &input_shapes[2];
    let end_token = &input_shapes[3];

    let mut result = step_ids.clone();
    merge_or_fail(kind, "step_ids and parent_ids shapes", &mut result, parent_ids)?;
    check_rank(kind, "step_ids and parent_ids", &result, 3)?;
    check_rank(kind, "max_seq_len", max_seq_len, 1)?;

    if result.is_rank_static() && max_seq_len.is_rank_static() {
        let mut batch = PartialShape::new(vec![result.dim(1).unwrap_or(Dimension::Dynamic)]);
        merge_or_fail(kind, "batch dimension of step_ids and max_seq_len", &mut batch, max_seq_len)?;
        if let Some(dim) = batch.dim(0) {
            result.set_dim(1, dim);
        }
    }

    check_rank(kind, "end_token", end_token, 0)?;
    Ok(vec![result])
}
