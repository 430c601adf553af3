//! GatherTree planning.

use log::debug;

use crate::error::{Error, Result};
use crate::layout::MemoryFormat;
use crate::ops::tensor::{DataType, Tensor, TensorDesc};

use super::{input_descs, ExecutionPlan, PlanBody, PlanContext, PlanValidity, WorkPartition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherTreePlan {
    pub max_time: usize,
    pub batch_size: usize,
    pub beam_width: usize,
    pub data_type: DataType,
}

impl Default for GatherTreePlan {
    fn default() -> Self {
        Self {
            max_time: 0,
            batch_size: 0,
            beam_width: 0,
            data_type: DataType::I32,
        }
    }
}

impl GatherTreePlan {
    /// Flat index of `[t, b, w]`.
    pub fn index(&self, t: usize, b: usize, w: usize) -> usize {
        (t * self.batch_size + b) * self.beam_width + w
    }
}

/// One work item per `(batch, beam)` pair.
pub fn plan_gather_tree(inputs: &[&Tensor], ctx: &PlanContext) -> Result<ExecutionPlan> {
    if inputs.len() != 4 {
        return Err(Error::InternalError(format!(
            "GatherTree plan needs 4 inputs, got {}",
            inputs.len()
        )));
    }
    if let Some(t) = inputs.iter().find(|t| t.format() != MemoryFormat::Ncsp) {
        return Err(Error::ConfigurationError(format!(
            "GatherTree: inputs must be plain, got {}",
            t.format()
        )));
    }
    let (step_ids, parent_ids, max_seq_len, end_token) = (inputs[0], inputs[1], inputs[2], inputs[3]);
    let dims = step_ids.dims();
    if dims.len() != 3
        || parent_ids.dims() != dims
        || max_seq_len.dims() != [dims[1]]
        || end_token.element_count() != 1
    {
        return Err(Error::ConfigurationError(format!(
            "GatherTree: inconsistent inputs step_ids {:?}, parent_ids {:?}, max_seq_len {:?}, end_token {:?}",
            dims,
            parent_ids.dims(),
            max_seq_len.dims(),
            end_token.dims()
        )));
    }

    let plan = GatherTreePlan {
        max_time: dims[0],
        batch_size: dims[1],
        beam_width: dims[2],
        data_type: step_ids.data_type(),
    };
    debug!(
        "GatherTree plan: T={} B={} W={} ({})",
        plan.max_time, plan.batch_size, plan.beam_width, plan.data_type
    );
    Ok(ExecutionPlan {
        inputs: input_descs(inputs),
        outputs: vec![TensorDesc::plain(dims, plan.data_type)],
        validity: PlanValidity::Static,
        partition: WorkPartition::new(plan.batch_size * plan.beam_width, ctx.team_size()),
        body: PlanBody::GatherTree(plan),
    })
}
