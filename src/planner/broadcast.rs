//! Broadcast planning.

use log::debug;

use crate::error::{Error, Result};
use crate::layout::{MemoryFormat, TensorLayout};
use crate::ops::broadcast::{normalize_input_dims, BroadcastAttrs, TARGET_SHAPE_ID};
use crate::ops::tensor::{Tensor, TensorDesc};

use super::{input_descs, ExecutionPlan, PlanBody, PlanContext, PlanValidity, WorkPartition};

#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastPlan {
    pub src: TensorDesc,
    pub dst: TensorDesc,
    /// Input dims aligned with the output rank
    pub in_dims: Vec<usize>,
    pub element_size: usize,
    /// Leading output dims iterated per work item
    pub outer_rank: usize,
    /// Elements copied as one block per work item
    pub inner_len: usize,
}

impl BroadcastPlan {
    pub fn out_dims(&self) -> &[usize] {
        &self.dst.dims
    }

    /// Layout addressing the source with output-rank coordinates.
    pub fn src_layout(&self) -> Result<TensorLayout> {
        if self.src.format == MemoryFormat::Ncsp || self.src.element_count() <= 1 {
            Ok(TensorLayout::contiguous_layout(&self.in_dims))
        } else {
            self.src.layout()
        }
    }
}

/// Output keeps the input format when it can hold the output rank.
pub fn output_format(input: MemoryFormat, rank: usize) -> MemoryFormat {
    if input.supports_rank(rank) {
        input
    } else {
        MemoryFormat::Ncsp
    }
}

fn resolve(attrs: &BroadcastAttrs, inputs: &[&Tensor]) -> Result<(BroadcastPlan, PlanValidity)> {
    let data = inputs
        .first()
        .ok_or_else(|| Error::InternalError("Broadcast plan without data input".to_string()))?;
    let src = data.desc().clone();

    let (target, validity) = match &attrs.target_shape {
        Some(t) => (t.clone(), PlanValidity::Static),
        None => {
            let shape = inputs.get(TARGET_SHAPE_ID).ok_or_else(|| {
                Error::ConfigurationError("Broadcast: target shape is neither an attribute nor an input".to_string())
            })?;
            let values = shape.to_i64_vec()?;
            let dims = values
                .iter()
                .map(|&v| {
                    usize::try_from(v).map_err(|_| {
                        Error::ConfigurationError(format!("Broadcast: negative target shape {:?}", values))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            (dims, PlanValidity::PerInvocation)
        }
    };

    let in_dims = normalize_input_dims(&src.dims, &target, attrs.axes.as_deref())?;
    if src.format != MemoryFormat::Ncsp && in_dims != src.dims && src.element_count() > 1 {
        return Err(Error::ConfigurationError(format!(
            "Broadcast: {} input {:?} must already have the output rank {}",
            src.format,
            src.dims,
            target.len()
        )));
    }

    let dst = TensorDesc::new(&target, src.data_type, output_format(src.format, target.len()));
    let rank = target.len();
    let outer_rank = (0..=rank)
        .find(|&k| in_dims[k..] == target[k..])
        .unwrap_or(rank);
    let inner_len = target[outer_rank..].iter().product();

    Ok((
        BroadcastPlan {
            element_size: src.data_type.size_in_bytes(),
            src,
            dst,
            in_dims,
            outer_rank,
            inner_len,
        },
        validity,
    ))
}

/// Plan for plain layouts: every work item copies one contiguous block of
/// the identical trailing dims.
pub fn plan_broadcast(attrs: &BroadcastAttrs, inputs: &[&Tensor], ctx: &PlanContext) -> Result<ExecutionPlan> {
    let (plan, validity) = resolve(attrs, inputs)?;
    if plan.src.format != MemoryFormat::Ncsp || plan.dst.format != MemoryFormat::Ncsp {
        return Err(Error::ConfigurationError(format!(
            "Broadcast block copy needs plain layouts, got {} -> {}",
            plan.src.format, plan.dst.format
        )));
    }
    let work_amount: usize = plan.out_dims()[..plan.outer_rank].iter().product();
    let partition = WorkPartition::new(work_amount, ctx.team_size());
    debug!(
        "Broadcast plan: {:?} (as {:?}) -> {:?}, {} blocks of {} elements",
        plan.src.dims,
        plan.in_dims,
        plan.out_dims(),
        work_amount,
        plan.inner_len
    );
    Ok(ExecutionPlan {
        inputs: input_descs(inputs),
        outputs: vec![plan.dst.clone()],
        validity,
        partition,
        body: PlanBody::Broadcast(plan),
    })
}

/// Plan for the per-element executor; any layout.
pub fn plan_broadcast_reference(
    attrs: &BroadcastAttrs,
    inputs: &[&Tensor],
    ctx: &PlanContext,
) -> Result<ExecutionPlan> {
    let (plan, validity) = resolve(attrs, inputs)?;
    let total = plan.dst.layout()?.physical_size();
    debug!(
        "Broadcast reference plan: {:?} -> {:?} ({})",
        plan.src.dims,
        plan.out_dims(),
        plan.dst.format
    );
    Ok(ExecutionPlan {
        inputs: input_descs(inputs),
        outputs: vec![plan.dst.clone()],
        validity,
        partition: WorkPartition::new(total, ctx.team_size()),
        body: PlanBody::Broadcast(plan),
    })
}
