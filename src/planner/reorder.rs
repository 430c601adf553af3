//! Reorder planning.

use log::debug;

use crate::error::{Error, Result};
use crate::layout::MemoryFormat;
use crate::ops::reorder::{accepted_mean_sizes, MeanMode, ReorderAttrs, MEAN_ID};
use crate::ops::tensor::{RoundingStrategy, Tensor, TensorDesc};

use super::{input_descs, ExecutionPlan, PlanBody, PlanContext, PlanValidity, WorkPartition};

#[derive(Debug, Clone, PartialEq)]
pub struct ReorderPlan {
    pub src: TensorDesc,
    pub dst: TensorDesc,
    pub mean_mode: MeanMode,
    pub mean: Vec<f64>,
    /// One mean value per channel and spatial position instead of per channel
    pub mean_per_element: bool,
    pub rounding: RoundingStrategy,
    /// Same precision, same layout and no mean: plain byte copy
    pub byte_copy: bool,
}

impl ReorderPlan {
    /// Mean value for a logical coordinate `[N, C, spatial...]`.
    pub fn mean_for(&self, coords: &[usize]) -> f64 {
        let channel = coords[1];
        if !self.mean_per_element {
            return self.mean[channel];
        }
        let spatial_dims = &self.src.dims[2..];
        let spatial = coords[2..]
            .iter()
            .zip(spatial_dims)
            .fold(0, |acc, (&c, &d)| acc * d + c);
        let spatial_size: usize = spatial_dims.iter().product();
        self.mean[channel * spatial_size + spatial]
    }

    pub fn has_mean(&self) -> bool {
        self.mean_mode != MeanMode::None
    }
}

fn resolve(attrs: &ReorderAttrs, inputs: &[&Tensor]) -> Result<(ReorderPlan, PlanValidity)> {
    let data = inputs
        .first()
        .ok_or_else(|| Error::InternalError("Reorder plan without data input".to_string()))?;
    let src = data.desc().clone();
    let dst = TensorDesc::new(&src.dims, attrs.output_type, attrs.output_format);
    if !attrs.output_format.supports_rank(src.rank()) {
        return Err(Error::ConfigurationError(format!(
            "Reorder: {} cannot hold dims {:?}",
            attrs.output_format, src.dims
        )));
    }

    let (mean, validity) = if attrs.mean_mode == MeanMode::None {
        (Vec::new(), PlanValidity::Static)
    } else if let Some(tensor) = inputs.get(MEAN_ID) {
        if tensor.format() != MemoryFormat::Ncsp {
            return Err(Error::ConfigurationError(format!(
                "Reorder: mean tensor must be plain, got {}",
                tensor.format()
            )));
        }
        (tensor.to_f64_vec(), PlanValidity::PerInvocation)
    } else {
        (
            attrs.mean_values.iter().map(|&v| f64::from(v)).collect(),
            PlanValidity::Static,
        )
    };

    let mean_per_element = if attrs.mean_mode == MeanMode::None {
        false
    } else {
        match accepted_mean_sizes(&src.dims) {
            Some((per_channel, _)) if mean.len() == per_channel => false,
            Some((_, per_element)) if mean.len() == per_element => true,
            _ => {
                return Err(Error::ConfigurationError(format!(
                    "Reorder: {} mean values do not fit dims {:?}",
                    mean.len(),
                    src.dims
                )))
            }
        }
    };

    let rounding = if attrs.truncate {
        RoundingStrategy::Truncate
    } else {
        RoundingStrategy::RoundHalfEven
    };
    let byte_copy =
        attrs.mean_mode == MeanMode::None && src.data_type == dst.data_type && src.format == dst.format;

    Ok((
        ReorderPlan {
            src,
            dst,
            mean_mode: attrs.mean_mode,
            mean,
            mean_per_element,
            rounding,
            byte_copy,
        },
        validity,
    ))
}

/// Plan for the optimized executor: destination physical elements split
/// into contiguous ranges.
pub fn plan_reorder(attrs: &ReorderAttrs, inputs: &[&Tensor], ctx: &PlanContext) -> Result<ExecutionPlan> {
    let (plan, validity) = resolve(attrs, inputs)?;
    let total = plan.dst.layout()?.physical_size();
    let partition = WorkPartition::new(total, ctx.team_size());
    debug!(
        "Reorder plan: {:?} {}/{} -> {}/{}{}, {} ranges",
        plan.src.dims,
        plan.src.data_type,
        plan.src.format,
        plan.dst.data_type,
        plan.dst.format,
        if plan.byte_copy { " (byte copy)" } else { "" },
        partition.len()
    );
    Ok(ExecutionPlan {
        inputs: input_descs(inputs),
        outputs: vec![plan.dst.clone()],
        validity,
        partition,
        body: PlanBody::Reorder(plan),
    })
}

/// Plan for the reference executor: one pass over source logical
/// coordinates.
pub fn plan_reorder_reference(attrs: &ReorderAttrs, inputs: &[&Tensor], _ctx: &PlanContext) -> Result<ExecutionPlan> {
    let (plan, validity) = resolve(attrs, inputs)?;
    debug!(
        "Reorder reference plan: {:?} {}/{} -> {}/{}",
        plan.src.dims, plan.src.data_type, plan.src.format, plan.dst.data_type, plan.dst.format
    );
    Ok(ExecutionPlan {
        inputs: input_descs(inputs),
        outputs: vec![plan.dst.clone()],
        validity,
        partition: WorkPartition::single(plan.src.element_count()),
        body: PlanBody::Reorder(plan),
    })
}
