//! Block-copy broadcast executor for plain layouts.

use crate::error::{Error, Result};
use crate::layout::TensorLayout;
use crate::ops::tensor::Tensor;
use crate::planner::{ExecutionPlan, PlanBody};

use super::context::ExecutionContext;
use super::{check_io, for_each_range, unravel};

pub fn execute(
    plan: &ExecutionPlan,
    inputs: &[&Tensor],
    outputs: &mut [Tensor],
    ctx: &ExecutionContext,
) -> Result<()> {
    check_io(plan, inputs, outputs)?;
    let body = match &plan.body {
        PlanBody::Broadcast(b) => b,
        _ => return Err(Error::InternalError("Broadcast executor needs a broadcast plan".to_string())),
    };
    let block = body.inner_len * body.element_size;
    if block == 0 {
        return Ok(());
    }

    let src = inputs[0].data();
    let src_strides = TensorLayout::compute_contiguous_strides(&body.in_dims);
    let outer_dims = &body.out_dims()[..body.outer_rank];
    for_each_range(ctx, &plan.partition, block, outputs[0].data_mut(), |range, chunk| {
        let mut idx = vec![0; outer_dims.len()];
        for (w, out) in range.zip(chunk.chunks_exact_mut(block)) {
            unravel(w, outer_dims, &mut idx);
            let src_off: usize = idx
                .iter()
                .zip(&body.in_dims)
                .zip(&src_strides)
                .map(|((&i, &d), &s)| (i % d) * s)
                .sum();
            let at = src_off * body.element_size;
            out.copy_from_slice(&src[at..at + block]);
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::broadcast::BroadcastAttrs;
    use crate::planner::broadcast::plan_broadcast;
    use crate::planner::PlanContext;

    fn run(attrs: &BroadcastAttrs, data: &Tensor) -> Tensor {
        let plan = plan_broadcast(attrs, &[data], &PlanContext::new(3, 0)).unwrap();
        let mut outputs = vec![Tensor::zeros(plan.outputs[0].clone()).unwrap()];
        execute(&plan, &[data], &mut outputs, &ExecutionContext::default()).unwrap();
        outputs.remove(0)
    }

    #[test]
    fn test_numpy_style() {
        let data = Tensor::from_vec(&[3], vec![1.0f32, 2.0, 3.0]).unwrap();
        let out = run(&BroadcastAttrs::to_shape(vec![2, 3]), &data);
        assert_eq!(out.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_axes_mapping() {
        // [2] placed on axis 0 of [2, 3]
        let data = Tensor::from_vec(&[2], vec![5i32, 6]).unwrap();
        let out = run(&BroadcastAttrs::to_shape(vec![2, 3]).with_axes(vec![1]), &data);
        assert_eq!(out.to_vec::<i32>().unwrap(), vec![5, 5, 5, 6, 6, 6]);
    }

    #[test]
    fn test_tiling_divisible_dims() {
        let data = Tensor::from_vec(&[1, 2], vec![1u8, 2]).unwrap();
        let out = run(&BroadcastAttrs::to_shape(vec![2, 4]), &data);
        assert_eq!(out.to_vec::<u8>().unwrap(), vec![1, 2, 1, 2, 1, 2, 1, 2]);
    }
}
