//! Optimized reorder executor.

use crate::error::{Error, Result};
use crate::ops::tensor::{convert_bytes, Tensor};
use crate::planner::{ExecutionPlan, PlanBody, ReorderPlan};

use super::context::ExecutionContext;
use super::{check_io, for_each_range};

/// Write one source element into the destination encoding. Only the mean
/// operation forces a round trip through f64.
pub(crate) fn write_element(plan: &ReorderPlan, bytes: &[u8], coords: &[usize], out: &mut [u8]) {
    if plan.has_mean() {
        let value = plan.mean_mode.apply(plan.src.data_type.read_f64(bytes), plan.mean_for(coords));
        plan.dst.data_type.write_f64(value, plan.rounding, out);
    } else {
        convert_bytes(plan.src.data_type, bytes, plan.dst.data_type, plan.rounding, out);
    }
}

pub fn execute(
    plan: &ExecutionPlan,
    inputs: &[&Tensor],
    outputs: &mut [Tensor],
    ctx: &ExecutionContext,
) -> Result<()> {
    check_io(plan, inputs, outputs)?;
    let body = match &plan.body {
        PlanBody::Reorder(r) => r,
        _ => return Err(Error::InternalError("Reorder executor needs a reorder plan".to_string())),
    };
    let src = inputs[0].data();
    let src_es = body.src.data_type.size_in_bytes();
    let dst_es = body.dst.data_type.size_in_bytes();
    let src_type = body.src.data_type;
    let dst_type = body.dst.data_type;

    if body.byte_copy {
        return for_each_range(ctx, &plan.partition, dst_es, outputs[0].data_mut(), |range, chunk| {
            chunk.copy_from_slice(&src[range.start * src_es..range.end * src_es]);
            Ok(())
        });
    }

    // precision change only: offsets line up, tails convert zero to zero
    if body.src.format == body.dst.format && !body.has_mean() {
        return for_each_range(ctx, &plan.partition, dst_es, outputs[0].data_mut(), |range, chunk| {
            let src_range = &src[range.start * src_es..range.end * src_es];
            for (out, inp) in chunk.chunks_exact_mut(dst_es).zip(src_range.chunks_exact(src_es)) {
                convert_bytes(src_type, inp, dst_type, body.rounding, out);
            }
            Ok(())
        });
    }

    let src_layout = body.src.layout()?;
    let dst_layout = body.dst.layout()?;
    let rank = body.dst.rank();
    for_each_range(ctx, &plan.partition, dst_es, outputs[0].data_mut(), |range, chunk| {
        let mut coords = vec![0; rank];
        for (offset, out) in range.zip(chunk.chunks_exact_mut(dst_es)) {
            if !dst_layout.logical_coords(offset, &mut coords) {
                out.fill(0);
                continue;
            }
            let at = src_layout.offset_of(&coords) * src_es;
            write_element(body, &src[at..at + src_es], &coords, out);
        }
        Ok(())
    })
}
