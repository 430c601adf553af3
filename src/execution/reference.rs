//! Per-element reference executors.
//!
//! These walk destination elements one by one through the layout mapping,
//! so they accept every memory format and every parameter combination the
//! planners accept. They are the fallback when no optimized kernel applies.

use crate::error::{Error, Result};
use crate::ops::pad::PadMode;
use crate::ops::tensor::Tensor;
use crate::planner::{ExecutionPlan, PadParams, PlanBody};

use super::context::ExecutionContext;
use super::{check_io, for_each_range, reorder};

/// Source coordinate of a destination coordinate along one axis, or `None`
/// for a constant-mode pad position.
fn pad_source_coord(mode: PadMode, coord: usize, begin: usize, dim: usize) -> Option<usize> {
    let i = coord as i64 - begin as i64;
    let d = dim as i64;
    if i >= 0 && i < d {
        return Some(i as usize);
    }
    let mapped = match mode {
        PadMode::Constant => return None,
        PadMode::Edge => i.clamp(0, d - 1),
        PadMode::Reflect if i < 0 => -i,
        PadMode::Reflect => 2 * (d - 1) - i,
        PadMode::Symmetric if i < 0 => -i - 1,
        PadMode::Symmetric => 2 * d - 1 - i,
    };
    Some(mapped as usize)
}

fn pad_params(plan: &ExecutionPlan) -> Result<&PadParams> {
    match &plan.body {
        PlanBody::PadReference(p) => Ok(p),
        _ => Err(Error::InternalError("Reference pad executor needs a reference plan".to_string())),
    }
}

pub fn pad(plan: &ExecutionPlan, inputs: &[&Tensor], outputs: &mut [Tensor], ctx: &ExecutionContext) -> Result<()> {
    check_io(plan, inputs, outputs)?;
    let params = pad_params(plan)?;
    let src_layout = params.src.layout()?;
    let dst_layout = params.dst.layout()?;
    let es = params.src.data_type.size_in_bytes();
    let pattern = params.src.data_type.encode(params.pad_value);
    let zero_input = params.zero_input();
    let src = inputs[0].data();
    let rank = params.dst.rank();

    for_each_range(ctx, &plan.partition, es, outputs[0].data_mut(), |range, chunk| {
        let mut coords = vec![0; rank];
        let mut src_coords = vec![0; rank];
        for (offset, out) in range.zip(chunk.chunks_exact_mut(es)) {
            if !dst_layout.logical_coords(offset, &mut coords) {
                out.fill(0);
                continue;
            }
            if zero_input {
                out.copy_from_slice(&pattern);
                continue;
            }
            let mut inside = true;
            for axis in 0..rank {
                match pad_source_coord(params.mode, coords[axis], params.pads_begin[axis], params.src.dims[axis]) {
                    Some(c) => src_coords[axis] = c,
                    None => {
                        inside = false;
                        break;
                    }
                }
            }
            if inside {
                let at = src_layout.offset_of(&src_coords) * es;
                out.copy_from_slice(&src[at..at + es]);
            } else {
                out.copy_from_slice(&pattern);
            }
        }
        Ok(())
    })
}

pub fn broadcast(
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
    let src_layout = body.src_layout()?;
    let dst_layout = body.dst.layout()?;
    let es = body.element_size;
    let src = inputs[0].data();
    let rank = body.dst.rank();

    for_each_range(ctx, &plan.partition, es, outputs[0].data_mut(), |range, chunk| {
        let mut coords = vec![0; rank];
        for (offset, out) in range.zip(chunk.chunks_exact_mut(es)) {
            if !dst_layout.logical_coords(offset, &mut coords) {
                out.fill(0);
                continue;
            }
            for (c, &d) in coords.iter_mut().zip(&body.in_dims) {
                *c %= d;
            }
            let at = src_layout.offset_of(&coords) * es;
            out.copy_from_slice(&src[at..at + es]);
        }
        Ok(())
    })
}

/// Single pass over source logical coordinates. Blocked channel tails in
/// the destination stay zero.
pub fn reorder(
    plan: &ExecutionPlan,
    inputs: &[&Tensor],
    outputs: &mut [Tensor],
    _ctx: &ExecutionContext,
) -> Result<()> {
    check_io(plan, inputs, outputs)?;
    let body = match &plan.body {
        PlanBody::Reorder(r) => r,
        _ => return Err(Error::InternalError("Reorder executor needs a reorder plan".to_string())),
    };
    let src_layout = body.src.layout()?;
    let dst_layout = body.dst.layout()?;
    let src_es = body.src.data_type.size_in_bytes();
    let dst_es = body.dst.data_type.size_in_bytes();
    let src = inputs[0].data();
    let dst = outputs[0].data_mut();
    dst.fill(0);

    let dims = &body.src.dims;
    let mut coords = vec![0; dims.len()];
    for _ in 0..body.src.element_count() {
        let s = src_layout.offset_of(&coords) * src_es;
        let d = dst_layout.offset_of(&coords) * dst_es;
        reorder::write_element(body, &src[s..s + src_es], &coords, &mut dst[d..d + dst_es]);
        super::step_index(dims, &mut coords);
    }
    Ok(())
}
