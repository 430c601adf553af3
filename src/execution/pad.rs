//! Optimized pad executor.
//!
//! Works row by row on the folded physical plan: each work item is one
//! destination row selected by the outer indices, and the innermost padded
//! dim is filled in chunks of `shift` elements.

use crate::error::{Error, Result};
use crate::ops::pad::PadMode;
use crate::ops::tensor::Tensor;
use crate::planner::{ExecutionPlan, PadPlan, PlanBody};

use super::context::ExecutionContext;
use super::{check_io, fill_pattern, for_each_range, unravel};

/// Source position of a destination index along one padded dim. `None`
/// marks a constant-mode index inside the pad region.
fn source_index(plan: &PadPlan, dim: usize, idx: usize) -> Option<usize> {
    let pb = plan.pads_begin[dim];
    let src_o = plan.src_o_dims[dim];
    if idx >= pb && idx < src_o {
        return Some(idx - pb);
    }
    match plan.mode {
        PadMode::Constant => None,
        PadMode::Edge => Some(if idx < pb { 0 } else { plan.src_dims[dim] - 1 }),
        PadMode::Reflect | PadMode::Symmetric => {
            let s = usize::from(plan.mode == PadMode::Symmetric);
            Some(if idx < pb {
                pb - idx - s
            } else {
                plan.src_dims_for_reflect[dim] - idx
            })
        }
    }
}

/// Fill one destination row.
fn pad_row(plan: &PadPlan, src: &[u8], src_off: usize, row: &mut [u8]) {
    let es = plan.element_size;
    let n = plan.n_work;
    let chunk = plan.shift * es;
    let pb = plan.pads_begin[n];
    let pe = plan.pads_end[n];
    let src_dim = plan.src_dims[n];
    let src_o = plan.src_o_dims[n];
    let src_row = &src[src_off * es..(src_off + src_dim * plan.shift) * es];

    row[pb * chunk..src_o * chunk].copy_from_slice(src_row);
    let src_chunk = |i: usize| &src_row[i * chunk..(i + 1) * chunk];

    match plan.mode {
        PadMode::Constant => {
            fill_pattern(&mut row[..pb * chunk], &plan.pad_pattern);
            fill_pattern(&mut row[src_o * chunk..], &plan.pad_pattern);
        }
        PadMode::Edge => {
            for i in 0..pb {
                row[i * chunk..(i + 1) * chunk].copy_from_slice(src_chunk(0));
            }
            for i in 0..pe {
                let at = src_o + i;
                row[at * chunk..(at + 1) * chunk].copy_from_slice(src_chunk(src_dim - 1));
            }
        }
        PadMode::Reflect | PadMode::Symmetric => {
            let s = usize::from(plan.mode == PadMode::Symmetric);
            for i in 0..pb {
                row[i * chunk..(i + 1) * chunk].copy_from_slice(src_chunk(pb - s - i));
            }
            let rs = plan.src_dims_for_reflect[n];
            for i in 0..pe {
                let at = src_o + i;
                row[at * chunk..(at + 1) * chunk].copy_from_slice(src_chunk(rs - src_o - i));
            }
        }
    }
}

fn pad_plan(plan: &ExecutionPlan) -> Result<&PadPlan> {
    match &plan.body {
        PlanBody::Pad(p) => Ok(p),
        other => Err(Error::InternalError(format!(
            "Pad executor got a {:?} plan",
            std::mem::discriminant(other)
        ))),
    }
}

pub fn execute(
    plan: &ExecutionPlan,
    inputs: &[&Tensor],
    outputs: &mut [Tensor],
    ctx: &ExecutionContext,
) -> Result<()> {
    check_io(plan, inputs, outputs)?;
    let pad = pad_plan(plan)?;
    let src = inputs[0].data();
    let dst = outputs[0].data_mut();
    let es = pad.element_size;

    if pad.src_strides.is_empty() {
        if pad.zero_input {
            return for_each_range(ctx, &plan.partition, es, dst, |_, chunk| {
                fill_pattern(chunk, &pad.pad_pattern);
                Ok(())
            });
        }
        let len = dst.len().min(src.len());
        dst[..len].copy_from_slice(&src[..len]);
        return Ok(());
    }

    let outer_dims = &pad.dst_dims[..pad.n_work];
    for_each_range(ctx, &plan.partition, pad.row_len * es, dst, |range, chunk| {
        let mut idx = vec![0; pad.n_work];
        for (w, row) in range.zip(chunk.chunks_exact_mut(pad.row_len * es)) {
            unravel(w, outer_dims, &mut idx);
            let mut src_off = 0;
            let mut in_pad = false;
            for (dim, &i) in idx.iter().enumerate() {
                match source_index(pad, dim, i) {
                    Some(s) => src_off += s * pad.src_strides[dim],
                    None => {
                        in_pad = true;
                        break;
                    }
                }
            }
            if in_pad {
                fill_pattern(row, &pad.pad_pattern);
            } else {
                pad_row(pad, src, src_off, row);
            }
        }
        Ok(())
    })
}
