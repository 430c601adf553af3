//! Plan-driven executors and the engine context.

use std::ops::Range;

use log::trace;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::ops::tensor::Tensor;
use crate::planner::{ExecutionPlan, WorkPartition};

pub mod broadcast;
pub mod context;
pub mod engine;
pub mod gather_tree;
pub mod matrix_nms;
pub mod node;
pub mod pad;
pub mod reference;
pub mod reorder;

pub use context::{ExecutionContext, ExecutionOptions, TuningMode};
pub use engine::InferenceEngine;
pub use node::NodeExecutor;

/// Split `dst` into one disjoint chunk per partition range (`item_bytes`
/// per work item) and run `f` on each chunk in parallel.
pub(crate) fn for_each_range<F>(
    ctx: &ExecutionContext,
    partition: &WorkPartition,
    item_bytes: usize,
    dst: &mut [u8],
    f: F,
) -> Result<()>
where
    F: Fn(Range<usize>, &mut [u8]) -> Result<()> + Sync,
{
    let needed = partition.work_amount() * item_bytes;
    if needed > dst.len() {
        return Err(Error::InternalError(format!(
            "Destination of {} bytes is smaller than {} work items of {} bytes",
            dst.len(),
            partition.work_amount(),
            item_bytes
        )));
    }

    let mut chunks = Vec::with_capacity(partition.len());
    let mut rest = dst;
    for range in partition.ranges() {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(range.len() * item_bytes);
        chunks.push((range.clone(), head));
        rest = tail;
    }

    if chunks.len() <= 1 {
        return chunks.into_iter().try_for_each(|(range, chunk)| f(range, chunk));
    }
    ctx.install(|| {
        chunks.into_par_iter().try_for_each(|(range, chunk)| {
            trace!("Worker range {:?} ({} bytes)", range, chunk.len());
            f(range, chunk)
        })
    })
}

/// Plan inputs must match the tensors handed to the executor.
pub(crate) fn check_io(plan: &ExecutionPlan, inputs: &[&Tensor], outputs: &[Tensor]) -> Result<()> {
    if inputs.len() != plan.inputs.len() || inputs.iter().zip(&plan.inputs).any(|(t, d)| t.desc() != d) {
        return Err(Error::InternalError(format!(
            "Inputs {:?} do not match the plan ({:?})",
            inputs.iter().map(|t| t.desc()).collect::<Vec<_>>(),
            plan.inputs
        )));
    }
    if outputs.len() != plan.outputs.len() || outputs.iter().zip(&plan.outputs).any(|(t, d)| t.desc() != d) {
        return Err(Error::InternalError(format!(
            "Outputs {:?} do not match the plan ({:?})",
            outputs.iter().map(|t| t.desc()).collect::<Vec<_>>(),
            plan.outputs
        )));
    }
    Ok(())
}

/// Fill `buf` with copies of an element byte pattern.
pub(crate) fn fill_pattern(buf: &mut [u8], pattern: &[u8]) {
    if pattern.iter().all(|&b| b == 0) {
        buf.fill(0);
        return;
    }
    for chunk in buf.chunks_exact_mut(pattern.len()) {
        chunk.copy_from_slice(pattern);
    }
}

/// Row-major multi-index of `flat` over `dims`.
pub(crate) fn unravel(mut flat: usize, dims: &[usize], index: &mut [usize]) {
    for j in (0..dims.len()).rev() {
        index[j] = flat % dims[j];
        flat /= dims[j];
    }
}

/// Advance a row-major multi-index by one.
pub(crate) fn step_index(dims: &[usize], index: &mut [usize]) {
    for j in (0..dims.len()).rev() {
        index[j] += 1;
        if index[j] < dims[j] {
            return;
        }
        index[j] = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_each_range_writes_disjoint_chunks() {
        let ctx = ExecutionContext::new(ExecutionOptions::new().set_thread_count(3)).unwrap();
        let partition = WorkPartition::new(7, 3);
        let mut dst = vec![0u8; 14];
        for_each_range(&ctx, &partition, 2, &mut dst, |range, chunk| {
            for (item, pair) in range.zip(chunk.chunks_exact_mut(2)) {
                pair.fill(item as u8);
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(dst, vec![0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6]);

        let mut small = vec![0u8; 3];
        assert!(for_each_range(&ctx, &partition, 2, &mut small, |_, _| Ok(())).is_err());
    }

    #[test]
    fn test_index_helpers() {
        let dims = [2, 3];
        let mut idx = [0; 2];
        unravel(4, &dims, &mut idx);
        assert_eq!(idx, [1, 1]);
        step_index(&dims, &mut idx);
        assert_eq!(idx, [1, 2]);
        step_index(&dims, &mut idx);
        assert_eq!(idx, [0, 0]);

        let mut buf = [9u8; 6];
        fill_pattern(&mut buf, &[1, 2]);
        assert_eq!(buf, [1, 2, 1, 2, 1, 2]);
    }
}
