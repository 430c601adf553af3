//! GatherTree reference executor.
//!
//! Every `(batch, beam)` column is rebuilt independently by walking the
//! parent pointers back from the last valid step.

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::ops::tensor::{RoundingStrategy, Tensor};
use crate::planner::{ExecutionPlan, GatherTreePlan, PlanBody};

use super::check_io;
use super::context::ExecutionContext;

fn gather_column(
    plan: &GatherTreePlan,
    step_ids: &[f64],
    parent_ids: &[f64],
    max_seq_len: f64,
    end_token: f64,
    batch: usize,
    beam: usize,
) -> Result<Vec<f64>> {
    let t_max = plan.max_time;
    let max_seq = if max_seq_len > 0.0 {
        (max_seq_len as usize).min(t_max)
    } else {
        0
    };

    let mut column = vec![end_token; t_max];
    let mut parent = beam;
    for level in (0..max_seq).rev() {
        let at = plan.index(level, batch, parent);
        column[level] = step_ids[at];
        let next = parent_ids[at];
        if next < 0.0 || next.fract() != 0.0 || next >= plan.beam_width as f64 {
            return Err(Error::ValidationError(format!(
                "GatherTree: parent id {} at step {}, batch {} is outside [0, {})",
                next, level, batch, plan.beam_width
            )));
        }
        parent = next as usize;
    }

    if let Some(first_end) = column[..max_seq].iter().position(|&v| v == end_token) {
        column[first_end..max_seq].fill(end_token);
    }
    Ok(column)
}

pub fn execute(
    plan: &ExecutionPlan,
    inputs: &[&Tensor],
    outputs: &mut [Tensor],
    ctx: &ExecutionContext,
) -> Result<()> {
    check_io(plan, inputs, outputs)?;
    let body = match &plan.body {
        PlanBody::GatherTree(g) => g,
        _ => return Err(Error::InternalError("GatherTree executor needs a GatherTree plan".to_string())),
    };
    let step_ids = inputs[0].to_f64_vec();
    let parent_ids = inputs[1].to_f64_vec();
    let max_seq_len = inputs[2].to_f64_vec();
    let end_token = inputs[3].to_f64_vec().first().copied().unwrap_or_default();

    let width = body.beam_width;
    let columns: Vec<Vec<f64>> = ctx.install(|| {
        plan.partition
            .ranges()
            .par_iter()
            .flat_map_iter(|range| range.clone())
            .map(|item| {
                let (b, w) = (item / width, item % width);
                gather_column(body, &step_ids, &parent_ids, max_seq_len[b], end_token, b, w)
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let dt = body.data_type;
    let es = dt.size_in_bytes();
    let out = outputs[0].data_mut();
    for (item, column) in columns.iter().enumerate() {
        let (b, w) = (item / width, item % width);
        for (t, &v) in column.iter().enumerate() {
            let at = body.index(t, b, w) * es;
            dt.write_f64(v, RoundingStrategy::RoundHalfEven, &mut out[at..at + es]);
        }
    }
    Ok(())
}
