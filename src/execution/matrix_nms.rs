//! Matrix NMS executor.
//!
//! Each `(batch, class)` pair is suppressed independently in parallel; the
//! per-batch merge, optional cross-batch sort and output writing run on the
//! calling thread.

use std::cmp::Ordering;

use log::trace;
use ndarray::{ArrayView1, ArrayView2, Axis, Ix3};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::ops::matrix_nms::{SortResultType, BOXES_ID, SCORES_ID};
use crate::ops::tensor::{DataType, RoundingStrategy, Tensor};
use crate::planner::{ExecutionPlan, MatrixNmsPlan, PlanBody};

use super::check_io;
use super::context::ExecutionContext;

/// One selected box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxInfo {
    pub batch: usize,
    pub class: usize,
    /// Box index within the batch
    pub index: usize,
    pub score: f32,
    /// `[x1, y1, x2, y2]`
    pub coords: [f32; 4],
}

fn box_area(b: &[f32; 4], normalized: bool) -> f32 {
    if b[2] < b[0] || b[3] < b[1] {
        return 0.0;
    }
    let norm = if normalized { 0.0 } else { 1.0 };
    (b[2] - b[0] + norm) * (b[3] - b[1] + norm)
}

fn intersection_over_union(a: &[f32; 4], b: &[f32; 4], normalized: bool) -> f32 {
    if b[0] > a[2] || b[2] < a[0] || b[1] > a[3] || b[3] < a[1] {
        return 0.0;
    }
    let inter = [a[0].max(b[0]), a[1].max(b[1]), a[2].min(b[2]), a[3].min(b[3])];
    let inter_area = box_area(&inter, normalized);
    let union = box_area(a, normalized) + box_area(b, normalized) - inter_area;
    if union <= 0.0 {
        0.0
    } else {
        inter_area / union
    }
}

fn by_score_then_index(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

/// Suppress one class of one batch. Returns the kept boxes with decayed
/// scores, highest original score first.
fn suppress_class(
    plan: &MatrixNmsPlan,
    boxes: ArrayView2<f32>,
    scores: ArrayView1<f32>,
    batch: usize,
    class: usize,
) -> Vec<BoxInfo> {
    if plan.is_background(class) {
        return Vec::new();
    }
    let attrs = &plan.attrs;
    let mut candidates: Vec<(usize, f32)> = scores
        .iter()
        .enumerate()
        .filter(|(_, &s)| s > attrs.score_threshold)
        .map(|(i, &s)| (i, s))
        .collect();
    candidates.sort_by(by_score_then_index);
    candidates.truncate(plan.max_boxes_per_class);
    if candidates.is_empty() {
        return Vec::new();
    }

    let coords: Vec<[f32; 4]> = candidates
        .iter()
        .map(|&(i, _)| {
            let row = boxes.row(i);
            [row[0], row[1], row[2], row[3]]
        })
        .collect();
    let n = candidates.len();

    // lower triangle: iou[i][j] for j < i
    let mut iou = vec![0.0f32; n * n];
    let mut iou_max = vec![0.0f32; n];
    for i in 1..n {
        let mut max = 0.0f32;
        for j in 0..i {
            let v = intersection_over_union(&coords[i], &coords[j], attrs.normalized);
            iou[i * n + j] = v;
            max = max.max(v);
        }
        iou_max[i] = max;
    }

    let info = |k: usize, score: f32| BoxInfo {
        batch,
        class,
        index: candidates[k].0,
        score,
        coords: coords[k],
    };
    let mut kept = Vec::with_capacity(n);
    if candidates[0].1 > attrs.post_threshold {
        kept.push(info(0, candidates[0].1));
    }
    for i in 1..n {
        let min_decay = (0..i)
            .map(|j| attrs.decay_function.decay(iou[i * n + j], iou_max[j], attrs.gaussian_sigma))
            .fold(1.0f32, f32::min);
        let decayed = min_decay * candidates[i].1;
        if decayed > attrs.post_threshold {
            kept.push(info(i, decayed));
        }
    }
    trace!(
        "MatrixNms batch {} class {}: {} candidates, {} kept",
        batch,
        class,
        n,
        kept.len()
    );
    kept
}

fn per_batch_order(a: &BoxInfo, b: &BoxInfo) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(a.class.cmp(&b.class))
        .then(a.index.cmp(&b.index))
}

fn across_batch_order(sort: SortResultType) -> Option<fn(&BoxInfo, &BoxInfo) -> Ordering> {
    match sort {
        SortResultType::Score => Some(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.batch.cmp(&b.batch))
                .then(a.class.cmp(&b.class))
                .then(a.index.cmp(&b.index))
        }),
        SortResultType::ClassId => Some(|a, b| {
            a.class
                .cmp(&b.class)
                .then(a.batch.cmp(&b.batch))
                .then(b.score.total_cmp(&a.score))
                .then(a.index.cmp(&b.index))
        }),
        SortResultType::None => None,
    }
}

fn write_index(dt: DataType, value: i64, out: &mut [u8]) {
    dt.write_f64(value as f64, RoundingStrategy::RoundHalfEven, out);
}

pub fn execute(
    plan: &ExecutionPlan,
    inputs: &[&Tensor],
    outputs: &mut [Tensor],
    ctx: &ExecutionContext,
) -> Result<()> {
    check_io(plan, inputs, outputs)?;
    let body = match &plan.body {
        PlanBody::MatrixNms(m) => m,
        _ => return Err(Error::InternalError("MatrixNms executor needs an NMS plan".to_string())),
    };
    let boxes = inputs[BOXES_ID]
        .to_ndarray::<f32>()?
        .into_dimensionality::<Ix3>()
        .map_err(|e| Error::InternalError(format!("MatrixNms boxes: {}", e)))?;
    let scores = inputs[SCORES_ID]
        .to_ndarray::<f32>()?
        .into_dimensionality::<Ix3>()
        .map_err(|e| Error::InternalError(format!("MatrixNms scores: {}", e)))?;

    let classes = body.num_classes;
    let per_item: Vec<Vec<BoxInfo>> = ctx.install(|| {
        plan.partition
            .ranges()
            .par_iter()
            .flat_map_iter(|range| {
                range.clone().map(|item| {
                    let (b, c) = (item / classes, item % classes);
                    suppress_class(
                        body,
                        boxes.index_axis(Axis(0), b),
                        scores.index_axis(Axis(0), b).index_axis_move(Axis(0), c),
                        b,
                        c,
                    )
                })
            })
            .collect()
    });

    let mut num_per_batch = Vec::with_capacity(body.num_batches);
    let mut selected = Vec::new();
    for batch_items in per_item.chunks(classes.max(1)) {
        let mut batch: Vec<BoxInfo> = batch_items.iter().flatten().copied().collect();
        batch.sort_by(per_batch_order);
        if let Ok(k) = usize::try_from(body.attrs.keep_top_k) {
            batch.truncate(k);
        }
        num_per_batch.push(batch.len());
        selected.extend(batch);
    }
    num_per_batch.resize(body.num_batches, 0);

    if body.attrs.sort_result_across_batch {
        if let Some(order) = across_batch_order(body.attrs.sort_result_type) {
            selected.sort_by(order);
        }
    }

    let index_type = body.attrs.output_type;
    let index_size = index_type.size_in_bytes();
    let dynamic = body.attrs.dynamic_output;
    let (first, rest) = outputs.split_at_mut(1);
    let (second, third) = rest.split_at_mut(1);
    let boxes_out = first[0].data_mut();
    let index_out = second[0].data_mut();
    let valid_out = third[0].data_mut();

    let mut entries = selected.iter();
    let mut row = 0;
    for (b, &count) in num_per_batch.iter().enumerate() {
        let block_start = row;
        for info in entries.by_ref().take(count) {
            let values = [
                info.class as f32,
                info.score,
                info.coords[0],
                info.coords[1],
                info.coords[2],
                info.coords[3],
            ];
            for (k, v) in values.iter().enumerate() {
                let at = (row * 6 + k) * 4;
                boxes_out[at..at + 4].copy_from_slice(&v.to_le_bytes());
            }
            let index = (info.batch * body.num_boxes + info.index) as i64;
            write_index(index_type, index, &mut index_out[row * index_size..(row + 1) * index_size]);
            row += 1;
        }
        if !dynamic {
            let block_end = block_start + body.max_boxes_per_batch;
            for r in row..block_end {
                for k in 0..6 {
                    let at = (r * 6 + k) * 4;
                    boxes_out[at..at + 4].copy_from_slice(&(-1.0f32).to_le_bytes());
                }
                write_index(index_type, -1, &mut index_out[r * index_size..(r + 1) * index_size]);
            }
            row = block_end;
        }
        write_index(index_type, count as i64, &mut valid_out[b * index_size..(b + 1) * index_size]);
    }

    if dynamic {
        outputs[0].truncate_outer(row)?;
        outputs[1].truncate_outer(row)?;
    }
    Ok(())
}
