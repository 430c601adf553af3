//! Matrix NMS planning.

use log::debug;

use crate::error::{Error, Result};
use crate::layout::MemoryFormat;
use crate::ops::matrix_nms::{MatrixNmsAttrs, BOXES_ID, SCORES_ID};
use crate::ops::tensor::{DataType, Tensor, TensorDesc};

use super::{input_descs, ExecutionPlan, PlanBody, PlanContext, PlanValidity, WorkPartition};

#[derive(Debug, Clone, PartialEq)]
pub struct MatrixNmsPlan {
    pub attrs: MatrixNmsAttrs,
    pub num_batches: usize,
    pub num_boxes: usize,
    pub num_classes: usize,
    /// Candidates kept per class after the score filter
    pub max_boxes_per_class: usize,
    /// Output rows reserved per batch
    pub max_boxes_per_batch: usize,
}

impl MatrixNmsPlan {
    pub fn is_background(&self, class: usize) -> bool {
        usize::try_from(self.attrs.background_class).map_or(false, |bg| bg == class)
    }
}

fn check_input(tensor: &Tensor, what: &str, rank: usize) -> Result<()> {
    if tensor.data_type() != DataType::F32 || tensor.format() != MemoryFormat::Ncsp {
        return Err(Error::ConfigurationError(format!(
            "MatrixNms: {} must be plain f32, got {}/{}",
            what,
            tensor.data_type(),
            tensor.format()
        )));
    }
    if tensor.dims().len() != rank {
        return Err(Error::ConfigurationError(format!(
            "MatrixNms: {} must have rank {}, got {:?}",
            what,
            rank,
            tensor.dims()
        )));
    }
    Ok(())
}

/// One work item per `(batch, class)` pair.
pub fn plan_matrix_nms(attrs: &MatrixNmsAttrs, inputs: &[&Tensor], ctx: &PlanContext) -> Result<ExecutionPlan> {
    let (boxes, scores) = match (inputs.get(BOXES_ID), inputs.get(SCORES_ID)) {
        (Some(b), Some(s)) => (*b, *s),
        _ => {
            return Err(Error::InternalError(format!(
                "MatrixNms plan needs boxes and scores, got {} inputs",
                inputs.len()
            )))
        }
    };
    check_input(boxes, "boxes", 3)?;
    check_input(scores, "scores", 3)?;

    let (b, n) = (boxes.dims()[0], boxes.dims()[1]);
    let c = scores.dims()[1];
    if boxes.dims()[2] != 4 || scores.dims()[0] != b || scores.dims()[2] != n {
        return Err(Error::ConfigurationError(format!(
            "MatrixNms: incompatible boxes {:?} and scores {:?}",
            boxes.dims(),
            scores.dims()
        )));
    }

    let max_boxes_per_batch = attrs.max_boxes_per_batch(n, c);
    let rows = b * max_boxes_per_batch;
    let outputs = vec![
        TensorDesc::plain(&[rows, 6], DataType::F32),
        TensorDesc::plain(&[rows, 1], attrs.output_type),
        TensorDesc::plain(&[b], attrs.output_type),
    ];
    let partition = WorkPartition::new(b * c, ctx.team_size());
    debug!(
        "MatrixNms plan: {} batches, {} classes, {} boxes, {} rows per batch",
        b, c, n, max_boxes_per_batch
    );

    Ok(ExecutionPlan {
        inputs: input_descs(inputs),
        outputs,
        validity: PlanValidity::Static,
        partition,
        body: PlanBody::MatrixNms(MatrixNmsPlan {
            attrs: attrs.clone(),
            num_batches: b,
            num_boxes: n,
            num_classes: c,
            max_boxes_per_class: attrs.max_boxes_per_class(n),
            max_boxes_per_batch,
        }),
    })
}
