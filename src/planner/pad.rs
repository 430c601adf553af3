//! Pad planning.
//!
//! The optimized plan works on physical (block) dims. Dims in front of the
//! first padded dim are folded into one outer dim, and everything behind
//! the last padded dim forms a contiguous chunk of `shift` elements. Each
//! work item is one destination row of `row_len` elements: the outer
//! indices pick the source row, the innermost padded dim is handled inside
//! the row.
//!
//! Only dims *before* the first padded dim are folded. Unpadded dims
//! between two padded dims stay separate work dims, so a pad on dim 0 and
//! on the last dim iterates over every middle dim.

use log::debug;

use crate::error::{Error, Result};
use crate::layout::TensorLayout;
use crate::ops::pad::{scalar_pad_value, PadAttrs, PadMode, PADS_BEGIN_ID, PADS_END_ID, PAD_VALUE_ID};
use crate::ops::tensor::{Tensor, TensorDesc};

use super::{input_descs, ExecutionPlan, PlanBody, PlanContext, PlanValidity, WorkPartition};

/// Pad parameters resolved against concrete input tensors, in logical
/// axis order.
#[derive(Debug, Clone, PartialEq)]
pub struct PadParams {
    pub mode: PadMode,
    pub pads_begin: Vec<usize>,
    pub pads_end: Vec<usize>,
    pub pad_value: f64,
    pub src: TensorDesc,
    pub dst: TensorDesc,
}

impl PadParams {
    /// True when any source dim is empty but the output is not: the whole
    /// output is then the pad value, whatever the mode.
    pub fn zero_input(&self) -> bool {
        self.src.dims.iter().any(|&d| d == 0) && self.dst.dims.iter().all(|&d| d != 0)
    }
}

/// Folded physical parameters for the optimized pad executor.
#[derive(Debug, Clone, PartialEq)]
pub struct PadPlan {
    pub mode: PadMode,
    pub element_size: usize,
    /// Encoded pad value
    pub pad_pattern: Vec<u8>,
    pub zero_input: bool,
    /// Index before the first padded physical dim, -1 when dim 0 is padded
    pub begin_pad_idx: i64,
    /// Last padded physical dim, before folding
    pub end_pad_idx: usize,
    pub pads_begin: Vec<usize>,
    pub pads_end: Vec<usize>,
    pub src_dims: Vec<usize>,
    pub dst_dims: Vec<usize>,
    pub src_strides: Vec<usize>,
    pub dst_strides: Vec<usize>,
    /// `pads_begin[i] + src_dims[i]`: first destination index past the copy
    pub src_o_dims: Vec<usize>,
    /// Mirror base per dim for reflect and symmetric modes
    pub src_dims_for_reflect: Vec<usize>,
    /// Number of outer dims iterated per work item
    pub n_work: usize,
    /// Elements in one chunk of the innermost padded dim
    pub shift: usize,
    /// Elements in one destination row
    pub row_len: usize,
    pub work_amount: usize,
}

impl PadPlan {
    pub fn is_zero_pattern(&self) -> bool {
        self.pad_pattern.iter().all(|&b| b == 0)
    }
}

fn to_pads(values: &[i64], rank: usize, what: &str) -> Result<Vec<usize>> {
    if values.len() != rank {
        return Err(Error::ConfigurationError(format!(
            "Pad: {} has {} entries for a rank {} input",
            what,
            values.len(),
            rank
        )));
    }
    values
        .iter()
        .map(|&v| {
            usize::try_from(v).map_err(|_| {
                Error::ConfigurationError(format!("Pad: {} must be non-negative, got {:?}", what, values))
            })
        })
        .collect()
}

/// Resolve pad amounts and value from attributes or input tensors and
/// check them against the data shape. Returns the validity of any plan
/// built from them.
pub fn resolve_params(attrs: &PadAttrs, inputs: &[&Tensor]) -> Result<(PadParams, PlanValidity)> {
    let data = inputs
        .first()
        .ok_or_else(|| Error::InternalError("Pad plan without data input".to_string()))?;
    let src = data.desc().clone();
    let rank = src.rank();

    let runtime_input = |port: usize, what: &str| {
        inputs.get(port).copied().ok_or_else(|| {
            Error::ConfigurationError(format!("Pad: {} is neither an attribute nor an input", what))
        })
    };

    let pads_begin = match &attrs.pads_begin {
        Some(p) => to_pads(p, rank, "pads_begin")?,
        None => to_pads(&runtime_input(PADS_BEGIN_ID, "pads_begin")?.to_i64_vec()?, rank, "pads_begin")?,
    };
    let pads_end = match &attrs.pads_end {
        Some(p) => to_pads(p, rank, "pads_end")?,
        None => to_pads(&runtime_input(PADS_END_ID, "pads_end")?.to_i64_vec()?, rank, "pads_end")?,
    };
    let pad_value = match attrs.pad_value {
        Some(v) => v,
        None => scalar_pad_value(&runtime_input(PAD_VALUE_ID, "pad_value")?.to_f64_vec())?,
    };

    for (axis, (&dim, (&b, &e))) in src.dims.iter().zip(pads_begin.iter().zip(&pads_end)).enumerate() {
        if dim == 0 {
            continue;
        }
        let limit = match attrs.mode {
            PadMode::Reflect => dim - 1,
            PadMode::Symmetric => dim,
            _ => continue,
        };
        if b > limit || e > limit {
            return Err(Error::ConfigurationError(format!(
                "Pad: {} pads {}/{} exceed {} on axis {} of {:?}",
                attrs.mode, b, e, limit, axis, src.dims
            )));
        }
    }

    let dst_dims: Vec<usize> = src
        .dims
        .iter()
        .zip(pads_begin.iter().zip(&pads_end))
        .map(|(&d, (&b, &e))| d + b + e)
        .collect();
    let dst = TensorDesc::new(&dst_dims, src.data_type, src.format);

    let validity = if attrs.is_data_dependent() {
        PlanValidity::PerInvocation
    } else {
        PlanValidity::Static
    };
    Ok((
        PadParams {
            mode: attrs.mode,
            pads_begin,
            pads_end,
            pad_value,
            src,
            dst,
        },
        validity,
    ))
}

/// Blocked layouts need whole channel blocks and block-aligned channel
/// pads in constant mode, and no channel pads at all otherwise.
pub fn check_blocked_pads(params: &PadParams) -> Result<()> {
    let block = match params.src.format.block_size() {
        Some(b) => b,
        None => return Ok(()),
    };
    let channels = params.src.dims[1];
    let (b, e) = (params.pads_begin[1], params.pads_end[1]);
    let aligned = match params.mode {
        PadMode::Constant => b % block == 0 && e % block == 0,
        _ => b == 0 && e == 0,
    };
    if channels % block != 0 || !aligned {
        return Err(Error::ConfigurationError(format!(
            "Pad: channel pads {}/{} on {} channels do not fit {} layout in {} mode",
            b, e, channels, params.src.format, params.mode
        )));
    }
    Ok(())
}

/// Channel pads in physical dim order.
fn physical_pads(pads: &[usize], layout: &TensorLayout) -> Vec<usize> {
    match layout.format().block_size() {
        Some(block) => {
            let mut out = pads.to_vec();
            out[1] /= block;
            out.push(0);
            out
        }
        None => layout.order().iter().map(|&axis| pads[axis]).collect(),
    }
}

/// Build the folded physical plan used by the optimized executor.
pub fn build_pad_plan(params: &PadParams) -> Result<PadPlan> {
    check_blocked_pads(params)?;

    let src_layout = params.src.layout()?;
    let dst_layout = params.dst.layout()?;
    let mut pads_begin = physical_pads(&params.pads_begin, &src_layout);
    let mut pads_end = physical_pads(&params.pads_end, &src_layout);
    let mut src_dims = src_layout.block_dims().to_vec();
    let mut dst_dims = dst_layout.block_dims().to_vec();
    let n_dims = src_dims.len();

    let element_size = params.src.data_type.size_in_bytes();
    let pad_pattern = params.src.data_type.encode(params.pad_value);

    let zero_input = src_dims.iter().any(|&d| d == 0) && dst_dims.iter().all(|&d| d != 0);
    if zero_input || n_dims == 0 || dst_dims.iter().any(|&d| d == 0) {
        // fill everything (zero input), copy one element (scalar), or nothing
        let total = dst_layout.physical_size();
        let work_amount = if zero_input { total } else { usize::from(total > 0) };
        return Ok(PadPlan {
            mode: params.mode,
            element_size,
            pad_pattern,
            zero_input,
            begin_pad_idx: 0,
            end_pad_idx: 0,
            pads_begin,
            pads_end,
            src_dims,
            dst_dims,
            src_strides: Vec::new(),
            dst_strides: Vec::new(),
            src_o_dims: Vec::new(),
            src_dims_for_reflect: Vec::new(),
            n_work: 0,
            shift: 1,
            row_len: if zero_input { 1 } else { total },
            work_amount,
        });
    }

    let padded = |i: &usize| pads_begin[*i] != 0 || pads_end[*i] != 0;
    let begin_pad_idx = (0..n_dims).find(padded).map(|i| i as i64 - 1).unwrap_or(0);
    let end_pad_idx = (0..n_dims).rev().find(padded).unwrap_or(n_dims - 1);

    let mut src_strides = TensorLayout::compute_contiguous_strides(&src_dims);
    let mut dst_strides = TensorLayout::compute_contiguous_strides(&dst_dims);

    let n_work = end_pad_idx - begin_pad_idx.max(0) as usize;
    if begin_pad_idx > 0 {
        let fold = begin_pad_idx as usize;
        src_dims[0] = src_dims[..=fold].iter().product();
        dst_dims[0] = dst_dims[..=fold].iter().product();
        src_strides[0] = src_strides[fold];
        dst_strides[0] = dst_strides[fold];
        for v in [&mut src_dims, &mut dst_dims, &mut src_strides, &mut dst_strides] {
            v.drain(1..=fold);
        }
        pads_begin.drain(1..=fold);
        pads_end.drain(1..=fold);
    }

    let shift = dst_strides[n_work];
    let row_len = dst_dims[n_work] * shift;
    let work_amount = dst_dims[..n_work].iter().product();

    let src_o_dims: Vec<usize> = pads_begin.iter().zip(&src_dims).map(|(p, d)| p + d).collect();
    let src_dims_for_reflect = match params.mode {
        PadMode::Reflect | PadMode::Symmetric => {
            let s = usize::from(params.mode == PadMode::Symmetric);
            // src + src_o - 2 + s, never negative for non-empty dims
            src_dims
                .iter()
                .zip(&src_o_dims)
                .map(|(d, o)| (d + o + s).saturating_sub(2))
                .collect()
        }
        _ => Vec::new(),
    };

    Ok(PadPlan {
        mode: params.mode,
        element_size,
        pad_pattern,
        zero_input,
        begin_pad_idx,
        end_pad_idx,
        pads_begin,
        pads_end,
        src_dims,
        dst_dims,
        src_strides,
        dst_strides,
        src_o_dims,
        src_dims_for_reflect,
        n_work,
        shift,
        row_len,
        work_amount,
    })
}

pub fn plan_pad(attrs: &PadAttrs, inputs: &[&Tensor], ctx: &PlanContext) -> Result<ExecutionPlan> {
    let (params, validity) = resolve_params(attrs, inputs)?;
    let plan = build_pad_plan(&params)?;
    let team = if plan.n_work == 0 && !plan.zero_input { 1 } else { ctx.team_size() };
    let partition = WorkPartition::new(plan.work_amount, team);
    debug!(
        "Pad plan: {:?} -> {:?} ({}), {} rows of {} elements, n_work {}, {} ranges",
        params.src.dims,
        params.dst.dims,
        params.mode,
        plan.work_amount,
        plan.row_len,
        plan.n_work,
        partition.len()
    );
    Ok(ExecutionPlan {
        inputs: input_descs(inputs),
        outputs: vec![params.dst.clone()],
        validity,
        partition,
        body: PlanBody::Pad(plan),
    })
}

/// Plan for the per-element reference executor: one work item per physical
/// destination element.
pub fn plan_pad_reference(attrs: &PadAttrs, inputs: &[&Tensor], ctx: &PlanContext) -> Result<ExecutionPlan> {
    let (params, validity) = resolve_params(attrs, inputs)?;
    let total = params.dst.layout()?.physical_size();
    debug!(
        "Pad reference plan: {:?} -> {:?} ({})",
        params.src.dims, params.dst.dims, params.mode
    );
    Ok(ExecutionPlan {
        inputs: input_descs(inputs),
        outputs: vec![params.dst.clone()],
        validity,
        partition: WorkPartition::new(total, ctx.team_size()),
        body: PlanBody::PadReference(params),
    })
}
