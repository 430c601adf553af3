//! Kernels shipped with the crate and their registrations.

use std::sync::Arc;

use strum::IntoEnumIterator;

use crate::error::{Error, Result};
use crate::execution::{self, ExecutionContext};
use crate::layout::MemoryFormat;
use crate::ops::broadcast::BroadcastAttrs;
use crate::ops::matrix_nms::MatrixNmsAttrs;
use crate::ops::pad::{PadAttrs, PadMode};
use crate::ops::reorder::ReorderAttrs;
use crate::ops::tensor::{DataType, Tensor};
use crate::ops::{OpAttributes, OpKind};
use crate::planner::{self, ExecutionPlan, PlanContext};
use crate::shape::Dimension;

use super::params::{KernelParams, ShapeMode};
use super::registry::KernelRegistry;
use super::Kernel;

const BOTH_MODES: [ShapeMode; 2] = [ShapeMode::Static, ShapeMode::Dynamic];

fn wrong_attributes(kernel: &str, attrs: &OpAttributes) -> Error {
    Error::InternalError(format!("{} got {} attributes", kernel, attrs.kind()))
}

fn pad_attrs<'a>(kernel: &str, attrs: &'a OpAttributes) -> Result<&'a PadAttrs> {
    match attrs {
        OpAttributes::Pad(a) => Ok(a),
        other => Err(wrong_attributes(kernel, other)),
    }
}

fn broadcast_attrs<'a>(kernel: &str, attrs: &'a OpAttributes) -> Result<&'a BroadcastAttrs> {
    match attrs {
        OpAttributes::Broadcast(a) => Ok(a),
        other => Err(wrong_attributes(kernel, other)),
    }
}

fn reorder_attrs<'a>(kernel: &str, attrs: &'a OpAttributes) -> Result<&'a ReorderAttrs> {
    match attrs {
        OpAttributes::Reorder(a) => Ok(a),
        other => Err(wrong_attributes(kernel, other)),
    }
}

fn nms_attrs<'a>(kernel: &str, attrs: &'a OpAttributes) -> Result<&'a MatrixNmsAttrs> {
    match attrs {
        OpAttributes::MatrixNms(a) => Ok(a),
        other => Err(wrong_attributes(kernel, other)),
    }
}

/// Row-based pad on folded physical dims.
#[derive(Debug, Default)]
pub struct PadKernel;

impl Kernel for PadKernel {
    fn name(&self) -> &str {
        "pad_opt"
    }

    fn op_kind(&self) -> OpKind {
        OpKind::Pad
    }

    /// Blocked layouts need whole channel blocks and constant pads that
    /// keep them whole.
    fn supports(&self, params: &KernelParams) -> bool {
        let (attrs, input) = match (&params.attributes, params.inputs.first()) {
            (OpAttributes::Pad(a), Some(p)) => (a, p),
            _ => return false,
        };
        let block = match input.format.block_size() {
            Some(b) => b as i64,
            None => return true,
        };
        let channels = match input.shape.dim(1) {
            Some(Dimension::Static(c)) => c as i64,
            _ => return false,
        };
        let (begin, end) = match (&attrs.pads_begin, &attrs.pads_end) {
            (Some(b), Some(e)) if b.len() > 1 && e.len() > 1 => (b[1], e[1]),
            _ => return false,
        };
        let aligned = match attrs.mode {
            PadMode::Constant => begin % block == 0 && end % block == 0,
            _ => begin == 0 && end == 0,
        };
        channels % block == 0 && aligned
    }

    fn plan(&self, attrs: &OpAttributes, inputs: &[&Tensor], ctx: &PlanContext) -> Result<ExecutionPlan> {
        planner::pad::plan_pad(pad_attrs(self.name(), attrs)?, inputs, ctx)
    }

    fn execute(
        &self,
        plan: &ExecutionPlan,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        ctx: &ExecutionContext,
    ) -> Result<()> {
        execution::pad::execute(plan, inputs, outputs, ctx)
    }
}

#[derive(Debug, Default)]
pub struct PadReferenceKernel;

impl Kernel for PadReferenceKernel {
    fn name(&self) -> &str {
        "pad_ref"
    }

    fn op_kind(&self) -> OpKind {
        OpKind::Pad
    }

    fn is_reference(&self) -> bool {
        true
    }

    fn plan(&self, attrs: &OpAttributes, inputs: &[&Tensor], ctx: &PlanContext) -> Result<ExecutionPlan> {
        planner::pad::plan_pad_reference(pad_attrs(self.name(), attrs)?, inputs, ctx)
    }

    fn execute(
        &self,
        plan: &ExecutionPlan,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        ctx: &ExecutionContext,
    ) -> Result<()> {
        execution::reference::pad(plan, inputs, outputs, ctx)
    }
}

/// Block copy over plain layouts.
#[derive(Debug, Default)]
pub struct BroadcastKernel;

impl Kernel for BroadcastKernel {
    fn name(&self) -> &str {
        "broadcast_opt"
    }

    fn op_kind(&self) -> OpKind {
        OpKind::Broadcast
    }

    fn plan(&self, attrs: &OpAttributes, inputs: &[&Tensor], ctx: &PlanContext) -> Result<ExecutionPlan> {
        planner::broadcast::plan_broadcast(broadcast_attrs(self.name(), attrs)?, inputs, ctx)
    }

    fn execute(
        &self,
        plan: &ExecutionPlan,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        ctx: &ExecutionContext,
    ) -> Result<()> {
        execution::broadcast::execute(plan, inputs, outputs, ctx)
    }
}

#[derive(Debug, Default)]
pub struct BroadcastReferenceKernel;

impl Kernel for BroadcastReferenceKernel {
    fn name(&self) -> &str {
        "broadcast_ref"
    }

    fn op_kind(&self) -> OpKind {
        OpKind::Broadcast
    }

    fn is_reference(&self) -> bool {
        true
    }

    fn plan(&self, attrs: &OpAttributes, inputs: &[&Tensor], ctx: &PlanContext) -> Result<ExecutionPlan> {
        planner::broadcast::plan_broadcast_reference(broadcast_attrs(self.name(), attrs)?, inputs, ctx)
    }

    fn execute(
        &self,
        plan: &ExecutionPlan,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        ctx: &ExecutionContext,
    ) -> Result<()> {
        execution::reference::broadcast(plan, inputs, outputs, ctx)
    }
}

#[derive(Debug, Default)]
pub struct ReorderKernel;

impl Kernel for ReorderKernel {
    fn name(&self) -> &str {
        "reorder_opt"
    }

    fn op_kind(&self) -> OpKind {
        OpKind::Reorder
    }

    fn plan(&self, attrs: &OpAttributes, inputs: &[&Tensor], ctx: &PlanContext) -> Result<ExecutionPlan> {
        planner::reorder::plan_reorder(reorder_attrs(self.name(), attrs)?, inputs, ctx)
    }

    fn execute(
        &self,
        plan: &ExecutionPlan,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        ctx: &ExecutionContext,
    ) -> Result<()> {
        execution::reorder::execute(plan, inputs, outputs, ctx)
    }
}

#[derive(Debug, Default)]
pub struct ReorderReferenceKernel;

impl Kernel for ReorderReferenceKernel {
    fn name(&self) -> &str {
        "reorder_ref"
    }

    fn op_kind(&self) -> OpKind {
        OpKind::Reorder
    }

    fn is_reference(&self) -> bool {
        true
    }

    fn plan(&self, attrs: &OpAttributes, inputs: &[&Tensor], ctx: &PlanContext) -> Result<ExecutionPlan> {
        planner::reorder::plan_reorder_reference(reorder_attrs(self.name(), attrs)?, inputs, ctx)
    }

    fn execute(
        &self,
        plan: &ExecutionPlan,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        ctx: &ExecutionContext,
    ) -> Result<()> {
        execution::reference::reorder(plan, inputs, outputs, ctx)
    }
}

#[derive(Debug, Default)]
pub struct MatrixNmsKernel;

impl Kernel for MatrixNmsKernel {
    fn name(&self) -> &str {
        "matrix_nms_ref"
    }

    fn op_kind(&self) -> OpKind {
        OpKind::MatrixNms
    }

    fn is_reference(&self) -> bool {
        true
    }

    fn plan(&self, attrs: &OpAttributes, inputs: &[&Tensor], ctx: &PlanContext) -> Result<ExecutionPlan> {
        planner::matrix_nms::plan_matrix_nms(nms_attrs(self.name(), attrs)?, inputs, ctx)
    }

    fn execute(
        &self,
        plan: &ExecutionPlan,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        ctx: &ExecutionContext,
    ) -> Result<()> {
        execution::matrix_nms::execute(plan, inputs, outputs, ctx)
    }
}

#[derive(Debug, Default)]
pub struct GatherTreeKernel;

impl Kernel for GatherTreeKernel {
    fn name(&self) -> &str {
        "gather_tree_ref"
    }

    fn op_kind(&self) -> OpKind {
        OpKind::GatherTree
    }

    fn is_reference(&self) -> bool {
        true
    }

    fn plan(&self, attrs: &OpAttributes, inputs: &[&Tensor], ctx: &PlanContext) -> Result<ExecutionPlan> {
        match attrs {
            OpAttributes::GatherTree => planner::gather_tree::plan_gather_tree(inputs, ctx),
            other => Err(wrong_attributes(self.name(), other)),
        }
    }

    fn execute(
        &self,
        plan: &ExecutionPlan,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        ctx: &ExecutionContext,
    ) -> Result<()> {
        execution::gather_tree::execute(plan, inputs, outputs, ctx)
    }
}

fn all_types(formats: &[MemoryFormat]) -> Vec<(DataType, MemoryFormat)> {
    DataType::iter()
        .flat_map(|dt| formats.iter().map(move |&f| (dt, f)))
        .collect()
}

impl KernelRegistry {
    /// Registry with every built-in kernel and a reference fallback for
    /// each op kind.
    pub fn with_builtin_kernels() -> Result<Self> {
        let mut registry = Self::new();
        let every_format: Vec<MemoryFormat> = MemoryFormat::iter().collect();

        registry.register_for_types(Arc::new(PadKernel), &all_types(&every_format), &BOTH_MODES)?;
        let pad_ref: Arc<dyn Kernel> = Arc::new(PadReferenceKernel);
        registry.register_any(pad_ref.clone(), &BOTH_MODES)?;
        registry.set_fallback(pad_ref)?;

        registry.register_for_types(Arc::new(BroadcastKernel), &all_types(&[MemoryFormat::Ncsp]), &BOTH_MODES)?;
        let broadcast_ref: Arc<dyn Kernel> = Arc::new(BroadcastReferenceKernel);
        registry.register_any(broadcast_ref.clone(), &BOTH_MODES)?;
        registry.set_fallback(broadcast_ref)?;

        registry.register_for_types(Arc::new(ReorderKernel), &all_types(&every_format), &BOTH_MODES)?;
        let reorder_ref: Arc<dyn Kernel> = Arc::new(ReorderReferenceKernel);
        registry.register_any(reorder_ref.clone(), &BOTH_MODES)?;
        registry.set_fallback(reorder_ref)?;

        let nms: Arc<dyn Kernel> = Arc::new(MatrixNmsKernel);
        registry.register_for_types(nms.clone(), &[(DataType::F32, MemoryFormat::Ncsp)], &BOTH_MODES)?;
        registry.set_fallback(nms)?;

        let gather_tree: Arc<dyn Kernel> = Arc::new(GatherTreeKernel);
        registry.register_any(gather_tree.clone(), &BOTH_MODES)?;
        registry.set_fallback(gather_tree)?;

        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PortDesc;
    use crate::shape::PartialShape;

    fn pad_params(format: MemoryFormat, channels: usize, begin: i64, mode: PadMode) -> KernelParams {
        let port = PortDesc::new(PartialShape::from_static(&[1, channels, 4, 4]), DataType::F32).with_format(format);
        KernelParams::new(
            OpAttributes::Pad(PadAttrs::new(mode, vec![0, begin, 0, 0], vec![0, 0, 1, 1])),
            vec![port.clone()],
            vec![port],
        )
    }

    #[test]
    fn test_builtin_registry() {
        let registry = KernelRegistry::with_builtin_kernels().unwrap();
        for kind in OpKind::iter() {
            assert!(registry.knows(kind), "{}", kind);
            assert!(registry.fallback(kind).is_some(), "{}", kind);
        }
        assert!(registry.find_by_name(OpKind::Pad, "pad_opt").is_some());
        assert!(registry.find_by_name(OpKind::Pad, "reorder_opt").is_none());
    }

    #[test]
    fn test_pad_blocked_support() {
        let kernel = PadKernel;
        assert!(kernel.supports(&pad_params(MemoryFormat::Ncsp, 3, 1, PadMode::Edge)));
        assert!(kernel.supports(&pad_params(MemoryFormat::Blocked8, 16, 8, PadMode::Constant)));
        assert!(!kernel.supports(&pad_params(MemoryFormat::Blocked8, 16, 3, PadMode::Constant)));
        assert!(!kernel.supports(&pad_params(MemoryFormat::Blocked8, 16, 8, PadMode::Reflect)));
        assert!(!kernel.supports(&pad_params(MemoryFormat::Blocked16, 20, 0, PadMode::Constant)));
    }
}
