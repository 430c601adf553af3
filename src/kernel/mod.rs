//! Kernel registry, selection and the tuning cache.

use std::fmt::Debug;

use crate::error::Result;
use crate::execution::ExecutionContext;
use crate::ops::tensor::Tensor;
use crate::ops::{OpAttributes, OpKind};
use crate::planner::{ExecutionPlan, PlanContext};

pub mod builtin;
pub mod device;
pub mod params;
pub mod registry;
pub mod selector;
pub mod tuning_cache;

pub use device::{DeviceInfo, DeviceKind};
pub use params::{KernelParams, ShapeMode};
pub use registry::{KernelKey, KernelRegistry};
pub use selector::{KernelSelector, SelectedKernel, SelectionSource};
pub use tuning_cache::{CacheEntry, TuningCache};

/// An executable implementation of one operation.
///
/// A kernel builds a plan from concrete inputs and runs it. Plans are
/// owned by the node executor; kernels hold no per-node state.
pub trait Kernel: Send + Sync + Debug {
    /// Unique name within the op kind; stored in the tuning cache.
    fn name(&self) -> &str;

    fn op_kind(&self) -> OpKind;

    /// Per-element implementation used as fallback and test oracle.
    fn is_reference(&self) -> bool {
        false
    }

    /// Reject parameters the kernel cannot handle.
    fn supports(&self, _params: &KernelParams) -> bool {
        true
    }

    fn plan(&self, attrs: &OpAttributes, inputs: &[&Tensor], ctx: &PlanContext) -> Result<ExecutionPlan>;

    fn execute(
        &self,
        plan: &ExecutionPlan,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        ctx: &ExecutionContext,
    ) -> Result<()>;
}
