pub mod error;
pub mod execution;
pub mod kernel;
pub mod layout;
pub mod model;
pub mod ops;
pub mod planner;
pub mod shape;

// Re-export commonly used types
pub use error::{Error, Result};
pub use execution::{ExecutionContext, ExecutionOptions, InferenceEngine, NodeExecutor, TuningMode};
pub use kernel::{DeviceInfo, DeviceKind, Kernel, KernelParams, KernelRegistry, KernelSelector, TuningCache};
pub use layout::{MemoryFormat, TensorLayout};
pub use model::{Attribute, Node, NodeId, PortDesc};
pub use ops::registry::{Operator, OperatorRegistry};
pub use ops::tensor::{DataType, Tensor, TensorDesc};
pub use ops::{OpAttributes, OpKind};
pub use planner::{ExecutionPlan, PlanContext};
pub use shape::{Dimension, PartialShape};
