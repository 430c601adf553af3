use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info};

use crate::error::{Error, Result};
use crate::kernel::{DeviceInfo, KernelParams, KernelRegistry, KernelSelector, TuningCache};
use crate::model::Node;
use crate::ops::{OperatorRegistry, Tensor};

use super::context::{ExecutionContext, ExecutionOptions};
use super::node::NodeExecutor;

/// The explicit context owning everything that would otherwise be global:
/// the operator and kernel registries, the tuning cache and the thread pool.
///
/// The registries are read-only after construction and the tuning cache
/// guards its own state, so an engine can be shared between threads.
#[derive(Debug)]
pub struct InferenceEngine {
    /// Shape-inference operators by op type
    operators: OperatorRegistry,
    /// Kernel registry (immutable once created)
    kernels: Arc<KernelRegistry>,
    selector: KernelSelector,
    tuning_cache: Option<Arc<TuningCache>>,
    context: ExecutionContext,
}

impl InferenceEngine {
    /// Create a new engine with the built-in kernels
    pub fn new(options: ExecutionOptions) -> Result<Self> {
        Self::with_registry(options, KernelRegistry::with_builtin_kernels()?)
    }

    /// Create a new engine over a caller-provided kernel registry
    pub fn with_registry(options: ExecutionOptions, registry: KernelRegistry) -> Result<Self> {
        let tuning_cache = match &options.tuning_cache_path {
            Some(path) => Some(Arc::new(TuningCache::load_from_file(path)?)),
            None => None,
        };
        let kernels = Arc::new(registry);
        let selector = KernelSelector::new(kernels.clone(), tuning_cache.clone(), &options);
        let context = ExecutionContext::new(options)?;
        info!(
            "Inference engine ready: {} kernel registrations, {} threads, tuning {}",
            kernels.len(),
            context.num_threads(),
            context.options().tuning_mode
        );

        Ok(Self {
            operators: OperatorRegistry::initialize_standard_operators(),
            kernels,
            selector,
            tuning_cache,
            context,
        })
    }

    /// Get execution options
    pub fn options(&self) -> &ExecutionOptions {
        self.context.options()
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn kernel_registry(&self) -> &KernelRegistry {
        &self.kernels
    }

    pub fn selector(&self) -> &KernelSelector {
        &self.selector
    }

    pub fn tuning_cache(&self) -> Option<&TuningCache> {
        self.tuning_cache.as_deref()
    }

    /// Run shape inference and fill the node's output ports
    pub fn infer_shapes(&self, node: &mut Node) -> Result<()> {
        self.operators.infer_node(node)
    }

    /// Infer the node's shapes and bind it to a kernel for `device`.
    pub fn compile_node(&self, node: &mut Node, device: &DeviceInfo) -> Result<NodeExecutor> {
        let op = self.operators.create_operator_for_node(node)?;
        node.outputs = op.output_ports(&node.inputs)?;

        let attributes = op.attributes();
        let params = KernelParams::new(attributes.clone(), node.inputs.clone(), node.outputs.clone());
        let selection = self.selector.select(&params, device)?;
        debug!(
            "Compiled node '{}' ({}) to kernel {} [{}]",
            node.name,
            node.op_type,
            selection.name(),
            selection.source
        );

        Ok(NodeExecutor::new(
            &node.name,
            attributes,
            selection,
            node.outputs.clone(),
            self.context.num_threads(),
        ))
    }

    /// Execute a compiled node on concrete inputs
    pub fn run(&self, executor: &mut NodeExecutor, inputs: &[&Tensor]) -> Result<Vec<Tensor>> {
        if inputs.is_empty() {
            return Err(Error::ValidationError(format!(
                "Node '{}' executed without inputs",
                executor.node_name()
            )));
        }
        let start = Instant::now();
        let outputs = executor.execute(inputs, &self.context).map_err(|e| {
            if !e.is_model_error() {
                error!("Node '{}' failed in {}: {}", executor.node_name(), executor.kernel_name(), e);
            }
            e
        })?;
        debug!(
            "Node '{}' ran {} in {:?}",
            executor.node_name(),
            executor.kernel_name(),
            start.elapsed()
        );
        Ok(outputs)
    }

    /// Write the tuning cache back when it changed. Returns whether a file
    /// was written.
    pub fn save_tuning_cache(&self) -> Result<bool> {
        match &self.tuning_cache {
            Some(cache) if cache.needs_save() => {
                cache.save()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
