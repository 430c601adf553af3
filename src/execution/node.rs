//! A compiled node: the selected kernel plus its current plan.

use log::debug;

use crate::error::{Error, Result};
use crate::kernel::SelectedKernel;
use crate::model::PortDesc;
use crate::ops::tensor::Tensor;
use crate::ops::OpAttributes;
use crate::planner::{ExecutionPlan, PlanContext};

use super::context::ExecutionContext;

/// Binds one node to its kernel. Owns the plan, which is rebuilt whenever
/// the plan says it cannot be reused for the incoming inputs.
#[derive(Debug)]
pub struct NodeExecutor {
    node_name: String,
    attributes: OpAttributes,
    selection: SelectedKernel,
    /// Output ports from shape inference; actual outputs must fit them
    expected_outputs: Vec<PortDesc>,
    threads: usize,
    plan: Option<ExecutionPlan>,
}

impl NodeExecutor {
    pub fn new(
        node_name: &str,
        attributes: OpAttributes,
        selection: SelectedKernel,
        expected_outputs: Vec<PortDesc>,
        threads: usize,
    ) -> Self {
        Self {
            node_name: node_name.to_string(),
            attributes,
            selection,
            expected_outputs,
            threads,
            plan: None,
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn kernel_name(&self) -> &str {
        self.selection.name()
    }

    pub fn selection(&self) -> &SelectedKernel {
        &self.selection
    }

    /// Plan of the last execution, if any.
    pub fn plan(&self) -> Option<&ExecutionPlan> {
        self.plan.as_ref()
    }

    fn check_outputs(&self, plan: &ExecutionPlan) -> Result<()> {
        if !self.expected_outputs.is_empty() && self.expected_outputs.len() != plan.outputs.len() {
            return Err(Error::ValidationError(format!(
                "{}: kernel {} produces {} outputs, shape inference expects {}",
                self.node_name,
                self.kernel_name(),
                plan.outputs.len(),
                self.expected_outputs.len()
            )));
        }
        for (port, desc) in self.expected_outputs.iter().zip(&plan.outputs) {
            if port.data_type != desc.data_type || !port.shape.compatible(&desc.partial_shape()) {
                return Err(Error::ValidationError(format!(
                    "{}: output {:?} {} does not fit inferred {} {}",
                    self.node_name, desc.dims, desc.data_type, port.shape, port.data_type
                )));
            }
        }
        Ok(())
    }

    /// Make sure a plan for these inputs exists, building a new one when
    /// the current plan cannot be reused.
    pub fn prepare(&mut self, inputs: &[&Tensor]) -> Result<&ExecutionPlan> {
        let reusable = self.plan.as_ref().map_or(false, |p| p.is_reusable_for(inputs));
        if !reusable {
            let ctx = PlanContext::new(self.threads, self.selection.config_index);
            let plan = self.selection.kernel.plan(&self.attributes, inputs, &ctx)?;
            self.check_outputs(&plan)?;
            debug!(
                "{}: new plan from {} with {} work items in {} ranges",
                self.node_name,
                self.kernel_name(),
                plan.partition.work_amount(),
                plan.partition.len()
            );
            self.plan = Some(plan);
        }
        self.plan
            .as_ref()
            .ok_or_else(|| Error::InternalError(format!("{}: no plan after prepare", self.node_name)))
    }

    /// Run the node. Output buffers are allocated only after the plan has
    /// been validated.
    pub fn execute(&mut self, inputs: &[&Tensor], ctx: &ExecutionContext) -> Result<Vec<Tensor>> {
        self.prepare(inputs)?;
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| Error::InternalError(format!("{}: no plan after prepare", self.node_name)))?;
        let mut outputs = plan
            .outputs
            .iter()
            .map(|desc| Tensor::zeros(desc.clone()))
            .collect::<Result<Vec<_>>>()?;
        self.selection.kernel.execute(plan, inputs, &mut outputs, ctx)?;
        Ok(outputs)
    }
}
