use std::collections::HashMap;
use std::fmt::Debug;

use crate::error::{Error, Result};
use crate::model::{Node, PortDesc};
use crate::shape::PartialShape;

use super::{OpAttributes, OpKind};

/// Shape-inference view of an operation, built from a node's attributes.
pub trait Operator: Send + Sync + Debug {
    fn op_kind(&self) -> OpKind;

    /// Typed attributes handed to kernels.
    fn attributes(&self) -> OpAttributes;

    /// Infer output shapes
    fn output_shapes(&self, input_shapes: &[PartialShape]) -> Result<Vec<PartialShape>>;

    /// Infer full output port descriptors. Defaults to the precision and
    /// format of the first input.
    fn output_ports(&self, inputs: &[PortDesc]) -> Result<Vec<PortDesc>> {
        let shapes: Vec<PartialShape> = inputs.iter().map(|p| p.shape.clone()).collect();
        let first = inputs.first().ok_or_else(|| {
            Error::ValidationError(format!("{} requires at least one input", self.op_kind()))
        })?;
        Ok(self
            .output_shapes(&shapes)?
            .into_iter()
            .map(|shape| PortDesc::new(shape, first.data_type).with_format(first.format))
            .collect())
    }
}

type OperatorFactory = fn(&Node) -> Result<Box<dyn Operator>>;

/// Registry mapping op type names to operator factories
#[derive(Default)]
pub struct OperatorRegistry {
    factories: HashMap<String, (OpKind, OperatorFactory)>,
}

impl Debug for OperatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("OperatorRegistry").field("operators", &names).finish()
    }
}

impl OperatorRegistry {
    /// Create a new operator registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register an operator
    pub fn register_operator(&mut self, op_type: &str, kind: OpKind, factory: OperatorFactory) -> Result<()> {
        if self.factories.contains_key(op_type) {
            return Err(Error::ConfigurationError(format!(
                "Operator {} is already registered",
                op_type
            )));
        }
        self.factories.insert(op_type.to_string(), (kind, factory));
        Ok(())
    }

    pub fn op_kind(&self, op_type: &str) -> Option<OpKind> {
        self.factories.get(op_type).map(|(kind, _)| *kind)
    }

    /// Initialize the registry with the built-in operators
    pub fn initialize_standard_operators() -> Self {
        use super::broadcast::Broadcast;
        use super::gather_tree::GatherTree;
        use super::matrix_nms::MatrixNms;
        use super::pad::Pad;
        use super::reorder::Reorder;

        let builtin: [(&str, OpKind, OperatorFactory); 5] = [
            ("GatherTree", OpKind::GatherTree, |n| Ok(Box::new(GatherTree::from_node(n)?))),
            ("Pad", OpKind::Pad, |n| Ok(Box::new(Pad::from_node(n)?))),
            ("Broadcast", OpKind::Broadcast, |n| Ok(Box::new(Broadcast::from_node(n)?))),
            ("Reorder", OpKind::Reorder, |n| Ok(Box::new(Reorder::from_node(n)?))),
            ("MatrixNms", OpKind::MatrixNms, |n| Ok(Box::new(MatrixNms::from_node(n)?))),
        ];

        let mut registry = Self::new();
        for (name, kind, factory) in builtin {
            registry.factories.insert(name.to_string(), (kind, factory));
        }
        registry
    }

    /// Create an operator for a node
    pub fn create_operator_for_node(&self, node: &Node) -> Result<Box<dyn Operator>> {
        match self.factories.get(&node.op_type) {
            Some((_, factory)) => factory(node),
            None => Err(Error::UnsupportedOperation(format!(
                "Operator {} not found in registry",
                node.op_type
            ))),
        }
    }

    /// Run shape inference for a node and fill its output ports.
    pub fn infer_node(&self, node: &mut Node) -> Result<()> {
        let op = self.create_operator_for_node(node)?;
        node.outputs = op.output_ports(&node.inputs)?;
        Ok(())
    }
}

/// Fail with a `ValidationError` unless `count` is within `[min, max]`.
pub(crate) fn check_input_count(kind: OpKind, count: usize, min: usize, max: usize) -> Result<()> {
    if count < min || count > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{}..={}", min, max)
        };
        return Err(Error::ValidationError(format!(
            "{} expects {} inputs, got {}",
            kind, expected, count
        )));
    }
    Ok(())
}

/// Merge `src` into `dst` or fail with a message naming both shapes.
pub(crate) fn merge_or_fail(
    kind: OpKind,
    what: &str,
    dst: &mut PartialShape,
    src: &PartialShape,
) -> Result<()> {
    let before = dst.clone();
    if !PartialShape::merge_into(dst, src) {
        return Err(Error::ValidationError(format!(
            "{}: {} are not compatible: {} vs {}",
            kind, what, before, src
        )));
    }
    Ok(())
}

/// Require `shape` to be compatible with `rank`.
pub(crate) fn check_rank(kind: OpKind, what: &str, shape: &PartialShape, rank: usize) -> Result<()> {
    if !shape.rank_compatible(rank) {
        return Err(Error::ValidationError(format!(
            "{}: {} must have rank {}, got {}",
            kind, what, rank, shape
        )));
    }
    Ok(())
}
