use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::layout::MemoryFormat;
use crate::ops::tensor::{DataType, Tensor};
use crate::shape::PartialShape;

/// Unique identifier for a node in the graph
pub type NodeId = usize;

/// Node attribute
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Float(f32),
    Int(i64),
    String(String),

    // List types
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    Strings(Vec<String>),
}

/// Descriptor of one input or output port of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct PortDesc {
    pub shape: PartialShape,
    pub data_type: DataType,
    pub format: MemoryFormat,
    /// Value known at compile time, if the port is fed by a constant
    pub constant: Option<Arc<Tensor>>,
}

impl PortDesc {
    pub fn new(shape: PartialShape, data_type: DataType) -> Self {
        Self {
            shape,
            data_type,
            format: MemoryFormat::Ncsp,
            constant: None,
        }
    }

    pub fn with_format(mut self, format: MemoryFormat) -> Self {
        self.format = format;
        self
    }

    /// Port fed by a constant tensor; shape, type and format come from it.
    pub fn constant(tensor: Tensor) -> Self {
        Self {
            shape: tensor.desc().partial_shape(),
            data_type: tensor.data_type(),
            format: tensor.format(),
            constant: Some(Arc::new(tensor)),
        }
    }
}

/// Node in the computation graph
///
/// Only the parts consumed by shape inference and kernel selection are
/// modelled: attributes, input ports and the output slots filled by shape
/// inference.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub op_type: String,
    pub attributes: HashMap<String, Attribute>,
    pub inputs: Vec<PortDesc>,
    pub outputs: Vec<PortDesc>,
}

impl Node {
    pub fn new(id: NodeId, name: &str, op_type: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            op_type: op_type.to_string(),
            attributes: HashMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: Attribute) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    pub fn with_input(mut self, port: PortDesc) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn input_shapes(&self) -> Vec<PartialShape> {
        self.inputs.iter().map(|p| p.shape.clone()).collect()
    }

    /// Constant tensor feeding input `index`, if any.
    pub fn constant_input(&self, index: usize) -> Option<&Tensor> {
        self.inputs
            .get(index)
            .and_then(|p| p.constant.as_deref())
    }

    pub fn get_int(&self, name: &str) -> Result<Option<i64>> {
        match self.attributes.get(name) {
            None => Ok(None),
            Some(Attribute::Int(v)) => Ok(Some(*v)),
            Some(other) => Err(self.attribute_type_error(name, "int", other)),
        }
    }

    pub fn get_float(&self, name: &str) -> Result<Option<f32>> {
        match self.attributes.get(name) {
            None => Ok(None),
            Some(Attribute::Float(v)) => Ok(Some(*v)),
            Some(Attribute::Int(v)) => Ok(Some(*v as f32)),
            Some(other) => Err(self.attribute_type_error(name, "float", other)),
        }
    }

    pub fn get_string(&self, name: &str) -> Result<Option<&str>> {
        match self.attributes.get(name) {
            None => Ok(None),
            Some(Attribute::String(v)) => Ok(Some(v.as_str())),
            Some(other) => Err(self.attribute_type_error(name, "string", other)),
        }
    }

    pub fn get_ints(&self, name: &str) -> Result<Option<&[i64]>> {
        match self.attributes.get(name) {
            None => Ok(None),
            Some(Attribute::Ints(v)) => Ok(Some(v.as_slice())),
            Some(other) => Err(self.attribute_type_error(name, "ints", other)),
        }
    }

    pub fn get_floats(&self, name: &str) -> Result<Option<&[f32]>> {
        match self.attributes.get(name) {
            None => Ok(None),
            Some(Attribute::Floats(v)) => Ok(Some(v.as_slice())),
            Some(other) => Err(self.attribute_type_error(name, "floats", other)),
        }
    }

    /// Boolean attributes are stored as ints.
    pub fn get_bool(&self, name: &str) -> Result<Option<bool>> {
        Ok(self.get_int(name)?.map(|v| v != 0))
    }

    fn attribute_type_error(&self, name: &str, expected: &str, got: &Attribute) -> Error {
        Error::ValidationError(format!(
            "{} '{}': attribute '{}' should be {}, got {:?}",
            self.op_type, self.name, name, expected, got
        ))
    }
}
