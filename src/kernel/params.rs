use std::fmt::Write;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::layout::MemoryFormat;
use crate::model::PortDesc;
use crate::ops::tensor::DataType;
use crate::ops::{OpAttributes, OpKind};

/// Whether a node's shapes are all known at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum ShapeMode {
    Static,
    Dynamic,
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(text: &str) -> u64 {
    text.bytes()
        .fold(FNV_OFFSET, |hash, b| (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME))
}

/// Everything the selector knows about a node when picking a kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelParams {
    pub op_kind: OpKind,
    pub attributes: OpAttributes,
    pub inputs: Vec<PortDesc>,
    pub outputs: Vec<PortDesc>,
}

impl KernelParams {
    pub fn new(attributes: OpAttributes, inputs: Vec<PortDesc>, outputs: Vec<PortDesc>) -> Self {
        Self {
            op_kind: attributes.kind(),
            attributes,
            inputs,
            outputs,
        }
    }

    pub fn shape_mode(&self) -> ShapeMode {
        if self.inputs.iter().chain(&self.outputs).all(|p| p.shape.is_static()) {
            ShapeMode::Static
        } else {
            ShapeMode::Dynamic
        }
    }

    /// Precision of the primary input.
    pub fn data_type(&self) -> Option<DataType> {
        self.inputs.first().map(|p| p.data_type)
    }

    /// Memory format of the primary input.
    pub fn format(&self) -> Option<MemoryFormat> {
        self.inputs.first().map(|p| p.format)
    }

    fn write_ports(out: &mut String, tag: &str, ports: &[PortDesc]) {
        for (i, p) in ports.iter().enumerate() {
            let _ = write!(out, ";{}{}={}:{}:{}", tag, i, p.data_type, p.format, p.shape);
        }
    }

    /// Canonical text of the full parameter set: op kind, attributes and
    /// every port.
    pub fn normalized(&self) -> String {
        let mut out = format!("{};{:?}", self.op_kind, self.attributes);
        Self::write_ports(&mut out, "in", &self.inputs);
        Self::write_ports(&mut out, "out", &self.outputs);
        out
    }

    /// Legacy cache key: op kind and input ports only.
    pub fn hash_v1(&self) -> u64 {
        let mut text = self.op_kind.to_string();
        Self::write_ports(&mut text, "in", &self.inputs);
        fnv1a(&text)
    }

    /// Current cache key over the normalized parameters.
    pub fn hash_v2(&self) -> u64 {
        fnv1a(&self.normalized())
    }
}
