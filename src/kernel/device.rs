use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumString};

use crate::layout::MemoryFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

/// Target device of a compiled node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: u32,
    pub kind: DeviceKind,
    /// Part of the tuning cache key
    pub compute_units: u32,
    pub supported_formats: Vec<MemoryFormat>,
}

impl DeviceInfo {
    /// Device supporting every memory format.
    pub fn new(id: u32, kind: DeviceKind, compute_units: u32) -> Self {
        Self {
            id,
            kind,
            compute_units,
            supported_formats: MemoryFormat::iter().collect(),
        }
    }

    /// The host CPU, one compute unit per worker thread of the global pool.
    pub fn cpu() -> Self {
        let units = u32::try_from(rayon::current_num_threads()).unwrap_or(u32::MAX);
        Self::new(0, DeviceKind::Cpu, units)
    }

    pub fn with_formats(mut self, formats: Vec<MemoryFormat>) -> Self {
        self.supported_formats = formats;
        self
    }

    pub fn supports_format(&self, format: MemoryFormat) -> bool {
        self.supported_formats.contains(&format)
    }
}
