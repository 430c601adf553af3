use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::error::{Error, Result};
use crate::layout::MemoryFormat;
use crate::ops::tensor::DataType;
use crate::ops::OpKind;

use super::params::ShapeMode;
use super::Kernel;

/// Registration key. `None` is a wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelKey {
    pub op_kind: OpKind,
    pub data_type: Option<DataType>,
    pub format: Option<MemoryFormat>,
    pub shape_mode: ShapeMode,
}

impl KernelKey {
    pub fn new(
        op_kind: OpKind,
        data_type: Option<DataType>,
        format: Option<MemoryFormat>,
        shape_mode: ShapeMode,
    ) -> Self {
        Self {
            op_kind,
            data_type,
            format,
            shape_mode,
        }
    }

    /// 2 for an exact tuple, 1 with one wildcard, 0 with two.
    pub fn specificity(&self) -> u8 {
        u8::from(self.data_type.is_some()) + u8::from(self.format.is_some())
    }

    fn matches(&self, data_type: Option<DataType>, format: Option<MemoryFormat>) -> bool {
        fits(self.data_type, data_type) && fits(self.format, format)
    }
}

fn fits<T: PartialEq>(want: Option<T>, have: Option<T>) -> bool {
    want.is_none() || want == have
}

/// A kernel registered under one key.
#[derive(Debug, Clone)]
pub struct KernelEntry {
    pub key: KernelKey,
    pub kernel: Arc<dyn Kernel>,
    /// Registration order, the last tie breaker
    pub order: usize,
}

/// Typed map from `(op kind, precision, format, shape mode)` to kernels.
/// Filled once at engine start and read-only afterwards.
#[derive(Default)]
pub struct KernelRegistry {
    entries: Vec<KernelEntry>,
    fallbacks: HashMap<OpKind, Arc<dyn Kernel>>,
}

impl fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fallbacks: Vec<(String, &str)> = self
            .fallbacks
            .iter()
            .map(|(kind, k)| (kind.to_string(), k.name()))
            .collect();
        fallbacks.sort();
        f.debug_struct("KernelRegistry")
            .field("entries", &self.entries.len())
            .field("fallbacks", &fallbacks)
            .finish()
    }
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: KernelKey, kernel: Arc<dyn Kernel>) -> Result<()> {
        if kernel.op_kind() != key.op_kind {
            return Err(Error::ConfigurationError(format!(
                "Kernel {} implements {}, cannot register it for {}",
                kernel.name(),
                kernel.op_kind(),
                key.op_kind
            )));
        }
        if self
            .entries
            .iter()
            .any(|e| e.key == key && e.kernel.name() == kernel.name())
        {
            return Err(Error::ConfigurationError(format!(
                "Kernel {} is already registered for {:?}",
                kernel.name(),
                key
            )));
        }
        debug!("Registered kernel {} for {:?}", kernel.name(), key);
        let order = self.entries.len();
        self.entries.push(KernelEntry { key, kernel, order });
        Ok(())
    }

    /// Register for every `(precision, format)` pair in each shape mode.
    pub fn register_for_types(
        &mut self,
        kernel: Arc<dyn Kernel>,
        types: &[(DataType, MemoryFormat)],
        modes: &[ShapeMode],
    ) -> Result<()> {
        for &mode in modes {
            for &(dt, format) in types {
                let key = KernelKey::new(kernel.op_kind(), Some(dt), Some(format), mode);
                self.register(key, kernel.clone())?;
            }
        }
        Ok(())
    }

    /// Register with both wildcards in each shape mode.
    pub fn register_any(&mut self, kernel: Arc<dyn Kernel>, modes: &[ShapeMode]) -> Result<()> {
        for &mode in modes {
            self.register(KernelKey::new(kernel.op_kind(), None, None, mode), kernel.clone())?;
        }
        Ok(())
    }

    /// Designate the kernel returned when nothing else matches.
    pub fn set_fallback(&mut self, kernel: Arc<dyn Kernel>) -> Result<()> {
        let kind = kernel.op_kind();
        if let Some(existing) = self.fallbacks.get(&kind) {
            return Err(Error::ConfigurationError(format!(
                "{} already has fallback kernel {}",
                kind,
                existing.name()
            )));
        }
        self.fallbacks.insert(kind, kernel);
        Ok(())
    }

    /// Entries matching the request, one per kernel name at its most
    /// specific key, in registration order.
    pub fn candidates(
        &self,
        op_kind: OpKind,
        data_type: Option<DataType>,
        format: Option<MemoryFormat>,
        shape_mode: ShapeMode,
    ) -> Vec<&KernelEntry> {
        let mut best: Vec<&KernelEntry> = Vec::new();
        for entry in self.entries.iter().filter(|e| {
            e.key.op_kind == op_kind && e.key.shape_mode == shape_mode && e.key.matches(data_type, format)
        }) {
            match best.iter_mut().find(|b| b.kernel.name() == entry.kernel.name()) {
                Some(b) if b.key.specificity() < entry.key.specificity() => *b = entry,
                Some(_) => {}
                None => best.push(entry),
            }
        }
        best
    }

    pub fn fallback(&self, op_kind: OpKind) -> Option<Arc<dyn Kernel>> {
        self.fallbacks.get(&op_kind).cloned()
    }

    pub fn find_by_name(&self, op_kind: OpKind, name: &str) -> Option<Arc<dyn Kernel>> {
        self.entries
            .iter()
            .map(|e| &e.kernel)
            .chain(self.fallbacks.get(&op_kind))
            .find(|k| k.op_kind() == op_kind && k.name() == name)
            .cloned()
    }

    /// Whether any kernel exists for the op kind.
    pub fn knows(&self, op_kind: OpKind) -> bool {
        self.fallbacks.contains_key(&op_kind) || self.entries.iter().any(|e| e.key.op_kind == op_kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
