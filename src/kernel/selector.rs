//! Binding a node to one kernel.
//!
//! Candidates are the registrations matching the node's op kind,
//! precision, format and shape mode that accept the parameters and whose
//! format the device supports. They are ordered by key specificity, then
//! optimized before reference, then registration order. A tuning cache hit
//! wins when it names one of the candidates; otherwise the first candidate
//! is taken, and the op kind's fallback when there is none.

use std::sync::Arc;

use log::{debug, warn};
use strum_macros::Display;

use crate::error::{Error, Result};
use crate::execution::context::{ExecutionOptions, TuningMode};

use super::device::DeviceInfo;
use super::params::{KernelParams, ShapeMode};
use super::registry::{KernelEntry, KernelRegistry};
use super::tuning_cache::TuningCache;
use super::Kernel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SelectionSource {
    /// Named by the tuning cache
    Tuned,
    /// Best registered candidate
    Heuristic,
    /// Reference fallback, nothing else matched
    Fallback,
}

#[derive(Debug, Clone)]
pub struct SelectedKernel {
    pub kernel: Arc<dyn Kernel>,
    pub config_index: usize,
    pub source: SelectionSource,
}

impl SelectedKernel {
    pub fn name(&self) -> &str {
        self.kernel.name()
    }
}

#[derive(Debug, Clone)]
pub struct KernelSelector {
    registry: Arc<KernelRegistry>,
    cache: Option<Arc<TuningCache>>,
    tuning_mode: TuningMode,
    enable_dynamic_shapes: bool,
    allow_reference_fallback: bool,
}

impl KernelSelector {
    pub fn new(registry: Arc<KernelRegistry>, cache: Option<Arc<TuningCache>>, options: &ExecutionOptions) -> Self {
        Self {
            registry,
            cache,
            tuning_mode: options.tuning_mode,
            enable_dynamic_shapes: options.enable_dynamic_shapes,
            allow_reference_fallback: options.allow_reference_fallback,
        }
    }

    pub fn registry(&self) -> &KernelRegistry {
        &self.registry
    }

    /// Candidate kernels in dispatch order.
    pub fn candidates(&self, params: &KernelParams, device: &DeviceInfo) -> Vec<Arc<dyn Kernel>> {
        let mode = params.shape_mode();
        if mode == ShapeMode::Dynamic && !self.enable_dynamic_shapes {
            return Vec::new();
        }
        if let Some(format) = params.format() {
            if !device.supports_format(format) {
                return Vec::new();
            }
        }

        let mut entries: Vec<&KernelEntry> = self
            .registry
            .candidates(params.op_kind, params.data_type(), params.format(), mode)
            .into_iter()
            .filter(|e| e.kernel.supports(params))
            .collect();
        entries.sort_by(|a, b| {
            b.key
                .specificity()
                .cmp(&a.key.specificity())
                .then(a.kernel.is_reference().cmp(&b.kernel.is_reference()))
                .then(a.order.cmp(&b.order))
        });
        entries.into_iter().map(|e| e.kernel.clone()).collect()
    }

    pub fn select(&self, params: &KernelParams, device: &DeviceInfo) -> Result<SelectedKernel> {
        let kind = params.op_kind;
        if !self.registry.knows(kind) {
            return Err(Error::UnsupportedOperation(format!("No kernels registered for {}", kind)));
        }

        let candidates = self.candidates(params, device);
        let cache = match self.tuning_mode {
            TuningMode::Disabled => None,
            _ => self.cache.as_deref(),
        };

        if let Some(entry) = cache.and_then(|c| c.load_kernel(params, device.compute_units)) {
            match candidates.iter().find(|k| k.name() == entry.kernel_name()) {
                Some(kernel) => {
                    debug!("{}: tuned kernel {} (config {})", kind, kernel.name(), entry.config_index());
                    return Ok(SelectedKernel {
                        kernel: kernel.clone(),
                        config_index: entry.config_index(),
                        source: SelectionSource::Tuned,
                    });
                }
                None => warn!(
                    "{}: ignoring cached kernel {} that is not a valid candidate",
                    kind,
                    entry.kernel_name()
                ),
            }
        }

        if let Some(kernel) = candidates.first() {
            debug!(
                "{}: selected {} out of {} candidates",
                kind,
                kernel.name(),
                candidates.len()
            );
            if let (Some(cache), TuningMode::UseAndUpdate) = (cache, self.tuning_mode) {
                cache.store_kernel(params, device.compute_units, kernel.name(), 0);
            }
            return Ok(SelectedKernel {
                kernel: kernel.clone(),
                config_index: 0,
                source: SelectionSource::Heuristic,
            });
        }

        if !self.allow_reference_fallback {
            return Err(Error::UnsupportedOperation(format!(
                "No kernel for {} ({:?}/{:?}, {}) and reference fallback is disabled",
                kind,
                params.data_type(),
                params.format(),
                params.shape_mode()
            )));
        }
        match self.registry.fallback(kind) {
            Some(kernel) => {
                warn!(
                    "{}: no kernel for {:?}/{:?} ({}), using fallback {}",
                    kind,
                    params.data_type(),
                    params.format(),
                    params.shape_mode(),
                    kernel.name()
                );
                Ok(SelectedKernel {
                    kernel,
                    config_index: 0,
                    source: SelectionSource::Fallback,
                })
            }
            None => Err(Error::UnsupportedOperation(format!("No kernel or fallback for {}", kind))),
        }
    }
}
