use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::{Error, Result};

/// How the selector uses the tuning cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TuningMode {
    /// Never consult the cache
    Disabled,
    /// Use cached selections, never record new ones
    UseExisting,
    /// Use cached selections and record heuristic picks on a miss
    UseAndUpdate,
}

impl Default for TuningMode {
    fn default() -> Self {
        TuningMode::UseExisting
    }
}

/// Options for the inference engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    /// Number of worker threads (0 = use rayon's global pool)
    pub thread_count: usize,
    pub tuning_mode: TuningMode,
    /// Tuning cache file; no cache when unset
    pub tuning_cache_path: Option<PathBuf>,
    /// Consult kernels registered for dynamic shapes
    pub enable_dynamic_shapes: bool,
    /// Fall back to reference kernels when nothing else matches
    pub allow_reference_fallback: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            thread_count: 0,
            tuning_mode: TuningMode::default(),
            tuning_cache_path: None,
            enable_dynamic_shapes: true,
            allow_reference_fallback: true,
        }
    }
}

impl ExecutionOptions {
    /// Create a new execution options object
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from a JSON file; missing fields keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let options = serde_json::from_str(&text)?;
        info!("Loaded execution options from {}", path.as_ref().display());
        Ok(options)
    }

    /// Set the number of threads to use
    pub fn set_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    pub fn set_tuning_mode(mut self, mode: TuningMode) -> Self {
        self.tuning_mode = mode;
        self
    }

    pub fn set_tuning_cache_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.tuning_cache_path = Some(path.into());
        self
    }

    /// Enable or disable kernels registered for dynamic shapes
    pub fn enable_dynamic_shapes(mut self, enable: bool) -> Self {
        self.enable_dynamic_shapes = enable;
        self
    }

    /// Enable or disable the reference fallback
    pub fn allow_reference_fallback(mut self, allow: bool) -> Self {
        self.allow_reference_fallback = allow;
        self
    }
}

/// Runtime resources shared by all executors of one engine
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    options: ExecutionOptions,
    /// Thread pool for parallel execution
    thread_pool: Option<Arc<rayon::ThreadPool>>,
}

impl ExecutionContext {
    /// Create a new execution context
    pub fn new(options: ExecutionOptions) -> Result<Self> {
        // Create thread pool if thread count is specified
        let thread_pool = if options.thread_count > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(options.thread_count)
                .thread_name(|i| format!("infer-worker-{}", i))
                .build()
                .map_err(|e| Error::ConfigurationError(format!("Failed to build thread pool: {}", e)))?;
            Some(Arc::new(pool))
        } else {
            None
        };

        Ok(Self { options, thread_pool })
    }

    /// Get execution options
    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Get thread pool
    pub fn thread_pool(&self) -> Option<&rayon::ThreadPool> {
        self.thread_pool.as_deref()
    }

    /// Worker threads available to executors
    pub fn num_threads(&self) -> usize {
        match &self.thread_pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Run `op` on the configured pool, or on the global pool.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.thread_pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            options: ExecutionOptions::default(),
            thread_pool: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_options_builder_and_json() {
        let options = ExecutionOptions::new()
            .set_thread_count(2)
            .set_tuning_mode(TuningMode::UseAndUpdate)
            .enable_dynamic_shapes(false);
        assert_eq!(options.thread_count, 2);
        assert!(!options.enable_dynamic_shapes);
        assert!(options.allow_reference_fallback);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"thread_count": 3, "tuning_mode": "disabled"}}"#).unwrap();
        let loaded = ExecutionOptions::from_json_file(file.path()).unwrap();
        assert_eq!(loaded.thread_count, 3);
        assert_eq!(loaded.tuning_mode, TuningMode::Disabled);
        assert!(loaded.enable_dynamic_shapes);
        assert_eq!(loaded.tuning_cache_path, None);
    }

    #[test]
    fn test_context_pool() {
        let ctx = ExecutionContext::new(ExecutionOptions::new().set_thread_count(2)).unwrap();
        assert_eq!(ctx.num_threads(), 2);
        let inside = ctx.install(rayon::current_num_threads);
        assert_eq!(inside, 2);
        assert!(ExecutionContext::default().thread_pool().is_none());
    }
}
