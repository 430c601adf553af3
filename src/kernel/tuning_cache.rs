//! Persisted kernel choices.
//!
//! The cache maps a hash of the kernel parameters and the device's compute
//! unit count to a `(kernel name, config index)` pair. Entries are advisory:
//! the selector ignores a hit that does not name a valid candidate.
//!
//! Two document versions exist. Version 2 keys entries by op kind and a
//! hash over all parameters; version 1 only hashes the op kind and inputs.
//! A version 1 hit is moved into version 2 and marks the cache as needing
//! a save.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

use super::params::KernelParams;

const VERSION_1: &str = "version_1";
const VERSION_2: &str = "version_2";

/// `(kernel name, config index)`, stored as a two-element JSON array.
/// A negative index stands for the kernel's default config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry(pub String, pub i64);

impl CacheEntry {
    pub fn kernel_name(&self) -> &str {
        &self.0
    }

    pub fn is_default_config(&self) -> bool {
        self.1 < 0
    }

    /// Config index to plan with; the default config is index 0.
    pub fn config_index(&self) -> usize {
        usize::try_from(self.1).unwrap_or(0)
    }
}

type V1Map = BTreeMap<String, BTreeMap<String, CacheEntry>>;
type V2Map = BTreeMap<String, BTreeMap<String, BTreeMap<String, CacheEntry>>>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheDocument {
    #[serde(rename = "version_2", default, skip_serializing_if = "BTreeMap::is_empty")]
    v2: V2Map,
    #[serde(rename = "version_1", default, skip_serializing_if = "BTreeMap::is_empty")]
    v1: V1Map,
}

#[derive(Debug, Default)]
struct CacheState {
    doc: CacheDocument,
    needs_save: bool,
}

#[derive(Debug, Default)]
pub struct TuningCache {
    path: Option<PathBuf>,
    state: Mutex<CacheState>,
}

impl TuningCache {
    /// Empty in-memory cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a cache file; a missing file gives an empty cache that saves to
    /// the same path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut cache = if path.exists() {
            let text = fs::read_to_string(path)?;
            let cache = Self::from_json_str(&text)?;
            info!("Loaded tuning cache {} ({} entries)", path.display(), cache.len());
            cache
        } else {
            info!("Tuning cache {} does not exist, starting empty", path.display());
            Self::new()
        };
        cache.path = Some(path.to_path_buf());
        Ok(cache)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let is_versioned = value
            .as_object()
            .map_or(false, |o| o.contains_key(VERSION_1) || o.contains_key(VERSION_2));
        let state = if is_versioned {
            CacheState {
                doc: serde_json::from_value(value)?,
                needs_save: false,
            }
        } else {
            // legacy layout: compute units -> hash -> entry
            CacheState {
                doc: CacheDocument {
                    v2: BTreeMap::new(),
                    v1: serde_json::from_value(value)?,
                },
                needs_save: true,
            }
        };
        Ok(Self {
            path: None,
            state: Mutex::new(state),
        })
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.lock().doc)?)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached choice for the parameters, migrating a version 1 hit.
    pub fn load_kernel(&self, params: &KernelParams, compute_units: u32) -> Option<CacheEntry> {
        let units = compute_units.to_string();
        let kind = params.op_kind.to_string();
        let v2_hash = params.hash_v2().to_string();
        let mut state = self.lock();

        if let Some(entry) = state
            .doc
            .v2
            .get(&units)
            .and_then(|kinds| kinds.get(&kind))
            .and_then(|hashes| hashes.get(&v2_hash))
        {
            return Some(entry.clone());
        }

        let v1_hash = params.hash_v1().to_string();
        let entry = state.doc.v1.get_mut(&units)?.remove(&v1_hash)?;
        if state.doc.v1.get(&units).map_or(false, BTreeMap::is_empty) {
            state.doc.v1.remove(&units);
        }
        debug!("Migrated tuning cache entry {} for {} to version 2", v1_hash, kind);
        state
            .doc
            .v2
            .entry(units)
            .or_default()
            .entry(kind)
            .or_default()
            .insert(v2_hash, entry.clone());
        state.needs_save = true;
        Some(entry)
    }

    pub fn store_kernel(&self, params: &KernelParams, compute_units: u32, kernel_name: &str, config_index: usize) {
        let mut state = self.lock();
        state
            .doc
            .v2
            .entry(compute_units.to_string())
            .or_default()
            .entry(params.op_kind.to_string())
            .or_default()
            .insert(
                params.hash_v2().to_string(),
                CacheEntry(kernel_name.to_string(), i64::try_from(config_index).unwrap_or(i64::MAX)),
            );
        state.needs_save = true;
    }

    /// Drop the entry for the parameters from both versions.
    pub fn remove_kernel(&self, params: &KernelParams, compute_units: u32) -> bool {
        let units = compute_units.to_string();
        let kind = params.op_kind.to_string();
        let mut state = self.lock();

        let mut removed = false;
        if let Some(kinds) = state.doc.v2.get_mut(&units) {
            if let Some(hashes) = kinds.get_mut(&kind) {
                removed |= hashes.remove(&params.hash_v2().to_string()).is_some();
                if hashes.is_empty() {
                    kinds.remove(&kind);
                }
            }
            if kinds.is_empty() {
                state.doc.v2.remove(&units);
            }
        }
        if let Some(hashes) = state.doc.v1.get_mut(&units) {
            removed |= hashes.remove(&params.hash_v1().to_string()).is_some();
            if hashes.is_empty() {
                state.doc.v1.remove(&units);
            }
        }
        if removed {
            state.needs_save = true;
        }
        removed
    }

    pub fn needs_save(&self) -> bool {
        self.lock().needs_save
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write back to the file the cache was loaded from.
    pub fn save(&self) -> Result<()> {
        match &self.path {
            Some(path) => self.save_to(path),
            None => Err(Error::ConfigurationError(
                "Tuning cache has no file to save to".to_string(),
            )),
        }
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut state = self.lock();
        let text = serde_json::to_string_pretty(&state.doc)?;
        fs::write(path.as_ref(), text)?;
        state.needs_save = false;
        info!("Saved tuning cache to {}", path.as_ref().display());
        Ok(())
    }

    /// Number of entries over both versions.
    pub fn len(&self) -> usize {
        let state = self.lock();
        let v2: usize = state.doc.v2.values().flat_map(|k| k.values()).map(BTreeMap::len).sum();
        let v1: usize = state.doc.v1.values().map(BTreeMap::len).sum();
        v1 + v2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
