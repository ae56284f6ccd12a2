//! Configuration System
//!
//! Layered configuration: built-in defaults, the global config file, workspace
//! config files and `STRATA__SECTION__KEY` environment variables, in increasing
//! precedence.

use crate::logging::LoggingConfig;
use crate::reconcile::DEFAULT_TRACKED_PROPERTIES;
use crate::roots::ContentRoot;
use crate::tree::path::VPath;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrataConfig {
    /// Content roots, relative to the workspace root
    #[serde(default)]
    pub roots: Vec<RootConfig>,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub properties: PropertyConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A configured content root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootConfig {
    pub path: String,
    /// Display name; defaults to the last path segment
    #[serde(default)]
    pub name: Option<String>,
}

impl RootConfig {
    pub fn to_content_root(&self) -> ContentRoot {
        match &self.name {
            Some(name) => ContentRoot::new(VPath::new(&self.path), name.clone()),
            None => ContentRoot::at(&self.path),
        }
    }
}

/// Path filter rules (built-in ignores are always added)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Glob patterns matched against full paths and single segments
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// File extensions never tracked, with or without the leading dot
    #[serde(default)]
    pub ignored_extensions: Vec<String>,
}

/// Properties recorded on entries when they change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyConfig {
    #[serde(default = "default_tracked_properties")]
    pub tracked: Vec<String>,
}

fn default_tracked_properties() -> Vec<String> {
    DEFAULT_TRACKED_PROPERTIES
        .iter()
        .map(|p| p.to_string())
        .collect()
}

impl Default for PropertyConfig {
    fn default() -> Self {
        Self {
            tracked: default_tracked_properties(),
        }
    }
}

/// Storage paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Versioned tree database; relative paths are resolved against the workspace root
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".strata/store")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
        }
    }
}

impl StorageConfig {
    pub fn resolve_store_path(&self, workspace_root: &Path) -> PathBuf {
        if self.store_path.is_absolute() {
            self.store_path.clone()
        } else {
            workspace_root.join(&self.store_path)
        }
    }
}

/// Watch mode settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_batch_window_ms() -> u64 {
    50
}

fn default_max_batch_size() -> usize {
    100
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            batch_window_ms: default_batch_window_ms(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl WatchConfig {
    pub fn for_workspace(&self, workspace_root: PathBuf) -> crate::watch::WatchConfig {
        crate::watch::WatchConfig {
            workspace_root,
            batch_window_ms: self.batch_window_ms,
            max_batch_size: self.max_batch_size,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Root(String, String),
    Filter(String, String),
    Property(String),
    Storage(String),
    Watch(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Root(path, msg) => write!(f, "Root '{}': {}", path, msg),
            ValidationError::Filter(pattern, msg) => write!(f, "Filter '{}': {}", pattern, msg),
            ValidationError::Property(msg) => write!(f, "Properties: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Watch(msg) => write!(f, "Watch: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl StrataConfig {
    /// Validate the entire configuration, collecting every problem
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let mut seen = HashSet::new();
        for root in &self.roots {
            let path = Path::new(&root.path);
            if path.is_absolute() {
                errors.push(ValidationError::Root(
                    root.path.clone(),
                    "must be relative to the workspace root".to_string(),
                ));
            }
            if root.path.split(['/', '\\']).any(|segment| segment == "..") {
                errors.push(ValidationError::Root(
                    root.path.clone(),
                    "must not leave the workspace root".to_string(),
                ));
            }
            if !seen.insert(VPath::new(&root.path)) {
                errors.push(ValidationError::Root(
                    root.path.clone(),
                    "configured more than once".to_string(),
                ));
            }
        }

        for pattern in &self.filter.ignore_patterns {
            if let Err(e) = globset::Glob::new(pattern) {
                errors.push(ValidationError::Filter(pattern.clone(), e.to_string()));
            }
        }

        if self.properties.tracked.iter().any(|p| p.trim().is_empty()) {
            errors.push(ValidationError::Property(
                "tracked property names cannot be empty".to_string(),
            ));
        }

        if self.storage.store_path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "Store path cannot be empty".to_string(),
            ));
        }

        if self.watch.max_batch_size == 0 {
            errors.push(ValidationError::Watch(
                "max_batch_size must be at least 1".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Content roots in effect; the workspace root alone when none are configured.
    pub fn effective_roots(&self) -> Vec<ContentRoot> {
        if self.roots.is_empty() {
            return vec![ContentRoot::at("")];
        }
        self.roots.iter().map(RootConfig::to_content_root).collect()
    }
}
