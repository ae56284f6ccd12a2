//! Path Filter
//!
//! Decides whether a path is trackable at all, independent of where it lives.
//! Rules are glob patterns (matched against the full path and against every
//! segment) plus a list of ignored extensions.

use crate::error::SyncError;
use crate::tree::path::VPath;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;

/// Built-in ignore patterns, always applied by [`GlobPathFilter::from_config`].
pub const BUILTIN_IGNORES: &[&str] = &[".git", ".strata", "target", "node_modules"];

/// Trackability predicate over paths; must be pure
pub trait PathFilter: Send + Sync {
    fn is_allowed(&self, path: &VPath) -> bool;
}

/// Filter that allows every path
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl PathFilter for AllowAll {
    fn is_allowed(&self, _path: &VPath) -> bool {
        true
    }
}

/// Glob and extension based filter
#[derive(Debug, Clone)]
pub struct GlobPathFilter {
    patterns: Vec<String>,
    ignored: GlobSet,
    ignored_extensions: HashSet<String>,
}

impl GlobPathFilter {
    /// Build a filter from ignore patterns and ignored extensions (with or without the dot).
    pub fn new(
        patterns: impl IntoIterator<Item = impl AsRef<str>>,
        ignored_extensions: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self, SyncError> {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect();

        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                SyncError::ConfigError(format!("Invalid ignore pattern '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }
        let ignored = builder
            .build()
            .map_err(|e| SyncError::ConfigError(format!("Failed to build ignore set: {}", e)))?;

        let ignored_extensions = ignored_extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        Ok(Self {
            patterns,
            ignored,
            ignored_extensions,
        })
    }

    /// Filter from configuration, with [`BUILTIN_IGNORES`] prepended.
    pub fn from_config(config: &crate::config::FilterConfig) -> Result<Self, SyncError> {
        let patterns = BUILTIN_IGNORES
            .iter()
            .map(|p| p.to_string())
            .chain(config.ignore_patterns.iter().cloned());
        Self::new(patterns, &config.ignored_extensions)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    fn extension_ignored(&self, name: &str) -> bool {
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => self
                .ignored_extensions
                .contains(&ext.to_ascii_lowercase()),
            _ => false,
        }
    }
}

impl PathFilter for GlobPathFilter {
    fn is_allowed(&self, path: &VPath) -> bool {
        if path.is_root() {
            return true;
        }
        if self.ignored.is_match(path.as_str()) {
            return false;
        }
        if path
            .as_str()
            .split('/')
            .any(|segment| self.ignored.is_match(segment))
        {
            return false;
        }
        !self.extension_ignored(path.name())
    }
}
