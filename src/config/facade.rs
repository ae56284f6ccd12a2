//! Config loading entry points.

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::StrataConfig;
use config::{ConfigError, Environment, File};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "STRATA";
const ENV_SEPARATOR: &str = "__";

/// Loads [`StrataConfig`] from layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence (lowest to highest): defaults, global file, workspace files,
    /// `STRATA__SECTION__KEY` environment variables.
    pub fn load(workspace_root: &Path) -> Result<StrataConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        builder
            .add_source(environment())
            .build()?
            .try_deserialize()
    }

    /// Load configuration from one explicit file; global and workspace files are skipped.
    pub fn load_from_file(path: &Path) -> Result<StrataConfig, ConfigError> {
        merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .add_source(environment())
            .build()?
            .try_deserialize()
    }

    /// Path of the global config file, if a home directory is known.
    pub fn xdg_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}
