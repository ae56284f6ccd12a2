//! Per-workspace config files under `<workspace>/config/`

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};
use std::path::{Path, PathBuf};

/// Selects `config/{name}.toml` on top of the base file.
pub const ENV_VAR: &str = "STRATA_ENV";
const DEFAULT_ENV: &str = "development";

/// Existing workspace config files, lowest precedence first.
pub fn workspace_config_files(workspace_root: &Path) -> Vec<PathBuf> {
    let config_dir = workspace_root.join("config");
    let env_name = std::env::var(ENV_VAR).unwrap_or_else(|_| DEFAULT_ENV.to_string());

    [
        config_dir.join("config.toml"),
        config_dir.join(format!("{}.toml", env_name)),
    ]
    .into_iter()
    .filter(|path| path.is_file())
    .collect()
}

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(workspace_config_files(workspace_root)
        .into_iter()
        .fold(builder, |builder, path| {
            builder.add_source(File::from(path).required(false))
        }))
}
