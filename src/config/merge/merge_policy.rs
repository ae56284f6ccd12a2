//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Later sources replace values key by key; arrays are replaced whole.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("storage.store_path", ".strata/store")?
        .set_default("properties.tracked", vec!["writable", "encoding"])?
        .set_default("watch.batch_window_ms", 50)?
        .set_default("watch.max_batch_size", 100)
}
