//! Merge rules: defaults, override order, conflict handling.
//!
//! Later sources win: defaults < global file < project file < environment.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

use crate::config::DEFAULT_ENDPOINT;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("endpoint", DEFAULT_ENDPOINT)?
        .set_default("exporter.batch_size", 256_i64)?
        .set_default("exporter.max_wait_ms", 5000_i64)?
        .set_default("exporter.max_attempts", 3_i64)?
        .set_default("exporter.base_delay_ms", 1000_i64)?
        .set_default("exporter.queue_capacity", 512_i64)
}
