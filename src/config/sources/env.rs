//! Environment source: AGENTSPAN_API_KEY, AGENTSPAN_EXPORTER__BATCH_SIZE, ...

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

/// Add the `AGENTSPAN_*` environment source. Nested keys use `__`.
pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix("AGENTSPAN")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("default_tags"),
    )
}
