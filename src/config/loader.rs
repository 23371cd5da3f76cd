//! Layered configuration loading.

use std::path::{Path, PathBuf};

use config::File;

use crate::config::merge::merge_policy;
use crate::config::sources::{env, global_file, project_file};
use crate::config::AgentspanConfig;
use crate::error::TelemetryError;

/// Loads [`AgentspanConfig`] from defaults, files and the environment.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a project rooted at `project_root`.
    ///
    /// Precedence (lowest to highest): defaults, global file, project files,
    /// `AGENTSPAN_*` environment variables.
    pub fn load(project_root: &Path) -> Result<AgentspanConfig, TelemetryError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = project_file::add_to_builder(builder, project_root)?;
        let builder = env::add_to_builder(builder);

        let config: AgentspanConfig = builder.build()?.try_deserialize()?;
        config.into_validated()
    }

    /// Load configuration for the current working directory.
    pub fn from_env() -> Result<AgentspanConfig, TelemetryError> {
        let cwd = std::env::current_dir().map_err(|e| {
            TelemetryError::ConfigError(format!("Failed to resolve current directory: {}", e))
        })?;
        Self::load(&cwd)
    }

    /// Load configuration from a single file on top of the defaults.
    pub fn load_from_file(path: &Path) -> Result<AgentspanConfig, TelemetryError> {
        let config: AgentspanConfig = merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .build()?
            .try_deserialize()?;
        config.into_validated()
    }

    /// Path of the user-level config file, if a home directory is known.
    pub fn xdg_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
