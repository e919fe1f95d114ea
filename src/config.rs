//! Configuration loading and schema definitions for polarion-sync.
//!
//! Configuration is assembled by a [`ConfigPipeline`] from a TOML file,
//! `POLARION_SYNC_*` environment variables and command-line overrides, then
//! validated. The resulting [`Config`] is passed by reference to the
//! transformer and exporter.

pub mod pipeline;
pub mod schema;

pub use pipeline::{ConfigPipeline, ConfigStage, Overrides, validate};
pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result};

/// Loads configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read (e.g., doesn't exist or permission denied)
/// - The file contains invalid TOML syntax
/// - The configuration doesn't match the expected schema
///
/// # Example
///
/// ```no_run
/// use polarion_sync::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("polarion-sync.toml"))?;
/// println!("Project: {}", config.polarion.project_id);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Loads configuration from a TOML string.
///
/// # Example
///
/// ```
/// use polarion_sync::config::load_config_str;
///
/// let config = load_config_str(r#"
///     [polarion]
///     project_id = "RHEL6"
///
///     [testcases]
///     prefix = "RHSM-TC : "
/// "#)?;
///
/// assert_eq!(config.testcases.prefix, "RHSM-TC : ");
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    Ok(config)
}
