//! Ordered configuration stages.
//!
//! Settings are layered by running a fixed list of named stages, each taking
//! the configuration built so far and returning an updated one:
//!
//! ```text
//! Config::default()
//!   → file        (TOML file, if present)
//!   → environment (POLARION_SYNC_* variables)
//!   → cli         (command-line overrides)
//!   → validate    (required settings present)
//! ```
//!
//! Later stages win. Any stage failing aborts the pipeline.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::debug;

use super::{Config, load_config};

type StageFn = Box<dyn Fn(Config) -> Result<Config> + Send + Sync>;

/// One named step of the pipeline.
pub struct ConfigStage {
    name: String,
    apply: StageFn,
}

impl ConfigStage {
    pub fn new<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(Config) -> Result<Config> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            apply: Box::new(apply),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Runs stages in order.
#[derive(Default)]
pub struct ConfigPipeline {
    stages: Vec<ConfigStage>,
}

impl ConfigPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard pipeline: file, environment, CLI overrides, validation.
    pub fn standard(path: &Path, overrides: Overrides) -> Self {
        Self::new()
            .stage(file_stage(path))
            .stage(env_stage())
            .stage(overrides_stage(overrides))
            .stage(validate_stage())
    }

    pub fn stage(mut self, stage: ConfigStage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(ConfigStage::name).collect()
    }

    pub fn run(&self, initial: Config) -> Result<Config> {
        let mut config = initial;
        for stage in &self.stages {
            debug!("Applying configuration stage '{}'", stage.name);
            config = (stage.apply)(config)
                .with_context(|| format!("Configuration stage '{}' failed", stage.name))?;
        }
        Ok(config)
    }
}

/// Replace the configuration with the TOML file at `path`, if it exists.
pub fn file_stage(path: &Path) -> ConfigStage {
    let path: PathBuf = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref());
    ConfigStage::new("file", move |config| {
        if path.exists() {
            load_config(&path)
        } else {
            debug!("No configuration file at {}", path.display());
            Ok(config)
        }
    })
}

/// Environment variables read by [`env_stage`].
pub const ENV_VARS: &[&str] = &[
    "POLARION_SYNC_PROJECT_ID",
    "POLARION_SYNC_CONNECTOR",
    "POLARION_SYNC_RESULT_PATH",
    "POLARION_SYNC_TESTRUN_TEMPLATE",
    "POLARION_SYNC_TESTRUN_PREFIX",
    "POLARION_SYNC_TESTRUN_SUFFIX",
    "POLARION_SYNC_DISTRO_ARCH",
    "POLARION_SYNC_DISTRO_VARIANT",
];

/// Override settings from `POLARION_SYNC_*` environment variables.
pub fn env_stage() -> ConfigStage {
    env_stage_with(|key| std::env::var(key).ok())
}

/// [`env_stage`] with an injectable variable lookup.
pub fn env_stage_with<F>(lookup: F) -> ConfigStage
where
    F: Fn(&str) -> Option<String> + Send + Sync + 'static,
{
    ConfigStage::new("environment", move |mut config| {
        for key in ENV_VARS {
            let Some(value) = lookup(key) else {
                continue;
            };
            let target = match *key {
                "POLARION_SYNC_PROJECT_ID" => &mut config.polarion.project_id,
                "POLARION_SYNC_CONNECTOR" => {
                    config.polarion.connector = Some(value);
                    continue;
                }
                "POLARION_SYNC_RESULT_PATH" => &mut config.report.result_path,
                "POLARION_SYNC_TESTRUN_TEMPLATE" => &mut config.testrun.template,
                "POLARION_SYNC_TESTRUN_PREFIX" => &mut config.testrun.prefix,
                "POLARION_SYNC_TESTRUN_SUFFIX" => &mut config.testrun.suffix,
                "POLARION_SYNC_DISTRO_ARCH" => &mut config.distro.arch,
                "POLARION_SYNC_DISTRO_VARIANT" => &mut config.distro.variant,
                _ => continue,
            };
            debug!("{} set from environment", key);
            *target = value;
        }
        Ok(config)
    })
}

/// Settings given on the command line. `None` leaves a setting unchanged.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub project_id: Option<String>,
    pub result_path: Option<String>,
    pub template: Option<String>,
    pub testrun_base: Option<String>,
    pub update_run: Option<String>,
    pub runner: Option<String>,
    pub generate_only: bool,
    pub dry_run: bool,
}

pub fn overrides_stage(overrides: Overrides) -> ConfigStage {
    ConfigStage::new("cli", move |mut config| {
        let o = &overrides;
        if let Some(project_id) = &o.project_id {
            config.polarion.project_id = project_id.clone();
        }
        if let Some(result_path) = &o.result_path {
            config.report.result_path = result_path.clone();
        }
        if let Some(template) = &o.template {
            config.testrun.template = template.clone();
        }
        if let Some(base) = &o.testrun_base {
            config.testrun.base = Some(base.clone());
        }
        if let Some(update_run) = &o.update_run {
            config.testrun.update_run = Some(update_run.clone());
        }
        if let Some(runner) = &o.runner {
            config.testrun.runner = runner.clone();
        }
        config.generate_only |= o.generate_only;
        config.polarion.dry_run |= o.dry_run;
        Ok(config)
    })
}

pub fn validate_stage() -> ConfigStage {
    ConfigStage::new("validate", |config| {
        validate(&config)?;
        Ok(config)
    })
}

/// Check that every setting needed for an export is present.
///
/// A template is only required when a new test run will be created.
pub fn validate(config: &Config) -> Result<()> {
    if config.polarion.project_id.trim().is_empty() {
        bail!("polarion.project_id must be set");
    }
    if config.report.result_path.trim().is_empty() {
        bail!("report.result_path must be set");
    }
    let creates_run = !config.generate_only && config.testrun.update_run.is_none();
    if creates_run && config.testrun.template.trim().is_empty() {
        bail!("testrun.template must be set to create a test run");
    }
    if !config.polarion.dry_run && config.polarion.connector.is_none() {
        bail!("polarion.connector must be set unless running with --dry-run");
    }
    Ok(())
}
