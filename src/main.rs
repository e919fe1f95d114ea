//! polarion-sync CLI - Synchronize TestNG results with Polarion.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use polarion_sync::config::{self, Config, ConfigPipeline, Overrides};
use polarion_sync::exporter::{self, ExportSummary, Exporter};
use polarion_sync::polarion::{ConnectorPolarion, InMemoryPolarion, Polarion};
use polarion_sync::profiling;
use polarion_sync::retry::retry;
use polarion_sync::transformer::Transformer;

#[derive(Parser)]
#[command(name = "polarion-sync")]
#[command(about = "Synchronize TestNG results with Polarion", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "polarion-sync.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Use an in-memory backend instead of the connector
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync test cases and requirements, then record results in a test run
    Export {
        /// Path or URL of testng-results.xml
        #[arg(long)]
        result_path: Option<String>,

        /// Polarion project id
        #[arg(long)]
        project_id: Option<String>,

        /// Template to create the test run from
        #[arg(long)]
        template: Option<String>,

        /// Base of the test run id (e.g. "Jenkins Run")
        #[arg(long)]
        testrun_base: Option<String>,

        /// Add results to this existing test run instead of creating one
        #[arg(long)]
        update_run: Option<String>,

        /// Only create and update test cases and requirements
        #[arg(long)]
        generate_only: bool,

        /// User id recorded as the executor of the results
        #[arg(long)]
        runner: Option<String>,
    },

    /// Print the id and title of every test case matching a query
    QueryTestcase {
        /// Polarion query, e.g. 'title:"rhsm.cli*"'
        query: String,
    },

    /// Print the most recent test run whose id matches a base
    LatestTestrun {
        /// Test run id base, e.g. "Jenkins Run"
        base: String,
    },

    /// Validate configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    profiling::init();

    match cli.command {
        Commands::Export {
            result_path,
            project_id,
            template,
            testrun_base,
            update_run,
            generate_only,
            runner,
        } => {
            let overrides = Overrides {
                project_id,
                result_path,
                template,
                testrun_base,
                update_run,
                runner,
                generate_only,
                dry_run: cli.dry_run,
            };
            export(&cli.config, overrides).await
        }
        Commands::QueryTestcase { query } => query_testcase(&cli.config, cli.dry_run, &query).await,
        Commands::LatestTestrun { base } => latest_testrun(&cli.config, cli.dry_run, &base).await,
        Commands::Validate => validate_config(&cli.config, cli.dry_run),
    }
}

/// Load configuration through file, environment and CLI stages, without
/// the final validation.
fn load_unvalidated(config_path: &Path, overrides: Overrides) -> Result<Config> {
    ConfigPipeline::new()
        .stage(config::pipeline::file_stage(config_path))
        .stage(config::pipeline::env_stage())
        .stage(config::pipeline::overrides_stage(overrides))
        .run(Config::default())
}

fn create_backend(config: &Config) -> Result<Arc<dyn Polarion>> {
    if config.polarion.dry_run {
        info!("Dry run: using the in-memory backend");
        return Ok(Arc::new(InMemoryPolarion::new(&config.polarion.project_id)));
    }
    let command = config
        .polarion
        .connector
        .as_deref()
        .context("polarion.connector must be set unless running with --dry-run")?;
    Ok(Arc::new(
        ConnectorPolarion::new(command).with_timeout(config.polarion.timeout_secs),
    ))
}

async fn export(config_path: &Path, overrides: Overrides) -> Result<()> {
    let config = ConfigPipeline::standard(config_path, overrides)
        .run(Config::default())
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    info!("Loaded configuration from {}", config_path.display());

    let polarion = create_backend(&config)?;
    info!("Using {} backend", polarion.name());

    let transformer = Transformer::new(&config, polarion).await?;
    let mut exporter = Exporter::new(transformer);
    let summary = exporter.export().await?;

    print_summary(&summary, &config);
    Ok(())
}

fn print_summary(summary: &ExportSummary, config: &Config) {
    println!();
    println!("{}", style("Export summary").bold());
    println!("  Project:    {}", config.polarion.project_id);
    println!("  Suites:     {}", summary.suites);
    println!("  Test cases: {}", style(summary.test_cases).green());
    if summary.skipped > 0 {
        println!("  Skipped:    {}", style(summary.skipped).yellow());
    }
    println!("  Records:    {}", summary.records);
    for run in &summary.runs {
        println!("  Test run:   {}", style(run).cyan());
    }
    if config.generate_only {
        println!("  (generate only, no test run)");
    }
    println!("  Elapsed:    {:.2}s", profiling::elapsed_secs());
}

async fn query_testcase(config_path: &Path, dry_run: bool, query: &str) -> Result<()> {
    let config = load_unvalidated(config_path, Overrides {
        dry_run,
        ..Default::default()
    })?;
    let polarion = create_backend(&config)?;

    let found = retry("query test cases", || polarion.query_test_cases(query)).await?;
    if found.is_empty() {
        println!("No test cases match {}", query);
    }
    for tc in found {
        println!("{} {}", style(&tc.id).cyan(), tc.title);
    }
    Ok(())
}

async fn latest_testrun(config_path: &Path, dry_run: bool, base: &str) -> Result<()> {
    let config = load_unvalidated(config_path, Overrides {
        dry_run,
        ..Default::default()
    })?;
    let polarion = create_backend(&config)?;

    match exporter::latest_test_run(&*polarion, base).await? {
        Some(run) => println!("{} (created {}, {:?})", style(&run.id).cyan(), run.created, run.status),
        None => println!("No test run matches {}", base),
    }
    Ok(())
}

fn validate_config(config_path: &Path, dry_run: bool) -> Result<()> {
    let overrides = Overrides {
        dry_run,
        ..Default::default()
    };
    match ConfigPipeline::standard(config_path, overrides).run(Config::default()) {
        Ok(config) => {
            println!("Configuration is valid!");
            println!();
            println!("Settings:");
            println!("  Project: {}", config.polarion.project_id);
            println!("  Report: {}", config.report.result_path);
            println!("  Template: {}", config.testrun.template);
            println!("  Runner: {}", config.testrun.runner);
            println!(
                "  Requirements: {} (create: {})",
                config.requirements_query(),
                config.requirements.create
            );
            let backend = if config.polarion.dry_run {
                "in-memory".to_string()
            } else {
                config.polarion.connector.unwrap_or_default()
            };
            println!("  Backend: {}", backend);
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    }
}
