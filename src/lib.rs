//! polarion-sync: Synchronize TestNG results with Polarion.
//!
//! This crate reads a `testng-results.xml` report and mirrors it into a
//! Polarion project: every logical test (`class.method`) becomes a test case,
//! every `<test>` grouping a requirement the test cases verify, and every
//! suite a test run holding one result record per test case.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Report**: Load and parse TestNG XML (local file or URL)
//! - **Transformer**: Merge data-provider invocations into reconciled test cases
//! - **Matcher / Requirements**: Find or create the remote records
//! - **Exporter**: Persist test cases and record results in test runs
//! - **Polarion**: The remote interface, with connector and in-memory backends
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use polarion_sync::config::load_config;
//! use polarion_sync::exporter::Exporter;
//! use polarion_sync::polarion::ConnectorPolarion;
//! use polarion_sync::transformer::Transformer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config(std::path::Path::new("polarion-sync.toml"))?;
//!     let polarion = Arc::new(ConnectorPolarion::new("python3 polarion_connector.py"));
//!
//!     let transformer = Transformer::new(&config, polarion).await?;
//!     let summary = Exporter::new(transformer).export().await?;
//!     println!("Recorded {} results in {:?}", summary.records, summary.runs);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod exporter;
pub mod matcher;
pub mod naming;
pub mod polarion;
pub mod profiling;
pub mod report;
pub mod requirement;
pub mod result;
pub mod retry;
pub mod testcase;
pub mod transformer;

// Re-export commonly used types
pub use config::{Config, load_config};
pub use error::{SyncError, SyncResult};
pub use exporter::{ExportSummary, Exporter};
pub use polarion::{ConnectorPolarion, InMemoryPolarion, Polarion, PolarionError};
pub use report::{Report, ReportError, ReportReader};
pub use result::Status;
pub use testcase::ReconciledTestCase;
pub use transformer::Transformer;
