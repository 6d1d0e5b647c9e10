//! costsheet - part cost estimation worksheet
//!
//! Computes material and processing costs for a part estimate, keeps named
//! snapshots in a flat JSON file, and fills a human-authored Excel cost sheet
//! template by discovering its cells from header text.
//!
//! # Features
//!
//! - Material cost: unit price × NET × U/S with loss rate, waste and die-cast allowances
//! - Processing cost: cycle time × headcount × rate with allowance and setup cost
//! - Snapshot save/load/list (`saved_results.json`)
//! - Keyword-driven template export with merged-cell tolerance
//! - CLI (`costsheet`) and HTTP API (`costsheet-server`)
//!
//! # Example
//!
//! ```no_run
//! use costsheet::core::compute_estimate;
//! use costsheet::excel::TemplateExporter;
//! use costsheet::types::Estimate;
//! use std::path::Path;
//!
//! let content = std::fs::read_to_string("estimate.yaml")?;
//! let estimate: Estimate = serde_yaml::from_str(&content)?;
//!
//! let summary = compute_estimate(&estimate);
//! println!("Total: {}", summary.grand_total);
//!
//! let outcome = TemplateExporter::default().export(Path::new("template.xlsx"), &estimate)?;
//! std::fs::write("out.xlsx", outcome.bytes)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod excel;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{CostError, CostResult, ExportError};
pub use store::SnapshotStore;
pub use types::{CostSummary, Estimate, EstimateHeader, EstimateSnapshot, MaterialLine, ProcessLine};
