//! # coop-disclosures
//!
//! ETL pipeline that normalizes the monthly financial disclosures a
//! financial-sector regulator publishes for several hundred
//! savings-and-credit cooperatives into one canonical, queryable dataset.
//!
//! ## Core Concepts
//!
//! - **Container**: one archive per year holding either a delimited text
//!   extract (older periods) or one spreadsheet workbook per classification
//!   tier (newer periods).
//! - **Canonical identity**: raw institution names drift across years;
//!   every extract passes through the name canonicalizer so one institution
//!   keeps one identity over its whole history.
//! - **Incremental consolidation**: re-runs only ingest rows strictly newer
//!   than the previously consolidated table, making the batch idempotent.
//! - **De-accumulation**: income-statement figures arrive as year-to-date
//!   accumulations and are converted to discrete monthly values plus a
//!   trailing-12-month rolling sum.
//! - **Indicator extraction**: pre-computed regulatory ratios are pulled
//!   out of cached pivot-table blocks, located by content rather than
//!   position, and mapped onto a stable taxonomy.
//!
//! ## Example
//!
//! ```rust,ignore
//! use coop_disclosures::{run, PipelineConfig, PipelineOptions};
//!
//! let options = PipelineOptions {
//!     balance_dir: "balances".into(),
//!     indicator_dir: Some("indicators".into()),
//!     output_dir: "master_data".into(),
//! };
//! let summary = run(&options, &PipelineConfig::default())?;
//! println!("{} institutions", summary.metadata.institutions);
//! ```

pub mod accounts;
pub mod balance;
pub mod config;
pub mod dates;
pub mod diagnostics;
pub mod error;
pub mod income;
pub mod indicators;
pub mod names;
pub mod pipeline;
pub mod pivot_cache;
pub mod reader;
pub mod schema;
pub mod store;

pub use accounts::{account_level, AccountHierarchy};
pub use balance::{consolidate, max_reporting_date, ConsolidationOutcome};
pub use config::{IndicatorMapping, NameRules, PipelineConfig};
pub use diagnostics::Diagnostics;
pub use error::{PipelineError, Result};
pub use income::derive_income_statement;
pub use names::{canonical_name, resolve_short_code};
pub use pipeline::{run, PipelineOptions, PipelineSummary};
pub use reader::{SourceContainer, SourceFormat};
pub use schema::{BalanceRecord, IncomeRecord, IndicatorRecord};
pub use store::PipelineMetadata;
