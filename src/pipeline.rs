//! End-to-end batch run.
//!
//! Single-threaded, run-to-completion: discover containers, consolidate
//! balances incrementally against the previous output, derive the income
//! statement, extract indicators, then atomically replace the artifacts.
//! Nothing is written until every table has been produced, so a failed run
//! leaves the previous outputs in place.

use crate::accounts::AccountHierarchy;
use crate::balance;
use crate::config::PipelineConfig;
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::income::derive_income_statement;
use crate::indicators;
use crate::reader::SourceContainer;
use crate::store::{self, PipelineMetadata};
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Directory of balance source containers (`*.zip`).
    pub balance_dir: PathBuf,
    /// Directory of indicator source containers; `None` skips extraction.
    pub indicator_dir: Option<PathBuf>,
    /// Destination for the consolidated artifacts.
    pub output_dir: PathBuf,
}

#[derive(Debug)]
pub struct PipelineSummary {
    pub metadata: PipelineMetadata,
    pub diagnostics: Diagnostics,
    /// Navigation tree derived from the consolidated table; not persisted.
    pub hierarchy: AccountHierarchy,
}

/// Runs the whole pipeline once.
pub fn run(options: &PipelineOptions, config: &PipelineConfig) -> Result<PipelineSummary> {
    let mut diagnostics = Diagnostics::default();

    let containers = discover_containers(&options.balance_dir, &mut diagnostics)?;
    info!("found {} balance container(s)", containers.len());

    let previous = store::load_previous_balance(&options.output_dir)?;
    let outcome = balance::consolidate(&containers, previous, config)?;
    diagnostics.merge(outcome.diagnostics);
    let balance_table = outcome.table;

    let (income_table, income_diagnostics) = derive_income_statement(&balance_table, config);
    diagnostics.merge(income_diagnostics);

    let indicator_table = match &options.indicator_dir {
        Some(dir) => {
            let indicator_containers = discover_containers(dir, &mut diagnostics)?;
            info!("found {} indicator container(s)", indicator_containers.len());
            let (table, indicator_diagnostics) = indicators::extract(&indicator_containers, config);
            diagnostics.merge(indicator_diagnostics);
            table
        }
        None => Vec::new(),
    };

    let hierarchy = build_hierarchy(&balance_table, config);

    let metadata = PipelineMetadata::from_tables(
        &balance_table,
        &income_table,
        &indicator_table,
        outcome.ingested_containers,
        diagnostics.skipped_containers.clone(),
    );

    store::write_balance(&options.output_dir, &balance_table)?;
    store::write_income(&options.output_dir, &income_table)?;
    store::write_indicators(&options.output_dir, &indicator_table)?;
    store::write_metadata(&options.output_dir, &metadata)?;

    info!(
        "pipeline complete: {} balance rows, {} income rows, {} indicator rows, {} institutions",
        metadata.rows_balance, metadata.rows_income, metadata.rows_indicators, metadata.institutions
    );

    Ok(PipelineSummary {
        metadata,
        diagnostics,
        hierarchy,
    })
}

/// Opens every `.zip` in a directory, sorted by name. Containers that fail
/// to open are skipped with a diagnostic.
fn discover_containers(dir: &Path, diagnostics: &mut Diagnostics) -> Result<Vec<SourceContainer>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("zip"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut containers = Vec::new();
    for path in paths {
        match SourceContainer::open(&path) {
            Ok(container) => containers.push(container),
            Err(error) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                warn!("cannot open container {name}: {error}");
                diagnostics.skipped_containers.push(name);
            }
        }
    }
    Ok(containers)
}

/// Builds the navigation hierarchy from the distinct (code, label) pairs of
/// the consolidated table.
pub fn build_hierarchy(
    balance_table: &[crate::schema::BalanceRecord],
    config: &PipelineConfig,
) -> AccountHierarchy {
    let mut pairs: BTreeMap<&str, &str> = BTreeMap::new();
    for row in balance_table {
        pairs.entry(row.code.as_str()).or_insert(row.label.as_str());
    }
    AccountHierarchy::build(
        pairs.into_iter(),
        &config.valid_root_codes,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{tier, BalanceRecord};
    use chrono::NaiveDate;

    #[test]
    fn test_hierarchy_from_table_pairs() {
        let config = PipelineConfig::default();
        let row = |code: &str, label: &str| BalanceRecord {
            date: NaiveDate::from_ymd_opt(2020, 1, 31).unwrap(),
            tier: tier::SEGMENT_1.to_string(),
            institution: "X LTDA".to_string(),
            code: code.to_string(),
            label: label.to_string(),
            amount: 0.0,
        };
        let table = vec![
            row("1", "ACTIVOS"),
            row("14", "CARTERA"),
            row("14", "CARTERA"),
            row("25", "SIN PADRE"),
        ];
        let hierarchy = build_hierarchy(&table, &config);
        assert!(hierarchy.contains("14"));
        assert!(!hierarchy.contains("25"));
        assert_eq!(hierarchy.orphans, vec!["25".to_string()]);
    }
}
