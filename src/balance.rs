//! Balance-sheet consolidation.
//!
//! Merges per-period extracts into one long-form table with incremental
//! reprocessing: containers older than the consolidated history are skipped
//! by their declared year, and rows at or before the previous maximum
//! reporting date are discarded so a re-run never duplicates ingestion.

use crate::config::PipelineConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{PipelineError, Result};
use crate::reader::SourceContainer;
use crate::schema::{latest_tier_by_institution, BalanceRecord};
use chrono::{Datelike, NaiveDate};
use log::{info, warn};
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct ConsolidationOutcome {
    pub table: Vec<BalanceRecord>,
    pub diagnostics: Diagnostics,
    /// Containers that contributed at least one surviving row.
    pub ingested_containers: Vec<String>,
}

pub fn max_reporting_date(rows: &[BalanceRecord]) -> Option<NaiveDate> {
    rows.iter().map(|row| row.date).max()
}

/// Consolidates newly-read containers against an optional previous table.
///
/// Best-effort across the batch: a container that fails to read is logged
/// and skipped. The only fatal case is having nothing at all to produce
/// output from.
pub fn consolidate(
    containers: &[SourceContainer],
    previous: Option<Vec<BalanceRecord>>,
    config: &PipelineConfig,
) -> Result<ConsolidationOutcome> {
    let previous_max = previous.as_deref().and_then(max_reporting_date);
    let mut diagnostics = Diagnostics::default();
    let mut ingested_containers = Vec::new();

    let mut combined: Vec<BalanceRecord> = previous.unwrap_or_default();
    let had_previous = !combined.is_empty();
    let mut readable = 0usize;

    for container in containers {
        // Container naming encodes the year truthfully; older-year archives
        // cannot contain rows newer than the consolidated history.
        if let Some(max) = previous_max {
            if container.year < max.year() {
                info!("skipping {}: year {} already consolidated", container.name, container.year);
                continue;
            }
        }

        match container.read_balances(config) {
            Ok((rows, read_diagnostics)) => {
                readable += 1;
                diagnostics.merge(read_diagnostics);

                let fresh: Vec<BalanceRecord> = match previous_max {
                    Some(max) => rows.into_iter().filter(|row| row.date > max).collect(),
                    None => rows,
                };
                if fresh.is_empty() {
                    info!("{}: no rows newer than consolidated history", container.name);
                    continue;
                }
                info!("{}: {} new rows", container.name, fresh.len());
                ingested_containers.push(container.name.clone());
                combined.extend(fresh);
            }
            Err(error) => {
                warn!("skipping container {}: {error}", container.name);
                diagnostics.skipped_containers.push(container.name.clone());
            }
        }
    }

    if combined.is_empty() && readable == 0 && !had_previous {
        return Err(PipelineError::NothingToConsolidate);
    }

    let table = normalize(combined, &mut diagnostics);

    Ok(ConsolidationOutcome {
        table,
        diagnostics,
        ingested_containers,
    })
}

/// Dedup, tier-unify and sort a combined row set. Idempotent.
pub fn normalize(rows: Vec<BalanceRecord>, diagnostics: &mut Diagnostics) -> Vec<BalanceRecord> {
    // Last write wins on the uniqueness key.
    let mut by_key: BTreeMap<(String, NaiveDate, String), BalanceRecord> = BTreeMap::new();
    for row in rows {
        let key = (row.institution.clone(), row.date, row.code.clone());
        if by_key.insert(key, row).is_some() {
            diagnostics.duplicate_keys += 1;
        }
    }
    let mut table: Vec<BalanceRecord> = by_key.into_values().collect();

    // Every row of an institution takes the tier from its latest report,
    // historical rows included; the dashboard groups whole histories under
    // the current tier.
    let latest = latest_tier_by_institution(
        table
            .iter()
            .map(|row| (row.institution.as_str(), row.date, row.tier.as_str())),
    );
    for row in &mut table {
        if let Some(tier) = latest.get(&row.institution) {
            row.tier.clone_from(tier);
        }
    }

    table.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tier;

    fn record(date: (i32, u32, u32), row_tier: &str, institution: &str, code: &str, amount: f64) -> BalanceRecord {
        BalanceRecord {
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            tier: row_tier.to_string(),
            institution: institution.to_string(),
            code: code.to_string(),
            label: format!("CUENTA {code}"),
            amount,
        }
    }

    #[test]
    fn test_tier_unification_applies_latest_retroactively() {
        let rows = vec![
            record((2020, 1, 31), tier::SEGMENT_2, "ANDES", "1", 10.0),
            record((2020, 2, 29), tier::SEGMENT_2, "ANDES", "1", 11.0),
            record((2020, 3, 31), tier::SEGMENT_1, "ANDES", "1", 12.0),
        ];
        let mut diagnostics = Diagnostics::default();
        let table = normalize(rows, &mut diagnostics);

        assert_eq!(table.len(), 3);
        assert!(table.iter().all(|row| row.tier == tier::SEGMENT_1));
    }

    #[test]
    fn test_duplicate_keys_collapse_last_wins() {
        let rows = vec![
            record((2020, 1, 31), tier::SEGMENT_1, "ANDES", "1", 10.0),
            record((2020, 1, 31), tier::SEGMENT_1, "ANDES", "1", 99.0),
        ];
        let mut diagnostics = Diagnostics::default();
        let table = normalize(rows, &mut diagnostics);

        assert_eq!(table.len(), 1);
        assert_eq!(table[0].amount, 99.0);
        assert_eq!(diagnostics.duplicate_keys, 1);
    }

    #[test]
    fn test_sort_order_is_date_tier_institution_code() {
        let rows = vec![
            record((2020, 2, 29), tier::SEGMENT_1, "B", "1", 1.0),
            record((2020, 1, 31), tier::SEGMENT_1, "B", "14", 2.0),
            record((2020, 1, 31), tier::SEGMENT_1, "B", "1", 3.0),
        ];
        let mut diagnostics = Diagnostics::default();
        let table = normalize(rows, &mut diagnostics);

        let keys: Vec<(NaiveDate, String)> = table
            .iter()
            .map(|row| (row.date, row.code.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (NaiveDate::from_ymd_opt(2020, 1, 31).unwrap(), "1".to_string()),
                (NaiveDate::from_ymd_opt(2020, 1, 31).unwrap(), "14".to_string()),
                (NaiveDate::from_ymd_opt(2020, 2, 29).unwrap(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let rows = vec![
            record((2020, 1, 31), tier::SEGMENT_2, "ANDES", "1", 10.0),
            record((2020, 3, 31), tier::SEGMENT_1, "ANDES", "1", 12.0),
            record((2020, 1, 31), tier::SEGMENT_3, "SUR", "14", 5.0),
        ];
        let mut diagnostics = Diagnostics::default();
        let once = normalize(rows, &mut diagnostics);
        let twice = normalize(once.clone(), &mut diagnostics);
        assert_eq!(once, twice);
    }
}
