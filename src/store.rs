//! File-based artifact store.
//!
//! Every output table is written to a temporary file in the destination
//! directory and atomically renamed into place, so a reader never observes
//! a half-written artifact and a failed run leaves the previous outputs
//! untouched.

use crate::error::Result;
use crate::schema::{BalanceRecord, IncomeRecord, IndicatorRecord};
use chrono::{NaiveDate, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const BALANCE_FILE: &str = "balance.csv";
pub const INCOME_FILE: &str = "income.csv";
pub const INDICATORS_FILE: &str = "indicators.csv";
pub const METADATA_FILE: &str = "metadata.json";

/// Freshness summary consumed by the dashboard and the pre-aggregation step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineMetadata {
    pub generated_at: String,
    pub rows_balance: usize,
    pub rows_income: usize,
    pub rows_indicators: usize,
    pub institutions: usize,
    pub date_min: Option<NaiveDate>,
    pub date_max: Option<NaiveDate>,
    pub months: usize,
    pub accounts: usize,
    pub containers_processed: Vec<String>,
    pub skipped_containers: Vec<String>,
}

impl PipelineMetadata {
    pub fn from_tables(
        balance: &[BalanceRecord],
        income: &[IncomeRecord],
        indicators: &[IndicatorRecord],
        containers_processed: Vec<String>,
        skipped_containers: Vec<String>,
    ) -> Self {
        let institutions: BTreeSet<&str> =
            balance.iter().map(|row| row.institution.as_str()).collect();
        let dates: BTreeSet<NaiveDate> = balance.iter().map(|row| row.date).collect();
        let accounts: BTreeSet<&str> = balance.iter().map(|row| row.code.as_str()).collect();

        Self {
            generated_at: Utc::now().to_rfc3339(),
            rows_balance: balance.len(),
            rows_income: income.len(),
            rows_indicators: indicators.len(),
            institutions: institutions.len(),
            date_min: dates.iter().next().copied(),
            date_max: dates.iter().next_back().copied(),
            months: dates.len(),
            accounts: accounts.len(),
            containers_processed,
            skipped_containers,
        }
    }
}

fn temp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.tmp"))
}

fn write_csv_atomic<T: Serialize>(target: &Path, rows: &[T]) -> Result<()> {
    let temp = temp_path(target);
    {
        let mut writer = csv::Writer::from_path(&temp)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    fs::rename(&temp, target)?;
    info!("wrote {} ({} rows)", target.display(), rows.len());
    Ok(())
}

fn read_csv<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

pub fn write_balance<P: AsRef<Path>>(dir: P, rows: &[BalanceRecord]) -> Result<()> {
    write_csv_atomic(&dir.as_ref().join(BALANCE_FILE), rows)
}

pub fn write_income<P: AsRef<Path>>(dir: P, rows: &[IncomeRecord]) -> Result<()> {
    write_csv_atomic(&dir.as_ref().join(INCOME_FILE), rows)
}

pub fn write_indicators<P: AsRef<Path>>(dir: P, rows: &[IndicatorRecord]) -> Result<()> {
    write_csv_atomic(&dir.as_ref().join(INDICATORS_FILE), rows)
}

pub fn write_metadata<P: AsRef<Path>>(dir: P, metadata: &PipelineMetadata) -> Result<()> {
    let target = dir.as_ref().join(METADATA_FILE);
    let temp = temp_path(&target);
    fs::write(&temp, serde_json::to_vec_pretty(metadata)?)?;
    fs::rename(&temp, &target)?;
    info!("wrote {}", target.display());
    Ok(())
}

/// Loads the previously consolidated balance table, if any.
pub fn load_previous_balance<P: AsRef<Path>>(dir: P) -> Result<Option<Vec<BalanceRecord>>> {
    let path = dir.as_ref().join(BALANCE_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let rows = read_csv(&path)?;
    info!("loaded previous balance table ({} rows)", rows.len());
    Ok(Some(rows))
}

pub fn load_metadata<P: AsRef<Path>>(dir: P) -> Result<Option<PipelineMetadata>> {
    let path = dir.as_ref().join(METADATA_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let metadata = serde_json::from_slice(&fs::read(&path)?)?;
    Ok(Some(metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tier;

    fn sample_rows() -> Vec<BalanceRecord> {
        vec![
            BalanceRecord {
                date: NaiveDate::from_ymd_opt(2020, 1, 31).unwrap(),
                tier: tier::SEGMENT_1.to_string(),
                institution: "X LTDA".to_string(),
                code: "1".to_string(),
                label: "ACTIVOS".to_string(),
                amount: 1000.50,
            },
            BalanceRecord {
                date: NaiveDate::from_ymd_opt(2020, 2, 29).unwrap(),
                tier: tier::SEGMENT_1.to_string(),
                institution: "X LTDA".to_string(),
                code: "14".to_string(),
                label: "CARTERA".to_string(),
                amount: 600.0,
            },
        ]
    }

    #[test]
    fn test_balance_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let rows = sample_rows();
        write_balance(dir.path(), &rows).unwrap();

        let loaded = load_previous_balance(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, rows);
    }

    #[test]
    fn test_missing_previous_table_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_previous_balance(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        write_balance(dir.path(), &sample_rows()).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_metadata_counts() {
        let rows = sample_rows();
        let metadata = PipelineMetadata::from_tables(
            &rows,
            &[],
            &[],
            vec!["2020-EEFF-MEN.zip".to_string()],
            vec![],
        );
        assert_eq!(metadata.rows_balance, 2);
        assert_eq!(metadata.institutions, 1);
        assert_eq!(metadata.months, 2);
        assert_eq!(metadata.accounts, 2);
        assert_eq!(
            metadata.date_max,
            Some(NaiveDate::from_ymd_opt(2020, 2, 29).unwrap())
        );
    }

    #[test]
    fn test_metadata_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = PipelineMetadata::from_tables(&sample_rows(), &[], &[], vec![], vec![]);
        write_metadata(dir.path(), &metadata).unwrap();
        let loaded = load_metadata(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.rows_balance, 2);
    }
}
