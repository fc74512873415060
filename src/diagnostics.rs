//! Counters that make silent data-quality degradation observable.
//!
//! The pipeline deliberately degrades dirty values instead of aborting:
//! unparseable amounts become zero, ignore-listed rows disappear, duplicate
//! keys collapse last-write-wins. Each of those events increments a counter
//! here so regressions are visible to tests and logs without changing any
//! output value.

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Amount fields that failed numeric coercion and were written as 0.0.
    pub coerced_zero: u64,
    /// Rows dropped because the institution is on the ignore-list.
    pub ignored_institutions: u64,
    /// Rows dropped because they carry a system-wide total, not an entity.
    pub system_total_rows: u64,
    /// Rows dropped for a missing or unparseable reporting date.
    pub missing_dates: u64,
    /// Rows dropped for a missing or non-numeric indicator value.
    pub missing_values: u64,
    /// Duplicate (institution, date, code) rows collapsed last-write-wins.
    pub duplicate_keys: u64,
    /// De-accumulation fallbacks where a mid-year gap restarted the series.
    pub gap_restarts: u64,
    /// Containers that failed to read and were skipped.
    pub skipped_containers: Vec<String>,
    /// Workbooks with no detectable ratio data block.
    pub skipped_workbooks: Vec<String>,
}

impl Diagnostics {
    pub fn merge(&mut self, other: Diagnostics) {
        self.coerced_zero += other.coerced_zero;
        self.ignored_institutions += other.ignored_institutions;
        self.system_total_rows += other.system_total_rows;
        self.missing_dates += other.missing_dates;
        self.missing_values += other.missing_values;
        self.duplicate_keys += other.duplicate_keys;
        self.gap_restarts += other.gap_restarts;
        self.skipped_containers.extend(other.skipped_containers);
        self.skipped_workbooks.extend(other.skipped_workbooks);
    }

    pub fn is_clean(&self) -> bool {
        *self == Diagnostics::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_accumulates() {
        let mut a = Diagnostics {
            coerced_zero: 2,
            skipped_containers: vec!["2020.zip".to_string()],
            ..Diagnostics::default()
        };
        let b = Diagnostics {
            coerced_zero: 3,
            duplicate_keys: 1,
            skipped_containers: vec!["2021.zip".to_string()],
            ..Diagnostics::default()
        };
        a.merge(b);
        assert_eq!(a.coerced_zero, 5);
        assert_eq!(a.duplicate_keys, 1);
        assert_eq!(a.skipped_containers.len(), 2);
        assert!(!a.is_clean());
        assert!(Diagnostics::default().is_clean());
    }
}
