//! Long-form record types shared by every pipeline stage.
//!
//! Field names are canonical English; the *values* of `tier`, `code` and the
//! lookup keys that feed them remain the regulator's literal strings, since
//! those are wire format rather than code idiom.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Classification tier labels as published by the regulator.
pub mod tier {
    pub const SEGMENT_1: &str = "SEGMENTO 1";
    pub const SEGMENT_2: &str = "SEGMENTO 2";
    pub const SEGMENT_3: &str = "SEGMENTO 3";
    pub const MUTUAL: &str = "SEGMENTO 1 MUTUALISTA";
    /// Data-quality fallback when no tier can be resolved.
    pub const UNKNOWN: &str = "DESCONOCIDO";

    /// Marker substring identifying mutual savings institutions; gates the
    /// short-code name aliases.
    pub const MUTUAL_MARKER: &str = "MUTUALISTA";

    /// Resolves the tier implied by a workbook file name.
    pub fn from_file_name(name: &str) -> &'static str {
        let lower = name.to_lowercase();
        if lower.contains("segmento 1") || lower.contains("segmento_1") {
            SEGMENT_1
        } else if lower.contains("segmento 2") || lower.contains("segmento_2") {
            SEGMENT_2
        } else if lower.contains("segmento 3") || lower.contains("segmento_3") {
            SEGMENT_3
        } else if lower.contains("mutualista") {
            MUTUAL
        } else {
            UNKNOWN
        }
    }

    pub fn is_mutual(tier: &str) -> bool {
        tier.contains(MUTUAL_MARKER)
    }
}

/// One (institution, reporting-date, account-code) balance observation.
///
/// `amount` is a point-in-time balance, never an accumulated figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub date: NaiveDate,
    pub tier: String,
    pub institution: String,
    pub code: String,
    pub label: String,
    pub amount: f64,
}

impl BalanceRecord {
    /// The deterministic consolidation sort key.
    pub fn sort_key(&self) -> (NaiveDate, &str, &str, &str) {
        (self.date, &self.tier, &self.institution, &self.code)
    }

    /// The uniqueness key; duplicates on it resolve last-write-wins.
    pub fn identity(&self) -> (&str, NaiveDate, &str) {
        (&self.institution, self.date, &self.code)
    }
}

/// One income-statement observation with its derived amounts.
///
/// `accumulated` is the figure as originally reported (year-to-date,
/// resetting each January); `monthly` and `trailing_12m` are purely
/// additive derived fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeRecord {
    pub date: NaiveDate,
    pub tier: String,
    pub institution: String,
    pub code: String,
    pub label: String,
    pub accumulated: f64,
    pub monthly: f64,
    /// Absent until 12 monthly observations exist for the group.
    pub trailing_12m: Option<f64>,
}

/// One pre-computed regulatory ratio observation.
///
/// `value` is an unscaled ratio, not a percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRecord {
    pub institution: String,
    pub tier: String,
    pub date: NaiveDate,
    pub code: String,
    pub label: String,
    pub value: f64,
    pub category: String,
}

impl IndicatorRecord {
    pub fn identity(&self) -> (&str, NaiveDate, &str) {
        (&self.institution, self.date, &self.code)
    }
}

/// Resolves each institution's tier from its chronologically latest row.
///
/// Earlier rows for the same date are overtaken by later-seen ones, matching
/// a stable sort on date with keep-last semantics.
pub fn latest_tier_by_institution<'a, I>(rows: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (&'a str, NaiveDate, &'a str)>,
{
    let mut latest: BTreeMap<String, (NaiveDate, String)> = BTreeMap::new();
    for (institution, date, tier) in rows {
        match latest.get(institution) {
            Some((seen, _)) if *seen > date => {}
            _ => {
                latest.insert(institution.to_string(), (date, tier.to_string()));
            }
        }
    }
    latest
        .into_iter()
        .map(|(institution, (_, tier))| (institution, tier))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 28).unwrap()
    }

    #[test]
    fn test_tier_from_file_name() {
        assert_eq!(
            tier::from_file_name("BALANCE SEGMENTO 1 ABRIL 2024.xlsm"),
            tier::SEGMENT_1
        );
        assert_eq!(
            tier::from_file_name("balance_segmento_3_2023.xlsm"),
            tier::SEGMENT_3
        );
        assert_eq!(
            tier::from_file_name("MUTUALISTAS DICIEMBRE 2024.xlsm"),
            tier::MUTUAL
        );
        assert_eq!(tier::from_file_name("otros.xlsm"), tier::UNKNOWN);
    }

    #[test]
    fn test_latest_tier_wins() {
        let rows = vec![
            ("ANDES", date(2020, 1), tier::SEGMENT_2),
            ("ANDES", date(2021, 6), tier::SEGMENT_1),
            ("ANDES", date(2020, 12), tier::SEGMENT_2),
            ("SUR", date(2020, 1), tier::SEGMENT_3),
        ];
        let latest = latest_tier_by_institution(rows);
        assert_eq!(latest["ANDES"], tier::SEGMENT_1);
        assert_eq!(latest["SUR"], tier::SEGMENT_3);
    }

    #[test]
    fn test_equal_dates_keep_last_seen() {
        let rows = vec![
            ("ANDES", date(2021, 6), tier::SEGMENT_2),
            ("ANDES", date(2021, 6), tier::SEGMENT_1),
        ];
        let latest = latest_tier_by_institution(rows);
        assert_eq!(latest["ANDES"], tier::SEGMENT_1);
    }
}
