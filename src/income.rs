//! Income-statement derivation.
//!
//! Expense and income accounts are reported as year-to-date accumulations
//! that reset every January. Comparing two arbitrary months therefore
//! requires de-accumulating into discrete monthly deltas first, and a
//! trailing-12-month rolling sum on top of those for annualized
//! comparability.

use crate::config::PipelineConfig;
use crate::diagnostics::Diagnostics;
use crate::schema::{BalanceRecord, IncomeRecord};
use chrono::{Datelike, NaiveDate};
use log::debug;
use std::collections::BTreeMap;
use std::collections::VecDeque;

const TRAILING_WINDOW: usize = 12;

/// Derives the income-statement table from consolidated balance rows.
///
/// Input rows are expected entity-canonicalized and tier-unified already;
/// the derivation never mutates the reported accumulated values, it only
/// adds the monthly and trailing-12 fields.
pub fn derive_income_statement(
    balance: &[BalanceRecord],
    config: &PipelineConfig,
) -> (Vec<IncomeRecord>, Diagnostics) {
    let mut diagnostics = Diagnostics::default();

    // Rows that collapsed onto one identity after canonicalization are
    // summed, not last-write-wins: they are the same institution reported
    // under two spellings in one period.
    let mut aggregated: BTreeMap<(String, String, NaiveDate), BalanceRecord> = BTreeMap::new();
    for row in balance {
        if !is_income_code(&row.code, config) {
            continue;
        }
        let key = (row.institution.clone(), row.code.clone(), row.date);
        match aggregated.get_mut(&key) {
            Some(existing) => {
                existing.amount += row.amount;
                diagnostics.duplicate_keys += 1;
            }
            None => {
                aggregated.insert(key, row.clone());
            }
        }
    }

    // BTreeMap ordering groups by (institution, code) with dates ascending,
    // exactly the grouping the derivation needs.
    let mut records = Vec::with_capacity(aggregated.len());
    let mut group_key: Option<(String, String)> = None;
    let mut previous: Option<(NaiveDate, f64)> = None;
    let mut window: VecDeque<f64> = VecDeque::with_capacity(TRAILING_WINDOW);
    let mut window_sum = 0.0;

    for ((institution, code, date), row) in aggregated {
        let key = (institution.clone(), code.clone());
        if group_key.as_ref() != Some(&key) {
            group_key = Some(key);
            previous = None;
            window.clear();
            window_sum = 0.0;
        }

        let accumulated = row.amount;
        let monthly = match previous {
            Some((previous_date, previous_accumulated))
                if date.month() != 1 && previous_date.year() == date.year() =>
            {
                accumulated - previous_accumulated
            }
            _ => {
                // January, or a gap with no earlier record this year: the
                // series restarts on the raw accumulated value. A mid-year
                // gap can inflate that single month; known approximation.
                if date.month() != 1 {
                    diagnostics.gap_restarts += 1;
                }
                accumulated
            }
        };
        previous = Some((date, accumulated));

        window.push_back(monthly);
        window_sum += monthly;
        if window.len() > TRAILING_WINDOW {
            if let Some(evicted) = window.pop_front() {
                window_sum -= evicted;
            }
        }
        let trailing_12m = (window.len() == TRAILING_WINDOW).then_some(window_sum);

        let label = if row.label.is_empty() {
            config
                .income_summary_labels
                .get(&code)
                .cloned()
                .unwrap_or_default()
        } else {
            row.label
        };

        records.push(IncomeRecord {
            date,
            tier: row.tier,
            institution,
            code,
            label,
            accumulated,
            monthly,
            trailing_12m,
        });
    }

    records.sort_by(|a, b| {
        (a.date, &a.tier, &a.institution, &a.code).cmp(&(b.date, &b.tier, &b.institution, &b.code))
    });

    debug!(
        "income statement: {} rows, {} with trailing-12",
        records.len(),
        records.iter().filter(|r| r.trailing_12m.is_some()).count()
    );
    (records, diagnostics)
}

fn is_income_code(code: &str, config: &PipelineConfig) -> bool {
    code.chars()
        .next()
        .is_some_and(|first| config.income_code_prefixes.contains(&first))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tier;

    fn row(institution: &str, code: &str, date: (i32, u32), amount: f64) -> BalanceRecord {
        BalanceRecord {
            date: crate::dates::last_day_of_month(date.0, date.1),
            tier: tier::SEGMENT_1.to_string(),
            institution: institution.to_string(),
            code: code.to_string(),
            label: String::new(),
            amount,
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn test_deaccumulation_within_a_year() {
        let balance = vec![
            row("ANDES", "5", (2023, 1), 100.0),
            row("ANDES", "5", (2023, 2), 250.0),
            row("ANDES", "5", (2023, 3), 400.0),
        ];
        let (records, diagnostics) = derive_income_statement(&balance, &config());

        let monthly: Vec<f64> = records.iter().map(|r| r.monthly).collect();
        assert_eq!(monthly, vec![100.0, 150.0, 150.0]);
        assert!(records.iter().all(|r| r.trailing_12m.is_none()));
        assert_eq!(diagnostics.gap_restarts, 0);
    }

    #[test]
    fn test_january_resets_the_accumulation() {
        let balance = vec![
            row("ANDES", "5", (2022, 12), 1200.0),
            row("ANDES", "5", (2023, 1), 90.0),
        ];
        let (records, _) = derive_income_statement(&balance, &config());
        assert_eq!(records[1].monthly, 90.0);
    }

    #[test]
    fn test_mid_year_gap_restarts_series() {
        // Series starts in June: no prior record that year.
        let balance = vec![row("ANDES", "41", (2023, 6), 600.0)];
        let (records, diagnostics) = derive_income_statement(&balance, &config());
        assert_eq!(records[0].monthly, 600.0);
        assert_eq!(diagnostics.gap_restarts, 1);
    }

    #[test]
    fn test_gap_uses_preceding_observation_same_year() {
        // February missing: March subtracts January, the preceding
        // observation of the same calendar year.
        let balance = vec![
            row("ANDES", "5", (2023, 1), 100.0),
            row("ANDES", "5", (2023, 3), 400.0),
        ];
        let (records, diagnostics) = derive_income_statement(&balance, &config());
        assert_eq!(records[1].monthly, 300.0);
        assert_eq!(diagnostics.gap_restarts, 0);
    }

    #[test]
    fn test_trailing_12_appears_on_twelfth_observation() {
        let mut balance = Vec::new();
        for month in 1..=12u32 {
            balance.push(row("ANDES", "5", (2023, month), 100.0 * month as f64));
        }
        let (records, _) = derive_income_statement(&balance, &config());

        // Accumulated 100,200,...,1200 de-accumulates to twelve 100s.
        assert!(records[..11].iter().all(|r| r.trailing_12m.is_none()));
        assert_eq!(records[11].trailing_12m, Some(1200.0));
    }

    #[test]
    fn test_trailing_12_rolls_forward() {
        let mut balance = Vec::new();
        for month in 1..=12u32 {
            balance.push(row("ANDES", "5", (2023, month), 100.0 * month as f64));
        }
        balance.push(row("ANDES", "5", (2024, 1), 220.0));
        let (records, _) = derive_income_statement(&balance, &config());

        // Window drops Jan-2023 (100) and gains Jan-2024 (220).
        assert_eq!(records[12].trailing_12m, Some(1200.0 - 100.0 + 220.0));
    }

    #[test]
    fn test_only_income_prefixes_are_kept() {
        let balance = vec![
            row("ANDES", "1", (2023, 1), 10.0),
            row("ANDES", "41", (2023, 1), 20.0),
            row("ANDES", "51", (2023, 1), 30.0),
        ];
        let (records, _) = derive_income_statement(&balance, &config());
        let codes: Vec<&str> = records.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["41", "51"]);
    }

    #[test]
    fn test_accumulated_passes_through_unchanged() {
        let balance = vec![
            row("ANDES", "5", (2023, 1), 100.0),
            row("ANDES", "5", (2023, 2), 250.0),
        ];
        let (records, _) = derive_income_statement(&balance, &config());
        assert_eq!(records[0].accumulated, 100.0);
        assert_eq!(records[1].accumulated, 250.0);
    }

    #[test]
    fn test_blank_labels_take_summary_names() {
        let balance = vec![row("ANDES", "5", (2023, 1), 100.0)];
        let (records, _) = derive_income_statement(&balance, &config());
        assert_eq!(records[0].label, "INGRESOS");
    }
}
