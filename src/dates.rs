//! Reporting-date helpers.
//!
//! Source extracts spell dates several ways across years, and newer
//! workbooks sometimes omit the date cell entirely, leaving only the month
//! name embedded in the workbook's file name.

use crate::error::{PipelineError, Result};
use chrono::{Datelike, Days, NaiveDate};

pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .checked_sub_days(Days::new(1))
        .unwrap()
}

/// Clamps any date to its month end, the granularity every table keys on.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    last_day_of_month(date.year(), date.month())
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Parses a reporting date from the handful of spellings the source uses.
pub fn parse_report_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Ok(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = chrono::NaiveDateTime::parse_from_str(raw, format) {
            return Ok(datetime.date());
        }
    }
    Err(PipelineError::Date(raw.to_string()))
}

const MONTH_NAMES: &[(&str, u32)] = &[
    ("ENERO", 1),
    ("FEBRERO", 2),
    ("MARZO", 3),
    ("ABRIL", 4),
    ("MAYO", 5),
    ("JUNIO", 6),
    ("JULIO", 7),
    ("AGOSTO", 8),
    ("SEPTIEMBRE", 9),
    ("OCTUBRE", 10),
    ("NOVIEMBRE", 11),
    ("DICIEMBRE", 12),
];

/// Recovers a month-end reporting date from a workbook file name such as
/// `BALANCE SEGMENTO 1 ABRIL 2024.xlsm`.
pub fn date_from_file_name(name: &str) -> Option<NaiveDate> {
    let upper = name.to_uppercase();

    let month = MONTH_NAMES
        .iter()
        .find(|(month_name, _)| upper.contains(month_name))
        .map(|(_, number)| *number)?;

    let year = four_digit_year(&upper)?;
    Some(last_day_of_month(year, month))
}

/// First standalone 4-digit number in the text, read as a year.
fn four_digit_year(text: &str) -> Option<i32> {
    let bytes = text.as_bytes();
    let mut start = None;
    for (i, b) in bytes.iter().enumerate() {
        if b.is_ascii_digit() {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start.take() {
            if i - s == 4 {
                return text[s..i].parse().ok();
            }
        }
    }
    if let Some(s) = start {
        if bytes.len() - s == 4 {
            return text[s..].parse().ok();
        }
    }
    None
}
