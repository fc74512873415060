//! Spreadsheet-binary source path.
//!
//! Newer containers ship one workbook per classification tier. Each
//! workbook carries a wide financial-statement sheet: a few metadata
//! columns, then one column per reporting institution. The institution set
//! is only known at read time, so the wide intermediate is kept as a
//! column-name → values mapping and melted into long form immediately.

use crate::config::PipelineConfig;
use crate::dates::{date_from_file_name, month_end, parse_report_date};
use crate::diagnostics::Diagnostics;
use crate::error::{PipelineError, Result};
use crate::names::{canonical_name, resolve_short_code};
use crate::reader::{is_ignored_institution, parse_amount, SYSTEM_TOTAL_MARKER};
use crate::schema::{tier, BalanceRecord};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::NaiveDate;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek};
use zip::ZipArchive;

/// Sheet-name markers identifying financial-statement content.
const SHEET_MARKERS: &[&str] = &["ESTADO FINANCIERO", "BALANCE"];

/// Cell literals marking the start of the account-code column.
const HEADER_MARKERS: &[&str] = &["CODIGO_CONTABLE", "CUENTA"];

/// Metadata columns (code, label, structure, group) preceding the first
/// institution column.
const METADATA_COLUMNS: usize = 4;

/// Upper bound on the header scan; beyond this the sheet is malformed.
const HEADER_SCAN_LIMIT: usize = 40;

/// Reads every tier workbook inside a spreadsheet container.
///
/// Workbook failures are diagnostics, not errors; the container only fails
/// when no workbook could be read at all.
pub fn read_container<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    container: &str,
    config: &PipelineConfig,
) -> Result<(Vec<BalanceRecord>, Diagnostics)> {
    let workbook_names: Vec<String> = archive
        .file_names()
        .filter(|name| {
            let lower = name.to_lowercase();
            lower.ends_with(".xlsm") || lower.ends_with(".xlsb") || lower.ends_with(".xlsx")
        })
        .map(str::to_string)
        .collect();

    let mut records = Vec::new();
    let mut diagnostics = Diagnostics::default();
    let mut readable = 0usize;

    for workbook_name in workbook_names {
        let file_name = workbook_name
            .rsplit('/')
            .next()
            .unwrap_or(&workbook_name)
            .to_string();
        if is_ignored_institution(&file_name, config) {
            debug!("{container}: ignoring workbook {file_name}");
            continue;
        }

        let mut bytes = Vec::new();
        archive.by_name(&workbook_name)?.read_to_end(&mut bytes)?;

        match read_workbook(&bytes, &file_name, config, &mut diagnostics) {
            Ok(rows) => {
                readable += 1;
                records.extend(rows);
            }
            Err(error) => {
                warn!("{container}: skipping workbook {file_name}: {error}");
                diagnostics
                    .skipped_workbooks
                    .push(format!("{container}/{file_name}"));
            }
        }
    }

    if readable == 0 {
        return Err(PipelineError::Format {
            container: container.to_string(),
            reason: "no readable workbook in archive".to_string(),
        });
    }

    Ok((records, diagnostics))
}

/// Extracts long-form balance rows from one tier workbook.
pub fn read_workbook(
    bytes: &[u8],
    workbook_name: &str,
    config: &PipelineConfig,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<BalanceRecord>> {
    let workbook_tier = tier::from_file_name(workbook_name);

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let sheet_name = workbook
        .sheet_names()
        .iter()
        .find(|name| {
            let upper = name.to_uppercase();
            SHEET_MARKERS.iter().any(|marker| upper.contains(marker))
        })
        .cloned()
        .ok_or_else(|| PipelineError::Schema {
            container: workbook_name.to_string(),
            reason: "no financial-statement sheet".to_string(),
        })?;

    let range = workbook.worksheet_range(&sheet_name)?;
    let rows: Vec<&[Data]> = range.rows().collect();

    let (header_row, marker_column) =
        locate_header(&rows).ok_or_else(|| PipelineError::Schema {
            container: workbook_name.to_string(),
            reason: format!("header marker not found in first {HEADER_SCAN_LIMIT} rows"),
        })?;

    let date = date_above_header(&rows[..header_row])
        .or_else(|| date_from_file_name(workbook_name))
        .ok_or_else(|| PipelineError::Schema {
            container: workbook_name.to_string(),
            reason: "no reporting date in sheet or file name".to_string(),
        })?;

    // Institution columns: everything right of the metadata block.
    let header = rows[header_row];
    let mut institutions: Vec<(usize, String)> = Vec::new();
    for (column, cell) in header.iter().enumerate().skip(marker_column + METADATA_COLUMNS) {
        let raw = cell_text(cell);
        let raw = raw.trim();
        if raw.is_empty() || raw.contains(SYSTEM_TOTAL_MARKER) {
            continue;
        }
        let name = resolve_short_code(
            &canonical_name(raw, &config.names),
            workbook_tier,
            &config.names,
        );
        if is_ignored_institution(&name, config) {
            diagnostics.ignored_institutions += 1;
            continue;
        }
        institutions.push((column, name));
    }

    // Wide intermediate: one value sequence per institution column.
    let mut accounts: Vec<(String, String)> = Vec::new();
    let mut columns: BTreeMap<String, Vec<f64>> = institutions
        .iter()
        .map(|(_, name)| (name.clone(), Vec::new()))
        .collect();

    for row in rows.iter().skip(header_row + 1) {
        let code = row
            .get(marker_column)
            .map(cell_text)
            .unwrap_or_default()
            .trim()
            .to_string();
        if code.is_empty() {
            continue;
        }
        let label = row
            .get(marker_column + 1)
            .map(cell_text)
            .unwrap_or_default()
            .trim()
            .to_string();
        accounts.push((code, label));

        for (column, name) in &institutions {
            let value = match row.get(*column) {
                Some(Data::Float(f)) => *f,
                Some(Data::Int(i)) => *i as f64,
                Some(Data::Empty) | None => 0.0,
                Some(other) => parse_amount(&cell_text(other), diagnostics),
            };
            if let Some(series) = columns.get_mut(name) {
                series.push(value);
            }
        }
    }

    // Melt to long form.
    let mut records = Vec::with_capacity(accounts.len() * columns.len());
    for (institution, values) in &columns {
        for (index, (code, label)) in accounts.iter().enumerate() {
            records.push(BalanceRecord {
                date,
                tier: workbook_tier.to_string(),
                institution: institution.clone(),
                code: code.clone(),
                label: label.clone(),
                amount: values.get(index).copied().unwrap_or(0.0),
            });
        }
    }

    debug!(
        "{workbook_name}: {} accounts x {} institutions",
        accounts.len(),
        columns.len()
    );
    Ok(records)
}

fn locate_header(rows: &[&[Data]]) -> Option<(usize, usize)> {
    for (row_index, row) in rows.iter().take(HEADER_SCAN_LIMIT).enumerate() {
        for (column_index, cell) in row.iter().enumerate() {
            if let Data::String(text) = cell {
                let upper = text.trim().to_uppercase();
                if HEADER_MARKERS.iter().any(|marker| upper == *marker) {
                    return Some((row_index, column_index));
                }
            }
        }
    }
    None
}

/// First date-typed cell in the preamble rows above the data header.
fn date_above_header(rows: &[&[Data]]) -> Option<NaiveDate> {
    for row in rows {
        for cell in row.iter() {
            match cell {
                Data::DateTime(value) => {
                    if let Some(datetime) = value.as_datetime() {
                        return Some(month_end(datetime.date()));
                    }
                }
                Data::DateTimeIso(text) => {
                    if let Ok(date) = parse_report_date(text) {
                        return Some(month_end(date));
                    }
                }
                _ => {}
            }
        }
    }
    None
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(text) => text.clone(),
        Data::Float(value) => format!("{value}"),
        Data::Int(value) => format!("{value}"),
        Data::Bool(value) => format!("{value}"),
        Data::DateTimeIso(text) => text.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_header_by_marker() {
        let preamble = vec![Data::String("ESTADOS FINANCIEROS".into())];
        let header = vec![
            Data::String("CODIGO_CONTABLE".into()),
            Data::String("NOMBRE_CUENTA".into()),
        ];
        let rows_owned = [preamble, header];
        let rows: Vec<&[Data]> = rows_owned.iter().map(Vec::as_slice).collect();
        assert_eq!(locate_header(&rows), Some((1, 0)));
    }

    #[test]
    fn test_header_scan_is_bounded() {
        let filler = vec![Data::String("x".into())];
        let mut rows_owned: Vec<Vec<Data>> =
            (0..HEADER_SCAN_LIMIT).map(|_| filler.clone()).collect();
        rows_owned.push(vec![Data::String("CUENTA".into())]);
        let rows: Vec<&[Data]> = rows_owned.iter().map(Vec::as_slice).collect();
        assert_eq!(locate_header(&rows), None);
    }

    #[test]
    fn test_cell_text_formats_numeric_codes() {
        assert_eq!(cell_text(&Data::Float(14.0)), "14");
        assert_eq!(cell_text(&Data::Int(1404)), "1404");
        assert_eq!(cell_text(&Data::Empty), "");
    }
}
