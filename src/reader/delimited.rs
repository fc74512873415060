//! Delimited-text source path (containers up to and including the schema
//! break year use `;`, later ones use tabs and renamed headers).

use crate::config::PipelineConfig;
use crate::dates::parse_report_date;
use crate::diagnostics::Diagnostics;
use crate::error::{PipelineError, Result};
use crate::names::canonical_name;
use crate::reader::{is_ignored_institution, parse_amount, SYSTEM_TOTAL_MARKER};
use crate::schema::{tier, BalanceRecord};
use csv::ReaderBuilder;
use log::debug;
use std::io::{Read, Seek};
use zip::ZipArchive;

/// First reporting year published with tab-separated files and the renamed
/// header set.
pub const SCHEMA_BREAK_YEAR: i32 = 2022;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Date,
    Tier,
    TaxId,
    Institution,
    Code,
    Label,
    Amount,
}

/// Maps a normalized source header to its canonical field. Both the older
/// underscore spellings and the newer spaced spellings are accepted.
fn canonical_column(header: &str) -> Option<Column> {
    match header {
        "FECHA DE CORTE" | "FECHA_DE_CORTE" => Some(Column::Date),
        "SEGMENTO" => Some(Column::Tier),
        "RUC" => Some(Column::TaxId),
        "RAZON SOCIAL" | "RAZON_SOCIAL" => Some(Column::Institution),
        "CUENTA" => Some(Column::Code),
        "DESCRIPCION CUENTA" | "DESCRIPCION_CUENTA" => Some(Column::Label),
        "SALDO (USD)" | "SALDO_USD" => Some(Column::Amount),
        _ => None,
    }
}

/// Strips the byte-order mark and surrounding whitespace from a header cell.
fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_string()
}

struct ColumnIndexes {
    date: usize,
    tier: Option<usize>,
    institution: usize,
    code: usize,
    label: usize,
    amount: usize,
}

fn resolve_columns(headers: &csv::StringRecord, container: &str) -> Result<ColumnIndexes> {
    let mut date = None;
    let mut tier_col = None;
    let mut institution = None;
    let mut code = None;
    let mut label = None;
    let mut amount = None;

    for (index, raw) in headers.iter().enumerate() {
        match canonical_column(&normalize_header(raw)) {
            Some(Column::Date) => date = Some(index),
            Some(Column::Tier) => tier_col = Some(index),
            Some(Column::Institution) => institution = Some(index),
            Some(Column::Code) => code = Some(index),
            Some(Column::Label) => label = Some(index),
            Some(Column::Amount) => amount = Some(index),
            Some(Column::TaxId) | None => {}
        }
    }

    let missing = |field: &str| PipelineError::Schema {
        container: container.to_string(),
        reason: format!("required column {field} not found"),
    };

    Ok(ColumnIndexes {
        date: date.ok_or_else(|| missing("FECHA DE CORTE"))?,
        tier: tier_col,
        institution: institution.ok_or_else(|| missing("RAZON SOCIAL"))?,
        code: code.ok_or_else(|| missing("CUENTA"))?,
        label: label.ok_or_else(|| missing("DESCRIPCION CUENTA"))?,
        amount: amount.ok_or_else(|| missing("SALDO (USD)"))?,
    })
}

/// Reads the single delimited data file inside a container.
pub fn read_container<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    year: i32,
    container: &str,
    config: &PipelineConfig,
) -> Result<(Vec<BalanceRecord>, Diagnostics)> {
    let entry_name = archive
        .file_names()
        .find(|name| {
            let lower = name.to_lowercase();
            lower.ends_with(".csv") || lower.ends_with(".txt")
        })
        .map(str::to_string)
        .ok_or_else(|| PipelineError::Format {
            container: container.to_string(),
            reason: "no delimited data file in archive".to_string(),
        })?;

    let entry = archive.by_name(&entry_name)?;
    let rows = read_rows(entry, year, container, config)?;
    debug!("{container}: {} balance rows", rows.0.len());
    Ok(rows)
}

/// Parses delimited rows into balance records.
pub fn read_rows<R: Read>(
    reader: R,
    year: i32,
    container: &str,
    config: &PipelineConfig,
) -> Result<(Vec<BalanceRecord>, Diagnostics)> {
    let delimiter = if year >= SCHEMA_BREAK_YEAR { b'\t' } else { b';' };

    let mut csv_reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let columns = resolve_columns(&headers, container)?;

    let mut records = Vec::new();
    let mut diagnostics = Diagnostics::default();

    for row in csv_reader.records() {
        let row = row?;

        let raw_name = row.get(columns.institution).unwrap_or("").trim();
        if raw_name.contains(SYSTEM_TOTAL_MARKER) {
            diagnostics.system_total_rows += 1;
            continue;
        }
        let institution = canonical_name(raw_name, &config.names);
        if institution.is_empty() || is_ignored_institution(&institution, config) {
            diagnostics.ignored_institutions += 1;
            continue;
        }

        let date = match row.get(columns.date).map(parse_report_date) {
            Some(Ok(date)) => date,
            _ => {
                diagnostics.missing_dates += 1;
                continue;
            }
        };

        let row_tier = columns
            .tier
            .and_then(|index| row.get(index))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(tier::UNKNOWN)
            .to_string();

        let code = row.get(columns.code).unwrap_or("").trim().to_string();
        if code.is_empty() {
            continue;
        }
        let label = row.get(columns.label).unwrap_or("").trim().to_string();
        let amount = parse_amount(row.get(columns.amount).unwrap_or(""), &mut diagnostics);

        records.push(BalanceRecord {
            date,
            tier: row_tier,
            institution,
            code,
            label,
            amount,
        });
    }

    Ok((records, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OLD_STYLE: &str = "\u{feff}FECHA_DE_CORTE;SEGMENTO;RUC;RAZON_SOCIAL;CUENTA;DESCRIPCION_CUENTA;SALDO_USD\n\
        2020-01-31;SEGMENTO 1;0990000000001;COOPERATIVA DE AHORRO Y CREDITO X LIMITADA;1;ACTIVOS;1000,50\n\
        2020-01-31;SEGMENTO 1;0990000000001;COOPERATIVA DE AHORRO Y CREDITO X LIMITADA;14;CARTERA DE CREDITOS;600,00\n";

    const NEW_STYLE: &str = "FECHA DE CORTE\tSEGMENTO\tRUC\tRAZON SOCIAL\tCUENTA\tDESCRIPCION CUENTA\tSALDO (USD)\n\
        2022-03-31\tSEGMENTO 2\t099\tANDINA LTDA.\t21\tOBLIGACIONES CON EL PUBLICO\t88.25\n";

    #[test]
    fn test_reads_old_style_semicolon_rows() {
        let config = PipelineConfig::default();
        let (rows, diagnostics) =
            read_rows(OLD_STYLE.as_bytes(), 2020, "2020-EEFF-MEN.zip", &config).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].institution, "X LTDA");
        assert_eq!(rows[0].amount, 1000.50);
        assert_eq!(rows[1].code, "14");
        assert_eq!(rows[1].amount, 600.0);
        assert!(diagnostics.is_clean());
    }

    #[test]
    fn test_reads_new_style_tab_rows() {
        let config = PipelineConfig::default();
        let (rows, _) = read_rows(NEW_STYLE.as_bytes(), 2022, "2022_EEFF-Men.zip", &config).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].institution, "ANDINA LTDA");
        assert_eq!(rows[0].tier, "SEGMENTO 2");
        assert_eq!(rows[0].amount, 88.25);
    }

    #[test]
    fn test_missing_required_column_is_schema_error() {
        let config = PipelineConfig::default();
        let input = "FECHA_DE_CORTE;SEGMENTO;RAZON_SOCIAL;CUENTA;DESCRIPCION_CUENTA\n";
        let err = read_rows(input.as_bytes(), 2020, "2020.zip", &config).unwrap_err();
        assert!(matches!(err, PipelineError::Schema { .. }));
    }

    #[test]
    fn test_degrades_bad_amounts_and_skips_totals() {
        let config = PipelineConfig::default();
        let input = "FECHA_DE_CORTE;SEGMENTO;RUC;RAZON_SOCIAL;CUENTA;DESCRIPCION_CUENTA;SALDO_USD\n\
            2020-01-31;SEGMENTO 1;099;X LTDA;1;ACTIVOS;no disponible\n\
            2020-01-31;SEGMENTO 1;099;VT_TOTAL SEGMENTO 1;1;ACTIVOS;999\n\
            2020-01-31;SEGMENTO 1;099;CONAFIPS;1;ACTIVOS;5\n";
        let (rows, diagnostics) = read_rows(input.as_bytes(), 2020, "2020.zip", &config).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, 0.0);
        assert_eq!(diagnostics.coerced_zero, 1);
        assert_eq!(diagnostics.system_total_rows, 1);
        assert_eq!(diagnostics.ignored_institutions, 1);
    }
}
