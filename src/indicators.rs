//! Regulatory ratio extraction.
//!
//! The regulator pre-computes ratio indicators and publishes them only
//! inside workbook pivot tables. The raw observations live in the cached
//! pivot data block, which is located by content (marker field names) and
//! reshaped from one-column-per-indicator into long form through the static
//! taxonomy.

use crate::config::PipelineConfig;
use crate::dates::parse_report_date;
use crate::diagnostics::Diagnostics;
use crate::error::{PipelineError, Result};
use crate::names::{canonical_name, resolve_short_code};
use crate::pivot_cache::{find_marked_cache, parse_cache_definition, parse_cache_records, read_entry, CacheRow};
use crate::reader::{is_ignored_institution, SourceContainer, SYSTEM_TOTAL_MARKER};
use crate::schema::{latest_tier_by_institution, IndicatorRecord};
use chrono::NaiveDate;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read};
use zip::ZipArchive;

const INSTITUTION_FIELD: &str = "NOM_RAZON_SOCIAL";
const DATE_FIELD: &str = "FEC_CORTE";
const TIER_FIELD: &str = "SEGMENTO";

/// Extracts and consolidates indicators across all containers.
///
/// Best effort: unreadable containers and workbooks without a detectable
/// ratio block are skipped with diagnostics. Extracting nothing at all is
/// reported but left to the caller to judge.
pub fn extract(
    containers: &[SourceContainer],
    config: &PipelineConfig,
) -> (Vec<IndicatorRecord>, Diagnostics) {
    let mut all = Vec::new();
    let mut diagnostics = Diagnostics::default();

    for container in containers {
        match extract_container(container, config) {
            Ok((records, container_diagnostics)) => {
                diagnostics.merge(container_diagnostics);
                all.extend(records);
            }
            Err(error) => {
                warn!("skipping indicator container {}: {error}", container.name);
                diagnostics.skipped_containers.push(container.name.clone());
            }
        }
    }

    if all.is_empty() {
        warn!("no indicators extracted from any container");
    }

    let table = consolidate(all, &mut diagnostics);
    (table, diagnostics)
}

/// Extracts indicator rows from every tier workbook in one container.
pub fn extract_container(
    container: &SourceContainer,
    config: &PipelineConfig,
) -> Result<(Vec<IndicatorRecord>, Diagnostics)> {
    let mut archive = ZipArchive::new(File::open(&container.path)?)?;
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

    for workbook_name in workbook_names {
        let file_name = workbook_name
            .rsplit('/')
            .next()
            .unwrap_or(&workbook_name)
            .to_string();
        if is_ignored_institution(&file_name, config) {
            debug!("{}: ignoring workbook {file_name}", container.name);
            continue;
        }

        let mut bytes = Vec::new();
        archive.by_name(&workbook_name)?.read_to_end(&mut bytes)?;

        match extract_workbook(&bytes, &file_name, config, &mut diagnostics) {
            Ok(rows) => records.extend(rows),
            Err(error) => {
                warn!("{}: skipping workbook {file_name}: {error}", container.name);
                diagnostics
                    .skipped_workbooks
                    .push(format!("{}/{file_name}", container.name));
            }
        }
    }

    Ok((records, diagnostics))
}

/// Pulls the ratio rows out of one workbook's cached pivot block.
pub fn extract_workbook(
    bytes: &[u8],
    workbook_name: &str,
    config: &PipelineConfig,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<IndicatorRecord>> {
    let fallback_tier = crate::schema::tier::from_file_name(workbook_name);

    let mut workbook = ZipArchive::new(Cursor::new(bytes))?;
    let (definition_path, records_path) =
        find_marked_cache(&mut workbook, &config.indicator_markers)?.ok_or_else(|| {
            PipelineError::Schema {
                container: workbook_name.to_string(),
                reason: "no pivot cache with indicator marker fields".to_string(),
            }
        })?;

    let fields = parse_cache_definition(&read_entry(&mut workbook, &definition_path)?)?;
    let rows = parse_cache_records(&read_entry(&mut workbook, &records_path)?, &fields)?;

    let mut records = Vec::new();
    for row in rows {
        records.extend(melt_row(&row, fallback_tier, config, diagnostics));
    }

    debug!("{workbook_name}: {} indicator rows", records.len());
    Ok(records)
}

/// Reshapes one wide cache row into long-form indicator records.
fn melt_row(
    row: &CacheRow,
    fallback_tier: &str,
    config: &PipelineConfig,
    diagnostics: &mut Diagnostics,
) -> Vec<IndicatorRecord> {
    let raw_name = match row.get(INSTITUTION_FIELD).and_then(|v| v.as_text()) {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => return Vec::new(),
    };
    if raw_name.contains(SYSTEM_TOTAL_MARKER) {
        diagnostics.system_total_rows += 1;
        return Vec::new();
    }

    let date = match row
        .get(DATE_FIELD)
        .and_then(date_value)
    {
        Some(date) => date,
        None => {
            diagnostics.missing_dates += 1;
            return Vec::new();
        }
    };

    let row_tier = row
        .get(TIER_FIELD)
        .and_then(|v| v.as_text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .unwrap_or(fallback_tier)
        .to_string();

    let institution = resolve_short_code(
        &canonical_name(&raw_name, &config.names),
        &row_tier,
        &config.names,
    );
    if is_ignored_institution(&institution, config) {
        diagnostics.ignored_institutions += 1;
        return Vec::new();
    }

    let mut records = Vec::new();
    for (field, value) in row {
        let Some(mapping) = config.indicator_for(field) else {
            continue;
        };
        match value.as_number() {
            Some(number) => records.push(IndicatorRecord {
                institution: institution.clone(),
                tier: row_tier.clone(),
                date,
                code: mapping.code.clone(),
                label: mapping.label.clone(),
                value: number,
                category: mapping.category.clone(),
            }),
            None => diagnostics.missing_values += 1,
        }
    }
    records
}

fn date_value(value: &crate::pivot_cache::CacheValue) -> Option<NaiveDate> {
    value
        .as_text()
        .and_then(|text| parse_report_date(text).ok())
}

/// Tier-unifies and deduplicates the combined extract, last occurrence wins.
pub fn consolidate(
    records: Vec<IndicatorRecord>,
    diagnostics: &mut Diagnostics,
) -> Vec<IndicatorRecord> {
    let latest = latest_tier_by_institution(
        records
            .iter()
            .map(|record| (record.institution.as_str(), record.date, record.tier.as_str())),
    );

    let mut by_key: BTreeMap<(String, NaiveDate, String), IndicatorRecord> = BTreeMap::new();
    for mut record in records {
        if let Some(tier) = latest.get(&record.institution) {
            record.tier.clone_from(tier);
        }
        let key = (record.institution.clone(), record.date, record.code.clone());
        if by_key.insert(key, record).is_some() {
            diagnostics.duplicate_keys += 1;
        }
    }

    by_key.into_values().collect()
}
