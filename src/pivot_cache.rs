//! Cached-pivot-table parsing.
//!
//! Workbooks embed their pivot data as two XML parts per cache: a
//! definition holding the field list and per-field shared-item
//! dictionaries, and a records part whose rows reference those
//! dictionaries by index. The cache numbering shifts unpredictably across
//! years, so the ratio cache is detected by the field names it contains,
//! never by position.

use crate::error::{PipelineError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Seek};
use zip::ZipArchive;

const CACHE_DEFINITION_PREFIX: &str = "xl/pivotCache/pivotCacheDefinition";

/// One resolved cache cell. Dates stay textual (ISO) and are parsed by the
/// caller that knows which fields are dates.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Text(String),
    Number(f64),
    Missing,
}

impl CacheValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CacheValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CacheValue::Number(value) => Some(*value),
            CacheValue::Text(text) => text.trim().parse().ok(),
            CacheValue::Missing => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheField {
    pub name: String,
    /// Shared-item dictionary; indexed by `x` references in the records.
    pub shared: Vec<CacheValue>,
}

/// A record row keyed by field name.
pub type CacheRow = BTreeMap<String, CacheValue>;

fn attribute_value(element: &BytesStart, name: &[u8]) -> Result<Option<String>> {
    match element
        .try_get_attribute(name)
        .map_err(quick_xml::Error::from)?
    {
        Some(attribute) => Ok(Some(
            attribute
                .unescape_value()
                .map_err(quick_xml::Error::from)?
                .into_owned(),
        )),
        None => Ok(None),
    }
}

fn shared_item(tag: &[u8], element: &BytesStart) -> Result<Option<CacheValue>> {
    let value = match tag {
        b"s" | b"d" => CacheValue::Text(attribute_value(element, b"v")?.unwrap_or_default()),
        b"n" => CacheValue::Number(
            attribute_value(element, b"v")?
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0.0),
        ),
        b"m" | b"e" => CacheValue::Missing,
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Parses a `pivotCacheDefinition` part into its field list.
pub fn parse_cache_definition(xml: &str) -> Result<Vec<CacheField>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut fields: Vec<CacheField> = Vec::new();
    let mut in_shared_items = false;

    loop {
        match reader.read_event()? {
            Event::Start(element) | Event::Empty(element) => {
                match element.local_name().as_ref() {
                    b"cacheField" => {
                        let name = attribute_value(&element, b"name")?.unwrap_or_default();
                        fields.push(CacheField {
                            name,
                            shared: Vec::new(),
                        });
                        in_shared_items = false;
                    }
                    b"sharedItems" => in_shared_items = true,
                    tag if in_shared_items => {
                        if let Some(value) = shared_item(tag, &element)? {
                            if let Some(field) = fields.last_mut() {
                                field.shared.push(value);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::End(element) => {
                // Definitions carry trailing blocks (hierarchies, KPIs)
                // whose items must not leak into the last field.
                if matches!(element.local_name().as_ref(), b"sharedItems" | b"cacheField" | b"cacheFields") {
                    in_shared_items = false;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(fields)
}

/// Parses a `pivotCacheRecords` part, resolving `x` references through the
/// field dictionaries. Items beyond the declared field count are ignored.
pub fn parse_cache_records(xml: &str, fields: &[CacheField]) -> Result<Vec<CacheRow>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut rows: Vec<CacheRow> = Vec::new();
    let mut current: Option<Vec<CacheValue>> = None;

    loop {
        let event = reader.read_event()?;
        match &event {
            Event::Start(element) | Event::Empty(element) => {
                let tag = element.local_name();
                match tag.as_ref() {
                    b"r" => {
                        // An Empty <r/> is a complete (blank) record.
                        if matches!(event, Event::Empty(_)) {
                            rows.push(CacheRow::new());
                        } else {
                            current = Some(Vec::new());
                        }
                    }
                    b"x" => {
                        if let Some(items) = current.as_mut() {
                            let index: usize = attribute_value(element, b"v")?
                                .and_then(|v| v.trim().parse().ok())
                                .unwrap_or(0);
                            let field_index = items.len();
                            let value = fields
                                .get(field_index)
                                .and_then(|field| field.shared.get(index))
                                .cloned()
                                .unwrap_or(CacheValue::Missing);
                            items.push(value);
                        }
                    }
                    other => {
                        if let Some(items) = current.as_mut() {
                            if let Some(value) = shared_item(other, element)? {
                                items.push(value);
                            }
                        }
                    }
                }
            }
            Event::End(element) => {
                if element.local_name().as_ref() == b"r" {
                    if let Some(items) = current.take() {
                        rows.push(materialize_row(items, fields));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(rows)
}

fn materialize_row(items: Vec<CacheValue>, fields: &[CacheField]) -> CacheRow {
    items
        .into_iter()
        .take(fields.len())
        .enumerate()
        .map(|(index, value)| (fields[index].name.clone(), value))
        .collect()
}

/// Locates the cache whose fields contain at least two of the marker names,
/// returning the (definition, records) entry paths.
pub fn find_marked_cache<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    markers: &BTreeSet<String>,
) -> Result<Option<(String, String)>> {
    let mut definition_paths: Vec<String> = archive
        .file_names()
        .filter(|name| {
            name.starts_with(CACHE_DEFINITION_PREFIX)
                && name.ends_with(".xml")
                && !name.contains("_rels")
        })
        .map(str::to_string)
        .collect();
    definition_paths.sort();

    let entry_names: BTreeSet<String> = archive.file_names().map(str::to_string).collect();

    for definition_path in definition_paths {
        let xml = read_entry(archive, &definition_path)?;
        let fields = match parse_cache_definition(&xml) {
            Ok(fields) => fields,
            Err(_) => continue,
        };

        let hits = fields
            .iter()
            .filter(|field| markers.contains(&field.name))
            .count();
        if hits < 2 {
            continue;
        }

        let records_path = definition_path.replace("pivotCacheDefinition", "pivotCacheRecords");
        if entry_names.contains(&records_path) {
            return Ok(Some((definition_path, records_path)));
        }
    }

    Ok(None)
}

/// Reads a zip entry into a string, tolerating a leading BOM.
pub fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<String> {
    let mut entry = archive.by_name(name).map_err(PipelineError::from)?;
    let mut content = String::new();
    entry.read_to_string(&mut content)?;
    Ok(content.trim_start_matches('\u{feff}').to_string())
}
