//! Source container access.
//!
//! A container is one archive published for one year. Older years hold a
//! single delimited text file; newer years hold one spreadsheet workbook per
//! classification tier. The format is resolved once per container into a
//! tagged variant and dispatched explicitly, so a future third layout is a
//! localized change.

pub mod delimited;
pub mod spreadsheet;

use crate::config::PipelineConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{PipelineError, Result};
use crate::schema::BalanceRecord;
use log::info;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Institution-name marker for system-wide aggregate rows.
pub const SYSTEM_TOTAL_MARKER: &str = "VT_TOTAL";

const SPREADSHEET_EXTENSIONS: &[&str] = &[".xlsm", ".xlsb", ".xlsx"];
const DELIMITED_EXTENSIONS: &[&str] = &[".csv", ".txt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    DelimitedText,
    SpreadsheetBinary,
}

/// One source archive, its declared year, and its resolved format.
#[derive(Debug)]
pub struct SourceContainer {
    pub path: PathBuf,
    pub name: String,
    pub year: i32,
    pub format: SourceFormat,
}

impl SourceContainer {
    /// Opens a container, parsing the year from its file name and probing
    /// the entry list to resolve the format.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let year = declared_year(&name).ok_or_else(|| PipelineError::Format {
            container: name.clone(),
            reason: "file name does not start with a 4-digit year".to_string(),
        })?;

        let mut archive = ZipArchive::new(File::open(&path)?)?;
        let format = resolve_format(&mut archive).ok_or_else(|| PipelineError::Format {
            container: name.clone(),
            reason: "no data-bearing file found in archive".to_string(),
        })?;

        Ok(Self {
            path,
            name,
            year,
            format,
        })
    }

    /// Reads the container into the uniform long-form row set.
    pub fn read_balances(
        &self,
        config: &PipelineConfig,
    ) -> Result<(Vec<BalanceRecord>, Diagnostics)> {
        info!("reading container {} ({} path)", self.name, match self.format {
            SourceFormat::DelimitedText => "delimited-text",
            SourceFormat::SpreadsheetBinary => "spreadsheet",
        });
        let mut archive = ZipArchive::new(File::open(&self.path)?)?;
        match self.format {
            SourceFormat::DelimitedText => {
                delimited::read_container(&mut archive, self.year, &self.name, config)
            }
            SourceFormat::SpreadsheetBinary => {
                spreadsheet::read_container(&mut archive, &self.name, config)
            }
        }
    }
}

/// Leading 4-digit year of a container file name (`2022_EEFF-Men.zip`).
pub fn declared_year(name: &str) -> Option<i32> {
    let token = name.split(['-', '_']).next()?;
    if token.len() == 4 && token.bytes().all(|b| b.is_ascii_digit()) {
        token.parse().ok()
    } else {
        None
    }
}

fn resolve_format<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>) -> Option<SourceFormat> {
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    let has_extension = |extensions: &[&str]| {
        names.iter().any(|entry| {
            let lower = entry.to_lowercase();
            extensions.iter().any(|ext| lower.ends_with(ext))
        })
    };

    if has_extension(SPREADSHEET_EXTENSIONS) {
        Some(SourceFormat::SpreadsheetBinary)
    } else if has_extension(DELIMITED_EXTENSIONS) {
        Some(SourceFormat::DelimitedText)
    } else {
        None
    }
}

/// Coerces an amount field to a number, tolerating decimal commas.
///
/// Unparseable values degrade to zero rather than poisoning aggregates with
/// nulls; every coercion is counted.
pub fn parse_amount(raw: &str, diagnostics: &mut Diagnostics) -> f64 {
    let cleaned = raw.trim().replace(',', ".");
    if cleaned.is_empty() {
        return 0.0;
    }
    match cleaned.parse() {
        Ok(value) => value,
        Err(_) => {
            diagnostics.coerced_zero += 1;
            0.0
        }
    }
}

/// True when the institution is on the non-retail ignore-list.
pub fn is_ignored_institution(name: &str, config: &PipelineConfig) -> bool {
    let upper = name.to_uppercase();
    config
        .ignore_institutions
        .iter()
        .any(|ignored| upper.contains(&ignored.to_uppercase()))
}
