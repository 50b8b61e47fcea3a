//! CSV loading for model tables and truth-table sheets.
//!
//! A model file is one header row followed by one row per element. A
//! truth-table file starts with an `<element>,<mode>` row, then the
//! regulator header row (regulators, outcome, optional regulation delay),
//! then one row per combination of regulator levels.

use std::path::Path;

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use levelnet_core::{ModelTable, TruthTableSheet};
use tracing::debug;

fn reader(path: &Path, has_headers: bool) -> Result<csv::Reader<std::fs::File>> {
    ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(str::is_empty)
}

/// Read the element table and attach every truth-table sheet in `tables`.
pub fn load_model(path: &Path, tables: &[impl AsRef<Path>]) -> Result<ModelTable> {
    let mut rdr = reader(path, true)?;
    let headers = rdr
        .headers()
        .with_context(|| format!("failed to read header row of {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut table = ModelTable::new(headers);
    for (line, record) in rdr.records().enumerate() {
        let record =
            record.with_context(|| format!("{}: malformed row {}", path.display(), line + 2))?;
        if is_blank(&record) {
            continue;
        }
        table.push_row(record.iter());
    }
    debug!(path = %path.display(), rows = table.rows.len(), "model table loaded");

    for sheet in tables {
        let sheet = load_truth_table(sheet.as_ref())?;
        if table.truth_table_for(&sheet.element).is_some() {
            bail!("more than one truth table for element {}", sheet.element);
        }
        table.truth_tables.push(sheet);
    }
    Ok(table)
}

pub fn load_truth_table(path: &Path) -> Result<TruthTableSheet> {
    let mut records = Vec::new();
    for record in reader(path, false)?.records() {
        let record = record.with_context(|| format!("{}: malformed row", path.display()))?;
        if !is_blank(&record) {
            records.push(record);
        }
    }
    let mut records = records.into_iter();

    let Some(title) = records.next() else {
        bail!("{}: empty truth table", path.display());
    };
    let element = title.get(0).unwrap_or_default().to_string();
    if element.is_empty() {
        bail!("{}: first row must name the regulated element", path.display());
    }
    let mode = title.get(1).unwrap_or_default().to_string();

    let Some(header) = records.next() else {
        bail!("{}: missing regulator header row", path.display());
    };
    let mut columns: Vec<&str> = header.iter().collect();
    if columns
        .last()
        .is_some_and(|c| c.to_lowercase().contains("delay"))
    {
        columns.pop();
    }
    // outcome column
    if columns.pop().is_none() {
        bail!("{}: regulator header row is empty", path.display());
    }
    let regulators = columns.into_iter().map(str::to_string).collect();

    let rows = records
        .map(|r| r.iter().map(str::to_string).collect())
        .collect();

    Ok(TruthTableSheet {
        element,
        mode,
        regulators,
        rows,
    })
}
