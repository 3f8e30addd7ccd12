use std::io::Write;

use anyhow::Context;

use crate::analysis::kpi::{KpiSet, KpiValue};
use crate::data::model::{CellValue, Dataset};
use crate::error::{DashError, Result};

fn field(cell: &CellValue) -> String {
    match cell {
        CellValue::Null => String::new(),
        CellValue::Date(d) => d.format("%Y-%m-%dT%H:%M:%S").to_string(),
        other => other.to_string(),
    }
}

/// Write `dataset` as delimited text with a header row.  Dates are ISO 8601
/// and nulls are empty fields.
pub fn write_delimited<W: Write>(dataset: &Dataset, delimiter: u8, out: W) -> Result<()> {
    write_records(dataset, delimiter, out)
        .map_err(|e| DashError::Io(std::io::Error::other(format!("{e:#}"))))
}

fn write_records<W: Write>(dataset: &Dataset, delimiter: u8, out: W) -> anyhow::Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(out);
    writer
        .write_record(&dataset.columns)
        .context("writing header")?;
    for (i, row) in dataset.rows.iter().enumerate() {
        writer
            .write_record(row.iter().map(field))
            .with_context(|| format!("writing row {}", i + 1))?;
    }
    writer.flush().context("flushing output")?;
    Ok(())
}

/// Convenience wrapper returning the export as bytes.
pub fn to_delimited_bytes(dataset: &Dataset, delimiter: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_delimited(dataset, delimiter, &mut buf)?;
    log::info!(
        "Exported {} rows x {} columns ({} bytes)",
        dataset.len(),
        dataset.width(),
        buf.len()
    );
    Ok(buf)
}

// ---------------------------------------------------------------------------
// KPI summary table
// ---------------------------------------------------------------------------

const SUMMARY_HEADER: [&str; 10] = [
    "Metric", "Count", "Sum", "Mean", "Median", "Std Dev", "Min", "Max", "Range", "CV (%)",
];

fn amount(value: f64) -> String {
    format!("{value:.2}")
}

fn percent(value: KpiValue) -> String {
    value.as_f64().map(|v| format!("{v:.1}")).unwrap_or_default()
}

/// One row per KPI column with its descriptive statistics.  An undefined
/// coefficient of variation is an empty field.
pub fn metrics_summary_bytes(kpis: &KpiSet, delimiter: u8) -> Result<Vec<u8>> {
    write_summary(kpis, delimiter)
        .map_err(|e| DashError::Io(std::io::Error::other(format!("{e:#}"))))
}

fn write_summary(kpis: &KpiSet, delimiter: u8) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    writer
        .write_record(SUMMARY_HEADER)
        .context("writing header")?;
    for c in &kpis.columns {
        writer
            .write_record([
                c.column.clone(),
                c.count.to_string(),
                amount(c.total),
                amount(c.mean),
                amount(c.median),
                amount(c.std_dev),
                amount(c.min),
                amount(c.max),
                amount(c.range),
                percent(c.cv_pct),
            ])
            .with_context(|| format!("writing metrics for {}", c.column))?;
    }
    writer.into_inner().context("flushing metrics summary")
}
