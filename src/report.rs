//! Plain-text rendering of dashboard responses for the terminal.

use std::fmt::Write;

use crate::analysis::charts::ChartData;
use crate::analysis::kpi::{ColumnKpis, KpiSet};
use crate::app::{RenderedChart, Response};
use crate::data::cleaner::{ColumnProfile, QualitySummary};

/// Money-style headline figure: `$1.23B`, `$4.56M`, `$7.89K`, `$12.00`.
pub fn compact_amount(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let abs = value.abs();
    let body = if abs >= 1e9 {
        format!("{:.2}B", abs / 1e9)
    } else if abs >= 1e6 {
        format!("{:.2}M", abs / 1e6)
    } else if abs >= 1e3 {
        format!("{:.2}K", abs / 1e3)
    } else {
        format!("{abs:.2}")
    };
    format!("{sign}${body}")
}

pub fn render(response: &Response) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_response(&mut out, response);
    out
}

fn write_response(out: &mut String, response: &Response) -> std::fmt::Result {
    match response {
        Response::Cleaned {
            source,
            quality,
            profiles,
            ..
        } => render_cleaned(out, source.as_deref(), quality, profiles),
        Response::Filtered {
            visible_rows,
            total_rows,
        } => writeln!(out, "Showing {visible_rows} of {total_rows} rows"),
        Response::Goals { goals } => {
            writeln!(out, "Analysis goals:")?;
            for g in goals {
                writeln!(out, "  - {}", g.as_str())?;
            }
            Ok(())
        }
        Response::Kpis { filtered, kpis, .. } => render_kpis(out, kpis, *filtered),
        Response::Charts { filtered, charts } => render_charts(out, charts, *filtered),
        Response::Insight { text } => writeln!(out, "{text}"),
        Response::Exported { content, .. } => write!(out, "{content}"),
        Response::Reset => writeln!(out, "Session reset"),
        Response::Error { kind, message } => writeln!(out, "error ({}): {message}", kind.as_str()),
    }
}

fn render_cleaned(
    out: &mut String,
    source: Option<&str>,
    q: &QualitySummary,
    profiles: &[ColumnProfile],
) -> std::fmt::Result {
    writeln!(out, "== Data quality: {} ==", source.unwrap_or("dataset"))?;
    writeln!(out, "Rows:            {}", q.total_rows)?;
    writeln!(out, "Columns:         {}", q.total_columns)?;
    writeln!(out, "Missing cells:   {} ({:.1}%)", q.missing_cells, q.missing_pct)?;
    writeln!(out, "Duplicate rows:  {} ({:.1}%)", q.duplicate_rows, q.duplicate_pct)?;
    if q.duplicates_removed > 0 {
        writeln!(out, "Removed:         {} duplicates", q.duplicates_removed)?;
    }
    if q.imputed_cells > 0 {
        writeln!(out, "Imputed:         {} cells", q.imputed_cells)?;
    }

    writeln!(out)?;
    writeln!(out, "{:<24} {:<12} {:>8} {:>8}  kpi", "column", "type", "missing", "unique")?;
    for p in profiles {
        writeln!(
            out,
            "{:<24} {:<12} {:>8} {:>8}  {}",
            p.name,
            p.column_type.to_string(),
            p.missing,
            p.unique,
            if p.kpi_eligible { "yes" } else { "" }
        )?;
    }

    if !q.issues.is_empty() {
        writeln!(out)?;
        writeln!(out, "Issues:")?;
        for issue in &q.issues {
            writeln!(out, "  - {issue}")?;
        }
    }
    Ok(())
}

fn kpi_card(out: &mut String, c: &ColumnKpis) -> std::fmt::Result {
    writeln!(out, "[{}] {}", c.column, compact_amount(c.total))?;
    writeln!(
        out,
        "  mean {:.2} | median {:.2} | min {:.2} | max {:.2} | std {:.2} | n {}",
        c.mean, c.median, c.min, c.max, c.std_dev, c.count
    )?;
    writeln!(
        out,
        "  range {:.2} | variance {:.2} | cv {} | skew {} | kurtosis {}",
        c.range, c.variance, c.cv_pct, c.skewness, c.kurtosis
    )?;
    writeln!(
        out,
        "  growth {} | avg change {} | volatility {}",
        c.growth_rate, c.avg_period_change, c.volatility
    )
}

fn render_kpis(out: &mut String, kpis: &KpiSet, filtered: bool) -> std::fmt::Result {
    writeln!(out, "== KPIs{} ==", if filtered { " (filtered)" } else { "" })?;
    if let Some(period) = &kpis.period_column {
        writeln!(out, "Period order: {period}")?;
    }
    for c in &kpis.columns {
        kpi_card(out, c)?;
    }
    if !kpis.ratios.is_empty() {
        writeln!(out)?;
        writeln!(out, "Financial ratios:")?;
        for r in &kpis.ratios {
            writeln!(
                out,
                "  {:<14} {:>10}   ({} / {})",
                r.name,
                r.aggregate.to_string(),
                r.numerator,
                r.denominator
            )?;
        }
    }
    Ok(())
}

fn render_charts(out: &mut String, charts: &[RenderedChart], filtered: bool) -> std::fmt::Result {
    writeln!(out, "== Charts{} ==", if filtered { " (filtered)" } else { "" })?;
    for (i, chart) in charts.iter().enumerate() {
        writeln!(out, "{}. {} [{:?}] - {}", i + 1, chart.spec.title, chart.spec.kind, chart.spec.reason)?;
        match &chart.data {
            ChartData::Line { points } => {
                if let (Some(first), Some(last)) = (points.first(), points.last()) {
                    writeln!(
                        out,
                        "   {} points, {} .. {}",
                        points.len(),
                        first.0.format("%Y-%m-%d"),
                        last.0.format("%Y-%m-%d")
                    )?;
                }
            }
            ChartData::Bar { entries } => {
                for e in entries {
                    writeln!(out, "   {:<20} {:>14.2}  {}", e.category.to_string(), e.value, e.color)?;
                }
            }
            ChartData::Scatter { points } => writeln!(out, "   {} points", points.len())?,
            ChartData::Heatmap { columns, matrix } => {
                for (name, row) in columns.iter().zip(matrix) {
                    let cells: Vec<String> = row
                        .iter()
                        .map(|r| r.map_or("   -  ".to_string(), |v| format!("{v:>6.2}")))
                        .collect();
                    writeln!(out, "   {:<16} {}", name, cells.join(" "))?;
                }
            }
        }
    }
    Ok(())
}
