use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::color::{ColorMap, DEFAULT_COLOR, generate_palette};
use crate::data::cleaner::ColumnProfile;
use crate::data::model::{CellValue, ColumnType, Dataset};
use crate::error::{DashError, Result};

/// Line charts drawn for the first date column.
const MAX_LINE_SERIES: usize = 3;
/// Categorical and numeric columns crossed into bar charts.
const MAX_BAR_AXES: usize = 2;
/// |r| above this counts as a strong correlation.
pub const STRONG_CORRELATION: f64 = 0.7;

pub const DEFAULT_TOP_N: usize = 10;
pub const TOP_N_RANGE: (usize, usize) = (5, 30);

// ---------------------------------------------------------------------------
// Recommendation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Line,
    Bar,
    Scatter,
    Heatmap,
}

/// A chart kind bound to concrete columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    /// Date, category or first numeric column; `None` for heatmaps.
    pub x: Option<String>,
    pub y: Vec<String>,
    pub reason: String,
    /// One colour per `y` column.  The same numeric column always gets the
    /// same colour across charts.
    pub colors: Vec<String>,
}

/// Deterministic chart recommendations for a set of column profiles.
///
/// Rules, applied in order:
/// 1. first date column against each numeric column (at most three) → line
/// 2. first two categorical columns against the first two numeric → bar
/// 3. two or more numeric columns → scatter of the first two
/// 4. three or more numeric columns → correlation heatmap
///
/// Only KPI-eligible numeric columns take part.
pub fn recommend_charts(profiles: &[ColumnProfile]) -> Result<Vec<ChartSpec>> {
    let numeric: Vec<&str> = profiles
        .iter()
        .filter(|p| p.column_type == ColumnType::Numeric && p.kpi_eligible)
        .map(|p| p.name.as_str())
        .collect();
    if numeric.is_empty() {
        return Err(DashError::InsufficientData(
            "charts need a numeric column with at least 2 values".into(),
        ));
    }

    let palette = generate_palette(numeric.len());
    let color_of = |col: &str| -> String {
        numeric
            .iter()
            .position(|n| *n == col)
            .and_then(|i| palette.get(i).cloned())
            .unwrap_or_else(|| DEFAULT_COLOR.to_string())
    };

    let first_of = |ty: ColumnType| profiles.iter().find(|p| p.column_type == ty);
    let categorical: Vec<&str> = profiles
        .iter()
        .filter(|p| p.column_type == ColumnType::Categorical)
        .map(|p| p.name.as_str())
        .take(MAX_BAR_AXES)
        .collect();

    let mut charts = Vec::new();

    if let Some(date) = first_of(ColumnType::Date) {
        for num in numeric.iter().take(MAX_LINE_SERIES) {
            charts.push(ChartSpec {
                kind: ChartKind::Line,
                title: format!("{num} Trend Over Time"),
                x: Some(date.name.clone()),
                y: vec![num.to_string()],
                reason: format!("'{}' is a date column and '{num}' is numeric", date.name),
                colors: vec![color_of(num)],
            });
        }
    }

    for cat in &categorical {
        for num in numeric.iter().take(MAX_BAR_AXES) {
            charts.push(ChartSpec {
                kind: ChartKind::Bar,
                title: format!("{num} by {cat}"),
                x: Some(cat.to_string()),
                y: vec![num.to_string()],
                reason: format!("'{cat}' is categorical and '{num}' is numeric"),
                colors: vec![color_of(num)],
            });
        }
    }

    if let [a, b, ..] = numeric.as_slice() {
        charts.push(ChartSpec {
            kind: ChartKind::Scatter,
            title: format!("{b} vs {a}"),
            x: Some(a.to_string()),
            y: vec![b.to_string()],
            reason: "two numeric columns can be compared point by point".into(),
            colors: vec![color_of(b)],
        });
    }

    if numeric.len() >= 3 {
        charts.push(ChartSpec {
            kind: ChartKind::Heatmap,
            title: "Correlation Heatmap".into(),
            x: None,
            y: numeric.iter().map(|n| n.to_string()).collect(),
            reason: format!("{} numeric columns have pairwise correlations", numeric.len()),
            colors: numeric.iter().map(|n| color_of(n)).collect(),
        });
    }

    log::debug!("Recommended {} charts", charts.len());
    Ok(charts)
}

// ---------------------------------------------------------------------------
// Materialised chart data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarEntry {
    pub category: CellValue,
    pub value: f64,
    pub color: String,
}

/// The points a renderer would draw for a [`ChartSpec`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartData {
    Line {
        points: Vec<(NaiveDateTime, f64)>,
    },
    Bar {
        entries: Vec<BarEntry>,
    },
    Scatter {
        points: Vec<(f64, f64)>,
    },
    Heatmap {
        columns: Vec<String>,
        /// Row-major; `None` where a pair has no variance.
        matrix: Vec<Vec<Option<f64>>>,
    },
}

fn index_of(dataset: &Dataset, name: &str) -> Result<usize> {
    dataset
        .column_index(name)
        .ok_or_else(|| DashError::InvalidRequest(format!("unknown column '{name}'")))
}

/// Resolve the x column and first y column of a two-axis chart.
fn axes(dataset: &Dataset, spec: &ChartSpec) -> Result<(usize, usize)> {
    match (&spec.x, spec.y.first()) {
        (Some(x), Some(y)) => Ok((index_of(dataset, x)?, index_of(dataset, y)?)),
        _ => Err(DashError::InvalidRequest(format!(
            "chart '{}' needs an x and a y column",
            spec.title
        ))),
    }
}

/// Materialise `spec` against `dataset`.  Bar charts keep the `top_n`
/// largest category sums (clamped to [`TOP_N_RANGE`]).
pub fn chart_data(dataset: &Dataset, spec: &ChartSpec, top_n: usize) -> Result<ChartData> {
    let data = match spec.kind {
        ChartKind::Line => {
            let (x, y) = axes(dataset, spec)?;
            let mut points: Vec<(NaiveDateTime, f64)> = dataset
                .rows
                .iter()
                .filter_map(|row| Some((row[x].as_date()?, row[y].as_f64()?)))
                .collect();
            points.sort_by_key(|(d, _)| *d);
            ChartData::Line { points }
        }
        ChartKind::Bar => {
            let (x, y) = axes(dataset, spec)?;
            ChartData::Bar {
                entries: bar_entries(dataset, x, y, top_n),
            }
        }
        ChartKind::Scatter => {
            let (x, y) = axes(dataset, spec)?;
            ChartData::Scatter {
                points: paired(dataset, x, y),
            }
        }
        ChartKind::Heatmap => {
            let columns = spec
                .y
                .iter()
                .map(|name| index_of(dataset, name))
                .collect::<Result<Vec<usize>>>()?;
            ChartData::Heatmap {
                columns: spec.y.clone(),
                matrix: correlation_matrix(dataset, &columns),
            }
        }
    };
    Ok(data)
}

/// Per-category sums of column `y`, largest first.
fn bar_entries(dataset: &Dataset, x: usize, y: usize, top_n: usize) -> Vec<BarEntry> {
    let mut sums: BTreeMap<CellValue, f64> = BTreeMap::new();
    for row in &dataset.rows {
        if row[x].is_null() {
            continue;
        }
        if let Some(v) = row[y].as_f64() {
            *sums.entry(row[x].clone()).or_insert(0.0) += v;
        }
    }
    let mut ranked: Vec<(CellValue, f64)> = sums.into_iter().collect();
    // Stable: equal sums stay in category order.
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(top_n.clamp(TOP_N_RANGE.0, TOP_N_RANGE.1));

    let colors = ColorMap::new(&ranked.iter().map(|(c, _)| c.clone()).collect());
    ranked
        .into_iter()
        .map(|(category, value)| BarEntry {
            color: colors.color_for(&category).to_string(),
            category,
            value,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Correlation
// ---------------------------------------------------------------------------

/// Rows where both columns hold a number.
fn paired(dataset: &Dataset, a: usize, b: usize) -> Vec<(f64, f64)> {
    dataset
        .rows
        .iter()
        .filter_map(|row| Some((row[a].as_f64()?, row[b].as_f64()?)))
        .collect()
}

/// Pearson correlation; `None` with fewer than two pairs or zero variance.
pub fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

fn correlation_matrix(dataset: &Dataset, columns: &[usize]) -> Vec<Vec<Option<f64>>> {
    columns
        .iter()
        .map(|&a| {
            columns
                .iter()
                .map(|&b| pearson(&paired(dataset, a, b)))
                .collect()
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correlation {
    pub a: String,
    pub b: String,
    pub r: f64,
}

/// Pairs of KPI-eligible numeric columns with |r| above [`STRONG_CORRELATION`].
pub fn strong_correlations(dataset: &Dataset, profiles: &[ColumnProfile]) -> Vec<Correlation> {
    let numeric: Vec<(&str, usize)> = profiles
        .iter()
        .filter(|p| p.column_type == ColumnType::Numeric && p.kpi_eligible)
        .filter_map(|p| Some((p.name.as_str(), dataset.column_index(&p.name)?)))
        .collect();

    let mut out = Vec::new();
    for (i, (name_a, a)) in numeric.iter().enumerate() {
        for (name_b, b) in &numeric[i + 1..] {
            if let Some(r) = pearson(&paired(dataset, *a, *b)) {
                if r.abs() > STRONG_CORRELATION {
                    out.push(Correlation {
                        a: name_a.to_string(),
                        b: name_b.to_string(),
                        r,
                    });
                }
            }
        }
    }
    out
}
