use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::ratios::{FinancialRatio, FinancialRole, financial_ratios, role_of};
use crate::data::cleaner::{ColumnProfile, MIN_KPI_VALUES};
use crate::data::model::{ColumnType, Dataset, NumericStats};
use crate::error::{DashError, Result};

// ---------------------------------------------------------------------------
// KpiValue
// ---------------------------------------------------------------------------

/// A single KPI scalar.  `Undefined` stands in for divisions by zero and
/// series too short to measure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum KpiValue {
    Number(f64),
    Percent(f64),
    Undefined,
}

impl KpiValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            KpiValue::Number(v) | KpiValue::Percent(v) => Some(*v),
            KpiValue::Undefined => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, KpiValue::Undefined)
    }

    /// `Percent(numerator / denominator * 100)`, `Undefined` for a zero denominator.
    pub fn ratio_percent(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 {
            KpiValue::Undefined
        } else {
            KpiValue::Percent(numerator / denominator * 100.0)
        }
    }
}

impl fmt::Display for KpiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KpiValue::Number(v) => write!(f, "{v:.2}"),
            KpiValue::Percent(v) => write!(f, "{v:.2}%"),
            KpiValue::Undefined => write!(f, "undefined"),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-column KPIs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnKpis {
    pub column: String,
    /// Financial role when the column name is on the ratio allowlist.
    pub role: Option<FinancialRole>,
    pub count: usize,
    pub total: f64,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    /// Sample variance.
    pub variance: f64,
    pub range: f64,
    /// Coefficient of variation: std_dev / mean, in percent.
    pub cv_pct: KpiValue,
    /// Adjusted Fisher-Pearson skewness; needs 3 values.
    pub skewness: KpiValue,
    /// Excess kurtosis with small-sample correction; needs 4 values.
    pub kurtosis: KpiValue,
    /// First-to-last change in period order, in percent.
    pub growth_rate: KpiValue,
    /// Mean of period-over-period changes, in percent.
    pub avg_period_change: KpiValue,
    /// Sample standard deviation of period-over-period changes, in percent.
    pub volatility: KpiValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSet {
    /// Date column that defined period order, if any.
    pub period_column: Option<String>,
    pub columns: Vec<ColumnKpis>,
    pub ratios: Vec<FinancialRatio>,
}

impl KpiSet {
    /// Flat KPI name → value mapping (`"<column>.<metric>"` and ratio names).
    pub fn metrics(&self) -> BTreeMap<String, KpiValue> {
        let mut out = BTreeMap::new();
        for c in &self.columns {
            let entries = [
                ("count", KpiValue::Number(c.count as f64)),
                ("total", KpiValue::Number(c.total)),
                ("mean", KpiValue::Number(c.mean)),
                ("median", KpiValue::Number(c.median)),
                ("min", KpiValue::Number(c.min)),
                ("max", KpiValue::Number(c.max)),
                ("std_dev", KpiValue::Number(c.std_dev)),
                ("variance", KpiValue::Number(c.variance)),
                ("range", KpiValue::Number(c.range)),
                ("cv_pct", c.cv_pct),
                ("skewness", c.skewness),
                ("kurtosis", c.kurtosis),
                ("growth_rate", c.growth_rate),
                ("avg_period_change", c.avg_period_change),
                ("volatility", c.volatility),
            ];
            for (metric, value) in entries {
                out.insert(format!("{}.{metric}", c.column), value);
            }
        }
        for r in &self.ratios {
            out.insert(r.name.clone(), r.aggregate);
        }
        out
    }
}

#[cfg(test)]
impl KpiSet {
    pub fn column(&self, name: &str) -> Option<&ColumnKpis> {
        self.columns.iter().find(|c| c.column == name)
    }

    pub fn ratio(&self, name: &str) -> Option<&FinancialRatio> {
        self.ratios.iter().find(|r| r.name == name)
    }
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Row indices in period order: ascending by the first date column (nulls
/// last, ties keep row order), else plain row order.
pub fn period_order(dataset: &Dataset, profiles: &[ColumnProfile]) -> (Option<String>, Vec<usize>) {
    let mut order: Vec<usize> = (0..dataset.len()).collect();
    let date_col = profiles
        .iter()
        .find(|p| p.column_type == ColumnType::Date)
        .and_then(|p| dataset.column_index(&p.name).map(|idx| (p.name.clone(), idx)));

    match date_col {
        Some((name, idx)) => {
            order.sort_by_key(|&row| {
                let d = dataset.rows[row][idx].as_date();
                (d.is_none(), d)
            });
            (Some(name), order)
        }
        None => (None, order),
    }
}

/// (last - first) / |first| * 100 over the first and last values, so a
/// series climbing out of a loss reports positive growth.
pub fn growth_rate(ordered: &[f64]) -> KpiValue {
    match (ordered.first(), ordered.last()) {
        (Some(&first), Some(&last)) if ordered.len() >= 2 => {
            KpiValue::ratio_percent(last - first, first.abs())
        }
        _ => KpiValue::Undefined,
    }
}

/// Central moments m2, m3, m4 (population form).
fn central_moments(values: &[f64], mean: f64) -> (f64, f64, f64) {
    let n = values.len() as f64;
    let mut m = (0.0, 0.0, 0.0);
    for v in values {
        let d = v - mean;
        m.0 += d * d;
        m.1 += d * d * d;
        m.2 += d * d * d * d;
    }
    (m.0 / n, m.1 / n, m.2 / n)
}

/// Sample skewness G1.  Constant or short series are `Undefined`.
pub fn skewness(values: &[f64], mean: f64) -> KpiValue {
    let n = values.len() as f64;
    if values.len() < 3 {
        return KpiValue::Undefined;
    }
    let (m2, m3, _) = central_moments(values, mean);
    if m2 == 0.0 {
        return KpiValue::Undefined;
    }
    let g1 = m3 / m2.powf(1.5);
    KpiValue::Number(g1 * (n * (n - 1.0)).sqrt() / (n - 2.0))
}

/// Sample excess kurtosis G2.  Constant or short series are `Undefined`.
pub fn kurtosis(values: &[f64], mean: f64) -> KpiValue {
    let n = values.len() as f64;
    if values.len() < 4 {
        return KpiValue::Undefined;
    }
    let (m2, _, m4) = central_moments(values, mean);
    if m2 == 0.0 {
        return KpiValue::Undefined;
    }
    let g2 = m4 / (m2 * m2) - 3.0;
    KpiValue::Number(((n + 1.0) * g2 + 6.0) * (n - 1.0) / ((n - 2.0) * (n - 3.0)))
}

/// Period-over-period fractional changes, skipping periods that start at zero.
fn period_changes(ordered: &[f64]) -> Vec<f64> {
    ordered
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

fn column_kpis(name: &str, ordered: &[f64]) -> Option<ColumnKpis> {
    let stats = NumericStats::from_values(ordered)?;
    let changes = period_changes(ordered);
    let change_stats = NumericStats::from_values(&changes);

    let avg_period_change = change_stats
        .as_ref()
        .map_or(KpiValue::Undefined, |s| KpiValue::Percent(s.mean * 100.0));
    let volatility = match &change_stats {
        Some(s) if s.count >= 2 => KpiValue::Percent(s.std_dev * 100.0),
        _ => KpiValue::Undefined,
    };

    Some(ColumnKpis {
        column: name.to_string(),
        role: role_of(name),
        count: stats.count,
        total: stats.sum,
        mean: stats.mean,
        median: stats.median,
        min: stats.min,
        max: stats.max,
        std_dev: stats.std_dev,
        variance: stats.std_dev * stats.std_dev,
        range: stats.max - stats.min,
        cv_pct: KpiValue::ratio_percent(stats.std_dev, stats.mean),
        skewness: skewness(ordered, stats.mean),
        kurtosis: kurtosis(ordered, stats.mean),
        growth_rate: growth_rate(ordered),
        avg_period_change,
        volatility,
    })
}

/// Compute aggregate statistics for every KPI-eligible numeric column plus
/// the financial ratios whose columns are present.
pub fn compute_kpis(dataset: &Dataset, profiles: &[ColumnProfile]) -> Result<KpiSet> {
    let (period_column, order) = period_order(dataset, profiles);

    let columns: Vec<ColumnKpis> = profiles
        .iter()
        .filter(|p| p.kpi_eligible)
        .filter_map(|p| {
            let idx = dataset.column_index(&p.name)?;
            let ordered: Vec<f64> = order
                .iter()
                .filter_map(|&row| dataset.rows[row][idx].as_f64())
                .collect();
            if ordered.len() < MIN_KPI_VALUES {
                return None;
            }
            column_kpis(&p.name, &ordered)
        })
        .collect();

    if columns.is_empty() {
        return Err(DashError::InsufficientData(
            "KPIs need a numeric column with at least 2 values".into(),
        ));
    }

    let ratios = financial_ratios(dataset, profiles);
    log::debug!(
        "Computed KPIs for {} columns and {} ratios (period column: {:?})",
        columns.len(),
        ratios.len(),
        period_column
    );

    Ok(KpiSet {
        period_column,
        columns,
        ratios,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cleaner::{CleanOptions, clean};
    use crate::data::model::CellValue;

    fn quarterly() -> Dataset {
        let rows = [
            ("2023-12-31", "133.1", "16"),
            ("2023-03-31", "100", "10"),
            ("2023-06-30", "110", "12"),
            ("2023-09-30", "121", "15"),
        ];
        Dataset::new(
            vec!["Date".into(), "Revenue".into(), "Profit".into()],
            rows.iter()
                .map(|(d, r, p)| {
                    vec![
                        CellValue::Text(d.to_string()),
                        CellValue::Text(r.to_string()),
                        CellValue::Text(p.to_string()),
                    ]
                })
                .collect(),
        )
    }

    #[test]
    fn quarterly_growth_and_margin() {
        let report = clean(quarterly(), &CleanOptions::default());
        let kpis = compute_kpis(&report.dataset, &report.profiles).unwrap();

        assert_eq!(kpis.period_column.as_deref(), Some("Date"));
        let revenue = kpis.column("Revenue").unwrap();
        assert_eq!(revenue.role, Some(FinancialRole::Revenue));
        let growth = revenue.growth_rate.as_f64().unwrap();
        assert!((growth - 33.1).abs() < 1e-9, "growth = {growth}");
        assert!((revenue.total - 464.1).abs() < 1e-9);
        assert_eq!(revenue.min, 100.0);
        assert_eq!(revenue.max, 133.1);

        // Revenue grows 10% every quarter.
        let avg = revenue.avg_period_change.as_f64().unwrap();
        assert!((avg - 10.0).abs() < 1e-9);

        let margin = kpis.ratio("profit_margin").unwrap();
        assert_eq!(margin.numerator, "Profit");
        assert_eq!(margin.denominator, "Revenue");
        // Per-row margins stay in dataset row order, not period order.
        let first_row = margin.per_row[1].as_f64().unwrap();
        assert!((first_row - 10.0).abs() < 1e-9);
        let last_row = margin.per_row[0].as_f64().unwrap();
        assert!((last_row - 16.0 / 133.1 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn growth_from_zero_is_undefined() {
        assert_eq!(growth_rate(&[0.0, 5.0, 10.0]), KpiValue::Undefined);
        assert_eq!(growth_rate(&[5.0]), KpiValue::Undefined);
        assert_eq!(growth_rate(&[]), KpiValue::Undefined);
    }

    #[test]
    fn growth_from_negative_base_keeps_direction() {
        assert_eq!(growth_rate(&[-10.0, -5.0]), KpiValue::Percent(50.0));
        assert_eq!(growth_rate(&[-10.0, 10.0]), KpiValue::Percent(200.0));
        assert_eq!(growth_rate(&[-10.0, -20.0]), KpiValue::Percent(-100.0));
    }

    #[test]
    fn zero_first_value_through_pipeline() {
        let ds = Dataset::new(
            vec!["Units".into()],
            ["0", "4", "8"]
                .iter()
                .map(|v| vec![CellValue::Text(v.to_string())])
                .collect(),
        );
        let report = clean(ds, &CleanOptions::default());
        let kpis = compute_kpis(&report.dataset, &report.profiles).unwrap();
        let metrics = kpis.metrics();
        assert_eq!(metrics["Units.growth_rate"], KpiValue::Undefined);
        assert_eq!(metrics["Units.total"], KpiValue::Number(12.0));
        assert!(kpis.period_column.is_none());
    }

    #[test]
    fn no_numeric_columns_is_insufficient() {
        let ds = Dataset::new(
            vec!["Region".into()],
            vec![vec![CellValue::Text("North".into())]],
        );
        let report = clean(ds, &CleanOptions::default());
        let err = compute_kpis(&report.dataset, &report.profiles).unwrap_err();
        assert!(matches!(err, DashError::InsufficientData(_)));
    }

    #[test]
    fn metrics_map_has_named_entries() {
        let report = clean(quarterly(), &CleanOptions::default());
        let kpis = compute_kpis(&report.dataset, &report.profiles).unwrap();
        let metrics = kpis.metrics();
        assert!(metrics.contains_key("Revenue.mean"));
        assert!(metrics.contains_key("Profit.volatility"));
        assert!(metrics.contains_key("Revenue.kurtosis"));
        assert!(metrics.contains_key("Revenue.cv_pct"));
        assert!(metrics.contains_key("profit_margin"));
        let margin = metrics["profit_margin"].as_f64().unwrap();
        assert!((margin - 53.0 / 464.1 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn distribution_shape_metrics() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let kpis = column_kpis("Orders", &values).unwrap();
        assert!((kpis.variance - 32.0 / 7.0).abs() < 1e-9);
        assert_eq!(kpis.range, 7.0);
        let cv = kpis.cv_pct.as_f64().unwrap();
        assert!((cv - (32.0f64 / 7.0).sqrt() / 5.0 * 100.0).abs() < 1e-9);
        let skew = kpis.skewness.as_f64().unwrap();
        assert!((skew - 0.818_487).abs() < 1e-5, "skew = {skew}");
        let kurt = kpis.kurtosis.as_f64().unwrap();
        assert!((kurt - 0.940_625).abs() < 1e-5, "kurt = {kurt}");

        let flat = column_kpis("Flat", &[3.0, 3.0, 3.0, 3.0]).unwrap();
        assert_eq!(flat.skewness, KpiValue::Undefined);
        assert_eq!(flat.kurtosis, KpiValue::Undefined);
        let pair = column_kpis("Pair", &[-1.0, 1.0]).unwrap();
        assert_eq!(pair.cv_pct, KpiValue::Undefined);
        assert_eq!(pair.skewness, KpiValue::Undefined);
    }

    #[test]
    fn display_formats() {
        assert_eq!(KpiValue::Percent(33.1).to_string(), "33.10%");
        assert_eq!(KpiValue::Number(2.0).to_string(), "2.00");
        assert_eq!(KpiValue::Undefined.to_string(), "undefined");
    }
}
