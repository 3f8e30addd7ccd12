use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::model::{CellValue, ColumnType, Dataset, NumericStats};

/// A column with at most this many distinct values is categorical.
const CATEGORICAL_MAX_UNIQUE: usize = 20;
/// ...or with at most this share of distinct values among non-missing ones.
const CATEGORICAL_MAX_RATIO: f64 = 0.5;
/// Longer average values make a column free text.
const CATEGORICAL_MAX_AVG_LEN: f64 = 50.0;
/// Numeric columns need this many values to take part in KPIs.
pub const MIN_KPI_VALUES: usize = 2;
/// Columns missing more than this share of rows are flagged.
const HIGH_MISSING_PCT: f64 = 50.0;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y", "%m/%d/%Y"];

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    /// Leave missing values in place.
    #[default]
    None,
    /// Numeric columns get the column mean, categorical/text columns the mode.
    MeanMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanOptions {
    pub drop_duplicates: bool,
    pub impute: ImputeStrategy,
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Inferred type and quality statistics for one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub column_type: ColumnType,
    /// Missing cells before any imputation.
    pub missing: usize,
    pub non_missing: usize,
    pub unique: usize,
    pub stats: Option<NumericStats>,
    pub kpi_eligible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualitySummary {
    pub total_rows: usize,
    pub total_columns: usize,
    /// Null cells across all columns of the input table.
    pub missing_cells: usize,
    pub missing_pct: f64,
    pub duplicate_rows: usize,
    pub duplicate_pct: f64,
    pub duplicates_removed: usize,
    pub imputed_cells: usize,
    pub type_distribution: BTreeMap<ColumnType, usize>,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanReport {
    pub dataset: Dataset,
    pub profiles: Vec<ColumnProfile>,
    pub quality: QualitySummary,
}

impl CleanReport {
    pub fn profile(&self, name: &str) -> Option<&ColumnProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }
}

// ---------------------------------------------------------------------------
// Value parsing
// ---------------------------------------------------------------------------

/// Parse a number, accepting a leading currency sign and `,` thousands groups.
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let body = body
        .trim_start_matches(|c| matches!(c, '$' | '€' | '£'))
        .trim();
    if body.is_empty() || body.starts_with('-') {
        return None;
    }

    let cleaned = if body.contains(',') {
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
        if frac_part.contains(',') {
            return None;
        }
        let groups: Vec<&str> = int_part.split(',').collect();
        let grouped = !groups[0].is_empty()
            && groups[0].len() <= 3
            && groups[1..].iter().all(|g| g.len() == 3);
        if !grouped {
            return None;
        }
        body.replace(',', "")
    } else {
        body.to_string()
    };

    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// Parse a date or datetime.  Anything that reads as a plain number is not a date.
pub fn parse_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() || parse_number(s).is_some() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn coerce_number(s: &str) -> Option<CellValue> {
    let value = parse_number(s)?;
    let plain = s.trim().trim_start_matches('-');
    let integral = !plain.contains(|c| matches!(c, '.' | 'e' | 'E'))
        && value.fract() == 0.0
        && value.abs() < i64::MAX as f64;
    if integral {
        Some(CellValue::Integer(value as i64))
    } else {
        Some(CellValue::Float(value))
    }
}

// ---------------------------------------------------------------------------
// Type inference
// ---------------------------------------------------------------------------

/// Date first, then numeric, else categorical or free text.
pub fn infer_column_type<'a, I>(cells: I) -> ColumnType
where
    I: IntoIterator<Item = &'a CellValue>,
{
    let values: Vec<&CellValue> = cells.into_iter().filter(|c| !c.is_null()).collect();
    if values.is_empty() {
        return ColumnType::Text;
    }

    let all_dates = values.iter().all(|c| match c {
        CellValue::Date(_) => true,
        CellValue::Text(s) => parse_date(s).is_some(),
        _ => false,
    });
    if all_dates {
        return ColumnType::Date;
    }

    let all_numeric = values.iter().all(|c| match c {
        CellValue::Integer(_) | CellValue::Float(_) => true,
        CellValue::Text(s) => parse_number(s).is_some(),
        _ => false,
    });
    if all_numeric {
        return ColumnType::Numeric;
    }

    let texts: Vec<String> = values.iter().filter_map(|c| c.raw_text()).collect();
    let unique = texts.iter().collect::<HashSet<_>>().len();
    let avg_len = texts.iter().map(|t| t.chars().count()).sum::<usize>() as f64 / texts.len() as f64;
    let few_distinct = unique <= CATEGORICAL_MAX_UNIQUE
        || unique as f64 <= CATEGORICAL_MAX_RATIO * texts.len() as f64;

    if few_distinct && avg_len <= CATEGORICAL_MAX_AVG_LEN {
        ColumnType::Categorical
    } else {
        ColumnType::Text
    }
}

fn coerce_cell(cell: &CellValue, column_type: ColumnType) -> CellValue {
    match (column_type, cell) {
        (_, CellValue::Null) => CellValue::Null,
        (ColumnType::Date, CellValue::Text(s)) => {
            parse_date(s).map(CellValue::Date).unwrap_or(CellValue::Null)
        }
        (ColumnType::Numeric, CellValue::Text(s)) => coerce_number(s).unwrap_or(CellValue::Null),
        (ColumnType::Date | ColumnType::Numeric, other) => other.clone(),
        (ColumnType::Categorical | ColumnType::Text, CellValue::Text(_)) => cell.clone(),
        (ColumnType::Categorical | ColumnType::Text, other) => {
            other.raw_text().map(CellValue::Text).unwrap_or(CellValue::Null)
        }
    }
}

// ---------------------------------------------------------------------------
// Cleaning pipeline
// ---------------------------------------------------------------------------

/// Infer column types, coerce cells, count missing values and duplicates,
/// and optionally drop duplicates / impute.  The dataset is cleaned in place
/// and handed back inside the report.
pub fn clean(mut dataset: Dataset, options: &CleanOptions) -> CleanReport {
    let total_rows = dataset.len();
    let total_columns = dataset.width();
    let missing_cells = dataset.missing_cells();

    let types: Vec<ColumnType> = (0..total_columns)
        .map(|idx| infer_column_type(dataset.column(idx)))
        .collect();

    for row in &mut dataset.rows {
        for (cell, &ty) in row.iter_mut().zip(&types) {
            *cell = coerce_cell(cell, ty);
        }
    }

    let duplicate_rows = count_duplicates(&dataset);
    let mut duplicates_removed = 0;
    if options.drop_duplicates && duplicate_rows > 0 {
        duplicates_removed = drop_duplicates(&mut dataset);
    }

    let profiles = profile_columns(&dataset, &types);

    let imputed_cells = match options.impute {
        ImputeStrategy::None => 0,
        ImputeStrategy::MeanMode => impute(&mut dataset, &profiles),
    };

    let mut type_distribution = BTreeMap::new();
    for ty in &types {
        *type_distribution.entry(*ty).or_insert(0) += 1;
    }

    let total_cells = total_rows * total_columns;
    let quality = QualitySummary {
        total_rows,
        total_columns,
        missing_cells,
        missing_pct: percent(missing_cells, total_cells),
        duplicate_rows,
        duplicate_pct: percent(duplicate_rows, total_rows),
        duplicates_removed,
        imputed_cells,
        type_distribution,
        issues: quality_issues(&profiles, duplicate_rows, dataset.len()),
    };

    log::info!(
        "Cleaned dataset: {} rows, {} columns, {} missing cells, {} duplicate rows ({} removed)",
        dataset.len(),
        total_columns,
        missing_cells,
        duplicate_rows,
        duplicates_removed
    );

    CleanReport {
        dataset,
        profiles,
        quality,
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Rows identical to an earlier row.
fn count_duplicates(dataset: &Dataset) -> usize {
    let mut seen: HashSet<&Vec<CellValue>> = HashSet::new();
    dataset.rows.iter().filter(|row| !seen.insert(*row)).count()
}

/// Keep the first occurrence of every row; returns the number removed.
fn drop_duplicates(dataset: &mut Dataset) -> usize {
    let before = dataset.rows.len();
    let mut seen: HashSet<Vec<CellValue>> = HashSet::new();
    dataset.rows.retain(|row| seen.insert(row.clone()));
    before - dataset.rows.len()
}

/// Profile every column of an already-coerced dataset under fixed types.
/// Used for filtered views so a subset never changes a column's type.
pub fn profile_columns(dataset: &Dataset, types: &[ColumnType]) -> Vec<ColumnProfile> {
    types
        .iter()
        .enumerate()
        .map(|(idx, &ty)| profile_column(dataset, idx, ty))
        .collect()
}

fn profile_column(dataset: &Dataset, idx: usize, column_type: ColumnType) -> ColumnProfile {
    let missing = dataset.column(idx).filter(|c| c.is_null()).count();
    let non_missing = dataset.len() - missing;
    let stats = match column_type {
        ColumnType::Numeric => NumericStats::from_values(&dataset.numeric_values(idx)),
        _ => None,
    };

    ColumnProfile {
        name: dataset.columns[idx].clone(),
        column_type,
        missing,
        non_missing,
        unique: dataset.unique_values(idx).len(),
        stats,
        kpi_eligible: column_type == ColumnType::Numeric && non_missing >= MIN_KPI_VALUES,
    }
}

/// Most frequent non-null value; ties go to the smallest value.
fn mode(dataset: &Dataset, idx: usize) -> Option<CellValue> {
    let mut counts: HashMap<&CellValue, usize> = HashMap::new();
    for cell in dataset.column(idx).filter(|c| !c.is_null()) {
        *counts.entry(cell).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|(va, ca), (vb, cb)| ca.cmp(cb).then_with(|| vb.cmp(va)))
        .map(|(v, _)| v.clone())
}

fn impute(dataset: &mut Dataset, profiles: &[ColumnProfile]) -> usize {
    let mut filled = 0;
    for (idx, profile) in profiles.iter().enumerate() {
        if profile.missing == 0 {
            continue;
        }
        let fill = match profile.column_type {
            ColumnType::Numeric => profile.stats.as_ref().map(|s| CellValue::Float(s.mean)),
            ColumnType::Categorical | ColumnType::Text => {
                Some(mode(dataset, idx).unwrap_or_else(|| CellValue::Text("Unknown".into())))
            }
            ColumnType::Date => None,
        };
        let Some(fill) = fill else {
            continue;
        };
        for row in &mut dataset.rows {
            if row[idx].is_null() {
                row[idx] = fill.clone();
                filled += 1;
            }
        }
    }
    filled
}

fn quality_issues(profiles: &[ColumnProfile], duplicate_rows: usize, rows: usize) -> Vec<String> {
    let mut issues = Vec::new();

    let high_missing: Vec<&str> = profiles
        .iter()
        .filter(|p| percent(p.missing, rows) > HIGH_MISSING_PCT)
        .map(|p| p.name.as_str())
        .collect();
    if !high_missing.is_empty() {
        issues.push(format!(
            "Columns with >50% missing values: {}",
            high_missing.join(", ")
        ));
    }

    if duplicate_rows > 0 {
        issues.push(format!("{duplicate_rows} duplicate rows found"));
    }

    let single_valued: Vec<&str> = profiles
        .iter()
        .filter(|p| p.unique <= 1)
        .map(|p| p.name.as_str())
        .collect();
    if !single_valued.is_empty() {
        issues.push(format!(
            "Columns with single/no values: {}",
            single_valued.join(", ")
        ));
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn table(columns: &[&str], rows: &[&[&str]]) -> Dataset {
        Dataset::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| {
                    r.iter()
                        .map(|v| if v.is_empty() { CellValue::Null } else { text(v) })
                        .collect()
                })
                .collect(),
        )
    }

    #[test]
    fn numeric_strings_classify_as_numeric() {
        let ds = table(&["n"], &[&["1"], &["2.5"], &["-3"], &["1e3"]]);
        let report = clean(ds, &CleanOptions::default());
        assert_eq!(report.profiles[0].column_type, ColumnType::Numeric);
        assert_eq!(report.dataset.rows[0][0], CellValue::Integer(1));
        assert_eq!(report.dataset.rows[1][0], CellValue::Float(2.5));
        assert_eq!(report.dataset.rows[3][0], CellValue::Float(1000.0));
    }

    #[test]
    fn currency_and_thousands_are_numeric() {
        assert_eq!(parse_number("$1,234.50"), Some(1234.5));
        assert_eq!(parse_number("-€12"), Some(-12.0));
        assert_eq!(parse_number("12,34"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("$"), None);
        assert_eq!(parse_number("1.234,56"), None);
        assert_eq!(parse_number("1.5,000"), None);
        assert_eq!(parse_number("--5"), None);
        assert_eq!(parse_number("-$-5"), None);
        assert_eq!(parse_number("-1,000.25"), Some(-1000.25));
    }

    #[test]
    fn date_column_detected_before_numeric() {
        let ds = table(
            &["Date", "Year"],
            &[&["2023-03-31", "2021"], &["2023/06/30", "2022"], &["30/09/2023", "2023"]],
        );
        let report = clean(ds, &CleanOptions::default());
        assert_eq!(report.profiles[0].column_type, ColumnType::Date);
        assert_eq!(report.profiles[1].column_type, ColumnType::Numeric);
        assert!(report.dataset.rows[2][0].as_date().is_some());
    }

    #[test]
    fn categorical_versus_text() {
        let cat_rows: Vec<Vec<&str>> = (0..30)
            .map(|i| vec![if i % 2 == 0 { "North" } else { "South" }])
            .collect();
        let cat_refs: Vec<&[&str]> = cat_rows.iter().map(|r| r.as_slice()).collect();
        let report = clean(table(&["Region"], &cat_refs), &CleanOptions::default());
        assert_eq!(report.profiles[0].column_type, ColumnType::Categorical);

        let notes: Vec<String> = (0..30).map(|i| format!("free-form comment number {i}")).collect();
        let note_rows: Vec<Vec<&str>> = notes.iter().map(|n| vec![n.as_str()]).collect();
        let note_refs: Vec<&[&str]> = note_rows.iter().map(|r| r.as_slice()).collect();
        let report = clean(table(&["Notes"], &note_refs), &CleanOptions::default());
        assert_eq!(report.profiles[0].column_type, ColumnType::Text);
    }

    #[test]
    fn missing_count_matches_null_cells() {
        let ds = table(
            &["a", "b", "c"],
            &[&["1", "", "x"], &["", "", "y"], &["3", "4", ""]],
        );
        let nulls = ds.missing_cells();
        let report = clean(ds, &CleanOptions::default());
        assert_eq!(nulls, 4);
        assert_eq!(report.quality.missing_cells, 4);
        let per_column: usize = report.profiles.iter().map(|p| p.missing).sum();
        assert_eq!(per_column, 4);
        assert!((report.quality.missing_pct - 4.0 / 9.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn duplicates_counted_and_optionally_removed() {
        let rows: &[&[&str]] = &[&["a", "1"], &["a", "1"], &["b", "2"], &["a", "1"]];
        let report = clean(table(&["k", "v"], rows), &CleanOptions::default());
        assert_eq!(report.quality.duplicate_rows, 2);
        assert_eq!(report.quality.duplicates_removed, 0);
        assert_eq!(report.dataset.len(), 4);
        assert!(report.quality.issues.iter().any(|i| i.contains("2 duplicate rows")));

        let opts = CleanOptions {
            drop_duplicates: true,
            ..Default::default()
        };
        let report = clean(table(&["k", "v"], rows), &opts);
        assert_eq!(report.quality.duplicates_removed, 2);
        assert_eq!(report.dataset.len(), 2);
    }

    #[test]
    fn single_value_numeric_column_not_kpi_eligible() {
        let ds = table(&["x", "y"], &[&["5", "1"], &["", "2"], &["", "3"]]);
        let report = clean(ds, &CleanOptions::default());
        assert_eq!(report.profiles[0].column_type, ColumnType::Numeric);
        assert!(!report.profiles[0].kpi_eligible);
        assert!(report.profiles[1].kpi_eligible);
        assert!(report.quality.issues.iter().any(|i| i.contains(">50% missing")));
    }

    #[test]
    fn mean_mode_imputation() {
        let ds = table(
            &["Sales", "Region"],
            &[&["10", "North"], &["", "North"], &["30", ""], &["20", "South"]],
        );
        let opts = CleanOptions {
            impute: ImputeStrategy::MeanMode,
            ..Default::default()
        };
        let report = clean(ds, &opts);
        assert_eq!(report.quality.imputed_cells, 2);
        assert_eq!(report.profiles[0].missing, 1);
        assert_eq!(report.dataset.rows[1][0], CellValue::Float(20.0));
        assert_eq!(report.dataset.rows[2][1], text("North"));
        assert_eq!(report.dataset.missing_cells(), 0);
    }

    #[test]
    fn all_missing_column_is_text() {
        let ds = table(&["empty", "n"], &[&["", "1"], &["", "2"]]);
        let report = clean(ds, &CleanOptions::default());
        assert_eq!(report.profiles[0].column_type, ColumnType::Text);
        assert_eq!(report.quality.type_distribution[&ColumnType::Text], 1);
        assert_eq!(report.quality.type_distribution[&ColumnType::Numeric], 1);
    }
}
