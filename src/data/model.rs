use std::collections::BTreeSet;
use std::fmt;

use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;

// ---------------------------------------------------------------------------
// CellValue – a single cell of the table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value mirroring common dataframe dtypes.
/// Downstream code keys `BTreeMap` / `BTreeSet` by cells, so `CellValue` must be `Ord`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDateTime),
    Null,
}

// -- Manual Eq/Ord so we can put CellValue in BTreeSet --

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use CellValue::*;
        fn discriminant(v: &CellValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                Text(_) => 4,
                Date(_) => 5,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for CellValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::Text(s) => s.hash(state),
            CellValue::Integer(i) => i.hash(state),
            CellValue::Float(f) => f.to_bits().hash(state),
            CellValue::Bool(b) => b.hash(state),
            CellValue::Date(d) => d.hash(state),
            CellValue::Null => {}
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Date(d) => {
                if d.time() == NaiveTime::MIN {
                    write!(f, "{}", d.format("%Y-%m-%d"))
                } else {
                    write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S"))
                }
            }
            CellValue::Null => write!(f, "<null>"),
        }
    }
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Try to interpret the value as an `f64` for numeric aggregation.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) => Some(*v),
            CellValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Textual form used for re-parsing during type inference.
    /// `None` for nulls.
    pub fn raw_text(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Text(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// ColumnType – inferred semantic type of a column
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Numeric,
    Categorical,
    Date,
    Text,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Numeric => "numeric",
            ColumnType::Categorical => "categorical",
            ColumnType::Date => "date",
            ColumnType::Text => "text",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// NumericStats – descriptive statistics over a numeric column
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericStats {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation (n - 1); zero for a single value.
    pub std_dev: f64,
}

impl NumericStats {
    /// Returns `None` for an empty slice.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let count = values.len();
        let sum: f64 = values.iter().sum();
        let mean = sum / count as f64;

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let median = if count % 2 == 0 {
            (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
        } else {
            sorted[count / 2]
        };

        let std_dev = if count > 1 {
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            var.sqrt()
        } else {
            0.0
        };

        Some(NumericStats {
            count,
            sum,
            mean,
            median,
            min: sorted[0],
            max: sorted[count - 1],
            std_dev,
        })
    }
}

// ---------------------------------------------------------------------------
// Dataset – the complete loaded table
// ---------------------------------------------------------------------------

/// An ordered table of rows × named columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    /// Column names in file order.
    pub columns: Vec<String>,
    /// Row-major cells; every row has exactly `columns.len()` cells.
    pub rows: Vec<Vec<CellValue>>,
}

impl Dataset {
    /// Build a dataset, padding short rows with nulls and truncating long ones.
    pub fn new(columns: Vec<String>, mut rows: Vec<Vec<CellValue>>) -> Self {
        let width = columns.len();
        for row in &mut rows {
            row.resize(width, CellValue::Null);
        }
        Dataset { columns, rows }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterate the cells of one column.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = &CellValue> + '_ {
        self.rows.iter().map(move |row| &row[idx])
    }

    /// Non-null numeric values of a column, in row order.
    pub fn numeric_values(&self, idx: usize) -> Vec<f64> {
        self.column(idx).filter_map(CellValue::as_f64).collect()
    }

    /// Sorted set of distinct non-null values of a column.
    pub fn unique_values(&self, idx: usize) -> BTreeSet<CellValue> {
        self.column(idx)
            .filter(|v| !v.is_null())
            .cloned()
            .collect()
    }

    /// Every distinct value of a column, `Null` included.  Selecting all of
    /// them lets every row through a value filter.
    pub fn selectable_values(&self, idx: usize) -> BTreeSet<CellValue> {
        self.column(idx).cloned().collect()
    }

    /// Count of null cells summed across all columns.
    pub fn missing_cells(&self) -> usize {
        self.rows
            .iter()
            .map(|row| row.iter().filter(|c| c.is_null()).count())
            .sum()
    }

    /// Build a new dataset from the given row indices (in the given order).
    pub fn select_rows(&self, indices: &[usize]) -> Dataset {
        Dataset {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn new_pads_short_rows() {
        let ds = Dataset::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec![vec![CellValue::Integer(1)]],
        );
        assert_eq!(ds.rows[0].len(), 3);
        assert_eq!(ds.missing_cells(), 2);
    }

    #[test]
    fn ordering_groups_by_kind_then_value() {
        let mut set = BTreeSet::new();
        set.insert(CellValue::Text("b".into()));
        set.insert(CellValue::Null);
        set.insert(CellValue::Float(2.5));
        set.insert(CellValue::Text("a".into()));
        let ordered: Vec<_> = set.into_iter().collect();
        assert_eq!(
            ordered,
            vec![
                CellValue::Null,
                CellValue::Float(2.5),
                CellValue::Text("a".into()),
                CellValue::Text("b".into()),
            ]
        );
    }

    #[test]
    fn date_display_drops_midnight() {
        assert_eq!(CellValue::Date(date(2023, 3, 31)).to_string(), "2023-03-31");
    }

    #[test]
    fn numeric_stats_median_and_std() {
        let stats = NumericStats::from_values(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.sum, 10.0);
        assert_eq!(stats.median, 2.5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert!((stats.std_dev - 1.2909944).abs() < 1e-6);
        assert!(NumericStats::from_values(&[]).is_none());
    }

    #[test]
    fn select_rows_keeps_columns() {
        let ds = Dataset::new(
            vec!["x".into()],
            vec![
                vec![CellValue::Integer(1)],
                vec![CellValue::Integer(2)],
                vec![CellValue::Integer(3)],
            ],
        );
        let sub = ds.select_rows(&[2, 0]);
        assert_eq!(sub.columns, ds.columns);
        assert_eq!(sub.numeric_values(0), vec![3.0, 1.0]);
    }
}
