use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use serde::Serialize;

use super::cleaner::{parse_date, parse_number};
use super::model::{CellValue, ColumnType, Dataset};

// ---------------------------------------------------------------------------
// Filter predicate: which unique values are selected per column
// ---------------------------------------------------------------------------

/// Per-column selection state: maps column_name → set of selected values.
/// If a column is absent it is unconstrained; an empty set selects nothing.
pub type FilterState = BTreeMap<String, BTreeSet<CellValue>>;

/// Inclusive date window over one date column.  Open ends are unbounded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateRange {
    pub column: String,
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
}

impl DateRange {
    fn contains(&self, value: &CellValue) -> bool {
        let Some(d) = value.as_date() else {
            return false;
        };
        self.from.map_or(true, |from| d >= from) && self.to.map_or(true, |to| d <= to)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowFilter {
    pub values: FilterState,
    pub date_range: Option<DateRange>,
}

impl RowFilter {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.date_range.is_none()
    }
}

/// Turn user input into a cell comparable with a cleaned column of `column_type`.
pub fn cell_from_input(input: &str, column_type: ColumnType) -> CellValue {
    let input = input.trim();
    let parsed = match column_type {
        ColumnType::Numeric => parse_number(input).map(|v| {
            if v.fract() == 0.0 && !input.contains('.') {
                CellValue::Integer(v as i64)
            } else {
                CellValue::Float(v)
            }
        }),
        ColumnType::Date => parse_date(input).map(CellValue::Date),
        ColumnType::Categorical | ColumnType::Text => None,
    };
    parsed.unwrap_or_else(|| CellValue::Text(input.to_string()))
}

/// Whether `cell` is in `selected`.  Numbers compare by value so a whole
/// float read from a workbook matches an integer typed by the user.
fn is_selected(selected: &BTreeSet<CellValue>, cell: &CellValue) -> bool {
    if selected.contains(cell) {
        return true;
    }
    match cell.as_f64() {
        Some(v) => selected.iter().any(|s| s.as_f64() == Some(v)),
        None => false,
    }
}

/// Return indices of rows that pass all active filters.
///
/// A row passes a column filter when:
/// * The column is not present in `values` → passes (no constraint)
/// * The filter set for that column is empty → nothing selected → fails
/// * The row's value for that column is in the selected set → passes
///
/// With a date range, rows whose date is null or outside the window fail.
pub fn filtered_indices(dataset: &Dataset, filter: &RowFilter) -> Vec<usize> {
    let value_filters: Vec<(Option<usize>, &BTreeSet<CellValue>)> = filter
        .values
        .iter()
        .map(|(col, selected)| (dataset.column_index(col), selected))
        .collect();
    let date_col = filter
        .date_range
        .as_ref()
        .map(|r| (dataset.column_index(&r.column), r));

    dataset
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            for (idx, selected) in &value_filters {
                if selected.is_empty() {
                    // Nothing selected for this column → hide everything
                    return false;
                }
                match idx {
                    Some(i) => {
                        if !is_selected(selected, &row[*i]) {
                            return false;
                        }
                    }
                    None => {
                        // column doesn't exist → include only if Null is selected
                        if !selected.contains(&CellValue::Null) {
                            return false;
                        }
                    }
                }
            }
            match &date_col {
                Some((Some(i), range)) => range.contains(&row[*i]),
                Some((None, _)) => false,
                None => true,
            }
        })
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn sales() -> Dataset {
        let rows = vec![
            ("North", day(2023, 1, 31), 10),
            ("South", day(2023, 2, 28), 20),
            ("North", day(2023, 3, 31), 30),
            ("East", day(2023, 4, 30), 40),
        ];
        Dataset::new(
            vec!["Region".into(), "Date".into(), "Sales".into()],
            rows.into_iter()
                .map(|(r, d, s)| {
                    vec![
                        CellValue::Text(r.into()),
                        CellValue::Date(d),
                        CellValue::Integer(s),
                    ]
                })
                .collect(),
        )
    }

    #[test]
    fn no_filters_keeps_all_rows() {
        let ds = sales();
        assert_eq!(filtered_indices(&ds, &RowFilter::default()), vec![0, 1, 2, 3]);
    }

    #[test]
    fn all_selected_is_no_filter() {
        let ds = sales();
        let mut filter = RowFilter::default();
        filter.values.insert("Region".into(), ds.unique_values(0));
        assert_eq!(filtered_indices(&ds, &filter).len(), 4);
    }

    #[test]
    fn unknown_column_passes_only_null() {
        let ds = sales();
        let mut filter = RowFilter::default();
        filter
            .values
            .insert("Segment".into(), [CellValue::Null].into_iter().collect());
        assert_eq!(filtered_indices(&ds, &filter).len(), 4);
        filter
            .values
            .insert("Segment".into(), [CellValue::Text("SMB".into())].into_iter().collect());
        assert!(filtered_indices(&ds, &filter).is_empty());
    }

    #[test]
    fn category_selection() {
        let ds = sales();
        let mut filter = RowFilter::default();
        filter.values.insert(
            "Region".into(),
            [CellValue::Text("North".into())].into_iter().collect(),
        );
        assert_eq!(filtered_indices(&ds, &filter), vec![0, 2]);

        filter.values.insert("Region".into(), BTreeSet::new());
        assert!(filtered_indices(&ds, &filter).is_empty());
    }

    #[test]
    fn date_range_is_inclusive() {
        let ds = sales();
        let filter = RowFilter {
            values: FilterState::new(),
            date_range: Some(DateRange {
                column: "Date".into(),
                from: Some(day(2023, 2, 28)),
                to: Some(day(2023, 3, 31)),
            }),
        };
        assert_eq!(filtered_indices(&ds, &filter), vec![1, 2]);
    }

    #[test]
    fn whole_numbers_match_float_cells() {
        let ds = Dataset::new(
            vec!["Year".into()],
            vec![
                vec![CellValue::Float(2022.0)],
                vec![CellValue::Float(2023.0)],
                vec![CellValue::Integer(2023)],
                vec![CellValue::Float(2023.5)],
            ],
        );
        let mut filter = RowFilter::default();
        filter.values.insert(
            "Year".into(),
            [cell_from_input("2023", ColumnType::Numeric)].into_iter().collect(),
        );
        assert_eq!(filtered_indices(&ds, &filter), vec![1, 2]);
    }

    #[test]
    fn input_matches_cleaned_cells() {
        assert_eq!(cell_from_input("20", ColumnType::Numeric), CellValue::Integer(20));
        assert_eq!(cell_from_input("2.5", ColumnType::Numeric), CellValue::Float(2.5));
        assert_eq!(
            cell_from_input("2023-03-31", ColumnType::Date),
            CellValue::Date(day(2023, 3, 31))
        );
        assert_eq!(
            cell_from_input(" North ", ColumnType::Categorical),
            CellValue::Text("North".into())
        );
    }
}
