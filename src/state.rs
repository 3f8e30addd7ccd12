use std::collections::BTreeSet;

use crate::data::cleaner::{CleanOptions, CleanReport, ColumnProfile, clean, profile_columns};
use crate::data::filter::{DateRange, RowFilter, filtered_indices};
use crate::data::model::{CellValue, ColumnType, Dataset};
use crate::error::{DashError, Result};
use crate::insight::AnalysisGoal;

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Everything one user session holds between requests.
#[derive(Default)]
pub struct Session {
    /// Name of the uploaded file.
    pub source_name: Option<String>,

    /// Dataset as parsed from the upload, before cleaning.
    pub raw: Option<Dataset>,

    /// Options the current `report` was cleaned with.
    pub clean_options: CleanOptions,

    /// Cleaned dataset with its profiles and quality summary.
    pub report: Option<CleanReport>,

    /// Active row filter over the cleaned dataset.
    pub filter: RowFilter,

    /// Indices of rows passing `filter` (cached).
    pub visible_indices: Vec<usize>,

    /// Analysis objectives collected so far, in insertion order.
    pub goals: Vec<AnalysisGoal>,

    /// Outcome of the last action.
    pub status_message: Option<String>,
}

/// The filtered dataset with profiles recomputed for it.
#[derive(Debug, Clone)]
pub struct View {
    pub dataset: Dataset,
    pub profiles: Vec<ColumnProfile>,
    pub filtered: bool,
}

impl Session {
    /// Take a freshly parsed upload, clean it and reset the filters.
    pub fn set_dataset(&mut self, name: &str, dataset: Dataset) {
        self.source_name = Some(name.to_string());
        self.raw = Some(dataset);
        self.reclean(self.clean_options);
    }

    /// Re-run cleaning over the raw upload with new options.
    pub fn reclean(&mut self, options: CleanOptions) {
        self.clean_options = options;
        let Some(raw) = &self.raw else {
            return;
        };
        let report = clean(raw.clone(), &options);
        self.status_message = Some(format!(
            "Cleaned {} rows x {} columns",
            report.dataset.len(),
            report.dataset.width()
        ));
        self.report = Some(report);
        self.clear_filters();
    }

    pub fn report(&self) -> Result<&CleanReport> {
        self.report
            .as_ref()
            .ok_or_else(|| DashError::InsufficientData("no dataset has been uploaded".into()))
    }

    fn column_types(&self) -> Vec<ColumnType> {
        self.report
            .as_ref()
            .map(|r| r.profiles.iter().map(|p| p.column_type).collect())
            .unwrap_or_default()
    }

    /// Recompute `visible_indices` after a filter change.
    pub fn refilter(&mut self) {
        if let Some(report) = &self.report {
            self.visible_indices = filtered_indices(&report.dataset, &self.filter);
        }
    }

    pub fn clear_filters(&mut self) {
        self.filter = RowFilter::default();
        self.visible_indices = self
            .report
            .as_ref()
            .map(|r| (0..r.dataset.len()).collect())
            .unwrap_or_default();
    }

    fn column_index(&self, column: &str) -> Result<usize> {
        self.report()?
            .dataset
            .column_index(column)
            .ok_or_else(|| DashError::InvalidRequest(format!("unknown column '{column}'")))
    }

    /// Restrict `column` to exactly `values`.
    pub fn set_filter_values(&mut self, column: &str, values: BTreeSet<CellValue>) -> Result<()> {
        self.column_index(column)?;
        self.filter.values.insert(column.to_string(), values);
        self.refilter();
        Ok(())
    }

    /// Toggle a single value in a column's filter.  An unconstrained column
    /// starts from all of its values selected.
    pub fn toggle_filter_value(&mut self, column: &str, value: &CellValue) -> Result<()> {
        let idx = self.column_index(column)?;
        if !self.filter.values.contains_key(column) {
            let all = self.report()?.dataset.selectable_values(idx);
            self.filter.values.insert(column.to_string(), all);
        }
        let selected = self.filter.values.entry(column.to_string()).or_default();
        if !selected.remove(value) {
            selected.insert(value.clone());
        }
        self.refilter();
        Ok(())
    }

    /// Select all values in a column, nulls included.
    pub fn select_all(&mut self, column: &str) -> Result<()> {
        let idx = self.column_index(column)?;
        let all = self.report()?.dataset.selectable_values(idx);
        self.set_filter_values(column, all)
    }

    /// Deselect all values in a column.
    pub fn select_none(&mut self, column: &str) -> Result<()> {
        self.set_filter_values(column, BTreeSet::new())
    }

    pub fn set_date_range(&mut self, range: DateRange) -> Result<()> {
        let idx = self.column_index(&range.column)?;
        if self.column_types().get(idx) != Some(&ColumnType::Date) {
            return Err(DashError::InvalidRequest(format!(
                "'{}' is not a date column",
                range.column
            )));
        }
        self.filter.date_range = Some(range);
        self.refilter();
        Ok(())
    }

    /// Add a goal unless an identical one is already present.
    pub fn add_goal(&mut self, goal: AnalysisGoal) {
        if !self.goals.contains(&goal) {
            self.goals.push(goal);
        }
    }

    /// The rows the current filter lets through, profiled under the
    /// cleaned column types.
    pub fn view(&self) -> Result<View> {
        let report = self.report()?;
        if self.filter.is_empty() {
            return Ok(View {
                dataset: report.dataset.clone(),
                profiles: report.profiles.clone(),
                filtered: false,
            });
        }
        let dataset = report.dataset.select_rows(&self.visible_indices);
        if dataset.is_empty() {
            return Err(DashError::InsufficientData(
                "no rows match the current filters".into(),
            ));
        }
        let profiles = profile_columns(&dataset, &self.column_types());
        Ok(View {
            dataset,
            profiles,
            filtered: true,
        })
    }

    /// Forget the upload, filters and goals.
    pub fn reset(&mut self) {
        *self = Session::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cleaner::ImputeStrategy;

    fn upload() -> Dataset {
        let rows = [
            ["2023-01-31", "North", "100"],
            ["2023-02-28", "South", ""],
            ["2023-03-31", "North", "300"],
            ["2023-03-31", "North", "300"],
        ];
        Dataset::new(
            vec!["Date".into(), "Region".into(), "Revenue".into()],
            rows.iter()
                .map(|r| {
                    r.iter()
                        .map(|v| {
                            if v.is_empty() {
                                CellValue::Null
                            } else {
                                CellValue::Text(v.to_string())
                            }
                        })
                        .collect()
                })
                .collect(),
        )
    }

    fn north() -> CellValue {
        CellValue::Text("North".into())
    }

    #[test]
    fn upload_cleans_and_shows_everything() {
        let mut session = Session::default();
        assert!(matches!(session.view(), Err(DashError::InsufficientData(_))));

        session.set_dataset("sales.csv", upload());
        assert_eq!(session.visible_indices, vec![0, 1, 2, 3]);
        let view = session.view().unwrap();
        assert!(!view.filtered);
        assert_eq!(view.dataset.len(), 4);
        assert_eq!(session.report().unwrap().quality.duplicate_rows, 1);
    }

    #[test]
    fn reclean_applies_options_and_resets_filters() {
        let mut session = Session::default();
        session.set_dataset("sales.csv", upload());
        session
            .set_filter_values("Region", [north()].into_iter().collect())
            .unwrap();
        assert_eq!(session.visible_indices, vec![0, 2, 3]);

        session.reclean(CleanOptions {
            drop_duplicates: true,
            impute: ImputeStrategy::MeanMode,
        });
        assert!(session.filter.is_empty());
        let report = session.report().unwrap();
        assert_eq!(report.dataset.len(), 3);
        assert_eq!(report.dataset.missing_cells(), 0);
    }

    #[test]
    fn filtered_view_keeps_column_types() {
        let mut session = Session::default();
        session.set_dataset("sales.csv", upload());
        session.toggle_filter_value("Region", &CellValue::Text("South".into())).unwrap();
        let view = session.view().unwrap();
        assert!(view.filtered);
        assert_eq!(view.dataset.len(), 3);
        let region = view.profiles.iter().find(|p| p.name == "Region").unwrap();
        assert_eq!(region.column_type, ColumnType::Categorical);
        assert_eq!(region.unique, 1);

        session.select_none("Region").unwrap();
        assert!(matches!(session.view(), Err(DashError::InsufficientData(_))));
        session.select_all("Region").unwrap();
        assert_eq!(session.visible_indices.len(), 4);
    }

    #[test]
    fn select_all_and_toggle_keep_null_rows() {
        let mut session = Session::default();
        let rows = [["North", "1"], ["", "2"], ["South", "3"]];
        let ds = Dataset::new(
            vec!["Region".into(), "Units".into()],
            rows.iter()
                .map(|r| {
                    r.iter()
                        .map(|v| {
                            if v.is_empty() {
                                CellValue::Null
                            } else {
                                CellValue::Text(v.to_string())
                            }
                        })
                        .collect()
                })
                .collect(),
        );
        session.set_dataset("regions.csv", ds);

        session.select_all("Region").unwrap();
        assert_eq!(session.visible_indices, vec![0, 1, 2]);

        session.clear_filters();
        session
            .toggle_filter_value("Region", &CellValue::Text("South".into()))
            .unwrap();
        assert_eq!(session.visible_indices, vec![0, 1]);
    }

    #[test]
    fn date_range_needs_a_date_column() {
        let mut session = Session::default();
        session.set_dataset("sales.csv", upload());
        let err = session
            .set_date_range(DateRange {
                column: "Region".into(),
                from: None,
                to: None,
            })
            .unwrap_err();
        assert!(matches!(err, DashError::InvalidRequest(_)));
        assert!(session.set_filter_values("Missing", BTreeSet::new()).is_err());
    }

    #[test]
    fn goals_are_deduplicated_and_reset_clears() {
        let mut session = Session::default();
        session.add_goal(AnalysisGoal::new("Margins").unwrap());
        session.add_goal(AnalysisGoal::new(" Margins ").unwrap());
        assert_eq!(session.goals.len(), 1);
        session.set_dataset("sales.csv", upload());
        session.reset();
        assert!(session.goals.is_empty());
        assert!(session.report.is_none());
    }
}
