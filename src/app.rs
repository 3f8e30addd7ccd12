use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::analysis::charts::{
    ChartData, ChartSpec, DEFAULT_TOP_N, chart_data, recommend_charts, strong_correlations,
};
use crate::analysis::kpi::{KpiSet, KpiValue, compute_kpis};
use crate::data::cleaner::{CleanOptions, ColumnProfile, QualitySummary, parse_date};
use crate::data::filter::{DateRange, cell_from_input};
use crate::data::loader::{TEXT_COLUMN, UploadFormat, load_file, load_upload};
use crate::error::{DashError, ErrorKind, Result};
use crate::export::{metrics_summary_bytes, to_delimited_bytes};
use crate::insight::prompt::{self, DataContext};
use crate::insight::{AnalysisGoal, InsightService, request_insight};
use crate::state::Session;

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

/// A change to the row filter.  Values are given as user text and matched
/// against the column's cleaned type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterChange {
    Values { column: String, values: Vec<String> },
    Toggle { column: String, value: String },
    SelectAll { column: String },
    SelectNone { column: String },
    DateRange {
        column: String,
        from: Option<String>,
        to: Option<String>,
    },
}

fn comma() -> u8 {
    b','
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

/// One user action.  On the wire: `{"action": "<name>", "args": ...}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", content = "args", rename_all = "snake_case")]
pub enum Request {
    Upload {
        filename: String,
        bytes: Vec<u8>,
    },
    OpenFile(PathBuf),
    Clean(CleanOptions),
    /// Current quality summary and profiles, without re-cleaning.
    Profile,
    SetFilter(FilterChange),
    ClearFilters,
    AddGoal(String),
    Kpis,
    Charts {
        #[serde(default = "default_top_n")]
        top_n: usize,
    },
    Analyze,
    Ask(String),
    ExecutiveSummary,
    FinancialDeepDive,
    /// Pull business data out of an uploaded PDF or text document.
    ExtractDocument,
    NextSteps,
    Export {
        #[serde(default = "comma")]
        delimiter: u8,
    },
    /// Per-column KPI summary table as delimited text.
    ExportMetrics {
        #[serde(default = "comma")]
        delimiter: u8,
    },
    Reset,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedChart {
    pub spec: ChartSpec,
    pub data: ChartData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Cleaned {
        source: Option<String>,
        options: CleanOptions,
        quality: QualitySummary,
        profiles: Vec<ColumnProfile>,
    },
    Filtered {
        visible_rows: usize,
        total_rows: usize,
    },
    Goals {
        goals: Vec<AnalysisGoal>,
    },
    Kpis {
        filtered: bool,
        /// Flat `"<column>.<metric>"` / ratio name → value mapping.
        metrics: BTreeMap<String, KpiValue>,
        kpis: KpiSet,
    },
    Charts {
        filtered: bool,
        charts: Vec<RenderedChart>,
    },
    Insight {
        text: String,
    },
    Exported {
        rows: usize,
        content: String,
    },
    Reset,
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl Response {
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

/// Runs requests against one session.  The insight service is optional;
/// without it the LLM actions fail and everything else still works.
pub struct Dashboard<S> {
    pub session: Session,
    service: Option<S>,
}

impl<S: InsightService> Dashboard<S> {
    pub fn new(service: Option<S>) -> Self {
        Self {
            session: Session::default(),
            service,
        }
    }

    /// Run one request.  Failures come back as [`Response::Error`] and leave
    /// the session usable, so the request can simply be retried.
    pub fn handle(&mut self, request: Request) -> Response {
        match self.dispatch(request) {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Request failed: {e}");
                let message = e.to_string();
                self.session.status_message = Some(message.clone());
                Response::Error {
                    kind: e.kind(),
                    message,
                }
            }
        }
    }

    fn dispatch(&mut self, request: Request) -> Result<Response> {
        match request {
            Request::Upload { filename, bytes } => {
                let dataset = load_upload(&bytes, &filename)?;
                self.session.set_dataset(&filename, dataset);
                self.cleaned()
            }
            Request::OpenFile(path) => {
                let dataset = load_file(&path)?;
                self.session.set_dataset(&path.display().to_string(), dataset);
                self.cleaned()
            }
            Request::Clean(options) => {
                self.session.report()?;
                self.session.reclean(options);
                self.cleaned()
            }
            Request::Profile => self.cleaned(),
            Request::SetFilter(change) => {
                self.apply_filter(change)?;
                self.filtered()
            }
            Request::ClearFilters => {
                self.session.clear_filters();
                self.filtered()
            }
            Request::AddGoal(text) => {
                self.session.add_goal(AnalysisGoal::new(&text)?);
                Ok(Response::Goals {
                    goals: self.session.goals.clone(),
                })
            }
            Request::Kpis => {
                let view = self.session.view()?;
                let kpis = compute_kpis(&view.dataset, &view.profiles)?;
                Ok(Response::Kpis {
                    filtered: view.filtered,
                    metrics: kpis.metrics(),
                    kpis,
                })
            }
            Request::Charts { top_n } => {
                let view = self.session.view()?;
                let charts = recommend_charts(&view.profiles)?
                    .into_iter()
                    .map(|spec| {
                        let data = chart_data(&view.dataset, &spec, top_n)?;
                        Ok(RenderedChart { spec, data })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Response::Charts {
                    filtered: view.filtered,
                    charts,
                })
            }
            Request::Analyze => {
                if self.session.goals.is_empty() {
                    return Err(DashError::InvalidRequest(
                        "add at least one analysis goal first".into(),
                    ));
                }
                let goals = &self.session.goals;
                self.insight(|ctx| prompt::analysis_prompt(ctx, goals))
            }
            Request::Ask(question) => {
                if question.trim().is_empty() {
                    return Err(DashError::InvalidRequest("question is empty".into()));
                }
                self.insight(|ctx| prompt::question_prompt(ctx, &question))
            }
            Request::ExecutiveSummary => self.insight(prompt::executive_summary_prompt),
            Request::FinancialDeepDive => self.insight(prompt::financial_deep_dive_prompt),
            Request::ExtractDocument => {
                let content = self.document_text()?;
                let text = request_insight(
                    self.service()?,
                    &prompt::document_extraction_prompt(&content),
                )?;
                Ok(Response::Insight { text })
            }
            Request::NextSteps => {
                if self.session.goals.is_empty() {
                    return Err(DashError::InvalidRequest(
                        "next steps need at least one completed goal".into(),
                    ));
                }
                let text = request_insight(
                    self.service()?,
                    &prompt::next_steps_prompt(&self.session.goals),
                )?;
                Ok(Response::Insight { text })
            }
            Request::Export { delimiter } => {
                let view = self.session.view()?;
                let bytes = to_delimited_bytes(&view.dataset, delimiter)?;
                Ok(Response::Exported {
                    rows: view.dataset.len(),
                    content: String::from_utf8_lossy(&bytes).into_owned(),
                })
            }
            Request::ExportMetrics { delimiter } => {
                let view = self.session.view()?;
                let kpis = compute_kpis(&view.dataset, &view.profiles)?;
                let bytes = metrics_summary_bytes(&kpis, delimiter)?;
                Ok(Response::Exported {
                    rows: kpis.columns.len(),
                    content: String::from_utf8_lossy(&bytes).into_owned(),
                })
            }
            Request::Reset => {
                self.session.reset();
                Ok(Response::Reset)
            }
        }
    }

    fn service(&self) -> Result<&S> {
        self.service.as_ref().ok_or_else(|| {
            DashError::ExternalServiceFailure(
                "no LLM service configured (set GEMINI_API_KEY)".into(),
            )
        })
    }

    /// The uploaded document as parsed, one line per row.
    fn document_text(&self) -> Result<String> {
        let raw = self
            .session
            .raw
            .as_ref()
            .ok_or_else(|| DashError::InsufficientData("no dataset has been uploaded".into()))?;
        let name = self.session.source_name.as_deref().unwrap_or_default();
        if !UploadFormat::of(name).is_some_and(UploadFormat::is_document) {
            return Err(DashError::InvalidRequest(format!(
                "'{name}' is not a PDF or text document"
            )));
        }

        let mut lines = Vec::with_capacity(raw.len() + 1);
        if raw.columns != [TEXT_COLUMN] {
            lines.push(raw.columns.join(" | "));
        }
        for row in &raw.rows {
            let cells: Vec<String> = row
                .iter()
                .filter(|c| !c.is_null())
                .map(|c| c.to_string())
                .collect();
            lines.push(cells.join(" | "));
        }
        Ok(lines.join("\n"))
    }

    /// Build a data prompt over the current view and send it.
    fn insight<F>(&self, build: F) -> Result<Response>
    where
        F: FnOnce(&DataContext<'_>) -> String,
    {
        let view = self.session.view()?;
        let service = self.service()?;
        let kpis = compute_kpis(&view.dataset, &view.profiles).ok();
        let correlations = strong_correlations(&view.dataset, &view.profiles);
        let ctx = DataContext {
            dataset: &view.dataset,
            profiles: &view.profiles,
            kpis: kpis.as_ref(),
            correlations: &correlations,
        };
        let text = request_insight(service, &build(&ctx))?;
        Ok(Response::Insight { text })
    }

    fn apply_filter(&mut self, change: FilterChange) -> Result<()> {
        let report = self.session.report()?;
        let column_type = |column: &str| {
            report
                .profile(column)
                .map(|p| p.column_type)
                .ok_or_else(|| DashError::InvalidRequest(format!("unknown column '{column}'")))
        };

        match change {
            FilterChange::Values { column, values } => {
                let ty = column_type(&column)?;
                let set = values.iter().map(|v| cell_from_input(v, ty)).collect();
                self.session.set_filter_values(&column, set)
            }
            FilterChange::Toggle { column, value } => {
                let cell = cell_from_input(&value, column_type(&column)?);
                self.session.toggle_filter_value(&column, &cell)
            }
            FilterChange::SelectAll { column } => self.session.select_all(&column),
            FilterChange::SelectNone { column } => self.session.select_none(&column),
            FilterChange::DateRange { column, from, to } => {
                let bound = |text: Option<String>| -> Result<_> {
                    text.map(|t| {
                        parse_date(&t)
                            .ok_or_else(|| DashError::InvalidRequest(format!("'{t}' is not a date")))
                    })
                    .transpose()
                };
                let range = DateRange {
                    column,
                    from: bound(from)?,
                    to: bound(to)?,
                };
                self.session.set_date_range(range)
            }
        }
    }

    fn cleaned(&self) -> Result<Response> {
        let report = self.session.report()?;
        Ok(Response::Cleaned {
            source: self.session.source_name.clone(),
            options: self.session.clean_options,
            quality: report.quality.clone(),
            profiles: report.profiles.clone(),
        })
    }

    fn filtered(&self) -> Result<Response> {
        let total_rows = self.session.report()?.dataset.len();
        Ok(Response::Filtered {
            visible_rows: self.session.visible_indices.len(),
            total_rows,
        })
    }
}
