/// LLM boundary: prompts go out, prose comes back.
///
/// ```text
///   DataContext (dataset, profiles, KPIs, correlations)
///        │
///        ▼
///   ┌──────────┐
///   │  prompt   │  summary block + task-specific instructions
///   └──────────┘
///        │
///        ▼
///   InsightService::generate  ──►  GeminiClient (HTTP) / stub in tests
/// ```
pub mod gemini;
pub mod prompt;

use serde::Serialize;

use crate::error::{DashError, Result};

/// Predefined analysis objectives offered to the user.
pub const GOAL_TEMPLATES: &[&str] = &[
    "Show me revenue trends over time",
    "Identify top-performing products/categories",
    "Analyze profit margins and expenses",
    "Calculate financial ratios (ROE, ROA, etc.)",
    "Year-over-year growth analysis",
    "Customer segmentation analysis",
    "Seasonal patterns and forecasting",
];

/// Common questions offered as shortcuts.
pub const COMMON_QUESTIONS: &[&str] = &[
    "What is the YoY growth in revenue?",
    "Show profit margin trends",
    "Identify expense categories with highest growth",
    "What are the key risk factors?",
    "Compare quarterly performance",
];

/// Anything that turns a prompt into prose.
pub trait InsightService {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// A non-blank, trimmed analysis objective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisGoal(String);

impl AnalysisGoal {
    pub fn new(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DashError::InvalidRequest("analysis goal is empty".into()));
        }
        Ok(AnalysisGoal(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Send `prompt` and insist on a non-empty answer.
pub fn request_insight<S: InsightService + ?Sized>(service: &S, prompt: &str) -> Result<String> {
    log::info!("Requesting insight ({} chars)", prompt.len());
    let text = service.generate(prompt)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(DashError::ExternalServiceFailure(
            "service returned an empty response".into(),
        ));
    }
    Ok(text.to_string())
}
