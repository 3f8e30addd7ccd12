//! Prompt text for the insight service.
//!
//! Every prompt that talks about the data embeds the same summary block:
//! shape, column types, missing counts, numeric statistics, the top values
//! of the first categorical columns, a three-row sample, and whatever KPIs,
//! ratios and strong correlations were computed for the current view.

use crate::analysis::charts::Correlation;
use crate::analysis::kpi::KpiSet;
use crate::data::cleaner::ColumnProfile;
use crate::data::model::{ColumnType, Dataset};

use super::AnalysisGoal;

const SAMPLE_ROWS: usize = 3;
const SUMMARISED_CATEGORIES: usize = 3;
const TOP_VALUES: usize = 3;
/// Correlations listed in a prompt, in column-pair order.
const PROMPT_CORRELATIONS: usize = 5;
/// Characters of document text sent for extraction.
pub const DOCUMENT_CHARS: usize = 5000;

/// Everything a data prompt may draw on.
pub struct DataContext<'a> {
    pub dataset: &'a Dataset,
    pub profiles: &'a [ColumnProfile],
    pub kpis: Option<&'a KpiSet>,
    pub correlations: &'a [Correlation],
}

fn top_values(dataset: &Dataset, idx: usize) -> Vec<(String, usize)> {
    let mut counts: std::collections::BTreeMap<String, usize> = Default::default();
    for cell in dataset.column(idx).filter(|c| !c.is_null()) {
        *counts.entry(cell.to_string()).or_insert(0) += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(TOP_VALUES);
    ranked
}

pub fn data_summary(ctx: &DataContext<'_>) -> String {
    let ds = ctx.dataset;
    let mut lines = vec![
        "Dataset Overview:".to_string(),
        format!("- Rows: {}", ds.len()),
        format!("- Columns: {}", ds.width()),
        format!("- Column Names: {}", ds.columns.join(", ")),
        String::new(),
        "Column Types and Missing Values:".to_string(),
    ];
    for p in ctx.profiles {
        lines.push(format!(
            "- {}: {} ({} missing, {} unique)",
            p.name, p.column_type, p.missing, p.unique
        ));
    }

    let numeric: Vec<&ColumnProfile> = ctx.profiles.iter().filter(|p| p.stats.is_some()).collect();
    if !numeric.is_empty() {
        lines.push(String::new());
        lines.push("Numerical Columns Statistical Summary:".to_string());
        for p in numeric {
            if let Some(s) = &p.stats {
                lines.push(format!(
                    "- {}: count {}, mean {:.2}, std {:.2}, min {:.2}, median {:.2}, max {:.2}",
                    p.name, s.count, s.mean, s.std_dev, s.min, s.median, s.max
                ));
            }
        }
    }

    let categorical: Vec<&ColumnProfile> = ctx
        .profiles
        .iter()
        .filter(|p| p.column_type == ColumnType::Categorical)
        .take(SUMMARISED_CATEGORIES)
        .collect();
    if !categorical.is_empty() {
        lines.push(String::new());
        lines.push("Categorical Columns Summary:".to_string());
        for p in categorical {
            let Some(idx) = ds.column_index(&p.name) else {
                continue;
            };
            let top: Vec<String> = top_values(ds, idx)
                .into_iter()
                .map(|(v, n)| format!("{v} ({n})"))
                .collect();
            lines.push(format!(
                "- {}: {} unique values, top {}: {}",
                p.name,
                p.unique,
                TOP_VALUES,
                top.join(", ")
            ));
        }
    }

    lines.push(String::new());
    lines.push(format!("Sample Data (first {SAMPLE_ROWS} rows):"));
    lines.push(ds.columns.join(" | "));
    for row in ds.rows.iter().take(SAMPLE_ROWS) {
        let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
        lines.push(cells.join(" | "));
    }

    lines.join("\n")
}

/// KPI, ratio and correlation block; empty when nothing was computed.
pub fn metrics_summary(ctx: &DataContext<'_>) -> String {
    let mut lines = Vec::new();
    if let Some(kpis) = ctx.kpis {
        if let Some(period) = &kpis.period_column {
            lines.push(format!("Period order: by '{period}'"));
        }
        for c in &kpis.columns {
            lines.push(format!(
                "- {}: total {:.2}, mean {:.2}, median {:.2}, growth {}, avg period change {}, volatility {}",
                c.column, c.total, c.mean, c.median, c.growth_rate, c.avg_period_change, c.volatility
            ));
        }
        for r in kpis.ratios.iter().filter(|r| !r.aggregate.is_undefined()) {
            lines.push(format!(
                "- {} ({} / {}): {}",
                r.name, r.numerator, r.denominator, r.aggregate
            ));
        }
    }
    if !ctx.correlations.is_empty() {
        lines.push("Strong Correlations (|r| > 0.7):".to_string());
        for c in ctx.correlations.iter().take(PROMPT_CORRELATIONS) {
            lines.push(format!("- {} and {}: {:.3}", c.a, c.b, c.r));
        }
    }
    if lines.is_empty() {
        "No KPIs could be computed for this data.".to_string()
    } else {
        lines.join("\n")
    }
}

fn bullet_list(goals: &[AnalysisGoal]) -> String {
    goals
        .iter()
        .map(|g| format!("- {}", g.as_str()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn analysis_prompt(ctx: &DataContext<'_>, goals: &[AnalysisGoal]) -> String {
    format!(
        "As a senior business intelligence analyst, provide a comprehensive analysis of this dataset.

Data Summary:
{summary}

Computed Metrics:
{metrics}

Analysis Goals:
{goals}

Structure the report with these markdown sections:
## Executive Summary
## Detailed Analysis
## Financial Performance (if applicable)
## Business Insights
## Recommendations
## Risk Assessment

Use specific numbers and percentages from the data to support each point.
Focus on actionable insights executives can use for decision-making.",
        summary = data_summary(ctx),
        metrics = metrics_summary(ctx),
        goals = bullet_list(goals),
    )
}

pub fn question_prompt(ctx: &DataContext<'_>, question: &str) -> String {
    format!(
        "You are a senior business analyst with expertise in financial analysis, operations, and strategy.
Answer this question about the dataset with detailed analysis.

Question: {question}

Dataset Information:
{summary}

Financial Metrics:
{metrics}

Provide:
1. **Direct Answer**
2. **Supporting Analysis** with the calculations used
3. **Business Implications**
4. **Recommendations**

Use specific numbers from the data and show your reasoning.",
        question = question.trim(),
        summary = data_summary(ctx),
        metrics = metrics_summary(ctx),
    )
}

pub fn executive_summary_prompt(ctx: &DataContext<'_>) -> String {
    format!(
        "Create a concise executive summary of this business dataset for C-level executives.

Dataset Information:
{summary}

Financial Metrics:
{metrics}

Include:
## Key Performance Highlights
## Financial Performance Overview
## Strategic Insights
## Critical Action Items
## Bottom Line Impact

Keep it under 300 words and use specific numbers where possible.",
        summary = data_summary(ctx),
        metrics = metrics_summary(ctx),
    )
}

pub fn financial_deep_dive_prompt(ctx: &DataContext<'_>) -> String {
    format!(
        "Perform a comprehensive financial deep-dive analysis as a senior financial analyst.

Dataset Information:
{summary}

Current Financial Metrics:
{metrics}

Provide detailed analysis on:
## Revenue Analysis
- trends, growth patterns, concentration and seasonality
## Profitability Analysis
- gross, operating and net margins and their sustainability
## Expense Management
- expense structure and expense growth against revenue growth
## Financial Health Indicators
- liquidity, leverage and stability
## Performance Ratios
- ROA, ROE, ROI and efficiency ratios where the data allows
## Growth Analysis
- historical growth rates and CAGR
## Risk Assessment
- volatility and the main financial risk factors
## Valuation Insights
- value drivers and key valuation metrics

Provide specific calculations and business interpretations for each section.",
        summary = data_summary(ctx),
        metrics = metrics_summary(ctx),
    )
}

/// Ask for structured business data in free document text.  Only the
/// first [`DOCUMENT_CHARS`] characters are sent.
pub fn document_extraction_prompt(content: &str) -> String {
    let excerpt: String = content.chars().take(DOCUMENT_CHARS).collect();
    format!(
        "Analyze this document content and extract any structured data, financial metrics,
or business information that could be useful for business intelligence analysis.

Focus on:
- Financial figures (revenue, profit, expenses, ratios)
- Performance metrics and KPIs
- Time-series data and trends
- Operational and market metrics

Document content:
{excerpt}

Provide a structured summary of the key data points found, formatted for
business analysis. Include specific numbers and metrics where available."
    )
}

pub fn next_steps_prompt(goals: &[AnalysisGoal]) -> String {
    format!(
        "Based on the following completed business intelligence analysis goals:

{goals}

Suggest 7-10 logical next steps or follow-up analyses that would add business value,
such as deeper analytics, forecasting, benchmarking, operational improvements,
risk management, KPIs to monitor, or additional data sources.

Format as a numbered list with a one-line explanation of the business value of each,
ordered by potential impact.",
        goals = bullet_list(goals),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::charts::strong_correlations;
    use crate::analysis::kpi::compute_kpis;
    use crate::data::cleaner::{CleanOptions, clean};
    use crate::data::model::CellValue;

    fn report() -> crate::data::cleaner::CleanReport {
        let rows = [
            ["2023-01-31", "North", "100", "10"],
            ["2023-02-28", "South", "200", "22"],
            ["2023-03-31", "North", "300", "29"],
            ["2023-04-30", "North", "400", "41"],
        ];
        let ds = Dataset::new(
            vec!["Date".into(), "Region".into(), "Revenue".into(), "Profit".into()],
            rows.iter()
                .map(|r| r.iter().map(|v| CellValue::Text(v.to_string())).collect())
                .collect(),
        );
        clean(ds, &CleanOptions::default())
    }

    #[test]
    fn summary_covers_shape_types_and_sample() {
        let report = report();
        let ctx = DataContext {
            dataset: &report.dataset,
            profiles: &report.profiles,
            kpis: None,
            correlations: &[],
        };
        let summary = data_summary(&ctx);
        assert!(summary.contains("- Rows: 4"));
        assert!(summary.contains("- Revenue: numeric (0 missing, 4 unique)"));
        assert!(summary.contains("- Region: 2 unique values, top 3: North (3), South (1)"));
        assert!(summary.contains("2023-03-31 | North | 300 | 29"));
        assert!(!summary.contains("2023-04-30 | North"));
        assert_eq!(metrics_summary(&ctx), "No KPIs could be computed for this data.");
    }

    #[test]
    fn prompts_embed_metrics_and_goals() {
        let report = report();
        let kpis = compute_kpis(&report.dataset, &report.profiles).unwrap();
        let correlations = strong_correlations(&report.dataset, &report.profiles);
        let ctx = DataContext {
            dataset: &report.dataset,
            profiles: &report.profiles,
            kpis: Some(&kpis),
            correlations: &correlations,
        };
        let goals = vec![AnalysisGoal::new("Show me revenue trends over time").unwrap()];

        let prompt = analysis_prompt(&ctx, &goals);
        assert!(prompt.contains("- Show me revenue trends over time"));
        assert!(prompt.contains("growth 300.00%"));
        assert!(prompt.contains("profit_margin (Profit / Revenue)"));
        assert!(prompt.contains("Revenue and Profit"));

        let question = question_prompt(&ctx, "  What is the YoY growth in revenue? ");
        assert!(question.contains("Question: What is the YoY growth in revenue?\n"));

        assert!(executive_summary_prompt(&ctx).contains("under 300 words"));
        let deep_dive = financial_deep_dive_prompt(&ctx);
        assert!(deep_dive.contains("## Profitability Analysis"));
        assert!(deep_dive.contains("profit_margin (Profit / Revenue)"));
        assert!(next_steps_prompt(&goals).contains("- Show me revenue trends over time"));
    }

    #[test]
    fn correlations_are_capped() {
        let report = report();
        let correlations: Vec<Correlation> = (0..8)
            .map(|i| Correlation {
                a: format!("m{i}"),
                b: format!("n{i}"),
                r: 0.9,
            })
            .collect();
        let ctx = DataContext {
            dataset: &report.dataset,
            profiles: &report.profiles,
            kpis: None,
            correlations: &correlations,
        };
        let metrics = metrics_summary(&ctx);
        assert!(metrics.contains("- m4 and n4: 0.900"));
        assert!(!metrics.contains("m5 and n5"));
    }

    #[test]
    fn document_prompt_truncates_content() {
        let content = format!("Revenue 2023: $1.2M\n{}", "x".repeat(DOCUMENT_CHARS));
        let prompt = document_extraction_prompt(&content);
        assert!(prompt.contains("Revenue 2023: $1.2M"));
        assert!(prompt.contains(&"x".repeat(DOCUMENT_CHARS - 20)));
        assert!(!prompt.contains(&"x".repeat(DOCUMENT_CHARS)));
    }
}
