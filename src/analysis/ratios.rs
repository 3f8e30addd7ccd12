//! Financial ratios detected from column names.
//!
//! Columns are matched against an exact allowlist of normalised names
//! (lower-case, spaces and hyphens turned into `_`), so "Net Profit" and
//! "net-profit" both read as `net_profit`.

use serde::Serialize;

use super::kpi::KpiValue;
use crate::data::cleaner::ColumnProfile;
use crate::data::model::{ColumnType, Dataset};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancialRole {
    Revenue,
    Profit,
    GrossProfit,
    Expenses,
    Assets,
    Equity,
}

const ALLOWLIST: &[(FinancialRole, &[&str])] = &[
    (
        FinancialRole::Revenue,
        &["revenue", "sales", "total_revenue", "net_sales", "turnover"],
    ),
    (
        FinancialRole::Profit,
        &["profit", "net_profit", "net_income", "earnings"],
    ),
    (FinancialRole::GrossProfit, &["gross_profit"]),
    (
        FinancialRole::Expenses,
        &["expenses", "operating_expenses", "costs", "cost", "cogs"],
    ),
    (FinancialRole::Assets, &["assets", "total_assets"]),
    (
        FinancialRole::Equity,
        &["equity", "total_equity", "shareholders_equity"],
    ),
];

struct RatioDef {
    name: &'static str,
    numerator: FinancialRole,
    denominator: FinancialRole,
}

const RATIOS: &[RatioDef] = &[
    RatioDef {
        name: "profit_margin",
        numerator: FinancialRole::Profit,
        denominator: FinancialRole::Revenue,
    },
    RatioDef {
        name: "gross_margin",
        numerator: FinancialRole::GrossProfit,
        denominator: FinancialRole::Revenue,
    },
    RatioDef {
        name: "expense_ratio",
        numerator: FinancialRole::Expenses,
        denominator: FinancialRole::Revenue,
    },
    RatioDef {
        name: "roa",
        numerator: FinancialRole::Profit,
        denominator: FinancialRole::Assets,
    },
    RatioDef {
        name: "roe",
        numerator: FinancialRole::Profit,
        denominator: FinancialRole::Equity,
    },
];

/// A ratio between two columns, in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialRatio {
    pub name: String,
    pub numerator: String,
    pub denominator: String,
    /// Column sum over column sum.
    pub aggregate: KpiValue,
    /// One value per row of the dataset; `Undefined` where either side is
    /// missing or the denominator is zero.
    pub per_row: Vec<KpiValue>,
}

pub fn normalize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

pub fn role_of(column: &str) -> Option<FinancialRole> {
    let normalized = normalize_name(column);
    ALLOWLIST
        .iter()
        .find(|(_, names)| names.contains(&normalized.as_str()))
        .map(|(role, _)| *role)
}

/// First numeric column (in column order) playing `role`.
fn column_for(dataset: &Dataset, profiles: &[ColumnProfile], role: FinancialRole) -> Option<usize> {
    profiles
        .iter()
        .filter(|p| p.column_type == ColumnType::Numeric)
        .find(|p| role_of(&p.name) == Some(role))
        .and_then(|p| dataset.column_index(&p.name))
}

/// Every ratio whose numerator and denominator columns are both present.
pub fn financial_ratios(dataset: &Dataset, profiles: &[ColumnProfile]) -> Vec<FinancialRatio> {
    RATIOS
        .iter()
        .filter_map(|def| {
            let num = column_for(dataset, profiles, def.numerator)?;
            let den = column_for(dataset, profiles, def.denominator)?;

            let num_total: f64 = dataset.numeric_values(num).iter().sum();
            let den_total: f64 = dataset.numeric_values(den).iter().sum();

            let per_row = dataset
                .rows
                .iter()
                .map(|row| match (row[num].as_f64(), row[den].as_f64()) {
                    (Some(n), Some(d)) => KpiValue::ratio_percent(n, d),
                    _ => KpiValue::Undefined,
                })
                .collect();

            Some(FinancialRatio {
                name: def.name.to_string(),
                numerator: dataset.columns[num].clone(),
                denominator: dataset.columns[den].clone(),
                aggregate: KpiValue::ratio_percent(num_total, den_total),
                per_row,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cleaner::{CleanOptions, clean};
    use crate::data::model::CellValue;

    fn numeric_table(columns: &[&str], rows: &[&[f64]]) -> (Dataset, Vec<ColumnProfile>) {
        let ds = Dataset::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|v| CellValue::Float(*v)).collect())
                .collect(),
        );
        let report = clean(ds, &CleanOptions::default());
        (report.dataset, report.profiles)
    }

    #[test]
    fn names_match_exactly_after_normalising() {
        assert_eq!(role_of("Revenue"), Some(FinancialRole::Revenue));
        assert_eq!(role_of(" Net Profit "), Some(FinancialRole::Profit));
        assert_eq!(role_of("Gross-Profit"), Some(FinancialRole::GrossProfit));
        assert_eq!(role_of("Total_Assets"), Some(FinancialRole::Assets));
        // No fuzzy matching.
        assert_eq!(role_of("Revenue_Per_Employee"), None);
        assert_eq!(role_of("Profit_Margin"), None);
    }

    #[test]
    fn ratios_need_both_columns() {
        let (ds, profiles) = numeric_table(&["Revenue", "Cost"], &[&[100.0, 40.0], &[200.0, 60.0]]);
        let ratios = financial_ratios(&ds, &profiles);
        assert_eq!(ratios.len(), 1);
        assert_eq!(ratios[0].name, "expense_ratio");
        let aggregate = ratios[0].aggregate.as_f64().unwrap();
        assert!((aggregate - 100.0 / 3.0).abs() < 1e-9);
        let per_row: Vec<f64> = ratios[0].per_row.iter().filter_map(KpiValue::as_f64).collect();
        assert_eq!(per_row.len(), 2);
        assert!((per_row[0] - 40.0).abs() < 1e-9);
        assert!((per_row[1] - 30.0).abs() < 1e-9);
    }

    #[test]
    fn zero_denominators_are_undefined() {
        let (ds, profiles) = numeric_table(
            &["Net_Income", "Total_Equity", "Total_Assets"],
            &[&[10.0, 0.0, 50.0], &[-10.0, 0.0, 50.0]],
        );
        let ratios = financial_ratios(&ds, &profiles);
        let roe = ratios.iter().find(|r| r.name == "roe").unwrap();
        assert_eq!(roe.aggregate, KpiValue::Undefined);
        assert!(roe.per_row.iter().all(KpiValue::is_undefined));
        let roa = ratios.iter().find(|r| r.name == "roa").unwrap();
        assert_eq!(roa.aggregate, KpiValue::Percent(0.0));
    }
}
