//! KPI and chart analysis over a cleaned dataset.

pub mod charts;
pub mod kpi;
pub mod ratios;
