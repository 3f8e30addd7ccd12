/// Data layer: core types, loading, cleaning, and filtering.
///
/// Architecture:
/// ```text
///  .csv / .xlsx / .xls / .pdf / .txt
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  validate size + extension, parse → Dataset (raw text cells)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  cleaner  │  infer column types, coerce, count missing / duplicates
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  category / date-range predicates → row indices
///   └──────────┘
/// ```

pub mod cleaner;
pub mod filter;
pub mod loader;
pub mod model;
