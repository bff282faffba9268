//! Scenario Engine
//!
//! Versioned scenario catalog and the deterministic scenario impact calculator.
//! Given a validated portfolio snapshot and a scenario id, the calculator resolves
//! per-category impact factors, adjusts them for each holding's risk rating, applies a
//! concentration penalty and scores how much the result can be trusted.

pub mod calculator;
pub mod catalog;
pub mod confidence;
pub mod library;

pub use calculator::ScenarioCalculator;
pub use catalog::{CalculationParameters, CatalogDocument, CompletenessMode, ScenarioCatalog};
pub use library::{ScenarioLibrary, SEEDED_CATALOG_VERSION};

#[cfg(test)]
mod tests;
