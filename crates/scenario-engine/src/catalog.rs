//! Scenario Catalog
//!
//! Loads scenario definitions, checks them for completeness and exposes them by id.

use std::collections::BTreeMap;
use std::path::Path;

use scenario_core::{
    AssetCategory, CoreResult, ImpactFactor, ScenarioDefinition, ScenarioError, ScenarioProvider,
};
use serde::{Deserialize, Serialize};

use crate::library::{ScenarioLibrary, SEEDED_CATALOG_VERSION};

/// Catalog-wide knobs for the calculator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalculationParameters {
    /// Percentage points of extra move per risk-rating step above the category baseline
    #[serde(default = "default_adjustment_coefficient")]
    pub adjustment_coefficient: f64,
    /// Herfindahl index above which the concentration penalty kicks in
    #[serde(default = "default_concentration_threshold")]
    pub concentration_threshold: f64,
    /// Confidence points removed per percent of portfolio without a usable factor
    #[serde(default = "default_unclassified_penalty")]
    pub unclassified_confidence_penalty: f64,
}

fn default_adjustment_coefficient() -> f64 {
    1.5
}

fn default_concentration_threshold() -> f64 {
    0.25
}

fn default_unclassified_penalty() -> f64 {
    0.5
}

impl Default for CalculationParameters {
    fn default() -> Self {
        Self {
            adjustment_coefficient: default_adjustment_coefficient(),
            concentration_threshold: default_concentration_threshold(),
            unclassified_confidence_penalty: default_unclassified_penalty(),
        }
    }
}

/// How to treat scenarios that lack a factor for some classified category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletenessMode {
    /// Refuse to load the catalog
    #[default]
    Strict,
    /// Log and resolve the gaps to the unclassified zero-impact entry
    Lenient,
}

/// On-disk shape of a catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub version: String,
    #[serde(default)]
    pub parameters: CalculationParameters,
    pub scenarios: Vec<ScenarioDefinition>,
}

/// Validated, immutable set of scenarios under one version tag.
#[derive(Debug, Clone)]
pub struct ScenarioCatalog {
    version: String,
    parameters: CalculationParameters,
    scenarios: BTreeMap<String, ScenarioDefinition>,
    unclassified: ImpactFactor,
}

impl ScenarioCatalog {
    /// Validate a catalog document. Every problem is reported at load time so lookups
    /// never have to deal with a malformed scenario.
    pub fn load(document: CatalogDocument, mode: CompletenessMode) -> CoreResult<Self> {
        if document.version.trim().is_empty() {
            return Err(invalid("catalog version must not be empty"));
        }
        validate_parameters(&document.parameters)?;
        if document.scenarios.is_empty() {
            return Err(invalid("catalog contains no scenarios"));
        }

        let mut scenarios = BTreeMap::new();
        for scenario in document.scenarios {
            validate_scenario(&scenario, mode)?;
            if scenarios.contains_key(&scenario.id) {
                return Err(invalid(format!("duplicate scenario id '{}'", scenario.id)));
            }
            scenarios.insert(scenario.id.clone(), scenario);
        }

        tracing::info!(
            "Loaded scenario catalog {} with {} scenarios ({:?} mode)",
            document.version,
            scenarios.len(),
            mode
        );

        Ok(Self {
            version: document.version,
            parameters: document.parameters,
            scenarios,
            unclassified: ImpactFactor::unclassified(),
        })
    }

    pub fn from_json(json: &str, mode: CompletenessMode) -> CoreResult<Self> {
        let document: CatalogDocument = serde_json::from_str(json)
            .map_err(|e| invalid(format!("failed to parse catalog JSON: {}", e)))?;
        Self::load(document, mode)
    }

    pub fn from_path(path: impl AsRef<Path>, mode: CompletenessMode) -> CoreResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| invalid(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&json, mode)
    }

    /// The built-in scenario library.
    pub fn seeded() -> CoreResult<Self> {
        Self::load(
            CatalogDocument {
                version: SEEDED_CATALOG_VERSION.to_string(),
                parameters: CalculationParameters::default(),
                scenarios: ScenarioLibrary::all_scenarios(),
            },
            CompletenessMode::Strict,
        )
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn parameters(&self) -> &CalculationParameters {
        &self.parameters
    }

    /// All scenarios, ordered by id.
    pub fn list(&self) -> Vec<&ScenarioDefinition> {
        self.scenarios.values().collect()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn get_scenario(&self, id: &str) -> CoreResult<&ScenarioDefinition> {
        self.scenarios
            .get(id)
            .ok_or_else(|| ScenarioError::UnknownScenario(id.to_string()))
    }

    /// Factor for a category in a scenario. The boolean is true when the zero-impact
    /// unclassified entry was used instead of an explicit factor.
    pub fn resolve_factor(&self, scenario: &ScenarioDefinition, category: AssetCategory) -> (ImpactFactor, bool) {
        match scenario.factor_for(category) {
            Some(factor) => (*factor, false),
            None => (self.unclassified, true),
        }
    }
}

impl ScenarioProvider for ScenarioCatalog {
    fn catalog_version(&self) -> &str {
        self.version()
    }

    fn get_scenario(&self, id: &str) -> CoreResult<&ScenarioDefinition> {
        ScenarioCatalog::get_scenario(self, id)
    }
}

fn invalid(message: impl Into<String>) -> ScenarioError {
    ScenarioError::InvalidCatalog(message.into())
}

fn validate_parameters(params: &CalculationParameters) -> CoreResult<()> {
    if !params.adjustment_coefficient.is_finite() || params.adjustment_coefficient < 0.0 {
        return Err(invalid("adjustment_coefficient must be a non-negative number"));
    }
    if !(0.0..=1.0).contains(&params.concentration_threshold) {
        return Err(invalid("concentration_threshold must be within [0, 1]"));
    }
    if !params.unclassified_confidence_penalty.is_finite() || params.unclassified_confidence_penalty < 0.0 {
        return Err(invalid("unclassified_confidence_penalty must be a non-negative number"));
    }
    Ok(())
}

fn validate_scenario(scenario: &ScenarioDefinition, mode: CompletenessMode) -> CoreResult<()> {
    let id = &scenario.id;
    if id.trim().is_empty() {
        return Err(invalid("scenario id must not be empty"));
    }
    if !(1..=10).contains(&scenario.severity) {
        return Err(invalid(format!("{}: severity {} outside 1-10", id, scenario.severity)));
    }
    if scenario.duration_months == 0 {
        return Err(invalid(format!("{}: duration_months must be positive", id)));
    }
    if !(0.0..=100.0).contains(&scenario.model_validation_score) {
        return Err(invalid(format!(
            "{}: model_validation_score {} outside 0-100",
            id, scenario.model_validation_score
        )));
    }

    for (category, factor) in &scenario.impact_factors {
        let values = [
            factor.min,
            factor.max,
            factor.median,
            factor.volatility_multiplier,
            factor.correlation_adjustment,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(invalid(format!("{}: {} factor contains a non-finite value", id, category)));
        }
        if factor.min > factor.median || factor.median > factor.max {
            return Err(invalid(format!(
                "{}: {} factor requires min <= median <= max (got {} / {} / {})",
                id, category, factor.min, factor.median, factor.max
            )));
        }
        if factor.volatility_multiplier < 0.0 {
            return Err(invalid(format!("{}: {} volatility_multiplier is negative", id, category)));
        }
    }

    let reference_total: f64 = scenario.reference_allocation.values().sum();
    if scenario.reference_allocation.values().any(|v| !v.is_finite() || *v < 0.0) || reference_total <= 0.0 {
        return Err(invalid(format!("{}: reference_allocation must be non-negative and non-empty", id)));
    }

    let missing: Vec<AssetCategory> = AssetCategory::CLASSIFIED
        .iter()
        .copied()
        .filter(|c| !scenario.impact_factors.contains_key(c))
        .collect();

    if !missing.is_empty() {
        let names = missing.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ");
        match mode {
            CompletenessMode::Strict => {
                return Err(invalid(format!("{}: missing impact factors for {}", id, names)));
            }
            CompletenessMode::Lenient => {
                tracing::warn!(
                    "Scenario {} has no impact factor for {}; these resolve to zero impact",
                    id,
                    names
                );
            }
        }
    }

    if scenario.impact_factors.contains_key(&AssetCategory::Unclassified) {
        tracing::warn!("Scenario {} defines an unclassified factor; it is ignored", id);
    }

    Ok(())
}
