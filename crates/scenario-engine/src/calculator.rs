use std::sync::Arc;

use chrono::Utc;
use scenario_core::math::{herfindahl_index, weighted_mean};
use scenario_core::{
    AssetCategory, AssetHolding, AssetImpact, CalculationDiagnostic, CoreResult, DiagnosticKind,
    ImpactFactor, PortfolioSnapshot, ScenarioDefinition, ScenarioResult,
};

use crate::catalog::ScenarioCatalog;
use crate::confidence::{self, ResolvedHolding};

/// Scenario impact calculator.
///
/// Pure and synchronous: the same portfolio, scenario and catalog version always produce
/// the same numbers. Only `calculation_timestamp` differs between runs.
#[derive(Debug, Clone)]
pub struct ScenarioCalculator {
    catalog: Arc<ScenarioCatalog>,
}

impl ScenarioCalculator {
    pub fn new(catalog: Arc<ScenarioCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<ScenarioCatalog> {
        &self.catalog
    }

    pub fn validate_portfolio(&self, portfolio: &PortfolioSnapshot) -> CoreResult<()> {
        portfolio.validate()
    }

    /// Calculate the impact of a catalog scenario on a portfolio.
    pub fn calculate(&self, portfolio: &PortfolioSnapshot, scenario_id: &str) -> CoreResult<ScenarioResult> {
        portfolio.validate()?;
        let scenario = self.catalog.get_scenario(scenario_id)?;
        Ok(self.compute(portfolio, scenario))
    }

    fn compute(&self, portfolio: &PortfolioSnapshot, scenario: &ScenarioDefinition) -> ScenarioResult {
        let params = self.catalog.parameters();

        let mut resolved = Vec::with_capacity(portfolio.holdings.len());
        let mut asset_impacts = Vec::with_capacity(portfolio.holdings.len());
        let mut diagnostics = Vec::new();

        for holding in &portfolio.holdings {
            let (factor, unclassified) = self.catalog.resolve_factor(scenario, holding.asset_category);
            if unclassified {
                diagnostics.push(diagnostic_for(holding, scenario));
            }

            let impact = if unclassified {
                0.0
            } else {
                adjusted_impact(&factor, holding, params.adjustment_coefficient)
            };
            let weighted = impact * holding.allocation_percentage / 100.0;

            asset_impacts.push(AssetImpact {
                symbol: holding.symbol.clone(),
                category: holding.asset_category,
                impact_percentage: impact,
                weighted_impact_percentage: weighted,
                dollar_delta: holding.dollar_amount * impact / 100.0,
                unclassified,
            });
            resolved.push(ResolvedHolding {
                allocation_percentage: holding.allocation_percentage,
                factor,
                unclassified,
            });
        }

        let total_impact_percentage: f64 = asset_impacts.iter().map(|a| a.weighted_impact_percentage).sum();

        let allocations: Vec<f64> = portfolio.holdings.iter().map(|h| h.allocation_percentage).collect();
        let hhi = herfindahl_index(&allocations);
        let multiplier = concentration_multiplier(hhi, params.concentration_threshold, &resolved);
        let adjusted_total = total_impact_percentage * multiplier;

        let (confidence_score, confidence_breakdown) = confidence::score(portfolio, scenario, &resolved, params);

        if !diagnostics.is_empty() {
            tracing::debug!(
                "Portfolio {} has {} holdings without an impact factor in {}",
                portfolio.id,
                diagnostics.len(),
                scenario.id
            );
        }

        ScenarioResult {
            portfolio_id: portfolio.id.clone(),
            scenario_id: scenario.id.clone(),
            scenario_name: scenario.name.clone(),
            catalog_version: self.catalog.version().to_string(),
            total_impact_percentage,
            concentration_adjusted_impact_percentage: adjusted_total,
            herfindahl_index: hhi,
            concentration_multiplier: multiplier,
            total_dollar_delta: portfolio.total_value * adjusted_total / 100.0,
            confidence_score,
            confidence_breakdown,
            asset_impacts,
            diagnostics,
            calculation_timestamp: Utc::now(),
        }
    }
}

/// Move a holding away from zero in proportion to how far its risk rating sits above
/// the category baseline (towards zero when below), then clamp to the factor range.
pub fn adjusted_impact(factor: &ImpactFactor, holding: &AssetHolding, coefficient: f64) -> f64 {
    let direction = if factor.median < 0.0 { -1.0 } else { 1.0 };
    let risk_delta = holding.risk_rating as f64 - holding.asset_category.baseline_risk() as f64;
    let adjusted = factor.median + direction * risk_delta * coefficient;
    adjusted.clamp(factor.min, factor.max)
}

/// `1 + ρ̄ × (HHI − threshold)` when the index exceeds the threshold, else 1.
/// ρ̄ is the allocation-weighted mean correlation adjustment of the resolved factors.
pub fn concentration_multiplier(hhi: f64, threshold: f64, holdings: &[ResolvedHolding]) -> f64 {
    if hhi <= threshold {
        return 1.0;
    }
    let pairs: Vec<(f64, f64)> = holdings
        .iter()
        .map(|h| (h.factor.correlation_adjustment, h.allocation_percentage))
        .collect();
    let correlation = weighted_mean(&pairs);
    (1.0 + correlation * (hhi - threshold)).max(0.0)
}

fn diagnostic_for(holding: &AssetHolding, scenario: &ScenarioDefinition) -> CalculationDiagnostic {
    if holding.asset_category == AssetCategory::Unclassified {
        CalculationDiagnostic {
            symbol: holding.symbol.clone(),
            kind: DiagnosticKind::UnclassifiedCategory,
            message: format!("{} is unclassified; treated as zero impact", holding.symbol),
        }
    } else {
        CalculationDiagnostic {
            symbol: holding.symbol.clone(),
            kind: DiagnosticKind::MissingImpactFactor,
            message: format!(
                "{} has no {} factor in {}; treated as zero impact",
                holding.symbol, holding.asset_category, scenario.id
            ),
        }
    }
}
