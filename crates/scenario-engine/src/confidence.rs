//! Confidence scoring for scenario results.
//!
//! Four sub-scores, each bounded to [0, 100], combined with fixed weights:
//! - historical precedent strength (40%): 30 points per documented precedent, capped at 100
//! - portfolio similarity (30%): cosine similarity between the portfolio's category mix and
//!   the scenario's reference allocation, scaled to 100
//! - parameter certainty (20%): 100 minus the allocation-weighted spread of the resolved
//!   factors, where spread is `(max - min) * volatility_multiplier`
//! - model validation (10%): the scenario's backtest agreement score
//!
//! Holdings without a usable factor remove `unclassified_confidence_penalty` points per
//! percent of portfolio they represent.

use scenario_core::math::{clamp_score, cosine_similarity, weighted_mean};
use scenario_core::{AssetCategory, ConfidenceBreakdown, ImpactFactor, PortfolioSnapshot, ScenarioDefinition};

use crate::catalog::CalculationParameters;

pub const PRECEDENT_WEIGHT: f64 = 0.40;
pub const SIMILARITY_WEIGHT: f64 = 0.30;
pub const CERTAINTY_WEIGHT: f64 = 0.20;
pub const VALIDATION_WEIGHT: f64 = 0.10;

const POINTS_PER_PRECEDENT: f64 = 30.0;

/// One holding's resolved factor, as seen by the scorer.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedHolding {
    pub allocation_percentage: f64,
    pub factor: ImpactFactor,
    pub unclassified: bool,
}

pub fn precedent_strength(scenario: &ScenarioDefinition) -> f64 {
    clamp_score(POINTS_PER_PRECEDENT * scenario.historical_precedents.len() as f64)
}

pub fn portfolio_similarity(portfolio: &PortfolioSnapshot, scenario: &ScenarioDefinition) -> f64 {
    let allocation = portfolio.category_allocation();
    let (portfolio_vec, reference_vec): (Vec<f64>, Vec<f64>) = AssetCategory::ALL
        .iter()
        .map(|c| {
            (
                allocation.get(c).copied().unwrap_or(0.0),
                scenario.reference_allocation.get(c).copied().unwrap_or(0.0),
            )
        })
        .unzip();
    clamp_score(100.0 * cosine_similarity(&portfolio_vec, &reference_vec))
}

pub fn parameter_certainty(holdings: &[ResolvedHolding]) -> f64 {
    let pairs: Vec<(f64, f64)> = holdings
        .iter()
        .map(|h| (h.factor.spread() * h.factor.volatility_multiplier, h.allocation_percentage))
        .collect();
    clamp_score(100.0 - weighted_mean(&pairs))
}

pub fn score(
    portfolio: &PortfolioSnapshot,
    scenario: &ScenarioDefinition,
    holdings: &[ResolvedHolding],
    params: &CalculationParameters,
) -> (f64, ConfidenceBreakdown) {
    let unclassified_share: f64 = holdings
        .iter()
        .filter(|h| h.unclassified)
        .map(|h| h.allocation_percentage)
        .sum();

    let breakdown = ConfidenceBreakdown {
        precedent_strength: precedent_strength(scenario),
        portfolio_similarity: portfolio_similarity(portfolio, scenario),
        parameter_certainty: parameter_certainty(holdings),
        model_validation: clamp_score(scenario.model_validation_score),
        unclassified_penalty: params.unclassified_confidence_penalty * unclassified_share,
    };

    let weighted = PRECEDENT_WEIGHT * breakdown.precedent_strength
        + SIMILARITY_WEIGHT * breakdown.portfolio_similarity
        + CERTAINTY_WEIGHT * breakdown.parameter_certainty
        + VALIDATION_WEIGHT * breakdown.model_validation;

    (clamp_score(weighted - breakdown.unclassified_penalty), breakdown)
}
