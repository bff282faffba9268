use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreResult, ScenarioError};

/// Tolerance used for the allocation and dollar-sum invariants.
pub const SUM_TOLERANCE: f64 = 0.01;

/// Closed set of asset categories a holding can belong to.
///
/// `Unclassified` is the explicit catch-all: it always resolves to a zero-impact factor
/// and carries a confidence penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetCategory {
    DomesticEquity,
    InternationalEquity,
    EmergingMarketsEquity,
    GovernmentBonds,
    CorporateBonds,
    HighYieldBonds,
    RealEstate,
    Commodities,
    Cash,
    Crypto,
    Unclassified,
}

impl AssetCategory {
    pub const ALL: [AssetCategory; 11] = [
        AssetCategory::DomesticEquity,
        AssetCategory::InternationalEquity,
        AssetCategory::EmergingMarketsEquity,
        AssetCategory::GovernmentBonds,
        AssetCategory::CorporateBonds,
        AssetCategory::HighYieldBonds,
        AssetCategory::RealEstate,
        AssetCategory::Commodities,
        AssetCategory::Cash,
        AssetCategory::Crypto,
        AssetCategory::Unclassified,
    ];

    /// Every category that a scenario is expected to carry an explicit factor for.
    pub const CLASSIFIED: [AssetCategory; 10] = [
        AssetCategory::DomesticEquity,
        AssetCategory::InternationalEquity,
        AssetCategory::EmergingMarketsEquity,
        AssetCategory::GovernmentBonds,
        AssetCategory::CorporateBonds,
        AssetCategory::HighYieldBonds,
        AssetCategory::RealEstate,
        AssetCategory::Commodities,
        AssetCategory::Cash,
        AssetCategory::Crypto,
    ];

    /// Typical risk rating (1-10) of a holding in this category. A holding rated
    /// exactly at its baseline receives no asset-specific adjustment.
    pub fn baseline_risk(&self) -> u8 {
        match self {
            AssetCategory::DomesticEquity => 6,
            AssetCategory::InternationalEquity => 7,
            AssetCategory::EmergingMarketsEquity => 8,
            AssetCategory::GovernmentBonds => 2,
            AssetCategory::CorporateBonds => 3,
            AssetCategory::HighYieldBonds => 5,
            AssetCategory::RealEstate => 5,
            AssetCategory::Commodities => 7,
            AssetCategory::Cash => 1,
            AssetCategory::Crypto => 10,
            AssetCategory::Unclassified => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetCategory::DomesticEquity => "domestic_equity",
            AssetCategory::InternationalEquity => "international_equity",
            AssetCategory::EmergingMarketsEquity => "emerging_markets_equity",
            AssetCategory::GovernmentBonds => "government_bonds",
            AssetCategory::CorporateBonds => "corporate_bonds",
            AssetCategory::HighYieldBonds => "high_yield_bonds",
            AssetCategory::RealEstate => "real_estate",
            AssetCategory::Commodities => "commodities",
            AssetCategory::Cash => "cash",
            AssetCategory::Crypto => "crypto",
            AssetCategory::Unclassified => "unclassified",
        }
    }

    /// Human-readable label used in prompts and templates.
    pub fn label(&self) -> &'static str {
        match self {
            AssetCategory::DomesticEquity => "domestic equities",
            AssetCategory::InternationalEquity => "international equities",
            AssetCategory::EmergingMarketsEquity => "emerging-market equities",
            AssetCategory::GovernmentBonds => "government bonds",
            AssetCategory::CorporateBonds => "corporate bonds",
            AssetCategory::HighYieldBonds => "high-yield bonds",
            AssetCategory::RealEstate => "real estate",
            AssetCategory::Commodities => "commodities",
            AssetCategory::Cash => "cash",
            AssetCategory::Crypto => "crypto assets",
            AssetCategory::Unclassified => "unclassified assets",
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single position inside a portfolio snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetHolding {
    pub symbol: String,
    pub asset_category: AssetCategory,
    /// Share of the portfolio, 0-100
    pub allocation_percentage: f64,
    pub dollar_amount: f64,
    #[serde(default)]
    pub sector: String,
    #[serde(default)]
    pub geographic_region: String,
    /// 1 (lowest) to 10 (highest)
    pub risk_rating: u8,
}

/// Read-only view of a portfolio supplied by the external portfolio store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub id: String,
    pub total_value: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub holdings: Vec<AssetHolding>,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl PortfolioSnapshot {
    /// Check the allocation and value invariants. Runs before any calculation step.
    pub fn validate(&self) -> CoreResult<()> {
        if self.holdings.is_empty() {
            return Err(ScenarioError::InvalidPortfolio(format!(
                "portfolio {} has no holdings",
                self.id
            )));
        }
        if !self.total_value.is_finite() || self.total_value <= 0.0 {
            return Err(ScenarioError::InvalidPortfolio(format!(
                "total value must be positive, got {}",
                self.total_value
            )));
        }

        for holding in &self.holdings {
            let pct = holding.allocation_percentage;
            if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
                return Err(ScenarioError::InvalidPortfolio(format!(
                    "{}: allocation {} outside 0-100",
                    holding.symbol, pct
                )));
            }
            if !holding.dollar_amount.is_finite() || holding.dollar_amount < 0.0 {
                return Err(ScenarioError::InvalidPortfolio(format!(
                    "{}: dollar amount {} is not a non-negative number",
                    holding.symbol, holding.dollar_amount
                )));
            }
            if !(1..=10).contains(&holding.risk_rating) {
                return Err(ScenarioError::InvalidPortfolio(format!(
                    "{}: risk rating {} outside 1-10",
                    holding.symbol, holding.risk_rating
                )));
            }
        }

        let allocation_sum: f64 = self.holdings.iter().map(|h| h.allocation_percentage).sum();
        if (allocation_sum - 100.0).abs() > SUM_TOLERANCE {
            return Err(ScenarioError::InvalidPortfolio(format!(
                "allocations sum to {:.4}, expected 100 ± {}",
                allocation_sum, SUM_TOLERANCE
            )));
        }

        let dollar_sum: f64 = self.holdings.iter().map(|h| h.dollar_amount).sum();
        if (dollar_sum - self.total_value).abs() > SUM_TOLERANCE {
            return Err(ScenarioError::InvalidPortfolio(format!(
                "holding values sum to {:.2}, expected total value {:.2}",
                dollar_sum, self.total_value
            )));
        }

        Ok(())
    }

    /// Allocation per category (percent), summed over holdings.
    pub fn category_allocation(&self) -> BTreeMap<AssetCategory, f64> {
        let mut out = BTreeMap::new();
        for holding in &self.holdings {
            *out.entry(holding.asset_category).or_insert(0.0) += holding.allocation_percentage;
        }
        out
    }
}

/// How an asset category is expected to move under a scenario, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpactFactor {
    pub min: f64,
    pub max: f64,
    pub median: f64,
    #[serde(default = "default_volatility_multiplier")]
    pub volatility_multiplier: f64,
    #[serde(default)]
    pub correlation_adjustment: f64,
}

fn default_volatility_multiplier() -> f64 {
    1.0
}

impl ImpactFactor {
    pub fn new(min: f64, max: f64, median: f64, volatility_multiplier: f64, correlation_adjustment: f64) -> Self {
        Self {
            min,
            max,
            median,
            volatility_multiplier,
            correlation_adjustment,
        }
    }

    /// Zero-impact entry used for anything the catalog does not describe.
    pub fn unclassified() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0, 0.0)
    }

    pub fn spread(&self) -> f64 {
        self.max - self.min
    }
}

/// A predefined macroeconomic scenario from the versioned catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 1-10
    pub severity: u8,
    pub duration_months: u32,
    #[serde(default)]
    pub economic_parameters: BTreeMap<String, f64>,
    pub impact_factors: BTreeMap<AssetCategory, ImpactFactor>,
    #[serde(default)]
    pub historical_precedents: Vec<String>,
    /// Typical category mix of the portfolios observed during the historical precedents.
    #[serde(default = "default_reference_allocation")]
    pub reference_allocation: BTreeMap<AssetCategory, f64>,
    /// Backtest agreement of the impact model for this scenario, 0-100.
    #[serde(default = "default_model_validation_score")]
    pub model_validation_score: f64,
}

pub fn default_reference_allocation() -> BTreeMap<AssetCategory, f64> {
    BTreeMap::from([
        (AssetCategory::DomesticEquity, 60.0),
        (AssetCategory::GovernmentBonds, 40.0),
    ])
}

fn default_model_validation_score() -> f64 {
    60.0
}

impl ScenarioDefinition {
    /// Explicit factor for a category, if the catalog carries one.
    pub fn factor_for(&self, category: AssetCategory) -> Option<&ImpactFactor> {
        if category == AssetCategory::Unclassified {
            return None;
        }
        self.impact_factors.get(&category)
    }
}

/// Per-holding line of a scenario result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetImpact {
    pub symbol: String,
    pub category: AssetCategory,
    /// Adjusted move of the holding itself, percent
    pub impact_percentage: f64,
    /// Contribution to the portfolio move, percent of portfolio
    pub weighted_impact_percentage: f64,
    pub dollar_delta: f64,
    #[serde(default)]
    pub unclassified: bool,
}

/// The four confidence sub-scores and the penalty applied on top of them.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub precedent_strength: f64,
    pub portfolio_similarity: f64,
    pub parameter_certainty: f64,
    pub model_validation: f64,
    pub unclassified_penalty: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Holding is tagged `unclassified`
    UnclassifiedCategory,
    /// Holding category has no factor in this scenario
    MissingImpactFactor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationDiagnostic {
    pub symbol: String,
    pub kind: DiagnosticKind,
    pub message: String,
}

/// Output of the scenario impact calculator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub portfolio_id: String,
    pub scenario_id: String,
    pub scenario_name: String,
    pub catalog_version: String,
    /// Sum of weighted per-asset impacts, before the concentration penalty
    pub total_impact_percentage: f64,
    pub concentration_adjusted_impact_percentage: f64,
    pub herfindahl_index: f64,
    pub concentration_multiplier: f64,
    pub total_dollar_delta: f64,
    pub confidence_score: f64,
    pub confidence_breakdown: ConfidenceBreakdown,
    pub asset_impacts: Vec<AssetImpact>,
    #[serde(default)]
    pub diagnostics: Vec<CalculationDiagnostic>,
    pub calculation_timestamp: DateTime<Utc>,
}

impl ScenarioResult {
    /// Weighted impact aggregated per category. Symbol-free, safe to share across portfolios.
    pub fn category_impacts(&self) -> BTreeMap<AssetCategory, f64> {
        let mut out = BTreeMap::new();
        for impact in &self.asset_impacts {
            *out.entry(impact.category).or_insert(0.0) += impact.weighted_impact_percentage;
        }
        out
    }

    /// Share of the portfolio (percent) sitting in holdings without a usable factor.
    pub fn unclassified_share(&self, portfolio: &PortfolioSnapshot) -> f64 {
        portfolio
            .holdings
            .iter()
            .zip(&self.asset_impacts)
            .filter(|(_, impact)| impact.unclassified)
            .map(|(holding, _)| holding.allocation_percentage)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl ExperienceLevel {
    /// Tier tag that goes into the fingerprint.
    pub fn tier(&self) -> &'static str {
        match self {
            ExperienceLevel::Beginner => "beginner",
            ExperienceLevel::Intermediate => "intermediate",
            ExperienceLevel::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDepth {
    Brief,
    #[default]
    Standard,
    Detailed,
}

/// Shapes prompt tone and depth. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub experience_level: ExperienceLevel,
    #[serde(default)]
    pub risk_tolerance: RiskTolerance,
    #[serde(default)]
    pub analysis_depth: AnalysisDepth,
}

/// Where an insight's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceMode {
    AiGenerated,
    CachedSimilar,
    TemplateFallback,
    MinimalFallback,
}

impl SourceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMode::AiGenerated => "AI_GENERATED",
            SourceMode::CachedSimilar => "CACHED_SIMILAR",
            SourceMode::TemplateFallback => "TEMPLATE_FALLBACK",
            SourceMode::MinimalFallback => "MINIMAL_FALLBACK",
        }
    }

    pub fn is_degraded(&self) -> bool {
        !matches!(self, SourceMode::AiGenerated)
    }
}

/// Why the fallback chain was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    ValidationExhausted,
    ProviderError,
    BudgetExceeded,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::ValidationExhausted => "validation_exhausted",
            FallbackReason::ProviderError => "provider_error",
            FallbackReason::BudgetExceeded => "budget_exceeded",
        }
    }
}

/// The five required sections of an insight.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InsightSections {
    pub summary: String,
    pub risks: Vec<String>,
    pub opportunities: Vec<String>,
    pub risk_management: Vec<String>,
    pub historical_context: String,
}

impl InsightSections {
    /// Character count of all section text combined.
    pub fn char_len(&self) -> usize {
        let lists = self
            .risks
            .iter()
            .chain(&self.opportunities)
            .chain(&self.risk_management)
            .map(|s| s.chars().count())
            .sum::<usize>();
        self.summary.chars().count() + self.historical_context.chars().count() + lists
    }
}

/// Human-readable explanation of a scenario result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiInsight {
    pub fingerprint: String,
    pub scenario_id: String,
    pub sections: InsightSections,
    pub quality_score: f64,
    pub source_mode: SourceMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FallbackReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disclaimer: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
