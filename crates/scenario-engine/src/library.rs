//! Pre-built Macroeconomic Scenarios
//!
//! Stress events modelled on well-documented historical episodes.

use std::collections::BTreeMap;

use scenario_core::{AssetCategory, ImpactFactor, ScenarioDefinition};

/// Version tag of the built-in library. Bump whenever any factor changes so cached
/// results computed against older numbers stop matching.
pub const SEEDED_CATALOG_VERSION: &str = "2024.1";

/// Library of pre-built scenarios
pub struct ScenarioLibrary;

impl ScenarioLibrary {
    /// Get all available scenarios
    pub fn all_scenarios() -> Vec<ScenarioDefinition> {
        vec![
            Self::financial_crisis(),
            Self::inflation_spike(),
            Self::rate_shock(),
            Self::tech_valuation_reset(),
            Self::pandemic_shock(),
            Self::stagflation(),
        ]
    }

    /// 2008-style credit crisis
    pub fn financial_crisis() -> ScenarioDefinition {
        ScenarioDefinition {
            id: "financial-crisis".to_string(),
            name: "Global Financial Crisis".to_string(),
            description: "A banking and credit collapse in the mould of 2008: interbank lending freezes, credit spreads blow out and equities fall for well over a year while high-quality government bonds rally.".to_string(),
            severity: 9,
            duration_months: 18,
            economic_parameters: params(&[
                ("gdp_growth_delta", -4.0),
                ("unemployment_delta", 5.0),
                ("policy_rate_delta", -4.5),
                ("credit_spread_delta", 5.5),
            ]),
            impact_factors: factors([
                (AssetCategory::DomesticEquity, f(-55.0, -20.0, -38.0, 1.4, 0.8)),
                (AssetCategory::InternationalEquity, f(-60.0, -25.0, -42.0, 1.5, 0.8)),
                (AssetCategory::EmergingMarketsEquity, f(-70.0, -30.0, -50.0, 1.7, 0.85)),
                (AssetCategory::GovernmentBonds, f(-2.0, 15.0, 6.0, 0.6, -0.3)),
                (AssetCategory::CorporateBonds, f(-20.0, 5.0, -8.0, 1.0, 0.5)),
                (AssetCategory::HighYieldBonds, f(-40.0, -10.0, -26.0, 1.3, 0.7)),
                (AssetCategory::RealEstate, f(-65.0, -25.0, -45.0, 1.5, 0.8)),
                (AssetCategory::Commodities, f(-55.0, -15.0, -35.0, 1.4, 0.6)),
                (AssetCategory::Cash, f(0.0, 2.0, 1.0, 0.1, 0.0)),
                (AssetCategory::Crypto, f(-80.0, -20.0, -50.0, 2.0, 0.5)),
            ]),
            historical_precedents: strings(&[
                "2008 Global Financial Crisis",
                "2000-2002 dot-com bust",
                "1973-1974 bear market",
            ]),
            reference_allocation: allocation(&[
                (AssetCategory::DomesticEquity, 60.0),
                (AssetCategory::GovernmentBonds, 40.0),
            ]),
            model_validation_score: 72.0,
        }
    }

    /// Sudden, persistent rise in consumer prices
    pub fn inflation_spike() -> ScenarioDefinition {
        ScenarioDefinition {
            id: "inflation-spike".to_string(),
            name: "Inflation Spike".to_string(),
            description: "Consumer price inflation jumps well above target and stays there for a year. Real returns on nominal assets erode while real assets and commodities hold value.".to_string(),
            severity: 6,
            duration_months: 12,
            economic_parameters: params(&[
                ("cpi_delta", 6.0),
                ("policy_rate_delta", 3.0),
                ("ten_year_yield_delta", 1.8),
            ]),
            impact_factors: factors([
                (AssetCategory::DomesticEquity, f(-25.0, -5.0, -15.0, 1.2, 0.6)),
                (AssetCategory::InternationalEquity, f(-25.0, -5.0, -14.0, 1.2, 0.6)),
                (AssetCategory::EmergingMarketsEquity, f(-30.0, -5.0, -18.0, 1.4, 0.6)),
                (AssetCategory::GovernmentBonds, f(-18.0, -3.0, -10.0, 0.9, 0.5)),
                (AssetCategory::CorporateBonds, f(-20.0, -4.0, -12.0, 1.0, 0.5)),
                (AssetCategory::HighYieldBonds, f(-22.0, -4.0, -13.0, 1.1, 0.5)),
                (AssetCategory::RealEstate, f(-15.0, 5.0, -5.0, 1.0, 0.4)),
                (AssetCategory::Commodities, f(5.0, 40.0, 20.0, 1.5, -0.2)),
                (AssetCategory::Cash, f(-8.0, -2.0, -5.0, 0.2, 0.0)),
                (AssetCategory::Crypto, f(-60.0, 10.0, -30.0, 2.0, 0.4)),
            ]),
            historical_precedents: strings(&[
                "1970s Great Inflation",
                "2021-2022 inflation surge",
            ]),
            reference_allocation: allocation(&[
                (AssetCategory::DomesticEquity, 55.0),
                (AssetCategory::GovernmentBonds, 35.0),
                (AssetCategory::Cash, 10.0),
            ]),
            model_validation_score: 65.0,
        }
    }

    /// Rapid central bank tightening
    pub fn rate_shock() -> ScenarioDefinition {
        ScenarioDefinition {
            id: "rate-shock".to_string(),
            name: "Rapid Rate Shock".to_string(),
            description: "The central bank raises policy rates by several hundred basis points within a few quarters. Long-duration assets reprice sharply and leveraged sectors come under pressure.".to_string(),
            severity: 7,
            duration_months: 9,
            economic_parameters: params(&[
                ("policy_rate_delta", 3.5),
                ("ten_year_yield_delta", 2.5),
                ("gdp_growth_delta", -1.0),
            ]),
            impact_factors: factors([
                (AssetCategory::DomesticEquity, f(-30.0, -8.0, -18.0, 1.2, 0.6)),
                (AssetCategory::InternationalEquity, f(-28.0, -8.0, -17.0, 1.2, 0.6)),
                (AssetCategory::EmergingMarketsEquity, f(-38.0, -10.0, -24.0, 1.5, 0.7)),
                (AssetCategory::GovernmentBonds, f(-20.0, -5.0, -12.0, 0.8, 0.5)),
                (AssetCategory::CorporateBonds, f(-22.0, -6.0, -14.0, 0.9, 0.5)),
                (AssetCategory::HighYieldBonds, f(-25.0, -6.0, -15.0, 1.1, 0.6)),
                (AssetCategory::RealEstate, f(-35.0, -10.0, -22.0, 1.3, 0.7)),
                (AssetCategory::Commodities, f(-15.0, 10.0, -3.0, 1.2, 0.2)),
                (AssetCategory::Cash, f(1.0, 4.0, 2.5, 0.1, 0.0)),
                (AssetCategory::Crypto, f(-70.0, -20.0, -45.0, 2.0, 0.6)),
            ]),
            historical_precedents: strings(&[
                "1994 bond market sell-off",
                "1980-1981 Volcker tightening",
                "2022 Federal Reserve tightening cycle",
            ]),
            reference_allocation: allocation(&[
                (AssetCategory::DomesticEquity, 60.0),
                (AssetCategory::GovernmentBonds, 30.0),
                (AssetCategory::CorporateBonds, 10.0),
            ]),
            model_validation_score: 70.0,
        }
    }

    /// Multiple compression in richly valued growth stocks
    pub fn tech_valuation_reset() -> ScenarioDefinition {
        ScenarioDefinition {
            id: "tech-valuation-reset".to_string(),
            name: "Tech Valuation Reset".to_string(),
            description: "Growth and technology valuations compress back toward long-run averages over two years. Broad equity indices fall, concentrated growth exposure falls much further, and defensive assets are mostly spared.".to_string(),
            severity: 7,
            duration_months: 24,
            economic_parameters: params(&[
                ("growth_pe_delta", -40.0),
                ("gdp_growth_delta", -1.0),
            ]),
            impact_factors: factors([
                (AssetCategory::DomesticEquity, f(-45.0, -10.0, -28.0, 1.4, 0.7)),
                (AssetCategory::InternationalEquity, f(-30.0, -5.0, -15.0, 1.1, 0.5)),
                (AssetCategory::EmergingMarketsEquity, f(-35.0, -5.0, -20.0, 1.3, 0.5)),
                (AssetCategory::GovernmentBonds, f(-2.0, 10.0, 4.0, 0.5, -0.2)),
                (AssetCategory::CorporateBonds, f(-8.0, 4.0, -2.0, 0.7, 0.3)),
                (AssetCategory::HighYieldBonds, f(-18.0, 0.0, -9.0, 1.0, 0.4)),
                (AssetCategory::RealEstate, f(-15.0, 5.0, -5.0, 0.9, 0.3)),
                (AssetCategory::Commodities, f(-10.0, 10.0, 0.0, 1.0, 0.1)),
                (AssetCategory::Cash, f(0.0, 2.0, 1.0, 0.1, 0.0)),
                (AssetCategory::Crypto, f(-85.0, -30.0, -60.0, 2.2, 0.7)),
            ]),
            historical_precedents: strings(&[
                "2000-2002 dot-com bust",
                "2022 growth stock drawdown",
            ]),
            reference_allocation: allocation(&[
                (AssetCategory::DomesticEquity, 70.0),
                (AssetCategory::InternationalEquity, 10.0),
                (AssetCategory::GovernmentBonds, 20.0),
            ]),
            model_validation_score: 68.0,
        }
    }

    /// Abrupt global demand stop
    pub fn pandemic_shock() -> ScenarioDefinition {
        ScenarioDefinition {
            id: "pandemic-shock".to_string(),
            name: "Pandemic Shock".to_string(),
            description: "A global health emergency forces lockdowns and halts activity almost overnight. Risk assets crash within weeks, oil and industrial commodities collapse, and policy support arrives quickly.".to_string(),
            severity: 8,
            duration_months: 6,
            economic_parameters: params(&[
                ("gdp_growth_delta", -6.0),
                ("unemployment_delta", 8.0),
                ("policy_rate_delta", -1.5),
            ]),
            impact_factors: factors([
                (AssetCategory::DomesticEquity, f(-40.0, -10.0, -25.0, 1.6, 0.8)),
                (AssetCategory::InternationalEquity, f(-42.0, -12.0, -27.0, 1.6, 0.8)),
                (AssetCategory::EmergingMarketsEquity, f(-45.0, -12.0, -30.0, 1.7, 0.8)),
                (AssetCategory::GovernmentBonds, f(0.0, 12.0, 5.0, 0.6, -0.4)),
                (AssetCategory::CorporateBonds, f(-15.0, 5.0, -4.0, 1.0, 0.5)),
                (AssetCategory::HighYieldBonds, f(-30.0, -5.0, -15.0, 1.3, 0.7)),
                (AssetCategory::RealEstate, f(-40.0, -10.0, -25.0, 1.5, 0.7)),
                (AssetCategory::Commodities, f(-50.0, -10.0, -30.0, 1.6, 0.6)),
                (AssetCategory::Cash, f(0.0, 1.0, 0.5, 0.1, 0.0)),
                (AssetCategory::Crypto, f(-60.0, 0.0, -35.0, 2.0, 0.6)),
            ]),
            historical_precedents: strings(&["2020 COVID-19 crash"]),
            reference_allocation: allocation(&[
                (AssetCategory::DomesticEquity, 60.0),
                (AssetCategory::GovernmentBonds, 40.0),
            ]),
            model_validation_score: 60.0,
        }
    }

    /// High inflation with stagnant growth
    pub fn stagflation() -> ScenarioDefinition {
        ScenarioDefinition {
            id: "stagflation".to_string(),
            name: "Stagflation".to_string(),
            description: "Inflation stays high while growth stalls and unemployment rises. Both stocks and bonds lose ground in real terms; commodities are the main beneficiary.".to_string(),
            severity: 8,
            duration_months: 24,
            economic_parameters: params(&[
                ("cpi_delta", 7.0),
                ("gdp_growth_delta", -2.0),
                ("unemployment_delta", 3.0),
            ]),
            impact_factors: factors([
                (AssetCategory::DomesticEquity, f(-35.0, -10.0, -22.0, 1.3, 0.7)),
                (AssetCategory::InternationalEquity, f(-35.0, -10.0, -22.0, 1.3, 0.7)),
                (AssetCategory::EmergingMarketsEquity, f(-40.0, -10.0, -25.0, 1.5, 0.7)),
                (AssetCategory::GovernmentBonds, f(-15.0, 0.0, -8.0, 0.9, 0.4)),
                (AssetCategory::CorporateBonds, f(-18.0, -2.0, -10.0, 1.0, 0.5)),
                (AssetCategory::HighYieldBonds, f(-28.0, -5.0, -16.0, 1.2, 0.6)),
                (AssetCategory::RealEstate, f(-20.0, 5.0, -8.0, 1.1, 0.5)),
                (AssetCategory::Commodities, f(0.0, 45.0, 22.0, 1.6, -0.2)),
                (AssetCategory::Cash, f(-7.0, -1.0, -4.0, 0.2, 0.0)),
                (AssetCategory::Crypto, f(-65.0, 0.0, -35.0, 2.1, 0.5)),
            ]),
            historical_precedents: strings(&[
                "1973-1975 oil shock",
                "1979-1982 stagflation",
            ]),
            reference_allocation: allocation(&[
                (AssetCategory::DomesticEquity, 60.0),
                (AssetCategory::GovernmentBonds, 40.0),
            ]),
            model_validation_score: 58.0,
        }
    }
}

fn f(min: f64, max: f64, median: f64, volatility_multiplier: f64, correlation_adjustment: f64) -> ImpactFactor {
    ImpactFactor::new(min, max, median, volatility_multiplier, correlation_adjustment)
}

fn factors(entries: [(AssetCategory, ImpactFactor); 10]) -> BTreeMap<AssetCategory, ImpactFactor> {
    entries.into_iter().collect()
}

fn params(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn allocation(entries: &[(AssetCategory, f64)]) -> BTreeMap<AssetCategory, f64> {
    entries.iter().copied().collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
