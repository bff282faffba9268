#[cfg(test)]
mod calculator_tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use scenario_core::*;

    use crate::calculator::adjusted_impact;
    use crate::catalog::{CalculationParameters, CatalogDocument, CompletenessMode, ScenarioCatalog};
    use crate::library::ScenarioLibrary;
    use crate::ScenarioCalculator;

    fn holding(symbol: &str, category: AssetCategory, pct: f64, total: f64) -> AssetHolding {
        AssetHolding {
            symbol: symbol.to_string(),
            asset_category: category,
            allocation_percentage: pct,
            dollar_amount: total * pct / 100.0,
            sector: "Diversified".to_string(),
            geographic_region: "US".to_string(),
            risk_rating: category.baseline_risk(),
        }
    }

    fn portfolio(id: &str, holdings: Vec<AssetHolding>, total: f64) -> PortfolioSnapshot {
        PortfolioSnapshot {
            id: id.to_string(),
            total_value: total,
            currency: "USD".to_string(),
            holdings,
        }
    }

    fn seeded_calculator() -> ScenarioCalculator {
        ScenarioCalculator::new(Arc::new(ScenarioCatalog::seeded().unwrap()))
    }

    /// Catalog with a single scenario whose medians are (-25, -30, +10) and no correlation.
    fn worked_example_calculator() -> ScenarioCalculator {
        let scenario = ScenarioDefinition {
            id: "worked".to_string(),
            name: "Worked example".to_string(),
            description: String::new(),
            severity: 6,
            duration_months: 12,
            economic_parameters: BTreeMap::new(),
            impact_factors: BTreeMap::from([
                (AssetCategory::DomesticEquity, ImpactFactor::new(-40.0, -10.0, -25.0, 1.0, 0.0)),
                (AssetCategory::InternationalEquity, ImpactFactor::new(-45.0, -15.0, -30.0, 1.0, 0.0)),
                (AssetCategory::GovernmentBonds, ImpactFactor::new(0.0, 20.0, 10.0, 1.0, 0.0)),
            ]),
            historical_precedents: vec!["precedent".to_string()],
            reference_allocation: default_reference_allocation(),
            model_validation_score: 50.0,
        };
        let catalog = ScenarioCatalog::load(
            CatalogDocument {
                version: "worked-1".to_string(),
                parameters: CalculationParameters::default(),
                scenarios: vec![scenario],
            },
            CompletenessMode::Lenient,
        )
        .unwrap();
        ScenarioCalculator::new(Arc::new(catalog))
    }

    fn balanced(total: f64) -> PortfolioSnapshot {
        portfolio(
            "balanced",
            vec![
                holding("VTI", AssetCategory::DomesticEquity, 60.0, total),
                holding("VXUS", AssetCategory::InternationalEquity, 25.0, total),
                holding("GOVT", AssetCategory::GovernmentBonds, 15.0, total),
            ],
            total,
        )
    }

    #[test]
    fn test_worked_example_total_impact() {
        let calc = worked_example_calculator();
        let result = calc.calculate(&balanced(100_000.0), "worked").unwrap();

        assert!((result.total_impact_percentage - (-21.0)).abs() < 1e-9);
        // Zero correlation means the concentration penalty is neutral
        assert_eq!(result.concentration_multiplier, 1.0);
        assert!((result.concentration_adjusted_impact_percentage - (-21.0)).abs() < 1e-9);
        assert!((result.total_dollar_delta - (-21_000.0)).abs() < 1e-6);

        let weighted: Vec<f64> = result.asset_impacts.iter().map(|a| a.weighted_impact_percentage).collect();
        assert_eq!(weighted, vec![-15.0, -7.5, 1.5]);
        assert!((result.asset_impacts[0].dollar_delta - (-15_000.0)).abs() < 1e-6);
    }

    #[test]
    fn test_calculation_is_deterministic() {
        let calc = seeded_calculator();
        let p = portfolio(
            "mixed",
            vec![
                holding("AAPL", AssetCategory::DomesticEquity, 35.5, 250_000.0),
                holding("EEM", AssetCategory::EmergingMarketsEquity, 12.25, 250_000.0),
                holding("HYG", AssetCategory::HighYieldBonds, 17.25, 250_000.0),
                holding("GLD", AssetCategory::Commodities, 20.0, 250_000.0),
                holding("BTC", AssetCategory::Crypto, 15.0, 250_000.0),
            ],
            250_000.0,
        );

        for scenario in calc.catalog().list() {
            let a = calc.calculate(&p, &scenario.id).unwrap();
            let b = calc.calculate(&p, &scenario.id).unwrap();
            assert_eq!(a.total_impact_percentage.to_bits(), b.total_impact_percentage.to_bits());
            assert_eq!(a.confidence_score.to_bits(), b.confidence_score.to_bits());
            assert_eq!(a.asset_impacts, b.asset_impacts);
            assert_eq!(a.confidence_breakdown, b.confidence_breakdown);
        }
    }

    #[test]
    fn test_invalid_allocation_rejected_before_lookup() {
        let calc = seeded_calculator();
        let mut p = balanced(10_000.0);
        p.holdings[0].allocation_percentage = 60.5;

        // An unknown scenario would also fail; the portfolio check must win
        let err = calc.calculate(&p, "does-not-exist").unwrap_err();
        assert!(matches!(err, ScenarioError::InvalidPortfolio(_)));
        assert!(err.is_input_error());

        p.holdings[0].allocation_percentage = 59.98;
        assert!(matches!(
            calc.calculate(&p, "financial-crisis"),
            Err(ScenarioError::InvalidPortfolio(_))
        ));
    }

    #[test]
    fn test_unknown_scenario() {
        let calc = seeded_calculator();
        let err = calc.calculate(&balanced(10_000.0), "alien-invasion").unwrap_err();
        assert_eq!(err, ScenarioError::UnknownScenario("alien-invasion".to_string()));
    }

    #[test]
    fn test_single_category_matches_median() {
        let calc = seeded_calculator();
        for scenario in ScenarioLibrary::all_scenarios() {
            for category in AssetCategory::CLASSIFIED {
                let p = portfolio("single", vec![holding("ONE", category, 100.0, 50_000.0)], 50_000.0);
                let result = calc.calculate(&p, &scenario.id).unwrap();
                let median = scenario.impact_factors[&category].median;
                assert_eq!(result.total_impact_percentage, median, "{} / {}", scenario.id, category);
            }
        }
    }

    #[test]
    fn test_confidence_bounded_for_unclassified_portfolio() {
        let calc = seeded_calculator();
        let p = portfolio(
            "mystery",
            vec![
                holding("???", AssetCategory::Unclassified, 70.0, 1_000.0),
                holding("!!!", AssetCategory::Unclassified, 30.0, 1_000.0),
            ],
            1_000.0,
        );
        for scenario in calc.catalog().list() {
            let result = calc.calculate(&p, &scenario.id).unwrap();
            assert!((0.0..=100.0).contains(&result.confidence_score));
            assert_eq!(result.total_impact_percentage, 0.0);
            assert_eq!(result.diagnostics.len(), 2);
            assert!(result
                .diagnostics
                .iter()
                .all(|d| d.kind == DiagnosticKind::UnclassifiedCategory));
            assert!(result.asset_impacts.iter().all(|a| a.unclassified));
            assert_eq!(result.unclassified_share(&p), 100.0);
        }
    }

    #[test]
    fn test_unclassified_lowers_confidence() {
        let calc = seeded_calculator();
        let clean = balanced(10_000.0);
        let mut tainted = balanced(10_000.0);
        tainted.holdings[2].asset_category = AssetCategory::Unclassified;
        tainted.holdings[2].risk_rating = 5;

        let a = calc.calculate(&clean, "rate-shock").unwrap();
        let b = calc.calculate(&tainted, "rate-shock").unwrap();
        assert!(b.confidence_score < a.confidence_score);
        assert!((b.confidence_breakdown.unclassified_penalty - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_risk_rating_moves_further_from_zero() {
        let factor = ImpactFactor::new(-55.0, -20.0, -38.0, 1.4, 0.8);
        let mut h = holding("X", AssetCategory::DomesticEquity, 100.0, 100.0);

        h.risk_rating = 8;
        assert_eq!(adjusted_impact(&factor, &h, 1.5), -41.0);
        h.risk_rating = 4;
        assert_eq!(adjusted_impact(&factor, &h, 1.5), -35.0);
        h.risk_rating = 10;
        assert_eq!(adjusted_impact(&factor, &h, 10.0), -55.0);

        let positive = ImpactFactor::new(-2.0, 15.0, 6.0, 0.6, -0.3);
        let mut bond = holding("B", AssetCategory::GovernmentBonds, 100.0, 100.0);
        bond.risk_rating = 4;
        assert_eq!(adjusted_impact(&positive, &bond, 1.5), 9.0);
    }

    #[test]
    fn test_concentration_penalty_scales_adjusted_total_only() {
        let calc = seeded_calculator();
        let concentrated = portfolio(
            "conc",
            vec![
                holding("QQQ", AssetCategory::DomesticEquity, 90.0, 10_000.0),
                holding("BIL", AssetCategory::Cash, 10.0, 10_000.0),
            ],
            10_000.0,
        );
        let result = calc.calculate(&concentrated, "financial-crisis").unwrap();

        // HHI = 0.81 + 0.01 = 0.82, rho = 0.9*0.8 + 0.1*0.0 = 0.72
        assert!((result.herfindahl_index - 0.82).abs() < 1e-9);
        let expected_multiplier = 1.0 + 0.72 * (0.82 - 0.25);
        assert!((result.concentration_multiplier - expected_multiplier).abs() < 1e-9);

        let expected_total = 0.9 * -38.0 + 0.1 * 1.0;
        assert!((result.total_impact_percentage - expected_total).abs() < 1e-9);
        assert!(
            (result.concentration_adjusted_impact_percentage - expected_total * expected_multiplier).abs() < 1e-9
        );
    }

    #[test]
    fn test_diversified_portfolio_has_no_penalty() {
        let calc = seeded_calculator();
        let holdings = AssetCategory::CLASSIFIED
            .iter()
            .enumerate()
            .map(|(i, c)| holding(&format!("H{}", i), *c, 10.0, 100_000.0))
            .collect();
        let result = calc.calculate(&portfolio("div", holdings, 100_000.0), "stagflation").unwrap();
        assert!((result.herfindahl_index - 0.1).abs() < 1e-9);
        assert_eq!(result.concentration_multiplier, 1.0);
    }

    #[test]
    fn test_fifty_asset_portfolio() {
        let calc = seeded_calculator();
        let holdings = (0..50)
            .map(|i| {
                let category = AssetCategory::ALL[i % AssetCategory::ALL.len()];
                holding(&format!("SYM{}", i), category, 2.0, 1_000_000.0)
            })
            .collect();
        let p = portfolio("big", holdings, 1_000_000.0);

        let started = std::time::Instant::now();
        let result = calc.calculate(&p, "pandemic-shock").unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
        assert_eq!(result.asset_impacts.len(), 50);
        assert!((0.0..=100.0).contains(&result.confidence_score));
    }
}
