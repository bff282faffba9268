//! Degraded insights built without the inference provider.

use scenario_core::InsightSections;

use crate::prompt::{CategoryLine, PromptContext};

pub const SIMILAR_DISCLAIMER: &str = "This commentary was written for a closely similar portfolio; \
     figures for your exact holdings may differ slightly.";

pub const TEMPLATE_DISCLAIMER: &str =
    "AI commentary is unavailable right now. This summary was generated directly from the calculated figures.";

pub const MINIMAL_DISCLAIMER: &str =
    "Insight unavailable: only the calculated figures can be shown for this scenario right now.";

fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn summary_line(ctx: &PromptContext) -> String {
    let mut summary = format!(
        "Under the {} scenario this portfolio is estimated to move {:+.1}%",
        ctx.scenario_name, ctx.total_impact
    );
    if ctx.is_concentrated() && (ctx.adjusted_impact - ctx.total_impact).abs() >= 0.05 {
        summary.push_str(&format!(
            ", or {:+.1}% once its concentration is taken into account",
            ctx.adjusted_impact
        ));
    }
    summary.push_str(&format!(
        ". The estimate carries a confidence score of {:.0} out of 100.",
        ctx.confidence_score
    ));
    summary
}

/// Sections populated purely from the calculated figures.
pub fn template_sections(ctx: &PromptContext) -> InsightSections {
    let mut losers: Vec<&CategoryLine> = ctx.categories.iter().filter(|l| l.weighted_impact < 0.0).collect();
    losers.sort_by(|a, b| a.weighted_impact.total_cmp(&b.weighted_impact));
    let mut winners: Vec<&CategoryLine> = ctx.categories.iter().filter(|l| l.weighted_impact > 0.0).collect();
    winners.sort_by(|a, b| b.weighted_impact.total_cmp(&a.weighted_impact));

    let mut risks: Vec<String> = losers
        .iter()
        .map(|l| {
            format!(
                "{} ({:.0}% of the portfolio) could decline about {:.1}%, a drag of {:.1} percentage points.",
                capitalise(l.category.label()),
                l.allocation,
                l.category_move().abs(),
                l.weighted_impact.abs()
            )
        })
        .collect();
    if risks.is_empty() {
        risks.push(
            "No asset category is expected to decline in this scenario; the main risk is that actual moves \
             differ from the modelled ranges."
                .to_string(),
        );
    }

    let mut opportunities: Vec<String> = winners
        .iter()
        .map(|l| {
            format!(
                "{} ({:.0}% of the portfolio) could gain about {:.1}%, offsetting {:.1} percentage points.",
                capitalise(l.category.label()),
                l.allocation,
                l.category_move(),
                l.weighted_impact
            )
        })
        .collect();
    if opportunities.is_empty() {
        opportunities.push(
            "No asset category is expected to post gains in this scenario, so preserving liquidity matters \
             more than seeking upside."
                .to_string(),
        );
    }

    let mut risk_management = vec![
        "Compare the estimated drawdown with your time horizon and near-term spending needs.".to_string(),
        "Rebalancing rules agreed in advance help avoid decisions made under stress.".to_string(),
    ];
    if ctx.is_concentrated() {
        risk_management.push(format!(
            "The portfolio is concentrated (Herfindahl index {:.2}); spreading exposure across more categories \
             would soften the concentration effect.",
            ctx.herfindahl_index
        ));
    }
    if ctx.unclassified_share > 0.0 {
        risk_management.push(format!(
            "{:.0}% of the portfolio could not be classified, so its exposure is not reflected in these figures.",
            ctx.unclassified_share
        ));
    }

    let mut historical_context = if ctx.historical_precedents.is_empty() {
        "This scenario has no close historical precedent.".to_string()
    } else {
        format!("Comparable episodes include {}.", ctx.historical_precedents.join(", "))
    };
    if !ctx.scenario_description.is_empty() {
        historical_context.push(' ');
        historical_context.push_str(&ctx.scenario_description);
    }

    InsightSections {
        summary: summary_line(ctx),
        risks,
        opportunities,
        risk_management,
        historical_context,
    }
}

/// Numeric summary only.
pub fn minimal_sections(ctx: &PromptContext) -> InsightSections {
    InsightSections {
        summary: summary_line(ctx),
        ..InsightSections::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures;
    use crate::validation::{ValidationPolicy, Validator};
    use scenario_core::UserProfile;

    #[test]
    fn test_template_passes_structural_validation() {
        let ctx = fixtures::context(UserProfile::default());
        let sections = template_sections(&ctx);
        let outcome = Validator::new(ValidationPolicy::structural()).validate(&sections);
        assert!(outcome.accepted, "{:?}", outcome.issues);

        assert!(sections.summary.contains("-21.0%"));
        assert_eq!(sections.risks.len(), 2);
        assert!(sections.risks[1].starts_with("International equities (25% of the portfolio) could decline about 30.0%"));
        assert_eq!(sections.opportunities.len(), 1);
        assert!(sections.opportunities[0].starts_with("Government bonds (15% of the portfolio) could gain about 10.0%"));
        // 60/25/15 is above the default concentration threshold
        assert_eq!(sections.risk_management.len(), 3);
    }

    #[test]
    fn test_largest_drag_listed_first() {
        let ctx = fixtures::context(UserProfile::default());
        let sections = template_sections(&ctx);
        assert!(sections.risks[0].starts_with("Domestic equities (60% of the portfolio)"));
    }

    #[test]
    fn test_all_negative_portfolio_avoids_contradiction() {
        let mut ctx = fixtures::context(UserProfile::default());
        ctx.categories.retain(|l| l.weighted_impact < 0.0);
        let sections = template_sections(&ctx);
        let outcome = Validator::new(ValidationPolicy::structural()).validate(&sections);
        assert!(outcome.accepted, "{:?}", outcome.issues);
        assert!(sections.opportunities[0].starts_with("No asset category"));
    }

    #[test]
    fn test_minimal_has_summary_only() {
        let ctx = fixtures::context(UserProfile::default());
        let sections = minimal_sections(&ctx);
        assert!(!sections.summary.is_empty());
        assert!(sections.risks.is_empty());
        assert!(sections.historical_context.is_empty());
    }
}
