use std::collections::BTreeMap;
use std::fmt::Write as _;

use scenario_core::{
    AnalysisDepth, AssetCategory, ExperienceLevel, PortfolioSnapshot, RiskTolerance, ScenarioDefinition,
    ScenarioResult, UserProfile,
};

use crate::parser::Section;
use crate::validation::ValidationIssue;

/// Per-category view of a scenario result.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryLine {
    pub category: AssetCategory,
    /// Percent of the portfolio
    pub allocation: f64,
    /// Contribution to the portfolio move, percentage points
    pub weighted_impact: f64,
}

impl CategoryLine {
    /// Modelled move of the category itself.
    pub fn category_move(&self) -> f64 {
        if self.allocation > 0.0 {
            self.weighted_impact * 100.0 / self.allocation
        } else {
            0.0
        }
    }
}

/// Everything a prompt or template may say about a request. Holds category-level
/// figures only, so text built from it can be shared between portfolios with the
/// same fingerprint.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub scenario_name: String,
    pub scenario_description: String,
    pub severity: u8,
    pub duration_months: u32,
    pub economic_parameters: BTreeMap<String, f64>,
    pub historical_precedents: Vec<String>,
    pub categories: Vec<CategoryLine>,
    pub total_impact: f64,
    pub adjusted_impact: f64,
    pub herfindahl_index: f64,
    pub concentration_threshold: f64,
    pub confidence_score: f64,
    pub unclassified_share: f64,
    pub profile: UserProfile,
}

impl PromptContext {
    pub fn new(
        portfolio: &PortfolioSnapshot,
        scenario: &ScenarioDefinition,
        result: &ScenarioResult,
        profile: UserProfile,
        concentration_threshold: f64,
    ) -> Self {
        let impacts = result.category_impacts();
        let categories = portfolio
            .category_allocation()
            .into_iter()
            .map(|(category, allocation)| CategoryLine {
                category,
                allocation,
                weighted_impact: impacts.get(&category).copied().unwrap_or(0.0),
            })
            .collect();

        Self {
            scenario_name: scenario.name.clone(),
            scenario_description: scenario.description.clone(),
            severity: scenario.severity,
            duration_months: scenario.duration_months,
            economic_parameters: scenario.economic_parameters.clone(),
            historical_precedents: scenario.historical_precedents.clone(),
            categories,
            total_impact: result.total_impact_percentage,
            adjusted_impact: result.concentration_adjusted_impact_percentage,
            herfindahl_index: result.herfindahl_index,
            concentration_threshold,
            confidence_score: result.confidence_score,
            unclassified_share: result.unclassified_share(portfolio),
            profile,
        }
    }

    pub fn is_concentrated(&self) -> bool {
        self.herfindahl_index > self.concentration_threshold
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub text: String,
    pub max_tokens: u32,
}

pub fn max_tokens_for(depth: AnalysisDepth) -> u32 {
    match depth {
        AnalysisDepth::Brief => 500,
        AnalysisDepth::Standard => 700,
        AnalysisDepth::Detailed => 900,
    }
}

fn audience(level: ExperienceLevel) -> &'static str {
    match level {
        ExperienceLevel::Beginner => {
            "The reader is new to investing. Use plain language, explain terms such as drawdown or \
             diversification in a few words, and avoid jargon."
        }
        ExperienceLevel::Intermediate => {
            "The reader understands asset classes and diversification. Be clear and concrete."
        }
        ExperienceLevel::Advanced => {
            "The reader is an experienced investor. Be concise and precise; mention correlation and \
             concentration effects where they matter."
        }
    }
}

fn stance(tolerance: RiskTolerance) -> &'static str {
    match tolerance {
        RiskTolerance::Conservative => {
            "The reader prefers capital preservation. Emphasise downside protection and liquidity."
        }
        RiskTolerance::Moderate => "The reader balances growth against drawdowns. Weigh both sides evenly.",
        RiskTolerance::Aggressive => {
            "The reader accepts large swings for long-term growth. Be candid about the size of the drawdown \
             and about recovery periods."
        }
    }
}

fn depth_hint(depth: AnalysisDepth) -> &'static str {
    match depth {
        AnalysisDepth::Brief => "Keep each section short: two or three bullets per list.",
        AnalysisDepth::Standard => "Use three or four bullets per list.",
        AnalysisDepth::Detailed => "Use four or five bullets per list and explain the reasoning behind each figure.",
    }
}

/// Builds inference prompts for the response grammar understood by [`crate::parser`].
#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder {
    min_chars: usize,
    max_chars: usize,
}

impl PromptBuilder {
    pub fn new(min_chars: usize, max_chars: usize) -> Self {
        Self { min_chars, max_chars }
    }

    pub fn build(&self, ctx: &PromptContext) -> Prompt {
        let mut text = String::with_capacity(2048);
        text.push_str(
            "You are a financial educator explaining the result of a portfolio stress test. \
             Describe what the figures mean; do not give personal investment instructions.\n\n",
        );

        let _ = writeln!(
            text,
            "Scenario: {} (severity {}/10, lasting about {} months)",
            ctx.scenario_name, ctx.severity, ctx.duration_months
        );
        if !ctx.scenario_description.is_empty() {
            let _ = writeln!(text, "{}", ctx.scenario_description);
        }
        if !ctx.economic_parameters.is_empty() {
            text.push_str("Economic assumptions:\n");
            for (name, value) in &ctx.economic_parameters {
                let _ = writeln!(text, "- {}: {:+}", name.replace('_', " "), value);
            }
        }

        text.push_str("\nPortfolio composition and modelled impact by asset category:\n");
        for line in &ctx.categories {
            let _ = writeln!(
                text,
                "- {}: {:.0}% of the portfolio, modelled move {:+.1}%, contribution {:+.2} percentage points",
                line.category.label(),
                line.allocation,
                line.category_move(),
                line.weighted_impact
            );
        }
        let _ = writeln!(text, "Estimated portfolio impact: {:+.1}%", ctx.total_impact);
        if ctx.is_concentrated() {
            let _ = writeln!(
                text,
                "After adjusting for concentration (Herfindahl index {:.2}): {:+.1}%",
                ctx.herfindahl_index, ctx.adjusted_impact
            );
        }
        let _ = writeln!(text, "Confidence in the estimate: {:.0}/100", ctx.confidence_score);
        if ctx.unclassified_share > 0.0 {
            let _ = writeln!(
                text,
                "{:.0}% of the portfolio could not be classified and is excluded from the estimate.",
                ctx.unclassified_share
            );
        }
        if !ctx.historical_precedents.is_empty() {
            let _ = writeln!(text, "Historical precedents: {}", ctx.historical_precedents.join("; "));
        }

        let _ = write!(
            text,
            "\n{}\n{}\n{}\n",
            audience(ctx.profile.experience_level),
            stance(ctx.profile.risk_tolerance),
            depth_hint(ctx.profile.analysis_depth)
        );

        let _ = write!(
            text,
            "\nWrite between {} and {} characters in total, using exactly these headings in this order:\n",
            self.min_chars, self.max_chars
        );
        for section in Section::ALL {
            let _ = writeln!(text, "## {}", section.heading());
        }
        text.push_str(
            "Use \"-\" bullets under Key Risks, Opportunities and Risk Management, and prose under the other headings.\n\
             Do not tell the reader to buy, sell or short anything, and do not promise or guarantee any outcome.\n\
             Do not describe the same asset category as both a risk and an opportunity.\n",
        );

        Prompt {
            text,
            max_tokens: max_tokens_for(ctx.profile.analysis_depth),
        }
    }

    /// Prompt for a retry after a rejected response, naming what was wrong.
    pub fn build_retry(&self, ctx: &PromptContext, issues: &[ValidationIssue], attempt: u32) -> Prompt {
        let mut prompt = self.build(ctx);
        let _ = write!(
            prompt.text,
            "\nAttempt {}. The previous answer was rejected because:\n",
            attempt + 1
        );
        for issue in issues {
            let _ = writeln!(prompt.text, "- {}", issue);
        }
        prompt
            .text
            .push_str("Fix every point above and keep all five headings exactly as written.\n");
        prompt
    }
}
