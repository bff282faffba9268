use regex::Regex;
use scenario_core::{AssetCategory, InsightSections};
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

use crate::parser::Section;

/// A single reason an insight was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", content = "detail", rename_all = "snake_case")]
pub enum ValidationIssue {
    MissingSection(&'static str),
    DuplicateSection(&'static str),
    EmptySection(&'static str),
    TooShort { chars: usize, min: usize },
    TooLong { chars: usize, max: usize },
    ForbiddenPhrase(String),
    Contradiction(AssetCategory),
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingSection(s) => write!(f, "the \"{}\" section is missing", s),
            ValidationIssue::DuplicateSection(s) => write!(f, "the \"{}\" section appears more than once", s),
            ValidationIssue::EmptySection(s) => write!(f, "the \"{}\" section is empty", s),
            ValidationIssue::TooShort { chars, min } => {
                write!(f, "the response is too short ({} characters, minimum {})", chars, min)
            }
            ValidationIssue::TooLong { chars, max } => {
                write!(f, "the response is too long ({} characters, maximum {})", chars, max)
            }
            ValidationIssue::ForbiddenPhrase(p) => write!(f, "the response contains a directive or guarantee: \"{}\"", p),
            ValidationIssue::Contradiction(c) => {
                write!(f, "{} are described both as a risk and as an opportunity", c.label())
            }
        }
    }
}

/// Which checks apply. AI output gets the full set; locally generated templates skip the
/// length window since their size depends on the portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
    pub length_window: Option<(usize, usize)>,
}

impl ValidationPolicy {
    pub fn ai(min_chars: usize, max_chars: usize) -> Self {
        Self {
            length_window: Some((min_chars, max_chars)),
        }
    }

    pub fn structural() -> Self {
        Self { length_window: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub accepted: bool,
    pub issues: Vec<ValidationIssue>,
    pub quality_score: f64,
}

impl ValidationOutcome {
    pub fn rejected(issues: Vec<ValidationIssue>) -> Self {
        Self {
            accepted: false,
            quality_score: rejected_score(issues.len()),
            issues,
        }
    }
}

static FORBIDDEN: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(you|we) (should|must|need to) (buy|sell|short)\b",
        r"(?i)\b(buy|sell|short) (now|immediately|today)\b",
        r"(?i)\b(is|are) guaranteed\b",
        r"(?i)\bguaranteed (returns?|profits?|gains?|to)\b",
        r"(?i)\bwill definitely\b",
        r"(?i)\brisk-free (returns|profits)\b",
        r"(?i)\bcan(not|'t) lose\b",
        r"(?i)\bi recommend (buying|selling)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("forbidden phrase pattern"))
    .collect()
});

static NEGATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(fall|falls|decline|declines|drop|drops|lose|loses|losses|underperform|underperforms)\b")
        .expect("negative pattern")
});

static POSITIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(rise|rises|rally|rallies|gain|gains|appreciate|appreciates|outperform|outperforms|benefit|benefits)\b")
        .expect("positive pattern")
});

static CATEGORY_KEYWORDS: LazyLock<Vec<(AssetCategory, Regex)>> = LazyLock::new(|| {
    [
        (AssetCategory::DomesticEquity, r"(?i)\b(domestic (equit|stock)\w*|u\.?s\.? (equit|stock)\w*|large[- ]cap)"),
        (AssetCategory::InternationalEquity, r"(?i)\b(international (equit|stock)\w*|developed[- ]market|foreign (equit|stock)\w*)"),
        (AssetCategory::EmergingMarketsEquity, r"(?i)\bemerging[- ]market"),
        (AssetCategory::GovernmentBonds, r"(?i)\b(government bonds?|treasur\w*|gilts?|sovereign debt)"),
        (AssetCategory::CorporateBonds, r"(?i)\b(corporate bonds?|investment[- ]grade)"),
        (AssetCategory::HighYieldBonds, r"(?i)\b(high[- ]yield|junk bonds?)"),
        (AssetCategory::RealEstate, r"(?i)\b(real estate|reits?|property)\b"),
        (AssetCategory::Commodities, r"(?i)\b(commodit\w*|gold|oil)\b"),
        (AssetCategory::Cash, r"(?i)\b(cash|money market)\b"),
        (AssetCategory::Crypto, r"(?i)\b(crypto\w*|bitcoin|ethereum)\b"),
    ]
    .into_iter()
    .map(|(category, pattern)| (category, Regex::new(pattern).expect("category pattern")))
    .collect()
});

fn rejected_score(issue_count: usize) -> f64 {
    (100.0 - 20.0 * issue_count as f64).clamp(0.0, 100.0)
}

fn accepted_score(sections: &InsightSections) -> f64 {
    let items = sections.risks.len() + sections.opportunities.len() + sections.risk_management.len();
    70.0 + (3.0 * items as f64).min(30.0)
}

fn mentioned_categories(text: &str) -> impl Iterator<Item = AssetCategory> + '_ {
    CATEGORY_KEYWORDS
        .iter()
        .filter(move |(_, re)| re.is_match(text))
        .map(|(category, _)| *category)
}

/// Checks parsed insight sections against the content rules.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    policy: ValidationPolicy,
}

impl Validator {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    pub fn validate(&self, sections: &InsightSections) -> ValidationOutcome {
        let mut issues = Vec::new();

        if let Some((min, max)) = self.policy.length_window {
            let chars = sections.char_len();
            if chars < min {
                issues.push(ValidationIssue::TooShort { chars, min });
            } else if chars > max {
                issues.push(ValidationIssue::TooLong { chars, max });
            }
        }

        let empty = [
            (Section::ImpactSummary, sections.summary.trim().is_empty()),
            (Section::KeyRisks, is_empty_list(&sections.risks)),
            (Section::Opportunities, is_empty_list(&sections.opportunities)),
            (Section::RiskManagement, is_empty_list(&sections.risk_management)),
            (Section::HistoricalContext, sections.historical_context.trim().is_empty()),
        ];
        for (section, is_empty) in empty {
            if is_empty {
                issues.push(ValidationIssue::EmptySection(section.heading()));
            }
        }

        for text in all_text(sections) {
            for re in FORBIDDEN.iter() {
                if let Some(m) = re.find(text) {
                    let phrase = m.as_str().to_lowercase();
                    let issue = ValidationIssue::ForbiddenPhrase(phrase);
                    if !issues.contains(&issue) {
                        issues.push(issue);
                    }
                }
            }
        }

        for category in contradictions(sections) {
            issues.push(ValidationIssue::Contradiction(category));
        }

        if issues.is_empty() {
            ValidationOutcome {
                accepted: true,
                issues,
                quality_score: accepted_score(sections),
            }
        } else {
            ValidationOutcome::rejected(issues)
        }
    }
}

fn is_empty_list(items: &[String]) -> bool {
    items.iter().all(|i| i.trim().is_empty())
}

fn all_text(sections: &InsightSections) -> impl Iterator<Item = &str> {
    std::iter::once(sections.summary.as_str())
        .chain(sections.risks.iter().map(String::as_str))
        .chain(sections.opportunities.iter().map(String::as_str))
        .chain(sections.risk_management.iter().map(String::as_str))
        .chain(std::iter::once(sections.historical_context.as_str()))
}

/// Categories a risk item says will fall while an opportunity item says they will rise.
fn contradictions(sections: &InsightSections) -> Vec<AssetCategory> {
    let bearish: Vec<AssetCategory> = sections
        .risks
        .iter()
        .filter(|item| NEGATIVE.is_match(item))
        .flat_map(|item| mentioned_categories(item).collect::<Vec<_>>())
        .collect();

    let mut found: Vec<AssetCategory> = sections
        .opportunities
        .iter()
        .filter(|item| POSITIVE.is_match(item))
        .flat_map(|item| mentioned_categories(item).collect::<Vec<_>>())
        .filter(|category| bearish.contains(category))
        .collect();
    found.sort();
    found.dedup();
    found
}
