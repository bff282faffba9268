//! Response grammar, version 1.
//!
//! A response consists of five headed sections in any order:
//! `Impact Summary`, `Key Risks`, `Opportunities`, `Risk Management`, `Historical Context`.
//! Headings are matched case-insensitively and may be written as markdown headings
//! (`#` to `###`), in bold, or with a trailing colon. Text before the first heading
//! is ignored. The three list sections take `-`, `*`, `•` or numbered bullets; other
//! lines continue the previous bullet.

use scenario_core::InsightSections;

use crate::validation::ValidationIssue;

pub const GRAMMAR_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    ImpactSummary,
    KeyRisks,
    Opportunities,
    RiskManagement,
    HistoricalContext,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::ImpactSummary,
        Section::KeyRisks,
        Section::Opportunities,
        Section::RiskManagement,
        Section::HistoricalContext,
    ];

    pub fn heading(&self) -> &'static str {
        match self {
            Section::ImpactSummary => "Impact Summary",
            Section::KeyRisks => "Key Risks",
            Section::Opportunities => "Opportunities",
            Section::RiskManagement => "Risk Management",
            Section::HistoricalContext => "Historical Context",
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Section::KeyRisks | Section::Opportunities | Section::RiskManagement)
    }
}

#[derive(Default)]
struct SectionBuffer {
    seen: bool,
    paragraphs: Vec<String>,
    items: Vec<String>,
    pending_break: bool,
}

impl SectionBuffer {
    fn push_line(&mut self, section: Section, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            self.pending_break = true;
            return;
        }

        if section.is_list() {
            match strip_bullet(line) {
                Some(item) => self.items.push(item.to_string()),
                None => match self.items.last_mut() {
                    Some(last) => {
                        last.push(' ');
                        last.push_str(line);
                    }
                    None => self.items.push(line.to_string()),
                },
            }
        } else {
            match self.paragraphs.last_mut() {
                Some(last) if !self.pending_break => {
                    last.push(' ');
                    last.push_str(line);
                }
                _ => self.paragraphs.push(line.to_string()),
            }
        }
        self.pending_break = false;
    }

    fn prose(&self) -> String {
        self.paragraphs.join("\n\n")
    }
}

/// Parse a raw provider response. Missing or repeated headings are grammar
/// violations, reported as validation issues rather than errors.
pub fn parse(text: &str) -> Result<InsightSections, Vec<ValidationIssue>> {
    let mut buffers: [SectionBuffer; 5] = Default::default();
    let mut current: Option<Section> = None;
    let mut issues = Vec::new();

    for line in text.lines() {
        if let Some((section, rest)) = match_heading(line) {
            let buffer = &mut buffers[index(section)];
            if buffer.seen {
                issues.push(ValidationIssue::DuplicateSection(section.heading()));
            }
            buffer.seen = true;
            current = Some(section);
            if !rest.is_empty() {
                buffer.push_line(section, rest);
            }
            continue;
        }
        if let Some(section) = current {
            buffers[index(section)].push_line(section, line);
        }
    }

    for section in Section::ALL {
        if !buffers[index(section)].seen {
            issues.push(ValidationIssue::MissingSection(section.heading()));
        }
    }
    if !issues.is_empty() {
        return Err(issues);
    }

    let [summary, risks, opportunities, risk_management, history] = buffers;
    Ok(InsightSections {
        summary: summary.prose(),
        risks: risks.items,
        opportunities: opportunities.items,
        risk_management: risk_management.items,
        historical_context: history.prose(),
    })
}

/// Render sections back into grammar-v1 markdown.
pub fn render(sections: &InsightSections) -> String {
    let mut out = String::new();
    let list = |out: &mut String, heading: &str, items: &[String]| {
        out.push_str("## ");
        out.push_str(heading);
        out.push('\n');
        for item in items {
            out.push_str("- ");
            out.push_str(item);
            out.push('\n');
        }
        out.push('\n');
    };

    out.push_str("## Impact Summary\n");
    out.push_str(&sections.summary);
    out.push_str("\n\n");
    list(&mut out, Section::KeyRisks.heading(), &sections.risks);
    list(&mut out, Section::Opportunities.heading(), &sections.opportunities);
    list(&mut out, Section::RiskManagement.heading(), &sections.risk_management);
    out.push_str("## Historical Context\n");
    out.push_str(&sections.historical_context);
    out.push('\n');
    out
}

fn index(section: Section) -> usize {
    match section {
        Section::ImpactSummary => 0,
        Section::KeyRisks => 1,
        Section::Opportunities => 2,
        Section::RiskManagement => 3,
        Section::HistoricalContext => 4,
    }
}

fn strip_emphasis(s: &str) -> (&str, bool) {
    match s.strip_prefix("**").or_else(|| s.strip_prefix("__")) {
        Some(rest) => (rest, true),
        None => (s, false),
    }
}

/// Recognise a heading line. Returns the section and any text that follows a
/// `Heading:` on the same line.
fn match_heading(line: &str) -> Option<(Section, &str)> {
    let trimmed = line.trim();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes > 3 {
        return None;
    }
    let (body, bold) = strip_emphasis(trimmed[hashes..].trim_start());

    for section in Section::ALL {
        let name = section.heading();
        let Some(candidate) = body.get(..name.len()) else {
            continue;
        };
        if !candidate.eq_ignore_ascii_case(name) {
            continue;
        }

        let mut rest = body[name.len()..].trim_start();
        let mut colon = false;
        if let Some(r) = rest.strip_prefix(':') {
            colon = true;
            rest = r.trim_start();
        }
        if bold {
            if let Some(r) = rest.strip_prefix("**").or_else(|| rest.strip_prefix("__")) {
                rest = r.trim_start();
            }
            if let Some(r) = rest.strip_prefix(':') {
                colon = true;
                rest = r.trim_start();
            }
        }

        if rest.is_empty() {
            return Some((section, rest));
        }
        if colon {
            return Some((section, rest));
        }
        return None;
    }
    None
}

fn strip_bullet(line: &str) -> Option<&str> {
    for marker in ["- ", "* ", "• ", "•"] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest.trim());
        }
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(r) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(r.trim());
        }
    }
    None
}
