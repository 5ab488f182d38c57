//! Rule checker: heuristic detection of machine-written résumé text.
//!
//! Pure: the same text always yields the same result, issues ordered by rule
//! and then by position in the text.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    EmDash,
    WeakVerb,
    RoundPercentage,
    TemplatePhrase,
    TypographicSymbol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleIssue {
    pub rule: RuleKind,
    /// The offending fragment as it appears in the text.
    pub excerpt: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCheckResult {
    pub passed: bool,
    pub issues: Vec<RuleIssue>,
    pub suggestions: Vec<String>,
}

const EM_DASHES: &[char] = &['—', '―'];

/// Boilerplate that reads as generated or padded.
const TEMPLATE_PHRASES: &[&str] = &[
    "results-driven",
    "results-oriented",
    "proven track record",
    "team player",
    "detail-oriented",
    "self-starter",
    "go-getter",
    "think outside the box",
    "hard-working",
    "passionate about",
    "dynamic professional",
    "fast-paced environment",
    "synergy",
    "cutting-edge",
    "best-in-class",
    "leverage my skills",
    "excellent communication skills",
    "responsible for",
    "duties included",
    "seamlessly",
];

static TEMPLATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    TEMPLATE_PHRASES
        .iter()
        .map(|p| Regex::new(&format!("(?i){}", regex::escape(p))).expect("static regex"))
        .collect()
});

const DISALLOWED_SYMBOLS: &[char] = &[
    '…', '→', '⇒', '★', '☆', '✓', '✔', '✅', '►', '▸', '❖', '➤', '✨', '🚀',
];

/// Non-committal phrasing that hides what the candidate actually did.
static WEAK_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(helped( to)?|assisted( with| in)?|participated in|was involved in|involved in|worked on|contributed to|tried to|attempted to)\b",
    )
    .expect("static regex")
});

/// A bullet that opens with a progressive form ("Developing …", "Managing …").
static PROGRESSIVE_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:[-*•]\s*)?([A-Z][a-z]{2,}ing)\b").expect("static regex")
});

/// Whole percentages only: the number may not start inside a longer figure
/// such as `2050%` or the fraction of `99.90%`.
static PERCENTAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\d.])(\d{1,3})(?:\.0+)?\s?%").expect("static regex")
});

/// Runs every rule over `text`.
pub fn check_all(text: &str) -> RuleCheckResult {
    let mut issues = Vec::new();
    let mut suggestions = Vec::new();

    let dashes: Vec<char> = text.chars().filter(|c| EM_DASHES.contains(c)).collect();
    if !dashes.is_empty() {
        issues.push(RuleIssue {
            rule: RuleKind::EmDash,
            excerpt: dashes.iter().take(1).collect(),
            message: format!("Contains {} em-dash character(s)", dashes.len()),
        });
        suggestions.push("Replace em-dashes with a comma, colon, or a plain hyphen.".to_string());
    }

    let mut weak_found = false;
    for m in WEAK_VERB.find_iter(text) {
        weak_found = true;
        issues.push(RuleIssue {
            rule: RuleKind::WeakVerb,
            excerpt: m.as_str().to_string(),
            message: format!("Non-committal phrasing '{}'", m.as_str()),
        });
    }
    for caps in PROGRESSIVE_OPENER.captures_iter(text) {
        let word = &caps[1];
        if is_progressive_exception(word) {
            continue;
        }
        weak_found = true;
        issues.push(RuleIssue {
            rule: RuleKind::WeakVerb,
            excerpt: word.to_string(),
            message: format!("Bullet opens with progressive form '{word}'"),
        });
    }
    if weak_found {
        suggestions.push(
            "Lead with a past-tense action verb that states what you did, e.g. 'Built', 'Reduced'."
                .to_string(),
        );
    }

    let mut round_found = false;
    for caps in PERCENTAGE.captures_iter(text) {
        let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Ok(value) = number.as_str().parse::<u32>() else {
            continue;
        };
        if (20..=100).contains(&value) && value % 10 == 0 {
            round_found = true;
            let excerpt = &text[number.start()..whole.end()];
            issues.push(RuleIssue {
                rule: RuleKind::RoundPercentage,
                excerpt: excerpt.to_string(),
                message: format!("Suspiciously round percentage '{excerpt}'"),
            });
        }
    }
    if round_found {
        suggestions.push(
            "Use the measured figure (e.g. 37%) or drop the percentage if it is an estimate."
                .to_string(),
        );
    }

    let mut template_found = false;
    for (phrase, pattern) in TEMPLATE_PHRASES.iter().zip(TEMPLATE_PATTERNS.iter()) {
        if let Some(m) = pattern.find(text) {
            template_found = true;
            issues.push(RuleIssue {
                rule: RuleKind::TemplatePhrase,
                excerpt: m.as_str().to_string(),
                message: format!("Template phrase '{phrase}'"),
            });
        }
    }
    if template_found {
        suggestions.push("Replace boilerplate with a concrete fact about your work.".to_string());
    }

    let mut symbols: Vec<char> = text
        .chars()
        .filter(|c| DISALLOWED_SYMBOLS.contains(c))
        .collect();
    symbols.dedup();
    if !symbols.is_empty() {
        let excerpt: String = symbols.iter().collect();
        issues.push(RuleIssue {
            rule: RuleKind::TypographicSymbol,
            message: format!("Decorative symbols '{excerpt}' do not survive ATS parsing"),
            excerpt,
        });
        suggestions.push("Use plain ASCII punctuation instead of decorative symbols.".to_string());
    }

    RuleCheckResult {
        passed: issues.is_empty(),
        issues,
        suggestions,
    }
}

/// Capitalised -ing words that are nouns in résumé headings, not verbs.
fn is_progressive_exception(word: &str) -> bool {
    matches!(
        word,
        "Engineering" | "Marketing" | "Training" | "Accounting" | "Banking" | "Consulting"
            | "Computing" | "Manufacturing" | "Publishing" | "Nursing" | "Testing" | "Hiring"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules_of(result: &RuleCheckResult) -> Vec<RuleKind> {
        result.issues.iter().map(|i| i.rule).collect()
    }

    #[test]
    fn test_clean_bullet_passes() {
        let r = check_all("Reduced p99 latency by 37% by moving session reads to Redis");
        assert!(r.passed, "{:?}", r.issues);
        assert!(r.suggestions.is_empty());
    }

    #[test]
    fn test_em_dash_detected() {
        let r = check_all("Built the billing service — end to end");
        assert!(!r.passed);
        assert_eq!(rules_of(&r), vec![RuleKind::EmDash]);
    }

    #[test]
    fn test_plain_hyphen_is_fine() {
        assert!(check_all("Built a real-time pricing engine - in Rust").passed);
    }

    #[test]
    fn test_weak_verbs_detected() {
        let r = check_all("Helped the team and worked on the API");
        assert_eq!(
            rules_of(&r),
            vec![RuleKind::WeakVerb, RuleKind::WeakVerb]
        );
    }

    #[test]
    fn test_progressive_opener_detected() {
        let r = check_all("- Developing internal tooling for CI");
        assert!(r.issues.iter().any(|i| i.excerpt == "Developing"));
    }

    #[test]
    fn test_heading_nouns_are_not_progressive() {
        assert!(check_all("Engineering\nMarketing").passed);
    }

    #[test]
    fn test_round_percentages_flagged() {
        let r = check_all("Cut costs by 30% and grew revenue 100%");
        let round: Vec<_> = r
            .issues
            .iter()
            .filter(|i| i.rule == RuleKind::RoundPercentage)
            .collect();
        assert_eq!(round.len(), 2);
    }

    #[test]
    fn test_non_round_and_small_percentages_pass() {
        assert!(check_all("Cut costs by 37%").passed);
        assert!(check_all("Cut costs by 10%").passed);
        assert!(check_all("Reached 99.9% uptime").passed);
    }

    #[test]
    fn test_decimal_fractions_are_not_round() {
        assert!(check_all("Kept 99.90% uptime").passed);
        assert!(check_all("Grew margin to 12.30%").passed);
        assert!(check_all("Fee of 3.50%").passed);
        assert!(check_all("Traffic rose 2050%").passed);
    }

    #[test]
    fn test_round_percentage_excerpt_excludes_prefix() {
        let r = check_all("Cut costs by 30% and 40.0 %");
        let excerpts: Vec<&str> = r.issues.iter().map(|i| i.excerpt.as_str()).collect();
        assert_eq!(excerpts, vec!["30%", "40.0 %"]);
        assert_eq!(check_all("50% fewer pages").issues[0].excerpt, "50%");
    }

    #[test]
    fn test_template_phrases_flagged() {
        let r = check_all("Results-driven engineer with a proven track record");
        assert_eq!(
            rules_of(&r),
            vec![RuleKind::TemplatePhrase, RuleKind::TemplatePhrase]
        );
        assert_eq!(r.issues[0].excerpt, "Results-driven");
        assert_eq!(r.issues[1].excerpt, "proven track record");
    }

    #[test]
    fn test_symbols_flagged() {
        let r = check_all("★ Shipped v2 → 3 regions");
        assert_eq!(rules_of(&r), vec![RuleKind::TypographicSymbol]);
        assert_eq!(r.issues[0].excerpt, "★→");
    }

    #[test]
    fn test_check_all_is_pure() {
        let text = "Results-driven — helped ship 50% faster ✓\n- Managing releases";
        assert_eq!(check_all(text), check_all(text));
    }
}
