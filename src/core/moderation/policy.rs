// Policy evaluator - rule-based classification of content.
//
// NO I/O here - the evaluator is a pure function of the content string, so
// it is safe to call concurrently and trivially unit testable. Rules are
// independent of each other and combined order-independently: any hard
// violation blocks, otherwise the summed severity decides flag vs allow.

use super::models::{ModerationVerdict, Verdict};
use chrono::Utc;
use std::collections::BTreeSet;

/// Version tag of the active rule set. Part of every idempotency key, so
/// bump it when rules change and re-alerts for old records are wanted.
pub const POLICY_VERSION: &str = "policy-v1";

/// Default threshold at which aggregate severity turns into a FLAG.
pub const DEFAULT_SEVERITY_THRESHOLD: u32 = 5;

/// What a single rule found in a piece of content.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleHit {
    /// Severity contributed by this rule.
    pub severity: u32,
    /// Machine-readable tags explaining the hit.
    pub reason_codes: Vec<String>,
    /// Hard violations force a BLOCK verdict regardless of severity.
    pub hard_violation: bool,
}

/// One independent policy check.
///
/// Rules must be pure: no I/O, no mutable state, identical input always
/// yields an identical hit.
pub trait Rule: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Inspect the content; `None` means the rule has nothing to report.
    fn check(&self, content: &str) -> Option<RuleHit>;
}

// ============================================================================
// BUILT-IN RULES
// ============================================================================

/// Case-insensitive disallowed-term matching. Any match is a hard violation.
pub struct DisallowedTermRule {
    terms: Vec<String>,
}

impl DisallowedTermRule {
    pub fn new(terms: Vec<String>) -> Self {
        Self {
            terms: terms.into_iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    /// Reason-code tag for one matched term, e.g. "buy cheap followers"
    /// becomes "BUY_CHEAP_FOLLOWERS".
    fn term_tag(term: &str) -> String {
        term.to_uppercase().replace(|c: char| !c.is_alphanumeric(), "_")
    }
}

impl Default for DisallowedTermRule {
    fn default() -> Self {
        Self::new(vec![
            "buy cheap followers".to_string(),
            "free money guaranteed".to_string(),
            "click here to claim your prize".to_string(),
            "limited time crypto giveaway".to_string(),
        ])
    }
}

impl Rule for DisallowedTermRule {
    fn name(&self) -> &'static str {
        "disallowed_term"
    }

    fn check(&self, content: &str) -> Option<RuleHit> {
        let normalized = content.to_lowercase();
        let matched: Vec<&String> = self
            .terms
            .iter()
            .filter(|term| normalized.contains(term.as_str()))
            .collect();

        if matched.is_empty() {
            return None;
        }

        let mut reason_codes = vec!["DISALLOWED_TERM".to_string()];
        for term in &matched {
            reason_codes.push(format!("DISALLOWED_TERM:{}", Self::term_tag(term)));
        }

        Some(RuleHit {
            severity: 10 * matched.len() as u32,
            reason_codes,
            hard_violation: true,
        })
    }
}

/// Severity bump for content past a maximum length.
pub struct ExcessiveLengthRule {
    max_chars: usize,
}

impl ExcessiveLengthRule {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl Default for ExcessiveLengthRule {
    fn default() -> Self {
        Self::new(5000)
    }
}

impl Rule for ExcessiveLengthRule {
    fn name(&self) -> &'static str {
        "excessive_length"
    }

    fn check(&self, content: &str) -> Option<RuleHit> {
        if content.chars().count() <= self.max_chars {
            return None;
        }
        Some(RuleHit {
            severity: 2,
            reason_codes: vec!["EXCESSIVE_LENGTH".to_string()],
            hard_violation: false,
        })
    }
}

/// Severity scales with the number of links beyond an allowance.
pub struct LinkSpamRule {
    max_links: usize,
}

impl LinkSpamRule {
    pub fn new(max_links: usize) -> Self {
        Self { max_links }
    }
}

impl Default for LinkSpamRule {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Rule for LinkSpamRule {
    fn name(&self) -> &'static str {
        "link_spam"
    }

    fn check(&self, content: &str) -> Option<RuleHit> {
        let links = content.matches("http://").count() + content.matches("https://").count();
        if links <= self.max_links {
            return None;
        }
        Some(RuleHit {
            severity: 3 + (links - self.max_links) as u32,
            reason_codes: vec!["LINK_SPAM".to_string()],
            hard_violation: false,
        })
    }
}

/// Uppercase-ratio heuristic for shouting. Only fires on content long
/// enough for the ratio to mean anything.
pub struct ShoutingRule {
    min_letters: usize,
    max_upper_ratio: f32,
}

impl ShoutingRule {
    pub fn new(min_letters: usize, max_upper_ratio: f32) -> Self {
        Self {
            min_letters,
            max_upper_ratio,
        }
    }
}

impl Default for ShoutingRule {
    fn default() -> Self {
        Self::new(20, 0.7)
    }
}

impl Rule for ShoutingRule {
    fn name(&self) -> &'static str {
        "shouting"
    }

    fn check(&self, content: &str) -> Option<RuleHit> {
        let letters: Vec<char> = content.chars().filter(|c| c.is_alphabetic()).collect();
        if letters.len() < self.min_letters {
            return None;
        }
        let upper = letters.iter().filter(|c| c.is_uppercase()).count();
        let ratio = upper as f32 / letters.len() as f32;
        if ratio < self.max_upper_ratio {
            return None;
        }
        Some(RuleHit {
            severity: 2,
            reason_codes: vec!["EXCESSIVE_CAPS".to_string()],
            hard_violation: false,
        })
    }
}

// ============================================================================
// EVALUATOR
// ============================================================================

/// Runs the configured rules over content and combines their hits into one
/// verdict: BLOCK on any hard violation, FLAG when aggregate severity
/// reaches the threshold, ALLOW otherwise.
pub struct PolicyEvaluator {
    rules: Vec<Box<dyn Rule>>,
    severity_threshold: u32,
}

impl PolicyEvaluator {
    pub fn new(rules: Vec<Box<dyn Rule>>, severity_threshold: u32) -> Self {
        Self {
            rules,
            severity_threshold,
        }
    }

    /// Evaluator with the built-in rule set.
    pub fn with_default_rules(severity_threshold: u32) -> Self {
        Self::new(
            vec![
                Box::new(DisallowedTermRule::default()),
                Box::new(ExcessiveLengthRule::default()),
                Box::new(LinkSpamRule::default()),
                Box::new(ShoutingRule::default()),
            ],
            severity_threshold,
        )
    }

    /// Classify one record's content.
    ///
    /// Empty or whitespace-only content always allows; rules never see it.
    pub fn evaluate(&self, record_id: &str, content: &str) -> ModerationVerdict {
        if content.trim().is_empty() {
            return ModerationVerdict {
                record_id: record_id.to_string(),
                verdict: Verdict::Allow,
                severity: 0,
                reason_codes: Vec::new(),
                evaluated_at: Utc::now(),
            };
        }

        let mut severity: u32 = 0;
        let mut hard_violation = false;
        // BTreeSet keeps reason codes sorted and deduped, so the verdict is
        // independent of rule order.
        let mut reason_codes = BTreeSet::new();

        for rule in &self.rules {
            if let Some(hit) = rule.check(content) {
                tracing::debug!(
                    rule = rule.name(),
                    severity = hit.severity,
                    hard = hit.hard_violation,
                    "rule matched"
                );
                severity = severity.saturating_add(hit.severity);
                hard_violation |= hit.hard_violation;
                reason_codes.extend(hit.reason_codes);
            }
        }

        let verdict = if hard_violation {
            Verdict::Block
        } else if severity >= self.severity_threshold {
            Verdict::Flag
        } else {
            Verdict::Allow
        };

        ModerationVerdict {
            record_id: record_id.to_string(),
            verdict,
            severity,
            reason_codes: reason_codes.into_iter().collect(),
            evaluated_at: Utc::now(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator() -> PolicyEvaluator {
        PolicyEvaluator::with_default_rules(DEFAULT_SEVERITY_THRESHOLD)
    }

    #[test]
    fn empty_content_always_allows() {
        let policy = evaluator();
        for content in ["", "   ", "\n\t"] {
            let verdict = policy.evaluate("r1", content);
            assert_eq!(verdict.verdict, Verdict::Allow);
            assert_eq!(verdict.severity, 0);
            assert!(verdict.reason_codes.is_empty());
        }
    }

    #[test]
    fn clean_content_allows_with_zero_severity() {
        let verdict = evaluator().evaluate("r1", "Just a perfectly normal sentence.");
        assert_eq!(verdict.verdict, Verdict::Allow);
        assert_eq!(verdict.severity, 0);
        assert!(verdict.reason_codes.is_empty());
    }

    #[test]
    fn disallowed_term_blocks_with_term_reason_code() {
        let verdict = evaluator().evaluate("r1", "buy cheap followers now");
        assert_eq!(verdict.verdict, Verdict::Block);
        assert!(verdict
            .reason_codes
            .iter()
            .any(|c| c == "DISALLOWED_TERM"));
        assert!(verdict
            .reason_codes
            .iter()
            .any(|c| c == "DISALLOWED_TERM:BUY_CHEAP_FOLLOWERS"));
    }

    #[test]
    fn disallowed_term_match_is_case_insensitive() {
        let verdict = evaluator().evaluate("r1", "BUY CHEAP Followers today!!!");
        assert_eq!(verdict.verdict, Verdict::Block);
    }

    #[test]
    fn aggregate_severity_flags_without_hard_violation() {
        // 5 links (severity 3 + 2 over allowance = 5) reaches the default
        // threshold without any hard violation.
        let content = "look https://a https://b https://c https://d https://e";
        let verdict = evaluator().evaluate("r1", content);
        assert_eq!(verdict.verdict, Verdict::Flag);
        assert!(verdict.reason_codes.iter().any(|c| c == "LINK_SPAM"));
    }

    #[test]
    fn shouting_alone_stays_below_threshold() {
        let verdict = evaluator().evaluate("r1", "THIS IS ALL UPPERCASE SHOUTING CONTENT");
        assert_eq!(verdict.verdict, Verdict::Allow);
        assert_eq!(verdict.severity, 2);
        assert!(verdict.reason_codes.iter().any(|c| c == "EXCESSIVE_CAPS"));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let policy = evaluator();
        let content = "BUY CHEAP FOLLOWERS at https://a https://b https://c https://d";
        let first = policy.evaluate("r1", content);
        for _ in 0..20 {
            let again = policy.evaluate("r1", content);
            assert_eq!(again.verdict, first.verdict);
            assert_eq!(again.severity, first.severity);
            assert_eq!(again.reason_codes, first.reason_codes);
        }
    }

    #[test]
    fn rule_order_does_not_change_the_verdict() {
        let forward = PolicyEvaluator::new(
            vec![
                Box::new(DisallowedTermRule::default()),
                Box::new(LinkSpamRule::default()),
                Box::new(ShoutingRule::default()),
            ],
            DEFAULT_SEVERITY_THRESHOLD,
        );
        let reversed = PolicyEvaluator::new(
            vec![
                Box::new(ShoutingRule::default()),
                Box::new(LinkSpamRule::default()),
                Box::new(DisallowedTermRule::default()),
            ],
            DEFAULT_SEVERITY_THRESHOLD,
        );

        let content = "BUY CHEAP FOLLOWERS https://a https://b https://c https://d";
        let a = forward.evaluate("r1", content);
        let b = reversed.evaluate("r1", content);
        assert_eq!(a.verdict, b.verdict);
        assert_eq!(a.severity, b.severity);
        assert_eq!(a.reason_codes, b.reason_codes);
    }

    #[test]
    fn binary_like_input_does_not_panic() {
        let content = "\u{0}\u{1}\u{fffd}�����";
        let verdict = evaluator().evaluate("r1", content);
        assert_eq!(verdict.verdict, Verdict::Allow);
    }
}
