//! Document family rules and the text classifier.
//!
//! A [`Classifier`] holds an ordered list of pattern rules. The first rule
//! whose pattern occurs in the OCR text decides the family and the canonical
//! identifier; text that matches nothing falls back to [`Family::Unclassified`]
//! with a caller-supplied identifier (usually the source file's base name).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Two letters, three digits, separator, six digits (e.g. `AB123-456789`).
pub const FAMILY_A_PATTERN: &str = r"[A-Za-z]{2}[0-9]{3}[-_—][0-9]{6}";

/// Two letters, two digits, separator, nine digits (e.g. `CD12-987654321`).
pub const FAMILY_B_PATTERN: &str = r"[A-Za-z]{2}[0-9]{2}[-_—][0-9]{9}";

/// Identifier used when neither the text nor the fallback yields anything usable.
pub const UNNAMED_IDENTIFIER: &str = "unnamed";

static FAMILY_A_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(FAMILY_A_PATTERN).expect("family A pattern is valid"));
static FAMILY_B_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(FAMILY_B_PATTERN).expect("family B pattern is valid"));

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("invalid pattern for {family}: {source}")]
    InvalidPattern {
        family: Family,
        #[source]
        source: regex::Error,
    },
    #[error("rules cannot target the unclassified family")]
    UnclassifiedTarget,
}

/// Document family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Family {
    FamilyA,
    FamilyB,
    Unclassified,
}

impl Family {
    pub const ALL: [Family; 3] = [Family::FamilyA, Family::FamilyB, Family::Unclassified];

    /// Export sub-folder used when the configuration does not rename it.
    pub fn default_folder(self) -> &'static str {
        match self {
            Family::FamilyA => "FamilyA",
            Family::FamilyB => "FamilyB",
            Family::Unclassified => "Other",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::FamilyA => write!(f, "family-a"),
            Family::FamilyB => write!(f, "family-b"),
            Family::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// Serializable rule definition, as stored in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    pub family: Family,
    pub pattern: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// The built-in rule order. Family A is narrower and must be tried first.
pub fn builtin_rules() -> Vec<RuleSpec> {
    vec![
        RuleSpec {
            family: Family::FamilyA,
            pattern: FAMILY_A_PATTERN.to_string(),
            enabled: true,
        },
        RuleSpec {
            family: Family::FamilyB,
            pattern: FAMILY_B_PATTERN.to_string(),
            enabled: true,
        },
    ]
}

#[derive(Debug, Clone)]
struct Rule {
    family: Family,
    regex: Regex,
}

/// Outcome of classifying one unit's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub family: Family,
    /// Never empty, never contains a path separator.
    pub identifier: String,
}

impl ClassificationResult {
    pub fn unclassified(fallback: &str) -> Self {
        Self {
            family: Family::Unclassified,
            identifier: sanitize_identifier(fallback),
        }
    }

    pub fn is_classified(&self) -> bool {
        self.family != Family::Unclassified
    }
}

/// Ordered pattern classifier.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::standard()
    }
}

impl Classifier {
    /// Family A before Family B.
    pub fn standard() -> Self {
        Self {
            rules: vec![
                Rule {
                    family: Family::FamilyA,
                    regex: FAMILY_A_REGEX.clone(),
                },
                Rule {
                    family: Family::FamilyB,
                    regex: FAMILY_B_REGEX.clone(),
                },
            ],
        }
    }

    /// Build a classifier from configured rules, keeping their order.
    /// Disabled rules are dropped.
    pub fn from_specs(specs: &[RuleSpec]) -> Result<Self, RuleError> {
        let mut rules = Vec::with_capacity(specs.len());
        for spec in specs.iter().filter(|s| s.enabled) {
            if spec.family == Family::Unclassified {
                return Err(RuleError::UnclassifiedTarget);
            }
            let regex = Regex::new(&spec.pattern).map_err(|source| RuleError::InvalidPattern {
                family: spec.family,
                source,
            })?;
            rules.push(Rule {
                family: spec.family,
                regex,
            });
        }
        if rules.is_empty() {
            log::warn!("[Rules] no enabled rules, every unit will be unclassified");
        }
        Ok(Self { rules })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Classify `text`; `fallback` becomes the identifier when nothing matches.
    pub fn classify(&self, text: &str, fallback: &str) -> ClassificationResult {
        if text.trim().is_empty() {
            return ClassificationResult::unclassified(fallback);
        }

        for rule in &self.rules {
            if let Some(m) = rule.regex.find(text) {
                let identifier = sanitize_identifier(m.as_str());
                log::debug!("[Rules] {} matched: {}", rule.family, identifier);
                return ClassificationResult {
                    family: rule.family,
                    identifier,
                };
            }
        }

        ClassificationResult::unclassified(fallback)
    }
}

/// Make `raw` usable as a single file name component.
///
/// Path separators, characters reserved on common filesystems and control
/// characters become `_`. Leading/trailing whitespace and dots are dropped.
pub fn sanitize_identifier(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c.is_whitespace() || c == '.');
    if trimmed.is_empty() {
        UNNAMED_IDENTIFIER.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_family_a_with_noise() {
        let c = Classifier::standard();
        let r = c.classify("Report no. AB123-456789 report", "scan_01");
        assert_eq!(r.family, Family::FamilyA);
        assert_eq!(r.identifier, "AB123-456789");
    }

    #[test]
    fn test_family_b_separators() {
        let c = Classifier::standard();
        for sep in ["-", "_", "—"] {
            let text = format!("cert CD12{}987654321 issued", sep);
            let r = c.classify(&text, "x");
            assert_eq!(r.family, Family::FamilyB, "separator {:?}", sep);
            assert_eq!(r.identifier, format!("CD12{}987654321", sep));
        }
    }

    #[test]
    fn test_family_a_wins_over_b_regardless_of_position() {
        let c = Classifier::standard();
        let r = c.classify("CD12-987654321 then AB123-456789", "x");
        assert_eq!(r.family, Family::FamilyA);
        assert_eq!(r.identifier, "AB123-456789");
    }

    #[test]
    fn test_empty_text_falls_back() {
        let c = Classifier::standard();
        let r = c.classify("   \n\t ", "invoice_scan");
        assert_eq!(r.family, Family::Unclassified);
        assert_eq!(r.identifier, "invoice_scan");
    }

    #[test]
    fn test_no_match_falls_back() {
        let c = Classifier::standard();
        let r = c.classify("no match here", "doc2");
        assert_eq!(r, ClassificationResult::unclassified("doc2"));
        assert!(!r.is_classified());
    }

    #[test]
    fn test_wrong_digit_counts_do_not_match() {
        let c = Classifier::standard();
        assert!(!c.classify("AB12-456789", "x").is_classified());
        assert!(!c.classify("AB123-45678", "x").is_classified());
        assert!(!c.classify("A1123-456789", "x").is_classified());
    }

    #[test]
    fn test_empty_fallback_is_never_empty() {
        let c = Classifier::standard();
        assert_eq!(c.classify("", "").identifier, UNNAMED_IDENTIFIER);
        assert_eq!(c.classify("", " .. ").identifier, UNNAMED_IDENTIFIER);
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_identifier("  name.  "), "name");
        assert_eq!(sanitize_identifier("AB123—456789"), "AB123—456789");
    }

    #[test]
    fn test_from_specs_keeps_order_and_skips_disabled() {
        let specs = vec![
            RuleSpec {
                family: Family::FamilyB,
                pattern: "ZZ[0-9]+".to_string(),
                enabled: false,
            },
            RuleSpec {
                family: Family::FamilyB,
                pattern: FAMILY_B_PATTERN.to_string(),
                enabled: true,
            },
            RuleSpec {
                family: Family::FamilyA,
                pattern: FAMILY_A_PATTERN.to_string(),
                enabled: true,
            },
        ];
        let c = Classifier::from_specs(&specs).unwrap();
        assert_eq!(c.rule_count(), 2);
        let r = c.classify("CD12-987654321 AB123-456789 ZZ1", "x");
        assert_eq!(r.family, Family::FamilyB);
    }

    #[test]
    fn test_from_specs_rejects_bad_rules() {
        let bad = vec![RuleSpec {
            family: Family::FamilyA,
            pattern: "([".to_string(),
            enabled: true,
        }];
        assert!(matches!(
            Classifier::from_specs(&bad),
            Err(RuleError::InvalidPattern { .. })
        ));

        let unclassified = vec![RuleSpec {
            family: Family::Unclassified,
            pattern: "x".to_string(),
            enabled: true,
        }];
        assert!(matches!(
            Classifier::from_specs(&unclassified),
            Err(RuleError::UnclassifiedTarget)
        ));
    }

    #[test]
    fn test_rule_spec_json_defaults_enabled() {
        let spec: RuleSpec =
            serde_json::from_str(r#"{"family":"familyB","pattern":"X[0-9]"}"#).unwrap();
        assert_eq!(spec.family, Family::FamilyB);
        assert!(spec.enabled);
    }

    fn family_a_id() -> impl Strategy<Value = String> {
        "[A-Za-z]{2}[0-9]{3}[-_—][0-9]{6}"
    }

    fn family_b_id() -> impl Strategy<Value = String> {
        "[A-Za-z]{2}[0-9]{2}[-_—][0-9]{9}"
    }

    fn noise() -> impl Strategy<Value = String> {
        "[a-z .,:;]{0,30}"
    }

    proptest! {
        #[test]
        fn prop_family_a_found_in_noise(pre in noise(), id in family_a_id(), post in noise()) {
            let text = format!("{} {} {}", pre, id, post);
            let r = Classifier::standard().classify(&text, "fallback");
            prop_assert_eq!(r.family, Family::FamilyA);
            prop_assert_eq!(r.identifier, id);
        }

        #[test]
        fn prop_family_a_beats_family_b(
            a in family_a_id(),
            b in family_b_id(),
            mid in noise(),
            b_first in any::<bool>(),
        ) {
            let text = if b_first {
                format!("{} {} {}", b, mid, a)
            } else {
                format!("{} {} {}", a, mid, b)
            };
            let r = Classifier::standard().classify(&text, "fallback");
            prop_assert_eq!(r.family, Family::FamilyA);
            prop_assert_eq!(r.identifier, a);
        }

        #[test]
        fn prop_blank_text_uses_fallback(ws in "[ \t\r\n]{0,10}", name in "[a-z0-9_]{1,12}") {
            let r = Classifier::standard().classify(&ws, &name);
            prop_assert_eq!(r.family, Family::Unclassified);
            prop_assert_eq!(r.identifier, name);
        }
    }
}
