//! Version predicate parsing and matching.
//!
//! A predicate is a human-authored constraint expression such as
//! ">=1.2.0 <2.0.0". Terms are separated by whitespace or commas and combine
//! with AND semantics; the empty string or "*" matches every version.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::interval::{self, VersionInterval};
use crate::types::version::{Version, VersionError};

/// Comparison operator for a single predicate term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    Equal,     // =1.0.0
    Greater,   // >1.0.0
    GreaterEq, // >=1.0.0
    Less,      // <1.0.0
    LessEq,    // <=1.0.0
    Tilde,     // ~1.2.0 allows >=1.2.0 <1.3.0
    Caret,     // ^1.2.0 allows >=1.2.0 <2.0.0
}

/// One `<op><version>` term of a predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateTerm {
    pub operator: ComparisonOperator,
    pub version: Version,
}

/// An AND-combined collection of predicate terms.
///
/// No terms means "anything": every version matches and the covered interval
/// is unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionPredicate {
    terms: Vec<PredicateTerm>,
}

impl ComparisonOperator {
    /// The textual prefix of this operator. Ordered so that two-character
    /// prefixes are tried before their one-character prefixes.
    const PREFIXES: [(&'static str, ComparisonOperator); 7] = [
        (">=", ComparisonOperator::GreaterEq),
        ("<=", ComparisonOperator::LessEq),
        (">", ComparisonOperator::Greater),
        ("<", ComparisonOperator::Less),
        ("=", ComparisonOperator::Equal),
        ("~", ComparisonOperator::Tilde),
        ("^", ComparisonOperator::Caret),
    ];

    /// Whether this operator constrains a range rather than a single version.
    ///
    /// Ranged operators require a semantic reference version; only `=` can
    /// meaningfully reference a free-form version.
    pub fn is_ranged(&self) -> bool {
        !matches!(self, ComparisonOperator::Equal)
    }

    /// The operator's textual symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::Equal => "=",
            ComparisonOperator::Greater => ">",
            ComparisonOperator::GreaterEq => ">=",
            ComparisonOperator::Less => "<",
            ComparisonOperator::LessEq => "<=",
            ComparisonOperator::Tilde => "~",
            ComparisonOperator::Caret => "^",
        }
    }
}

impl PredicateTerm {
    /// Whether a version satisfies this term.
    pub fn matches(&self, version: &Version) -> bool {
        match self.operator {
            ComparisonOperator::Equal => version == &self.version,
            _ => self.to_interval().contains(version),
        }
    }

    /// The interval of versions this term admits.
    pub fn to_interval(&self) -> VersionInterval {
        let reference = self.version.clone();

        match self.operator {
            ComparisonOperator::Equal => VersionInterval::exact(reference),
            ComparisonOperator::Greater => VersionInterval::at_least(reference, false),
            ComparisonOperator::GreaterEq => VersionInterval::at_least(reference, true),
            ComparisonOperator::Less => VersionInterval::at_most(reference, false),
            ComparisonOperator::LessEq => VersionInterval::at_most(reference, true),
            ComparisonOperator::Tilde | ComparisonOperator::Caret => {
                // Parsing guarantees a semantic reference for ranged operators.
                let upper = match (&self.operator, reference.as_semantic()) {
                    (ComparisonOperator::Tilde, Ok(semantic)) => semantic.next_minor(),
                    (_, Ok(semantic)) => semantic.next_major(),
                    (_, Err(_)) => return VersionInterval::exact(reference),
                };

                VersionInterval::new(
                    Some(reference),
                    true,
                    Some(Version::Semantic(upper)),
                    false,
                )
                .unwrap_or_else(VersionInterval::unbounded)
            }
        }
    }
}

impl fmt::Display for PredicateTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator.symbol(), self.version)
    }
}

impl VersionPredicate {
    /// The predicate matching every version.
    pub fn any() -> Self {
        Self::default()
    }

    /// Parse a predicate expression.
    ///
    /// Failures carry the offending token: an unknown operator prefix or an
    /// unparsable/non-semantic version after a ranged operator.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let mut terms = Vec::new();

        for token in input.split([',', ' ']).filter(|t| !t.is_empty()) {
            if token == "*" {
                // Explicit wildcard term matches anything; contributes nothing.
                continue;
            }

            let (operator, version_text) = split_operator(token);

            if version_text.is_empty() {
                return Err(VersionError::InvalidFormat {
                    input: token.to_string(),
                });
            }

            if version_text.starts_with(|c: char| "<>=~^".contains(c)) {
                return Err(VersionError::InvalidFormat {
                    input: token.to_string(),
                });
            }

            let version = Version::parse(version_text);

            if operator.is_ranged() && !version.is_semantic() {
                return Err(VersionError::NotSemantic {
                    version: version_text.to_string(),
                });
            }

            terms.push(PredicateTerm { operator, version });
        }

        Ok(Self { terms })
    }

    /// The terms that all have to hold, empty if anything matches.
    pub fn terms(&self) -> &[PredicateTerm] {
        &self.terms
    }

    /// Whether a version satisfies every term.
    pub fn matches(&self, version: &Version) -> bool {
        self.terms.iter().all(|term| term.matches(version))
    }

    /// Reduce the predicate to its covered interval list.
    ///
    /// Contradictory terms reduce to an empty list; no terms reduce to the
    /// single unbounded interval.
    pub fn to_intervals(&self) -> Vec<VersionInterval> {
        let mut result = vec![VersionInterval::unbounded()];

        for term in &self.terms {
            result = interval::and(&result, &[term.to_interval()]);
            if result.is_empty() {
                break;
            }
        }

        result
    }
}

impl FromStr for VersionPredicate {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "*");
        }

        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", term)?;
        }

        Ok(())
    }
}

impl Serialize for VersionPredicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionPredicate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        VersionPredicate::parse(&text).map_err(D::Error::custom)
    }
}

/// Split the operator prefix off a term token; no prefix means exact match.
fn split_operator(token: &str) -> (ComparisonOperator, &str) {
    for (prefix, operator) in ComparisonOperator::PREFIXES {
        if let Some(rest) = token.strip_prefix(prefix) {
            return (operator, rest);
        }
    }

    (ComparisonOperator::Equal, token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> Version {
        Version::parse(text)
    }

    #[test]
    fn test_parse_single_term() {
        let predicate = VersionPredicate::parse(">=1.2.0").unwrap();
        assert_eq!(predicate.terms().len(), 1);
        assert_eq!(predicate.terms()[0].operator, ComparisonOperator::GreaterEq);
        assert!(predicate.matches(&v("1.2.0")));
        assert!(predicate.matches(&v("2.0.0")));
        assert!(!predicate.matches(&v("1.1.9")));
    }

    #[test]
    fn test_parse_multi_term_and_semantics() {
        let predicate = VersionPredicate::parse(">=1.2.0 <2.0.0").unwrap();
        assert!(predicate.matches(&v("1.5.0")));
        assert!(!predicate.matches(&v("2.0.0")));
        assert!(!predicate.matches(&v("1.0.0")));

        // Comma separation parses identically
        let comma = VersionPredicate::parse(">=1.2.0,<2.0.0").unwrap();
        assert_eq!(predicate, comma);
    }

    #[test]
    fn test_anything_predicate() {
        for input in ["", "*", "  "] {
            let predicate = VersionPredicate::parse(input).unwrap();
            assert!(predicate.terms().is_empty());
            assert!(predicate.matches(&v("0.0.1")));
            assert!(predicate.matches(&v("weird-version")));
            assert_eq!(predicate.to_intervals(), vec![VersionInterval::unbounded()]);
        }
    }

    #[test]
    fn test_bare_version_is_exact() {
        let predicate = VersionPredicate::parse("1.2.3").unwrap();
        assert!(predicate.matches(&v("1.2.3")));
        assert!(!predicate.matches(&v("1.2.4")));
    }

    #[test]
    fn test_tilde_and_caret() {
        let tilde = VersionPredicate::parse("~1.2.3").unwrap();
        assert!(tilde.matches(&v("1.2.9")));
        assert!(!tilde.matches(&v("1.3.0")));

        let caret = VersionPredicate::parse("^1.2.3").unwrap();
        assert!(caret.matches(&v("1.9.0")));
        assert!(!caret.matches(&v("2.0.0")));
        assert!(!caret.matches(&v("1.2.2")));
    }

    #[test]
    fn test_unknown_operator_is_an_error() {
        let err = VersionPredicate::parse(">>1.0.0").unwrap_err();
        assert!(matches!(err, VersionError::InvalidFormat { input } if input == ">>1.0.0"));
    }

    #[test]
    fn test_ranged_operator_requires_semantic_version() {
        let err = VersionPredicate::parse(">=some-build").unwrap_err();
        assert!(matches!(err, VersionError::NotSemantic { .. }));

        // Exact match against a free-form version is fine
        let exact = VersionPredicate::parse("=some-build").unwrap();
        assert!(exact.matches(&v("some-build")));
        assert!(!exact.matches(&v("1.0.0")));
    }

    #[test]
    fn test_to_intervals_reduction() {
        let predicate = VersionPredicate::parse(">=1.2.0 <2.0.0").unwrap();
        let intervals = predicate.to_intervals();
        assert_eq!(intervals.len(), 1);
        assert!(intervals[0].contains(&v("1.5.0")));
        assert!(!intervals[0].contains(&v("2.0.0")));
    }

    #[test]
    fn test_contradictory_terms_reduce_to_empty() {
        let predicate = VersionPredicate::parse(">2.0.0 <1.0.0").unwrap();
        assert!(predicate.to_intervals().is_empty());
        assert!(!predicate.matches(&v("1.5.0")));
    }

    #[test]
    fn test_exact_term_yields_degenerate_interval() {
        let predicate = VersionPredicate::parse("=1.4.0").unwrap();
        let intervals = predicate.to_intervals();
        assert_eq!(intervals, vec![VersionInterval::exact(v("1.4.0"))]);
    }

    #[test]
    fn test_display_round_trip() {
        for input in [">=1.2.0 <2.0.0", "~1.2.3", "*", "=1.0.0-rc.1"] {
            let predicate = VersionPredicate::parse(input).unwrap();
            let reparsed = VersionPredicate::parse(&predicate.to_string()).unwrap();
            assert_eq!(predicate, reparsed);
        }
    }
}
