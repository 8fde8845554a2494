//! Version types for mod metadata.
//!
//! Provides a Version model with two kinds: strict semantic versions
//! (major.minor.patch plus optional pre-release and build tags) and a free-form
//! string fallback for mods that declare non-semantic versions. Comparing the
//! two kinds against each other is an explicit error, never a silent coercion.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A mod version: either a strict semantic version or a free-form string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    Semantic(SemanticVersion),
    Raw(RawVersion),
}

/// Semantic version (major.minor.patch-prerelease+build)
#[derive(Debug, Clone)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Vec<Identifier>,
    pub build: Option<String>,
}

/// Free-form version string, ordered lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawVersion(pub String);

/// One dot-separated pre-release identifier.
///
/// Numeric identifiers compare numerically and order below alphanumeric ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identifier {
    Numeric(u64),
    AlphaNumeric(String),
}

/// Version parsing and comparison errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version format: {input}")]
    InvalidFormat { input: String },

    #[error("Invalid number in version: {component}")]
    InvalidNumber { component: String },

    #[error("Invalid pre-release identifier: {identifier:?}")]
    InvalidIdentifier { identifier: String },

    #[error("Invalid build metadata: {build:?}")]
    InvalidBuild { build: String },

    #[error("Cannot compare semantic version {left} with non-semantic version {right}")]
    Incomparable { left: String, right: String },

    #[error("Version {version} is not semantic; a semantic version is required here")]
    NotSemantic { version: String },
}

impl Version {
    /// Parse a version string.
    ///
    /// Attempts a strict semantic parse first; anything that fails the semantic
    /// grammar becomes a free-form `Raw` version that still supports equality
    /// and lexicographic ordering against other raw versions.
    pub fn parse(input: &str) -> Self {
        match SemanticVersion::from_str(input) {
            Ok(semantic) => Version::Semantic(semantic),
            Err(_) => Version::Raw(RawVersion(input.trim().to_string())),
        }
    }

    /// Whether this version follows the semantic grammar.
    pub fn is_semantic(&self) -> bool {
        matches!(self, Version::Semantic(_))
    }

    /// Borrow the semantic form, failing if this is a free-form version.
    pub fn as_semantic(&self) -> Result<&SemanticVersion, VersionError> {
        match self {
            Version::Semantic(v) => Ok(v),
            Version::Raw(_) => Err(VersionError::NotSemantic {
                version: self.to_string(),
            }),
        }
    }

    /// Compare two versions of the same kind.
    ///
    /// Semantic versions compare by precedence, raw versions lexicographically.
    /// Mixing kinds fails with `VersionError::Incomparable`.
    pub fn try_cmp(&self, other: &Version) -> Result<Ordering, VersionError> {
        match (self, other) {
            (Version::Semantic(a), Version::Semantic(b)) => Ok(a.cmp(b)),
            (Version::Raw(a), Version::Raw(b)) => Ok(a.cmp(b)),
            _ => Err(VersionError::Incomparable {
                left: self.to_string(),
                right: other.to_string(),
            }),
        }
    }

    /// Total order used only for deterministic sorting of mixed version lists.
    ///
    /// Semantic versions sort before raw versions; within a kind the natural
    /// order applies. Not a semantic statement about version precedence.
    pub fn sort_cmp(&self, other: &Version) -> Ordering {
        match (self, other) {
            (Version::Semantic(a), Version::Semantic(b)) => a.cmp(b),
            (Version::Raw(a), Version::Raw(b)) => a.cmp(b),
            (Version::Semantic(_), Version::Raw(_)) => Ordering::Less,
            (Version::Raw(_), Version::Semantic(_)) => Ordering::Greater,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Semantic(v) => write!(f, "{}", v),
            Version::Raw(v) => write!(f, "{}", v.0),
        }
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        if text.trim().is_empty() {
            return Err(D::Error::custom("version must not be empty"));
        }
        Ok(Version::parse(&text))
    }
}

impl SemanticVersion {
    /// Create a release version with no pre-release or build tags.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: Vec::new(),
            build: None,
        }
    }

    /// Check if this is a pre-release version
    pub fn is_prerelease(&self) -> bool {
        !self.prerelease.is_empty()
    }

    /// Precedence comparison per the semantic versioning rules.
    ///
    /// Build metadata is ignored. A release orders above any pre-release of the
    /// same core version; pre-release identifiers compare pairwise with numeric
    /// identifiers below alphanumeric ones, and a shorter identifier list
    /// orders below a longer one sharing its prefix.
    fn precedence_cmp(&self, other: &Self) -> Ordering {
        match (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch)) {
            Ordering::Equal => match (self.prerelease.is_empty(), other.prerelease.is_empty()) {
                (true, true) => Ordering::Equal,
                (false, true) => Ordering::Less,
                (true, false) => Ordering::Greater,
                (false, false) => self.prerelease.cmp(&other.prerelease),
            },
            other => other,
        }
    }

    /// Lower bound of the next minor release (used by `~` predicates).
    pub fn next_minor(&self) -> SemanticVersion {
        SemanticVersion::new(self.major, self.minor + 1, 0)
    }

    /// Lower bound of the next major release (used by `^` predicates).
    pub fn next_major(&self) -> SemanticVersion {
        SemanticVersion::new(self.major + 1, 0, 0)
    }
}

impl PartialEq for SemanticVersion {
    fn eq(&self, other: &Self) -> bool {
        // Build metadata is excluded from precedence and equality.
        self.major == other.major
            && self.minor == other.minor
            && self.patch == other.patch
            && self.prerelease == other.prerelease
    }
}

impl Eq for SemanticVersion {}

impl std::hash::Hash for SemanticVersion {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.prerelease.hash(state);
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence_cmp(other)
    }
}

impl FromStr for SemanticVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();

        // Split on '+' for build metadata
        let (version_part, build) = match input.split_once('+') {
            Some((v, b)) => (v, Some(b.to_string())),
            None => (input, None),
        };

        if let Some(ref build) = build {
            if build.is_empty() || !build.chars().all(is_tag_char) {
                return Err(VersionError::InvalidBuild {
                    build: build.clone(),
                });
            }
        }

        // Split on '-' for pre-release
        let (core_part, prerelease_part) = match version_part.split_once('-') {
            Some((c, p)) => (c, Some(p)),
            None => (version_part, None),
        };

        // Parse major.minor.patch
        let parts: Vec<&str> = core_part.split('.').collect();
        if parts.len() != 3 {
            return Err(VersionError::InvalidFormat {
                input: input.to_string(),
            });
        }

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(VersionError::InvalidNumber {
                    component: part.to_string(),
                });
            }

            *slot = part.parse().map_err(|_| VersionError::InvalidNumber {
                component: part.to_string(),
            })?;
        }

        let prerelease = match prerelease_part {
            Some(text) => parse_prerelease(text)?,
            None => Vec::new(),
        };

        Ok(SemanticVersion {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            prerelease,
            build,
        })
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;

        if !self.prerelease.is_empty() {
            write!(f, "-")?;
            for (i, identifier) in self.prerelease.iter().enumerate() {
                if i > 0 {
                    write!(f, ".")?;
                }
                write!(f, "{}", identifier)?;
            }
        }

        if let Some(ref build) = self.build {
            write!(f, "+{}", build)?;
        }

        Ok(())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(n) => write!(f, "{}", n),
            Identifier::AlphaNumeric(s) => write!(f, "{}", s),
        }
    }
}

fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '.'
}

/// Parse a dot-separated pre-release tag into identifiers.
fn parse_prerelease(text: &str) -> Result<Vec<Identifier>, VersionError> {
    let mut identifiers = Vec::new();

    for part in text.split('.') {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(VersionError::InvalidIdentifier {
                identifier: part.to_string(),
            });
        }

        // Purely numeric identifiers compare numerically; anything else is
        // alphanumeric. Values too large for u64 stay alphanumeric.
        let identifier = if part.chars().all(|c| c.is_ascii_digit()) {
            match part.parse() {
                Ok(n) => Identifier::Numeric(n),
                Err(_) => Identifier::AlphaNumeric(part.to_string()),
            }
        } else {
            Identifier::AlphaNumeric(part.to_string())
        };

        identifiers.push(identifier);
    }

    Ok(identifiers)
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn semantic_round_trip(
            major in 0u64..1000,
            minor in 0u64..1000,
            patch in 0u64..1000,
            prerelease in prop::option::of("[a-z][a-z0-9]{0,6}(\\.[0-9]{1,3})?"),
        ) {
            let mut text = format!("{}.{}.{}", major, minor, patch);
            if let Some(ref pre) = prerelease {
                text.push('-');
                text.push_str(pre);
            }

            let parsed = SemanticVersion::from_str(&text).unwrap();
            prop_assert_eq!(parsed.to_string(), text);
        }
    }

    proptest! {
        #[test]
        fn comparison_antisymmetry_and_transitivity(
            versions in prop::collection::vec((0u64..20, 0u64..20, 0u64..20), 3..=3)
        ) {
            let a = Version::Semantic(SemanticVersion::new(versions[0].0, versions[0].1, versions[0].2));
            let b = Version::Semantic(SemanticVersion::new(versions[1].0, versions[1].1, versions[1].2));
            let c = Version::Semantic(SemanticVersion::new(versions[2].0, versions[2].1, versions[2].2));

            // compare(a,b) == -compare(b,a)
            prop_assert_eq!(a.try_cmp(&b).unwrap(), b.try_cmp(&a).unwrap().reverse());

            // transitivity
            if a.try_cmp(&b).unwrap() == std::cmp::Ordering::Less
                && b.try_cmp(&c).unwrap() == std::cmp::Ordering::Less
            {
                prop_assert_eq!(a.try_cmp(&c).unwrap(), std::cmp::Ordering::Less);
            }
        }
    }
}
