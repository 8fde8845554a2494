//! Version interval set algebra.
//!
//! Represents sets of acceptable versions as interval lists and provides the
//! AND/OR/NOT operations dependency resolution needs. An interval that would be
//! empty is never constructed; emptiness is expressed by `Option::None` at
//! construction and by absence from a normalized list.

use std::cmp::Ordering;
use std::fmt;

use crate::types::version::Version;

/// A contiguous range of versions with optional inclusive/exclusive bounds.
///
/// A missing bound means unbounded on that side. `min == max` with both bounds
/// inclusive is the exact-version interval produced by `=` predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInterval {
    pub min: Option<Version>,
    pub min_inclusive: bool,
    pub max: Option<Version>,
    pub max_inclusive: bool,
}

impl VersionInterval {
    /// The interval covering every version.
    pub fn unbounded() -> Self {
        Self {
            min: None,
            min_inclusive: false,
            max: None,
            max_inclusive: false,
        }
    }

    /// The exact-match interval for a single version.
    pub fn exact(version: Version) -> Self {
        Self {
            min: Some(version.clone()),
            min_inclusive: true,
            max: Some(version),
            max_inclusive: true,
        }
    }

    /// Interval bounded only from below.
    pub fn at_least(version: Version, inclusive: bool) -> Self {
        Self {
            min: Some(version),
            min_inclusive: inclusive,
            max: None,
            max_inclusive: false,
        }
    }

    /// Interval bounded only from above.
    pub fn at_most(version: Version, inclusive: bool) -> Self {
        Self {
            min: None,
            min_inclusive: false,
            max: Some(version),
            max_inclusive: inclusive,
        }
    }

    /// Build an interval, returning `None` when the bounds describe an empty
    /// set (min above max, or min == max without both bounds inclusive, or
    /// bounds of different version kinds).
    pub fn new(
        min: Option<Version>,
        min_inclusive: bool,
        max: Option<Version>,
        max_inclusive: bool,
    ) -> Option<Self> {
        if let (Some(lo), Some(hi)) = (&min, &max) {
            match lo.try_cmp(hi) {
                Ok(Ordering::Greater) => return None,
                Ok(Ordering::Equal) if !(min_inclusive && max_inclusive) => return None,
                Err(_) => return None,
                _ => {}
            }
        }

        let min_inclusive = min.is_some() && min_inclusive;
        let max_inclusive = max.is_some() && max_inclusive;

        Some(Self {
            min,
            min_inclusive,
            max,
            max_inclusive,
        })
    }

    /// Whether this interval has no bounds at all.
    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Whether a version falls inside this interval.
    ///
    /// A version whose kind differs from a bound's kind never matches that
    /// bound, so free-form versions only match raw-bounded (typically exact)
    /// intervals and unbounded sides.
    pub fn contains(&self, version: &Version) -> bool {
        if let Some(min) = &self.min {
            match version.try_cmp(min) {
                Ok(Ordering::Less) => return false,
                Ok(Ordering::Equal) if !self.min_inclusive => return false,
                Err(_) => return false,
                _ => {}
            }
        }

        if let Some(max) = &self.max {
            match version.try_cmp(max) {
                Ok(Ordering::Greater) => return false,
                Ok(Ordering::Equal) if !self.max_inclusive => return false,
                Err(_) => return false,
                _ => {}
            }
        }

        true
    }

    /// Intersect two intervals bound-wise; `None` when the result is empty.
    pub fn intersect(&self, other: &VersionInterval) -> Option<VersionInterval> {
        // Larger of the two lower bounds
        let (min, min_inclusive) = match (&self.min, &other.min) {
            (None, None) => (None, false),
            (Some(v), None) => (Some(v.clone()), self.min_inclusive),
            (None, Some(v)) => (Some(v.clone()), other.min_inclusive),
            (Some(a), Some(b)) => match a.try_cmp(b) {
                Ok(Ordering::Greater) => (Some(a.clone()), self.min_inclusive),
                Ok(Ordering::Less) => (Some(b.clone()), other.min_inclusive),
                Ok(Ordering::Equal) => {
                    (Some(a.clone()), self.min_inclusive && other.min_inclusive)
                }
                Err(_) => return None,
            },
        };

        // Smaller of the two upper bounds
        let (max, max_inclusive) = match (&self.max, &other.max) {
            (None, None) => (None, false),
            (Some(v), None) => (Some(v.clone()), self.max_inclusive),
            (None, Some(v)) => (Some(v.clone()), other.max_inclusive),
            (Some(a), Some(b)) => match a.try_cmp(b) {
                Ok(Ordering::Less) => (Some(a.clone()), self.max_inclusive),
                Ok(Ordering::Greater) => (Some(b.clone()), other.max_inclusive),
                Ok(Ordering::Equal) => {
                    (Some(a.clone()), self.max_inclusive && other.max_inclusive)
                }
                Err(_) => return None,
            },
        };

        VersionInterval::new(min, min_inclusive, max, max_inclusive)
    }
}

impl fmt::Display for VersionInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.min {
            Some(min) if self.min_inclusive => write!(f, "[{}", min)?,
            Some(min) => write!(f, "({}", min)?,
            None => write!(f, "(-\u{221e}")?,
        }
        write!(f, ",")?;
        match &self.max {
            Some(max) if self.max_inclusive => write!(f, "{}]", max),
            Some(max) => write!(f, "{})", max),
            None => write!(f, "\u{221e})"),
        }
    }
}

/// Intersection of two interval lists (AND).
///
/// Every interval in `a` is intersected with every interval in `b`; empty
/// results are dropped and the survivors merged.
pub fn and(a: &[VersionInterval], b: &[VersionInterval]) -> Vec<VersionInterval> {
    let mut result = Vec::new();

    for left in a {
        for right in b {
            if let Some(intersection) = left.intersect(right) {
                result.push(intersection);
            }
        }
    }

    normalize(result)
}

/// Union of two interval lists (OR): concatenation plus overlap merging.
pub fn or(a: &[VersionInterval], b: &[VersionInterval]) -> Vec<VersionInterval> {
    let mut result = Vec::with_capacity(a.len() + b.len());
    result.extend_from_slice(a);
    result.extend_from_slice(b);
    normalize(result)
}

/// Complement of an interval list over the full ordered version space (NOT).
///
/// Yields the sorted gaps between the input intervals plus the unbounded tails.
pub fn not(list: &[VersionInterval]) -> Vec<VersionInterval> {
    let list = normalize(list.to_vec());
    if list.is_empty() {
        return vec![VersionInterval::unbounded()];
    }

    let mut result = Vec::new();
    let mut previous_max: Option<(Version, bool)> = None;

    for (index, interval) in list.iter().enumerate() {
        if let Some(min) = &interval.min {
            let gap = match (index, &previous_max) {
                // Tail below the first bounded interval
                (0, _) => VersionInterval::new(
                    None,
                    false,
                    Some(min.clone()),
                    !interval.min_inclusive,
                ),
                // Gap between two neighbouring intervals
                (_, Some((prev, prev_inclusive))) => VersionInterval::new(
                    Some(prev.clone()),
                    !prev_inclusive,
                    Some(min.clone()),
                    !interval.min_inclusive,
                ),
                // Previous interval was unbounded above; nothing in between
                (_, None) => None,
            };

            if let Some(gap) = gap {
                result.push(gap);
            }
        }

        previous_max = interval
            .max
            .as_ref()
            .map(|max| (max.clone(), interval.max_inclusive));

        if interval.max.is_none() {
            // Unbounded above: no tail remains
            return result;
        }
    }

    if let Some((max, inclusive)) = previous_max {
        result.push(VersionInterval::at_least(max, !inclusive));
    }

    result
}

/// Sort an interval list and merge overlapping or adjacent entries.
pub fn normalize(mut list: Vec<VersionInterval>) -> Vec<VersionInterval> {
    list.sort_by(compare_by_min);

    let mut result: Vec<VersionInterval> = Vec::with_capacity(list.len());

    for interval in list {
        match result.last_mut() {
            Some(last) if touches(last, &interval) => {
                extend_max(last, interval);
            }
            _ => result.push(interval),
        }
    }

    result
}

/// Ordering of intervals by lower bound for normalization.
///
/// Unbounded minimums sort first; incomparable version kinds fall back to a
/// deterministic kind-then-lexicographic order so output is stable.
fn compare_by_min(a: &VersionInterval, b: &VersionInterval) -> Ordering {
    match (&a.min, &b.min) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x
            .sort_cmp(y)
            // An inclusive bound starts lower than an exclusive one
            .then_with(|| b.min_inclusive.cmp(&a.min_inclusive)),
    }
}

/// Whether `next` overlaps or is adjacent to `prev` (with `prev.min <= next.min`).
fn touches(prev: &VersionInterval, next: &VersionInterval) -> bool {
    let prev_max = match &prev.max {
        Some(max) => max,
        None => return true,
    };

    let next_min = match &next.min {
        Some(min) => min,
        None => return true,
    };

    match prev_max.try_cmp(next_min) {
        Ok(Ordering::Greater) => true,
        Ok(Ordering::Equal) => prev.max_inclusive || next.min_inclusive,
        _ => false,
    }
}

/// Grow `prev` upward to also cover `next`.
fn extend_max(prev: &mut VersionInterval, next: VersionInterval) {
    let new_max = match (&prev.max, &next.max) {
        (Some(a), Some(b)) => match a.try_cmp(b) {
            Ok(Ordering::Less) => Some((b.clone(), next.max_inclusive)),
            Ok(Ordering::Equal) => Some((a.clone(), prev.max_inclusive || next.max_inclusive)),
            _ => return,
        },
        (Some(_), None) | (None, None) => {
            prev.max = None;
            prev.max_inclusive = false;
            return;
        }
        (None, Some(_)) => return,
    };

    if let Some((max, inclusive)) = new_max {
        prev.max = Some(max);
        prev.max_inclusive = inclusive;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> Version {
        Version::parse(text)
    }

    fn range(min: &str, min_inclusive: bool, max: &str, max_inclusive: bool) -> VersionInterval {
        VersionInterval::new(Some(v(min)), min_inclusive, Some(v(max)), max_inclusive).unwrap()
    }

    #[test]
    fn test_empty_construction_rejected() {
        assert!(VersionInterval::new(Some(v("2.0.0")), true, Some(v("1.0.0")), true).is_none());
        assert!(VersionInterval::new(Some(v("1.0.0")), true, Some(v("1.0.0")), false).is_none());
        assert!(VersionInterval::new(Some(v("1.0.0")), false, Some(v("1.0.0")), true).is_none());
    }

    #[test]
    fn test_exact_interval() {
        let exact = VersionInterval::exact(v("1.2.3"));
        assert!(exact.contains(&v("1.2.3")));
        assert!(!exact.contains(&v("1.2.4")));
    }

    #[test]
    fn test_contains_respects_exclusivity() {
        let interval = range("1.0.0", true, "2.0.0", false);
        assert!(interval.contains(&v("1.0.0")));
        assert!(interval.contains(&v("1.9.9")));
        assert!(!interval.contains(&v("2.0.0")));
        assert!(!interval.contains(&v("0.9.0")));
    }

    #[test]
    fn test_raw_version_never_matches_semantic_bounds() {
        let interval = range("1.0.0", true, "2.0.0", true);
        assert!(!interval.contains(&v("some-branch-build")));

        let exact = VersionInterval::exact(v("some-branch-build"));
        assert!(exact.contains(&v("some-branch-build")));
        assert!(!exact.contains(&v("1.5.0")));
    }

    #[test]
    fn test_intersect_overlapping() {
        let a = range("1.0.0", true, "2.0.0", false);
        let b = range("1.5.0", true, "3.0.0", true);
        let both = a.intersect(&b).unwrap();
        assert_eq!(both, range("1.5.0", true, "2.0.0", false));
    }

    #[test]
    fn test_intersect_disjoint_is_empty() {
        let a = range("1.0.0", true, "1.5.0", true);
        let b = range("2.0.0", true, "3.0.0", true);
        assert!(a.intersect(&b).is_none());
    }

    #[test]
    fn test_and_disjoint_lists_is_empty() {
        let a = vec![range("1.0.0", true, "1.5.0", true)];
        let b = vec![range("2.0.0", true, "3.0.0", true)];
        assert!(and(&a, &b).is_empty());
    }

    #[test]
    fn test_or_merges_overlapping_and_adjacent() {
        let a = vec![range("1.0.0", true, "2.0.0", false)];
        let b = vec![
            range("2.0.0", true, "3.0.0", true),
            range("1.5.0", true, "2.5.0", true),
        ];

        let merged = or(&a, &b);
        assert_eq!(merged, vec![range("1.0.0", true, "3.0.0", true)]);
    }

    #[test]
    fn test_or_keeps_disjoint_entries_sorted() {
        let a = vec![range("3.0.0", true, "4.0.0", true)];
        let b = vec![range("1.0.0", true, "2.0.0", true)];

        let merged = or(&a, &b);
        assert_eq!(
            merged,
            vec![
                range("1.0.0", true, "2.0.0", true),
                range("3.0.0", true, "4.0.0", true),
            ]
        );
    }

    #[test]
    fn test_not_of_single_interval() {
        let complement = not(&[range("1.0.0", true, "2.0.0", false)]);
        assert_eq!(
            complement,
            vec![
                VersionInterval::at_most(v("1.0.0"), false),
                VersionInterval::at_least(v("2.0.0"), true),
            ]
        );
    }

    #[test]
    fn test_not_of_empty_list_is_everything() {
        assert_eq!(not(&[]), vec![VersionInterval::unbounded()]);
        assert!(not(&[VersionInterval::unbounded()]).is_empty());
    }

    #[test]
    fn test_not_fills_gaps_between_intervals() {
        let complement = not(&[
            range("1.0.0", true, "2.0.0", true),
            range("3.0.0", false, "4.0.0", true),
        ]);
        assert_eq!(
            complement,
            vec![
                VersionInterval::at_most(v("1.0.0"), false),
                range("2.0.0", false, "3.0.0", true),
                VersionInterval::at_least(v("4.0.0"), false),
            ]
        );
    }

    #[test]
    fn test_exclusive_adjacency_complement_is_exact_point() {
        // [1,2) and (2,3] leave exactly {2.0.0} uncovered.
        let complement = not(&[
            range("1.0.0", true, "2.0.0", false),
            range("2.0.0", false, "3.0.0", true),
        ]);
        assert!(complement.contains(&VersionInterval::exact(v("2.0.0"))));
    }
}
