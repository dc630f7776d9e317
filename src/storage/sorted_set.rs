//! Sorted set: members ordered by `(score, member)`.
//!
//! Two indexes are kept in step: a member -> score map for point lookups and
//! an ordered set of `(score, member)` pairs for rank and range queries.
//! Score ties are broken by the member's byte-wise lexical order.

use bytes::Bytes;
use ordered_float::OrderedFloat;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

/// One end of a score range, as written in ZRANGEBYSCORE / ZCOUNT.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
    Inclusive(f64),
    Exclusive(f64),
}

impl ScoreBound {
    fn admits_above(&self, score: f64) -> bool {
        match *self {
            ScoreBound::Inclusive(min) => score >= min,
            ScoreBound::Exclusive(min) => score > min,
        }
    }

    fn admits_below(&self, score: f64) -> bool {
        match *self {
            ScoreBound::Inclusive(max) => score <= max,
            ScoreBound::Exclusive(max) => score < max,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortedSet {
    scores: HashMap<Bytes, OrderedFloat<f64>>,
    ordered: BTreeSet<(OrderedFloat<f64>, Bytes)>,
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).map(|s| s.0)
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.scores.contains_key(member)
    }

    /// Inserts or re-scores a member. Returns true if the member is new.
    pub fn insert(&mut self, member: Bytes, score: f64) -> bool {
        let score = OrderedFloat(score);
        match self.scores.insert(member.clone(), score) {
            Some(old) => {
                if old != score {
                    self.ordered.remove(&(old, member.clone()));
                    self.ordered.insert((score, member));
                }
                false
            }
            None => {
                self.ordered.insert((score, member));
                true
            }
        }
    }

    /// Removes a member, returning its score.
    pub fn remove(&mut self, member: &[u8]) -> Option<f64> {
        let (member, score) = self.scores.remove_entry(member)?;
        self.ordered.remove(&(score, member));
        Some(score.0)
    }

    /// 0-based rank in ascending order.
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let score = *self.scores.get(member)?;
        Some(
            self.ordered
                .range(..(score, Bytes::copy_from_slice(member)))
                .count(),
        )
    }

    /// Ascending iteration over `(member, score)`.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&Bytes, f64)> {
        self.ordered.iter().map(|(s, m)| (m, s.0))
    }

    /// Members with scores inside `[min, max]` honoring exclusivity,
    /// ascending.
    pub fn range_by_score(
        &self,
        min: ScoreBound,
        max: ScoreBound,
    ) -> impl Iterator<Item = (&Bytes, f64)> {
        let lower = match min {
            ScoreBound::Inclusive(v) | ScoreBound::Exclusive(v) => {
                Bound::Included((OrderedFloat(v), Bytes::new()))
            }
        };
        self.ordered
            .range((lower, Bound::Unbounded))
            .map(|(s, m)| (m, s.0))
            .skip_while(move |(_, s)| !min.admits_above(*s))
            .take_while(move |(_, s)| max.admits_below(*s))
    }

    pub fn pop_min(&mut self) -> Option<(Bytes, f64)> {
        let (score, member) = self.ordered.pop_first()?;
        self.scores.remove(&member);
        Some((member, score.0))
    }

    pub fn pop_max(&mut self) -> Option<(Bytes, f64)> {
        let (score, member) = self.ordered.pop_last()?;
        self.scores.remove(&member);
        Some((member, score.0))
    }

    /// Members in ascending order.
    pub fn members(&self) -> Vec<Bytes> {
        self.ordered.iter().map(|(_, m)| m.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn test_ties_broken_by_member() {
        let mut z = SortedSet::new();
        z.insert(b("c"), 1.0);
        z.insert(b("a"), 1.0);
        z.insert(b("b"), 0.5);
        assert_eq!(z.members(), vec![b("b"), b("a"), b("c")]);
        assert_eq!(z.rank(b"a"), Some(1));
        assert_eq!(z.rank(b"missing"), None);
    }

    #[test]
    fn test_rescore_moves_member() {
        let mut z = SortedSet::new();
        assert!(z.insert(b("a"), 1.0));
        assert!(z.insert(b("b"), 2.0));
        assert!(!z.insert(b("a"), 3.0));
        assert_eq!(z.members(), vec![b("b"), b("a")]);
        assert_eq!(z.len(), 2);
        assert_eq!(z.score(b"a"), Some(3.0));
    }

    #[test]
    fn test_range_by_score_bounds() {
        let mut z = SortedSet::new();
        for (m, s) in [("a", 1.0), ("b", 2.0), ("c", 3.0)] {
            z.insert(b(m), s);
        }
        let incl: Vec<_> = z
            .range_by_score(ScoreBound::Inclusive(1.0), ScoreBound::Inclusive(2.0))
            .map(|(m, _)| m.clone())
            .collect();
        assert_eq!(incl, vec![b("a"), b("b")]);

        let excl: Vec<_> = z
            .range_by_score(ScoreBound::Exclusive(1.0), ScoreBound::Exclusive(3.0))
            .map(|(m, _)| m.clone())
            .collect();
        assert_eq!(excl, vec![b("b")]);

        let all = z
            .range_by_score(
                ScoreBound::Inclusive(f64::NEG_INFINITY),
                ScoreBound::Inclusive(f64::INFINITY),
            )
            .count();
        assert_eq!(all, 3);
    }

    #[test]
    fn test_pop_both_ends() {
        let mut z = SortedSet::new();
        z.insert(b("a"), 1.0);
        z.insert(b("b"), 2.0);
        assert_eq!(z.pop_max(), Some((b("b"), 2.0)));
        assert_eq!(z.pop_min(), Some((b("a"), 1.0)));
        assert!(z.is_empty());
        assert_eq!(z.pop_min(), None);
    }
}
