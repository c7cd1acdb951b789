use std::collections::HashMap;
use std::fmt;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Identifies a collection taking part in geometric matching.
///
/// Match annotations never live on the particle records themselves, they sit
/// in a side table keyed by pool and element index, so collections can be
/// reordered or spliced without chasing back-references.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolTag {
    Jet,
    BJet,
    LightJet,
    Subjet,
    BQuark,
    LightQuark,
    Lepton,
}

impl Display for PoolTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PoolTag::Jet => write!(f, "jet"),
            PoolTag::BJet => write!(f, "bjet"),
            PoolTag::LightJet => write!(f, "ljet"),
            PoolTag::Subjet => write!(f, "subjet"),
            PoolTag::BQuark => write!(f, "bquark"),
            PoolTag::LightQuark => write!(f, "lquark"),
            PoolTag::Lepton => write!(f, "lepton"),
        }
    }
}

/// One direction of an accepted link: the partner element and the cone
/// distance the link was accepted at.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MatchRecord {
    pub partner: usize,
    pub delta_r: f64,
}

/// Side table of match annotations for one event.
///
/// Keys are `(owning pool, element index, partner pool)`. Every accepted
/// link is stored in both directions, so each side can ask for its partner.
#[derive(Clone, Debug, Default)]
pub struct MatchTable {
    entries: HashMap<(PoolTag, usize, PoolTag), MatchRecord>,
}

impl MatchTable {
    pub fn new() -> Self {
        MatchTable { entries: HashMap::new() }
    }

    /// Record a mutual link between `a` and `b` at distance `delta_r`.
    pub fn insert_pair(&mut self, pool_a: PoolTag, idx_a: usize, pool_b: PoolTag, idx_b: usize, delta_r: f64) {
        assert!(pool_a != pool_b, "a pool cannot be matched against itself");
        self.entries.insert((pool_a, idx_a, pool_b), MatchRecord { partner: idx_b, delta_r });
        self.entries.insert((pool_b, idx_b, pool_a), MatchRecord { partner: idx_a, delta_r });
    }

    /// The annotation of element `idx` of `pool` against `partner_pool`.
    pub fn get(&self, pool: PoolTag, idx: usize, partner_pool: PoolTag) -> Option<&MatchRecord> {
        self.entries.get(&(pool, idx, partner_pool))
    }

    /// Remove a link in both directions. Returns the forward record if one
    /// was present.
    pub fn remove_pair(&mut self, pool: PoolTag, idx: usize, partner_pool: PoolTag) -> Option<MatchRecord> {
        let record = self.entries.remove(&(pool, idx, partner_pool))?;
        self.entries.remove(&(partner_pool, record.partner, pool));
        Some(record)
    }

    /// Number of elements of `pool` currently annotated against
    /// `partner_pool`.
    pub fn count(&self, pool: PoolTag, partner_pool: PoolTag) -> usize {
        self.entries
            .keys()
            .filter(|(p, _, q)| *p == pool && *q == partner_pool)
            .count()
    }

    /// Sorted element indices of `pool` annotated against `partner_pool`.
    pub fn matched_indices(&self, pool: PoolTag, partner_pool: PoolTag) -> Vec<usize> {
        let mut idx: Vec<usize> = self
            .entries
            .keys()
            .filter(|(p, _, q)| *p == pool && *q == partner_pool)
            .map(|(_, i, _)| *i)
            .collect();
        idx.sort_unstable();
        idx
    }

    /// Resolve elements of `pool` that hold annotations against both
    /// `first` and `second` at once: the smaller-distance link survives, the
    /// other is removed in both directions.
    ///
    /// Returns how many links against `first` and against `second` were
    /// dropped.
    pub fn resolve_double_matches(&mut self, pool: PoolTag, first: PoolTag, second: PoolTag) -> (usize, usize) {
        let doubly: Vec<usize> = self
            .matched_indices(pool, first)
            .into_iter()
            .filter(|&i| self.entries.contains_key(&(pool, i, second)))
            .collect();

        let mut dropped_first = 0;
        let mut dropped_second = 0;
        for i in doubly {
            let d_first = self.entries[&(pool, i, first)].delta_r;
            let d_second = self.entries[&(pool, i, second)].delta_r;
            if d_first <= d_second {
                self.remove_pair(pool, i, second);
                dropped_second += 1;
            } else {
                self.remove_pair(pool, i, first);
                dropped_first += 1;
            }
        }
        (dropped_first, dropped_second)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every annotation involving `pool`, in either direction.
    pub fn clear_pool(&mut self, pool: PoolTag) {
        self.entries.retain(|(p, _, q), _| *p != pool && *q != pool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_mutual() {
        let mut table = MatchTable::new();
        table.insert_pair(PoolTag::Subjet, 2, PoolTag::BJet, 0, 0.12);

        let forward = table.get(PoolTag::Subjet, 2, PoolTag::BJet).unwrap();
        assert_eq!(forward.partner, 0);
        assert!((forward.delta_r - 0.12).abs() < 1e-12);

        let backward = table.get(PoolTag::BJet, 0, PoolTag::Subjet).unwrap();
        assert_eq!(backward.partner, 2);
    }

    #[test]
    fn test_remove_clears_both_directions() {
        let mut table = MatchTable::new();
        table.insert_pair(PoolTag::Subjet, 1, PoolTag::LightJet, 3, 0.05);
        let removed = table.remove_pair(PoolTag::LightJet, 3, PoolTag::Subjet);
        assert!(removed.is_some());
        assert!(table.is_empty());
    }

    #[test]
    fn test_resolve_keeps_smaller_distance() {
        let mut table = MatchTable::new();
        table.insert_pair(PoolTag::Subjet, 0, PoolTag::BJet, 1, 0.20);
        table.insert_pair(PoolTag::Subjet, 0, PoolTag::LightJet, 2, 0.08);

        let (dropped_b, dropped_l) = table.resolve_double_matches(PoolTag::Subjet, PoolTag::BJet, PoolTag::LightJet);
        assert_eq!(dropped_b, 1);
        assert_eq!(dropped_l, 0);
        assert!(table.get(PoolTag::Subjet, 0, PoolTag::BJet).is_none());
        assert!(table.get(PoolTag::BJet, 1, PoolTag::Subjet).is_none());
        assert!(table.get(PoolTag::Subjet, 0, PoolTag::LightJet).is_some());
    }

    #[test]
    fn test_count_and_indices() {
        let mut table = MatchTable::new();
        table.insert_pair(PoolTag::Subjet, 2, PoolTag::BJet, 0, 0.11);
        table.insert_pair(PoolTag::Subjet, 0, PoolTag::BJet, 1, 0.21);
        assert_eq!(table.count(PoolTag::Subjet, PoolTag::BJet), 2);
        assert_eq!(table.matched_indices(PoolTag::Subjet, PoolTag::BJet), vec![0, 2]);
    }
}
