//! Per-event strip charge accumulator.

use std::collections::btree_map::{self, Entry};
use std::collections::BTreeMap;

use tkrdigi_core::{Carrier, HitRef, StripContribution, StripKey};

/// Collects charge contributions per (plane, strip).
///
/// Holds at most one entry per key. Merging adds charges element-wise and
/// unions hit handles, so the final state does not depend on the order in
/// which contributions arrive. Iteration is in key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StripAccumulator {
    strips: BTreeMap<StripKey, StripContribution>,
}

impl StripAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one contribution.
    pub fn merge(&mut self, contribution: StripContribution) {
        match self.strips.entry(contribution.key) {
            Entry::Vacant(slot) => {
                slot.insert(contribution);
            }
            Entry::Occupied(mut slot) => slot.get_mut().absorb(&contribution),
        }
    }

    /// Merges a sequence of contributions.
    pub fn merge_all<I>(&mut self, contributions: I)
    where
        I: IntoIterator<Item = StripContribution>,
    {
        for contribution in contributions {
            self.merge(contribution);
        }
    }

    /// Adds charge from one carrier without building a contribution first.
    pub fn add(&mut self, key: StripKey, carrier: Carrier, charge: f64, hit: HitRef) {
        let entry = self
            .strips
            .entry(key)
            .or_insert_with(|| StripContribution::new(key));
        entry.add_charge(carrier, charge);
        entry.add_hit(hit);
    }

    /// Merges every entry of another accumulator.
    pub fn absorb(&mut self, other: Self) {
        self.merge_all(other.strips.into_values());
    }

    /// Contribution for one strip.
    #[must_use]
    pub fn get(&self, key: &StripKey) -> Option<&StripContribution> {
        self.strips.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &StripKey) -> bool {
        self.strips.contains_key(key)
    }

    /// Mutable access to every contribution, in key order.
    pub fn iter_mut(&mut self) -> btree_map::ValuesMut<'_, StripKey, StripContribution> {
        self.strips.values_mut()
    }

    /// Keeps only the contributions matching `keep`; returns how many were
    /// removed.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&StripContribution) -> bool,
    {
        let before = self.strips.len();
        self.strips.retain(|_, contribution| keep(contribution));
        before - self.strips.len()
    }

    /// All contributions in key order.
    #[must_use]
    pub fn get_all(&self) -> Vec<&StripContribution> {
        self.strips.values().collect()
    }

    /// Iterates contributions in key order.
    pub fn iter(&self) -> btree_map::Values<'_, StripKey, StripContribution> {
        self.strips.values()
    }

    /// Consumes the accumulator, returning contributions in key order.
    #[must_use]
    pub fn into_contributions(self) -> Vec<StripContribution> {
        self.strips.into_values().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strips.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strips.is_empty()
    }

    /// Total charge over all strips, in electrons.
    #[must_use]
    pub fn total_charge(&self) -> f64 {
        self.strips.values().map(StripContribution::total_charge).sum()
    }

    /// Empties the accumulator for the next event.
    pub fn clear(&mut self) {
        self.strips.clear();
    }
}

impl<'a> IntoIterator for &'a StripAccumulator {
    type Item = &'a StripContribution;
    type IntoIter = btree_map::Values<'a, StripKey, StripContribution>;

    fn into_iter(self) -> Self::IntoIter {
        self.strips.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tkrdigi_core::{PlaneId, View};

    fn key(layer: u16, strip: u32) -> StripKey {
        StripKey::new(PlaneId::new(0, layer, View::X), strip)
    }

    #[test]
    fn test_single_entry_per_key() {
        let mut acc = StripAccumulator::new();
        acc.add(key(0, 5), Carrier::Hole, 10.0, HitRef(0));
        acc.add(key(0, 5), Carrier::Electron, 4.0, HitRef(0));
        acc.add(key(0, 6), Carrier::Hole, 1.0, HitRef(1));

        assert_eq!(acc.len(), 2);
        let strip = acc.get(&key(0, 5)).unwrap();
        assert_eq!(strip.charge, [10.0, 4.0]);
        assert_eq!(strip.hits, vec![HitRef(0)]);
        assert_eq!(acc.total_charge(), 15.0);
    }

    #[test]
    fn test_get_all_is_ordered() {
        let mut acc = StripAccumulator::new();
        acc.add(key(2, 1), Carrier::Hole, 1.0, HitRef(0));
        acc.add(key(0, 900), Carrier::Hole, 1.0, HitRef(0));
        acc.add(key(0, 3), Carrier::Hole, 1.0, HitRef(0));

        let keys: Vec<StripKey> = acc.get_all().iter().map(|c| c.key).collect();
        assert_eq!(keys, vec![key(0, 3), key(0, 900), key(2, 1)]);
    }

    #[test]
    fn test_clear() {
        let mut acc = StripAccumulator::new();
        acc.add(key(0, 1), Carrier::Hole, 1.0, HitRef(0));
        acc.clear();
        assert!(acc.is_empty());
        assert_eq!(acc.total_charge(), 0.0);
    }

    #[test]
    fn test_absorb_unions_hits() {
        let mut a = StripAccumulator::new();
        a.add(key(1, 7), Carrier::Hole, 3.0, HitRef(4));
        let mut b = StripAccumulator::new();
        b.add(key(1, 7), Carrier::Electron, 2.0, HitRef(9));
        b.add(key(1, 7), Carrier::Electron, 2.0, HitRef(4));

        a.absorb(b);
        let strip = a.get(&key(1, 7)).unwrap();
        assert_eq!(strip.charge, [3.0, 4.0]);
        assert_eq!(strip.hits, vec![HitRef(4), HitRef(9)]);
    }

    #[test]
    fn test_retain_reports_removed() {
        let mut acc = StripAccumulator::new();
        acc.add(key(0, 1), Carrier::Hole, 1.0, HitRef(0));
        acc.add(key(0, 2), Carrier::Hole, 50.0, HitRef(0));
        acc.add(key(0, 3), Carrier::Electron, 2.0, HitRef(1));

        assert_eq!(acc.retain(|c| c.total_charge() > 1.5), 1);
        assert!(!acc.contains(&key(0, 1)));
        assert!(acc.contains(&key(0, 3)));
        assert_eq!(acc.len(), 2);
    }
}
