//! Per-strip charge contributions.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::hit::HitRef;
use crate::volume::PlaneId;

/// Number of charge carrier species tracked per strip.
pub const CARRIER_COUNT: usize = 2;

/// Charge carrier species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Carrier {
    Hole,
    Electron,
}

impl Carrier {
    /// Both species, in storage order.
    pub const ALL: [Self; CARRIER_COUNT] = [Self::Hole, Self::Electron];

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Hole => 0,
            Self::Electron => 1,
        }
    }
}

/// Readout channel address: plane, then strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StripKey {
    pub plane: PlaneId,
    pub strip: u32,
}

impl StripKey {
    #[inline]
    #[must_use]
    pub const fn new(plane: PlaneId, strip: u32) -> Self {
        Self { plane, strip }
    }
}

/// Charge induced on one strip, split by carrier, and the truth hits that
/// produced it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StripContribution {
    pub key: StripKey,
    /// Induced charge in electrons, indexed by [`Carrier::index`].
    pub charge: [f64; CARRIER_COUNT],
    /// Contributing truth hits, without duplicates.
    pub hits: Vec<HitRef>,
}

impl StripContribution {
    /// Creates an empty contribution for a strip.
    #[must_use]
    pub fn new(key: StripKey) -> Self {
        Self {
            key,
            charge: [0.0; CARRIER_COUNT],
            hits: Vec::new(),
        }
    }

    /// Creates a contribution from a single carrier deposit.
    #[must_use]
    pub fn from_carrier(key: StripKey, carrier: Carrier, charge: f64, hit: HitRef) -> Self {
        let mut contribution = Self::new(key);
        contribution.charge[carrier.index()] = charge;
        contribution.hits.push(hit);
        contribution
    }

    /// Adds another contribution for the same strip.
    ///
    /// Charges add element-wise; hits are unioned by handle.
    pub fn absorb(&mut self, other: &Self) {
        debug_assert_eq!(self.key, other.key);
        for (mine, theirs) in self.charge.iter_mut().zip(other.charge.iter()) {
            *mine += theirs;
        }
        for &hit in &other.hits {
            self.add_hit(hit);
        }
    }

    /// Adds charge from one carrier species.
    #[inline]
    pub fn add_charge(&mut self, carrier: Carrier, charge: f64) {
        self.charge[carrier.index()] += charge;
    }

    /// Records a contributing hit if it is not already listed. Hits stay
    /// sorted, so the list does not depend on arrival order.
    pub fn add_hit(&mut self, hit: HitRef) {
        if let Err(pos) = self.hits.binary_search(&hit) {
            self.hits.insert(pos, hit);
        }
    }

    /// Total induced charge in electrons.
    #[inline]
    #[must_use]
    pub fn total_charge(&self) -> f64 {
        self.charge.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::View;

    fn key(strip: u32) -> StripKey {
        StripKey::new(PlaneId::new(0, 1, View::X), strip)
    }

    #[test]
    fn test_absorb_adds_and_dedups() {
        let mut a = StripContribution::from_carrier(key(10), Carrier::Hole, 100.0, HitRef(1));
        let b = StripContribution::from_carrier(key(10), Carrier::Electron, 50.0, HitRef(1));
        let c = StripContribution::from_carrier(key(10), Carrier::Hole, 25.0, HitRef(2));

        a.absorb(&b);
        a.absorb(&c);

        assert_eq!(a.charge, [125.0, 50.0]);
        assert_eq!(a.hits, vec![HitRef(1), HitRef(2)]);
        assert_eq!(a.total_charge(), 175.0);
    }

    #[test]
    fn test_key_ordering() {
        let low = StripKey::new(PlaneId::new(0, 0, View::Y), 1500);
        let high = StripKey::new(PlaneId::new(0, 1, View::X), 0);
        assert!(low < high);
        assert!(key(3) < key(4));
    }
}
