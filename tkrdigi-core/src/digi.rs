//! Digitized strips and the per-event plane map.

use std::collections::btree_map;
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::hit::HitRef;
use crate::volume::PlaneId;

/// Marker for an unset ToT time.
pub const NO_TIME: i32 = -1;

/// Length of one ToT time bin in nanoseconds.
pub const TIME_BIN_NS: f64 = 10.0;

/// A fired readout strip.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DigitizedStrip {
    pub strip: u32,
    /// ToT start, in time bins after the trigger acknowledge.
    pub tot_start: i32,
    /// ToT stop, in time bins after the trigger acknowledge.
    pub tot_stop: i32,
    /// Reconstructed energy in MeV.
    pub energy_mev: f64,
    /// Collected charge in fC.
    pub charge_fc: f64,
    pub hits: Vec<HitRef>,
    /// Strip failed the acquisition gate but was kept.
    pub gated_out: bool,
}

impl DigitizedStrip {
    #[must_use]
    pub fn new(strip: u32, energy_mev: f64) -> Self {
        Self {
            strip,
            tot_start: NO_TIME,
            tot_stop: NO_TIME,
            energy_mev,
            charge_fc: 0.0,
            hits: Vec::new(),
            gated_out: false,
        }
    }

    /// Sets the ToT window.
    #[must_use]
    pub fn with_times(mut self, tot_start: i32, tot_stop: i32) -> Self {
        self.tot_start = tot_start;
        self.tot_stop = tot_stop;
        self
    }

    /// Sets the collected charge.
    #[must_use]
    pub fn with_charge(mut self, charge_fc: f64) -> Self {
        self.charge_fc = charge_fc;
        self
    }

    /// Sets the contributing hits.
    #[must_use]
    pub fn with_hits(mut self, hits: Vec<HitRef>) -> Self {
        self.hits = hits;
        self
    }

    /// Marks the strip as having failed the acquisition gate.
    #[must_use]
    pub fn with_gated_out(mut self, gated_out: bool) -> Self {
        self.gated_out = gated_out;
        self
    }

    /// ToT window length in time bins, if both ends are set.
    #[must_use]
    pub fn tot_bins(&self) -> Option<i32> {
        (self.tot_start != NO_TIME && self.tot_stop != NO_TIME)
            .then(|| self.tot_stop - self.tot_start)
    }

    /// Folds another record of the same strip into this one.
    ///
    /// Energy and charge add, hits are unioned, and the ToT window widens
    /// to cover both when both ends of the incoming window are set.
    pub fn merge(&mut self, other: &Self) {
        self.energy_mev += other.energy_mev;
        self.charge_fc += other.charge_fc;
        for &hit in &other.hits {
            if !self.hits.contains(&hit) {
                self.hits.push(hit);
            }
        }
        if other.tot_start != NO_TIME && other.tot_stop != NO_TIME {
            if other.tot_start < self.tot_start || self.tot_start < 0 {
                self.tot_start = other.tot_start;
            }
            if other.tot_stop > self.tot_stop {
                self.tot_stop = other.tot_stop;
            }
        }
        self.gated_out &= other.gated_out;
    }
}

/// Fired strips of one event, grouped by plane and ordered by strip index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaneDigiMap {
    planes: BTreeMap<PlaneId, Vec<DigitizedStrip>>,
}

impl PlaneDigiMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a strip to a plane, keeping the plane's list ordered.
    ///
    /// A strip already present on the plane is merged rather than
    /// duplicated.
    pub fn insert(&mut self, plane: PlaneId, strip: DigitizedStrip) {
        let strips = self.planes.entry(plane).or_default();
        match strips.binary_search_by_key(&strip.strip, |s| s.strip) {
            Ok(pos) => strips[pos].merge(&strip),
            Err(pos) => strips.insert(pos, strip),
        }
    }

    /// Strips of one plane.
    #[must_use]
    pub fn get(&self, plane: &PlaneId) -> Option<&[DigitizedStrip]> {
        self.planes.get(plane).map(Vec::as_slice)
    }

    /// Iterates planes in identifier order.
    pub fn iter(&self) -> btree_map::Iter<'_, PlaneId, Vec<DigitizedStrip>> {
        self.planes.iter()
    }

    /// Planes with at least one strip.
    pub fn planes(&self) -> impl Iterator<Item = &PlaneId> {
        self.planes.keys()
    }

    /// Number of planes.
    #[must_use]
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// Total number of strips over all planes.
    #[must_use]
    pub fn strip_count(&self) -> usize {
        self.planes.values().map(Vec::len).sum()
    }

    /// Strips of a given tower.
    pub fn tower_strips(&self, tower: u16) -> impl Iterator<Item = (&PlaneId, &DigitizedStrip)> {
        self.planes
            .iter()
            .filter(move |(plane, _)| plane.tower == tower)
            .flat_map(|(plane, strips)| strips.iter().map(move |s| (plane, s)))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    /// Removes all planes.
    pub fn clear(&mut self) {
        self.planes.clear();
    }

    /// Merges another map into this one.
    pub fn extend(&mut self, other: Self) {
        for (plane, strips) in other.planes {
            for strip in strips {
                self.insert(plane, strip);
            }
        }
    }
}

impl<'a> IntoIterator for &'a PlaneDigiMap {
    type Item = (&'a PlaneId, &'a Vec<DigitizedStrip>);
    type IntoIter = btree_map::Iter<'a, PlaneId, Vec<DigitizedStrip>>;

    fn into_iter(self) -> Self::IntoIter {
        self.planes.iter()
    }
}
