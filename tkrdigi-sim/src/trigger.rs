//! Per-tower trigger time estimation.

use std::collections::btree_map;
use std::collections::BTreeMap;

use log::debug;
use tkrdigi_core::{HitRef, PlaneId, StripKey, View};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::frontend::StripResponse;
use crate::{Error, Result};

/// Front-end result of one strip, ready for trigger and gate decisions.
#[derive(Clone, Debug, PartialEq)]
pub struct StripTiming {
    pub key: StripKey,
    pub response: StripResponse,
    pub hits: Vec<HitRef>,
}

impl StripTiming {
    #[must_use]
    pub fn new(key: StripKey, response: StripResponse, hits: Vec<HitRef>) -> Self {
        Self {
            key,
            response,
            hits,
        }
    }
}

/// Coincidence rule applied per tower.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TriggerMode {
    /// Earliest plane time in the tower, no coincidence.
    EarliestStrip,
    /// Enough fired planes overall and per view.
    #[default]
    LayerCount,
    /// Both views fired in three consecutive layers, scanning from the top.
    ThreeInARow,
}

/// Trigger estimation settings.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TriggerConfig {
    pub mode: TriggerMode,
    /// Fired planes required in a tower.
    pub min_planes: usize,
    /// Fired planes required in each view ([`TriggerMode::LayerCount`]).
    pub min_planes_per_view: usize,
    /// Layers per tower.
    pub layers: u16,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            mode: TriggerMode::LayerCount,
            min_planes: 6,
            min_planes_per_view: 3,
            layers: 18,
        }
    }
}

impl TriggerConfig {
    #[must_use]
    pub fn with_mode(mut self, mode: TriggerMode) -> Self {
        self.mode = mode;
        self
    }

    /// Checks the settings.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if a tower has fewer than three layers.
    pub fn validate(&self) -> Result<()> {
        if self.layers < 3 {
            return Err(Error::ConfigError(format!(
                "a tower needs at least 3 layers, got {}",
                self.layers
            )));
        }
        Ok(())
    }
}

/// Trigger time per tower, in ns after the event.
///
/// Towers without a trigger are absent and report a time of 0.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TowerTriggers {
    times: BTreeMap<u16, f64>,
}

impl TowerTriggers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tower: u16, time_ns: f64) {
        self.times.insert(tower, time_ns);
    }

    /// Trigger time of a tower, 0 when it did not trigger.
    #[must_use]
    pub fn get(&self, tower: u16) -> f64 {
        self.times.get(&tower).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn is_triggered(&self, tower: u16) -> bool {
        self.get(tower) > 0.0
    }

    pub fn iter(&self) -> btree_map::Iter<'_, u16, f64> {
        self.times.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Estimates tower trigger times from fired-strip timing.
#[derive(Clone, Debug, Default)]
pub struct TriggerEstimator {
    config: TriggerConfig,
}

impl TriggerEstimator {
    #[must_use]
    pub fn new(config: TriggerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    /// Earliest threshold crossing of every plane with a fired strip.
    #[must_use]
    pub fn plane_times(timings: &[StripTiming]) -> BTreeMap<PlaneId, f64> {
        let mut times: BTreeMap<PlaneId, f64> = BTreeMap::new();
        for timing in timings.iter().filter(|t| t.response.fired) {
            let delay = timing.response.delay_ns;
            times
                .entry(timing.key.plane)
                .and_modify(|t| *t = t.min(delay))
                .or_insert(delay);
        }
        times
    }

    /// Trigger time of every tower that passes the coincidence.
    #[must_use]
    pub fn estimate(&self, timings: &[StripTiming]) -> TowerTriggers {
        let mut towers: BTreeMap<u16, Vec<(PlaneId, f64)>> = BTreeMap::new();
        for (plane, time) in Self::plane_times(timings) {
            towers.entry(plane.tower).or_default().push((plane, time));
        }

        let mut triggers = TowerTriggers::new();
        for (tower, planes) in towers {
            match self.tower_trigger(&planes) {
                Some(time) => {
                    debug!("tower {tower}: trigger at {time:.1} ns from {} planes", planes.len());
                    triggers.insert(tower, time);
                }
                None => debug!("tower {tower}: no trigger ({} fired planes)", planes.len()),
            }
        }
        triggers
    }

    fn tower_trigger(&self, planes: &[(PlaneId, f64)]) -> Option<f64> {
        let earliest = planes.iter().map(|&(_, t)| t).reduce(f64::min)?;
        match self.config.mode {
            TriggerMode::EarliestStrip => Some(earliest),
            TriggerMode::LayerCount => {
                let x = planes.iter().filter(|(p, _)| p.view == View::X).count();
                let y = planes.len() - x;
                (planes.len() >= self.config.min_planes
                    && x >= self.config.min_planes_per_view
                    && y >= self.config.min_planes_per_view)
                    .then_some(earliest)
            }
            TriggerMode::ThreeInARow => {
                if planes.len() < self.config.min_planes {
                    return None;
                }
                self.three_in_a_row(planes)
            }
        }
    }

    /// Earliest time among the six planes of the topmost run of three
    /// consecutive layers with both views fired.
    fn three_in_a_row(&self, planes: &[(PlaneId, f64)]) -> Option<f64> {
        let layers = usize::from(self.config.layers);
        let mut grid = vec![[None::<f64>; 2]; layers];
        for &(plane, time) in planes {
            if let Some(row) = grid.get_mut(usize::from(plane.layer)) {
                row[usize::from(plane.view.index())] = Some(time);
            }
        }

        (2..layers).rev().find_map(|top| {
            grid[top - 2..=top]
                .iter()
                .flatten()
                .try_fold(f64::INFINITY, |acc, t| t.map(|t| acc.min(t)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fired(tower: u16, layer: u16, view: View, delay: f64) -> StripTiming {
        StripTiming::new(
            StripKey::new(PlaneId::new(tower, layer, view), 10),
            StripResponse::fired(delay, delay + 5000.0, 7.0),
            vec![HitRef(0)],
        )
    }

    fn layers(tower: u16, range: std::ops::Range<u16>, delay: f64) -> Vec<StripTiming> {
        range
            .flat_map(|l| [fired(tower, l, View::X, delay), fired(tower, l, View::Y, delay)])
            .collect()
    }

    #[test]
    fn test_plane_time_is_earliest_fired_strip() {
        let mut timings = vec![fired(0, 0, View::X, 600.0), fired(0, 0, View::X, 550.0)];
        timings.push(StripTiming::new(
            StripKey::new(PlaneId::new(0, 0, View::X), 3),
            StripResponse::silent(0.2),
            Vec::new(),
        ));
        let times = TriggerEstimator::plane_times(&timings);
        assert_eq!(times.len(), 1);
        assert_eq!(times[&PlaneId::new(0, 0, View::X)], 550.0);
    }

    #[test]
    fn test_layer_count_coincidence() {
        let estimator = TriggerEstimator::default();
        let mut timings = layers(3, 0..3, 600.0);
        timings.push(fired(3, 5, View::X, 540.0));

        let triggers = estimator.estimate(&timings);
        assert!(triggers.is_triggered(3));
        assert_eq!(triggers.get(3), 540.0);
    }

    #[test]
    fn test_too_few_planes_gives_zero() {
        let estimator = TriggerEstimator::default();
        let timings: Vec<StripTiming> = (0..5).map(|l| fired(1, l, View::X, 500.0)).collect();
        let triggers = estimator.estimate(&timings);
        assert_eq!(triggers.get(1), 0.0);
        assert!(!triggers.is_triggered(1));
    }

    #[test]
    fn test_layer_count_needs_both_views() {
        let estimator = TriggerEstimator::default();
        let mut timings: Vec<StripTiming> = (0..5).map(|l| fired(0, l, View::X, 500.0)).collect();
        timings.extend((0..2).map(|l| fired(0, l, View::Y, 500.0)));
        assert!(estimator.estimate(&timings).is_empty());
    }

    #[test]
    fn test_earliest_strip_mode() {
        let estimator = TriggerEstimator::new(TriggerConfig::default().with_mode(TriggerMode::EarliestStrip));
        let triggers = estimator.estimate(&[fired(2, 7, View::Y, 564.0)]);
        assert_eq!(triggers.get(2), 564.0);
    }

    #[test]
    fn test_three_in_a_row_scans_from_top() {
        let estimator = TriggerEstimator::new(TriggerConfig::default().with_mode(TriggerMode::ThreeInARow));
        let mut timings = layers(0, 2..5, 700.0);
        timings.extend(layers(0, 10..13, 650.0));
        // Earlier but outside the topmost run
        timings[0].response = StripResponse::fired(100.0, 5000.0, 7.0);

        let triggers = estimator.estimate(&timings);
        assert_eq!(triggers.get(0), 650.0);
    }

    #[test]
    fn test_three_in_a_row_requires_consecutive_layers() {
        let estimator = TriggerEstimator::new(TriggerConfig::default().with_mode(TriggerMode::ThreeInARow));
        let mut timings = layers(0, 0..2, 700.0);
        timings.extend(layers(0, 3..5, 700.0));
        assert_eq!(estimator.estimate(&timings).get(0), 0.0);
    }

    #[test]
    fn test_towers_are_independent() {
        let estimator = TriggerEstimator::default();
        let mut timings = layers(0, 0..3, 600.0);
        timings.push(fired(1, 0, View::X, 300.0));

        let triggers = estimator.estimate(&timings);
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers.get(0), 600.0);
        assert_eq!(triggers.get(1), 0.0);
    }
}
