//! Acquisition gate and conversion of fired strips into digis.

use log::trace;
use tkrdigi_core::{DigitizedStrip, PlaneDigiMap, NO_TIME, TIME_BIN_NS};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::trigger::{StripTiming, TowerTriggers};
use crate::{Error, Result};

/// Deposited energy per collected charge: 1e4/1.6 electrons per fC at
/// 3.6 eV per pair.
pub const CHARGE_TO_ENERGY_MEV_PER_FC: f64 = 1.0e4 / 1.6 * 3.6e-6;

/// What happens to a fired strip that misses the acquisition gate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum GatePolicy {
    /// Leave it out of the output.
    #[default]
    Drop,
    /// Keep it with `gated_out` set and no ToT window.
    Flag,
}

/// Acquisition gate timing.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GateConfig {
    /// Latency from the trigger to the trigger request (ns).
    pub trigger_request_ns: f64,
    /// Latency from the request to the acknowledge (ns).
    pub ack_delay_ns: f64,
    pub policy: GatePolicy,
    pub time_bin_ns: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            trigger_request_ns: 1000.0,
            ack_delay_ns: 1000.0,
            policy: GatePolicy::Drop,
            time_bin_ns: TIME_BIN_NS,
        }
    }
}

impl GateConfig {
    #[must_use]
    pub fn with_policy(mut self, policy: GatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Checks the gate timing.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for negative latencies or a
    /// non-positive time bin.
    pub fn validate(&self) -> Result<()> {
        if !(self.trigger_request_ns >= 0.0 && self.ack_delay_ns >= 0.0) {
            return Err(Error::ConfigError("gate latencies must be non-negative".into()));
        }
        if !(self.time_bin_ns > 0.0 && self.time_bin_ns.is_finite()) {
            return Err(Error::ConfigError(format!(
                "time bin must be positive, got {}",
                self.time_bin_ns
            )));
        }
        Ok(())
    }
}

/// Applies the acquisition gate to fired strips.
#[derive(Clone, Debug, Default)]
pub struct ThresholdDigitizer {
    config: GateConfig,
}

impl ThresholdDigitizer {
    #[must_use]
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Trigger acknowledge time for a trigger time (ns).
    #[must_use]
    pub fn acknowledge_ns(&self, trigger_ns: f64) -> f64 {
        trigger_ns + self.config.trigger_request_ns + self.config.ack_delay_ns
    }

    /// ToT window in time bins for a strip stopping at `stop_ns`, or
    /// `None` if the tower did not trigger or the strip stopped before the
    /// acknowledge.
    #[must_use]
    pub fn gate(&self, trigger_ns: f64, stop_ns: f64) -> Option<(i32, i32)> {
        let ack = self.acknowledge_ns(trigger_ns);
        if !(trigger_ns > 0.0 && stop_ns > ack) {
            return None;
        }
        Some((self.to_bins(ack), self.to_bins((stop_ns - ack).max(0.0))))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn to_bins(&self, ns: f64) -> i32 {
        (ns / self.config.time_bin_ns).floor() as i32
    }

    /// Builds the plane map of an event from per-strip timing.
    ///
    /// Silent strips never appear. Fired strips are kept when they pass
    /// the gate of their tower; the rest follow the gate policy.
    #[must_use]
    pub fn select_fired_strips(
        &self,
        timings: &[StripTiming],
        triggers: &TowerTriggers,
    ) -> PlaneDigiMap {
        let mut digis = PlaneDigiMap::new();
        let mut gated = 0usize;

        for timing in timings.iter().filter(|t| t.response.fired) {
            let plane = timing.key.plane;
            let energy = timing.response.charge_fc.abs() * CHARGE_TO_ENERGY_MEV_PER_FC;
            let strip = DigitizedStrip::new(timing.key.strip, energy)
                .with_charge(timing.response.charge_fc)
                .with_hits(timing.hits.clone());

            match self.gate(triggers.get(plane.tower), timing.response.stop_ns) {
                Some((start, stop)) => digis.insert(plane, strip.with_times(start, stop)),
                None => {
                    gated += 1;
                    if self.config.policy == GatePolicy::Flag {
                        digis.insert(
                            plane,
                            strip.with_times(NO_TIME, NO_TIME).with_gated_out(true),
                        );
                    }
                }
            }
        }
        if gated > 0 {
            trace!("{gated} fired strips missed the acquisition gate");
        }
        digis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::StripResponse;
    use approx::assert_relative_eq;
    use tkrdigi_core::{HitRef, PlaneId, StripKey, View};

    fn timing(tower: u16, strip: u32, delay: f64, stop: f64) -> StripTiming {
        StripTiming::new(
            StripKey::new(PlaneId::new(tower, 4, View::Y), strip),
            StripResponse::fired(delay, stop, 7.19),
            vec![HitRef(strip)],
        )
    }

    fn triggered(tower: u16, time: f64) -> TowerTriggers {
        let mut triggers = TowerTriggers::new();
        triggers.insert(tower, time);
        triggers
    }

    #[test]
    fn test_gate_window() {
        let digitizer = ThresholdDigitizer::default();
        // ack = 564 + 2000 = 2564 ns
        assert_eq!(digitizer.gate(564.0, 15153.0), Some((256, 1258)));
        assert_eq!(digitizer.gate(564.0, 2000.0), None);
        assert_eq!(digitizer.gate(0.0, 15153.0), None);
    }

    #[test]
    fn test_energy_estimate() {
        assert_relative_eq!(CHARGE_TO_ENERGY_MEV_PER_FC, 0.0225, epsilon = 1e-12);
        let digitizer = ThresholdDigitizer::default();
        let digis = digitizer.select_fired_strips(&[timing(0, 5, 564.0, 15153.0)], &triggered(0, 564.0));
        let strip = &digis.get(&PlaneId::new(0, 4, View::Y)).unwrap()[0];
        assert_relative_eq!(strip.energy_mev, 7.19 * 0.0225, epsilon = 1e-12);
        assert_eq!(strip.hits, vec![HitRef(5)]);
    }

    #[test]
    fn test_untriggered_tower_emits_nothing() {
        let digitizer = ThresholdDigitizer::default();
        let timings = [timing(2, 5, 564.0, 15153.0)];
        assert!(digitizer.select_fired_strips(&timings, &TowerTriggers::new()).is_empty());
        assert!(digitizer.select_fired_strips(&timings, &triggered(1, 564.0)).is_empty());
    }

    #[test]
    fn test_flag_policy_keeps_gated_strips() {
        let digitizer = ThresholdDigitizer::new(GateConfig::default().with_policy(GatePolicy::Flag));
        let timings = [timing(0, 9, 564.0, 1500.0), timing(0, 3, 564.0, 15153.0)];
        let digis = digitizer.select_fired_strips(&timings, &triggered(0, 564.0));

        let strips = digis.get(&PlaneId::new(0, 4, View::Y)).unwrap();
        assert_eq!(strips.len(), 2);
        assert_eq!(strips[0].strip, 3);
        assert!(!strips[0].gated_out);
        assert_eq!(strips[1].strip, 9);
        assert!(strips[1].gated_out);
        assert_eq!(strips[1].tot_start, NO_TIME);
    }

    #[test]
    fn test_output_ordered_by_strip() {
        let digitizer = ThresholdDigitizer::default();
        let timings = [
            timing(0, 40, 564.0, 15153.0),
            timing(0, 2, 570.0, 15153.0),
            timing(0, 17, 600.0, 15153.0),
        ];
        let digis = digitizer.select_fired_strips(&timings, &triggered(0, 564.0));
        let strips: Vec<u32> = digis
            .get(&PlaneId::new(0, 4, View::Y))
            .unwrap()
            .iter()
            .map(|s| s.strip)
            .collect();
        assert_eq!(strips, vec![2, 17, 40]);
    }

    #[test]
    fn test_silent_strips_ignored() {
        let digitizer = ThresholdDigitizer::default();
        let silent = StripTiming::new(
            StripKey::new(PlaneId::new(0, 0, View::X), 1),
            StripResponse::silent(0.3),
            Vec::new(),
        );
        assert!(digitizer.select_fired_strips(&[silent], &triggered(0, 564.0)).is_empty());
    }
}
