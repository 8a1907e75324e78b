//! Readout noise on the accumulated strip charge.
//!
//! Applied after accumulation and before the front end, in three steps:
//! Gaussian electronic noise on every strip that collected charge, random
//! noise strips drawn per plane with a fixed occupancy, and removal of
//! strips left below the noise threshold. Energies are converted to
//! electrons with the pair-creation energy.

use log::debug;
use rand::Rng;
use rand_distr::{Binomial, Distribution, StandardNormal};
use tkrdigi_core::{Carrier, PlaneId, StripContribution, StripKey, View};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::accumulator::StripAccumulator;
use crate::{Error, Result};

/// Noise stage settings. Disabled by default.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NoiseConfig {
    pub enabled: bool,
    /// Electronic noise RMS per strip (MeV).
    pub sigma_mev: f64,
    /// Probability that any strip fires on noise alone.
    pub occupancy: f64,
    /// Strips below this energy are removed (MeV). Noise strips are drawn
    /// at or above it.
    pub threshold_mev: f64,
    /// Towers receiving noise strips.
    pub towers: u16,
    /// Layers per tower receiving noise strips.
    pub layers: u16,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sigma_mev: 0.00698,
            occupancy: 5.0e-6,
            threshold_mev: 0.03875,
            towers: 16,
            layers: 18,
        }
    }
}

impl NoiseConfig {
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_sigma(mut self, sigma_mev: f64) -> Self {
        self.sigma_mev = sigma_mev;
        self
    }

    #[must_use]
    pub fn with_occupancy(mut self, occupancy: f64) -> Self {
        self.occupancy = occupancy;
        self
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold_mev: f64) -> Self {
        self.threshold_mev = threshold_mev;
        self
    }

    /// Restricts noise strips to `towers` x `layers`.
    #[must_use]
    pub fn with_planes(mut self, towers: u16, layers: u16) -> Self {
        self.towers = towers;
        self.layers = layers;
        self
    }

    /// Checks the settings.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for a negative RMS or threshold, or an
    /// occupancy outside `0..=1`.
    pub fn validate(&self) -> Result<()> {
        if !(self.sigma_mev >= 0.0 && self.sigma_mev.is_finite()) {
            return Err(Error::ConfigError(format!(
                "noise sigma must be non-negative, got {}",
                self.sigma_mev
            )));
        }
        if !(0.0..=1.0).contains(&self.occupancy) {
            return Err(Error::ConfigError(format!(
                "noise occupancy must be within 0..=1, got {}",
                self.occupancy
            )));
        }
        if !(self.threshold_mev >= 0.0 && self.threshold_mev.is_finite()) {
            return Err(Error::ConfigError(format!(
                "noise threshold must be non-negative, got {}",
                self.threshold_mev
            )));
        }
        Ok(())
    }
}

/// Counters from one noise pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NoiseStats {
    pub strips_added: usize,
    pub strips_removed: usize,
}

impl NoiseStats {
    pub fn merge(&mut self, other: &Self) {
        self.strips_added += other.strips_added;
        self.strips_removed += other.strips_removed;
    }
}

/// Adds readout noise to an accumulator.
#[derive(Clone, Debug)]
pub struct NoiseGenerator {
    config: NoiseConfig,
    electrons_per_mev: f64,
}

impl NoiseGenerator {
    /// Creates a generator converting energies with `pair_energy_ev` per
    /// electron-hole pair.
    #[must_use]
    pub fn new(config: NoiseConfig, pair_energy_ev: f64) -> Self {
        Self {
            config,
            electrons_per_mev: 1.0e6 / pair_energy_ev,
        }
    }

    #[must_use]
    pub fn config(&self) -> &NoiseConfig {
        &self.config
    }

    /// Noise threshold in electrons.
    #[must_use]
    pub fn threshold_electrons(&self) -> f64 {
        self.config.threshold_mev * self.electrons_per_mev
    }

    /// Runs the three noise steps on `accumulator`. Planes have
    /// `strip_count` strips each. Does nothing when disabled.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        accumulator: &mut StripAccumulator,
        strip_count: u32,
        rng: &mut R,
    ) -> NoiseStats {
        if !self.config.enabled {
            return NoiseStats::default();
        }
        self.add_electronic_noise(accumulator, rng);
        let strips_added = self.add_noise_strips(accumulator, strip_count, rng);
        let threshold = self.threshold_electrons();
        let strips_removed = accumulator.retain(|c| c.total_charge() >= threshold);
        debug!("noise: {strips_added} strips added, {strips_removed} removed");
        NoiseStats {
            strips_added,
            strips_removed,
        }
    }

    /// Smears every strip's charge. The smear is split evenly between the
    /// two carrier slots.
    pub fn add_electronic_noise<R: Rng + ?Sized>(
        &self,
        accumulator: &mut StripAccumulator,
        rng: &mut R,
    ) {
        let sigma = self.config.sigma_mev * self.electrons_per_mev;
        if sigma <= 0.0 {
            return;
        }
        for contribution in accumulator.iter_mut() {
            let z: f64 = rng.sample(StandardNormal);
            let half = 0.5 * z * sigma;
            contribution.add_charge(Carrier::Hole, half);
            contribution.add_charge(Carrier::Electron, half);
        }
    }

    /// Draws noise strips on every configured plane. A drawn strip that
    /// already holds charge is skipped. Returns the number added.
    pub fn add_noise_strips<R: Rng + ?Sized>(
        &self,
        accumulator: &mut StripAccumulator,
        strip_count: u32,
        rng: &mut R,
    ) -> usize {
        if self.config.occupancy <= 0.0 || strip_count == 0 {
            return 0;
        }
        let Ok(binomial) = Binomial::new(u64::from(strip_count), self.config.occupancy) else {
            return 0;
        };
        let threshold = self.threshold_electrons();

        let mut added = 0;
        for tower in 0..self.config.towers {
            for layer in 0..self.config.layers {
                for view in [View::X, View::Y] {
                    let plane = PlaneId::new(tower, layer, view);
                    let count = binomial.sample(rng);
                    for _ in 0..count {
                        let key = StripKey::new(plane, rng.random_range(0..strip_count));
                        // Uniform on (0, 1]
                        let u = 1.0 - rng.random::<f64>();
                        if accumulator.contains(&key) {
                            continue;
                        }
                        let charge = threshold * (1.0 - u.ln());
                        let mut contribution = StripContribution::new(key);
                        contribution.add_charge(Carrier::Hole, 0.5 * charge);
                        contribution.add_charge(Carrier::Electron, 0.5 * charge);
                        accumulator.merge(contribution);
                        added += 1;
                    }
                }
            }
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clusterer::PAIR_ENERGY_EV;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tkrdigi_core::HitRef;

    const STRIPS: u32 = 1536;

    fn generator(config: NoiseConfig) -> NoiseGenerator {
        NoiseGenerator::new(config.with_enabled(true), PAIR_ENERGY_EV)
    }

    fn key(strip: u32) -> StripKey {
        StripKey::new(PlaneId::new(0, 0, View::X), strip)
    }

    #[test]
    fn test_disabled_by_default() {
        let noise = NoiseGenerator::new(NoiseConfig::default(), PAIR_ENERGY_EV);
        let mut acc = StripAccumulator::new();
        acc.add(key(3), Carrier::Hole, 10.0, HitRef(0));
        let before = acc.clone();

        let stats = noise.apply(&mut acc, STRIPS, &mut StdRng::seed_from_u64(1));
        assert_eq!(stats, NoiseStats::default());
        assert_eq!(acc, before);
    }

    #[test]
    fn test_occupancy_rate() {
        // 1 tower x 2 layers x 2 views x 1536 strips at 1 %
        let noise = generator(
            NoiseConfig::default()
                .with_occupancy(0.01)
                .with_sigma(0.0)
                .with_planes(1, 2),
        );
        let mut total = 0;
        for seed in 0..50 {
            let mut acc = StripAccumulator::new();
            let stats = noise.apply(&mut acc, STRIPS, &mut StdRng::seed_from_u64(seed));
            assert_eq!(stats.strips_added, acc.len());
            assert_eq!(stats.strips_removed, 0);
            assert!(acc.iter().all(|c| c.key.plane.tower == 0 && c.key.plane.layer < 2));
            total += stats.strips_added;
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = total as f64 / 50.0;
        // expected 61.4 per event
        assert!(mean > 55.0 && mean < 68.0, "mean = {mean}");
    }

    #[test]
    fn test_noise_strips_start_at_threshold() {
        let noise = generator(NoiseConfig::default().with_occupancy(0.02).with_planes(1, 1));
        let mut acc = StripAccumulator::new();
        noise.apply(&mut acc, STRIPS, &mut StdRng::seed_from_u64(7));

        assert!(!acc.is_empty());
        let threshold = noise.threshold_electrons();
        for strip in &acc {
            assert!(strip.total_charge() >= threshold);
            assert!(strip.hits.is_empty());
        }
    }

    #[test]
    fn test_existing_strip_is_not_replaced() {
        // Every strip of the plane is drawn, none may be overwritten
        let noise = generator(
            NoiseConfig::default()
                .with_occupancy(1.0)
                .with_sigma(0.0)
                .with_threshold(0.0)
                .with_planes(1, 1),
        );
        let mut acc = StripAccumulator::new();
        acc.add(key(3), Carrier::Hole, 1.0e5, HitRef(2));
        noise.apply(&mut acc, 8, &mut StdRng::seed_from_u64(8));

        let strip = acc.get(&key(3)).unwrap();
        assert_eq!(strip.charge, [1.0e5, 0.0]);
        assert_eq!(strip.hits, vec![HitRef(2)]);
    }

    #[test]
    fn test_removal_below_threshold() {
        let noise = generator(NoiseConfig::default().with_sigma(0.0).with_occupancy(0.0));
        // threshold 0.03875 MeV is about 10760 electrons
        let mut acc = StripAccumulator::new();
        acc.add(key(1), Carrier::Hole, 5_000.0, HitRef(0));
        acc.add(key(2), Carrier::Electron, 20_000.0, HitRef(1));
        acc.add(key(3), Carrier::Hole, -300.0, HitRef(2));

        let stats = noise.apply(&mut acc, STRIPS, &mut StdRng::seed_from_u64(2));
        assert_eq!(stats.strips_removed, 2);
        assert_eq!(stats.strips_added, 0);
        assert_eq!(acc.len(), 1);
        assert!(acc.contains(&key(2)));
    }

    #[test]
    fn test_electronic_noise_spread() {
        let noise = generator(
            NoiseConfig::default()
                .with_occupancy(0.0)
                .with_threshold(0.0),
        );
        let sigma = noise.config().sigma_mev * 1.0e6 / PAIR_ENERGY_EV;
        let mut rng = StdRng::seed_from_u64(3);
        let draws: Vec<f64> = (0..2000)
            .map(|_| {
                let mut acc = StripAccumulator::new();
                acc.add(key(0), Carrier::Hole, 1.0e5, HitRef(0));
                noise.add_electronic_noise(&mut acc, &mut rng);
                acc.total_charge() - 1.0e5
            })
            .collect();

        #[allow(clippy::cast_precision_loss)]
        let n = draws.len() as f64;
        let mean = draws.iter().sum::<f64>() / n;
        let rms = (draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n).sqrt();
        assert!(mean.abs() < 0.1 * sigma, "mean = {mean}");
        assert!((rms / sigma - 1.0).abs() < 0.1, "rms = {rms}, sigma = {sigma}");
    }

    #[test]
    fn test_reproducible_with_seed() {
        let noise = generator(NoiseConfig::default().with_occupancy(0.01).with_planes(2, 2));
        let run = |seed| {
            let mut acc = StripAccumulator::new();
            acc.add(key(40), Carrier::Hole, 4.0e4, HitRef(0));
            noise.apply(&mut acc, STRIPS, &mut StdRng::seed_from_u64(seed));
            acc
        };
        assert_eq!(run(5), run(5));
    }

    #[test]
    fn test_validate() {
        assert!(NoiseConfig::default().validate().is_ok());
        assert!(NoiseConfig::default().with_occupancy(1.5).validate().is_err());
        assert!(NoiseConfig::default().with_sigma(-1.0).validate().is_err());
    }
}
