//! Ionization clustering along a track segment.
//!
//! The deposited energy is converted to a whole number of electron-hole
//! pairs and split into discrete clusters placed uniformly at random along
//! the segment. A deposit too small to create one pair produces nothing.

use rand::Rng;
use rand_distr::StandardNormal;
use tkrdigi_core::{Point3, TrackSegment};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Upper bound on clusters generated for one segment.
pub const MAX_CLUSTERS: usize = 15_000;

/// Mean energy to create one electron-hole pair in silicon, in eV.
pub const PAIR_ENERGY_EV: f64 = 3.6;

/// One ionization deposit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cluster {
    pub position: Point3,
    /// Charge in electron-hole pairs.
    pub charge: f64,
}

/// Cluster-count and charge model parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClustererConfig {
    /// Energy per electron-hole pair (eV).
    pub pair_energy_ev: f64,
    /// Mean number of primary ionizations in 400 um of silicon.
    pub hits_per_400um_mean: f64,
    /// Spread of the primary ionization count.
    pub hits_per_400um_rms: f64,
    /// Primary ionizations merged into one cluster.
    pub hits_per_cluster: f64,
    /// Scale factor on the cluster density.
    pub density_scale: f64,
    /// Cluster cap per segment.
    pub max_clusters: usize,
    /// Variance of the cluster charge relative to its mean.
    pub fano_factor: f64,
}

impl Default for ClustererConfig {
    fn default() -> Self {
        Self {
            pair_energy_ev: PAIR_ENERGY_EV,
            hits_per_400um_mean: 1664.0,
            hits_per_400um_rms: 44.0,
            hits_per_cluster: 100.0,
            density_scale: 1.0,
            max_clusters: MAX_CLUSTERS,
            fano_factor: 0.1,
        }
    }
}

impl ClustererConfig {
    /// Sets the cluster density scale factor.
    #[must_use]
    pub fn with_density_scale(mut self, scale: f64) -> Self {
        self.density_scale = scale;
        self
    }

    /// Sets the cluster cap.
    #[must_use]
    pub fn with_max_clusters(mut self, max_clusters: usize) -> Self {
        self.max_clusters = max_clusters;
        self
    }

    /// Sets the relative charge variance.
    #[must_use]
    pub fn with_fano_factor(mut self, fano_factor: f64) -> Self {
        self.fano_factor = fano_factor;
        self
    }

    /// Checks the parameters.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for non-positive conversion constants
    /// or a zero cluster cap.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("pair_energy_ev", self.pair_energy_ev),
            ("hits_per_400um_mean", self.hits_per_400um_mean),
            ("hits_per_cluster", self.hits_per_cluster),
            ("density_scale", self.density_scale),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::ConfigError(format!(
                    "clusterer {name} must be positive, got {value}"
                )));
            }
        }
        if !(self.hits_per_400um_rms >= 0.0 && self.fano_factor >= 0.0) {
            return Err(Error::ConfigError(
                "clusterer spreads must be non-negative".into(),
            ));
        }
        if self.max_clusters == 0 {
            return Err(Error::ConfigError("max_clusters must be at least 1".into()));
        }
        Ok(())
    }
}

/// Splits track segments into ionization clusters.
#[derive(Clone, Debug, Default)]
pub struct ChargeClusterer {
    config: ClustererConfig,
}

impl ChargeClusterer {
    #[must_use]
    pub fn new(config: ClustererConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ClustererConfig {
        &self.config
    }

    /// Electron-hole pairs produced by a deposit, rounded down.
    ///
    /// Deposits below one pair energy (3.6 eV by default) give zero pairs,
    /// so they yield no clusters even though the energy is positive.
    #[inline]
    #[must_use]
    pub fn pair_count(&self, energy_mev: f64) -> f64 {
        (energy_mev * 1e6 / self.config.pair_energy_ev).floor()
    }

    /// Clusters for a segment; see [`Self::generate_clusters`].
    pub fn generate<R: Rng + ?Sized>(&self, segment: &TrackSegment, rng: &mut R) -> Vec<Cluster> {
        self.generate_clusters(segment.entry, segment.exit, segment.energy_mev, rng)
    }

    /// Generates the clusters of one segment.
    ///
    /// Returns an empty vector when the deposit makes no whole pair (see
    /// [`Self::pair_count`]). Otherwise every
    /// cluster lies on the segment, and a zero-length segment yields a
    /// single cluster at the entry point.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn generate_clusters<R: Rng + ?Sized>(
        &self,
        entry: Point3,
        exit: Point3,
        energy_mev: f64,
        rng: &mut R,
    ) -> Vec<Cluster> {
        let pairs = self.pair_count(energy_mev);
        if pairs.is_nan() || pairs <= 0.0 {
            return Vec::new();
        }

        let length = entry.distance(&exit);
        let z: f64 = rng.sample(StandardNormal);
        let hits_per_400um = self.config.hits_per_400um_mean + z * self.config.hits_per_400um_rms;
        let per_mm = (hits_per_400um / 0.4) / self.config.hits_per_cluster;
        let expected = (length * per_mm * self.config.density_scale).ceil();
        let count = if expected.is_finite() && expected >= 1.0 {
            (expected as usize).min(self.config.max_clusters.max(1))
        } else {
            1
        };

        let mean_charge = pairs / count as f64;
        let sigma = (self.config.fano_factor * mean_charge).sqrt();
        (0..count)
            .map(|_| {
                let t: f64 = rng.random();
                let smear: f64 = rng.sample(StandardNormal);
                Cluster {
                    position: entry.lerp(&exit, t),
                    charge: (mean_charge + smear * sigma).max(0.0),
                }
            })
            .collect()
    }
}
