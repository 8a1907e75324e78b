//! Propagation of cluster charge onto readout strips.
//!
//! Each cluster is resolved to its nearest strip. For both carrier species
//! an optional lateral diffusion displacement is drawn, the strip is
//! re-resolved, and the charge table spreads the carrier's share over the
//! strip and up to two neighbours on each side, never across a front-end
//! group boundary.

use log::debug;
use rand::Rng;
use rand_distr::StandardNormal;
use tkrdigi_core::{Carrier, HitRef, PlaneId, StripGeometry, StripKey};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::accumulator::StripAccumulator;
use crate::charge_table::{ChargeTable, NEIGHBOUR_REACH};
use crate::clusterer::Cluster;
use crate::{Error, Result};

/// Default bound on redraws of a diffusion displacement.
pub const MAX_DIFFUSION_RETRIES: u32 = 16;

/// Carrier diffusion parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PropagatorConfig {
    /// Apply lateral carrier diffusion.
    pub diffusion: bool,
    /// Lateral spread of drifting holes (mm).
    pub hole_sigma_mm: f64,
    /// Lateral spread of drifting electrons (mm).
    pub electron_sigma_mm: f64,
    /// Redraws allowed when a displacement lands off the active area.
    pub max_retries: u32,
}

impl Default for PropagatorConfig {
    fn default() -> Self {
        Self {
            diffusion: true,
            hole_sigma_mm: 0.006,
            electron_sigma_mm: 0.010,
            max_retries: MAX_DIFFUSION_RETRIES,
        }
    }
}

impl PropagatorConfig {
    /// Enables or disables carrier diffusion.
    #[must_use]
    pub fn with_diffusion(mut self, diffusion: bool) -> Self {
        self.diffusion = diffusion;
        self
    }

    /// Sets both diffusion widths.
    #[must_use]
    pub fn with_sigmas(mut self, hole_sigma_mm: f64, electron_sigma_mm: f64) -> Self {
        self.hole_sigma_mm = hole_sigma_mm;
        self.electron_sigma_mm = electron_sigma_mm;
        self
    }

    /// Sets the redraw bound.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Diffusion width of one carrier.
    #[must_use]
    pub fn sigma(&self, carrier: Carrier) -> f64 {
        match carrier {
            Carrier::Hole => self.hole_sigma_mm,
            Carrier::Electron => self.electron_sigma_mm,
        }
    }

    /// Checks the parameters.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for negative or non-finite widths.
    pub fn validate(&self) -> Result<()> {
        for carrier in Carrier::ALL {
            let sigma = self.sigma(carrier);
            if !(sigma.is_finite() && sigma >= 0.0) {
                return Err(Error::ConfigError(format!(
                    "{carrier:?} diffusion width must be non-negative, got {sigma}"
                )));
            }
        }
        Ok(())
    }
}

/// Counters from propagating clusters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PropagationStats {
    pub clusters_processed: usize,
    /// Clusters whose position maps to no strip.
    pub clusters_off_detector: usize,
    /// Carriers whose diffusion never landed on a strip.
    pub carriers_dropped: usize,
    /// Carriers outside the charge table envelope.
    pub carriers_outside_table: usize,
    /// Strip deposits added to the accumulator.
    pub deposits: usize,
}

impl PropagationStats {
    /// Adds another set of counters.
    pub fn merge(&mut self, other: &Self) {
        self.clusters_processed += other.clusters_processed;
        self.clusters_off_detector += other.clusters_off_detector;
        self.carriers_dropped += other.carriers_dropped;
        self.carriers_outside_table += other.carriers_outside_table;
        self.deposits += other.deposits;
    }
}

/// Spreads cluster charge onto strips through the charge table.
pub struct ClusterPropagator<'a> {
    geometry: &'a dyn StripGeometry,
    table: &'a ChargeTable,
    config: &'a PropagatorConfig,
}

impl<'a> ClusterPropagator<'a> {
    #[must_use]
    pub fn new(
        geometry: &'a dyn StripGeometry,
        table: &'a ChargeTable,
        config: &'a PropagatorConfig,
    ) -> Self {
        Self {
            geometry,
            table,
            config,
        }
    }

    /// Propagates the clusters of one truth hit into the accumulator.
    pub fn propagate<R: Rng + ?Sized>(
        &self,
        clusters: &[Cluster],
        plane: PlaneId,
        hit: HitRef,
        accumulator: &mut StripAccumulator,
        rng: &mut R,
    ) -> PropagationStats {
        let mut stats = PropagationStats::default();
        let half_thickness = 0.5 * self.geometry.thickness();

        for cluster in clusters {
            stats.clusters_processed += 1;
            let x = cluster.position.x;
            let Some(nearest) = self.geometry.strip_index_of(x) else {
                stats.clusters_off_detector += 1;
                debug!("{plane}: cluster at x = {x:.4} mm is off the active area");
                continue;
            };
            let depth = cluster.position.z + half_thickness;

            for carrier in Carrier::ALL {
                let Some((x_drift, strip)) = self.resolve_carrier(x, nearest, carrier, rng) else {
                    stats.carriers_dropped += 1;
                    debug!("{plane}: {carrier:?} share of cluster at x = {x:.4} mm dropped");
                    continue;
                };
                let along = x_drift - self.geometry.center_of(strip);
                let Some(fractions) = self.table.lookup(along, depth) else {
                    stats.carriers_outside_table += 1;
                    continue;
                };

                for offset in -NEIGHBOUR_REACH..=NEIGHBOUR_REACH {
                    let Some(target) = self.neighbour(strip, offset) else {
                        continue;
                    };
                    let fraction = fractions.fraction(carrier, offset);
                    if fraction == 0.0 {
                        continue;
                    }
                    accumulator.add(
                        StripKey::new(plane, target),
                        carrier,
                        cluster.charge * fraction,
                        hit,
                    );
                    stats.deposits += 1;
                }
            }
        }
        stats
    }

    /// Drifted position and strip of one carrier, or `None` if no
    /// displacement within the retry bound lands on a strip.
    fn resolve_carrier<R: Rng + ?Sized>(
        &self,
        x: f64,
        nearest: u32,
        carrier: Carrier,
        rng: &mut R,
    ) -> Option<(f64, u32)> {
        let sigma = self.config.sigma(carrier);
        if !self.config.diffusion || sigma == 0.0 {
            return Some((x, nearest));
        }
        for _ in 0..=self.config.max_retries {
            let z: f64 = rng.sample(StandardNormal);
            let radius = (z * sigma).abs();
            let sign = if rng.random::<bool>() { 1.0 } else { -1.0 };
            let drifted = x + sign * radius;
            if let Some(strip) = self.geometry.strip_index_of(drifted) {
                return Some((drifted, strip));
            }
        }
        None
    }

    /// Strip at `offset` from `strip` if it exists and shares its group.
    fn neighbour(&self, strip: u32, offset: i32) -> Option<u32> {
        let target = strip.checked_add_signed(offset)?;
        (target < self.geometry.strip_count()
            && self.geometry.group_of(target) == self.geometry.group_of(strip))
        .then_some(target)
    }
}
