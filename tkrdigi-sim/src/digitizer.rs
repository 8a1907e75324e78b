//! Event-level digitization: the analog section (clusters, propagation,
//! accumulation) followed by the digital section (front end, trigger,
//! gate).

use std::collections::BTreeMap;

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tkrdigi_core::{
    Calibration, GlobalCalibration, HitRef, PlaneDigiMap, PlaneId, RawHit,
    SiliconPlaneGeometry, StripGeometry, TruthHit,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::accumulator::StripAccumulator;
use crate::charge_table::{ChargeTable, ChargeTableConfig};
use crate::clusterer::{ChargeClusterer, ClustererConfig};
use crate::frontend::{FrontEnd, FrontEndConfig, FrontEndModel};
use crate::noise::{NoiseConfig, NoiseGenerator, NoiseStats};
use crate::propagator::{ClusterPropagator, PropagationStats, PropagatorConfig};
use crate::threshold::{GateConfig, ThresholdDigitizer};
use crate::trigger::{StripTiming, TowerTriggers, TriggerConfig, TriggerEstimator};
use crate::Result;

const PLANE_SEED_SALT: u64 = 0x7D16_0000_0000_0000;
const DIGITAL_SEED_SALT: u64 = 0x0D16_17A1_0000_0000;
const NOISE_SEED_SALT: u64 = 0x0015_E000_0000_0000;

/// Configuration of the whole chain.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimulationConfig {
    pub geometry: SiliconPlaneGeometry,
    pub clusterer: ClustererConfig,
    pub table: ChargeTableConfig,
    pub propagator: PropagatorConfig,
    pub noise: NoiseConfig,
    pub front_end: FrontEndConfig,
    pub trigger: TriggerConfig,
    pub gate: GateConfig,
}

impl SimulationConfig {
    /// Checks every section.
    ///
    /// # Errors
    /// Returns the first section error found.
    pub fn validate(&self) -> Result<()> {
        self.geometry.validate()?;
        self.clusterer.validate()?;
        self.table.validate()?;
        self.propagator.validate()?;
        self.noise.validate()?;
        self.front_end.validate()?;
        self.trigger.validate()?;
        self.gate.validate()
    }
}

/// Read-only state shared by every event: geometry, charge table,
/// calibration and configuration.
pub struct SimulationContext {
    geometry: Box<dyn StripGeometry>,
    table: ChargeTable,
    calibration: Box<dyn Calibration>,
    config: SimulationConfig,
}

impl SimulationContext {
    /// Builds a context with the configured plane geometry and global
    /// calibration constants.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: SimulationConfig, table: ChargeTable) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            geometry: Box::new(config.geometry.clone()),
            table,
            calibration: Box::new(GlobalCalibration::default()),
            config,
        })
    }

    /// Replaces the geometry.
    #[must_use]
    pub fn with_geometry(mut self, geometry: Box<dyn StripGeometry>) -> Self {
        self.geometry = geometry;
        self
    }

    /// Replaces the calibration.
    #[must_use]
    pub fn with_calibration(mut self, calibration: Box<dyn Calibration>) -> Self {
        self.calibration = calibration;
        self
    }

    #[must_use]
    pub fn geometry(&self) -> &dyn StripGeometry {
        self.geometry.as_ref()
    }

    #[must_use]
    pub fn table(&self) -> &ChargeTable {
        &self.table
    }

    #[must_use]
    pub fn calibration(&self) -> &dyn Calibration {
        self.calibration.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
}

/// Per-event counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DigitizerStatistics {
    pub hits_processed: usize,
    /// Input hits rejected before simulation.
    pub hits_skipped: usize,
    pub propagation: PropagationStats,
    pub noise: NoiseStats,
    /// Strips that collected any charge.
    pub strips_with_charge: usize,
    /// Strips whose front end crossed threshold.
    pub strips_fired: usize,
    /// Strips in the output map.
    pub strips_output: usize,
    pub towers_triggered: usize,
}

impl DigitizerStatistics {
    /// Adds another set of counters.
    pub fn merge(&mut self, other: &Self) {
        self.hits_processed += other.hits_processed;
        self.hits_skipped += other.hits_skipped;
        self.propagation.merge(&other.propagation);
        self.noise.merge(&other.noise);
        self.strips_with_charge += other.strips_with_charge;
        self.strips_fired += other.strips_fired;
        self.strips_output += other.strips_output;
        self.towers_triggered += other.towers_triggered;
    }
}

/// Result of digitizing one event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventDigis {
    pub digis: PlaneDigiMap,
    pub triggers: TowerTriggers,
    pub statistics: DigitizerStatistics,
}

/// Runs the digitization chain over events.
pub struct Digitizer {
    context: SimulationContext,
    clusterer: ChargeClusterer,
    noise: NoiseGenerator,
    front_end: FrontEndModel,
    trigger: TriggerEstimator,
    gate: ThresholdDigitizer,
}

impl Digitizer {
    #[must_use]
    pub fn new(context: SimulationContext) -> Self {
        let config = context.config();
        let clusterer = ChargeClusterer::new(config.clusterer.clone());
        let noise = NoiseGenerator::new(config.noise.clone(), config.clusterer.pair_energy_ev);
        let front_end = FrontEndModel::from_config(&config.front_end);
        let trigger = TriggerEstimator::new(config.trigger.clone());
        let gate = ThresholdDigitizer::new(config.gate.clone());
        debug!("digitizer ready with {} front end", front_end.name());
        Self {
            context,
            clusterer,
            noise,
            front_end,
            trigger,
            gate,
        }
    }

    #[must_use]
    pub fn context(&self) -> &SimulationContext {
        &self.context
    }

    fn propagator(&self) -> ClusterPropagator<'_> {
        ClusterPropagator::new(
            self.context.geometry(),
            self.context.table(),
            &self.context.config().propagator,
        )
    }

    /// Analog section for one hit: clusters the deposit and adds its strip
    /// charge to the accumulator.
    pub fn clusterize_hit<R: Rng + ?Sized>(
        &self,
        hit: &TruthHit,
        accumulator: &mut StripAccumulator,
        rng: &mut R,
    ) -> PropagationStats {
        let segment = hit.plane_segment(self.context.geometry());
        let clusters = self.clusterer.generate(&segment, rng);
        self.propagator()
            .propagate(&clusters, hit.plane(), hit.hit_ref, accumulator, rng)
    }

    /// Readout noise on the accumulated charge. Does nothing unless enabled
    /// in the configuration.
    pub fn add_noise<R: Rng + ?Sized>(
        &self,
        accumulator: &mut StripAccumulator,
        rng: &mut R,
    ) -> NoiseStats {
        self.noise
            .apply(accumulator, self.context.geometry().strip_count(), rng)
    }

    /// Front-end response of every strip with charge.
    pub fn strip_timings<R: Rng + ?Sized>(
        &self,
        accumulator: &StripAccumulator,
        rng: &mut R,
    ) -> Vec<StripTiming> {
        let calibration = self.context.calibration();
        accumulator
            .iter()
            .map(|contribution| {
                let channel = calibration.channel(&contribution.key);
                let response = self
                    .front_end
                    .respond(contribution.total_charge(), &channel, rng);
                StripTiming::new(contribution.key, response, contribution.hits.clone())
            })
            .collect()
    }

    /// Digital section: front end, trigger estimation and gate.
    pub fn digitize<R: Rng + ?Sized>(
        &self,
        accumulator: &StripAccumulator,
        rng: &mut R,
    ) -> EventDigis {
        let timings = self.strip_timings(accumulator, rng);
        let triggers = self.trigger.estimate(&timings);
        let digis = self.gate.select_fired_strips(&timings, &triggers);

        let statistics = DigitizerStatistics {
            strips_with_charge: accumulator.len(),
            strips_fired: timings.iter().filter(|t| t.response.fired).count(),
            strips_output: digis.strip_count(),
            towers_triggered: triggers.iter().filter(|&(_, &t)| t > 0.0).count(),
            ..DigitizerStatistics::default()
        };
        EventDigis {
            digis,
            triggers,
            statistics,
        }
    }

    /// Digitizes one event with a single random stream.
    pub fn process_event<R: Rng + ?Sized>(&self, hits: &[TruthHit], rng: &mut R) -> EventDigis {
        let mut accumulator = StripAccumulator::new();
        let mut propagation = PropagationStats::default();
        for hit in hits {
            propagation.merge(&self.clusterize_hit(hit, &mut accumulator, rng));
        }
        let noise = self.add_noise(&mut accumulator, rng);

        let mut event = self.digitize(&accumulator, rng);
        event.statistics.hits_processed = hits.len();
        event.statistics.propagation = propagation;
        event.statistics.noise = noise;
        event
    }

    /// Digitizes one event of unchecked hits. Hits with an invalid volume
    /// identifier or non-finite values are skipped with a warning. Each
    /// hit's reference is its index in `hits`.
    pub fn process_raw_event<R: Rng + ?Sized>(&self, hits: &[RawHit], rng: &mut R) -> EventDigis {
        let resolved = resolve_hits(hits);
        let skipped = hits.len() - resolved.len();
        let mut event = self.process_event(&resolved, rng);
        event.statistics.hits_skipped = skipped;
        event
    }

    /// Digitizes one event with one rayon task per plane.
    ///
    /// Each plane draws from its own generator seeded from `seed` and the
    /// plane, and simulates its hits in [`HitRef`] order, so the output
    /// depends only on the hits and the seed.
    #[must_use]
    pub fn process_event_parallel(&self, hits: &[TruthHit], seed: u64) -> EventDigis {
        let mut by_plane: BTreeMap<PlaneId, Vec<&TruthHit>> = BTreeMap::new();
        for hit in hits {
            by_plane.entry(hit.plane()).or_default().push(hit);
        }
        for plane_hits in by_plane.values_mut() {
            plane_hits.sort_by_key(|hit| hit.hit_ref);
        }
        let planes: Vec<(PlaneId, Vec<&TruthHit>)> = by_plane.into_iter().collect();

        let partials: Vec<(StripAccumulator, PropagationStats)> = planes
            .par_iter()
            .map(|(plane, plane_hits)| {
                let mut rng = StdRng::seed_from_u64(plane_seed(seed, *plane));
                let mut accumulator = StripAccumulator::new();
                let mut stats = PropagationStats::default();
                for hit in plane_hits {
                    stats.merge(&self.clusterize_hit(hit, &mut accumulator, &mut rng));
                }
                (accumulator, stats)
            })
            .collect();

        let mut accumulator = StripAccumulator::new();
        let mut propagation = PropagationStats::default();
        for (partial, stats) in partials {
            accumulator.absorb(partial);
            propagation.merge(&stats);
        }
        let mut noise_rng = StdRng::seed_from_u64(seed ^ NOISE_SEED_SALT);
        let noise = self.add_noise(&mut accumulator, &mut noise_rng);

        let mut rng = StdRng::seed_from_u64(seed ^ DIGITAL_SEED_SALT);
        let mut event = self.digitize(&accumulator, &mut rng);
        event.statistics.hits_processed = hits.len();
        event.statistics.propagation = propagation;
        event.statistics.noise = noise;
        event
    }
}

/// Resolves raw hits, dropping the invalid ones.
#[must_use]
pub fn resolve_hits(hits: &[RawHit]) -> Vec<TruthHit> {
    hits.iter()
        .enumerate()
        .filter_map(|(index, raw)| {
            let Ok(index) = u32::try_from(index) else {
                warn!("hit index {index} exceeds the hit reference range, skipped");
                return None;
            };
            match raw.resolve(HitRef(index)) {
                Ok(hit) => Some(hit),
                Err(e) => {
                    warn!("skipping hit {index}: {e}");
                    None
                }
            }
        })
        .collect()
}

fn plane_seed(seed: u64, plane: PlaneId) -> u64 {
    let code = (u64::from(plane.tower) << 24)
        | (u64::from(plane.layer) << 8)
        | u64::from(plane.view.index());
    seed ^ PLANE_SEED_SALT ^ code
}
