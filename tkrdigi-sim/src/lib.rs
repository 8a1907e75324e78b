//! tkrdigi-sim: Digitization chain for silicon-strip tracker planes.
//!
//! Stages, in event order:
//! - **Clustering** - deposits are split into charge clusters along the track
//! - **Propagation** - cluster charge is spread over strips through a charge table
//! - **Accumulation** - per-strip charge and hit provenance for the event
//! - **Noise** - optional electronic noise, noise strips and noise threshold
//! - **Front end** - RC-network or parametric response, giving a ToT window
//! - **Trigger and gate** - per-tower trigger time and acquisition gate
//!
//! [`Digitizer`] runs the whole chain against a read-only
//! [`SimulationContext`].

mod accumulator;
mod charge_table;
mod clusterer;
mod digitizer;
mod error;
pub mod frontend;
mod noise;
mod propagator;
mod threshold;
mod trigger;

pub use accumulator::StripAccumulator;
pub use charge_table::{
    ChargeTable, ChargeTableConfig, ChargeVector, LookupMode, TableStatistics, CHARGE_VECTOR_LEN,
    NEIGHBOUR_REACH, NEIGHBOUR_SPAN,
};
pub use clusterer::{ChargeClusterer, Cluster, ClustererConfig, MAX_CLUSTERS, PAIR_ENERGY_EV};
pub use digitizer::{
    resolve_hits, Digitizer, DigitizerStatistics, EventDigis, SimulationConfig, SimulationContext,
};
pub use error::{Error, Result};
pub use frontend::{
    FrontEnd, FrontEndConfig, FrontEndKind, FrontEndModel, ParametricConfig, ParametricResponse,
    RcNetworkConfig, RcNetworkSimulator, StripResponse,
};
pub use noise::{NoiseConfig, NoiseGenerator, NoiseStats};
pub use propagator::{
    ClusterPropagator, PropagationStats, PropagatorConfig, MAX_DIFFUSION_RETRIES,
};
pub use threshold::{GateConfig, GatePolicy, ThresholdDigitizer, CHARGE_TO_ENERGY_MEV_PER_FC};
pub use trigger::{StripTiming, TowerTriggers, TriggerConfig, TriggerEstimator, TriggerMode};

// Re-export the core data model
pub use tkrdigi_core::{
    Calibration, CalibrationTable, ChannelConstants, DigitizedStrip, GlobalCalibration,
    PlaneDigiMap, PlaneId, RawHit, SiliconPlaneGeometry, StripGeometry, TruthHit, View, VolumeId,
};
