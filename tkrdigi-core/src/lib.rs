//! tkrdigi-core: Core types for silicon-strip tracker digitization.
//!
//! This crate provides the shared vocabulary of the digitization chain:
//! plane geometry, tracker volume identifiers, truth-hit handles, per-strip
//! charge contributions, digitized strips and calibration constants.
//!

pub mod calibration;
pub mod digi;
pub mod error;
pub mod geometry;
pub mod hit;
pub mod strip;
pub mod volume;

pub use calibration::{Calibration, CalibrationTable, ChannelConstants, GlobalCalibration};
pub use digi::{DigitizedStrip, PlaneDigiMap, NO_TIME, TIME_BIN_NS};
pub use error::{Error, Result};
pub use geometry::{Point3, SiliconPlaneGeometry, StripGeometry};
pub use hit::{HitRef, RawHit, TrackSegment, TruthHit};
pub use strip::{Carrier, StripContribution, StripKey, CARRIER_COUNT};
pub use volume::{PlaneId, View, VolumeId, TOWERS_PER_ROW, VOLUME_ID_FIELDS};
