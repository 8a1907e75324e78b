//! tkrdigi-io: File formats for tkrdigi.
//!
//! - **Events** - truth hits per event, JSON
//! - **Configuration** - simulation settings, JSON with per-field defaults
//! - **Calibration** - global and per-channel front-end constants, JSON
//! - **Output** - digitized strips as CSV or JSON lines
//!

mod config;
mod error;
mod events;
mod writer;

pub use config::{
    calibration_from_json, config_from_json, load_calibration, load_config, save_config,
};
pub use error::{Error, Result};
pub use events::{parse_events, read_events, write_events, HitEvent};
pub use writer::{DigiWriter, OutputFormat, CSV_HEADER};
