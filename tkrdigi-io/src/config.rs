//! Simulation configuration and channel calibration files.
//!
//! Both are JSON. Every field is optional and falls back to its default,
//! so a file only needs the values it changes:
//!
//! ```json
//! {
//!   "front_end": { "model": "rc_network" },
//!   "trigger": { "mode": "three_in_a_row" }
//! }
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};
use tkrdigi_core::{CalibrationTable, ChannelConstants, PlaneId, StripKey, View};
use tkrdigi_sim::SimulationConfig;

use crate::{Error, Result};

/// Loads and validates a simulation configuration.
///
/// # Errors
/// Returns an error if the file cannot be read, is not valid JSON, or holds
/// an invalid configuration.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SimulationConfig> {
    let path = path.as_ref();
    let file = File::open(path).map_err(Error::file(path))?;
    let reader = BufReader::new(file);
    let config: SimulationConfig = serde_json::from_reader(reader)?;
    config.validate()?;
    info!("loaded configuration from {}", path.display());
    Ok(config)
}

/// Parses and validates a simulation configuration.
///
/// # Errors
/// Returns an error for invalid JSON or an invalid configuration.
pub fn config_from_json(json: &str) -> Result<SimulationConfig> {
    let config: SimulationConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

/// Writes a configuration as pretty-printed JSON.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn save_config<P: AsRef<Path>>(config: &SimulationConfig, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(Error::file(path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, config)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

// JSON calibration layout

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct JsonCalibration {
    defaults: JsonChannel,
    channels: Vec<JsonChannelOverride>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct JsonChannel {
    gain: Option<f64>,
    gain_rms: Option<f64>,
    threshold_mv: Option<f64>,
}

impl JsonChannel {
    fn apply(&self, base: ChannelConstants) -> ChannelConstants {
        let mut constants = base;
        if let Some(gain) = self.gain {
            constants = constants.with_gain(gain);
        }
        if let Some(rms) = self.gain_rms {
            constants = constants.with_gain_rms(rms);
        }
        if let Some(threshold) = self.threshold_mv {
            constants = constants.with_threshold(threshold);
        }
        constants
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct JsonChannelOverride {
    tower: u16,
    layer: u16,
    /// 0 for X, 1 for Y.
    view: u16,
    strip: u32,
    #[serde(flatten)]
    constants: JsonChannel,
}

/// Loads a channel calibration.
///
/// The file holds global `defaults` and a list of per-channel overrides
/// identified by tower, layer, view and strip. Fields missing from an
/// override keep the global value.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed, names an unknown
/// view, or holds unphysical constants.
pub fn load_calibration<P: AsRef<Path>>(path: P) -> Result<CalibrationTable> {
    let path = path.as_ref();
    let file = File::open(path).map_err(Error::file(path))?;
    let reader = BufReader::new(file);
    let json: JsonCalibration = serde_json::from_reader(reader)?;
    let table = calibration_from_json_config(&json)?;
    info!(
        "loaded calibration from {} ({} channel overrides)",
        path.display(),
        table.len()
    );
    Ok(table)
}

/// Parses a channel calibration.
///
/// # Errors
/// Same as [`load_calibration`], without the file access.
pub fn calibration_from_json(json: &str) -> Result<CalibrationTable> {
    let json: JsonCalibration = serde_json::from_str(json)?;
    calibration_from_json_config(&json)
}

fn calibration_from_json_config(json: &JsonCalibration) -> Result<CalibrationTable> {
    let defaults = json.defaults.apply(ChannelConstants::default());
    defaults.validate()?;
    let mut table = CalibrationTable::new(defaults);

    for entry in &json.channels {
        let view = View::from_index(entry.view).ok_or_else(|| {
            Error::InvalidFormat(format!(
                "calibration view must be 0 or 1, got {}",
                entry.view
            ))
        })?;
        let key = StripKey::new(PlaneId::new(entry.tower, entry.layer, view), entry.strip);
        table.insert(key, entry.constants.apply(defaults))?;
    }
    Ok(table)
}
