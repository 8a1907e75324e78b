//! Front-end calibration constants.
//!
//! The parametric front end needs a gain and a firing threshold for every
//! channel. A [`Calibration`] provides them; [`GlobalCalibration`] gives
//! every channel the same values and [`CalibrationTable`] overrides
//! individual channels.

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::strip::StripKey;
use crate::{Error, Result};

/// Calibration constants of one readout channel.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChannelConstants {
    /// Mean amplifier gain in mV/fC.
    pub gain_mv_per_fc: f64,
    /// Channel-to-channel gain spread in mV/fC.
    pub gain_rms_mv_per_fc: f64,
    /// Firing threshold in mV.
    pub threshold_mv: f64,
}

impl Default for ChannelConstants {
    fn default() -> Self {
        Self {
            gain_mv_per_fc: 100.0,
            gain_rms_mv_per_fc: 6.0,
            threshold_mv: 125.0,
        }
    }
}

impl ChannelConstants {
    /// Sets the mean gain.
    #[must_use]
    pub fn with_gain(mut self, gain_mv_per_fc: f64) -> Self {
        self.gain_mv_per_fc = gain_mv_per_fc;
        self
    }

    /// Sets the gain spread.
    #[must_use]
    pub fn with_gain_rms(mut self, gain_rms_mv_per_fc: f64) -> Self {
        self.gain_rms_mv_per_fc = gain_rms_mv_per_fc;
        self
    }

    /// Sets the firing threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold_mv: f64) -> Self {
        self.threshold_mv = threshold_mv;
        self
    }

    /// Checks the constants are physical.
    ///
    /// # Errors
    /// Returns [`Error::CalibrationError`] for a non-positive gain or a
    /// negative spread or threshold.
    pub fn validate(&self) -> Result<()> {
        if !(self.gain_mv_per_fc.is_finite() && self.gain_mv_per_fc > 0.0) {
            return Err(Error::CalibrationError(format!(
                "gain must be positive, got {}",
                self.gain_mv_per_fc
            )));
        }
        if !(self.gain_rms_mv_per_fc.is_finite() && self.gain_rms_mv_per_fc >= 0.0) {
            return Err(Error::CalibrationError(format!(
                "gain spread must be non-negative, got {}",
                self.gain_rms_mv_per_fc
            )));
        }
        if !(self.threshold_mv.is_finite() && self.threshold_mv >= 0.0) {
            return Err(Error::CalibrationError(format!(
                "threshold must be non-negative, got {}",
                self.threshold_mv
            )));
        }
        Ok(())
    }
}

/// Source of per-channel calibration constants.
pub trait Calibration: Send + Sync {
    /// Constants for one channel.
    fn channel(&self, key: &StripKey) -> ChannelConstants;
}

/// The same constants for every channel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GlobalCalibration {
    pub constants: ChannelConstants,
}

impl GlobalCalibration {
    #[must_use]
    pub fn new(constants: ChannelConstants) -> Self {
        Self { constants }
    }
}

impl Calibration for GlobalCalibration {
    #[inline]
    fn channel(&self, _key: &StripKey) -> ChannelConstants {
        self.constants
    }
}

/// Global defaults with per-channel overrides.
#[derive(Debug, Clone, Default)]
pub struct CalibrationTable {
    defaults: ChannelConstants,
    channels: HashMap<StripKey, ChannelConstants>,
}

impl CalibrationTable {
    #[must_use]
    pub fn new(defaults: ChannelConstants) -> Self {
        Self {
            defaults,
            channels: HashMap::new(),
        }
    }

    /// Overrides one channel.
    ///
    /// # Errors
    /// Returns [`Error::CalibrationError`] if the constants are not physical.
    pub fn insert(&mut self, key: StripKey, constants: ChannelConstants) -> Result<()> {
        constants.validate()?;
        self.channels.insert(key, constants);
        Ok(())
    }

    /// Defaults for channels without an override.
    #[must_use]
    pub fn defaults(&self) -> &ChannelConstants {
        &self.defaults
    }

    /// Number of overridden channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Calibration for CalibrationTable {
    fn channel(&self, key: &StripKey) -> ChannelConstants {
        self.channels.get(key).copied().unwrap_or(self.defaults)
    }
}
