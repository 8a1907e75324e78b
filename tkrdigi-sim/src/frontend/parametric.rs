//! Closed-form charge to ToT response.

use rand::Rng;
use rand_distr::StandardNormal;
use tkrdigi_core::ChannelConstants;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{FrontEnd, StripResponse};
use crate::{Error, Result};

/// Empirical front-end constants.
///
/// The ToT law is piecewise linear in the collected charge with a break
/// at `tot_breakpoint_fc`; the delay (time walk) is logarithmic in the
/// charge. Gains and thresholds come from the channel calibration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ParametricConfig {
    /// Statistical variance per collected electron.
    pub stat_factor: f64,
    /// Electronic noise (electrons rms).
    pub electronic_noise_electrons: f64,
    /// Charge per electron used by the fits (fC).
    pub fc_per_electron: f64,
    /// Amplifier output rail (mV).
    pub saturation_mv: f64,
    pub tot_breakpoint_fc: f64,
    /// ToT slope below the breakpoint (ns/fC).
    pub tot_low_slope: f64,
    /// ToT intercept below the breakpoint (ns).
    pub tot_low_intercept: f64,
    /// ToT slope above the breakpoint (ns/fC).
    pub tot_high_slope: f64,
    /// ToT intercept above the breakpoint (ns).
    pub tot_high_intercept: f64,
    /// Delay change per e-fold of charge (ns).
    pub delay_log_slope: f64,
    /// Delay at 1 fC (ns).
    pub delay_intercept: f64,
}

impl Default for ParametricConfig {
    fn default() -> Self {
        Self {
            stat_factor: 0.1,
            electronic_noise_electrons: 1500.0,
            fc_per_electron: 1.67e-4,
            saturation_mv: 1100.0,
            tot_breakpoint_fc: 40.0,
            tot_low_slope: 1828.4,
            tot_low_intercept: 1443.0,
            tot_high_slope: 328.67,
            tot_high_intercept: 60668.0,
            delay_log_slope: -90.945,
            delay_intercept: 743.51,
        }
    }
}

impl ParametricConfig {
    /// Sets the electronic noise.
    #[must_use]
    pub fn with_electronic_noise(mut self, electrons: f64) -> Self {
        self.electronic_noise_electrons = electrons;
        self
    }

    /// Sets the statistical variance factor.
    #[must_use]
    pub fn with_stat_factor(mut self, stat_factor: f64) -> Self {
        self.stat_factor = stat_factor;
        self
    }

    /// Checks the constants.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for negative noise terms or a
    /// non-positive conversion, rail or breakpoint.
    pub fn validate(&self) -> Result<()> {
        if !(self.stat_factor >= 0.0 && self.electronic_noise_electrons >= 0.0) {
            return Err(Error::ConfigError(
                "parametric noise terms must be non-negative".into(),
            ));
        }
        for (name, value) in [
            ("fc_per_electron", self.fc_per_electron),
            ("saturation_mv", self.saturation_mv),
            ("tot_breakpoint_fc", self.tot_breakpoint_fc),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::ConfigError(format!(
                    "parametric {name} must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Empirical front end.
#[derive(Clone, Debug, Default)]
pub struct ParametricResponse {
    config: ParametricConfig,
}

impl ParametricResponse {
    #[must_use]
    pub fn new(config: ParametricConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ParametricConfig {
        &self.config
    }

    /// Time over threshold for a collected charge (ns).
    #[must_use]
    pub fn tot_ns(&self, charge_fc: f64) -> f64 {
        let c = &self.config;
        if charge_fc < c.tot_breakpoint_fc {
            c.tot_low_slope * charge_fc + c.tot_low_intercept
        } else {
            c.tot_high_slope * charge_fc + c.tot_high_intercept
        }
    }

    /// Threshold crossing delay for a collected charge (ns), never negative.
    #[must_use]
    pub fn delay_ns(&self, charge_fc: f64) -> f64 {
        (self.config.delay_log_slope * charge_fc.ln() + self.config.delay_intercept).max(0.0)
    }

    /// Smeared charge (fC) and the amplitude it produces through the
    /// channel gain (mV, clamped at saturation), as `(charge_fc, voltage)`.
    fn amplitude<R: Rng + ?Sized>(
        &self,
        charge_electrons: f64,
        channel: &ChannelConstants,
        rng: &mut R,
    ) -> (f64, f64) {
        let c = &self.config;
        let stat: f64 = rng.sample(StandardNormal);
        let noise: f64 = rng.sample(StandardNormal);
        let electrons = charge_electrons
            + stat * (c.stat_factor * charge_electrons.max(0.0)).sqrt()
            + noise * c.electronic_noise_electrons;
        let charge_fc = electrons.max(0.0) * c.fc_per_electron;

        let gain_draw: f64 = rng.sample(StandardNormal);
        let gain = channel.gain_mv_per_fc + gain_draw * channel.gain_rms_mv_per_fc;
        let voltage = (charge_fc * gain).min(c.saturation_mv);
        (charge_fc, voltage)
    }
}

impl FrontEnd for ParametricResponse {
    fn name(&self) -> &'static str {
        "parametric"
    }

    fn respond<R: Rng + ?Sized>(
        &self,
        charge_electrons: f64,
        channel: &ChannelConstants,
        rng: &mut R,
    ) -> StripResponse {
        let (charge_fc, voltage) = self.amplitude(charge_electrons, channel, rng);
        if charge_fc <= 0.0 || voltage <= channel.threshold_mv {
            return StripResponse::silent(charge_fc);
        }
        let delay = self.delay_ns(charge_fc);
        StripResponse::fired(delay, delay + self.tot_ns(charge_fc), charge_fc)
    }
}
