//! Analog front-end models.
//!
//! A front end turns the charge collected on one strip into a firing
//! decision and a ToT window: the delay from the event to the threshold
//! crossing and the time the signal falls back below threshold.
//!
//! Two models are provided:
//! - [`RcNetworkSimulator`] integrates the preamplifier and shaper circuit
//!   sample by sample, with shot noise.
//! - [`ParametricResponse`] maps charge to ToT through empirical fits.

mod parametric;
mod rc_network;

pub use parametric::{ParametricConfig, ParametricResponse};
pub use rc_network::{
    AnalogWaveform, RcNetworkConfig, RcNetworkSimulator, INPUT_SAMPLES, MIN_SHAPER_CHARGE_FC,
    WAVEFORM_SAMPLES,
};

use rand::Rng;
use tkrdigi_core::ChannelConstants;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Result;

/// Elementary charge in fC.
pub const ELECTRON_CHARGE_FC: f64 = 1.602_176_634e-4;

/// Front-end output for one strip.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StripResponse {
    /// Signal crossed the firing threshold.
    pub fired: bool,
    /// Threshold crossing time after the event (ns), or -1.
    pub delay_ns: f64,
    /// Time the signal fell below threshold (ns), or -1.
    pub stop_ns: f64,
    /// Collected charge in fC.
    pub charge_fc: f64,
}

impl StripResponse {
    /// A strip that did not fire.
    #[must_use]
    pub fn silent(charge_fc: f64) -> Self {
        Self {
            fired: false,
            delay_ns: -1.0,
            stop_ns: -1.0,
            charge_fc,
        }
    }

    /// A fired strip.
    #[must_use]
    pub fn fired(delay_ns: f64, stop_ns: f64, charge_fc: f64) -> Self {
        Self {
            fired: true,
            delay_ns,
            stop_ns,
            charge_fc,
        }
    }

    /// Time over threshold (ns), or -1 for a silent strip.
    #[must_use]
    pub fn tot_ns(&self) -> f64 {
        if self.fired {
            self.stop_ns - self.delay_ns
        } else {
            -1.0
        }
    }
}

/// Trait for front-end models.
pub trait FrontEnd {
    /// Model name for logs.
    fn name(&self) -> &'static str;

    /// Response of one strip to `charge_electrons` of collected charge.
    fn respond<R: Rng + ?Sized>(
        &self,
        charge_electrons: f64,
        channel: &ChannelConstants,
        rng: &mut R,
    ) -> StripResponse;
}

/// Which front-end model to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FrontEndKind {
    #[default]
    Parametric,
    RcNetwork,
}

/// Front-end selection and the parameters of both models.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FrontEndConfig {
    pub model: FrontEndKind,
    pub parametric: ParametricConfig,
    pub rc_network: RcNetworkConfig,
}

impl FrontEndConfig {
    /// Selects the model.
    #[must_use]
    pub fn with_model(mut self, model: FrontEndKind) -> Self {
        self.model = model;
        self
    }

    /// Checks the selected model's parameters.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConfigError`] for unphysical parameters.
    pub fn validate(&self) -> Result<()> {
        match self.model {
            FrontEndKind::Parametric => self.parametric.validate(),
            FrontEndKind::RcNetwork => self.rc_network.validate(),
        }
    }
}

/// Configured front-end model.
#[derive(Clone, Debug)]
pub enum FrontEndModel {
    Parametric(ParametricResponse),
    RcNetwork(RcNetworkSimulator),
}

impl FrontEndModel {
    /// Builds the model selected by the configuration.
    #[must_use]
    pub fn from_config(config: &FrontEndConfig) -> Self {
        match config.model {
            FrontEndKind::Parametric => {
                Self::Parametric(ParametricResponse::new(config.parametric.clone()))
            }
            FrontEndKind::RcNetwork => {
                Self::RcNetwork(RcNetworkSimulator::new(config.rc_network.clone()))
            }
        }
    }
}

impl FrontEnd for FrontEndModel {
    fn name(&self) -> &'static str {
        match self {
            Self::Parametric(model) => model.name(),
            Self::RcNetwork(model) => model.name(),
        }
    }

    fn respond<R: Rng + ?Sized>(
        &self,
        charge_electrons: f64,
        channel: &ChannelConstants,
        rng: &mut R,
    ) -> StripResponse {
        match self {
            Self::Parametric(model) => model.respond(charge_electrons, channel, rng),
            Self::RcNetwork(model) => model.respond(charge_electrons, channel, rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_tot() {
        assert_eq!(StripResponse::fired(100.0, 350.0, 5.0).tot_ns(), 250.0);
        assert_eq!(StripResponse::silent(0.1).tot_ns(), -1.0);
    }

    #[test]
    fn test_model_selection() {
        let config = FrontEndConfig::default();
        assert_eq!(FrontEndModel::from_config(&config).name(), "parametric");
        let config = config.with_model(FrontEndKind::RcNetwork);
        assert_eq!(FrontEndModel::from_config(&config).name(), "rc_network");
    }
}
