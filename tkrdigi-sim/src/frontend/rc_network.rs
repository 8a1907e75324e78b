//! Time-domain simulation of the strip readout circuit.
//!
//! The induced current (1 ns samples, in µA) drives a charge preamplifier
//! modelled as a second-order RC network. Its output is resampled at 10 ns
//! and fed to a CR-RC shaper whose feedback resistor scales with the total
//! input charge. The shaped waveform is scanned against a per-strip
//! threshold to give the ToT window.

use log::trace;
use rand::Rng;
use rand_distr::{Exp1, StandardNormal};
use tkrdigi_core::ChannelConstants;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{FrontEnd, StripResponse, ELECTRON_CHARGE_FC};
use crate::{Error, Result};

/// Samples in the preamplifier and shaper buffers.
pub const WAVEFORM_SAMPLES: usize = 10_000;

/// Samples of induced current accepted per strip (1 ns each).
pub const INPUT_SAMPLES: usize = 100;

/// Floor on the shaper charge, keeps the feedback resistor non-zero.
pub const MIN_SHAPER_CHARGE_FC: f64 = 1.0e-3;

const PREAMP_STEP_S: f64 = 1.0e-9;
const SHAPER_STEP_S: f64 = 10.0e-9;
const SHAPER_STEP_NS: f64 = 10.0;
/// Preamp samples per shaper sample.
const RESAMPLE_FACTOR: usize = 10;

// Preamplifier
const R_IN: f64 = 2.0e11;
const C_IN: f64 = 1.07e-11;
const R_F: f64 = 1.0e10;
const C_F: f64 = 0.92e-13;
const GM_LINEAR: f64 = 7.0e-4;
const GM_SATURATED: f64 = 5.2e-3;
const R_LOAD: f64 = 4.0e8;
const C_LOAD: f64 = 1.5e-13;
/// Output level above which the input stage leaves its linear regime.
const PREAMP_KINK: f64 = 0.325;

// Shaper
const C_IS: f64 = 1.5e-12;
const R_FS_PER_FC: f64 = 20.2e6;
const C_FS: f64 = 0.9e-13;
const GM_S: f64 = 7.0e-4;
const R_CS: f64 = 6.0e10;
const C_CS: f64 = 8.0e-11;

// Parallel (shot) noise
const SHOT_RATE_HZ: f64 = 2.0e7;
const SHOT_SPECTRAL_DENSITY: f64 = 2.28e-28;
const SHOT_SCALE: f64 = 30.0;
const SHOT_WINDOW_S: f64 = 1.0e-5;

/// Scan value per threshold unit.
const WAVEFORM_PER_THRESHOLD_UNIT: f64 = 1000.0;

/// RC-network front-end settings.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RcNetworkConfig {
    /// Add Poisson shot noise to the input current.
    pub shot_noise: bool,
    /// Duration of the rectangular charge pulse (ns).
    pub collection_time_ns: f64,
    pub threshold_mean: f64,
    pub threshold_rms: f64,
    pub fc_per_electron: f64,
}

impl Default for RcNetworkConfig {
    fn default() -> Self {
        Self {
            shot_noise: true,
            collection_time_ns: 10.0,
            threshold_mean: 160.0,
            threshold_rms: 7.0,
            fc_per_electron: ELECTRON_CHARGE_FC,
        }
    }
}

impl RcNetworkConfig {
    #[must_use]
    pub fn with_shot_noise(mut self, enabled: bool) -> Self {
        self.shot_noise = enabled;
        self
    }

    #[must_use]
    pub fn with_threshold(mut self, mean: f64, rms: f64) -> Self {
        self.threshold_mean = mean;
        self.threshold_rms = rms;
        self
    }

    /// Checks the settings.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if the pulse does not fit the input
    /// window or a threshold or conversion is unphysical.
    pub fn validate(&self) -> Result<()> {
        #[allow(clippy::cast_precision_loss)]
        let window = INPUT_SAMPLES as f64;
        if !(self.collection_time_ns >= 1.0 && self.collection_time_ns <= window) {
            return Err(Error::ConfigError(format!(
                "collection time must be within 1..={window} ns, got {}",
                self.collection_time_ns
            )));
        }
        if !(self.threshold_rms >= 0.0 && self.threshold_mean.is_finite()) {
            return Err(Error::ConfigError(
                "RC threshold must be finite with non-negative rms".into(),
            ));
        }
        if !(self.fc_per_electron > 0.0 && self.fc_per_electron.is_finite()) {
            return Err(Error::ConfigError(
                "fc_per_electron must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Shaped output waveform.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalogWaveform {
    pub samples: Vec<f64>,
    pub step_ns: f64,
}

impl AnalogWaveform {
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Largest sample, or 0 for an empty waveform.
    #[must_use]
    pub fn peak(&self) -> f64 {
        self.samples.iter().copied().fold(0.0, f64::max)
    }

    /// First contiguous run above `threshold` as `(first, last)` sample
    /// indices, where `last` is the first sample back below. A signal
    /// still above threshold at the end of the buffer reports `len + 1`.
    #[must_use]
    pub fn time_over_threshold(&self, threshold: f64) -> Option<(usize, usize)> {
        let above = |v: f64| v / WAVEFORM_PER_THRESHOLD_UNIT > threshold;
        let first = self.samples.iter().position(|&v| above(v))?;
        let last = self.samples[first..]
            .iter()
            .position(|&v| !above(v))
            .map_or(self.samples.len() + 1, |offset| first + offset);
        Some((first, last))
    }
}

/// Second-order difference-equation coefficients.
#[derive(Clone, Copy, Debug)]
struct Coefficients {
    nu: f64,
    a1: f64,
    a2: f64,
}

impl Coefficients {
    fn preamp(gm: f64) -> Self {
        let av = R_LOAD * gm;
        let tau = R_LOAD * C_LOAD;
        let d = R_IN * (av + 1.0) + R_F;
        Self {
            nu: av * R_IN * R_F / d,
            a1: R_IN * R_F * (C_IN + C_F) * tau / d,
            a2: (R_IN * R_F * (C_IN + (av + 1.0) * C_F) + (R_IN + R_F) * tau) / d,
        }
    }

    fn shaper(charge_fc: f64) -> Self {
        let rfs = R_FS_PER_FC * charge_fc;
        let avs = R_CS * GM_S;
        let taus = R_CS * C_CS;
        Self {
            nu: C_IS * rfs * avs / (avs + 1.0),
            a1: taus * rfs * (C_FS + C_IS) / (avs + 1.0),
            a2: (taus + rfs * (C_IS + C_FS * (avs + 1.0))) / (avs + 1.0),
        }
    }

    /// `(2 a1 / t^2 + a2 / t, a1 / t^2, a1 / t^2 + a2 / t + 1)`.
    fn terms(&self, t: f64) -> (f64, f64, f64) {
        let t2 = t * t;
        (
            2.0 * self.a1 / t2 + self.a2 / t,
            self.a1 / t2,
            self.a1 / t2 + self.a2 / t + 1.0,
        )
    }
}

/// Circuit-level front end.
#[derive(Clone, Debug, Default)]
pub struct RcNetworkSimulator {
    config: RcNetworkConfig,
}

impl RcNetworkSimulator {
    #[must_use]
    pub fn new(config: RcNetworkConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &RcNetworkConfig {
        &self.config
    }

    /// Induced current for a collected charge, as a rectangular pulse in µA
    /// over the collection time. 1 µA for 1 ns carries 1 fC.
    #[must_use]
    pub fn input_current(&self, charge_fc: f64) -> Vec<f64> {
        let mut current = vec![0.0; INPUT_SAMPLES];
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let width = (self.config.collection_time_ns.round() as usize).clamp(1, INPUT_SAMPLES);
        #[allow(clippy::cast_precision_loss)]
        let level = charge_fc / width as f64;
        current[..width].fill(level);
        current
    }

    /// Runs preamplifier and shaper on a current pulse (µA, 1 ns samples).
    /// Samples past [`INPUT_SAMPLES`] are ignored.
    pub fn simulate<R: Rng + ?Sized>(&self, current_ua: &[f64], rng: &mut R) -> AnalogWaveform {
        let mut amps = vec![0.0; WAVEFORM_SAMPLES];
        for (slot, &ua) in amps.iter_mut().zip(current_ua.iter().take(INPUT_SAMPLES)) {
            *slot = ua * 1.0e-6;
        }
        if self.config.shot_noise {
            add_shot_noise(&mut amps, rng);
        }

        let charge_fc = amps[..INPUT_SAMPLES]
            .iter()
            .map(|a| a * PREAMP_STEP_S * 1.0e15)
            .sum::<f64>()
            .abs();

        for a in &mut amps {
            *a *= 1.0e6;
        }
        let preamp_out = preamp(&amps);
        let samples = shaper(&preamp_out, charge_fc.max(MIN_SHAPER_CHARGE_FC));
        AnalogWaveform {
            samples,
            step_ns: SHAPER_STEP_NS,
        }
    }
}

/// Adds randomly signed current spikes with exponential spacing.
fn add_shot_noise<R: Rng + ?Sized>(amps: &mut [f64], rng: &mut R) {
    let amplitude =
        SHOT_SCALE * (SHOT_SPECTRAL_DENSITY.sqrt() / (2.0 * SHOT_RATE_HZ).sqrt()) / PREAMP_STEP_S;
    let mut t = 0.0;
    loop {
        let gap: f64 = rng.sample(Exp1);
        t += gap / SHOT_RATE_HZ;
        if t >= SHOT_WINDOW_S {
            break;
        }
        let sign = if rng.random::<bool>() { 1.0 } else { -1.0 };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let index = (t * 1.0e9) as usize;
        match amps.get_mut(index) {
            Some(slot) => *slot += sign * amplitude,
            None => break,
        }
    }
}

/// Preamplifier response to the input current (µA, 1 ns samples).
///
/// The input transconductance switches to its saturated value, for the
/// rest of the strip, once the output exceeds the kink level.
fn preamp(input: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; input.len()];
    if input.len() < 2 {
        return out;
    }
    let mut gm = GM_LINEAR;
    let mut c = Coefficients::preamp(gm);
    let (k1, _, den) = c.terms(PREAMP_STEP_S);
    out[1] = (out[0] * k1 + c.nu * input[1]) / den;

    for m in 2..input.len() {
        c = Coefficients::preamp(gm);
        let (k1, k2, den) = c.terms(PREAMP_STEP_S);
        out[m] = (out[m - 1] * k1 - out[m - 2] * k2 + c.nu * input[m]) / den;
        if out[m] > PREAMP_KINK {
            gm = GM_SATURATED;
        }
    }
    sanitize(&mut out);
    out
}

/// Shaper response to the preamplifier output.
///
/// Shaper sample `i < 100` holds the preamp output at `10 (i - 1)` ns
/// (sample 0 holds the first preamp sample); afterwards the level decays
/// exponentially with a time constant that grows with the charge.
fn shaper(preamp_out: &[f64], charge_fc: f64) -> Vec<f64> {
    let n = preamp_out.len();
    let mut input = vec![0.0; n];
    let held = INPUT_SAMPLES.min(n);
    for (i, slot) in input.iter_mut().enumerate().take(held) {
        let source = (RESAMPLE_FACTOR * i.saturating_sub(1)).min(n.saturating_sub(1));
        *slot = preamp_out.get(source).copied().unwrap_or(0.0);
    }
    if held > 0 {
        let last = input[held - 1];
        for (i, slot) in input.iter_mut().enumerate().skip(held) {
            #[allow(clippy::cast_precision_loss)]
            let elapsed = (i - (held - 1)) as f64;
            *slot = last * (-elapsed / (100.0 * charge_fc)).exp();
        }
    }

    let c = Coefficients::shaper(charge_fc);
    let (k1, k2, den) = c.terms(SHAPER_STEP_S);
    let mut out = vec![0.0; n];
    if n == 0 {
        return out;
    }
    out[0] = (c.nu * input[0] / SHAPER_STEP_S) / den;
    if n > 1 {
        out[1] = (c.nu * (input[1] - input[0]) / SHAPER_STEP_S + k1 * out[0]) / den;
    }
    for m in 2..n {
        out[m] = (c.nu * (input[m] - input[m - 1]) / SHAPER_STEP_S + k1 * out[m - 1]
            - out[m - 2] * k2)
            / den;
    }
    sanitize(&mut out);
    out
}

fn sanitize(samples: &mut [f64]) {
    let mut replaced = 0usize;
    for v in samples.iter_mut().filter(|v| !v.is_finite()) {
        *v = 0.0;
        replaced += 1;
    }
    if replaced > 0 {
        trace!("replaced {replaced} non-finite waveform samples");
    }
}

impl FrontEnd for RcNetworkSimulator {
    fn name(&self) -> &'static str {
        "rc_network"
    }

    fn respond<R: Rng + ?Sized>(
        &self,
        charge_electrons: f64,
        _channel: &ChannelConstants,
        rng: &mut R,
    ) -> StripResponse {
        let charge_fc = charge_electrons * self.config.fc_per_electron;
        let waveform = self.simulate(&self.input_current(charge_fc), rng);
        let draw: f64 = rng.sample(StandardNormal);
        let threshold = self.config.threshold_mean + draw * self.config.threshold_rms;

        match waveform.time_over_threshold(threshold) {
            #[allow(clippy::cast_precision_loss)]
            Some((first, last)) => StripResponse::fired(
                first as f64 * waveform.step_ns,
                last as f64 * waveform.step_ns,
                charge_fc,
            ),
            None => StripResponse::silent(charge_fc),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn quiet() -> RcNetworkSimulator {
        RcNetworkSimulator::new(RcNetworkConfig::default().with_shot_noise(false))
    }

    #[test]
    fn test_input_current_carries_charge() {
        let sim = quiet();
        let current = sim.input_current(7.0);
        assert_eq!(current.len(), INPUT_SAMPLES);
        let total: f64 = current.iter().sum();
        assert!((total - 7.0).abs() < 1e-12);
        assert_eq!(current.iter().filter(|&&c| c > 0.0).count(), 10);
    }

    #[test]
    fn test_zero_input_without_noise_is_flat() {
        let sim = quiet();
        let mut rng = StdRng::seed_from_u64(1);
        let waveform = sim.simulate(&[0.0; INPUT_SAMPLES], &mut rng);
        assert_eq!(waveform.len(), WAVEFORM_SAMPLES);
        assert!(waveform.samples.iter().all(|&v| v == 0.0));
        assert_eq!(waveform.time_over_threshold(0.0), None);
    }

    #[test]
    fn test_signal_is_finite_and_nonzero() {
        let sim = quiet();
        let mut rng = StdRng::seed_from_u64(2);
        let waveform = sim.simulate(&sim.input_current(7.0), &mut rng);
        assert!(waveform.samples.iter().all(|v| v.is_finite()));
        assert!(waveform.samples.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_noise_reproducible_with_seed() {
        let sim = RcNetworkSimulator::default();
        let current = sim.input_current(3.0);
        let a = sim.simulate(&current, &mut StdRng::seed_from_u64(99));
        let b = sim.simulate(&current, &mut StdRng::seed_from_u64(99));
        assert_eq!(a, b);
        assert!(a.samples.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_shot_noise_spikes() {
        let mut amps = vec![0.0; WAVEFORM_SAMPLES];
        add_shot_noise(&mut amps, &mut StdRng::seed_from_u64(5));
        let spikes = amps.iter().filter(|&&a| a != 0.0).count();
        // about 200 spikes expected in the 10 µs window
        assert!(spikes > 100 && spikes < 300, "spikes = {spikes}");
    }

    #[test]
    fn test_time_over_threshold_scan() {
        let waveform = AnalogWaveform {
            samples: vec![0.0, 500.0, 2000.0, 3000.0, 1500.0, 100.0, 5000.0],
            step_ns: 10.0,
        };
        assert_eq!(waveform.time_over_threshold(1.0), Some((2, 5)));
        assert_eq!(waveform.time_over_threshold(10.0), None);

        let rising = AnalogWaveform {
            samples: vec![0.0, 2000.0, 3000.0],
            step_ns: 10.0,
        };
        assert_eq!(rising.time_over_threshold(1.0), Some((1, 4)));
    }

    #[test]
    fn test_silent_response_reports_no_time() {
        let sim = quiet();
        let channel = ChannelConstants::default();
        let mut rng = StdRng::seed_from_u64(3);
        let response = sim.respond(0.0, &channel, &mut rng);
        assert!(!response.fired);
        assert_eq!(response.delay_ns, -1.0);
        assert_eq!(response.stop_ns, -1.0);
    }

    #[test]
    fn test_resample_takes_preamp_at_previous_coarse_step() {
        // Ramp: preamp sample k holds k
        let preamp_out: Vec<f64> = (0..2000).map(f64::from).collect();
        let out = shaper(&preamp_out, 1.0);
        // Shaper samples 0 and 1 both see preamp sample 0, sample 2 sees 10
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 0.0);
        assert!(out[2] > 0.0);

        let c = Coefficients::shaper(1.0);
        let (_, _, den) = c.terms(SHAPER_STEP_S);
        assert_eq!(out[2], (c.nu * 10.0 / SHAPER_STEP_S) / den);
    }

    #[test]
    fn test_mip_waveform_golden() {
        let sim = RcNetworkSimulator::new(
            RcNetworkConfig::default()
                .with_shot_noise(false)
                .with_threshold(160.0, 0.0),
        );
        let electrons = 43_055.0;
        let charge_fc = electrons * ELECTRON_CHARGE_FC;
        let mut rng = StdRng::seed_from_u64(11);

        let waveform = sim.simulate(&sim.input_current(charge_fc), &mut rng);
        let peak_mv = waveform.peak() / WAVEFORM_PER_THRESHOLD_UNIT;
        assert!(peak_mv > 520.0 && peak_mv < 640.0, "peak = {peak_mv} mV");

        let response = sim.respond(electrons, &ChannelConstants::default(), &mut rng);
        assert!(response.fired);
        assert!(
            response.delay_ns >= 380.0 && response.delay_ns <= 480.0,
            "delay = {}",
            response.delay_ns
        );
        assert!(
            response.stop_ns >= 8000.0 && response.stop_ns <= 9400.0,
            "stop = {}",
            response.stop_ns
        );
        // Same input, same output
        let again = sim.respond(electrons, &ChannelConstants::default(), &mut rng);
        assert_eq!(response, again);
    }

    #[test]
    fn test_mip_waveform_returns_to_baseline() {
        let sim = quiet();
        let mut rng = StdRng::seed_from_u64(12);
        let waveform = sim.simulate(&sim.input_current(43_055.0 * ELECTRON_CHARGE_FC), &mut rng);
        let peak = waveform.peak();
        let tail = waveform.samples[waveform.len() - 100..]
            .iter()
            .fold(0.0_f64, |m, v| m.max(v.abs()));
        assert!(tail < 0.01 * peak, "tail = {tail}, peak = {peak}");
    }

    #[test]
    fn test_large_charge_overflows_window() {
        // A tail longer than the buffer keeps the strip above threshold;
        // the stop time saturates one sample past the window.
        let sim = RcNetworkSimulator::new(
            RcNetworkConfig::default()
                .with_shot_noise(false)
                .with_threshold(160.0, 0.0),
        );
        let mut rng = StdRng::seed_from_u64(13);
        let response = sim.respond(1.0e6, &ChannelConstants::default(), &mut rng);
        assert!(response.fired);
        #[allow(clippy::cast_precision_loss)]
        let saturated = (WAVEFORM_SAMPLES + 1) as f64 * SHAPER_STEP_NS;
        assert_eq!(response.stop_ns, saturated);
        assert!(response.delay_ns < response.stop_ns);
    }

    #[test]
    fn test_validate() {
        assert!(RcNetworkConfig::default().validate().is_ok());
        let mut config = RcNetworkConfig::default();
        config.collection_time_ns = 500.0;
        assert!(config.validate().is_err());
    }
}
