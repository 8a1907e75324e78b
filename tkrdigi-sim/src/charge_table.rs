//! Induced-charge lookup table.
//!
//! The table covers one strip cell: the offset of a deposit from the centre
//! of its nearest strip (`along`) and its depth in the silicon (`depth`).
//! Each bin stores the fraction of the deposit's charge induced on the
//! nearest strip and its two neighbours on each side, separately for the
//! hole and electron drift.
//!
//! # File format
//!
//! One whitespace-separated record per bin, in raster order with the
//! `along` index varying slowest:
//!
//! ```text
//! <i_along> <i_depth> <count> <v_1> ... <v_count>
//! ```
//!
//! The first `NEIGHBOUR_SPAN` values are the hole fractions for strip
//! offsets -2..=2, the rest the electron fractions. Missing trailing values
//! are zero. Blank lines and lines starting with `#` are ignored.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::info;
use tkrdigi_core::Carrier;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Strips reached by one deposit: the nearest one and two on each side.
pub const NEIGHBOUR_SPAN: usize = 5;

/// Largest strip offset reached by one deposit.
pub const NEIGHBOUR_REACH: i32 = 2;

/// Values stored per bin.
pub const CHARGE_VECTOR_LEN: usize = 2 * NEIGHBOUR_SPAN;

/// How a position between bin centres is resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LookupMode {
    /// Value of the bin containing the position.
    #[default]
    Nearest,
    /// Bilinear interpolation between neighbouring bin centres.
    Bilinear,
}

/// Table layout and lookup mode.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChargeTableConfig {
    pub bins_along: usize,
    pub bins_depth: usize,
    /// Offset envelope from the strip centre (mm).
    pub along_min: f64,
    pub along_max: f64,
    /// Depth envelope measured from the silicon surface (mm).
    pub depth_min: f64,
    pub depth_max: f64,
    pub mode: LookupMode,
}

impl Default for ChargeTableConfig {
    fn default() -> Self {
        Self {
            bins_along: 50,
            bins_depth: 50,
            along_min: -0.114,
            along_max: 0.114,
            depth_min: 0.0,
            depth_max: 0.4,
            mode: LookupMode::Nearest,
        }
    }
}

impl ChargeTableConfig {
    /// Sets the lookup mode.
    #[must_use]
    pub fn with_mode(mut self, mode: LookupMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the bin counts.
    #[must_use]
    pub fn with_bins(mut self, bins_along: usize, bins_depth: usize) -> Self {
        self.bins_along = bins_along;
        self.bins_depth = bins_depth;
        self
    }

    /// Total number of bins.
    #[must_use]
    pub fn bin_count(&self) -> usize {
        self.bins_along * self.bins_depth
    }

    /// Checks the layout.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for empty grids or inverted envelopes.
    pub fn validate(&self) -> Result<()> {
        if self.bins_along == 0 || self.bins_depth == 0 {
            return Err(Error::ConfigError("charge table needs at least one bin".into()));
        }
        let ordered = |lo: f64, hi: f64| lo.is_finite() && hi.is_finite() && lo < hi;
        if !ordered(self.along_min, self.along_max) || !ordered(self.depth_min, self.depth_max) {
            return Err(Error::ConfigError(
                "charge table envelope must have min < max".into(),
            ));
        }
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn along_step(&self) -> f64 {
        (self.along_max - self.along_min) / self.bins_along as f64
    }

    #[allow(clippy::cast_precision_loss)]
    fn depth_step(&self) -> f64 {
        (self.depth_max - self.depth_min) / self.bins_depth as f64
    }
}

/// Charge fractions induced by a unit deposit.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChargeVector(pub [f64; CHARGE_VECTOR_LEN]);

impl ChargeVector {
    /// Fraction induced by one carrier on the strip at `offset` from the
    /// nearest strip. Offsets beyond the reach give zero.
    #[must_use]
    pub fn fraction(&self, carrier: Carrier, offset: i32) -> f64 {
        if offset.abs() > NEIGHBOUR_REACH {
            return 0.0;
        }
        let slot = usize::try_from(offset + NEIGHBOUR_REACH).unwrap_or(0);
        self.0[carrier.index() * NEIGHBOUR_SPAN + slot]
    }

    /// Sum of all fractions.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    fn scaled_add(&mut self, other: &Self, weight: f64) {
        for (mine, theirs) in self.0.iter_mut().zip(other.0.iter()) {
            *mine += weight * theirs;
        }
    }
}

/// Summary of a loaded table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableStatistics {
    pub bins: usize,
    pub non_empty_bins: usize,
    pub max_fraction: f64,
    pub mean_total: f64,
}

/// Read-only induced-charge table.
#[derive(Clone, Debug)]
pub struct ChargeTable {
    config: ChargeTableConfig,
    bins: Vec<ChargeVector>,
}

impl ChargeTable {
    /// Builds a table with the same vector in every bin.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if the layout is invalid.
    pub fn uniform(config: ChargeTableConfig, vector: ChargeVector) -> Result<Self> {
        config.validate()?;
        let bins = vec![vector; config.bin_count()];
        Ok(Self { config, bins })
    }

    /// Loads a table file.
    ///
    /// # Errors
    /// Returns [`Error::TableNotFound`] if the file does not exist and
    /// [`Error::MalformedTable`] if its contents do not fill the layout.
    pub fn load<P: AsRef<Path>>(path: P, config: ChargeTableConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::TableNotFound {
                path: path.to_path_buf(),
            },
            _ => Error::Io(e),
        })?;
        let table = Self::from_reader(BufReader::new(file), config)?;
        info!(
            "loaded charge table {} ({} x {} bins)",
            path.display(),
            table.config.bins_along,
            table.config.bins_depth
        );
        Ok(table)
    }

    /// Parses a table from text.
    ///
    /// # Errors
    /// See [`Self::from_reader`].
    pub fn parse(text: &str, config: ChargeTableConfig) -> Result<Self> {
        Self::from_reader(text.as_bytes(), config)
    }

    /// Parses a table from a reader.
    ///
    /// # Errors
    /// Returns [`Error::MalformedTable`] for unparsable tokens, records out
    /// of raster order, records longer than a bin, or too few records.
    pub fn from_reader<R: BufRead>(reader: R, config: ChargeTableConfig) -> Result<Self> {
        config.validate()?;
        let expected = config.bin_count();
        let mut bins = Vec::with_capacity(expected);
        let mut index_base: Option<usize> = None;
        let mut last_line = 0;

        for (line_no, line) in reader.lines().enumerate() {
            let line_no = line_no + 1;
            last_line = line_no;
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if bins.len() == expected {
                return Err(malformed(
                    line_no,
                    format!("more than {expected} records"),
                ));
            }

            let mut tokens = trimmed.split_whitespace();
            let mut next_index = |what: &str| -> Result<usize> {
                let token = tokens
                    .next()
                    .ok_or_else(|| malformed(line_no, format!("missing {what}")))?;
                token
                    .parse::<usize>()
                    .map_err(|e| malformed(line_no, format!("bad {what} '{token}': {e}")))
            };
            let i_along = next_index("along index")?;
            let i_depth = next_index("depth index")?;
            let count = next_index("value count")?;

            let base = *index_base.get_or_insert(i_along.min(1));
            let expected_along = bins.len() / config.bins_depth + base;
            let expected_depth = bins.len() % config.bins_depth + base;
            if (i_along, i_depth) != (expected_along, expected_depth) {
                return Err(malformed(
                    line_no,
                    format!(
                        "record ({i_along}, {i_depth}) out of raster order, expected ({expected_along}, {expected_depth})"
                    ),
                ));
            }
            if count > CHARGE_VECTOR_LEN {
                return Err(malformed(
                    line_no,
                    format!("{count} values exceed the {CHARGE_VECTOR_LEN} stored per bin"),
                ));
            }

            let mut vector = ChargeVector::default();
            for (k, slot) in vector.0.iter_mut().take(count).enumerate() {
                let token = tokens.next().ok_or_else(|| {
                    malformed(line_no, format!("record truncated after {k} of {count} values"))
                })?;
                let value = token
                    .parse::<f64>()
                    .map_err(|e| malformed(line_no, format!("bad value '{token}': {e}")))?;
                if !value.is_finite() {
                    return Err(malformed(line_no, format!("non-finite value '{token}'")));
                }
                *slot = value;
            }
            if tokens.next().is_some() {
                return Err(malformed(line_no, "trailing values after record".into()));
            }
            bins.push(vector);
        }

        if bins.len() != expected {
            return Err(malformed(
                last_line,
                format!("found {} of {expected} records", bins.len()),
            ));
        }
        Ok(Self { config, bins })
    }

    #[must_use]
    pub fn config(&self) -> &ChargeTableConfig {
        &self.config
    }

    /// Bin containing a position, or `None` outside the envelope.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn bin_of(&self, along: f64, depth: f64) -> Option<(usize, usize)> {
        if !self.contains(along, depth) {
            return None;
        }
        let c = &self.config;
        let ia = (((along - c.along_min) / c.along_step()) as usize).min(c.bins_along - 1);
        let id = (((depth - c.depth_min) / c.depth_step()) as usize).min(c.bins_depth - 1);
        Some((ia, id))
    }

    /// True if the position lies inside the table envelope.
    #[must_use]
    pub fn contains(&self, along: f64, depth: f64) -> bool {
        let c = &self.config;
        (c.along_min..=c.along_max).contains(&along) && (c.depth_min..=c.depth_max).contains(&depth)
    }

    /// Charge fractions at a position, or `None` (no signal) outside the
    /// envelope.
    #[must_use]
    pub fn lookup(&self, along: f64, depth: f64) -> Option<ChargeVector> {
        match self.config.mode {
            LookupMode::Nearest => self
                .bin_of(along, depth)
                .map(|(ia, id)| self.bins[ia * self.config.bins_depth + id]),
            LookupMode::Bilinear => self.interpolate(along, depth),
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn interpolate(&self, along: f64, depth: f64) -> Option<ChargeVector> {
        if !self.contains(along, depth) {
            return None;
        }
        let c = &self.config;
        // Fractional bin-centre coordinates, clamped to the outermost centres
        let fa = ((along - c.along_min) / c.along_step() - 0.5).clamp(0.0, (c.bins_along - 1) as f64);
        let fd = ((depth - c.depth_min) / c.depth_step() - 0.5).clamp(0.0, (c.bins_depth - 1) as f64);
        let a0 = fa.floor() as usize;
        let d0 = fd.floor() as usize;
        let a1 = (a0 + 1).min(c.bins_along - 1);
        let d1 = (d0 + 1).min(c.bins_depth - 1);
        let ta = fa - a0 as f64;
        let td = fd - d0 as f64;

        let bin = |ia: usize, id: usize| &self.bins[ia * c.bins_depth + id];
        let mut out = ChargeVector::default();
        out.scaled_add(bin(a0, d0), (1.0 - ta) * (1.0 - td));
        out.scaled_add(bin(a1, d0), ta * (1.0 - td));
        out.scaled_add(bin(a0, d1), (1.0 - ta) * td);
        out.scaled_add(bin(a1, d1), ta * td);
        Some(out)
    }

    /// Summary figures for diagnostics.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn statistics(&self) -> TableStatistics {
        let non_empty_bins = self.bins.iter().filter(|b| b.0.iter().any(|v| *v != 0.0)).count();
        let max_fraction = self
            .bins
            .iter()
            .flat_map(|b| b.0.iter().copied())
            .fold(0.0_f64, f64::max);
        let mean_total = if self.bins.is_empty() {
            0.0
        } else {
            self.bins.iter().map(ChargeVector::total).sum::<f64>() / self.bins.len() as f64
        };
        TableStatistics {
            bins: self.bins.len(),
            non_empty_bins,
            max_fraction,
            mean_total,
        }
    }
}

fn malformed(line: usize, reason: String) -> Error {
    Error::MalformedTable { line, reason }
}
