//! Plane geometry: points, the strip-coordinate trait and the default
//! silicon plane layout.
//!
//! All lengths are in millimetres. Plane-local coordinates are centred on
//! the plane; `x` is the measured coordinate, `z` runs through the silicon
//! thickness and is centred on the mid-plane.

use std::ops::{Add, Mul, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A point (or displacement) in plane-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    /// The origin.
    pub const ORIGIN: Self = Self::new(0.0, 0.0, 0.0);

    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean length.
    #[inline]
    #[must_use]
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Euclidean distance to another point.
    #[inline]
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        (*other - *self).norm()
    }

    /// Point at parameter `t` along the segment `self -> other`.
    #[inline]
    #[must_use]
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        *self + (*other - *self) * t
    }

    /// True if every component is finite.
    #[inline]
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Point3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Point3 {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl From<[f64; 3]> for Point3 {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// Strip-coordinate service for one tracker plane.
///
/// Implementations map the measured coordinate to a readout strip and
/// back, and expose the fixed detector constants the digitization needs.
/// The digitization only reads from the geometry, so implementations must
/// be shareable across threads.
pub trait StripGeometry: Send + Sync {
    /// Strip containing the measured coordinate, or `None` if the
    /// coordinate falls in a guard ring, a gap or outside the plane.
    fn strip_index_of(&self, coordinate: f64) -> Option<u32>;

    /// Measured coordinate of a strip's centre.
    fn center_of(&self, strip: u32) -> f64;

    /// Number of strips across one plane.
    fn strip_count(&self) -> u32;

    /// Strips read out by one front-end group. Charge sharing never
    /// crosses a group boundary.
    fn strips_per_group(&self) -> u32;

    /// Strip pitch.
    fn strip_pitch(&self) -> f64;

    /// Silicon thickness.
    fn thickness(&self) -> f64;

    /// Shift from wafer-local to plane-local coordinates.
    fn wafer_offset(&self, ladder: u32, wafer: u32) -> Point3;

    /// Front-end group a strip belongs to.
    #[inline]
    fn group_of(&self, strip: u32) -> u32 {
        strip / self.strips_per_group().max(1)
    }
}

/// Default square silicon plane: `wafers_per_side` ladders across the
/// measured coordinate, each carrying `wafers_per_side` wafers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SiliconPlaneGeometry {
    /// Ladders per plane (and wafers per ladder).
    pub wafers_per_side: u32,
    /// Strips on one wafer.
    pub strips_per_wafer: u32,
    /// Side length of one wafer.
    pub wafer_width: f64,
    /// Insensitive guard ring on each wafer edge.
    pub guard_ring: f64,
    /// Gap between wafers along a ladder.
    pub ssd_gap: f64,
    /// Gap between neighbouring ladders.
    pub ladder_gap: f64,
    /// Silicon thickness.
    pub thickness: f64,
}

impl Default for SiliconPlaneGeometry {
    fn default() -> Self {
        Self {
            wafers_per_side: 4,
            strips_per_wafer: 384,
            wafer_width: 89.5,
            guard_ring: 0.974,
            ssd_gap: 0.025,
            ladder_gap: 0.2,
            thickness: 0.4,
        }
    }
}

impl SiliconPlaneGeometry {
    /// Creates the standard plane layout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of strips per wafer.
    #[must_use]
    pub fn with_strips_per_wafer(mut self, strips: u32) -> Self {
        self.strips_per_wafer = strips;
        self
    }

    /// Sets the silicon thickness.
    #[must_use]
    pub fn with_thickness(mut self, thickness: f64) -> Self {
        self.thickness = thickness;
        self
    }

    /// Checks that the layout describes a usable plane.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if a count is zero or a length is
    /// negative, or if the guard rings leave no active silicon.
    pub fn validate(&self) -> Result<()> {
        if self.wafers_per_side == 0 || self.strips_per_wafer == 0 {
            return Err(Error::ConfigError(
                "plane needs at least one wafer and one strip".into(),
            ));
        }
        let lengths = [
            self.wafer_width,
            self.guard_ring,
            self.ssd_gap,
            self.ladder_gap,
            self.thickness,
        ];
        if lengths.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(Error::ConfigError(
                "geometry lengths must be finite and non-negative".into(),
            ));
        }
        if self.active_width() <= 0.0 || self.thickness <= 0.0 {
            return Err(Error::ConfigError(format!(
                "guard ring {} leaves no active silicon on a {} mm wafer",
                self.guard_ring, self.wafer_width
            )));
        }
        Ok(())
    }

    /// Sensitive width of one wafer.
    #[inline]
    #[must_use]
    pub fn active_width(&self) -> f64 {
        self.wafer_width - 2.0 * self.guard_ring
    }

    /// Distance between neighbouring ladder origins.
    #[inline]
    #[must_use]
    pub fn ladder_pitch(&self) -> f64 {
        self.wafer_width + self.ladder_gap
    }

    /// Distance between neighbouring wafer origins along a ladder.
    #[inline]
    #[must_use]
    pub fn ssd_pitch(&self) -> f64 {
        self.wafer_width + self.ssd_gap
    }

    /// Full width of the plane along the measured coordinate.
    #[must_use]
    pub fn panel_width(&self) -> f64 {
        let n = f64::from(self.wafers_per_side);
        n * self.wafer_width + (n - 1.0) * self.ladder_gap
    }
}

impl StripGeometry for SiliconPlaneGeometry {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn strip_index_of(&self, coordinate: f64) -> Option<u32> {
        let u = coordinate + 0.5 * self.panel_width();
        if !u.is_finite() || u < 0.0 || u >= self.panel_width() {
            return None;
        }

        let ladder = (u / self.ladder_pitch()).floor() as u32;
        if ladder >= self.wafers_per_side {
            return None;
        }

        let within = u - f64::from(ladder) * self.ladder_pitch() - self.guard_ring;
        if within < 0.0 || within >= self.active_width() {
            return None;
        }

        let last = self.strips_per_wafer.saturating_sub(1);
        let index = ((within / self.strip_pitch()).floor() as u32).min(last);
        Some(ladder * self.strips_per_wafer + index)
    }

    fn center_of(&self, strip: u32) -> f64 {
        let ladder = strip / self.strips_per_wafer;
        let index = strip % self.strips_per_wafer;
        -0.5 * self.panel_width()
            + f64::from(ladder) * self.ladder_pitch()
            + self.guard_ring
            + (f64::from(index) + 0.5) * self.strip_pitch()
    }

    fn strip_count(&self) -> u32 {
        self.wafers_per_side * self.strips_per_wafer
    }

    fn strips_per_group(&self) -> u32 {
        self.strips_per_wafer
    }

    fn strip_pitch(&self) -> f64 {
        self.active_width() / f64::from(self.strips_per_wafer)
    }

    fn thickness(&self) -> f64 {
        self.thickness
    }

    fn wafer_offset(&self, ladder: u32, wafer: u32) -> Point3 {
        let centre = 0.5 * (f64::from(self.wafers_per_side) - 1.0);
        Point3::new(
            (f64::from(ladder) - centre) * self.ladder_pitch(),
            (f64::from(wafer) - centre) * self.ssd_pitch(),
            0.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_point_arithmetic() {
        let a = Point3::new(1.0, 2.0, 2.0);
        let b = Point3::new(3.0, 2.0, 2.0);
        assert_relative_eq!(a.norm(), 3.0);
        assert_relative_eq!(a.distance(&b), 2.0);
        assert_eq!(a.lerp(&b, 0.5), Point3::new(2.0, 2.0, 2.0));
        assert_eq!((b - a) * 2.0, Point3::new(4.0, 0.0, 0.0));
    }

    #[test]
    fn test_default_pitch() {
        let geo = SiliconPlaneGeometry::default();
        // (89.5 - 2 * 0.974) / 384
        assert_relative_eq!(geo.strip_pitch(), 0.228, epsilon = 1e-9);
        assert_eq!(geo.strip_count(), 1536);
        assert!(geo.validate().is_ok());
    }

    #[test]
    fn test_strip_center_round_trip() {
        let geo = SiliconPlaneGeometry::default();
        for strip in [0, 1, 191, 383, 384, 767, 1000, 1535] {
            let x = geo.center_of(strip);
            assert_eq!(geo.strip_index_of(x), Some(strip));
        }
    }

    #[test]
    fn test_dead_regions() {
        let geo = SiliconPlaneGeometry::default();
        let half = 0.5 * geo.panel_width();

        // Outside the plane
        assert_eq!(geo.strip_index_of(-half - 1.0), None);
        assert_eq!(geo.strip_index_of(half + 1.0), None);
        // Guard ring on the first wafer edge
        assert_eq!(geo.strip_index_of(-half + 0.5), None);
        // Gap between the first and second ladder
        let gap = -half + geo.wafer_width + 0.5 * geo.ladder_gap;
        assert_eq!(geo.strip_index_of(gap), None);
        assert_eq!(geo.strip_index_of(f64::NAN), None);
    }

    #[test]
    fn test_wafer_offset_symmetric() {
        let geo = SiliconPlaneGeometry::default();
        let first = geo.wafer_offset(0, 0);
        let last = geo.wafer_offset(3, 3);
        assert_relative_eq!(first.x, -last.x);
        assert_relative_eq!(first.y, -last.y);
        assert_relative_eq!(first.x, -1.5 * 89.7, epsilon = 1e-9);
        assert_relative_eq!(first.y, -1.5 * 89.525, epsilon = 1e-9);
    }

    #[test]
    fn test_group_boundaries() {
        let geo = SiliconPlaneGeometry::default();
        assert_eq!(geo.group_of(383), 0);
        assert_eq!(geo.group_of(384), 1);
    }

    #[test]
    fn test_invalid_layout() {
        let geo = SiliconPlaneGeometry {
            guard_ring: 50.0,
            ..SiliconPlaneGeometry::default()
        };
        assert!(geo.validate().is_err());
    }
}
