//! Truth hits and the track segments derived from them.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::geometry::{Point3, StripGeometry};
use crate::volume::{PlaneId, VolumeId};
use crate::{Error, Result};

/// Opaque handle to a truth hit in the caller's hit collection.
///
/// Digitization never owns truth hits; it only carries these handles for
/// provenance. Two handles refer to the same hit iff they are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct HitRef(pub u32);

impl HitRef {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A simulated energy deposit in one silicon wafer.
///
/// Entry and exit points are in wafer-local coordinates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TruthHit {
    pub hit_ref: HitRef,
    pub volume: VolumeId,
    pub entry: Point3,
    pub exit: Point3,
    /// Deposited energy in MeV.
    pub energy_mev: f64,
}

impl TruthHit {
    #[must_use]
    pub fn new(
        hit_ref: HitRef,
        volume: VolumeId,
        entry: Point3,
        exit: Point3,
        energy_mev: f64,
    ) -> Self {
        Self {
            hit_ref,
            volume,
            entry,
            exit,
            energy_mev,
        }
    }

    /// Plane the hit belongs to.
    #[inline]
    #[must_use]
    pub fn plane(&self) -> PlaneId {
        self.volume.plane()
    }

    /// The hit as a track segment in plane-local coordinates.
    #[must_use]
    pub fn plane_segment(&self, geometry: &dyn StripGeometry) -> TrackSegment {
        let offset = geometry.wafer_offset(
            u32::from(self.volume.ladder),
            u32::from(self.volume.wafer),
        );
        TrackSegment {
            entry: self.entry + offset,
            exit: self.exit + offset,
            energy_mev: self.energy_mev,
        }
    }
}

/// A truth hit as delivered by the upstream simulation, before its volume
/// identifier has been checked.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawHit {
    pub volume: Vec<i64>,
    pub entry: Point3,
    pub exit: Point3,
    pub energy_mev: f64,
}

impl RawHit {
    /// Validates the hit and attaches its handle.
    ///
    /// # Errors
    /// Fails if the volume identifier is not a tracker volume identifier,
    /// or if a point or the energy is not finite.
    pub fn resolve(&self, hit_ref: HitRef) -> Result<TruthHit> {
        let volume = VolumeId::from_fields(&self.volume)?;
        if !(self.entry.is_finite() && self.exit.is_finite() && self.energy_mev.is_finite()) {
            return Err(Error::InvalidHit(format!(
                "hit {} in volume {volume} has non-finite coordinates or energy",
                hit_ref.0
            )));
        }
        Ok(TruthHit::new(
            hit_ref,
            volume,
            self.entry,
            self.exit,
            self.energy_mev,
        ))
    }
}

/// A straight track segment through one plane, in plane-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackSegment {
    pub entry: Point3,
    pub exit: Point3,
    /// Deposited energy in MeV.
    pub energy_mev: f64,
}

impl TrackSegment {
    #[must_use]
    pub fn new(entry: Point3, exit: Point3, energy_mev: f64) -> Self {
        Self {
            entry,
            exit,
            energy_mev,
        }
    }

    /// Path length through the silicon.
    #[inline]
    #[must_use]
    pub fn length(&self) -> f64 {
        self.entry.distance(&self.exit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SiliconPlaneGeometry;
    use approx::assert_relative_eq;

    #[test]
    fn test_plane_segment_shift() {
        let geo = SiliconPlaneGeometry::default();
        let volume = VolumeId::from_fields(&[0, 0, 0, 1, 1, 0, 0, 3, 0]).unwrap();
        let hit = TruthHit::new(
            HitRef(7),
            volume,
            Point3::new(0.0, 0.0, -0.2),
            Point3::new(0.0, 0.0, 0.2),
            0.155,
        );

        let segment = hit.plane_segment(&geo);
        assert_relative_eq!(segment.entry.x, 1.5 * geo.ladder_pitch());
        assert_relative_eq!(segment.entry.y, -1.5 * geo.ssd_pitch());
        assert_relative_eq!(segment.length(), 0.4, epsilon = 1e-12);
        assert_eq!(hit.plane(), volume.plane());
    }

    #[test]
    fn test_raw_hit_resolve() {
        let raw = RawHit {
            volume: vec![0, 1, 1, 1, 4, 1, 1, 0, 2],
            entry: Point3::new(0.1, 0.0, -0.2),
            exit: Point3::new(0.1, 0.0, 0.2),
            energy_mev: 0.1,
        };
        let hit = raw.resolve(HitRef(3)).unwrap();
        assert_eq!(hit.hit_ref, HitRef(3));
        assert_eq!(hit.plane(), PlaneId::new(5, 4, crate::volume::View::Y));

        let short = RawHit {
            volume: vec![0, 1, 1],
            ..raw.clone()
        };
        assert!(short.resolve(HitRef(0)).is_err());

        let bad_energy = RawHit {
            energy_mev: f64::NAN,
            ..raw
        };
        assert!(matches!(
            bad_energy.resolve(HitRef(0)),
            Err(Error::InvalidHit(_))
        ));
    }
}
