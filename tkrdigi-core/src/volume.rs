//! Tracker volume identifiers and plane identifiers.
//!
//! A tracker volume identifier has nine fields:
//! `[lat, tower_y, tower_x, tower_object, tray, view, bot_top, ladder, wafer]`.
//! Tracker volumes carry `lat == 0` and `tower_object == 1`. The plane a
//! volume belongs to is fixed by the first seven fields; ladder and wafer
//! only locate the wafer inside the plane.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Number of fields in a tracker volume identifier.
pub const VOLUME_ID_FIELDS: usize = 9;

/// Towers along one side of the tracker grid.
pub const TOWERS_PER_ROW: u16 = 4;

const LAT_FIELD_TRACKER: i64 = 0;
const TOWER_OBJECT_TRACKER: i64 = 1;

/// Measured coordinate of a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum View {
    X,
    Y,
}

impl View {
    /// Numeric view code (0 for X, 1 for Y).
    #[inline]
    #[must_use]
    pub fn index(self) -> u16 {
        match self {
            Self::X => 0,
            Self::Y => 1,
        }
    }

    /// View from its numeric code.
    #[must_use]
    pub fn from_index(index: u16) -> Option<Self> {
        match index {
            0 => Some(Self::X),
            1 => Some(Self::Y),
            _ => None,
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => f.write_str("X"),
            Self::Y => f.write_str("Y"),
        }
    }
}

/// Identifier of one silicon plane: tower, layer and view.
///
/// Ordering is tower-major, then layer, then view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlaneId {
    pub tower: u16,
    pub layer: u16,
    pub view: View,
}

impl PlaneId {
    #[must_use]
    pub const fn new(tower: u16, layer: u16, view: View) -> Self {
        Self { tower, layer, view }
    }
}

impl fmt::Display for PlaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}L{}{}", self.tower, self.layer, self.view)
    }
}

/// A parsed and validated tracker volume identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VolumeId {
    pub tower_y: u16,
    pub tower_x: u16,
    pub tray: u16,
    pub view: View,
    pub bot_top: u16,
    pub ladder: u16,
    pub wafer: u16,
}

impl VolumeId {
    /// Parses the raw identifier fields.
    ///
    /// # Errors
    /// Fails if the identifier does not have nine fields, if it does not
    /// address a tracker volume, or if a field is out of range.
    pub fn from_fields(fields: &[i64]) -> Result<Self> {
        if fields.len() != VOLUME_ID_FIELDS {
            return Err(Error::VolumeIdLength {
                expected: VOLUME_ID_FIELDS,
                found: fields.len(),
            });
        }
        if fields[0] != LAT_FIELD_TRACKER || fields[3] != TOWER_OBJECT_TRACKER {
            return Err(Error::NotTracker(join_fields(fields)));
        }

        let field = |index: usize| -> Result<u16> {
            u16::try_from(fields[index]).map_err(|_| Error::VolumeIdField {
                index,
                reason: format!("{} is out of range", fields[index]),
            })
        };

        let view = View::from_index(field(5)?).ok_or_else(|| Error::VolumeIdField {
            index: 5,
            reason: format!("view {} is neither 0 nor 1", fields[5]),
        })?;
        let bot_top = field(6)?;
        if bot_top > 1 {
            return Err(Error::VolumeIdField {
                index: 6,
                reason: format!("bottom/top flag {bot_top} is neither 0 nor 1"),
            });
        }
        let tray = field(4)?;
        if tray == 0 && bot_top == 0 {
            return Err(Error::VolumeIdField {
                index: 4,
                reason: "bottom plane of tray 0 does not exist".into(),
            });
        }

        Ok(Self {
            tower_y: field(1)?,
            tower_x: field(2)?,
            tray,
            view,
            bot_top,
            ladder: field(7)?,
            wafer: field(8)?,
        })
    }

    /// Builds the identifier of a plane, with ladder and wafer set to 0.
    ///
    /// Even layers put the X view on the bottom of the tray above, odd
    /// layers put it on the top of the tray below.
    #[must_use]
    pub fn from_plane(plane: PlaneId) -> Self {
        let view = plane.view.index();
        let (tray, bot_top) = if plane.layer % 2 == 0 {
            (plane.layer + 1 - view, view)
        } else {
            (plane.layer + view, 1 - view)
        };
        Self {
            tower_y: plane.tower / TOWERS_PER_ROW,
            tower_x: plane.tower % TOWERS_PER_ROW,
            tray,
            view: plane.view,
            bot_top,
            ladder: 0,
            wafer: 0,
        }
    }

    /// Tower index in the tracker grid.
    #[inline]
    #[must_use]
    pub fn tower(&self) -> u16 {
        self.tower_y * TOWERS_PER_ROW + self.tower_x
    }

    /// Layer (bilayer) index.
    #[inline]
    #[must_use]
    pub fn layer(&self) -> u16 {
        (self.tray + self.bot_top).saturating_sub(1)
    }

    /// The plane this volume belongs to.
    #[inline]
    #[must_use]
    pub fn plane(&self) -> PlaneId {
        PlaneId::new(self.tower(), self.layer(), self.view)
    }

    /// Raw identifier fields.
    #[must_use]
    pub fn fields(&self) -> [i64; VOLUME_ID_FIELDS] {
        [
            LAT_FIELD_TRACKER,
            i64::from(self.tower_y),
            i64::from(self.tower_x),
            TOWER_OBJECT_TRACKER,
            i64::from(self.tray),
            i64::from(self.view.index()),
            i64::from(self.bot_top),
            i64::from(self.ladder),
            i64::from(self.wafer),
        ]
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_fields(&self.fields()))
    }
}

impl FromStr for VolumeId {
    type Err = Error;

    /// Parses the `/`-separated form, e.g. `0/1/2/1/3/0/1/2/3`.
    fn from_str(s: &str) -> Result<Self> {
        let fields = s
            .trim()
            .trim_start_matches('/')
            .split('/')
            .enumerate()
            .map(|(index, token)| {
                token.trim().parse::<i64>().map_err(|e| Error::VolumeIdField {
                    index,
                    reason: format!("'{token}': {e}"),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_fields(&fields)
    }
}

impl TryFrom<&[i64]> for VolumeId {
    type Error = Error;

    fn try_from(fields: &[i64]) -> Result<Self> {
        Self::from_fields(fields)
    }
}

fn join_fields(fields: &[i64]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fields() {
        let id = VolumeId::from_fields(&[0, 1, 2, 1, 5, 1, 0, 2, 3]).unwrap();
        assert_eq!(id.tower(), 6);
        assert_eq!(id.layer(), 4);
        assert_eq!(id.view, View::Y);
        assert_eq!(id.ladder, 2);
        assert_eq!(id.wafer, 3);
        assert_eq!(id.plane(), PlaneId::new(6, 4, View::Y));
    }

    #[test]
    fn test_parse_string() {
        let id: VolumeId = "0/0/0/1/3/0/1/1/1".parse().unwrap();
        assert_eq!(id.layer(), 3);
        assert_eq!(id.to_string(), "0/0/0/1/3/0/1/1/1");
    }

    #[test]
    fn test_wrong_field_count() {
        let err = VolumeId::from_fields(&[0, 1, 2, 1, 5]).unwrap_err();
        assert_eq!(
            err,
            Error::VolumeIdLength {
                expected: 9,
                found: 5
            }
        );
    }

    #[test]
    fn test_non_tracker_volume() {
        // Calorimeter object code
        assert!(matches!(
            VolumeId::from_fields(&[0, 1, 2, 0, 5, 1, 0, 2, 3]),
            Err(Error::NotTracker(_))
        ));
        // Not in the tower grid at all
        assert!(matches!(
            VolumeId::from_fields(&[1, 0, 0, 1, 1, 0, 0, 0, 0]),
            Err(Error::NotTracker(_))
        ));
    }

    #[test]
    fn test_bad_field_values() {
        assert!(VolumeId::from_fields(&[0, 1, 2, 1, 5, 2, 0, 2, 3]).is_err());
        assert!(VolumeId::from_fields(&[0, -1, 2, 1, 5, 0, 0, 2, 3]).is_err());
        assert!(VolumeId::from_fields(&[0, 0, 0, 1, 0, 0, 0, 0, 0]).is_err());
        assert!("0/0/x/1/1/0/0/0/0".parse::<VolumeId>().is_err());
    }

    #[test]
    fn test_plane_round_trip() {
        for tower in [0u16, 5, 15] {
            for layer in 0..18u16 {
                for view in [View::X, View::Y] {
                    let plane = PlaneId::new(tower, layer, view);
                    let id = VolumeId::from_plane(plane);
                    assert_eq!(id.plane(), plane);
                    assert_eq!(VolumeId::from_fields(&id.fields()).unwrap(), id);
                }
            }
        }
    }

    #[test]
    fn test_plane_ordering() {
        let a = PlaneId::new(0, 3, View::Y);
        let b = PlaneId::new(0, 4, View::X);
        let c = PlaneId::new(1, 0, View::X);
        assert!(a < b && b < c);
    }
}
