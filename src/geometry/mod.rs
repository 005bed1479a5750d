//! # Detector geometry
//!
//! Tracking consumes the detector description through the [`GeometryProvider`] trait: plane
//! positions, orientations, resolutions, wire spacing, the channel → position map, hodoscope
//! paddle boxes and magnet apertures. The provider is built once and only read afterwards, so a
//! single instance can be shared by every event (and every thread) that is reconstructed.
//!
//! ## Numbering
//!
//! Drift-chamber planes use IDs `1..=24`, six per station (D1, D2, D3p, D3m). The two planes of
//! a view inside a station (e.g. X and X') form a *super plane* whose ID is `(det + 1) / 2`.
//! Hodoscope and proportional-tube planes follow the chambers and are addressed by name through
//! [`GeometryProvider::detector_ids`].
//!
//! ## Measurement convention
//!
//! A plane measures the coordinate `u = x·cosθ + y·sinθ` of the crossing point, θ being its
//! stereo angle. [`GeometryProvider::interception`] evaluates that coordinate for a straight
//! line `(x0 + tx·z, y0 + ty·z)` at the plane's z.
//!
//! See also
//! ------------
//! * [`plane_table::PlaneTable`] – in-memory provider, loadable from CSV.
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::constants::{Cm, DetectorId, ElementId, StationId, N_CHAMBER_PLANES, PLANES_PER_STATION};
use crate::tracker_errors::TrackerError;

pub mod plane_table;

/// Measuring direction of a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaneView {
    X,
    U,
    V,
    /// Horizontal paddles / wires (hodoscopes and prop tubes only)
    Y,
}

impl PlaneView {
    /// Index of a chamber view in `[X, U, V]` ordered arrays.
    pub fn index(self) -> Option<usize> {
        match self {
            PlaneView::X => Some(0),
            PlaneView::U => Some(1),
            PlaneView::V => Some(2),
            PlaneView::Y => None,
        }
    }
}

/// Cosine and sine of a plane's stereo angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoAngle {
    pub cos: f64,
    pub sin: f64,
}

impl StereoAngle {
    pub fn from_angle(theta: f64) -> Self {
        Self {
            cos: theta.cos(),
            sin: theta.sin(),
        }
    }

    /// Measured coordinate of the point `(x, y)`.
    #[inline]
    pub fn project(&self, x: f64, y: f64) -> f64 {
        x * self.cos + y * self.sin
    }
}

/// Full widths of a plane's active area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleBox {
    pub x: Cm,
    pub y: Cm,
}

/// Rectangle covered by one hodoscope paddle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementBox {
    pub x_min: Cm,
    pub x_max: Cm,
    pub y_min: Cm,
    pub y_max: Cm,
}

impl ElementBox {
    /// Grow the box by `fraction` of its size on each side, then by `(dx, dy)`.
    pub fn expanded(&self, fraction: f64, dx: Cm, dy: Cm) -> Self {
        let half_x = 0.5 * (self.x_max - self.x_min) * (1. + fraction);
        let half_y = 0.5 * (self.y_max - self.y_min) * (1. + fraction);
        let xc = 0.5 * (self.x_max + self.x_min);
        let yc = 0.5 * (self.y_max + self.y_min);
        Self {
            x_min: xc - half_x - dx.abs(),
            x_max: xc + half_x + dx.abs(),
            y_min: yc - half_y - dy.abs(),
            y_max: yc + half_y + dy.abs(),
        }
    }

    pub fn contains(&self, x: Cm, y: Cm) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }
}

/// Magnets whose aperture can be queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Magnet {
    FMag,
    KMag,
}

/// Read-only detector description consumed by the tracking.
///
/// The per-plane accessors take a detector ID that must exist in the provider; implementations
/// are free to panic otherwise. [`crate::fast_tracking::FastTracking::new`] checks every plane
/// it needs once, up front, through [`GeometryProvider::has_detector`].
pub trait GeometryProvider {
    fn has_detector(&self, detector_id: DetectorId) -> bool;

    fn plane_z(&self, detector_id: DetectorId) -> Cm;

    /// Single-hit position resolution (used once the drift sign is known).
    fn resolution(&self, detector_id: DetectorId) -> Cm;

    /// Wire (cell) spacing.
    fn spacing(&self, detector_id: DetectorId) -> Cm;

    fn stereo_angle(&self, detector_id: DetectorId) -> StereoAngle;

    fn plane_view(&self, detector_id: DetectorId) -> PlaneView;

    /// Position of a wire / paddle centre along the measuring direction.
    fn measurement(&self, detector_id: DetectorId, element_id: ElementId) -> Cm;

    fn scale(&self, detector_id: DetectorId) -> ScaleBox;

    /// Paddle box of a hodoscope or prop-tube element, `None` for chambers or unknown elements.
    fn element_box(&self, detector_id: DetectorId, element_id: ElementId) -> Option<ElementBox>;

    fn in_aperture(&self, magnet: Magnet, x: Cm, y: Cm) -> bool;

    /// All detector IDs whose plane name matches the regular expression, ascending.
    fn detector_ids(&self, pattern: &str) -> Result<Vec<DetectorId>, TrackerError>;

    /// Measured coordinate of the point `(x, y)` in the plane's measuring direction.
    fn project(&self, detector_id: DetectorId, x: Cm, y: Cm) -> Cm {
        self.stereo_angle(detector_id).project(x, y)
    }

    /// Measured coordinate of the straight line `(x0 + tx·z, y0 + ty·z)` at the plane.
    fn interception(&self, detector_id: DetectorId, tx: f64, ty: f64, x0: Cm, y0: Cm) -> Cm {
        let z = self.plane_z(detector_id);
        self.project(detector_id, x0 + tx * z, y0 + ty * z)
    }
}

/// True for drift-chamber planes.
#[inline]
pub fn is_chamber(detector_id: DetectorId) -> bool {
    (1..=N_CHAMBER_PLANES as DetectorId).contains(&detector_id)
}

/// Physical station (1..=4) of a chamber plane.
pub fn station_of(detector_id: DetectorId) -> Option<StationId> {
    is_chamber(detector_id).then(|| ((detector_id - 1) / PLANES_PER_STATION + 1) as StationId)
}

/// Chamber planes of a physical station.
pub fn station_planes(station_id: StationId) -> RangeInclusive<DetectorId> {
    let s = station_id as DetectorId;
    (s * PLANES_PER_STATION - 5)..=(s * PLANES_PER_STATION)
}

/// Super-plane ID of a chamber plane.
#[inline]
pub fn super_id(detector_id: DetectorId) -> DetectorId {
    (detector_id + 1) / 2
}

/// The two chamber planes of a super plane, upstream first.
#[inline]
pub fn super_planes(super_id: DetectorId) -> (DetectorId, DetectorId) {
    (2 * super_id - 1, 2 * super_id)
}

#[cfg(test)]
mod geometry_test {
    use super::*;

    #[test]
    fn test_station_numbering() {
        assert_eq!(station_of(1), Some(1));
        assert_eq!(station_of(6), Some(1));
        assert_eq!(station_of(7), Some(2));
        assert_eq!(station_of(24), Some(4));
        assert_eq!(station_of(25), None);
        assert_eq!(station_planes(2), 7..=12);
        assert_eq!(station_planes(4), 19..=24);
        assert_eq!(super_id(9), 5);
        assert_eq!(super_id(10), 5);
        assert_eq!(super_planes(5), (9, 10));
    }

    #[test]
    fn test_element_box_expansion() {
        let b = ElementBox {
            x_min: 0.,
            x_max: 10.,
            y_min: -5.,
            y_max: 5.,
        };
        let e = b.expanded(0.5, 1., 0.);
        assert_eq!(e.x_min, -3.5);
        assert_eq!(e.x_max, 13.5);
        assert_eq!(e.y_min, -7.5);
        assert!(e.contains(13., 7.));
        assert!(!b.contains(13., 0.));
    }
}
