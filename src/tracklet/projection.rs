//! # Field-kink projections
//!
//! Downstream of the KMag a tracklet is the straight line `(x0 + tx·z, y0 + ty·z)`. For tracks
//! that reach station 1 (back-partial and global tracks with the field on), the bend plane
//! splits the x-z projection into an upstream line whose slope differs by the pT kick:
//!
//! ```text
//! tx_st1 = tx + pT_kick · invP · charge
//! x0_st1 = tx · z_bend + x0 − tx_st1 · z_bend
//! ```
//!
//! so both lines meet at `z_bend`. The y-z projection is never bent.
//!
//! Which line a chamber hit uses is decided by [`KinkRegion::for_detector`] from fixed
//! detector-ID boundaries (planes ≤ 6 are station 1, planes ≤ 12 are station 2), while
//! projections at an arbitrary z ([`Tracklet::exp_position_x`]) use the bend-plane z.
use nalgebra::Vector3;

use crate::constants::{Cm, DetectorId, StationId, LAST_ST1_DETECTOR, LAST_ST2_DETECTOR, STATION_BACK_PARTIAL, STATION_GLOBAL};
use crate::field::FieldConfig;
use crate::tracklet::Tracklet;

/// Track parameters, independent of any tracklet bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackParams {
    pub tx: f64,
    pub ty: f64,
    pub x0: Cm,
    pub y0: Cm,
    pub invp: f64,
}

/// Segment of a bent track a measurement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KinkRegion {
    /// Upstream of the KMag bend plane
    Station1,
    /// Between the KMag bend and the fringe bend
    Station2,
    /// Straight downstream line
    Downstream,
}

impl KinkRegion {
    /// Region of a chamber hit belonging to a tracklet of the given station.
    ///
    /// Only global tracks fitted with the field on are bent; every other tracklet is a single
    /// straight line.
    pub fn for_detector(station_id: StationId, detector_id: DetectorId, field: &FieldConfig) -> Self {
        if !field.kmag_on || station_id != STATION_GLOBAL {
            KinkRegion::Downstream
        } else if detector_id <= LAST_ST1_DETECTOR {
            KinkRegion::Station1
        } else if detector_id <= LAST_ST2_DETECTOR {
            KinkRegion::Station2
        } else {
            KinkRegion::Downstream
        }
    }
}

impl TrackParams {
    /// Charge sign from the kick geometry.
    ///
    /// Compares the slope of the line joining the origin to the bend-plane crossing with the
    /// downstream slope.
    pub fn charge(&self, field: &FieldConfig) -> i32 {
        let z = field.z_kmag_bend;
        if (self.tx * z + self.x0) / z > self.tx {
            1
        } else {
            -1
        }
    }

    fn bent(&self, kick: f64, z_bend: Cm, field: &FieldConfig) -> (f64, Cm) {
        let tx = self.tx + kick * self.invp * self.charge(field) as f64;
        let x0 = self.tx * z_bend + self.x0 - tx * z_bend;
        (tx, x0)
    }

    /// (tx, x0) of the station-1 line.
    pub fn xz_in_st1(&self, field: &FieldConfig) -> (f64, Cm) {
        self.bent(field.pt_kick_kmag, field.z_kmag_bend, field)
    }

    /// (tx, x0) of the line between the two bends.
    pub fn xz_in_st2(&self, field: &FieldConfig) -> (f64, Cm) {
        self.bent(field.pt_kick_kmag_fringe, field.z_kmag_fringe_bend, field)
    }

    /// (tx, x0) of the line of a region.
    pub fn xz_in(&self, region: KinkRegion, field: &FieldConfig) -> (f64, Cm) {
        match region {
            KinkRegion::Station1 => self.xz_in_st1(field),
            KinkRegion::Station2 => self.xz_in_st2(field),
            KinkRegion::Downstream => (self.tx, self.x0),
        }
    }
}

impl Tracklet {
    pub fn charge(&self, field: &FieldConfig) -> i32 {
        self.params().charge(field)
    }

    /// (tx, x0) used for a chamber hit on `detector_id`.
    pub fn local_xz(&self, detector_id: DetectorId, field: &FieldConfig) -> (f64, Cm) {
        self.params()
            .xz_in(KinkRegion::for_detector(self.station_id, detector_id, field), field)
    }

    fn is_bent(&self, field: &FieldConfig) -> bool {
        field.kmag_on && self.station_id >= STATION_BACK_PARTIAL
    }

    /// Expected x at `z`.
    pub fn exp_position_x(&self, z: Cm, field: &FieldConfig) -> Cm {
        let p = self.params();
        let (tx, x0) = if self.is_bent(field) && z < field.z_kmag_bend - 1. {
            p.xz_in_st1(field)
        } else if self.is_bent(field) && z < field.z_kmag_fringe_bend - 1. {
            p.xz_in_st2(field)
        } else {
            (p.tx, p.x0)
        };
        x0 + tx * z
    }

    pub fn exp_position_y(&self, z: Cm) -> Cm {
        self.y0 + self.ty * z
    }

    /// Uncertainty of [`Tracklet::exp_position_x`].
    ///
    /// Upstream of the bend the inverse-momentum error widens both slope and intercept. An
    /// extra centimeter accounts for multiple scattering behind the absorber.
    pub fn exp_pos_error_x(&self, z: Cm, field: &FieldConfig) -> Cm {
        let (err_tx, err_x0) = if self.is_bent(field) && z < field.z_kmag_bend - 1. {
            let err_kick = self.err_invp * field.pt_kick_kmag;
            (
                self.err_tx + err_kick,
                self.err_x0 + err_kick * field.z_kmag_bend,
            )
        } else {
            (self.err_tx, self.err_x0)
        };
        let err = err_x0 + (err_tx * z).abs();
        if z > field.z_absorber {
            err + 1.
        } else {
            err
        }
    }

    pub fn exp_pos_error_y(&self, z: Cm, field: &FieldConfig) -> Cm {
        let err = self.err_y0 + (self.err_ty * z).abs();
        if z > field.z_absorber {
            err + 1.
        } else {
            err
        }
    }

    /// Momentum vector at station 1.
    pub fn momentum_st1(&self, field: &FieldConfig) -> Vector3<f64> {
        let (tx_st1, _) = if field.kmag_on {
            self.params().xz_in_st1(field)
        } else {
            (self.tx, self.x0)
        };
        let p = 1. / self.invp;
        let pz = p / (1. + tx_st1 * tx_st1).sqrt();
        Vector3::new(pz * tx_st1, pz * self.ty, pz)
    }
}
