//! Combination of tracklets across stations.
//!
//! * [`Tracklet::combine_back_partial`] joins a station-2 and a station-3 tracklet. Both see
//!   the same straight line, so the parameters are merged by inverse-variance weighting.
//! * [`Tracklet::combine_global`] attaches a station-1 tracklet to a back-partial track. The
//!   station-1 line is bent, so the back-partial parameters are kept as they are.
//!
//! In both cases the inverse momentum is re-estimated from the merged geometry with a 25%
//! error, and the chi-square is evaluated against the merged hit list. The parents are left
//! untouched.
use crate::constants::{StationId, STATION_BACK_PARTIAL, STATION_GLOBAL};
use crate::field::FieldConfig;
use crate::geometry::GeometryProvider;
use crate::momentum::MomentumEstimator;
use crate::tracklet::{SignedHits, Tracklet};

/// Relative error assigned to an estimated inverse momentum.
const INVP_REL_ERROR: f64 = 0.25;

/// Inverse-variance weighted mean of two measurements.
fn weighted(v1: f64, e1: f64, v2: f64, e2: f64) -> (f64, f64) {
    let w1 = 1. / (e1 * e1);
    let w2 = 1. / (e2 * e2);
    let err = 1. / (w1 + w2).sqrt();
    ((v1 * w1 + v2 * w2) * err * err, err)
}

impl Tracklet {
    /// Hits of both tracklets, the one with the lower station ID first.
    fn merged_hits(&self, other: &Tracklet) -> SignedHits {
        let (first, second) = if other.station_id > self.station_id {
            (self, other)
        } else {
            (other, self)
        };
        first.hits.iter().chain(second.hits.iter()).copied().collect()
    }

    fn merged_skeleton(&self, other: &Tracklet, station_id: StationId) -> Tracklet {
        let mut t = Tracklet::new(station_id);
        t.n_x_hits = self.n_x_hits + other.n_x_hits;
        t.n_u_hits = self.n_u_hits + other.n_u_hits;
        t.n_v_hits = self.n_v_hits + other.n_v_hits;
        t.hits = self.merged_hits(other);
        t
    }

    fn estimate_invp(&mut self, field: &FieldConfig) {
        self.invp = MomentumEstimator::new(field).inv_momentum(self);
        self.err_invp = INVP_REL_ERROR * self.invp;
    }

    /// Back-partial (station 5) candidate from a station-2 and a station-3 tracklet.
    pub fn combine_back_partial(
        &self,
        other: &Tracklet,
        geometry: &(impl GeometryProvider + ?Sized),
        field: &FieldConfig,
    ) -> Tracklet {
        let mut t = self.merged_skeleton(other, STATION_BACK_PARTIAL);

        (t.tx, t.err_tx) = weighted(self.tx, self.err_tx, other.tx, other.err_tx);
        (t.ty, t.err_ty) = weighted(self.ty, self.err_ty, other.ty, other.err_ty);
        (t.x0, t.err_x0) = weighted(self.x0, self.err_x0, other.x0, other.err_x0);
        (t.y0, t.err_y0) = weighted(self.y0, self.err_y0, other.y0, other.err_y0);

        t.estimate_invp(field);
        t.calc_chisq(geometry, field);
        t
    }

    /// Global (station 6) candidate from a back-partial and a station-1 tracklet.
    ///
    /// The straight-line parameters come from whichever operand is a back-partial track,
    /// `self` otherwise.
    pub fn combine_global(
        &self,
        other: &Tracklet,
        geometry: &(impl GeometryProvider + ?Sized),
        field: &FieldConfig,
    ) -> Tracklet {
        let mut t = self.merged_skeleton(other, STATION_GLOBAL);
        let source = if other.station_id == STATION_BACK_PARTIAL {
            other
        } else {
            self
        };

        t.set_params(&source.params());
        t.err_tx = source.err_tx;
        t.err_ty = source.err_ty;
        t.err_x0 = source.err_x0;
        t.err_y0 = source.err_y0;

        t.estimate_invp(field);
        t.calc_chisq(geometry, field);
        t
    }
}
