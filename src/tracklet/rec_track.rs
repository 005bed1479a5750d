//! Exported per-node track record.
//!
//! A [`RecTrack`] is what vertexing and persistence consume: one node per real hit with its
//! z, a 5-component state and the diagonal of its covariance, plus the track-level fit
//! quality and the result of the vertex swim.
use nalgebra::{Vector3, Vector5};

use crate::constants::{Cm, LAST_ST1_DETECTOR};
use crate::field::FieldConfig;
use crate::geometry::GeometryProvider;
use crate::swim::FieldSwimmer;
use crate::tracklet::Tracklet;

/// One measurement node of an exported track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackNode {
    /// Hit index times drift sign
    pub signed_index: i32,
    pub z: Cm,
    /// `[q·invP·√((1+tx²)/(1+tx²+ty²)), tx, ty, x, y]`
    pub state: Vector5<f64>,
    /// Diagonal of the state covariance
    pub covariance: Vector5<f64>,
}

/// Reconstructed track as exported to downstream consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct RecTrack {
    pub chisq: f64,
    pub charge: i32,
    pub nodes: Vec<TrackNode>,
    /// Single-track vertex from the swim, `None` when the swim failed
    pub vertex_position: Option<Vector3<f64>>,
    pub vertex_momentum: Option<Vector3<f64>>,
    /// Position at the upstream end of the FMag
    pub dump_position: Option<Vector3<f64>>,
}

impl RecTrack {
    pub fn n_hits(&self) -> usize {
        self.nodes.len()
    }
}

impl Tracklet {
    /// Slope and intercept errors of the station-1 line.
    pub fn xz_error_in_st1(&self, field: &FieldConfig) -> (f64, Cm) {
        let err_kick = self.err_invp * field.pt_kick_kmag;
        (
            self.err_tx + err_kick,
            self.err_x0 + err_kick * field.z_kmag_bend,
        )
    }

    /// Export the tracklet, swimming it to the target for the vertex estimate.
    pub fn to_rec_track(
        &self,
        geometry: &(impl GeometryProvider + ?Sized),
        field: &FieldConfig,
    ) -> RecTrack {
        let charge = self.charge(field);
        let nodes = self
            .hits
            .iter()
            .filter(|h| h.is_real())
            .map(|h| {
                let det = h.detector_id();
                let z = geometry.plane_z(det);
                let (tx, err_tx) = if det <= LAST_ST1_DETECTOR && field.kmag_on {
                    (self.params().xz_in_st1(field).0, self.xz_error_in_st1(field).0)
                } else {
                    (self.tx, self.err_tx)
                };
                let curvature = charge as f64
                    * self.invp
                    * ((1. + tx * tx) / (1. + tx * tx + self.ty * self.ty)).sqrt();
                let err_x = self.exp_pos_error_x(z, field);
                let err_y = self.exp_pos_error_y(z, field);
                TrackNode {
                    signed_index: h.hit.index * h.sign as i32,
                    z,
                    state: Vector5::new(
                        curvature,
                        tx,
                        self.ty,
                        self.exp_position_x(z, field),
                        self.exp_position_y(z),
                    ),
                    covariance: Vector5::new(
                        self.err_invp.powi(2),
                        err_tx.powi(2),
                        self.err_ty.powi(2),
                        err_x.powi(2),
                        err_y.powi(2),
                    ),
                }
            })
            .collect();

        let trajectory = FieldSwimmer::new(field).swim(self);
        let vertex = trajectory.vertex();
        RecTrack {
            chisq: self.chisq,
            charge,
            nodes,
            vertex_position: vertex.map(|(pos, _)| pos),
            vertex_momentum: vertex.map(|(_, mom)| mom),
            dump_position: trajectory.dump_position(),
        }
    }
}

#[cfg(test)]
mod rec_track_test {
    use super::*;
    use crate::constants::STATION_GLOBAL;
    use crate::geometry::plane_table::PlaneTable;
    use crate::tracklet::tracklet_test::tracklet_with;
    use crate::tracklet::TrackParams;
    use approx::assert_relative_eq;

    fn fitted_global() -> Tracklet {
        let mut t = tracklet_with(STATION_GLOBAL, &[1, 3, 5, 7, 9, 11, 13, 15, 17], 0);
        t.hits[0].sign = -1;
        for h in t.hits.iter_mut().skip(1) {
            h.sign = 1;
        }
        t.set_params(&TrackParams {
            tx: 0.01,
            ty: 0.005,
            x0: 5.,
            y0: -3.,
            invp: 0.05,
        });
        t.err_tx = 1e-4;
        t.err_ty = 2e-4;
        t.err_x0 = 0.1;
        t.err_y0 = 0.2;
        t.err_invp = 0.005;
        t.chisq = 3.5;
        t
    }

    #[test]
    fn test_nodes_follow_real_hits() {
        let table = PlaneTable::standard();
        let field = FieldConfig::default();
        let t = fitted_global();
        let rec = t.to_rec_track(&table, &field);

        assert_eq!(rec.n_hits(), 9);
        assert_eq!(rec.charge, 1);
        assert_eq!(rec.chisq, 3.5);
        assert_eq!(rec.nodes[0].signed_index, -1);
        assert_eq!(rec.nodes[1].signed_index, 3);

        // station-1 node carries the kinked slope
        let (tx_st1, _) = t.params().xz_in_st1(&field);
        assert_relative_eq!(rec.nodes[0].state[1], tx_st1, epsilon = 1e-12);
        assert_relative_eq!(rec.nodes[8].state[1], 0.01, epsilon = 1e-12);
        let z = table.plane_z(17);
        assert_relative_eq!(rec.nodes[8].z, z, epsilon = 1e-12);
        assert_relative_eq!(rec.nodes[8].state[3], 5. + 0.01 * z, epsilon = 1e-12);
        assert_relative_eq!(rec.nodes[8].covariance[0], 0.005f64.powi(2), epsilon = 1e-12);
        assert_relative_eq!(rec.nodes[8].covariance[2], 4e-8, epsilon = 1e-12);

        let q_over_p = rec.nodes[8].state[0];
        assert!(q_over_p > 0. && q_over_p < 0.05);
    }

    #[test]
    fn test_swim_results_are_attached() {
        let table = PlaneTable::standard();
        let field = FieldConfig::default();
        let rec = fitted_global().to_rec_track(&table, &field);
        let dump = rec.dump_position.unwrap();
        assert_relative_eq!(dump.z, 0., epsilon = 1e-9);
        let vtx = rec.vertex_position.unwrap();
        assert!(vtx.z <= field.fmag_length && vtx.z >= field.z_upstream - 1e-9);
        assert!(rec.vertex_momentum.unwrap().norm() > 20.);
    }
}
