//! Residuals and chi-square of a tracklet.
//!
//! Only real chamber hits contribute. A hit whose drift side is known is weighted by the
//! plane resolution; an unresolved hit sits somewhere in its drift cell and is weighted by
//! `spacing / √12`.
use crate::constants::{Cm, DetectorId, N_CHAMBER_PLANES, UNSET_RESIDUAL};
use crate::field::FieldConfig;
use crate::geometry::{is_chamber, GeometryProvider, StereoAngle};
use crate::tracklet::{KinkRegion, SignedHit, TrackParams, Tracklet};

/// Position error of a signed hit.
pub fn hit_sigma(geometry: &(impl GeometryProvider + ?Sized), hit: &SignedHit) -> Cm {
    if hit.sign == 0 {
        geometry.spacing(hit.detector_id()) / 12f64.sqrt()
    } else {
        geometry.resolution(hit.detector_id())
    }
}

/// A real chamber hit reduced to what the track model needs.
#[derive(Debug, Clone, Copy)]
pub struct Measurement {
    pub detector_id: DetectorId,
    pub pos: Cm,
    pub sigma: Cm,
    pub z: Cm,
    pub stereo: StereoAngle,
    pub region: KinkRegion,
}

impl Measurement {
    /// Measured minus expected position.
    #[inline]
    pub fn residual(&self, p: &TrackParams, field: &FieldConfig) -> Cm {
        let (tx, x0) = p.xz_in(self.region, field);
        self.pos - self.stereo.project(x0 + tx * self.z, p.y0 + p.ty * self.z)
    }
}

impl Tracklet {
    /// Real chamber hits of the tracklet under their current sign hypotheses.
    pub fn measurements(
        &self,
        geometry: &(impl GeometryProvider + ?Sized),
        field: &FieldConfig,
    ) -> Vec<Measurement> {
        self.hits
            .iter()
            .filter(|h| h.is_real() && is_chamber(h.detector_id()))
            .map(|h| {
                let det = h.detector_id();
                Measurement {
                    detector_id: det,
                    pos: h.pos(),
                    sigma: hit_sigma(geometry, h),
                    z: geometry.plane_z(det),
                    stereo: geometry.stereo_angle(det),
                    region: KinkRegion::for_detector(self.station_id, det, field),
                }
            })
            .collect()
    }

    /// Recompute the residual array and the chi-square from the current parameters.
    pub fn calc_chisq(
        &mut self,
        geometry: &(impl GeometryProvider + ?Sized),
        field: &FieldConfig,
    ) -> f64 {
        let p = self.params();
        let mut residual = [UNSET_RESIDUAL; N_CHAMBER_PLANES];
        let mut chisq = 0.;
        for m in self.measurements(geometry, field) {
            let r = m.residual(&p, field);
            residual[m.detector_id as usize - 1] = r;
            chisq += (r / m.sigma).powi(2);
        }
        self.residual = residual;
        self.chisq = chisq;
        chisq
    }
}

#[cfg(test)]
mod chisq_test {
    use super::*;
    use crate::geometry::plane_table::PlaneTable;
    use crate::geometry::{station_planes, PlaneView};
    use crate::hits::Hit;
    use approx::assert_relative_eq;

    fn on_track(table: &PlaneTable, det: DetectorId, p: &TrackParams, index: i32) -> SignedHit {
        let u = table.interception(det, p.tx, p.ty, p.x0, p.y0);
        SignedHit::new(
            Hit {
                index,
                detector_id: det,
                element_id: 1,
                pos: u,
                drift_distance: 0.,
                tdc_time: 0.,
                in_time: true,
            },
            1,
        )
    }

    #[test]
    fn test_exact_hits_give_zero_chisq() {
        let table = PlaneTable::standard();
        let field = FieldConfig::default();
        let p = TrackParams {
            tx: 0.01,
            ty: 0.005,
            x0: 5.,
            y0: -3.,
            invp: 0.05,
        };
        let mut t = Tracklet::new(2);
        for (i, det) in station_planes(2).enumerate() {
            t.push_hit(on_track(&table, det, &p, i as i32), table.plane_view(det));
        }
        t.set_params(&p);
        assert_relative_eq!(t.calc_chisq(&table, &field), 0., epsilon = 1e-18);
        assert_relative_eq!(t.residual[8], 0., epsilon = 1e-9);
        assert_eq!(t.residual[0], UNSET_RESIDUAL);
    }

    #[test]
    fn test_placeholder_does_not_contribute() {
        let table = PlaneTable::standard();
        let field = FieldConfig::default();
        let p = TrackParams {
            tx: 0.,
            ty: 0.,
            x0: 1.,
            y0: 0.,
            invp: 0.05,
        };
        let mut t = Tracklet::new(2);
        let mut off = on_track(&table, 7, &p, 0);
        off.hit.pos += 0.4;
        t.push_hit(off, PlaneView::X);
        t.add_dummy_hits();
        t.set_params(&p);
        let chisq = t.calc_chisq(&table, &field);
        assert_relative_eq!(chisq, (0.4f64 / 0.04).powi(2), max_relative = 1e-9);
        for det in 8..=12 {
            assert_eq!(t.residual[det - 1], UNSET_RESIDUAL);
        }
    }

    #[test]
    fn test_unresolved_hit_uses_cell_width() {
        let table = PlaneTable::standard();
        let mut h = on_track(
            &table,
            7,
            &TrackParams {
                tx: 0.,
                ty: 0.,
                x0: 0.,
                y0: 0.,
                invp: 0.05,
            },
            0,
        );
        assert_relative_eq!(hit_sigma(&table, &h), 0.04, epsilon = 1e-12);
        h.sign = 0;
        assert_relative_eq!(hit_sigma(&table, &h), 2.021 / 12f64.sqrt(), epsilon = 1e-12);
    }
}
