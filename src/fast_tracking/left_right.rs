//! Left/right drift-sign resolution.
//!
//! A drift chamber hit only tells how far the track passed from the wire, not on which side.
//! Two passes assign the side:
//!
//! * **pairs**: for two hits on the planes of one super plane, each of the four sign
//!   combinations defines a local line (slope, intercept). Combinations outside the geometric
//!   limits of the plane are dropped; the one closest to the fitted track, measured by the pull
//!
//!   ```text
//!   pull = √( (slope_exp − slope)² / err_slope² + (inter_exp − inter)² / err_inter² )
//!   ```
//!
//!   wins if its pull is below the threshold;
//! * **singles**: any hit still unresolved takes the side of the fitted track.
//!
//! Both passes refit the tracklet when they changed a sign.
use crate::constants::*;
use crate::fast_tracking::TrackingParams;
use crate::fitting::TrackletFitter;
use crate::geometry::GeometryProvider;
use crate::tracklet::{SignedHit, Tracklet};

const SIGN_COMBINATIONS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

/// Largest local slope and intercept a hit pair of each plane can have.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalLineLimits {
    pub slope_max: [f64; N_CHAMBER_PLANES],
    pub intersection_max: [Cm; N_CHAMBER_PLANES],
}

impl LocalLineLimits {
    /// Limits from the track parameter bounds, widened by the resolution over the
    /// super-plane gap.
    ///
    /// The bounds are symmetric, so the largest `|cosθ·tx + sinθ·ty|` over them is
    /// `|cosθ|·tx_max + |sinθ|·ty_max`, and likewise for the intercepts. U and V planes
    /// therefore get the same limits whatever the sign of their stereo angle.
    pub fn new(geometry: &(impl GeometryProvider + ?Sized), params: &TrackingParams) -> Self {
        let mut slope_max = [0.; N_CHAMBER_PLANES];
        let mut intersection_max = [0.; N_CHAMBER_PLANES];
        for a in (1..=N_CHAMBER_PLANES as DetectorId).step_by(2) {
            let b = a + 1;
            let (z_a, z_b) = (geometry.plane_z(a), geometry.plane_z(b));
            let d_slope = (geometry.resolution(a) + geometry.resolution(b)) / (z_b - z_a);
            let d_intersection = d_slope * z_b;
            for det in [a, b] {
                let stereo = geometry.stereo_angle(det);
                let i = det as usize - 1;
                slope_max[i] =
                    stereo.cos.abs() * params.tx_max + stereo.sin.abs() * params.ty_max + d_slope.abs();
                intersection_max[i] = stereo.cos.abs() * params.x0_max
                    + stereo.sin.abs() * params.y0_max
                    + d_intersection.abs();
            }
        }
        LocalLineLimits {
            slope_max,
            intersection_max,
        }
    }
}

pub struct LeftRightResolver<'a, G: ?Sized> {
    geometry: &'a G,
    params: &'a TrackingParams,
    fitter: TrackletFitter<'a, G>,
    limits: LocalLineLimits,
}

impl<'a, G: GeometryProvider + ?Sized> LeftRightResolver<'a, G> {
    pub fn new(geometry: &'a G, params: &'a TrackingParams) -> Self {
        LeftRightResolver {
            geometry,
            params,
            fitter: TrackletFitter::new(geometry, params),
            limits: LocalLineLimits::new(geometry, params),
        }
    }

    pub fn limits(&self) -> &LocalLineLimits {
        &self.limits
    }

    /// Best sign combination of two hits of a super plane, with its pull.
    fn best_combination(&self, t: &Tracklet, first: &SignedHit, second: &SignedHit) -> Option<((i8, i8), f64)> {
        let field = &self.params.field;
        let det = first.detector_id();
        let (z1, z2) = (self.geometry.plane_z(det), self.geometry.plane_z(second.detector_id()));
        let stereo = self.geometry.stereo_angle(det);
        let i = det as usize - 1;

        let ((tx, x0), (err_tx, err_x0)) = if field.kmag_on && t.station_id == STATION_GLOBAL && det <= LAST_ST1_DETECTOR {
            (t.params().xz_in_st1(field), t.xz_error_in_st1(field))
        } else {
            ((t.tx, t.x0), (t.err_tx, t.err_x0))
        };
        let slope_exp = stereo.cos * tx + stereo.sin * t.ty;
        let err_slope = (stereo.cos * err_tx).abs() + (stereo.sin * t.err_ty).abs();
        let inter_exp = stereo.cos * x0 + stereo.sin * t.y0;
        let err_inter = (stereo.cos * err_x0).abs() + (stereo.sin * t.err_y0).abs();

        SIGN_COMBINATIONS
            .iter()
            .filter_map(|&(s1, s2)| {
                let pos1 = SignedHit::new(first.hit, s1).pos();
                let pos2 = SignedHit::new(second.hit, s2).pos();
                let slope = (pos1 - pos2) / (z1 - z2);
                let inter = pos1 - slope * z1;
                if slope.abs() > self.limits.slope_max[i] || inter.abs() > self.limits.intersection_max[i] {
                    return None;
                }
                let pull = ((slope_exp - slope).powi(2) / err_slope.powi(2)
                    + (inter_exp - inter).powi(2) / err_inter.powi(2))
                .sqrt();
                (!pull.is_nan()).then_some(((s1, s2), pull))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Resolve hit pairs whose pull is below `threshold`, then refit if any sign changed.
    ///
    /// Return
    /// ----------
    /// * `true` if the tracklet was updated.
    pub fn resolve_pairs(&self, t: &mut Tracklet, threshold: f64) -> bool {
        let mut updated = false;
        for k in 0..t.hits.len() / 2 {
            let (first, second) = (t.hits[2 * k], t.hits[2 * k + 1]);
            if !(first.is_real() && second.is_real()) || first.sign * second.sign != 0 {
                continue;
            }
            if let Some(((s1, s2), pull)) = self.best_combination(t, &first, &second) {
                if pull < threshold {
                    t.hits[2 * k].sign = s1;
                    t.hits[2 * k + 1].sign = s2;
                    updated = true;
                }
            }
        }
        if updated {
            self.fitter.fit(t);
        }
        updated
    }

    /// Give every unresolved hit the side of the fitted track, then refit if any sign changed.
    pub fn resolve_singles(&self, t: &mut Tracklet) -> bool {
        let field = &self.params.field;
        let mut updated = false;
        for k in 0..t.hits.len() {
            let h = t.hits[k];
            if !h.is_real() || h.sign != 0 {
                continue;
            }
            let z = self.geometry.plane_z(h.detector_id());
            let pos_exp = self
                .geometry
                .project(h.detector_id(), t.exp_position_x(z, field), t.exp_position_y(z));
            t.hits[k].sign = if pos_exp > h.hit.pos { 1 } else { -1 };
            updated = true;
        }
        if updated {
            self.fitter.fit(t);
        }
        updated
    }
}

#[cfg(test)]
mod left_right_test {
    use super::*;
    use crate::fitting::fitting_test::{exact_tracklet, truth};
    use crate::geometry::plane_table::PlaneTable;
    use crate::hits::Hit;
    use approx::assert_relative_eq;

    /// Back-partial tracklet on the true track with mixed drift sides, every sign unknown.
    fn unresolved(table: &PlaneTable) -> (Tracklet, Vec<i8>) {
        let p = truth();
        let mut t = Tracklet::new(STATION_BACK_PARTIAL);
        let mut sides = Vec::new();
        for (k, det) in (7..=18).enumerate() {
            let u = table.interception(det, p.tx, p.ty, p.x0, p.y0);
            let drift = 0.1 + 0.08 * (k % 4) as f64;
            let side = if k % 3 == 0 { -1 } else { 1 };
            let hit = Hit {
                index: k as i32,
                detector_id: det,
                element_id: 1,
                pos: u - side as f64 * drift,
                drift_distance: drift,
                tdc_time: 0.,
                in_time: true,
            };
            t.push_hit(SignedHit::new(hit, 0), table.plane_view(det));
            sides.push(side);
        }
        t.sort_hits();
        (t, sides)
    }

    #[test]
    fn test_limits() {
        let table = PlaneTable::standard();
        let params = TrackingParams::default();
        let limits = LocalLineLimits::new(&table, &params);
        let d_slope = 2. * table.resolution(1) / (table.plane_z(2) - table.plane_z(1));
        assert_relative_eq!(limits.slope_max[0], params.tx_max + d_slope, epsilon = 1e-12);
        assert_relative_eq!(limits.slope_max[0], limits.slope_max[1], epsilon = 1e-12);
        assert_relative_eq!(
            limits.intersection_max[1],
            params.x0_max + d_slope * table.plane_z(2),
            epsilon = 1e-9
        );
        // stereo planes see some of the y range
        assert!(limits.slope_max[2] > limits.slope_max[0] - d_slope);
    }

    #[test]
    fn test_limits_cover_v_planes() {
        let table = PlaneTable::standard();
        let params = TrackingParams::default();
        let limits = LocalLineLimits::new(&table, &params);
        for (u, v) in [(3, 5), (9, 11), (15, 17), (21, 23)] {
            let (iu, iv) = (u as usize - 1, v as usize - 1);
            assert_eq!(limits.slope_max[iu], limits.slope_max[iv]);
            assert_eq!(limits.intersection_max[iu], limits.intersection_max[iv]);

            // steepest local line a V plane can see inside the bounds
            let stereo = table.stereo_angle(v);
            assert!(stereo.sin < 0.);
            let d_slope = (table.resolution(v) + table.resolution(v + 1))
                / (table.plane_z(v + 1) - table.plane_z(v));
            let steepest = [(1., -1.), (-1., 1.), (1., 1.), (-1., -1.)]
                .into_iter()
                .map(|(a, b)| (stereo.cos * a * params.tx_max + stereo.sin * b * params.ty_max).abs())
                .fold(0., f64::max);
            assert_relative_eq!(limits.slope_max[iv], steepest + d_slope, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_pairs_recover_true_signs() {
        let table = PlaneTable::standard();
        let params = TrackingParams::default();
        let fitter = TrackletFitter::new(&table, &params);
        let resolver = LeftRightResolver::new(&table, &params);
        let (mut t, sides) = unresolved(&table);
        fitter.fit(&mut t);
        assert!(resolver.resolve_pairs(&mut t, 1e6));
        let signs: Vec<i8> = t.hits.iter().map(|h| h.sign).collect();
        assert_eq!(signs, sides);
        assert!(t.chisq < 1e-4);
    }

    #[test]
    fn test_pairs_respect_threshold() {
        let table = PlaneTable::standard();
        let params = TrackingParams::default();
        let fitter = TrackletFitter::new(&table, &params);
        let resolver = LeftRightResolver::new(&table, &params);
        let (mut t, _) = unresolved(&table);
        fitter.fit(&mut t);
        let before = t.clone();
        assert!(!resolver.resolve_pairs(&mut t, 0.));
        assert_eq!(t.chisq, before.chisq);
        assert!(t.hits.iter().all(|h| h.sign == 0));
    }

    #[test]
    fn test_pairs_skip_resolved_and_dummy() {
        let table = PlaneTable::standard();
        let params = TrackingParams::default();
        let resolver = LeftRightResolver::new(&table, &params);
        let mut t = exact_tracklet(&table, STATION_BACK_PARTIAL, 7..=18, &truth());
        t.hits[0].sign = -1;
        t.hits[1].sign = -1;
        TrackletFitter::new(&table, &params).fit(&mut t);
        // every pair already carries a sign
        assert!(!resolver.resolve_pairs(&mut t, 1e6));
        assert_eq!(t.hits[0].sign, -1);
    }

    #[test]
    fn test_singles_follow_the_track() {
        let table = PlaneTable::standard();
        let params = TrackingParams::default();
        let fitter = TrackletFitter::new(&table, &params);
        let resolver = LeftRightResolver::new(&table, &params);
        let mut t = exact_tracklet(&table, STATION_BACK_PARTIAL, 7..=18, &truth());
        fitter.fit(&mut t);
        t.hits[3].sign = 0;
        t.hits[8].sign = 0;
        assert!(resolver.resolve_singles(&mut t));
        assert_eq!(t.hits[3].sign, 1);
        assert_eq!(t.hits[8].sign, 1);
        assert!(!resolver.resolve_singles(&mut t), "nothing left to resolve");
    }
}
