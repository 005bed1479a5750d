//! Back-partial and global track building.
//!
//! Every station-3 tracklet is paired with every station-2 tracklet; the best accepted
//! combination per station-3 tracklet becomes a back-partial track. Each back-partial track
//! then opens a window in station 1, where a fresh station search runs; the best accepted
//! combination becomes a global track.
//!
//! Global candidates go through two left-right passes of increasing tolerance, a single-hit
//! pass and the bad-hit removal loop before the quality gate sees them.
use crate::constants::*;
use crate::fast_tracking::builder::{StationLayout, TrackletBuilder, ViewWindows};
use crate::fast_tracking::left_right::LeftRightResolver;
use crate::fast_tracking::quality::{EventMasks, TrackletQualityGate};
use crate::fast_tracking::{St1Window, TrackingParams};
use crate::fitting::TrackletFitter;
use crate::geometry::{super_planes, GeometryProvider};
use crate::hits::{HitStore, PositionWindow};
use crate::tracklet::{reduce_similar, sort_best_first, Tracklet};

pub struct TrackletCombiner<'a, G: ?Sized> {
    geometry: &'a G,
    params: &'a TrackingParams,
    fitter: TrackletFitter<'a, G>,
    gate: TrackletQualityGate<'a, G>,
    resolver: LeftRightResolver<'a, G>,
    builder: TrackletBuilder<'a, G>,
    st1: StationLayout,
    st2: StationLayout,
}

impl<'a, G: GeometryProvider + ?Sized> TrackletCombiner<'a, G> {
    pub fn new(geometry: &'a G, params: &'a TrackingParams) -> Self {
        TrackletCombiner {
            geometry,
            params,
            fitter: TrackletFitter::new(geometry, params),
            gate: TrackletQualityGate::new(geometry, params),
            resolver: LeftRightResolver::new(geometry, params),
            builder: TrackletBuilder::new(geometry, params),
            st1: StationLayout::new(geometry, 1),
            st2: StationLayout::new(geometry, 2),
        }
    }

    /// Best back-partial track for every station-3 tracklet, similar ones removed.
    ///
    /// Arguments
    /// -----------------
    /// * `station2`: tracklets of station 2.
    /// * `station3`: tracklets of both station-3 halves.
    /// * `masks`: hodoscope hits of the event.
    ///
    /// Return
    /// ----------
    /// * Back-partial tracks, best first.
    pub fn build_back_partial(
        &self,
        station2: &[Tracklet],
        station3: &[Tracklet],
        masks: &EventMasks,
    ) -> Vec<Tracklet> {
        let field = &self.params.field;
        let mut back_partials = Vec::new();
        for t3 in station3 {
            let mut best = Tracklet::new(STATION_BACK_PARTIAL);
            for t2 in station2 {
                let mut candidate = t2.combine_back_partial(t3, self.geometry, field);
                self.fitter.fit(&mut candidate);
                self.resolver
                    .resolve_pairs(&mut candidate, self.params.lr_tight_back_partial);
                self.resolver
                    .resolve_pairs(&mut candidate, self.params.lr_loose_back_partial);

                if self.gate.accept(&candidate, masks) && candidate.is_better_than(&best) {
                    best = candidate;
                }
            }
            if self.gate.is_valid(&best) {
                back_partials.push(best);
            }
        }

        let n_found = back_partials.len();
        let back_partials = reduce_similar(back_partials);
        tracing::debug!(n_found, n_kept = back_partials.len(), "back-partial tracks");
        back_partials
    }

    /// Best global track for every back-partial track, best first.
    pub fn build_global(
        &self,
        store: &impl HitStore,
        back_partials: &[Tracklet],
        masks: &EventMasks,
    ) -> Vec<Tracklet> {
        let p = self.params;
        let mut globals = Vec::new();
        for bp in back_partials {
            let Some(windows) = self.st1_windows(bp) else {
                continue;
            };
            let station1 = self.builder.build(store, &self.st1, &windows, masks);

            let mut best = Tracklet::new(STATION_GLOBAL);
            for t1 in &station1 {
                let mut candidate = bp.combine_global(t1, self.geometry, &p.field);
                self.fitter.fit(&mut candidate);

                self.resolver.resolve_pairs(&mut candidate, p.lr_tight_global);
                if !self.gate.is_valid(&candidate) {
                    continue;
                }
                self.resolver.resolve_pairs(&mut candidate, p.lr_loose_global);
                self.resolver.resolve_singles(&mut candidate);
                self.remove_bad_hits(&mut candidate);

                if self.gate.accept(&candidate, masks) && candidate.is_better_than(&best) {
                    best = candidate;
                }
            }
            tracing::trace!(
                n_station1 = station1.len(),
                found = self.gate.is_valid(&best),
                "station-1 search around back-partial"
            );
            if self.gate.is_valid(&best) {
                globals.push(best);
            }
        }

        let globals = sort_best_first(globals);
        tracing::debug!(n_global = globals.len(), "global tracks");
        globals
    }

    /// Windows on the X, U, V super planes of station 1 around a back-partial track.
    ///
    /// Return
    /// ----------
    /// * `None` if `t` is not a back-partial track; all windows open in [`St1Window::Open`] mode.
    pub fn st1_windows(&self, t: &Tracklet) -> Option<ViewWindows> {
        if t.station_id != STATION_BACK_PARTIAL {
            return None;
        }
        let windows = match self.params.st1_window {
            St1Window::Open => [None; 3],
            St1Window::FieldAware if self.params.field.kmag_on => self.sagitta_windows(t),
            St1Window::FieldAware | St1Window::Extrapolation => self.extrapolation_windows(t),
        };
        Some(windows)
    }

    /// Downstream plane of a view's super plane.
    fn view_plane(layout: &StationLayout, view: usize) -> DetectorId {
        super_planes(layout.super_ids[view]).1
    }

    /// Windows from the bend-plane sagitta of the back-partial track.
    ///
    /// The sagitta of station 2 relative to the line joining the origin and station 3 scales,
    /// view by view, into the station-1 offset.
    fn sagitta_windows(&self, t: &Tracklet) -> ViewWindows {
        let p = self.params;
        let field = &p.field;
        let z_st3 = t
            .hits
            .last()
            .map_or(self.geometry.plane_z(N_CHAMBER_PLANES as DetectorId), |h| {
                self.geometry.plane_z(h.detector_id())
            });
        let (x_st3, y_st3) = (t.exp_position_x(z_st3, field), t.exp_position_y(z_st3));

        std::array::from_fn(|view| {
            let det_st2 = Self::view_plane(&self.st2, view);
            let pos_st3 = self.geometry.project(det_st2, x_st3, y_st3);

            let z_st2 = self.geometry.plane_z(det_st2);
            let pos_st2 = self.geometry.project(
                det_st2,
                t.exp_position_x(z_st2, field),
                t.exp_position_y(z_st2),
            );
            let sagitta = pos_st2 - pos_st3 * z_st2 / z_st3;

            let z_st1 = self.geometry.plane_z(Self::view_plane(&self.st1, view));
            Some(PositionWindow::new(
                sagitta * p.sagitta_ratio[view] + pos_st3 * z_st1 / z_st3,
                p.st1_window_n_sigma * sagitta * p.sagitta_sigma[view],
            ))
        })
    }

    /// Windows from the straight extrapolation of the back-partial track and its errors.
    fn extrapolation_windows(&self, t: &Tracklet) -> ViewWindows {
        let p = self.params;
        let field = &p.field;
        std::array::from_fn(|view| {
            let det = Self::view_plane(&self.st1, view);
            let z = self.geometry.plane_z(det);
            let stereo = self.geometry.stereo_angle(det);
            let err_x = t.exp_pos_error_x(z, field);
            let err_y = t.exp_pos_error_y(z, field);
            Some(PositionWindow::new(
                stereo.project(t.exp_position_x(z, field), t.exp_position_y(z)),
                p.st1_window_n_sigma * ((stereo.cos * err_x).abs() + (stereo.sin * err_y).abs()),
            ))
        })
    }

    /// Drop, one at a time, the real hit with the largest residual while it exceeds
    /// `hit_reject` times the plane resolution, refitting after each removal.
    ///
    /// Return
    /// ----------
    /// * Number of hits removed.
    pub fn remove_bad_hits(&self, t: &mut Tracklet) -> usize {
        let field = &self.params.field;
        let mut n_removed = 0;
        loop {
            let chisq = t.chisq;
            t.calc_chisq(self.geometry, field);
            t.chisq = chisq;

            let worst = t
                .hits
                .iter()
                .enumerate()
                .filter(|(_, h)| h.is_real())
                .map(|(k, h)| (k, h.detector_id(), t.residual[h.detector_id() as usize - 1].abs()))
                .max_by(|a, b| a.2.total_cmp(&b.2));
            let Some((position, det, residual)) = worst else {
                break;
            };
            if residual <= self.params.hit_reject * self.geometry.resolution(det) {
                break;
            }

            tracing::trace!(detector = det, residual, "removing bad hit");
            t.exclude_hit(position, self.geometry.plane_view(det));
            self.fitter.fit(t);
            n_removed += 1;
        }
        n_removed
    }
}

#[cfg(test)]
mod combiner_test {
    use super::*;
    use crate::fitting::fitting_test::{exact_tracklet, truth};
    use crate::geometry::plane_table::PlaneTable;
    use approx::assert_relative_eq;

    #[test]
    fn test_windows_need_a_back_partial() {
        let table = PlaneTable::standard();
        let params = TrackingParams::default();
        let combiner = TrackletCombiner::new(&table, &params);
        let t = exact_tracklet(&table, 2, 7..=12, &truth());
        assert!(combiner.st1_windows(&t).is_none());
    }

    #[test]
    fn test_open_windows() {
        let table = PlaneTable::standard();
        let params = TrackingParams::builder()
            .st1_window(St1Window::Open)
            .build()
            .unwrap();
        let combiner = TrackletCombiner::new(&table, &params);
        let t = exact_tracklet(&table, STATION_BACK_PARTIAL, 7..=18, &truth());
        assert_eq!(combiner.st1_windows(&t), Some([None; 3]));
    }

    #[test]
    fn test_extrapolation_windows_center_on_the_track() {
        let table = PlaneTable::standard();
        let params = TrackingParams::builder()
            .st1_window(St1Window::Extrapolation)
            .kmag_on(false)
            .build()
            .unwrap();
        let combiner = TrackletCombiner::new(&table, &params);
        let p = truth();
        let mut t = exact_tracklet(&table, STATION_BACK_PARTIAL, 7..=18, &p);
        TrackletFitter::new(&table, &params).fit(&mut t);

        let windows = combiner.st1_windows(&t).unwrap();
        for (view, det) in [2, 4, 6].into_iter().enumerate() {
            let w = windows[view].unwrap();
            assert_relative_eq!(w.center, table.interception(det, p.tx, p.ty, p.x0, p.y0), epsilon = 1e-3);
            assert!(w.half_width > 0.);
        }
    }

    #[test]
    fn test_sagitta_windows() {
        let table = PlaneTable::standard();
        let params = TrackingParams::default();
        let combiner = TrackletCombiner::new(&table, &params);
        let mut t = exact_tracklet(&table, STATION_BACK_PARTIAL, 7..=18, &truth());
        t.x0 = 20.;
        let field = &params.field;

        let windows = combiner.st1_windows(&t).unwrap();
        let z3 = table.plane_z(18);
        let z2 = table.plane_z(8);
        let x3 = t.exp_position_x(z3, field);
        let sagitta = t.exp_position_x(z2, field) - x3 * z2 / z3;
        let w = windows[0].unwrap();
        assert_relative_eq!(w.center, sagitta * 1.8 + x3 * table.plane_z(2) / z3, epsilon = 1e-9);
        assert_relative_eq!(w.half_width, (5. * sagitta * 0.2).abs(), epsilon = 1e-9);
    }

    #[test]
    fn test_remove_bad_hits() {
        let table = PlaneTable::standard();
        let params = TrackingParams::default();
        let fitter = TrackletFitter::new(&table, &params);
        let combiner = TrackletCombiner::new(&table, &params);
        let mut t = exact_tracklet(&table, STATION_BACK_PARTIAL, 7..=18, &truth());
        // shift one X hit by two centimeters
        t.hits[7].hit.pos += 2.;
        fitter.fit(&mut t);
        let chisq_before = t.chisq;
        let n_before = t.n_hits();

        assert_eq!(combiner.remove_bad_hits(&mut t), 1);
        assert_eq!(t.n_hits(), n_before - 1);
        assert!(!t.hits[7].is_real());
        assert!(t.chisq <= chisq_before);
        assert!(t.chisq < 1e-4);
        assert_eq!(combiner.remove_bad_hits(&mut t), 0);
    }
}
