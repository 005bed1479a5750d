//! Station-local tracklet search.
//!
//! For every X pair of a station, the U pairs inside a window around the X position
//! projected on the U view are tried; for every surviving X–U combination, the V pairs
//! inside a window around `2·x·cosθ − u` are tried. Each accepted (X, U, V) triple becomes a
//! candidate tracklet with unresolved drift signs. The fit of a candidate starts on the line
//! through the target that best matches its hits, then the quality gate decides.
//!
//! ```text
//! U window:  x·cosθ ± ( |½·scale_y·sinθ / spacing| + 2·spacing )
//! V window:  2·x·cosθ − u ± ( 2·spacing·cosθ + |(z_u + z_v − 2·z_x)·cosθ·tx_max| + |(z_v − z_u)·sinθ·ty_max| )
//! ```
//!
//! A pair uses the mean z of its super plane, a single hit its own plane z.
use crate::constants::*;
use crate::fast_tracking::quality::{EventMasks, TrackletQualityGate};
use crate::fast_tracking::TrackingParams;
use crate::fitting::TrackletFitter;
use crate::geometry::{station_planes, super_id, super_planes, GeometryProvider, PlaneView, StereoAngle};
use crate::hits::{HitPair, HitStore, PositionWindow};
use crate::tracklet::{SignedHit, Tracklet};

/// Optional position windows on the X, U and V super planes of a station.
pub type ViewWindows = [Option<PositionWindow>; 3];

/// Window geometry of one station, computed once per geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationLayout {
    pub station_id: StationId,
    /// Super planes of the X, U and V views
    pub super_ids: [DetectorId; 3],
    pub u_window: Cm,
    pub u_stereo: StereoAngle,
    /// Mean z of the X, U and V super planes
    pub z_views: [Cm; 3],
}

impl StationLayout {
    pub fn new(geometry: &(impl GeometryProvider + ?Sized), station_id: StationId) -> Self {
        let first = *station_planes(station_id).start();
        let mut super_ids = [super_id(first), super_id(first + 2), super_id(first + 4)];
        for det in station_planes(station_id).step_by(2) {
            if let Some(k) = geometry.plane_view(det).index() {
                super_ids[k] = super_id(det);
            }
        }

        let z_views = super_ids.map(|sid| {
            let (a, b) = super_planes(sid);
            0.5 * (geometry.plane_z(a) + geometry.plane_z(b))
        });
        let (u_plane, _) = super_planes(super_ids[1]);
        let u_stereo = geometry.stereo_angle(u_plane);
        let spacing = geometry.spacing(u_plane);
        let u_window =
            (0.5 * geometry.scale(u_plane).y * u_stereo.sin / spacing).abs() + 2. * spacing;

        StationLayout {
            station_id,
            super_ids,
            u_window,
            u_stereo,
            z_views,
        }
    }
}

/// Forms, fits and filters the tracklets of one station.
pub struct TrackletBuilder<'a, G: ?Sized> {
    geometry: &'a G,
    params: &'a TrackingParams,
    fitter: TrackletFitter<'a, G>,
    gate: TrackletQualityGate<'a, G>,
}

impl<'a, G: GeometryProvider + ?Sized> TrackletBuilder<'a, G> {
    pub fn new(geometry: &'a G, params: &'a TrackingParams) -> Self {
        TrackletBuilder {
            geometry,
            params,
            fitter: TrackletFitter::new(geometry, params),
            gate: TrackletQualityGate::new(geometry, params),
        }
    }

    /// Measured position of a pair: the mean of both hits, or the single hit.
    fn pair_position(store: &impl HitStore, pair: &HitPair) -> Cm {
        let hits = store.hits();
        match pair.second {
            Some(j) => 0.5 * (hits[pair.first].pos + hits[j].pos),
            None => hits[pair.first].pos,
        }
    }

    fn pair_z(&self, store: &impl HitStore, pair: &HitPair, mean_z: Cm) -> Cm {
        match pair.second {
            Some(_) => mean_z,
            None => self.geometry.plane_z(store.hits()[pair.first].detector_id),
        }
    }

    /// Window on the U view for an X position.
    pub fn u_window(layout: &StationLayout, x_pos: Cm) -> PositionWindow {
        PositionWindow::new(x_pos * layout.u_stereo.cos, layout.u_window)
    }

    /// Window on the V view for an X–U combination.
    pub fn v_window(
        &self,
        layout: &StationLayout,
        x_pos: Cm,
        z_x: Cm,
        u_pos: Cm,
        z_u: Cm,
        u_detector: DetectorId,
    ) -> PositionWindow {
        let (cos, sin) = (layout.u_stereo.cos, layout.u_stereo.sin);
        let z_v = layout.z_views[2];
        let half_width = self.geometry.spacing(u_detector) * 2. * cos
            + ((z_u + z_v - 2. * z_x) * cos * self.params.tx_max).abs()
            + ((z_v - z_u) * sin * self.params.ty_max).abs();
        PositionWindow::new(2. * x_pos * cos - u_pos, half_width)
    }

    fn candidate(
        store: &impl HitStore,
        station_id: StationId,
        combination: [&HitPair; 3],
    ) -> Tracklet {
        const VIEWS: [PlaneView; 3] = [PlaneView::X, PlaneView::U, PlaneView::V];
        let hits = store.hits();
        let mut t = Tracklet::new(station_id);
        for (pair, view) in combination.into_iter().zip(VIEWS) {
            for i in pair.iter() {
                t.push_hit(SignedHit::new(hits[i], 0), view);
            }
        }
        t.sort_hits();
        t
    }

    /// All accepted tracklets of a station.
    ///
    /// Arguments
    /// -----------------
    /// * `store`: hits of the event.
    /// * `layout`: window geometry of the station.
    /// * `windows`: optional pre-selection windows on the X, U, V super planes.
    /// * `masks`: hodoscope hits used by the acceptance.
    ///
    /// Return
    /// ----------
    /// * Fitted tracklets with placeholders on their empty planes.
    pub fn build(
        &self,
        store: &impl HitStore,
        layout: &StationLayout,
        windows: &ViewWindows,
        masks: &EventMasks,
    ) -> Vec<Tracklet> {
        let [pairs_x, pairs_u, pairs_v] = [0, 1, 2].map(|k| {
            store.adjacent_pairs_in_super_detector(layout.super_ids[k], windows[k])
        });
        let mut n_candidates = 0usize;
        let mut tracklets = Vec::new();

        for xp in &pairs_x {
            let x_pos = Self::pair_position(store, xp);
            let z_x = self.pair_z(store, xp, layout.z_views[0]);
            let u_win = Self::u_window(layout, x_pos);

            for up in &pairs_u {
                let u_pos = Self::pair_position(store, up);
                if !u_win.contains(u_pos) {
                    continue;
                }
                let z_u = self.pair_z(store, up, layout.z_views[1]);
                let u_detector = store.hits()[up.first].detector_id;
                let v_win = self.v_window(layout, x_pos, z_x, u_pos, z_u, u_detector);

                for vp in &pairs_v {
                    if !v_win.contains(Self::pair_position(store, vp)) {
                        continue;
                    }
                    n_candidates += 1;
                    let mut t = Self::candidate(store, layout.station_id, [xp, up, vp]);
                    if self.gate.is_valid(&t) {
                        continue;
                    }
                    self.fitter.seed_from_hits(&mut t);
                    self.fitter.fit(&mut t);
                    if self.gate.accept(&t, masks) {
                        tracklets.push(t);
                    }
                }
            }
        }

        for t in &mut tracklets {
            t.add_dummy_hits();
        }
        tracing::debug!(
            station = layout.station_id,
            n_x = pairs_x.len(),
            n_u = pairs_u.len(),
            n_v = pairs_v.len(),
            n_candidates,
            n_accepted = tracklets.len(),
            "station search"
        );
        tracklets
    }
}

#[cfg(test)]
mod builder_test {
    use super::*;
    use crate::fast_tracking::quality::MaskGroups;
    use crate::geometry::plane_table::PlaneTable;
    use crate::hits::raw_event::RawEvent;
    use crate::hits::Hit;
    use approx::assert_relative_eq;

    #[test]
    fn test_station_layout() {
        let table = PlaneTable::standard();
        let layout = StationLayout::new(&table, 2);
        assert_eq!(layout.super_ids, [4, 5, 6]);
        assert_relative_eq!(layout.z_views[0], 1340.6, epsilon = 1e-12);
        assert_relative_eq!(
            layout.u_window,
            0.5 * 132. * 14f64.to_radians().sin() / 2.021 + 2. * 2.021,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_u_window_per_station() {
        let table = PlaneTable::standard();
        let sin = 14f64.to_radians().sin();
        // (station, scale_y, spacing)
        for (station, scale_y, spacing) in [(1, 101.6, 0.635), (2, 132., 2.021), (3, 166., 2.), (4, 166., 2.)] {
            let layout = StationLayout::new(&table, station);
            assert_relative_eq!(
                layout.u_window,
                0.5 * scale_y * sin / spacing + 2. * spacing,
                epsilon = 1e-12
            );
        }
        // D1 cells are narrow, so its window is the widest
        assert_relative_eq!(StationLayout::new(&table, 1).u_window, 20.62, epsilon = 0.01);
        assert_relative_eq!(StationLayout::new(&table, 2).u_window, 11.94, epsilon = 0.01);
    }

    #[test]
    fn test_u_window_is_centered_on_projected_x() {
        let table = PlaneTable::standard();
        let layout = StationLayout::new(&table, 1);
        let w = TrackletBuilder::<PlaneTable>::u_window(&layout, 10.);
        assert_relative_eq!(w.center, 10. * 14f64.to_radians().cos(), epsilon = 1e-12);
        assert_relative_eq!(w.half_width, layout.u_window, epsilon = 1e-12);
    }

    #[test]
    fn test_v_window_contains_straight_track() {
        let table = PlaneTable::standard();
        let params = TrackingParams::default();
        let builder = TrackletBuilder::new(&table, &params);
        let layout = StationLayout::new(&table, 2);
        let (tx, ty, x0, y0) = (0.05, -0.08, 20., 10.);
        let x_pos = x0 + tx * layout.z_views[0];
        let u_det = 9;
        let u_pos = table.interception(u_det, tx, ty, x0, y0);
        let v_pos = table.interception(11, tx, ty, x0, y0);
        let w = builder.v_window(&layout, x_pos, layout.z_views[0], u_pos, table.plane_z(u_det), u_det);
        assert!(w.contains(v_pos), "{v_pos} not in {w:?}");
    }

    #[test]
    fn test_empty_station_gives_nothing() {
        let table = PlaneTable::standard();
        let params = TrackingParams::default();
        let builder = TrackletBuilder::new(&table, &params);
        let layout = StationLayout::new(&table, 2);
        let event = RawEvent::from_hits(Vec::<Hit>::new());
        let masks = MaskGroups::resolve(&table, &params.mask_patterns)
            .unwrap()
            .event_hits(&event);
        assert!(builder.build(&event, &layout, &[None; 3], &masks).is_empty());
    }
}
