mod common;

use fasttrack::fast_tracking::builder::{StationLayout, TrackletBuilder};
use fasttrack::fast_tracking::combiner::TrackletCombiner;
use fasttrack::fast_tracking::engine::FastTracking;
use fasttrack::fast_tracking::quality::MaskGroups;
use fasttrack::fitting::TrackletFitter;
use fasttrack::geometry::plane_table::PlaneTable;
use fasttrack::fast_tracking::{St1Window, TrackingParams};
use fasttrack::geometry::GeometryProvider;
use fasttrack::hits::HitStore;

use crate::common::{
    synthetic_event, target_pointing_truth, tracking_params, true_position, truth,
};

#[test]
fn test_u_hit_outside_window_is_never_used() {
    let table = PlaneTable::standard();
    let params = tracking_params();
    let mut event = synthetic_event(&table, &truth());
    let layout = StationLayout::new(&table, 2);

    let x_hits: Vec<f64> = event
        .hits()
        .iter()
        .filter(|h| h.detector_id == 7 || h.detector_id == 8)
        .map(|h| h.pos)
        .collect();
    assert_eq!(x_hits.len(), 2);
    let x_pos = 0.5 * (x_hits[0] + x_hits[1]);
    let window = TrackletBuilder::<PlaneTable>::u_window(&layout, x_pos);

    let plane = table.plane(9).unwrap();
    let elem = plane
        .element_at(window.center + 2. * window.half_width)
        .unwrap();
    assert!(!window.contains(table.measurement(9, elem)));
    let outlier = event.add_hit(&table, 9, elem, 0.3);

    let builder = TrackletBuilder::new(&table, &params);
    let masks = MaskGroups::resolve(&table, &params.mask_patterns)
        .unwrap()
        .event_hits(&event);
    let tracklets = builder.build(&event, &layout, &[None; 3], &masks);

    assert!(!tracklets.is_empty());
    assert!(tracklets
        .iter()
        .all(|t| t.hits.iter().all(|h| h.hit.index != outlier)));
}

#[test]
fn test_bad_hit_removal_lowers_chisq() {
    let table = PlaneTable::standard();
    let params = tracking_params();
    let tracking = FastTracking::new(&table, params.clone()).unwrap();
    let event = synthetic_event(&table, &truth());
    let mut track = tracking.process_event(&event).unwrap().remove(0);

    // displace the station-3 X' hit
    assert_eq!(track.hits[13].detector_id(), 14);
    track.hits[13].hit.pos += 1.5;
    TrackletFitter::new(&table, &params).fit(&mut track);
    let chisq_before = track.chisq;
    assert!(chisq_before > 100.);

    let combiner = TrackletCombiner::new(&table, &params);
    let n_removed = combiner.remove_bad_hits(&mut track);
    assert_eq!(n_removed, 1);
    assert!(track.chisq < chisq_before);
    assert!(!track.hits[13].is_real());
    assert_eq!(track.n_hits(), 17);
    assert_eq!(track.n_x_hits, 5);

    // nothing left above the cut
    assert_eq!(combiner.remove_bad_hits(&mut track), 0);
    for h in track.hits.iter().filter(|h| h.is_real()) {
        let det = h.detector_id();
        assert!(track.residual[det as usize - 1].abs() <= params.hit_reject * table.resolution(det));
    }
}

#[test]
fn test_station1_windows_follow_mode() {
    let table = PlaneTable::standard();
    let params = tracking_params();
    let tracking = FastTracking::new(&table, params.clone()).unwrap();
    let stages = tracking.reconstruct(&synthetic_event(&table, &truth())).unwrap();
    let combiner = TrackletCombiner::new(&table, &params);

    assert_eq!(combiner.st1_windows(&stages.back_partial[0]), Some([None; 3]));
    assert_eq!(combiner.st1_windows(&stages.global[0]), None);
    assert_eq!(combiner.st1_windows(&stages.station2[0]), None);
}

#[test]
fn test_station_fits_with_default_params() {
    let table = PlaneTable::standard();
    let params = TrackingParams::default();
    let event = synthetic_event(&table, &truth());
    let masks = MaskGroups::resolve(&table, &params.mask_patterns)
        .unwrap()
        .event_hits(&event);
    let builder = TrackletBuilder::new(&table, &params);

    let station2 = builder.build(&event, &StationLayout::new(&table, 2), &[None; 3], &masks);
    let station3 = builder.build(&event, &StationLayout::new(&table, 3), &[None; 3], &masks);
    assert_eq!((station2.len(), station3.len()), (1, 1));
    for t in station2.iter().chain(&station3) {
        assert!(t.chisq <= params.station_chisq_max, "chisq = {}", t.chisq);
        assert!(t.err_tx > 0. && t.err_ty > 0. && t.err_x0 > 0. && t.err_y0 > 0.);
    }

    let combiner = TrackletCombiner::new(&table, &params);
    let back_partial = combiner.build_back_partial(&station2, &station3, &masks);
    assert_eq!(back_partial.len(), 1);
    common::assert_track_close(&back_partial[0], &truth(), [1e-4, 1e-3, 0.1, 0.5]);
}

#[test]
fn test_field_aware_windows_skip_far_station1_hits() {
    let table = PlaneTable::standard();
    let params = TrackingParams::default();
    assert_eq!(params.st1_window, St1Window::FieldAware);
    let tracking = FastTracking::new(&table, params.clone()).unwrap();
    let p = target_pointing_truth(&table);
    let mut event = synthetic_event(&table, &p);

    // X and X' hits 20 cm away from the track
    let (x, _) = true_position(&p, &params.field, table.plane_z(1));
    let mut far = Vec::new();
    let mut far_pos = 0.;
    for det in [1, 2] {
        let elem = table.plane(det).unwrap().element_at(x - 20.).unwrap();
        far.push(event.add_hit(&table, det, elem, 0.2));
        far_pos += 0.5 * table.measurement(det, elem);
    }

    let stages = tracking.reconstruct(&event).unwrap();
    let combiner = TrackletCombiner::new(&table, &params);
    let windows = combiner.st1_windows(&stages.back_partial[0]).unwrap();
    let x_window = windows[0].unwrap();
    assert!(x_window.contains(x), "{x} not in {x_window:?}");
    assert!(!x_window.contains(far_pos));
    for (view, det) in [(1, 4), (2, 6)] {
        let (x, y) = true_position(&p, &params.field, table.plane_z(det));
        assert!(windows[view].unwrap().contains(table.project(det, x, y)));
    }

    assert_eq!(stages.global.len(), 1);
    let track = &stages.global[0];
    assert_eq!(track.n_hits(), 18);
    assert!(track.hits.iter().all(|h| !far.contains(&h.hit.index)));
}
