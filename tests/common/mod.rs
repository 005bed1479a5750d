#![allow(dead_code)]

use approx::assert_abs_diff_eq;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use fasttrack::constants::{DetectorId, N_CHAMBER_PLANES};
use fasttrack::fast_tracking::{St1Window, TrackingParams};
use fasttrack::field::FieldConfig;
use fasttrack::geometry::plane_table::PlaneTable;
use fasttrack::geometry::GeometryProvider;
use fasttrack::hits::raw_event::RawEvent;
use fasttrack::tracklet::{TrackParams, Tracklet};

/// Paddle planes fired by a track.
pub const FIRED_PADDLES: [&str; 6] = ["H1X", "H2X", "H3X", "H4X", "P1X", "P2X"];

/// Downstream parameters of the simulated muon.
pub fn truth() -> TrackParams {
    TrackParams {
        tx: 0.01,
        ty: 0.005,
        x0: 5.,
        y0: -3.,
        invp: 0.05,
    }
}

/// Muon from the target whose KMag bend matches the default X sagitta ratio, so that the
/// field-aware station-1 windows are centered on its hits.
///
/// With Δ = kick·invP, the window center lands on the bent station-1 track when
/// `x0 = −Δ·(z1 − z_bend) / (1 − ratio·(1 − z2/z3) − z1/z3)`, for the X' planes of stations
/// 1 and 2 and the last plane of station 3.
pub fn target_pointing_truth(table: &PlaneTable) -> TrackParams {
    let field = FieldConfig::default();
    let ratio = TrackingParams::default().sagitta_ratio[0];
    let (z1, z2, z3) = (table.plane_z(2), table.plane_z(8), table.plane_z(18));
    let invp = 0.02;
    let kick = field.pt_kick_kmag * invp;
    TrackParams {
        tx: 0.005,
        ty: 0.005,
        x0: -kick * (z1 - field.z_kmag_bend) / (1. - ratio * (1. - z2 / z3) - z1 / z3),
        y0: -3.,
        invp,
    }
}

/// Default configuration with open station-1 windows.
pub fn tracking_params() -> TrackingParams {
    TrackingParams::builder()
        .st1_window(St1Window::Open)
        .build()
        .unwrap()
}

/// True (x, y) of the track at `z`: bent upstream of the KMag, straight downstream.
pub fn true_position(p: &TrackParams, field: &FieldConfig, z: f64) -> (f64, f64) {
    let (tx, x0) = if field.kmag_on && z < field.z_kmag_bend {
        p.xz_in_st1(field)
    } else {
        (p.tx, p.x0)
    };
    (x0 + tx * z, p.y0 + p.ty * z)
}

/// How a synthetic event deviates from the bare track.
#[derive(Default)]
pub struct EventOptions {
    /// Chamber planes left without a hit
    pub dropped_planes: Vec<DetectorId>,
    /// Gaussian smearing of the drift distance
    pub drift_sigma: f64,
    /// Random chamber hits on the side of the detector opposite to the track
    pub n_noise_hits: usize,
    /// Magnet model the track is simulated with
    pub field: FieldConfig,
}

/// Event with one track: a hit on every chamber plane the track crosses and on the fired
/// paddles.
pub fn synthetic_event(table: &PlaneTable, p: &TrackParams) -> RawEvent {
    synthetic_event_with(table, p, &EventOptions::default(), None)
}

pub fn synthetic_event_with(
    table: &PlaneTable,
    p: &TrackParams,
    options: &EventOptions,
    mut rng: Option<&mut StdRng>,
) -> RawEvent {
    let field = &options.field;
    let mut event = RawEvent::new(1, 1, 1);

    for det in 1..=N_CHAMBER_PLANES as DetectorId {
        if options.dropped_planes.contains(&det) {
            continue;
        }
        let Some(plane) = table.plane(det) else {
            continue;
        };
        let (x, y) = true_position(p, field, plane.z);
        if !plane.covers(x, y) {
            continue;
        }
        let u = table.project(det, x, y);
        let Some(elem) = plane.element_at(u) else {
            continue;
        };
        let mut drift = (u - table.measurement(det, elem)).abs();
        if let Some(rng) = rng.as_deref_mut() {
            if options.drift_sigma > 0. {
                let smear = Normal::new(0., options.drift_sigma).unwrap();
                drift = (drift + smear.sample(rng)).abs();
            }
        }
        event.add_hit(table, det, elem, drift);
    }

    for name in FIRED_PADDLES {
        let det = table.detector_ids(&format!("^{name}$")).unwrap()[0];
        let (x, y) = true_position(p, field, table.plane_z(det));
        if let Some(elem) = table.plane(det).and_then(|plane| plane.element_at(table.project(det, x, y))) {
            event.add_hit(table, det, elem, 0.);
        }
    }

    if let Some(rng) = rng {
        for _ in 0..options.n_noise_hits {
            let det: DetectorId = rng.random_range(1..=N_CHAMBER_PLANES as DetectorId);
            let n = table.plane(det).map_or(1, |plane| plane.n_elements);
            // lower quarter of the wires, far from a track at positive x
            let elem = rng.random_range(1..=n / 4);
            let drift = rng.random_range(0.0..0.5 * table.spacing(det));
            event.add_hit(table, det, elem, drift);
        }
    }
    event
}

/// Fitted parameters within `tol` of the truth.
pub fn assert_track_close(t: &Tracklet, p: &TrackParams, tol: [f64; 4]) {
    assert_abs_diff_eq!(t.tx, p.tx, epsilon = tol[0]);
    assert_abs_diff_eq!(t.ty, p.ty, epsilon = tol[1]);
    assert_abs_diff_eq!(t.x0, p.x0, epsilon = tol[2]);
    assert_abs_diff_eq!(t.y0, p.y0, epsilon = tol[3]);
}
