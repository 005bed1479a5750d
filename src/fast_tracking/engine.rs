//! Per-event driver of the fast tracking.
//!
//! [`FastTracking`] holds the read-only geometry and configuration. Each event runs through
//!
//! ```text
//! accept_event → station 2 → stations 3p + 3m → back-partial → station 1 + global
//! ```
//!
//! and stops with an error at the first stage that finds nothing. Nothing is shared between
//! events, so one [`FastTracking`] can serve several threads.
use crate::constants::*;
use crate::fast_tracking::builder::{StationLayout, TrackletBuilder};
use crate::fast_tracking::combiner::TrackletCombiner;
use crate::fast_tracking::quality::MaskGroups;
use crate::fast_tracking::TrackingParams;
use crate::geometry::{station_planes, GeometryProvider};
use crate::hits::HitStore;
use crate::tracker_errors::TrackerError;
use crate::tracklet::rec_track::RecTrack;
use crate::tracklet::Tracklet;

const CHAMBER_GROUPS: [&str; N_CHAMBER_STATIONS as usize] = ["D1", "D2", "D3p", "D3m"];
const HODOSCOPE_GROUPS: [&str; 4] = ["H1", "H2", "H3", "H4"];

/// Tracklet lists of every stage of one event.
#[derive(Debug, Clone, Default)]
pub struct EventTracklets {
    pub station2: Vec<Tracklet>,
    /// Both halves of station 3
    pub station3: Vec<Tracklet>,
    pub back_partial: Vec<Tracklet>,
    pub global: Vec<Tracklet>,
}

pub struct FastTracking<'a, G: ?Sized> {
    geometry: &'a G,
    params: TrackingParams,
    masks: MaskGroups,
    layouts: [StationLayout; N_CHAMBER_STATIONS as usize],
}

impl<'a, G: GeometryProvider + ?Sized> FastTracking<'a, G> {
    /// Check the geometry against the configuration and precompute the station layouts.
    ///
    /// Return
    /// ----------
    /// * `Err(TrackerError::InvalidTrackingParameter)` if `params` fails
    ///   [`TrackingParams::validate`].
    /// * `Err(TrackerError::UnknownDetector)` if a chamber plane is missing from the geometry.
    /// * `Err(TrackerError::UnmatchedDetectorPattern)` if a mask pattern selects no plane.
    pub fn new(geometry: &'a G, params: TrackingParams) -> Result<Self, TrackerError> {
        params.validate()?;
        if let Some(missing) =
            (1..=N_CHAMBER_PLANES as DetectorId).find(|&det| !geometry.has_detector(det))
        {
            return Err(TrackerError::UnknownDetector(missing));
        }
        let masks = MaskGroups::resolve(geometry, &params.mask_patterns)?;
        let layouts = std::array::from_fn(|k| StationLayout::new(geometry, k as StationId + 1));
        tracing::debug!(params = %params, "fast tracking configured");
        Ok(FastTracking {
            geometry,
            params,
            masks,
            layouts,
        })
    }

    pub fn params(&self) -> &TrackingParams {
        &self.params
    }

    pub fn geometry(&self) -> &G {
        self.geometry
    }

    /// Reject events whose chamber or hodoscope occupancy exceeds the configured caps.
    pub fn accept_event(&self, store: &impl HitStore) -> Result<(), TrackerError> {
        let chambers = (1..=N_CHAMBER_STATIONS).map(|st| {
            let planes: Vec<DetectorId> = station_planes(st).collect();
            store.n_hits_in_detectors(&planes)
        });
        let hodoscopes = self
            .masks
            .detectors
            .iter()
            .map(|ids| store.n_hits_in_detectors(ids));

        let checks = CHAMBER_GROUPS
            .iter()
            .zip(chambers.zip(self.params.max_chamber_hits))
            .chain(
                HODOSCOPE_GROUPS
                    .iter()
                    .zip(hodoscopes.zip(self.params.max_hodo_hits)),
            );
        for (group, (n_hits, limit)) in checks {
            if n_hits > limit {
                tracing::warn!(group = *group, n_hits, limit, "event rejected");
                return Err(TrackerError::EventRejected {
                    group: group.to_string(),
                    n_hits,
                    limit,
                });
            }
        }
        Ok(())
    }

    /// Run every stage on one event and keep the intermediate lists.
    pub fn reconstruct(&self, store: &impl HitStore) -> Result<EventTracklets, TrackerError> {
        self.accept_event(store)?;
        let masks = self.masks.event_hits(store);
        let builder = TrackletBuilder::new(self.geometry, &self.params);
        let open = [None; 3];

        let station2 = builder.build(store, &self.layouts[1], &open, &masks);
        if station2.is_empty() {
            return Err(TrackerError::NoTrackletInStation(2));
        }

        let mut station3 = builder.build(store, &self.layouts[2], &open, &masks);
        station3.extend(builder.build(store, &self.layouts[3], &open, &masks));
        if station3.is_empty() {
            return Err(TrackerError::NoTrackletInStation(3));
        }

        let combiner = TrackletCombiner::new(self.geometry, &self.params);
        let back_partial = combiner.build_back_partial(&station2, &station3, &masks);
        if back_partial.is_empty() {
            return Err(TrackerError::NoBackPartialTrack);
        }

        let global = combiner.build_global(store, &back_partial, &masks);
        if global.is_empty() {
            return Err(TrackerError::NoGlobalTrack);
        }

        tracing::debug!(
            n_station2 = station2.len(),
            n_station3 = station3.len(),
            n_back_partial = back_partial.len(),
            n_global = global.len(),
            "event reconstructed"
        );
        Ok(EventTracklets {
            station2,
            station3,
            back_partial,
            global,
        })
    }

    /// Global tracks of one event, best first.
    pub fn process_event(&self, store: &impl HitStore) -> Result<Vec<Tracklet>, TrackerError> {
        self.reconstruct(store).map(|stages| stages.global)
    }

    /// Process independent events one after the other; a failing event does not stop the batch.
    pub fn reconstruct_batch<'e, S: HitStore + 'e>(
        &self,
        events: impl IntoIterator<Item = &'e S>,
    ) -> Vec<Result<Vec<Tracklet>, TrackerError>> {
        events
            .into_iter()
            .map(|event| self.process_event(event))
            .collect()
    }

    /// Export global tracks with their vertex swim.
    pub fn rec_tracks(&self, tracklets: &[Tracklet]) -> Vec<RecTrack> {
        tracklets
            .iter()
            .map(|t| t.to_rec_track(self.geometry, &self.params.field))
            .collect()
    }
}

#[cfg(test)]
mod engine_test {
    use super::*;
    use crate::geometry::plane_table::PlaneTable;
    use crate::hits::raw_event::RawEvent;

    fn is_sync<T: Sync>(_: &T) {}

    #[test]
    fn test_new_checks_geometry() {
        let table = PlaneTable::standard();
        let tracking = FastTracking::new(&table, TrackingParams::default()).unwrap();
        is_sync(&tracking);
        assert_eq!(tracking.layouts[3].station_id, 4);

        let params = TrackingParams::builder()
            .mask_patterns([
                "^H1X$".into(),
                "^H2X$".into(),
                "^H3X$".into(),
                "^H4X$".into(),
                "^Q[12]X$".into(),
            ])
            .build()
            .unwrap();
        assert_eq!(
            FastTracking::new(&table, params).err(),
            Some(TrackerError::UnmatchedDetectorPattern("^Q[12]X$".into()))
        );
    }

    #[test]
    fn test_new_checks_params() {
        let table = PlaneTable::standard();
        let params = TrackingParams {
            tx_max: -1.,
            ..TrackingParams::default()
        };
        assert!(matches!(
            FastTracking::new(&table, params),
            Err(TrackerError::InvalidTrackingParameter(_))
        ));

        let params = TrackingParams {
            lr_tight_global: 2000.,
            ..TrackingParams::default()
        };
        assert_eq!(
            FastTracking::new(&table, params).err(),
            TrackingParams::builder().lr_global(2000., 1000.).build().err()
        );
    }

    #[test]
    fn test_accept_event_caps() {
        let table = PlaneTable::standard();
        let params = TrackingParams::builder()
            .max_hodo_hits([25, 2, 10, 10])
            .build()
            .unwrap();
        let tracking = FastTracking::new(&table, params).unwrap();
        let h2x = table.detector_ids("^H2X$").unwrap()[0];

        let mut event = RawEvent::new(1, 1, 1);
        for elem in 1..=2 {
            event.add_hit(&table, h2x, elem, 0.);
        }
        assert!(tracking.accept_event(&event).is_ok());
        event.add_hit(&table, h2x, 3, 0.);
        assert_eq!(
            tracking.accept_event(&event),
            Err(TrackerError::EventRejected {
                group: "H2".into(),
                n_hits: 3,
                limit: 2
            })
        );
    }

    #[test]
    fn test_empty_event_has_no_station2_tracklet() {
        let table = PlaneTable::standard();
        let tracking = FastTracking::new(&table, TrackingParams::default()).unwrap();
        let event = RawEvent::new(1, 1, 1);
        assert_eq!(
            tracking.process_event(&event).err(),
            Some(TrackerError::NoTrackletInStation(2))
        );
        let results = tracking.reconstruct_batch([&event, &event]);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_err()));
    }
}
