//! In-memory [`HitStore`] for one triggered event.
use std::cmp::Ordering;

use itertools::Itertools;

use crate::constants::{Cm, DetectorId, ElementId};
use crate::geometry::GeometryProvider;
use crate::hits::{Hit, HitStore};

/// Hits of one event, kept sorted by (detector, element, tdc time).
#[derive(Debug, Clone, Default)]
pub struct RawEvent {
    pub run_id: u32,
    pub spill_id: u32,
    pub event_id: u32,
    hits: Vec<Hit>,
    next_index: i32,
}

fn hit_order(a: &Hit, b: &Hit) -> Ordering {
    (a.detector_id, a.element_id)
        .cmp(&(b.detector_id, b.element_id))
        .then(a.tdc_time.total_cmp(&b.tdc_time))
}

impl RawEvent {
    pub fn new(run_id: u32, spill_id: u32, event_id: u32) -> Self {
        RawEvent {
            run_id,
            spill_id,
            event_id,
            ..Default::default()
        }
    }

    /// Build an event from already indexed hits.
    pub fn from_hits(hits: impl IntoIterator<Item = Hit>) -> Self {
        let hits: Vec<Hit> = hits.into_iter().sorted_by(hit_order).collect();
        let next_index = hits.iter().map(|h| h.index + 1).max().unwrap_or(0).max(0);
        RawEvent {
            hits,
            next_index,
            ..Default::default()
        }
    }

    /// Insert a hit, keeping its index.
    pub fn push(&mut self, hit: Hit) {
        let at = self
            .hits
            .partition_point(|h| hit_order(h, &hit) != Ordering::Greater);
        self.next_index = self.next_index.max(hit.index + 1);
        self.hits.insert(at, hit);
    }

    /// Insert an in-time hit on a wire, its position taken from the geometry.
    ///
    /// Return
    /// ----------
    /// * The index assigned to the new hit.
    pub fn add_hit(
        &mut self,
        geometry: &impl GeometryProvider,
        detector_id: DetectorId,
        element_id: ElementId,
        drift_distance: Cm,
    ) -> i32 {
        let index = self.next_index;
        self.push(Hit {
            index,
            detector_id,
            element_id,
            pos: geometry.measurement(detector_id, element_id),
            drift_distance: drift_distance.abs(),
            tdc_time: 0.,
            in_time: true,
        });
        index
    }

    /// Remove the hit with the given index, returning it.
    pub fn remove(&mut self, index: i32) -> Option<Hit> {
        let at = self.hits.iter().position(|h| h.index == index)?;
        Some(self.hits.remove(at))
    }

    pub fn retain_in_time(&mut self) {
        self.hits.retain(|h| h.in_time);
    }

    /// Keep only the earliest hit of every (detector, element) channel.
    pub fn remove_after_pulses(&mut self) {
        self.hits = std::mem::take(&mut self.hits)
            .into_iter()
            .dedup_by(|a, b| a.detector_id == b.detector_id && a.element_id == b.element_id)
            .collect();
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

impl HitStore for RawEvent {
    fn hits(&self) -> &[Hit] {
        &self.hits
    }

    fn hits_on_plane(&self, detector_id: DetectorId) -> Vec<usize> {
        let start = self.hits.partition_point(|h| h.detector_id < detector_id);
        let end = self.hits.partition_point(|h| h.detector_id <= detector_id);
        (start..end).collect()
    }
}
