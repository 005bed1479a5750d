//! # Hits and hit stores
//!
//! A [`Hit`] is one digitized plane measurement. Tracking reads hits through the [`HitStore`]
//! trait, which answers the three queries the tracklet search needs:
//!
//! * all hits of one plane ([`HitStore::hits_on_plane`]),
//! * hit pairs on the two planes of a super plane, optionally restricted to a position window
//!   ([`HitStore::adjacent_pairs_in_super_detector`]),
//! * all hits of a detector group ([`HitStore::hits_in_detectors`]).
//!
//! Hits are referred to by their position in [`HitStore::hits`]; the position is stable for the
//! lifetime of the store.
use crate::constants::{Cm, DetectorId, ElementId, DUMMY_INDEX};
use crate::geometry::super_planes;

pub mod raw_event;

/// A single detector-plane measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Unique index inside the event; negative for placeholders
    pub index: i32,
    pub detector_id: DetectorId,
    pub element_id: ElementId,
    /// Wire / paddle position along the measuring direction
    pub pos: Cm,
    /// Drift distance magnitude
    pub drift_distance: Cm,
    pub tdc_time: f64,
    pub in_time: bool,
}

impl Hit {
    /// Placeholder for a plane without a measurement.
    pub fn dummy(detector_id: DetectorId) -> Self {
        Hit {
            index: DUMMY_INDEX,
            detector_id,
            element_id: 0,
            pos: 0.,
            drift_distance: 0.,
            tdc_time: 0.,
            in_time: false,
        }
    }

    #[inline]
    pub fn is_real(&self) -> bool {
        self.index >= 0
    }
}

/// One or two hits on the two planes of a super plane, as positions in [`HitStore::hits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitPair {
    pub first: usize,
    pub second: Option<usize>,
}

impl HitPair {
    pub fn single(first: usize) -> Self {
        HitPair {
            first,
            second: None,
        }
    }

    pub fn pair(first: usize, second: usize) -> Self {
        HitPair {
            first,
            second: Some(second),
        }
    }

    /// Iterate over the hits of the pair.
    pub fn iter(&self) -> impl Iterator<Item = usize> {
        std::iter::once(self.first).chain(self.second)
    }
}

/// Interval `[center − half_width, center + half_width]` on a measuring coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionWindow {
    pub center: Cm,
    pub half_width: Cm,
}

impl PositionWindow {
    pub fn new(center: Cm, half_width: Cm) -> Self {
        PositionWindow {
            center,
            half_width: half_width.abs(),
        }
    }

    #[inline]
    pub fn contains(&self, pos: Cm) -> bool {
        (pos - self.center).abs() <= self.half_width
    }
}

/// Read access to the hits of one event.
pub trait HitStore {
    fn hits(&self) -> &[Hit];

    /// Positions of the hits on one plane.
    fn hits_on_plane(&self, detector_id: DetectorId) -> Vec<usize>;

    /// Hit pairs on the two planes of a super plane.
    ///
    /// Two hits form a pair when their element numbers differ by at most one (the planes are
    /// staggered by half a cell). A hit without partner on the other plane is returned as a
    /// single. With a `window`, only hits whose position lies inside it are considered.
    ///
    /// Return
    /// ----------
    /// * Pairs first, then singles of the upstream plane, then singles of the downstream plane.
    fn adjacent_pairs_in_super_detector(
        &self,
        super_id: DetectorId,
        window: Option<PositionWindow>,
    ) -> Vec<HitPair> {
        let (up, down) = super_planes(super_id);
        let hits = self.hits();
        let keep = |&i: &usize| window.map_or(true, |w| w.contains(hits[i].pos));
        let first: Vec<usize> = self.hits_on_plane(up).into_iter().filter(keep).collect();
        let second: Vec<usize> = self.hits_on_plane(down).into_iter().filter(keep).collect();

        let mut pairs = Vec::new();
        let mut paired_second = vec![false; second.len()];
        let mut singles = Vec::new();
        for &i in &first {
            let mut paired = false;
            for (k, &j) in second.iter().enumerate() {
                if hits[i].element_id.abs_diff(hits[j].element_id) <= 1 {
                    pairs.push(HitPair::pair(i, j));
                    paired_second[k] = true;
                    paired = true;
                }
            }
            if !paired {
                singles.push(HitPair::single(i));
            }
        }
        pairs.extend(singles);
        pairs.extend(
            second
                .iter()
                .zip(paired_second)
                .filter(|(_, paired)| !paired)
                .map(|(&j, _)| HitPair::single(j)),
        );
        pairs
    }

    /// Positions of the hits on any of the given planes.
    fn hits_in_detectors(&self, detector_ids: &[DetectorId]) -> Vec<usize> {
        detector_ids
            .iter()
            .flat_map(|&id| self.hits_on_plane(id))
            .collect()
    }

    fn n_hits_in_detectors(&self, detector_ids: &[DetectorId]) -> usize {
        detector_ids
            .iter()
            .map(|&id| self.hits_on_plane(id).len())
            .sum()
    }
}
