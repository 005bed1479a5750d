//! Tracklet validity and acceptance.
//!
//! [`TrackletQualityGate::is_valid`] only looks at the tracklet itself. [`TrackletQualityGate::accept`]
//! adds the event context: the tracklet must point at fired hodoscope paddles in enough mask
//! groups, and tracks spanning the KMag must cross its bend plane inside the aperture.
use crate::constants::*;
use crate::fast_tracking::TrackingParams;
use crate::geometry::{GeometryProvider, Magnet};
use crate::hits::{Hit, HitStore};
use crate::tracker_errors::TrackerError;
use crate::tracklet::Tracklet;

/// Hodoscope / prop-tube planes of each mask group (H1, H2, H3, H4, prop tubes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskGroups {
    pub detectors: Vec<Vec<DetectorId>>,
}

impl MaskGroups {
    /// Resolve the configured name patterns against the geometry.
    ///
    /// Return
    /// ----------
    /// * `Err(TrackerError::UnmatchedDetectorPattern)` when a pattern selects no plane.
    pub fn resolve(
        geometry: &(impl GeometryProvider + ?Sized),
        patterns: &[String],
    ) -> Result<Self, TrackerError> {
        let detectors = patterns
            .iter()
            .map(|pattern| {
                let ids = geometry.detector_ids(pattern)?;
                if ids.is_empty() {
                    Err(TrackerError::UnmatchedDetectorPattern(pattern.clone()))
                } else {
                    Ok(ids)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MaskGroups { detectors })
    }

    /// Hits of each group in one event.
    pub fn event_hits(&self, store: &impl HitStore) -> EventMasks {
        let all = store.hits();
        EventMasks {
            hits: self
                .detectors
                .iter()
                .map(|ids| {
                    store
                        .hits_in_detectors(ids)
                        .into_iter()
                        .map(|i| all[i])
                        .collect()
                })
                .collect(),
        }
    }
}

/// Mask-group hits of the event being reconstructed.
#[derive(Debug, Clone, Default)]
pub struct EventMasks {
    pub hits: Vec<Vec<Hit>>,
}

/// Mask groups a tracklet of the given station must match.
pub fn required_mask_groups(station_id: StationId) -> &'static [usize] {
    match station_id {
        1 => &[0],
        2 => &[1],
        3 | 4 => &[2],
        STATION_BACK_PARTIAL => &[1, 2, 3, 4],
        STATION_GLOBAL => &[0, 1, 2, 3, 4],
        _ => &[],
    }
}

pub struct TrackletQualityGate<'a, G: ?Sized> {
    geometry: &'a G,
    params: &'a TrackingParams,
}

impl<'a, G: GeometryProvider + ?Sized> TrackletQualityGate<'a, G> {
    pub fn new(geometry: &'a G, params: &'a TrackingParams) -> Self {
        TrackletQualityGate { geometry, params }
    }

    /// Pure validity predicate on the tracklet's own fields.
    pub fn is_valid(&self, t: &Tracklet) -> bool {
        let p = self.params;
        if !(1..=STATION_GLOBAL).contains(&t.station_id) {
            return false;
        }
        if !(t.tx.abs() <= p.tx_max && t.x0.abs() <= p.x0_max) {
            return false;
        }
        if !(t.ty.abs() <= p.ty_max && t.y0.abs() <= p.y0_max) {
            return false;
        }
        if t.err_tx < 0. || t.err_ty < 0. || t.err_x0 < 0. || t.err_y0 < 0. {
            return false;
        }

        let prob = t.prob();
        if prob < p.prob_loose {
            return false;
        }

        let (n_x, n_u, n_v, n) = (t.n_x_hits, t.n_u_hits, t.n_v_hits, t.n_hits());
        match t.station_id {
            STATION_BACK_PARTIAL => n_x >= 2 && n_u >= 2 && n_v >= 2 && n >= 8,
            STATION_GLOBAL => {
                n_x >= 3
                    && n_u >= 3
                    && n_v >= 3
                    && n >= 12
                    && prob >= p.prob_tight
                    && (!p.field.kmag_on || (p.invp_min..=p.invp_max).contains(&t.invp))
            }
            _ => n_x >= 1 && n_u >= 1 && n_v >= 1 && n >= 4 && t.chisq <= p.station_chisq_max,
        }
    }

    /// True if the tracklet points at one of the group's fired paddles.
    pub fn mask_satisfied(&self, t: &Tracklet, group_hits: &[Hit]) -> bool {
        let p = self.params;
        group_hits.iter().any(|h| {
            let Some(paddle) = self.geometry.element_box(h.detector_id, h.element_id) else {
                return false;
            };
            let z = self.geometry.plane_z(h.detector_id);
            let err_x = p.mask_n_sigma * t.exp_pos_error_x(z, &p.field);
            let err_y = p.mask_n_sigma * t.exp_pos_error_y(z, &p.field);
            paddle
                .expanded(p.mask_contingency, err_x, err_y)
                .contains(t.exp_position_x(z, &p.field), t.exp_position_y(z))
        })
    }

    /// Validity plus hodoscope masking and, beyond single stations, the KMag aperture.
    pub fn accept(&self, t: &Tracklet, masks: &EventMasks) -> bool {
        if !self.is_valid(t) {
            return false;
        }

        let required = required_mask_groups(t.station_id);
        let n_satisfied = required
            .iter()
            .filter(|&&g| {
                masks
                    .hits
                    .get(g)
                    .is_some_and(|hits| self.mask_satisfied(t, hits))
            })
            .count();
        if n_satisfied < required.len() {
            tracing::trace!(
                station = t.station_id,
                n_satisfied,
                n_required = required.len(),
                "tracklet fails hodoscope masking"
            );
            return false;
        }

        if t.station_id > N_CHAMBER_STATIONS {
            let z = self.params.field.z_kmag_bend;
            let field = &self.params.field;
            if !self
                .geometry
                .in_aperture(Magnet::KMag, t.exp_position_x(z, field), t.exp_position_y(z))
            {
                return false;
            }
        }
        true
    }
}
