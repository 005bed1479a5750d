//! # Tracklets
//!
//! A [`Tracklet`] is a track candidate local to one station (1..=4), to stations 2 and 3
//! (*back-partial*, station ID 5) or to the whole spectrometer (*global*, station ID 6).
//!
//! ## Invariants
//!
//! * the hit list is sorted by detector ID after every public mutation,
//! * `n_x_hits + n_u_hits + n_v_hits` equals the number of real (index ≥ 0) hits in the list,
//! * the residual of a plane is only meaningful when a real hit sits on it,
//! * `chisq` and the parameter errors are only meaningful after a fit (errors stay negative
//!   until then).
//!
//! Placeholders (*dummy hits*, index −1) fill the planes of a station that have no
//! measurement, so that every station contributes exactly one entry per plane. Removing a bad
//! hit turns its entry into a placeholder.
//!
//! ## Submodules
//!
//! * [`projection`] – track parameters, field-kink regions, expected positions and errors,
//! * [`chisq`] – residuals and chi-square against the geometry,
//! * [`combine`] – back-partial and global combination,
//! * [`rec_track`] – the exported per-node track record.
use std::fmt;

use itertools::{EitherOrBoth, Itertools};
use smallvec::SmallVec;
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::constants::*;
use crate::geometry::{station_planes, PlaneView};
use crate::hits::Hit;

pub mod chisq;
pub mod combine;
pub mod projection;
pub mod rec_track;

pub use projection::{KinkRegion, TrackParams};

/// A hit with a left/right drift-sign hypothesis.
///
/// Equality compares the underlying hit index only, so the same physical hit under two sign
/// hypotheses compares equal. Lists of signed hits are ordered by detector ID.
#[derive(Debug, Clone, Copy)]
pub struct SignedHit {
    pub hit: Hit,
    /// −1, +1, or 0 when the side is not known yet
    pub sign: i8,
}

impl PartialEq for SignedHit {
    fn eq(&self, other: &Self) -> bool {
        self.hit.index == other.hit.index
    }
}

impl SignedHit {
    pub fn new(hit: Hit, sign: i8) -> Self {
        SignedHit { hit, sign }
    }

    pub fn dummy(detector_id: DetectorId) -> Self {
        SignedHit {
            hit: Hit::dummy(detector_id),
            sign: 0,
        }
    }

    #[inline]
    pub fn detector_id(&self) -> DetectorId {
        self.hit.detector_id
    }

    #[inline]
    pub fn is_real(&self) -> bool {
        self.hit.is_real()
    }

    /// Measured position under the current sign hypothesis.
    #[inline]
    pub fn pos(&self) -> Cm {
        self.hit.pos + self.sign as f64 * self.hit.drift_distance.abs()
    }
}

pub type SignedHits = SmallVec<[SignedHit; 6]>;

/// Track candidate with its hits, fitted parameters and fit quality.
#[derive(Debug, Clone)]
pub struct Tracklet {
    pub station_id: StationId,

    // --- Hit content ---
    pub n_x_hits: usize,
    pub n_u_hits: usize,
    pub n_v_hits: usize,
    pub hits: SignedHits,

    // --- Fitted parameters ---
    pub tx: f64,
    pub ty: f64,
    pub x0: Cm,
    pub y0: Cm,
    pub invp: f64,

    // --- Errors (negative until fitted) ---
    pub err_tx: f64,
    pub err_ty: f64,
    pub err_x0: Cm,
    pub err_y0: Cm,
    pub err_invp: f64,

    // --- Fit quality ---
    pub chisq: f64,
    /// Inverse momentum was a free parameter of the last fit
    pub invp_free: bool,
    pub residual: [Cm; N_CHAMBER_PLANES],
}

impl Tracklet {
    pub fn new(station_id: StationId) -> Self {
        Tracklet {
            station_id,
            n_x_hits: 0,
            n_u_hits: 0,
            n_v_hits: 0,
            hits: SignedHits::new(),
            tx: 0.,
            ty: 0.,
            x0: 0.,
            y0: 0.,
            invp: DEFAULT_INVP,
            err_tx: -1.,
            err_ty: -1.,
            err_x0: -1.,
            err_y0: -1.,
            err_invp: -1.,
            chisq: UNFITTED_CHISQ,
            invp_free: false,
            residual: [UNSET_RESIDUAL; N_CHAMBER_PLANES],
        }
    }

    /// Number of real hits.
    pub fn n_hits(&self) -> usize {
        self.n_x_hits + self.n_u_hits + self.n_v_hits
    }

    /// Current parameters as a value.
    pub fn params(&self) -> TrackParams {
        TrackParams {
            tx: self.tx,
            ty: self.ty,
            x0: self.x0,
            y0: self.y0,
            invp: self.invp,
        }
    }

    pub fn set_params(&mut self, p: &TrackParams) {
        self.tx = p.tx;
        self.ty = p.ty;
        self.x0 = p.x0;
        self.y0 = p.y0;
        self.invp = p.invp;
    }

    fn view_counter(&mut self, view: PlaneView) -> Option<&mut usize> {
        match view {
            PlaneView::X => Some(&mut self.n_x_hits),
            PlaneView::U => Some(&mut self.n_u_hits),
            PlaneView::V => Some(&mut self.n_v_hits),
            PlaneView::Y => None,
        }
    }

    /// Append a hit and count it in its view. The list must be re-sorted with
    /// [`Tracklet::sort_hits`] once all hits are in.
    pub fn push_hit(&mut self, hit: SignedHit, view: PlaneView) {
        if hit.is_real() {
            if let Some(n) = self.view_counter(view) {
                *n += 1;
            }
        }
        self.hits.push(hit);
    }

    pub fn sort_hits(&mut self) {
        self.hits.sort_by_key(|h| h.detector_id());
    }

    /// Exclude the hit at `position` in the list: it becomes a placeholder on the same plane
    /// and its view counter is decremented.
    pub fn exclude_hit(&mut self, position: usize, view: PlaneView) {
        let Some(entry) = self.hits.get_mut(position) else {
            return;
        };
        if !entry.is_real() {
            return;
        }
        *entry = SignedHit::dummy(entry.detector_id());
        if let Some(n) = self.view_counter(view) {
            *n = n.saturating_sub(1);
        }
    }

    /// Insert placeholders for the planes of a physical station that carry no entry.
    pub fn add_dummy_hits(&mut self) {
        if !(1..=N_CHAMBER_STATIONS).contains(&self.station_id) {
            return;
        }
        let present: Vec<DetectorId> = self.hits.iter().map(|h| h.detector_id()).collect();
        let missing: Vec<DetectorId> = station_planes(self.station_id)
            .filter(|id| !present.contains(id))
            .collect();
        self.hits.extend(missing.into_iter().map(SignedHit::dummy));
        self.sort_hits();
    }

    /// Degrees of freedom of the last fit.
    pub fn ndf(&self) -> i64 {
        self.n_hits() as i64 - if self.invp_free { 5 } else { 4 }
    }

    /// Chi-square probability of the last fit, 0 when it is undefined.
    pub fn prob(&self) -> f64 {
        let ndf = self.ndf();
        if ndf < 1 || !self.chisq.is_finite() || self.chisq < 0. {
            return 0.;
        }
        ChiSquared::new(ndf as f64).map_or(0., |dist| dist.sf(self.chisq))
    }

    /// Candidate ordering used by every best-of selection.
    ///
    /// With the same number of hits the lower chi-square wins; otherwise the higher
    /// chi-square probability wins.
    pub fn is_better_than(&self, other: &Tracklet) -> bool {
        if self.n_hits() == other.n_hits() {
            self.chisq < other.chisq
        } else {
            self.prob() > other.prob()
        }
    }

    /// Number of real hits shared with `other`, matched plane by plane.
    pub fn n_common_hits(&self, other: &Tracklet) -> usize {
        self.hits
            .iter()
            .merge_join_by(other.hits.iter(), |a, b| a.detector_id().cmp(&b.detector_id()))
            .filter(|pair| match pair {
                EitherOrBoth::Both(a, b) => a.is_real() && a == b,
                _ => false,
            })
            .count()
    }

    /// True if more than a third of `other`'s hits also belong to `self`.
    ///
    /// The fraction is taken relative to `other` only, so the relation is not symmetric.
    pub fn similar_to(&self, other: &Tracklet) -> bool {
        let n_other = other.n_hits();
        n_other > 0 && self.n_common_hits(other) as f64 / n_other as f64 > 1. / 3.
    }
}

/// Order candidates best first according to [`Tracklet::is_better_than`].
///
/// The ordering is not guaranteed to be transitive, so this is a stable selection rather than
/// a comparison sort.
pub fn sort_best_first(mut tracklets: Vec<Tracklet>) -> Vec<Tracklet> {
    let mut sorted = Vec::with_capacity(tracklets.len());
    while !tracklets.is_empty() {
        let mut best = 0;
        for i in 1..tracklets.len() {
            if tracklets[i].is_better_than(&tracklets[best]) {
                best = i;
            }
        }
        sorted.push(tracklets.remove(best));
    }
    sorted
}

/// Keep the best candidates and drop every candidate similar to one already kept.
pub fn reduce_similar(tracklets: Vec<Tracklet>) -> Vec<Tracklet> {
    let mut kept: Vec<Tracklet> = Vec::new();
    for candidate in sort_best_first(tracklets) {
        if !kept.iter().any(|k| candidate.similar_to(k)) {
            kept.push(candidate);
        }
    }
    kept
}

impl fmt::Display for Tracklet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tracklet(station={}, hits={} [X{} U{} V{}], chisq={:.3}, prob={:.3e}, tx={:.5}±{:.5}, ty={:.5}±{:.5}, x0={:.3}±{:.3}, y0={:.3}±{:.3}, 1/p={:.4}±{:.4})",
            self.station_id,
            self.n_hits(),
            self.n_x_hits,
            self.n_u_hits,
            self.n_v_hits,
            self.chisq,
            self.prob(),
            self.tx,
            self.err_tx,
            self.ty,
            self.err_ty,
            self.x0,
            self.err_x0,
            self.y0,
            self.err_y0,
            self.invp,
            self.err_invp,
        )?;
        if f.alternate() {
            for h in &self.hits {
                writeln!(f)?;
                write!(
                    f,
                    "  det {:>2}  index {:>4}  sign {:>2}  pos {:>9.4}  drift {:.4}",
                    h.detector_id(),
                    h.hit.index,
                    h.sign,
                    h.hit.pos,
                    h.hit.drift_distance
                )?;
                if h.is_real() && (h.detector_id() as usize) <= N_CHAMBER_PLANES {
                    write!(f, "  residual {:+.4}", self.residual[h.detector_id() as usize - 1])?;
                }
            }
        }
        Ok(())
    }
}
