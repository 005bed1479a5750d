//! # Momentum estimation from track geometry
//!
//! A back-partial track only sees the field-free region behind the KMag, yet its slope and
//! intercept already encode the total bend a muon from the target picked up in both magnets.
//! Modelling each magnet as a thin kick at its bend plane, with the FMag energy loss split
//! around its kick, gives a quadratic in the momentum:
//!
//! ```text
//! c1 = z_fmag · pT_fmag · q      c2 = z_kmag · pT_kmag · q      c3 = −x0
//! c4 = ΔE_fmag                   c5 = c4 / 2
//!
//! p² + b·p + c = 0,   b = c1/c3 + c2/c3 − c4 − c5,   c = c4·c5 − c1·c5/c3 − c2·c4/c3
//! ```
//!
//! The larger root, minus the FMag energy loss, is the momentum at the downstream face. When
//! the discriminant is negative or the root falls outside the plausible [10, 120] GeV range,
//! an empirical polynomial in the kick angle seen at the combined bend plane is used instead.
use crate::field::FieldConfig;
use crate::tracklet::Tracklet;

/// Plausible momentum range of the quadratic solution (GeV).
const P_MIN: f64 = 10.;
const P_MAX: f64 = 120.;

/// Starting value of the quadratic solution (GeV).
const P_DEFAULT: f64 = 50.;

/// Coefficients of `1 / p = a0 + a1·k + a2·k²`, k being the kick angle at the combined bend.
const FALLBACK_COEFFS: [f64; 3] = [0.00832161, 0.184186, -0.104132];

/// Momentum and inverse-momentum estimates for back-partial and global tracks.
#[derive(Debug, Clone, Copy)]
pub struct MomentumEstimator<'a> {
    field: &'a FieldConfig,
}

impl<'a> MomentumEstimator<'a> {
    pub fn new(field: &'a FieldConfig) -> Self {
        MomentumEstimator { field }
    }

    /// Momentum (GeV) of the track.
    ///
    /// Never fails: an invalid quadratic solution silently falls back to the empirical
    /// estimate.
    pub fn momentum(&self, tracklet: &Tracklet) -> f64 {
        let f = self.field;
        let charge = tracklet.charge(f) as f64;

        let c1 = f.z_fmag_bend * f.pt_kick_fmag * charge;
        let c2 = f.z_kmag_bend * f.pt_kick_kmag * charge;
        let c3 = -tracklet.x0;
        let c4 = f.eloss_kfmag;
        let c5 = c4 / 2.;

        let b = c1 / c3 + c2 / c3 - c4 - c5;
        let c = c4 * c5 - c1 * c5 / c3 - c2 * c4 / c3;
        let disc = b * b - 4. * c;

        let mut p = P_DEFAULT;
        if disc > 0. {
            p = (-b + disc.sqrt()) / 2. - f.eloss_kfmag;
        }

        if !(disc > 0.) || !(P_MIN..=P_MAX).contains(&p) {
            p = self.fallback_momentum(tracklet);
        }
        p
    }

    /// Empirical estimate from the kick angle seen at the combined bend plane.
    pub fn fallback_momentum(&self, tracklet: &Tracklet) -> f64 {
        let f = self.field;
        let z = f.z_kfmag_bend;
        let k = (tracklet.exp_position_x(z, f) / z - tracklet.tx).abs();
        let [a0, a1, a2] = FALLBACK_COEFFS;
        1. / (a0 + a1 * k + a2 * k * k) + f.eloss_absorber
    }

    pub fn inv_momentum(&self, tracklet: &Tracklet) -> f64 {
        1. / self.momentum(tracklet)
    }
}
