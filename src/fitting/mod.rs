//! # Tracklet fitting
//!
//! Bounded least-squares fit of the track parameters to the signed hits of a tracklet.
//!
//! The fit vector is `(tx, ty, x0, y0)`, extended by the inverse momentum for global tracks
//! when the KMag is modelled; in every other case the inverse momentum is held fixed at its
//! current value. Residuals are `(measured − expected) / σ` as given by
//! [`crate::tracklet::chisq::Measurement`], so the minimized objective is the tracklet
//! chi-square.
//!
//! Two strategies are available through [`MinimizerKind`]:
//!
//! * [`levenberg`] – damped Gauss–Newton steps on a numeric Jacobian, kept inside the box,
//! * [`simplex`] – derivative-free Nelder–Mead restricted to the box.
//!
//! Fresh station candidates start from [`TrackletFitter::seed_from_hits`].
//!
//! Whatever the strategy, parameter errors are the square roots of the diagonal of
//! `(JᵀJ)⁻¹` evaluated at the optimum. A fit that does not converge is not an error: the
//! tracklet keeps [`UNFITTED_CHISQ`] as chi-square and the quality gate rejects it.
use nalgebra::{DMatrix, DVector, Matrix2, Vector2};

use crate::constants::{STATION_GLOBAL, UNFITTED_CHISQ};
use crate::fast_tracking::TrackingParams;
use crate::field::FieldConfig;
use crate::geometry::GeometryProvider;
use crate::tracklet::{TrackParams, Tracklet};

pub mod levenberg;
pub mod simplex;

/// Finite-difference steps of (tx, ty, x0, y0, invP).
const JACOBIAN_STEPS: [f64; 5] = [1e-5, 1e-5, 1e-3, 1e-3, 1e-6];

/// Least-squares strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MinimizerKind {
    #[default]
    LevenbergMarquardt,
    Simplex,
}

/// Symmetric parameter bounds and the inverse-momentum range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitBounds {
    pub tx_max: f64,
    pub ty_max: f64,
    pub x0_max: f64,
    pub y0_max: f64,
    pub invp_min: f64,
    pub invp_max: f64,
}

impl FitBounds {
    /// Lower and upper corners of the box for `n` parameters (4 or 5).
    pub fn corners(&self, n: usize) -> (DVector<f64>, DVector<f64>) {
        let upper = [
            self.tx_max,
            self.ty_max,
            self.x0_max,
            self.y0_max,
            self.invp_max,
        ];
        let lower = [
            -self.tx_max,
            -self.ty_max,
            -self.x0_max,
            -self.y0_max,
            self.invp_min,
        ];
        (
            DVector::from_row_slice(&lower[..n]),
            DVector::from_row_slice(&upper[..n]),
        )
    }
}

/// Result of a minimization.
#[derive(Debug, Clone)]
pub(crate) struct Minimum {
    pub x: DVector<f64>,
    pub chisq: f64,
    pub converged: bool,
    pub iterations: usize,
}

/// Outcome of [`TrackletFitter::fit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitStatus {
    pub converged: bool,
    pub iterations: usize,
    /// Number of free parameters (4 or 5)
    pub n_params: usize,
}

/// Project `x` onto the box `[lower, upper]`.
pub(crate) fn clamp(mut x: DVector<f64>, lower: &DVector<f64>, upper: &DVector<f64>) -> DVector<f64> {
    for i in 0..x.len() {
        x[i] = x[i].clamp(lower[i], upper[i]);
    }
    x
}

/// Central-difference Jacobian of a residual function.
pub(crate) fn numeric_jacobian<F>(residuals: &F, x: &DVector<f64>, steps: &[f64]) -> DMatrix<f64>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let r0 = residuals(x);
    let mut jac = DMatrix::zeros(r0.len(), x.len());
    for j in 0..x.len() {
        let h = steps[j];
        let mut plus = x.clone();
        let mut minus = x.clone();
        plus[j] += h;
        minus[j] -= h;
        let column = (residuals(&plus) - residuals(&minus)) / (2. * h);
        jac.set_column(j, &column);
    }
    jac
}

/// `(JᵀJ)⁻¹`, falling back to the pseudo-inverse for a singular normal matrix.
pub(crate) fn covariance(jac: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let h = jac.transpose() * jac;
    h.clone()
        .try_inverse()
        .or_else(|| h.pseudo_inverse(1e-12).ok())
}

/// Fits tracklets against the detector geometry.
pub struct TrackletFitter<'a, G: ?Sized> {
    geometry: &'a G,
    field: &'a FieldConfig,
    bounds: FitBounds,
    minimizer: MinimizerKind,
    max_iterations: usize,
    simplex_max_iterations: usize,
    tolerance: f64,
}

impl<'a, G: GeometryProvider + ?Sized> TrackletFitter<'a, G> {
    pub fn new(geometry: &'a G, params: &'a TrackingParams) -> Self {
        TrackletFitter {
            geometry,
            field: &params.field,
            bounds: params.fit_bounds(),
            minimizer: params.minimizer,
            max_iterations: params.max_iterations,
            simplex_max_iterations: params.simplex_max_iterations,
            tolerance: params.fit_tolerance,
        }
    }

    /// Whether the inverse momentum is a free parameter for this tracklet.
    pub fn invp_free(&self, tracklet: &Tracklet) -> bool {
        self.field.kmag_on && tracklet.station_id == STATION_GLOBAL
    }

    /// Start a fresh station candidate on the line through the target that best matches its
    /// hits under their current sign hypotheses.
    ///
    /// Sets `x0 = y0 = 0` and the slopes from the weighted fit of `pos = z·(tx·cosθ + ty·sinθ)`.
    /// Without stereo hits the slopes are undetermined and the tracklet is left unchanged.
    pub fn seed_from_hits(&self, tracklet: &mut Tracklet) {
        let mut a = Matrix2::zeros();
        let mut b = Vector2::zeros();
        for m in tracklet.measurements(self.geometry, self.field) {
            let row = Vector2::new(m.z * m.stereo.cos, m.z * m.stereo.sin);
            let w = m.sigma.powi(-2);
            a += row * row.transpose() * w;
            b += row * (m.pos * w);
        }
        let Some(slopes) = a.lu().solve(&b).filter(|v| v.iter().all(|x| x.is_finite())) else {
            return;
        };
        tracklet.tx = slopes[0].clamp(-self.bounds.tx_max, self.bounds.tx_max);
        tracklet.ty = slopes[1].clamp(-self.bounds.ty_max, self.bounds.ty_max);
        tracklet.x0 = 0.;
        tracklet.y0 = 0.;
    }

    /// Fit the tracklet in place.
    ///
    /// Overwrites the parameters, their errors, the residuals and the chi-square. With fewer
    /// real hits than free parameters nothing is fitted: the errors are reset to −1 and the
    /// tracklet is marked unfitted.
    pub fn fit(&self, tracklet: &mut Tracklet) -> FitStatus {
        let invp_free = self.invp_free(tracklet);
        let n = if invp_free { 5 } else { 4 };
        tracklet.invp_free = invp_free;

        let measurements = tracklet.measurements(self.geometry, self.field);
        if measurements.len() < n {
            tracklet.err_tx = -1.;
            tracklet.err_ty = -1.;
            tracklet.err_x0 = -1.;
            tracklet.err_y0 = -1.;
            tracklet.err_invp = -1.;
            tracklet.chisq = UNFITTED_CHISQ;
            return FitStatus {
                converged: false,
                iterations: 0,
                n_params: n,
            };
        }

        if invp_free {
            tracklet.invp = tracklet
                .invp
                .clamp(self.bounds.invp_min, self.bounds.invp_max);
        }
        let fixed_invp = tracklet.invp;
        let field = self.field;
        let to_params = |x: &DVector<f64>| TrackParams {
            tx: x[0],
            ty: x[1],
            x0: x[2],
            y0: x[3],
            invp: if x.len() > 4 { x[4] } else { fixed_invp },
        };
        let residuals = |x: &DVector<f64>| {
            let p = to_params(x);
            DVector::from_iterator(
                measurements.len(),
                measurements.iter().map(|m| m.residual(&p, field) / m.sigma),
            )
        };

        let (lower, upper) = self.bounds.corners(n);
        let start = DVector::from_row_slice(
            &[
                tracklet.tx,
                tracklet.ty,
                tracklet.x0,
                tracklet.y0,
                tracklet.invp,
            ][..n],
        );
        let steps = &JACOBIAN_STEPS[..n];

        let minimum = match self.minimizer {
            MinimizerKind::LevenbergMarquardt => levenberg::minimize(
                &residuals,
                start,
                &lower,
                &upper,
                steps,
                self.max_iterations,
                self.tolerance,
            ),
            MinimizerKind::Simplex => simplex::minimize(
                |x: &DVector<f64>| residuals(x).norm_squared(),
                start,
                &lower,
                &upper,
                steps,
                self.simplex_max_iterations,
                self.tolerance,
            ),
        };

        tracklet.set_params(&to_params(&minimum.x));
        let cov = covariance(&numeric_jacobian(&residuals, &minimum.x, steps));
        let error = |i: usize| {
            cov.as_ref()
                .map(|c| c[(i, i)].sqrt())
                .filter(|e| e.is_finite())
                .unwrap_or(-1.)
        };
        tracklet.err_tx = error(0);
        tracklet.err_ty = error(1);
        tracklet.err_x0 = error(2);
        tracklet.err_y0 = error(3);
        if invp_free {
            tracklet.err_invp = error(4);
        }

        tracklet.calc_chisq(self.geometry, self.field);
        if !minimum.converged {
            tracklet.chisq = UNFITTED_CHISQ;
        }
        tracing::trace!(
            station = tracklet.station_id,
            converged = minimum.converged,
            iterations = minimum.iterations,
            objective = minimum.chisq,
            chisq = tracklet.chisq,
            "tracklet fit"
        );

        FitStatus {
            converged: minimum.converged,
            iterations: minimum.iterations,
            n_params: n,
        }
    }
}
