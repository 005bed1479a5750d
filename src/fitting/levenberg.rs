//! Box-constrained Levenberg–Marquardt.
//!
//! Each iteration solves the damped normal equations
//!
//! ```text
//! (JᵀJ + λ · (diag(JᵀJ) + ε·I)) · δ = −Jᵀr
//! ```
//!
//! over the free variables only. A variable on a bound is held there while the descent
//! direction, or the Gauss–Newton step, points out of the box. The step is then shortened so
//! that `x + δ` stays inside the box, and the variable that limits it lands exactly on its
//! bound. A step is accepted when it does not increase the objective; λ shrinks after an
//! accepted step and grows after a rejected one.
//!
//! The iteration stops when the estimated distance to the minimum `gᵀH⁻¹g` over the free
//! variables falls below `tolerance · (1 + χ²)`, when a full step lowers the objective by
//! less than that, or when no damping makes progress.
use nalgebra::{DMatrix, DVector};

use super::{clamp, numeric_jacobian, Minimum};

const LAMBDA_START: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e12;
/// Keeps the damped matrix invertible along flat directions.
const DAMPING_FLOOR: f64 = 1e-9;

/// True if `x` sits on a bound and `step` points out of the box.
#[inline]
fn pushes_out(x: f64, lower: f64, upper: f64, step: f64) -> bool {
    (x <= lower && step < 0.) || (x >= upper && step > 0.)
}

/// Solve the damped normal equations restricted to the `free` variables. Held variables get a
/// zero step.
fn solve_free(
    h: &DMatrix<f64>,
    neg_g: &DVector<f64>,
    free: &[bool],
    lambda: f64,
) -> Option<DVector<f64>> {
    let n = neg_g.len();
    let mut a = DMatrix::identity(n, n);
    let mut b = DVector::zeros(n);
    for i in (0..n).filter(|&i| free[i]) {
        for j in (0..n).filter(|&j| free[j]) {
            a[(i, j)] = h[(i, j)];
        }
        a[(i, i)] += lambda * (h[(i, i)] + DAMPING_FLOOR);
        b[i] = neg_g[i];
    }
    a.lu().solve(&b)
}

/// Free variables at `x` and the undamped Gauss–Newton step over them.
///
/// Starts from the variables the descent direction does not push out of the box, then holds
/// every variable on a bound that the Gauss–Newton step would push out, until no more are
/// held.
fn free_variables(
    h: &DMatrix<f64>,
    neg_g: &DVector<f64>,
    x: &DVector<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
) -> (Vec<bool>, Option<DVector<f64>>) {
    let n = x.len();
    let mut free: Vec<bool> = (0..n)
        .map(|i| !pushes_out(x[i], lower[i], upper[i], neg_g[i]))
        .collect();
    loop {
        let step = solve_free(h, neg_g, &free, 0.);
        let Some(delta) = &step else {
            return (free, None);
        };
        let held: Vec<usize> = (0..n)
            .filter(|&i| free[i] && pushes_out(x[i], lower[i], upper[i], delta[i]))
            .collect();
        if held.is_empty() {
            return (free, step);
        }
        for i in held {
            free[i] = false;
        }
    }
}

/// Largest fraction (at most 1) of `delta` keeping `x` inside the box, with the index of the
/// variable that limits it.
fn step_fraction(
    x: &DVector<f64>,
    delta: &DVector<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
) -> (f64, Option<usize>) {
    let mut alpha = 1.;
    let mut blocking = None;
    for i in 0..x.len() {
        let room = if delta[i] > 0. {
            upper[i] - x[i]
        } else if delta[i] < 0. {
            lower[i] - x[i]
        } else {
            continue;
        };
        if room / delta[i] < alpha {
            alpha = room / delta[i];
            blocking = Some(i);
        }
    }
    (alpha, blocking)
}

pub(crate) fn minimize<F>(
    residuals: &F,
    start: DVector<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
    steps: &[f64],
    max_iterations: usize,
    tolerance: f64,
) -> Minimum
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let n = start.len();
    let mut x = clamp(start, lower, upper);
    let mut r = residuals(&x);
    let mut chisq = r.norm_squared();
    let mut lambda = LAMBDA_START;

    for iteration in 1..=max_iterations {
        let jac = numeric_jacobian(residuals, &x, steps);
        let jt = jac.transpose();
        let h = &jt * &jac;
        let neg_g = -(&jt * &r);

        let (free, newton) = free_variables(&h, &neg_g, &x, lower, upper);
        if let Some(edm) = newton.map(|delta| neg_g.dot(&delta)) {
            if edm < tolerance * (1. + chisq) {
                return Minimum {
                    x,
                    chisq,
                    converged: true,
                    iterations: iteration,
                };
            }
        }

        let mut accepted = None;
        while lambda <= LAMBDA_MAX {
            let Some(mut delta) = solve_free(&h, &neg_g, &free, lambda) else {
                lambda *= 10.;
                continue;
            };
            for i in 0..n {
                if pushes_out(x[i], lower[i], upper[i], delta[i]) {
                    delta[i] = 0.;
                }
            }
            let (alpha, blocking) = step_fraction(&x, &delta, lower, upper);
            let mut trial = clamp(&x + &delta * alpha, lower, upper);
            if let Some(i) = blocking {
                trial[i] = if delta[i] > 0. { upper[i] } else { lower[i] };
            }
            let r_trial = residuals(&trial);
            let chisq_trial = r_trial.norm_squared();
            if chisq_trial.is_finite() && chisq_trial <= chisq {
                lambda = (lambda / 10.).max(LAMBDA_MIN);
                accepted = Some((trial, r_trial, chisq_trial, blocking.is_none()));
                break;
            }
            lambda *= 10.;
        }

        let Some((trial, r_trial, chisq_trial, full_step)) = accepted else {
            return Minimum {
                x,
                chisq,
                converged: chisq.is_finite(),
                iterations: iteration,
            };
        };

        let decrease = chisq - chisq_trial;
        x = trial;
        r = r_trial;
        chisq = chisq_trial;
        if full_step && decrease <= tolerance * (1. + chisq) {
            return Minimum {
                x,
                chisq,
                converged: true,
                iterations: iteration,
            };
        }
    }

    Minimum {
        x,
        chisq,
        converged: false,
        iterations: max_iterations,
    }
}

#[cfg(test)]
mod levenberg_test {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Residuals of y = a·exp(b·t) at a few points.
    fn exponential(x: &DVector<f64>) -> DVector<f64> {
        let data = [(0., 2.), (0.5, 2.0 * 0.5f64.exp()), (1., 2.0 * 1f64.exp()), (2., 2.0 * 2f64.exp())];
        DVector::from_iterator(data.len(), data.iter().map(|(t, y)| x[0] * (x[1] * t).exp() - y))
    }

    #[test]
    fn test_nonlinear_fit() {
        let lower = DVector::from_row_slice(&[-10., -10.]);
        let upper = DVector::from_row_slice(&[10., 10.]);
        let m = minimize(
            &exponential,
            DVector::from_row_slice(&[1., 0.5]),
            &lower,
            &upper,
            &[1e-6, 1e-6],
            200,
            1e-14,
        );
        assert!(m.converged);
        assert_abs_diff_eq!(m.x[0], 2., epsilon = 1e-5);
        assert_abs_diff_eq!(m.x[1], 1., epsilon = 1e-5);
        assert!(m.chisq < 1e-10);
    }

    #[test]
    fn test_minimum_on_the_box() {
        // unconstrained minimum at (3, −2)
        let f = |x: &DVector<f64>| DVector::from_row_slice(&[x[0] - 3., x[1] + 2.]);
        let lower = DVector::from_row_slice(&[-1., -1.]);
        let upper = DVector::from_row_slice(&[1., 1.]);
        let m = minimize(
            &f,
            DVector::from_row_slice(&[0., 0.]),
            &lower,
            &upper,
            &[1e-6, 1e-6],
            100,
            1e-12,
        );
        assert!(m.converged);
        assert_abs_diff_eq!(m.x[0], 1., epsilon = 1e-12);
        assert_abs_diff_eq!(m.x[1], -1., epsilon = 1e-12);
        assert_abs_diff_eq!(m.chisq, 5., epsilon = 1e-9);
    }

    #[test]
    fn test_collinear_line_on_the_box() {
        // three points far from the origin: slope and intercept nearly degenerate, and the
        // unconstrained intercept (≈ −140) lies outside the box
        let data = [(1000., 10.0), (1004., 10.5), (1008., 11.2)];
        let f = |x: &DVector<f64>| {
            DVector::from_iterator(3, data.iter().map(|(z, y)| (x[1] + x[0] * z - y) / 0.1))
        };
        let m = minimize(
            &f,
            DVector::from_row_slice(&[0., 0.]),
            &DVector::from_row_slice(&[-1., -50.]),
            &DVector::from_row_slice(&[1., 50.]),
            &[1e-6, 1e-6],
            100,
            1e-12,
        );

        let szz: f64 = data.iter().map(|(z, _)| z * z).sum();
        let slope = data.iter().map(|(z, y)| z * (y + 50.)).sum::<f64>() / szz;
        let chisq = f(&DVector::from_row_slice(&[slope, -50.])).norm_squared();
        assert!(m.converged);
        assert!(m.iterations <= 10, "{} iterations", m.iterations);
        assert_eq!(m.x[1], -50.);
        assert_abs_diff_eq!(m.x[0], slope, epsilon = 1e-8);
        assert_abs_diff_eq!(m.chisq, chisq, epsilon = 1e-6);
    }

    #[test]
    fn test_iteration_cap() {
        let m = minimize(
            &exponential,
            DVector::from_row_slice(&[0.1, 3.]),
            &DVector::from_row_slice(&[-10., -10.]),
            &DVector::from_row_slice(&[10., 10.]),
            &[1e-6, 1e-6],
            1,
            1e-14,
        );
        assert!(!m.converged);
        assert_eq!(m.iterations, 1);
    }
}
