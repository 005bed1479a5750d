//! Nelder–Mead simplex restricted to a box.
//!
//! Every trial vertex is projected onto the box before evaluation. The search stops when the
//! objective spread over the simplex falls below the tolerance; it is then restarted once
//! around the best vertex, and only a restart that fails to improve confirms convergence.
use itertools::Itertools;
use nalgebra::DVector;

use super::{clamp, Minimum};

const REFLECT: f64 = 1.;
const EXPAND: f64 = 2.;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;
/// Initial simplex edge, in units of the parameter steps.
const EDGE_SCALE: f64 = 100.;
const MAX_RESTARTS: usize = 3;

struct Simplex<'a, F> {
    objective: &'a F,
    lower: &'a DVector<f64>,
    upper: &'a DVector<f64>,
    vertices: Vec<(DVector<f64>, f64)>,
}

impl<'a, F> Simplex<'a, F>
where
    F: Fn(&DVector<f64>) -> f64,
{
    fn eval(&self, x: DVector<f64>) -> (DVector<f64>, f64) {
        let x = clamp(x, self.lower, self.upper);
        let f = (self.objective)(&x);
        (x, if f.is_nan() { f64::INFINITY } else { f })
    }

    /// Simplex around `x`; an edge pointing out of the box is flipped.
    fn around(
        objective: &'a F,
        x: DVector<f64>,
        steps: &[f64],
        lower: &'a DVector<f64>,
        upper: &'a DVector<f64>,
    ) -> Self {
        let mut s = Simplex {
            objective,
            lower,
            upper,
            vertices: Vec::with_capacity(x.len() + 1),
        };
        let origin = s.eval(x);
        for i in 0..origin.0.len() {
            let mut v = origin.0.clone();
            let edge = EDGE_SCALE * steps[i];
            v[i] += if v[i] + edge <= upper[i] { edge } else { -edge };
            let vertex = s.eval(v);
            s.vertices.push(vertex);
        }
        s.vertices.insert(0, origin);
        s
    }

    fn order(&mut self) {
        self.vertices
            .sort_by(|a, b| a.1.total_cmp(&b.1));
    }

    fn best(&self) -> &(DVector<f64>, f64) {
        &self.vertices[0]
    }

    fn spread(&self) -> f64 {
        let (min, max) = self
            .vertices
            .iter()
            .map(|v| v.1)
            .minmax()
            .into_option()
            .unwrap_or((0., 0.));
        max - min
    }

    /// One Nelder–Mead move. The vertices must be ordered.
    fn step(&mut self) {
        let n = self.vertices.len() - 1;
        let centroid = self.vertices[..n]
            .iter()
            .fold(DVector::zeros(self.vertices[0].0.len()), |acc, v| acc + &v.0)
            / n as f64;
        let (worst, f_worst) = self.vertices[n].clone();
        let f_best = self.vertices[0].1;
        let f_second = self.vertices[n - 1].1;

        let reflected = self.eval(&centroid + (&centroid - &worst) * REFLECT);
        if reflected.1 < f_best {
            let expanded = self.eval(&centroid + (&reflected.0 - &centroid) * EXPAND);
            self.vertices[n] = if expanded.1 < reflected.1 {
                expanded
            } else {
                reflected
            };
            return;
        }
        if reflected.1 < f_second {
            self.vertices[n] = reflected;
            return;
        }

        let contracted = if reflected.1 < f_worst {
            self.eval(&centroid + (&reflected.0 - &centroid) * CONTRACT)
        } else {
            self.eval(&centroid + (&worst - &centroid) * CONTRACT)
        };
        if contracted.1 < reflected.1.min(f_worst) {
            self.vertices[n] = contracted;
            return;
        }

        let best = self.vertices[0].0.clone();
        for i in 1..=n {
            let shrunk = &best + (&self.vertices[i].0 - &best) * SHRINK;
            self.vertices[i] = self.eval(shrunk);
        }
    }
}

pub(crate) fn minimize<F>(
    objective: F,
    start: DVector<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
    steps: &[f64],
    max_iterations: usize,
    tolerance: f64,
) -> Minimum
where
    F: Fn(&DVector<f64>) -> f64,
{
    let mut simplex = Simplex::around(&objective, start, steps, lower, upper);
    let mut iterations = 0;
    let mut restarts = 0;
    let mut f_last_restart = f64::INFINITY;

    while iterations < max_iterations {
        simplex.order();
        let f_best = simplex.best().1;
        if simplex.spread() <= tolerance * (1. + f_best.abs()) {
            if f_last_restart - f_best <= tolerance * (1. + f_best.abs()) || restarts == MAX_RESTARTS {
                let (x, chisq) = simplex.best().clone();
                return Minimum {
                    x,
                    chisq,
                    converged: chisq.is_finite(),
                    iterations,
                };
            }
            f_last_restart = f_best;
            restarts += 1;
            let x = simplex.best().0.clone();
            simplex = Simplex::around(&objective, x, steps, lower, upper);
            continue;
        }
        simplex.step();
        iterations += 1;
    }

    simplex.order();
    let (x, chisq) = simplex.best().clone();
    Minimum {
        x,
        chisq,
        converged: false,
        iterations,
    }
}
