//! # Vertex swim
//!
//! Fast extrapolation of a global track from the downstream face of the FMag back to the
//! target region. The FMag is cut into `nslices_fmag` slices; each slice is traversed as two
//! half-slices with a pT kick at its center and an energy-loss correction on each half:
//!
//! ```text
//! tx_f = tx_i + 2 · q · (pT_fmag / L) · step / √(px² + pz²)
//! p_b  = p_i + (ΔE / L + p_i · ΔE_rad / L) · |Δr|      (outside the beam hole only)
//! ```
//!
//! Upstream of the FMag the track flies straight in `nsteps_target` steps down to
//! `z_upstream`. Every step is recorded, so a trajectory holds
//! `nslices_fmag + nsteps_target + 1` points, the first on the dump face (z = `fmag_length`)
//! and point `nslices_fmag` at z = 0.
//!
//! The point of minimum distance to the beam axis is the single-track vertex estimate;
//! [`closest_approach_z`] compares two trajectories step by step for a fast dimuon vertex.
use nalgebra::Vector3;

use crate::constants::Cm;
use crate::field::FieldConfig;
use crate::tracklet::Tracklet;

/// Positions and momenta recorded along a swim, from the dump face upstream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwimTrajectory {
    pub positions: Vec<Vector3<f64>>,
    pub momenta: Vec<Vector3<f64>>,
    dump_step: usize,
}

#[inline]
fn perp(v: &Vector3<f64>) -> f64 {
    v.x.hypot(v.y)
}

impl SwimTrajectory {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Position at the upstream end of the FMag (z = 0).
    pub fn dump_position(&self) -> Option<Vector3<f64>> {
        self.positions.get(self.dump_step).copied()
    }

    /// Step of minimum distance to the beam axis. The first such step wins on ties.
    pub fn vertex_step(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, p) in self.positions.iter().enumerate() {
            let dca = perp(p);
            if best.map_or(true, |(_, d)| dca < d) {
                best = Some((i, dca));
            }
        }
        best.map(|(i, _)| i)
    }

    /// Position and momentum at [`SwimTrajectory::vertex_step`].
    pub fn vertex(&self) -> Option<(Vector3<f64>, Vector3<f64>)> {
        let i = self.vertex_step()?;
        Some((self.positions[i], self.momenta[i]))
    }
}

/// z of the step at which two trajectories are closest in the transverse plane.
///
/// Arguments
/// -----------------
/// * `a`, `b`: trajectories swum with the same slicing.
/// * `fallback_z`: returned when no step can be compared (typically the beam-dump z).
pub fn closest_approach_z(a: &SwimTrajectory, b: &SwimTrajectory, fallback_z: Cm) -> Cm {
    a.positions
        .iter()
        .zip(&b.positions)
        .map(|(pa, pb)| (pa.z, perp(&(pa - pb))))
        .fold(None, |best: Option<(Cm, f64)>, (z, d)| match best {
            Some((_, d_min)) if d_min <= d => best,
            _ => Some((z, d)),
        })
        .map_or(fallback_z, |(z, _)| z)
}

/// Sliced swim through the FMag and the target region.
#[derive(Debug, Clone, Copy)]
pub struct FieldSwimmer<'a> {
    field: &'a FieldConfig,
}

impl<'a> FieldSwimmer<'a> {
    pub fn new(field: &'a FieldConfig) -> Self {
        FieldSwimmer { field }
    }

    /// Swim a global track from the FMag downstream face.
    ///
    /// The start point is the track's expected position at `fmag_length`, the start momentum
    /// its station-1 momentum. A track without a finite momentum yields an empty trajectory.
    pub fn swim(&self, tracklet: &Tracklet) -> SwimTrajectory {
        let f = self.field;
        let z0 = f.fmag_length;
        let pos = Vector3::new(
            tracklet.exp_position_x(z0, f),
            tracklet.exp_position_y(z0),
            z0,
        );
        let mom = tracklet.momentum_st1(f);
        self.swim_from(pos, mom, tracklet.charge(f) as f64)
    }

    /// Swim from an arbitrary state on the dump face.
    pub fn swim_from(&self, pos: Vector3<f64>, mom: Vector3<f64>, charge: f64) -> SwimTrajectory {
        let f = self.field;
        if !(mom.iter().all(|c| c.is_finite()) && mom.z > 0.) {
            return SwimTrajectory::default();
        }

        let n_total = f.nslices_fmag + f.nsteps_target + 1;
        let mut positions = Vec::with_capacity(n_total);
        let mut momenta = Vec::with_capacity(n_total);
        positions.push(pos);
        momenta.push(mom);

        let eloss_unit = f.eloss_fmag / f.fmag_length;
        let eloss_unit_rad = f.eloss_fmag_rad / f.fmag_length;
        let ptkick_unit = f.pt_kick_fmag / f.fmag_length;
        let step_fmag = f.fmag_length / f.nslices_fmag as f64 / 2.;
        let step_target = f.z_upstream.abs() / f.nsteps_target as f64;

        // ty is not affected by the vertical dipole field
        let ty = mom.y / mom.z;
        let in_material =
            |p: &Vector3<f64>| p.z > f.fmag_hole_length || perp(p) > f.fmag_hole_radius;
        let eloss = |p_tot: f64, len: f64| (eloss_unit + p_tot * eloss_unit_rad) * len;

        for _ in 0..f.nslices_fmag {
            let (pos_i, mom_i) = (positions[positions.len() - 1], momenta[momenta.len() - 1]);
            let tx_i = mom_i.x / mom_i.z;
            let tx_f = tx_i + 2. * charge * ptkick_unit * step_fmag / mom_i.x.hypot(mom_i.z);

            let half1 = Vector3::new(tx_i * step_fmag, ty * step_fmag, step_fmag);
            let pos_b = pos_i - half1;
            let p_i = mom_i.norm();
            let p_b = if in_material(&pos_b) {
                p_i + eloss(p_i, half1.norm())
            } else {
                p_i
            };

            let half2 = Vector3::new(tx_f * step_fmag, ty * step_fmag, step_fmag);
            let pos_f = pos_b - half2;
            let p_f = if in_material(&pos_f) {
                p_b + eloss(p_b, half2.norm())
            } else {
                p_b
            };

            let pz_f = p_f / (1. + tx_f * tx_f + ty * ty).sqrt();
            positions.push(pos_f);
            momenta.push(Vector3::new(pz_f * tx_f, pz_f * ty, pz_f));
        }

        for _ in 0..f.nsteps_target {
            let (pos_i, mom_i) = (positions[positions.len() - 1], momenta[momenta.len() - 1]);
            let tx_i = mom_i.x / mom_i.z;
            positions.push(pos_i - Vector3::new(tx_i * step_target, ty * step_target, step_target));
            momenta.push(mom_i);
        }

        SwimTrajectory {
            positions,
            momenta,
            dump_step: f.nslices_fmag,
        }
    }
}
