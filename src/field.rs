//! # Magnetic field model
//!
//! The spectrometer carries two dipoles: the focusing magnet (FMag, solid iron that doubles as
//! beam dump) and the open-aperture spectrometer magnet (KMag) between stations 1 and 2.
//! Track reconstruction models each of them as a thin kick at an effective bend plane:
//!
//! ```text
//! tx_upstream = tx_downstream + pT_kick · invP · charge
//! ```
//!
//! The KMag kick splits a global track into an upstream line (station 1) and a downstream
//! line (stations 2 and 3). An optional fringe kick splits the downstream line once more at
//! `z_kmag_fringe_bend`; it is disabled by default (zero kick at the main bend plane).
//!
//! The FMag is only traversed by the vertex swim ([`crate::swim::FieldSwimmer`]), which
//! slices it and applies a distributed kick and energy loss.
use crate::constants::*;

/// Magnet and material parameters used by the fitter, the momentum estimator and the swim.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConfig {
    // --- Switches ---
    /// Model the KMag kick in fits and projections
    pub kmag_on: bool,

    // --- KMag ---
    pub z_kmag_bend: Cm,
    pub pt_kick_kmag: f64,
    pub z_kmag_fringe_bend: Cm,
    pub pt_kick_kmag_fringe: f64,

    // --- FMag ---
    pub z_fmag_bend: Cm,
    pub pt_kick_fmag: f64,
    pub z_kfmag_bend: Cm,
    pub eloss_kfmag: f64,
    pub fmag_length: Cm,
    pub fmag_hole_length: Cm,
    pub fmag_hole_radius: Cm,
    pub eloss_fmag: f64,
    pub eloss_fmag_rad: f64,

    // --- Absorber ---
    pub z_absorber: Cm,
    pub eloss_absorber: f64,

    // --- Vertex swim ---
    pub nslices_fmag: usize,
    pub nsteps_target: usize,
    pub z_upstream: Cm,
    pub z_dump: Cm,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            kmag_on: true,

            z_kmag_bend: Z_KMAG_BEND,
            pt_kick_kmag: PT_KICK_KMAG,
            z_kmag_fringe_bend: Z_KMAG_BEND,
            pt_kick_kmag_fringe: 0.,

            z_fmag_bend: Z_FMAG_BEND,
            pt_kick_fmag: PT_KICK_FMAG,
            z_kfmag_bend: Z_KFMAG_BEND,
            eloss_kfmag: ELOSS_KFMAG,
            fmag_length: FMAG_LENGTH,
            fmag_hole_length: FMAG_HOLE_LENGTH,
            fmag_hole_radius: FMAG_HOLE_RADIUS,
            eloss_fmag: ELOSS_FMAG,
            eloss_fmag_rad: ELOSS_FMAG_RAD,

            z_absorber: Z_ABSORBER,
            eloss_absorber: ELOSS_ABSORBER,

            nslices_fmag: NSLICES_FMAG,
            nsteps_target: NSTEPS_TARGET,
            z_upstream: Z_UPSTREAM,
            z_dump: Z_DUMP,
        }
    }
}

impl FieldConfig {
    /// Same geometry with the KMag kick switched off (cosmic / field-off running).
    pub fn field_off() -> Self {
        Self {
            kmag_on: false,
            ..Self::default()
        }
    }
}
