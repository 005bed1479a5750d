//! # Constants and type definitions for fasttrack
//!
//! This module centralizes the **detector layout constants**, **default fit bounds**,
//! **magnet parameters**, and **common type aliases** used throughout the crate.
//!
//! ## Overview
//!
//! - Chamber / station numbering (24 drift-chamber planes, 6 per station)
//! - Station group identifiers, including the merged back-partial (5) and global (6) stages
//! - Default geometric bounds applied to fitted track parameters
//! - Focusing (FMag) and spectrometer (KMag) magnet kicks, bend planes and energy losses
//! - Sentinel values used by freshly created, unfitted tracklets
//!
//! Lengths are in centimeters, momenta in GeV/c. The values are defaults: everything that
//! the reconstruction actually reads goes through [`crate::fast_tracking::TrackingParams`]
//! or [`crate::field::FieldConfig`].

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Detector plane identifier (chambers 1..=24, then hodoscopes and prop tubes)
pub type DetectorId = u16;

/// Wire / paddle number inside a detector plane
pub type ElementId = u16;

/// Station group identifier of a tracklet (1..=4 physical, 5 back-partial, 6 global)
pub type StationId = u8;

/// Centimeters
pub type Cm = f64;

// -------------------------------------------------------------------------------------------------
// Detector layout
// -------------------------------------------------------------------------------------------------

/// Number of drift-chamber planes; also the size of the residual array of a tracklet
pub const N_CHAMBER_PLANES: usize = 24;

/// Number of drift-chamber planes per station (X, X', U, U', V, V')
pub const PLANES_PER_STATION: DetectorId = 6;

/// Number of physical chamber stations (D1, D2, D3p, D3m)
pub const N_CHAMBER_STATIONS: StationId = 4;

/// Station ID of a tracklet built from a station-2 and a station-3 tracklet
pub const STATION_BACK_PARTIAL: StationId = 5;

/// Station ID of a full track (back-partial + station 1)
pub const STATION_GLOBAL: StationId = 6;

/// Last chamber plane of station 1; hits up to here sit upstream of the KMag bend
pub const LAST_ST1_DETECTOR: DetectorId = 6;

/// Last chamber plane of station 2; hits up to here sit upstream of the fringe bend
pub const LAST_ST2_DETECTOR: DetectorId = 12;

/// Number of hodoscope mask groups (H1, H2, H3, H4, prop tubes)
pub const N_MASK_GROUPS: usize = 5;

// -------------------------------------------------------------------------------------------------
// Default track-parameter bounds
// -------------------------------------------------------------------------------------------------

/// Maximum |tx|
pub const TX_MAX: f64 = 0.1;

/// Maximum |ty|
pub const TY_MAX: f64 = 0.12;

/// Maximum |x0| (cm)
pub const X0_MAX: Cm = 80.;

/// Maximum |y0| (cm)
pub const Y0_MAX: Cm = 150.;

/// Lower bound of the inverse momentum (1/GeV)
pub const INVP_MIN: f64 = 0.01;

/// Upper bound of the inverse momentum (1/GeV)
pub const INVP_MAX: f64 = 0.1;

/// Chi-square probability required by every station
pub const PROB_LOOSE: f64 = 0.;

/// Chi-square probability required by global tracks
pub const PROB_TIGHT: f64 = 0.001;

/// Bad-hit rejection threshold, in units of the plane resolution
pub const HIT_REJECT: f64 = 3.;

/// Chi-square ceiling for a single-station tracklet
pub const STATION_CHISQ_MAX: f64 = 15.;

// -------------------------------------------------------------------------------------------------
// Magnets and absorber
// -------------------------------------------------------------------------------------------------

/// z of the effective KMag bend plane
pub const Z_KMAG_BEND: Cm = 1064.26;

/// z of the effective FMag bend plane
pub const Z_FMAG_BEND: Cm = 251.4;

/// z of the combined FMag + KMag bend plane
pub const Z_KFMAG_BEND: Cm = 375.;

/// pT kick of the FMag (GeV/c)
pub const PT_KICK_FMAG: f64 = 2.909;

/// pT kick of the KMag (GeV/c)
pub const PT_KICK_KMAG: f64 = 0.4016;

/// Energy loss of a muon through the FMag iron (GeV), used by the momentum estimator
pub const ELOSS_KFMAG: f64 = 8.12;

/// Energy loss of a muon through the hadron absorber (GeV)
pub const ELOSS_ABSORBER: f64 = 1.81;

/// z of the upstream face of the hadron absorber
pub const Z_ABSORBER: Cm = 2028.19;

/// z of station 2
pub const Z_ST2: Cm = 1347.36;

/// Length of the FMag iron
pub const FMAG_LENGTH: Cm = 502.92;

/// Length of the beam hole drilled into the FMag
pub const FMAG_HOLE_LENGTH: Cm = 27.94;

/// Radius of the beam hole drilled into the FMag
pub const FMAG_HOLE_RADIUS: Cm = 1.27;

/// Constant energy loss over the full FMag length (GeV)
pub const ELOSS_FMAG: f64 = 7.18;

/// Momentum-proportional energy loss over the full FMag length
pub const ELOSS_FMAG_RAD: f64 = 0.;

/// z where the upstream target swim stops
pub const Z_UPSTREAM: Cm = -500.;

/// z used as the dimuon vertex when no closest approach is found
pub const Z_DUMP: Cm = 42.;

/// Number of FMag slices in the vertex swim
pub const NSLICES_FMAG: usize = 100;

/// Number of straight steps between the FMag front face and `Z_UPSTREAM`
pub const NSTEPS_TARGET: usize = 100;

// -------------------------------------------------------------------------------------------------
// Sentinels
// -------------------------------------------------------------------------------------------------

/// Chi-square of a tracklet that was never fitted, or whose fit failed
pub const UNFITTED_CHISQ: f64 = 9999.;

/// Initial inverse momentum of a fresh tracklet
pub const DEFAULT_INVP: f64 = 0.02;

/// Residual stored for planes without a real hit
pub const UNSET_RESIDUAL: f64 = 999.;

/// Hit index carried by a placeholder (dummy) hit
pub const DUMMY_INDEX: i32 = -1;
