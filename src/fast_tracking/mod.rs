//! # Fast tracking
//!
//! This module defines the [`TrackingParams`] configuration struct and its builder, and hosts
//! the stages of the per-event tracklet reconstruction:
//!
//! 1. **Station search** ([`builder::TrackletBuilder`])
//!    X/U/V hit pairs of one station are combined within stereo windows into local tracklets.
//!
//! 2. **Left-right resolution** ([`left_right::LeftRightResolver`])
//!    Drift signs of hit pairs, then of isolated hits, are assigned against the current fit.
//!
//! 3. **Fitting** ([`crate::fitting::TrackletFitter`])
//!    Bounded least squares over (tx, ty, x0, y0) and, for global tracks, the inverse momentum.
//!
//! 4. **Quality gate** ([`quality::TrackletQualityGate`])
//!    Hit multiplicity, chi-square probability, hodoscope masks and magnet aperture.
//!
//! 5. **Combination** ([`combiner::TrackletCombiner`])
//!    Station 2 + station 3 into back-partial tracks, back-partial + station 1 into global
//!    tracks, with bad-hit removal on the latter.
//!
//! [`engine::FastTracking`] drives these stages for one event.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fasttrack::fast_tracking::{St1Window, TrackingParams};
//! use fasttrack::fitting::MinimizerKind;
//!
//! let params = TrackingParams::builder()
//!     .minimizer(MinimizerKind::Simplex)
//!     .prob_tight(1e-4)
//!     .st1_window(St1Window::Extrapolation)
//!     .build()
//!     .unwrap();
//! println!("{params:#}");
//! ```
//!
//! ## See also
//!
//! * [`TrackingParams::cosmic`] – preset for field-off cosmic running
//! * [`crate::field::FieldConfig`] – magnet model embedded in the parameters
use std::cmp::Ordering::{Equal, Greater, Less};
use std::fmt;

use crate::constants::*;
use crate::field::FieldConfig;
use crate::fitting::{FitBounds, MinimizerKind};
use crate::tracker_errors::TrackerError;

pub mod builder;
pub mod combiner;
pub mod engine;
pub mod left_right;
pub mod quality;

/// How station-1 hits are pre-selected around a back-partial track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum St1Window {
    /// Sagitta relations with the field on, straight extrapolation with the field off
    #[default]
    FieldAware,
    /// Straight (kinked) extrapolation of the back-partial track
    Extrapolation,
    /// No window: every station-1 hit is considered
    Open,
}

/// Configuration of the fast tracking.
///
/// Fields
/// -----------------
/// **Fit bounds**
/// * `tx_max`, `ty_max`, `x0_max`, `y0_max` – symmetric bounds on the straight-line parameters;
///   they also bound the local slopes accepted by the left-right resolution.
/// * `invp_min`, `invp_max` – range of the inverse momentum of global tracks.
///
/// **Minimizer**
/// * `minimizer` – least-squares strategy.
/// * `max_iterations` – Levenberg–Marquardt iteration cap.
/// * `simplex_max_iterations` – simplex iteration cap.
/// * `fit_tolerance` – relative chi-square change that stops the minimization.
///
/// **Quality gate**
/// * `prob_loose` – chi-square probability required from every tracklet.
/// * `prob_tight` – chi-square probability required from global tracks.
/// * `station_chisq_max` – chi-square ceiling of single-station tracklets.
/// * `hit_reject` – bad-hit threshold in units of the plane resolution.
/// * `mask_patterns` – plane-name patterns of the hodoscope mask groups (H1, H2, H3, H4, prop tubes).
/// * `mask_contingency` – fractional growth of a paddle box before matching.
/// * `mask_n_sigma` – projection errors added around a paddle box.
///
/// **Left-right resolution**
/// * `lr_tight_back_partial`, `lr_loose_back_partial` – pull thresholds of the two passes on back-partial tracks.
/// * `lr_tight_global`, `lr_loose_global` – same for global tracks.
///
/// **Station-1 windows**
/// * `st1_window` – window mode.
/// * `sagitta_ratio`, `sagitta_sigma` – per-view (X, U, V) sagitta ratio and its relative width.
/// * `st1_window_n_sigma` – half-width multiplier of the station-1 windows.
///
/// **Event acceptance**
/// * `max_chamber_hits` – hit caps of D1, D2, D3p, D3m.
/// * `max_hodo_hits` – hit caps of the H1..H4 mask groups.
///
/// **Field**
/// * `field` – magnet model.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingParams {
    // --- Fit bounds ---
    pub tx_max: f64,
    pub ty_max: f64,
    pub x0_max: Cm,
    pub y0_max: Cm,
    pub invp_min: f64,
    pub invp_max: f64,

    // --- Minimizer ---
    pub minimizer: MinimizerKind,
    pub max_iterations: usize,
    pub simplex_max_iterations: usize,
    pub fit_tolerance: f64,

    // --- Quality gate ---
    pub prob_loose: f64,
    pub prob_tight: f64,
    pub station_chisq_max: f64,
    pub hit_reject: f64,
    pub mask_patterns: [String; N_MASK_GROUPS],
    pub mask_contingency: f64,
    pub mask_n_sigma: f64,

    // --- Left-right resolution ---
    pub lr_tight_back_partial: f64,
    pub lr_loose_back_partial: f64,
    pub lr_tight_global: f64,
    pub lr_loose_global: f64,

    // --- Station-1 windows ---
    pub st1_window: St1Window,
    pub sagitta_ratio: [f64; 3],
    pub sagitta_sigma: [f64; 3],
    pub st1_window_n_sigma: f64,

    // --- Event acceptance ---
    pub max_chamber_hits: [usize; 4],
    pub max_hodo_hits: [usize; 4],

    // --- Field ---
    pub field: FieldConfig,
}

impl TrackingParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder starting from the defaults.
    pub fn builder() -> TrackingParamsBuilder {
        TrackingParamsBuilder::new()
    }

    /// Field-off preset for cosmic-ray running: no KMag kick, straight tracks with loose
    /// slope and intercept bounds.
    pub fn cosmic() -> Self {
        Self {
            tx_max: 1.,
            ty_max: 1.,
            x0_max: 1000.,
            y0_max: 1000.,
            field: FieldConfig::field_off(),
            ..Self::default()
        }
    }

    pub fn fit_bounds(&self) -> FitBounds {
        FitBounds {
            tx_max: self.tx_max,
            ty_max: self.ty_max,
            x0_max: self.x0_max,
            y0_max: self.y0_max,
            invp_min: self.invp_min,
            invp_max: self.invp_max,
        }
    }

    /// Check every parameter against its allowed range.
    ///
    /// Validation rules
    /// -----------------
    /// * `tx_max`, `ty_max`, `x0_max`, `y0_max` > 0.
    /// * `0 < invp_min ≤ invp_max`.
    /// * `max_iterations ≥ 1`, `simplex_max_iterations ≥ 1`, `fit_tolerance > 0`.
    /// * `0 ≤ prob_loose ≤ 1`, `0 ≤ prob_tight ≤ 1`.
    /// * `station_chisq_max > 0`, `hit_reject > 0`.
    /// * `mask_contingency ≥ 0`, `mask_n_sigma ≥ 0`, mask patterns non-empty.
    /// * Left-right thresholds > 0 with tight ≤ loose.
    /// * `sagitta_sigma` ≥ 0, `st1_window_n_sigma` > 0.
    /// * Field: FMag length > 0, at least one FMag slice and one target step.
    ///
    /// Return
    /// ----------
    /// * `Err(TrackerError::InvalidTrackingParameter)` naming the first violated rule.
    pub fn validate(&self) -> Result<(), TrackerError> {
        let invalid = |msg: &str| Err(TrackerError::InvalidTrackingParameter(msg.into()));

        // --- Fit bounds ---
        if !(gt0(self.tx_max) && gt0(self.ty_max)) {
            return invalid("tx_max and ty_max must be > 0");
        }
        if !(gt0(self.x0_max) && gt0(self.y0_max)) {
            return invalid("x0_max and y0_max must be > 0");
        }
        if !(gt0(self.invp_min) && le(self.invp_min, self.invp_max)) {
            return invalid("require 0 < invp_min <= invp_max");
        }

        // --- Minimizer ---
        if self.max_iterations == 0 || self.simplex_max_iterations == 0 {
            return invalid("iteration caps must be >= 1");
        }
        if !gt0(self.fit_tolerance) {
            return invalid("fit_tolerance must be > 0");
        }

        // --- Quality gate ---
        if !(ge0(self.prob_loose) && le(self.prob_loose, 1.)) {
            return invalid("prob_loose must lie in [0, 1]");
        }
        if !(ge0(self.prob_tight) && le(self.prob_tight, 1.)) {
            return invalid("prob_tight must lie in [0, 1]");
        }
        if !gt0(self.station_chisq_max) || !gt0(self.hit_reject) {
            return invalid("station_chisq_max and hit_reject must be > 0");
        }
        if !ge0(self.mask_contingency) || !ge0(self.mask_n_sigma) {
            return invalid("mask_contingency and mask_n_sigma must be >= 0");
        }
        if self.mask_patterns.iter().any(|m| m.is_empty()) {
            return invalid("mask patterns must not be empty");
        }

        // --- Left-right resolution ---
        for (tight, loose) in [
            (self.lr_tight_back_partial, self.lr_loose_back_partial),
            (self.lr_tight_global, self.lr_loose_global),
        ] {
            if !(gt0(tight) && le(tight, loose)) {
                return invalid("left-right thresholds require 0 < tight <= loose");
            }
        }

        // --- Station-1 windows ---
        if !self.sagitta_sigma.iter().all(|&s| ge0(s)) {
            return invalid("sagitta_sigma must be >= 0");
        }
        if !gt0(self.st1_window_n_sigma) {
            return invalid("st1_window_n_sigma must be > 0");
        }

        // --- Field ---
        if !gt0(self.field.fmag_length) {
            return invalid("fmag_length must be > 0");
        }
        if self.field.nslices_fmag == 0 || self.field.nsteps_target == 0 {
            return invalid("swim slicing requires at least one slice and one step");
        }

        Ok(())
    }
}

// ---- Numeric helpers for PartialOrd (handle NaN as invalid) ----

/// Return true iff x > 0.0 and comparable (i.e., not NaN).
#[inline]
fn gt0(x: f64) -> bool {
    x.partial_cmp(&0.0) == Some(Greater)
}

/// Return true iff x >= 0.0 and comparable (i.e., not NaN).
#[inline]
fn ge0(x: f64) -> bool {
    matches!(x.partial_cmp(&0.0), Some(Greater) | Some(Equal))
}

/// Return true iff a <= b and comparable (i.e., not NaN).
#[inline]
fn le(a: f64, b: f64) -> bool {
    matches!(a.partial_cmp(&b), Some(Less) | Some(Equal))
}

impl Default for TrackingParams {
    fn default() -> Self {
        Self {
            // Fit bounds
            tx_max: TX_MAX,
            ty_max: TY_MAX,
            x0_max: X0_MAX,
            y0_max: Y0_MAX,
            invp_min: INVP_MIN,
            invp_max: INVP_MAX,

            // Minimizer
            minimizer: MinimizerKind::LevenbergMarquardt,
            max_iterations: 100,
            simplex_max_iterations: 2000,
            fit_tolerance: 1e-8,

            // Quality gate
            prob_loose: PROB_LOOSE,
            prob_tight: PROB_TIGHT,
            station_chisq_max: STATION_CHISQ_MAX,
            hit_reject: HIT_REJECT,
            mask_patterns: [
                "^H1X$".into(),
                "^H2X$".into(),
                "^H3X$".into(),
                "^H4X$".into(),
                "^P[12]X$".into(),
            ],
            mask_contingency: 0.15,
            mask_n_sigma: 3.,

            // Left-right resolution
            lr_tight_back_partial: 25.,
            lr_loose_back_partial: 100.,
            lr_tight_global: 100.,
            lr_loose_global: 1000.,

            // Station-1 windows
            st1_window: St1Window::FieldAware,
            sagitta_ratio: [1.8, 1.9, 1.7],
            sagitta_sigma: [0.2, 0.2, 0.2],
            st1_window_n_sigma: 5.,

            // Event acceptance
            max_chamber_hits: [250, 100, 100, 100],
            max_hodo_hits: [25, 10, 10, 10],

            field: FieldConfig::default(),
        }
    }
}

/// Builder for [`TrackingParams`].
#[derive(Debug, Clone)]
pub struct TrackingParamsBuilder {
    params: TrackingParams,
}

impl Default for TrackingParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackingParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: TrackingParams::default(),
        }
    }

    /// Start from an existing configuration (e.g. [`TrackingParams::cosmic`]).
    pub fn from_params(params: TrackingParams) -> Self {
        Self { params }
    }

    // --- Fit bounds ---
    pub fn tx_max(mut self, v: f64) -> Self {
        self.params.tx_max = v;
        self
    }
    pub fn ty_max(mut self, v: f64) -> Self {
        self.params.ty_max = v;
        self
    }
    pub fn x0_max(mut self, v: f64) -> Self {
        self.params.x0_max = v;
        self
    }
    pub fn y0_max(mut self, v: f64) -> Self {
        self.params.y0_max = v;
        self
    }
    pub fn invp_range(mut self, min: f64, max: f64) -> Self {
        self.params.invp_min = min;
        self.params.invp_max = max;
        self
    }

    // --- Minimizer ---
    pub fn minimizer(mut self, v: MinimizerKind) -> Self {
        self.params.minimizer = v;
        self
    }
    pub fn max_iterations(mut self, v: usize) -> Self {
        self.params.max_iterations = v;
        self
    }
    pub fn simplex_max_iterations(mut self, v: usize) -> Self {
        self.params.simplex_max_iterations = v;
        self
    }
    pub fn fit_tolerance(mut self, v: f64) -> Self {
        self.params.fit_tolerance = v;
        self
    }

    // --- Quality gate ---
    pub fn prob_loose(mut self, v: f64) -> Self {
        self.params.prob_loose = v;
        self
    }
    pub fn prob_tight(mut self, v: f64) -> Self {
        self.params.prob_tight = v;
        self
    }
    pub fn station_chisq_max(mut self, v: f64) -> Self {
        self.params.station_chisq_max = v;
        self
    }
    pub fn hit_reject(mut self, v: f64) -> Self {
        self.params.hit_reject = v;
        self
    }
    pub fn mask_patterns(mut self, v: [String; N_MASK_GROUPS]) -> Self {
        self.params.mask_patterns = v;
        self
    }
    pub fn mask_contingency(mut self, v: f64) -> Self {
        self.params.mask_contingency = v;
        self
    }
    pub fn mask_n_sigma(mut self, v: f64) -> Self {
        self.params.mask_n_sigma = v;
        self
    }

    // --- Left-right resolution ---
    pub fn lr_back_partial(mut self, tight: f64, loose: f64) -> Self {
        self.params.lr_tight_back_partial = tight;
        self.params.lr_loose_back_partial = loose;
        self
    }
    pub fn lr_global(mut self, tight: f64, loose: f64) -> Self {
        self.params.lr_tight_global = tight;
        self.params.lr_loose_global = loose;
        self
    }

    // --- Station-1 windows ---
    pub fn st1_window(mut self, v: St1Window) -> Self {
        self.params.st1_window = v;
        self
    }
    pub fn sagitta(mut self, ratio: [f64; 3], sigma: [f64; 3]) -> Self {
        self.params.sagitta_ratio = ratio;
        self.params.sagitta_sigma = sigma;
        self
    }
    pub fn st1_window_n_sigma(mut self, v: f64) -> Self {
        self.params.st1_window_n_sigma = v;
        self
    }

    // --- Event acceptance ---
    pub fn max_chamber_hits(mut self, v: [usize; 4]) -> Self {
        self.params.max_chamber_hits = v;
        self
    }
    pub fn max_hodo_hits(mut self, v: [usize; 4]) -> Self {
        self.params.max_hodo_hits = v;
        self
    }

    // --- Field ---
    pub fn field(mut self, v: FieldConfig) -> Self {
        self.params.field = v;
        self
    }
    pub fn kmag_on(mut self, v: bool) -> Self {
        self.params.field.kmag_on = v;
        self
    }

    /// Finalize the builder and produce a [`TrackingParams`] instance.
    ///
    /// Returns
    /// -----------------
    /// * `Ok(TrackingParams)` if [`TrackingParams::validate`] passes.
    /// * `Err(TrackerError::InvalidTrackingParameter)` naming the first violated rule.
    pub fn build(self) -> Result<TrackingParams, TrackerError> {
        self.params.validate()?;
        Ok(self.params)
    }
}

impl fmt::Display for TrackingParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 44;
            writeln!(f, "Fast Tracking Parameters")?;
            writeln!(f, "------------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[Fit bounds]")?;
            line!("tx_max        = {:.3}", self.tx_max, "Max |tx|")?;
            line!("ty_max        = {:.3}", self.ty_max, "Max |ty|")?;
            line!("x0_max        = {:.1} cm", self.x0_max, "Max |x0|")?;
            line!("y0_max        = {:.1} cm", self.y0_max, "Max |y0|")?;
            line!(
                "invp          = {}",
                format!("[{:.3}, {:.3}]", self.invp_min, self.invp_max),
                "Inverse momentum range (1/GeV)"
            )?;

            writeln!(f, "\n[Minimizer]")?;
            line!("minimizer     = {:?}", self.minimizer, "Least-squares strategy")?;
            line!("max_iterations= {}", self.max_iterations, "LM iteration cap")?;
            line!(
                "simplex_iter  = {}",
                self.simplex_max_iterations,
                "Simplex iteration cap"
            )?;
            line!("fit_tolerance = {:.1e}", self.fit_tolerance, "Relative chi2 change")?;

            writeln!(f, "\n[Quality gate]")?;
            line!("prob_loose    = {:.1e}", self.prob_loose, "All tracklets")?;
            line!("prob_tight    = {:.1e}", self.prob_tight, "Global tracks")?;
            line!("station_chisq = {:.1}", self.station_chisq_max, "Stations 1-4")?;
            line!("hit_reject    = {:.1}", self.hit_reject, "Bad hit, in resolutions")?;
            line!(
                "mask_groups   = {}",
                self.mask_patterns.join(" "),
                "Hodoscope mask patterns"
            )?;
            line!(
                "mask_window   = {}",
                format!(
                    "+{:.0}% / {:.1} sigma",
                    100. * self.mask_contingency,
                    self.mask_n_sigma
                ),
                "Paddle box growth"
            )?;

            writeln!(f, "\n[Left-right resolution]")?;
            line!(
                "back_partial  = {}",
                format!(
                    "{:.0} / {:.0}",
                    self.lr_tight_back_partial, self.lr_loose_back_partial
                ),
                "Pull thresholds"
            )?;
            line!(
                "global        = {}",
                format!("{:.0} / {:.0}", self.lr_tight_global, self.lr_loose_global),
                "Pull thresholds"
            )?;

            writeln!(f, "\n[Station-1 windows]")?;
            line!("st1_window    = {:?}", self.st1_window, "Window mode")?;
            line!(
                "sagitta_ratio = {:?}",
                self.sagitta_ratio,
                "X / U / V"
            )?;
            line!(
                "sagitta_sigma = {:?}",
                self.sagitta_sigma,
                "X / U / V"
            )?;
            line!(
                "n_sigma       = {:.1}",
                self.st1_window_n_sigma,
                "Window half-width multiplier"
            )?;

            writeln!(f, "\n[Event acceptance]")?;
            line!(
                "chamber caps  = {:?}",
                self.max_chamber_hits,
                "D1 / D2 / D3p / D3m"
            )?;
            line!("hodo caps     = {:?}", self.max_hodo_hits, "H1 / H2 / H3 / H4")?;

            writeln!(f, "\n[Field]")?;
            line!("kmag_on       = {}", self.field.kmag_on, "Model the KMag kick")?;
            line!(
                "pt_kick_kmag  = {:.4} GeV",
                self.field.pt_kick_kmag,
                "KMag kick"
            )?;
            line!(
                "z_kmag_bend   = {:.2} cm",
                self.field.z_kmag_bend,
                "KMag bend plane"
            )?;

            Ok(())
        } else {
            write!(
                f,
                "TrackingParams(minimizer={:?}, |tx|≤{:.3}, |ty|≤{:.3}, |x0|≤{:.0}, |y0|≤{:.0}, 1/p∈[{:.3},{:.3}], prob≥{:.1e}/{:.1e}, st1_window={:?}, kmag_on={})",
                self.minimizer,
                self.tx_max,
                self.ty_max,
                self.x0_max,
                self.y0_max,
                self.invp_min,
                self.invp_max,
                self.prob_loose,
                self.prob_tight,
                self.st1_window,
                self.field.kmag_on,
            )
        }
    }
}

#[cfg(test)]
mod tracking_params_test {
    use super::*;

    #[test]
    fn test_default_builds() {
        let built = TrackingParams::builder().build().unwrap();
        assert_eq!(built, TrackingParams::default());
        assert!(built.field.kmag_on);
    }

    #[test]
    fn test_cosmic_preset() {
        let cosmic = TrackingParamsBuilder::from_params(TrackingParams::cosmic())
            .build()
            .unwrap();
        assert!(!cosmic.field.kmag_on);
        assert_eq!(cosmic.tx_max, 1.);
        assert_eq!(cosmic.x0_max, 1000.);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let err = TrackingParams::builder()
            .invp_range(0.2, 0.1)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            TrackerError::InvalidTrackingParameter("require 0 < invp_min <= invp_max".into())
        );
        assert!(TrackingParams::builder().tx_max(f64::NAN).build().is_err());
        assert!(TrackingParams::builder().prob_tight(1.5).build().is_err());
        assert!(TrackingParams::builder().lr_global(100., 10.).build().is_err());
        assert!(TrackingParams::builder().max_iterations(0).build().is_err());
    }

    #[test]
    fn test_display() {
        let p = TrackingParams::default();
        let short = format!("{p}");
        assert!(short.starts_with("TrackingParams(minimizer=LevenbergMarquardt"));
        let table = format!("{p:#}");
        assert!(table.contains("[Left-right resolution]"));
        assert!(table.contains("^P[12]X$"));
    }
}
