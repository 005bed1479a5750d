//! # In-memory plane table
//!
//! [`PlaneTable`] is a [`GeometryProvider`] backed by one [`PlaneSpec`] record per detector
//! plane plus a rectangle per magnet aperture. Tables are read from CSV (one row per plane,
//! header names equal to the [`PlaneSpec`] field names) or built programmatically.
//!
//! Wire positions follow
//!
//! ```text
//! measurement(elem) = (elem − (n_elements + 1) / 2) · spacing + x_offset
//! ```
//!
//! so primed planes are described by a half-cell `x_offset`.
//!
//! [`PlaneTable::standard`] returns an idealized four-station spectrometer (chambers, four
//! hodoscope stations and two proportional-tube stations) with realistic z positions,
//! spacings and stereo angles.
use std::{collections::HashMap, io::Read, path::Path};

use ahash::RandomState;
use serde::{Deserialize, Serialize};

use crate::constants::{Cm, DetectorId, ElementId};
use crate::geometry::{
    is_chamber, ElementBox, GeometryProvider, Magnet, PlaneView, ScaleBox, StereoAngle,
};
use crate::tracker_errors::TrackerError;

/// One detector plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaneSpec {
    pub detector_id: DetectorId,
    pub name: String,
    pub view: PlaneView,
    pub z: Cm,
    /// Stereo angle (radians)
    pub angle: f64,
    pub spacing: Cm,
    pub resolution: Cm,
    pub n_elements: ElementId,
    pub x_offset: Cm,
    pub x_center: Cm,
    pub y_center: Cm,
    pub scale_x: Cm,
    pub scale_y: Cm,
}

impl PlaneSpec {
    /// Position of an element centre along the measuring direction.
    pub fn element_position(&self, element_id: ElementId) -> Cm {
        (element_id as f64 - (self.n_elements as f64 + 1.) / 2.) * self.spacing + self.x_offset
    }

    /// Element whose cell contains the measured coordinate `u`, if any.
    pub fn element_at(&self, u: Cm) -> Option<ElementId> {
        let e = ((u - self.x_offset) / self.spacing + (self.n_elements as f64 + 1.) / 2.).round();
        (e >= 1. && e <= self.n_elements as f64).then_some(e as ElementId)
    }

    /// True if `(x, y)` lies inside the active area.
    pub fn covers(&self, x: Cm, y: Cm) -> bool {
        (x - self.x_center).abs() <= 0.5 * self.scale_x
            && (y - self.y_center).abs() <= 0.5 * self.scale_y
    }

    fn validate(&self) -> Result<(), TrackerError> {
        let positive = |v: f64| v.partial_cmp(&0.0) == Some(std::cmp::Ordering::Greater);
        if self.detector_id == 0 {
            return Err(TrackerError::InvalidGeometryRecord(format!(
                "{}: detector_id must be >= 1",
                self.name
            )));
        }
        if !positive(self.spacing) || !positive(self.resolution) {
            return Err(TrackerError::InvalidGeometryRecord(format!(
                "{}: spacing and resolution must be > 0",
                self.name
            )));
        }
        if self.n_elements == 0 {
            return Err(TrackerError::InvalidGeometryRecord(format!(
                "{}: n_elements must be >= 1",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct PlaneEntry {
    spec: PlaneSpec,
    stereo: StereoAngle,
}

/// Detector description held in memory.
#[derive(Debug, Clone, Default)]
pub struct PlaneTable {
    planes: HashMap<DetectorId, PlaneEntry, RandomState>,
    apertures: HashMap<Magnet, ElementBox, RandomState>,
}

impl PlaneTable {
    /// Build a table from plane records.
    ///
    /// Arguments
    /// -----------------
    /// * `planes`: one record per detector plane.
    ///
    /// Return
    /// ----------
    /// * The table, or [`TrackerError::InvalidGeometryRecord`] for a malformed or duplicated
    ///   plane.
    pub fn new(planes: impl IntoIterator<Item = PlaneSpec>) -> Result<Self, TrackerError> {
        let mut table = PlaneTable::default();
        for spec in planes {
            spec.validate()?;
            let id = spec.detector_id;
            let stereo = StereoAngle::from_angle(spec.angle);
            if table
                .planes
                .insert(id, PlaneEntry { spec, stereo })
                .is_some()
            {
                return Err(TrackerError::InvalidGeometryRecord(format!(
                    "duplicated detector_id {id}"
                )));
            }
        }
        Ok(table)
    }

    /// Register the physical aperture of a magnet.
    pub fn with_aperture(mut self, magnet: Magnet, aperture: ElementBox) -> Self {
        self.apertures.insert(magnet, aperture);
        self
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, TrackerError> {
        let mut rdr = csv::Reader::from_reader(reader);
        let planes = rdr
            .deserialize::<PlaneSpec>()
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(planes)
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, TrackerError> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    pub fn plane(&self, detector_id: DetectorId) -> Option<&PlaneSpec> {
        self.planes.get(&detector_id).map(|e| &e.spec)
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    fn entry(&self, detector_id: DetectorId) -> &PlaneEntry {
        match self.planes.get(&detector_id) {
            Some(e) => e,
            None => panic!("detector {detector_id} is not part of the plane table"),
        }
    }

    /// Idealized four-station spectrometer.
    ///
    /// * chambers `1..=24`: per station the planes X, X', U, U', V, V' with stereo angles
    ///   0, +14°, −14°; D3p covers the upper half (y > 0) and D3m the lower half,
    /// * hodoscopes `25..=31`: H1X, H1Y, H2X, H2Y, H3X, H4X, H4Y,
    /// * proportional tubes `32..=35`: P1X, P1Y, P2X, P2Y,
    /// * KMag aperture ±100 × ±76.2 cm, FMag ±76.2 × ±76.2 cm.
    pub fn standard() -> Self {
        let stereo = 14f64.to_radians();
        let dz = [0., 1.2, 4.0, 5.2, 8.0, 9.2];
        let views = [
            (PlaneView::X, 0.),
            (PlaneView::U, stereo),
            (PlaneView::V, -stereo),
        ];

        // name, z of the first plane, spacing, resolution, n_elements, y_center, scale_x, scale_y
        let stations: [(&str, Cm, Cm, Cm, ElementId, Cm, Cm, Cm); 4] = [
            ("D1", 600., 0.635, 0.04, 160, 0., 101.6, 101.6),
            ("D2", 1340., 2.021, 0.04, 128, 0., 233.0, 132.0),
            ("D3p", 1910., 2.0, 0.05, 116, 83., 232.0, 166.0),
            ("D3m", 1890., 2.0, 0.05, 116, -83., 232.0, 166.0),
        ];

        let mut planes = Vec::with_capacity(35);
        for (s, &(name, z0, spacing, resolution, n, yc, sx, sy)) in stations.iter().enumerate() {
            for (k, &(view, angle)) in views.iter().enumerate() {
                for primed in 0..2 {
                    let slot = 2 * k + primed;
                    let suffix = format!("{view:?}{}", if primed == 1 { "p" } else { "" });
                    planes.push(PlaneSpec {
                        detector_id: (6 * s + slot + 1) as DetectorId,
                        name: format!("{name}{suffix}"),
                        view,
                        z: z0 + dz[slot],
                        angle,
                        spacing,
                        resolution,
                        n_elements: n,
                        x_offset: 0.5 * spacing * primed as f64,
                        x_center: 0.,
                        y_center: yc,
                        scale_x: sx,
                        scale_y: sy,
                    });
                }
            }
        }

        // name, view, z, paddle width, n_elements, scale_x, scale_y
        let paddles: [(&str, PlaneView, Cm, Cm, ElementId, Cm, Cm); 11] = [
            ("H1X", PlaneView::X, 665., 7.0, 23, 161.0, 140.0),
            ("H1Y", PlaneView::Y, 667., 7.0, 20, 161.0, 140.0),
            ("H2X", PlaneView::X, 1420., 13.0, 16, 208.0, 142.0),
            ("H2Y", PlaneView::Y, 1422., 8.0, 19, 208.0, 152.0),
            ("H3X", PlaneView::X, 1960., 14.5, 16, 232.0, 170.0),
            ("H4X", PlaneView::X, 2240., 19.6, 16, 314.0, 200.0),
            ("H4Y", PlaneView::Y, 2250., 16.0, 16, 314.0, 256.0),
            ("P1X", PlaneView::X, 2100., 5.08, 72, 366.0, 366.0),
            ("P1Y", PlaneView::Y, 2110., 5.08, 72, 366.0, 366.0),
            ("P2X", PlaneView::X, 2400., 5.08, 72, 366.0, 366.0),
            ("P2Y", PlaneView::Y, 2410., 5.08, 72, 366.0, 366.0),
        ];
        for (i, &(name, view, z, width, n, sx, sy)) in paddles.iter().enumerate() {
            planes.push(PlaneSpec {
                detector_id: (25 + i) as DetectorId,
                name: name.into(),
                view,
                z,
                angle: if view == PlaneView::Y {
                    std::f64::consts::FRAC_PI_2
                } else {
                    0.
                },
                spacing: width,
                resolution: width / 12f64.sqrt(),
                n_elements: n,
                x_offset: 0.,
                x_center: 0.,
                y_center: 0.,
                scale_x: sx,
                scale_y: sy,
            });
        }

        match Self::new(planes) {
            Ok(table) => table
                .with_aperture(
                    Magnet::KMag,
                    ElementBox {
                        x_min: -100.,
                        x_max: 100.,
                        y_min: -76.2,
                        y_max: 76.2,
                    },
                )
                .with_aperture(
                    Magnet::FMag,
                    ElementBox {
                        x_min: -76.2,
                        x_max: 76.2,
                        y_min: -76.2,
                        y_max: 76.2,
                    },
                ),
            Err(e) => unreachable!("standard plane table is malformed: {e}"),
        }
    }
}

impl GeometryProvider for PlaneTable {
    fn has_detector(&self, detector_id: DetectorId) -> bool {
        self.planes.contains_key(&detector_id)
    }

    fn plane_z(&self, detector_id: DetectorId) -> Cm {
        self.entry(detector_id).spec.z
    }

    fn resolution(&self, detector_id: DetectorId) -> Cm {
        self.entry(detector_id).spec.resolution
    }

    fn spacing(&self, detector_id: DetectorId) -> Cm {
        self.entry(detector_id).spec.spacing
    }

    fn stereo_angle(&self, detector_id: DetectorId) -> StereoAngle {
        self.entry(detector_id).stereo
    }

    fn plane_view(&self, detector_id: DetectorId) -> PlaneView {
        self.entry(detector_id).spec.view
    }

    fn measurement(&self, detector_id: DetectorId, element_id: ElementId) -> Cm {
        self.entry(detector_id).spec.element_position(element_id)
    }

    fn scale(&self, detector_id: DetectorId) -> ScaleBox {
        let spec = &self.entry(detector_id).spec;
        ScaleBox {
            x: spec.scale_x,
            y: spec.scale_y,
        }
    }

    fn element_box(&self, detector_id: DetectorId, element_id: ElementId) -> Option<ElementBox> {
        if is_chamber(detector_id) {
            return None;
        }
        let spec = &self.planes.get(&detector_id)?.spec;
        if element_id == 0 || element_id > spec.n_elements {
            return None;
        }
        let c = spec.element_position(element_id);
        let half = 0.5 * spec.spacing;
        Some(match spec.view {
            PlaneView::Y => ElementBox {
                x_min: spec.x_center - 0.5 * spec.scale_x,
                x_max: spec.x_center + 0.5 * spec.scale_x,
                y_min: c - half,
                y_max: c + half,
            },
            _ => ElementBox {
                x_min: c - half,
                x_max: c + half,
                y_min: spec.y_center - 0.5 * spec.scale_y,
                y_max: spec.y_center + 0.5 * spec.scale_y,
            },
        })
    }

    /// Magnets without a registered aperture do not restrict tracks.
    fn in_aperture(&self, magnet: Magnet, x: Cm, y: Cm) -> bool {
        self.apertures
            .get(&magnet)
            .map_or(true, |aperture| aperture.contains(x, y))
    }

    fn detector_ids(&self, pattern: &str) -> Result<Vec<DetectorId>, TrackerError> {
        let re = regex::Regex::new(pattern)?;
        let mut ids: Vec<DetectorId> = self
            .planes
            .values()
            .filter(|e| re.is_match(&e.spec.name))
            .map(|e| e.spec.detector_id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}
