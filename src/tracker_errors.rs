use thiserror::Error;

use crate::constants::{DetectorId, StationId};

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Invalid tracking parameter: {0}")]
    InvalidTrackingParameter(String),

    #[error("Unknown detector: {0}")]
    UnknownDetector(DetectorId),

    #[error("No detector matches the pattern: {0}")]
    UnmatchedDetectorPattern(String),

    #[error("Invalid detector pattern: {0}")]
    InvalidDetectorPattern(#[from] regex::Error),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Geometry table parsing error: {0}")]
    GeometryCsvError(#[from] csv::Error),

    #[error("Invalid geometry record: {0}")]
    InvalidGeometryRecord(String),

    #[error("Event rejected: {group} has {n_hits} hits (limit {limit})")]
    EventRejected {
        group: String,
        n_hits: usize,
        limit: usize,
    },

    #[error("No tracklet found in station {0}")]
    NoTrackletInStation(StationId),

    #[error("No back-partial track found")]
    NoBackPartialTrack,

    #[error("No global track found")]
    NoGlobalTrack,
}

impl PartialEq for TrackerError {
    fn eq(&self, other: &Self) -> bool {
        use TrackerError::*;
        match (self, other) {
            (InvalidTrackingParameter(a), InvalidTrackingParameter(b)) => a == b,
            (UnknownDetector(a), UnknownDetector(b)) => a == b,
            (UnmatchedDetectorPattern(a), UnmatchedDetectorPattern(b)) => a == b,
            (InvalidGeometryRecord(a), InvalidGeometryRecord(b)) => a == b,
            (
                EventRejected {
                    group: g1,
                    n_hits: n1,
                    limit: l1,
                },
                EventRejected {
                    group: g2,
                    n_hits: n2,
                    limit: l2,
                },
            ) => g1 == g2 && n1 == n2 && l1 == l2,
            (NoTrackletInStation(a), NoTrackletInStation(b)) => a == b,
            (NoBackPartialTrack, NoBackPartialTrack) => true,
            (NoGlobalTrack, NoGlobalTrack) => true,

            // Foreign errors carry no meaningful equality; compare by kind only
            (InvalidDetectorPattern(_), InvalidDetectorPattern(_)) => true,
            (IoError(_), IoError(_)) => true,
            (GeometryCsvError(_), GeometryCsvError(_)) => true,

            _ => false,
        }
    }
}
