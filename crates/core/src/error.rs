//! Error types shared by the annotation, calibration and export layers.

use crate::annotation::{ImageIndex, PointId};

/// Errors raised by the measurement engine
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("at least {required} points are required, found {found}")]
    InsufficientPoints { required: usize, found: usize },

    #[error("invalid calibration value: {0}")]
    InvalidCalibrationValue(String),

    #[error("two calibration markers are already placed; cancel calibration to start over")]
    TooManyMarkers,

    #[error("{entity} {id} references missing point {point_id}")]
    MissingReference { entity: &'static str, id: u32, point_id: PointId },

    #[error("nothing to export: {0}")]
    NoDataToExport(String),

    #[error("point {0} not found")]
    PointNotFound(PointId),

    #[error("surface {0} not found")]
    SurfaceNotFound(u32),

    #[error("opening {0} not found")]
    OpeningNotFound(u32),

    #[error("an opening needs exactly 4 corner points, got {0}")]
    OpeningPointCount(usize),

    #[error("calibration markers belong to image {expected}, not image {found}")]
    CalibrationImageMismatch { expected: ImageIndex, found: ImageIndex },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("timestamp formatting error: {0}")]
    Timestamp(#[from] time::error::Format),
}

pub type PlanResult<T> = Result<T, PlanError>;
