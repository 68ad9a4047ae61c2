//! Panorama floor-plan core library
//!
//! Geometry, annotation model, calibration and reports for measuring rooms
//! on 360° panoramas.

pub mod annotation;
pub mod calibration;
pub mod config;
pub mod csv_export;
pub mod detector;
pub mod error;
pub mod export;
pub mod floor_plan;
pub mod geometry;
pub mod opening;
pub mod session;
pub mod shape;

pub use annotation::{
    AnnotationStore, ImageAnnotationSet, ImageIndex, ImageInfo, Line, LineId, Opening, OpeningId,
    OpeningProperties, OpeningType, Placement, Point, PointId, Surface, SurfaceId,
};
pub use calibration::{Calibration, CalibrationState};
pub use config::{ConfigError, PlanConfig, ViewerSettings};
pub use csv_export::{export_openings_csv, export_rooms_csv, CsvExportConfig, CsvExportError};
pub use detector::{CandidateHint, CandidatePolygon, CandidateSource, DetectorConfig, StaticCandidates};
pub use error::{PlanError, PlanResult};
pub use export::{ImportedProject, ProjectExport};
pub use floor_plan::{project_floor_plan, FloorPlanOptions, FloorPlanOutcome, FloorPlanScene, PlanElement};
pub use geometry::{Point2, Vec3};
pub use opening::{OpeningDimensions, OpeningDraft};
pub use session::{ClickOutcome, Mode, Session};
pub use shape::{RoomDimensions, RoomMeasurement, ShapeKind};
