//! Project export and import
//!
//! The project file is a pretty-printed JSON document holding every image's
//! annotations, the viewer settings (including calibration) and aggregate
//! counts. Import followed by export reproduces the document except for the
//! timestamp.

use crate::annotation::{
    AnnotationStore, ImageAnnotationSet, ImageIndex, ImageInfo, ImageStatistics, Line, Opening, Point, Surface,
};
use crate::calibration::Calibration;
use crate::config::ViewerSettings;
use crate::error::{PlanError, PlanResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;

/// Format version written to every export
pub const EXPORT_VERSION: &str = "2.0";

/// Top-level project document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectExport {
    pub version: String,
    pub timestamp: String,
    pub total_images: usize,
    pub images: Vec<ImageInfo>,
    pub settings: ViewerSettings,
    pub image_data: BTreeMap<ImageIndex, ImageDataExport>,
    #[serde(default)]
    pub summary: ExportSummary,
}

/// Annotations of one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDataExport {
    pub image_name: String,
    pub image_id: ImageIndex,
    #[serde(default)]
    pub points: Vec<Point>,
    #[serde(default)]
    pub lines: Vec<Line>,
    #[serde(default)]
    pub surfaces: Vec<Surface>,
    #[serde(default)]
    pub openings: Vec<Opening>,
    #[serde(default)]
    pub statistics: ImageStatistics,
}

/// Counts across all images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportSummary {
    pub total_points: usize,
    pub total_lines: usize,
    pub total_surfaces: usize,
    pub total_openings: usize,
    pub images_with_data: usize,
}

/// State rebuilt from a project document
#[derive(Debug, Clone)]
pub struct ImportedProject {
    pub store: AnnotationStore,
    pub calibration: Calibration,
    pub settings: ViewerSettings,
}

fn image_name(store: &AnnotationStore, index: ImageIndex) -> String {
    store.image_name(index).map_or_else(|| format!("Image_{index}"), str::to_string)
}

/// Export with the current UTC time as timestamp
pub fn export_project(
    store: &AnnotationStore,
    calibration: &Calibration,
    settings: &ViewerSettings,
) -> PlanResult<ProjectExport> {
    let timestamp = OffsetDateTime::now_utc().format(&Rfc3339)?;
    export_project_at(store, calibration, settings, timestamp)
}

/// Export with an explicit timestamp.
///
/// # Errors
/// `NoDataToExport` when no image holds any annotation.
pub fn export_project_at(
    store: &AnnotationStore,
    calibration: &Calibration,
    settings: &ViewerSettings,
    timestamp: String,
) -> PlanResult<ProjectExport> {
    if store.is_empty() {
        return Err(PlanError::NoDataToExport("no annotations in any image".to_string()));
    }

    let mut settings = settings.clone();
    calibration.apply_to_settings(&mut settings);

    let mut summary = ExportSummary::default();
    let mut image_data = BTreeMap::new();
    for set in store.sets() {
        let statistics = set.statistics();
        summary.total_points += statistics.point_count;
        summary.total_lines += statistics.line_count;
        summary.total_surfaces += statistics.surface_count;
        summary.total_openings += statistics.opening_count;
        summary.images_with_data += 1;

        image_data.insert(
            set.image_index(),
            ImageDataExport {
                image_name: image_name(store, set.image_index()),
                image_id: set.image_index(),
                points: set.points().to_vec(),
                lines: set.lines().to_vec(),
                surfaces: set.surfaces().to_vec(),
                openings: set.openings().to_vec(),
                statistics,
            },
        );
    }

    info!(images = summary.images_with_data, points = summary.total_points, "project exported");
    Ok(ProjectExport {
        version: EXPORT_VERSION.to_string(),
        timestamp,
        total_images: store.images().len(),
        images: store.images().to_vec(),
        settings,
        image_data,
        summary,
    })
}

/// Rebuild store, calibration and settings from a project document.
///
/// Dangling references are pruned (and logged) rather than rejected.
pub fn import_project(export: &ProjectExport) -> ImportedProject {
    let mut store = AnnotationStore::new();
    for image in &export.images {
        store.register_image(image.id, image.name.clone());
    }

    for (index, data) in &export.image_data {
        if store.image_name(*index).is_none() && data.image_name != format!("Image_{index}") {
            store.register_image(*index, data.image_name.clone());
        }
        store.insert_set(ImageAnnotationSet::from_parts(
            *index,
            data.points.clone(),
            data.lines.clone(),
            data.surfaces.clone(),
            data.openings.clone(),
        ));
    }

    let calibration = Calibration::restore(&export.settings, &store);
    info!(
        images = export.image_data.len(),
        calibrated = calibration.is_calibrated(),
        "project imported"
    );
    ImportedProject { store, calibration, settings: export.settings.clone() }
}

pub fn to_json(export: &ProjectExport) -> PlanResult<String> {
    Ok(serde_json::to_string_pretty(export)?)
}

pub fn from_json(json: &str) -> PlanResult<ProjectExport> {
    Ok(serde_json::from_str(json)?)
}

/// Write the project file atomically through a temporary sibling
pub fn save_project(path: &Path, export: &ProjectExport) -> PlanResult<()> {
    let json = to_json(export)?;
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, json)?;
    fs::rename(&temp_path, path)?;
    info!(path = %path.display(), points = export.summary.total_points, "project saved");
    Ok(())
}

pub fn load_project(path: &Path) -> PlanResult<ProjectExport> {
    let json = fs::read_to_string(path)?;
    from_json(&json)
}
