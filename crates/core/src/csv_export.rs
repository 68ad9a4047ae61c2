//! CSV export for room measurements and openings
//!
//! Tabular reports for spreadsheets and external tools. Values are in
//! physical units when the session is calibrated.

use crate::annotation::{AnnotationStore, ImageIndex};
use crate::calibration::Calibration;
use crate::shape::measure_all_surfaces;
use std::io::Write;

/// Error types for CSV export
#[derive(Debug, thiserror::Error)]
pub enum CsvExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),
}

pub type CsvExportResult<T> = Result<T, CsvExportError>;

/// Configuration for CSV export
#[derive(Debug, Clone)]
pub struct CsvExportConfig {
    /// Include column headers in the output
    pub include_headers: bool,

    /// CSV delimiter character
    pub delimiter: u8,

    /// Export only rows from specific images (None = all images)
    pub image_filter: Option<Vec<ImageIndex>>,

    /// Rectangle tolerance used when classifying rooms
    pub rectangle_tolerance: f64,
}

impl Default for CsvExportConfig {
    fn default() -> Self {
        Self {
            include_headers: true,
            delimiter: b',',
            image_filter: None,
            rectangle_tolerance: 0.10,
        }
    }
}

impl CsvExportConfig {
    fn includes(&self, image: ImageIndex) -> bool {
        self.image_filter.as_ref().map_or(true, |images| images.contains(&image))
    }
}

fn number(value: f64) -> String {
    format!("{value:.2}")
}

/// Export one row per measurable surface
///
/// CSV columns:
/// - Image: Image index
/// - Image Name: Registered file name (empty if unknown)
/// - Surface: Surface id within the image
/// - Shape: triangle, rectangle, quadrilateral or polygon
/// - Vertices: Number of surface vertices
/// - Width: Averaged width (rectangles) or X extent
/// - Length: Averaged length (rectangles) or Z extent
/// - Area: Floor area
/// - Perimeter: Sum of wall lengths
/// - Unit: "cm" when calibrated, "units" otherwise (area is unit²)
pub fn export_rooms_csv<W: Write>(
    writer: W,
    store: &AnnotationStore,
    calibration: &Calibration,
    config: &CsvExportConfig,
) -> CsvExportResult<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(config.delimiter)
        .has_headers(config.include_headers)
        .from_writer(writer);

    if config.include_headers {
        csv_writer.write_record([
            "Image", "Image Name", "Surface", "Shape", "Vertices", "Width", "Length", "Area", "Perimeter", "Unit",
        ])?;
    }

    for set in store.sets().filter(|set| config.includes(set.image_index())) {
        let name = store.image_name(set.image_index()).unwrap_or("");
        for measurement in measure_all_surfaces(set, config.rectangle_tolerance, calibration) {
            let dims = &measurement.dimensions;
            csv_writer.write_record(&[
                measurement.image_index.to_string(),
                name.to_string(),
                measurement.surface_id.to_string(),
                dims.shape.as_str().to_string(),
                measurement.vertex_count.to_string(),
                number(dims.width),
                number(dims.length),
                number(dims.area),
                number(dims.perimeter),
                measurement.unit.clone(),
            ])?;
        }
    }

    csv_writer.flush()?;
    Ok(())
}

/// Export one row per opening
///
/// CSV columns:
/// - Image: Image index
/// - ID: Opening id within the image
/// - Type: door, window or other
/// - Name: User-facing name
/// - Material: Material property
/// - Width / Height / Area / Perimeter: Stored dimensions, converted
/// - Unit: "cm" when calibrated, "units" otherwise
/// - Notes: Free-form notes
pub fn export_openings_csv<W: Write>(
    writer: W,
    store: &AnnotationStore,
    calibration: &Calibration,
    config: &CsvExportConfig,
) -> CsvExportResult<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(config.delimiter)
        .has_headers(config.include_headers)
        .from_writer(writer);

    if config.include_headers {
        csv_writer.write_record([
            "Image", "ID", "Type", "Name", "Material", "Width", "Height", "Area", "Perimeter", "Unit", "Notes",
        ])?;
    }

    let scale = if calibration.is_calibrated() { calibration.scale() } else { 1.0 };
    for set in store.sets().filter(|set| config.includes(set.image_index())) {
        for opening in set.openings() {
            let dims = opening.dimensions.map(|d| d.scaled(scale)).unwrap_or_default();
            csv_writer.write_record(&[
                opening.image_index.to_string(),
                opening.id.to_string(),
                opening.kind.as_str().to_string(),
                opening.properties.name.clone(),
                opening.properties.material.clone(),
                number(dims.width),
                number(dims.height),
                number(dims.area),
                number(dims.perimeter),
                calibration.unit().to_string(),
                opening.properties.notes.clone(),
            ])?;
        }
    }

    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{OpeningType, DEFAULT_SURFACE_COLOR};
    use crate::geometry::Vec3;

    fn store() -> AnnotationStore {
        let mut store = AnnotationStore::new();
        store.register_image(0, "hall.jpg");
        let set = store.set_mut(0);
        let ids: Vec<_> = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(300.0, 0.0, 0.0),
            Vec3::new(300.0, 0.0, 200.0),
            Vec3::new(0.0, 0.0, 200.0),
        ]
        .into_iter()
        .map(|p| set.add_point(p))
        .collect();
        set.add_surface(ids, DEFAULT_SURFACE_COLOR).unwrap();
        let quad = [Vec3::ZERO, Vec3::new(80.0, 0.0, 0.0), Vec3::new(80.0, 200.0, 0.0), Vec3::new(0.0, 200.0, 0.0)];
        set.create_opening(OpeningType::Door, &quad).unwrap();

        store.set_mut(1).add_point(Vec3::ZERO);
        store
    }

    #[test]
    fn test_export_rooms_csv() {
        let mut output = Vec::new();
        export_rooms_csv(&mut output, &store(), &Calibration::new(), &CsvExportConfig::default()).unwrap();

        let csv_content = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = csv_content.lines().collect();
        assert_eq!(lines[0], "Image,Image Name,Surface,Shape,Vertices,Width,Length,Area,Perimeter,Unit");
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("0,hall.jpg,0,rectangle,4,"));
        assert!(lines[1].contains("60000.00"));
        assert!(lines[1].ends_with(",1000.00,units"));
    }

    #[test]
    fn test_export_openings_csv() {
        let mut output = Vec::new();
        export_openings_csv(&mut output, &store(), &Calibration::new(), &CsvExportConfig::default()).unwrap();

        let csv_content = String::from_utf8(output).unwrap();
        assert!(csv_content.contains("Image,ID,Type,Name,Material"));
        assert!(csv_content.contains("0,0,door,Door 1,wood,80.00,200.00,16000.00,560.00,units,"));
    }

    #[test]
    fn test_export_without_headers_and_filtered() {
        let config = CsvExportConfig {
            include_headers: false,
            delimiter: b';',
            image_filter: Some(vec![1]),
            ..Default::default()
        };
        let mut output = Vec::new();
        export_rooms_csv(&mut output, &store(), &Calibration::new(), &config).unwrap();
        assert!(output.is_empty());

        let config = CsvExportConfig { include_headers: false, delimiter: b';', ..Default::default() };
        let mut output = Vec::new();
        export_openings_csv(&mut output, &store(), &Calibration::new(), &config).unwrap();
        let csv_content = String::from_utf8(output).unwrap();
        assert!(csv_content.starts_with("0;0;door;Door 1;wood;"));
    }
}
