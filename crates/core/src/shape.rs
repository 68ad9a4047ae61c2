//! Room shape classification and dimensions
//!
//! Every computation first orders the loop by angle around its centroid on
//! the floor plane. Rectangles average opposite walls; everything else uses
//! the shoelace area, the edge sum and the bounding-box extents.

use crate::annotation::{ImageAnnotationSet, ImageIndex, SurfaceId};
use crate::calibration::Calibration;
use crate::error::{PlanError, PlanResult};
use crate::geometry::{bounding_box_2d, edge_lengths, shoelace_area_xz, sort_by_angle_around_centroid, Axis, Vec3};
use serde::{Deserialize, Serialize};

/// Shape of a closed point loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    /// Fewer than 3 points
    Degenerate,
    Triangle,
    Rectangle,
    Quadrilateral,
    Polygon,
}

impl ShapeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeKind::Degenerate => "degenerate",
            ShapeKind::Triangle => "triangle",
            ShapeKind::Rectangle => "rectangle",
            ShapeKind::Quadrilateral => "quadrilateral",
            ShapeKind::Polygon => "polygon",
        }
    }
}

/// Measured room outline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDimensions {
    pub shape: ShapeKind,
    pub width: f64,
    pub length: f64,
    pub area: f64,
    pub perimeter: f64,
    /// Edge lengths of the angle-ordered loop
    pub side_lengths: Vec<f64>,
}

impl RoomDimensions {
    fn zero() -> Self {
        Self {
            shape: ShapeKind::Degenerate,
            width: 0.0,
            length: 0.0,
            area: 0.0,
            perimeter: 0.0,
            side_lengths: Vec::new(),
        }
    }

    /// Lengths scaled by the calibration, area by its square
    pub fn to_physical(&self, calibration: &Calibration) -> Self {
        Self {
            shape: self.shape,
            width: calibration.to_physical_units(self.width),
            length: calibration.to_physical_units(self.length),
            area: calibration.to_physical_area(self.area),
            perimeter: calibration.to_physical_units(self.perimeter),
            side_lengths: self.side_lengths.iter().map(|s| calibration.to_physical_units(*s)).collect(),
        }
    }
}

/// Classify an ordered loop by vertex count and, for four vertices, by
/// opposite-edge agreement
pub fn classify(ordered: &[Vec3], tolerance: f64) -> ShapeKind {
    match ordered {
        [] | [_] | [_, _] => ShapeKind::Degenerate,
        [_, _, _] => ShapeKind::Triangle,
        [a, b, c, d] => {
            if is_approx_rectangle(&[*a, *b, *c, *d], tolerance) {
                ShapeKind::Rectangle
            } else {
                ShapeKind::Quadrilateral
            }
        }
        _ => ShapeKind::Polygon,
    }
}

fn relative_difference(a: f64, b: f64) -> f64 {
    (a - b).abs() / a.max(b)
}

/// True when both pairs of opposite edges differ by less than `tolerance`
/// relative to the longer edge. Expects clockwise-ordered corners.
pub fn is_approx_rectangle(corners: &[Vec3; 4], tolerance: f64) -> bool {
    let edges = edge_lengths(corners);
    if edges.iter().any(|e| *e <= 0.0) {
        return false;
    }
    relative_difference(edges[0], edges[2]) < tolerance && relative_difference(edges[1], edges[3]) < tolerance
}

/// Dimensions of a near-rectangle, averaging opposite walls
pub fn rectangle_dimensions(corners: &[Vec3; 4]) -> RoomDimensions {
    let side_lengths = edge_lengths(corners);
    let width = (side_lengths[0] + side_lengths[2]) / 2.0;
    let length = (side_lengths[1] + side_lengths[3]) / 2.0;
    RoomDimensions {
        shape: ShapeKind::Rectangle,
        width,
        length,
        area: width * length,
        perimeter: 2.0 * (width + length),
        side_lengths,
    }
}

/// Dimensions of an arbitrary ordered loop: shoelace area on the floor
/// plane, edge-sum perimeter and bounding-box width (X) and length (Z)
pub fn irregular_dimensions(ordered: &[Vec3]) -> RoomDimensions {
    if ordered.len() < 3 {
        return RoomDimensions::zero();
    }
    let side_lengths = edge_lengths(ordered);
    let bbox = bounding_box_2d(ordered, Axis::X, Axis::Z);
    RoomDimensions {
        shape: match ordered.len() {
            3 => ShapeKind::Triangle,
            4 => ShapeKind::Quadrilateral,
            _ => ShapeKind::Polygon,
        },
        width: bbox.width(),
        length: bbox.height(),
        area: shoelace_area_xz(ordered),
        perimeter: side_lengths.iter().sum(),
        side_lengths,
    }
}

/// Order, classify and measure a point loop. Never fails; fewer than 3
/// points yield all-zero dimensions.
pub fn analyze(points: &[Vec3], tolerance: f64) -> RoomDimensions {
    if points.len() < 3 {
        return RoomDimensions::zero();
    }
    let ordered = sort_by_angle_around_centroid(points, Axis::X, Axis::Z);
    match classify(&ordered, tolerance) {
        ShapeKind::Rectangle => match <&[Vec3; 4]>::try_from(ordered.as_slice()) {
            Ok(corners) => rectangle_dimensions(corners),
            Err(_) => irregular_dimensions(&ordered),
        },
        _ => irregular_dimensions(&ordered),
    }
}

/// Measurement of one stored surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMeasurement {
    pub image_index: ImageIndex,
    pub surface_id: SurfaceId,
    pub vertex_count: usize,
    pub unit: String,
    pub dimensions: RoomDimensions,
}

/// Measure a surface from the live positions of its points, converted
/// through `calibration`
pub fn measure_surface(
    set: &ImageAnnotationSet,
    surface_id: SurfaceId,
    tolerance: f64,
    calibration: &Calibration,
) -> PlanResult<RoomMeasurement> {
    let surface = set.surface(surface_id).ok_or(PlanError::SurfaceNotFound(surface_id))?;
    if let Some(missing) = surface.point_ids.iter().find(|id| set.point(**id).is_none()) {
        return Err(PlanError::MissingReference { entity: "surface", id: surface_id, point_id: *missing });
    }
    let positions: Vec<Vec3> =
        surface.point_ids.iter().filter_map(|id| set.point(*id)).map(|p| p.position).collect();
    if positions.len() < 3 {
        return Err(PlanError::InsufficientPoints { required: 3, found: positions.len() });
    }

    Ok(RoomMeasurement {
        image_index: set.image_index(),
        surface_id,
        vertex_count: positions.len(),
        unit: calibration.unit().to_string(),
        dimensions: analyze(&positions, tolerance).to_physical(calibration),
    })
}

/// Measurements for every surface of an image, skipping unmeasurable ones
pub fn measure_all_surfaces(
    set: &ImageAnnotationSet,
    tolerance: f64,
    calibration: &Calibration,
) -> Vec<RoomMeasurement> {
    set.surfaces()
        .iter()
        .filter_map(|surface| match measure_surface(set, surface.id, tolerance, calibration) {
            Ok(measurement) => Some(measurement),
            Err(error) => {
                tracing::warn!(image = set.image_index(), surface = surface.id, %error, "surface not measured");
                None
            }
        })
        .collect()
}
