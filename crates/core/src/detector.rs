//! Candidate room detector
//!
//! Consumes polygon candidates from an external image-analysis service and
//! turns them into the regular point/surface/opening model, so detected
//! layouts flow through the same measurement and floor-plan code as manual
//! annotations.

use crate::annotation::{ImageAnnotationSet, ImageIndex, OpeningId, OpeningType, SurfaceId, DEFAULT_SURFACE_COLOR};
use crate::error::PlanResult;
use crate::geometry::{centroid_2d, point_in_polygon_2d, shoelace_area_2d, BoundingBox2D, Point2, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Classification hint supplied with a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateHint {
    Room,
    Opening,
    #[default]
    Unknown,
}

/// Closed polygon in pixel space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePolygon {
    pub points: Vec<Point2>,
    #[serde(default)]
    pub hint: CandidateHint,
}

impl CandidatePolygon {
    pub fn new(points: Vec<Point2>, hint: CandidateHint) -> Self {
        Self { points, hint }
    }

    pub fn area(&self) -> f64 {
        shoelace_area_2d(&self.points)
    }
}

/// Injected image-analysis capability
pub trait CandidateSource {
    fn detect_candidate_polygons(&self, image_index: ImageIndex) -> PlanResult<Vec<CandidatePolygon>>;
}

/// Candidates prepared ahead of time, e.g. loaded from a file
#[derive(Debug, Clone, Default)]
pub struct StaticCandidates {
    by_image: BTreeMap<ImageIndex, Vec<CandidatePolygon>>,
}

impl StaticCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candidates(mut self, image_index: ImageIndex, candidates: Vec<CandidatePolygon>) -> Self {
        self.by_image.insert(image_index, candidates);
        self
    }
}

impl CandidateSource for StaticCandidates {
    fn detect_candidate_polygons(&self, image_index: ImageIndex) -> PlanResult<Vec<CandidatePolygon>> {
        Ok(self.by_image.get(&image_index).cloned().unwrap_or_default())
    }
}

/// Thresholds for turning candidates into a layout (pixel units)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Candidates below this area are noise
    pub noise_area: f64,
    pub opening_min_area: f64,
    /// Openings may cover at most this fraction of the room area
    pub opening_max_room_fraction: f64,
    /// Width/height below this is a door
    pub door_aspect_min: f64,
    /// Width/height above this is a door
    pub door_aspect_max: f64,
    /// Inset of the frame rectangle used when no room candidate survives
    pub frame_inset: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            noise_area: 1000.0,
            opening_min_area: 200.0,
            opening_max_room_fraction: 0.35,
            door_aspect_min: 0.6,
            door_aspect_max: 1.7,
            frame_inset: 10.0,
        }
    }
}

/// Where the room outline came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomSource {
    Candidate(usize),
    FrameFallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedOpening {
    pub kind: OpeningType,
    pub points: [Point2; 4],
    pub aspect_ratio: f64,
}

/// Room outline plus the openings found inside it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedLayout {
    pub room: Vec<Point2>,
    pub room_area: f64,
    pub room_source: RoomSource,
    pub openings: Vec<DetectedOpening>,
}

/// Door when the bounding box is clearly tall or clearly wide, window
/// otherwise. A heuristic, not a measurement.
pub fn classify_opening(points: &[Point2], config: &DetectorConfig) -> (OpeningType, f64) {
    let bbox = BoundingBox2D::from_points(points).unwrap_or_default();
    let ratio = bbox.width() / bbox.height().max(1.0);
    let kind = if ratio < config.door_aspect_min || ratio > config.door_aspect_max {
        OpeningType::Door
    } else {
        OpeningType::Window
    };
    (kind, ratio)
}

/// Pick the room outline and the openings inside it.
///
/// The room is the largest candidate with at least 3 vertices and an area
/// above the noise threshold. Without one, `frame` (width, height) yields an
/// inset rectangle; without a frame there is no layout.
pub fn analyze_candidates(
    candidates: &[CandidatePolygon],
    config: &DetectorConfig,
    frame: Option<(f64, f64)>,
) -> Option<DetectedLayout> {
    let areas: Vec<f64> = candidates.iter().map(CandidatePolygon::area).collect();

    let room_index = candidates
        .iter()
        .enumerate()
        .filter(|(i, c)| c.hint != CandidateHint::Opening && c.points.len() >= 3 && areas[*i] >= config.noise_area)
        .max_by(|(i, _), (j, _)| areas[*i].total_cmp(&areas[*j]))
        .map(|(i, _)| i);

    let (room, room_area, room_source) = match (room_index, frame) {
        (Some(i), _) => (candidates[i].points.clone(), areas[i], RoomSource::Candidate(i)),
        (None, Some((width, height))) => {
            let inset = config.frame_inset;
            let room = vec![
                Point2::new(inset, inset),
                Point2::new(width - inset, inset),
                Point2::new(width - inset, height - inset),
                Point2::new(inset, height - inset),
            ];
            let area = shoelace_area_2d(&room);
            (room, area, RoomSource::FrameFallback)
        }
        (None, None) => return None,
    };

    let max_opening_area = room_area * config.opening_max_room_fraction;
    let openings = candidates
        .iter()
        .enumerate()
        .filter(|(i, c)| Some(*i) != room_index && c.hint != CandidateHint::Room)
        .filter(|(i, _)| areas[*i] >= config.opening_min_area && areas[*i] <= max_opening_area)
        .filter_map(|(_, c)| <[Point2; 4]>::try_from(c.points.as_slice()).ok())
        .filter(|points| point_in_polygon_2d(&centroid_2d(points), &room))
        .map(|points| {
            let (kind, aspect_ratio) = classify_opening(&points, config);
            DetectedOpening { kind, points, aspect_ratio }
        })
        .collect::<Vec<_>>();

    debug!(?room_source, room_area, openings = openings.len(), "candidates analyzed");
    Some(DetectedLayout { room, room_area, room_source, openings })
}

/// What an import added to the annotation set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedLayout {
    pub surface_id: SurfaceId,
    pub opening_ids: Vec<OpeningId>,
}

fn to_world(point: &Point2) -> Vec3 {
    Vec3::new(point.x, 0.0, point.y)
}

/// Add a detected layout to `set` as if drawn by hand.
///
/// Pixel `(x, y)` becomes world `(x, 0, y)`. The room becomes a closed loop
/// of connected points with one surface; openings go through the regular
/// opening path and get default names.
pub fn import_layout(set: &mut ImageAnnotationSet, layout: &DetectedLayout) -> PlanResult<ImportedLayout> {
    let ids: Vec<_> = layout.room.iter().map(|p| set.add_point(to_world(p))).collect();
    for i in 0..ids.len() {
        set.auto_connect(ids[i], ids[(i + 1) % ids.len()])?;
    }
    let surface_id = set.add_surface(ids, DEFAULT_SURFACE_COLOR)?;

    let opening_ids = layout
        .openings
        .iter()
        .map(|opening| {
            let corners: Vec<Vec3> = opening.points.iter().map(to_world).collect();
            set.create_opening(opening.kind, &corners)
        })
        .collect::<PlanResult<Vec<_>>>()?;

    info!(image = set.image_index(), surface = surface_id, openings = opening_ids.len(), "detected layout imported");
    Ok(ImportedLayout { surface_id, opening_ids })
}

/// Ask `source` for candidates and import the resulting layout, if any
pub fn detect_and_import(
    source: &dyn CandidateSource,
    set: &mut ImageAnnotationSet,
    config: &DetectorConfig,
    frame: Option<(f64, f64)>,
) -> PlanResult<Option<ImportedLayout>> {
    let candidates = source.detect_candidate_polygons(set.image_index())?;
    match analyze_candidates(&candidates, config, frame) {
        Some(layout) => import_layout(set, &layout).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Calibration;
    use crate::floor_plan::{project_floor_plan, FloorPlanOptions, FloorPlanOutcome};

    fn rect(x: f64, y: f64, w: f64, h: f64, hint: CandidateHint) -> CandidatePolygon {
        CandidatePolygon::new(
            vec![Point2::new(x, y), Point2::new(x + w, y), Point2::new(x + w, y + h), Point2::new(x, y + h)],
            hint,
        )
    }

    #[test]
    fn test_largest_candidate_becomes_room() {
        let candidates = vec![
            rect(0.0, 0.0, 50.0, 50.0, CandidateHint::Unknown),
            rect(0.0, 0.0, 600.0, 400.0, CandidateHint::Unknown),
            rect(0.0, 0.0, 20.0, 20.0, CandidateHint::Unknown),
        ];
        let layout = analyze_candidates(&candidates, &DetectorConfig::default(), None).unwrap();
        assert_eq!(layout.room_source, RoomSource::Candidate(1));
        assert_eq!(layout.room_area, 240000.0);
    }

    #[test]
    fn test_noise_only_falls_back_to_frame() {
        let candidates = vec![rect(0.0, 0.0, 20.0, 20.0, CandidateHint::Unknown)];
        let config = DetectorConfig::default();
        assert!(analyze_candidates(&candidates, &config, None).is_none());

        let layout = analyze_candidates(&candidates, &config, Some((640.0, 480.0))).unwrap();
        assert_eq!(layout.room_source, RoomSource::FrameFallback);
        assert_eq!(layout.room[2], Point2::new(630.0, 470.0));
        assert_eq!(layout.room_area, 620.0 * 460.0);
    }

    #[test]
    fn test_openings_filtered_and_classified() {
        let candidates = vec![
            rect(0.0, 0.0, 1000.0, 800.0, CandidateHint::Room),
            // tall: door
            rect(100.0, 100.0, 40.0, 100.0, CandidateHint::Unknown),
            // square-ish: window
            rect(300.0, 100.0, 60.0, 50.0, CandidateHint::Unknown),
            // too small
            rect(500.0, 100.0, 10.0, 10.0, CandidateHint::Unknown),
            // outside the room
            rect(2000.0, 100.0, 40.0, 40.0, CandidateHint::Unknown),
            // not four vertices
            CandidatePolygon::new(
                vec![Point2::new(600.0, 600.0), Point2::new(700.0, 600.0), Point2::new(650.0, 700.0)],
                CandidateHint::Unknown,
            ),
            // more than 35% of the room
            rect(10.0, 10.0, 900.0, 700.0, CandidateHint::Unknown),
        ];
        let layout = analyze_candidates(&candidates, &DetectorConfig::default(), None).unwrap();
        let kinds: Vec<_> = layout.openings.iter().map(|o| o.kind).collect();
        assert_eq!(kinds, vec![OpeningType::Door, OpeningType::Window]);
        assert!((layout.openings[0].aspect_ratio - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_hinted_opening_never_becomes_room() {
        let candidates = vec![
            rect(0.0, 0.0, 900.0, 900.0, CandidateHint::Opening),
            rect(0.0, 0.0, 100.0, 100.0, CandidateHint::Room),
        ];
        let layout = analyze_candidates(&candidates, &DetectorConfig::default(), None).unwrap();
        assert_eq!(layout.room_source, RoomSource::Candidate(1));
    }

    #[test]
    fn test_wide_candidate_is_door() {
        let points = [Point2::new(0.0, 0.0), Point2::new(200.0, 0.0), Point2::new(200.0, 50.0), Point2::new(0.0, 50.0)];
        assert_eq!(classify_opening(&points, &DetectorConfig::default()).0, OpeningType::Door);
    }

    #[test]
    fn test_import_feeds_floor_plan() {
        let source = StaticCandidates::new().with_candidates(
            4,
            vec![rect(0.0, 0.0, 400.0, 300.0, CandidateHint::Room), rect(100.0, 100.0, 60.0, 50.0, CandidateHint::Opening)],
        );
        let mut set = ImageAnnotationSet::new(4);
        let imported = detect_and_import(&source, &mut set, &DetectorConfig::default(), None).unwrap().unwrap();

        assert_eq!(set.points().len(), 4);
        assert_eq!(set.lines().len(), 4);
        assert_eq!(set.surface(imported.surface_id).unwrap().point_ids.len(), 4);
        assert_eq!(imported.opening_ids.len(), 1);
        assert_eq!(set.points()[2].position, Vec3::new(400.0, 0.0, 300.0));
        assert_eq!(set.opening(imported.opening_ids[0]).unwrap().properties.name, "Window 1");

        let outcome = project_floor_plan(&set, &Calibration::new(), &FloorPlanOptions::default());
        assert!(matches!(outcome, FloorPlanOutcome::Drawn(_)));
    }

    #[test]
    fn test_no_candidates_imports_nothing() {
        let mut set = ImageAnnotationSet::new(0);
        let result = detect_and_import(&StaticCandidates::new(), &mut set, &DetectorConfig::default(), None).unwrap();
        assert!(result.is_none());
        assert!(set.is_empty());
    }
}
