//! Annotation data model and per-image store
//!
//! Points are the only mutable geometry. Lines and surfaces reference points
//! by id and always resolve to the current positions; openings keep value
//! snapshots of their four corners.

use crate::error::{PlanError, PlanResult};
use crate::geometry::Vec3;
use crate::opening::{opening_dimensions, OpeningDimensions};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

pub type ImageIndex = u32;
pub type PointId = u32;
pub type LineId = u32;
pub type SurfaceId = u32;
pub type OpeningId = u32;

/// Fill color for surfaces drawn by the user
pub const DEFAULT_SURFACE_COLOR: u32 = 0x00FF00;

/// Fill color for surfaces copied onto the floor
pub const FLOOR_SURFACE_COLOR: u32 = 0x0088FF;

fn is_false(value: &bool) -> bool {
    !*value
}

/// A marked position on one panorama
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    pub id: PointId,
    pub position: Vec3,
    #[serde(default)]
    pub connections: BTreeSet<PointId>,
    pub image_index: ImageIndex,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_calibration_marker: bool,
}

/// Segment between two points of the same image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub id: LineId,
    pub point_id1: PointId,
    pub point_id2: PointId,
    pub image_index: ImageIndex,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_calibration_line: bool,
}

impl Line {
    pub fn references(&self, point_id: PointId) -> bool {
        self.point_id1 == point_id || self.point_id2 == point_id
    }
}

/// Closed polygon over point ids in loop order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Surface {
    pub id: SurfaceId,
    pub point_ids: Vec<PointId>,
    pub color: u32,
    pub image_index: ImageIndex,
}

/// Kind of wall penetration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpeningType {
    Door,
    Window,
    Other,
}

impl OpeningType {
    pub fn label(&self) -> &'static str {
        match self {
            OpeningType::Door => "Door",
            OpeningType::Window => "Window",
            OpeningType::Other => "Opening",
        }
    }

    pub fn default_material(&self) -> &'static str {
        match self {
            OpeningType::Door => "wood",
            OpeningType::Window => "PVC",
            OpeningType::Other => "other",
        }
    }

    /// Display color as 0xRRGGBB
    pub fn color(&self) -> u32 {
        match self {
            OpeningType::Door => 0x8B4513,
            OpeningType::Window => 0x4169E1,
            OpeningType::Other => 0xFFD700,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OpeningType::Door => "door",
            OpeningType::Window => "window",
            OpeningType::Other => "other",
        }
    }
}

impl std::str::FromStr for OpeningType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "door" => Ok(OpeningType::Door),
            "window" => Ok(OpeningType::Window),
            "other" | "opening" => Ok(OpeningType::Other),
            other => Err(format!("unknown opening type: {other}")),
        }
    }
}

/// User-editable opening details
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpeningProperties {
    pub name: String,
    pub material: String,
    #[serde(default)]
    pub notes: String,
}

/// Door, window or other opening captured as four corner snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opening {
    pub id: OpeningId,
    #[serde(rename = "type")]
    pub kind: OpeningType,
    pub points: [Vec3; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<OpeningDimensions>,
    pub properties: OpeningProperties,
    pub image_index: ImageIndex,
}

/// Per-image entity counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStatistics {
    pub point_count: usize,
    pub line_count: usize,
    pub surface_count: usize,
    pub opening_count: usize,
}

/// Per-image opening summary
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpeningStatistics {
    pub total: usize,
    pub doors: usize,
    pub windows: usize,
    pub others: usize,
    pub total_area: f64,
}

/// Result of a bulk clear
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Cleared(usize),
    NothingToClear,
}

impl ClearOutcome {
    fn from_count(count: usize) -> Self {
        if count == 0 {
            ClearOutcome::NothingToClear
        } else {
            ClearOutcome::Cleared(count)
        }
    }
}

/// Result of placing a drawing point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// A new point, connected to the previous drawing point if there was one
    Added { point_id: PointId, line_id: Option<LineId> },
    /// The click landed near the first point; the loop was closed instead
    LoopClosed { line_id: LineId, surface_id: SurfaceId },
}

/// What a cascading point removal touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CascadeReport {
    pub lines_removed: usize,
    pub surfaces_shrunk: usize,
    pub surfaces_removed: usize,
}

/// All annotations of one image
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageAnnotationSet {
    image_index: ImageIndex,
    points: Vec<Point>,
    lines: Vec<Line>,
    surfaces: Vec<Surface>,
    openings: Vec<Opening>,
    next_point_id: PointId,
    next_line_id: LineId,
    next_surface_id: SurfaceId,
    next_opening_id: OpeningId,
}

impl ImageAnnotationSet {
    pub fn new(image_index: ImageIndex) -> Self {
        Self { image_index, ..Default::default() }
    }

    /// Rebuild a set from persisted collections.
    ///
    /// Id counters resume after the highest stored id and dangling
    /// references are pruned.
    pub fn from_parts(
        image_index: ImageIndex,
        points: Vec<Point>,
        lines: Vec<Line>,
        surfaces: Vec<Surface>,
        openings: Vec<Opening>,
    ) -> Self {
        fn next_id(ids: impl Iterator<Item = u32>) -> u32 {
            ids.max().map_or(0, |max| max + 1)
        }

        let mut set = Self {
            image_index,
            next_point_id: next_id(points.iter().map(|p| p.id)),
            next_line_id: next_id(lines.iter().map(|l| l.id)),
            next_surface_id: next_id(surfaces.iter().map(|s| s.id)),
            next_opening_id: next_id(openings.iter().map(|o| o.id)),
            points,
            lines,
            surfaces,
            openings,
        };
        for point in &mut set.points {
            point.image_index = image_index;
        }
        set.prune_dangling();
        set
    }

    pub fn image_index(&self) -> ImageIndex {
        self.image_index
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    pub fn openings(&self) -> &[Opening] {
        &self.openings
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
            && self.lines.is_empty()
            && self.surfaces.is_empty()
            && self.openings.is_empty()
    }

    pub fn point(&self, id: PointId) -> Option<&Point> {
        self.points.iter().find(|p| p.id == id)
    }

    pub fn surface(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.iter().find(|s| s.id == id)
    }

    pub fn opening(&self, id: OpeningId) -> Option<&Opening> {
        self.openings.iter().find(|o| o.id == id)
    }

    /// Points that take part in drawing (calibration markers excluded)
    pub fn drawing_points(&self) -> impl Iterator<Item = &Point> {
        self.points.iter().filter(|p| !p.is_calibration_marker)
    }

    pub fn calibration_markers(&self) -> impl Iterator<Item = &Point> {
        self.points.iter().filter(|p| p.is_calibration_marker)
    }

    pub fn add_point(&mut self, position: Vec3) -> PointId {
        self.push_point(position, false)
    }

    pub(crate) fn add_calibration_marker(&mut self, position: Vec3) -> PointId {
        self.push_point(position, true)
    }

    fn push_point(&mut self, position: Vec3, is_calibration_marker: bool) -> PointId {
        let id = self.next_point_id;
        self.next_point_id += 1;
        self.points.push(Point {
            id,
            position,
            connections: BTreeSet::new(),
            image_index: self.image_index,
            is_calibration_marker,
        });
        debug!(image = self.image_index, point = id, is_calibration_marker, "point added");
        id
    }

    /// Join two points with a line and record the connection on both
    pub fn auto_connect(&mut self, from: PointId, to: PointId) -> PlanResult<LineId> {
        self.push_line(from, to, false)
    }

    pub(crate) fn add_calibration_line(&mut self, from: PointId, to: PointId) -> PlanResult<LineId> {
        self.push_line(from, to, true)
    }

    fn push_line(&mut self, from: PointId, to: PointId, is_calibration_line: bool) -> PlanResult<LineId> {
        for id in [from, to] {
            if self.point(id).is_none() {
                return Err(PlanError::PointNotFound(id));
            }
        }

        let id = self.next_line_id;
        self.next_line_id += 1;
        self.lines.push(Line {
            id,
            point_id1: from,
            point_id2: to,
            image_index: self.image_index,
            is_calibration_line,
        });

        for point in &mut self.points {
            if point.id == from {
                point.connections.insert(to);
            } else if point.id == to {
                point.connections.insert(from);
            }
        }
        Ok(id)
    }

    /// Close the drawing loop when `candidate` lands within `threshold` of
    /// the first drawing point.
    ///
    /// Needs at least 3 drawing points. On closure no point is added; the
    /// last point is joined to the first and a surface is built from all
    /// drawing points.
    pub fn close_loop_if_near(
        &mut self,
        candidate: Vec3,
        threshold: f64,
    ) -> PlanResult<Option<(LineId, SurfaceId)>> {
        let (first, last, count) = {
            let mut drawing = self.drawing_points();
            let Some(first) = drawing.next() else {
                return Ok(None);
            };
            let rest: Vec<&Point> = drawing.collect();
            let last = rest.last().map_or(first, |p| *p);
            (first.clone(), last.id, rest.len() + 1)
        };

        if count < 3 || candidate.distance_to(&first.position) >= threshold {
            return Ok(None);
        }

        let line_id = self.auto_connect(last, first.id)?;
        let surface_id = self.build_surface_from_all_points()?;
        debug!(image = self.image_index, surface = surface_id, "drawing loop closed");
        Ok(Some((line_id, surface_id)))
    }

    /// Point-mode click: close the loop if near the start, else add and
    /// connect to the previous drawing point
    pub fn place_point(&mut self, position: Vec3, loop_close_threshold: f64) -> PlanResult<Placement> {
        if let Some((line_id, surface_id)) = self.close_loop_if_near(position, loop_close_threshold)? {
            return Ok(Placement::LoopClosed { line_id, surface_id });
        }

        let previous = self.drawing_points().last().map(|p| p.id);
        let point_id = self.add_point(position);
        let line_id = match previous {
            Some(prev) => Some(self.auto_connect(prev, point_id)?),
            None => None,
        };
        Ok(Placement::Added { point_id, line_id })
    }

    /// Surface over every drawing point in insertion order
    pub fn build_surface_from_all_points(&mut self) -> PlanResult<SurfaceId> {
        let point_ids: Vec<PointId> = self.drawing_points().map(|p| p.id).collect();
        self.add_surface(point_ids, DEFAULT_SURFACE_COLOR)
    }

    pub fn add_surface(&mut self, point_ids: Vec<PointId>, color: u32) -> PlanResult<SurfaceId> {
        if point_ids.len() < 3 {
            return Err(PlanError::InsufficientPoints { required: 3, found: point_ids.len() });
        }
        if let Some(missing) = point_ids.iter().find(|id| self.point(**id).is_none()) {
            return Err(PlanError::PointNotFound(*missing));
        }

        let id = self.next_surface_id;
        self.next_surface_id += 1;
        self.surfaces.push(Surface { id, point_ids, color, image_index: self.image_index });
        Ok(id)
    }

    /// Remove a point and everything that depends on it.
    ///
    /// Lines touching the point are removed. Surfaces lose the vertex and
    /// are deleted when fewer than 3 vertices remain.
    pub fn remove_point_cascade(&mut self, point_id: PointId) -> PlanResult<CascadeReport> {
        let index = self
            .points
            .iter()
            .position(|p| p.id == point_id)
            .ok_or(PlanError::PointNotFound(point_id))?;
        self.points.remove(index);

        let mut report = CascadeReport::default();

        let before = self.lines.len();
        self.lines.retain(|line| !line.references(point_id));
        report.lines_removed = before - self.lines.len();

        for point in &mut self.points {
            point.connections.remove(&point_id);
        }

        self.surfaces.retain_mut(|surface| {
            if !surface.point_ids.contains(&point_id) {
                return true;
            }
            surface.point_ids.retain(|id| *id != point_id);
            if surface.point_ids.len() < 3 {
                report.surfaces_removed += 1;
                false
            } else {
                report.surfaces_shrunk += 1;
                true
            }
        });

        debug!(image = self.image_index, point = point_id, ?report, "point removed");
        Ok(report)
    }

    /// Drag a point; referencing lines and surfaces follow automatically
    pub fn move_point(&mut self, point_id: PointId, position: Vec3) -> PlanResult<()> {
        let point = self
            .points
            .iter_mut()
            .find(|p| p.id == point_id)
            .ok_or(PlanError::PointNotFound(point_id))?;
        point.position = position;
        Ok(())
    }

    /// Remove every point, line, surface and opening, and restart ids
    pub fn clear_all(&mut self) -> ClearOutcome {
        let count = self.points.len() + self.lines.len() + self.surfaces.len() + self.openings.len();
        *self = ImageAnnotationSet::new(self.image_index);
        ClearOutcome::from_count(count)
    }

    pub fn clear_lines(&mut self) -> ClearOutcome {
        let count = self.lines.len();
        self.lines.clear();
        for point in &mut self.points {
            point.connections.clear();
        }
        ClearOutcome::from_count(count)
    }

    pub fn clear_openings(&mut self) -> ClearOutcome {
        let count = self.openings.len();
        self.openings.clear();
        ClearOutcome::from_count(count)
    }

    /// Drop calibration markers and calibration lines
    pub(crate) fn remove_calibration_entities(&mut self) -> usize {
        let markers: Vec<PointId> = self.calibration_markers().map(|p| p.id).collect();
        let before = self.points.len() + self.lines.len();
        self.lines.retain(|line| !line.is_calibration_line);
        self.points.retain(|p| !p.is_calibration_marker);
        for point in &mut self.points {
            for id in &markers {
                point.connections.remove(id);
            }
        }
        before - self.points.len() - self.lines.len()
    }

    /// Current endpoint positions, or `None` (logged) if a point is gone
    pub fn line_endpoints(&self, line: &Line) -> Option<(Vec3, Vec3)> {
        match (self.point(line.point_id1), self.point(line.point_id2)) {
            (Some(a), Some(b)) => Some((a.position, b.position)),
            _ => {
                let missing = if self.point(line.point_id1).is_none() {
                    line.point_id1
                } else {
                    line.point_id2
                };
                let error = PlanError::MissingReference { entity: "line", id: line.id, point_id: missing };
                warn!(image = self.image_index, %error, "skipping line");
                None
            }
        }
    }

    /// Current vertex positions in loop order, or `None` (logged) if any
    /// referenced point is gone
    pub fn surface_positions(&self, surface: &Surface) -> Option<Vec<Vec3>> {
        let mut positions = Vec::with_capacity(surface.point_ids.len());
        for id in &surface.point_ids {
            match self.point(*id) {
                Some(point) => positions.push(point.position),
                None => {
                    let error =
                        PlanError::MissingReference { entity: "surface", id: surface.id, point_id: *id };
                    warn!(image = self.image_index, %error, "skipping surface");
                    return None;
                }
            }
        }
        Some(positions)
    }

    /// Remove references to points that no longer exist.
    ///
    /// Lines with a missing endpoint are dropped; surfaces lose the missing
    /// vertices and are dropped below 3. Returns the number of entities
    /// removed or repaired.
    pub fn prune_dangling(&mut self) -> usize {
        let known: BTreeSet<PointId> = self.points.iter().map(|p| p.id).collect();
        let image = self.image_index;
        let mut pruned = 0;

        self.lines.retain(|line| {
            let keep = known.contains(&line.point_id1) && known.contains(&line.point_id2);
            if !keep {
                warn!(image, line = line.id, "pruning line with missing endpoint");
                pruned += 1;
            }
            keep
        });

        self.surfaces.retain_mut(|surface| {
            let before = surface.point_ids.len();
            surface.point_ids.retain(|id| known.contains(id));
            if surface.point_ids.len() == before {
                return true;
            }
            pruned += 1;
            warn!(image, surface = surface.id, missing = before - surface.point_ids.len(), "pruning surface vertices");
            surface.point_ids.len() >= 3
        });

        for point in &mut self.points {
            point.connections.retain(|id| known.contains(id));
        }
        pruned
    }

    /// Commit an opening from exactly four corner snapshots
    pub fn create_opening(&mut self, kind: OpeningType, corners: &[Vec3]) -> PlanResult<OpeningId> {
        let corners: [Vec3; 4] =
            corners.try_into().map_err(|_| PlanError::OpeningPointCount(corners.len()))?;

        let existing = self.openings.iter().filter(|o| o.kind == kind).count();
        let properties = OpeningProperties {
            name: format!("{} {}", kind.label(), existing + 1),
            material: kind.default_material().to_string(),
            notes: String::new(),
        };

        let id = self.next_opening_id;
        self.next_opening_id += 1;
        self.openings.push(Opening {
            id,
            kind,
            points: corners,
            dimensions: Some(opening_dimensions(&corners)),
            properties,
            image_index: self.image_index,
        });
        debug!(image = self.image_index, opening = id, kind = kind.as_str(), "opening created");
        Ok(id)
    }

    pub fn remove_opening(&mut self, id: OpeningId) -> PlanResult<Opening> {
        let index =
            self.openings.iter().position(|o| o.id == id).ok_or(PlanError::OpeningNotFound(id))?;
        Ok(self.openings.remove(index))
    }

    pub fn update_opening_properties(
        &mut self,
        id: OpeningId,
        properties: OpeningProperties,
    ) -> PlanResult<()> {
        let opening =
            self.openings.iter_mut().find(|o| o.id == id).ok_or(PlanError::OpeningNotFound(id))?;
        opening.properties = properties;
        Ok(())
    }

    pub fn statistics(&self) -> ImageStatistics {
        ImageStatistics {
            point_count: self.points.len(),
            line_count: self.lines.len(),
            surface_count: self.surfaces.len(),
            opening_count: self.openings.len(),
        }
    }

    pub fn opening_statistics(&self) -> OpeningStatistics {
        let mut stats = OpeningStatistics { total: self.openings.len(), ..Default::default() };
        for opening in &self.openings {
            match opening.kind {
                OpeningType::Door => stats.doors += 1,
                OpeningType::Window => stats.windows += 1,
                OpeningType::Other => stats.others += 1,
            }
            stats.total_area += opening.dimensions.map_or(0.0, |d| d.area);
        }
        stats
    }

    /// Mirror a surface onto the lower half of the panorama sphere.
    ///
    /// Every vertex keeps its X/Z and gets the Y that puts it on a sphere of
    /// `sphere_radius` (horizontal distance capped at 90% of the radius).
    /// The copies form a closed loop, each copy is tied to its source by a
    /// vertical line, and a new surface is built over the copies.
    pub fn copy_surface_to_floor(
        &mut self,
        surface_id: SurfaceId,
        sphere_radius: f64,
    ) -> PlanResult<SurfaceId> {
        let surface = self.surface(surface_id).ok_or(PlanError::SurfaceNotFound(surface_id))?;
        let sources = surface
            .point_ids
            .iter()
            .map(|id| {
                self.point(*id).map(|p| (p.id, p.position)).ok_or(PlanError::MissingReference {
                    entity: "surface",
                    id: surface_id,
                    point_id: *id,
                })
            })
            .collect::<PlanResult<Vec<(PointId, Vec3)>>>()?;
        if sources.len() < 3 {
            return Err(PlanError::InsufficientPoints { required: 3, found: sources.len() });
        }

        let copies: Vec<PointId> = sources
            .iter()
            .map(|(_, source)| {
                let horizontal = (source.x * source.x + source.z * source.z).sqrt();
                let capped = horizontal.min(sphere_radius * 0.9);
                let y = -(sphere_radius * sphere_radius - capped * capped).sqrt();
                self.add_point(Vec3::new(source.x, y, source.z).with_length(sphere_radius))
            })
            .collect();

        for i in 0..copies.len() {
            self.auto_connect(copies[i], copies[(i + 1) % copies.len()])?;
        }
        for ((source, _), copy) in sources.iter().zip(&copies) {
            self.auto_connect(*source, *copy)?;
        }

        self.add_surface(copies, FLOOR_SURFACE_COLOR)
    }
}

/// Panorama identity as listed in exports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub id: ImageIndex,
    pub name: String,
}

/// Annotation sets for every panorama of a session
#[derive(Debug, Clone, Default)]
pub struct AnnotationStore {
    images: Vec<ImageInfo>,
    sets: BTreeMap<ImageIndex, ImageAnnotationSet>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or rename) a panorama
    pub fn register_image(&mut self, id: ImageIndex, name: impl Into<String>) {
        let name = name.into();
        match self.images.iter_mut().find(|img| img.id == id) {
            Some(existing) => existing.name = name,
            None => self.images.push(ImageInfo { id, name }),
        }
    }

    pub fn images(&self) -> &[ImageInfo] {
        &self.images
    }

    pub fn image_name(&self, index: ImageIndex) -> Option<&str> {
        self.images.iter().find(|img| img.id == index).map(|img| img.name.as_str())
    }

    pub fn set(&self, index: ImageIndex) -> Option<&ImageAnnotationSet> {
        self.sets.get(&index)
    }

    /// The set for `index`, created on first access
    pub fn set_mut(&mut self, index: ImageIndex) -> &mut ImageAnnotationSet {
        self.sets.entry(index).or_insert_with(|| ImageAnnotationSet::new(index))
    }

    pub fn insert_set(&mut self, set: ImageAnnotationSet) {
        self.sets.insert(set.image_index(), set);
    }

    pub fn sets(&self) -> impl Iterator<Item = &ImageAnnotationSet> {
        self.sets.values()
    }

    /// True when no image holds any annotation
    pub fn is_empty(&self) -> bool {
        self.sets.values().all(ImageAnnotationSet::is_empty)
    }
}
