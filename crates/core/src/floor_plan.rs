//! Top-down floor-plan projection
//!
//! Surfaces and openings of one image are dropped onto the XZ plane, fitted
//! into a canvas with a uniform scale, and emitted as a vector scene of
//! outlines, filled openings and text labels. Rasterization is left to the
//! caller; [`FloorPlanScene::to_svg`] covers the vector export.

use crate::annotation::{ImageAnnotationSet, OpeningId, OpeningType, SurfaceId};
use crate::calibration::Calibration;
use crate::geometry::{bounding_box_2d, edge_midpoints, Axis, BoundingBox2D, Point2, Vec3};
use serde::{Deserialize, Serialize};

/// Canvas layout for the floor plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloorPlanOptions {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Default for FloorPlanOptions {
    fn default() -> Self {
        Self { width: 800, height: 800, margin: 50, title: None }
    }
}

impl FloorPlanOptions {
    /// Sets the title from an image file name, without its extension
    pub fn with_title_from_image_name(mut self, name: &str) -> Self {
        let title = match name.rfind('.') {
            Some(dot) if dot > 0 => &name[..dot],
            _ => name,
        };
        self.title = Some(title.to_string());
        self
    }
}

/// 8-bit color with fractional alpha
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    pub const DIMENSION_RED: Rgba = Rgba::rgb(0xD3, 0x2F, 0x2F);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: f64) -> Self {
        Self { r, g, b, a }
    }

    /// Semi-transparent fill for an opening kind
    pub fn opening_fill(kind: OpeningType) -> Self {
        match kind {
            OpeningType::Window => Rgba::rgba(0, 128, 255, 0.5),
            OpeningType::Door => Rgba::rgba(139, 69, 19, 0.5),
            OpeningType::Other => Rgba::rgba(255, 215, 0, 0.5),
        }
    }
}

/// What a label annotates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelRole {
    Title,
    EdgeLength,
    OpeningName,
    OpeningSize,
}

/// Drawable element in canvas pixel space (origin top-left)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanElement {
    /// Closed wall outline of a surface
    Outline { surface_id: SurfaceId, points: Vec<[f64; 2]>, stroke: Rgba, stroke_width: f64 },
    /// Filled opening polygon
    FilledPolygon { opening_id: OpeningId, opening_type: OpeningType, points: Vec<[f64; 2]>, fill: Rgba },
    /// Centered text
    Label { text: String, anchor: [f64; 2], role: LabelRole, color: Rgba, font_size: f64 },
}

/// Vector drawing of one floor plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorPlanScene {
    pub width: u32,
    pub height: u32,
    pub background: Rgba,
    pub pixels_per_unit: f64,
    pub elements: Vec<PlanElement>,
}

/// Result of a projection request
#[derive(Debug, Clone, PartialEq)]
pub enum FloorPlanOutcome {
    Drawn(FloorPlanScene),
    /// Not an error: there is simply nothing to put on the canvas
    NothingToDraw(String),
}

/// Fit-to-bounds mapping from the floor plane to canvas pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    min: Point2,
    pixels_per_unit: f64,
    margin: f64,
    canvas_height: f64,
}

impl Projection {
    /// Uniform scale so the longer horizontal extent fills the canvas
    /// inside the margin. Zero extents count as 1.
    pub fn fit(bounds: &BoundingBox2D, options: &FloorPlanOptions) -> Self {
        let range_x = if bounds.width() == 0.0 { 1.0 } else { bounds.width() };
        let range_z = if bounds.height() == 0.0 { 1.0 } else { bounds.height() };
        let canvas = f64::from(options.width.min(options.height));
        let margin = f64::from(options.margin);
        Self {
            min: bounds.min,
            pixels_per_unit: (canvas - 2.0 * margin) / range_x.max(range_z),
            margin,
            canvas_height: f64::from(options.height),
        }
    }

    pub fn pixels_per_unit(&self) -> f64 {
        self.pixels_per_unit
    }

    /// Canvas position; Z grows upwards on the plan
    pub fn project(&self, position: &Vec3) -> [f64; 2] {
        let px = (position.x - self.min.x) * self.pixels_per_unit + self.margin;
        let py = self.canvas_height - ((position.z - self.min.y) * self.pixels_per_unit + self.margin);
        [px, py]
    }
}

fn length_label(calibration: &Calibration, raw: f64) -> String {
    if calibration.is_calibrated() {
        calibration.format_distance(raw)
    } else {
        format!("{raw:.1} u")
    }
}

/// Project one image's surfaces and openings into a floor-plan scene.
///
/// Surfaces referencing missing points are skipped (and logged). Edge labels
/// carry the true 3D edge length, converted through `calibration`.
pub fn project_floor_plan(
    set: &ImageAnnotationSet,
    calibration: &Calibration,
    options: &FloorPlanOptions,
) -> FloorPlanOutcome {
    if set.surfaces().is_empty() {
        return FloorPlanOutcome::NothingToDraw("no surfaces to draw".to_string());
    }

    let outlines: Vec<(SurfaceId, Vec<Vec3>)> = set
        .surfaces()
        .iter()
        .filter_map(|surface| set.surface_positions(surface).map(|points| (surface.id, points)))
        .collect();

    let surface_points: Vec<Vec3> = outlines.iter().flat_map(|(_, points)| points.iter().copied()).collect();
    if surface_points.len() < 2 {
        return FloorPlanOutcome::NothingToDraw("too few surface points for a floor plan".to_string());
    }

    let all_points: Vec<Vec3> = surface_points
        .iter()
        .copied()
        .chain(set.openings().iter().flat_map(|o| o.points.iter().copied()))
        .collect();
    let projection = Projection::fit(&bounding_box_2d(&all_points, Axis::X, Axis::Z), options);

    let mut elements = Vec::new();

    if let Some(title) = &options.title {
        elements.push(PlanElement::Label {
            text: title.clone(),
            anchor: [f64::from(options.width) / 2.0, f64::from(options.margin) / 2.0],
            role: LabelRole::Title,
            color: Rgba::BLACK,
            font_size: 24.0,
        });
    }

    for (surface_id, points) in &outlines {
        elements.push(PlanElement::Outline {
            surface_id: *surface_id,
            points: points.iter().map(|p| projection.project(p)).collect(),
            stroke: Rgba::BLACK,
            stroke_width: 2.0,
        });

        for (midpoint, length) in edge_midpoints(points) {
            let [mx, my] = projection.project(&midpoint);
            elements.push(PlanElement::Label {
                text: length_label(calibration, length),
                anchor: [mx, my - 6.0],
                role: LabelRole::EdgeLength,
                color: Rgba::DIMENSION_RED,
                font_size: 14.0,
            });
        }
    }

    for opening in set.openings() {
        let projected: Vec<[f64; 2]> = opening.points.iter().map(|p| projection.project(p)).collect();
        let n = projected.len() as f64;
        let center = [
            projected.iter().map(|p| p[0]).sum::<f64>() / n,
            projected.iter().map(|p| p[1]).sum::<f64>() / n,
        ];

        elements.push(PlanElement::FilledPolygon {
            opening_id: opening.id,
            opening_type: opening.kind,
            points: projected,
            fill: Rgba::opening_fill(opening.kind),
        });

        let name = if opening.properties.name.is_empty() {
            opening.kind.as_str().to_string()
        } else {
            opening.properties.name.clone()
        };
        elements.push(PlanElement::Label {
            text: name,
            anchor: [center[0], center[1] - 12.0],
            role: LabelRole::OpeningName,
            color: Rgba::BLACK,
            font_size: 12.0,
        });

        let (width, height) = match &opening.dimensions {
            Some(dims) => (dims.width, dims.height),
            None => {
                let bbox = bounding_box_2d(&opening.points, Axis::X, Axis::Z);
                (bbox.width(), bbox.height())
            }
        };
        if width.is_finite() && height.is_finite() {
            let unit = if calibration.is_calibrated() { calibration.unit() } else { "u" };
            elements.push(PlanElement::Label {
                text: format!(
                    "{:.1} × {:.1} {unit}",
                    calibration.to_physical_units(width),
                    calibration.to_physical_units(height)
                ),
                anchor: [center[0], center[1] + 6.0],
                role: LabelRole::OpeningSize,
                color: Rgba::BLACK,
                font_size: 12.0,
            });
        }
    }

    FloorPlanOutcome::Drawn(FloorPlanScene {
        width: options.width,
        height: options.height,
        background: Rgba::WHITE,
        pixels_per_unit: projection.pixels_per_unit(),
        elements,
    })
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn svg_color(color: &Rgba) -> String {
    format!("rgb({},{},{})", color.r, color.g, color.b)
}

fn svg_points(points: &[[f64; 2]]) -> String {
    points.iter().map(|[x, y]| format!("{x:.2},{y:.2}")).collect::<Vec<_>>().join(" ")
}

impl FloorPlanScene {
    pub fn outlines(&self) -> impl Iterator<Item = &PlanElement> {
        self.elements.iter().filter(|e| matches!(e, PlanElement::Outline { .. }))
    }

    pub fn labels(&self) -> impl Iterator<Item = (&str, LabelRole)> {
        self.elements.iter().filter_map(|e| match e {
            PlanElement::Label { text, role, .. } => Some((text.as_str(), *role)),
            _ => None,
        })
    }

    /// Standalone SVG document of the scene
    pub fn to_svg(&self) -> String {
        let mut svg = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n",
            w = self.width,
            h = self.height
        );
        svg.push_str(&format!(
            "  <rect width=\"100%\" height=\"100%\" fill=\"{}\"/>\n",
            svg_color(&self.background)
        ));

        for element in &self.elements {
            let line = match element {
                PlanElement::Outline { points, stroke, stroke_width, .. } => format!(
                    "  <polygon points=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{stroke_width}\"/>\n",
                    svg_points(points),
                    svg_color(stroke)
                ),
                PlanElement::FilledPolygon { points, fill, .. } => format!(
                    "  <polygon points=\"{}\" fill=\"{}\" fill-opacity=\"{}\"/>\n",
                    svg_points(points),
                    svg_color(fill),
                    fill.a
                ),
                PlanElement::Label { text, anchor, role, color, font_size } => {
                    let weight = if *role == LabelRole::Title { " font-weight=\"bold\"" } else { "" };
                    let baseline = if *role == LabelRole::Title { "hanging" } else { "auto" };
                    format!(
                        "  <text x=\"{:.2}\" y=\"{:.2}\" font-family=\"Arial\" font-size=\"{font_size}\"{weight} text-anchor=\"middle\" dominant-baseline=\"{baseline}\" fill=\"{}\">{}</text>\n",
                        anchor[0],
                        anchor[1],
                        svg_color(color),
                        escape_xml(text)
                    )
                }
            };
            svg.push_str(&line);
        }

        svg.push_str("</svg>\n");
        svg
    }
}
