//! PNG rasterisation of a floor-plan scene.
//!
//! Outlines and opening fills only; labels stay in the SVG output.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;
use panoplan_core::floor_plan::{FloorPlanScene, PlanElement, Rgba};

fn blend_on_white(color: &Rgba) -> Rgb<u8> {
    let alpha = color.a.clamp(0.0, 1.0);
    let channel = |c: u8| (f64::from(c) * alpha + 255.0 * (1.0 - alpha)).round() as u8;
    Rgb([channel(color.r), channel(color.g), channel(color.b)])
}

/// Integer polygon without repeated vertices; `None` when fewer than 3 remain.
fn polygon(points: &[[f64; 2]]) -> Option<Vec<Point<i32>>> {
    let mut poly: Vec<Point<i32>> = Vec::with_capacity(points.len());
    for [x, y] in points {
        let point = Point::new(x.round() as i32, y.round() as i32);
        if poly.last() != Some(&point) {
            poly.push(point);
        }
    }
    while poly.len() > 1 && poly.first() == poly.last() {
        poly.pop();
    }
    (poly.len() >= 3).then_some(poly)
}

fn draw_outline(canvas: &mut RgbImage, points: &[[f64; 2]], color: Rgb<u8>, width: f64) {
    let passes = width.round().max(1.0) as i32;
    for i in 0..points.len() {
        let [x1, y1] = points[i];
        let [x2, y2] = points[(i + 1) % points.len()];
        for offset in 0..passes {
            let d = (offset - passes / 2) as f32;
            draw_line_segment_mut(canvas, (x1 as f32 + d, y1 as f32), (x2 as f32 + d, y2 as f32), color);
            draw_line_segment_mut(canvas, (x1 as f32, y1 as f32 + d), (x2 as f32, y2 as f32 + d), color);
        }
    }
}

pub fn render_png(scene: &FloorPlanScene) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(scene.width, scene.height, blend_on_white(&scene.background));

    // Fills first so outlines stay on top.
    for element in &scene.elements {
        if let PlanElement::FilledPolygon { points, fill, .. } = element {
            if let Some(poly) = polygon(points) {
                draw_polygon_mut(&mut canvas, &poly, blend_on_white(fill));
            }
        }
    }
    for element in &scene.elements {
        if let PlanElement::Outline { points, stroke, stroke_width, .. } = element {
            if points.len() >= 2 {
                draw_outline(&mut canvas, points, blend_on_white(stroke), *stroke_width);
            }
        }
    }
    canvas
}
