//! Geometry primitives
//!
//! World-space vectors, planar projections and the polygon helpers used by
//! the shape analyzer, the floor-plan projector and the candidate detector.
//! The vertical axis is Y; the horizontal (floor) plane is XZ.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Edges shorter than this are treated as degenerate by the ray-casting test
const EDGE_EPSILON: f64 = 1e-9;

/// World-space position on (or near) the panorama sphere
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another position
    pub fn distance_to(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn length(&self) -> f64 {
        self.distance_to(&Vec3::ZERO)
    }

    /// Rescale to the given length; a zero vector stays at the origin
    pub fn with_length(self, length: f64) -> Vec3 {
        let current = self.length();
        if current == 0.0 {
            return self;
        }
        let factor = length / current;
        Vec3::new(self.x * factor, self.y * factor, self.z * factor)
    }

    /// Component along a world axis
    pub fn component(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Projection onto the floor plane (drops Y)
    pub fn to_floor(&self) -> Point2 {
        Point2::new(self.x, self.z)
    }

    fn midpoint(&self, other: &Vec3) -> Vec3 {
        Vec3::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0, (self.z + other.z) / 2.0)
    }
}

/// World axis selector used for planar projections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Point in a 2D plane (a projection, or pixel space for detector input)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point2) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Axis-aligned 2D bounding box
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox2D {
    pub min: Point2,
    pub max: Point2,
}

impl BoundingBox2D {
    /// Smallest box containing all points, or `None` for an empty slice
    pub fn from_points(points: &[Point2]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = BoundingBox2D { min: *first, max: *first };
        for point in &points[1..] {
            bbox.include(point);
        }
        Some(bbox)
    }

    pub fn include(&mut self, point: &Point2) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point2 {
        Point2::new((self.min.x + self.max.x) / 2.0, (self.min.y + self.max.y) / 2.0)
    }

    pub fn contains(&self, point: &Point2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }
}

pub fn distance_3d(a: &Vec3, b: &Vec3) -> f64 {
    a.distance_to(b)
}

/// Mean position; the origin for an empty slice
pub fn centroid(points: &[Vec3]) -> Vec3 {
    if points.is_empty() {
        return Vec3::ZERO;
    }
    let n = points.len() as f64;
    let (x, y, z) =
        points.iter().fold((0.0, 0.0, 0.0), |(x, y, z), p| (x + p.x, y + p.y, z + p.z));
    Vec3::new(x / n, y / n, z / n)
}

/// Mean of 2D points; the origin for an empty slice
pub fn centroid_2d(points: &[Point2]) -> Point2 {
    if points.is_empty() {
        return Point2::default();
    }
    let n = points.len() as f64;
    let (x, y) = points.iter().fold((0.0, 0.0), |(x, y), p| (x + p.x, y + p.y));
    Point2::new(x / n, y / n)
}

/// Project world positions onto the plane spanned by two axes
pub fn project(points: &[Vec3], axis_a: Axis, axis_b: Axis) -> Vec<Point2> {
    points.iter().map(|p| Point2::new(p.component(axis_a), p.component(axis_b))).collect()
}

/// Signed shoelace area of a closed loop; positive for counter-clockwise order
pub fn signed_area_2d(points: &[Point2]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (i, current) in points.iter().enumerate() {
        let next = &points[(i + 1) % points.len()];
        sum += current.x * next.y - next.x * current.y;
    }
    sum / 2.0
}

/// Unsigned shoelace area of a closed loop, 0 for fewer than 3 points
pub fn shoelace_area_2d(points: &[Point2]) -> f64 {
    signed_area_2d(points).abs()
}

/// Shoelace area of world positions projected onto the floor plane
pub fn shoelace_area_xz(points: &[Vec3]) -> f64 {
    shoelace_area_2d(&project(points, Axis::X, Axis::Z))
}

/// Bounding box over two chosen axes; all-zero for an empty slice
pub fn bounding_box_2d(points: &[Vec3], axis_a: Axis, axis_b: Axis) -> BoundingBox2D {
    BoundingBox2D::from_points(&project(points, axis_a, axis_b)).unwrap_or_default()
}

/// Lengths of consecutive edges of a closed loop, including last→first
pub fn edge_lengths(points: &[Vec3]) -> Vec<f64> {
    if points.len() < 2 {
        return Vec::new();
    }
    (0..points.len()).map(|i| points[i].distance_to(&points[(i + 1) % points.len()])).collect()
}

/// Midpoint of every closed-loop edge, paired with the edge's 3D length
pub fn edge_midpoints(points: &[Vec3]) -> Vec<(Vec3, f64)> {
    if points.len() < 2 {
        return Vec::new();
    }
    (0..points.len())
        .map(|i| {
            let a = &points[i];
            let b = &points[(i + 1) % points.len()];
            (a.midpoint(b), a.distance_to(b))
        })
        .collect()
}

/// Order indices by `atan2(b - c.b, a - c.a)` around the centroid.
///
/// Only approximately a boundary walk for non-convex loops, and undefined
/// for self-intersecting click sequences. Downstream dimensions are defined
/// relative to this ordering, so it is kept as is.
pub fn angle_order(points: &[Vec3], axis_a: Axis, axis_b: Axis) -> Vec<usize> {
    let center = centroid(points);
    let ca = center.component(axis_a);
    let cb = center.component(axis_b);
    let angles: Vec<f64> = points
        .iter()
        .map(|p| (p.component(axis_b) - cb).atan2(p.component(axis_a) - ca))
        .collect();

    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&i, &j| angles[i].partial_cmp(&angles[j]).unwrap_or(Ordering::Equal));
    order
}

/// Points reordered by angle around their centroid in the given plane
pub fn sort_by_angle_around_centroid(points: &[Vec3], axis_a: Axis, axis_b: Axis) -> Vec<Vec3> {
    angle_order(points, axis_a, axis_b).into_iter().map(|i| points[i]).collect()
}

/// Ray-casting point-in-polygon test
pub fn point_in_polygon_2d(point: &Point2, polygon: &[Point2]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let pi = &polygon[i];
        let pj = &polygon[j];
        if (pi.y > point.y) != (pj.y > point.y) {
            let dy = pj.y - pi.y;
            let dy = if dy.abs() < EDGE_EPSILON { EDGE_EPSILON.copysign(dy) } else { dy };
            let x_cross = (pj.x - pi.x) * (point.y - pi.y) / dy + pi.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square_xz(size: f64) -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, -100.0, 0.0),
            Vec3::new(size, -100.0, 0.0),
            Vec3::new(size, -100.0, size),
            Vec3::new(0.0, -100.0, size),
        ]
    }

    #[test]
    fn test_distance_3d() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 4.0, 12.0);
        assert_abs_diff_eq!(distance_3d(&a, &b), 13.0);
    }

    #[test]
    fn test_centroid() {
        let c = centroid(&square_xz(10.0));
        assert_abs_diff_eq!(c.x, 5.0);
        assert_abs_diff_eq!(c.y, -100.0);
        assert_abs_diff_eq!(c.z, 5.0);
        assert_eq!(centroid(&[]), Vec3::ZERO);
    }

    #[test]
    fn test_shoelace_drops_vertical_axis() {
        assert_abs_diff_eq!(shoelace_area_xz(&square_xz(10.0)), 100.0);
    }

    #[test]
    fn test_shoelace_fewer_than_three_points_is_zero() {
        let pts = [Point2::new(0.0, 0.0), Point2::new(5.0, 5.0)];
        assert_eq!(shoelace_area_2d(&pts), 0.0);
        assert_eq!(shoelace_area_2d(&[]), 0.0);
    }

    #[test]
    fn test_shoelace_reversal_and_rotation() {
        // L-shaped simple polygon, area 3
        let poly = vec![
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 2.0),
            Point2::new(0.0, 2.0),
        ];
        let signed = signed_area_2d(&poly);
        assert_abs_diff_eq!(signed, 3.0);

        let mut reversed = poly.clone();
        reversed.reverse();
        assert_abs_diff_eq!(signed_area_2d(&reversed), -3.0);
        assert_abs_diff_eq!(shoelace_area_2d(&reversed), 3.0);

        for shift in 1..poly.len() {
            let mut rotated = poly.clone();
            rotated.rotate_left(shift);
            assert_abs_diff_eq!(shoelace_area_2d(&rotated), 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_bounding_box() {
        let bbox = bounding_box_2d(&square_xz(4.0), Axis::X, Axis::Z);
        assert_eq!(bbox.width(), 4.0);
        assert_eq!(bbox.height(), 4.0);
        assert_eq!(bounding_box_2d(&[], Axis::X, Axis::Z), BoundingBox2D::default());
    }

    #[test]
    fn test_sort_by_angle_restores_loop_order() {
        let square = square_xz(10.0);
        let scrambled = vec![square[2], square[0], square[3], square[1]];
        let sorted = sort_by_angle_around_centroid(&scrambled, Axis::X, Axis::Z);
        let edges = edge_lengths(&sorted);
        for edge in edges {
            assert_abs_diff_eq!(edge, 10.0);
        }
    }

    #[test]
    fn test_point_in_polygon() {
        let triangle = [Point2::new(0.0, 0.0), Point2::new(10.0, 0.0), Point2::new(5.0, 8.0)];
        assert!(point_in_polygon_2d(&centroid_2d(&triangle), &triangle));
        assert!(!point_in_polygon_2d(&Point2::new(100.0, 100.0), &triangle));
        assert!(!point_in_polygon_2d(&Point2::new(-1.0, 4.0), &triangle));
    }

    #[test]
    fn test_point_in_polygon_with_repeated_vertex() {
        let square = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ];
        assert!(point_in_polygon_2d(&Point2::new(5.0, 5.0), &square));
        assert!(!point_in_polygon_2d(&Point2::new(15.0, 5.0), &square));
    }

    #[test]
    fn test_with_length() {
        let v = Vec3::new(3.0, 0.0, 4.0).with_length(10.0);
        assert_abs_diff_eq!(v.length(), 10.0);
        assert_eq!(Vec3::ZERO.with_length(5.0), Vec3::ZERO);
    }
}
