//! Small planar geometry helpers: quads, axis-aligned boxes and polygon tests.

use nalgebra::{Point2, Scalar};
use serde::{Deserialize, Serialize};

/// Four ordered integer corners enclosing a detected region.
///
/// The corners always form a simple polygon; they are stored clockwise in
/// image coordinates (y pointing down) starting from the corner closest to the
/// top-left.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingQuad {
    pub points: [Point2<i32>; 4],
}

impl BoundingQuad {
    /// Build a quad from corners in any order.
    ///
    /// Returns `None` when the corners cannot be arranged into a simple
    /// polygon with non-zero area.
    pub fn from_unordered(points: [Point2<i32>; 4]) -> Option<Self> {
        let c = centroid(&points.map(|p| Point2::new(p.x as f32, p.y as f32)));
        let mut pts = points;
        pts.sort_by(|a, b| {
            let ta = (a.y as f32 - c.y).atan2(a.x as f32 - c.x);
            let tb = (b.y as f32 - c.y).atan2(b.x as f32 - c.x);
            ta.total_cmp(&tb)
        });

        // Angular order is clockwise on screen; rotate so the top-left-most
        // corner comes first.
        let start = (0..4).min_by_key(|&i| pts[i].x + pts[i].y).unwrap_or(0);
        pts.rotate_left(start);

        let quad = Self { points: pts };
        (quad.area() > 0.0 && quad.is_simple()).then_some(quad)
    }

    /// Enclosed area in square pixels.
    pub fn area(&self) -> f64 {
        signed_area(&self.points).abs()
    }

    pub fn centroid(&self) -> Point2<f32> {
        centroid(&self.points.map(|p| Point2::new(p.x as f32, p.y as f32)))
    }

    /// True when no two non-adjacent edges cross.
    pub fn is_simple(&self) -> bool {
        let p = self.points.map(|p| Point2::new(p.x as f64, p.y as f64));
        !segments_cross(p[0], p[1], p[2], p[3]) && !segments_cross(p[1], p[2], p[3], p[0])
    }

    /// Smallest axis-aligned box containing the quad.
    pub fn bounding_rect(&self) -> AxisRect {
        AxisRect::enclosing(&self.points.map(|p| Point2::new(p.x as f32, p.y as f32)))
    }

    /// The same pixels in an image of `width` columns mirrored left to right,
    /// still clockwise from the top-left-most corner.
    pub fn mirrored_x(&self, width: u32) -> Self {
        let mut pts = self.points.map(|p| Point2::new(width as i32 - 1 - p.x, p.y));
        pts.reverse();
        let start = (0..4).min_by_key(|&i| pts[i].x + pts[i].y).unwrap_or(0);
        pts.rotate_left(start);
        Self { points: pts }
    }
}

/// Axis-aligned box in pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AxisRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl AxisRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box around `points`; at least one pixel wide and tall.
    ///
    /// Linear symbologies report their location as a scan line, so a
    /// degenerate extent is expected and clamped rather than rejected.
    pub fn enclosing(points: &[Point2<f32>]) -> Self {
        if points.is_empty() {
            return Self::default();
        }
        let (mut x0, mut y0) = (f32::INFINITY, f32::INFINITY);
        let (mut x1, mut y1) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for p in points {
            x0 = x0.min(p.x);
            y0 = y0.min(p.y);
            x1 = x1.max(p.x);
            y1 = y1.max(p.y);
        }
        let x = x0.floor() as i32;
        let y = y0.floor() as i32;
        let w = (x1.ceil() as i32 - x).max(1) as u32;
        let h = (y1.ceil() as i32 - y).max(1) as u32;
        Self::new(x, y, w, h)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn center(&self) -> Point2<f32> {
        Point2::new(
            self.x as f32 + self.width as f32 * 0.5,
            self.y as f32 + self.height as f32 * 0.5,
        )
    }

    pub fn contains(&self, p: Point2<f32>) -> bool {
        p.x >= self.x as f32
            && p.y >= self.y as f32
            && p.x <= (self.x + self.width as i32) as f32
            && p.y <= (self.y + self.height as i32) as f32
    }

    /// The same pixels in an image of `width` columns mirrored left to right.
    pub fn mirrored_x(&self, width: u32) -> Self {
        Self {
            x: width as i32 - self.x - self.width as i32,
            ..*self
        }
    }

    pub fn intersects(&self, other: &AxisRect) -> bool {
        self.x < other.x + other.width as i32
            && other.x < self.x + self.width as i32
            && self.y < other.y + other.height as i32
            && other.y < self.y + self.height as i32
    }
}

/// Shoelace area; positive for clockwise order in image coordinates.
pub fn signed_area<T>(points: &[Point2<T>]) -> f64
where
    T: Scalar + Copy + Into<f64>,
{
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut acc = 0.0;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        acc += a.x.into() * b.y.into() - b.x.into() * a.y.into();
    }
    0.5 * acc
}

/// Mean of the vertices.
pub fn centroid(points: &[Point2<f32>]) -> Point2<f32> {
    if points.is_empty() {
        return Point2::origin();
    }
    let n = points.len() as f32;
    let (sx, sy) = points
        .iter()
        .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
    Point2::new(sx / n, sy / n)
}

/// Strict convexity: every turn goes the same way and none is degenerate.
pub fn is_convex(points: &[Point2<f32>]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0f32;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        let c = points[(i + 2) % n];
        let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
        if cross.abs() <= f32::EPSILON {
            return false;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

fn orient(a: Point2<f64>, b: Point2<f64>, c: Point2<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn segments_cross(a: Point2<f64>, b: Point2<f64>, c: Point2<f64>, d: Point2<f64>) -> bool {
    let o1 = orient(a, b, c);
    let o2 = orient(a, b, d);
    let o3 = orient(c, d, a);
    let o4 = orient(c, d, b);
    o1 * o2 < 0.0 && o3 * o4 < 0.0
}
