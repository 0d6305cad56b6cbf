//! Small 2D vector toolbox used by every placement and refinement step.

use std::ops::{Add, Mul, Neg, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Unit vector at `angle` radians from the positive x axis.
    pub fn polar(angle: f64) -> Self {
        Self {
            x: angle.cos(),
            y: angle.sin(),
        }
    }

    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn distance(self, other: Point) -> f64 {
        (self - other).length()
    }

    pub fn distance_sq(self, other: Point) -> f64 {
        let d = self - other;
        d.x * d.x + d.y * d.y
    }

    /// Angle of the vector from `self` to `to`, in (-π, π].
    pub fn angle_to(self, to: Point) -> f64 {
        (to.y - self.y).atan2(to.x - self.x)
    }

    /// Scales to unit length. Zero-length vectors come back unchanged.
    pub fn normalized(self) -> Point {
        let len = self.length();
        if len < 1e-12 {
            self
        } else {
            Point::new(self.x / len, self.y / len)
        }
    }

    /// Perpendicular (counter-clockwise quarter turn).
    pub fn perp(self) -> Point {
        Point::new(-self.y, self.x)
    }

    /// Rotates `self` around `pivot` by `angle` radians (counter-clockwise).
    pub fn rotated_around(self, pivot: Point, angle: f64) -> Point {
        let (sin, cos) = angle.sin_cos();
        let d = self - pivot;
        Point::new(
            pivot.x + d.x * cos - d.y * sin,
            pivot.y + d.x * sin + d.y * cos,
        )
    }

    /// Mirror image of `self` across the infinite line through `a` and `b`.
    ///
    /// If `a == b` the line is degenerate and the point is returned unchanged.
    pub fn reflected_across(self, a: Point, b: Point) -> Point {
        let axis = b - a;
        let len_sq = axis.x * axis.x + axis.y * axis.y;
        if len_sq < 1e-24 {
            return self;
        }
        let d = self - a;
        let t = (d.x * axis.x + d.y * axis.y) / len_sq;
        let foot = a + axis * t;
        foot + (foot - self)
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;
    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Point {
    type Output = Point;
    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

/// Signed area of the triangle (a, b, c), doubled.
///
/// Positive when the turn a→b→c is counter-clockwise, negative when
/// clockwise, zero when collinear.
pub fn turn(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Overall winding of a closed polygon via the shoelace sum.
///
/// Positive = counter-clockwise.
pub fn polygon_winding(points: &[Point]) -> f64 {
    let n = points.len();
    let mut sum = 0.0;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        sum += (b.x - a.x) * (b.y + a.y);
    }
    -sum
}

pub fn centroid(points: &[Point]) -> Point {
    if points.is_empty() {
        return Point::ZERO;
    }
    let mut sum = Point::ZERO;
    for &p in points {
        sum = sum + p;
    }
    sum * (1.0 / points.len() as f64)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Point,
    pub max: Point,
}

impl BoundingBox {
    pub fn of(points: impl IntoIterator<Item = Point>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bb = BoundingBox {
            min: first,
            max: first,
        };
        for p in iter {
            bb.min.x = bb.min.x.min(p.x);
            bb.min.y = bb.min.y.min(p.y);
            bb.max.x = bb.max.x.max(p.x);
            bb.max.y = bb.max.y.max(p.y);
        }
        Some(bb)
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }
}

/// True when the open segments (a1, a2) and (b1, b2) properly intersect.
///
/// Segments that merely share an endpoint do not count as crossing; bonds
/// incident to a common atom always touch there.
pub fn segments_cross(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let d1 = turn(b1, b2, a1);
    let d2 = turn(b1, b2, a2);
    let d3 = turn(a1, a2, b1);
    let d4 = turn(a1, a2, b2);
    d1 * d2 < 0.0 && d3 * d4 < 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn rotation_quarter_turn() {
        let p = Point::new(1.0, 0.0);
        let r = p.rotated_around(Point::ZERO, std::f64::consts::FRAC_PI_2);
        assert!(approx(r.x, 0.0) && approx(r.y, 1.0));
    }

    #[test]
    fn reflection_across_x_axis() {
        let p = Point::new(0.5, 2.0);
        let r = p.reflected_across(Point::ZERO, Point::new(1.0, 0.0));
        assert!(approx(r.x, 0.5) && approx(r.y, -2.0));
    }

    #[test]
    fn reflection_is_involution() {
        let a = Point::new(-1.0, 0.3);
        let b = Point::new(2.0, 1.7);
        let p = Point::new(0.25, -3.0);
        let twice = p.reflected_across(a, b).reflected_across(a, b);
        assert!(approx(twice.x, p.x) && approx(twice.y, p.y));
    }

    #[test]
    fn winding_of_ccw_square_is_positive() {
        let square = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        assert!(polygon_winding(&square) > 0.0);
        let reversed: Vec<Point> = square.iter().rev().copied().collect();
        assert!(polygon_winding(&reversed) < 0.0);
    }

    #[test]
    fn crossing_segments() {
        assert!(segments_cross(
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
            Point::new(1.0, 0.0),
        ));
        // Shared endpoint is not a crossing.
        assert!(!segments_cross(
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 0.0),
        ));
    }
}
