//! Shape classification: how disk-like is a contour?
//!
//! Circularity is the fraction of the minimum enclosing circle covered by
//! the contour's polygon:
//!
//! ```text
//! circularity = area / (π × r²)
//! ```
//!
//! A rasterized disk scores close to 1, a thin streak close to 0. The
//! spheroid is the largest contour that clears the threshold.

use std::f64::consts::PI;

use geo::{Area, ConvexHull, Coord, MultiPoint};

use crate::types::Contour;

/// Radii below this are treated as zero when computing circularity.
const MIN_RADIUS: f64 = 1e-9;

/// A circle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    /// Center x.
    pub cx: f64,
    /// Center y.
    pub cy: f64,
    /// Radius.
    pub radius: f64,
}

impl Circle {
    const fn point(c: Coord<f64>) -> Self {
        Self {
            cx: c.x,
            cy: c.y,
            radius: 0.0,
        }
    }

    fn diameter(a: Coord<f64>, b: Coord<f64>) -> Self {
        Self {
            cx: (a.x + b.x) / 2.0,
            cy: (a.y + b.y) / 2.0,
            radius: (a.x - b.x).hypot(a.y - b.y) / 2.0,
        }
    }

    /// Circle through three points, or `None` when they are collinear.
    fn circumscribed(a: Coord<f64>, b: Coord<f64>, c: Coord<f64>) -> Option<Self> {
        let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
        if d.abs() < f64::EPSILON {
            return None;
        }
        let a2 = a.x.mul_add(a.x, a.y * a.y);
        let b2 = b.x.mul_add(b.x, b.y * b.y);
        let c2 = c.x.mul_add(c.x, c.y * c.y);
        let cx = (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d;
        let cy = (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d;
        Some(Self {
            cx,
            cy,
            radius: (a.x - cx).hypot(a.y - cy),
        })
    }

    fn contains(&self, p: Coord<f64>) -> bool {
        (p.x - self.cx).hypot(p.y - self.cy) <= self.radius + 1e-7
    }
}

/// Enclosed polygon area (shoelace, unsigned). Zero for contours with
/// fewer than three points.
#[must_use]
pub fn contour_area(contour: &Contour) -> f64 {
    if contour.len() < 3 {
        return 0.0;
    }
    contour.to_polygon().unsigned_area()
}

/// Smallest circle containing every contour point, or `None` for an
/// empty contour.
///
/// Runs the incremental (Welzl-style) construction over the convex hull
/// of the points, which is all that can touch the enclosing circle.
#[must_use]
pub fn min_enclosing_circle(contour: &Contour) -> Option<Circle> {
    let points: Vec<Coord<f64>> = contour.coords().collect();
    let first = *points.first()?;
    if points.len() < 3 {
        return Some(points.get(1).map_or(Circle::point(first), |&second| {
            Circle::diameter(first, second)
        }));
    }

    let hull = MultiPoint::from(points).convex_hull();
    let mut boundary: Vec<Coord<f64>> = hull.exterior().coords().copied().collect();
    // The hull ring repeats its first point at the end.
    boundary.pop();
    if boundary.is_empty() {
        return Some(Circle::point(first));
    }
    Some(enclose(&boundary))
}

fn enclose(points: &[Coord<f64>]) -> Circle {
    let mut circle = Circle::point(points[0]);
    for i in 1..points.len() {
        if circle.contains(points[i]) {
            continue;
        }
        circle = Circle::point(points[i]);
        for j in 0..i {
            if circle.contains(points[j]) {
                continue;
            }
            circle = Circle::diameter(points[i], points[j]);
            for k in 0..j {
                if circle.contains(points[k]) {
                    continue;
                }
                circle = Circle::circumscribed(points[i], points[j], points[k])
                    .unwrap_or_else(|| widest_pair(points[i], points[j], points[k]));
            }
        }
    }
    circle
}

/// Enclosing circle of three collinear points: the diameter of the
/// outermost pair.
fn widest_pair(a: Coord<f64>, b: Coord<f64>, c: Coord<f64>) -> Circle {
    [
        Circle::diameter(a, b),
        Circle::diameter(a, c),
        Circle::diameter(b, c),
    ]
    .into_iter()
    .fold(Circle::point(a), |best, cand| {
        if cand.radius > best.radius { cand } else { best }
    })
}

/// Area over enclosing-circle area, or `None` when the enclosing circle
/// is degenerate (empty contour or all points coincide).
#[must_use]
pub fn circularity(contour: &Contour) -> Option<f64> {
    let circle = min_enclosing_circle(contour)?;
    if circle.radius < MIN_RADIUS {
        return None;
    }
    Some(contour_area(contour) / (PI * circle.radius * circle.radius))
}

/// Whether the contour covers at least `threshold` of its enclosing
/// circle. Degenerate contours are never circle-like.
#[must_use]
pub fn is_circle(contour: &Contour, threshold: f64) -> bool {
    circularity(contour).is_some_and(|c| c >= threshold)
}

/// Pick the spheroid from a contour set.
///
/// Contours are ranked by area, largest first; the first circle-like
/// one wins. When none qualifies, the largest contour is the spheroid
/// anyway. Returns `None` only for an empty set.
#[must_use]
pub fn select_spheroid(contours: &[Contour], threshold: f64) -> Option<&Contour> {
    let mut by_area: Vec<(&Contour, f64)> = contours.iter().map(|c| (c, contour_area(c))).collect();
    by_area.sort_by(|a, b| b.1.total_cmp(&a.1));

    let largest = by_area.first().map(|(c, _)| *c)?;
    let circular = by_area
        .iter()
        .map(|(c, _)| *c)
        .find(|c| is_circle(c, threshold));
    if circular.is_none() {
        log::debug!("no circle-like contour among {}, using the largest", contours.len());
    }
    Some(circular.unwrap_or(largest))
}
