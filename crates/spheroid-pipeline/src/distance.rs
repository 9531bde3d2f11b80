//! Contour-to-contour distance and proximity-weighted ranking.
//!
//! The distance is vertex-sampled: every vertex of the contour with
//! fewer points is measured against the boundary of the other. Contours
//! traced from pixels are dense enough that this is a close stand-in
//! for the true polygon distance, and the cost stays linear in the
//! smaller contour.

use std::cmp::Ordering;

use geo::line_measures::Distance;
use geo::{Contains, Euclidean, Line};
use serde::{Deserialize, Serialize};

use crate::shape::contour_area;
use crate::types::{Contour, Offset};

/// Distance from `a` (shifted by `a_offset`) to `b`.
///
/// Zero when the contours touch or overlap, [`f64::INFINITY`] when
/// either is empty. Symmetric under swapping the arguments and negating
/// the offset.
#[must_use]
pub fn contour_distance(a: &Contour, b: &Contour, a_offset: Offset) -> f64 {
    if a.is_empty() || b.is_empty() {
        return f64::INFINITY;
    }
    // Sample the smaller contour; ties fall back to point order so the
    // choice does not depend on argument order.
    let sample_a = match a.len().cmp(&b.len()) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => a.points() <= b.points(),
    };
    let (sampled, target) = if sample_a {
        (a.translated(a_offset), b)
    } else {
        (b.translated(a_offset.negate()), a)
    };

    let boundary = Boundary::new(target);
    let nearest = sampled
        .coords()
        .map(|p| boundary.signed_distance(geo::Point::from(p)))
        .fold(f64::INFINITY, f64::min);
    nearest.max(0.0)
}

/// A target contour prepared once for many point queries.
struct Boundary {
    coords: Vec<geo::Coord<f64>>,
    /// Interior test; absent for degenerate contours.
    polygon: Option<geo::Polygon<f64>>,
}

impl Boundary {
    fn new(target: &Contour) -> Self {
        Self {
            coords: target.coords().collect(),
            polygon: (target.len() >= 3).then(|| target.to_polygon()),
        }
    }

    /// Distance from `p` to the boundary, negative inside.
    fn signed_distance(&self, p: geo::Point<f64>) -> f64 {
        let boundary = match self.coords.as_slice() {
            [] => f64::INFINITY,
            [only] => Euclidean.distance(&p, &geo::Point::from(*only)),
            coords => coords
                .iter()
                .zip(coords.iter().cycle().skip(1))
                .map(|(&start, &end)| Euclidean.distance(&p, &Line::new(start, end)))
                .fold(f64::INFINITY, f64::min),
        };
        if self.polygon.as_ref().is_some_and(|poly| poly.contains(&p)) {
            -boundary
        } else {
            boundary
        }
    }
}

/// An invasion candidate with its ranking inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedContour {
    /// The candidate in the frame it was found in.
    pub contour: Contour,
    /// Enclosed area in pixels.
    pub area: f64,
    /// Distance to the spheroid, in pixels.
    pub distance: f64,
    /// `area / max(1, distance)²`.
    pub score: f64,
}

/// Proximity-weighted score: large, close contours rank highest.
///
/// Distances below one pixel count as one; an infinite distance scores 0.
#[must_use]
pub fn proximity_score(area: f64, distance: f64) -> f64 {
    if !distance.is_finite() {
        return 0.0;
    }
    let d = distance.max(1.0);
    area / (d * d)
}

/// Score every candidate against the spheroid and keep the best `top_k`.
///
/// `candidates` live in a crop frame; `to_original` maps them into the
/// spheroid's frame. The order is by descending score, ties keeping
/// candidate order.
#[must_use]
pub fn rank_invasions(
    candidates: Vec<Contour>,
    spheroid: &Contour,
    to_original: Offset,
    top_k: usize,
) -> Vec<RankedContour> {
    let mut ranked: Vec<RankedContour> = candidates
        .into_iter()
        .map(|contour| {
            let area = contour_area(&contour);
            let distance = contour_distance(&contour, spheroid, to_original);
            RankedContour {
                score: proximity_score(area, distance),
                contour,
                area,
                distance,
            }
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(top_k);
    ranked
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Point;

    fn square(x: i32, y: i32, side: i32) -> Contour {
        Contour::new(vec![
            Point::new(x, y),
            Point::new(x + side - 1, y),
            Point::new(x + side - 1, y + side - 1),
            Point::new(x, y + side - 1),
        ])
    }

    /// A square outline with every boundary pixel as a vertex.
    fn dense_square(x: i32, y: i32, side: i32) -> Contour {
        let s = side - 1;
        let mut points = Vec::new();
        points.extend((0..s).map(|i| Point::new(x + i, y)));
        points.extend((0..s).map(|i| Point::new(x + s, y + i)));
        points.extend((0..s).map(|i| Point::new(x + s - i, y + s)));
        points.extend((0..s).map(|i| Point::new(x, y + s - i)));
        Contour::new(points)
    }

    #[test]
    fn separated_squares() {
        // Right edge of a at x=9, left edge of b at x=20.
        let a = square(0, 0, 10);
        let b = square(20, 0, 10);
        assert!((contour_distance(&a, &b, Offset::ZERO) - 11.0).abs() < 1e-9);
    }

    #[test]
    fn offset_moves_the_first_contour() {
        let a = square(0, 0, 10);
        let b = square(20, 0, 10);
        let d = contour_distance(&a, &b, Offset::new(5, 0));
        assert!((d - 6.0).abs() < 1e-9);
    }

    #[test]
    fn overlapping_and_nested_contours_are_at_zero() {
        let outer = dense_square(0, 0, 30);
        let inner = square(10, 10, 5);
        assert!(contour_distance(&inner, &outer, Offset::ZERO).abs() < f64::EPSILON);
        assert!(contour_distance(&outer, &inner, Offset::ZERO).abs() < f64::EPSILON);

        let (left, touching) = (square(0, 0, 10), square(9, 0, 10));
        assert!(contour_distance(&left, &touching, Offset::ZERO).abs() < f64::EPSILON);
    }

    #[test]
    fn symmetric_under_swap_with_negated_offset() {
        let a = dense_square(0, 0, 12);
        let b = square(40, 25, 6);
        let offset = Offset::new(7, -3);
        let ab = contour_distance(&a, &b, offset);
        let ba = contour_distance(&b, &a, offset.negate());
        assert!((ab - ba).abs() < 1e-9, "{ab} vs {ba}");

        // Equal vertex counts exercise the tie-break.
        let c = square(3, 50, 8);
        let cb = contour_distance(&c, &b, offset);
        let bc = contour_distance(&b, &c, offset.negate());
        assert!((cb - bc).abs() < 1e-9, "{cb} vs {bc}");
    }

    #[test]
    fn prepared_boundary_signs_interior_points() {
        // Corners at 0 and 10.
        let boundary = Boundary::new(&square(0, 0, 11));
        assert!((boundary.signed_distance(geo::Point::new(5.0, 5.0)) + 5.0).abs() < 1e-9);
        assert!((boundary.signed_distance(geo::Point::new(5.0, 8.0)) + 2.0).abs() < 1e-9);
        assert!((boundary.signed_distance(geo::Point::new(13.0, 5.0)) - 3.0).abs() < 1e-9);

        let segment = Boundary::new(&Contour::new(vec![Point::new(0, 0), Point::new(10, 0)]));
        assert!(segment.polygon.is_none());
        assert!((segment.signed_distance(geo::Point::new(5.0, 2.0)) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn empty_contours_are_infinitely_far() {
        let empty = Contour::new(vec![]);
        assert!(contour_distance(&empty, &square(0, 0, 3), Offset::ZERO).is_infinite());
        assert!(contour_distance(&square(0, 0, 3), &empty, Offset::ZERO).is_infinite());
    }

    #[test]
    fn single_point_contours() {
        let p = Contour::new(vec![Point::new(0, 0)]);
        let q = Contour::new(vec![Point::new(3, 4)]);
        assert!((contour_distance(&p, &q, Offset::ZERO) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn score_floors_distance_at_one() {
        assert!((proximity_score(50.0, 0.0) - 50.0).abs() < f64::EPSILON);
        assert!((proximity_score(50.0, 0.5) - 50.0).abs() < f64::EPSILON);
        assert!((proximity_score(50.0, 5.0) - 2.0).abs() < f64::EPSILON);
        assert!(proximity_score(50.0, f64::INFINITY).abs() < f64::EPSILON);
    }

    #[test]
    fn ranking_prefers_close_contours_and_truncates() {
        let spheroid = square(100, 100, 20);
        // Candidates in a crop frame whose origin is (80, 80).
        let near = square(41, 25, 6); // original x 121, 2 px from the spheroid
        let far = square(0, 0, 12); // original (80, 80), much further
        let ranked = rank_invasions(
            vec![far.clone(), near.clone()],
            &spheroid,
            Offset::new(80, 80),
            1,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].contour, near);
        assert!(ranked[0].distance < 3.0);

        let all = rank_invasions(vec![far, near], &spheroid, Offset::new(80, 80), 10);
        assert_eq!(all.len(), 2);
        assert!(all[0].score >= all[1].score);
    }
}
