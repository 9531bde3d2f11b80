//! Contour extraction: outer boundaries of foreground regions.
//!
//! This module defines the [`ContourTracer`] trait for pluggable tracing
//! algorithms and the [`ContourTracerKind`] enum for selecting one at
//! runtime. Every stage that needs contours (spheroid detection, the
//! find and join steps of refinement) goes through the same tracer so
//! their notion of "a region" agrees.

use image::GrayImage;
use imageproc::contours::BorderType;

use crate::types::{Contour, Point};

/// Selects which contour tracing algorithm to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContourTracerKind {
    /// Suzuki-Abe border following via `imageproc::contours::find_contours`,
    /// keeping only outermost borders.
    ///
    /// Holes and components nested inside holes are dropped, so each
    /// connected foreground blob yields exactly one contour.
    #[default]
    External,
}

/// Trait for contour tracing strategies.
///
/// Input: a binary image (non-zero pixels = foreground).
/// Output: one closed contour per traced region.
pub trait ContourTracer {
    /// Trace contours in the given binary image.
    fn trace(&self, binary: &GrayImage) -> Vec<Contour>;
}

impl ContourTracer for ContourTracerKind {
    fn trace(&self, binary: &GrayImage) -> Vec<Contour> {
        match *self {
            Self::External => trace_external(binary),
        }
    }
}

/// Outer borders of all top-level foreground components.
#[must_use]
pub fn find_external_contours(binary: &GrayImage) -> Vec<Contour> {
    ContourTracerKind::External.trace(binary)
}

fn trace_external(binary: &GrayImage) -> Vec<Contour> {
    imageproc::contours::find_contours::<i32>(binary)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter(|c| !c.points.is_empty())
        .map(|c| Contour::new(c.points.into_iter().map(|p| Point::new(p.x, p.y)).collect()))
        .collect()
}
