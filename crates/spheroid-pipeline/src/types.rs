//! Shared types for the spheroid invasion pipeline.

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbaImage` so downstream crates can reference the
/// original decoded image without depending on `image` directly.
pub use image::RgbaImage;

/// An integer pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: i32,
    /// Vertical position (pixels from top edge).
    pub y: i32,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// This point shifted by `offset`.
    #[must_use]
    pub const fn translated(self, offset: Offset) -> Self {
        Self {
            x: self.x + offset.dx,
            y: self.y + offset.dy,
        }
    }
}

/// A translation between two coordinate frames.
///
/// A crop at `(x, y)` carries the offset `(-x, -y)`, which maps
/// original-frame coordinates into the crop. [`negate`](Self::negate)
/// gives the inverse mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offset {
    /// Horizontal shift in pixels.
    pub dx: i32,
    /// Vertical shift in pixels.
    pub dy: i32,
}

impl Offset {
    /// The identity translation.
    pub const ZERO: Self = Self { dx: 0, dy: 0 };

    /// Create a new offset.
    #[must_use]
    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }

    /// The inverse translation.
    #[must_use]
    pub const fn negate(self) -> Self {
        Self {
            dx: -self.dx,
            dy: -self.dy,
        }
    }
}

/// A closed region boundary traced from a binary image.
///
/// The last point connects back to the first; the closing point is not
/// repeated. Contours with fewer than three points are degenerate: they
/// enclose no area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contour(Vec<Point>);

impl Contour {
    /// Create a contour from its boundary points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the contour has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of boundary points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Consumes the contour and returns its points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }

    /// A copy of this contour with every point shifted by `offset`.
    #[must_use]
    pub fn translated(&self, offset: Offset) -> Self {
        Self(self.0.iter().map(|p| p.translated(offset)).collect())
    }

    /// Axis-aligned bounding box of the points, or `None` when empty.
    ///
    /// Width and height count pixels inclusively, so a single point has
    /// a 1x1 box.
    #[must_use]
    pub fn bounding_box(&self) -> Option<Region> {
        let first = self.0.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &self.0[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Region {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        })
    }

    /// Points as `geo` coordinates.
    pub(crate) fn coords(&self) -> impl Iterator<Item = geo::Coord<f64>> + '_ {
        self.0.iter().map(|p| geo::Coord {
            x: f64::from(p.x),
            y: f64::from(p.y),
        })
    }

    /// The contour as a `geo` polygon (exterior ring only).
    pub(crate) fn to_polygon(&self) -> geo::Polygon<f64> {
        geo::Polygon::new(geo::LineString::from_iter(self.coords()), Vec::new())
    }

    /// Points as `imageproc` points, for the drawing routines.
    pub(crate) fn to_imageproc(&self) -> Vec<imageproc::point::Point<i32>> {
        self.0
            .iter()
            .map(|p| imageproc::point::Point::new(p.x, p.y))
            .collect()
    }
}

/// An axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl Region {
    /// Whether `p` lies inside the rectangle.
    #[must_use]
    pub const fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.y >= self.y && p.x < self.x + self.width && p.y < self.y + self.height
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an image buffer.
    #[must_use]
    pub fn of<I: image::GenericImageView>(image: &I) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height }
    }

    /// Total pixel count.
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Parameters of the find-join-kill refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    /// Number of find-join-kill rounds.
    pub iterations: usize,

    /// Fraction of joined contours (by count, largest first) that
    /// survive each kill step. At least one contour always survives
    /// when any exist.
    pub survival_fraction: f64,

    /// Radius of the disk structuring element used by the closing in
    /// the join step. Radius 5 is an 11x11 disk.
    pub closing_radius: u8,

    /// Width in pixels of the outlines drawn in the join and kill steps.
    pub stroke_width: u8,
}

impl RefineConfig {
    /// Default number of refinement rounds.
    pub const DEFAULT_ITERATIONS: usize = 2;
    /// Default kill-step survival fraction.
    pub const DEFAULT_SURVIVAL_FRACTION: f64 = 0.10;
    /// Default closing disk radius.
    pub const DEFAULT_CLOSING_RADIUS: u8 = 5;
    /// Default outline width.
    pub const DEFAULT_STROKE_WIDTH: u8 = 3;
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            iterations: Self::DEFAULT_ITERATIONS,
            survival_fraction: Self::DEFAULT_SURVIVAL_FRACTION,
            closing_radius: Self::DEFAULT_CLOSING_RADIUS,
            stroke_width: Self::DEFAULT_STROKE_WIDTH,
        }
    }
}

/// Configuration for the invasion pipeline.
///
/// Use [`validate`](Self::validate) before processing a batch; the
/// stage functions assume a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Percentile cutoff for binarization, in `(0, 100]`.
    pub percentile: f64,

    /// Minimum circularity for a contour to count as circle-like.
    pub circularity_threshold: f64,

    /// Radius of the disk the first-pass foreground is opened with before
    /// contour extraction. Bright strands narrower than
    /// `2 * core_radius + 1` pixels are cut off the spheroid and left for
    /// invasion detection. 0 disables the opening.
    pub core_radius: u8,

    /// Zoom-out factor applied to the spheroid bounding box when
    /// cropping the invasion search region.
    pub crop_scale: f64,

    /// Find-join-kill parameters.
    pub refine: RefineConfig,

    /// Number of ranked invasion contours reported.
    pub top_k: usize,

    /// Invert intensities after contrast stretching, for images where
    /// the spheroid is darker than the background.
    pub invert: bool,
}

impl PipelineConfig {
    /// Default binarization percentile.
    pub const DEFAULT_PERCENTILE: f64 = 95.0;
    /// Default circularity threshold.
    pub const DEFAULT_CIRCULARITY_THRESHOLD: f64 = 0.35;
    /// Default spheroid core opening radius.
    pub const DEFAULT_CORE_RADIUS: u8 = 3;
    /// Default crop zoom-out factor.
    pub const DEFAULT_CROP_SCALE: f64 = 3.0;
    /// Default number of reported invasion contours.
    pub const DEFAULT_TOP_K: usize = 10;

    /// Check every parameter against its valid range.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first
    /// out-of-range parameter.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));

        if !(self.percentile > 0.0 && self.percentile <= 100.0) {
            return invalid(format!(
                "percentile must be in (0, 100], got {}",
                self.percentile
            ));
        }
        if !(0.0..=1.0).contains(&self.circularity_threshold) {
            return invalid(format!(
                "circularity_threshold must be in [0, 1], got {}",
                self.circularity_threshold
            ));
        }
        if !(self.crop_scale.is_finite() && self.crop_scale > 0.0) {
            return invalid(format!(
                "crop_scale must be positive, got {}",
                self.crop_scale
            ));
        }
        if !(self.refine.survival_fraction > 0.0 && self.refine.survival_fraction <= 1.0) {
            return invalid(format!(
                "survival_fraction must be in (0, 1], got {}",
                self.refine.survival_fraction
            ));
        }
        if self.refine.stroke_width == 0 {
            return invalid("stroke_width must be at least 1".to_string());
        }
        if self.top_k == 0 {
            return invalid("top_k must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            percentile: Self::DEFAULT_PERCENTILE,
            circularity_threshold: Self::DEFAULT_CIRCULARITY_THRESHOLD,
            core_radius: Self::DEFAULT_CORE_RADIUS,
            crop_scale: Self::DEFAULT_CROP_SCALE,
            refine: RefineConfig::default(),
            top_k: Self::DEFAULT_TOP_K,
            invert: false,
        }
    }
}

/// Everything the pipeline produced for one image.
///
/// All contours are in the original image's coordinate frame.
#[derive(Debug, Clone)]
pub struct InvasionResult {
    /// The decoded input, kept for annotation.
    pub original: RgbaImage,
    /// Input dimensions.
    pub dimensions: Dimensions,
    /// The selected spheroid boundary.
    pub spheroid: Contour,
    /// Reported invasion contours, best first.
    pub invasions: Vec<crate::distance::RankedContour>,
    /// The region searched for invasions.
    pub roi: crate::roi::Roi,
    /// Spheroid and invasion masks the statistics were counted from.
    pub masks: crate::stats::AreaMasks,
    /// The statistics record.
    pub stats: crate::stats::AreaStats,
}

/// Errors that can occur during pipeline processing.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. The `ImageDecode` variant is
/// serialized as its `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// The first thresholding pass found no foreground contours.
    #[error("no spheroid detected")]
    NoSpheroid,
}

/// Serde-compatible proxy for `PipelineError`.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    ImageDecode(String),
    EmptyInput,
    InvalidConfig(String),
    NoSpheroid,
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::ImageDecode(e) => PipelineErrorProxy::ImageDecode(e.to_string()),
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::InvalidConfig(s) => PipelineErrorProxy::InvalidConfig(s.clone()),
            Self::NoSpheroid => PipelineErrorProxy::NoSpheroid,
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            // The typed image error cannot be rebuilt; keep its message.
            PipelineErrorProxy::ImageDecode(msg) => {
                Self::InvalidConfig(format!("image decode error: {msg}"))
            }
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
            PipelineErrorProxy::NoSpheroid => Self::NoSpheroid,
        })
    }
}
