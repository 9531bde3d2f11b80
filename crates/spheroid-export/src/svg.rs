//! SVG overlay serializer.
//!
//! Renders the spheroid and invasion contours of one image as closed
//! `<path>` elements in original pixel coordinates, using the [`svg`]
//! crate for document construction, XML escaping, and path data
//! formatting. The document's `viewBox` matches the image so the overlay
//! can be stacked on top of it.
//!
//! Optional [`SvgMetadata`] embeds `<title>` and `<desc>` elements for
//! accessibility and to help file managers identify exported files.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Description, Element, Group, Path, Title};
use svg::node::{Node, Text, Value};

use spheroid_pipeline::{Contour, Dimensions};

/// Stroke colour of the spheroid outline.
const SPHEROID_STROKE: &str = "#ff00ff";
/// Stroke colour of invasion outlines.
const INVASION_STROKE: &str = "#00ffff";
/// Outline width in pixels.
const STROKE_WIDTH: u32 = 3;

/// Metadata to embed in the SVG document.
///
/// All fields are optional.  When present, a `<title>` and/or `<desc>`
/// element is emitted immediately after the opening `<svg>` tag.
///
/// Text values are XML-escaped automatically by the `svg` crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title, emitted as `<title>`.
    ///
    /// Typically the source image filename.
    pub title: Option<&'a str>,

    /// Document description, emitted as `<desc>`.
    ///
    /// Typically the area statistics of the image.
    pub description: Option<&'a str>,

    /// Serialized pipeline configuration, emitted inside a
    /// `<metadata>` element so the overlay records how it was produced.
    pub config_json: Option<&'a str>,
}

/// Build a closed SVG path `d` attribute string from a contour.
///
/// Uses `M` for the first point, `L` for subsequent points and `Z` to
/// close. Returns an empty string for contours with fewer than 2 points.
///
/// # Examples
///
/// ```
/// use spheroid_pipeline::{Contour, Point};
/// use spheroid_export::build_path_data;
///
/// let contour = Contour::new(vec![
///     Point::new(10, 20),
///     Point::new(30, 20),
///     Point::new(30, 40),
/// ]);
/// let d = build_path_data(&contour);
/// assert!(d.starts_with("M10,20 L30,20 L30,40"));
/// ```
#[must_use]
pub fn build_path_data(contour: &Contour) -> String {
    let points = contour.points();
    let [first, rest @ ..] = points else {
        return String::new();
    };
    if rest.is_empty() {
        return String::new();
    }

    let mut data = Data::new().move_to((f64::from(first.x), f64::from(first.y)));
    for p in rest {
        data = data.line_to((f64::from(p.x), f64::from(p.y)));
    }
    String::from(Value::from(data.close()))
}

/// One group of outlined contours sharing a stroke colour.
fn outline_group(id: &str, stroke: &str, contours: &[&Contour]) -> Group {
    let mut group = Group::new()
        .set("id", id)
        .set("fill", "none")
        .set("stroke", stroke)
        .set("stroke-width", STROKE_WIDTH)
        .set("stroke-linejoin", "round");
    for contour in contours {
        let d = build_path_data(contour);
        if d.is_empty() {
            continue;
        }
        group = group.add(Path::new().set("d", d));
    }
    group
}

/// Serialize the spheroid and invasion contours into an SVG overlay.
///
/// The spheroid is stroked magenta inside `<g id="spheroid">`, the
/// invasions cyan inside `<g id="invasions">`, in the given order.
///
/// # Examples
///
/// ```
/// use spheroid_pipeline::{Contour, Dimensions, Point};
/// use spheroid_export::{SvgMetadata, to_svg};
///
/// let spheroid = Contour::new(vec![Point::new(1, 1), Point::new(5, 1), Point::new(3, 4)]);
/// let dims = Dimensions { width: 8, height: 6 };
/// let metadata = SvgMetadata {
///     title: Some("well-a1.png"),
///     ..SvgMetadata::default()
/// };
/// let svg = to_svg(&spheroid, &[], dims, &metadata);
/// assert!(svg.contains("<title>well-a1.png</title>"));
/// assert!(svg.contains(r#"viewBox="0 0 8 6""#));
/// ```
#[must_use]
pub fn to_svg(
    spheroid: &Contour,
    invasions: &[&Contour],
    dimensions: Dimensions,
    metadata: &SvgMetadata<'_>,
) -> String {
    let (w, h) = (dimensions.width, dimensions.height);
    let mut doc = Document::new()
        .set("width", w)
        .set("height", h)
        .set("viewBox", (0, 0, w, h));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }

    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }

    if let Some(config_json) = metadata.config_json {
        let mut config_el = Element::new("spheroid:config");
        config_el.assign("xmlns:spheroid", "urn:spheroid-invasion:config:1");
        config_el.append(Text::new(config_json));
        let mut metadata_el = Element::new("metadata");
        metadata_el.append(config_el);
        doc = doc.add(metadata_el);
    }

    doc = doc
        .add(outline_group("spheroid", SPHEROID_STROKE, &[spheroid]))
        .add(outline_group("invasions", INVASION_STROKE, invasions));

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use spheroid_pipeline::Point;

    use super::*;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    fn no_meta() -> SvgMetadata<'static> {
        SvgMetadata::default()
    }

    fn triangle(x: i32, y: i32) -> Contour {
        Contour::new(vec![
            Point::new(x, y),
            Point::new(x + 10, y),
            Point::new(x + 5, y + 8),
        ])
    }

    // --- build_path_data ---

    #[test]
    fn build_path_data_empty() {
        assert_eq!(build_path_data(&Contour::new(vec![])), "");
    }

    #[test]
    fn build_path_data_single_point() {
        assert_eq!(build_path_data(&Contour::new(vec![Point::new(5, 5)])), "");
    }

    #[test]
    fn build_path_data_closes_the_outline() {
        let d = build_path_data(&triangle(0, 0));
        assert!(d.starts_with("M0,0 L10,0 L5,8"), "{d}");
        assert!(d.to_lowercase().ends_with('z'), "{d}");
    }

    // --- Document structure ---

    #[test]
    fn viewbox_reflects_dimensions() {
        let svg = to_svg(&triangle(0, 0), &[], dims(640, 480), &no_meta());
        assert!(svg.contains(r#"width="640""#));
        assert!(svg.contains(r#"height="480""#));
        assert!(svg.contains(r#"viewBox="0 0 640 480""#));
    }

    #[test]
    fn svg_has_xml_declaration_and_namespace() {
        let svg = to_svg(&triangle(0, 0), &[], dims(10, 10), &no_meta());
        assert!(svg.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(svg.contains(r#"xmlns="http://www.w3.org/2000/svg""#));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn spheroid_and_invasions_get_their_own_groups() {
        let a = triangle(20, 20);
        let b = triangle(40, 40);
        let svg = to_svg(&triangle(0, 0), &[&a, &b], dims(100, 100), &no_meta());
        assert!(svg.contains(r##"stroke="#ff00ff""##));
        assert!(svg.contains(r##"stroke="#00ffff""##));
        assert_eq!(svg.matches("<path").count(), 3);

        let spheroid_pos = svg.find(r#"id="spheroid""#).unwrap();
        let invasions_pos = svg.find(r#"id="invasions""#).unwrap();
        assert!(spheroid_pos < invasions_pos);
    }

    #[test]
    fn degenerate_invasions_are_skipped() {
        let dot = Contour::new(vec![Point::new(1, 1)]);
        let svg = to_svg(&triangle(0, 0), &[&dot], dims(20, 20), &no_meta());
        assert_eq!(svg.matches("<path").count(), 1);
    }

    // --- Metadata ---

    #[test]
    fn title_and_desc_emitted_before_paths() {
        let meta = SvgMetadata {
            title: Some("well-a1.png"),
            description: Some("spheroid=400 px invasion=25 px"),
            ..SvgMetadata::default()
        };
        let svg = to_svg(&triangle(0, 0), &[], dims(20, 20), &meta);
        let title_pos = svg.find("<title>well-a1.png</title>").unwrap();
        let desc_pos = svg.find("<desc>spheroid=400 px invasion=25 px</desc>").unwrap();
        let path_pos = svg.find("<path").unwrap();
        assert!(title_pos < desc_pos);
        assert!(desc_pos < path_pos);
    }

    #[test]
    fn title_and_desc_omitted_when_none() {
        let svg = to_svg(&triangle(0, 0), &[], dims(20, 20), &no_meta());
        assert!(!svg.contains("<title>"));
        assert!(!svg.contains("<desc>"));
        assert!(!svg.contains("<metadata>"));
    }

    #[test]
    fn special_characters_are_escaped() {
        let meta = SvgMetadata {
            title: Some("A <B> & C"),
            config_json: Some(r#"{"top_k":10}"#),
            ..SvgMetadata::default()
        };
        let svg = to_svg(&triangle(0, 0), &[], dims(20, 20), &meta);
        assert!(svg.contains("<title>A &lt;B&gt; &amp; C</title>"));
        assert!(svg.contains("<metadata>"));
        assert!(svg.contains("&quot;top_k&quot;:10") || svg.contains(r#""top_k":10"#));
    }
}
