//! spheroid-export: Pure format serializers (sans-IO)
//!
//! Converts invasion results into output formats: a delimited area
//! table and an SVG contour overlay. Every function returns a `String`;
//! writing it anywhere is the caller's job.

pub mod svg;
pub mod table;

pub use svg::{SvgMetadata, build_path_data, to_svg};
pub use table::{HEADER, TableError, format_ratio, to_table, write_row};
