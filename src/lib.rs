//! Boolean operations on regions bounded by cubic Bézier paths.
//!
//! Given two closed planar regions, possibly compound and possibly
//! self-intersecting, [`path_boolean`] computes their union, difference,
//! intersection or exclusion and returns closed paths with consistent
//! winding orientation. [`PathItem::resolve_crossings`] rewrites the
//! self-intersections of a single region.
//!
//! Geometry can be built programmatically from [`Segment`]s or parsed
//! from SVG path data via [`path_from_path_data`].

mod aabb;
mod curve;
mod curve_intersections;
mod epsilons;
mod math;
mod path;
mod path_boolean;
mod path_data;
mod quad_tree;
mod vector;
mod winding;

pub use epsilons::{Epsilons, EPS};
pub use path::{CompoundPath, Path, PathItem, Segment};
pub use path_boolean::{path_boolean, BooleanError, FillRule, PathBooleanOperation};
pub use path_data::{path_from_path_data, path_to_path_data};
pub use vector::Vector;

#[doc(hidden)]
pub mod bench_support {
	//! Internals re-exported for the criterion benches.
	pub use crate::curve::{from_anchors, CurveValues};
	pub use crate::curve_intersections::curve_intersections;
}
