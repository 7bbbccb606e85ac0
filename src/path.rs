// Copyright 2024 Adam Platkevič <rflashster@gmail.com>
//
// SPDX-License-Identifier: MIT

use crate::aabb::AaBb;
use crate::curve::{self, CurveValues};
use crate::epsilons::EPS;
use crate::math;
use crate::path_boolean::FillRule;
use crate::vector::{vectors_equal, Vector};
use crate::winding::{self, WindingPath};

/// A node on a path: an anchor point with an incoming and an outgoing
/// handle, both relative to the anchor. The segment implicitly owns the
/// curve from its anchor to the next segment's anchor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
	pub point: Vector,
	pub handle_in: Vector,
	pub handle_out: Vector,
}

impl Segment {
	pub fn new(point: Vector, handle_in: Vector, handle_out: Vector) -> Self {
		Segment { point, handle_in, handle_out }
	}

	/// A segment with zero-length handles.
	pub fn anchor(point: Vector) -> Self {
		Segment {
			point,
			handle_in: Vector::ZERO,
			handle_out: Vector::ZERO,
		}
	}

	pub fn has_handles(&self) -> bool {
		self.handle_in != Vector::ZERO || self.handle_out != Vector::ZERO
	}

	#[must_use]
	pub fn reversed(self) -> Self {
		Segment {
			point: self.point,
			handle_in: self.handle_out,
			handle_out: self.handle_in,
		}
	}
}

/// An ordered run of segments, closed or open. A closed path has an
/// implicit curve from its last segment back to the first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Path {
	pub segments: Vec<Segment>,
	pub closed: bool,
}

impl Path {
	pub fn new(segments: Vec<Segment>, closed: bool) -> Self {
		Path { segments, closed }
	}

	pub fn is_empty(&self) -> bool {
		self.segments.is_empty()
	}

	pub fn curve_count(&self) -> usize {
		if self.closed {
			self.segments.len()
		} else {
			self.segments.len().saturating_sub(1)
		}
	}

	/// The value array of the curve leaving `segments[index]`.
	pub fn curve_values(&self, index: usize) -> CurveValues {
		let seg1 = &self.segments[index];
		let seg2 = &self.segments[(index + 1) % self.segments.len()];
		curve::from_anchors(seg1.point, seg1.point + seg1.handle_out, seg2.point + seg2.handle_in, seg2.point)
	}

	pub fn curves(&self) -> Vec<CurveValues> {
		(0..self.curve_count()).map(|i| self.curve_values(i)).collect()
	}

	/// The signed area of the region enclosed by the path, treating open
	/// paths as if closed by a straight line. Positive means clockwise in
	/// a y-down coordinate system.
	pub fn area(&self) -> f64 {
		let count = self.segments.len();
		if count < 2 {
			return 0.;
		}
		(0..count).map(|i| curve::signed_area(&self.curve_values(i))).sum()
	}

	pub fn bounds(&self) -> AaBb {
		let mut bounds: Option<AaBb> = None;
		for i in 0..self.curve_count() {
			let curve_bounds = curve::bounding_box(&self.curve_values(i));
			bounds = Some(match bounds {
				Some(acc) => acc.merged(&curve_bounds),
				None => curve_bounds,
			});
		}
		bounds.unwrap_or(AaBb {
			top: 0.,
			right: 0.,
			bottom: 0.,
			left: 0.,
		})
	}

	pub fn is_clockwise(&self) -> bool {
		self.area() >= 0.
	}

	pub fn set_clockwise(&mut self, clockwise: bool) {
		if self.is_clockwise() != clockwise {
			self.reverse();
		}
	}

	pub fn reverse(&mut self) {
		self.segments.reverse();
		for segment in &mut self.segments {
			*segment = segment.reversed();
		}
	}

	/// Remove degenerate curves: handle-less curves of (near) zero length,
	/// and, with `simplify`, handle-less curves collinear with their
	/// successor.
	pub fn reduce(&mut self, simplify: bool) {
		let tolerance = if simplify { EPS.geometric } else { 0. };
		let mut index = self.curve_count();
		while index > 0 {
			index -= 1;
			if index >= self.curve_count() {
				continue;
			}
			let values = self.curve_values(index);
			if curve::has_handles(&values) {
				continue;
			}
			let collinear = simplify
				&& (self.closed || index + 1 < self.curve_count())
				&& self.segments.len() > 2
				&& {
					let next = self.curve_values((index + 1) % self.segments.len());
					curve::is_straight(&values)
						&& curve::is_straight(&next)
						&& curve::vectors_collinear(curve::end_point(&values) - curve::start_point(&values), curve::end_point(&next) - curve::start_point(&next))
				};
			if !curve::has_length(&values, tolerance) || collinear {
				self.remove_curve(index);
			}
		}
	}

	/// Remove the curve leaving `segments[index]` by deleting its second
	/// segment and carrying that segment's outgoing handle over.
	fn remove_curve(&mut self, index: usize) {
		if self.segments.len() < 2 {
			return;
		}
		let second = (index + 1) % self.segments.len();
		let removed = self.segments.remove(second);
		let first = if second == 0 { self.segments.len() - 1 } else { index };
		self.segments[first].handle_out = removed.handle_out;
	}

	/// Close an open path the way the boolean operators need it: merge
	/// coincident end anchors and join the boundary with a straight line.
	pub(crate) fn close_with_joint(&mut self) {
		if self.closed || self.segments.is_empty() {
			return;
		}
		if self.segments.len() > 1 {
			let first = self.segments[0];
			let last = *self.segments.last().unwrap();
			if vectors_equal(first.point, last.point, math::EPSILON) {
				self.segments[0].handle_in = last.handle_in;
				self.segments.pop();
			}
		}
		self.closed = true;
		if let Some(first) = self.segments.first_mut() {
			first.handle_in = Vector::ZERO;
		}
		if let Some(last) = self.segments.last_mut() {
			last.handle_out = Vector::ZERO;
		}
	}

	pub(crate) fn winding_path(&self) -> WindingPath {
		WindingPath {
			curves: self.curves(),
			clockwise: self.is_clockwise(),
			closed: self.closed,
		}
	}

	pub fn contains(&self, point: Vector, fill_rule: FillRule) -> bool {
		let w = winding::get_winding(point, std::slice::from_ref(&self.winding_path()), false);
		w.on_path
			|| match fill_rule {
				FillRule::EvenOdd => (w.winding_left & 1) == 1 || (w.winding_right & 1) == 1,
				FillRule::NonZero => w.winding != 0,
			}
	}

	/// A point in the path's interior. The bounding-box center when it is
	/// contained; otherwise a point between the first two intercepts of a
	/// horizontal ray through the center, cast against the monotone-in-y
	/// pieces of the path's curves.
	pub fn interior_point(&self) -> Vector {
		let bounds = self.bounds();
		let mut point = bounds.center();
		if !self.contains(point, FillRule::NonZero) {
			let y = point.y;
			let mut intercepts = Vec::new();
			let mut roots = [0.; 3];
			for values in self.curves() {
				let (o0, o1, o2, o3) = (values[1], values[3], values[5], values[7]);
				if y >= o0.min(o1).min(o2).min(o3) && y <= o0.max(o1).max(o2).max(o3) {
					for mono in curve::mono_curves(&values, false) {
						let mo0 = mono[1];
						let mo3 = mono[7];
						// Monotone pieces that are horizontal cannot
						// produce a proper intercept.
						if mo0 != mo3 && y >= mo0.min(mo3) && y <= mo0.max(mo3) {
							let x = if y == mo0 {
								mono[0]
							} else if y == mo3 {
								mono[6]
							} else if curve::solve_cubic(&mono, 1, y, &mut roots, 0., 1.) == 1 {
								curve::point_at(&mono, roots[0]).x
							} else {
								(mono[0] + mono[6]) / 2.
							};
							intercepts.push(x);
						}
					}
				}
			}
			if intercepts.len() > 1 {
				intercepts.sort_by(|a, b| a.partial_cmp(b).unwrap());
				point.x = (intercepts[0] + intercepts[1]) / 2.;
			}
		}
		point
	}

	/// Geometric equality against another path, allowing the segment list
	/// to start at a different index.
	pub fn compare(&self, other: &Path) -> bool {
		let count = self.segments.len();
		if count != other.segments.len() || self.closed != other.closed {
			return false;
		}
		if count == 0 {
			return true;
		}
		let eps = EPS.geometric;
		let segments_match = |offset: usize| {
			(0..count).all(|i| {
				let a = &self.segments[i];
				let b = &other.segments[(i + offset) % count];
				vectors_equal(a.point, b.point, eps) && vectors_equal(a.handle_in, b.handle_in, eps) && vectors_equal(a.handle_out, b.handle_out, eps)
			})
		};
		if self.closed {
			(0..count).any(segments_match)
		} else {
			segments_match(0)
		}
	}
}

/// A list of child paths forming one compound region.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompoundPath {
	pub children: Vec<Path>,
}

/// Either a plain path or a compound path, as consumed and produced by the
/// boolean operators.
#[derive(Clone, Debug, PartialEq)]
pub enum PathItem {
	Path(Path),
	CompoundPath(CompoundPath),
}

impl PathItem {
	/// Wrap traced paths in the slimmest item shape: a plain path for a
	/// single child, a compound path otherwise.
	pub fn from_paths(paths: Vec<Path>) -> PathItem {
		let mut paths = paths;
		if paths.len() == 1 {
			PathItem::Path(paths.pop().unwrap())
		} else {
			PathItem::CompoundPath(CompoundPath { children: paths })
		}
	}

	pub fn paths(&self) -> &[Path] {
		match self {
			PathItem::Path(path) => std::slice::from_ref(path),
			PathItem::CompoundPath(compound) => &compound.children,
		}
	}

	pub fn into_paths(self) -> Vec<Path> {
		match self {
			PathItem::Path(path) => vec![path],
			PathItem::CompoundPath(compound) => compound.children,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.paths().iter().all(Path::is_empty)
	}

	/// Sum of the children's signed areas.
	pub fn area(&self) -> f64 {
		self.paths().iter().map(Path::area).sum()
	}

	pub fn bounds(&self) -> AaBb {
		let mut bounds: Option<AaBb> = None;
		for path in self.paths() {
			if !path.is_empty() {
				let path_bounds = path.bounds();
				bounds = Some(match bounds {
					Some(acc) => acc.merged(&path_bounds),
					None => path_bounds,
				});
			}
		}
		bounds.unwrap_or(AaBb {
			top: 0.,
			right: 0.,
			bottom: 0.,
			left: 0.,
		})
	}

	pub(crate) fn winding_paths(&self) -> Vec<WindingPath> {
		self.paths().iter().filter(|path| !path.is_empty()).map(Path::winding_path).collect()
	}

	/// The winding number of the region at `point`, cast along +x, or
	/// along +y when `horizontal` is set.
	pub fn winding_at(&self, point: Vector, horizontal: bool) -> i32 {
		winding::get_winding(point, &self.winding_paths(), horizontal).winding
	}

	pub fn contains(&self, point: Vector, fill_rule: FillRule) -> bool {
		if !self.bounds().expanded(EPS.geometric).contains_point(point) {
			return false;
		}
		let w = winding::get_winding(point, &self.winding_paths(), false);
		w.on_path
			|| match fill_rule {
				FillRule::EvenOdd => (w.winding_left & 1) == 1 || (w.winding_right & 1) == 1,
				FillRule::NonZero => w.winding != 0,
			}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Path {
		Path::new(
			vec![
				Segment::anchor(Vector::new(x0, y0)),
				Segment::anchor(Vector::new(x1, y0)),
				Segment::anchor(Vector::new(x1, y1)),
				Segment::anchor(Vector::new(x0, y1)),
			],
			true,
		)
	}

	#[test]
	fn square_area_and_orientation() {
		let path = square(0., 0., 100., 100.);
		assert!((path.area() - 10000.).abs() < 1e-9);
		assert!(path.is_clockwise());
		let mut reversed = path.clone();
		reversed.reverse();
		assert!((reversed.area() + 10000.).abs() < 1e-9);
		assert!(!reversed.is_clockwise());
	}

	#[test]
	fn set_clockwise_is_idempotent() {
		let mut path = square(0., 0., 10., 10.);
		path.set_clockwise(false);
		assert!(!path.is_clockwise());
		path.set_clockwise(false);
		assert!(!path.is_clockwise());
		path.set_clockwise(true);
		assert!(path.is_clockwise());
	}

	#[test]
	fn contains_square_points() {
		let path = square(0., 0., 100., 100.);
		assert!(path.contains(Vector::new(50., 50.), FillRule::NonZero));
		assert!(path.contains(Vector::new(50., 50.), FillRule::EvenOdd));
		assert!(!path.contains(Vector::new(150., 50.), FillRule::NonZero));
		assert!(!path.contains(Vector::new(-1., 50.), FillRule::NonZero));
		// On the outline.
		assert!(path.contains(Vector::new(0., 50.), FillRule::NonZero));
	}

	#[test]
	fn interior_point_of_concave_path() {
		// A "C" shape whose bounding-box center lies in the notch.
		let path = Path::new(
			vec![
				Segment::anchor(Vector::new(0., 0.)),
				Segment::anchor(Vector::new(100., 0.)),
				Segment::anchor(Vector::new(100., 20.)),
				Segment::anchor(Vector::new(20., 20.)),
				Segment::anchor(Vector::new(20., 80.)),
				Segment::anchor(Vector::new(100., 80.)),
				Segment::anchor(Vector::new(100., 100.)),
				Segment::anchor(Vector::new(0., 100.)),
			],
			true,
		);
		let point = path.interior_point();
		assert!(path.contains(point, FillRule::NonZero));
	}

	#[test]
	fn reduce_removes_zero_length_curves() {
		let mut path = Path::new(
			vec![
				Segment::anchor(Vector::new(0., 0.)),
				Segment::anchor(Vector::new(0., 0.)),
				Segment::anchor(Vector::new(100., 0.)),
				Segment::anchor(Vector::new(100., 100.)),
				Segment::anchor(Vector::new(0., 100.)),
			],
			true,
		);
		path.reduce(false);
		assert_eq!(path.segments.len(), 4);
		assert!((path.area() - 10000.).abs() < 1e-9);
	}

	#[test]
	fn compare_allows_rotated_starts() {
		let a = square(0., 0., 100., 100.);
		let mut rotated = a.clone();
		rotated.segments.rotate_left(2);
		assert!(a.compare(&rotated));
		let b = square(0., 0., 100., 99.);
		assert!(!a.compare(&b));
	}

	#[test]
	fn winding_of_nested_rings() {
		let outer = square(0., 0., 100., 100.);
		let inner = square(25., 25., 75., 75.);
		let item = PathItem::CompoundPath(CompoundPath {
			children: vec![outer, inner],
		});
		assert_eq!(item.winding_at(Vector::new(50., 50.), false), 2);
		assert_eq!(item.winding_at(Vector::new(10., 50.), false), 1);
		assert_eq!(item.winding_at(Vector::new(150., 50.), false), 0);
	}
}
