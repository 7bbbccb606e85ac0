// Copyright 2024 Adam Platkevič <rflashster@gmail.com>
//
// SPDX-License-Identifier: MIT

use crate::aabb::AaBb;
use crate::epsilons::EPS;
use crate::math;
use crate::vector::{vectors_equal, Vector};
use smallvec::{smallvec, SmallVec};

/// A cubic Bézier as the flat value array `[x0, y0, x1, y1, x2, y2, x3, y3]`:
/// the first anchor, the outgoing handle position, the incoming handle
/// position of the second anchor, and the second anchor.
pub type CurveValues = [f64; 8];

pub fn from_anchors(p0: Vector, p1: Vector, p2: Vector, p3: Vector) -> CurveValues {
	[p0.x, p0.y, p1.x, p1.y, p2.x, p2.y, p3.x, p3.y]
}

pub fn line_values(p0: Vector, p3: Vector) -> CurveValues {
	[p0.x, p0.y, p0.x, p0.y, p3.x, p3.y, p3.x, p3.y]
}

pub fn start_point(v: &CurveValues) -> Vector {
	Vector::new(v[0], v[1])
}

pub fn end_point(v: &CurveValues) -> Vector {
	Vector::new(v[6], v[7])
}

pub fn point_at(v: &CurveValues, t: f64) -> Vector {
	if t == 0. {
		return start_point(v);
	}
	if t == 1. {
		return end_point(v);
	}
	let cx = 3. * (v[2] - v[0]);
	let bx = 3. * (v[4] - v[2]) - cx;
	let ax = v[6] - v[0] - cx - bx;
	let cy = 3. * (v[3] - v[1]);
	let by = 3. * (v[5] - v[3]) - cy;
	let ay = v[7] - v[1] - cy - by;
	Vector::new(((ax * t + bx) * t + cx) * t + v[0], ((ay * t + by) * t + cy) * t + v[1])
}

/// The non-normalized derivative at `t`. Zero-length handles at the curve
/// ends would yield a zero vector there; fall back to the direction between
/// the surrounding control points instead.
pub fn tangent_at(v: &CurveValues, t: f64) -> Vector {
	let t_min = EPS.curve_time;
	let t_max = 1. - t_min;
	let cx = 3. * (v[2] - v[0]);
	let bx = 3. * (v[4] - v[2]) - cx;
	let ax = v[6] - v[0] - cx - bx;
	let cy = 3. * (v[3] - v[1]);
	let by = 3. * (v[5] - v[3]) - cy;
	let ay = v[7] - v[1] - cy - by;
	let (mut x, mut y) = if t < t_min {
		(cx, cy)
	} else if t > t_max {
		(3. * (v[6] - v[4]), 3. * (v[7] - v[5]))
	} else {
		((3. * ax * t + 2. * bx) * t + cx, (3. * ay * t + 2. * by) * t + cy)
	};
	if x == 0. && y == 0. && (t < t_min || t > t_max) {
		x = v[4] - v[2];
		y = v[5] - v[3];
	}
	Vector::new(x, y)
}

pub fn subdivide(v: &CurveValues, t: f64) -> (CurveValues, CurveValues) {
	let p0 = Vector::new(v[0], v[1]);
	let p1 = Vector::new(v[2], v[3]);
	let p2 = Vector::new(v[4], v[5]);
	let p3 = Vector::new(v[6], v[7]);
	let p01 = p0.lerp(p1, t);
	let p12 = p1.lerp(p2, t);
	let p23 = p2.lerp(p3, t);
	let p012 = p01.lerp(p12, t);
	let p123 = p12.lerp(p23, t);
	let p = p012.lerp(p123, t);
	(from_anchors(p0, p01, p012, p), from_anchors(p, p123, p23, p3))
}

/// The sub-curve covering the curve-time range `[from, to]`, reversed when
/// `from > to`.
pub fn part(v: &CurveValues, from: f64, to: f64) -> CurveValues {
	let flip = from > to;
	let (from, to) = if flip { (to, from) } else { (from, to) };
	let mut v = *v;
	if from > 0. {
		v = subdivide(&v, from).1;
	}
	if to < 1. {
		v = subdivide(&v, (to - from) / (1. - from)).0;
	}
	if flip {
		[v[6], v[7], v[4], v[5], v[2], v[3], v[0], v[1]]
	} else {
		v
	}
}

fn eval_cubic_1d(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
	let p01 = math::lerp(p0, p1, t);
	let p12 = math::lerp(p1, p2, t);
	let p23 = math::lerp(p2, p3, t);
	let p012 = math::lerp(p01, p12, t);
	let p123 = math::lerp(p12, p23, t);
	math::lerp(p012, p123, t)
}

fn cubic_bounding_interval(p0: f64, p1: f64, p2: f64, p3: f64) -> (f64, f64) {
	let mut min = p0.min(p3);
	let mut max = p0.max(p3);

	let a = 3. * (-p0 + 3. * p1 - 3. * p2 + p3);
	let b = 6. * (p0 - 2. * p1 + p2);
	let c = 3. * (p1 - p0);
	let d = b * b - 4. * a * c;

	if d < 0. || a == 0. {
		return (min, max);
	}

	let sqrt_d = d.sqrt();

	let t0 = (-b - sqrt_d) / (2. * a);
	if 0. < t0 && t0 < 1. {
		let x0 = eval_cubic_1d(p0, p1, p2, p3, t0);
		min = min.min(x0);
		max = max.max(x0);
	}

	let t1 = (-b + sqrt_d) / (2. * a);
	if 0. < t1 && t1 < 1. {
		let x1 = eval_cubic_1d(p0, p1, p2, p3, t1);
		min = min.min(x1);
		max = max.max(x1);
	}

	(min, max)
}

pub fn bounding_box(v: &CurveValues) -> AaBb {
	let (left, right) = cubic_bounding_interval(v[0], v[2], v[4], v[6]);
	let (top, bottom) = cubic_bounding_interval(v[1], v[3], v[5], v[7]);
	AaBb { top, right, bottom, left }
}

pub fn has_handles(v: &CurveValues) -> bool {
	!(v[2] == v[0] && v[3] == v[1] && v[4] == v[6] && v[5] == v[7])
}

/// Whether the curve is, within tolerances, a straight line from its first
/// to its second anchor: zero handles, or handles collinear with the chord
/// and pointing inwards along it.
pub fn is_straight(v: &CurveValues) -> bool {
	let p1 = start_point(v);
	let p2 = end_point(v);
	let h1 = Vector::new(v[2], v[3]) - p1;
	let h2 = Vector::new(v[4], v[5]) - p2;
	if h1 == Vector::ZERO && h2 == Vector::ZERO {
		return true;
	}
	let chord = p2 - p1;
	if chord == Vector::ZERO {
		return false;
	}
	if vectors_collinear(chord, h1) && vectors_collinear(chord, h2) {
		let d = chord.length();
		if chord.perp_dot(h1).abs() / d < EPS.geometric && chord.perp_dot(h2).abs() / d < EPS.geometric {
			let div = chord.dot(chord);
			let s1 = chord.dot(h1) / div;
			let s2 = chord.dot(h2) / div;
			return (0. ..=1.).contains(&s1) && (-1. ..=0.).contains(&s2);
		}
	}
	false
}

pub fn vectors_collinear(a: Vector, b: Vector) -> bool {
	a.perp_dot(b).abs() <= (a.length_squared() * b.length_squared()).sqrt() * math::TRIGONOMETRIC_EPSILON
}

/// Signed area between the curve and the chord back to the origin, per
/// Green's theorem over the Bernstein basis. Summed around a closed path
/// this gives the enclosed area, positive for clockwise paths in a
/// y-down coordinate system.
pub fn signed_area(v: &CurveValues) -> f64 {
	let s = |a: usize, b: usize| v[a] * v[b + 1] - v[b] * v[a + 1];
	let s01 = s(0, 2);
	let s23 = s(4, 6);
	let s02 = s(0, 4);
	let s12 = s(2, 4);
	let s13 = s(2, 6);
	let s03 = s(0, 6);
	0.3 * (s01 + s23) + 0.15 * (s02 + s12 + s13) + 0.05 * s03
}

fn polygon_lengths(v: &CurveValues) -> (f64, f64) {
	let p0 = Vector::new(v[0], v[1]);
	let p1 = Vector::new(v[2], v[3]);
	let p2 = Vector::new(v[4], v[5]);
	let p3 = Vector::new(v[6], v[7]);
	let polygon = p0.distance(p1) + p1.distance(p2) + p2.distance(p3);
	let chord = p0.distance(p3);
	(polygon, chord)
}

fn flat_enough(polygon: f64, chord: f64) -> bool {
	polygon - chord < 1e-9 * (1. + polygon)
}

fn length_recursive(v: &CurveValues, depth: u32) -> f64 {
	let (polygon, chord) = polygon_lengths(v);
	if depth == 0 || flat_enough(polygon, chord) {
		(polygon + chord) / 2.
	} else {
		let (left, right) = subdivide(v, 0.5);
		length_recursive(&left, depth - 1) + length_recursive(&right, depth - 1)
	}
}

pub fn length(v: &CurveValues) -> f64 {
	length_recursive(v, 16)
}

pub fn has_length(v: &CurveValues, eps: f64) -> bool {
	length(v) > eps
}

fn time_at_recursive(v: &CurveValues, remaining: &mut f64, t0: f64, t1: f64, depth: u32) -> Option<f64> {
	let (polygon, chord) = polygon_lengths(v);
	if depth == 0 || flat_enough(polygon, chord) {
		let len = (polygon + chord) / 2.;
		if *remaining <= len {
			return Some(if len == 0. { t0 } else { t0 + (t1 - t0) * (*remaining / len) });
		}
		*remaining -= len;
		None
	} else {
		let mid = (t0 + t1) / 2.;
		let (left, right) = subdivide(v, 0.5);
		time_at_recursive(&left, remaining, t0, mid, depth - 1).or_else(|| time_at_recursive(&right, remaining, mid, t1, depth - 1))
	}
}

/// Inverts arc length: the curve time at which `offset` of the curve's
/// length has been traversed.
pub fn time_at(v: &CurveValues, offset: f64) -> f64 {
	if offset <= 0. {
		return 0.;
	}
	let mut remaining = offset;
	time_at_recursive(v, &mut remaining, 0., 1., 16).unwrap_or(1.)
}

/// The curve time of `point` on the curve, or `None` when the point does
/// not lie on it. Endpoints are matched first with a tight tolerance, the
/// curve interior with the geometric one.
pub fn time_of(v: &CurveValues, point: Vector) -> Option<f64> {
	let p0 = start_point(v);
	let p3 = end_point(v);
	if vectors_equal(point, p0, math::EPSILON) {
		return Some(0.);
	}
	if vectors_equal(point, p3, math::EPSILON) {
		return Some(1.);
	}
	let coords = [point.x, point.y];
	let mut roots = [0.; 3];
	for coord in 0..2 {
		let count = solve_cubic(v, coord, coords[coord], &mut roots, 0., 1.);
		for &u in roots.iter().take(count.max(0) as usize) {
			if vectors_equal(point, point_at(v, u), EPS.geometric) {
				return Some(u);
			}
		}
	}
	if vectors_equal(point, p0, EPS.geometric) {
		Some(0.)
	} else if vectors_equal(point, p3, EPS.geometric) {
		Some(1.)
	} else {
		None
	}
}

/// Solve for the curve times where the given coordinate (`0` = x, `1` = y)
/// equals `value`.
pub fn solve_cubic(v: &CurveValues, coord: usize, value: f64, roots: &mut [f64], t_min: f64, t_max: f64) -> i32 {
	let v0 = v[coord];
	let v1 = v[coord + 2];
	let v2 = v[coord + 4];
	let v3 = v[coord + 6];
	if (v0 < value && v3 < value && v1 < value && v2 < value) || (v0 > value && v3 > value && v1 > value && v2 > value) {
		return 0;
	}
	let c = 3. * (v1 - v0);
	let b = 3. * (v2 - v1) - c;
	let a = v3 - v0 - c - b;
	math::solve_cubic(a, b, c, v0 - value, roots, t_min, t_max)
}

/// Split the curve into pieces monotone in the given ordinate (`y` by
/// default, `x` when `horizontal`), cutting at the derivative roots.
/// Yields one to three pieces.
pub fn mono_curves(v: &CurveValues, horizontal: bool) -> SmallVec<[CurveValues; 3]> {
	let io = if horizontal { 0 } else { 1 };
	let o0 = v[io];
	let o1 = v[io + 2];
	let o2 = v[io + 4];
	let o3 = v[io + 6];
	if ((o0 >= o1) == (o1 >= o2) && (o1 >= o2) == (o2 >= o3)) || is_straight(v) {
		return smallvec![*v];
	}
	let a = 3. * (o1 - o2) - o0 + o3;
	let b = 2. * (o0 + o2) - 4. * o1;
	let c = o1 - o0;
	let t_min = EPS.curve_time;
	let mut roots = [0.; 3];
	let n = math::solve_quadratic(a, b, c, &mut roots, t_min, 1. - t_min);
	if n < 1 {
		return smallvec![*v];
	}
	let mut curves = SmallVec::new();
	roots[..n as usize].sort_by(|a, b| a.partial_cmp(b).unwrap());
	let t = roots[0];
	let (first, rest) = subdivide(v, t);
	curves.push(first);
	if n > 1 {
		let (middle, last) = subdivide(&rest, (roots[1] - t) / (1. - t));
		curves.push(middle);
		curves.push(last);
	} else {
		curves.push(rest);
	}
	curves
}

/// The two curve times at which a cubic crosses itself, when it contains a
/// loop. Uses the discriminant classification of the implicit form
/// (Loop–Blinn); only loops with both parameters inside `(0, 1)` count.
pub fn self_intersection(v: &CurveValues) -> Option<(f64, f64)> {
	let (x0, y0) = (v[0], v[1]);
	let (x1, y1) = (v[2], v[3]);
	let (x2, y2) = (v[4], v[5]);
	let (x3, y3) = (v[6], v[7]);
	let a1 = x0 * (y3 - y2) + y0 * (x2 - x3) + x3 * y2 - y3 * x2;
	let a2 = x1 * (y0 - y3) + y1 * (x3 - x0) + x0 * y3 - y0 * x3;
	let a3 = x2 * (y1 - y0) + y2 * (x0 - x1) + x1 * y0 - y1 * x0;
	let d3 = 3. * a3;
	let d2 = d3 - a2;
	let d1 = d2 - a2 + a1;
	// Normalize to keep the epsilon comparisons scale-independent.
	let l = (d1 * d1 + d2 * d2 + d3 * d3).sqrt();
	let s = if l != 0. { 1. / l } else { 0. };
	let d1 = d1 * s;
	let d2 = d2 * s;
	let d3 = d3 * s;
	if math::is_zero(d1) {
		return None;
	}
	let d = 3. * d2 * d2 - 4. * d1 * d3;
	if d >= 0. {
		return None;
	}
	let f1 = (-d).sqrt();
	let f2 = 2. * d1;
	let t1 = (d2 + f1) / f2;
	let t2 = (d2 - f1) / f2;
	(t1 > 0. && t1 < 1. && t2 > 0. && t2 < 1.).then(|| if t1 < t2 { (t1, t2) } else { (t2, t1) })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn subdivision_preserves_endpoints() {
		let v = from_anchors(
			Vector::new(0., 0.),
			Vector::new(30., 60.),
			Vector::new(70., -20.),
			Vector::new(100., 40.),
		);
		let (left, right) = subdivide(&v, 0.3);
		assert_eq!(start_point(&left), start_point(&v));
		assert_eq!(end_point(&right), end_point(&v));
		let split = point_at(&v, 0.3);
		assert!(end_point(&left).distance(split) < 1e-9);
		assert!(start_point(&right).distance(split) < 1e-9);
	}

	#[test]
	fn part_matches_subdivision() {
		let v = from_anchors(
			Vector::new(0., 0.),
			Vector::new(10., 80.),
			Vector::new(90., 80.),
			Vector::new(100., 0.),
		);
		let piece = part(&v, 0.25, 0.75);
		assert!(start_point(&piece).distance(point_at(&v, 0.25)) < 1e-9);
		assert!(end_point(&piece).distance(point_at(&v, 0.75)) < 1e-9);
	}

	#[test]
	fn line_area_matches_shoelace() {
		let v = line_values(Vector::new(1., 1.), Vector::new(3., 2.));
		let shoelace = (1. * 2. - 3. * 1.) / 2.;
		assert!((signed_area(&v) - shoelace).abs() < 1e-12);
	}

	#[test]
	fn straight_line_length_is_chord() {
		let v = line_values(Vector::new(0., 0.), Vector::new(30., 40.));
		assert!((length(&v) - 50.).abs() < 1e-6);
	}

	#[test]
	fn quarter_circle_length() {
		const K: f64 = 0.5522847498307936;
		let v = from_anchors(
			Vector::new(1., 0.),
			Vector::new(1., K),
			Vector::new(K, 1.),
			Vector::new(0., 1.),
		);
		assert!((length(&v) - std::f64::consts::FRAC_PI_2).abs() < 1e-2);
	}

	#[test]
	fn time_at_midpoint_of_symmetric_curve() {
		let v = from_anchors(
			Vector::new(0., 0.),
			Vector::new(25., 50.),
			Vector::new(75., 50.),
			Vector::new(100., 0.),
		);
		let half = length(&v) / 2.;
		let t = time_at(&v, half);
		assert!((t - 0.5).abs() < 1e-3);
	}

	#[test]
	fn time_of_finds_interior_points() {
		let v = from_anchors(
			Vector::new(0., 0.),
			Vector::new(40., 90.),
			Vector::new(60., 90.),
			Vector::new(100., 0.),
		);
		for &t in &[0.0, 0.2, 0.5, 0.8, 1.0] {
			let point = point_at(&v, t);
			let found = time_of(&v, point).expect("point must be on the curve");
			assert!(point_at(&v, found).distance(point) < 1e-6);
		}
		assert_eq!(time_of(&v, Vector::new(50., 200.)), None);
	}

	#[test]
	fn mono_decomposition_splits_at_extrema() {
		// y runs 0 → 200 → -100 → 100: two interior y-extrema.
		let v = from_anchors(
			Vector::new(0., 0.),
			Vector::new(50., 200.),
			Vector::new(50., -100.),
			Vector::new(100., 100.),
		);
		let pieces = mono_curves(&v, false);
		assert_eq!(pieces.len(), 3);
		for pair in pieces.windows(2) {
			assert!(end_point(&pair[0]).distance(start_point(&pair[1])) < 1e-9);
		}
		let straight = line_values(Vector::new(0., 0.), Vector::new(10., 10.));
		assert_eq!(mono_curves(&straight, false).len(), 1);
	}

	#[test]
	fn loop_self_intersection() {
		// Symmetric about x = 50, so the double point lies on that axis
		// and the two curve times mirror each other.
		let v = from_anchors(
			Vector::new(0., 0.),
			Vector::new(140., 100.),
			Vector::new(-40., 100.),
			Vector::new(100., 0.),
		);
		let (t1, t2) = self_intersection(&v).expect("curve has a loop");
		assert!(t1 < t2);
		assert!((t1 + t2 - 1.).abs() < 1e-9);
		assert!(point_at(&v, t1).distance(point_at(&v, t2)) < 1e-6);
		let arch = from_anchors(
			Vector::new(0., 0.),
			Vector::new(30., 60.),
			Vector::new(70., 60.),
			Vector::new(100., 0.),
		);
		assert_eq!(self_intersection(&arch), None);
	}

	#[test]
	fn straightness() {
		assert!(is_straight(&line_values(Vector::new(0., 0.), Vector::new(10., 5.))));
		// Handles collinear with the chord and pointing inwards.
		let inward = from_anchors(
			Vector::new(0., 0.),
			Vector::new(2., 1.),
			Vector::new(8., 4.),
			Vector::new(10., 5.),
		);
		assert!(is_straight(&inward));
		let curved = from_anchors(
			Vector::new(0., 0.),
			Vector::new(2., 5.),
			Vector::new(8., 4.),
			Vector::new(10., 5.),
		);
		assert!(!is_straight(&curved));
	}
}
