// Copyright 2024 Adam Platkevič <rflashster@gmail.com>
//
// SPDX-License-Identifier: MIT

use crate::aabb::AaBb;
use crate::curve::{self, CurveValues};
use crate::epsilons::EPS;
use crate::math;
use crate::vector::{vectors_equal, Vector};
use smallvec::SmallVec;

/// One intersection between a pair of curves, as curve times on both.
/// Overlap records come in pairs delimiting the coincident stretch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurveIntersection {
	pub t1: f64,
	pub t2: f64,
	pub overlap: bool,
}

pub type CurveIntersections = SmallVec<[CurveIntersection; 4]>;

fn coord_min(v: &CurveValues, offset: usize) -> f64 {
	v[offset].min(v[offset + 2]).min(v[offset + 4]).min(v[offset + 6])
}

fn coord_max(v: &CurveValues, offset: usize) -> f64 {
	v[offset].max(v[offset + 2]).max(v[offset + 4]).max(v[offset + 6])
}

fn values_equal(v1: &CurveValues, v2: &CurveValues, eps: f64) -> bool {
	(0..8).all(|i| (v1[i] - v2[i]).abs() < eps)
}

/// Intersection parameters of the two line segments, or `None` when the
/// lines are parallel or the intersection lies outside either segment.
pub(crate) fn line_intersection_params(p1: Vector, p2: Vector, p3: Vector, p4: Vector) -> Option<(f64, f64)> {
	let v1 = p2 - p1;
	let v2 = p4 - p3;
	let cross = v1.perp_dot(v2);
	if math::is_machine_zero(cross) {
		return None;
	}
	let dx = p1.x - p3.x;
	let dy = p1.y - p3.y;
	let u1 = (v2.x * dy - v2.y * dx) / cross;
	let u2 = (v1.x * dy - v1.y * dx) / cross;
	let u_min = -math::EPSILON;
	let u_max = 1. + math::EPSILON;
	(u_min < u1 && u1 < u_max && u_min < u2 && u2 < u_max).then(|| (u1.clamp(0., 1.), u2.clamp(0., 1.)))
}

pub(crate) fn line_intersection_point(p1: Vector, p2: Vector, p3: Vector, p4: Vector) -> Option<Vector> {
	line_intersection_params(p1, p2, p3, p4).map(|(u1, _)| p1 + (p2 - p1) * u1)
}

/// Distance from `point` to the infinite line through `origin` with
/// direction `direction`.
fn line_distance(origin: Vector, direction: Vector, point: Vector) -> f64 {
	let length = direction.length();
	if length == 0. {
		return point.distance(origin);
	}
	direction.perp_dot(point - origin).abs() / length
}

/// Curve times at which the curve meets the infinite line through `p1` and
/// `p2`: the curve is rotated so the line lies on the x-axis and the cubic
/// is solved for y = 0.
fn curve_line_roots(v: &CurveValues, p1: Vector, p2: Vector, roots: &mut [f64; 3]) -> usize {
	let direction = p2 - p1;
	if direction == Vector::ZERO {
		return 0;
	}
	let angle = (-direction.y).atan2(direction.x);
	let (sin, cos) = angle.sin_cos();
	let mut rotated = [0.; 8];
	for i in (0..8).step_by(2) {
		let x = v[i] - p1.x;
		let y = v[i + 1] - p1.y;
		rotated[i] = x * cos - y * sin;
		rotated[i + 1] = x * sin + y * cos;
	}
	curve::solve_cubic(&rotated, 1, 0., roots, 0., 1.).max(0) as usize
}

fn push_unique(out: &mut CurveIntersections, t1: f64, t2: f64, overlap: bool, tolerance: f64) {
	if out.iter().any(|hit| (hit.t1 - t1).abs() < tolerance && (hit.t2 - t2).abs() < tolerance) {
		return;
	}
	out.push(CurveIntersection { t1, t2, overlap });
}

fn add_line_intersection(v1: &CurveValues, v2: &CurveValues, out: &mut CurveIntersections) {
	let point = line_intersection_point(curve::start_point(v1), curve::end_point(v1), curve::start_point(v2), curve::end_point(v2));
	if let Some(point) = point {
		if let (Some(t1), Some(t2)) = (curve::time_of(v1, point), curve::time_of(v2, point)) {
			push_unique(out, t1, t2, false, EPS.curve_time);
		}
	}
}

fn add_curve_line_intersections(v_curve: &CurveValues, v_line: &CurveValues, flip: bool, out: &mut CurveIntersections) {
	let p1 = curve::start_point(v_line);
	let p2 = curve::end_point(v_line);
	let mut roots = [0.; 3];
	let count = curve_line_roots(v_curve, p1, p2, &mut roots);
	for &t_curve in roots.iter().take(count) {
		let point = curve::point_at(v_curve, t_curve);
		if let Some(t_line) = curve::time_of(v_line, point) {
			if flip {
				push_unique(out, t_line, t_curve, false, EPS.curve_time);
			} else {
				push_unique(out, t_curve, t_line, false, EPS.curve_time);
			}
		}
	}
}

#[derive(Clone)]
struct IntersectionSegment {
	values: CurveValues,
	start_param: f64,
	end_param: f64,
	bounding_box: AaBb,
}

impl IntersectionSegment {
	fn whole(values: &CurveValues) -> Self {
		IntersectionSegment {
			values: *values,
			start_param: 0.,
			end_param: 1.,
			bounding_box: curve::bounding_box(values),
		}
	}

	fn subdivide(&self) -> [IntersectionSegment; 2] {
		let (left, right) = curve::subdivide(&self.values, 0.5);
		let mid_param = (self.start_param + self.end_param) / 2.;
		[
			IntersectionSegment {
				values: left,
				start_param: self.start_param,
				end_param: mid_param,
				bounding_box: curve::bounding_box(&left),
			},
			IntersectionSegment {
				values: right,
				start_param: mid_param,
				end_param: self.end_param,
				bounding_box: curve::bounding_box(&right),
			},
		]
	}
}

/// Curve/curve intersection by mutual bounding-box subdivision: halve both
/// curves, keep pairs of halves whose boxes still overlap, and treat a
/// piece as a line segment once its box drops below the linear threshold.
fn add_curve_curve_intersections(v1: &CurveValues, v2: &CurveValues, out: &mut CurveIntersections) {
	let mut pairs = vec![(IntersectionSegment::whole(v1), IntersectionSegment::whole(v2))];

	// Param-space dedup window for hits reported by adjacent leaf pairs.
	let dedup = 1e-4;

	let mut depth = 0;
	while !pairs.is_empty() {
		depth += 1;
		if depth > 32 {
			break;
		}
		let mut next_pairs = Vec::new();

		for (seg1, seg2) in pairs {
			if values_equal(&seg1.values, &seg2.values, EPS.geometric) {
				continue;
			}

			let linear1 = seg1.bounding_box.max_extent() <= EPS.linear;
			let linear2 = seg2.bounding_box.max_extent() <= EPS.linear;

			if linear1 && linear2 {
				let params = line_intersection_params(
					curve::start_point(&seg1.values),
					curve::end_point(&seg1.values),
					curve::start_point(&seg2.values),
					curve::end_point(&seg2.values),
				);
				if let Some((u1, u2)) = params {
					push_unique(
						out,
						math::lerp(seg1.start_param, seg1.end_param, u1),
						math::lerp(seg2.start_param, seg2.end_param, u2),
						false,
						dedup,
					);
				}
			} else {
				let subdivided1 = if linear1 { vec![seg1] } else { seg1.subdivide().to_vec() };
				let subdivided2 = if linear2 { vec![seg2] } else { seg2.subdivide().to_vec() };

				for sub1 in &subdivided1 {
					for sub2 in &subdivided2 {
						if sub1.bounding_box.overlaps(&sub2.bounding_box) {
							next_pairs.push((sub1.clone(), sub2.clone()));
						}
					}
				}
			}
		}

		pairs = next_pairs;
	}
}

/// Detect a coincident stretch of the two curves, returning the two
/// boundary time pairs of the overlap, or `None` when the curves do not
/// overlap over a positive length.
fn get_overlaps(v1: &CurveValues, v2: &CurveValues) -> Option<[[f64; 2]; 2]> {
	let time_eps = EPS.curve_time;
	let geom_eps = EPS.geometric;
	let mut straight1 = curve::is_straight(v1);
	let mut straight2 = curve::is_straight(v2);
	let mut straight_both = straight1 && straight2;
	let chord = |v: &CurveValues| (curve::end_point(v) - curve::start_point(v)).length_squared();
	let flip = chord(v1) < chord(v2);
	let (l1, l2) = if flip { (v2, v1) } else { (v1, v2) };
	let origin = curve::start_point(l1);
	let direction = curve::end_point(l1) - origin;
	// The picked line may not actually be straight, so handle positions
	// are checked against it as well before treating both as straight.
	if line_distance(origin, direction, curve::start_point(l2)) < geom_eps && line_distance(origin, direction, curve::end_point(l2)) < geom_eps {
		if !straight_both
			&& line_distance(origin, direction, Vector::new(l1[2], l1[3])) < geom_eps
			&& line_distance(origin, direction, Vector::new(l1[4], l1[5])) < geom_eps
			&& line_distance(origin, direction, Vector::new(l2[2], l2[3])) < geom_eps
			&& line_distance(origin, direction, Vector::new(l2[4], l2[5])) < geom_eps
		{
			straight1 = true;
			straight2 = true;
			straight_both = true;
		}
	} else if straight_both {
		return None;
	}
	if straight1 != straight2 {
		return None;
	}

	let values = [v1, v2];
	let mut pairs: SmallVec<[[f64; 2]; 2]> = SmallVec::new();
	for i in 0..4 {
		if pairs.len() >= 2 {
			break;
		}
		let i1 = i & 1;
		let i2 = i1 ^ 1;
		let t1 = (i >> 1) as f64;
		let endpoint = if t1 == 0. { curve::start_point(values[i2]) } else { curve::end_point(values[i2]) };
		if let Some(t2) = curve::time_of(values[i1], endpoint) {
			let pair = if i1 == 1 { [t1, t2] } else { [t2, t1] };
			// Filter out tiny overlaps.
			if pairs.is_empty() || ((pair[0] - pairs[0][0]).abs() > time_eps && (pair[1] - pairs[0][1]).abs() > time_eps) {
				pairs.push(pair);
			}
		}
	}
	if pairs.len() != 2 {
		return None;
	}
	if !straight_both {
		// The overlapping stretches must agree in their handles too.
		let o1 = curve::part(v1, pairs[0][0], pairs[1][0]);
		let o2 = curve::part(v2, pairs[0][1], pairs[1][1]);
		if (o2[2] - o1[2]).abs() > geom_eps || (o2[3] - o1[3]).abs() > geom_eps || (o2[4] - o1[4]).abs() > geom_eps || (o2[5] - o1[5]).abs() > geom_eps {
			return None;
		}
	}
	Some([pairs[0], pairs[1]])
}

/// All intersections between two cubics, including overlap boundaries and
/// coincident endpoints.
pub fn curve_intersections(v1: &CurveValues, v2: &CurveValues) -> CurveIntersections {
	let mut out = CurveIntersections::new();
	let eps = math::EPSILON;
	// Control-polygon reject.
	if !(coord_max(v1, 0) + eps > coord_min(v2, 0)
		&& coord_min(v1, 0) - eps < coord_max(v2, 0)
		&& coord_max(v1, 1) + eps > coord_min(v2, 1)
		&& coord_min(v1, 1) - eps < coord_max(v2, 1))
	{
		return out;
	}

	if let Some(pairs) = get_overlaps(v1, v2) {
		for pair in pairs {
			out.push(CurveIntersection {
				t1: pair[0],
				t2: pair[1],
				overlap: true,
			});
		}
		return out;
	}

	let straight1 = curve::is_straight(v1);
	let straight2 = curve::is_straight(v2);
	let straight = straight1 && straight2;
	let before = out.len();
	if straight {
		add_line_intersection(v1, v2, &mut out);
	} else if straight1 || straight2 {
		if straight1 {
			add_curve_line_intersections(v2, v1, true, &mut out);
		} else {
			add_curve_line_intersections(v1, v2, false, &mut out);
		}
	} else {
		add_curve_curve_intersections(v1, v2, &mut out);
	}
	// A single line/line solution is exhaustive.
	if straight && out.len() > before {
		return out;
	}

	let c1p1 = curve::start_point(v1);
	let c1p2 = curve::end_point(v1);
	let c2p1 = curve::start_point(v2);
	let c2p2 = curve::end_point(v2);
	if vectors_equal(c1p1, c2p1, eps) {
		push_unique(&mut out, 0., 0., false, EPS.curve_time);
	}
	if vectors_equal(c1p1, c2p2, eps) {
		push_unique(&mut out, 0., 1., false, EPS.curve_time);
	}
	if vectors_equal(c1p2, c2p1, eps) {
		push_unique(&mut out, 1., 0., false, EPS.curve_time);
	}
	if vectors_equal(c1p2, c2p2, eps) {
		push_unique(&mut out, 1., 1., false, EPS.curve_time);
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> CurveValues {
		curve::line_values(Vector::new(x0, y0), Vector::new(x1, y1))
	}

	#[test]
	fn crossing_diagonals() {
		let hits = curve_intersections(&line(0., 0., 100., 100.), &line(100., 0., 0., 100.));
		assert_eq!(hits.len(), 1);
		let hit = hits[0];
		assert!(!hit.overlap);
		assert!((hit.t1 - 0.5).abs() < 1e-9);
		assert!((hit.t2 - 0.5).abs() < 1e-9);
	}

	#[test]
	fn parallel_lines_do_not_intersect() {
		let hits = curve_intersections(&line(0., 0., 100., 0.), &line(0., 10., 100., 10.));
		assert!(hits.is_empty());
	}

	#[test]
	fn curve_against_line() {
		// An arch over the x-axis crossed by a horizontal line.
		let arch = curve::from_anchors(
			Vector::new(0., 0.),
			Vector::new(25., 100.),
			Vector::new(75., 100.),
			Vector::new(100., 0.),
		);
		let hits = curve_intersections(&arch, &line(0., 40., 100., 40.));
		assert_eq!(hits.len(), 2);
		for hit in hits {
			let p1 = curve::point_at(&arch, hit.t1);
			assert!((p1.y - 40.).abs() < 1e-6);
		}
	}

	#[test]
	fn curve_against_curve() {
		let a = curve::from_anchors(
			Vector::new(0., 0.),
			Vector::new(25., 100.),
			Vector::new(75., 100.),
			Vector::new(100., 0.),
		);
		let b = curve::from_anchors(
			Vector::new(0., 50.),
			Vector::new(25., -50.),
			Vector::new(75., -50.),
			Vector::new(100., 50.),
		);
		let hits = curve_intersections(&a, &b);
		assert_eq!(hits.len(), 2);
		for hit in hits {
			let p1 = curve::point_at(&a, hit.t1);
			let p2 = curve::point_at(&b, hit.t2);
			assert!(p1.distance(p2) < 1e-3);
		}
	}

	#[test]
	fn collinear_partial_overlap() {
		let hits = curve_intersections(&line(0., 0., 100., 0.), &line(50., 0., 150., 0.));
		assert_eq!(hits.len(), 2);
		assert!(hits.iter().all(|hit| hit.overlap));
		// The overlap spans [0.5, 1] on the first line and [0, 0.5] on
		// the second.
		let mut t1s: Vec<f64> = hits.iter().map(|hit| hit.t1).collect();
		t1s.sort_by(|a, b| a.partial_cmp(b).unwrap());
		assert!((t1s[0] - 0.5).abs() < 1e-9);
		assert!((t1s[1] - 1.).abs() < 1e-9);
	}

	#[test]
	fn identical_curves_overlap() {
		let v = curve::from_anchors(
			Vector::new(0., 0.),
			Vector::new(30., 40.),
			Vector::new(70., 40.),
			Vector::new(100., 0.),
		);
		let hits = curve_intersections(&v, &v.clone());
		assert_eq!(hits.len(), 2);
		assert!(hits.iter().all(|hit| hit.overlap));
	}

	#[test]
	fn shared_endpoint() {
		let hits = curve_intersections(&line(0., 0., 100., 0.), &line(100., 0., 100., 100.));
		assert_eq!(hits.len(), 1);
		assert_eq!((hits[0].t1, hits[0].t2), (1., 0.));
	}

	#[test]
	fn anti_parallel_overlap() {
		let hits = curve_intersections(&line(0., 0., 100., 0.), &line(150., 0., 50., 0.));
		assert_eq!(hits.len(), 2);
		assert!(hits.iter().all(|hit| hit.overlap));
	}
}
