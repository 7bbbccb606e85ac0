use crate::curve::{self, CurveValues};
use crate::epsilons::EPS;
use crate::vector::Vector;
use smallvec::{smallvec, SmallVec};

/// The winding contribution at a sampled point.
///
/// `winding_left` / `winding_right` are the absolute ray-cast sums counted
/// just left and just right of the sample abscissa. `winding` folds them
/// into the operator domain `{0, 1, 2}`: zero stays zero, odd sums map to
/// one, even non-zero sums map to two. `contour` is set when exactly one
/// side is wound, i.e. the point lies on the outline of the combined
/// region rather than between two filled areas.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Winding {
	pub winding: i32,
	pub winding_left: i32,
	pub winding_right: i32,
	pub contour: bool,
	pub on_path: bool,
}

/// One path's curves as consumed by the ray caster, tagged with the
/// orientation and closedness the on-path fallback needs.
#[derive(Clone, Debug)]
pub struct WindingPath {
	pub curves: Vec<CurveValues>,
	pub clockwise: bool,
	pub closed: bool,
}

fn map_winding(w: i32) -> i32 {
	if w == 0 {
		0
	} else {
		2 - (w.abs() % 2)
	}
}

struct Ray {
	ia: usize,
	io: usize,
	horizontal: bool,
	dont_flip: bool,
	po: f64,
	pa_l: f64,
	pa_r: f64,
	winding_left: i32,
	winding_right: i32,
	path_winding_left: i32,
	path_winding_right: i32,
	on_path: bool,
	on_any_path: bool,
	v_prev: CurveValues,
}

impl Ray {
	/// Accumulate the winding of one ordinate-monotone piece. Returns true
	/// when the cast should be retried with the flipped direction.
	fn add_winding(&mut self, v: &CurveValues) -> bool {
		let io = self.io;
		let ia = self.ia;
		let o0 = v[io];
		let o3 = v[io + 6];
		if self.po < o0.min(o3) || self.po > o0.max(o3) {
			return false;
		}
		let a0 = v[ia];
		let a1 = v[ia + 2];
		let a2 = v[ia + 4];
		let a3 = v[ia + 6];
		if o0 == o3 {
			// A horizontal piece contributes no winding itself, but the
			// ray may graze along it. Bail out without updating v_prev so
			// the next non-horizontal piece still sees its predecessor.
			if (a0 < self.pa_r && a3 > self.pa_l) || (a3 < self.pa_r && a0 > self.pa_l) {
				self.on_path = true;
			}
			return false;
		}
		let mut roots = [0.; 3];
		let t = if self.po == o0 {
			0.
		} else if self.po == o3 {
			1.
		} else if self.pa_l > a0.max(a1).max(a2).max(a3) || self.pa_r < a0.min(a1).min(a2).min(a3) {
			1.
		} else if curve::solve_cubic(v, io, self.po, &mut roots, 0., 1.) > 0 {
			roots[0]
		} else {
			1.
		};
		let a = if t == 0. {
			a0
		} else if t == 1. {
			a3
		} else {
			let point = curve::point_at(v, t);
			if self.horizontal {
				point.y
			} else {
				point.x
			}
		};
		let winding = if o0 > o3 { 1 } else { -1 };
		let winding_prev = if self.v_prev[io] > self.v_prev[io + 6] { 1 } else { -1 };
		let a3_prev = self.v_prev[ia + 6];
		if self.po != o0 {
			// Standard case, the piece is not crossed at its start.
			if a < self.pa_l {
				self.path_winding_left += winding;
			} else if a > self.pa_r {
				self.path_winding_right += winding;
			} else {
				self.on_path = true;
				self.path_winding_left += winding;
				self.path_winding_right += winding;
			}
		} else if winding != winding_prev {
			// Crossed at the start with the ordinate direction reversing:
			// the previous piece's contribution has to be canceled.
			if a0 < self.pa_l {
				self.path_winding_left += winding;
			} else if a0 > self.pa_r {
				self.path_winding_right += winding;
			}
		} else if a0 != a3_prev {
			// A horizontal piece sat between this piece and the previous
			// non-horizontal one; account for the side it skipped.
			if a3_prev < self.pa_r && a > self.pa_r {
				self.path_winding_right += winding;
				self.on_path = true;
			} else if a3_prev > self.pa_l && a < self.pa_l {
				self.path_winding_left += winding;
				self.on_path = true;
			}
		}
		self.v_prev = *v;
		// A hit inside the band with the tangent parallel to the ray
		// cannot be classified reliably; ask for a flipped re-cast.
		!self.dont_flip && a > self.pa_l && a < self.pa_r && {
			let tangent = curve::tangent_at(v, t);
			let component = if self.io == 0 { tangent.x } else { tangent.y };
			component == 0.
		}
	}

	fn handle_curve(&mut self, v: &CurveValues) -> bool {
		let io = self.io;
		let o0 = v[io];
		let o1 = v[io + 2];
		let o2 = v[io + 4];
		let o3 = v[io + 6];
		if self.po <= o0.max(o1).max(o2).max(o3) && self.po >= o0.min(o1).min(o2).min(o3) {
			let ia = self.ia;
			let a0 = v[ia];
			let a1 = v[ia + 2];
			let a2 = v[ia + 4];
			let a3 = v[ia + 6];
			// A curve entirely to one side of the abscissa band can be
			// treated as monotone without decomposing it.
			let pieces: SmallVec<[CurveValues; 3]> = if self.pa_l > a0.max(a1).max(a2).max(a3) || self.pa_r < a0.min(a1).min(a2).min(a3) {
				smallvec![*v]
			} else {
				curve::mono_curves(v, self.horizontal)
			};
			for piece in &pieces {
				if self.add_winding(piece) {
					return true;
				}
			}
		}
		false
	}
}

/// Cast an axis-aligned ray from `point` and accumulate winding numbers
/// against the given curves. The ray runs along +x; with `horizontal` set
/// it runs along +y instead (used when the sampled curve is itself nearly
/// horizontal).
pub fn get_winding(point: Vector, paths: &[WindingPath], horizontal: bool) -> Winding {
	get_winding_impl(point, paths, horizontal, false)
}

fn get_winding_impl(point: Vector, paths: &[WindingPath], horizontal: bool, dont_flip: bool) -> Winding {
	let ia = if horizontal { 1 } else { 0 };
	let io = ia ^ 1;
	let pv = [point.x, point.y];
	let pa = pv[ia];
	let po = pv[io];

	let mut ray = Ray {
		ia,
		io,
		horizontal,
		dont_flip,
		po,
		pa_l: pa - EPS.winding,
		pa_r: pa + EPS.winding,
		winding_left: 0,
		winding_right: 0,
		path_winding_left: 0,
		path_winding_right: 0,
		on_path: false,
		on_any_path: false,
		v_prev: [0.; 8],
	};

	for path in paths {
		if path.curves.is_empty() {
			continue;
		}
		// An open path is treated as closed by a straight joint from its
		// last to its first anchor.
		let mut v_close = None;
		if !path.closed {
			let last = path.curves.last().unwrap();
			let first = &path.curves[0];
			let vc = curve::line_values(curve::end_point(last), curve::start_point(first));
			v_close = Some(vc);
		}
		// Seed v_prev with the last non-horizontal curve of the path; the
		// closing joint qualifies when it is not horizontal itself.
		let mut v_prev = v_close.filter(|vc| vc[io] != vc[io + 6]);
		if v_prev.is_none() {
			v_prev = Some(path.curves[0]);
			for v2 in path.curves.iter().rev() {
				if v2[io] != v2[io + 6] {
					v_prev = Some(*v2);
					break;
				}
			}
		}
		ray.v_prev = v_prev.unwrap();

		let count = path.curves.len();
		for (i, v) in path.curves.iter().enumerate() {
			if ray.handle_curve(v) {
				return get_winding_impl(point, paths, !horizontal, true);
			}
			if i + 1 == count {
				if let Some(vc) = v_close {
					if ray.handle_curve(&vc) {
						return get_winding_impl(point, paths, !horizontal, true);
					}
				}
				if ray.on_path && ray.path_winding_left == 0 && ray.path_winding_right == 0 {
					// The point lies on this path's outline and the
					// windings canceled: count the path as if the point
					// was inside it.
					let w = if path.clockwise != horizontal { 1 } else { -1 };
					ray.path_winding_left = w;
					ray.path_winding_right = w;
				}
				ray.winding_left += ray.path_winding_left;
				ray.winding_right += ray.path_winding_right;
				ray.path_winding_left = 0;
				ray.path_winding_right = 0;
				if ray.on_path {
					ray.on_any_path = true;
					ray.on_path = false;
				}
			}
		}
	}

	let left = ray.winding_left.abs();
	let right = ray.winding_right.abs();
	Winding {
		winding: map_winding(left).max(map_winding(right)),
		winding_left: left,
		winding_right: right,
		contour: (left != 0) != (right != 0),
		on_path: ray.on_any_path,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn square_path(x0: f64, y0: f64, x1: f64, y1: f64, clockwise: bool) -> WindingPath {
		let corners = if clockwise {
			[(x0, y0), (x1, y0), (x1, y1), (x0, y1)]
		} else {
			[(x0, y0), (x0, y1), (x1, y1), (x1, y0)]
		};
		let curves = (0..4)
			.map(|i| {
				let (ax, ay) = corners[i];
				let (bx, by) = corners[(i + 1) % 4];
				curve::line_values(Vector::new(ax, ay), Vector::new(bx, by))
			})
			.collect();
		WindingPath {
			curves,
			clockwise,
			closed: true,
		}
	}

	#[test]
	fn inside_and_outside() {
		let paths = [square_path(0., 0., 100., 100., true)];
		let inside = get_winding(Vector::new(50., 50.), &paths, false);
		assert_eq!(inside.winding, 1);
		assert!(!inside.contour);
		assert!(!inside.on_path);
		let outside = get_winding(Vector::new(150., 50.), &paths, false);
		assert_eq!(outside.winding, 0);
		assert!(!outside.on_path);
	}

	#[test]
	fn orientation_does_not_change_magnitude() {
		let cw = [square_path(0., 0., 100., 100., true)];
		let ccw = [square_path(0., 0., 100., 100., false)];
		assert_eq!(get_winding(Vector::new(50., 50.), &cw, false).winding, 1);
		assert_eq!(get_winding(Vector::new(50., 50.), &ccw, false).winding, 1);
	}

	#[test]
	fn on_vertical_edge() {
		let paths = [square_path(0., 0., 100., 100., true)];
		let w = get_winding(Vector::new(0., 50.), &paths, false);
		assert!(w.on_path);
		assert_eq!(w.winding, 1);
		assert!(w.contour);
	}

	#[test]
	fn on_horizontal_edge() {
		let paths = [square_path(0., 0., 100., 100., true)];
		let w = get_winding(Vector::new(50., 0.), &paths, false);
		assert!(w.on_path);
		assert_eq!(w.winding, 1);
	}

	#[test]
	fn nested_squares_accumulate() {
		let paths = [square_path(0., 0., 100., 100., true), square_path(25., 25., 75., 75., true)];
		assert_eq!(get_winding(Vector::new(50., 50.), &paths, false).winding, 2);
		assert_eq!(get_winding(Vector::new(10., 50.), &paths, false).winding, 1);
	}

	#[test]
	fn opposite_rings_cancel() {
		let paths = [square_path(0., 0., 100., 100., true), square_path(25., 25., 75., 75., false)];
		assert_eq!(get_winding(Vector::new(50., 50.), &paths, false).winding, 0);
		assert_eq!(get_winding(Vector::new(10., 50.), &paths, false).winding, 1);
	}

	#[test]
	fn vertical_ray_on_horizontal_chain() {
		let paths = [square_path(0., 0., 100., 100., true)];
		// Casting along +y from inside must agree with the +x cast.
		assert_eq!(get_winding(Vector::new(50., 50.), &paths, true).winding, 1);
	}
}
