/// General-purpose numeric tolerance, used where values are compared for
/// exact coincidence (endpoint equality, degenerate coefficients).
pub const EPSILON: f64 = 1e-12;

/// Tolerance for comparing normalized direction vectors.
pub const TRIGONOMETRIC_EPSILON: f64 = 1e-8;

/// The machine epsilon of `f64` arithmetic, halved: the largest relative
/// rounding error of a single operation.
pub const MACHINE_EPSILON: f64 = 1.12e-16;

pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
	a + (b - a) * t
}

pub fn is_zero(value: f64) -> bool {
	value >= -EPSILON && value <= EPSILON
}

pub fn is_machine_zero(value: f64) -> bool {
	value >= -MACHINE_EPSILON && value <= MACHINE_EPSILON
}

/// Power-of-two factor that rescales badly conditioned coefficients into a
/// well-behaved range, or `0.` when no rescaling is needed.
fn normalization_factor(values: &[f64]) -> f64 {
	let norm = values.iter().fold(0., |acc: f64, &value| acc.max(value));
	if norm != 0. && (norm < 1e-8 || norm > 1e8) {
		(2f64).powi(-(norm.log2().round() as i32))
	} else {
		0.
	}
}

/// Split into high and low parts for error-compensated products
/// (Dekker's scheme).
fn split(value: f64) -> (f64, f64) {
	let x = value * 134217729.;
	let y = value - x;
	let hi = y + x;
	let lo = value - hi;
	(hi, lo)
}

/// `b * b - a * c`, computed with an error-compensated scheme when the two
/// products nearly cancel.
fn discriminant(a: f64, b: f64, c: f64) -> f64 {
	let mut d = b * b - a * c;
	let e = b * b + a * c;
	if d.abs() * 3. < e {
		let (a_hi, a_lo) = split(a);
		let (b_hi, b_lo) = split(b);
		let (c_hi, c_lo) = split(c);
		let p = b * b;
		let dp = (b_hi * b_hi - p + 2. * b_hi * b_lo) + b_lo * b_lo;
		let q = a * c;
		let dq = (a_hi * c_hi - q + a_hi * c_lo + a_lo * c_hi) + a_lo * c_lo;
		d = (p - q) + (dp - dq);
	}
	d
}

/// Solve `a x² + b x + c = 0` for roots within `[t_min, t_max]`, writing
/// them into `roots` and returning the count. Returns `-1` when every value
/// is a solution.
pub fn solve_quadratic(a: f64, b: f64, c: f64, roots: &mut [f64], t_min: f64, t_max: f64) -> i32 {
	let mut x1 = f64::INFINITY;
	let mut x2 = f64::INFINITY;
	if a.abs() < EPSILON {
		if b.abs() < EPSILON {
			return if c.abs() < EPSILON { -1 } else { 0 };
		}
		x1 = -c / b;
	} else {
		// Work with the form a x² - 2 b x + c, which keeps the
		// discriminant well-scaled.
		let mut a = a;
		let mut b = b * -0.5;
		let mut c = c;
		let mut d = discriminant(a, b, c);
		if d != 0. && d.abs() < MACHINE_EPSILON {
			let f = normalization_factor(&[a.abs(), b.abs(), c.abs()]);
			if f != 0. {
				a *= f;
				b *= f;
				c *= f;
				d = discriminant(a, b, c);
			}
		}
		if d >= -MACHINE_EPSILON {
			let q = if d < 0. { 0. } else { d.sqrt() };
			let r = b + if b < 0. { -q } else { q };
			// Prefer the numerically larger divisor.
			if r == 0. {
				x1 = c / a;
				x2 = -x1;
			} else {
				x1 = r / a;
				x2 = c / r;
			}
		}
	}
	let mut count = 0;
	let min_b = t_min - EPSILON;
	let max_b = t_max + EPSILON;
	if x1.is_finite() && x1 > min_b && x1 < max_b {
		roots[count] = x1.clamp(t_min, t_max);
		count += 1;
	}
	if x2 != x1 && x2.is_finite() && x2 > min_b && x2 < max_b {
		roots[count] = x2.clamp(t_min, t_max);
		count += 1;
	}
	count as i32
}

/// Solve `a x³ + b x² + c x + d = 0` for roots within `[t_min, t_max]`.
///
/// Finds one root by deflation with a Newton iteration started from
/// Kahan's bound, then solves the remaining quadratic. Writes roots into
/// `roots` and returns the count.
pub fn solve_cubic(a: f64, b: f64, c: f64, d: f64, roots: &mut [f64], t_min: f64, t_max: f64) -> i32 {
	let f = normalization_factor(&[a.abs(), b.abs(), c.abs(), d.abs()]);
	let (mut a, b, c, d) = if f != 0. { (a * f, b * f, c * f, d * f) } else { (a, b, c, d) };
	let mut x;
	let mut b1;
	let mut c2;

	// Evaluates the cubic and its derivative at x0 by Horner's scheme,
	// leaving the deflated quadratic coefficients in the first two slots.
	fn evaluate(a: f64, b: f64, c: f64, d: f64, x0: f64) -> (f64, f64, f64, f64) {
		let tmp = a * x0;
		let b1 = tmp + b;
		let c2 = b1 * x0 + c;
		let qd = (tmp + b1) * x0 + c2;
		let q = c2 * x0 + d;
		(b1, c2, qd, q)
	}

	if a.abs() < EPSILON {
		a = b;
		b1 = c;
		c2 = d;
		x = f64::INFINITY;
	} else if d.abs() < EPSILON {
		b1 = b;
		c2 = c;
		x = 0.;
	} else {
		x = -(b / a) / 3.;
		let (eb1, ec2, qd, q) = evaluate(a, b, c, d, x);
		b1 = eb1;
		c2 = ec2;
		let t = q / a;
		let r = t.abs().powf(1. / 3.);
		let s = if t < 0. { -1. } else { 1. };
		let td = -qd / a;
		// See Kahan's notes on why 1.324718... works as a bound for the
		// leftmost root.
		let rd = if td > 0. { 1.324717957244746 * r.max(td.sqrt()) } else { r };
		let mut x0 = x - s * rd;
		if x0 != x {
			loop {
				x = x0;
				let (eb1, ec2, qd, q) = evaluate(a, b, c, d, x);
				b1 = eb1;
				c2 = ec2;
				// Divide by 1 + machine epsilon to avoid stepping over
				// the root.
				x0 = if qd == 0. { x } else { x - q / qd / (1. + MACHINE_EPSILON) };
				if s * x0 <= s * x {
					break;
				}
			}
			// Adjust the quadratic coefficients when deflation lost
			// precision.
			if a.abs() * x * x > (d / x).abs() {
				c2 = -d / x;
				b1 = (c2 - c) / x;
			}
		}
	}
	let mut count = solve_quadratic(a, b1, c2, roots, t_min, t_max);
	if x.is_finite()
		&& x > t_min - EPSILON
		&& x < t_max + EPSILON
		&& (count <= 0 || (x != roots[0] && (count < 2 || x != roots[1])))
	{
		let index = count.max(0) as usize;
		roots[index] = x.clamp(t_min, t_max);
		count = count.max(0) + 1;
	}
	count
}

#[cfg(test)]
mod tests {
	use super::*;

	fn collect(roots: &[f64], count: i32) -> Vec<f64> {
		let mut out: Vec<f64> = roots[..count.max(0) as usize].to_vec();
		out.sort_by(|a, b| a.partial_cmp(b).unwrap());
		out
	}

	#[test]
	fn quadratic_two_roots() {
		let mut roots = [0.; 3];
		// (x - 0.25)(x - 0.75) = x² - x + 0.1875
		let count = solve_quadratic(1., -1., 0.1875, &mut roots, 0., 1.);
		let roots = collect(&roots, count);
		assert_eq!(roots.len(), 2);
		assert!((roots[0] - 0.25).abs() < 1e-12);
		assert!((roots[1] - 0.75).abs() < 1e-12);
	}

	#[test]
	fn quadratic_out_of_range() {
		let mut roots = [0.; 3];
		// Roots at 2 and 3, both outside [0, 1].
		let count = solve_quadratic(1., -5., 6., &mut roots, 0., 1.);
		assert_eq!(count, 0);
	}

	#[test]
	fn quadratic_linear_degenerate() {
		let mut roots = [0.; 3];
		let count = solve_quadratic(0., 2., -1., &mut roots, 0., 1.);
		assert_eq!(count, 1);
		assert!((roots[0] - 0.5).abs() < 1e-12);
	}

	#[test]
	fn cubic_three_roots() {
		let mut roots = [0.; 3];
		// (x - 0.2)(x - 0.5)(x - 0.9)
		let (r0, r1, r2) = (0.2, 0.5, 0.9);
		let b = -(r0 + r1 + r2);
		let c = r0 * r1 + r1 * r2 + r0 * r2;
		let d = -r0 * r1 * r2;
		let count = solve_cubic(1., b, c, d, &mut roots, 0., 1.);
		let roots = collect(&roots, count);
		assert_eq!(roots.len(), 3);
		assert!((roots[0] - r0).abs() < 1e-9);
		assert!((roots[1] - r1).abs() < 1e-9);
		assert!((roots[2] - r2).abs() < 1e-9);
	}

	#[test]
	fn cubic_quadratic_degenerate() {
		let mut roots = [0.; 3];
		let count = solve_cubic(0., 1., -1., 0.1875, &mut roots, 0., 1.);
		assert_eq!(count, 2);
	}

	#[test]
	fn cubic_single_root() {
		let mut roots = [0.; 3];
		// x³ - 0.125 has the single real root 0.5.
		let count = solve_cubic(1., 0., 0., -0.125, &mut roots, 0., 1.);
		let roots = collect(&roots, count);
		assert_eq!(roots.len(), 1);
		assert!((roots[0] - 0.5).abs() < 1e-9);
	}
}
