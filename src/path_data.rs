use crate::math;
use crate::path::{CompoundPath, Path, PathItem, Segment};
use crate::path_boolean::BooleanError;
use crate::vector::{vectors_equal, Vector};
use regex::Regex;

struct PathBuilder {
	paths: Vec<Path>,
	current: Vec<Segment>,
	closed: bool,
	// Where the pen rests after a closepath, for relative commands.
	last_closed_point: Vector,
}

impl PathBuilder {
	fn new() -> Self {
		PathBuilder {
			paths: Vec::new(),
			current: Vec::new(),
			closed: false,
			last_closed_point: Vector::ZERO,
		}
	}

	fn flush(&mut self) {
		if !self.current.is_empty() {
			let segments = std::mem::take(&mut self.current);
			self.paths.push(Path::new(segments, self.closed));
		}
		self.closed = false;
	}

	fn move_to(&mut self, point: Vector) {
		self.flush();
		self.current.push(Segment::anchor(point));
	}

	fn line_to(&mut self, point: Vector) {
		self.current.push(Segment::anchor(point));
	}

	fn cubic_to(&mut self, control1: Vector, control2: Vector, point: Vector) {
		if let Some(last) = self.current.last_mut() {
			last.handle_out = control1 - last.point;
		}
		self.current.push(Segment::new(point, control2 - point, Vector::ZERO));
	}

	fn quadratic_to(&mut self, control: Vector, point: Vector) {
		let start = self.current.last().map_or(point, |segment| segment.point);
		let control1 = start + (control - start) * (2. / 3.);
		let control2 = point + (control - point) * (2. / 3.);
		self.cubic_to(control1, control2, point);
	}

	fn close(&mut self) {
		if self.current.len() > 1 {
			let first = self.current[0];
			let last = *self.current.last().unwrap();
			if vectors_equal(first.point, last.point, math::EPSILON) {
				self.current[0].handle_in = last.handle_in;
				self.current.pop();
			}
		}
		if let Some(first) = self.current.first() {
			self.last_closed_point = first.point;
		}
		self.closed = true;
		self.flush();
	}

	fn current_point(&self) -> Vector {
		self.current.last().map_or(self.last_closed_point, |segment| segment.point)
	}
}

/// Parse SVG path data into a path item. Supports the M/L/H/V/C/S/Q/T/Z
/// commands in absolute and relative form; quadratic segments are
/// converted to cubics. Elliptical arcs are rejected.
pub fn path_from_path_data(d: &str) -> Result<PathItem, BooleanError> {
	let re_float = Regex::new(r"^\s*,?\s*(-?\d*(?:\d\.|\.\d|\d)\d*(?:[eE][+\-]?\d+)?)").unwrap();
	let re_cmd = Regex::new(r"^\s*([MLCSQTAZHVmlcsqtazhv])").unwrap();

	let mut i = 0;
	let mut last_cmd = 'M';
	let mut builder = PathBuilder::new();
	// Reflection state for smooth continuations.
	let mut prev_cubic_control: Option<Vector> = None;
	let mut prev_quad_control: Option<Vector> = None;

	let get_cmd = |i: &mut usize, last_cmd: char| -> Option<char> {
		if d[*i..].trim().is_empty() {
			return None;
		}
		if let Some(cap) = re_cmd.captures(&d[*i..]) {
			*i += cap[0].len();
			Some(cap[1].chars().next().unwrap())
		} else {
			match last_cmd {
				'M' => Some('L'),
				'm' => Some('l'),
				'z' | 'Z' => None,
				_ => Some(last_cmd),
			}
		}
	};

	let get_float = |i: &mut usize| -> Result<f64, BooleanError> {
		if let Some(cap) = re_float.captures(&d[*i..]) {
			*i += cap[0].len();
			Ok(cap[1].parse().unwrap())
		} else {
			Err(BooleanError::ExpectedNumber(*i))
		}
	};

	macro_rules! point {
		($i:expr) => {{
			let x = get_float($i)?;
			let y = get_float($i)?;
			Vector::new(x, y)
		}};
	}

	while let Some(cmd) = get_cmd(&mut i, last_cmd) {
		last_cmd = cmd;
		let cur = builder.current_point();
		match cmd {
			'M' => builder.move_to(point!(&mut i)),
			'm' => builder.move_to(cur + point!(&mut i)),
			'L' => builder.line_to(point!(&mut i)),
			'l' => builder.line_to(cur + point!(&mut i)),
			'H' => builder.line_to(Vector::new(get_float(&mut i)?, cur.y)),
			'h' => builder.line_to(Vector::new(cur.x + get_float(&mut i)?, cur.y)),
			'V' => builder.line_to(Vector::new(cur.x, get_float(&mut i)?)),
			'v' => builder.line_to(Vector::new(cur.x, cur.y + get_float(&mut i)?)),
			'C' | 'c' => {
				let offset = if cmd == 'c' { cur } else { Vector::ZERO };
				let c1 = offset + point!(&mut i);
				let c2 = offset + point!(&mut i);
				let p = offset + point!(&mut i);
				builder.cubic_to(c1, c2, p);
				prev_cubic_control = Some(c2);
				prev_quad_control = None;
				continue;
			}
			'S' | 's' => {
				let offset = if cmd == 's' { cur } else { Vector::ZERO };
				let c1 = prev_cubic_control.map_or(cur, |control| cur * 2. - control);
				let c2 = offset + point!(&mut i);
				let p = offset + point!(&mut i);
				builder.cubic_to(c1, c2, p);
				prev_cubic_control = Some(c2);
				prev_quad_control = None;
				continue;
			}
			'Q' | 'q' => {
				let offset = if cmd == 'q' { cur } else { Vector::ZERO };
				let control = offset + point!(&mut i);
				let p = offset + point!(&mut i);
				builder.quadratic_to(control, p);
				prev_quad_control = Some(control);
				prev_cubic_control = None;
				continue;
			}
			'T' | 't' => {
				let offset = if cmd == 't' { cur } else { Vector::ZERO };
				let control = prev_quad_control.map_or(cur, |previous| cur * 2. - previous);
				let p = offset + point!(&mut i);
				builder.quadratic_to(control, p);
				prev_quad_control = Some(control);
				prev_cubic_control = None;
				continue;
			}
			'A' | 'a' => return Err(BooleanError::UnsupportedArcCommand),
			'Z' | 'z' => builder.close(),
			_ => return Err(BooleanError::InvalidPathCommand(cmd)),
		}
		prev_cubic_control = None;
		prev_quad_control = None;
	}
	builder.flush();

	Ok(if builder.paths.len() == 1 {
		PathItem::Path(builder.paths.pop().unwrap())
	} else {
		PathItem::CompoundPath(CompoundPath { children: builder.paths })
	})
}

fn format_number(value: f64, decimals: usize) -> String {
	let formatted = format!("{:.*}", decimals, value);
	let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
	if trimmed.is_empty() || trimmed == "-" {
		"0".to_string()
	} else {
		trimmed.to_string()
	}
}

/// Serialize a path item as SVG path data, quantized to `eps`.
pub fn path_to_path_data(item: &PathItem, eps: f64) -> String {
	let decimals = if eps >= 1. { 0 } else { (-eps.log10()).ceil() as usize };
	let fmt = |v: Vector| format!("{},{}", format_number(v.x, decimals), format_number(v.y, decimals));
	let mut out = String::new();
	for path in item.paths() {
		if path.segments.is_empty() {
			continue;
		}
		if !out.is_empty() {
			out.push(' ');
		}
		out.push_str(&format!("M {}", fmt(path.segments[0].point)));
		let count = path.curve_count();
		for index in 0..count {
			let seg1 = &path.segments[index];
			let seg2 = &path.segments[(index + 1) % path.segments.len()];
			let closing = path.closed && index + 1 == count;
			if seg1.handle_out.length() < eps && seg2.handle_in.length() < eps {
				if !closing {
					out.push_str(&format!(" L {}", fmt(seg2.point)));
				}
			} else {
				out.push_str(&format!(
					" C {} {} {}",
					fmt(seg1.point + seg1.handle_out),
					fmt(seg2.point + seg2.handle_in),
					fmt(seg2.point)
				));
			}
		}
		if path.closed {
			out.push_str(" Z");
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::path_boolean::FillRule;

	#[test]
	fn parses_a_rectangle() {
		let item = path_from_path_data("M 0 0 L 100 0 L 100 100 L 0 100 Z").unwrap();
		let paths = item.paths();
		assert_eq!(paths.len(), 1);
		assert_eq!(paths[0].segments.len(), 4);
		assert!(paths[0].closed);
		assert!((item.area() - 10000.).abs() < 1e-9);
	}

	#[test]
	fn parses_cubics_and_relative_commands() {
		let item = path_from_path_data("M 0,0 C 0,55 45,100 100,100 l 0,-100 z").unwrap();
		let paths = item.paths();
		assert_eq!(paths.len(), 1);
		assert_eq!(paths[0].segments.len(), 3);
		assert!(paths[0].closed);
		assert!(item.contains(crate::vector::Vector::new(60., 50.), FillRule::NonZero));
	}

	#[test]
	fn parses_compound_paths() {
		let item = path_from_path_data("M 0 0 H 100 V 100 H 0 Z M 25 25 H 75 V 75 H 25 Z").unwrap();
		assert_eq!(item.paths().len(), 2);
	}

	#[test]
	fn implicit_lineto_after_moveto() {
		let item = path_from_path_data("M 0 0 100 0 100 100 Z").unwrap();
		assert_eq!(item.paths()[0].segments.len(), 3);
	}

	#[test]
	fn rejects_arcs() {
		assert!(matches!(
			path_from_path_data("M 0 0 A 10 10 0 0 1 20 0"),
			Err(BooleanError::UnsupportedArcCommand)
		));
	}

	#[test]
	fn round_trips_through_path_data() {
		let d = "M 0,0 L 100,0 L 100,100 L 0,100 Z";
		let item = path_from_path_data(d).unwrap();
		let out = path_to_path_data(&item, 0.001);
		let again = path_from_path_data(&out).unwrap();
		assert!((item.area() - again.area()).abs() < 1e-6);
		assert_eq!(item.paths()[0].segments.len(), again.paths()[0].segments.len());
	}

	#[test]
	fn serializes_curves() {
		let item = path_from_path_data("M 0,0 C 0,55 45,100 100,100").unwrap();
		let out = path_to_path_data(&item, 0.001);
		assert!(out.contains('C'));
		let again = path_from_path_data(&out).unwrap();
		assert_eq!(again.paths()[0].segments.len(), 2);
	}
}
