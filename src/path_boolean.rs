// Copyright 2024 Adam Platkevič <rflashster@gmail.com>
//
// SPDX-License-Identifier: MIT

use crate::aabb::AaBb;
use crate::curve::{self, CurveValues};
use crate::curve_intersections::{curve_intersections, line_intersection_point};
use crate::epsilons::EPS;
use crate::path::{CompoundPath, Path, PathItem, Segment};
use crate::quad_tree::QuadTree;
use crate::vector::{vectors_equal, Vector};
use crate::winding::{get_winding, Winding, WindingPath};
use rustc_hash::FxHashSet;
use slotmap::{new_key_type, SlotMap};
use thiserror::Error;

new_key_type! {
	pub(crate) struct SegmentKey;
	pub(crate) struct LocationKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathBooleanOperation {
	Union,
	Difference,
	Intersection,
	Exclusion,
	Division,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRule {
	NonZero,
	EvenOdd,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BooleanError {
	#[error("invalid path command: {0}")]
	InvalidPathCommand(char),
	#[error("elliptical arcs are not supported, convert them to cubics first")]
	UnsupportedArcCommand,
	#[error("expected a number in path data at byte {0}")]
	ExpectedNumber(usize),
}

/// Which winding numbers an operation admits. The trace-side table works
/// on the folded winding domain `{0, 1, 2}`; the reorient-side predicate
/// sees raw orientation sums, where operand B contributes negatively for
/// difference and exclusion because it has been reversed up front.
#[derive(Clone, Copy, Debug)]
struct Operator {
	op: PathBooleanOperation,
}

impl Operator {
	fn admits(&self, winding: i32) -> bool {
		match self.op {
			PathBooleanOperation::Union | PathBooleanOperation::Difference | PathBooleanOperation::Exclusion => winding == 1,
			PathBooleanOperation::Intersection => winding == 2,
			PathBooleanOperation::Division => false,
		}
	}

	/// Like `admits`, but counting windings that only qualify through the
	/// contour refinement as well. Union segments wound twice may still
	/// end up in the result, so a path carrying them offers more than its
	/// overlaps.
	fn admits_loosely(&self, winding: i32) -> bool {
		match self.op {
			PathBooleanOperation::Union => winding == 1 || winding == 2,
			_ => self.admits(winding),
		}
	}

	fn keeps_region(&self, winding: i32) -> bool {
		match self.op {
			PathBooleanOperation::Union => winding != 0,
			PathBooleanOperation::Intersection => winding == 2,
			PathBooleanOperation::Difference => winding == 1,
			PathBooleanOperation::Exclusion => winding == 1 || winding == -1,
			PathBooleanOperation::Division => false,
		}
	}
}

/// A working segment inside one boolean operation. The traversal fields
/// (`intersection`, `winding`, `visited`) live here, on the operation's
/// private clone, never on the public segment type.
#[derive(Debug, Clone)]
struct SegmentNode {
	point: Vector,
	handle_in: Vector,
	handle_out: Vector,
	path: usize,
	index: usize,
	visited: bool,
	winding: Option<Winding>,
	intersection: Option<LocationKey>,
}

#[derive(Debug, Clone)]
struct PathNode {
	segments: Vec<SegmentKey>,
	closed: bool,
	operand: u8,
	overlaps_only: bool,
	valid_overlaps_only: bool,
}

/// A location on a curve, one half of an intersection. Two locations link
/// each other through `intersection`; all locations coincident at one
/// segment are chained through `next`/`previous`.
#[derive(Debug, Clone)]
struct CurveLocation {
	curve: SegmentKey,
	time: f64,
	point: Vector,
	overlap: bool,
	crossing: Option<bool>,
	intersection: Option<LocationKey>,
	segment: Option<SegmentKey>,
	next: Option<LocationKey>,
	previous: Option<LocationKey>,
}

struct IntersectionGraph {
	segments: SlotMap<SegmentKey, SegmentNode>,
	locations: SlotMap<LocationKey, CurveLocation>,
	paths: Vec<PathNode>,
}

impl IntersectionGraph {
	fn new() -> Self {
		IntersectionGraph {
			segments: SlotMap::with_key(),
			locations: SlotMap::with_key(),
			paths: Vec::new(),
		}
	}

	fn add_paths(&mut self, paths: &[Path], operand: u8) {
		for path in paths {
			if path.is_empty() {
				continue;
			}
			let path_index = self.paths.len();
			let keys = path
				.segments
				.iter()
				.enumerate()
				.map(|(index, segment)| {
					self.segments.insert(SegmentNode {
						point: segment.point,
						handle_in: segment.handle_in,
						handle_out: segment.handle_out,
						path: path_index,
						index,
						visited: false,
						winding: None,
						intersection: None,
					})
				})
				.collect();
			self.paths.push(PathNode {
				segments: keys,
				closed: path.closed,
				operand,
				overlaps_only: false,
				valid_overlaps_only: false,
			});
		}
	}

	fn next_segment(&self, key: SegmentKey) -> Option<SegmentKey> {
		let node = &self.segments[key];
		let path = &self.paths[node.path];
		if node.index + 1 < path.segments.len() {
			Some(path.segments[node.index + 1])
		} else if path.closed {
			path.segments.first().copied()
		} else {
			None
		}
	}

	fn previous_segment(&self, key: SegmentKey) -> Option<SegmentKey> {
		let node = &self.segments[key];
		let path = &self.paths[node.path];
		if node.index > 0 {
			Some(path.segments[node.index - 1])
		} else if path.closed {
			path.segments.last().copied()
		} else {
			None
		}
	}

	/// Values of the curve leaving `key`, or `None` at the open end of a
	/// path.
	fn curve_values_of(&self, key: SegmentKey) -> Option<CurveValues> {
		let next = self.next_segment(key)?;
		let a = &self.segments[key];
		let b = &self.segments[next];
		Some(curve::from_anchors(a.point, a.point + a.handle_out, b.point + b.handle_in, b.point))
	}

	fn curve_has_handles(&self, key: SegmentKey) -> bool {
		self.curve_values_of(key).is_some_and(|v| curve::has_handles(&v))
	}

	fn reindex_path(&mut self, path_index: usize, from: usize) {
		let keys: Vec<SegmentKey> = self.paths[path_index].segments[from..].to_vec();
		for (offset, key) in keys.into_iter().enumerate() {
			self.segments[key].index = from + offset;
		}
	}

	fn insert_segment_after(&mut self, key: SegmentKey, point: Vector, handle_in: Vector, handle_out: Vector) -> SegmentKey {
		let (path_index, index) = {
			let node = &self.segments[key];
			(node.path, node.index)
		};
		let new_key = self.segments.insert(SegmentNode {
			point,
			handle_in,
			handle_out,
			path: path_index,
			index: index + 1,
			visited: false,
			winding: None,
			intersection: None,
		});
		self.paths[path_index].segments.insert(index + 1, new_key);
		self.reindex_path(path_index, index + 2);
		new_key
	}

	fn remove_segment(&mut self, key: SegmentKey) {
		let (path_index, index) = {
			let node = &self.segments[key];
			(node.path, node.index)
		};
		self.paths[path_index].segments.remove(index);
		self.reindex_path(path_index, index);
		self.segments.remove(key);
	}

	/// Split the curve leaving `owner` at `time`, inserting a new segment
	/// at the split point. Returns the inserted segment, which owns the
	/// right-hand sub-curve.
	fn divide_curve_at(&mut self, owner: SegmentKey, time: f64) -> SegmentKey {
		let next = self.next_segment(owner).expect("divided curve must have a second segment");
		let values = self.curve_values_of(owner).unwrap();
		let (left, right) = curve::subdivide(&values, time);
		let mid = Vector::new(left[6], left[7]);
		self.segments[owner].handle_out = Vector::new(left[2] - left[0], left[3] - left[1]);
		self.segments[next].handle_in = Vector::new(right[4] - right[6], right[5] - right[7]);
		self.insert_segment_after(
			owner,
			mid,
			Vector::new(left[4] - left[6], left[5] - left[7]),
			Vector::new(right[2] - right[0], right[3] - right[1]),
		)
	}

	fn path_to_path(&self, path_index: usize) -> Path {
		let path = &self.paths[path_index];
		Path::new(
			path.segments
				.iter()
				.map(|&key| {
					let node = &self.segments[key];
					Segment::new(node.point, node.handle_in, node.handle_out)
				})
				.collect(),
			path.closed,
		)
	}

	fn to_paths(&self) -> Vec<Path> {
		(0..self.paths.len())
			.filter(|&i| !self.paths[i].segments.is_empty())
			.map(|i| self.path_to_path(i))
			.collect()
	}

	fn visit_path(&mut self, path_index: usize) {
		let keys = self.paths[path_index].segments.clone();
		for key in keys {
			self.segments[key].visited = true;
		}
	}

	fn all_segments(&self) -> Vec<SegmentKey> {
		self.paths.iter().flat_map(|path| path.segments.iter().copied()).collect()
	}

	/// Per-path curve groups for the ray caster, together with the number
	/// of leading groups that belong to operand A.
	fn winding_paths(&self) -> (Vec<WindingPath>, usize) {
		let mut out = Vec::new();
		let mut first_operand = 0;
		for (index, path) in self.paths.iter().enumerate() {
			if path.segments.is_empty() {
				continue;
			}
			let path = self.path_to_path(index);
			out.push(path.winding_path());
			if self.paths[index].operand == 1 {
				first_operand = out.len();
			}
		}
		(out, first_operand)
	}
}

fn location_sort_key(graph: &IntersectionGraph, key: LocationKey) -> (usize, f64) {
	let loc = &graph.locations[key];
	let segment = &graph.segments[loc.curve];
	(segment.path, segment.index as f64 + loc.time)
}

fn locations_equal(graph: &IntersectionGraph, a: LocationKey, b: LocationKey) -> bool {
	let la = &graph.locations[a];
	let lb = &graph.locations[b];
	if graph.segments[la.curve].path != graph.segments[lb.curve].path || !vectors_equal(la.point, lb.point, EPS.geometric) {
		return false;
	}
	match (la.intersection, lb.intersection) {
		(Some(pa), Some(pb)) => {
			let lpa = &graph.locations[pa];
			let lpb = &graph.locations[pb];
			graph.segments[lpa.curve].path == graph.segments[lpb.curve].path && vectors_equal(lpa.point, lpb.point, EPS.geometric)
		}
		(None, None) => true,
		_ => false,
	}
}

/// Insert a location into the (path, curve, time)-sorted list. With
/// `merge`, a location coinciding with an existing entry is folded into it
/// (carrying the overlap flag over) and dropped from the arena.
fn insert_location(graph: &mut IntersectionGraph, sorted: &mut Vec<LocationKey>, key: LocationKey, merge: bool) {
	if merge {
		for &existing in sorted.iter() {
			if locations_equal(graph, key, existing) {
				if graph.locations[key].overlap {
					graph.locations[existing].overlap = true;
					if let Some(partner) = graph.locations[existing].intersection {
						graph.locations[partner].overlap = true;
					}
				}
				let partner = graph.locations[key].intersection;
				graph.locations.remove(key);
				if let Some(partner) = partner {
					graph.locations.remove(partner);
				}
				return;
			}
		}
	}
	let sort_key = location_sort_key(graph, key);
	let index = sorted.partition_point(|&other| location_sort_key(graph, other) <= sort_key);
	sorted.insert(index, key);
}

/// Duplicate the sorted location list so both halves of every intersection
/// appear as entries sortable by their own curve.
fn expand_locations(graph: &mut IntersectionGraph, locations: &[LocationKey]) -> Vec<LocationKey> {
	let mut expanded = locations.to_vec();
	for &key in locations.iter().rev() {
		if let Some(partner) = graph.locations[key].intersection {
			insert_location(graph, &mut expanded, partner, false);
		}
	}
	expanded
}

fn tangent_angle(v: &CurveValues, t: f64, negate: bool) -> f64 {
	let tangent = curve::tangent_at(v, t);
	let tangent = if negate { -tangent } else { tangent };
	tangent.y.atan2(tangent.x).to_degrees()
}

fn angle_in_range(angle: f64, min: f64, max: f64) -> bool {
	if min < max {
		angle > min && angle < max
	} else {
		angle > min || angle < max
	}
}

fn is_touching(graph: &IntersectionGraph, key: LocationKey) -> bool {
	let loc = &graph.locations[key];
	let Some(partner_key) = loc.intersection else { return false };
	let partner = &graph.locations[partner_key];
	let (Some(v1), Some(v2)) = (graph.curve_values_of(loc.curve), graph.curve_values_of(partner.curve)) else {
		return false;
	};
	let tangent1 = curve::tangent_at(&v1, loc.time);
	let tangent2 = curve::tangent_at(&v2, partner.time);
	if !curve::vectors_collinear(tangent1, tangent2) {
		return false;
	}
	if curve::is_straight(&v1) && curve::is_straight(&v2) {
		// Straight curves on collinear tangents still cross when their
		// finite segments properly intersect.
		return line_intersection_point(curve::start_point(&v1), curve::end_point(&v1), curve::start_point(&v2), curve::end_point(&v2)).is_none();
	}
	true
}

/// Classify an intersection as a crossing (the curves exchange sides) or a
/// tangency. Mid-curve intersections are crossings unless the tangents
/// are collinear; intersections at segment joins are classified by the
/// angular order of the four adjoining tangents around the point.
fn is_crossing(graph: &mut IntersectionGraph, key: LocationKey) -> bool {
	if let Some(cached) = graph.locations[key].crossing {
		return cached;
	}
	let result = compute_crossing(graph, key);
	graph.locations[key].crossing = Some(result);
	if let Some(partner) = graph.locations[key].intersection {
		graph.locations[partner].crossing = Some(result);
	}
	result
}

/// The incoming and outgoing tangent angles on one path at an intersection
/// location. Mid-curve both come from the location itself; at a segment
/// join they come from the adjoining curves, evaluated just inside to
/// avoid zero-length derivatives at the exact endpoints.
fn side_angles(graph: &IntersectionGraph, owner: SegmentKey, t: f64) -> Option<(f64, f64)> {
	let t_min = EPS.curve_time;
	let t_max = 1. - t_min;
	if t >= t_min && t <= t_max {
		let v = graph.curve_values_of(owner)?;
		Some((tangent_angle(&v, t, true), tangent_angle(&v, t, false)))
	} else {
		let c_in = if t < t_min { graph.previous_segment(owner)? } else { owner };
		let c_out = if t > t_max { graph.next_segment(owner)? } else { owner };
		let v_in = graph.curve_values_of(c_in)?;
		let v_out = graph.curve_values_of(c_out)?;
		Some((tangent_angle(&v_in, t_max, true), tangent_angle(&v_out, t_min, false)))
	}
}

fn compute_crossing(graph: &IntersectionGraph, key: LocationKey) -> bool {
	let loc = &graph.locations[key];
	let Some(partner_key) = loc.intersection else { return false };
	let partner = &graph.locations[partner_key];
	let t1 = loc.time;
	let t2 = partner.time;
	let t_min = EPS.curve_time;
	let t_max = 1. - t_min;
	let t1_inside = t1 >= t_min && t1 <= t_max;
	let t2_inside = t2 >= t_min && t2 <= t_max;
	if t1_inside && t2_inside {
		return !is_touching(graph, key);
	}
	let (c1_owner, c2_owner) = (loc.curve, partner.curve);
	let (Some((a1, a2)), Some((a3, a4))) = (side_angles(graph, c1_owner, t1), side_angles(graph, c2_owner, t2)) else {
		return false;
	};
	// A crossing requires the pair (a3, a4) to separate the pair (a1, a2)
	// in both of the arcs the latter defines around the point.
	(angle_in_range(a3, a1, a2) != angle_in_range(a4, a1, a2)) && (angle_in_range(a3, a2, a1) != angle_in_range(a4, a2, a1))
}

/// Create a linked pair of locations for an intersection found between the
/// curves of `c1` and `c2`, unless it falls on the shared endpoint of
/// adjacent curves, and keep it only when it is an overlap or a crossing.
fn add_location(graph: &mut IntersectionGraph, sorted: &mut Vec<LocationKey>, c1: SegmentKey, t1: f64, c2: SegmentKey, t2: f64, overlap: bool) {
	let exclude_start = !overlap && graph.previous_segment(c1) == Some(c2);
	let exclude_end = !overlap && c1 != c2 && graph.next_segment(c1) == Some(c2);
	let t_min = EPS.curve_time;
	let t_max = 1. - t_min;
	let t1_ok = t1 >= if exclude_start { t_min } else { 0. } && t1 <= if exclude_end { t_max } else { 1. };
	let t2_ok = t2 >= if exclude_end { t_min } else { 0. } && t2 <= if exclude_start { t_max } else { 1. };
	if !t1_ok || !t2_ok {
		return;
	}
	let (Some(v1), Some(v2)) = (graph.curve_values_of(c1), graph.curve_values_of(c2)) else {
		return;
	};
	let loc1 = graph.locations.insert(CurveLocation {
		curve: c1,
		time: t1,
		point: curve::point_at(&v1, t1),
		overlap,
		crossing: None,
		intersection: None,
		segment: None,
		next: None,
		previous: None,
	});
	let loc2 = graph.locations.insert(CurveLocation {
		curve: c2,
		time: t2,
		point: curve::point_at(&v2, t2),
		overlap,
		crossing: None,
		intersection: None,
		segment: None,
		next: None,
		previous: None,
	});
	graph.locations[loc1].intersection = Some(loc2);
	graph.locations[loc2].intersection = Some(loc1);
	if !overlap && !is_crossing(graph, loc1) {
		graph.locations.remove(loc1);
		graph.locations.remove(loc2);
		return;
	}
	insert_location(graph, sorted, loc1, true);
}

/// Find all crossing and overlap locations: between the two operands, or
/// within one operand when `self_op` (including single-curve loops).
fn collect_intersections(graph: &mut IntersectionGraph, self_op: bool) -> Vec<LocationKey> {
	struct CurveRecord {
		owner: SegmentKey,
		values: CurveValues,
		bounds: AaBb,
	}

	let mut records: Vec<CurveRecord> = Vec::new();
	let mut first_b = usize::MAX;
	for (index, path) in graph.paths.iter().enumerate() {
		for &key in &path.segments {
			if let Some(values) = graph.curve_values_of(key) {
				if graph.paths[index].operand == 2 && first_b == usize::MAX {
					first_b = records.len();
				}
				records.push(CurveRecord {
					owner: key,
					values,
					bounds: curve::bounding_box(&values),
				});
			}
		}
	}
	if records.is_empty() {
		return Vec::new();
	}
	if first_b == usize::MAX {
		first_b = records.len();
	}

	let total_bounds = records.iter().skip(1).fold(records[0].bounds, |acc, record| acc.merged(&record.bounds));
	let mut tree = QuadTree::new(total_bounds.expanded(EPS.geometric));
	let (queries, targets) = if self_op {
		(0..records.len(), 0..records.len())
	} else {
		(0..first_b, first_b..records.len())
	};
	for j in targets {
		tree.insert(records[j].bounds, j);
	}

	let mut sorted = Vec::new();
	for i in queries {
		if self_op {
			if let Some((t1, t2)) = curve::self_intersection(&records[i].values) {
				let owner = records[i].owner;
				add_location(graph, &mut sorted, owner, t1, owner, t2, false);
			}
		}
		let mut candidates = Vec::new();
		tree.find(&records[i].bounds.expanded(EPS.geometric), &mut |index| candidates.push(index));
		candidates.sort_unstable();
		candidates.dedup();
		for j in candidates {
			if self_op && j <= i {
				continue;
			}
			for hit in curve_intersections(&records[i].values, &records[j].values) {
				add_location(graph, &mut sorted, records[i].owner, hit.t1, records[j].owner, hit.t2, hit.overlap);
			}
		}
	}
	sorted
}

enum DivideFilter {
	All,
	Overlaps,
	ValidCurves,
}

/// Splice `to`'s chain onto the end of `from`'s chain, unless the two are
/// already linked.
fn link_intersections(graph: &mut IntersectionGraph, from: LocationKey, to: LocationKey) {
	let mut prev = Some(from);
	while let Some(key) = prev {
		if key == to {
			return;
		}
		prev = graph.locations[key].previous;
	}
	let mut from = from;
	while let Some(next) = graph.locations[from].next {
		if next == to {
			return;
		}
		from = next;
	}
	let mut to = to;
	while let Some(previous) = graph.locations[to].previous {
		to = previous;
	}
	graph.locations[from].next = Some(to);
	graph.locations[to].previous = Some(from);
}

fn clear_curve_handles(graph: &mut IntersectionGraph, curves: &FxHashSet<SegmentKey>) {
	for &key in curves {
		if !graph.segments.contains_key(key) {
			continue;
		}
		graph.segments[key].handle_out = Vector::ZERO;
		if let Some(next) = graph.next_segment(key) {
			graph.segments[next].handle_in = Vector::ZERO;
		}
	}
}

/// Split the curves at every accepted location, walking the sorted list
/// from the back so curve times on the same curve can be rescaled onto the
/// left sub-curve, and wire up the intersection chains at the produced
/// segments.
fn divide_locations(
	graph: &mut IntersectionGraph,
	locations: &[LocationKey],
	filter: DivideFilter,
	mut clear_later: Option<&mut FxHashSet<SegmentKey>>,
) -> Vec<LocationKey> {
	let t_min = EPS.curve_time;
	let t_max = 1. - t_min;
	let mut results = Vec::new();
	let mut clear_handles = false;
	let mut local_clear: FxHashSet<SegmentKey> = FxHashSet::default();
	let mut renormalize: Vec<LocationKey> = Vec::new();
	let mut prev_curve: Option<SegmentKey> = None;
	let mut prev_time: Option<f64> = None;

	for &loc_key in locations.iter().rev() {
		let (orig_time, curve_key) = {
			let loc = &graph.locations[loc_key];
			(loc.time, loc.curve)
		};
		let mut time = orig_time;
		let exclude = match filter {
			DivideFilter::All => false,
			DivideFilter::Overlaps => !graph.locations[loc_key].overlap,
			DivideFilter::ValidCurves => {
				let loc = &graph.locations[loc_key];
				let partner = loc.intersection;
				let curve1_ok = graph.segments.contains_key(loc.curve);
				let curve2_ok = partner.is_some_and(|p| graph.segments.contains_key(graph.locations[p].curve));
				if curve1_ok && curve2_ok {
					false
				} else {
					// Detach stale links left behind by overlap removal so
					// they cannot confuse the tracer.
					let seg1 = graph.locations[loc_key].segment;
					if let Some(seg1) = seg1.filter(|&s| graph.segments.contains_key(s)) {
						graph.segments[seg1].intersection = None;
					}
					if let Some(partner) = partner {
						let seg2 = graph.locations[partner].segment;
						if let Some(seg2) = seg2.filter(|&s| graph.segments.contains_key(s)) {
							graph.segments[seg2].intersection = None;
						}
					}
					true
				}
			}
		};
		if prev_curve != Some(curve_key) {
			clear_handles = !graph.curve_has_handles(curve_key)
				|| clear_later.as_ref().is_some_and(|set| set.contains(&curve_key))
				|| local_clear.contains(&curve_key);
			renormalize.clear();
			prev_time = None;
			prev_curve = Some(curve_key);
		} else if let Some(previous) = prev_time {
			if previous >= t_min {
				time /= previous;
			}
		}
		if exclude {
			// Keep the stored time in the coordinates of the current
			// (possibly already shortened) curve, so a later pass can pick
			// it up without re-resolving.
			graph.locations[loc_key].time = time;
			renormalize.push(loc_key);
			continue;
		}
		if !matches!(filter, DivideFilter::All) {
			results.push(loc_key);
		}
		prev_time = Some(orig_time);
		let segment = if time < t_min {
			curve_key
		} else if time > t_max {
			graph.next_segment(curve_key).unwrap_or(curve_key)
		} else if graph.curve_values_of(curve_key).is_some() {
			let new_segment = graph.divide_curve_at(curve_key, time);
			if clear_handles {
				match clear_later.as_mut() {
					Some(set) => {
						set.insert(curve_key);
						set.insert(new_segment);
					}
					None => {
						local_clear.insert(curve_key);
						local_clear.insert(new_segment);
					}
				}
			}
			// Locations to the right of the cut now live on the new
			// sub-curve; remap their reference and curve time. Further
			// divisions apply to the left sub-curve only.
			for renorm in renormalize.drain(..).rev() {
				let loc = &mut graph.locations[renorm];
				loc.time = (loc.time - time) / (1. - time);
				loc.curve = new_segment;
			}
			new_segment
		} else {
			curve_key
		};
		{
			let loc = &mut graph.locations[loc_key];
			loc.segment = Some(segment);
			loc.curve = segment;
			loc.time = 0.;
		}
		// Link the intersection chain at the segment: the segment points
		// to the partner location, and coincident intersections fan out
		// through the chain on both sides.
		let dest = graph.locations[loc_key].intersection;
		let inter = graph.segments[segment].intersection;
		match (inter, dest) {
			(Some(inter), Some(dest)) => {
				link_intersections(graph, inter, dest);
				let mut other = Some(inter);
				let mut guard = graph.locations.len() + 1;
				while let Some(key) = other {
					if guard == 0 {
						break;
					}
					guard -= 1;
					if let Some(partner) = graph.locations[key].intersection {
						link_intersections(graph, partner, inter);
					}
					other = graph.locations[key].next;
				}
			}
			(None, Some(dest)) => {
				graph.segments[segment].intersection = Some(dest);
			}
			_ => {}
		}
	}
	if clear_later.is_none() {
		clear_curve_handles(graph, &local_clear);
	}
	results.reverse();
	if matches!(filter, DivideFilter::All) {
		locations.to_vec()
	} else {
		results
	}
}

fn is_valid(graph: &IntersectionGraph, operator: Option<&Operator>, key: SegmentKey, exclude_contour: bool) -> bool {
	let node = &graph.segments[key];
	if node.visited {
		return false;
	}
	match operator {
		None => true,
		Some(op) => node
			.winding
			.is_some_and(|w| op.admits(w.winding) || (!exclude_contour && op.op == PathBooleanOperation::Union && w.contour)),
	}
}

/// Assign a winding to every segment of the curve chain starting at `seed`
/// by sampling the chain's arc-length midpoint and ray casting against the
/// full curve set. For difference, a chain of operand A inside operand B,
/// or of B outside A, contributes nothing and gets a zero winding.
fn propagate_winding(graph: &mut IntersectionGraph, seed: SegmentKey, winding_paths: &[WindingPath], first_operand: usize, operator: &Operator) {
	let mut chain: Vec<(SegmentKey, CurveValues, f64)> = Vec::new();
	let mut total_length = 0.;
	let mut segment = seed;
	loop {
		if let Some(values) = graph.curve_values_of(segment) {
			let length = curve::length(&values);
			chain.push((segment, values, length));
			total_length += length;
		}
		let Some(next) = graph.next_segment(segment) else { break };
		segment = next;
		if segment == seed || graph.segments[segment].intersection.is_some() {
			break;
		}
	}

	let mut winding = Winding::default();
	if total_length > 0. {
		let mut offset = total_length / 2.;
		for (key, values, length) in &chain {
			if offset <= *length {
				let t = curve::time_at(values, offset).clamp(1e-3, 1. - 1e-3);
				let point = curve::point_at(values, t);
				let tangent = curve::tangent_at(values, t).normalize_or_zero();
				let horizontal = tangent.y.abs() < 0.5;
				let mut sampled = None;
				if operator.op == PathBooleanOperation::Difference {
					let operand = graph.paths[graph.segments[*key].path].operand;
					let other = if operand == 1 {
						&winding_paths[first_operand..]
					} else {
						&winding_paths[..first_operand]
					};
					let other_winding = get_winding(point, other, horizontal);
					if (operand == 1 && other_winding.winding != 0) || (operand == 2 && other_winding.winding == 0) {
						sampled = Some(Winding::default());
					}
				}
				winding = sampled.unwrap_or_else(|| get_winding(point, winding_paths, horizontal));
				break;
			}
			offset -= length;
		}
	}
	for (key, _, _) in chain {
		graph.segments[key].winding = Some(winding);
	}
}

/// Walk a segment's intersection chain for the entry best suited to switch
/// branches to: one leading back to the trace start, or one whose segment
/// and successor are still part of the boolean result.
fn find_best_intersection(
	graph: &IntersectionGraph,
	operator: Option<&Operator>,
	inter: LocationKey,
	exclude: SegmentKey,
	start: Option<SegmentKey>,
	other_start: Option<SegmentKey>,
) -> Option<LocationKey> {
	if graph.locations[inter].next.is_none() {
		return Some(inter);
	}
	let is_start = |key: Option<SegmentKey>| key.is_some() && (key == start || key == other_start);
	let mut current = Some(inter);
	while let Some(key) = current {
		let loc = &graph.locations[key];
		if let Some(segment) = loc.segment.filter(|&s| graph.segments.contains_key(s)) {
			let next_segment = graph.next_segment(segment);
			let next_inter = next_segment.and_then(|next| graph.segments[next].intersection);
			if segment != exclude
				&& (is_start(Some(segment))
					|| is_start(next_segment)
					|| (next_segment.is_some_and(|next| {
						is_valid(graph, operator, segment, false)
							&& (is_valid(graph, operator, next, false)
								|| next_inter
									.and_then(|ni| graph.locations[ni].segment)
									.is_some_and(|ns| is_valid(graph, operator, ns, false)))
					}))) {
				return Some(key);
			}
		}
		current = loc.next;
	}
	None
}

/// Trace closed result paths out of the divided, winding-annotated graph,
/// switching branches at intersections according to the operator.
fn trace_paths(graph: &mut IntersectionGraph, operator: Option<&Operator>) -> Vec<Path> {
	let mut paths = Vec::new();
	let seeds = graph.all_segments();
	let max_steps = 4 * seeds.len().max(1);

	for &seed in &seeds {
		if !graph.segments.contains_key(seed) {
			continue;
		}
		let seed_inter = graph.segments[seed].intersection;
		// Two fully coincident paths cannot be traced through switching;
		// clone one of them into the result where the operator keeps
		// coincident regions, and consume both.
		if !graph.segments[seed].visited && graph.paths[graph.segments[seed].path].overlaps_only {
			if let Some(other_segment) = seed_inter
				.and_then(|i| graph.locations[i].segment)
				.filter(|&s| graph.segments.contains_key(s))
			{
				let path1_index = graph.segments[seed].path;
				let path2_index = graph.segments[other_segment].path;
				if path1_index != path2_index {
					let path1 = graph.path_to_path(path1_index);
					let path2 = graph.path_to_path(path2_index);
					if path1.compare(&path2) {
						let keep = operator.is_some_and(|op| matches!(op.op, PathBooleanOperation::Union | PathBooleanOperation::Intersection));
						if keep && path1.area() != 0. {
							paths.push(path1);
						}
						graph.visit_path(path1_index);
						graph.visit_path(path2_index);
					}
				}
			}
		}
		// Do not start in segments that are not part of the result, nor
		// in overlaps unless the path offers nothing else.
		if !is_valid(graph, operator, seed, false)
			|| (!graph.paths[graph.segments[seed].path].valid_overlaps_only && seed_inter.is_some_and(|i| graph.locations[i].overlap))
		{
			continue;
		}

		let mut segment = seed;
		let mut start: Option<SegmentKey> = None;
		let mut other_start: Option<SegmentKey> = None;
		let mut finished = false;
		let mut handle_in: Option<Vector> = None;
		let mut collected: Option<Vec<Segment>> = None;
		let mut steps = 0;
		loop {
			steps += 1;
			if steps > max_steps {
				log::error!("boolean operation failed to terminate, abandoning the current chain");
				collected = None;
				finished = false;
				break;
			}
			let segment_inter = graph.segments[segment].intersection;
			let inter = segment_inter
				.and_then(|i| find_best_intersection(graph, operator, i, segment, start, other_start))
				.or(segment_inter);
			let other = inter
				.and_then(|i| graph.locations[i].segment)
				.filter(|&s| graph.segments.contains_key(s));
			if start.is_some() && (Some(segment) == start || Some(segment) == other_start) {
				finished = true;
			} else if let Some(other_segment) = other {
				if Some(other_segment) == start || Some(other_segment) == other_start {
					finished = true;
					segment = other_segment;
				} else if is_valid(graph, operator, other_segment, is_valid(graph, operator, segment, true)) {
					// At a crossing whose other side is part of the
					// result: switch over. Intersection and difference
					// leave no way back across this branch.
					if let Some(op) = operator {
						if matches!(op.op, PathBooleanOperation::Intersection | PathBooleanOperation::Difference) {
							graph.segments[segment].visited = true;
						}
					}
					segment = other_segment;
				}
			}
			if finished || graph.segments[segment].visited {
				graph.segments[segment].visited = true;
				break;
			}
			if graph.paths[graph.segments[segment].path].valid_overlaps_only && !is_valid(graph, operator, segment, false) {
				break;
			}
			if collected.is_none() {
				collected = Some(Vec::new());
				start = Some(segment);
				other_start = other;
			}
			let next = graph.next_segment(segment);
			{
				let node = &graph.segments[segment];
				collected.as_mut().unwrap().push(Segment::new(
					node.point,
					handle_in.unwrap_or(Vector::ZERO),
					if next.is_some() { node.handle_out } else { Vector::ZERO },
				));
			}
			graph.segments[segment].visited = true;
			match next {
				Some(next) => {
					segment = next;
					handle_in = Some(graph.segments[next].handle_in);
				}
				None => {
					// The open end of a path wraps to its first segment,
					// closing the fill with a straight joint.
					segment = graph.paths[graph.segments[segment].path].segments[0];
					handle_in = None;
				}
			}
		}
		if finished {
			if let Some(mut segments) = collected {
				if let Some(first) = segments.first_mut() {
					first.handle_in = handle_in.unwrap_or(Vector::ZERO);
				}
				let path = Path::new(segments, true);
				if path.area().abs() >= EPS.geometric {
					paths.push(path);
				}
			}
		} else if let Some(segments) = collected {
			// An unfinished trace below the geometric noise floor is
			// precision fallout and silently dropped.
			let path = Path::new(segments, false);
			let area = path.area();
			if area.abs() >= EPS.geometric {
				log::error!("boolean operation resulted in open path, segments = {}, area = {}", path.segments.len(), area);
			}
		}
	}
	paths
}

/// Normalize the orientation of traced paths: the largest path defines the
/// outside, contained paths alternate or cancel according to the region
/// predicate, and fully redundant paths are dropped.
fn reorient_paths(mut paths: Vec<Path>, is_inside: impl Fn(i32) -> bool, clockwise: Option<bool>) -> Vec<Path> {
	let count = paths.len();
	if count == 0 {
		return paths;
	}

	let bounds: Vec<AaBb> = paths.iter().map(Path::bounds).collect();
	let mut order: Vec<usize> = (0..count).collect();
	order.sort_by(|&a, &b| bounds[b].area().partial_cmp(&bounds[a].area()).unwrap_or(std::cmp::Ordering::Equal));
	let clockwise = clockwise.unwrap_or_else(|| paths[order[0]].is_clockwise());

	#[derive(Clone, Copy)]
	struct Entry {
		winding: i32,
		// Cumulative winding inside this path: its own contribution plus
		// those of every containing path.
		total: i32,
		// Nearest containing path that was kept, for orientation.
		container: Option<usize>,
		exclude: bool,
	}
	let mut entries: Vec<Entry> = paths
		.iter()
		.map(|path| Entry {
			winding: if path.is_clockwise() { 1 } else { -1 },
			total: 0,
			container: None,
			exclude: false,
		})
		.collect();

	for position in 0..count {
		let index = order[position];
		let mut outside_winding = 0;
		let mut interior_point = None;
		// Walk the already processed, larger paths from the nearest in
		// size to find the innermost container.
		for larger_position in (0..position).rev() {
			let larger = order[larger_position];
			if !bounds[larger].overlaps(&bounds[index]) {
				continue;
			}
			let point = *interior_point.get_or_insert_with(|| paths[index].interior_point());
			if paths[larger].contains(point, FillRule::NonZero) {
				outside_winding = entries[larger].total;
				entries[index].container = if entries[larger].exclude { entries[larger].container } else { Some(larger) };
				break;
			}
		}
		let total = entries[index].winding + outside_winding;
		entries[index].total = total;
		// Keep the path only when crossing it changes whether the region
		// is inside the result.
		if is_inside(total) == is_inside(outside_winding) {
			entries[index].exclude = true;
		} else {
			let target = match entries[index].container {
				Some(container) => !paths[container].is_clockwise(),
				None => clockwise,
			};
			paths[index].set_clockwise(target);
		}
	}

	let mut kept = Vec::with_capacity(count);
	for (index, path) in paths.into_iter().enumerate() {
		if !entries[index].exclude {
			kept.push(path);
		}
	}
	kept
}

/// Produce the freely mutable working copy of an operand: reduced,
/// closed, self-intersections resolved, and reoriented to the fill rule
/// with the outermost paths clockwise.
fn prepare_path(item: &PathItem, fill_rule: FillRule) -> Vec<Path> {
	let mut paths: Vec<Path> = item.paths().to_vec();
	for path in &mut paths {
		path.reduce(true);
	}
	paths.retain(|path| !path.is_empty());
	for path in &mut paths {
		path.close_with_joint();
	}
	let resolved = resolve_crossings_paths(paths);
	reorient_paths(
		resolved,
		|w| match fill_rule {
			FillRule::NonZero => w != 0,
			FillRule::EvenOdd => w & 1 != 0,
		},
		Some(true),
	)
}

/// Rewrite self-intersections of a set of paths: divide at overlaps,
/// remove the interior of overlap runs, divide at crossings and retrace.
fn resolve_crossings_paths(paths: Vec<Path>) -> Vec<Path> {
	if paths.iter().all(Path::is_empty) {
		return paths;
	}
	let mut graph = IntersectionGraph::new();
	graph.add_paths(&paths, 1);
	let locations = collect_intersections(&mut graph, true);
	if locations.is_empty() {
		return paths;
	}
	let has_overlaps = locations.iter().any(|&key| graph.locations[key].overlap);
	let has_crossings = locations.iter().any(|&key| !graph.locations[key].overlap);
	let expanded = expand_locations(&mut graph, &locations);
	let use_clear_later = has_overlaps && has_crossings;
	let mut clear_curves: FxHashSet<SegmentKey> = FxHashSet::default();

	if has_overlaps {
		let overlaps = divide_locations(&mut graph, &expanded, DivideFilter::Overlaps, use_clear_later.then_some(&mut clear_curves));
		// Remove segments buried inside an overlap run; the curves on
		// both sides of the run survive and join up straight.
		for &overlap in overlaps.iter().rev() {
			let Some(segment) = graph.locations[overlap].segment else { continue };
			if !graph.segments.contains_key(segment) {
				continue;
			}
			let path_index = graph.segments[segment].path;
			let previous = graph.previous_segment(segment);
			let next = graph.next_segment(segment);
			let has_overlap_link = |g: &IntersectionGraph, key: Option<SegmentKey>| {
				key.and_then(|k| g.segments[k].intersection).is_some_and(|i| {
					let loc = &g.locations[i];
					loc.overlap && g.segments.contains_key(loc.curve) && g.segments[loc.curve].path == path_index
				})
			};
			if has_overlap_link(&graph, previous) && has_overlap_link(&graph, next) {
				let previous = previous.unwrap();
				let next = next.unwrap();
				graph.remove_segment(segment);
				if previous == segment || next == segment {
					continue;
				}
				graph.segments[previous].handle_out = Vector::ZERO;
				graph.segments[next].handle_in = Vector::ZERO;
				let previous_curve = graph.curve_values_of(previous);
				if previous_curve.map_or(true, |v| !curve::has_length(&v, 0.)) && graph.paths[path_index].segments.len() > 1 {
					let carried = graph.segments[previous].handle_in;
					graph.segments[next].handle_in = carried;
					graph.remove_segment(previous);
				}
			}
		}
	}
	if has_crossings {
		let filter = if has_overlaps { DivideFilter::ValidCurves } else { DivideFilter::All };
		divide_locations(&mut graph, &expanded, filter, use_clear_later.then_some(&mut clear_curves));
		if use_clear_later {
			clear_curve_handles(&mut graph, &clear_curves);
		}
		trace_paths(&mut graph, None)
	} else {
		graph.to_paths()
	}
}

fn create_result(mut paths: Vec<Path>) -> PathItem {
	for path in &mut paths {
		path.reduce(true);
	}
	paths.retain(|path| path.segments.len() > 1 || (path.closed && path.segments.len() == 1 && path.segments[0].has_handles()));
	PathItem::from_paths(paths)
}

fn trace_boolean(a: &PathItem, a_fill_rule: FillRule, b: &PathItem, b_fill_rule: FillRule, op: PathBooleanOperation) -> PathItem {
	let operator = Operator { op };
	let paths1 = prepare_path(a, a_fill_rule);
	let mut paths2 = prepare_path(b, b_fill_rule);

	// Operands keep matching orientations, except for difference and
	// exclusion where B runs opposite to A so the windings cancel.
	if !paths2.is_empty() {
		let clockwise1 = paths1.first().map_or(true, Path::is_clockwise);
		let clockwise2 = paths2[0].is_clockwise();
		let opposite = matches!(op, PathBooleanOperation::Difference | PathBooleanOperation::Exclusion);
		if opposite != (clockwise2 != clockwise1) {
			for path in &mut paths2 {
				path.reverse();
			}
		}
	}

	let mut graph = IntersectionGraph::new();
	graph.add_paths(&paths1, 1);
	graph.add_paths(&paths2, 2);

	let locations = collect_intersections(&mut graph, false);
	let expanded = expand_locations(&mut graph, &locations);
	let crossings = divide_locations(&mut graph, &expanded, DivideFilter::All, None);

	let result = if !crossings.is_empty() {
		for path in &mut graph.paths {
			path.overlaps_only = true;
			path.valid_overlaps_only = true;
		}
		let (winding_paths, first_operand) = graph.winding_paths();
		// Propagate winding for chains starting in the crossings first,
		// then fill in any chain that has no intersection at all.
		for &key in &crossings {
			if let Some(segment) = graph.locations[key].segment {
				if graph.segments.contains_key(segment) && graph.segments[segment].winding.is_none() {
					propagate_winding(&mut graph, segment, &winding_paths, first_operand, &operator);
				}
			}
		}
		for key in graph.all_segments() {
			if graph.segments[key].winding.is_none() {
				propagate_winding(&mut graph, key, &winding_paths, first_operand, &operator);
			}
			let inter = graph.segments[key].intersection;
			if !inter.is_some_and(|i| graph.locations[i].overlap) {
				let path_index = graph.segments[key].path;
				graph.paths[path_index].overlaps_only = false;
				if graph.segments[key].winding.is_some_and(|w| operator.admits_loosely(w.winding)) {
					graph.paths[path_index].valid_overlaps_only = false;
				}
			}
		}
		// Traced paths already bound exactly the result region; the
		// reorientation pass normalizes nesting orientation (outermost
		// clockwise, holes counter-clockwise) and drops redundant loops.
		let traced = trace_paths(&mut graph, Some(&operator));
		reorient_paths(traced, |w| w != 0, None)
	} else {
		// No crossings: containment alone decides, which reorientation
		// resolves much faster than tracing.
		let mut all = paths1;
		all.extend(paths2);
		reorient_paths(all, |w| operator.keeps_region(w), None)
	};
	create_result(result)
}

/// Apply a boolean operation to two path items. The operands are never
/// mutated; the result is a freshly built item with consistent winding
/// orientation.
pub fn path_boolean(a: &PathItem, a_fill_rule: FillRule, b: &PathItem, b_fill_rule: FillRule, op: PathBooleanOperation) -> Result<PathItem, BooleanError> {
	Ok(match op {
		PathBooleanOperation::Division => {
			let mut children = trace_boolean(a, a_fill_rule, b, b_fill_rule, PathBooleanOperation::Difference).into_paths();
			children.extend(trace_boolean(a, a_fill_rule, b, b_fill_rule, PathBooleanOperation::Intersection).into_paths());
			children.retain(|path| !path.is_empty());
			PathItem::CompoundPath(CompoundPath { children })
		}
		_ => trace_boolean(a, a_fill_rule, b, b_fill_rule, op),
	})
}

impl PathItem {
	pub fn unite(&self, other: &Self) -> PathItem {
		trace_boolean(self, FillRule::NonZero, other, FillRule::NonZero, PathBooleanOperation::Union)
	}

	pub fn intersect(&self, other: &Self) -> PathItem {
		trace_boolean(self, FillRule::NonZero, other, FillRule::NonZero, PathBooleanOperation::Intersection)
	}

	pub fn subtract(&self, other: &Self) -> PathItem {
		trace_boolean(self, FillRule::NonZero, other, FillRule::NonZero, PathBooleanOperation::Difference)
	}

	pub fn exclude(&self, other: &Self) -> PathItem {
		trace_boolean(self, FillRule::NonZero, other, FillRule::NonZero, PathBooleanOperation::Exclusion)
	}

	/// The compound of `subtract(other)` and `intersect(other)`: the
	/// pieces of `self` on either side of `other`'s outline.
	pub fn divide(&self, other: &Self) -> PathItem {
		path_boolean(self, FillRule::NonZero, other, FillRule::NonZero, PathBooleanOperation::Division).unwrap()
	}

	/// Rewrite self-intersections into a clean, non-self-intersecting
	/// region. Idempotent.
	pub fn resolve_crossings(&self) -> PathItem {
		PathItem::from_paths(resolve_crossings_paths(self.paths().to_vec()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn square_item(x0: f64, y0: f64, x1: f64, y1: f64) -> PathItem {
		PathItem::Path(Path::new(
			vec![
				Segment::anchor(Vector::new(x0, y0)),
				Segment::anchor(Vector::new(x1, y0)),
				Segment::anchor(Vector::new(x1, y1)),
				Segment::anchor(Vector::new(x0, y1)),
			],
			true,
		))
	}

	#[test]
	fn prepare_closes_open_paths() {
		let open = PathItem::Path(Path::new(
			vec![
				Segment::anchor(Vector::new(0., 0.)),
				Segment::anchor(Vector::new(100., 0.)),
				Segment::anchor(Vector::new(100., 100.)),
			],
			false,
		));
		let prepared = prepare_path(&open, FillRule::NonZero);
		assert_eq!(prepared.len(), 1);
		assert!(prepared[0].closed);
		assert!(prepared[0].is_clockwise());
	}

	#[test]
	fn prepare_forces_clockwise_outer() {
		let mut path = square_item(0., 0., 100., 100.);
		if let PathItem::Path(inner) = &mut path {
			inner.reverse();
		}
		let prepared = prepare_path(&path, FillRule::NonZero);
		assert!(prepared[0].is_clockwise());
	}

	#[test]
	fn reorient_drops_redundant_nested_path_for_union() {
		let outer = square_item(0., 0., 100., 100.).into_paths().pop().unwrap();
		let inner = square_item(25., 25., 75., 75.).into_paths().pop().unwrap();
		let kept = reorient_paths(vec![outer, inner], |w| w != 0, None);
		assert_eq!(kept.len(), 1);
		assert!((kept[0].area().abs() - 10000.).abs() < 1e-9);
	}

	#[test]
	fn reorient_keeps_hole_with_opposite_orientation() {
		let outer = square_item(0., 0., 100., 100.).into_paths().pop().unwrap();
		let mut inner = square_item(25., 25., 75., 75.).into_paths().pop().unwrap();
		inner.reverse();
		let kept = reorient_paths(vec![outer, inner], |w| w != 0, None);
		assert_eq!(kept.len(), 2);
		assert!(kept[0].is_clockwise());
		assert!(!kept[1].is_clockwise());
	}

	#[test]
	fn divide_locations_splits_both_curves() {
		let mut graph = IntersectionGraph::new();
		// A figure-eight: the two diagonals cross at (50, 50).
		let path = Path::new(
			vec![
				Segment::anchor(Vector::new(0., 0.)),
				Segment::anchor(Vector::new(100., 100.)),
				Segment::anchor(Vector::new(100., 0.)),
				Segment::anchor(Vector::new(0., 100.)),
			],
			true,
		);
		graph.add_paths(std::slice::from_ref(&path), 1);
		let locations = collect_intersections(&mut graph, true);
		assert_eq!(locations.len(), 1);
		let expanded = expand_locations(&mut graph, &locations);
		assert_eq!(expanded.len(), 2);
		divide_locations(&mut graph, &expanded, DivideFilter::All, None);
		assert_eq!(graph.paths[0].segments.len(), 6);
		let with_intersections = graph
			.all_segments()
			.into_iter()
			.filter(|&key| graph.segments[key].intersection.is_some())
			.count();
		assert_eq!(with_intersections, 2);
	}
}
