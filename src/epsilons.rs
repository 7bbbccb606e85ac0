// Copyright 2024 Adam Platkevič <rflashster@gmail.com>
//
// SPDX-License-Identifier: MIT

/// The tolerances used throughout the boolean pipeline.
///
/// The fields have distinct roles and units; they must not be collapsed
/// into a single "epsilon":
/// - `curve_time` compares curve-time parameters in `[0, 1]`.
/// - `geometric` compares coordinates in user-space units.
/// - `winding` is the half-width of the abscissa band around a ray-cast
///   origin inside which a hit counts towards both winding sides.
/// - `linear` is the bounding-box extent below which a subdivided curve
///   piece is treated as a line segment during intersection testing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Epsilons {
	pub curve_time: f64,
	pub geometric: f64,
	pub winding: f64,
	pub linear: f64,
}

pub const EPS: Epsilons = Epsilons {
	curve_time: 1e-8,
	geometric: 1e-7,
	winding: 1e-9,
	linear: 1e-4,
};
