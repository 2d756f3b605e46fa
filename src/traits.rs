/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines the trait contracts for kernels, spatial indexes and expansion providers.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::geometry::BoundingBox;
use faer::{Mat, MatRef, RowRef};

/// A function which defines the interaction between a source point and a target point.
pub trait KernelFunction {
    /// Evaluates the kernel for a single target/source point pair.
    ///
    /// Both points are rows of a point matrix with one column per spatial dimension.
    fn evaluate(&self, target: RowRef<f64>, source: RowRef<f64>) -> f64;
}

/// A hierarchical spatial partition of the source point cloud.
///
/// Buckets are identified by dense indices in `0..num_buckets()`, covering every
/// node of the hierarchy below the root. The root itself is not a bucket; the
/// top level of the hierarchy is [`SpatialIndex::root_children`]. Implementations
/// must satisfy:
///
/// - every bucket is reachable from exactly one top-level bucket,
/// - the leaf buckets partition the source points (each point in exactly one leaf),
/// - `children(b)` is empty exactly when `is_leaf(b)` is true.
pub trait SpatialIndex {
    /// Total number of buckets in the hierarchy (excluding the root).
    fn num_buckets(&self) -> usize;

    /// Number of spatial dimensions.
    fn dimensions(&self) -> usize;

    /// The top-level buckets.
    fn root_children(&self) -> &[usize];

    /// The child buckets of `bucket`; empty for leaves.
    fn children(&self, bucket: usize) -> &[usize];

    /// Whether `bucket` has no children.
    fn is_leaf(&self, bucket: usize) -> bool;

    /// Axis aligned bounds of `bucket`.
    fn bounds(&self, bucket: usize) -> &BoundingBox;

    /// Indices of the source points contained in leaf `bucket`.
    fn leaf_particles(&self, bucket: usize) -> &[usize];

    /// The leaf bucket whose bounds contain `point`, or `None` when the point
    /// lies outside the indexed region.
    fn leaf_containing(&self, point: RowRef<f64>) -> Option<usize>;

    /// `bucket` followed by all of its descendants.
    fn subtree(&self, bucket: usize) -> Vec<usize>;
}

/// Black box provider of the transfer operators used by [`crate::H2Matrix`].
///
/// An implementation fixes the expansion size `m` and produces dense operator
/// blocks on demand. The operator orientations are:
///
/// - `p2m`: `m x |col_indices|`, maps point weights to outgoing expansion coefficients.
/// - `l2p`: `|row_indices| x m`, maps incoming expansion coefficients to point values.
/// - `l2l`: `m x m`, maps a parent's incoming coefficients to a child's. Its
///   transpose is the child-to-parent outgoing transfer (M2M).
/// - `m2l`: `m x m`, maps a source bucket's outgoing coefficients to a target
///   bucket's incoming coefficients.
/// - `p2p`: `|row_indices| x |col_indices|`, the direct interaction block.
pub trait Expansions {
    /// Number of expansion coefficients per bucket.
    fn expansion_size(&self) -> usize;

    /// Outgoing expansion operator for a leaf bucket.
    fn p2m(&self, bounds: &BoundingBox, col_indices: &[usize], col_particles: MatRef<f64>)
        -> Mat<f64>;

    /// Incoming evaluation operator for a leaf bucket.
    fn l2p(&self, bounds: &BoundingBox, row_indices: &[usize], row_particles: MatRef<f64>)
        -> Mat<f64>;

    /// Parent-to-child incoming transfer operator.
    fn l2l(&self, child: &BoundingBox, parent: &BoundingBox) -> Mat<f64>;

    /// Far-field transfer operator between two well separated buckets.
    fn m2l(&self, target: &BoundingBox, source: &BoundingBox) -> Mat<f64>;

    /// Direct interaction block between two near buckets.
    fn p2p(
        &self,
        row_indices: &[usize],
        col_indices: &[usize],
        row_particles: MatRef<f64>,
        col_particles: MatRef<f64>,
    ) -> Mat<f64>;
}
