/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements an arena-backed adaptive bucket tree over an axis aligned bounding box.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::geometry::BoundingBox;
use crate::traits::SpatialIndex;
use crate::utils;
use faer::{Mat, RowRef};

/// Maximum subdivision depth. Guards against unbounded recursion when many
/// points are coincident.
const MAX_TREE_DEPTH: usize = 16;

#[derive(Clone, Debug)]
struct TreeNode {
    bounds: BoundingBox,

    /// Bucket indices of the children; empty for leaves.
    children: Vec<usize>,

    /// Source point indices; populated for leaves only.
    particles: Vec<usize>,
}

/// An adaptive 2^d-ary tree (binary tree, quadtree or octree depending on the
/// dimension) over a matrix of points.
///
/// Every node splits at its center into `2^d` equally sized children, and a
/// node is subdivided while it holds more than `max_points_per_bucket` points.
/// Empty children are kept as (empty) leaves so that any point inside the root
/// bounds maps to a leaf. The root is always subdivided at least once, so the
/// top level is never empty.
///
/// Buckets are densely numbered `0..num_buckets()`; the root is not a bucket.
#[derive(Clone, Debug)]
pub struct BucketTree {
    /// `arena[0]` is the root; bucket `b` lives at `arena[b + 1]`.
    arena: Vec<TreeNode>,
    dimensions: usize,
}

impl BucketTree {
    /// Builds a tree over `points` (one row per point).
    ///
    /// When `extents` is provided it must be arranged as
    /// `[min_0, ..., min_{d-1}, max_0, ..., max_{d-1}]` and cover all points;
    /// otherwise the point cloud's own bounding box is used. Passing explicit
    /// extents is required when later lookups (e.g. row adaptation) may probe
    /// points outside the source cloud's bounds.
    pub fn new(points: &Mat<f64>, max_points_per_bucket: usize, extents: Option<Vec<f64>>) -> Self {
        let dimensions = points.ncols();
        assert!(dimensions > 0, "points must have at least one column");
        assert!(max_points_per_bucket > 0, "max_points_per_bucket must be positive");

        let extents = extents.unwrap_or_else(|| utils::get_pointarray_extents(points.as_ref()));
        assert_eq!(extents.len(), 2 * dimensions, "extents length must be twice the dimension");

        let root = TreeNode {
            bounds: BoundingBox::from_extents(&extents),
            children: Vec::new(),
            particles: (0..points.nrows()).collect(),
        };

        let mut tree = Self {
            arena: vec![root],
            dimensions,
        };
        tree.subdivide(0, points, max_points_per_bucket, 0);

        // Rebase stored child links from arena indices to bucket indices.
        for node in tree.arena.iter_mut() {
            for child in node.children.iter_mut() {
                *child -= 1;
            }
        }

        tree
    }

    fn subdivide(&mut self, node: usize, points: &Mat<f64>, max_points: usize, depth: usize) {
        let num_children = 1usize << self.dimensions;
        let bounds = self.arena[node].bounds.clone();
        let center = bounds.center();

        let particles = std::mem::take(&mut self.arena[node].particles);

        // Child selection: bit d is set when the coordinate is at or above
        // the center along dimension d. Lookups must use the same rule.
        let mut child_particles: Vec<Vec<usize>> = vec![Vec::new(); num_children];
        for &particle in &particles {
            let mut child = 0usize;
            for d in 0..self.dimensions {
                if points[(particle, d)] >= center[d] {
                    child |= 1 << d;
                }
            }
            child_particles[child].push(particle);
        }

        for (child, bucket) in child_particles.into_iter().enumerate() {
            let mut min = vec![0.0; self.dimensions];
            let mut max = vec![0.0; self.dimensions];
            for d in 0..self.dimensions {
                if child & (1 << d) != 0 {
                    min[d] = center[d];
                    max[d] = bounds.max[d];
                } else {
                    min[d] = bounds.min[d];
                    max[d] = center[d];
                }
            }

            let id = self.arena.len();
            self.arena.push(TreeNode {
                bounds: BoundingBox::new(min, max),
                children: Vec::new(),
                particles: bucket,
            });
            self.arena[node].children.push(id);
        }

        let children = self.arena[node].children.clone();
        for id in children {
            if self.arena[id].particles.len() > max_points && depth + 1 < MAX_TREE_DEPTH {
                self.subdivide(id, points, max_points, depth + 1);
            }
        }
    }

    #[inline(always)]
    fn node(&self, bucket: usize) -> &TreeNode {
        &self.arena[bucket + 1]
    }
}

impl SpatialIndex for BucketTree {
    fn num_buckets(&self) -> usize {
        self.arena.len() - 1
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn root_children(&self) -> &[usize] {
        &self.arena[0].children
    }

    fn children(&self, bucket: usize) -> &[usize] {
        &self.node(bucket).children
    }

    fn is_leaf(&self, bucket: usize) -> bool {
        self.node(bucket).children.is_empty()
    }

    fn bounds(&self, bucket: usize) -> &BoundingBox {
        &self.node(bucket).bounds
    }

    fn leaf_particles(&self, bucket: usize) -> &[usize] {
        &self.node(bucket).particles
    }

    fn leaf_containing(&self, point: RowRef<f64>) -> Option<usize> {
        if !self.arena[0].bounds.contains(point) {
            return None;
        }

        let mut current = &self.arena[0];
        let mut bucket = 0;
        while !current.children.is_empty() {
            let center = current.bounds.center();
            let mut child = 0usize;
            for d in 0..self.dimensions {
                if point[d] >= center[d] {
                    child |= 1 << d;
                }
            }
            bucket = current.children[child];
            current = self.node(bucket);
        }
        Some(bucket)
    }

    fn subtree(&self, bucket: usize) -> Vec<usize> {
        let mut result = Vec::new();
        let mut stack = vec![bucket];
        while let Some(current) = stack.pop() {
            result.push(current);
            stack.extend_from_slice(&self.node(current).children);
        }
        result
    }
}
