/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the core H2 matrix: connectivity construction and the fast matrix-vector engine.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::geometry::ThetaCondition;
use crate::traits::{Expansions, SpatialIndex};
use faer::{Col, ColRef, Mat};
use rayon::prelude::*;
use std::fmt;

/// Errors that can occur while building or applying an H2 matrix.
#[derive(Debug)]
pub enum H2Error {
    /// A row particle could not be assigned to any leaf bucket because it
    /// lies outside the spatial index extents.
    PointOutsideIndex { point_index: usize },

    /// A supplied vector length does not match the matrix shape.
    DimensionMismatch { expected: usize, actual: usize },

    /// The extended system self check found a row whose residual exceeds
    /// the tolerance.
    ExtendedSystemInconsistent { row: usize, residual: f64 },
}

impl fmt::Display for H2Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            H2Error::PointOutsideIndex { point_index } => write!(
                f,
                "H2 construction failed: row particle at row {} lies outside the index extents",
                point_index
            ),
            H2Error::DimensionMismatch { expected, actual } => write!(
                f,
                "H2 operation failed: expected a vector of length {}, got {}",
                expected, actual
            ),
            H2Error::ExtendedSystemInconsistent { row, residual } => write!(
                f,
                "extended system self check failed at row {} with residual {:e}",
                row, residual
            ),
        }
    }
}

impl std::error::Error for H2Error {}

/// Optional parameters for tuning the H2 approximation.
#[derive(Debug, Copy, Clone)]
pub struct H2Params {
    /// Admissibility parameter in `(0, 1)`. Bucket pairs whose larger
    /// circumscribing radius exceeds `theta` times their center separation
    /// (less the smaller radius) interact directly; all other pairs go
    /// through the far-field transfer. Smaller values classify more pairs as
    /// near, which is more accurate but more expensive.
    /// When H2Params is not provided the default value is 0.5.
    pub theta: f64,
}

impl H2Params {
    pub fn new_defaults() -> Self {
        Self { theta: 0.5 }
    }
}

/// Summary counts describing a built H2 matrix.
#[derive(Debug, Copy, Clone)]
pub struct H2Stats {
    pub num_buckets: usize,
    pub num_levels: usize,
    pub num_leaves: usize,

    /// Total strong (direct) connections; at leaves these are leaf-leaf pairs.
    pub num_strong: usize,

    /// Total weak (far-field) connections.
    pub num_weak: usize,

    pub expansion_size: usize,
    pub num_rows: usize,
    pub num_cols: usize,
}

/// Per-bucket record of connectivity and transfer operators.
#[derive(Clone)]
pub(crate) struct Node {
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,

    /// Row particle indices; leaves only.
    pub(crate) row_indices: Vec<usize>,

    /// Column particle indices; leaves only.
    pub(crate) col_indices: Vec<usize>,

    /// Offset of this bucket's coordinate block in extended vectors.
    pub(crate) ext_offset: usize,

    /// Parent-to-child incoming transfer; empty for top-level buckets. Its
    /// transpose is the outgoing child-to-parent transfer.
    pub(crate) l2l: Mat<f64>,

    /// Outgoing expansion operator; leaves only.
    pub(crate) p2m: Mat<f64>,

    /// Incoming evaluation operator; leaves only.
    pub(crate) l2p: Mat<f64>,

    /// Strong partners. At leaves the list is fully expanded to leaf buckets
    /// and paired one-to-one with `p2p`.
    pub(crate) strong: Vec<usize>,
    pub(crate) p2p: Vec<Mat<f64>>,

    /// Weak partners, paired one-to-one with `m2l`.
    pub(crate) weak: Vec<usize>,
    pub(crate) m2l: Vec<Mat<f64>>,
}

/// Per-bucket working vectors for the two-sweep multiply. Kept between calls
/// so the extended system self check can inspect the last multiply.
#[derive(Clone)]
pub(crate) struct Scratch {
    /// Outgoing expansion coefficients.
    pub(crate) w: Vec<Col<f64>>,

    /// Incoming expansion coefficients.
    pub(crate) g: Vec<Col<f64>>,

    /// Scattered source values; leaves only.
    pub(crate) source: Vec<Col<f64>>,

    /// Computed target values; leaves only.
    pub(crate) target: Vec<Col<f64>>,
}

/// Hierarchical block low-rank approximation of the dense kernel matrix
/// between a row (target) and a column (source) particle set.
///
/// The matrix borrows the spatial index and the column particles for its
/// whole lifetime. [`H2Matrix::matrix_vector_multiply`] takes `&mut self`
/// because it works through internal per-bucket buffers; one structure
/// therefore serves one multiply at a time, which the borrow checker
/// enforces. Distinct `H2Matrix` values over the same index multiply
/// concurrently without restriction.
pub struct H2Matrix<'a, E: Expansions, S: SpatialIndex> {
    pub(crate) index: &'a S,
    pub(crate) col_particles: &'a Mat<f64>,
    pub(crate) expansions: E,
    pub(crate) params: H2Params,

    pub(crate) nodes: Vec<Node>,

    /// Buckets grouped by depth, top level first.
    pub(crate) levels: Vec<Vec<usize>>,

    /// Leaf buckets in ascending bucket order.
    pub(crate) leaves: Vec<usize>,

    pub(crate) scratch: Scratch,

    pub(crate) row_size: usize,
    pub(crate) col_size: usize,
    pub(crate) expansion_size: usize,
}

impl<'a, E: Expansions, S: SpatialIndex> H2Matrix<'a, E, S> {
    /// Builds the H2 approximation of the kernel matrix with rows indexed by
    /// `row_particles` and columns by `col_particles`.
    ///
    /// The index must have been built over `col_particles`. When
    /// `row_particles` and `col_particles` are the same matrix (by reference),
    /// the row partition is shared with the column partition; otherwise each
    /// row particle is located in the index, and a particle outside the
    /// indexed region is a fatal error.
    pub fn new(
        row_particles: &Mat<f64>,
        col_particles: &'a Mat<f64>,
        index: &'a S,
        expansions: E,
        params: H2Params,
    ) -> Result<Self, H2Error> {
        let num_buckets = index.num_buckets();
        let expansion_size = expansions.expansion_size();

        let mut col_indices: Vec<Vec<usize>> = vec![Vec::new(); num_buckets];
        for bucket in 0..num_buckets {
            if index.is_leaf(bucket) {
                col_indices[bucket] = index.leaf_particles(bucket).to_vec();
            }
        }

        let mut row_indices = match std::ptr::eq(row_particles, col_particles) {
            true => col_indices.clone(),
            false => Self::locate_row_particles(row_particles, index)?,
        };

        // Extended coordinate block offsets: exclusive scan of the leaf
        // column counts over bucket order.
        let mut ext_offsets = vec![0usize; num_buckets];
        let mut offset = 0;
        for bucket in 0..num_buckets {
            ext_offsets[bucket] = offset;
            offset += col_indices[bucket].len();
        }

        // Group buckets by depth and record parents.
        let mut parents: Vec<Option<usize>> = vec![None; num_buckets];
        let mut levels: Vec<Vec<usize>> = Vec::new();
        let mut current: Vec<usize> = index.root_children().to_vec();
        while !current.is_empty() {
            let mut next = Vec::new();
            for &bucket in &current {
                for &child in index.children(bucket) {
                    parents[child] = Some(bucket);
                    next.push(child);
                }
            }
            levels.push(current);
            current = next;
        }

        let mut strong: Vec<Vec<usize>> = vec![Vec::new(); num_buckets];
        let mut weak: Vec<Vec<usize>> = vec![Vec::new(); num_buckets];
        let mut p2p: Vec<Vec<Mat<f64>>> = (0..num_buckets).map(|_| Vec::new()).collect();
        let mut m2l: Vec<Vec<Mat<f64>>> = (0..num_buckets).map(|_| Vec::new()).collect();
        let mut l2l: Vec<Mat<f64>> = (0..num_buckets).map(|_| Mat::new()).collect();
        let mut p2m: Vec<Mat<f64>> = (0..num_buckets).map(|_| Mat::new()).collect();
        let mut l2p: Vec<Mat<f64>> = (0..num_buckets).map(|_| Mat::new()).collect();

        // Iterative descent. Each entry carries the strong list inherited
        // from the bucket's parent; `None` marks the top level, where all
        // sibling pairs are classified directly.
        let mut stack: Vec<(usize, Option<Vec<usize>>)> =
            index.root_children().iter().map(|&bucket| (bucket, None)).collect();

        while let Some((bucket, inherited)) = stack.pop() {
            let bounds = index.bounds(bucket);
            let condition = ThetaCondition::new(bounds, params.theta);

            if let Some(parent) = parents[bucket] {
                l2l[bucket] = expansions.l2l(bounds, index.bounds(parent));
            }

            let mut near: Vec<usize> = Vec::new();
            match &inherited {
                None => {
                    for &other in index.root_children() {
                        if condition.check(index.bounds(other)) {
                            near.push(other);
                        } else {
                            m2l[bucket].push(expansions.m2l(bounds, index.bounds(other)));
                            weak[bucket].push(other);
                        }
                    }
                }
                Some(parent_strong) => {
                    // Leaf partners stay strong; internal partners are
                    // refined one child at a time.
                    for &partner in parent_strong.iter() {
                        if index.is_leaf(partner) {
                            near.push(partner);
                        } else {
                            for &other in index.children(partner) {
                                if condition.check(index.bounds(other)) {
                                    near.push(other);
                                } else {
                                    m2l[bucket].push(expansions.m2l(bounds, index.bounds(other)));
                                    weak[bucket].push(other);
                                }
                            }
                        }
                    }
                }
            }

            if index.is_leaf(bucket) {
                p2m[bucket] =
                    expansions.p2m(bounds, &col_indices[bucket], col_particles.as_ref());
                l2p[bucket] =
                    expansions.l2p(bounds, &row_indices[bucket], row_particles.as_ref());

                // Expand remaining strong partners down to their leaves and
                // pair each with a direct interaction block.
                let mut leaf_strong: Vec<usize> = Vec::new();
                for &partner in &near {
                    if index.is_leaf(partner) {
                        p2p[bucket].push(expansions.p2p(
                            &row_indices[bucket],
                            &col_indices[partner],
                            row_particles.as_ref(),
                            col_particles.as_ref(),
                        ));
                        leaf_strong.push(partner);
                    } else {
                        for descendant in index.subtree(partner) {
                            if index.is_leaf(descendant) {
                                p2p[bucket].push(expansions.p2p(
                                    &row_indices[bucket],
                                    &col_indices[descendant],
                                    row_particles.as_ref(),
                                    col_particles.as_ref(),
                                ));
                                leaf_strong.push(descendant);
                            }
                        }
                    }
                }
                strong[bucket] = leaf_strong;
            } else {
                for &child in index.children(bucket) {
                    stack.push((child, Some(near.clone())));
                }
                strong[bucket] = near;
            }
        }

        let mut nodes = Vec::with_capacity(num_buckets);
        for bucket in 0..num_buckets {
            nodes.push(Node {
                parent: parents[bucket],
                children: index.children(bucket).to_vec(),
                row_indices: std::mem::take(&mut row_indices[bucket]),
                col_indices: std::mem::take(&mut col_indices[bucket]),
                ext_offset: ext_offsets[bucket],
                l2l: std::mem::replace(&mut l2l[bucket], Mat::new()),
                p2m: std::mem::replace(&mut p2m[bucket], Mat::new()),
                l2p: std::mem::replace(&mut l2p[bucket], Mat::new()),
                strong: std::mem::take(&mut strong[bucket]),
                p2p: std::mem::take(&mut p2p[bucket]),
                weak: std::mem::take(&mut weak[bucket]),
                m2l: std::mem::take(&mut m2l[bucket]),
            });
        }

        let leaves: Vec<usize> = (0..num_buckets).filter(|&b| index.is_leaf(b)).collect();
        let scratch = Self::new_scratch(&nodes, expansion_size);

        Ok(Self {
            index,
            col_particles,
            expansions,
            params,
            nodes,
            levels,
            leaves,
            scratch,
            row_size: row_particles.nrows(),
            col_size: col_particles.nrows(),
            expansion_size,
        })
    }

    /// Builds a new H2 matrix over a different row particle set, sharing all
    /// column-derived state (connectivity, M2L, L2L and P2M operators) with
    /// this one. Only the row partition, L2P and P2P blocks are regenerated.
    ///
    /// Multiplies through the result are identical to a fresh build over the
    /// same row particles.
    pub fn with_row_particles(&self, row_particles: &Mat<f64>) -> Result<Self, H2Error>
    where
        E: Clone,
    {
        let row_indices = match std::ptr::eq(row_particles, self.col_particles) {
            true => self
                .nodes
                .iter()
                .map(|node| node.col_indices.clone())
                .collect(),
            false => Self::locate_row_particles(row_particles, self.index)?,
        };

        let mut nodes = self.nodes.clone();
        for &leaf in &self.leaves {
            let rows = &row_indices[leaf];
            let l2p =
                self.expansions
                    .l2p(self.index.bounds(leaf), rows, row_particles.as_ref());

            // Leaf strong lists are fully expanded, so every partner is a leaf.
            let p2p: Vec<Mat<f64>> = self.nodes[leaf]
                .strong
                .iter()
                .map(|&partner| {
                    debug_assert!(self.nodes[partner].children.is_empty());
                    self.expansions.p2p(
                        rows,
                        &self.nodes[partner].col_indices,
                        row_particles.as_ref(),
                        self.col_particles.as_ref(),
                    )
                })
                .collect();

            nodes[leaf].row_indices = rows.clone();
            nodes[leaf].l2p = l2p;
            nodes[leaf].p2p = p2p;
        }

        let scratch = Self::new_scratch(&nodes, self.expansion_size);

        Ok(Self {
            index: self.index,
            col_particles: self.col_particles,
            expansions: self.expansions.clone(),
            params: self.params,
            nodes,
            levels: self.levels.clone(),
            leaves: self.leaves.clone(),
            scratch,
            row_size: row_particles.nrows(),
            col_size: self.col_size,
            expansion_size: self.expansion_size,
        })
    }

    fn locate_row_particles(
        row_particles: &Mat<f64>,
        index: &S,
    ) -> Result<Vec<Vec<usize>>, H2Error> {
        let mut row_indices: Vec<Vec<usize>> = vec![Vec::new(); index.num_buckets()];
        for i in 0..row_particles.nrows() {
            match index.leaf_containing(row_particles.row(i)) {
                Some(bucket) => row_indices[bucket].push(i),
                None => return Err(H2Error::PointOutsideIndex { point_index: i }),
            }
        }
        Ok(row_indices)
    }

    fn new_scratch(nodes: &[Node], expansion_size: usize) -> Scratch {
        Scratch {
            w: nodes.iter().map(|_| Col::zeros(expansion_size)).collect(),
            g: nodes.iter().map(|_| Col::zeros(expansion_size)).collect(),
            source: nodes
                .iter()
                .map(|node| Col::zeros(node.col_indices.len()))
                .collect(),
            target: nodes
                .iter()
                .map(|node| Col::zeros(node.row_indices.len()))
                .collect(),
        }
    }

    /// Accumulates the matrix-vector product into `target`:
    /// `target += H * source`.
    ///
    /// Runs the two-sweep evaluation: source values are scattered to the
    /// leaves, outgoing expansions are formed bottom-up, incoming expansions
    /// top-down (every outgoing coefficient is complete before any far-field
    /// transfer reads it), and the leaf pass combines the incoming expansion
    /// with the direct blocks. Buckets within a level are processed in
    /// parallel; accumulation over each bucket's connection list follows the
    /// list order, so repeated calls are bitwise reproducible.
    pub fn matrix_vector_multiply(
        &mut self,
        target: &mut Col<f64>,
        source: ColRef<f64>,
    ) -> Result<(), H2Error> {
        if source.nrows() != self.col_size {
            return Err(H2Error::DimensionMismatch {
                expected: self.col_size,
                actual: source.nrows(),
            });
        }
        if target.nrows() != self.row_size {
            return Err(H2Error::DimensionMismatch {
                expected: self.row_size,
                actual: target.nrows(),
            });
        }

        // Scatter the source vector into per-leaf buffers.
        for &leaf in &self.leaves {
            let node = &self.nodes[leaf];
            for (k, &col) in node.col_indices.iter().enumerate() {
                self.scratch.source[leaf][k] = source[col];
            }
        }

        // Upward sweep, deepest level first.
        let expansion_size = self.expansion_size;
        for level in self.levels.iter().rev() {
            let nodes = &self.nodes;
            let w = &self.scratch.w;
            let source_buffers = &self.scratch.source;

            let updates: Vec<(usize, Col<f64>)> = level
                .par_iter()
                .map(|&bucket| {
                    let node = &nodes[bucket];
                    let value = if node.children.is_empty() {
                        node.p2m.as_ref() * source_buffers[bucket].as_ref()
                    } else {
                        let mut acc = Col::zeros(expansion_size);
                        for &child in &node.children {
                            acc = acc + nodes[child].l2l.transpose() * w[child].as_ref();
                        }
                        acc
                    };
                    (bucket, value)
                })
                .collect();

            for (bucket, value) in updates {
                self.scratch.w[bucket] = value;
            }
        }

        // Downward sweep, top level first.
        for level in self.levels.iter() {
            let nodes = &self.nodes;
            let w = &self.scratch.w;
            let g = &self.scratch.g;

            let updates: Vec<(usize, Col<f64>)> = level
                .par_iter()
                .map(|&bucket| {
                    let node = &nodes[bucket];
                    let mut acc = match node.parent {
                        Some(parent) => node.l2l.as_ref() * g[parent].as_ref(),
                        None => Col::zeros(expansion_size),
                    };
                    for (k, &partner) in node.weak.iter().enumerate() {
                        acc = acc + node.m2l[k].as_ref() * w[partner].as_ref();
                    }
                    (bucket, acc)
                })
                .collect();

            for (bucket, value) in updates {
                self.scratch.g[bucket] = value;
            }
        }

        // Leaf pass: incoming expansion plus direct interactions.
        let leaf_results: Vec<(usize, Col<f64>)> = {
            let nodes = &self.nodes;
            let g = &self.scratch.g;
            let source_buffers = &self.scratch.source;

            self.leaves
                .par_iter()
                .map(|&leaf| {
                    let node = &nodes[leaf];
                    let mut acc = node.l2p.as_ref() * g[leaf].as_ref();
                    for (k, &partner) in node.strong.iter().enumerate() {
                        acc = acc + node.p2p[k].as_ref() * source_buffers[partner].as_ref();
                    }
                    (leaf, acc)
                })
                .collect()
        };

        // Gather, accumulating into the caller's vector.
        for (leaf, value) in leaf_results {
            for (k, &row) in self.nodes[leaf].row_indices.iter().enumerate() {
                target[row] += value[k];
            }
            self.scratch.target[leaf] = value;
        }

        Ok(())
    }

    /// Summary counts for diagnostics.
    pub fn stats(&self) -> H2Stats {
        H2Stats {
            num_buckets: self.nodes.len(),
            num_levels: self.levels.len(),
            num_leaves: self.leaves.len(),
            num_strong: self.nodes.iter().map(|node| node.strong.len()).sum(),
            num_weak: self.nodes.iter().map(|node| node.weak.len()).sum(),
            expansion_size: self.expansion_size,
            num_rows: self.row_size,
            num_cols: self.col_size,
        }
    }

    /// Number of rows (target particles).
    pub fn nrows(&self) -> usize {
        self.row_size
    }

    /// Number of columns (source particles).
    pub fn ncols(&self) -> usize {
        self.col_size
    }
}
