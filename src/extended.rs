/////////////////////////////////////////////////////////////////////////////////////////////
//
// Assembles the sparse extended system representation of an H2 matrix.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::h2_matrix::{H2Error, H2Matrix};
use crate::traits::{Expansions, SpatialIndex};
use faer::sparse::{SparseColMat, Triplet};
use faer::{Col, ColRef};

/// One sparse square matrix coupling the particle coordinates `x` with every
/// bucket's outgoing (`W`) and incoming (`g`) expansion coefficients, such
/// that `A * [x; W; g] = [y; 0; 0]` reproduces the H2 matrix-vector product
/// `y = H * x`.
///
/// Column blocks are ordered `[x | W | g]`; row blocks are ordered
/// `[targets | g consistency | W consistency]`. Solver layers use this form
/// to build preconditioners without densifying `H`.
pub struct ExtendedSystem {
    pub matrix: SparseColMat<usize, f64>,

    /// Number of particle coordinates (leading block).
    pub size_x: usize,

    /// Total outgoing coefficients (`num_buckets * expansion_size`).
    pub size_w: usize,

    /// Total incoming coefficients (`num_buckets * expansion_size`).
    pub size_g: usize,
}

impl ExtendedSystem {
    /// Order of the square extended matrix.
    pub fn order(&self) -> usize {
        self.size_x + self.size_w + self.size_g
    }
}

impl<'a, E: Expansions, S: SpatialIndex> H2Matrix<'a, E, S> {
    /// Assembles the extended sparse system for this matrix.
    ///
    /// Row semantics (M2M is the transposed L2L):
    ///
    /// - target rows: `sum P2P * x_strong + L2P * g_self = y`
    /// - g rows: `sum M2L * W_weak + L2L * g_parent - g_self = 0`
    /// - W rows: `P2M * x_self - W_self = 0` (leaf) or
    ///   `sum L2L_child^T * W_child - W_self = 0` (internal)
    ///
    /// The system is only defined when the matrix is square (the row and
    /// column particle counts agree). A reservation pre-pass counts the
    /// nonzeros of every column; a mismatch against the fill is a structural
    /// invariant violation and panics.
    pub fn gen_extended_system(&self) -> Result<ExtendedSystem, H2Error> {
        let size_x = self.col_size;
        if self.row_size != size_x {
            return Err(H2Error::DimensionMismatch {
                expected: size_x,
                actual: self.row_size,
            });
        }

        let m = self.expansion_size;
        let num_buckets = self.nodes.len();
        let size_w = num_buckets * m;
        let size_g = num_buckets * m;
        let order = size_x + size_w + size_g;

        // Column block offsets.
        let w_offset = size_x;
        let g_offset = size_x + size_w;

        // Row offsets of the per-bucket target blocks.
        let mut row_offsets = vec![0usize; num_buckets];
        let mut offset = 0;
        for bucket in 0..num_buckets {
            row_offsets[bucket] = offset;
            offset += self.nodes[bucket].row_indices.len();
        }

        // Reservation pass: per-column nonzero counts, mirroring the fill.
        let mut reserved = vec![0usize; order];
        for bucket in 0..num_buckets {
            let node = &self.nodes[bucket];

            // Identity blocks of the two consistency rows.
            for k in 0..m {
                reserved[w_offset + bucket * m + k] += 1;
                reserved[g_offset + bucket * m + k] += 1;
            }

            // M2L blocks land in the W columns of each weak partner.
            for &partner in &node.weak {
                for k in 0..m {
                    reserved[w_offset + partner * m + k] += m;
                }
            }

            if node.children.is_empty() {
                let num_rows = node.row_indices.len();

                // P2P blocks land in the coordinate columns of each strong partner.
                for &partner in &node.strong {
                    let partner_node = &self.nodes[partner];
                    for k in 0..partner_node.col_indices.len() {
                        reserved[partner_node.ext_offset + k] += num_rows;
                    }
                }

                // L2P lands in this bucket's g columns, P2M in its coordinate columns.
                for k in 0..m {
                    reserved[g_offset + bucket * m + k] += num_rows;
                }
                for k in 0..node.col_indices.len() {
                    reserved[node.ext_offset + k] += m;
                }
            } else {
                for &child in &node.children {
                    // The transposed child transfer lands in the child's W
                    // columns; the child's L2L lands in this bucket's g columns.
                    for k in 0..m {
                        reserved[w_offset + child * m + k] += m;
                        reserved[g_offset + bucket * m + k] += m;
                    }
                }
            }
        }

        let total: usize = reserved.iter().sum();
        let mut entries: Vec<(usize, usize, f64)> = Vec::with_capacity(total);

        for bucket in 0..num_buckets {
            let node = &self.nodes[bucket];
            let g_row = size_x + bucket * m;
            let w_row = size_x + size_g + bucket * m;

            // Target rows.
            if node.children.is_empty() {
                let target_row = row_offsets[bucket];

                for (k, &partner) in node.strong.iter().enumerate() {
                    let block = &node.p2p[k];
                    let col_base = self.nodes[partner].ext_offset;
                    for j in 0..block.ncols() {
                        for i in 0..block.nrows() {
                            entries.push((
                                target_row + i,
                                col_base + j,
                                block[(i, j)],
                            ));
                        }
                    }
                }

                let l2p = &node.l2p;
                for j in 0..l2p.ncols() {
                    for i in 0..l2p.nrows() {
                        entries.push((
                            target_row + i,
                            g_offset + bucket * m + j,
                            l2p[(i, j)],
                        ));
                    }
                }
            }

            // g consistency rows.
            for (k, &partner) in node.weak.iter().enumerate() {
                let block = &node.m2l[k];
                for j in 0..m {
                    for i in 0..m {
                        entries.push((
                            g_row + i,
                            w_offset + partner * m + j,
                            block[(i, j)],
                        ));
                    }
                }
            }
            if let Some(parent) = node.parent {
                let block = &node.l2l;
                for j in 0..m {
                    for i in 0..m {
                        entries.push((
                            g_row + i,
                            g_offset + parent * m + j,
                            block[(i, j)],
                        ));
                    }
                }
            }
            for i in 0..m {
                entries.push((g_row + i, g_offset + bucket * m + i, -1.0));
            }

            // W consistency rows.
            for i in 0..m {
                entries.push((w_row + i, w_offset + bucket * m + i, -1.0));
            }
            if node.children.is_empty() {
                let p2m = &node.p2m;
                for j in 0..p2m.ncols() {
                    for i in 0..m {
                        entries.push((
                            w_row + i,
                            node.ext_offset + j,
                            p2m[(i, j)],
                        ));
                    }
                }
            } else {
                for &child in &node.children {
                    let block = &self.nodes[child].l2l;
                    for j in 0..m {
                        for i in 0..m {
                            entries.push((
                                w_row + i,
                                w_offset + child * m + j,
                                block[(j, i)],
                            ));
                        }
                    }
                }
            }
        }

        // The reservation must match the fill exactly.
        let mut actual = vec![0usize; order];
        for &(_, col, _) in entries.iter() {
            actual[col] += 1;
        }
        for col in 0..order {
            assert_eq!(
                actual[col], reserved[col],
                "nonzero count mismatch in extended system column {}",
                col
            );
        }

        let triplets: Vec<Triplet<usize, usize, f64>> = entries
            .into_iter()
            .map(|(row, col, value)| Triplet::new(row, col, value))
            .collect();
        let matrix = SparseColMat::try_new_from_triplets(order, order, &triplets)
            .expect("extended system triplets are in bounds");

        Ok(ExtendedSystem {
            matrix,
            size_x,
            size_w,
            size_g,
        })
    }

    /// Lifts a source vector into extended layout: the coordinate block is
    /// permuted to extended (leaf bucket) order and the `W` and `g` blocks
    /// are zeroed.
    pub fn gen_extended_vector(&self, source: ColRef<f64>) -> Result<Col<f64>, H2Error> {
        if source.nrows() != self.col_size {
            return Err(H2Error::DimensionMismatch {
                expected: self.col_size,
                actual: source.nrows(),
            });
        }

        let order = self.col_size + 2 * self.nodes.len() * self.expansion_size;
        let mut extended = Col::zeros(order);
        for &leaf in &self.leaves {
            let node = &self.nodes[leaf];
            for (k, &col) in node.col_indices.iter().enumerate() {
                extended[node.ext_offset + k] = source[col];
            }
        }
        Ok(extended)
    }

    /// Extracts the coordinate block of an extended vector back into row
    /// particle order, inverting the permutation of
    /// [`H2Matrix::gen_extended_vector`] for square matrices.
    pub fn filter_extended_vector(&self, extended: ColRef<f64>) -> Col<f64> {
        let mut filtered = Col::zeros(self.row_size);
        for &leaf in &self.leaves {
            let node = &self.nodes[leaf];
            debug_assert_eq!(node.row_indices.len(), node.col_indices.len());
            for (k, &row) in node.row_indices.iter().enumerate() {
                filtered[row] = extended[node.ext_offset + k];
            }
        }
        filtered
    }

    /// The `[x; W; g]` state left behind by the last
    /// [`H2Matrix::matrix_vector_multiply`], in extended layout. All zero
    /// before the first multiply.
    pub fn get_internal_state(&self) -> Col<f64> {
        let m = self.expansion_size;
        let num_buckets = self.nodes.len();
        let w_offset = self.col_size;
        let g_offset = self.col_size + num_buckets * m;

        let mut state = Col::zeros(g_offset + num_buckets * m);
        for &leaf in &self.leaves {
            let node = &self.nodes[leaf];
            for k in 0..node.col_indices.len() {
                state[node.ext_offset + k] = self.scratch.source[leaf][k];
            }
        }
        for bucket in 0..num_buckets {
            for k in 0..m {
                state[w_offset + bucket * m + k] = self.scratch.w[bucket][k];
                state[g_offset + bucket * m + k] = self.scratch.g[bucket][k];
            }
        }
        state
    }

    /// Self check: applies the extended matrix to the internal state of the
    /// last multiply and verifies the result is `[y; 0; 0]` to a tolerance,
    /// where `y` is the target the multiply produced.
    ///
    /// Intended as a diagnostic on small systems; the sparse matrix is
    /// densified for the product.
    pub fn verify_extended_system(&self, system: &ExtendedSystem) -> Result<(), H2Error> {
        let state = self.get_internal_state();
        let dense = system.matrix.to_dense();
        let product = &dense * &state;

        let mut expected = Col::zeros(system.order());
        let mut offset = 0;
        for bucket in 0..self.nodes.len() {
            for k in 0..self.nodes[bucket].row_indices.len() {
                expected[offset] = self.scratch.target[bucket][k];
                offset += 1;
            }
        }

        let scale = state.norm_max().max(expected.norm_max());
        let tolerance = 1e-8 * (1.0 + scale);
        for row in 0..system.order() {
            let residual = (product[row] - expected[row]).abs();
            if residual > tolerance {
                return Err(H2Error::ExtendedSystemInconsistent { row, residual });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket_tree::BucketTree;
    use crate::expansions::ChebyshevExpansions;
    use crate::h2_matrix::H2Params;
    use crate::kernels::MultiquadricKernel;
    use equator::assert;
    use faer::prelude::*;
    use faer::{Col, Mat};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn generate_random_points(n: usize, d: usize, seed: u64) -> Mat<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Mat::from_fn(n, d, |_, _| rng.random_range(0.0..1.0))
    }

    fn random_col(n: usize, seed: u64) -> Col<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Col::from_fn(n, |_| rng.random_range(-1.0..1.0))
    }

    fn build<'a>(
        points: &'a Mat<f64>,
        tree: &'a BucketTree,
        order: usize,
        theta: f64,
    ) -> H2Matrix<'a, ChebyshevExpansions<MultiquadricKernel>, BucketTree> {
        let expansions =
            ChebyshevExpansions::new(order, points.ncols(), MultiquadricKernel::new(0.5));
        H2Matrix::new(points, points, tree, expansions, H2Params { theta }).unwrap()
    }

    #[test]
    fn extended_system_is_square_with_block_sizes() {
        let points = generate_random_points(200, 2, 31);
        let tree = BucketTree::new(&points, 16, None);
        let h2 = build(&points, &tree, 3, 0.5);

        let system = h2.gen_extended_system().unwrap();
        let m = 9;
        assert!(system.size_x == points.nrows());
        assert!(system.size_w == tree.num_buckets() * m);
        assert!(system.size_g == tree.num_buckets() * m);
        assert!(system.matrix.nrows() == system.order());
        assert!(system.matrix.ncols() == system.order());
    }

    #[test]
    fn internal_state_satisfies_the_system_after_multiply() {
        let points = generate_random_points(250, 2, 33);
        let tree = BucketTree::new(&points, 16, None);
        // Mixed regime so every block kind (P2P, L2P, M2L, L2L, P2M, M2M)
        // appears in the system.
        let mut h2 = build(&points, &tree, 4, 0.5);
        assert!(h2.stats().num_weak > 0);

        let system = h2.gen_extended_system().unwrap();

        let x = random_col(points.nrows(), 34);
        let mut target = Col::zeros(points.nrows());
        h2.matrix_vector_multiply(&mut target, x.as_ref()).unwrap();

        h2.verify_extended_system(&system).unwrap();
    }

    #[test]
    fn extended_vector_round_trips_through_filter() {
        let points = generate_random_points(150, 2, 35);
        let tree = BucketTree::new(&points, 16, None);
        let h2 = build(&points, &tree, 3, 0.5);

        let x = random_col(points.nrows(), 36);
        let extended = h2.gen_extended_vector(x.as_ref()).unwrap();
        assert!(extended.nrows() == h2.gen_extended_system().unwrap().order());

        let filtered = h2.filter_extended_vector(extended.as_ref());
        for i in 0..points.nrows() {
            assert!(filtered[i] == x[i]);
        }
    }

    #[test]
    fn dense_solve_of_extended_system_round_trips_the_source() {
        let points = generate_random_points(40, 2, 37);
        let tree = BucketTree::new(&points, 16, None);
        // All-strong regime: the coordinate block of the extended system is
        // exactly the dense kernel matrix.
        let mut h2 = build(&points, &tree, 2, 0.05);

        let x = random_col(points.nrows(), 38);
        let mut y = Col::zeros(points.nrows());
        h2.matrix_vector_multiply(&mut y, x.as_ref()).unwrap();

        let system = h2.gen_extended_system().unwrap();
        let order = system.order();

        // Target rows are in extended (leaf bucket) order, so the rhs must be
        // the leaf-permuted y; for a square matrix that permutation is exactly
        // the coordinate block of `gen_extended_vector`.
        let y_ext = h2.gen_extended_vector(y.as_ref()).unwrap();
        let mut rhs = Mat::<f64>::zeros(order, 1);
        for i in 0..points.nrows() {
            rhs[(i, 0)] = y_ext[i];
        }

        let dense = system.matrix.to_dense();
        let solution = dense.partial_piv_lu().solve(&rhs);
        let recovered = h2.filter_extended_vector(solution.col(0));

        for i in 0..points.nrows() {
            assert!((recovered[i] - x[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn rectangular_matrix_has_no_extended_system() {
        let cols = generate_random_points(120, 2, 39);
        let rows = generate_random_points(60, 2, 40);
        let tree = BucketTree::new(&cols, 16, Some(vec![0.0, 0.0, 1.0, 1.0]));
        let expansions = ChebyshevExpansions::new(3, 2, MultiquadricKernel::new(0.5));
        let h2 = H2Matrix::new(&rows, &cols, &tree, expansions, H2Params::new_defaults()).unwrap();

        match h2.gen_extended_system() {
            Err(H2Error::DimensionMismatch { expected, actual }) => {
                assert!(expected == cols.nrows());
                assert!(actual == rows.nrows());
            }
            _ => panic!("expected DimensionMismatch"),
        }
    }

    #[test]
    fn mismatched_source_length_is_an_error() {
        let points = generate_random_points(80, 2, 41);
        let tree = BucketTree::new(&points, 16, None);
        let h2 = build(&points, &tree, 3, 0.5);

        let x = random_col(points.nrows() + 3, 42);
        assert!(h2.gen_extended_vector(x.as_ref()).is_err());
    }
}
