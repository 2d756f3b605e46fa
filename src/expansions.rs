/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements a Chebyshev interpolation based provider of the H2 transfer operators.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::geometry::BoundingBox;
use crate::traits::{Expansions, KernelFunction};
use crate::{chebyshev, utils};
use faer::{Mat, MatRef};

/// Kernel independent expansion provider based on tensor-product Chebyshev
/// interpolation, in the manner of the black-box FMM.
///
/// A bucket's outgoing and incoming expansions are values at the `p^d`
/// Chebyshev nodes of its bounding box, so the far-field transfer between two
/// buckets is simply the kernel evaluated between their node grids. Higher
/// interpolation orders are more accurate but every operator block grows as
/// `p^d`.
#[derive(Clone, Debug)]
pub struct ChebyshevExpansions<K: KernelFunction> {
    interpolation_order: usize,
    dimensions: usize,
    kernel: K,

    /// Tensor-product Chebyshev nodes in `[-1, 1]^d` (shape `p^d x d`).
    nodes_nd: Mat<f64>,

    /// Chebyshev polynomials of the first kind evaluated at the 1D nodes.
    polynomial_nodes: Mat<f64>,
}

impl<K: KernelFunction> ChebyshevExpansions<K> {
    pub fn new(interpolation_order: usize, dimensions: usize, kernel: K) -> Self {
        assert!(interpolation_order > 0, "interpolation order must be positive");
        assert!(dimensions > 0, "dimensions must be positive");

        let nodes = chebyshev::generate_chebyshev_nodes(interpolation_order);
        let nodes_nd = utils::cartesian_product(&nodes, dimensions);
        let polynomial_nodes = chebyshev::evaluate_chebyshev_polynomials(interpolation_order, &nodes);

        Self {
            interpolation_order,
            dimensions,
            kernel,
            nodes_nd,
            polynomial_nodes,
        }
    }

    pub fn interpolation_order(&self) -> usize {
        self.interpolation_order
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Interpolation coefficients of the given points onto the Chebyshev
    /// nodes of `bounds` (shape `N x p^d`).
    fn coefficients(&self, bounds: &BoundingBox, points: MatRef<f64>) -> Mat<f64> {
        chebyshev::interpolation_coefficients(
            self.interpolation_order,
            points,
            bounds,
            &self.polynomial_nodes,
        )
    }
}

impl<K: KernelFunction> Expansions for ChebyshevExpansions<K> {
    fn expansion_size(&self) -> usize {
        self.interpolation_order.pow(self.dimensions as u32)
    }

    fn p2m(
        &self,
        bounds: &BoundingBox,
        col_indices: &[usize],
        col_particles: MatRef<f64>,
    ) -> Mat<f64> {
        let points = utils::select_mat_rows(col_particles, col_indices);
        self.coefficients(bounds, points.as_ref()).transpose().to_owned()
    }

    fn l2p(
        &self,
        bounds: &BoundingBox,
        row_indices: &[usize],
        row_particles: MatRef<f64>,
    ) -> Mat<f64> {
        let points = utils::select_mat_rows(row_particles, row_indices);
        self.coefficients(bounds, points.as_ref())
    }

    fn l2l(&self, child: &BoundingBox, parent: &BoundingBox) -> Mat<f64> {
        let child_nodes = chebyshev::scale_nodes_to_box(&self.nodes_nd, child);
        self.coefficients(parent, child_nodes.as_ref())
    }

    fn m2l(&self, target: &BoundingBox, source: &BoundingBox) -> Mat<f64> {
        let target_nodes = chebyshev::scale_nodes_to_box(&self.nodes_nd, target);
        let source_nodes = chebyshev::scale_nodes_to_box(&self.nodes_nd, source);
        utils::get_kernel_matrix(target_nodes.as_ref(), source_nodes.as_ref(), &self.kernel)
    }

    fn p2p(
        &self,
        row_indices: &[usize],
        col_indices: &[usize],
        row_particles: MatRef<f64>,
        col_particles: MatRef<f64>,
    ) -> Mat<f64> {
        utils::get_kernel_block(
            row_indices,
            col_indices,
            row_particles,
            col_particles,
            &self.kernel,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::MultiquadricKernel;
    use equator::assert;
    use faer::Col;

    fn child_and_parent() -> (BoundingBox, BoundingBox) {
        let parent = BoundingBox::new(vec![0.0, 0.0], vec![2.0, 2.0]);
        let child = BoundingBox::new(vec![1.0, 0.0], vec![2.0, 1.0]);
        (child, parent)
    }

    #[test]
    fn operator_shapes() {
        let expansions = ChebyshevExpansions::new(3, 2, MultiquadricKernel::new(0.5));
        let (child, parent) = child_and_parent();
        let particles = faer::mat![[0.1, 0.2], [1.5, 0.5], [1.9, 1.8], [0.4, 1.1]];

        assert!(expansions.expansion_size() == 9);

        let p2m = expansions.p2m(&parent, &[0, 2], particles.as_ref());
        assert!(p2m.nrows() == 9);
        assert!(p2m.ncols() == 2);

        let l2p = expansions.l2p(&parent, &[1, 2, 3], particles.as_ref());
        assert!(l2p.nrows() == 3);
        assert!(l2p.ncols() == 9);

        let l2l = expansions.l2l(&child, &parent);
        assert!(l2l.nrows() == 9);
        assert!(l2l.ncols() == 9);

        let m2l = expansions.m2l(&child, &parent);
        assert!(m2l.nrows() == 9);
        assert!(m2l.ncols() == 9);

        let p2p = expansions.p2p(&[0, 1], &[2], particles.as_ref(), particles.as_ref());
        assert!(p2p.nrows() == 2);
        assert!(p2p.ncols() == 1);
    }

    #[test]
    fn p2p_matches_direct_kernel_evaluation() {
        let kernel = MultiquadricKernel::new(0.25);
        let expansions = ChebyshevExpansions::new(3, 2, kernel);
        let rows = faer::mat![[0.0, 0.0], [0.5, 0.5]];
        let cols = faer::mat![[1.0, 1.0], [0.25, 0.75]];

        let block = expansions.p2p(&[1, 0], &[0, 1], rows.as_ref(), cols.as_ref());
        for i in 0..2 {
            for j in 0..2 {
                let expected = kernel.evaluate(rows.row(1 - i), cols.row(j));
                assert!((block[(i, j)] - expected).abs() < 1e-15);
            }
        }
    }

    /// The parent-to-child transfer must agree with interpolating directly on
    /// the parent box. Polynomial interpolation makes this exact for smooth
    /// node values up to rounding.
    #[test]
    fn l2l_composes_with_direct_parent_interpolation() {
        let order = 4;
        let expansions = ChebyshevExpansions::new(order, 2, MultiquadricKernel::new(1.0));
        let (child, parent) = child_and_parent();

        let eval_points = faer::mat![[1.2, 0.3], [1.8, 0.9], [1.5, 0.5]];

        // Interpolate a polynomial field from the parent nodes directly, and
        // through the child's nodes.
        let parent_nodes = chebyshev::scale_nodes_to_box(&expansions.nodes_nd, &parent);
        let f = |x: f64, y: f64| x * x - 2.0 * x * y + 3.0 * y + 1.0;
        let parent_values =
            Col::from_fn(parent_nodes.nrows(), |i| f(parent_nodes[(i, 0)], parent_nodes[(i, 1)]));

        let direct = expansions.coefficients(&parent, eval_points.as_ref()) * &parent_values;

        let l2l = expansions.l2l(&child, &parent);
        let child_values = &l2l * &parent_values;
        let via_child = expansions.coefficients(&child, eval_points.as_ref()) * &child_values;

        for i in 0..eval_points.nrows() {
            assert!((direct[i] - via_child[i]).abs() < 1e-10);
        }
    }
}
