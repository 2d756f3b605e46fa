/////////////////////////////////////////////////////////////////////////////////////////////
//
// Builds tensor-product Chebyshev interpolation operators over bounding boxes.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::geometry::BoundingBox;
use crate::utils;
use faer::{Mat, MatRef};

// # References
// [1] W. Fong, E. Darve, The black-box fast multipole method, Journal of Computational Physics 228 (23) (2009) 8712-8725.

/// Generates Chebyshev nodes between -1 and 1 of T_n(x) for the given interpolation order.
pub(crate) fn generate_chebyshev_nodes(interpolation_order: usize) -> Vec<f64> {
    (0..interpolation_order)
        .rev()
        .map(|i| {
            let theta = std::f64::consts::PI * (i as f64 + 0.5) / interpolation_order as f64;
            theta.cos()
        })
        .collect()
}

/// Calculates Tn(x), the chebyshev polynomials of the first kind,
/// for k between 0 and interpolation order -1 inclusive.
///
/// Uses the recurrence relation:
///  T_0(x) = 1 \n
///  T_1(x) = x \n
///  T_{n+1}(x) = 2xT_n(x) - T_{n-1}(x) for n > 1
pub(crate) fn evaluate_chebyshev_polynomials(num_columns: usize, values: &[f64]) -> Mat<f64> {
    let num_rows = values.len();
    let mut tn_x = Mat::<f64>::zeros(num_rows, num_columns);

    for i in 0..num_rows {
        for j in 0..num_columns {
            let value = if j == 0 {
                1.0
            } else if j == 1 {
                values[i]
            } else {
                2.0 * values[i] * tn_x[(i, j - 1)] - tn_x[(i, j - 2)]
            };
            tn_x[(i, j)] = value;
        }
    }

    tn_x
}

/// Applies the linear transformation to normalize Chebyshev evaluations into interpolation basis.
/// Returns the S(x) matrix used for scaling/interpolating.
pub(crate) fn calculate_sn(
    tn_x: Mat<f64>,
    polynomial_nodes: &Mat<f64>,
    interpolation_order: usize,
) -> Mat<f64> {
    let mut sn = tn_x * polynomial_nodes.transpose();

    sn.col_iter_mut().for_each(|col| {
        col.iter_mut().for_each(|element| {
            *element = (*element * 2.0 - 1.0) / interpolation_order as f64;
        });
    });
    sn
}

/// Scales the tensor-product Chebyshev nodes from `[-1, 1]^d` into the
/// physical coordinates of a bounding box.
pub(crate) fn scale_nodes_to_box(nodes_nd: &Mat<f64>, bounds: &BoundingBox) -> Mat<f64> {
    let center = bounds.center();
    let half_widths = bounds.half_widths();

    Mat::from_fn(nodes_nd.nrows(), nodes_nd.ncols(), |i, d| {
        center[d] + half_widths[d] * nodes_nd[(i, d)]
    })
}

/// Calculates the coefficients to map points in a bounding box to the
/// tensor-product Chebyshev nodes of the box.
///
/// Returns a matrix of interpolation coefficients (`N x p^d`), where each row
/// contains the tensor-product weights used to interpolate the corresponding
/// input point onto the Chebyshev basis of the box. Degenerate boxes with a
/// zero width along a dimension are scaled as if that width were one.
pub(crate) fn interpolation_coefficients(
    interpolation_order: usize,
    points: MatRef<f64>,
    bounds: &BoundingBox,
    polynomial_nodes: &Mat<f64>,
) -> Mat<f64> {
    let dimensions = bounds.dimensions();
    let num_points = points.nrows();
    let center = bounds.center();
    let half_widths: Vec<f64> = bounds
        .half_widths()
        .into_iter()
        .map(|w| if w == 0.0 { 1.0 } else { w })
        .collect();

    // Scale points to the [-1, 1]^d hypercube.
    let scaled = Mat::from_fn(num_points, dimensions, |i, d| {
        (points[(i, d)] - center[d]) / half_widths[d]
    });

    let mut one_d_transfer_coefficients: Vec<Mat<f64>> = Vec::new();

    for d in 0..dimensions {
        let column_vec: Vec<f64> = (0..num_points).map(|i| scaled[(i, d)]).collect();
        let tn_x = evaluate_chebyshev_polynomials(interpolation_order, &column_vec);
        let sn = calculate_sn(tn_x, polynomial_nodes, interpolation_order);

        one_d_transfer_coefficients.push(sn);
    }

    let num_columns = interpolation_order.pow(dimensions as u32);
    let indices: Vec<usize> = (0..interpolation_order).collect();

    let tensor_product_indices = utils::cartesian_product::<usize>(&indices, dimensions);

    let mut transfer_coefficients = Mat::<f64>::zeros(num_points, num_columns);

    transfer_coefficients
        .row_iter_mut()
        .enumerate()
        .for_each(|(i, row)| {
            row.iter_mut().enumerate().for_each(|(idx, element)| {
                *element = 1.0;

                let wanted_indices = tensor_product_indices.row(idx);

                for (d, coeffs) in one_d_transfer_coefficients.iter().enumerate() {
                    let poly_idx = wanted_indices[d];
                    *element *= coeffs[(i, poly_idx)];
                }
            });
        });

    transfer_coefficients
}

#[cfg(test)]
mod tests {
    use super::*;
    use equator::assert;

    #[test]
    fn nodes_are_ascending_and_symmetric() {
        let nodes = generate_chebyshev_nodes(5);
        assert!(nodes.len() == 5);
        for i in 1..nodes.len() {
            assert!(nodes[i] > nodes[i - 1]);
        }
        assert!((nodes[0] + nodes[4]).abs() < 1e-15);
        assert!(nodes[2].abs() < 1e-15);
    }

    #[test]
    fn polynomial_recurrence_matches_closed_form() {
        let values = vec![-0.7, 0.0, 0.3, 1.0];
        let tn_x = evaluate_chebyshev_polynomials(4, &values);
        for (i, &x) in values.iter().enumerate() {
            assert!((tn_x[(i, 0)] - 1.0).abs() < 1e-14);
            assert!((tn_x[(i, 1)] - x).abs() < 1e-14);
            assert!((tn_x[(i, 2)] - (2.0 * x * x - 1.0)).abs() < 1e-14);
            assert!((tn_x[(i, 3)] - (4.0 * x * x * x - 3.0 * x)).abs() < 1e-14);
        }
    }

    #[test]
    fn interpolation_is_exact_for_low_degree_polynomials_1d() {
        let order = 4;
        let nodes = generate_chebyshev_nodes(order);
        let polynomial_nodes = evaluate_chebyshev_polynomials(order, &nodes);

        let bounds = BoundingBox::new(vec![2.0], vec![6.0]);
        let f = |x: f64| 0.5 * x * x - 3.0 * x + 1.0;

        let node_points = scale_nodes_to_box(&utils::cartesian_product(&nodes, 1), &bounds);
        let eval_points = faer::mat![[2.5], [4.0], [5.9]];

        let coefficients = interpolation_coefficients(
            order,
            eval_points.as_ref(),
            &bounds,
            &polynomial_nodes,
        );

        for i in 0..eval_points.nrows() {
            let mut approx = 0.0;
            for j in 0..order {
                approx += coefficients[(i, j)] * f(node_points[(j, 0)]);
            }
            assert!((approx - f(eval_points[(i, 0)])).abs() < 1e-12);
        }
    }

    #[test]
    fn interpolation_is_exact_for_low_degree_polynomials_2d() {
        let order = 3;
        let nodes = generate_chebyshev_nodes(order);
        let polynomial_nodes = evaluate_chebyshev_polynomials(order, &nodes);

        let bounds = BoundingBox::new(vec![-1.0, 0.0], vec![3.0, 2.0]);
        let f = |x: f64, y: f64| x * y + 2.0 * x - y + 0.25;

        let node_points = scale_nodes_to_box(&utils::cartesian_product(&nodes, 2), &bounds);
        let eval_points = faer::mat![[0.0, 0.5], [2.5, 1.9], [-0.9, 0.1]];

        let coefficients = interpolation_coefficients(
            order,
            eval_points.as_ref(),
            &bounds,
            &polynomial_nodes,
        );

        for i in 0..eval_points.nrows() {
            let mut approx = 0.0;
            for j in 0..node_points.nrows() {
                approx += coefficients[(i, j)] * f(node_points[(j, 0)], node_points[(j, 1)]);
            }
            assert!((approx - f(eval_points[(i, 0)], eval_points[(i, 1)])).abs() < 1e-12);
        }
    }

    #[test]
    fn degenerate_box_width_does_not_produce_nan() {
        let order = 3;
        let nodes = generate_chebyshev_nodes(order);
        let polynomial_nodes = evaluate_chebyshev_polynomials(order, &nodes);

        let bounds = BoundingBox::new(vec![0.0, 1.0], vec![2.0, 1.0]);
        let points = faer::mat![[1.0, 1.0]];

        let coefficients =
            interpolation_coefficients(order, points.as_ref(), &bounds, &polynomial_nodes);
        for j in 0..coefficients.ncols() {
            assert!(coefficients[(0, j)].is_finite());
        }
    }
}
