/////////////////////////////////////////////////////////////////////////////////////////////
//
// Provides utility routines for bounding box extents, row selection, and dense kernel blocks.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::KernelFunction;
use faer::{Mat, MatRef};

/// Computes the axis aligned bounding box (AABB) extents of a matrix of points.
///
/// Returns a flat vector containing the minimum and maximum values along each column (dimension)
/// of the input matrix. The result is arranged as:
///
/// `[min_0, min_1, ..., min_n, max_0, max_1, ..., max_n]`
///
/// where `n` is the number of columns in the matrix.
#[inline(always)]
pub fn get_pointarray_extents(points: MatRef<f64>) -> Vec<f64> {
    let ncols = points.ncols();

    // The first half of the vector stores mins, the second half stores maxs.
    let mut extents: Vec<f64> = vec![0.0; 2 * ncols];

    for col in 0..ncols {
        extents[col] = points[(0, col)];
        extents[col + ncols] = points[(0, col)];
    }

    for row in points.row_iter() {
        for (col, item) in row.iter().enumerate() {
            if *item < extents[col] {
                extents[col] = *item;
            }
            if *item > extents[col + ncols] {
                extents[col + ncols] = *item;
            }
        }
    }

    extents
}

/// Gathers the given rows of a point matrix into a new matrix.
#[inline(always)]
pub fn select_mat_rows(existing_mat: MatRef<f64>, row_indices: &[usize]) -> Mat<f64> {
    Mat::from_fn(row_indices.len(), existing_mat.ncols(), |i, j| {
        existing_mat[(row_indices[i], j)]
    })
}

/// Evaluates the dense kernel matrix between two point sets.
#[inline(always)]
pub fn get_kernel_matrix<K>(
    target_points: MatRef<f64>,
    source_points: MatRef<f64>,
    kernel_function: &K,
) -> Mat<f64>
where
    K: KernelFunction,
{
    let m = target_points.nrows();
    let n = source_points.nrows();

    let mut kernel_matrix = Mat::<f64>::zeros(m, n);

    for j in 0..n {
        let source = source_points.row(j);

        for i in 0..m {
            let target = target_points.row(i);

            kernel_matrix[(i, j)] = kernel_function.evaluate(target, source);
        }
    }

    kernel_matrix
}

/// Evaluates the dense kernel block between index subsets of two point sets.
#[inline(always)]
pub fn get_kernel_block<K>(
    row_indices: &[usize],
    col_indices: &[usize],
    row_points: MatRef<f64>,
    col_points: MatRef<f64>,
    kernel_function: &K,
) -> Mat<f64>
where
    K: KernelFunction,
{
    let mut kernel_block = Mat::<f64>::zeros(row_indices.len(), col_indices.len());

    for (j, &col) in col_indices.iter().enumerate() {
        let source = col_points.row(col);

        for (i, &row) in row_indices.iter().enumerate() {
            let target = row_points.row(row);

            kernel_block[(i, j)] = kernel_function.evaluate(target, source);
        }
    }

    kernel_block
}

/// Generates the cartesian product of a slice of values repeated `num_columns` times.
#[inline(always)]
pub fn cartesian_product<T>(values: &[T], num_columns: usize) -> Mat<T>
where
    T: Clone,
{
    let base = values.len();
    let total_rows = base.pow(num_columns as u32);

    Mat::from_fn(total_rows, num_columns, |i, j| {
        let index = (i / base.pow((num_columns - j - 1) as u32)) % base;
        values[index].clone()
    })
}
