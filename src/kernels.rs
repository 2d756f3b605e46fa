/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements concrete kernel functions and their faer-compatible evaluations.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::KernelFunction;
use faer::RowRef;

/// Returns the Euclidean distance between two points.
#[inline(always)]
pub fn get_distance(target: RowRef<f64>, source: RowRef<f64>) -> f64 {
    get_distance_sq(target, source).sqrt()
}

/// Returns the squared Euclidean distance between two points.
#[inline(always)]
pub fn get_distance_sq(target: RowRef<f64>, source: RowRef<f64>) -> f64 {
    let mut dist = 0.0;
    for (t, s) in target.iter().zip(source.iter()) {
        let diff = t - s;
        dist += diff * diff;
    }
    dist
}

/// Linear RBF kernel with `phi(r) = -r`.
#[derive(Clone, Debug, Copy)]
pub struct LinearRbfKernel;

impl LinearRbfKernel {
    #[inline(always)]
    pub fn phi(&self, r: f64) -> f64 {
        -r
    }
}

impl KernelFunction for LinearRbfKernel {
    #[inline(always)]
    fn evaluate(&self, target: RowRef<f64>, source: RowRef<f64>) -> f64 {
        let r = get_distance(target, source);
        self.phi(r)
    }
}

/// Multiquadric kernel with `phi(r) = sqrt(r^2 + c^2)`.
///
/// The shape parameter `c` keeps the kernel smooth at `r = 0`.
#[derive(Clone, Debug, Copy)]
pub struct MultiquadricKernel {
    pub c: f64,
}

impl MultiquadricKernel {
    #[inline(always)]
    pub fn new(c: f64) -> Self {
        Self { c }
    }

    #[inline(always)]
    pub fn eval_r2(&self, r2: f64) -> f64 {
        (r2 + self.c * self.c).sqrt()
    }
}

impl KernelFunction for MultiquadricKernel {
    #[inline(always)]
    fn evaluate(&self, target: RowRef<f64>, source: RowRef<f64>) -> f64 {
        let r2 = get_distance_sq(target, source);
        self.eval_r2(r2)
    }
}

/// Inverse multiquadric kernel with `phi(r) = 1 / sqrt(r^2 + c^2)`.
#[derive(Clone, Debug, Copy)]
pub struct InverseMultiquadricKernel {
    pub c: f64,
}

impl InverseMultiquadricKernel {
    #[inline(always)]
    pub fn new(c: f64) -> Self {
        Self { c }
    }
}

impl KernelFunction for InverseMultiquadricKernel {
    #[inline(always)]
    fn evaluate(&self, target: RowRef<f64>, source: RowRef<f64>) -> f64 {
        let r2 = get_distance_sq(target, source);
        1.0 / (r2 + self.c * self.c).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use equator::assert;

    #[test]
    fn linear_kernel_values() {
        let target = faer::mat![[0.0, 0.0]];
        let source = faer::mat![[3.0, 4.0]];
        let kernel = LinearRbfKernel;
        assert!(kernel.evaluate(target.row(0), source.row(0)) == -5.0);
        assert!(kernel.evaluate(target.row(0), target.row(0)) == 0.0);
    }

    #[test]
    fn multiquadric_kernel_values() {
        let target = faer::mat![[0.0, 0.0]];
        let source = faer::mat![[3.0, 4.0]];
        let kernel = MultiquadricKernel::new(0.5);
        let expected = (25.0f64 + 0.25).sqrt();
        assert!((kernel.evaluate(target.row(0), source.row(0)) - expected).abs() < 1e-15);
        assert!(kernel.evaluate(target.row(0), target.row(0)) == 0.5);
    }

    #[test]
    fn inverse_multiquadric_is_reciprocal() {
        let target = faer::mat![[1.0, 2.0]];
        let source = faer::mat![[-1.0, 0.5]];
        let mq = MultiquadricKernel::new(1.0);
        let imq = InverseMultiquadricKernel::new(1.0);
        let product = mq.evaluate(target.row(0), source.row(0))
            * imq.evaluate(target.row(0), source.row(0));
        assert!((product - 1.0).abs() < 1e-15);
    }
}
