/////////////////////////////////////////////////////////////////////////////////////////////
//
// Exposes the public API for the hierarchical (H2) kernel matrix crate.
//
// Created on: 15 Nov 2025     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Hierarchical (H2) Kernel Matrices
//!
//! This crate builds hierarchical block low-rank (H2) approximations of dense
//! kernel matrices and applies them as fast matrix-vector products.
//!
//! Given a row (target) and a column (source) particle set, a spatial index
//! over the sources, and an expansion provider, the builder classifies every
//! bucket pair as near or far with a `theta` admissibility condition. Near
//! pairs interact through dense leaf-level blocks; far pairs interact through
//! compressed expansion transfers. The multiply then runs in two sweeps over
//! the hierarchy instead of touching all `N x M` pairs.
//!
//! The crate also assembles the *extended sparse system*: a single sparse
//! matrix over the particle coordinates and all expansion coefficients whose
//! solution embeds the H2 operator, in the form used by sparse direct and
//! preconditioned iterative solvers.
//!
//! # Features:
//! - Arbitrary spatial dimension (binary tree, quadtree, octree, ...)
//! - Pluggable spatial indexes and expansion schemes through trait contracts
//! - Chebyshev interpolation expansions for smooth (non-oscillatory) kernels
//! - Rectangular operators: the row set need not equal the column set
//! - Cheap re-targeting of a built matrix onto new row particles
//!
//! # Example: Fast Matrix-Vector Product
//!
//! ```
//! use ferreus_h2::{BucketTree, ChebyshevExpansions, H2Matrix, H2Params, MultiquadricKernel};
//! use faer::{Col, Mat};
//! use rand::{Rng, SeedableRng};
//! use rand::rngs::StdRng;
//!
//! // Generate random source points in 2D
//! let num_points = 500;
//! let dim = 2;
//! let mut rng = StdRng::seed_from_u64(42);
//!
//! let points = Mat::from_fn(num_points, dim, |_, _| rng.random_range(0.0..1.0));
//! let weights = Col::from_fn(num_points, |_| rng.random_range(-1.0..1.0));
//!
//! // Partition the sources into buckets of at most 32 points
//! let tree = BucketTree::new(&points, 32, None);
//!
//! // Interpolation order defines the number of Chebyshev nodes in each
//! // dimension used in the far-field approximation
//! let expansions = ChebyshevExpansions::new(5, dim, MultiquadricKernel::new(0.5));
//!
//! // Build the H2 approximation of the kernel matrix over the points
//! let mut h2 = H2Matrix::new(&points, &points, &tree, expansions, H2Params::new_defaults())
//!     .unwrap();
//!
//! // target += H * weights
//! let mut target = Col::zeros(num_points);
//! h2.matrix_vector_multiply(&mut target, weights.as_ref()).unwrap();
//!
//! println!("applied {} x {} operator: {:?}", h2.nrows(), h2.ncols(), h2.stats());
//! ```
//!
//! # Example: Extended Sparse System
//!
//! ```
//! use ferreus_h2::{BucketTree, ChebyshevExpansions, H2Matrix, H2Params, MultiquadricKernel};
//! use faer::{Col, Mat};
//! use rand::{Rng, SeedableRng};
//! use rand::rngs::StdRng;
//!
//! let mut rng = StdRng::seed_from_u64(7);
//! let points = Mat::from_fn(200, 2, |_, _| rng.random_range(0.0..1.0));
//! let weights = Col::from_fn(200, |_| rng.random_range(-1.0..1.0));
//!
//! let tree = BucketTree::new(&points, 16, None);
//! let expansions = ChebyshevExpansions::new(4, 2, MultiquadricKernel::new(0.5));
//! let mut h2 = H2Matrix::new(&points, &points, &tree, expansions, H2Params::new_defaults())
//!     .unwrap();
//!
//! // The sparse matrix A satisfies A * [x; W; g] = [y; 0; 0] where y = H * x
//! let system = h2.gen_extended_system().unwrap();
//! assert_eq!(system.matrix.nrows(), system.order());
//!
//! // Check the identity against the state of an actual multiply
//! let mut target = Col::zeros(200);
//! h2.matrix_vector_multiply(&mut target, weights.as_ref()).unwrap();
//! h2.verify_extended_system(&system).unwrap();
//! ```
//!
//! # References
//!
//! 1. Fong, W., & Darve, E. (2009).
//!    *[The black-box fast multipole method.](https://mc.stanford.edu/cgi-bin/images/f/fa/Darve_bbfmm_2009.pdf)*
//!    *Journal of Computational Physics*, **228**(23), 8712–8725.
//!
//! 2. Sushnikova, D., & Oseledets, I. (2018).
//!    *["Compress and eliminate" solver for symmetric positive definite sparse matrices.](https://arxiv.org/abs/1603.09133)*
//!    *SIAM Journal on Scientific Computing*, **40**(3), A1742–A1762.

mod bucket_tree;
mod chebyshev;
mod expansions;
mod extended;
mod geometry;
mod h2_matrix;
mod kernels;
mod traits;
mod utils;

#[doc(inline)]
pub use {
    bucket_tree::BucketTree,
    expansions::ChebyshevExpansions,
    extended::ExtendedSystem,
    geometry::{BoundingBox, ThetaCondition},
    h2_matrix::{H2Error, H2Matrix, H2Params, H2Stats},
    kernels::{
        get_distance, get_distance_sq, InverseMultiquadricKernel, LinearRbfKernel,
        MultiquadricKernel,
    },
    traits::{Expansions, KernelFunction, SpatialIndex},
};
