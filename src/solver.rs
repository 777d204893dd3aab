use nalgebra::DMatrix;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::SMatrix;

/// Solver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub method: SolverMethod,
    /// Smallest singular value of a junction matrix below which the solve is refused
    pub singular_tolerance: f64,
    /// Condition number above which a junction is reported as ill-conditioned
    pub condition_warning: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            method: SolverMethod::Lu,
            singular_tolerance: 1e-12,
            condition_warning: 1e8,
        }
    }
}

/// Available solver methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverMethod {
    /// Direct LU decomposition
    Lu,
    /// QR decomposition
    Qr,
}

/// Solver statistics for one junction elimination
#[derive(Debug, Clone)]
pub struct SolverStats {
    pub method_used: SolverMethod,
    pub residual_norm: f64,
    pub condition_number: f64,
    pub ill_conditioned: bool,
}

#[derive(Debug, Clone, Copy, Error)]
#[error("junction matrix is singular (condition number {condition_number:.3e})")]
pub struct SingularMatrix {
    pub condition_number: f64,
}

/// Direct solver for the two-port junction that closes a connection.
///
/// Joining ports `i` and `j` imposes `a_i = b_j` and `a_j = b_i`. With
/// `P = [[0, 1], [1, 0]]` and `S_II` the 2x2 block over the joined ports,
/// the remaining ports see
///
/// ```text
/// S' = S_EE + S_EI (P - S_II)^-1 S_IE
/// ```
///
/// which accounts for every reflection round trip between the two ports.
pub struct JunctionSolver {
    config: SolverConfig,
}

impl JunctionSolver {
    /// Create a new solver with default configuration
    pub fn new() -> Self {
        JunctionSolver {
            config: SolverConfig::default(),
        }
    }

    /// Create a new solver with custom configuration
    pub fn with_config(config: SolverConfig) -> Self {
        JunctionSolver { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Join ports `i` and `j` of `matrix` and return the matrix over the
    /// remaining ports, in their original relative order.
    pub fn eliminate(&self, matrix: &SMatrix, i: usize, j: usize) -> Result<(SMatrix, SolverStats), SingularMatrix> {
        let n = matrix.nrows();
        debug_assert!(i != j && i < n && j < n);

        let joined = [i, j];
        let keep: Vec<usize> = (0..n).filter(|&k| k != i && k != j).collect();

        let junction = DMatrix::from_fn(2, 2, |r, c| {
            let permutation = if r == c { 0.0 } else { 1.0 };
            Complex64::new(permutation, 0.0) - matrix[(joined[r], joined[c])]
        });
        let incoming = DMatrix::from_fn(2, keep.len(), |r, c| matrix[(joined[r], keep[c])]);

        let condition_number = condition_number(&junction);
        let smallest = junction.singular_values().iter().cloned().fold(f64::INFINITY, f64::min);
        if !smallest.is_finite() || smallest <= self.config.singular_tolerance {
            return Err(SingularMatrix { condition_number });
        }

        let solution = match self.config.method {
            SolverMethod::Lu => junction.clone().lu().solve(&incoming),
            SolverMethod::Qr => junction.clone().qr().solve(&incoming),
        }
        .ok_or(SingularMatrix { condition_number })?;

        let residual_norm = (&junction * &solution - &incoming).norm();

        let reduced = DMatrix::from_fn(keep.len(), keep.len(), |r, c| {
            let (a, b) = (keep[r], keep[c]);
            matrix[(a, b)] + matrix[(a, i)] * solution[(0, c)] + matrix[(a, j)] * solution[(1, c)]
        });

        Ok((reduced, SolverStats {
            method_used: self.config.method,
            residual_norm,
            condition_number,
            ill_conditioned: condition_number > self.config.condition_warning,
        }))
    }
}

impl Default for JunctionSolver {
    fn default() -> Self {
        Self::new()
    }
}

/// 2-norm condition number from the singular values
pub fn condition_number(matrix: &SMatrix) -> f64 {
    let singular_values = matrix.singular_values();
    let largest = singular_values.iter().cloned().fold(0.0, f64::max);
    let smallest = singular_values.iter().cloned().fold(f64::INFINITY, f64::min);

    if smallest > 0.0 {
        largest / smallest
    } else {
        f64::INFINITY
    }
}
