use std::fmt;

use nalgebra::DMatrix;
use num_complex::Complex64;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Scattering matrix at a single frequency, indexed by pin order
pub type SMatrix = DMatrix<Complex64>;

/// Waveguide polarization mode a component operates in.
///
/// Pins of components in different modes cannot be joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Te,
    Tm,
}

/// Which matrix generator a simulation should query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SParameterMethod {
    /// Nominal device parameters
    #[default]
    Nominal,
    /// Parameters perturbed by the last Monte Carlo draw
    MonteCarlo,
}

/// Capability contract every device model exposes to the circuit engine.
///
/// `s_parameters` must return one square matrix per requested frequency,
/// sized to `pins().len()`. Returned matrices are expected to be passive
/// (singular values no greater than one); the reduction engine relies on
/// this for well-posed junction solves but does not enforce it.
pub trait Model: fmt::Debug + Send + Sync {
    /// Ordered pin names; the order defines matrix row and column indices
    fn pins(&self) -> Vec<String>;

    /// Scattering matrices at nominal parameters
    fn s_parameters(&self, frequencies: &[f64]) -> Result<Vec<SMatrix>>;

    /// Scattering matrices at the currently drawn Monte Carlo parameters
    fn monte_carlo_s_parameters(&self, frequencies: &[f64]) -> Result<Vec<SMatrix>> {
        self.s_parameters(frequencies)
    }

    /// Redraw the random parameter deviations used by `monte_carlo_s_parameters`
    fn regenerate_monte_carlo_parameters(&mut self, _rng: &mut dyn RngCore) {}

    fn mode(&self) -> Mode {
        Mode::Te
    }

    fn clone_box(&self) -> Box<dyn Model>;

    /// Dispatch on `method`
    fn generate(&self, frequencies: &[f64], method: SParameterMethod) -> Result<Vec<SMatrix>> {
        match method {
            SParameterMethod::Nominal => self.s_parameters(frequencies),
            SParameterMethod::MonteCarlo => self.monte_carlo_s_parameters(frequencies),
        }
    }
}

impl Clone for Box<dyn Model> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Check a model's output against its declared pin count and the frequency grid
pub fn validate_stack(component: &str, pin_count: usize, frequencies: usize, stack: &[SMatrix]) -> Result<()> {
    if stack.len() != frequencies {
        return Err(SimError::ShapeMismatch {
            component: component.to_string(),
            expected: format!("{} frequency samples", frequencies),
            found: format!("{} matrices", stack.len()),
        });
    }

    for matrix in stack {
        if matrix.nrows() != pin_count || matrix.ncols() != pin_count {
            return Err(SimError::ShapeMismatch {
                component: component.to_string(),
                expected: format!("{}x{} matrix", pin_count, pin_count),
                found: format!("{}x{} matrix", matrix.nrows(), matrix.ncols()),
            });
        }
    }

    Ok(())
}
