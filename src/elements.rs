//! Reference device models.
//!
//! These implement the `Model` contract for the handful of building blocks
//! needed to assemble rings, interferometers and delay lines. Coefficients
//! are plain fields; where they come from is up to the caller.

use std::f64::consts::{FRAC_1_SQRT_2, LOG10_E, PI};

use log::warn;
use num_complex::Complex64;
use rand::RngCore;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Mode, Model, SMatrix};
use crate::SPEED_OF_LIGHT;

fn numbered_pins(count: usize) -> Vec<String> {
    (1..=count).map(|k| format!("pin{}", k)).collect()
}

/// Draw from N(0, sigma), or zero if sigma is not a valid deviation
fn draw_deviation(sigma: f64, rng: &mut dyn RngCore, what: &str) -> f64 {
    if !sigma.is_finite() || sigma < 0.0 {
        warn!("Ignoring {} variation with invalid sigma {}", what, sigma);
        return 0.0;
    }
    match Normal::new(0.0, sigma) {
        Ok(normal) => normal.sample(rng),
        Err(e) => {
            warn!("Ignoring {} variation with sigma {}: {}", what, sigma, e);
            0.0
        }
    }
}

/// Dispersion coefficients of a strip waveguide mode, expanded around a
/// center wavelength.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactModel {
    pub center_wavelength: f64,
    pub effective_index: f64,
    pub group_index: f64,
    pub dispersion: f64,
}

impl Default for CompactModel {
    /// 500 nm x 220 nm silicon strip, TE, at 1550 nm
    fn default() -> Self {
        CompactModel {
            center_wavelength: 1.55e-6,
            effective_index: 2.44553,
            group_index: 4.19088,
            dispersion: 3.54275e-4,
        }
    }
}

impl CompactModel {
    /// Propagation constant at `frequency`
    pub fn propagation_constant(&self, frequency: f64) -> f64 {
        let lam0 = self.center_wavelength;
        let omega = 2.0 * PI * frequency;
        let omega0 = 2.0 * PI * SPEED_OF_LIGHT / lam0;
        let detuning = omega - omega0;

        2.0 * PI * self.effective_index / lam0 + (self.group_index / SPEED_OF_LIGHT) * detuning
            - (self.dispersion * lam0 * lam0 / (4.0 * PI * SPEED_OF_LIGHT)) * detuning * detuning
    }
}

fn default_loss() -> f64 {
    700.0
}

fn default_length_sigma() -> f64 {
    0.01
}

/// Straight waveguide: reflectionless two-port with dispersive phase and
/// propagation loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waveguide {
    /// Length in meters
    pub length: f64,
    #[serde(default = "default_loss")]
    pub loss_db_per_m: f64,
    #[serde(default)]
    pub coefficients: CompactModel,
    /// Standard deviation of the relative length error for Monte Carlo runs
    #[serde(default = "default_length_sigma")]
    pub length_sigma: f64,
    #[serde(default)]
    pub mode: Mode,
    #[serde(skip)]
    delta_length: f64,
}

impl Waveguide {
    pub fn new(length: f64) -> Self {
        Waveguide {
            length,
            loss_db_per_m: default_loss(),
            coefficients: CompactModel::default(),
            length_sigma: default_length_sigma(),
            mode: Mode::Te,
            delta_length: 0.0,
        }
    }

    pub fn with_loss(mut self, loss_db_per_m: f64) -> Self {
        self.loss_db_per_m = loss_db_per_m;
        self
    }

    pub fn with_coefficients(mut self, coefficients: CompactModel) -> Self {
        self.coefficients = coefficients;
        self
    }

    pub fn with_length_sigma(mut self, length_sigma: f64) -> Self {
        self.length_sigma = length_sigma;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Relative length error of the current Monte Carlo draw
    pub fn delta_length(&self) -> f64 {
        self.delta_length
    }

    fn matrices(&self, frequencies: &[f64], length: f64) -> Vec<SMatrix> {
        let alpha = self.loss_db_per_m / (20.0 * LOG10_E);
        frequencies
            .iter()
            .map(|&frequency| {
                let phase = self.coefficients.propagation_constant(frequency) * length;
                let t = Complex64::from_polar((-alpha * length).exp(), phase);
                let zero = Complex64::new(0.0, 0.0);
                SMatrix::from_row_slice(2, 2, &[zero, t, t, zero])
            })
            .collect()
    }
}

impl Model for Waveguide {
    fn pins(&self) -> Vec<String> {
        numbered_pins(2)
    }

    fn s_parameters(&self, frequencies: &[f64]) -> Result<Vec<SMatrix>> {
        Ok(self.matrices(frequencies, self.length))
    }

    fn monte_carlo_s_parameters(&self, frequencies: &[f64]) -> Result<Vec<SMatrix>> {
        Ok(self.matrices(frequencies, self.length * (1.0 + self.delta_length)))
    }

    fn regenerate_monte_carlo_parameters(&mut self, rng: &mut dyn RngCore) {
        self.delta_length = draw_deviation(self.length_sigma, rng, "length");
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn clone_box(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}

fn default_coupling_sigma() -> f64 {
    0.01
}

/// Lossless 2x2 evanescent coupler.
///
/// `pin1`/`pin2` face `pin3`/`pin4`; `pin1 -> pin3` and `pin2 -> pin4` are the
/// bar paths, the others cross with a `j` phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionalCoupler {
    /// Fraction of power crossed over, in [0, 1]
    pub coupling: f64,
    /// Standard deviation of the absolute coupling error for Monte Carlo runs
    #[serde(default = "default_coupling_sigma")]
    pub coupling_sigma: f64,
    #[serde(default)]
    pub mode: Mode,
    #[serde(skip)]
    delta_coupling: f64,
}

impl DirectionalCoupler {
    pub fn new(coupling: f64) -> Self {
        DirectionalCoupler {
            coupling,
            coupling_sigma: default_coupling_sigma(),
            mode: Mode::Te,
            delta_coupling: 0.0,
        }
    }

    pub fn with_coupling_sigma(mut self, coupling_sigma: f64) -> Self {
        self.coupling_sigma = coupling_sigma;
        self
    }

    fn matrix(coupling: f64) -> SMatrix {
        let coupling = coupling.clamp(0.0, 1.0);
        let bar = Complex64::new((1.0 - coupling).sqrt(), 0.0);
        let cross = Complex64::new(0.0, coupling.sqrt());
        let zero = Complex64::new(0.0, 0.0);

        #[rustfmt::skip]
        let values = [
            zero,  zero,  bar,   cross,
            zero,  zero,  cross, bar,
            bar,   cross, zero,  zero,
            cross, bar,   zero,  zero,
        ];
        SMatrix::from_row_slice(4, 4, &values)
    }
}

impl Model for DirectionalCoupler {
    fn pins(&self) -> Vec<String> {
        numbered_pins(4)
    }

    fn s_parameters(&self, frequencies: &[f64]) -> Result<Vec<SMatrix>> {
        Ok(vec![Self::matrix(self.coupling); frequencies.len()])
    }

    fn monte_carlo_s_parameters(&self, frequencies: &[f64]) -> Result<Vec<SMatrix>> {
        Ok(vec![Self::matrix(self.coupling + self.delta_coupling); frequencies.len()])
    }

    fn regenerate_monte_carlo_parameters(&mut self, rng: &mut dyn RngCore) {
        self.delta_coupling = draw_deviation(self.coupling_sigma, rng, "coupling");
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn clone_box(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}

/// Ideal 1x2 power splitter; `pin1` is the stem
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YBranch {
    #[serde(default)]
    pub mode: Mode,
}

impl YBranch {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Model for YBranch {
    fn pins(&self) -> Vec<String> {
        numbered_pins(3)
    }

    fn s_parameters(&self, frequencies: &[f64]) -> Result<Vec<SMatrix>> {
        let zero = Complex64::new(0.0, 0.0);
        let split = Complex64::new(FRAC_1_SQRT_2, 0.0);
        let matrix = SMatrix::from_row_slice(3, 3, &[zero, split, split, split, zero, zero, split, zero, zero]);
        Ok(vec![matrix; frequencies.len()])
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn clone_box(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}

/// Matched termination
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Terminator {
    #[serde(default)]
    pub mode: Mode,
}

impl Terminator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Model for Terminator {
    fn pins(&self) -> Vec<String> {
        numbered_pins(1)
    }

    fn s_parameters(&self, frequencies: &[f64]) -> Result<Vec<SMatrix>> {
        Ok(vec![SMatrix::zeros(1, 1); frequencies.len()])
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn clone_box(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const FREQ: f64 = SPEED_OF_LIGHT / 1.55e-6;

    fn is_unitary(matrix: &SMatrix) -> bool {
        let product = matrix.adjoint() * matrix;
        (product - SMatrix::identity(matrix.nrows(), matrix.ncols())).norm() < 1e-12
    }

    #[test]
    fn test_propagation_constant_at_center() {
        let model = CompactModel::default();
        let expected = 2.0 * PI * model.effective_index / model.center_wavelength;
        assert!((model.propagation_constant(FREQ) - expected).abs() / expected < 1e-12);
    }

    #[test]
    fn test_waveguide_loss() {
        // 700 dB/m over 1 mm is 0.7 dB
        let wg = Waveguide::new(1e-3);
        let t = wg.s_parameters(&[FREQ]).unwrap()[0][(1, 0)];
        let loss_db = -20.0 * t.norm().log10();
        assert!((loss_db - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_lossless_waveguide_is_unitary() {
        let wg = Waveguide::new(30e-6).with_loss(0.0);
        for matrix in wg.s_parameters(&[FREQ, FREQ * 1.02]).unwrap() {
            assert!(is_unitary(&matrix));
        }
    }

    #[test]
    fn test_waveguide_monte_carlo() {
        let mut wg = Waveguide::new(100e-6).with_length_sigma(0.05);
        let nominal = wg.s_parameters(&[FREQ]).unwrap();

        // No draw yet: perturbed equals nominal
        assert_eq!(wg.monte_carlo_s_parameters(&[FREQ]).unwrap(), nominal);

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        wg.regenerate_monte_carlo_parameters(&mut rng);
        let first = wg.delta_length();
        wg.regenerate_monte_carlo_parameters(&mut rng);

        assert_ne!(first, 0.0);
        assert_ne!(first, wg.delta_length());
        assert_ne!(wg.monte_carlo_s_parameters(&[FREQ]).unwrap(), nominal);
        assert_eq!(wg.s_parameters(&[FREQ]).unwrap(), nominal);
    }

    #[test]
    fn test_invalid_sigma_draws_nothing() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for sigma in [-1.0, -1e-3, f64::NAN, f64::INFINITY] {
            let mut wg = Waveguide::new(10e-6).with_length_sigma(sigma);
            wg.regenerate_monte_carlo_parameters(&mut rng);
            assert_eq!(wg.delta_length(), 0.0);
        }

        let mut dc = DirectionalCoupler::new(0.3).with_coupling_sigma(-0.2);
        dc.regenerate_monte_carlo_parameters(&mut rng);
        assert_eq!(
            dc.monte_carlo_s_parameters(&[FREQ]).unwrap(),
            dc.s_parameters(&[FREQ]).unwrap()
        );
    }

    #[test]
    fn test_coupler_is_unitary_and_symmetric() {
        for coupling in [0.0, 0.1, 0.5, 1.0] {
            let matrix = &DirectionalCoupler::new(coupling).s_parameters(&[FREQ]).unwrap()[0];
            assert!(is_unitary(matrix));
            assert_eq!(matrix, &matrix.transpose());
        }
    }

    #[test]
    fn test_coupler_monte_carlo_stays_physical() {
        let mut dc = DirectionalCoupler::new(0.999).with_coupling_sigma(0.5);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..20 {
            dc.regenerate_monte_carlo_parameters(&mut rng);
            assert!(is_unitary(&dc.monte_carlo_s_parameters(&[FREQ]).unwrap()[0]));
        }
    }

    #[test]
    fn test_ybranch_is_passive() {
        let matrix = &YBranch::new().s_parameters(&[FREQ]).unwrap()[0];
        let largest = matrix.singular_values().iter().cloned().fold(0.0, f64::max);
        assert!(largest <= 1.0 + 1e-12);
        assert_eq!(YBranch::new().pins(), vec!["pin1", "pin2", "pin3"]);
    }

    #[test]
    fn test_deserialize_waveguide_defaults() {
        let wg: Waveguide = serde_json::from_str(r#"{"length": 2e-5}"#).unwrap();
        assert_eq!(wg.length, 2e-5);
        assert_eq!(wg.loss_db_per_m, 700.0);
        assert_eq!(wg.coefficients, CompactModel::default());
        assert_eq!(wg.mode, Mode::Te);
    }
}
