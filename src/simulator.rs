use std::fs::File;
use std::path::Path;
use std::time::Instant;

use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::circuit::{Circuit, PinRef};
use crate::cli::OutputFormat;
use crate::error::{Result, SimError};
use crate::model::{SMatrix, SParameterMethod};
use crate::reduction::Subcircuit;
use crate::SPEED_OF_LIGHT;

/// Axis a result is reported against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Frequency,
    Wavelength,
}

impl Domain {
    pub fn column(&self) -> &'static str {
        match self {
            Domain::Frequency => "frequency",
            Domain::Wavelength => "wavelength",
        }
    }
}

/// Power transfer between the monitored pins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub domain: Domain,
    /// Frequencies in Hz or wavelengths in m, ascending
    pub points: Vec<f64>,
    /// |S(input, output)|^2, or its base-10 logarithm
    pub ratios: Vec<f64>,
}

/// Options for a single `Simulator::simulate` call.
///
/// Exactly one of `freq` and `freqs` must be set.
#[derive(Debug, Clone, Default)]
pub struct SimulateOptions {
    /// Report log10 of the power ratio
    pub db: bool,
    pub freq: Option<f64>,
    pub freqs: Option<Vec<f64>>,
    pub method: SParameterMethod,
}

impl SimulateOptions {
    /// Simulate a single frequency
    pub fn at(freq: f64) -> Self {
        SimulateOptions {
            freq: Some(freq),
            ..Self::default()
        }
    }

    /// Simulate an explicit frequency sequence
    pub fn over(freqs: Vec<f64>) -> Self {
        SimulateOptions {
            freqs: Some(freqs),
            ..Self::default()
        }
    }

    pub fn db(mut self, db: bool) -> Self {
        self.db = db;
        self
    }

    pub fn method(mut self, method: SParameterMethod) -> Self {
        self.method = method;
        self
    }

    fn frequencies(&self) -> Result<Vec<f64>> {
        match (self.freq, &self.freqs) {
            (Some(freq), None) => Ok(vec![freq]),
            (None, Some(freqs)) => Ok(freqs.clone()),
            _ => Err(SimError::AmbiguousFrequencyInput),
        }
    }
}

/// Positive, finite and strictly increasing
fn validate_grid(frequencies: &[f64]) -> Result<()> {
    if frequencies.is_empty() {
        return Err(SimError::InvalidFrequencyGrid("no frequencies given".to_string()));
    }
    if let Some(bad) = frequencies.iter().find(|f| !f.is_finite() || **f <= 0.0) {
        return Err(SimError::InvalidFrequencyGrid(format!("{} is not a positive frequency", bad)));
    }
    if let Some(pair) = frequencies.windows(2).find(|pair| pair[1] <= pair[0]) {
        return Err(SimError::InvalidFrequencyGrid(format!(
            "frequencies must increase ({} followed by {})",
            pair[0], pair[1]
        )));
    }
    Ok(())
}

/// Measures power transfer between two pins of a circuit.
///
/// The monitored pins must be external pins of the circuit; each call
/// reduces a fresh snapshot of the circuit.
#[derive(Debug, Clone, Default)]
pub struct Simulator {
    input: Option<PinRef>,
    output: Option<PinRef>,
}

impl Simulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A simulator already bound to both monitored pins
    pub fn between(input: PinRef, output: PinRef) -> Self {
        Simulator {
            input: Some(input),
            output: Some(output),
        }
    }

    pub fn connect_input(&mut self, pin: PinRef) {
        self.input = Some(pin);
    }

    pub fn connect_output(&mut self, pin: PinRef) {
        self.output = Some(pin);
    }

    pub fn input(&self) -> Option<PinRef> {
        self.input
    }

    pub fn output(&self) -> Option<PinRef> {
        self.output
    }

    /// Resolve the monitored pins against `circuit`
    fn monitored(&self, circuit: &Circuit) -> Result<(PinRef, PinRef)> {
        let input = self.input.ok_or(SimError::Unconnected("input"))?;
        let output = self.output.ok_or(SimError::Unconnected("output"))?;

        for pin in [input, output] {
            let instance = circuit
                .component(pin.component)
                .ok_or_else(|| SimError::UnknownComponent(pin.component.0.to_string()))?;
            if pin.index >= instance.pins.len() {
                return Err(SimError::UnknownPin {
                    component: instance.name.clone(),
                    pin: pin.index.to_string(),
                });
            }
            if circuit.is_connected(pin) {
                return Err(SimError::NotExposed(circuit.pin_label(pin)));
            }
        }

        Ok((input, output))
    }

    /// Reduced matrices at `frequencies` and the pins indexing them
    pub fn generate(
        &self,
        circuit: &Circuit,
        frequencies: &[f64],
        method: SParameterMethod,
    ) -> Result<(Vec<SMatrix>, Vec<PinRef>)> {
        self.monitored(circuit)?;
        let subcircuit = circuit.subcircuit();
        let matrices = subcircuit.reduce(frequencies, method)?;
        Ok((matrices, subcircuit.pin_refs().to_vec()))
    }

    /// Power ratio from the input pin to the output pin at each requested frequency
    pub fn simulate(&self, circuit: &Circuit, options: &SimulateOptions) -> Result<SimulationResult> {
        let frequencies = options.frequencies()?;
        validate_grid(&frequencies)?;
        let (input, output) = self.monitored(circuit)?;

        info!(
            "Simulating '{}' over {} frequencies ({:?})",
            circuit.title,
            frequencies.len(),
            options.method
        );
        let start_time = Instant::now();

        let ratios = power_ratios(&circuit.subcircuit(), input, output, &frequencies, options.method, options.db)?;

        info!("Simulation completed in {:.3}ms", start_time.elapsed().as_secs_f64() * 1000.0);

        Ok(SimulationResult {
            domain: Domain::Frequency,
            points: frequencies,
            ratios,
        })
    }
}

fn power_ratios(
    subcircuit: &Subcircuit,
    input: PinRef,
    output: PinRef,
    frequencies: &[f64],
    method: SParameterMethod,
    db: bool,
) -> Result<Vec<f64>> {
    let pins = subcircuit.pin_refs();
    let index = |pin: PinRef| {
        pins.iter()
            .position(|&p| p == pin)
            .ok_or_else(|| SimError::NotExposed(pin.to_string()))
    };
    let (i, o) = (index(input)?, index(output)?);

    let matrices = subcircuit.reduce(frequencies, method)?;
    Ok(matrices
        .iter()
        .map(|matrix| {
            let ratio = matrix[(i, o)].norm_sqr();
            if db {
                ratio.log10()
            } else {
                ratio
            }
        })
        .collect())
}

/// `num` evenly spaced points from `start` to `stop` inclusive
fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    if num == 1 {
        return vec![start];
    }
    let step = (stop - start) / (num - 1) as f64;
    (0..num)
        .map(|k| if k == num - 1 { stop } else { start + k as f64 * step })
        .collect()
}

/// Simulator over an evenly spaced grid of frequencies or wavelengths.
///
/// Bounds below 1 are wavelengths in meters; the grid is then spaced
/// evenly in wavelength and results are reported against it, ascending.
#[derive(Debug, Clone)]
pub struct SweepSimulator {
    simulator: Simulator,
    domain: Domain,
    grid: Vec<f64>,
    frequencies: Vec<f64>,
}

impl SweepSimulator {
    pub fn new(start: f64, stop: f64, num: usize) -> Result<Self> {
        if num == 0 {
            return Err(SimError::InvalidSweep("at least one point is required".to_string()));
        }
        if !(start.is_finite() && stop.is_finite()) || start <= 0.0 || stop <= 0.0 {
            return Err(SimError::InvalidSweep(format!("bounds {} and {} must be positive", start, stop)));
        }
        if start > stop || (start == stop && num > 1) {
            return Err(SimError::InvalidSweep(format!("start {} must be below stop {}", start, stop)));
        }

        if start < 1.0 && stop >= 1.0 {
            return Err(SimError::InvalidSweep(format!(
                "bounds {} and {} mix a wavelength with a frequency",
                start, stop
            )));
        }

        let domain = if start < 1.0 { Domain::Wavelength } else { Domain::Frequency };
        let grid = linspace(start, stop, num);
        let frequencies = match domain {
            Domain::Frequency => grid.clone(),
            Domain::Wavelength => grid.iter().rev().map(|wavelength| SPEED_OF_LIGHT / wavelength).collect(),
        };

        Ok(SweepSimulator {
            simulator: Simulator::new(),
            domain,
            grid,
            frequencies,
        })
    }

    pub fn between(mut self, input: PinRef, output: PinRef) -> Self {
        self.simulator = Simulator::between(input, output);
        self
    }

    pub fn connect_input(&mut self, pin: PinRef) {
        self.simulator.connect_input(pin);
    }

    pub fn connect_output(&mut self, pin: PinRef) {
        self.simulator.connect_output(pin);
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Sweep points in the caller's units, ascending
    pub fn grid(&self) -> &[f64] {
        &self.grid
    }

    /// Frequencies handed to the simulator, ascending
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn simulate(&self, circuit: &Circuit, db: bool, method: SParameterMethod) -> Result<SimulationResult> {
        let options = SimulateOptions::over(self.frequencies.clone()).db(db).method(method);
        let result = self.simulator.simulate(circuit, &options)?;
        Ok(self.to_result(result.ratios))
    }

    fn run(
        &self,
        subcircuit: &Subcircuit,
        input: PinRef,
        output: PinRef,
        method: SParameterMethod,
        db: bool,
    ) -> Result<SimulationResult> {
        let ratios = power_ratios(subcircuit, input, output, &self.frequencies, method, db)?;
        Ok(self.to_result(ratios))
    }

    /// Pair ratios, computed in ascending frequency, with the sweep grid
    fn to_result(&self, mut ratios: Vec<f64>) -> SimulationResult {
        if self.domain == Domain::Wavelength {
            ratios.reverse();
        }
        SimulationResult {
            domain: self.domain,
            points: self.grid.clone(),
            ratios,
        }
    }
}

impl Default for SweepSimulator {
    /// 2000 points across 1500-1600 nm
    fn default() -> Self {
        let grid = linspace(1.5e-6, 1.6e-6, 2000);
        let frequencies = grid.iter().rev().map(|wavelength| SPEED_OF_LIGHT / wavelength).collect();
        SweepSimulator {
            simulator: Simulator::new(),
            domain: Domain::Wavelength,
            grid,
            frequencies,
        }
    }
}

/// Monte Carlo configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    pub runs: usize,
    /// Seed for parameter draws; entropy-seeded when absent
    pub seed: Option<u64>,
    /// Evaluate trials concurrently once every trial's parameters are drawn
    pub parallel_trials: bool,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        MonteCarloConfig {
            runs: 10,
            seed: None,
            parallel_trials: false,
        }
    }
}

/// Repeats a sweep with freshly drawn component variations.
///
/// Trial 0 uses nominal parameters. Every later trial first redraws the
/// Monte Carlo parameters of every component in the circuit, then sweeps a
/// snapshot of it with the perturbed matrices.
#[derive(Debug, Clone)]
pub struct MonteCarloSweepSimulator {
    sweep: SweepSimulator,
    config: MonteCarloConfig,
}

impl MonteCarloSweepSimulator {
    pub fn new(start: f64, stop: f64, num: usize) -> Result<Self> {
        Ok(MonteCarloSweepSimulator {
            sweep: SweepSimulator::new(start, stop, num)?,
            config: MonteCarloConfig::default(),
        })
    }

    pub fn from_sweep(sweep: SweepSimulator, config: MonteCarloConfig) -> Self {
        MonteCarloSweepSimulator { sweep, config }
    }

    pub fn with_config(mut self, config: MonteCarloConfig) -> Self {
        self.config = config;
        self
    }

    pub fn between(mut self, input: PinRef, output: PinRef) -> Self {
        self.sweep = self.sweep.between(input, output);
        self
    }

    pub fn connect_input(&mut self, pin: PinRef) {
        self.sweep.connect_input(pin);
    }

    pub fn connect_output(&mut self, pin: PinRef) {
        self.sweep.connect_output(pin);
    }

    pub fn sweep(&self) -> &SweepSimulator {
        &self.sweep
    }

    pub fn config(&self) -> &MonteCarloConfig {
        &self.config
    }

    /// Run `config.runs` trials, in trial order
    pub fn simulate(&self, circuit: &mut Circuit, db: bool) -> Result<Vec<SimulationResult>> {
        let (input, output) = self.sweep.simulator.monitored(circuit)?;
        let runs = self.config.runs;

        let mut rng = match self.config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        info!("Starting Monte Carlo sweep of '{}': {} runs", circuit.title, runs);
        let start_time = Instant::now();

        let method_for = |trial: usize| {
            if trial == 0 {
                SParameterMethod::Nominal
            } else {
                SParameterMethod::MonteCarlo
            }
        };

        let results = if self.config.parallel_trials {
            // Draws stay sequential; only the evaluation of the snapshots is concurrent
            let mut trials = Vec::with_capacity(runs);
            for trial in 0..runs {
                if trial > 0 {
                    circuit.regenerate_monte_carlo_parameters(&mut rng);
                }
                trials.push(circuit.subcircuit());
            }
            trials
                .par_iter()
                .enumerate()
                .map(|(trial, subcircuit)| {
                    debug!("Monte Carlo trial {}", trial);
                    self.sweep.run(subcircuit, input, output, method_for(trial), db)
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            let mut results = Vec::with_capacity(runs);
            for trial in 0..runs {
                if trial > 0 {
                    circuit.regenerate_monte_carlo_parameters(&mut rng);
                }
                debug!("Monte Carlo trial {}", trial);
                results.push(self.sweep.run(&circuit.subcircuit(), input, output, method_for(trial), db)?);
            }
            results
        };

        info!(
            "Monte Carlo sweep completed with {} runs in {:.3}ms",
            results.len(),
            start_time.elapsed().as_secs_f64() * 1000.0
        );

        Ok(results)
    }
}

/// Point-wise statistics across Monte Carlo trials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleStatistics {
    pub domain: Domain,
    pub points: Vec<f64>,
    pub mean: Vec<f64>,
    /// Population standard deviation
    pub std_dev: Vec<f64>,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

/// All trials must share one sweep grid
fn check_common_grid(trials: &[SimulationResult]) -> Result<&SimulationResult> {
    let first = trials
        .first()
        .ok_or_else(|| SimError::InvalidSweep("no trials to combine".to_string()))?;
    if trials
        .iter()
        .any(|trial| trial.domain != first.domain || trial.points != first.points || trial.ratios.len() != first.points.len())
    {
        return Err(SimError::InvalidSweep("trials do not share a sweep grid".to_string()));
    }
    Ok(first)
}

impl EnsembleStatistics {
    pub fn from_trials(trials: &[SimulationResult]) -> Result<Self> {
        let first = check_common_grid(trials)?;
        let count = trials.len() as f64;
        let points = first.points.len();

        let mut stats = EnsembleStatistics {
            domain: first.domain,
            points: first.points.clone(),
            mean: Vec::with_capacity(points),
            std_dev: Vec::with_capacity(points),
            min: Vec::with_capacity(points),
            max: Vec::with_capacity(points),
        };

        for k in 0..points {
            let values = trials.iter().map(|trial| trial.ratios[k]);
            let mean = values.clone().sum::<f64>() / count;
            let variance = values.clone().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count;

            stats.mean.push(mean);
            stats.std_dev.push(variance.sqrt());
            stats.min.push(values.clone().fold(f64::INFINITY, f64::min));
            stats.max.push(values.fold(f64::NEG_INFINITY, f64::max));
        }

        Ok(stats)
    }
}

/// Export simulation results to file
pub fn export_results(results: &[SimulationResult], filename: &Path, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Csv => export_csv(results, filename),
        OutputFormat::Json => export_json(results, filename),
    }
}

/// One row per sweep point, one ratio column per trial
fn export_csv(results: &[SimulationResult], filename: &Path) -> Result<()> {
    use csv::Writer;

    let first = check_common_grid(results)?;
    let mut writer = Writer::from_writer(File::create(filename)?);

    let mut header = vec![first.domain.column().to_string()];
    if results.len() == 1 {
        header.push("ratio".to_string());
    } else {
        header.extend((0..results.len()).map(|trial| format!("trial_{}", trial)));
    }
    writer.write_record(&header)?;

    for (k, point) in first.points.iter().enumerate() {
        let mut record = vec![point.to_string()];
        record.extend(results.iter().map(|result| result.ratios[k].to_string()));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    info!("Results exported to CSV: {}", filename.display());
    Ok(())
}

fn export_json(results: &[SimulationResult], filename: &Path) -> Result<()> {
    let file = File::create(filename)?;
    serde_json::to_writer_pretty(file, results)?;

    info!("Results exported to JSON: {}", filename.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::ComponentId;
    use crate::elements::{DirectionalCoupler, Waveguide};

    const FREQ: f64 = 193.4e12;

    /// Bus pin1 -> pin3, ring fed back from pin4 into pin2
    fn ring_circuit(coupling: f64, length: f64, loss: f64) -> (Circuit, PinRef, PinRef) {
        let mut circuit = Circuit::new("ring".to_string());
        let dc = circuit.add_component("dc", DirectionalCoupler::new(coupling)).unwrap();
        let ring = circuit
            .add_component("ring", Waveguide::new(length).with_loss(loss))
            .unwrap();
        circuit.connect(circuit.pin_at(dc, 3), circuit.pin_at(ring, 0)).unwrap();
        circuit.connect(circuit.pin_at(ring, 1), circuit.pin_at(dc, 1)).unwrap();
        let (input, output) = (circuit.pin_at(dc, 0), circuit.pin_at(dc, 2));
        (circuit, input, output)
    }

    fn all_pass_ring() -> (Circuit, PinRef, PinRef) {
        ring_circuit(0.1, 60e-6, 300.0)
    }

    fn single_waveguide() -> (Circuit, PinRef, PinRef) {
        let mut circuit = Circuit::new("straight".to_string());
        let wg = circuit.add_component("wg", Waveguide::new(100e-6)).unwrap();
        (circuit, PinRef { component: wg, index: 0 }, PinRef { component: wg, index: 1 })
    }

    #[test]
    fn test_simulate_requires_connected_pins() {
        let (circuit, input, _) = single_waveguide();

        let mut simulator = Simulator::new();
        let err = simulator.simulate(&circuit, &SimulateOptions::at(FREQ)).unwrap_err();
        assert!(matches!(err, SimError::Unconnected("input")));

        simulator.connect_input(input);
        let err = simulator.generate(&circuit, &[FREQ], SParameterMethod::Nominal).unwrap_err();
        assert!(matches!(err, SimError::Unconnected("output")));
    }

    #[test]
    fn test_simulate_rejects_ambiguous_frequencies() {
        let (circuit, input, output) = single_waveguide();
        let simulator = Simulator::between(input, output);

        let both = SimulateOptions {
            freq: Some(FREQ),
            freqs: Some(vec![FREQ]),
            ..SimulateOptions::default()
        };
        assert!(matches!(simulator.simulate(&circuit, &both), Err(SimError::AmbiguousFrequencyInput)));
        assert!(matches!(
            simulator.simulate(&circuit, &SimulateOptions::default()),
            Err(SimError::AmbiguousFrequencyInput)
        ));
    }

    #[test]
    fn test_simulate_rejects_bad_grid() {
        let (circuit, input, output) = single_waveguide();
        let simulator = Simulator::between(input, output);

        for freqs in [vec![], vec![FREQ, FREQ], vec![FREQ * 1.1, FREQ], vec![-1.0]] {
            assert!(matches!(
                simulator.simulate(&circuit, &SimulateOptions::over(freqs)),
                Err(SimError::InvalidFrequencyGrid(_))
            ));
        }
    }

    #[test]
    fn test_monitored_pin_must_be_external() {
        let (circuit, input, _) = all_pass_ring();
        let internal = PinRef { component: ComponentId(1), index: 0 };
        let simulator = Simulator::between(input, internal);

        let err = simulator.simulate(&circuit, &SimulateOptions::at(FREQ)).unwrap_err();
        assert!(matches!(err, SimError::NotExposed(ref pin) if pin == "ring.pin1"));
    }

    #[test]
    fn test_generate_returns_reduced_pins() {
        let (circuit, input, output) = all_pass_ring();
        let simulator = Simulator::between(input, output);

        let (matrices, pins) = simulator.generate(&circuit, &[FREQ, FREQ + 1e9], SParameterMethod::Nominal).unwrap();

        assert_eq!(pins, vec![input, output]);
        assert_eq!(matrices.len(), 2);
        assert_eq!(matrices[0].shape(), (2, 2));
    }

    #[test]
    fn test_power_ratio_and_log() {
        let (circuit, input, output) = single_waveguide();
        let simulator = Simulator::between(input, output);

        let linear = simulator.simulate(&circuit, &SimulateOptions::at(FREQ)).unwrap();
        let log = simulator.simulate(&circuit, &SimulateOptions::at(FREQ).db(true)).unwrap();

        // 700 dB/m over 100 um is 0.07 dB
        assert_eq!(linear.points, vec![FREQ]);
        assert!((linear.ratios[0] - 10f64.powf(-0.007)).abs() < 1e-12);
        assert!((log.ratios[0] - linear.ratios[0].log10()).abs() < 1e-15);
    }

    #[test]
    fn test_ring_notch_conserves_power_without_loss() {
        let (circuit, input, output) = ring_circuit(0.2, 40e-6, 0.0);
        let freqs: Vec<f64> = (0..50).map(|k| 192e12 + k as f64 * 5e10).collect();
        let through = Simulator::between(input, output)
            .simulate(&circuit, &SimulateOptions::over(freqs.clone()))
            .unwrap();
        let reflected = Simulator::between(input, input)
            .simulate(&circuit, &SimulateOptions::over(freqs))
            .unwrap();

        for (t, r) in through.ratios.iter().zip(&reflected.ratios) {
            assert!((t + r - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sweep_wavelength_grid() {
        let sweep = SweepSimulator::new(1.5e-6, 1.6e-6, 3).unwrap();

        assert_eq!(sweep.domain(), Domain::Wavelength);
        let expected = [1.5e-6, 1.55e-6, 1.6e-6];
        for (point, want) in sweep.grid().iter().zip(expected) {
            assert!((point - want).abs() < 1e-18);
        }
        assert!(sweep.frequencies().windows(2).all(|pair| pair[0] < pair[1]));
        assert!((sweep.frequencies()[0] - SPEED_OF_LIGHT / 1.6e-6).abs() < 1.0);
    }

    #[test]
    fn test_sweep_inversion_on_straight_waveguide() {
        let (circuit, input, output) = single_waveguide();
        let sweep = SweepSimulator::new(1.5e-6, 1.6e-6, 3).unwrap().between(input, output);

        let result = sweep.simulate(&circuit, false, SParameterMethod::Nominal).unwrap();

        assert_eq!(result.domain, Domain::Wavelength);
        assert_eq!(result.points.len(), 3);
        assert!((result.points[1] - 1.55e-6).abs() < 1e-18);
        assert!(result.points.windows(2).all(|pair| pair[0] < pair[1]));
        for ratio in &result.ratios {
            assert!((ratio - 10f64.powf(-0.007)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_sweep_ratios_follow_wavelength() {
        let (circuit, input, output) = all_pass_ring();
        let sweep = SweepSimulator::new(1.54e-6, 1.56e-6, 401).unwrap().between(input, output);
        let result = sweep.simulate(&circuit, false, SParameterMethod::Nominal).unwrap();

        let simulator = Simulator::between(input, output);
        for (wavelength, ratio) in result.points.iter().zip(&result.ratios) {
            let direct = simulator
                .simulate(&circuit, &SimulateOptions::at(SPEED_OF_LIGHT / wavelength))
                .unwrap();
            assert!((direct.ratios[0] - ratio).abs() < 1e-9);
        }
        // The ring must actually resolve something over this span
        let spread = result.ratios.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
            - result.ratios.iter().cloned().fold(f64::INFINITY, f64::min);
        assert!(spread > 0.05);
    }

    #[test]
    fn test_sweep_frequency_mode() {
        let sweep = SweepSimulator::new(190e12, 195e12, 6).unwrap();
        assert_eq!(sweep.domain(), Domain::Frequency);
        assert_eq!(sweep.grid(), sweep.frequencies());
        assert_eq!(sweep.grid()[5], 195e12);
    }

    #[test]
    fn test_sweep_rejects_bad_bounds() {
        assert!(SweepSimulator::new(1.6e-6, 1.5e-6, 10).is_err());
        assert!(SweepSimulator::new(1.5e-6, 1.6e-6, 0).is_err());
        assert!(SweepSimulator::new(-1.0, 1.6e-6, 10).is_err());
        assert!(matches!(SweepSimulator::new(1.5e-6, 193e12, 10), Err(SimError::InvalidSweep(_))));
        assert!(SweepSimulator::new(1.55e-6, 1.55e-6, 1).is_ok());
    }

    #[test]
    fn test_default_sweep() {
        let sweep = SweepSimulator::default();
        assert_eq!(sweep.grid().len(), 2000);
        assert_eq!(sweep.domain(), Domain::Wavelength);
    }

    #[test]
    fn test_monte_carlo_first_trial_is_nominal() {
        let (mut circuit, input, output) = all_pass_ring();
        let config = MonteCarloConfig {
            runs: 5,
            seed: Some(42),
            parallel_trials: false,
        };
        let monte_carlo = MonteCarloSweepSimulator::new(1.54e-6, 1.56e-6, 25)
            .unwrap()
            .between(input, output)
            .with_config(config);

        let nominal = SweepSimulator::new(1.54e-6, 1.56e-6, 25)
            .unwrap()
            .between(input, output)
            .simulate(&circuit, false, SParameterMethod::Nominal)
            .unwrap();
        let trials = monte_carlo.simulate(&mut circuit, false).unwrap();

        assert_eq!(trials.len(), 5);
        assert_eq!(trials[0], nominal);
        assert!(trials[1..].iter().all(|trial| trial.ratios != nominal.ratios));
    }

    #[test]
    fn test_monte_carlo_is_reproducible_and_parallel_safe() {
        let run = |parallel_trials: bool| {
            let (mut circuit, input, output) = all_pass_ring();
            MonteCarloSweepSimulator::new(1.54e-6, 1.56e-6, 11)
                .unwrap()
                .between(input, output)
                .with_config(MonteCarloConfig {
                    runs: 4,
                    seed: Some(9),
                    parallel_trials,
                })
                .simulate(&mut circuit, true)
                .unwrap()
        };

        assert_eq!(run(false), run(true));
    }

    #[test]
    fn test_monte_carlo_requires_pins() {
        let (mut circuit, _, _) = all_pass_ring();
        let monte_carlo = MonteCarloSweepSimulator::new(1.5e-6, 1.6e-6, 3).unwrap();
        assert!(matches!(monte_carlo.simulate(&mut circuit, false), Err(SimError::Unconnected(_))));
    }

    #[test]
    fn test_ensemble_statistics() {
        let trial = |ratios: Vec<f64>| SimulationResult {
            domain: Domain::Frequency,
            points: vec![1.0, 2.0],
            ratios,
        };
        let stats = EnsembleStatistics::from_trials(&[trial(vec![0.2, 1.0]), trial(vec![0.4, 1.0])]).unwrap();

        assert!((stats.mean[0] - 0.3).abs() < 1e-12);
        assert!((stats.std_dev[0] - 0.1).abs() < 1e-12);
        assert_eq!(stats.std_dev[1], 0.0);
        assert_eq!(stats.min, vec![0.2, 1.0]);
        assert_eq!(stats.max, vec![0.4, 1.0]);

        let mismatched = SimulationResult {
            domain: Domain::Frequency,
            points: vec![1.0, 3.0],
            ratios: vec![0.0, 0.0],
        };
        assert!(EnsembleStatistics::from_trials(&[trial(vec![0.0, 0.0]), mismatched]).is_err());
        assert!(EnsembleStatistics::from_trials(&[]).is_err());
    }

    #[test]
    fn test_export_csv_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![
            SimulationResult {
                domain: Domain::Wavelength,
                points: vec![1.5e-6, 1.6e-6],
                ratios: vec![0.5, 0.25],
            },
            SimulationResult {
                domain: Domain::Wavelength,
                points: vec![1.5e-6, 1.6e-6],
                ratios: vec![0.75, 0.125],
            },
        ];

        let csv_path = dir.path().join("sweep.csv");
        export_results(&results, &csv_path, OutputFormat::Csv).unwrap();
        let csv = std::fs::read_to_string(&csv_path).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("wavelength,trial_0,trial_1"));
        assert_eq!(lines.next(), Some("0.0000015,0.5,0.75"));

        let json_path = dir.path().join("sweep.json");
        export_results(&results, &json_path, OutputFormat::Json).unwrap();
        let parsed: Vec<SimulationResult> = serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].domain, Domain::Wavelength);
        assert_eq!(parsed[1].ratios, vec![0.75, 0.125]);
        assert!((parsed[0].points[1] - 1.6e-6).abs() < 1e-20);
    }
}
