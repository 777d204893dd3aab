use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::circuit::Circuit;
use crate::elements::{DirectionalCoupler, Terminator, Waveguide, YBranch};
use crate::error::{Result, SimError};
use crate::model::Model;
use crate::reduction::ReductionConfig;
use crate::simulator::{MonteCarloConfig, Simulator};

/// Device model of a described component, selected by `kind`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementSpec {
    Waveguide(Waveguide),
    DirectionalCoupler(DirectionalCoupler),
    YBranch(YBranch),
    Terminator(Terminator),
}

impl ElementSpec {
    fn into_model(self) -> Box<dyn Model> {
        match self {
            ElementSpec::Waveguide(model) => Box::new(model),
            ElementSpec::DirectionalCoupler(model) => Box::new(model),
            ElementSpec::YBranch(model) => Box::new(model),
            ElementSpec::Terminator(model) => Box::new(model),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub name: String,
    #[serde(flatten)]
    pub element: ElementSpec,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SweepSpec {
    pub start: f64,
    pub stop: f64,
    pub num: usize,
}

fn default_title() -> String {
    "untitled".to_string()
}

/// A circuit written down as JSON.
///
/// ```json
/// {
///   "title": "all-pass ring",
///   "components": [
///     {"name": "dc", "kind": "directional_coupler", "coupling": 0.1},
///     {"name": "ring", "kind": "waveguide", "length": 6e-5}
///   ],
///   "connections": [["dc.pin4", "ring.pin1"], ["ring.pin2", "dc.pin2"]],
///   "input": "dc.pin1",
///   "output": "dc.pin3",
///   "sweep": {"start": 1.5e-6, "stop": 1.6e-6, "num": 2000}
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitDescription {
    #[serde(default = "default_title")]
    pub title: String,
    pub components: Vec<ComponentSpec>,
    #[serde(default)]
    pub connections: Vec<[String; 2]>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub sweep: Option<SweepSpec>,
    pub monte_carlo: Option<MonteCarloConfig>,
    #[serde(default)]
    pub reduction: ReductionConfig,
}

/// Split `component.pin`
fn split_pin(spec: &str) -> Result<(&str, &str)> {
    spec.split_once('.')
        .filter(|(component, pin)| !component.is_empty() && !pin.is_empty())
        .ok_or_else(|| SimError::Description(format!("pin reference '{}' is not of the form component.pin", spec)))
}

impl CircuitDescription {
    pub fn from_file<P: AsRef<Path>>(filename: P) -> Result<Self> {
        let content = fs::read_to_string(filename.as_ref())?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Wire up the circuit and bind the monitored pins, if named
    pub fn build(&self) -> Result<(Circuit, Simulator)> {
        let mut circuit = Circuit::with_config(self.title.clone(), self.reduction.clone());

        for component in &self.components {
            circuit.add_boxed(&component.name, component.element.clone().into_model())?;
        }

        for [a, b] in &self.connections {
            circuit.connect_names(split_pin(a)?, split_pin(b)?)?;
        }

        let mut simulator = Simulator::new();
        if let Some(input) = &self.input {
            let (component, pin) = split_pin(input)?;
            simulator.connect_input(circuit.pin(component, pin)?);
        }
        if let Some(output) = &self.output {
            let (component, pin) = split_pin(output)?;
            simulator.connect_output(circuit.pin(component, pin)?);
        }

        info!(
            "Built circuit '{}': {} components, {} connections",
            circuit.title,
            circuit.len(),
            circuit.connections().len()
        );

        Ok((circuit, simulator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::SimulateOptions;
    use crate::solver::SolverMethod;

    const RING: &str = r#"{
        "title": "all-pass ring",
        "components": [
            {"name": "dc", "kind": "directional_coupler", "coupling": 0.1},
            {"name": "ring", "kind": "waveguide", "length": 6e-5, "loss_db_per_m": 0.0},
            {"name": "end", "kind": "terminator"}
        ],
        "connections": [["dc.pin4", "ring.pin1"], ["ring.pin2", "dc.pin2"]],
        "input": "dc.pin1",
        "output": "dc.pin3",
        "sweep": {"start": 1.5e-6, "stop": 1.6e-6, "num": 11}
    }"#;

    #[test]
    fn test_parse_and_build() {
        let description = CircuitDescription::from_json(RING).unwrap();
        assert_eq!(description.title, "all-pass ring");
        assert_eq!(description.components.len(), 3);
        assert_eq!(description.sweep.unwrap().num, 11);
        assert!(description.monte_carlo.is_none());

        let (circuit, simulator) = description.build().unwrap();
        assert_eq!(circuit.connections().len(), 2);
        assert_eq!(simulator.input(), Some(circuit.pin("dc", "pin1").unwrap()));
        assert_eq!(circuit.external_pins().len(), 3);

        // Lossless all-pass ring transmits everything
        let result = simulator.simulate(&circuit, &SimulateOptions::at(193.4e12)).unwrap();
        assert!((result.ratios[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_element_fields() {
        let description = CircuitDescription::from_json(RING).unwrap();
        match &description.components[1].element {
            ElementSpec::Waveguide(wg) => {
                assert_eq!(wg.length, 6e-5);
                assert_eq!(wg.loss_db_per_m, 0.0);
            }
            other => panic!("unexpected element {:?}", other),
        }
    }

    #[test]
    fn test_partial_reduction_block() {
        let json = r#"{
            "components": [{"name": "wg", "kind": "waveguide", "length": 1e-5}],
            "reduction": {"parallel": false, "solver": {"method": "Qr"}}
        }"#;
        let description = CircuitDescription::from_json(json).unwrap();

        assert!(!description.reduction.parallel);
        assert_eq!(description.reduction.solver.method, SolverMethod::Qr);
        assert_eq!(description.reduction.solver.singular_tolerance, 1e-12);

        let (circuit, _) = description.build().unwrap();
        assert!(!circuit.config.parallel);
    }

    #[test]
    fn test_bad_pin_reference() {
        let json = r#"{
            "components": [{"name": "wg", "kind": "waveguide", "length": 1e-5}],
            "input": "wg"
        }"#;
        let err = CircuitDescription::from_json(json).unwrap().build().unwrap_err();
        assert!(matches!(err, SimError::Description(_)));
    }

    #[test]
    fn test_unknown_pin_in_connection() {
        let json = r#"{
            "components": [
                {"name": "a", "kind": "waveguide", "length": 1e-5},
                {"name": "b", "kind": "waveguide", "length": 1e-5}
            ],
            "connections": [["a.pin2", "b.pin7"]]
        }"#;
        let err = CircuitDescription::from_json(json).unwrap().build().unwrap_err();
        assert!(matches!(err, SimError::UnknownPin { .. }));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let json = r#"{"components": [{"name": "x", "kind": "laser"}]}"#;
        assert!(matches!(CircuitDescription::from_json(json), Err(SimError::Json(_))));
    }
}
