use log::{debug, trace, warn};
use rand::RngCore;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::assembly::AggregateSystem;
use crate::circuit::{Instance, PinRef};
use crate::error::{Result, SimError};
use crate::model::{validate_stack, Mode, Model, SMatrix, SParameterMethod};
use crate::solver::{JunctionSolver, SolverConfig};

/// Reduction engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionConfig {
    pub solver: SolverConfig,
    /// Distribute frequency points across the rayon thread pool
    pub parallel: bool,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        ReductionConfig {
            solver: SolverConfig::default(),
            parallel: true,
        }
    }
}

/// Collapse `connections` of an aggregate matrix, one junction at a time,
/// in the order given.
///
/// Returns the reduced matrix together with the aggregate indices of its
/// rows, which keep their original relative order.
pub fn reduce_matrix<F>(
    solver: &JunctionSolver,
    mut matrix: SMatrix,
    connections: &[(usize, usize)],
    frequency: f64,
    label: F,
) -> Result<(SMatrix, Vec<usize>)>
where
    F: Fn(usize) -> String,
{
    let mut ports: Vec<usize> = (0..matrix.nrows()).collect();

    for &(a, b) in connections {
        let connection = || format!("{} <-> {}", label(a), label(b));

        let (i, j) = match (ports.iter().position(|&p| p == a), ports.iter().position(|&p| p == b)) {
            (Some(i), Some(j)) if i != j => (i, j),
            _ => {
                return Err(SimError::Connection {
                    a: label(a),
                    b: label(b),
                    reason: "port is not available for elimination".to_string(),
                })
            }
        };

        let (reduced, stats) = solver.eliminate(&matrix, i, j).map_err(|singular| SimError::SingularJunction {
            frequency,
            connection: connection(),
            condition_number: singular.condition_number,
        })?;

        if stats.ill_conditioned {
            warn!(
                "Ill-conditioned junction {} at {:.6e} Hz (condition number {:.3e})",
                connection(),
                frequency,
                stats.condition_number
            );
        }
        trace!(
            "Eliminated {} at {:.6e} Hz: residual {:.2e}",
            connection(),
            frequency,
            stats.residual_norm
        );

        ports.retain(|&p| p != a && p != b);
        matrix = reduced;
    }

    Ok((matrix, ports))
}

/// A circuit collapsed into a single equivalent component.
///
/// Owns a snapshot of every member model, so later edits to the source
/// circuit do not affect it. Its pins are the circuit's unconnected pins in
/// circuit order.
#[derive(Debug, Clone)]
pub struct Subcircuit {
    name: String,
    components: Vec<Instance>,
    system: AggregateSystem,
    connections: Vec<(usize, usize)>,
    external: Vec<PinRef>,
    config: ReductionConfig,
}

impl Subcircuit {
    pub(crate) fn new(
        name: String,
        components: Vec<Instance>,
        connections: &[(PinRef, PinRef)],
        external: Vec<PinRef>,
        config: ReductionConfig,
    ) -> Self {
        let widths: Vec<usize> = components.iter().map(|c| c.pins.len()).collect();
        let system = AggregateSystem::new(&widths);
        let connections = connections
            .iter()
            .map(|(a, b)| (system.port_index(a.component.0, a.index), system.port_index(b.component.0, b.index)))
            .collect();

        Subcircuit {
            name,
            components,
            system,
            connections,
            external,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Circuit pins that became the ports of this subcircuit, in matrix order
    pub fn pin_refs(&self) -> &[PinRef] {
        &self.external
    }

    /// Number of connections eliminated per frequency
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Label of an aggregate port, `component.pin`
    fn port_label(&self, port: usize) -> String {
        let component = self
            .system
            .offsets
            .iter()
            .rposition(|&offset| offset <= port)
            .unwrap_or(0);
        let instance = &self.components[component];
        let pin = port - self.system.offsets[component];
        format!("{}.{}", instance.name, instance.pins.get(pin).map(String::as_str).unwrap_or("?"))
    }

    /// Reduce the circuit at every frequency in `frequencies`
    pub fn reduce(&self, frequencies: &[f64], method: SParameterMethod) -> Result<Vec<SMatrix>> {
        let stacks = self
            .components
            .iter()
            .map(|instance| {
                let stack = instance.model.generate(frequencies, method)?;
                validate_stack(&instance.name, instance.pins.len(), frequencies.len(), &stack)?;
                Ok(stack)
            })
            .collect::<Result<Vec<_>>>()?;

        let external: Vec<usize> = self
            .external
            .iter()
            .map(|pin| self.system.port_index(pin.component.0, pin.index))
            .collect();

        let solver = JunctionSolver::with_config(self.config.solver.clone());

        let reduce_at = |k: usize| -> Result<SMatrix> {
            let blocks: Vec<&SMatrix> = stacks.iter().map(|stack| &stack[k]).collect();
            let aggregate = self.system.assemble(&blocks);
            let (reduced, ports) =
                reduce_matrix(&solver, aggregate, &self.connections, frequencies[k], |p| self.port_label(p))?;
            Ok(reorder(reduced, &ports, &external))
        };

        debug!(
            "Reducing '{}': {} ports, {} connections, {} frequencies",
            self.name,
            self.system.size,
            self.connections.len(),
            frequencies.len()
        );

        if self.config.parallel {
            (0..frequencies.len()).into_par_iter().map(reduce_at).collect()
        } else {
            (0..frequencies.len()).map(reduce_at).collect()
        }
    }
}

/// Permute `matrix`, whose rows are the aggregate ports `ports`, into `order`
fn reorder(matrix: SMatrix, ports: &[usize], order: &[usize]) -> SMatrix {
    if ports == order {
        return matrix;
    }

    let position: Vec<usize> = order
        .iter()
        .map(|port| ports.iter().position(|p| p == port).unwrap_or(0))
        .collect();
    SMatrix::from_fn(order.len(), order.len(), |r, c| matrix[(position[r], position[c])])
}

impl Model for Subcircuit {
    fn pins(&self) -> Vec<String> {
        self.external
            .iter()
            .map(|pin| self.port_label(self.system.port_index(pin.component.0, pin.index)))
            .collect()
    }

    fn s_parameters(&self, frequencies: &[f64]) -> Result<Vec<SMatrix>> {
        self.reduce(frequencies, SParameterMethod::Nominal)
    }

    fn monte_carlo_s_parameters(&self, frequencies: &[f64]) -> Result<Vec<SMatrix>> {
        self.reduce(frequencies, SParameterMethod::MonteCarlo)
    }

    fn regenerate_monte_carlo_parameters(&mut self, rng: &mut dyn RngCore) {
        for instance in &mut self.components {
            instance.model.regenerate_monte_carlo_parameters(rng);
        }
    }

    fn mode(&self) -> Mode {
        self.external
            .first()
            .map(|pin| self.components[pin.component.0].model.mode())
            .unwrap_or(Mode::Te)
    }

    fn clone_box(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}
