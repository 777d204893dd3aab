pub mod assembly;
pub mod circuit;
pub mod cli;
pub mod elements;
pub mod error;
pub mod model;
pub mod netlist;
pub mod reduction;
pub mod simulator;
pub mod solver;

// Re-export commonly used types
pub use circuit::{Circuit, ComponentId, Instance, PinRef};
pub use error::{Result, SimError};
pub use model::{Mode, Model, SMatrix, SParameterMethod};
pub use netlist::CircuitDescription;
pub use reduction::{ReductionConfig, Subcircuit};
pub use simulator::{
    EnsembleStatistics, MonteCarloConfig, MonteCarloSweepSimulator, SimulateOptions, SimulationResult, Simulator,
    SweepSimulator,
};

/// Speed of light in vacuum, m/s
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
