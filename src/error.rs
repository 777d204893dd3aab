use thiserror::Error;

/// Errors raised while building or simulating a photonic circuit
#[derive(Debug, Error)]
pub enum SimError {
    /// A connection request violated the pin graph rules
    #[error("cannot connect {a} to {b}: {reason}")]
    Connection { a: String, b: String, reason: String },

    #[error("component '{0}' not found")]
    UnknownComponent(String),

    #[error("pin '{pin}' not found on component '{component}'")]
    UnknownPin { component: String, pin: String },

    #[error("component name '{0}' is already used in this circuit")]
    DuplicateComponent(String),

    /// A monitored simulator pin was never bound to the circuit
    #[error("simulator {0} pin is not connected")]
    Unconnected(&'static str),

    /// A monitored pin is joined to another pin and so is not a port of the reduced circuit
    #[error("pin {0} is internal to the circuit and cannot be monitored")]
    NotExposed(String),

    #[error("exactly one of a single frequency or a frequency sequence must be supplied")]
    AmbiguousFrequencyInput,

    #[error("invalid frequency grid: {0}")]
    InvalidFrequencyGrid(String),

    #[error("invalid sweep: {0}")]
    InvalidSweep(String),

    /// The junction solve for a connection is numerically singular
    #[error("singular junction {connection} at {frequency:.6e} Hz (condition number {condition_number:.3e})")]
    SingularJunction {
        frequency: f64,
        connection: String,
        condition_number: f64,
    },

    /// A model returned a matrix stack that disagrees with its pin count or the frequency grid
    #[error("component '{component}' returned {found}, expected {expected}")]
    ShapeMismatch {
        component: String,
        expected: String,
        found: String,
    },

    #[error("invalid circuit description: {0}")]
    Description(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
