//! Engine Error Types

use thiserror::Error;

/// Errors surfaced by the engine core.
///
/// Checked accessors of the data layer return errors to their callers;
/// the execution engines use only scaled, unchecked accesses and cannot
/// fail mid-run. Graph edits fail fast.
#[derive(Error, Debug)]
pub enum TangleError {
    /// Degenerate environment parameters (no register, a single
    /// instruction, a single data source, or an empty address space)
    #[error("invalid environment: {0}")]
    InvalidEnvironment(String),

    /// Operand or data type mismatch on a checked accessor
    #[error("data type {requested} cannot be provided by this {handler} handler")]
    InvalidType {
        /// The type that was requested
        requested: &'static str,
        /// A short description of the handler that rejected it
        handler: &'static str,
    },

    /// Index or address out of bounds on a checked accessor
    #[error("address {address} is outside the address space of size {space}")]
    OutOfRange {
        /// The offending address
        address: usize,
        /// The size of the address space it was checked against
        space: usize,
    },

    /// Structurally illegal graph edit, e.g. adding an outgoing edge to
    /// an action or rewiring an edge that is not in the graph
    #[error("invalid graph operation: {0}")]
    InvalidGraphOperation(String),

    /// Team evaluation was left with no non-excluded outgoing edge
    #[error("no reachable outgoing edge to evaluate on this team")]
    NoReachableEdge,

    /// Inconsistent mutation parameters
    #[error("parameter misconfiguration: {0}")]
    ParameterMisconfiguration(String),

    /// Configuration file could not be read or parsed
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for engine operations
pub type TangleResult<T> = Result<T, TangleError>;
