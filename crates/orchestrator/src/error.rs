//! Errors raised while setting up, running or recording a simulation.

use std::io;
use std::path::PathBuf;

use kernel::DeviceError;
use thiserror::Error;

/// Result alias used throughout the orchestrator.
pub type SimulationResult<T> = Result<T, SimulationError>;

/// Every way a simulation can fail. Device failures carry the call site
/// that produced them.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Device acquisition, program build, allocation or argument binding failed.
    #[error("{operation}: {source}")]
    Setup {
        /// Failing call, e.g. `create_buffer(f_stream)`.
        operation: String,
        /// Device diagnostic.
        #[source]
        source: DeviceError,
    },

    /// A kernel launch, read-back, queue drain or profile query failed.
    #[error("{operation}: {source}")]
    Dispatch {
        /// Failing call, e.g. `read_rho`.
        operation: String,
        /// Device diagnostic.
        #[source]
        source: DeviceError,
    },

    /// Writing an output file failed.
    #[error("{}: {source}", path.display())]
    Io {
        /// File or directory being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Operation called in the wrong lifecycle state.
    #[error("{0}")]
    State(String),
}

impl SimulationError {
    pub(crate) fn setup(operation: impl Into<String>) -> impl FnOnce(DeviceError) -> Self {
        let operation = operation.into();
        move |source| SimulationError::Setup { operation, source }
    }

    pub(crate) fn dispatch(operation: impl Into<String>) -> impl FnOnce(DeviceError) -> Self {
        let operation = operation.into();
        move |source| SimulationError::Dispatch { operation, source }
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| SimulationError::Io { path, source }
    }

    /// Name of the failing call site.
    pub fn operation(&self) -> &str {
        match self {
            SimulationError::Config(_) => "config",
            SimulationError::Setup { operation, .. } | SimulationError::Dispatch { operation, .. } => {
                operation
            }
            SimulationError::Io { .. } => "write",
            SimulationError::State(_) => "state",
        }
    }

    /// Diagnostic without the call site.
    pub fn description(&self) -> String {
        match self {
            SimulationError::Config(msg) | SimulationError::State(msg) => msg.clone(),
            SimulationError::Setup { source, .. } | SimulationError::Dispatch { source, .. } => {
                source.to_string()
            }
            SimulationError::Io { path, source } => format!("{}: {source}", path.display()),
        }
    }

    /// Process exit status: the device code for device failures, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            SimulationError::Setup { source, .. } | SimulationError::Dispatch { source, .. } => {
                source.code()
            }
            _ => 1,
        }
    }
}
