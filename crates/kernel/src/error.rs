//! Error type shared by every compute device back-end.

use thiserror::Error;

/// Result alias for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Failure reported by a [`ComputeDevice`](crate::ComputeDevice).
///
/// Every variant carries a stable negative code in the style of accelerator
/// runtimes, so a driver can terminate with the device-reported status.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No platform/adapter matching the selector could be acquired.
    #[error("device unavailable: {0}")]
    Unavailable(String),

    /// Program compilation failed; `log` holds the compiler output.
    #[error("program build failed: {log}")]
    Build {
        /// Compiler diagnostic.
        log: String,
    },

    /// The program does not export the requested entry point.
    #[error("unknown kernel entry point `{0}`")]
    UnknownEntryPoint(String),

    /// Buffer allocation failed or was rejected by the device limits.
    #[error("buffer allocation failed: {0}")]
    Allocation(String),

    /// A handle did not belong to this device.
    #[error("invalid {kind} handle #{index}")]
    InvalidHandle {
        /// Handle family (`program`, `kernel`, `buffer`, `event`).
        kind: &'static str,
        /// Raw handle index.
        index: usize,
    },

    /// A kernel argument was missing or inconsistent with the entry point.
    #[error("invalid kernel argument {index}: {reason}")]
    Argument {
        /// Argument (binding) index.
        index: u32,
        /// What was wrong with it.
        reason: String,
    },

    /// A kernel launch failed on the device.
    #[error("kernel dispatch failed: {0}")]
    Dispatch(String),

    /// A device-to-host transfer failed.
    #[error("buffer transfer failed: {0}")]
    Transfer(String),

    /// Timing information for an event was not available.
    #[error("profiling info unavailable: {0}")]
    Profiling(String),
}

impl DeviceError {
    /// Numeric status code, negative like the accelerator runtime error codes.
    pub fn code(&self) -> i32 {
        match self {
            DeviceError::Unavailable(_) => -1,
            DeviceError::Build { .. } => -11,
            DeviceError::UnknownEntryPoint(_) => -46,
            DeviceError::Allocation(_) => -4,
            DeviceError::InvalidHandle { .. } => -38,
            DeviceError::Argument { .. } => -51,
            DeviceError::Dispatch(_) => -52,
            DeviceError::Transfer(_) => -5,
            DeviceError::Profiling(_) => -7,
        }
    }
}
