//! Orchestration Layer
//!
//! This crate drives a lattice-Boltzmann lid-driven cavity on a
//! [`kernel::ComputeDevice`]:
//! - Configuration loading and validation
//! - Device setup: program build, buffer allocation, kernel argument binding
//! - Ping-pong dispatch of the compute kernel with periodic output
//! - Device-timestamp ledger with total/kernel time and MLUPS
//! - VTK snapshots and plain-text debug dumps

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod ledger;
pub mod output;
pub mod simulation;

pub use config::{BackendType, ConfigPrecision, SimulationConfig};
pub use error::{SimulationError, SimulationResult};
pub use ledger::{Operation, OperationStats, TimingLedger, Timings};
pub use simulation::{BufferRole, ComputeKernel, LbmSimulation, PingPong};

use kernel::{BgkProgram, ComputeDevice, HostDevice, Real};

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Device the run executed on.
    pub device: String,
    /// Interior cells updated per iteration.
    pub wet_cells: usize,
    /// Number of compute steps.
    pub iterations: usize,
    /// Device span of the whole run.
    pub total_ms: f64,
    /// Summed own durations of every operation.
    pub kernels_ms: f64,
    /// Throughput over `total_ms`.
    pub mlups: f64,
    /// Throughput over `kernels_ms`.
    pub kernels_mlups: f64,
    /// Durations per operation name.
    pub summary: Vec<OperationStats>,
}

/// Load a configuration file and run it to completion.
///
/// # Example
/// ```no_run
/// let report = orchestrator::run_from_file("config/cavity.json")?;
/// println!("{:.2} MLUPS", report.mlups);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn run_from_file(config_path: &str) -> SimulationResult<RunReport> {
    tracing::info!("Loading config: {}", config_path);
    let config = SimulationConfig::load(config_path).map_err(SimulationError::Config)?;
    run(&config)
}

/// Run `config` to completion on the configured backend and precision.
pub fn run(config: &SimulationConfig) -> SimulationResult<RunReport> {
    match config.precision {
        ConfigPrecision::Single => execute::<f32>(config),
        ConfigPrecision::Double => execute::<f64>(config),
    }
}

fn execute<T: Real>(config: &SimulationConfig) -> SimulationResult<RunReport> {
    let mut simulation = LbmSimulation::<T, _>::new(config.clone())?;
    let device = create_device(config)?;
    let name = device.name();
    simulation.setup_device(device)?;

    simulation.perform_simulation_and_wait()?;

    let timings = simulation.timings()?;
    let wet_cells = simulation.wet_cells();
    let total_ms = timings.total_time_ms();
    let kernels_ms = timings.kernels_time_ms();
    let report = RunReport {
        device: name,
        wet_cells,
        iterations: config.iterations,
        total_ms,
        kernels_ms,
        mlups: ledger::mlups(wet_cells, config.iterations, total_ms),
        kernels_mlups: ledger::mlups(wet_cells, config.iterations, kernels_ms),
        summary: timings.summary(),
    };
    tracing::info!(
        "Simulation complete: {:.4} ms total, {:.4} ms in operations, {:.4} MLUPS",
        report.total_ms,
        report.kernels_ms,
        report.mlups
    );
    Ok(report)
}

// ===========================================================================
// Backend selection
// ===========================================================================

/// Create the compute device selected by the configuration.
///
/// `Host` always succeeds. `Gpu` needs the `gpu` feature and an adapter at
/// the configured platform/device indices.
pub fn create_device(config: &SimulationConfig) -> SimulationResult<Box<dyn ComputeDevice>> {
    match config.backend {
        BackendType::Host => {
            tracing::info!("Creating host device...");
            Ok(Box::new(HostDevice::new(BgkProgram::new())))
        }
        #[cfg(feature = "gpu")]
        BackendType::Gpu => {
            tracing::info!(
                "Creating GPU device (platform #{}, device #{})...",
                config.platform,
                config.device
            );
            let selector = kernel::DeviceSelector {
                platform: config.platform,
                device: config.device,
            };
            let gpu = kernel::GpuDevice::new(selector)
                .map_err(SimulationError::setup("acquire_device"))?;
            Ok(Box::new(gpu))
        }
        #[cfg(not(feature = "gpu"))]
        BackendType::Gpu => Err(SimulationError::Config(
            "GPU backend requested but 'gpu' feature is not enabled. Compile with --features gpu"
                .to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_backend_is_always_available() {
        let device = create_device(&SimulationConfig::default()).unwrap();
        assert_eq!(device.name(), "host");
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn gpu_backend_without_feature_is_a_config_error() {
        let config = SimulationConfig { backend: BackendType::Gpu, ..Default::default() };
        assert!(matches!(create_device(&config), Err(SimulationError::Config(_))));
    }

    #[test]
    fn run_reports_throughput() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SimulationConfig {
            dim: 6,
            iterations: 3,
            every: 0,
            lws: 2,
            stride: 8,
            vtk_path: tmp.path().to_string_lossy().into_owned(),
            ..Default::default()
        };
        let report = run(&config).unwrap();
        assert_eq!(report.wet_cells, 64);
        assert_eq!(report.iterations, 3);
        assert!(report.mlups.is_finite() && report.mlups >= 0.0);
        assert!(report.kernels_ms <= report.total_ms);
        let compute = report
            .summary
            .iter()
            .find(|s| s.operation == Operation::Compute)
            .unwrap();
        assert_eq!(compute.count, 3);
    }
}
