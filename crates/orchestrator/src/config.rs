//! Configuration parsing and validation for lattice-Boltzmann runs

use kernel::{LatticeGeometry, Precision, ProgramOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;

/// Main simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Lattice side length (cells per axis, shell included)
    #[serde(default = "default_dim")]
    pub dim: usize,
    /// Kinematic viscosity in lattice units
    #[serde(default = "default_viscosity")]
    pub viscosity: f64,
    /// Velocity of the moving lid in lattice units
    #[serde(default = "default_velocity")]
    pub velocity: f64,
    /// Number of compute steps
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Snapshot interval in iterations; 0 writes only the initial snapshot
    #[serde(default = "default_every")]
    pub every: usize,
    /// Directory receiving `.vti` snapshots
    #[serde(default = "default_results_path")]
    pub vtk_path: String,
    /// Work-group width along x
    #[serde(default = "default_lws")]
    pub lws: usize,
    /// Block width of the population layout
    #[serde(default = "default_stride")]
    pub stride: usize,
    /// Compile the program with relaxed math
    #[serde(default = "default_optimize")]
    pub optimize: bool,
    /// Directory receiving map and distribution dumps
    #[serde(default = "default_results_path")]
    pub dump_path: String,
    /// Dump the classification map once
    #[serde(default)]
    pub dump_map: bool,
    /// Dump the distribution function every iteration
    #[serde(default)]
    pub dump_f: bool,
    /// Real number precision
    #[serde(default)]
    pub precision: ConfigPrecision,
    /// Back-end index (GPU backend only)
    #[serde(default)]
    pub platform: usize,
    /// Adapter index within the back-end (GPU backend only)
    #[serde(default)]
    pub device: usize,
    /// Compute backend selection
    #[serde(default)]
    pub backend: BackendType,
    /// Print the program build options
    #[serde(default)]
    pub print_options: bool,
}

/// Real number precision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigPrecision {
    /// 32-bit floats
    #[default]
    Single,
    /// 64-bit floats
    Double,
}

impl From<ConfigPrecision> for Precision {
    fn from(p: ConfigPrecision) -> Self {
        match p {
            ConfigPrecision::Single => Precision::Single,
            ConfigPrecision::Double => Precision::Double,
        }
    }
}

/// Compute backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendType {
    /// In-process host queue running the reference program
    #[default]
    Host,
    /// wgpu adapter (requires the `gpu` feature)
    Gpu,
}

// Default values
fn default_dim() -> usize {
    8
}

fn default_viscosity() -> f64 {
    0.0089
}

fn default_velocity() -> f64 {
    0.05
}

fn default_iterations() -> usize {
    10
}

fn default_every() -> usize {
    1
}

fn default_results_path() -> String {
    "./results".to_string()
}

fn default_lws() -> usize {
    32
}

fn default_stride() -> usize {
    32
}

fn default_optimize() -> bool {
    true
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dim: default_dim(),
            viscosity: default_viscosity(),
            velocity: default_velocity(),
            iterations: default_iterations(),
            every: default_every(),
            vtk_path: default_results_path(),
            lws: default_lws(),
            stride: default_stride(),
            optimize: default_optimize(),
            dump_path: default_results_path(),
            dump_map: false,
            dump_f: false,
            precision: ConfigPrecision::default(),
            platform: 0,
            device: 0,
            backend: BackendType::default(),
            print_options: false,
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &str) -> Result<Self, String> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path, e))?;

        let config: SimulationConfig = serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse config JSON: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.dim < 3 {
            return Err(format!("dim must be at least 3 (got {})", self.dim));
        }
        if !self.viscosity.is_finite() || self.viscosity <= 0.0 {
            return Err("viscosity must be positive".to_string());
        }
        if !self.velocity.is_finite() {
            return Err("velocity must be finite".to_string());
        }
        if self.device_memory_bytes().is_none() {
            return Err(format!(
                "dim {} with stride {} exceeds addressable device memory",
                self.dim, self.stride
            ));
        }
        if self.lws == 0 {
            return Err("lws must be at least 1".to_string());
        }
        if self.stride == 0 {
            return Err("stride must be at least 1".to_string());
        }
        if self.vtk_path.is_empty() {
            return Err("vtk_path must not be empty".to_string());
        }
        if (self.dump_map || self.dump_f) && self.dump_path.is_empty() {
            return Err("dump_path must not be empty when dumping".to_string());
        }
        Ok(())
    }

    /// Lattice sizes for this configuration
    pub fn geometry(&self) -> LatticeGeometry {
        LatticeGeometry::new(self.dim, self.stride)
    }

    /// Build parameters of the compute program
    pub fn program_options(&self) -> ProgramOptions {
        ProgramOptions {
            dim: self.dim,
            viscosity: self.viscosity,
            velocity: self.velocity,
            stride: self.stride,
            precision: self.precision.into(),
            optimize: self.optimize,
            local_size: self.lws,
        }
    }

    /// Bytes of device memory the five lattice buffers occupy, `None` on
    /// overflow
    pub fn device_memory_bytes(&self) -> Option<usize> {
        let precision: Precision = self.precision.into();
        self.geometry().checked_device_memory_bytes(precision.size())
    }
}

impl fmt::Display for SimulationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "backend          = {:?}", self.backend)?;
        writeln!(f, "platformID       = {}", self.platform)?;
        writeln!(f, "deviceID         = {}", self.device)?;
        writeln!(f, "dim              = {}", self.dim)?;
        writeln!(f, "viscosity        = {}", self.viscosity)?;
        writeln!(f, "velocity         = {}", self.velocity)?;
        writeln!(f, "iterations       = {}", self.iterations)?;
        writeln!(f, "every            = {}", self.every)?;
        writeln!(f, "precision        = {:?}", self.precision)?;
        match self.device_memory_bytes() {
            Some(bytes) => {
                writeln!(f, "Device Mem. (B)  = {}", bytes)?;
                writeln!(f, "Device Mem. (KB) = {}", bytes >> 10)?;
                writeln!(f, "Device Mem. (MB) = {}", bytes >> 20)?;
            }
            None => writeln!(f, "Device Mem. (B)  = overflow")?,
        }
        writeln!(f, "VTI PATH         = {}", self.vtk_path)?;
        writeln!(f, "DUMP PATH        = {}", self.dump_path)?;
        writeln!(f, "DUMP F           = {}", self.dump_f)?;
        write!(f, "DUMP MAP         = {}", self.dump_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: SimulationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.dim, 8);
        assert!((config.viscosity - 0.0089).abs() < 1e-12);
        assert!((config.velocity - 0.05).abs() < 1e-12);
        assert_eq!(config.iterations, 10);
        assert_eq!(config.every, 1);
        assert_eq!(config.vtk_path, "./results");
        assert_eq!(config.lws, 32);
        assert_eq!(config.stride, 32);
        assert!(config.optimize);
        assert!(!config.dump_map && !config.dump_f);
        assert_eq!(config.precision, ConfigPrecision::Single);
        assert_eq!(config.backend, BackendType::Host);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_overrides() {
        let config: SimulationConfig = serde_json::from_str(
            r#"{ "dim": 16, "precision": "Double", "backend": "Gpu", "dump_f": true }"#,
        )
        .unwrap();
        assert_eq!(config.dim, 16);
        assert_eq!(config.precision, ConfigPrecision::Double);
        assert_eq!(config.backend, BackendType::Gpu);
        assert!(config.dump_f);
        assert_eq!(config.iterations, 10);
    }

    #[test]
    fn test_validation_dim() {
        let mut config = SimulationConfig { dim: 2, ..Default::default() };
        assert!(config.validate().is_err());

        config.dim = 3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_oversized_lattice() {
        let config = SimulationConfig { dim: 3_000_000, ..Default::default() };
        let err = config.validate().unwrap_err();
        assert!(err.contains("dim 3000000"));
        assert_eq!(config.device_memory_bytes(), None);
        let summary = config.to_string();
        assert!(summary.contains("dim              = 3000000"));
        assert!(summary.contains("Device Mem. (B)  = overflow"));
    }

    #[test]
    fn test_validation_work_shape() {
        let mut config = SimulationConfig { lws: 0, ..Default::default() };
        assert!(config.validate().is_err());

        config.lws = 8;
        config.stride = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_viscosity() {
        let config = SimulationConfig { viscosity: 0.0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_device_memory() {
        let config = SimulationConfig { dim: 4, stride: 1, ..Default::default() };
        // 2 * 64*19*4 + 64*3*4 + 64*4 + 64*4
        assert_eq!(config.device_memory_bytes(), Some(9728 + 768 + 256 + 256));

        let double = SimulationConfig { precision: ConfigPrecision::Double, ..config };
        assert_eq!(double.device_memory_bytes(), Some(2 * 9728 + 2 * 768 + 2 * 256 + 256));
    }

    #[test]
    fn test_program_options() {
        let config = SimulationConfig::default();
        let options = config.program_options();
        assert_eq!(options.dim, 8);
        assert_eq!(options.local_size, 32);
        assert_eq!(options.precision, Precision::Single);
        assert!(options.build_string().contains("-DSTRIDE=32"));
    }

    #[test]
    fn test_summary_reports_memory() {
        let text = SimulationConfig::default().to_string();
        assert!(text.contains("Device Mem. (B)  = "));
        assert!(text.contains("dim              = 8"));
    }
}
