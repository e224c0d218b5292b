//! Program build parameters, numeric precision and launch shapes.

use std::fmt;

/// Floating-point precision the program is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    /// 32-bit reals.
    Single,
    /// 64-bit reals.
    Double,
}

impl Precision {
    /// Size in bytes of one real.
    pub fn size(self) -> usize {
        match self {
            Precision::Single => 4,
            Precision::Double => 8,
        }
    }

    /// Element type name used by the VTK image-data format.
    pub fn vtk_type(self) -> &'static str {
        match self {
            Precision::Single => "Float32",
            Precision::Double => "Float64",
        }
    }
}

/// Host-side real number type matching a device [`Precision`].
pub trait Real:
    bytemuck::Pod + Default + PartialEq + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Precision the device program must be compiled with.
    const PRECISION: Precision;

    /// Lossy conversion from `f64`.
    fn from_f64(value: f64) -> Self;

    /// Widening conversion to `f64`.
    fn to_f64(self) -> f64;
}

impl Real for f32 {
    const PRECISION: Precision = Precision::Single;

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Real for f64 {
    const PRECISION: Precision = Precision::Double;

    fn from_f64(value: f64) -> Self {
        value
    }

    fn to_f64(self) -> f64 {
        self
    }
}

/// Simulation-specific parameters baked into the compute program at build time.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramOptions {
    /// Lattice side length.
    pub dim: usize,
    /// Kinematic viscosity in lattice units.
    pub viscosity: f64,
    /// Velocity of the moving lid along x.
    pub velocity: f64,
    /// Block width of the population layout.
    pub stride: usize,
    /// Numeric precision of every real buffer.
    pub precision: Precision,
    /// Allow relaxed/unchecked math for speed.
    pub optimize: bool,
    /// Work-group width along x.
    pub local_size: usize,
}

impl ProgramOptions {
    /// BGK relaxation time `3ν + 1/2`.
    pub fn tau(&self) -> f64 {
        3.0 * self.viscosity + 0.5
    }

    /// Compiler-style option string, logged at build time.
    pub fn build_string(&self) -> String {
        let mut options = format!(
            "-Werror -I. -DDIM={} -DVISCOSITY={} -DVELOCITY={} -DSTRIDE={} ",
            self.dim, self.viscosity, self.velocity, self.stride
        );
        match self.precision {
            Precision::Single => options.push_str("-DFP_SINGLE -cl-single-precision-constant "),
            Precision::Double => options.push_str("-DFP_DOUBLE "),
        }
        if self.optimize {
            options.push_str("-cl-fast-relaxed-math ");
        }
        options
    }
}

/// Global and local work shape of one kernel launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdRange {
    /// Total work items per axis.
    pub global: [usize; 3],
    /// Work-group size per axis.
    pub local: [usize; 3],
}

impl NdRange {
    /// One work item per lattice cell, groups of `local_size` along x.
    pub fn lattice(dim: usize, local_size: usize) -> Self {
        Self {
            global: [dim, dim, dim],
            local: [local_size.max(1), 1, 1],
        }
    }

    /// Number of work groups per axis, rounding up.
    pub fn groups(&self) -> [usize; 3] {
        [
            self.global[0].div_ceil(self.local[0].max(1)),
            self.global[1].div_ceil(self.local[1].max(1)),
            self.global[2].div_ceil(self.local[2].max(1)),
        ]
    }

    /// Total work items.
    pub fn items(&self) -> usize {
        self.global.iter().product()
    }
}
