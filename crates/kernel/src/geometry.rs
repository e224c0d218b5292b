//! Lattice geometry: element counts, byte sizes and linear index layout.
//!
//! The lattice is a cube of side `dim`. Cells are addressed linearly as
//! `x + dim * (y + dim * z)`. Velocities are stored as `D` consecutive
//! components per cell. Populations use a blocked structure-of-arrays layout
//! with block width `stride`: the `Q` populations of a block of `stride`
//! consecutive cells are stored population-major.

/// Number of discrete velocity directions (D3Q19).
pub const Q: usize = 19;

/// Number of spatial dimensions.
pub const D: usize = 3;

/// Size of one classification code on the device.
pub const MAP_ELEMENT_SIZE: usize = std::mem::size_of::<i32>();

/// Sizes and index layout of a cubic lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatticeGeometry {
    /// Side length of the cube.
    pub dim: usize,
    /// Block width of the population layout.
    pub stride: usize,
}

impl LatticeGeometry {
    /// Create a geometry. A `stride` of zero is treated as one.
    pub fn new(dim: usize, stride: usize) -> Self {
        Self { dim, stride: stride.max(1) }
    }

    /// Total number of cells, `dim³`.
    pub fn cells(&self) -> usize {
        self.dim * self.dim * self.dim
    }

    /// Cell count rounded up to a whole number of population blocks.
    pub fn padded_cells(&self) -> usize {
        self.cells().div_ceil(self.stride) * self.stride
    }

    /// Elements of one distribution-function buffer.
    pub fn f_len(&self) -> usize {
        self.padded_cells() * Q
    }

    /// Elements of the velocity buffer.
    pub fn u_len(&self) -> usize {
        self.cells() * D
    }

    /// Elements of the density buffer.
    pub fn rho_len(&self) -> usize {
        self.cells()
    }

    /// Elements of the classification map.
    pub fn map_len(&self) -> usize {
        self.cells()
    }

    /// Bytes of one distribution-function buffer for reals of `real_size` bytes.
    pub fn f_size(&self, real_size: usize) -> usize {
        self.f_len() * real_size
    }

    /// Bytes of the velocity buffer.
    pub fn u_size(&self, real_size: usize) -> usize {
        self.u_len() * real_size
    }

    /// Bytes of the density buffer.
    pub fn rho_size(&self, real_size: usize) -> usize {
        self.rho_len() * real_size
    }

    /// Bytes of the classification map.
    pub fn map_size(&self) -> usize {
        self.map_len() * MAP_ELEMENT_SIZE
    }

    /// Device memory needed by all five buffers.
    pub fn device_memory_bytes(&self, real_size: usize) -> usize {
        self.f_size(real_size) * 2 + self.u_size(real_size) + self.rho_size(real_size) + self.map_size()
    }

    /// [`device_memory_bytes`] without overflow, or `None` when any of the
    /// buffer sizes does not fit in `usize`.
    ///
    /// [`device_memory_bytes`]: LatticeGeometry::device_memory_bytes
    pub fn checked_device_memory_bytes(&self, real_size: usize) -> Option<usize> {
        let cells = self.dim.checked_mul(self.dim)?.checked_mul(self.dim)?;
        let padded = cells.div_ceil(self.stride).checked_mul(self.stride)?;
        let f = padded.checked_mul(Q)?.checked_mul(real_size)?;
        let u = cells.checked_mul(D)?.checked_mul(real_size)?;
        let rho = cells.checked_mul(real_size)?;
        let map = cells.checked_mul(MAP_ELEMENT_SIZE)?;
        f.checked_mul(2)?.checked_add(u)?.checked_add(rho)?.checked_add(map)
    }

    /// Interior ("wet") cells excluding the one-cell shell, `(dim - 2)³`.
    ///
    /// `None` when `dim < 3`, where no interior exists.
    pub fn wet_cells(&self) -> Option<usize> {
        wet_cells(self.dim)
    }

    /// Linear index of cell `(x, y, z)`.
    #[inline]
    pub fn cell_index(&self, x: usize, y: usize, z: usize) -> usize {
        cell_index(x, y, z, self.dim)
    }

    /// Index of population `q` of cell `cell`.
    #[inline]
    pub fn population_index(&self, cell: usize, q: usize) -> usize {
        population_index(cell, q, self.stride)
    }
}

/// `(dim - 2)³`, or `None` when `dim < 3`.
pub fn wet_cells(dim: usize) -> Option<usize> {
    let inner = dim.checked_sub(2).filter(|&n| n > 0)?;
    Some(inner * inner * inner)
}

/// Linear index of cell `(x, y, z)` in a lattice of side `dim`.
#[inline]
pub fn cell_index(x: usize, y: usize, z: usize, dim: usize) -> usize {
    x + dim * (y + dim * z)
}

/// Index of velocity component `component` of cell `cell`.
#[inline]
pub fn velocity_index(cell: usize, component: usize) -> usize {
    cell * D + component
}

/// Index of population `q` of cell `cell` in the blocked layout.
#[inline]
pub fn population_index(cell: usize, q: usize, stride: usize) -> usize {
    (cell / stride) * stride * Q + q * stride + cell % stride
}

/// Number of decimal digits of `value`; zero has one digit.
pub fn digits(value: usize) -> usize {
    let mut n = 1;
    let mut v = value / 10;
    while v > 0 {
        n += 1;
        v /= 10;
    }
    n
}
