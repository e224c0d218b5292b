//! D3Q19 BGK lid-driven cavity program for the host device.
//!
//! Mirrors the entry points of the WGSL program used on the GPU:
//!
//! - `initialize(f_stream, f_collide, rho, u, map)` classifies every cell
//!   and writes the rest equilibrium into both distribution buffers.
//! - `compute(f_in, rho, u, map, f_out)` pulls populations from the
//!   neighbours (bounce-back at solid cells, with momentum transfer from the
//!   moving lid), collides with a single relaxation time and writes the
//!   post-collision state to `f_out` and the moments to `rho`/`u`.

use crate::cell;
use crate::geometry::{cell_index, population_index, velocity_index, D, Q};
use crate::host::{HostMemory, HostProgram};
use crate::program::{NdRange, Precision, ProgramOptions, Real};

/// Lattice velocities.
pub const VELOCITIES: [[i32; 3]; Q] = [
    [0, 0, 0],
    [1, 0, 0], [-1, 0, 0],
    [0, 1, 0], [0, -1, 0],
    [0, 0, 1], [0, 0, -1],
    [1, 1, 0], [-1, -1, 0],
    [1, -1, 0], [-1, 1, 0],
    [1, 0, 1], [-1, 0, -1],
    [1, 0, -1], [-1, 0, 1],
    [0, 1, 1], [0, -1, -1],
    [0, 1, -1], [0, -1, 1],
];

/// Index of the direction opposite to each direction.
pub const OPPOSITE: [usize; Q] = [0, 2, 1, 4, 3, 6, 5, 8, 7, 10, 9, 12, 11, 14, 13, 16, 15, 18, 17];

/// Quadrature weights.
pub const WEIGHTS: [f64; Q] = [
    1.0 / 3.0,
    1.0 / 18.0, 1.0 / 18.0, 1.0 / 18.0, 1.0 / 18.0, 1.0 / 18.0, 1.0 / 18.0,
    1.0 / 36.0, 1.0 / 36.0, 1.0 / 36.0, 1.0 / 36.0, 1.0 / 36.0, 1.0 / 36.0,
    1.0 / 36.0, 1.0 / 36.0, 1.0 / 36.0, 1.0 / 36.0, 1.0 / 36.0, 1.0 / 36.0,
];

/// Second-order equilibrium population `q` for density `rho` and velocity `u`.
pub fn equilibrium(q: usize, rho: f64, u: [f64; 3]) -> f64 {
    let c = VELOCITIES[q];
    let cu = c[0] as f64 * u[0] + c[1] as f64 * u[1] + c[2] as f64 * u[2];
    let uu = u[0] * u[0] + u[1] * u[1] + u[2] * u[2];
    WEIGHTS[q] * rho * (1.0 + 3.0 * cu + 4.5 * cu * cu - 1.5 * uu)
}

/// Host implementation of the lattice program.
#[derive(Debug, Default)]
pub struct BgkProgram {
    options: Option<ProgramOptions>,
}

impl BgkProgram {
    /// Create an unbuilt program.
    pub fn new() -> Self {
        Self::default()
    }
}

impl HostProgram for BgkProgram {
    fn entry_points(&self) -> &[&'static str] {
        &["initialize", "compute"]
    }

    fn build(&mut self, options: &ProgramOptions) -> Result<(), String> {
        if options.dim < 3 {
            return Err(format!("DIM={} leaves no interior cells", options.dim));
        }
        if options.stride == 0 {
            return Err("STRIDE must be positive".to_string());
        }
        if options.tau() <= 0.5 {
            tracing::warn!("Relaxation time {} is at the stability limit", options.tau());
        }
        self.options = Some(options.clone());
        Ok(())
    }

    fn launch(&mut self, entry_point: &str, range: NdRange, args: &mut [HostMemory])
        -> Result<(), String> {
        let options = self.options.as_ref().ok_or("program not built")?;
        match (entry_point, options.precision) {
            ("initialize", Precision::Single) => initialize::<f32>(options, range, args),
            ("initialize", Precision::Double) => initialize::<f64>(options, range, args),
            ("compute", Precision::Single) => compute::<f32>(options, range, args),
            ("compute", Precision::Double) => compute::<f64>(options, range, args),
            (other, _) => Err(format!("unknown entry point `{other}`")),
        }
    }
}

/// Cells of `range` that fall inside the lattice.
fn cells(dim: usize, range: NdRange) -> impl Iterator<Item = (usize, usize, usize)> {
    let [gx, gy, gz] = range.global;
    let (nx, ny, nz) = (gx.min(dim), gy.min(dim), gz.min(dim));
    (0..nz).flat_map(move |z| (0..ny).flat_map(move |y| (0..nx).map(move |x| (x, y, z))))
}

fn initialize<T: Real>(options: &ProgramOptions, range: NdRange, args: &mut [HostMemory])
    -> Result<(), String> {
    let [f_stream, f_collide, rho, u, map] = args else {
        return Err(format!("initialize expects 5 arguments, got {}", args.len()));
    };
    let f_stream = f_stream.as_mut_slice::<T>()?;
    let f_collide = f_collide.as_mut_slice::<T>()?;
    let rho = rho.as_mut_slice::<T>()?;
    let u = u.as_mut_slice::<T>()?;
    let map = map.as_mut_slice::<i32>()?;

    let dim = options.dim;
    for (x, y, z) in cells(dim, range) {
        let id = cell_index(x, y, z, dim);
        let kind = cell::cavity_cell(x, y, z, dim);
        let velocity = if cell::is_moving(kind) { [options.velocity, 0.0, 0.0] } else { [0.0; 3] };

        map[id] = kind;
        rho[id] = T::from_f64(1.0);
        for c in 0..D {
            u[velocity_index(id, c)] = T::from_f64(velocity[c]);
        }
        for q in 0..Q {
            let value = T::from_f64(equilibrium(q, 1.0, [0.0; 3]));
            let idx = population_index(id, q, options.stride);
            f_stream[idx] = value;
            f_collide[idx] = value;
        }
    }
    Ok(())
}

fn compute<T: Real>(options: &ProgramOptions, range: NdRange, args: &mut [HostMemory])
    -> Result<(), String> {
    let [f_in, rho, u, map, f_out] = args else {
        return Err(format!("compute expects 5 arguments, got {}", args.len()));
    };
    let f_in = f_in.as_slice::<T>()?;
    let rho = rho.as_mut_slice::<T>()?;
    let u = u.as_mut_slice::<T>()?;
    let map = map.as_slice::<i32>()?;
    let f_out = f_out.as_mut_slice::<T>()?;

    let dim = options.dim;
    let stride = options.stride;
    let omega = 1.0 / options.tau();
    let lid = options.velocity;

    for (x, y, z) in cells(dim, range) {
        let id = cell_index(x, y, z, dim);

        if cell::is_solid(map[id]) {
            for q in 0..Q {
                let idx = population_index(id, q, stride);
                f_out[idx] = f_in[idx];
            }
            continue;
        }

        // Pull streaming with bounce-back from solid neighbours.
        let mut f = [0.0f64; Q];
        for q in 0..Q {
            let c = VELOCITIES[q];
            let sx = (x as i64 - c[0] as i64) as usize;
            let sy = (y as i64 - c[1] as i64) as usize;
            let sz = (z as i64 - c[2] as i64) as usize;
            let src = cell_index(sx, sy, sz, dim);
            let src_kind = map[src];

            f[q] = if cell::is_solid(src_kind) {
                let reflected = f_in[population_index(id, OPPOSITE[q], stride)].to_f64();
                if cell::is_moving(src_kind) {
                    reflected + 6.0 * WEIGHTS[q] * c[0] as f64 * lid
                } else {
                    reflected
                }
            } else {
                f_in[population_index(src, q, stride)].to_f64()
            };
        }

        let density: f64 = f.iter().sum();
        let mut velocity = [0.0f64; 3];
        for q in 0..Q {
            for c in 0..D {
                velocity[c] += f[q] * VELOCITIES[q][c] as f64;
            }
        }
        for v in &mut velocity {
            *v /= density;
        }

        for q in 0..Q {
            let post = f[q] - omega * (f[q] - equilibrium(q, density, velocity));
            f_out[population_index(id, q, stride)] = T::from_f64(post);
        }
        rho[id] = T::from_f64(density);
        for c in 0..D {
            u[velocity_index(id, c)] = T::from_f64(velocity[c]);
        }
    }
    Ok(())
}
