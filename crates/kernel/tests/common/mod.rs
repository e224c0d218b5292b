//! Drives a lid-driven cavity through the `ComputeDevice` trait only.

#![allow(dead_code)]

use kernel::{
    ComputeDevice, DeviceResult, HostAccess, LatticeGeometry, NdRange, Precision, ProgramOptions,
};

pub fn options(dim: usize, stride: usize, precision: Precision, velocity: f64) -> ProgramOptions {
    ProgramOptions {
        dim,
        viscosity: 0.05,
        velocity,
        stride,
        precision,
        optimize: false,
        local_size: 4,
    }
}

/// Final fields of a run, widened to `f64`.
pub struct Fields {
    pub rho: Vec<f64>,
    pub u: Vec<f64>,
    pub map: Vec<i32>,
}

fn widen(bytes: &[u8], precision: Precision) -> Vec<f64> {
    match precision {
        Precision::Single => bytemuck::cast_slice::<u8, f32>(bytes).iter().map(|&v| v as f64).collect(),
        Precision::Double => bytemuck::cast_slice::<u8, f64>(bytes).to_vec(),
    }
}

/// `initialize` then `iterations` ping-pong compute steps.
pub fn run_cavity<D: ComputeDevice>(
    device: &mut D,
    options: &ProgramOptions,
    iterations: usize,
) -> DeviceResult<Fields> {
    let g = LatticeGeometry::new(options.dim, options.stride);
    let real = options.precision.size();

    let program = device.build_program(options)?;
    let initialize = device.create_kernel(program, "initialize")?;
    let compute = device.create_kernel(program, "compute")?;
    let compute_swap = device.create_kernel(program, "compute")?;

    let f_stream = device.create_buffer("f_stream", g.f_size(real), HostAccess::NoAccess)?;
    let f_collide = device.create_buffer("f_collide", g.f_size(real), HostAccess::NoAccess)?;
    let rho = device.create_buffer("rho", g.rho_size(real), HostAccess::ReadOnly)?;
    let u = device.create_buffer("u", g.u_size(real), HostAccess::ReadOnly)?;
    let map = device.create_buffer("map", g.map_size(), HostAccess::ReadWrite)?;

    for (kernel, args) in [
        (initialize, [f_stream, f_collide, rho, u, map]),
        (compute, [f_collide, rho, u, map, f_stream]),
        (compute_swap, [f_stream, rho, u, map, f_collide]),
    ] {
        for (i, arg) in args.into_iter().enumerate() {
            device.set_arg(kernel, i as u32, arg)?;
        }
    }

    let range = NdRange::lattice(options.dim, options.local_size);
    device.enqueue_kernel(initialize, range)?;
    for i in 1..=iterations {
        let kernel = if i % 2 == 0 { compute_swap } else { compute };
        device.enqueue_kernel(kernel, range)?;
    }

    // u64 backing so the bytes can be viewed as f64
    let mut rho_bytes = vec![0u64; g.rho_size(real).div_ceil(8)];
    let mut u_bytes = vec![0u64; g.u_size(real).div_ceil(8)];
    let mut map_values = vec![0i32; g.map_len()];
    let rho_dst = &mut bytemuck::cast_slice_mut::<u64, u8>(&mut rho_bytes)[..g.rho_size(real)];
    device.enqueue_read_buffer(rho, rho_dst)?;
    let u_dst = &mut bytemuck::cast_slice_mut::<u64, u8>(&mut u_bytes)[..g.u_size(real)];
    device.enqueue_read_buffer(u, u_dst)?;
    device.enqueue_read_buffer(map, bytemuck::cast_slice_mut(&mut map_values))?;
    device.finish()?;

    let rho_bytes: &[u8] = &bytemuck::cast_slice(&rho_bytes)[..g.rho_size(real)];
    let u_bytes: &[u8] = &bytemuck::cast_slice(&u_bytes)[..g.u_size(real)];
    Ok(Fields {
        rho: widen(rho_bytes, options.precision),
        u: widen(u_bytes, options.precision),
        map: map_values,
    })
}
