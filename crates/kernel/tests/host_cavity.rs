//! Lid-driven cavity on the host device
//!
//! Runs the bundled BGK program through the `ComputeDevice` trait and checks
//! physical sanity: rest state is preserved, mass is conserved, the lid
//! drags the fluid below it along +x, and single/double precision agree.

mod common;

use common::{options, run_cavity};
use kernel::geometry::{cell_index, velocity_index};
use kernel::{cell, BgkProgram, HostDevice, Precision};

#[test]
fn test_closed_box_stays_at_rest() {
    let dim = 6;
    let mut device = HostDevice::new(BgkProgram::new());
    let fields = run_cavity(&mut device, &options(dim, 4, Precision::Double, 0.0), 10).unwrap();

    for z in 1..dim - 1 {
        for y in 1..dim - 1 {
            for x in 1..dim - 1 {
                let id = cell_index(x, y, z, dim);
                assert!((fields.rho[id] - 1.0).abs() < 1e-12);
                for c in 0..3 {
                    assert!(fields.u[velocity_index(id, c)].abs() < 1e-12);
                }
            }
        }
    }
}

#[test]
fn test_padded_layout_conserves_mass() {
    // 5^3 = 125 cells is not a multiple of the 32-wide blocks
    let dim = 5;
    let mut device = HostDevice::new(BgkProgram::new());
    let fields = run_cavity(&mut device, &options(dim, 32, Precision::Double, 0.05), 20).unwrap();

    let mut mass = 0.0;
    for z in 1..dim - 1 {
        for y in 1..dim - 1 {
            for x in 1..dim - 1 {
                mass += fields.rho[cell_index(x, y, z, dim)];
            }
        }
    }
    assert!((mass - 27.0).abs() < 1e-2, "interior mass {mass}");
}

#[test]
fn test_lid_drives_flow() {
    let dim = 8;
    let mut device = HostDevice::new(BgkProgram::new());
    let fields = run_cavity(&mut device, &options(dim, 8, Precision::Double, 0.1), 30).unwrap();

    let below_lid = cell_index(dim / 2, dim - 2, dim / 2, dim);
    let bottom = cell_index(dim / 2, 1, dim / 2, dim);
    let u_top = fields.u[velocity_index(below_lid, 0)];
    let u_bottom = fields.u[velocity_index(bottom, 0)];
    assert!(u_top > 0.0);
    assert!(u_top > u_bottom.abs());
    assert!(fields.rho.iter().all(|r| r.is_finite()));
}

#[test]
fn test_classification_map() {
    let dim = 5;
    let mut device = HostDevice::new(BgkProgram::new());
    let fields = run_cavity(&mut device, &options(dim, 1, Precision::Single, 0.05), 0).unwrap();

    assert!(cell::is_corner(fields.map[cell_index(0, 0, 0, dim)]));
    assert!(cell::is_moving(fields.map[cell_index(2, dim - 1, 2, dim)]));
    assert!(cell::is_wall(fields.map[cell_index(0, 2, 2, dim)]));
    assert!(cell::is_fluid(fields.map[cell_index(2, 2, 2, dim)]));
    assert!(!cell::is_boundary(fields.map[cell_index(2, 2, 2, dim)]));
    assert!(cell::is_boundary(fields.map[cell_index(1, 2, 2, dim)]));
}

#[test]
fn test_single_and_double_agree() {
    let dim = 6;
    let mut single = HostDevice::new(BgkProgram::new());
    let mut double = HostDevice::new(BgkProgram::new());
    let a = run_cavity(&mut single, &options(dim, 4, Precision::Single, 0.05), 10).unwrap();
    let b = run_cavity(&mut double, &options(dim, 4, Precision::Double, 0.05), 10).unwrap();

    for (x, y) in a.rho.iter().zip(&b.rho) {
        assert!((x - y).abs() < 1e-5);
    }
    for (x, y) in a.u.iter().zip(&b.u) {
        assert!((x - y).abs() < 1e-5);
    }
}
