//! Dispatch schedule tests with a counting program
//!
//! `compute` writes `f_out = f_in + 1` and sets the density to that value,
//! so after iteration `i` the buffer holding the updated state contains `i`
//! everywhere. Any role mix-up between `f_stream` and `f_collide` shows up as
//! a stale value in the dumps or snapshots.

use std::fs;
use std::path::Path;

use kernel::cell;
use kernel::geometry::cell_index;
use kernel::{HostDevice, HostMemory, HostProgram, NdRange, ProgramOptions};
use orchestrator::{LbmSimulation, Operation, SimulationConfig, SimulationError};

struct Counting {
    dim: usize,
}

impl HostProgram for Counting {
    fn entry_points(&self) -> &[&'static str] {
        &["initialize", "compute"]
    }

    fn build(&mut self, options: &ProgramOptions) -> Result<(), String> {
        self.dim = options.dim;
        Ok(())
    }

    fn launch(&mut self, entry_point: &str, _: NdRange, args: &mut [HostMemory]) -> Result<(), String> {
        match entry_point {
            "initialize" => {
                let [f_stream, f_collide, rho, u, map] = args else {
                    return Err("initialize takes 5 arguments".into());
                };
                f_stream.as_mut_slice::<f32>()?.fill(0.0);
                f_collide.as_mut_slice::<f32>()?.fill(0.0);
                rho.as_mut_slice::<f32>()?.fill(0.0);
                u.as_mut_slice::<f32>()?.fill(0.0);
                let map = map.as_mut_slice::<i32>()?;
                let dim = self.dim;
                for z in 0..dim {
                    for y in 0..dim {
                        for x in 0..dim {
                            let interior = [x, y, z].iter().all(|&c| c > 0 && c < dim - 1);
                            map[cell_index(x, y, z, dim)] =
                                if interior { cell::FLUID } else { cell::WALL };
                        }
                    }
                }
                Ok(())
            }
            "compute" => {
                let [f_in, rho, _u, _map, f_out] = args else {
                    return Err("compute takes 5 arguments".into());
                };
                let f_in = f_in.as_slice::<f32>()?;
                let f_out = f_out.as_mut_slice::<f32>()?;
                for (o, i) in f_out.iter_mut().zip(f_in) {
                    *o = i + 1.0;
                }
                rho.as_mut_slice::<f32>()?.fill(f_out[0]);
                Ok(())
            }
            other => Err(format!("unknown entry point {other}")),
        }
    }
}

fn config(dir: &Path, dim: usize, iterations: usize, every: usize) -> SimulationConfig {
    SimulationConfig {
        dim,
        iterations,
        every,
        lws: 1,
        stride: 1,
        vtk_path: dir.join("vtk").to_string_lossy().into_owned(),
        dump_path: dir.join("dump").to_string_lossy().into_owned(),
        ..Default::default()
    }
}

fn run(config: SimulationConfig) -> LbmSimulation<f32, HostDevice> {
    let mut sim = LbmSimulation::<f32, HostDevice>::new(config).unwrap();
    sim.setup_device(HostDevice::new(Counting { dim: 0 })).unwrap();
    sim.perform_simulation_and_wait().unwrap();
    sim
}

fn snapshot_rho(path: &Path) -> Vec<f64> {
    let text = fs::read_to_string(path).unwrap();
    let start = text.find("Name=\"rho\"").unwrap();
    let body = &text[start..];
    let body = &body[body.find('>').unwrap() + 1..body.find("</DataArray>").unwrap()];
    body.split_whitespace().map(|v| v.parse().unwrap()).collect()
}

#[test]
fn test_snapshot_files_and_extent() {
    let tmp = tempfile::tempdir().unwrap();
    run(config(tmp.path(), 4, 2, 1));

    let vtk = tmp.path().join("vtk");
    for i in 0..=2 {
        let path = vtk.join(format!("lbmcl.{i}.vti"));
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("WholeExtent=\"0 1 0 1 0 1\""), "{}", path.display());
    }
    assert_eq!(fs::read_dir(&vtk).unwrap().count(), 3);
}

#[test]
fn test_snapshots_see_updated_state() {
    let tmp = tempfile::tempdir().unwrap();
    run(config(tmp.path(), 4, 5, 1));

    for i in 0..=5 {
        let rho = snapshot_rho(&tmp.path().join(format!("vtk/lbmcl.{i}.vti")));
        assert_eq!(rho.len(), 8);
        assert!(rho.iter().all(|&r| r == i as f64), "iteration {i}: {rho:?}");
    }
}

#[test]
fn test_distribution_dumps_follow_buffer_roles() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = config(tmp.path(), 3, 4, 0);
    cfg.dump_f = true;
    let sim = run(cfg);

    for i in 0..=4 {
        let text = fs::read_to_string(tmp.path().join(format!("dump/f_{i}.dump"))).unwrap();
        let expected = format!("{:.6}", i as f64);
        let line = text.lines().find(|l| l.starts_with("(1,1,1)")).unwrap();
        let values: Vec<&str> = line.split_whitespace().skip(1).collect();
        assert_eq!(values.len(), 19);
        assert!(values.iter().all(|v| *v == expected), "iteration {i}: {line}");
    }
    assert!(sim.distribution().unwrap().iter().all(|&v| v == 4.0));
}

#[test]
fn test_every_zero_writes_only_initial_snapshot() {
    let tmp = tempfile::tempdir().unwrap();
    run(config(tmp.path(), 4, 3, 0));
    let files: Vec<_> = fs::read_dir(tmp.path().join("vtk")).unwrap().collect();
    assert_eq!(files.len(), 1);
    assert!(tmp.path().join("vtk/lbmcl.0.vti").exists());
}

#[test]
fn test_snapshot_names_are_padded() {
    let tmp = tempfile::tempdir().unwrap();
    run(config(tmp.path(), 3, 12, 5));
    for name in ["lbmcl.00.vti", "lbmcl.05.vti", "lbmcl.10.vti"] {
        assert!(tmp.path().join("vtk").join(name).exists(), "{name}");
    }
    assert_eq!(fs::read_dir(tmp.path().join("vtk")).unwrap().count(), 3);
}

#[test]
fn test_map_dump_of_walled_box() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = config(tmp.path(), 3, 1, 1);
    cfg.dump_map = true;
    let sim = run(cfg);

    let text = fs::read_to_string(tmp.path().join("dump/map.dump")).unwrap();
    let rows: Vec<&str> = text.lines().skip(6).filter(|l| !l.is_empty()).collect();
    assert_eq!(rows.len(), 9);
    for (i, row) in rows.iter().enumerate() {
        let expected = if i == 4 { "4 1 4 " } else { "4 4 4 " };
        assert_eq!(*row, expected);
    }
    assert_eq!(sim.cell_map().unwrap()[cell_index(1, 1, 1, 3)], cell::FLUID);
}

#[test]
fn test_ledger_records_every_operation() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = config(tmp.path(), 4, 4, 2);
    cfg.dump_map = true;
    cfg.dump_f = true;
    let mut sim = run(cfg);

    let ledger = sim.ledger();
    assert_eq!(ledger.count(Operation::Initialize), 1);
    assert_eq!(ledger.count(Operation::Compute), 4);
    assert_eq!(ledger.count(Operation::ReadRho), 3);
    assert_eq!(ledger.count(Operation::ReadU), 3);
    assert_eq!(ledger.count(Operation::ReadMap), 1);
    assert_eq!(ledger.count(Operation::ReadF), 5);
    assert_eq!(ledger.len(), 17);
    assert_eq!(ledger.records()[0].0, Operation::Initialize);

    let timings = sim.kernels_timings_ms().unwrap();
    assert_eq!(timings.len(), 17);
    let kernels = sim.kernels_time_ms().unwrap();
    for (_, ms) in &timings {
        assert!(*ms >= 0.0);
        assert!(kernels >= *ms);
    }
    assert!(sim.total_time_ms().unwrap() >= kernels);

    let mlups = sim.mlups().unwrap();
    let kernels_mlups = sim.kernels_mlups().unwrap();
    assert!(mlups.is_finite() && mlups >= 0.0);
    assert!(kernels_mlups.is_finite() && kernels_mlups >= 0.0);

    let summary = sim.timing_summary().unwrap();
    let names: Vec<_> = summary.iter().map(|s| s.operation).collect();
    assert_eq!(
        names,
        vec![
            Operation::Initialize,
            Operation::ReadRho,
            Operation::ReadU,
            Operation::ReadMap,
            Operation::ReadF,
            Operation::Compute
        ]
    );
}

#[test]
fn test_zero_iterations() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sim = run(config(tmp.path(), 4, 0, 1));
    assert_eq!(sim.ledger().count(Operation::Compute), 0);
    assert_eq!(sim.mlups().unwrap(), 0.0);
    assert!(tmp.path().join("vtk/lbmcl.0.vti").exists());
}

#[test]
fn test_unwritable_output_is_an_io_error() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("vtk");
    fs::write(&blocker, b"not a directory").unwrap();

    let mut sim = LbmSimulation::<f32, HostDevice>::new(config(tmp.path(), 4, 1, 1)).unwrap();
    sim.setup_device(HostDevice::new(Counting { dim: 0 })).unwrap();
    let err = sim.perform_simulation().unwrap_err();
    assert!(matches!(err, SimulationError::Io { .. }));
    assert_eq!(err.exit_code(), 1);
}
