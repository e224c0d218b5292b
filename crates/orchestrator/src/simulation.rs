//! Simulation lifecycle: device setup, ping-pong dispatch, output and timing.
//!
//! # Buffer roles
//! Two distribution buffers, `f_collide` and `f_stream`, alternate roles.
//! Two handles of the same `compute` entry point are bound once at setup
//! with swapped arguments:
//!
//! | iteration | kernel         | reads       | writes (authoritative after) |
//! |-----------|----------------|-------------|------------------------------|
//! | 0         | `initialize`   |             | both                         |
//! | odd       | `compute`      | `f_collide` | `f_stream`                   |
//! | even      | `compute_swap` | `f_stream`  | `f_collide`                  |
//!
//! # Synchronization
//! Kernel launches only queue work. Every read-back blocks, and since the
//! queue is in order, it also waits for everything issued before it.

use kernel::{
    BufferHandle, ComputeDevice, HostAccess, KernelHandle, LatticeGeometry, NdRange, Precision,
    Real,
};

use crate::config::SimulationConfig;
use crate::error::{SimulationError, SimulationResult};
use crate::ledger::{self, Operation, OperationStats, Timings, TimingLedger};
use crate::output::{self, dump, vtk};

// ---------------------------------------------------------------------------
// Ping-pong schedule
// ---------------------------------------------------------------------------

/// One of the two distribution buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRole {
    /// `f_stream`, written by `compute`.
    FStream,
    /// `f_collide`, written by `compute_swap`.
    FCollide,
}

/// One of the two handles of the `compute` entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeKernel {
    /// `compute(f_collide, rho, u, map, f_stream)`.
    Compute,
    /// `compute_swap(f_stream, rho, u, map, f_collide)`.
    ComputeSwap,
}

/// Which kernel and buffers each iteration uses.
pub struct PingPong;

impl PingPong {
    /// Kernel dispatched at `iteration` (1-based).
    pub fn compute_kernel_for(iteration: usize) -> ComputeKernel {
        if iteration % 2 == 0 {
            ComputeKernel::ComputeSwap
        } else {
            ComputeKernel::Compute
        }
    }

    /// Buffer read by the kernel of `iteration`.
    pub fn source_buffer_for(iteration: usize) -> BufferRole {
        match Self::compute_kernel_for(iteration) {
            ComputeKernel::Compute => BufferRole::FCollide,
            ComputeKernel::ComputeSwap => BufferRole::FStream,
        }
    }

    /// Buffer holding the authoritative state once `iteration` completed.
    /// Iteration 0 is the initial state, dumped from `f_collide`.
    pub fn updated_buffer_for(iteration: usize) -> BufferRole {
        if iteration == 0 {
            return BufferRole::FCollide;
        }
        match Self::compute_kernel_for(iteration) {
            ComputeKernel::Compute => BufferRole::FStream,
            ComputeKernel::ComputeSwap => BufferRole::FCollide,
        }
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Resources {
    compute: KernelHandle,
    compute_swap: KernelHandle,
    f_stream: BufferHandle,
    f_collide: BufferHandle,
    rho: BufferHandle,
    u: BufferHandle,
    map: BufferHandle,
}

impl Resources {
    fn kernel(&self, kernel: ComputeKernel) -> KernelHandle {
        match kernel {
            ComputeKernel::Compute => self.compute,
            ComputeKernel::ComputeSwap => self.compute_swap,
        }
    }

    fn buffer(&self, role: BufferRole) -> BufferHandle {
        match role {
            BufferRole::FStream => self.f_stream,
            BufferRole::FCollide => self.f_collide,
        }
    }
}

/// Host copies of device buffers, refreshed by every read-back.
#[derive(Debug, Default)]
struct HostMirrors<T> {
    rho: Vec<T>,
    u: Vec<T>,
    map: Option<Vec<i32>>,
    f: Option<Vec<T>>,
}

/// A lid-driven cavity run on one device.
///
/// `T` is the host real type and must match the configured precision; `D` is
/// the device, owned by the simulation once [`setup_device`] succeeded.
///
/// [`setup_device`]: LbmSimulation::setup_device
pub struct LbmSimulation<T: Real, D: ComputeDevice> {
    config: SimulationConfig,
    geometry: LatticeGeometry,
    device: Option<D>,
    resources: Option<Resources>,
    mirrors: HostMirrors<T>,
    ledger: TimingLedger,
    dispatched: bool,
}

impl<T: Real, D: ComputeDevice> LbmSimulation<T, D> {
    /// Validate `config` for a simulation with reals of type `T`.
    pub fn new(config: SimulationConfig) -> SimulationResult<Self> {
        config.validate().map_err(SimulationError::Config)?;
        let precision: Precision = config.precision.into();
        if precision != T::PRECISION {
            return Err(SimulationError::Config(format!(
                "configured precision {:?} does not match host reals ({:?})",
                precision,
                T::PRECISION
            )));
        }

        Ok(Self {
            geometry: config.geometry(),
            config,
            device: None,
            resources: None,
            mirrors: HostMirrors::default(),
            ledger: TimingLedger::new(),
            dispatched: false,
        })
    }

    /// Configuration the simulation was built from.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Lattice sizes.
    pub fn geometry(&self) -> &LatticeGeometry {
        &self.geometry
    }

    /// Operations recorded so far.
    pub fn ledger(&self) -> &TimingLedger {
        &self.ledger
    }

    /// The device, once set up.
    pub fn device(&self) -> Option<&D> {
        self.device.as_ref()
    }

    /// Density as of the last snapshot.
    pub fn density(&self) -> &[T] {
        &self.mirrors.rho
    }

    /// Velocity as of the last snapshot, three components per cell.
    pub fn velocity(&self) -> &[T] {
        &self.mirrors.u
    }

    /// Classification map, if it was dumped.
    pub fn cell_map(&self) -> Option<&[i32]> {
        self.mirrors.map.as_deref()
    }

    /// Distribution function as of the last dump, if dumping is enabled.
    pub fn distribution(&self) -> Option<&[T]> {
        self.mirrors.f.as_deref()
    }

    /// Interior cells counted as updated per iteration.
    pub fn wet_cells(&self) -> usize {
        self.geometry.wet_cells().unwrap_or(0)
    }

    // -- setup ------------------------------------------------------------

    /// Build the program, allocate and bind every buffer, queue `initialize`
    /// and allocate host mirrors. Takes ownership of `device`.
    pub fn setup_device(&mut self, mut device: D) -> SimulationResult<()> {
        if self.device.is_some() {
            return Err(SimulationError::State("device already set up".into()));
        }
        let real_size = T::PRECISION.size();
        let g = self.geometry;
        tracing::info!(
            "Setting up {} for a {}^3 lattice ({} bytes of device memory)",
            device.name(),
            g.dim,
            g.device_memory_bytes(real_size)
        );

        // 1. Program
        let options = self.config.program_options();
        if self.config.print_options {
            tracing::info!("Kernels options: {}", options.build_string());
        }
        let program = device
            .build_program(&options)
            .map_err(SimulationError::setup("build_program"))?;

        // 2. Kernels
        let mut kernel = |name: &str, entry: &str| {
            device
                .create_kernel(program, entry)
                .map_err(SimulationError::setup(format!("create_kernel({name})")))
        };
        let initialize = kernel("initialize", "initialize")?;
        let compute = kernel("compute", "compute")?;
        let compute_swap = kernel("compute_swap", "compute")?;

        // 3. Buffers
        let f_access = if self.config.dump_f { HostAccess::ReadWrite } else { HostAccess::NoAccess };
        let map_access = if self.config.dump_map { HostAccess::ReadWrite } else { HostAccess::NoAccess };
        let mut buffer = |name: &str, size: usize, access: HostAccess| {
            device
                .create_buffer(name, size, access)
                .map_err(SimulationError::setup(format!("create_buffer({name})")))
        };
        let f_stream = buffer("f_stream", g.f_size(real_size), f_access)?;
        let f_collide = buffer("f_collide", g.f_size(real_size), f_access)?;
        let rho = buffer("rho", g.rho_size(real_size), HostAccess::ReadOnly)?;
        let u = buffer("u", g.u_size(real_size), HostAccess::ReadOnly)?;
        let map = buffer("map", g.map_size(), map_access)?;

        // 4. Arguments
        let bindings = [
            ("initialize", initialize, [f_stream, f_collide, rho, u, map]),
            ("compute", compute, [f_collide, rho, u, map, f_stream]),
            ("compute_swap", compute_swap, [f_stream, rho, u, map, f_collide]),
        ];
        for (name, kernel, args) in bindings {
            for (index, arg) in args.into_iter().enumerate() {
                device
                    .set_arg(kernel, index as u32, arg)
                    .map_err(SimulationError::setup(format!("set_arg({name}, {index})")))?;
            }
        }

        // 5. Initial state
        let event = device
            .enqueue_kernel(initialize, NdRange::lattice(g.dim, self.config.lws))
            .map_err(SimulationError::setup("enqueue_kernel(initialize)"))?;
        self.ledger.record(Operation::Initialize, event);

        // 6. Host mirrors
        self.mirrors = HostMirrors {
            rho: vec![T::default(); g.rho_len()],
            u: vec![T::default(); g.u_len()],
            map: self.config.dump_map.then(|| vec![0; g.map_len()]),
            f: self.config.dump_f.then(|| vec![T::default(); g.f_len()]),
        };

        self.resources = Some(Resources { compute, compute_swap, f_stream, f_collide, rho, u, map });
        self.device = Some(device);
        tracing::info!("Device setup complete");
        Ok(())
    }

    // -- dispatch ---------------------------------------------------------

    /// Queue every iteration with its snapshots and dumps. Returns once the
    /// last command is queued; use [`wait_completion`] to wait for the
    /// device.
    ///
    /// [`wait_completion`]: LbmSimulation::wait_completion
    pub fn perform_simulation(&mut self) -> SimulationResult<()> {
        let resources = self.resources()?;
        if self.dispatched {
            return Err(SimulationError::State("simulation already dispatched".into()));
        }
        self.dispatched = true;

        let iterations = self.config.iterations;
        let every = self.config.every;
        tracing::info!("Dispatching {} iterations (snapshot every {})", iterations, every);

        self.store_data(&resources, 0)?;
        if self.config.dump_map {
            self.store_map(&resources)?;
        }
        if self.config.dump_f {
            self.store_f(&resources, BufferRole::FCollide, 0)?;
        }

        let range = NdRange::lattice(self.geometry.dim, self.config.lws);
        for iteration in 1..=iterations {
            let kernel = resources.kernel(PingPong::compute_kernel_for(iteration));
            let event = self
                .device_mut()?
                .enqueue_kernel(kernel, range)
                .map_err(SimulationError::dispatch("compute"))?;
            self.ledger.record(Operation::Compute, event);

            if self.config.dump_f {
                self.store_f(&resources, PingPong::updated_buffer_for(iteration), iteration)?;
            }
            if every > 0 && iteration % every == 0 {
                self.store_data(&resources, iteration)?;
            }
            tracing::debug!("Iteration {} queued", iteration);
        }
        Ok(())
    }

    /// Block until the device drained its queue.
    pub fn wait_completion(&mut self) -> SimulationResult<()> {
        match self.device.as_mut() {
            Some(device) => device.finish().map_err(SimulationError::dispatch("finish")),
            None => Ok(()),
        }
    }

    /// [`perform_simulation`](Self::perform_simulation) then
    /// [`wait_completion`](Self::wait_completion).
    pub fn perform_simulation_and_wait(&mut self) -> SimulationResult<()> {
        self.perform_simulation()?;
        self.wait_completion()
    }

    // -- timing -----------------------------------------------------------

    /// Wait for completion and resolve the profile of every recorded
    /// operation.
    pub fn timings(&mut self) -> SimulationResult<Timings> {
        self.wait_completion()?;
        match self.device.as_ref() {
            Some(device) => self
                .ledger
                .resolve(device)
                .map_err(SimulationError::dispatch("event_profile")),
            None => Ok(Timings::default()),
        }
    }

    /// Device time from the first operation's start to the last one's end.
    pub fn total_time_ms(&mut self) -> SimulationResult<f64> {
        Ok(self.timings()?.total_time_ms())
    }

    /// Sum of the own durations of every operation.
    pub fn kernels_time_ms(&mut self) -> SimulationResult<f64> {
        Ok(self.timings()?.kernels_time_ms())
    }

    /// Own duration of every operation, in issue order.
    pub fn kernels_timings_ms(&mut self) -> SimulationResult<Vec<(Operation, f64)>> {
        Ok(self.timings()?.kernels_timings_ms())
    }

    /// Durations aggregated per operation name.
    pub fn timing_summary(&mut self) -> SimulationResult<Vec<OperationStats>> {
        Ok(self.timings()?.summary())
    }

    /// Throughput over the total device span.
    pub fn mlups(&mut self) -> SimulationResult<f64> {
        let elapsed = self.total_time_ms()?;
        Ok(ledger::mlups(self.wet_cells(), self.config.iterations, elapsed))
    }

    /// Throughput over the summed operation durations.
    pub fn kernels_mlups(&mut self) -> SimulationResult<f64> {
        let elapsed = self.kernels_time_ms()?;
        Ok(ledger::mlups(self.wet_cells(), self.config.iterations, elapsed))
    }

    // -- internals --------------------------------------------------------

    fn resources(&self) -> SimulationResult<Resources> {
        self.resources
            .ok_or_else(|| SimulationError::State("device not set up".into()))
    }

    fn device_mut(&mut self) -> SimulationResult<&mut D> {
        self.device
            .as_mut()
            .ok_or_else(|| SimulationError::State("device not set up".into()))
    }

    /// Read density and velocity back and write the snapshot of `iteration`.
    fn store_data(&mut self, resources: &Resources, iteration: usize) -> SimulationResult<()> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| SimulationError::State("device not set up".into()))?;

        let event = device
            .enqueue_read_buffer(resources.rho, bytemuck::cast_slice_mut(&mut self.mirrors.rho))
            .map_err(SimulationError::dispatch("read_rho"))?;
        self.ledger.record(Operation::ReadRho, event);

        let event = device
            .enqueue_read_buffer(resources.u, bytemuck::cast_slice_mut(&mut self.mirrors.u))
            .map_err(SimulationError::dispatch("read_u"))?;
        self.ledger.record(Operation::ReadU, event);

        let path = output::snapshot_path(&self.config.vtk_path, iteration, self.config.iterations);
        let dim = self.geometry.dim;
        let (rho, u) = (&self.mirrors.rho, &self.mirrors.u);
        output::write_file(&path, |w| vtk::write_snapshot(w, dim, rho, u))
    }

    /// Read the classification map back and write `map.dump`.
    fn store_map(&mut self, resources: &Resources) -> SimulationResult<()> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| SimulationError::State("device not set up".into()))?;
        let map = self
            .mirrors
            .map
            .as_mut()
            .ok_or_else(|| SimulationError::State("map dumping is disabled".into()))?;

        let event = device
            .enqueue_read_buffer(resources.map, bytemuck::cast_slice_mut(map))
            .map_err(SimulationError::dispatch("read_map"))?;
        self.ledger.record(Operation::ReadMap, event);

        let path = output::map_dump_path(&self.config.dump_path);
        let dim = self.geometry.dim;
        output::write_file(&path, |w| dump::write_map(w, dim, map))
    }

    /// Read the distribution buffer `role` back and write its dump for
    /// `iteration`.
    fn store_f(&mut self, resources: &Resources, role: BufferRole, iteration: usize)
        -> SimulationResult<()> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| SimulationError::State("device not set up".into()))?;
        let f = self
            .mirrors
            .f
            .as_mut()
            .ok_or_else(|| SimulationError::State("distribution dumping is disabled".into()))?;

        let event = device
            .enqueue_read_buffer(resources.buffer(role), bytemuck::cast_slice_mut(f))
            .map_err(SimulationError::dispatch("read_f"))?;
        self.ledger.record(Operation::ReadF, event);

        let path =
            output::distribution_dump_path(&self.config.dump_path, iteration, self.config.iterations);
        let (dim, stride) = (self.geometry.dim, self.geometry.stride);
        output::write_file(&path, |w| dump::write_distribution(w, dim, stride, f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigPrecision;
    use kernel::{BgkProgram, HostDevice};

    #[test]
    fn odd_iterations_use_compute() {
        for i in (1..100).step_by(2) {
            assert_eq!(PingPong::compute_kernel_for(i), ComputeKernel::Compute);
            assert_eq!(PingPong::source_buffer_for(i), BufferRole::FCollide);
            assert_eq!(PingPong::updated_buffer_for(i), BufferRole::FStream);
        }
    }

    #[test]
    fn even_iterations_use_compute_swap() {
        for i in (2..100).step_by(2) {
            assert_eq!(PingPong::compute_kernel_for(i), ComputeKernel::ComputeSwap);
            assert_eq!(PingPong::source_buffer_for(i), BufferRole::FStream);
            assert_eq!(PingPong::updated_buffer_for(i), BufferRole::FCollide);
        }
    }

    #[test]
    fn each_iteration_reads_what_the_previous_wrote() {
        for i in 1..50 {
            assert_eq!(PingPong::source_buffer_for(i), PingPong::updated_buffer_for(i - 1));
        }
    }

    fn config(dir: &std::path::Path) -> SimulationConfig {
        SimulationConfig {
            dim: 4,
            iterations: 2,
            every: 1,
            lws: 4,
            stride: 4,
            vtk_path: dir.join("vtk").to_string_lossy().into_owned(),
            dump_path: dir.join("dump").to_string_lossy().into_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn precision_must_match_host_reals() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = SimulationConfig { precision: ConfigPrecision::Double, ..config(tmp.path()) };
        assert!(matches!(
            LbmSimulation::<f32, HostDevice>::new(cfg),
            Err(SimulationError::Config(_))
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = SimulationConfig { dim: 2, ..config(tmp.path()) };
        assert!(LbmSimulation::<f32, HostDevice>::new(cfg).is_err());
    }

    #[test]
    fn oversized_lattice_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = SimulationConfig { dim: 3_000_000, ..config(tmp.path()) };
        assert!(matches!(
            LbmSimulation::<f32, HostDevice>::new(cfg),
            Err(SimulationError::Config(_))
        ));
    }

    #[test]
    fn dispatch_before_setup_is_a_state_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sim = LbmSimulation::<f32, HostDevice>::new(config(tmp.path())).unwrap();
        assert!(matches!(sim.perform_simulation(), Err(SimulationError::State(_))));
        assert_eq!(sim.total_time_ms().unwrap(), 0.0);
        assert_eq!(sim.mlups().unwrap(), 0.0);
    }

    #[test]
    fn setup_twice_is_a_state_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sim = LbmSimulation::<f32, HostDevice>::new(config(tmp.path())).unwrap();
        sim.setup_device(HostDevice::new(BgkProgram::new())).unwrap();
        let err = sim.setup_device(HostDevice::new(BgkProgram::new())).unwrap_err();
        assert!(matches!(err, SimulationError::State(_)));
    }

    #[test]
    fn setup_queues_initialize_without_running_it() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sim = LbmSimulation::<f32, HostDevice>::new(config(tmp.path())).unwrap();
        sim.setup_device(HostDevice::new(BgkProgram::new())).unwrap();

        assert_eq!(sim.ledger().records().len(), 1);
        assert_eq!(sim.ledger().records()[0].0, Operation::Initialize);
        assert_eq!(sim.device().unwrap().pending_commands(), 1);
        assert_eq!(sim.density().len(), 64);
        assert_eq!(sim.velocity().len(), 192);
        assert!(sim.cell_map().is_none());
        assert!(sim.distribution().is_none());
    }

    #[test]
    fn second_dispatch_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sim = LbmSimulation::<f32, HostDevice>::new(config(tmp.path())).unwrap();
        sim.setup_device(HostDevice::new(BgkProgram::new())).unwrap();
        sim.perform_simulation_and_wait().unwrap();
        assert!(matches!(sim.perform_simulation(), Err(SimulationError::State(_))));
    }
}
