//! Lattice-Boltzmann compute kernel layer
//!
//! This crate is the accelerator binding layer used by the orchestrator. It
//! exposes devices only through opaque program, kernel, buffer and event
//! handles, so the orchestrator never inspects what a kernel computes.
//!
//! # Modules
//! - [`geometry`] -- Lattice sizes, wet-cell count and linear index layout.
//! - [`cell`] -- Classification flags of the lattice map and their predicates.
//! - [`program`] -- Build parameters, numeric precision and launch shapes.
//! - [`host`] -- In-order host queue executing a pluggable [`HostProgram`].
//! - [`bgk`] -- D3Q19 BGK lid-driven cavity program for the host queue.
//! - `gpu` -- wgpu back-end with hardware timestamps (feature `gpu`).

#![warn(missing_docs)]

pub mod bgk;
pub mod cell;
pub mod error;
pub mod geometry;
pub mod host;
pub mod program;

#[cfg(feature = "gpu")]
pub mod gpu;

pub use bgk::BgkProgram;
pub use error::{DeviceError, DeviceResult};
pub use geometry::{LatticeGeometry, D, Q};
pub use host::{HostDevice, HostMemory, HostProgram};
pub use program::{NdRange, Precision, ProgramOptions, Real};

#[cfg(feature = "gpu")]
pub use gpu::{list_devices, DeviceSelector, GpuDevice};

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(usize);

        impl $name {
            /// Wrap a device-specific index.
            pub fn from_raw(index: usize) -> Self {
                Self(index)
            }

            /// Device-specific index.
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

handle!(
    /// A compiled program.
    ProgramHandle
);
handle!(
    /// A kernel entry point with its own set of bound arguments.
    KernelHandle
);
handle!(
    /// A device memory buffer.
    BufferHandle
);
handle!(
    /// Completion/timing token of one enqueued command.
    Event
);

/// How the host may access a device buffer. A hint: devices may ignore it,
/// but reading a `NoAccess` buffer is allowed to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAccess {
    /// Device-only memory.
    NoAccess,
    /// The host only reads the buffer back.
    ReadOnly,
    /// Unrestricted.
    ReadWrite,
}

impl HostAccess {
    /// Whether a device-to-host read is permitted.
    pub fn readable(self) -> bool {
        !matches!(self, HostAccess::NoAccess)
    }
}

/// Device-reported execution interval of a command, in nanoseconds on the
/// device clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventProfile {
    /// Command start timestamp.
    pub start_ns: u64,
    /// Command end timestamp.
    pub end_ns: u64,
}

impl EventProfile {
    /// Own duration of the command.
    pub fn duration_ns(&self) -> u64 {
        self.end_ns.saturating_sub(self.start_ns)
    }
}

// ---------------------------------------------------------------------------
// ComputeDevice trait
// ---------------------------------------------------------------------------

/// One accelerator with a single strictly in-order command queue.
///
/// Kernel launches are asynchronous: `enqueue_kernel` returns once the
/// command is queued. `enqueue_read_buffer` is blocking and, because the
/// queue is in order, returns only after every earlier command finished.
/// Event profiles are defined once the command completed; callers use
/// [`finish`](ComputeDevice::finish) first.
pub trait ComputeDevice {
    /// Human-readable device name.
    fn name(&self) -> String;

    /// Compile the program with simulation build parameters.
    fn build_program(&mut self, options: &ProgramOptions) -> DeviceResult<ProgramHandle>;

    /// Resolve a kernel handle for `entry_point`. Each call returns an
    /// independent handle with its own argument bindings.
    fn create_kernel(&mut self, program: ProgramHandle, entry_point: &str)
        -> DeviceResult<KernelHandle>;

    /// Allocate `size` bytes of device memory.
    fn create_buffer(&mut self, label: &str, size: usize, access: HostAccess)
        -> DeviceResult<BufferHandle>;

    /// Bind `buffer` as argument `index` of `kernel`.
    fn set_arg(&mut self, kernel: KernelHandle, index: u32, buffer: BufferHandle)
        -> DeviceResult<()>;

    /// Queue a kernel launch without waiting for it.
    fn enqueue_kernel(&mut self, kernel: KernelHandle, range: NdRange) -> DeviceResult<Event>;

    /// Copy `dst.len()` bytes from the start of `buffer` into `dst`, blocking
    /// until the transfer (and so every earlier command) completed.
    fn enqueue_read_buffer(&mut self, buffer: BufferHandle, dst: &mut [u8]) -> DeviceResult<Event>;

    /// Block until the command queue is drained.
    fn finish(&mut self) -> DeviceResult<()>;

    /// Start/end timestamps of a completed command.
    fn event_profile(&self, event: Event) -> DeviceResult<EventProfile>;
}

impl<T: ComputeDevice + ?Sized> ComputeDevice for Box<T> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn build_program(&mut self, options: &ProgramOptions) -> DeviceResult<ProgramHandle> {
        (**self).build_program(options)
    }

    fn create_kernel(&mut self, program: ProgramHandle, entry_point: &str)
        -> DeviceResult<KernelHandle> {
        (**self).create_kernel(program, entry_point)
    }

    fn create_buffer(&mut self, label: &str, size: usize, access: HostAccess)
        -> DeviceResult<BufferHandle> {
        (**self).create_buffer(label, size, access)
    }

    fn set_arg(&mut self, kernel: KernelHandle, index: u32, buffer: BufferHandle)
        -> DeviceResult<()> {
        (**self).set_arg(kernel, index, buffer)
    }

    fn enqueue_kernel(&mut self, kernel: KernelHandle, range: NdRange) -> DeviceResult<Event> {
        (**self).enqueue_kernel(kernel, range)
    }

    fn enqueue_read_buffer(&mut self, buffer: BufferHandle, dst: &mut [u8]) -> DeviceResult<Event> {
        (**self).enqueue_read_buffer(buffer, dst)
    }

    fn finish(&mut self) -> DeviceResult<()> {
        (**self).finish()
    }

    fn event_profile(&self, event: Event) -> DeviceResult<EventProfile> {
        (**self).event_profile(event)
    }
}
