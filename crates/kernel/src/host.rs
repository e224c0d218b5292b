//! Host-side compute device.
//!
//! `HostDevice` implements [`ComputeDevice`] on the CPU with the same queue
//! semantics as an accelerator: launches are only queued, and they run in
//! issue order when a blocking read or `finish` drains the queue. The kernel
//! bodies come from a [`HostProgram`], which lets tests plug in programs that
//! perform a known transformation.

use std::collections::VecDeque;
use std::time::Instant;

use crate::error::{DeviceError, DeviceResult};
use crate::program::{NdRange, ProgramOptions};
use crate::{
    BufferHandle, ComputeDevice, Event, EventProfile, HostAccess, KernelHandle, ProgramHandle,
};

/// Byte storage of one host buffer, 8-byte aligned so it can be viewed as
/// any `Pod` element type.
#[derive(Debug, Default, Clone)]
pub struct HostMemory {
    words: Vec<u64>,
    len: usize,
}

impl HostMemory {
    /// Zero-initialized memory of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self {
            words: vec![0u64; len.div_ceil(8)],
            len,
        }
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw bytes.
    pub fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.len]
    }

    /// Raw bytes, mutable.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..self.len]
    }

    /// View as a slice of `T`.
    pub fn as_slice<T: bytemuck::Pod>(&self) -> Result<&[T], String> {
        bytemuck::try_cast_slice(self.bytes()).map_err(|e| format!("{e:?}"))
    }

    /// View as a mutable slice of `T`.
    pub fn as_mut_slice<T: bytemuck::Pod>(&mut self) -> Result<&mut [T], String> {
        bytemuck::try_cast_slice_mut(self.bytes_mut()).map_err(|e| format!("{e:?}"))
    }
}

/// Kernel bodies executed by a [`HostDevice`].
pub trait HostProgram: Send {
    /// Entry points the program exports.
    fn entry_points(&self) -> &[&'static str];

    /// Validate/compile for the given parameters. Errors become build logs.
    fn build(&mut self, options: &ProgramOptions) -> Result<(), String>;

    /// Run `entry_point` over `range`. `args[i]` is the buffer bound to
    /// argument `i`; every argument is distinct.
    fn launch(&mut self, entry_point: &str, range: NdRange, args: &mut [HostMemory])
        -> Result<(), String>;
}

struct HostBuffer {
    label: String,
    access: HostAccess,
    memory: HostMemory,
}

struct HostKernel {
    entry_point: &'static str,
    args: Vec<Option<BufferHandle>>,
}

struct Launch {
    kernel: KernelHandle,
    range: NdRange,
    event: Event,
}

/// CPU device with a deferred, strictly in-order command queue.
pub struct HostDevice {
    program: Box<dyn HostProgram>,
    built: bool,
    kernels: Vec<HostKernel>,
    buffers: Vec<HostBuffer>,
    pending: VecDeque<Launch>,
    events: Vec<Option<EventProfile>>,
    epoch: Instant,
}

impl HostDevice {
    /// Create a device running `program`.
    pub fn new(program: impl HostProgram + 'static) -> Self {
        Self {
            program: Box::new(program),
            built: false,
            kernels: Vec::new(),
            buffers: Vec::new(),
            pending: VecDeque::new(),
            events: Vec::new(),
            epoch: Instant::now(),
        }
    }

    /// Commands queued but not yet executed.
    pub fn pending_commands(&self) -> usize {
        self.pending.len()
    }

    /// Number of commands ever enqueued.
    pub fn commands_issued(&self) -> usize {
        self.events.len()
    }

    fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn new_event(&mut self) -> Event {
        self.events.push(None);
        Event::from_raw(self.events.len() - 1)
    }

    fn kernel(&self, kernel: KernelHandle) -> DeviceResult<&HostKernel> {
        self.kernels.get(kernel.index()).ok_or(DeviceError::InvalidHandle {
            kind: "kernel",
            index: kernel.index(),
        })
    }

    fn buffer(&self, buffer: BufferHandle) -> DeviceResult<&HostBuffer> {
        self.buffers.get(buffer.index()).ok_or(DeviceError::InvalidHandle {
            kind: "buffer",
            index: buffer.index(),
        })
    }

    /// Resolve the argument list of a kernel into buffer indices.
    fn bound_args(&self, kernel: KernelHandle) -> DeviceResult<Vec<usize>> {
        let k = self.kernel(kernel)?;
        let mut indices = Vec::with_capacity(k.args.len());
        for (i, arg) in k.args.iter().enumerate() {
            let handle = arg.ok_or_else(|| DeviceError::Argument {
                index: i as u32,
                reason: format!("not set for `{}`", k.entry_point),
            })?;
            if indices.contains(&handle.index()) {
                return Err(DeviceError::Argument {
                    index: i as u32,
                    reason: format!("buffer `{}` bound twice", self.buffers[handle.index()].label),
                });
            }
            indices.push(handle.index());
        }
        Ok(indices)
    }

    fn execute(&mut self, launch: Launch) -> DeviceResult<()> {
        let indices = self.bound_args(launch.kernel)?;
        let entry_point = self.kernels[launch.kernel.index()].entry_point;

        let mut args: Vec<HostMemory> = indices
            .iter()
            .map(|&i| std::mem::take(&mut self.buffers[i].memory))
            .collect();

        let start_ns = self.now_ns();
        let result = self.program.launch(entry_point, launch.range, &mut args);
        let end_ns = self.now_ns();

        for (&i, memory) in indices.iter().zip(args) {
            self.buffers[i].memory = memory;
        }
        result.map_err(|e| DeviceError::Dispatch(format!("{entry_point}: {e}")))?;

        self.events[launch.event.index()] = Some(EventProfile { start_ns, end_ns });
        Ok(())
    }

    fn drain(&mut self) -> DeviceResult<()> {
        while let Some(launch) = self.pending.pop_front() {
            self.execute(launch)?;
        }
        Ok(())
    }
}

impl ComputeDevice for HostDevice {
    fn name(&self) -> String {
        "host".to_string()
    }

    fn build_program(&mut self, options: &ProgramOptions) -> DeviceResult<ProgramHandle> {
        tracing::debug!("Building host program: {}", options.build_string());
        self.program
            .build(options)
            .map_err(|log| DeviceError::Build { log })?;
        self.built = true;
        Ok(ProgramHandle::from_raw(0))
    }

    fn create_kernel(&mut self, program: ProgramHandle, entry_point: &str)
        -> DeviceResult<KernelHandle> {
        if !self.built || program.index() != 0 {
            return Err(DeviceError::InvalidHandle { kind: "program", index: program.index() });
        }
        let entry = self
            .program
            .entry_points()
            .iter()
            .copied()
            .find(|&e| e == entry_point)
            .ok_or_else(|| DeviceError::UnknownEntryPoint(entry_point.to_string()))?;

        self.kernels.push(HostKernel { entry_point: entry, args: Vec::new() });
        Ok(KernelHandle::from_raw(self.kernels.len() - 1))
    }

    fn create_buffer(&mut self, label: &str, size: usize, access: HostAccess)
        -> DeviceResult<BufferHandle> {
        if size == 0 {
            return Err(DeviceError::Allocation(format!("`{label}` has zero size")));
        }
        self.buffers.push(HostBuffer {
            label: label.to_string(),
            access,
            memory: HostMemory::zeroed(size),
        });
        Ok(BufferHandle::from_raw(self.buffers.len() - 1))
    }

    fn set_arg(&mut self, kernel: KernelHandle, index: u32, buffer: BufferHandle)
        -> DeviceResult<()> {
        self.buffer(buffer)?;
        let k = self
            .kernels
            .get_mut(kernel.index())
            .ok_or(DeviceError::InvalidHandle { kind: "kernel", index: kernel.index() })?;
        let slot = index as usize;
        if k.args.len() <= slot {
            k.args.resize(slot + 1, None);
        }
        k.args[slot] = Some(buffer);
        Ok(())
    }

    fn enqueue_kernel(&mut self, kernel: KernelHandle, range: NdRange) -> DeviceResult<Event> {
        self.bound_args(kernel)?;
        let event = self.new_event();
        self.pending.push_back(Launch { kernel, range, event });
        Ok(event)
    }

    fn enqueue_read_buffer(&mut self, buffer: BufferHandle, dst: &mut [u8]) -> DeviceResult<Event> {
        let buf = self.buffer(buffer)?;
        if !buf.access.readable() {
            return Err(DeviceError::Transfer(format!("`{}` is not host accessible", buf.label)));
        }
        if dst.len() > buf.memory.len() {
            return Err(DeviceError::Transfer(format!(
                "read of {} bytes from `{}` ({} bytes)",
                dst.len(),
                buf.label,
                buf.memory.len()
            )));
        }

        let event = self.new_event();
        self.drain()?;

        let start_ns = self.now_ns();
        dst.copy_from_slice(&self.buffers[buffer.index()].memory.bytes()[..dst.len()]);
        let end_ns = self.now_ns();

        self.events[event.index()] = Some(EventProfile { start_ns, end_ns });
        Ok(event)
    }

    fn finish(&mut self) -> DeviceResult<()> {
        self.drain()
    }

    fn event_profile(&self, event: Event) -> DeviceResult<EventProfile> {
        match self.events.get(event.index()) {
            Some(Some(profile)) => Ok(*profile),
            Some(None) => Err(DeviceError::Profiling(format!(
                "event #{} has not completed",
                event.index()
            ))),
            None => Err(DeviceError::InvalidHandle { kind: "event", index: event.index() }),
        }
    }
}
