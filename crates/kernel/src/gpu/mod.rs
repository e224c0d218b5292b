//! GPU (Vulkan/Metal/DX12 via wgpu) implementation of [`ComputeDevice`].
//!
//! # Architecture
//! - One wgpu queue is the in-order command stream. Every kernel launch and
//!   every readback is its own submission, so submission order is execution
//!   order.
//! - The program is `shaders/lbm.wgsl` with the build parameters prepended
//!   as WGSL constants. Each entry point gets one compute pipeline with an
//!   auto-derived layout; every kernel handle owns a bind group built from
//!   its arguments (argument `i` is `@group(0) @binding(i)`).
//! - Each command brackets itself with two hardware timestamp queries. They
//!   are resolved to nanoseconds when the queue is drained by `finish`.
//!
//! Requires `Features::TIMESTAMP_QUERY`; double precision additionally needs
//! `Features::SHADER_F64`.

mod buffers;
mod timestamps;

use buffers::{map_read, DeviceBuffer};
use timestamps::{QueryPair, TimestampPool};

use crate::cell;
use crate::error::{DeviceError, DeviceResult};
use crate::program::{NdRange, Precision, ProgramOptions};
use crate::{
    BufferHandle, ComputeDevice, Event, EventProfile, HostAccess, KernelHandle, ProgramHandle,
};

/// Entry points exported by the lattice program.
const ENTRY_POINTS: [&str; 2] = ["initialize", "compute"];

/// Which adapter to acquire: `platform` indexes the distinct graphics
/// back-ends present, `device` indexes adapters on that back-end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceSelector {
    /// Back-end index.
    pub platform: usize,
    /// Adapter index within the back-end.
    pub device: usize,
}

struct GpuKernel {
    pipeline: usize,
    entry_point: &'static str,
    args: Vec<Option<BufferHandle>>,
    bind_group: Option<wgpu::BindGroup>,
}

/// wgpu-backed compute device.
pub struct GpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    info: wgpu::AdapterInfo,

    options: Option<ProgramOptions>,
    module: Option<wgpu::ShaderModule>,
    pipelines: Vec<(&'static str, wgpu::ComputePipeline)>,
    kernels: Vec<GpuKernel>,
    buffers: Vec<DeviceBuffer>,
    timestamps: TimestampPool,
    events: usize,
}

fn instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}

/// Adapters grouped by back-end, in enumeration order.
fn platforms(instance: &wgpu::Instance) -> Vec<(wgpu::Backend, Vec<wgpu::Adapter>)> {
    let mut groups: Vec<(wgpu::Backend, Vec<wgpu::Adapter>)> = Vec::new();
    for adapter in instance.enumerate_adapters(wgpu::Backends::all()) {
        let backend = adapter.get_info().backend;
        match groups.iter_mut().find(|(b, _)| *b == backend) {
            Some((_, adapters)) => adapters.push(adapter),
            None => groups.push((backend, vec![adapter])),
        }
    }
    groups
}

/// Describe every adapter as `#platform.device [backend] name (type)`.
pub fn list_devices() -> Vec<String> {
    let instance = instance();
    let mut lines = Vec::new();
    for (p, (backend, adapters)) in platforms(&instance).iter().enumerate() {
        for (d, adapter) in adapters.iter().enumerate() {
            let info = adapter.get_info();
            lines.push(format!(
                "#{p}.{d} [{backend:?}] {} ({:?}, driver {})",
                info.name, info.device_type, info.driver_info
            ));
        }
    }
    lines
}

/// WGSL constant prelude carrying the build parameters.
fn prelude(options: &ProgramOptions) -> String {
    let (real, suffix) = match options.precision {
        Precision::Single => ("f32", "f"),
        Precision::Double => ("f64", "lf"),
    };
    let omega = 1.0 / options.tau();
    format!(
        "alias real = {real};\n\
         const DIM: u32 = {}u;\n\
         const STRIDE: u32 = {}u;\n\
         const LWS: u32 = {}u;\n\
         const VISCOSITY: real = {:?}{suffix};\n\
         const VELOCITY: real = {:?}{suffix};\n\
         const OMEGA: real = {:?}{suffix};\n\
         const FLUID: i32 = {}i;\n\
         const MOVING: i32 = {}i;\n\
         const BOUNDARY: i32 = {}i;\n\
         const WALL: i32 = {}i;\n\
         const CORNER: i32 = {}i;\n\n",
        options.dim,
        options.stride,
        options.local_size,
        options.viscosity,
        options.velocity,
        omega,
        cell::FLUID,
        cell::MOVING,
        cell::BOUNDARY,
        cell::WALL,
        cell::CORNER,
    )
}

impl GpuDevice {
    /// Acquire the adapter chosen by `selector` and open a device on it.
    pub fn new(selector: DeviceSelector) -> DeviceResult<Self> {
        let instance = instance();
        let mut groups = platforms(&instance);
        if groups.is_empty() {
            return Err(DeviceError::Unavailable("no GPU adapter found".into()));
        }
        if selector.platform >= groups.len() {
            return Err(DeviceError::Unavailable(format!(
                "platform #{} out of range ({} available)",
                selector.platform,
                groups.len()
            )));
        }
        let (backend, mut adapters) = groups.swap_remove(selector.platform);
        if selector.device >= adapters.len() {
            return Err(DeviceError::Unavailable(format!(
                "device #{} out of range on {backend:?} ({} available)",
                selector.device,
                adapters.len()
            )));
        }
        let adapter = adapters.swap_remove(selector.device);
        let info = adapter.get_info();
        tracing::info!("GPU adapter: {} ({:?})", info.name, info.backend);

        if !adapter.features().contains(wgpu::Features::TIMESTAMP_QUERY) {
            return Err(DeviceError::Unavailable(format!(
                "{} does not support timestamp queries",
                info.name
            )));
        }
        let required_features = wgpu::Features::TIMESTAMP_QUERY
            | (adapter.features() & wgpu::Features::SHADER_F64);

        // Ask for the adapter's own limits: the distribution buffers exceed
        // the default storage binding size for moderately large lattices.
        let required_limits = adapter.limits();
        tracing::debug!(
            "max_storage_buffer_binding_size = {}, max_buffer_size = {}",
            required_limits.max_storage_buffer_binding_size,
            required_limits.max_buffer_size
        );

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("lbm_device"),
                required_features,
                required_limits,
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| DeviceError::Unavailable(format!("failed to create device: {e}")))?;

        let timestamps = TimestampPool::new(&device, &queue);

        Ok(Self {
            device,
            queue,
            info,
            options: None,
            module: None,
            pipelines: Vec::new(),
            kernels: Vec::new(),
            buffers: Vec::new(),
            timestamps,
            events: 0,
        })
    }

    fn kernel_mut(&mut self, kernel: KernelHandle) -> DeviceResult<&mut GpuKernel> {
        self.kernels
            .get_mut(kernel.index())
            .ok_or(DeviceError::InvalidHandle { kind: "kernel", index: kernel.index() })
    }

    fn next_event(&mut self) -> (Event, QueryPair) {
        let pair = self.timestamps.allocate(&self.device);
        let event = Event::from_raw(self.events);
        self.events += 1;
        (event, pair)
    }

    fn pipeline_for(&mut self, entry_point: &'static str) -> DeviceResult<usize> {
        if let Some(i) = self.pipelines.iter().position(|(e, _)| *e == entry_point) {
            return Ok(i);
        }
        let module = self
            .module
            .as_ref()
            .ok_or(DeviceError::InvalidHandle { kind: "program", index: 0 })?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(entry_point),
            layout: None,
            module,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            cache: None,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DeviceError::Build { log: err.to_string() });
        }

        self.pipelines.push((entry_point, pipeline));
        Ok(self.pipelines.len() - 1)
    }

    /// Build the bind group of `kernel` from its arguments if needed.
    fn ensure_bind_group(&mut self, kernel: KernelHandle) -> DeviceResult<()> {
        let k = self
            .kernels
            .get(kernel.index())
            .ok_or(DeviceError::InvalidHandle { kind: "kernel", index: kernel.index() })?;
        if k.bind_group.is_some() {
            return Ok(());
        }

        let mut entries = Vec::with_capacity(k.args.len());
        for (i, arg) in k.args.iter().enumerate() {
            let handle = arg.ok_or_else(|| DeviceError::Argument {
                index: i as u32,
                reason: format!("not set for `{}`", k.entry_point),
            })?;
            entries.push(wgpu::BindGroupEntry {
                binding: i as u32,
                resource: self.buffers[handle.index()].buffer.as_entire_binding(),
            });
        }

        let layout = self.pipelines[k.pipeline].1.get_bind_group_layout(0);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(k.entry_point),
            layout: &layout,
            entries: &entries,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DeviceError::Argument { index: 0, reason: err.to_string() });
        }

        self.kernels[kernel.index()].bind_group = Some(bind_group);
        Ok(())
    }
}

impl ComputeDevice for GpuDevice {
    fn name(&self) -> String {
        format!("{} ({:?})", self.info.name, self.info.backend)
    }

    fn build_program(&mut self, options: &ProgramOptions) -> DeviceResult<ProgramHandle> {
        if options.precision == Precision::Double
            && !self.device.features().contains(wgpu::Features::SHADER_F64)
        {
            return Err(DeviceError::Build {
                log: format!("{} has no 64-bit float support", self.info.name),
            });
        }

        let source = format!("{}{}", prelude(options), include_str!("shaders/lbm.wgsl"));
        tracing::debug!("Building WGSL program: {}", options.build_string());

        let descriptor = wgpu::ShaderModuleDescriptor {
            label: Some("lbm"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        };
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = if options.optimize {
            // SAFETY: every invocation checks its global id against DIM before
            // touching a buffer, and all indices derived from it stay inside
            // buffers sized by the lattice geometry.
            unsafe {
                self.device
                    .create_shader_module_trusted(descriptor, wgpu::ShaderRuntimeChecks::unchecked())
            }
        } else {
            self.device.create_shader_module(descriptor)
        };
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DeviceError::Build { log: err.to_string() });
        }

        self.module = Some(module);
        self.options = Some(options.clone());
        // Kernels of a previous build refer to its pipelines.
        self.pipelines.clear();
        self.kernels.clear();
        Ok(ProgramHandle::from_raw(0))
    }

    fn create_kernel(&mut self, program: ProgramHandle, entry_point: &str)
        -> DeviceResult<KernelHandle> {
        if self.module.is_none() || program.index() != 0 {
            return Err(DeviceError::InvalidHandle { kind: "program", index: program.index() });
        }
        let entry = ENTRY_POINTS
            .iter()
            .copied()
            .find(|&e| e == entry_point)
            .ok_or_else(|| DeviceError::UnknownEntryPoint(entry_point.to_string()))?;

        let pipeline = self.pipeline_for(entry)?;
        self.kernels.push(GpuKernel {
            pipeline,
            entry_point: entry,
            args: Vec::new(),
            bind_group: None,
        });
        Ok(KernelHandle::from_raw(self.kernels.len() - 1))
    }

    fn create_buffer(&mut self, label: &str, size: usize, access: HostAccess)
        -> DeviceResult<BufferHandle> {
        let limits = self.device.limits();
        let size = size as u64;
        if size == 0 {
            return Err(DeviceError::Allocation(format!("`{label}` has zero size")));
        }
        if size > limits.max_buffer_size || size > limits.max_storage_buffer_binding_size as u64 {
            return Err(DeviceError::Allocation(format!(
                "`{label}` needs {size} bytes, device allows {}",
                limits.max_buffer_size.min(limits.max_storage_buffer_binding_size as u64)
            )));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = DeviceBuffer::new(&self.device, label, size, access);
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DeviceError::Allocation(format!("`{label}`: {err}")));
        }

        tracing::debug!("Allocated `{}`: {} bytes ({:?})", label, size, access);
        self.buffers.push(buffer);
        Ok(BufferHandle::from_raw(self.buffers.len() - 1))
    }

    fn set_arg(&mut self, kernel: KernelHandle, index: u32, buffer: BufferHandle)
        -> DeviceResult<()> {
        if buffer.index() >= self.buffers.len() {
            return Err(DeviceError::InvalidHandle { kind: "buffer", index: buffer.index() });
        }
        let k = self.kernel_mut(kernel)?;
        let slot = index as usize;
        if k.args.len() <= slot {
            k.args.resize(slot + 1, None);
        }
        k.args[slot] = Some(buffer);
        k.bind_group = None;
        Ok(())
    }

    fn enqueue_kernel(&mut self, kernel: KernelHandle, range: NdRange) -> DeviceResult<Event> {
        let local_size = self.options.as_ref().map_or(0, |o| o.local_size);
        if range.local != [local_size, 1, 1] {
            return Err(DeviceError::Dispatch(format!(
                "local size {:?} does not match the compiled work-group ({local_size}, 1, 1)",
                range.local
            )));
        }
        self.ensure_bind_group(kernel)?;
        let (event, pair) = self.next_event();

        let k = &self.kernels[kernel.index()];
        let groups = range.groups();
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(k.entry_point),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(k.entry_point),
                timestamp_writes: Some(wgpu::ComputePassTimestampWrites {
                    query_set: self.timestamps.query_set(pair),
                    beginning_of_pass_write_index: Some(pair.begin),
                    end_of_pass_write_index: Some(pair.end),
                }),
            });
            pass.set_pipeline(&self.pipelines[k.pipeline].1);
            pass.set_bind_group(0, k.bind_group.as_ref(), &[]);
            pass.dispatch_workgroups(groups[0] as u32, groups[1] as u32, groups[2] as u32);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(event)
    }

    fn enqueue_read_buffer(&mut self, buffer: BufferHandle, dst: &mut [u8]) -> DeviceResult<Event> {
        let index = buffer.index();
        let buf = self
            .buffers
            .get(index)
            .ok_or(DeviceError::InvalidHandle { kind: "buffer", index })?;
        if !buf.access.readable() {
            return Err(DeviceError::Transfer(format!("`{}` is not host accessible", buf.label)));
        }
        if dst.len() as u64 > buf.size {
            return Err(DeviceError::Transfer(format!(
                "read of {} bytes from `{}` ({} bytes)",
                dst.len(),
                buf.label,
                buf.size
            )));
        }

        let (event, pair) = self.next_event();
        self.buffers[index].ensure_staging(&self.device);
        let buf = &self.buffers[index];
        let Some(staging) = buf.staging.as_ref() else {
            return Err(DeviceError::Transfer(format!("no staging buffer for `{}`", buf.label)));
        };
        let query_set = self.timestamps.query_set(pair);

        // Empty passes bracket the copy with timestamps without requiring
        // timestamp writes inside encoders.
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(buf.label.as_str()),
        });
        encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("read_begin"),
            timestamp_writes: Some(wgpu::ComputePassTimestampWrites {
                query_set,
                beginning_of_pass_write_index: Some(pair.begin),
                end_of_pass_write_index: None,
            }),
        });
        encoder.copy_buffer_to_buffer(&buf.buffer, 0, staging, 0, buffers::align_copy(dst.len() as u64));
        encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("read_end"),
            timestamp_writes: Some(wgpu::ComputePassTimestampWrites {
                query_set,
                beginning_of_pass_write_index: None,
                end_of_pass_write_index: Some(pair.end),
            }),
        });
        self.queue.submit(std::iter::once(encoder.finish()));

        map_read(&self.device, staging, dst)?;
        Ok(event)
    }

    fn finish(&mut self) -> DeviceResult<()> {
        self.device.poll(wgpu::Maintain::Wait);
        self.timestamps.resolve(&self.device, &self.queue)
    }

    fn event_profile(&self, event: Event) -> DeviceResult<EventProfile> {
        if event.index() >= self.events {
            return Err(DeviceError::InvalidHandle { kind: "event", index: event.index() });
        }
        self.timestamps
            .interval_ns(event.index())
            .map(|(start_ns, end_ns)| EventProfile { start_ns, end_ns })
            .ok_or_else(|| {
                DeviceError::Profiling(format!("event #{} not resolved yet", event.index()))
            })
    }
}
