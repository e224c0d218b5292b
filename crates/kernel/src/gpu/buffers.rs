//! Device buffers for the lattice fields and blocking readback.
//!
//! Every field lives in a wgpu storage buffer. Buffers the host may read get
//! `COPY_SRC` and a lazily created `MAP_READ` staging twin; device-only
//! buffers get neither, which is how the "no host access" hint is honoured.

use crate::error::{DeviceError, DeviceResult};
use crate::HostAccess;

/// One storage buffer plus its optional staging buffer.
pub struct DeviceBuffer {
    pub label: String,
    pub buffer: wgpu::Buffer,
    pub size: u64,
    pub access: HostAccess,
    pub staging: Option<wgpu::Buffer>,
}

impl DeviceBuffer {
    /// Allocate `size` bytes, rounded up to the copy alignment.
    pub fn new(device: &wgpu::Device, label: &str, size: u64, access: HostAccess) -> Self {
        let size = align_copy(size);
        let mut usage = wgpu::BufferUsages::STORAGE;
        if access.readable() {
            usage |= wgpu::BufferUsages::COPY_SRC;
        }
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        });
        Self {
            label: label.to_string(),
            buffer,
            size,
            access,
            staging: None,
        }
    }

    /// Create the staging buffer on first use.
    pub fn ensure_staging(&mut self, device: &wgpu::Device) {
        if self.staging.is_none() {
            self.staging = Some(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("{}_staging", self.label)),
                size: self.size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }
    }
}

/// Round up to `wgpu::COPY_BUFFER_ALIGNMENT`.
pub fn align_copy(size: u64) -> u64 {
    let align = wgpu::COPY_BUFFER_ALIGNMENT;
    size.div_ceil(align) * align
}

/// Block on mapping `staging` and copy its first `dst.len()` bytes out.
pub fn map_read(device: &wgpu::Device, staging: &wgpu::Buffer, dst: &mut [u8]) -> DeviceResult<()> {
    let slice = staging.slice(..align_copy(dst.len() as u64));
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);

    rx.recv()
        .map_err(|e| DeviceError::Transfer(format!("map callback dropped: {e}")))?
        .map_err(|e| DeviceError::Transfer(format!("map failed: {e}")))?;

    {
        let data = slice.get_mapped_range();
        dst.copy_from_slice(&data[..dst.len()]);
    }
    staging.unmap();
    Ok(())
}
