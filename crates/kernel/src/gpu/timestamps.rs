//! Hardware timestamp bookkeeping for command events.
//!
//! Each event owns a (begin, end) pair of timestamp queries. Queries are
//! handed out from a growing list of query sets and resolved to
//! nanoseconds in bulk when the queue is drained.

use crate::error::{DeviceError, DeviceResult};

/// wgpu caps a query set at 4096 queries.
const QUERIES_PER_SET: u32 = 4096;

struct Chunk {
    set: wgpu::QuerySet,
    used: u32,
    resolved: u32,
}

/// Location of one event's query pair.
#[derive(Debug, Clone, Copy)]
pub struct QueryPair {
    pub chunk: usize,
    pub begin: u32,
    pub end: u32,
}

pub struct TimestampPool {
    chunks: Vec<Chunk>,
    resolve_buf: wgpu::Buffer,
    staging_buf: wgpu::Buffer,
    /// Nanoseconds per timestamp tick.
    period: f32,
    /// Resolved timestamps in nanoseconds, indexed by global query number.
    resolved_ns: Vec<u64>,
}

impl TimestampPool {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let bytes = QUERIES_PER_SET as u64 * 8;
        let resolve_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("timestamp_resolve"),
            size: bytes,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("timestamp_staging"),
            size: bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            chunks: Vec::new(),
            resolve_buf,
            staging_buf,
            period: queue.get_timestamp_period(),
            resolved_ns: Vec::new(),
        }
    }

    /// Reserve the query pair of the next event. Events are numbered in
    /// allocation order, so event `n` owns global queries `2n` and `2n + 1`.
    pub fn allocate(&mut self, device: &wgpu::Device) -> QueryPair {
        let needs_chunk = self.chunks.last().map_or(true, |c| c.used + 2 > QUERIES_PER_SET);
        if needs_chunk {
            let set = device.create_query_set(&wgpu::QuerySetDescriptor {
                label: Some("event_timestamps"),
                ty: wgpu::QueryType::Timestamp,
                count: QUERIES_PER_SET,
            });
            self.chunks.push(Chunk { set, used: 0, resolved: 0 });
        }
        let chunk_index = self.chunks.len() - 1;
        let chunk = &mut self.chunks[chunk_index];
        let begin = chunk.used;
        chunk.used += 2;
        QueryPair { chunk: chunk_index, begin, end: begin + 1 }
    }

    pub fn query_set(&self, pair: QueryPair) -> &wgpu::QuerySet {
        &self.chunks[pair.chunk].set
    }

    /// Read every written but unresolved query back to the host.
    ///
    /// Must be called after the queue drained; it submits its own copy and
    /// blocks on the mapping.
    pub fn resolve(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> DeviceResult<()> {
        for (index, chunk) in self.chunks.iter_mut().enumerate() {
            if chunk.resolved == chunk.used {
                continue;
            }
            let used = chunk.used;
            let bytes = used as u64 * 8;

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("resolve_timestamps"),
            });
            encoder.resolve_query_set(&chunk.set, 0..used, &self.resolve_buf, 0);
            encoder.copy_buffer_to_buffer(&self.resolve_buf, 0, &self.staging_buf, 0, bytes);
            queue.submit(std::iter::once(encoder.finish()));

            let slice = self.staging_buf.slice(..bytes);
            let (tx, rx) = std::sync::mpsc::channel();
            slice.map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
            device.poll(wgpu::Maintain::Wait);
            rx.recv()
                .map_err(|e| DeviceError::Profiling(format!("map callback dropped: {e}")))?
                .map_err(|e| DeviceError::Profiling(format!("map failed: {e}")))?;

            let base = index * QUERIES_PER_SET as usize;
            if self.resolved_ns.len() < base + used as usize {
                self.resolved_ns.resize(base + used as usize, 0);
            }
            {
                let data = slice.get_mapped_range();
                let ticks: &[u64] = bytemuck::cast_slice(&data);
                for (i, &t) in ticks.iter().enumerate() {
                    self.resolved_ns[base + i] = (t as f64 * self.period as f64) as u64;
                }
            }
            self.staging_buf.unmap();
            chunk.resolved = used;
        }
        Ok(())
    }

    /// Begin/end nanoseconds of event `event`, once resolved.
    pub fn interval_ns(&self, event: usize) -> Option<(u64, u64)> {
        let begin = *self.resolved_ns.get(2 * event)?;
        let end = *self.resolved_ns.get(2 * event + 1)?;
        let chunk = (2 * event) / QUERIES_PER_SET as usize;
        let local = ((2 * event) % QUERIES_PER_SET as usize) as u32;
        let resolved = self.chunks.get(chunk).map_or(0, |c| c.resolved);
        (local + 1 < resolved).then_some((begin, end))
    }
}
