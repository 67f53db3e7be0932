use crate::backend::{BufferDesc, BufferId, GpuBackend};
use crate::error::{GfxError, GfxResult};

/// Rounds `n` up to the next multiple of `align` (which must be non-zero).
#[inline]
pub fn align_to(n: u64, align: u64) -> u64 {
    n.div_ceil(align) * align
}

/// Fixed-size device buffer.
///
/// Writes are bounds-checked against the allocation before reaching the queue;
/// an oversized write fails without touching the contents.
#[derive(Debug)]
pub struct Buffer {
    id: BufferId,
    label: String,
    size: u64,
    usage: wgpu::BufferUsages,
}

impl Buffer {
    pub fn new<B: GpuBackend>(
        backend: &mut B,
        label: &str,
        usage: wgpu::BufferUsages,
        size: u64,
    ) -> GfxResult<Self> {
        let id = backend.create_buffer(&BufferDesc { label, size, usage })?;
        log::debug!("buffer '{label}' created ({size} bytes, {usage:?})");
        Ok(Self {
            id,
            label: label.to_owned(),
            size,
            usage,
        })
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn usage(&self) -> wgpu::BufferUsages {
        self.usage
    }

    /// Queues `data` to be written at `offset`.
    pub fn write<B: GpuBackend>(&self, backend: &mut B, offset: u64, data: &[u8]) -> GfxResult<()> {
        let end = offset.saturating_add(data.len() as u64);
        if end > self.size {
            return Err(GfxError::Capacity {
                what: "buffer write",
                requested: end,
                capacity: self.size,
            });
        }
        backend.write_buffer(self.id, offset, data)
    }

    /// Destroys the native buffer and releases the handle.
    pub fn dispose<B: GpuBackend>(self, backend: &mut B) {
        backend.destroy_buffer(self.id);
    }
}
