use super::Buffer;
use crate::backend::{BufferId, GpuBackend};
use crate::error::GfxResult;

/// Vertex buffer holding interleaved `f32` vertex data.
#[derive(Debug)]
pub struct VertexBuffer {
    buffer: Buffer,
}

impl VertexBuffer {
    pub fn new<B: GpuBackend>(backend: &mut B, label: &str, size: u64) -> GfxResult<Self> {
        let usage = wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST;
        Ok(Self {
            buffer: Buffer::new(backend, label, usage, size)?,
        })
    }

    /// Replaces the contents from the start of the buffer.
    pub fn set_vertices<B: GpuBackend>(&self, backend: &mut B, vertices: &[f32]) -> GfxResult<()> {
        self.write_at(backend, 0, vertices)
    }

    /// Writes vertices at a byte offset.
    pub fn write_at<B: GpuBackend>(
        &self,
        backend: &mut B,
        byte_offset: u64,
        vertices: &[f32],
    ) -> GfxResult<()> {
        self.buffer.write(backend, byte_offset, bytemuck::cast_slice(vertices))
    }

    pub fn id(&self) -> BufferId {
        self.buffer.id()
    }

    pub fn size(&self) -> u64 {
        self.buffer.size()
    }

    pub fn dispose<B: GpuBackend>(self, backend: &mut B) {
        self.buffer.dispose(backend);
    }
}
