use glam::{Mat4, Vec3, Vec4};

use super::{align_to, Buffer};
use crate::backend::{BindingResource, BufferId, GpuBackend};
use crate::error::{GfxError, GfxResult};
use crate::paint::Color;

/// Uniform buffer with a CPU staging area and optional slices.
///
/// Each slice holds one copy of the uniform block; slices start at offsets
/// aligned to the device's `min_uniform_buffer_offset_alignment`. Contents are
/// staged with `begin_fill` / `append_*` and uploaded by `end_fill`.
#[derive(Debug)]
pub struct UniformBuffer {
    buffer: Buffer,
    content_size: u64,
    slice_stride: u64,
    slices: u32,
    staging: Vec<u8>,
}

impl UniformBuffer {
    /// `content_size` is rounded up to 16 bytes.
    pub fn new<B: GpuBackend>(
        backend: &mut B,
        label: &str,
        content_size: u64,
        slices: u32,
    ) -> GfxResult<Self> {
        if slices == 0 {
            return Err(GfxError::validation("uniform buffer needs at least one slice"));
        }
        let content_size = align_to(content_size.max(16), 16);
        let alignment = u64::from(backend.limits().min_uniform_buffer_offset_alignment).max(1);
        let slice_stride = align_to(content_size, alignment);
        let size = content_size + slice_stride * u64::from(slices - 1);

        let usage = wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST;
        Ok(Self {
            buffer: Buffer::new(backend, label, usage, size)?,
            content_size,
            slice_stride,
            slices,
            staging: Vec::with_capacity(content_size as usize),
        })
    }

    // ── staging ───────────────────────────────────────────────────────────

    pub fn begin_fill(&mut self) {
        self.staging.clear();
    }

    pub fn append_f32(&mut self, v: f32) {
        self.staging.extend_from_slice(bytemuck::bytes_of(&v));
    }

    pub fn append_u32(&mut self, v: u32) {
        self.staging.extend_from_slice(bytemuck::bytes_of(&v));
    }

    pub fn append_i32(&mut self, v: i32) {
        self.staging.extend_from_slice(bytemuck::bytes_of(&v));
    }

    /// Appends a `vec3<f32>` padded to 16 bytes.
    pub fn append_vec3(&mut self, v: Vec3) {
        self.staging.extend_from_slice(bytemuck::bytes_of(&v.extend(0.0)));
    }

    pub fn append_vec4(&mut self, v: Vec4) {
        self.staging.extend_from_slice(bytemuck::bytes_of(&v));
    }

    pub fn append_color(&mut self, c: Color) {
        self.staging.extend_from_slice(bytemuck::bytes_of(&c.to_array()));
    }

    /// Appends a column-major 4x4 matrix.
    pub fn append_mat4(&mut self, m: &Mat4) {
        self.staging.extend_from_slice(bytemuck::bytes_of(&m.to_cols_array()));
    }

    /// Appends `bytes` zero bytes.
    pub fn pad(&mut self, bytes: usize) {
        self.staging.resize(self.staging.len() + bytes, 0);
    }

    /// Current write position in the staging area.
    pub fn offset(&self) -> u64 {
        self.staging.len() as u64
    }

    /// Moves the write position; moving forward zero-fills the gap.
    pub fn set_offset(&mut self, offset: u64) {
        self.staging.resize(offset as usize, 0);
    }

    /// Uploads the staged content into `slice`.
    ///
    /// Fails if more than `content_size` bytes were staged or the slice does
    /// not exist; nothing is written in either case.
    pub fn end_fill<B: GpuBackend>(&mut self, backend: &mut B, slice: u32) -> GfxResult<()> {
        let staged = self.staging.len() as u64;
        if staged > self.content_size {
            return Err(GfxError::Capacity {
                what: "uniform content",
                requested: staged,
                capacity: self.content_size,
            });
        }
        if slice >= self.slices {
            return Err(GfxError::Capacity {
                what: "uniform slices",
                requested: u64::from(slice) + 1,
                capacity: u64::from(self.slices),
            });
        }
        self.staging.resize(align_to(staged, 4) as usize, 0);
        self.buffer.write(backend, self.slice_offset(slice), &self.staging)
    }

    // ── layout ────────────────────────────────────────────────────────────

    pub fn slice_offset(&self, slice: u32) -> u64 {
        u64::from(slice) * self.slice_stride
    }

    /// Binding for one slice, sized to the content.
    pub fn binding(&self, slice: u32) -> BindingResource {
        BindingResource::Buffer {
            buffer: self.buffer.id(),
            offset: self.slice_offset(slice),
            size: Some(self.content_size),
        }
    }

    pub fn content_size(&self) -> u64 {
        self.content_size
    }

    pub fn slice_stride(&self) -> u64 {
        self.slice_stride
    }

    pub fn slice_count(&self) -> u32 {
        self.slices
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn content_is_rounded_and_slices_are_aligned() {
        let mut backend = RecordingBackend::new();
        let ub = UniformBuffer::new(&mut backend, "u", 20, 3).unwrap();
        assert_eq!(ub.content_size(), 32);
        assert_eq!(ub.slice_stride(), 256);
        assert_eq!(ub.size(), 32 + 2 * 256);
        assert_eq!(ub.slice_offset(2), 512);
    }

    #[test]
    fn single_slice_is_just_the_content() {
        let mut backend = RecordingBackend::new();
        let ub = UniformBuffer::new(&mut backend, "u", 64, 1).unwrap();
        assert_eq!(ub.size(), 64);
    }

    #[test]
    fn vec3_is_padded_to_sixteen_bytes() {
        let mut backend = RecordingBackend::new();
        let mut ub = UniformBuffer::new(&mut backend, "u", 32, 1).unwrap();
        ub.begin_fill();
        ub.append_vec3(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(ub.offset(), 16);
        ub.append_f32(4.0);
        assert_eq!(ub.offset(), 20);
    }

    #[test]
    fn overflow_is_reported_and_nothing_is_written() {
        let mut backend = RecordingBackend::new();
        let mut ub = UniformBuffer::new(&mut backend, "u", 16, 1).unwrap();
        backend.clear_commands();

        ub.begin_fill();
        ub.append_mat4(&Mat4::IDENTITY);
        let err = ub.end_fill(&mut backend, 0).unwrap_err();
        assert!(matches!(err, GfxError::Capacity { requested: 64, capacity: 16, .. }));
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn fill_lands_in_the_requested_slice() {
        let mut backend = RecordingBackend::new();
        let mut ub = UniformBuffer::new(&mut backend, "u", 16, 2).unwrap();
        ub.begin_fill();
        ub.append_color(Color::RED);
        ub.end_fill(&mut backend, 1).unwrap();

        let bytes = backend.buffer_contents(ub.id()).unwrap();
        let floats: Vec<f32> = bytes[256..272]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(floats, [1.0, 0.0, 0.0, 1.0]);
        assert!(ub.end_fill(&mut backend, 2).is_err());
    }
}
