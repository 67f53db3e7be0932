use std::borrow::Cow;

use super::{align_to, Buffer};
use crate::backend::{BufferId, GpuBackend};
use crate::error::{GfxError, GfxResult};

/// Size of one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexWidth {
    U16,
    U32,
}

impl IndexWidth {
    /// Maps a byte width to an index format. Only 2 and 4 are valid.
    pub fn from_bytes(bytes: usize) -> GfxResult<Self> {
        match bytes {
            2 => Ok(IndexWidth::U16),
            4 => Ok(IndexWidth::U32),
            other => Err(GfxError::validation(format!(
                "index size must be 2 or 4 bytes, got {other}"
            ))),
        }
    }

    pub fn bytes(self) -> u64 {
        match self {
            IndexWidth::U16 => 2,
            IndexWidth::U32 => 4,
        }
    }

    pub fn format(self) -> wgpu::IndexFormat {
        match self {
            IndexWidth::U16 => wgpu::IndexFormat::Uint16,
            IndexWidth::U32 => wgpu::IndexFormat::Uint32,
        }
    }
}

/// Index buffer with a fixed index width.
///
/// Uploads are padded to a 4-byte multiple, which the queue requires.
#[derive(Debug)]
pub struct IndexBuffer {
    buffer: Buffer,
    width: IndexWidth,
    count: u32,
}

impl IndexBuffer {
    pub fn new<B: GpuBackend>(
        backend: &mut B,
        label: &str,
        width: IndexWidth,
        max_indices: usize,
    ) -> GfxResult<Self> {
        let size = align_to(max_indices as u64 * width.bytes(), 4);
        let usage = wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST;
        Ok(Self {
            buffer: Buffer::new(backend, label, usage, size)?,
            width,
            count: 0,
        })
    }

    pub fn set_indices_u16<B: GpuBackend>(&mut self, backend: &mut B, indices: &[u16]) -> GfxResult<()> {
        self.expect_width(IndexWidth::U16)?;
        self.write_u16_at(backend, 0, indices)?;
        self.count = indices.len() as u32;
        Ok(())
    }

    pub fn set_indices_u32<B: GpuBackend>(&mut self, backend: &mut B, indices: &[u32]) -> GfxResult<()> {
        self.expect_width(IndexWidth::U32)?;
        self.buffer.write(backend, 0, bytemuck::cast_slice(indices))?;
        self.count = indices.len() as u32;
        Ok(())
    }

    /// Writes 16-bit indices at a byte offset without changing `count`.
    pub fn write_u16_at<B: GpuBackend>(
        &self,
        backend: &mut B,
        byte_offset: u64,
        indices: &[u16],
    ) -> GfxResult<()> {
        self.expect_width(IndexWidth::U16)?;
        self.buffer.write(backend, byte_offset, &padded(bytemuck::cast_slice(indices)))
    }

    fn expect_width(&self, width: IndexWidth) -> GfxResult<()> {
        if self.width != width {
            return Err(GfxError::validation(format!(
                "index buffer '{}' holds {:?} indices, not {width:?}",
                self.buffer.label(),
                self.width
            )));
        }
        Ok(())
    }

    pub fn id(&self) -> BufferId {
        self.buffer.id()
    }

    pub fn width(&self) -> IndexWidth {
        self.width
    }

    pub fn format(&self) -> wgpu::IndexFormat {
        self.width.format()
    }

    /// Number of indices set by the last `set_indices_*` call.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn size(&self) -> u64 {
        self.buffer.size()
    }

    pub fn dispose<B: GpuBackend>(self, backend: &mut B) {
        self.buffer.dispose(backend);
    }
}

fn padded(bytes: &[u8]) -> Cow<'_, [u8]> {
    let aligned = align_to(bytes.len() as u64, 4) as usize;
    if aligned == bytes.len() {
        return Cow::Borrowed(bytes);
    }
    let mut owned = bytes.to_vec();
    owned.resize(aligned, 0);
    Cow::Owned(owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn width_from_bytes() {
        assert_eq!(IndexWidth::from_bytes(2).unwrap().format(), wgpu::IndexFormat::Uint16);
        assert_eq!(IndexWidth::from_bytes(4).unwrap().format(), wgpu::IndexFormat::Uint32);
        assert!(IndexWidth::from_bytes(1).is_err());
        assert!(IndexWidth::from_bytes(8).is_err());
    }

    #[test]
    fn odd_u16_count_is_padded_and_sized_to_four_bytes() {
        let mut backend = RecordingBackend::new();
        let mut ib = IndexBuffer::new(&mut backend, "ib", IndexWidth::U16, 3).unwrap();
        assert_eq!(ib.size(), 8);

        ib.set_indices_u16(&mut backend, &[1, 2, 3]).unwrap();
        assert_eq!(ib.count(), 3);
        assert_eq!(backend.buffer_contents(ib.id()).unwrap(), &[1, 0, 2, 0, 3, 0, 0, 0]);
    }

    #[test]
    fn too_many_indices_is_a_capacity_error() {
        let mut backend = RecordingBackend::new();
        let mut ib = IndexBuffer::new(&mut backend, "ib", IndexWidth::U32, 2).unwrap();
        let err = ib.set_indices_u32(&mut backend, &[0, 1, 2]).unwrap_err();
        assert!(matches!(err, GfxError::Capacity { .. }));
        assert_eq!(ib.count(), 0);
    }

    #[test]
    fn wrong_width_is_rejected() {
        let mut backend = RecordingBackend::new();
        let mut ib = IndexBuffer::new(&mut backend, "ib", IndexWidth::U32, 6).unwrap();
        assert!(ib.set_indices_u16(&mut backend, &[0, 1]).is_err());
    }
}
