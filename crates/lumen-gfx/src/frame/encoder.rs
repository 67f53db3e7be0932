use crate::backend::{CommandBufferId, EncoderId, GpuBackend};
use crate::error::GfxResult;
use crate::resource::Buffer;

/// Records passes and copies; `finish` turns it into a [`CommandBuffer`].
#[derive(Debug)]
#[must_use = "an encoder must be finished and submitted"]
pub struct CommandEncoder {
    id: EncoderId,
}

impl CommandEncoder {
    pub fn new<B: GpuBackend>(backend: &mut B, label: &str) -> GfxResult<Self> {
        Ok(Self {
            id: backend.create_command_encoder(label)?,
        })
    }

    pub fn id(&self) -> EncoderId {
        self.id
    }

    pub fn copy_buffer_to_buffer<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        src: &Buffer,
        src_offset: u64,
        dst: &Buffer,
        dst_offset: u64,
        size: u64,
    ) -> GfxResult<()> {
        backend.copy_buffer_to_buffer(self.id, src.id(), src_offset, dst.id(), dst_offset, size)
    }

    pub fn finish<B: GpuBackend>(self, backend: &mut B) -> GfxResult<CommandBuffer> {
        Ok(CommandBuffer {
            id: backend.finish_encoder(self.id)?,
        })
    }
}

/// One-shot recorded commands, consumed by submission.
#[derive(Debug)]
#[must_use = "a command buffer does nothing until submitted"]
pub struct CommandBuffer {
    id: CommandBufferId,
}

impl CommandBuffer {
    pub fn id(&self) -> CommandBufferId {
        self.id
    }

    pub(crate) fn into_id(self) -> CommandBufferId {
        self.id
    }
}
