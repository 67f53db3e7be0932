//! Plain descriptor types passed across the backend seam.

use super::{BufferId, PipelineLayoutId, QuerySetId, SamplerId, ShaderId, TextureViewId};

/// Device limits the graphics layer depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub min_uniform_buffer_offset_alignment: u32,
    pub max_texture_dimension_2d: u32,
    pub max_buffer_size: u64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        let limits = wgpu::Limits::default();
        Self {
            min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
            max_texture_dimension_2d: limits.max_texture_dimension_2d,
            max_buffer_size: limits.max_buffer_size,
        }
    }
}

impl From<&wgpu::Limits> for DeviceLimits {
    fn from(limits: &wgpu::Limits) -> Self {
        Self {
            min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
            max_texture_dimension_2d: limits.max_texture_dimension_2d,
            max_buffer_size: limits.max_buffer_size,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub size: u64,
    pub usage: wgpu::BufferUsages,
}

#[derive(Debug, Clone, Copy)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

#[derive(Debug, Clone, Copy)]
pub struct TextureViewDesc<'a> {
    pub label: &'a str,
    pub aspect: wgpu::TextureAspect,
}

#[derive(Debug, Clone, Copy)]
pub struct SamplerDesc<'a> {
    pub label: &'a str,
    pub filter: wgpu::FilterMode,
    pub address_mode: wgpu::AddressMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingResource {
    /// `size: None` binds from `offset` to the end of the buffer.
    Buffer {
        buffer: BufferId,
        offset: u64,
        size: Option<u64>,
    },
    TextureView(TextureViewId),
    Sampler(SamplerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindGroupEntry {
    pub binding: u32,
    pub resource: BindingResource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilDesc {
    pub format: wgpu::TextureFormat,
    pub depth_write_enabled: bool,
    pub compare: wgpu::CompareFunction,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderPipelineDesc<'a> {
    pub label: &'a str,
    pub layout: PipelineLayoutId,
    pub shader: ShaderId,
    pub vertex_entry: &'a str,
    pub fragment_entry: &'a str,
    pub vertex_stride: u64,
    pub vertex_attributes: &'a [wgpu::VertexAttribute],
    pub blend: Option<wgpu::BlendState>,
    pub cull_mode: Option<wgpu::Face>,
    /// `None` builds a depth-only pipeline without a fragment target.
    pub color_format: Option<wgpu::TextureFormat>,
    pub depth_stencil: Option<DepthStencilDesc>,
    pub sample_count: u32,
}

/// What happens to an attachment at the start of a pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadAction<T> {
    Clear(T),
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachmentDesc {
    pub view: TextureViewId,
    pub resolve_target: Option<TextureViewId>,
    pub load: LoadAction<wgpu::Color>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachmentDesc {
    pub view: TextureViewId,
    pub load: LoadAction<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampWritesDesc {
    pub query_set: QuerySetId,
    pub beginning_of_pass_write_index: u32,
    pub end_of_pass_write_index: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderPassDesc<'a> {
    pub label: &'a str,
    pub color: Option<ColorAttachmentDesc>,
    pub depth: Option<DepthAttachmentDesc>,
    pub timestamp_writes: Option<TimestampWritesDesc>,
}

/// Failure reported by an asynchronous buffer mapping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("buffer map failed: {0}")]
pub struct MapError(pub String);

pub type MapCallback = Box<dyn FnOnce(Result<(), MapError>) + Send + 'static>;
pub type WorkDoneCallback = Box<dyn FnOnce() + Send + 'static>;
