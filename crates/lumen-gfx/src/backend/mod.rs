//! Native API seam.
//!
//! Everything above this module talks to the GPU through [`GpuBackend`]. Objects
//! are referred to by generational ids, so a handle used after release is
//! detected instead of reaching the driver.
//!
//! Two implementations ship with the crate:
//! - [`WgpuBackend`] drives a real device through wgpu.
//! - [`RecordingBackend`] validates and logs every call; tests run against it.

mod native;
mod recording;
mod types;

use std::ops::Range;

pub use native::WgpuBackend;
pub use recording::{Command, RecordingBackend};
pub use types::{
    BindGroupEntry, BindingResource, BufferDesc, ColorAttachmentDesc, DepthAttachmentDesc,
    DepthStencilDesc, DeviceLimits, LoadAction, MapCallback, MapError, RenderPassDesc,
    RenderPipelineDesc, SamplerDesc, TextureDesc, TextureViewDesc, TimestampWritesDesc,
    WorkDoneCallback,
};

use crate::error::GfxResult;

slotmap::new_key_type! {
    pub struct BufferId;
    pub struct TextureId;
    pub struct TextureViewId;
    pub struct SamplerId;
    pub struct BindGroupLayoutId;
    pub struct BindGroupId;
    pub struct PipelineLayoutId;
    pub struct ShaderId;
    pub struct PipelineId;
    pub struct QuerySetId;
    pub struct EncoderId;
    pub struct PassId;
    pub struct CommandBufferId;
}

/// Device operations required by the graphics layer.
///
/// Calls that can fail on bad input return `GfxResult`; releases are infallible
/// and ignore stale ids. Writes through the queue are ordered before any command
/// buffer submitted after them.
pub trait GpuBackend {
    // ── capabilities ──────────────────────────────────────────────────────

    fn limits(&self) -> DeviceLimits;

    /// Whether timestamp queries inside render passes are available.
    fn supports_timestamps(&self) -> bool;

    /// Nanoseconds per timestamp tick.
    fn timestamp_period(&self) -> f32;

    // ── buffers ───────────────────────────────────────────────────────────

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> GfxResult<BufferId>;
    fn destroy_buffer(&mut self, buffer: BufferId);
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> GfxResult<()>;

    /// Requests an asynchronous read mapping. `on_done` runs from [`GpuBackend::poll`].
    fn map_buffer_read(&mut self, buffer: BufferId, range: Range<u64>, on_done: MapCallback);

    /// Copies bytes out of a buffer whose read mapping has completed.
    fn read_mapped(&mut self, buffer: BufferId, range: Range<u64>) -> GfxResult<Vec<u8>>;
    fn unmap_buffer(&mut self, buffer: BufferId);

    // ── textures and samplers ─────────────────────────────────────────────

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> GfxResult<TextureId>;
    fn destroy_texture(&mut self, texture: TextureId);
    fn write_texture(
        &mut self,
        texture: TextureId,
        data: &[u8],
        bytes_per_row: u32,
        width: u32,
        height: u32,
    ) -> GfxResult<()>;
    fn create_texture_view(
        &mut self,
        texture: TextureId,
        desc: &TextureViewDesc<'_>,
    ) -> GfxResult<TextureViewId>;
    fn release_texture_view(&mut self, view: TextureViewId);
    fn create_sampler(&mut self, desc: &SamplerDesc<'_>) -> GfxResult<SamplerId>;
    fn release_sampler(&mut self, sampler: SamplerId);

    // ── binding model ─────────────────────────────────────────────────────

    fn create_bind_group_layout(
        &mut self,
        label: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> GfxResult<BindGroupLayoutId>;
    fn release_bind_group_layout(&mut self, layout: BindGroupLayoutId);
    fn create_bind_group(
        &mut self,
        label: &str,
        layout: BindGroupLayoutId,
        entries: &[BindGroupEntry],
    ) -> GfxResult<BindGroupId>;
    fn release_bind_group(&mut self, group: BindGroupId);
    fn create_pipeline_layout(
        &mut self,
        label: &str,
        bind_group_layouts: &[BindGroupLayoutId],
    ) -> GfxResult<PipelineLayoutId>;
    fn release_pipeline_layout(&mut self, layout: PipelineLayoutId);

    // ── shaders and pipelines ─────────────────────────────────────────────

    fn create_shader_module(&mut self, label: &str, wgsl: &str) -> GfxResult<ShaderId>;
    fn release_shader_module(&mut self, shader: ShaderId);
    fn create_render_pipeline(&mut self, desc: &RenderPipelineDesc<'_>) -> GfxResult<PipelineId>;
    fn release_render_pipeline(&mut self, pipeline: PipelineId);

    // ── queries ───────────────────────────────────────────────────────────

    fn create_timestamp_query_set(&mut self, label: &str, count: u32) -> GfxResult<QuerySetId>;
    fn release_query_set(&mut self, query_set: QuerySetId);

    // ── command recording ─────────────────────────────────────────────────

    fn create_command_encoder(&mut self, label: &str) -> GfxResult<EncoderId>;
    fn begin_render_pass(
        &mut self,
        encoder: EncoderId,
        desc: &RenderPassDesc<'_>,
    ) -> GfxResult<PassId>;
    fn set_pipeline(&mut self, pass: PassId, pipeline: PipelineId) -> GfxResult<()>;
    fn set_bind_group(
        &mut self,
        pass: PassId,
        index: u32,
        group: BindGroupId,
        dynamic_offsets: &[u32],
    ) -> GfxResult<()>;
    fn set_vertex_buffer(
        &mut self,
        pass: PassId,
        slot: u32,
        buffer: BufferId,
        offset: u64,
        size: u64,
    ) -> GfxResult<()>;
    fn set_index_buffer(
        &mut self,
        pass: PassId,
        buffer: BufferId,
        format: wgpu::IndexFormat,
        offset: u64,
        size: u64,
    ) -> GfxResult<()>;
    #[allow(clippy::too_many_arguments)]
    fn set_viewport(
        &mut self,
        pass: PassId,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    ) -> GfxResult<()>;
    fn set_scissor_rect(&mut self, pass: PassId, x: u32, y: u32, width: u32, height: u32)
    -> GfxResult<()>;
    fn draw(&mut self, pass: PassId, vertices: Range<u32>, instances: Range<u32>)
    -> GfxResult<()>;
    fn draw_indexed(
        &mut self,
        pass: PassId,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    ) -> GfxResult<()>;
    fn end_render_pass(&mut self, pass: PassId) -> GfxResult<()>;
    fn copy_buffer_to_buffer(
        &mut self,
        encoder: EncoderId,
        src: BufferId,
        src_offset: u64,
        dst: BufferId,
        dst_offset: u64,
        size: u64,
    ) -> GfxResult<()>;
    fn resolve_query_set(
        &mut self,
        encoder: EncoderId,
        query_set: QuerySetId,
        queries: Range<u32>,
        dst: BufferId,
        dst_offset: u64,
    ) -> GfxResult<()>;
    fn finish_encoder(&mut self, encoder: EncoderId) -> GfxResult<CommandBufferId>;

    // ── queue ─────────────────────────────────────────────────────────────

    /// Submits and releases the given command buffers.
    fn submit(&mut self, command_buffers: &[CommandBufferId]) -> GfxResult<()>;
    fn on_submitted_work_done(&mut self, callback: WorkDoneCallback);

    /// Non-blocking device tick; runs completed map and work-done callbacks.
    fn poll(&mut self);

    // ── surface ───────────────────────────────────────────────────────────

    fn surface_format(&self) -> wgpu::TextureFormat;
    fn surface_size(&self) -> (u32, u32);

    /// Acquires a view of the next drawable. Fails with `GfxError::Surface`
    /// when no drawable is available this frame.
    fn acquire_surface_view(&mut self) -> GfxResult<TextureViewId>;
    fn present(&mut self);
    fn resize_surface(&mut self, width: u32, height: u32);
}
