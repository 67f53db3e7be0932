//! wgpu implementation of the backend seam.
//!
//! Native objects live in slot maps keyed by the backend ids. Render passes are
//! stored with `forget_lifetime` so they can outlive the borrow of their encoder;
//! wgpu keeps the encoder locked until the pass is dropped.

use std::num::NonZeroU64;
use std::ops::Range;

use slotmap::SlotMap;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use super::{
    BindGroupEntry, BindGroupId, BindGroupLayoutId, BindingResource, BufferDesc, BufferId,
    CommandBufferId, DeviceLimits, EncoderId, GpuBackend, LoadAction, MapCallback, MapError,
    PassId, PipelineId, PipelineLayoutId, QuerySetId, RenderPassDesc, RenderPipelineDesc,
    SamplerDesc, SamplerId, ShaderId, TextureDesc, TextureId, TextureViewDesc, TextureViewId,
    WorkDoneCallback,
};
use crate::device::{Gpu, GpuInit, SurfaceErrorAction};
use crate::error::{GfxError, GfxResult};

/// Backend driving a real device through wgpu.
pub struct WgpuBackend<'w> {
    gpu: Gpu<'w>,

    buffers: SlotMap<BufferId, wgpu::Buffer>,
    textures: SlotMap<TextureId, wgpu::Texture>,
    views: SlotMap<TextureViewId, wgpu::TextureView>,
    samplers: SlotMap<SamplerId, wgpu::Sampler>,
    bind_group_layouts: SlotMap<BindGroupLayoutId, wgpu::BindGroupLayout>,
    bind_groups: SlotMap<BindGroupId, wgpu::BindGroup>,
    pipeline_layouts: SlotMap<PipelineLayoutId, wgpu::PipelineLayout>,
    shaders: SlotMap<ShaderId, wgpu::ShaderModule>,
    pipelines: SlotMap<PipelineId, wgpu::RenderPipeline>,
    query_sets: SlotMap<QuerySetId, wgpu::QuerySet>,
    encoders: SlotMap<EncoderId, wgpu::CommandEncoder>,
    passes: SlotMap<PassId, (EncoderId, wgpu::RenderPass<'static>)>,
    command_buffers: SlotMap<CommandBufferId, wgpu::CommandBuffer>,

    surface_texture: Option<wgpu::SurfaceTexture>,
    surface_view: Option<TextureViewId>,
    last_surface_action: Option<SurfaceErrorAction>,
}

impl<'w> WgpuBackend<'w> {
    pub fn new(gpu: Gpu<'w>) -> Self {
        Self {
            gpu,
            buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            views: SlotMap::with_key(),
            samplers: SlotMap::with_key(),
            bind_group_layouts: SlotMap::with_key(),
            bind_groups: SlotMap::with_key(),
            pipeline_layouts: SlotMap::with_key(),
            shaders: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            query_sets: SlotMap::with_key(),
            encoders: SlotMap::with_key(),
            passes: SlotMap::with_key(),
            command_buffers: SlotMap::with_key(),
            surface_texture: None,
            surface_view: None,
            last_surface_action: None,
        }
    }

    /// Creates the device for `window` and wraps it.
    pub async fn for_window(window: &'w Window, init: GpuInit) -> anyhow::Result<Self> {
        Ok(Self::new(Gpu::new(window, init).await?))
    }

    pub fn gpu(&self) -> &Gpu<'w> {
        &self.gpu
    }

    /// Action taken after the most recent failed surface acquisition.
    pub fn last_surface_action(&self) -> Option<SurfaceErrorAction> {
        self.last_surface_action
    }

    fn buffer(&self, id: BufferId) -> GfxResult<&wgpu::Buffer> {
        self.buffers.get(id).ok_or(GfxError::InvalidHandle("buffer"))
    }

    fn view(&self, id: TextureViewId) -> GfxResult<&wgpu::TextureView> {
        self.views.get(id).ok_or(GfxError::InvalidHandle("texture view"))
    }

    fn pass(&mut self, id: PassId) -> GfxResult<&mut wgpu::RenderPass<'static>> {
        self.passes
            .get_mut(id)
            .map(|(_, pass)| pass)
            .ok_or(GfxError::InvalidHandle("render pass"))
    }

    fn check_range(what: &'static str, offset: u64, size: u64, capacity: u64) -> GfxResult<()> {
        let end = offset.saturating_add(size);
        if end > capacity {
            return Err(GfxError::Capacity { what, requested: end, capacity });
        }
        Ok(())
    }
}

impl GpuBackend for WgpuBackend<'_> {
    fn limits(&self) -> DeviceLimits {
        DeviceLimits::from(&self.gpu.device().limits())
    }

    fn supports_timestamps(&self) -> bool {
        self.gpu.supports_timestamps()
    }

    fn timestamp_period(&self) -> f32 {
        self.gpu.queue().get_timestamp_period()
    }

    // ── buffers ───────────────────────────────────────────────────────────

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> GfxResult<BufferId> {
        let max = self.gpu.device().limits().max_buffer_size;
        if desc.size > max {
            return Err(GfxError::Capacity {
                what: "buffer allocation",
                requested: desc.size,
                capacity: max,
            });
        }
        let buffer = self.gpu.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size: desc.size,
            usage: desc.usage,
            mapped_at_creation: false,
        });
        Ok(self.buffers.insert(buffer))
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(b) = self.buffers.remove(buffer) {
            b.destroy();
        }
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> GfxResult<()> {
        let target = self.buffer(buffer)?;
        Self::check_range("buffer write", offset, data.len() as u64, target.size())?;
        self.gpu.queue().write_buffer(target, offset, data);
        Ok(())
    }

    fn map_buffer_read(&mut self, buffer: BufferId, range: Range<u64>, on_done: MapCallback) {
        let Some(target) = self.buffers.get(buffer) else {
            on_done(Err(MapError("unknown buffer".into())));
            return;
        };
        target
            .slice(range)
            .map_async(wgpu::MapMode::Read, move |result| {
                on_done(result.map_err(|e| MapError(e.to_string())));
            });
    }

    fn read_mapped(&mut self, buffer: BufferId, range: Range<u64>) -> GfxResult<Vec<u8>> {
        let target = self.buffer(buffer)?;
        if !matches!(target.map_state(), wgpu::MapState::Mapped) {
            return Err(GfxError::validation("buffer is not mapped"));
        }
        let view = target.slice(range).get_mapped_range();
        Ok(view.to_vec())
    }

    fn unmap_buffer(&mut self, buffer: BufferId) {
        if let Some(b) = self.buffers.get(buffer) {
            b.unmap();
        }
    }

    // ── textures and samplers ─────────────────────────────────────────────

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> GfxResult<TextureId> {
        let max = self.gpu.device().limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(GfxError::validation(format!(
                "texture '{}' size {}x{} outside 1..={max}",
                desc.label, desc.width, desc.height
            )));
        }
        let texture = self.gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: desc.mip_level_count,
            sample_count: desc.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: desc.usage,
            view_formats: &[],
        });
        Ok(self.textures.insert(texture))
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(t) = self.textures.remove(texture) {
            t.destroy();
        }
    }

    fn write_texture(
        &mut self,
        texture: TextureId,
        data: &[u8],
        bytes_per_row: u32,
        width: u32,
        height: u32,
    ) -> GfxResult<()> {
        let target = self.textures.get(texture).ok_or(GfxError::InvalidHandle("texture"))?;
        self.gpu.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn create_texture_view(
        &mut self,
        texture: TextureId,
        desc: &TextureViewDesc<'_>,
    ) -> GfxResult<TextureViewId> {
        let source = self.textures.get(texture).ok_or(GfxError::InvalidHandle("texture"))?;
        let view = source.create_view(&wgpu::TextureViewDescriptor {
            label: Some(desc.label),
            aspect: desc.aspect,
            ..Default::default()
        });
        Ok(self.views.insert(view))
    }

    fn release_texture_view(&mut self, view: TextureViewId) {
        self.views.remove(view);
    }

    fn create_sampler(&mut self, desc: &SamplerDesc<'_>) -> GfxResult<SamplerId> {
        let sampler = self.gpu.device().create_sampler(&wgpu::SamplerDescriptor {
            label: Some(desc.label),
            address_mode_u: desc.address_mode,
            address_mode_v: desc.address_mode,
            address_mode_w: desc.address_mode,
            mag_filter: desc.filter,
            min_filter: desc.filter,
            ..Default::default()
        });
        Ok(self.samplers.insert(sampler))
    }

    fn release_sampler(&mut self, sampler: SamplerId) {
        self.samplers.remove(sampler);
    }

    // ── binding model ─────────────────────────────────────────────────────

    fn create_bind_group_layout(
        &mut self,
        label: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> GfxResult<BindGroupLayoutId> {
        let layout = self
            .gpu
            .device()
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries,
            });
        Ok(self.bind_group_layouts.insert(layout))
    }

    fn release_bind_group_layout(&mut self, layout: BindGroupLayoutId) {
        self.bind_group_layouts.remove(layout);
    }

    fn create_bind_group(
        &mut self,
        label: &str,
        layout: BindGroupLayoutId,
        entries: &[BindGroupEntry],
    ) -> GfxResult<BindGroupId> {
        let layout = self
            .bind_group_layouts
            .get(layout)
            .ok_or(GfxError::InvalidHandle("bind group layout"))?;

        let mut native = Vec::with_capacity(entries.len());
        for entry in entries {
            let resource = match entry.resource {
                BindingResource::Buffer { buffer, offset, size } => {
                    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: self.buffer(buffer)?,
                        offset,
                        size: size.and_then(NonZeroU64::new),
                    })
                }
                BindingResource::TextureView(view) => {
                    wgpu::BindingResource::TextureView(self.view(view)?)
                }
                BindingResource::Sampler(sampler) => wgpu::BindingResource::Sampler(
                    self.samplers.get(sampler).ok_or(GfxError::InvalidHandle("sampler"))?,
                ),
            };
            native.push(wgpu::BindGroupEntry { binding: entry.binding, resource });
        }

        let group = self.gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &native,
        });
        Ok(self.bind_groups.insert(group))
    }

    fn release_bind_group(&mut self, group: BindGroupId) {
        self.bind_groups.remove(group);
    }

    fn create_pipeline_layout(
        &mut self,
        label: &str,
        bind_group_layouts: &[BindGroupLayoutId],
    ) -> GfxResult<PipelineLayoutId> {
        let layouts = bind_group_layouts
            .iter()
            .map(|id| {
                self.bind_group_layouts
                    .get(*id)
                    .ok_or(GfxError::InvalidHandle("bind group layout"))
            })
            .collect::<GfxResult<Vec<_>>>()?;

        let layout = self
            .gpu
            .device()
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &layouts,
                immediate_size: 0,
            });
        Ok(self.pipeline_layouts.insert(layout))
    }

    fn release_pipeline_layout(&mut self, layout: PipelineLayoutId) {
        self.pipeline_layouts.remove(layout);
    }

    // ── shaders and pipelines ─────────────────────────────────────────────

    fn create_shader_module(&mut self, label: &str, wgsl: &str) -> GfxResult<ShaderId> {
        let module = self
            .gpu
            .device()
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(wgsl.into()),
            });
        Ok(self.shaders.insert(module))
    }

    fn release_shader_module(&mut self, shader: ShaderId) {
        self.shaders.remove(shader);
    }

    fn create_render_pipeline(&mut self, desc: &RenderPipelineDesc<'_>) -> GfxResult<PipelineId> {
        let layout = self
            .pipeline_layouts
            .get(desc.layout)
            .ok_or(GfxError::InvalidHandle("pipeline layout"))?;
        let module = self.shaders.get(desc.shader).ok_or(GfxError::InvalidHandle("shader"))?;

        let buffers = [wgpu::VertexBufferLayout {
            array_stride: desc.vertex_stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: desc.vertex_attributes,
        }];
        let targets: Vec<Option<wgpu::ColorTargetState>> = desc
            .color_format
            .map(|format| wgpu::ColorTargetState {
                format,
                blend: desc.blend,
                write_mask: wgpu::ColorWrites::ALL,
            })
            .into_iter()
            .map(Some)
            .collect();

        let fragment = desc.color_format.map(|_| wgpu::FragmentState {
            module,
            entry_point: Some(desc.fragment_entry),
            compilation_options: Default::default(),
            targets: &targets,
        });

        // Validation failures would otherwise only reach the uncaptured-error handler.
        let scope = self.gpu.device().push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .gpu
            .device()
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(desc.label),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some(desc.vertex_entry),
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },
                fragment,
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: desc.cull_mode,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: desc.depth_stencil.map(|d| wgpu::DepthStencilState {
                    format: d.format,
                    depth_write_enabled: d.depth_write_enabled,
                    depth_compare: d.compare,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: desc.sample_count,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview_mask: None,
                cache: None,
            });
        if let Some(err) = pollster::block_on(scope.pop()) {
            log::error!("render pipeline '{}' rejected: {err}", desc.label);
            return Err(GfxError::Device(format!("render pipeline '{}': {err}", desc.label)));
        }
        Ok(self.pipelines.insert(pipeline))
    }

    fn release_render_pipeline(&mut self, pipeline: PipelineId) {
        self.pipelines.remove(pipeline);
    }

    // ── queries ───────────────────────────────────────────────────────────

    fn create_timestamp_query_set(&mut self, label: &str, count: u32) -> GfxResult<QuerySetId> {
        if !self.gpu.supports_timestamps() {
            return Err(GfxError::Device("timestamp queries are not enabled".into()));
        }
        let query_set = self.gpu.device().create_query_set(&wgpu::QuerySetDescriptor {
            label: Some(label),
            ty: wgpu::QueryType::Timestamp,
            count,
        });
        Ok(self.query_sets.insert(query_set))
    }

    fn release_query_set(&mut self, query_set: QuerySetId) {
        self.query_sets.remove(query_set);
    }

    // ── command recording ─────────────────────────────────────────────────

    fn create_command_encoder(&mut self, label: &str) -> GfxResult<EncoderId> {
        let encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        Ok(self.encoders.insert(encoder))
    }

    fn begin_render_pass(
        &mut self,
        encoder: EncoderId,
        desc: &RenderPassDesc<'_>,
    ) -> GfxResult<PassId> {
        if self.passes.values().any(|(owner, _)| *owner == encoder) {
            return Err(GfxError::validation("encoder already has an open render pass"));
        }

        let color = match desc.color {
            Some(c) => Some(wgpu::RenderPassColorAttachment {
                view: self.views.get(c.view).ok_or(GfxError::InvalidHandle("texture view"))?,
                resolve_target: c
                    .resolve_target
                    .map(|r| self.views.get(r).ok_or(GfxError::InvalidHandle("texture view")))
                    .transpose()?,
                ops: wgpu::Operations {
                    load: match c.load {
                        LoadAction::Clear(color) => wgpu::LoadOp::Clear(color),
                        LoadAction::Load => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            }),
            None => None,
        };
        let color_attachments = [color];

        let depth = match desc.depth {
            Some(d) => Some(wgpu::RenderPassDepthStencilAttachment {
                view: self.views.get(d.view).ok_or(GfxError::InvalidHandle("texture view"))?,
                depth_ops: Some(wgpu::Operations {
                    load: match d.load {
                        LoadAction::Clear(value) => wgpu::LoadOp::Clear(value),
                        LoadAction::Load => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            None => None,
        };

        let timestamp_writes = match desc.timestamp_writes {
            Some(ts) => Some(wgpu::RenderPassTimestampWrites {
                query_set: self
                    .query_sets
                    .get(ts.query_set)
                    .ok_or(GfxError::InvalidHandle("query set"))?,
                beginning_of_pass_write_index: Some(ts.beginning_of_pass_write_index),
                end_of_pass_write_index: Some(ts.end_of_pass_write_index),
            }),
            None => None,
        };

        let native = self
            .encoders
            .get_mut(encoder)
            .ok_or(GfxError::InvalidHandle("command encoder"))?;
        let pass = native
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(desc.label),
                color_attachments: if desc.color.is_some() { &color_attachments } else { &[] },
                depth_stencil_attachment: depth,
                timestamp_writes,
                occlusion_query_set: None,
                multiview_mask: None,
            })
            .forget_lifetime();

        Ok(self.passes.insert((encoder, pass)))
    }

    fn set_pipeline(&mut self, pass: PassId, pipeline: PipelineId) -> GfxResult<()> {
        let native = self
            .pipelines
            .get(pipeline)
            .ok_or(GfxError::InvalidHandle("render pipeline"))?
            .clone();
        self.pass(pass)?.set_pipeline(&native);
        Ok(())
    }

    fn set_bind_group(
        &mut self,
        pass: PassId,
        index: u32,
        group: BindGroupId,
        dynamic_offsets: &[u32],
    ) -> GfxResult<()> {
        let native = self
            .bind_groups
            .get(group)
            .ok_or(GfxError::InvalidHandle("bind group"))?
            .clone();
        self.pass(pass)?.set_bind_group(index, &native, dynamic_offsets);
        Ok(())
    }

    fn set_vertex_buffer(
        &mut self,
        pass: PassId,
        slot: u32,
        buffer: BufferId,
        offset: u64,
        size: u64,
    ) -> GfxResult<()> {
        let native = self.buffer(buffer)?.clone();
        Self::check_range("vertex buffer binding", offset, size, native.size())?;
        self.pass(pass)?.set_vertex_buffer(slot, native.slice(offset..offset + size));
        Ok(())
    }

    fn set_index_buffer(
        &mut self,
        pass: PassId,
        buffer: BufferId,
        format: wgpu::IndexFormat,
        offset: u64,
        size: u64,
    ) -> GfxResult<()> {
        let native = self.buffer(buffer)?.clone();
        Self::check_range("index buffer binding", offset, size, native.size())?;
        self.pass(pass)?.set_index_buffer(native.slice(offset..offset + size), format);
        Ok(())
    }

    fn set_viewport(
        &mut self,
        pass: PassId,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    ) -> GfxResult<()> {
        self.pass(pass)?.set_viewport(x, y, width, height, min_depth, max_depth);
        Ok(())
    }

    fn set_scissor_rect(
        &mut self,
        pass: PassId,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> GfxResult<()> {
        self.pass(pass)?.set_scissor_rect(x, y, width, height);
        Ok(())
    }

    fn draw(&mut self, pass: PassId, vertices: Range<u32>, instances: Range<u32>) -> GfxResult<()> {
        self.pass(pass)?.draw(vertices, instances);
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        pass: PassId,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    ) -> GfxResult<()> {
        self.pass(pass)?.draw_indexed(indices, base_vertex, instances);
        Ok(())
    }

    fn end_render_pass(&mut self, pass: PassId) -> GfxResult<()> {
        // Dropping the pass ends it and unlocks the encoder.
        self.passes
            .remove(pass)
            .map(drop)
            .ok_or(GfxError::InvalidHandle("render pass"))
    }

    fn copy_buffer_to_buffer(
        &mut self,
        encoder: EncoderId,
        src: BufferId,
        src_offset: u64,
        dst: BufferId,
        dst_offset: u64,
        size: u64,
    ) -> GfxResult<()> {
        let source = self.buffers.get(src).ok_or(GfxError::InvalidHandle("buffer"))?;
        let target = self.buffers.get(dst).ok_or(GfxError::InvalidHandle("buffer"))?;
        Self::check_range("copy source", src_offset, size, source.size())?;
        Self::check_range("copy destination", dst_offset, size, target.size())?;
        self.encoders
            .get_mut(encoder)
            .ok_or(GfxError::InvalidHandle("command encoder"))?
            .copy_buffer_to_buffer(source, src_offset, target, dst_offset, size);
        Ok(())
    }

    fn resolve_query_set(
        &mut self,
        encoder: EncoderId,
        query_set: QuerySetId,
        queries: Range<u32>,
        dst: BufferId,
        dst_offset: u64,
    ) -> GfxResult<()> {
        let set = self.query_sets.get(query_set).ok_or(GfxError::InvalidHandle("query set"))?;
        let target = self.buffers.get(dst).ok_or(GfxError::InvalidHandle("buffer"))?;
        self.encoders
            .get_mut(encoder)
            .ok_or(GfxError::InvalidHandle("command encoder"))?
            .resolve_query_set(set, queries, target, dst_offset);
        Ok(())
    }

    fn finish_encoder(&mut self, encoder: EncoderId) -> GfxResult<CommandBufferId> {
        if self.passes.values().any(|(owner, _)| *owner == encoder) {
            return Err(GfxError::validation("encoder finished while a render pass is open"));
        }
        let native = self
            .encoders
            .remove(encoder)
            .ok_or(GfxError::InvalidHandle("command encoder"))?;
        Ok(self.command_buffers.insert(native.finish()))
    }

    // ── queue ─────────────────────────────────────────────────────────────

    fn submit(&mut self, command_buffers: &[CommandBufferId]) -> GfxResult<()> {
        let mut native = Vec::with_capacity(command_buffers.len());
        for id in command_buffers {
            native.push(
                self.command_buffers
                    .remove(*id)
                    .ok_or(GfxError::InvalidHandle("command buffer"))?,
            );
        }
        self.gpu.queue().submit(native);
        Ok(())
    }

    fn on_submitted_work_done(&mut self, callback: WorkDoneCallback) {
        self.gpu.queue().on_submitted_work_done(move || callback());
    }

    fn poll(&mut self) {
        if let Err(e) = self.gpu.device().poll(wgpu::PollType::Poll) {
            log::warn!("device poll failed: {e}");
        }
    }

    // ── surface ───────────────────────────────────────────────────────────

    fn surface_format(&self) -> wgpu::TextureFormat {
        self.gpu.surface_format()
    }

    fn surface_size(&self) -> (u32, u32) {
        let size = self.gpu.size();
        (size.width, size.height)
    }

    fn acquire_surface_view(&mut self) -> GfxResult<TextureViewId> {
        match self.gpu.acquire() {
            Ok(surface_texture) => {
                let view = surface_texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                self.surface_texture = Some(surface_texture);
                self.last_surface_action = None;
                let id = self.views.insert(view);
                self.surface_view = Some(id);
                Ok(id)
            }
            Err(err) => {
                let msg = err.to_string();
                let action = self.gpu.handle_surface_error(err);
                self.last_surface_action = Some(action);
                Err(GfxError::Surface(format!("{msg} ({action:?})")))
            }
        }
    }

    fn present(&mut self) {
        if let Some(view) = self.surface_view.take() {
            self.views.remove(view);
        }
        if let Some(surface_texture) = self.surface_texture.take() {
            surface_texture.present();
        }
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.gpu.resize(PhysicalSize::new(width, height));
    }
}
