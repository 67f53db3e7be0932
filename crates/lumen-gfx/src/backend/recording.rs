//! In-memory backend that validates and records every call.
//!
//! Buffers keep real byte contents so copies, resolves, and mapped reads behave
//! like the device would. Encoder commands take effect when recorded. Map and
//! work-done callbacks fire from [`GpuBackend::poll`], matching wgpu.

use std::ops::Range;

use slotmap::SlotMap;

use super::{
    BindGroupEntry, BindGroupId, BindGroupLayoutId, BindingResource, BufferDesc, BufferId,
    ColorAttachmentDesc, CommandBufferId, DepthAttachmentDesc, DeviceLimits, EncoderId,
    GpuBackend, MapCallback, MapError, PassId, PipelineId, PipelineLayoutId, QuerySetId,
    RenderPassDesc, RenderPipelineDesc, SamplerDesc, SamplerId, ShaderId, TextureDesc, TextureId,
    TextureViewDesc, TextureViewId, WorkDoneCallback,
};
use crate::error::{GfxError, GfxResult};

const COPY_ALIGN: u64 = wgpu::COPY_BUFFER_ALIGNMENT;
const QUERY_RESOLVE_ALIGN: u64 = 256;
const QUERY_SIZE: u64 = 8;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateBuffer {
        buffer: BufferId,
        label: String,
        size: u64,
        usage: wgpu::BufferUsages,
    },
    DestroyBuffer(BufferId),
    WriteBuffer {
        buffer: BufferId,
        offset: u64,
        len: u64,
    },
    MapBuffer(BufferId),
    UnmapBuffer(BufferId),
    CreateTexture {
        texture: TextureId,
        label: String,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        sample_count: u32,
    },
    DestroyTexture(TextureId),
    WriteTexture {
        texture: TextureId,
        len: u64,
    },
    CreateBindGroup {
        group: BindGroupId,
        label: String,
        entries: Vec<BindGroupEntry>,
    },
    ReleaseBindGroup(BindGroupId),
    CreateShaderModule {
        shader: ShaderId,
        label: String,
    },
    ReleaseShaderModule(ShaderId),
    CreateRenderPipeline {
        pipeline: PipelineId,
        label: String,
        sample_count: u32,
        color_format: Option<wgpu::TextureFormat>,
        blend: Option<wgpu::BlendState>,
    },
    ReleaseRenderPipeline(PipelineId),
    /// Creation of an object the tests rarely inspect (layouts, views, samplers...).
    Created {
        kind: &'static str,
        label: String,
    },
    Released {
        kind: &'static str,
    },
    BeginRenderPass {
        pass: PassId,
        label: String,
        color: Option<ColorAttachmentDesc>,
        depth: Option<DepthAttachmentDesc>,
        timestamps: bool,
    },
    SetPipeline {
        pass: PassId,
        pipeline: PipelineId,
    },
    SetBindGroup {
        pass: PassId,
        index: u32,
        group: BindGroupId,
    },
    SetVertexBuffer {
        pass: PassId,
        slot: u32,
        buffer: BufferId,
        offset: u64,
        size: u64,
    },
    SetIndexBuffer {
        pass: PassId,
        buffer: BufferId,
        format: wgpu::IndexFormat,
        offset: u64,
        size: u64,
    },
    SetViewport {
        pass: PassId,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    SetScissorRect {
        pass: PassId,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    Draw {
        pass: PassId,
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        pass: PassId,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
    EndRenderPass(PassId),
    CopyBufferToBuffer {
        src: BufferId,
        src_offset: u64,
        dst: BufferId,
        dst_offset: u64,
        size: u64,
    },
    ResolveQuerySet {
        query_set: QuerySetId,
        queries: Range<u32>,
        dst: BufferId,
    },
    FinishEncoder {
        encoder: EncoderId,
        command_buffer: CommandBufferId,
    },
    Submit(Vec<CommandBufferId>),
    AcquireSurfaceView(TextureViewId),
    Present,
    ResizeSurface {
        width: u32,
        height: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MapState {
    Unmapped,
    Pending,
    Mapped,
}

struct BufferState {
    label: String,
    usage: wgpu::BufferUsages,
    data: Vec<u8>,
    map: MapState,
}

struct TextureState {
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    sample_count: u32,
    usage: wgpu::TextureUsages,
}

#[derive(Clone, Copy)]
struct ViewState {
    width: u32,
    height: u32,
    sample_count: u32,
}

struct EncoderState {
    open_pass: Option<PassId>,
}

struct PassState {
    encoder: EncoderId,
    width: u32,
    height: u32,
    pipeline: Option<PipelineId>,
    /// Number of indices addressable through the bound index buffer range.
    index_count: Option<u64>,
}

struct PendingMap {
    buffer: BufferId,
    error: Option<String>,
    callback: MapCallback,
}

/// Backend that validates calls the way the device would and records them.
pub struct RecordingBackend {
    limits: DeviceLimits,
    timestamps: bool,
    timestamp_period: f32,
    surface_format: wgpu::TextureFormat,
    surface_size: (u32, u32),

    buffers: SlotMap<BufferId, BufferState>,
    textures: SlotMap<TextureId, TextureState>,
    views: SlotMap<TextureViewId, ViewState>,
    samplers: SlotMap<SamplerId, ()>,
    bind_group_layouts: SlotMap<BindGroupLayoutId, Vec<wgpu::BindGroupLayoutEntry>>,
    bind_groups: SlotMap<BindGroupId, BindGroupLayoutId>,
    pipeline_layouts: SlotMap<PipelineLayoutId, ()>,
    shaders: SlotMap<ShaderId, String>,
    pipelines: SlotMap<PipelineId, ()>,
    query_sets: SlotMap<QuerySetId, u32>,
    encoders: SlotMap<EncoderId, EncoderState>,
    passes: SlotMap<PassId, PassState>,
    command_buffers: SlotMap<CommandBufferId, ()>,

    swap_view: Option<TextureViewId>,
    pending_maps: Vec<PendingMap>,
    work_done: Vec<WorkDoneCallback>,

    next_timestamps: (u64, u64),
    maps_held: bool,
    fail_next_map: bool,
    fail_next_acquire: bool,
    fail_next_pipeline: bool,

    log: Vec<Command>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    /// An 800x600 `Bgra8UnormSrgb` surface with timestamp support.
    pub fn new() -> Self {
        Self {
            limits: DeviceLimits::default(),
            timestamps: true,
            timestamp_period: 1.0,
            surface_format: wgpu::TextureFormat::Bgra8UnormSrgb,
            surface_size: (800, 600),
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
            swap_view: None,
            pending_maps: Vec::new(),
            work_done: Vec::new(),
            next_timestamps: (0, 0),
            maps_held: false,
            fail_next_map: false,
            fail_next_acquire: false,
            fail_next_pipeline: false,
            log: Vec::new(),
        }
    }

    pub fn with_surface(mut self, format: wgpu::TextureFormat, width: u32, height: u32) -> Self {
        self.surface_format = format;
        self.surface_size = (width, height);
        self
    }

    pub fn with_timestamps(mut self, supported: bool) -> Self {
        self.timestamps = supported;
        self
    }

    pub fn with_timestamp_period(mut self, period_ns: f32) -> Self {
        self.timestamp_period = period_ns;
        self
    }

    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    // ── inspection ────────────────────────────────────────────────────────

    pub fn commands(&self) -> &[Command] {
        &self.log
    }

    pub fn clear_commands(&mut self) {
        self.log.clear();
    }

    pub fn count_where(&self, pred: impl Fn(&Command) -> bool) -> usize {
        self.log.iter().filter(|c| pred(c)).count()
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(buffer).map(|b| b.data.as_slice())
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_views(&self) -> usize {
        self.views.len()
    }

    pub fn live_bind_groups(&self) -> usize {
        self.bind_groups.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    pub fn pending_maps(&self) -> usize {
        self.pending_maps.len()
    }

    // ── scripting ─────────────────────────────────────────────────────────

    /// Values written by the next `resolve_query_set`, in ticks.
    pub fn set_next_timestamps(&mut self, start: u64, end: u64) {
        self.next_timestamps = (start, end);
    }

    /// While held, `poll` leaves map requests pending.
    pub fn hold_maps(&mut self, held: bool) {
        self.maps_held = held;
    }

    pub fn fail_next_map(&mut self) {
        self.fail_next_map = true;
    }

    pub fn fail_next_surface_acquire(&mut self) {
        self.fail_next_acquire = true;
    }

    pub fn fail_next_pipeline(&mut self) {
        self.fail_next_pipeline = true;
    }

    // ── helpers ───────────────────────────────────────────────────────────

    fn buffer(&self, id: BufferId) -> GfxResult<&BufferState> {
        self.buffers.get(id).ok_or(GfxError::InvalidHandle("buffer"))
    }

    fn pass_mut(&mut self, id: PassId) -> GfxResult<&mut PassState> {
        self.passes.get_mut(id).ok_or(GfxError::InvalidHandle("render pass"))
    }

    fn idle_encoder(&self, id: EncoderId) -> GfxResult<()> {
        let encoder = self.encoders.get(id).ok_or(GfxError::InvalidHandle("command encoder"))?;
        if encoder.open_pass.is_some() {
            return Err(GfxError::validation(
                "encoder commands recorded while a render pass is open",
            ));
        }
        Ok(())
    }

    fn check_range(
        what: &'static str,
        offset: u64,
        size: u64,
        capacity: u64,
    ) -> GfxResult<()> {
        let end = offset.checked_add(size).unwrap_or(u64::MAX);
        if end > capacity {
            return Err(GfxError::Capacity { what, requested: end, capacity });
        }
        Ok(())
    }

    fn view_state(&self, id: TextureViewId) -> GfxResult<ViewState> {
        self.views.get(id).copied().ok_or(GfxError::InvalidHandle("texture view"))
    }

    fn validate_entry(
        &self,
        layout: &[wgpu::BindGroupLayoutEntry],
        entry: &BindGroupEntry,
    ) -> GfxResult<()> {
        let Some(slot) = layout.iter().find(|l| l.binding == entry.binding) else {
            return Err(GfxError::validation(format!(
                "binding {} is not declared by the layout",
                entry.binding
            )));
        };

        match (entry.resource, slot.ty) {
            (BindingResource::Buffer { buffer, offset, size }, wgpu::BindingType::Buffer { ty, .. }) => {
                let state = self.buffer(buffer)?;
                let capacity = state.data.len() as u64;
                let size = size.unwrap_or(capacity.saturating_sub(offset));
                Self::check_range("bound buffer range", offset, size, capacity)?;
                if matches!(ty, wgpu::BufferBindingType::Uniform) {
                    if !state.usage.contains(wgpu::BufferUsages::UNIFORM) {
                        return Err(GfxError::validation(format!(
                            "buffer '{}' bound as uniform without UNIFORM usage",
                            state.label
                        )));
                    }
                    if offset % u64::from(self.limits.min_uniform_buffer_offset_alignment) != 0 {
                        return Err(GfxError::validation(format!(
                            "uniform offset {offset} is not aligned to {}",
                            self.limits.min_uniform_buffer_offset_alignment
                        )));
                    }
                }
                Ok(())
            }
            (BindingResource::TextureView(view), wgpu::BindingType::Texture { .. }) => {
                self.view_state(view).map(|_| ())
            }
            (BindingResource::Sampler(sampler), wgpu::BindingType::Sampler(_)) => self
                .samplers
                .get(sampler)
                .map(|_| ())
                .ok_or(GfxError::InvalidHandle("sampler")),
            (resource, ty) => Err(GfxError::validation(format!(
                "binding {}: resource {resource:?} does not match layout type {ty:?}",
                entry.binding
            ))),
        }
    }
}

fn index_size(format: wgpu::IndexFormat) -> u64 {
    match format {
        wgpu::IndexFormat::Uint16 => 2,
        wgpu::IndexFormat::Uint32 => 4,
    }
}

impl GpuBackend for RecordingBackend {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn supports_timestamps(&self) -> bool {
        self.timestamps
    }

    fn timestamp_period(&self) -> f32 {
        self.timestamp_period
    }

    // ── buffers ───────────────────────────────────────────────────────────

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> GfxResult<BufferId> {
        if desc.size > self.limits.max_buffer_size {
            return Err(GfxError::Capacity {
                what: "buffer allocation",
                requested: desc.size,
                capacity: self.limits.max_buffer_size,
            });
        }
        if desc.usage.contains(wgpu::BufferUsages::MAP_READ)
            && !(wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST).contains(desc.usage)
        {
            return Err(GfxError::validation("MAP_READ may only be combined with COPY_DST"));
        }
        let len = usize::try_from(desc.size)
            .map_err(|_| GfxError::validation("buffer size does not fit in memory"))?;
        let buffer = self.buffers.insert(BufferState {
            label: desc.label.to_owned(),
            usage: desc.usage,
            data: vec![0; len],
            map: MapState::Unmapped,
        });
        self.log.push(Command::CreateBuffer {
            buffer,
            label: desc.label.to_owned(),
            size: desc.size,
            usage: desc.usage,
        });
        Ok(buffer)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if self.buffers.remove(buffer).is_some() {
            self.log.push(Command::DestroyBuffer(buffer));
        }
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> GfxResult<()> {
        let state = self.buffers.get_mut(buffer).ok_or(GfxError::InvalidHandle("buffer"))?;
        if !state.usage.contains(wgpu::BufferUsages::COPY_DST) {
            return Err(GfxError::validation(format!(
                "buffer '{}' written without COPY_DST usage",
                state.label
            )));
        }
        let len = data.len() as u64;
        if offset % COPY_ALIGN != 0 || len % COPY_ALIGN != 0 {
            return Err(GfxError::validation(format!(
                "buffer write at {offset} of {len} bytes is not 4-byte aligned"
            )));
        }
        Self::check_range("buffer write", offset, len, state.data.len() as u64)?;
        if state.map != MapState::Unmapped {
            return Err(GfxError::validation(format!("buffer '{}' is mapped", state.label)));
        }
        let start = offset as usize;
        state.data[start..start + data.len()].copy_from_slice(data);
        self.log.push(Command::WriteBuffer { buffer, offset, len });
        Ok(())
    }

    fn map_buffer_read(&mut self, buffer: BufferId, range: Range<u64>, on_done: MapCallback) {
        let error = match self.buffers.get_mut(buffer) {
            None => Some("unknown buffer".to_owned()),
            Some(state) if !state.usage.contains(wgpu::BufferUsages::MAP_READ) => {
                Some(format!("buffer '{}' lacks MAP_READ usage", state.label))
            }
            Some(state) if state.map != MapState::Unmapped => {
                Some(format!("buffer '{}' is already mapped", state.label))
            }
            Some(state) if range.end > state.data.len() as u64 || range.start > range.end => {
                Some(format!("map range {range:?} is out of bounds"))
            }
            Some(state) => {
                state.map = MapState::Pending;
                None
            }
        };
        self.log.push(Command::MapBuffer(buffer));
        self.pending_maps.push(PendingMap { buffer, error, callback: on_done });
    }

    fn read_mapped(&mut self, buffer: BufferId, range: Range<u64>) -> GfxResult<Vec<u8>> {
        let state = self.buffer(buffer)?;
        if state.map != MapState::Mapped {
            return Err(GfxError::validation(format!("buffer '{}' is not mapped", state.label)));
        }
        Self::check_range(
            "mapped read",
            range.start,
            range.end.saturating_sub(range.start),
            state.data.len() as u64,
        )?;
        Ok(state.data[range.start as usize..range.end as usize].to_vec())
    }

    fn unmap_buffer(&mut self, buffer: BufferId) {
        if let Some(state) = self.buffers.get_mut(buffer) {
            state.map = MapState::Unmapped;
            self.log.push(Command::UnmapBuffer(buffer));
        }
    }

    // ── textures and samplers ─────────────────────────────────────────────

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> GfxResult<TextureId> {
        let max = self.limits.max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(GfxError::validation(format!(
                "texture '{}' size {}x{} outside 1..={max}",
                desc.label, desc.width, desc.height
            )));
        }
        if !matches!(desc.sample_count, 1 | 4) {
            return Err(GfxError::validation(format!(
                "unsupported sample count {}",
                desc.sample_count
            )));
        }
        if desc.mip_level_count == 0 {
            return Err(GfxError::validation("texture needs at least one mip level"));
        }
        let texture = self.textures.insert(TextureState {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            sample_count: desc.sample_count,
            usage: desc.usage,
        });
        self.log.push(Command::CreateTexture {
            texture,
            label: desc.label.to_owned(),
            width: desc.width,
            height: desc.height,
            format: desc.format,
            sample_count: desc.sample_count,
        });
        Ok(texture)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.textures.remove(texture).is_some() {
            self.log.push(Command::DestroyTexture(texture));
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
        let state = self.textures.get(texture).ok_or(GfxError::InvalidHandle("texture"))?;
        if !state.usage.contains(wgpu::TextureUsages::COPY_DST) {
            return Err(GfxError::validation("texture written without COPY_DST usage"));
        }
        if width > state.width || height > state.height {
            return Err(GfxError::validation("texture write exceeds texture extent"));
        }
        let texel = state.format.block_copy_size(None).unwrap_or(4);
        if bytes_per_row < width * texel {
            return Err(GfxError::validation(format!(
                "bytes_per_row {bytes_per_row} is smaller than one row of {width} texels"
            )));
        }
        let needed = u64::from(bytes_per_row) * u64::from(height);
        if (data.len() as u64) < needed {
            return Err(GfxError::Capacity {
                what: "texture upload",
                requested: needed,
                capacity: data.len() as u64,
            });
        }
        self.log.push(Command::WriteTexture { texture, len: data.len() as u64 });
        Ok(())
    }

    fn create_texture_view(
        &mut self,
        texture: TextureId,
        desc: &TextureViewDesc<'_>,
    ) -> GfxResult<TextureViewId> {
        let state = self.textures.get(texture).ok_or(GfxError::InvalidHandle("texture"))?;
        let view = self.views.insert(ViewState {
            width: state.width,
            height: state.height,
            sample_count: state.sample_count,
        });
        self.log.push(Command::Created { kind: "texture view", label: desc.label.to_owned() });
        Ok(view)
    }

    fn release_texture_view(&mut self, view: TextureViewId) {
        if self.views.remove(view).is_some() {
            self.log.push(Command::Released { kind: "texture view" });
        }
    }

    fn create_sampler(&mut self, desc: &SamplerDesc<'_>) -> GfxResult<SamplerId> {
        let sampler = self.samplers.insert(());
        self.log.push(Command::Created { kind: "sampler", label: desc.label.to_owned() });
        Ok(sampler)
    }

    fn release_sampler(&mut self, sampler: SamplerId) {
        if self.samplers.remove(sampler).is_some() {
            self.log.push(Command::Released { kind: "sampler" });
        }
    }

    // ── binding model ─────────────────────────────────────────────────────

    fn create_bind_group_layout(
        &mut self,
        label: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> GfxResult<BindGroupLayoutId> {
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.binding == entry.binding) {
                return Err(GfxError::validation(format!(
                    "layout '{label}' declares binding {} twice",
                    entry.binding
                )));
            }
        }
        let layout = self.bind_group_layouts.insert(entries.to_vec());
        self.log.push(Command::Created { kind: "bind group layout", label: label.to_owned() });
        Ok(layout)
    }

    fn release_bind_group_layout(&mut self, layout: BindGroupLayoutId) {
        if self.bind_group_layouts.remove(layout).is_some() {
            self.log.push(Command::Released { kind: "bind group layout" });
        }
    }

    fn create_bind_group(
        &mut self,
        label: &str,
        layout: BindGroupLayoutId,
        entries: &[BindGroupEntry],
    ) -> GfxResult<BindGroupId> {
        let declared = self
            .bind_group_layouts
            .get(layout)
            .ok_or(GfxError::InvalidHandle("bind group layout"))?;
        if declared.len() != entries.len() {
            return Err(GfxError::validation(format!(
                "bind group '{label}' has {} entries, layout expects {}",
                entries.len(),
                declared.len()
            )));
        }
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.binding == entry.binding) {
                return Err(GfxError::validation(format!(
                    "bind group '{label}' fills binding {} twice",
                    entry.binding
                )));
            }
            self.validate_entry(declared, entry)?;
        }
        let group = self.bind_groups.insert(layout);
        self.log.push(Command::CreateBindGroup {
            group,
            label: label.to_owned(),
            entries: entries.to_vec(),
        });
        Ok(group)
    }

    fn release_bind_group(&mut self, group: BindGroupId) {
        if self.bind_groups.remove(group).is_some() {
            self.log.push(Command::ReleaseBindGroup(group));
        }
    }

    fn create_pipeline_layout(
        &mut self,
        label: &str,
        bind_group_layouts: &[BindGroupLayoutId],
    ) -> GfxResult<PipelineLayoutId> {
        if bind_group_layouts.iter().any(|l| !self.bind_group_layouts.contains_key(*l)) {
            return Err(GfxError::InvalidHandle("bind group layout"));
        }
        let layout = self.pipeline_layouts.insert(());
        self.log.push(Command::Created { kind: "pipeline layout", label: label.to_owned() });
        Ok(layout)
    }

    fn release_pipeline_layout(&mut self, layout: PipelineLayoutId) {
        if self.pipeline_layouts.remove(layout).is_some() {
            self.log.push(Command::Released { kind: "pipeline layout" });
        }
    }

    // ── shaders and pipelines ─────────────────────────────────────────────

    fn create_shader_module(&mut self, label: &str, wgsl: &str) -> GfxResult<ShaderId> {
        if wgsl.trim().is_empty() {
            return Err(GfxError::Device(format!("shader '{label}': empty source")));
        }
        let shader = self.shaders.insert(wgsl.to_owned());
        self.log.push(Command::CreateShaderModule { shader, label: label.to_owned() });
        Ok(shader)
    }

    fn release_shader_module(&mut self, shader: ShaderId) {
        if self.shaders.remove(shader).is_some() {
            self.log.push(Command::ReleaseShaderModule(shader));
        }
    }

    fn create_render_pipeline(&mut self, desc: &RenderPipelineDesc<'_>) -> GfxResult<PipelineId> {
        if std::mem::take(&mut self.fail_next_pipeline) {
            return Err(GfxError::Device(format!("pipeline '{}' rejected by driver", desc.label)));
        }
        if !self.pipeline_layouts.contains_key(desc.layout) {
            return Err(GfxError::InvalidHandle("pipeline layout"));
        }
        let source = self.shaders.get(desc.shader).ok_or(GfxError::InvalidHandle("shader"))?;
        let mut entries = vec![desc.vertex_entry];
        if desc.color_format.is_some() {
            entries.push(desc.fragment_entry);
        }
        for entry in entries {
            if !source.contains(&format!("fn {entry}")) {
                return Err(GfxError::Device(format!(
                    "pipeline '{}': entry point '{entry}' not found",
                    desc.label
                )));
            }
        }
        if !matches!(desc.sample_count, 1 | 4) {
            return Err(GfxError::validation(format!(
                "unsupported sample count {}",
                desc.sample_count
            )));
        }
        for attr in desc.vertex_attributes {
            if attr.offset + attr.format.size() > desc.vertex_stride {
                return Err(GfxError::validation(format!(
                    "attribute at location {} overruns the vertex stride",
                    attr.shader_location
                )));
            }
        }
        let pipeline = self.pipelines.insert(());
        self.log.push(Command::CreateRenderPipeline {
            pipeline,
            label: desc.label.to_owned(),
            sample_count: desc.sample_count,
            color_format: desc.color_format,
            blend: desc.blend,
        });
        Ok(pipeline)
    }

    fn release_render_pipeline(&mut self, pipeline: PipelineId) {
        if self.pipelines.remove(pipeline).is_some() {
            self.log.push(Command::ReleaseRenderPipeline(pipeline));
        }
    }

    // ── queries ───────────────────────────────────────────────────────────

    fn create_timestamp_query_set(&mut self, label: &str, count: u32) -> GfxResult<QuerySetId> {
        if !self.timestamps {
            return Err(GfxError::Device("timestamp queries are not supported".into()));
        }
        if count == 0 {
            return Err(GfxError::validation("query set needs at least one query"));
        }
        let query_set = self.query_sets.insert(count);
        self.log.push(Command::Created { kind: "query set", label: label.to_owned() });
        Ok(query_set)
    }

    fn release_query_set(&mut self, query_set: QuerySetId) {
        if self.query_sets.remove(query_set).is_some() {
            self.log.push(Command::Released { kind: "query set" });
        }
    }

    // ── command recording ─────────────────────────────────────────────────

    fn create_command_encoder(&mut self, label: &str) -> GfxResult<EncoderId> {
        let encoder = self.encoders.insert(EncoderState { open_pass: None });
        self.log.push(Command::Created { kind: "command encoder", label: label.to_owned() });
        Ok(encoder)
    }

    fn begin_render_pass(
        &mut self,
        encoder: EncoderId,
        desc: &RenderPassDesc<'_>,
    ) -> GfxResult<PassId> {
        self.idle_encoder(encoder)?;

        let color = desc.color.map(|c| self.view_state(c.view)).transpose()?;
        let depth = desc.depth.map(|d| self.view_state(d.view)).transpose()?;

        let Some(target) = color.or(depth) else {
            return Err(GfxError::validation(format!(
                "render pass '{}' has no attachments",
                desc.label
            )));
        };

        if let Some(resolve) = desc.color.and_then(|c| c.resolve_target) {
            let resolve = self.view_state(resolve)?;
            if resolve.sample_count != 1 || target.sample_count == 1 {
                return Err(GfxError::validation(
                    "resolve target requires a multisampled attachment and a single-sampled target",
                ));
            }
        }
        if let (Some(c), Some(d)) = (color, depth) {
            if c.sample_count != d.sample_count {
                return Err(GfxError::validation(format!(
                    "color ({}) and depth ({}) sample counts differ",
                    c.sample_count, d.sample_count
                )));
            }
            if (c.width, c.height) != (d.width, d.height) {
                return Err(GfxError::validation("color and depth attachment sizes differ"));
            }
        }
        if let Some(ts) = desc.timestamp_writes {
            let count = self
                .query_sets
                .get(ts.query_set)
                .ok_or(GfxError::InvalidHandle("query set"))?;
            if ts.beginning_of_pass_write_index >= *count || ts.end_of_pass_write_index >= *count {
                return Err(GfxError::validation("timestamp write index out of range"));
            }
        }

        let pass = self.passes.insert(PassState {
            encoder,
            width: target.width,
            height: target.height,
            pipeline: None,
            index_count: None,
        });
        if let Some(state) = self.encoders.get_mut(encoder) {
            state.open_pass = Some(pass);
        }
        self.log.push(Command::BeginRenderPass {
            pass,
            label: desc.label.to_owned(),
            color: desc.color,
            depth: desc.depth,
            timestamps: desc.timestamp_writes.is_some(),
        });
        Ok(pass)
    }

    fn set_pipeline(&mut self, pass: PassId, pipeline: PipelineId) -> GfxResult<()> {
        if !self.pipelines.contains_key(pipeline) {
            return Err(GfxError::InvalidHandle("render pipeline"));
        }
        self.pass_mut(pass)?.pipeline = Some(pipeline);
        self.log.push(Command::SetPipeline { pass, pipeline });
        Ok(())
    }

    fn set_bind_group(
        &mut self,
        pass: PassId,
        index: u32,
        group: BindGroupId,
        _dynamic_offsets: &[u32],
    ) -> GfxResult<()> {
        if !self.bind_groups.contains_key(group) {
            return Err(GfxError::InvalidHandle("bind group"));
        }
        self.pass_mut(pass)?;
        self.log.push(Command::SetBindGroup { pass, index, group });
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
        let state = self.buffer(buffer)?;
        if !state.usage.contains(wgpu::BufferUsages::VERTEX) {
            return Err(GfxError::validation(format!(
                "buffer '{}' bound as vertex buffer without VERTEX usage",
                state.label
            )));
        }
        Self::check_range("vertex buffer binding", offset, size, state.data.len() as u64)?;
        self.pass_mut(pass)?;
        self.log.push(Command::SetVertexBuffer { pass, slot, buffer, offset, size });
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
        let state = self.buffer(buffer)?;
        if !state.usage.contains(wgpu::BufferUsages::INDEX) {
            return Err(GfxError::validation(format!(
                "buffer '{}' bound as index buffer without INDEX usage",
                state.label
            )));
        }
        Self::check_range("index buffer binding", offset, size, state.data.len() as u64)?;
        if offset % index_size(format) != 0 {
            return Err(GfxError::validation("index buffer offset is not aligned to the index size"));
        }
        self.pass_mut(pass)?.index_count = Some(size / index_size(format));
        self.log.push(Command::SetIndexBuffer { pass, buffer, format, offset, size });
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
        let state = self.pass_mut(pass)?;
        let in_bounds = x >= 0.0
            && y >= 0.0
            && width >= 0.0
            && height >= 0.0
            && x + width <= state.width as f32
            && y + height <= state.height as f32;
        if !in_bounds || !(0.0..=1.0).contains(&min_depth) || !(min_depth..=1.0).contains(&max_depth) {
            return Err(GfxError::validation(format!(
                "viewport ({x}, {y}, {width}, {height}) outside {}x{} target",
                state.width, state.height
            )));
        }
        self.log.push(Command::SetViewport { pass, x, y, width, height });
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
        let state = self.pass_mut(pass)?;
        if x + width > state.width || y + height > state.height {
            return Err(GfxError::validation("scissor rect outside render target"));
        }
        self.log.push(Command::SetScissorRect { pass, x, y, width, height });
        Ok(())
    }

    fn draw(&mut self, pass: PassId, vertices: Range<u32>, instances: Range<u32>) -> GfxResult<()> {
        if self.pass_mut(pass)?.pipeline.is_none() {
            return Err(GfxError::validation("draw without a pipeline"));
        }
        self.log.push(Command::Draw { pass, vertices, instances });
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        pass: PassId,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    ) -> GfxResult<()> {
        let state = self.pass_mut(pass)?;
        if state.pipeline.is_none() {
            return Err(GfxError::validation("draw_indexed without a pipeline"));
        }
        let Some(available) = state.index_count else {
            return Err(GfxError::validation("draw_indexed without an index buffer"));
        };
        if u64::from(indices.end) > available {
            return Err(GfxError::Capacity {
                what: "index range",
                requested: u64::from(indices.end),
                capacity: available,
            });
        }
        self.log.push(Command::DrawIndexed { pass, indices, base_vertex, instances });
        Ok(())
    }

    fn end_render_pass(&mut self, pass: PassId) -> GfxResult<()> {
        let state = self.passes.remove(pass).ok_or(GfxError::InvalidHandle("render pass"))?;
        if let Some(encoder) = self.encoders.get_mut(state.encoder) {
            encoder.open_pass = None;
        }
        self.log.push(Command::EndRenderPass(pass));
        Ok(())
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
        self.idle_encoder(encoder)?;
        if src_offset % COPY_ALIGN != 0 || dst_offset % COPY_ALIGN != 0 || size % COPY_ALIGN != 0 {
            return Err(GfxError::validation("buffer copy is not 4-byte aligned"));
        }
        let source = self.buffer(src)?;
        if !source.usage.contains(wgpu::BufferUsages::COPY_SRC) {
            return Err(GfxError::validation("copy source lacks COPY_SRC usage"));
        }
        Self::check_range("copy source", src_offset, size, source.data.len() as u64)?;
        let bytes = source.data[src_offset as usize..(src_offset + size) as usize].to_vec();

        let target = self.buffers.get_mut(dst).ok_or(GfxError::InvalidHandle("buffer"))?;
        if !target.usage.contains(wgpu::BufferUsages::COPY_DST) {
            return Err(GfxError::validation("copy destination lacks COPY_DST usage"));
        }
        Self::check_range("copy destination", dst_offset, size, target.data.len() as u64)?;
        if target.map != MapState::Unmapped {
            return Err(GfxError::validation("copy destination is mapped"));
        }
        target.data[dst_offset as usize..(dst_offset + size) as usize].copy_from_slice(&bytes);
        self.log.push(Command::CopyBufferToBuffer { src, src_offset, dst, dst_offset, size });
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
        self.idle_encoder(encoder)?;
        let count = *self.query_sets.get(query_set).ok_or(GfxError::InvalidHandle("query set"))?;
        if queries.end > count || queries.start >= queries.end {
            return Err(GfxError::validation(format!("query range {queries:?} invalid for {count} queries")));
        }
        if dst_offset % QUERY_RESOLVE_ALIGN != 0 {
            return Err(GfxError::validation("query resolve offset must be 256-byte aligned"));
        }
        let (start, end) = self.next_timestamps;
        let target = self.buffers.get_mut(dst).ok_or(GfxError::InvalidHandle("buffer"))?;
        if !target.usage.contains(wgpu::BufferUsages::QUERY_RESOLVE) {
            return Err(GfxError::validation("resolve target lacks QUERY_RESOLVE usage"));
        }
        let size = u64::from(queries.end - queries.start) * QUERY_SIZE;
        Self::check_range("query resolve", dst_offset, size, target.data.len() as u64)?;
        for (i, query) in queries.clone().enumerate() {
            let value = if query == queries.start { start } else { end };
            let at = dst_offset as usize + i * QUERY_SIZE as usize;
            target.data[at..at + QUERY_SIZE as usize].copy_from_slice(&value.to_le_bytes());
        }
        self.log.push(Command::ResolveQuerySet { query_set, queries, dst });
        Ok(())
    }

    fn finish_encoder(&mut self, encoder: EncoderId) -> GfxResult<CommandBufferId> {
        let state = self.encoders.get(encoder).ok_or(GfxError::InvalidHandle("command encoder"))?;
        if state.open_pass.is_some() {
            return Err(GfxError::validation("encoder finished while a render pass is open"));
        }
        self.encoders.remove(encoder);
        let command_buffer = self.command_buffers.insert(());
        self.log.push(Command::FinishEncoder { encoder, command_buffer });
        Ok(command_buffer)
    }

    // ── queue ─────────────────────────────────────────────────────────────

    fn submit(&mut self, command_buffers: &[CommandBufferId]) -> GfxResult<()> {
        if command_buffers.iter().any(|cb| !self.command_buffers.contains_key(*cb)) {
            return Err(GfxError::InvalidHandle("command buffer"));
        }
        for cb in command_buffers {
            self.command_buffers.remove(*cb);
        }
        self.log.push(Command::Submit(command_buffers.to_vec()));
        Ok(())
    }

    fn on_submitted_work_done(&mut self, callback: WorkDoneCallback) {
        self.work_done.push(callback);
    }

    fn poll(&mut self) {
        if !self.maps_held {
            for pending in std::mem::take(&mut self.pending_maps) {
                let result = match pending.error {
                    Some(e) => Err(MapError(e)),
                    None => {
                        let failed = std::mem::take(&mut self.fail_next_map);
                        match self.buffers.get_mut(pending.buffer) {
                            Some(state) if state.map == MapState::Pending => {
                                if failed {
                                    state.map = MapState::Unmapped;
                                    Err(MapError("device lost while mapping".into()))
                                } else {
                                    state.map = MapState::Mapped;
                                    Ok(())
                                }
                            }
                            _ => Err(MapError("buffer released before the map completed".into())),
                        }
                    }
                };
                (pending.callback)(result);
            }
        }
        for callback in std::mem::take(&mut self.work_done) {
            callback();
        }
    }

    // ── surface ───────────────────────────────────────────────────────────

    fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    fn acquire_surface_view(&mut self) -> GfxResult<TextureViewId> {
        if std::mem::take(&mut self.fail_next_acquire) {
            return Err(GfxError::Surface("timed out acquiring the next drawable".into()));
        }
        if self.swap_view.is_some() {
            return Err(GfxError::validation("previous drawable was not presented"));
        }
        let (width, height) = self.surface_size;
        let view = self.views.insert(ViewState { width, height, sample_count: 1 });
        self.swap_view = Some(view);
        self.log.push(Command::AcquireSurfaceView(view));
        Ok(view)
    }

    fn present(&mut self) {
        if let Some(view) = self.swap_view.take() {
            self.views.remove(view);
            self.log.push(Command::Present);
        }
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.surface_size = (width, height);
        self.log.push(Command::ResizeSurface { width, height });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LoadAction;

    fn vertex_buffer(backend: &mut RecordingBackend, size: u64) -> BufferId {
        backend
            .create_buffer(&BufferDesc {
                label: "vb",
                size,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            })
            .unwrap()
    }

    #[test]
    fn write_past_end_is_rejected_and_leaves_contents() {
        let mut backend = RecordingBackend::new();
        let buffer = vertex_buffer(&mut backend, 8);
        backend.write_buffer(buffer, 0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        let err = backend.write_buffer(buffer, 4, &[9; 8]).unwrap_err();
        assert!(matches!(err, GfxError::Capacity { requested: 12, capacity: 8, .. }));
        assert_eq!(backend.buffer_contents(buffer).unwrap(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn unaligned_write_is_rejected() {
        let mut backend = RecordingBackend::new();
        let buffer = vertex_buffer(&mut backend, 16);
        assert!(backend.write_buffer(buffer, 2, &[0; 4]).is_err());
        assert!(backend.write_buffer(buffer, 0, &[0; 6]).is_err());
    }

    #[test]
    fn destroyed_buffer_handle_is_stale() {
        let mut backend = RecordingBackend::new();
        let buffer = vertex_buffer(&mut backend, 16);
        backend.destroy_buffer(buffer);
        let err = backend.write_buffer(buffer, 0, &[0; 4]).unwrap_err();
        assert!(matches!(err, GfxError::InvalidHandle("buffer")));
    }

    #[test]
    fn second_pass_on_same_encoder_is_rejected_until_first_ends() {
        let mut backend = RecordingBackend::new();
        let view = backend.acquire_surface_view().unwrap();
        let encoder = backend.create_command_encoder("enc").unwrap();
        let desc = RenderPassDesc {
            label: "pass",
            color: Some(ColorAttachmentDesc { view, resolve_target: None, load: LoadAction::Load }),
            depth: None,
            timestamp_writes: None,
        };
        let pass = backend.begin_render_pass(encoder, &desc).unwrap();
        assert!(backend.begin_render_pass(encoder, &desc).is_err());
        assert!(backend.finish_encoder(encoder).is_err());

        backend.end_render_pass(pass).unwrap();
        assert!(backend.begin_render_pass(encoder, &desc).is_ok());
    }

    #[test]
    fn map_completes_on_poll_unless_held() {
        use std::sync::{Arc, Mutex};

        let mut backend = RecordingBackend::new();
        let buffer = backend
            .create_buffer(&BufferDesc {
                label: "readback",
                size: 16,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            })
            .unwrap();

        let done = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&done);
        backend.hold_maps(true);
        backend.map_buffer_read(buffer, 0..16, Box::new(move |r| *sink.lock().unwrap() = Some(r)));
        backend.poll();
        assert!(done.lock().unwrap().is_none());
        assert!(backend.read_mapped(buffer, 0..16).is_err());

        backend.hold_maps(false);
        backend.poll();
        assert_eq!(*done.lock().unwrap(), Some(Ok(())));
        assert_eq!(backend.read_mapped(buffer, 0..16).unwrap(), vec![0; 16]);
    }
}
