//! Shared batch state and the begin/flush/end protocol.

use glam::{Mat4, Vec2, Vec3};

use crate::backend::{GpuBackend, PipelineId, SamplerId, TextureViewId};
use crate::context::GraphicsContext;
use crate::error::{GfxError, GfxResult};
use crate::frame::{CommandEncoder, RenderPass, RenderPassBuilder};
use crate::paint::Color;
use crate::pipeline::{
    PipelineCache, PipelineSpecification, ShaderRef, ShaderSource, VertexAttributes,
};
use crate::resource::{
    BindGroup, BindGroupLayout, IndexBuffer, IndexWidth, PipelineLayout, UniformBuffer,
    VertexBuffer,
};

/// Largest quad count addressable with 16-bit indices.
pub const MAX_QUADS: usize = (u16::MAX as usize + 1) / 4;

const INDICES_PER_QUAD: u64 = 6;
const INDEX_BYTES_PER_QUAD: u64 = INDICES_PER_QUAD * 2;
const VERTICES_PER_QUAD: u64 = 4;

/// Projection changes allowed within one `begin`/`end` bracket.
const PROJECTION_SLICES: u32 = 8;

/// Statistics for one `begin`/`end` bracket.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct BatchStats {
    pub draw_calls: u32,
    /// Largest number of quads drawn by a single flush.
    pub max_batch_size: u32,
}

/// Two triangles per quad: `[0,1,2, 0,2,3]` offset by 4 for each quad.
pub fn quad_indices(quads: usize) -> Vec<u16> {
    (0..quads)
        .flat_map(|q| {
            let v = (q * 4) as u16;
            [v, v + 1, v + 2, v, v + 2, v + 3]
        })
        .collect()
}

/// Texture and sampler bound alongside the uniforms of a flush.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(super) struct TextureBinding {
    pub view: TextureViewId,
    pub sampler: SamplerId,
}

/// How a batcher fills its index buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(super) enum IndexMode {
    /// Written once at construction for the full capacity.
    Static,
    /// Rewritten by every flush at an advancing offset.
    PerFlush,
}

pub(super) struct BatchCore {
    label: &'static str,
    max_quads: usize,
    index_mode: IndexMode,

    bind_group_layout: BindGroupLayout,
    pipeline_layout: PipelineLayout,
    cache: PipelineCache,
    pub spec: PipelineSpecification,
    default_attributes: VertexAttributes,
    /// Shader restored by `begin`; `None` builds from the batcher's source.
    default_shader: Option<ShaderRef>,

    uniforms: UniformBuffer,
    uniform_slice: u32,
    projection: Option<Mat4>,
    /// Projection the current draws are transformed by.
    active_projection: Mat4,
    /// Pixel rectangle `(x, y, w, h)` clip space maps to, y down.
    target_rect: [f32; 4],

    vertex_buffer: VertexBuffer,
    index_buffer: IndexBuffer,
    vb_offset: u64,
    ib_offset: u64,

    /// CPU arena for the quads of the current batch.
    pub vertices: Vec<f32>,
    quads: usize,

    pass: Option<RenderPass>,
    bound_pipeline: Option<PipelineId>,
    frame_stats: BatchStats,
    last_stats: BatchStats,
}

impl BatchCore {
    pub fn new<B: GpuBackend>(
        backend: &mut B,
        label: &'static str,
        max_quads: usize,
        attributes: VertexAttributes,
        shader: ShaderSource,
        bind_group_layout: BindGroupLayout,
        index_mode: IndexMode,
    ) -> GfxResult<Self> {
        if max_quads == 0 || max_quads > MAX_QUADS {
            return Err(GfxError::validation(format!(
                "{label}: capacity {max_quads} outside 1..={MAX_QUADS}"
            )));
        }

        let pipeline_layout = PipelineLayout::new(backend, label, &[&bind_group_layout])?;
        let uniforms = UniformBuffer::new(backend, label, 64, PROJECTION_SLICES)?;
        let vertex_bytes = max_quads as u64 * VERTICES_PER_QUAD * attributes.stride();
        let vertex_buffer = VertexBuffer::new(backend, label, vertex_bytes)?;
        let mut index_buffer = IndexBuffer::new(backend, label, IndexWidth::U16, max_quads * 6)?;
        if index_mode == IndexMode::Static {
            index_buffer.set_indices_u16(backend, &quad_indices(max_quads))?;
        }

        let spec = PipelineSpecification::new(label, attributes.clone()).with_source(shader);
        log::debug!("{label}: capacity {max_quads} quads, {vertex_bytes} vertex bytes");

        Ok(Self {
            label,
            max_quads,
            index_mode,
            bind_group_layout,
            pipeline_layout,
            cache: PipelineCache::new(),
            spec,
            vertices: Vec::with_capacity(max_quads * 4 * attributes.floats_per_vertex()),
            default_attributes: attributes,
            default_shader: None,
            uniforms,
            uniform_slice: 0,
            projection: None,
            active_projection: Mat4::IDENTITY,
            target_rect: [0.0; 4],
            vertex_buffer,
            index_buffer,
            vb_offset: 0,
            ib_offset: 0,
            quads: 0,
            pass: None,
            bound_pipeline: None,
            frame_stats: BatchStats::default(),
            last_stats: BatchStats::default(),
        })
    }

    // ── protocol ──────────────────────────────────────────────────────────

    /// Resets the buffer offsets to zero, which is only safe once per frame.
    pub fn begin<B: GpuBackend>(
        &mut self,
        ctx: &mut GraphicsContext<B>,
        encoder: &CommandEncoder,
        clear: Option<Color>,
    ) -> GfxResult<()> {
        if self.pass.is_some() {
            return Err(GfxError::Protocol("must end() before begin()"));
        }
        let pass = RenderPassBuilder::new(self.label).clear(clear).begin(ctx, encoder)?;

        self.quads = 0;
        self.vertices.clear();
        self.vb_offset = 0;
        self.ib_offset = 0;
        self.uniform_slice = 0;
        self.frame_stats = BatchStats::default();
        self.bound_pipeline = None;

        self.spec.vertex_attributes = self.default_attributes.clone();
        self.spec.shader = self.default_shader;
        self.spec.enable_blending();
        self.spec.disable_depth();
        pass.configure(&mut self.spec);
        self.target_rect = match ctx.viewport() {
            Some(viewport) => {
                let (x, y, w, h) = viewport.bounds();
                [x, y, w, h]
            }
            None => [0.0, 0.0, pass.width() as f32, pass.height() as f32],
        };
        self.pass = Some(pass);

        let projection = self.projection.unwrap_or_else(|| default_projection(ctx));
        let started = self
            .write_projection(ctx.backend_mut(), &projection)
            .and_then(|()| self.select_pipeline(ctx));
        if let Err(e) = started {
            if let Some(pass) = self.pass.take() {
                pass.end(ctx)?;
            }
            return Err(e);
        }
        Ok(())
    }

    pub fn is_begun(&self) -> bool {
        self.pass.is_some()
    }

    pub fn ensure_begun(&self) -> GfxResult<()> {
        if self.pass.is_none() {
            return Err(GfxError::Protocol("must begin() before draw()"));
        }
        Ok(())
    }

    /// Checks that `n` more quads fit and counts them; callers then append exactly
    /// `n` quads to `vertices`.
    pub fn reserve_quads(&mut self, n: usize) -> GfxResult<()> {
        self.ensure_begun()?;
        if self.quads + n > self.max_quads {
            return Err(GfxError::Capacity {
                what: "batch quads",
                requested: (self.quads + n) as u64,
                capacity: self.max_quads as u64,
            });
        }
        let needed = self.vb_offset + (self.quads + n) as u64 * self.quad_bytes();
        if needed > self.vertex_buffer.size() {
            return Err(GfxError::Capacity {
                what: "batch vertex buffer",
                requested: needed,
                capacity: self.vertex_buffer.size(),
            });
        }
        self.quads += n;
        Ok(())
    }

    /// Uploads the pending quads and records one indexed draw.
    pub fn flush<B: GpuBackend>(
        &mut self,
        ctx: &mut GraphicsContext<B>,
        texture: Option<TextureBinding>,
    ) -> GfxResult<()> {
        if self.quads == 0 {
            return Ok(());
        }
        let Some(pass) = self.pass.as_ref() else {
            return Err(GfxError::Protocol("flush() outside begin()/end()"));
        };
        let quads = self.quads as u64;
        let vertex_bytes = quads * self.quad_bytes();
        let index_bytes = quads * INDEX_BYTES_PER_QUAD;

        self.vertex_buffer.write_at(ctx.backend_mut(), self.vb_offset, &self.vertices)?;
        let index_offset = match self.index_mode {
            IndexMode::Static => 0,
            IndexMode::PerFlush => {
                let indices = quad_indices(self.quads);
                self.index_buffer.write_u16_at(ctx.backend_mut(), self.ib_offset, &indices)?;
                self.ib_offset
            }
        };

        let mut bind_group = BindGroup::new(self.label, &self.bind_group_layout);
        bind_group.begin().add_uniform(0, &self.uniforms, self.uniform_slice);
        if let Some(t) = texture {
            bind_group.add_texture(1, t.view).add_sampler(2, t.sampler);
        }
        let group = bind_group.end(ctx.backend_mut())?;

        let recorded = (|| {
            pass.set_vertex_buffer(ctx, 0, self.vertex_buffer.id(), self.vb_offset, vertex_bytes)?;
            let format = self.index_buffer.format();
            pass.set_index_buffer(ctx, self.index_buffer.id(), format, index_offset, index_bytes)?;
            pass.set_bind_group(ctx, 0, group, &[])?;
            pass.draw_indexed(ctx, 0..(quads * INDICES_PER_QUAD) as u32, 0, 0..1)
        })();
        bind_group.dispose(ctx.backend_mut());
        recorded?;

        self.frame_stats.draw_calls += 1;
        self.frame_stats.max_batch_size = self.frame_stats.max_batch_size.max(self.quads as u32);
        self.vb_offset += vertex_bytes;
        if self.index_mode == IndexMode::PerFlush {
            self.ib_offset += index_bytes;
        }
        self.vertices.clear();
        self.quads = 0;
        Ok(())
    }

    pub fn end<B: GpuBackend>(
        &mut self,
        ctx: &mut GraphicsContext<B>,
        texture: Option<TextureBinding>,
    ) -> GfxResult<()> {
        if self.pass.is_none() {
            return Err(GfxError::Protocol("end() without begin()"));
        }
        let flushed = self.flush(ctx, texture);
        if let Some(pass) = self.pass.take() {
            pass.end(ctx)?;
        }
        self.last_stats = self.frame_stats;
        flushed
    }

    // ── state ─────────────────────────────────────────────────────────────

    /// Applies a pipeline state change, flushing first when inside a batch.
    pub fn change_state<B: GpuBackend>(
        &mut self,
        ctx: &mut GraphicsContext<B>,
        texture: Option<TextureBinding>,
        change: impl FnOnce(&mut PipelineSpecification),
    ) -> GfxResult<()> {
        if self.pass.is_none() {
            change(&mut self.spec);
            return Ok(());
        }
        self.flush(ctx, texture)?;
        change(&mut self.spec);
        self.select_pipeline(ctx)
    }

    pub fn set_default_shader(&mut self, shader: Option<ShaderRef>) {
        self.default_shader = shader;
    }

    pub fn default_shader(&self) -> Option<ShaderRef> {
        self.default_shader
    }

    /// Looks the current specification up in the cache and binds it if it changed.
    fn select_pipeline<B: GpuBackend>(&mut self, ctx: &mut GraphicsContext<B>) -> GfxResult<()> {
        let Some(pass) = self.pass.as_ref() else {
            return Ok(());
        };
        let id = self
            .cache
            .get(ctx.backend_mut(), self.pipeline_layout.id(), &self.spec)?
            .id();
        if self.bound_pipeline != Some(id) {
            pass.set_pipeline(ctx, id)?;
            self.bound_pipeline = Some(id);
        }
        Ok(())
    }

    pub fn set_projection<B: GpuBackend>(
        &mut self,
        ctx: &mut GraphicsContext<B>,
        texture: Option<TextureBinding>,
        projection: Mat4,
    ) -> GfxResult<()> {
        self.projection = Some(projection);
        if self.pass.is_none() {
            return Ok(());
        }
        self.flush(ctx, texture)?;
        // Earlier draws of this frame still read the current slice.
        let next = self.uniform_slice + 1;
        if next >= self.uniforms.slice_count() {
            return Err(GfxError::Capacity {
                what: "projection changes per batch",
                requested: u64::from(next) + 1,
                capacity: u64::from(self.uniforms.slice_count()),
            });
        }
        self.uniform_slice = next;
        self.write_projection(ctx.backend_mut(), &projection)
    }

    fn write_projection<B: GpuBackend>(&mut self, backend: &mut B, projection: &Mat4) -> GfxResult<()> {
        self.active_projection = *projection;
        self.uniforms.begin_fill();
        self.uniforms.append_mat4(projection);
        self.uniforms.end_fill(backend, self.uniform_slice)
    }

    /// Maps a world position to framebuffer pixels (origin top-left) under
    /// the active projection and pass viewport.
    pub fn to_pixels(&self, world: Vec2) -> Vec2 {
        let ndc = self.active_projection.project_point3(Vec3::new(world.x, world.y, 0.0));
        let [x, y, w, h] = self.target_rect;
        Vec2::new(x + (ndc.x + 1.0) * 0.5 * w, y + (1.0 - ndc.y) * 0.5 * h)
    }

    // ── accessors ─────────────────────────────────────────────────────────

    fn quad_bytes(&self) -> u64 {
        VERTICES_PER_QUAD * self.spec.vertex_attributes.stride()
    }

    pub fn pass(&self) -> Option<&RenderPass> {
        self.pass.as_ref()
    }

    pub fn pending_quads(&self) -> usize {
        self.quads
    }

    pub fn vb_offset(&self) -> u64 {
        self.vb_offset
    }

    pub fn vertex_buffer_size(&self) -> u64 {
        self.vertex_buffer.size()
    }

    pub fn stats(&self) -> BatchStats {
        self.last_stats
    }

    pub fn cached_pipelines(&self) -> usize {
        self.cache.len()
    }

    pub fn dispose<B: GpuBackend>(self, backend: &mut B) {
        self.cache.dispose(backend);
        self.vertex_buffer.dispose(backend);
        self.index_buffer.dispose(backend);
        self.uniforms.dispose(backend);
        self.pipeline_layout.dispose(backend);
        self.bind_group_layout.dispose(backend);
    }
}

/// Pixel-space projection for the registered viewport, or the whole drawable.
fn default_projection<B: GpuBackend>(ctx: &GraphicsContext<B>) -> Mat4 {
    match ctx.viewport() {
        Some(viewport) => viewport.projection(),
        None => {
            let (w, h) = ctx.size();
            Mat4::orthographic_rh(0.0, w as f32, 0.0, h as f32, -1.0, 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_index_pattern() {
        assert_eq!(quad_indices(2), vec![0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7]);
        assert!(quad_indices(0).is_empty());
    }

    #[test]
    fn last_quad_still_fits_in_u16() {
        let indices = quad_indices(MAX_QUADS);
        assert_eq!(indices.last().copied(), Some(u16::MAX));
    }
}
