use glam::Mat4;

use super::common::{BatchCore, BatchStats, IndexMode, TextureBinding};
use crate::backend::GpuBackend;
use crate::context::GraphicsContext;
use crate::error::{GfxError, GfxResult};
use crate::frame::CommandEncoder;
use crate::paint::Color;
use crate::pipeline::{ShaderProgram, ShaderRef, ShaderSource, VertexAttributes, VertexUsage};
use crate::resource::{BindGroupLayout, Texture};

const SHADER: &str = include_str!("shaders/sprite.wgsl");

/// Batches textured quads, one draw call per run of sprites sharing a texture.
///
/// The default vertex layout is position, texture coordinate and color. A
/// subset layout may be selected with [`SpriteBatch::set_vertex_attributes`]
/// after `begin`; every `begin` restores the default.
pub struct SpriteBatch {
    core: BatchCore,
    tint: Color,
    texture: Option<TextureBinding>,
}

impl SpriteBatch {
    pub const DEFAULT_CAPACITY: usize = 1000;

    pub fn new<B: GpuBackend>(backend: &mut B, max_sprites: usize) -> GfxResult<Self> {
        let attributes = VertexAttributes::from_usages(&[
            VertexUsage::Position2d,
            VertexUsage::TextureCoordinate,
            VertexUsage::Color,
        ]);
        let layout = BindGroupLayout::builder("sprite batch")
            .uniform_buffer(0, wgpu::ShaderStages::VERTEX, 64, false)
            .texture(
                1,
                wgpu::ShaderStages::FRAGMENT,
                wgpu::TextureSampleType::Float { filterable: true },
                wgpu::TextureViewDimension::D2,
                false,
            )
            .sampler(2, wgpu::ShaderStages::FRAGMENT, wgpu::SamplerBindingType::Filtering)
            .build(backend)?;

        let core = BatchCore::new(
            backend,
            "sprite batch",
            max_sprites,
            attributes,
            ShaderSource::new("sprite", SHADER),
            layout,
            IndexMode::Static,
        )?;
        Ok(Self {
            core,
            tint: Color::WHITE,
            texture: None,
        })
    }

    /// Uses `shader` instead of the built-in one after every `begin`.
    pub fn with_shader(mut self, shader: &ShaderProgram) -> Self {
        self.core.set_default_shader(Some(shader.handle()));
        self
    }

    /// Opens a render pass on the frame's drawable. `clear` overrides the pass load action.
    ///
    /// Call at most once per frame; the vertex buffer is rewritten from offset zero.
    pub fn begin<B: GpuBackend>(
        &mut self,
        ctx: &mut GraphicsContext<B>,
        encoder: &CommandEncoder,
        clear: Option<Color>,
    ) -> GfxResult<()> {
        self.core.begin(ctx, encoder, clear)?;
        self.tint = Color::WHITE;
        self.texture = None;
        Ok(())
    }

    pub fn set_color(&mut self, tint: Color) {
        self.tint = tint;
    }

    pub fn color(&self) -> Color {
        self.tint
    }

    /// Draws the whole texture into the rectangle, right side up.
    pub fn draw<B: GpuBackend>(
        &mut self,
        ctx: &mut GraphicsContext<B>,
        texture: &Texture,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    ) -> GfxResult<()> {
        self.draw_region(ctx, texture, x, y, w, h, [0.0, 1.0, 1.0, 0.0])
    }

    /// Draws the texture region `[u, v, u2, v2]`; `(u, v)` maps to the corner at `(x, y)`.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_region<B: GpuBackend>(
        &mut self,
        ctx: &mut GraphicsContext<B>,
        texture: &Texture,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        [u, v, u2, v2]: [f32; 4],
    ) -> GfxResult<()> {
        self.core.ensure_begun()?;
        self.bind_texture(ctx, texture)?;
        self.core.reserve_quads(1)?;

        let attrs = &self.core.spec.vertex_attributes;
        let uv = attrs.has_usage(VertexUsage::TextureCoordinate);
        let color = attrs.has_usage(VertexUsage::Color);
        let tint = self.tint.to_array();
        let out = &mut self.core.vertices;
        for (px, py, tu, tv) in [
            (x, y, u, v),
            (x, y + h, u, v2),
            (x + w, y + h, u2, v2),
            (x + w, y, u2, v),
        ] {
            out.extend_from_slice(&[px, py]);
            if uv {
                out.extend_from_slice(&[tu, tv]);
            }
            if color {
                out.extend_from_slice(&tint);
            }
        }
        Ok(())
    }

    /// Appends one quad of caller-built vertices in the current layout.
    pub fn draw_vertices<B: GpuBackend>(
        &mut self,
        ctx: &mut GraphicsContext<B>,
        texture: &Texture,
        vertices: &[f32],
    ) -> GfxResult<()> {
        let expected = 4 * self.core.spec.vertex_attributes.floats_per_vertex();
        if vertices.len() != expected {
            return Err(GfxError::validation(format!(
                "sprite quad needs {expected} floats, got {}",
                vertices.len()
            )));
        }
        self.core.ensure_begun()?;
        self.bind_texture(ctx, texture)?;
        self.core.reserve_quads(1)?;
        self.core.vertices.extend_from_slice(vertices);
        Ok(())
    }

    /// Flushes on texture change.
    fn bind_texture<B: GpuBackend>(&mut self, ctx: &mut GraphicsContext<B>, texture: &Texture) -> GfxResult<()> {
        if self.texture.is_some_and(|t| t.view == texture.view()) {
            return Ok(());
        }
        let Some(sampler) = texture.sampler() else {
            return Err(GfxError::validation(format!(
                "texture '{}' has no sampler and cannot be drawn",
                texture.label()
            )));
        };
        self.core.flush(ctx, self.texture)?;
        self.texture = Some(TextureBinding {
            view: texture.view(),
            sampler,
        });
        Ok(())
    }

    pub fn flush<B: GpuBackend>(&mut self, ctx: &mut GraphicsContext<B>) -> GfxResult<()> {
        self.core.flush(ctx, self.texture)
    }

    pub fn end<B: GpuBackend>(&mut self, ctx: &mut GraphicsContext<B>) -> GfxResult<()> {
        self.core.end(ctx, self.texture)
    }

    pub fn enable_blending<B: GpuBackend>(&mut self, ctx: &mut GraphicsContext<B>) -> GfxResult<()> {
        self.core.change_state(ctx, self.texture, |spec| spec.enable_blending())
    }

    pub fn disable_blending<B: GpuBackend>(&mut self, ctx: &mut GraphicsContext<B>) -> GfxResult<()> {
        self.core.change_state(ctx, self.texture, |spec| spec.disable_blending())
    }

    /// Switches shader mid-batch. `None` restores the batch's default shader.
    pub fn set_shader<B: GpuBackend>(
        &mut self,
        ctx: &mut GraphicsContext<B>,
        shader: Option<&ShaderProgram>,
    ) -> GfxResult<()> {
        let shader: Option<ShaderRef> = shader.map(ShaderProgram::handle).or(self.core.default_shader());
        self.core.change_state(ctx, self.texture, |spec| spec.shader = shader)
    }

    /// Selects a vertex layout for the rest of this batch. Must include a 2D position.
    pub fn set_vertex_attributes<B: GpuBackend>(
        &mut self,
        ctx: &mut GraphicsContext<B>,
        attributes: VertexAttributes,
    ) -> GfxResult<()> {
        if !attributes.has_usage(VertexUsage::Position2d) {
            return Err(GfxError::validation("sprite vertex layout needs a 2D position"));
        }
        self.core.ensure_begun()?;
        self.core.change_state(ctx, self.texture, |spec| spec.vertex_attributes = attributes)
    }

    pub fn set_projection_matrix<B: GpuBackend>(
        &mut self,
        ctx: &mut GraphicsContext<B>,
        projection: Mat4,
    ) -> GfxResult<()> {
        self.core.set_projection(ctx, self.texture, projection)
    }

    pub fn is_drawing(&self) -> bool {
        self.core.is_begun()
    }

    /// Draw calls and peak batch size of the last completed `begin`/`end`.
    pub fn stats(&self) -> BatchStats {
        self.core.stats()
    }

    pub fn pending_sprites(&self) -> usize {
        self.core.pending_quads()
    }

    /// Byte offset where the next flush writes vertices.
    pub fn vertex_offset(&self) -> u64 {
        self.core.vb_offset()
    }

    pub fn cached_pipelines(&self) -> usize {
        self.core.cached_pipelines()
    }

    pub fn dispose<B: GpuBackend>(self, backend: &mut B) {
        self.core.dispose(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, RecordingBackend};
    use crate::context::GfxConfig;

    fn setup() -> (GraphicsContext<RecordingBackend>, SpriteBatch, Texture, Texture) {
        let mut ctx = GraphicsContext::new(RecordingBackend::new(), GfxConfig::default()).unwrap();
        let batch = SpriteBatch::new(ctx.backend_mut(), 8).unwrap();
        let a = Texture::from_rgba8(ctx.backend_mut(), "a", 1, 1, &[255; 4]).unwrap();
        let b = Texture::from_rgba8(ctx.backend_mut(), "b", 1, 1, &[0; 4]).unwrap();
        (ctx, batch, a, b)
    }

    fn draws(ctx: &GraphicsContext<RecordingBackend>) -> usize {
        ctx.backend().count_where(|c| matches!(c, Command::DrawIndexed { .. }))
    }

    #[test]
    fn texture_change_flushes() {
        let (mut ctx, mut batch, a, b) = setup();
        let encoder = ctx.begin_frame().unwrap().unwrap();
        batch.begin(&mut ctx, &encoder, None).unwrap();
        batch.draw(&mut ctx, &a, 0.0, 0.0, 10.0, 10.0).unwrap();
        batch.draw(&mut ctx, &a, 10.0, 0.0, 10.0, 10.0).unwrap();
        batch.draw(&mut ctx, &b, 20.0, 0.0, 10.0, 10.0).unwrap();
        assert_eq!(draws(&ctx), 1);
        batch.end(&mut ctx).unwrap();
        ctx.end_frame(encoder).unwrap();

        assert_eq!(draws(&ctx), 2);
        assert_eq!(batch.stats(), BatchStats { draw_calls: 2, max_batch_size: 2 });
    }

    #[test]
    fn quad_corners_and_tint() {
        let (mut ctx, mut batch, a, _) = setup();
        let encoder = ctx.begin_frame().unwrap().unwrap();
        batch.begin(&mut ctx, &encoder, None).unwrap();
        batch.set_color(Color::RED);
        batch.draw(&mut ctx, &a, 1.0, 2.0, 3.0, 4.0).unwrap();

        let v = &batch.core.vertices;
        assert_eq!(v.len(), 4 * 8);
        assert_eq!(&v[0..8], &[1.0, 2.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0]);
        assert_eq!(&v[8..10], &[1.0, 6.0]);
        assert_eq!(&v[16..20], &[4.0, 6.0, 1.0, 0.0]);
        assert_eq!(&v[24..28], &[4.0, 2.0, 1.0, 1.0]);
        batch.end(&mut ctx).unwrap();
        ctx.end_frame(encoder).unwrap();
    }

    #[test]
    fn begin_resets_tint() {
        let (mut ctx, mut batch, _, _) = setup();
        batch.set_color(Color::BLUE);
        let encoder = ctx.begin_frame().unwrap().unwrap();
        batch.begin(&mut ctx, &encoder, None).unwrap();
        assert_eq!(batch.color(), Color::WHITE);
        batch.end(&mut ctx).unwrap();
        ctx.end_frame(encoder).unwrap();
    }

    #[test]
    fn subset_layout_builds_second_pipeline() {
        let (mut ctx, mut batch, a, _) = setup();
        let encoder = ctx.begin_frame().unwrap().unwrap();
        batch.begin(&mut ctx, &encoder, None).unwrap();
        batch.draw(&mut ctx, &a, 0.0, 0.0, 1.0, 1.0).unwrap();
        let attrs = VertexAttributes::from_usages(&[VertexUsage::Position2d, VertexUsage::TextureCoordinate]);
        batch.set_vertex_attributes(&mut ctx, attrs).unwrap();
        batch.draw(&mut ctx, &a, 0.0, 0.0, 1.0, 1.0).unwrap();
        assert_eq!(batch.core.vertices.len(), 4 * 4);
        batch.end(&mut ctx).unwrap();
        ctx.end_frame(encoder).unwrap();

        assert_eq!(batch.cached_pipelines(), 2);
        assert_eq!(batch.stats().draw_calls, 2);
    }

    #[test]
    fn draw_vertices_checks_length() {
        let (mut ctx, mut batch, a, _) = setup();
        let encoder = ctx.begin_frame().unwrap().unwrap();
        batch.begin(&mut ctx, &encoder, None).unwrap();
        let err = batch.draw_vertices(&mut ctx, &a, &[0.0; 31]).unwrap_err();
        assert!(matches!(err, GfxError::Validation(_)));
        batch.draw_vertices(&mut ctx, &a, &[0.5; 32]).unwrap();
        assert_eq!(batch.pending_sprites(), 1);
        batch.end(&mut ctx).unwrap();
        ctx.end_frame(encoder).unwrap();
    }

    #[test]
    fn depth_texture_cannot_be_drawn() {
        let (mut ctx, mut batch, _, _) = setup();
        let depth = Texture::depth(ctx.backend_mut(), "d", 4, 4, wgpu::TextureFormat::Depth32Float, 1).unwrap();
        let encoder = ctx.begin_frame().unwrap().unwrap();
        batch.begin(&mut ctx, &encoder, None).unwrap();
        let err = batch.draw(&mut ctx, &depth, 0.0, 0.0, 1.0, 1.0).unwrap_err();
        assert!(matches!(err, GfxError::Validation(_)));
        batch.end(&mut ctx).unwrap();
        ctx.end_frame(encoder).unwrap();
    }
}
