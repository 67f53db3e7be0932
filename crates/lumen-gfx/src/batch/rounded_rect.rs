use glam::{Mat4, Vec2};

use super::common::{BatchCore, BatchStats, IndexMode};
use crate::backend::GpuBackend;
use crate::context::GraphicsContext;
use crate::error::GfxResult;
use crate::frame::CommandEncoder;
use crate::paint::Color;
use crate::pipeline::{ShaderProgram, ShaderSource, VertexAttributes, VertexUsage};
use crate::resource::BindGroupLayout;

const SHADER: &str = include_str!("shaders/rounded_rect.wgsl");

/// Rounded rectangles with an optional drop shadow, shaded as distance fields.
///
/// Geometry is given in world units. Each vertex also carries the rectangle's
/// center, size, corner radius and shadow offset converted to framebuffer
/// pixels (y down) under the active projection, so the fragment shader can
/// evaluate the shape from `@builtin(position)` without extra bindings.
pub struct RoundedRectBatch {
    core: BatchCore,
    tint: Color,
    drop_shadow: Vec2,
}

impl RoundedRectBatch {
    pub const DEFAULT_CAPACITY: usize = 1000;

    pub fn new<B: GpuBackend>(backend: &mut B, max_rects: usize) -> GfxResult<Self> {
        let f32x2 = wgpu::VertexFormat::Float32x2;
        let attributes = VertexAttributes::from_usages(&[VertexUsage::Position2d, VertexUsage::Color])
            .with(VertexUsage::Custom, "center", f32x2, 6)
            .with(VertexUsage::Custom, "size", f32x2, 7)
            .with(VertexUsage::Custom, "radius", f32x2, 8)
            .with(VertexUsage::Custom, "shadow", f32x2, 9);
        let layout = BindGroupLayout::builder("rounded rect batch")
            .uniform_buffer(0, wgpu::ShaderStages::VERTEX, 64, false)
            .build(backend)?;
        let core = BatchCore::new(
            backend,
            "rounded rect batch",
            max_rects,
            attributes,
            ShaderSource::new("rounded_rect", SHADER),
            layout,
            IndexMode::Static,
        )?;
        Ok(Self {
            core,
            tint: Color::WHITE,
            drop_shadow: Vec2::ZERO,
        })
    }

    pub fn with_shader(mut self, shader: &ShaderProgram) -> Self {
        self.core.set_default_shader(Some(shader.handle()));
        self
    }

    /// Opens the batch's pass. Call at most once per frame.
    pub fn begin<B: GpuBackend>(
        &mut self,
        ctx: &mut GraphicsContext<B>,
        encoder: &CommandEncoder,
        clear: Option<Color>,
    ) -> GfxResult<()> {
        self.core.begin(ctx, encoder, clear)?;
        self.tint = Color::WHITE;
        Ok(())
    }

    pub fn set_color(&mut self, tint: Color) {
        self.tint = tint;
    }

    /// Shadow offset in world units applied to subsequent rectangles. Zero disables it.
    pub fn set_drop_shadow(&mut self, x: f32, y: f32) {
        self.drop_shadow = Vec2::new(x, y);
    }

    pub fn draw(&mut self, x: f32, y: f32, w: f32, h: f32, radius: f32) -> GfxResult<()> {
        self.core.reserve_quads(1)?;
        let origin = Vec2::new(x, y);
        let p0 = self.core.to_pixels(origin);
        let p1 = self.core.to_pixels(origin + Vec2::new(w, h));
        let center = (p0 + p1) * 0.5;
        let size = (p1 - p0).abs();
        let scale = if w != 0.0 && h != 0.0 {
            (size.x / w.abs()).min(size.y / h.abs())
        } else {
            0.0
        };
        let radius = radius * scale;
        let shadow = self.core.to_pixels(origin + self.drop_shadow) - p0;
        let [r, g, b, a] = self.tint.to_array();

        for (px, py) in [(x, y), (x, y + h), (x + w, y + h), (x + w, y)] {
            self.core.vertices.extend_from_slice(&[
                px, py, r, g, b, a, center.x, center.y, size.x, size.y, radius, 0.0, shadow.x,
                shadow.y,
            ]);
        }
        Ok(())
    }

    pub fn flush<B: GpuBackend>(&mut self, ctx: &mut GraphicsContext<B>) -> GfxResult<()> {
        self.core.flush(ctx, None)
    }

    pub fn end<B: GpuBackend>(&mut self, ctx: &mut GraphicsContext<B>) -> GfxResult<()> {
        self.core.end(ctx, None)
    }

    /// Switches shader mid-batch. `None` restores the batch's default shader.
    pub fn set_shader<B: GpuBackend>(
        &mut self,
        ctx: &mut GraphicsContext<B>,
        shader: Option<&ShaderProgram>,
    ) -> GfxResult<()> {
        let shader = shader.map(ShaderProgram::handle).or(self.core.default_shader());
        self.core.change_state(ctx, None, |spec| spec.shader = shader)
    }

    pub fn set_projection_matrix<B: GpuBackend>(
        &mut self,
        ctx: &mut GraphicsContext<B>,
        projection: Mat4,
    ) -> GfxResult<()> {
        self.core.set_projection(ctx, None, projection)
    }

    pub fn is_drawing(&self) -> bool {
        self.core.is_begun()
    }

    pub fn stats(&self) -> BatchStats {
        self.core.stats()
    }

    pub fn pending_rects(&self) -> usize {
        self.core.pending_quads()
    }

    pub fn dispose<B: GpuBackend>(self, backend: &mut B) {
        self.core.dispose(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::context::GfxConfig;
    use crate::frame::{Viewport, ViewportMode};

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-3, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn vertex_carries_flipped_center_and_shadow() {
        let mut ctx = GraphicsContext::new(RecordingBackend::new(), GfxConfig::default()).unwrap();
        let mut batch = RoundedRectBatch::new(ctx.backend_mut(), 4).unwrap();
        let encoder = ctx.begin_frame().unwrap().unwrap();
        batch.begin(&mut ctx, &encoder, None).unwrap();
        batch.set_drop_shadow(3.0, -2.0);
        batch.draw(10.0, 20.0, 100.0, 40.0, 8.0).unwrap();

        let v = &batch.core.vertices;
        assert_eq!(v.len(), 4 * 14);
        // 600 px tall drawable: 600 - (20 + 20)
        // Shadow y flips with the framebuffer.
        assert_close(&v[6..14], &[60.0, 560.0, 100.0, 40.0, 8.0, 0.0, 3.0, 2.0]);
        assert_eq!(&v[14..16], &[10.0, 60.0]);

        batch.end(&mut ctx).unwrap();
        ctx.end_frame(encoder).unwrap();
        assert_eq!(batch.stats(), BatchStats { draw_calls: 1, max_batch_size: 1 });
    }

    #[test]
    fn shading_inputs_follow_the_viewport_scale() {
        let mut ctx = GraphicsContext::new(RecordingBackend::new(), GfxConfig::default()).unwrap();
        let mut viewport = Viewport::new(ViewportMode::Fit, 1600.0, 1200.0);
        viewport.update(800, 600);
        ctx.set_viewport(Some(viewport));
        let mut batch = RoundedRectBatch::new(ctx.backend_mut(), 4).unwrap();
        let encoder = ctx.begin_frame().unwrap().unwrap();
        batch.begin(&mut ctx, &encoder, None).unwrap();
        batch.set_drop_shadow(8.0, 0.0);
        batch.draw(0.0, 0.0, 200.0, 200.0, 20.0).unwrap();

        // Two world units per pixel, world origin at the bottom-left.
        assert_close(
            &batch.core.vertices[6..14],
            &[50.0, 550.0, 100.0, 100.0, 10.0, 0.0, 4.0, 0.0],
        );
        // Positions stay in world units for the projection.
        assert_eq!(&batch.core.vertices[14..16], &[0.0, 200.0]);

        batch.end(&mut ctx).unwrap();
        ctx.end_frame(encoder).unwrap();
    }
}
