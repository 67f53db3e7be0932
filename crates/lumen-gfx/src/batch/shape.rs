use glam::{Mat4, Vec2};

use super::common::{BatchCore, BatchStats, IndexMode};
use crate::backend::GpuBackend;
use crate::context::GraphicsContext;
use crate::error::GfxResult;
use crate::frame::CommandEncoder;
use crate::paint::Color;
use crate::pipeline::{ShaderSource, VertexAttributes, VertexUsage};
use crate::resource::BindGroupLayout;

const SHADER: &str = include_str!("shaders/shape.wgsl");

/// Solid-color rectangles, outlines, lines and triangle outlines.
///
/// Every primitive is built from quads. Indices are regenerated per flush and
/// uploaded next to the previous flush's.
pub struct ShapeRenderer {
    core: BatchCore,
    tint: Color,
    line_width: f32,
}

impl ShapeRenderer {
    pub const DEFAULT_CAPACITY: usize = 8192;

    pub fn new<B: GpuBackend>(backend: &mut B, max_shapes: usize) -> GfxResult<Self> {
        let attributes = VertexAttributes::from_usages(&[VertexUsage::Position2d, VertexUsage::Color]);
        let layout = BindGroupLayout::builder("shape renderer")
            .uniform_buffer(0, wgpu::ShaderStages::VERTEX, 64, false)
            .build(backend)?;
        let core = BatchCore::new(
            backend,
            "shape renderer",
            max_shapes,
            attributes,
            ShaderSource::new("shape", SHADER),
            layout,
            IndexMode::PerFlush,
        )?;
        Ok(Self {
            core,
            tint: Color::WHITE,
            line_width: 1.0,
        })
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

    pub fn set_line_width(&mut self, width: f32) {
        self.line_width = width;
    }

    pub fn line_width(&self) -> f32 {
        self.line_width
    }

    /// Filled axis-aligned rectangle.
    pub fn rect(&mut self, x: f32, y: f32, w: f32, h: f32) -> GfxResult<()> {
        self.core.reserve_quads(1)?;
        self.push_rect(x, y, w, h);
        Ok(())
    }

    /// Outline of the box spanning `(x1, y1)`..`(x2, y2)`, `line_width` thick.
    pub fn box_outline(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> GfxResult<()> {
        self.core.reserve_quads(4)?;
        let lw = self.line_width;
        self.push_rect(x1, y1, lw + x2 - x1, lw);
        self.push_rect(x1, y2, lw + x2 - x1, lw);
        self.push_rect(x1, y1, lw, lw + y2 - y1);
        self.push_rect(x2, y1, lw, lw + y2 - y1);
        Ok(())
    }

    /// Thick line segment as a quad. A zero-length segment degenerates to a point.
    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> GfxResult<()> {
        self.core.reserve_quads(1)?;
        self.push_line(x1, y1, x2, y2);
        Ok(())
    }

    /// Triangle outline made of three lines.
    pub fn triangle(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x3: f32, y3: f32) -> GfxResult<()> {
        self.core.reserve_quads(3)?;
        self.push_line(x1, y1, x2, y2);
        self.push_line(x2, y2, x3, y3);
        self.push_line(x3, y3, x1, y1);
        Ok(())
    }

    fn push_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.push_quad([(x, y), (x, y + h), (x + w, y + h), (x + w, y)]);
    }

    fn push_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        // Swapped components, matching the mirrored signs below.
        let n = Vec2::new(y2 - y1, x2 - x1).normalize_or_zero() * self.line_width;
        self.push_quad([
            (x1 - n.x, y1 + n.y),
            (x2 - n.x, y2 + n.y),
            (x2 + n.x, y2 - n.y),
            (x1 + n.x, y1 - n.y),
        ]);
    }

    fn push_quad(&mut self, corners: [(f32, f32); 4]) {
        let tint = self.tint.to_array();
        for (x, y) in corners {
            self.core.vertices.extend_from_slice(&[x, y]);
            self.core.vertices.extend_from_slice(&tint);
        }
    }

    pub fn flush<B: GpuBackend>(&mut self, ctx: &mut GraphicsContext<B>) -> GfxResult<()> {
        self.core.flush(ctx, None)
    }

    pub fn end<B: GpuBackend>(&mut self, ctx: &mut GraphicsContext<B>) -> GfxResult<()> {
        self.core.end(ctx, None)
    }

    pub fn enable_blending<B: GpuBackend>(&mut self, ctx: &mut GraphicsContext<B>) -> GfxResult<()> {
        self.core.change_state(ctx, None, |spec| spec.enable_blending())
    }

    pub fn disable_blending<B: GpuBackend>(&mut self, ctx: &mut GraphicsContext<B>) -> GfxResult<()> {
        self.core.change_state(ctx, None, |spec| spec.disable_blending())
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

    pub fn pending_quads(&self) -> usize {
        self.core.pending_quads()
    }

    pub fn vertex_offset(&self) -> u64 {
        self.core.vb_offset()
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
    use crate::error::GfxError;

    fn begun(capacity: usize) -> (GraphicsContext<RecordingBackend>, ShapeRenderer, CommandEncoder) {
        let mut ctx = GraphicsContext::new(RecordingBackend::new(), GfxConfig::default()).unwrap();
        let mut shapes = ShapeRenderer::new(ctx.backend_mut(), capacity).unwrap();
        let encoder = ctx.begin_frame().unwrap().unwrap();
        shapes.begin(&mut ctx, &encoder, None).unwrap();
        (ctx, shapes, encoder)
    }

    fn positions(shapes: &ShapeRenderer) -> Vec<(f32, f32)> {
        shapes.core.vertices.chunks(6).map(|v| (v[0], v[1])).collect()
    }

    #[test]
    fn horizontal_line_is_offset_vertically() {
        let (_ctx, mut shapes, _encoder) = begun(4);
        shapes.set_line_width(2.0);
        shapes.line(0.0, 10.0, 100.0, 10.0).unwrap();
        assert_eq!(
            positions(&shapes),
            vec![(0.0, 12.0), (100.0, 12.0), (100.0, 8.0), (0.0, 8.0)]
        );
    }

    #[test]
    fn degenerate_line_collapses() {
        let (_ctx, mut shapes, _encoder) = begun(4);
        shapes.line(5.0, 5.0, 5.0, 5.0).unwrap();
        assert!(positions(&shapes).iter().all(|&p| p == (5.0, 5.0)));
    }

    #[test]
    fn box_outline_needs_room_for_all_sides() {
        let (_ctx, mut shapes, _encoder) = begun(5);
        shapes.rect(0.0, 0.0, 1.0, 1.0).unwrap();
        shapes.rect(0.0, 0.0, 1.0, 1.0).unwrap();
        let err = shapes.box_outline(0.0, 0.0, 10.0, 10.0).unwrap_err();
        assert!(matches!(err, GfxError::Capacity { requested: 6, capacity: 5, .. }));
        assert_eq!(shapes.pending_quads(), 2);
        assert_eq!(shapes.core.vertices.len(), 2 * 4 * 6);
    }

    #[test]
    fn index_writes_advance_per_flush() {
        let (mut ctx, mut shapes, encoder) = begun(16);
        shapes.triangle(0.0, 0.0, 10.0, 0.0, 5.0, 5.0).unwrap();
        shapes.flush(&mut ctx).unwrap();
        shapes.rect(0.0, 0.0, 4.0, 4.0).unwrap();
        shapes.end(&mut ctx).unwrap();
        ctx.end_frame(encoder).unwrap();

        let index_sets: Vec<(u64, u64)> = ctx
            .backend()
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::SetIndexBuffer { offset, size, .. } => Some((*offset, *size)),
                _ => None,
            })
            .collect();
        assert_eq!(index_sets, vec![(0, 36), (36, 12)]);
        assert_eq!(shapes.stats(), BatchStats { draw_calls: 2, max_batch_size: 3 });
    }
}
