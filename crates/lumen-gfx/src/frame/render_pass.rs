use std::ops::Range;

use super::CommandEncoder;
use crate::backend::{
    BindGroupId, BufferId, ColorAttachmentDesc, DepthAttachmentDesc, GpuBackend, LoadAction,
    PassId, PipelineId, RenderPassDesc,
};
use crate::context::GraphicsContext;
use crate::error::{GfxError, GfxResult};
use crate::paint::Color;
use crate::pipeline::PipelineSpecification;
use crate::resource::Texture;

/// Attachment configuration of a pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RenderPassType {
    #[default]
    Color,
    /// Color pass reusing depth written by an earlier prepass.
    ColorAfterDepthPrepass,
    /// Depth only, single-sampled.
    DepthPrepass,
    /// Depth only into a shadow map, single-sampled.
    Shadow,
    /// Color only.
    NoDepth,
}

impl RenderPassType {
    pub fn has_color(self) -> bool {
        !matches!(self, RenderPassType::DepthPrepass | RenderPassType::Shadow)
    }

    pub fn has_depth(self) -> bool {
        self != RenderPassType::NoDepth
    }
}

/// Describes a pass before it is opened on an encoder.
#[derive(Debug)]
pub struct RenderPassBuilder<'a> {
    label: &'a str,
    pass_type: RenderPassType,
    clear_color: Option<Color>,
    color_target: Option<&'a Texture>,
    depth_target: Option<&'a Texture>,
    sample_count: Option<u32>,
}

impl<'a> RenderPassBuilder<'a> {
    pub fn new(label: &'a str) -> Self {
        Self {
            label,
            pass_type: RenderPassType::Color,
            clear_color: None,
            color_target: None,
            depth_target: None,
            sample_count: None,
        }
    }

    pub fn pass_type(mut self, pass_type: RenderPassType) -> Self {
        self.pass_type = pass_type;
        self
    }

    /// Clears the color attachment instead of loading it.
    pub fn clear(mut self, color: Option<Color>) -> Self {
        self.clear_color = color;
        self
    }

    /// Renders into an off-screen texture instead of the surface.
    pub fn color_target(mut self, texture: &'a Texture) -> Self {
        self.color_target = Some(texture);
        self
    }

    pub fn depth_target(mut self, texture: &'a Texture) -> Self {
        self.depth_target = Some(texture);
        self
    }

    /// Sample count for surface passes; defaults to the context's.
    pub fn sample_count(mut self, samples: u32) -> Self {
        self.sample_count = Some(samples);
        self
    }

    /// Opens the pass on `encoder`. Only one pass may be open at a time.
    pub fn begin<B: GpuBackend>(
        self,
        ctx: &mut GraphicsContext<B>,
        encoder: &CommandEncoder,
    ) -> GfxResult<RenderPass> {
        if ctx.open_pass.is_some() {
            return Err(GfxError::Protocol("a render pass is already open"));
        }

        let mut sample_count = match self.pass_type {
            RenderPassType::DepthPrepass | RenderPassType::Shadow => 1,
            _ => self.sample_count.unwrap_or(ctx.sample_count()),
        };
        let mut size = None;
        let mut color_format = None;
        let mut color = None;
        let mut consumed_clear = false;

        if self.pass_type.has_color() {
            let (view, resolve_target, format) = match self.color_target {
                Some(target) => {
                    if target.sample_count() != 1 {
                        return Err(GfxError::validation("off-screen color targets must be single-sampled"));
                    }
                    sample_count = 1;
                    size = Some((target.width(), target.height()));
                    (target.view(), None, target.format())
                }
                None => {
                    let Some(surface) = ctx.frame_view else {
                        return Err(GfxError::Protocol("surface pass begun outside a frame"));
                    };
                    size = Some(ctx.size());
                    if sample_count > 1 {
                        let msaa = ctx
                            .targets
                            .as_ref()
                            .and_then(|t| t.msaa.as_ref())
                            .filter(|t| t.sample_count() == sample_count)
                            .ok_or_else(|| {
                                GfxError::validation(format!(
                                    "no default MSAA target with {sample_count} samples"
                                ))
                            })?;
                        (msaa.view(), Some(surface), ctx.surface_format())
                    } else {
                        (surface, None, ctx.surface_format())
                    }
                }
            };

            let load = match (self.clear_color, self.color_target) {
                (Some(c), _) => LoadAction::Clear(c.to_wgpu()),
                (None, None) => match ctx.pending_clear {
                    Some(c) => {
                        consumed_clear = true;
                        LoadAction::Clear(c.to_wgpu())
                    }
                    None => LoadAction::Load,
                },
                (None, Some(_)) => LoadAction::Load,
            };
            color_format = Some(format);
            color = Some(ColorAttachmentDesc { view, resolve_target, load });
        }

        let mut depth_format = None;
        let mut depth = None;
        if self.pass_type.has_depth() {
            let target = match self.depth_target {
                Some(t) => t,
                None => &ctx
                    .targets
                    .as_ref()
                    .ok_or(GfxError::Protocol("default depth target unavailable while minimized"))?
                    .depth,
            };
            if target.sample_count() != sample_count {
                return Err(GfxError::validation(format!(
                    "depth target has {} samples, pass needs {sample_count}",
                    target.sample_count()
                )));
            }
            let load = if self.pass_type == RenderPassType::ColorAfterDepthPrepass {
                LoadAction::Load
            } else {
                LoadAction::Clear(1.0)
            };
            size = size.or(Some((target.width(), target.height())));
            depth_format = Some(target.format());
            depth = Some(DepthAttachmentDesc { view: target.view(), load });
        }

        let Some((width, height)) = size else {
            return Err(GfxError::validation("render pass has no attachments"));
        };
        let desc = RenderPassDesc {
            label: self.label,
            color,
            depth,
            timestamp_writes: ctx.timing.as_ref().map(|t| t.timestamp_writes()),
        };
        let id = ctx.backend.begin_render_pass(encoder.id(), &desc)?;
        ctx.open_pass = Some(id);
        if consumed_clear {
            ctx.pending_clear = None;
        }

        let pass = RenderPass {
            id,
            pass_type: self.pass_type,
            color_format,
            depth_format,
            sample_count,
            width,
            height,
        };
        if let Some(viewport) = ctx.viewport.as_ref() {
            if let Err(e) = viewport.apply(&pass, &mut ctx.backend) {
                pass.end(ctx)?;
                return Err(e);
            }
        }
        log::trace!("render pass '{}' begun ({width}x{height}, x{sample_count})", self.label);
        Ok(pass)
    }
}

/// An open render pass. Must be ended before its encoder is finished.
#[derive(Debug)]
#[must_use = "a render pass must be ended"]
pub struct RenderPass {
    id: PassId,
    pass_type: RenderPassType,
    color_format: Option<wgpu::TextureFormat>,
    depth_format: Option<wgpu::TextureFormat>,
    sample_count: u32,
    width: u32,
    height: u32,
}

impl RenderPass {
    pub fn id(&self) -> PassId {
        self.id
    }

    pub fn pass_type(&self) -> RenderPassType {
        self.pass_type
    }

    pub fn color_format(&self) -> Option<wgpu::TextureFormat> {
        self.color_format
    }

    pub fn depth_format(&self) -> Option<wgpu::TextureFormat> {
        self.depth_format
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Copies the attachment formats and sample count into `spec`.
    pub fn configure(&self, spec: &mut PipelineSpecification) {
        spec.color_format = self.color_format;
        spec.depth_format = self.depth_format;
        spec.sample_count = self.sample_count;
    }

    pub fn set_pipeline<B: GpuBackend>(&self, ctx: &mut GraphicsContext<B>, pipeline: PipelineId) -> GfxResult<()> {
        ctx.backend.set_pipeline(self.id, pipeline)
    }

    pub fn set_bind_group<B: GpuBackend>(
        &self,
        ctx: &mut GraphicsContext<B>,
        index: u32,
        group: BindGroupId,
        dynamic_offsets: &[u32],
    ) -> GfxResult<()> {
        ctx.backend.set_bind_group(self.id, index, group, dynamic_offsets)
    }

    pub fn set_vertex_buffer<B: GpuBackend>(
        &self,
        ctx: &mut GraphicsContext<B>,
        slot: u32,
        buffer: BufferId,
        offset: u64,
        size: u64,
    ) -> GfxResult<()> {
        ctx.backend.set_vertex_buffer(self.id, slot, buffer, offset, size)
    }

    pub fn set_index_buffer<B: GpuBackend>(
        &self,
        ctx: &mut GraphicsContext<B>,
        buffer: BufferId,
        format: wgpu::IndexFormat,
        offset: u64,
        size: u64,
    ) -> GfxResult<()> {
        ctx.backend.set_index_buffer(self.id, buffer, format, offset, size)
    }

    pub fn set_viewport<B: GpuBackend>(
        &self,
        ctx: &mut GraphicsContext<B>,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> GfxResult<()> {
        ctx.backend.set_viewport(self.id, x, y, width, height, 0.0, 1.0)
    }

    pub fn set_scissor_rect<B: GpuBackend>(
        &self,
        ctx: &mut GraphicsContext<B>,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> GfxResult<()> {
        ctx.backend.set_scissor_rect(self.id, x, y, width, height)
    }

    pub fn draw<B: GpuBackend>(
        &self,
        ctx: &mut GraphicsContext<B>,
        vertices: Range<u32>,
        instances: Range<u32>,
    ) -> GfxResult<()> {
        ctx.backend.draw(self.id, vertices, instances)
    }

    pub fn draw_indexed<B: GpuBackend>(
        &self,
        ctx: &mut GraphicsContext<B>,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    ) -> GfxResult<()> {
        ctx.backend.draw_indexed(self.id, indices, base_vertex, instances)
    }

    pub fn end<B: GpuBackend>(self, ctx: &mut GraphicsContext<B>) -> GfxResult<()> {
        if ctx.open_pass == Some(self.id) {
            ctx.open_pass = None;
        }
        ctx.backend.end_render_pass(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, RecordingBackend};
    use crate::context::GfxConfig;
    use crate::frame::Viewport;

    fn context(sample_count: u32) -> GraphicsContext<RecordingBackend> {
        let config = GfxConfig {
            sample_count,
            ..GfxConfig::default()
        };
        GraphicsContext::new(RecordingBackend::new(), config).unwrap()
    }

    fn begins(ctx: &GraphicsContext<RecordingBackend>) -> Vec<Command> {
        ctx.backend()
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::BeginRenderPass { .. }))
            .cloned()
            .collect()
    }

    #[test]
    fn first_surface_pass_clears_and_later_ones_load() {
        let mut ctx = context(1);
        let encoder = ctx.begin_frame().unwrap().unwrap();
        for _ in 0..2 {
            let pass = RenderPassBuilder::new("p").begin(&mut ctx, &encoder).unwrap();
            pass.end(&mut ctx).unwrap();
        }
        let begins = begins(&ctx);
        let loads: Vec<_> = begins
            .iter()
            .map(|c| match c {
                Command::BeginRenderPass { color: Some(color), .. } => color.load,
                _ => unreachable!(),
            })
            .collect();
        assert!(matches!(loads[0], LoadAction::Clear(_)));
        assert_eq!(loads[1], LoadAction::Load);
        ctx.end_frame(encoder).unwrap();
    }

    #[test]
    fn second_open_pass_is_a_protocol_error() {
        let mut ctx = context(1);
        let encoder = ctx.begin_frame().unwrap().unwrap();
        let pass = RenderPassBuilder::new("a").begin(&mut ctx, &encoder).unwrap();
        let err = RenderPassBuilder::new("b").begin(&mut ctx, &encoder).unwrap_err();
        assert!(matches!(err, GfxError::Protocol(_)));
        assert!(matches!(ctx.end_frame(encoder), Err(GfxError::Protocol(_))));
        pass.end(&mut ctx).unwrap();
    }

    #[test]
    fn msaa_surface_pass_resolves_into_the_drawable() {
        let mut ctx = context(4);
        let encoder = ctx.begin_frame().unwrap().unwrap();
        let pass = RenderPassBuilder::new("msaa").begin(&mut ctx, &encoder).unwrap();
        assert_eq!(pass.sample_count(), 4);
        pass.end(&mut ctx).unwrap();
        let Command::BeginRenderPass { color: Some(color), .. } = &begins(&ctx)[0] else {
            panic!("expected a color attachment");
        };
        assert_eq!(color.resolve_target, ctx.frame_view);
        ctx.end_frame(encoder).unwrap();
    }

    #[test]
    fn shadow_pass_has_no_color_and_is_single_sampled() {
        let mut ctx = context(4);
        let shadow_map = Texture::depth(
            ctx.backend_mut(),
            "shadow",
            256,
            256,
            wgpu::TextureFormat::Depth32Float,
            1,
        )
        .unwrap();
        let encoder = CommandEncoder::new(ctx.backend_mut(), "shadow").unwrap();
        let pass = RenderPassBuilder::new("shadow")
            .pass_type(RenderPassType::Shadow)
            .depth_target(&shadow_map)
            .begin(&mut ctx, &encoder)
            .unwrap();
        assert_eq!(pass.sample_count(), 1);
        assert_eq!(pass.color_format(), None);
        assert_eq!(pass.depth_format(), Some(wgpu::TextureFormat::Depth32Float));
        assert_eq!((pass.width(), pass.height()), (256, 256));
        pass.end(&mut ctx).unwrap();
    }

    #[test]
    fn depth_after_prepass_is_loaded() {
        let mut ctx = context(1);
        let encoder = ctx.begin_frame().unwrap().unwrap();
        let pass = RenderPassBuilder::new("color")
            .pass_type(RenderPassType::ColorAfterDepthPrepass)
            .begin(&mut ctx, &encoder)
            .unwrap();
        pass.end(&mut ctx).unwrap();
        let Command::BeginRenderPass { depth: Some(depth), .. } = &begins(&ctx)[0] else {
            panic!("expected a depth attachment");
        };
        assert_eq!(depth.load, LoadAction::Load);
        ctx.end_frame(encoder).unwrap();
    }

    #[test]
    fn registered_viewport_is_applied_to_every_pass() {
        let mut ctx = context(1);
        ctx.set_viewport(Some(Viewport::new(crate::frame::ViewportMode::Fit, 100.0, 100.0)));
        let encoder = ctx.begin_frame().unwrap().unwrap();
        for _ in 0..2 {
            RenderPassBuilder::new("p").begin(&mut ctx, &encoder).unwrap().end(&mut ctx).unwrap();
        }
        let viewports = ctx.backend().count_where(|c| matches!(c, Command::SetViewport { .. }));
        assert_eq!(viewports, 2);
        ctx.end_frame(encoder).unwrap();
    }

    #[test]
    fn out_of_bounds_viewport_fails_and_closes_the_pass() {
        let mut ctx = context(1);
        let mut viewport = Viewport::new(crate::frame::ViewportMode::Stretch, 10.0, 10.0);
        let encoder = ctx.begin_frame().unwrap().unwrap();
        viewport.set_screen_bounds(700.0, 0.0, 200.0, 100.0);
        ctx.viewport = Some(viewport);
        let err = RenderPassBuilder::new("p").begin(&mut ctx, &encoder).unwrap_err();
        assert!(matches!(err, GfxError::Validation(_)));
        ctx.end_frame(encoder).unwrap();
    }
}
