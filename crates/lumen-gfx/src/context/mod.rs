//! Explicit graphics context.
//!
//! [`GraphicsContext`] owns the backend and every per-surface object: the
//! default depth and MSAA attachments, the drawable of the frame in progress,
//! the registered viewport, and the optional GPU timer. Renderers receive it by
//! mutable reference for each call.

mod config;
mod targets;

pub use config::GfxConfig;

pub(crate) use targets::DefaultTargets;

use crate::backend::{GpuBackend, PassId, TextureViewId};
use crate::error::{GfxError, GfxResult};
use crate::frame::{CommandBuffer, CommandEncoder, Viewport};
use crate::paint::Color;
use crate::timing::GpuTiming;

pub struct GraphicsContext<B: GpuBackend> {
    pub(crate) backend: B,
    config: GfxConfig,
    surface_format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    minimized: bool,
    pub(crate) targets: Option<DefaultTargets>,

    /// Drawable acquired by `begin_frame`, released by `end_frame`.
    pub(crate) frame_view: Option<TextureViewId>,
    pub(crate) open_pass: Option<PassId>,
    /// Color the next surface pass clears to when it doesn't request one.
    pub(crate) pending_clear: Option<Color>,

    pub(crate) viewport: Option<Viewport>,
    pub(crate) timing: Option<GpuTiming>,
}

impl<B: GpuBackend> GraphicsContext<B> {
    pub fn new(mut backend: B, config: GfxConfig) -> GfxResult<Self> {
        if !matches!(config.sample_count, 1 | 4) {
            return Err(GfxError::validation(format!(
                "sample count must be 1 or 4, got {}",
                config.sample_count
            )));
        }
        let surface_format = backend.surface_format();
        let (width, height) = backend.surface_size();
        let minimized = width == 0 || height == 0;

        let targets = if minimized {
            None
        } else {
            Some(DefaultTargets::new(
                &mut backend,
                width,
                height,
                surface_format,
                config.depth_format,
                config.sample_count,
            )?)
        };
        let timing = if config.enable_gpu_timing {
            GpuTiming::new(&mut backend)?
        } else {
            None
        };

        log::info!(
            "graphics context: {surface_format:?} {width}x{height}, {} sample(s), timing {}",
            config.sample_count,
            if timing.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            backend,
            config,
            surface_format,
            width,
            height,
            minimized,
            targets,
            frame_view: None,
            open_pass: None,
            pending_clear: None,
            viewport: None,
            timing,
        })
    }

    // ── accessors ─────────────────────────────────────────────────────────

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &GfxConfig {
        &self.config
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    /// Drawable size in physical pixels.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn sample_count(&self) -> u32 {
        self.config.sample_count
    }

    pub fn depth_format(&self) -> wgpu::TextureFormat {
        self.config.depth_format
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    pub fn in_frame(&self) -> bool {
        self.frame_view.is_some()
    }

    pub fn viewport(&self) -> Option<&Viewport> {
        self.viewport.as_ref()
    }

    /// Registers a viewport applied to every pass opened afterwards.
    pub fn set_viewport(&mut self, viewport: Option<Viewport>) {
        self.viewport = viewport.map(|mut v| {
            v.update(self.width, self.height);
            v
        });
    }

    pub fn timing(&self) -> Option<&GpuTiming> {
        self.timing.as_ref()
    }

    /// Mean GPU pass time since the last call, or `None` when timing is off.
    pub fn average_gpu_time_us(&mut self) -> Option<f32> {
        self.timing.as_mut().map(GpuTiming::average_gpu_time_us)
    }

    /// Makes the next surface pass clear to `color`.
    pub fn request_clear(&mut self, color: Color) {
        self.pending_clear = Some(color);
    }

    // ── surface ───────────────────────────────────────────────────────────

    /// Handles a surface resize. A zero size marks the context minimized and
    /// frames are skipped until the next non-zero resize.
    pub fn resize(&mut self, width: u32, height: u32) -> GfxResult<()> {
        if self.frame_view.is_some() {
            return Err(GfxError::Protocol("resize() during a frame"));
        }
        self.width = width;
        self.height = height;
        if width == 0 || height == 0 {
            self.minimized = true;
            return Ok(());
        }
        self.minimized = false;
        self.backend.resize_surface(width, height);

        if let Some(old) = self.targets.take() {
            old.dispose(&mut self.backend);
        }
        self.targets = Some(DefaultTargets::new(
            &mut self.backend,
            width,
            height,
            self.surface_format,
            self.config.depth_format,
            self.config.sample_count,
        )?);
        if let Some(viewport) = self.viewport.as_mut() {
            viewport.update(width, height);
        }
        Ok(())
    }

    // ── frame ─────────────────────────────────────────────────────────────

    /// Acquires the next drawable and opens the frame's encoder.
    ///
    /// Returns `None` when the frame must be skipped: the context is
    /// minimized or no drawable was available.
    pub fn begin_frame(&mut self) -> GfxResult<Option<CommandEncoder>> {
        if self.frame_view.is_some() {
            return Err(GfxError::Protocol("begin_frame() called twice without end_frame()"));
        }
        if self.minimized {
            return Ok(None);
        }
        let view = match self.backend.acquire_surface_view() {
            Ok(view) => view,
            Err(GfxError::Surface(msg)) => {
                log::warn!("skipping frame: {msg}");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let encoder = match CommandEncoder::new(&mut self.backend, "frame encoder") {
            Ok(encoder) => encoder,
            Err(e) => {
                self.backend.present();
                return Err(e);
            }
        };
        self.frame_view = Some(view);
        if self.pending_clear.is_none() {
            self.pending_clear = Some(self.config.clear_color);
        }
        Ok(Some(encoder))
    }

    /// Finishes and submits the frame, presents it and ticks the device.
    ///
    /// The drawable is released even when the frame fails, so the next
    /// `begin_frame` proceeds normally. A pass left open still has to be
    /// ended by its owner.
    pub fn end_frame(&mut self, encoder: CommandEncoder) -> GfxResult<()> {
        if self.frame_view.is_none() {
            return Err(GfxError::Protocol("end_frame() without begin_frame()"));
        }

        let submitted = self.submit_frame(encoder);
        self.frame_view = None;
        self.pending_clear = None;
        self.backend.present();
        if let Err(e) = submitted {
            log::warn!("frame dropped: {e}");
            if let Some(timing) = self.timing.as_mut() {
                timing.discard_resolve();
            }
            return Err(e);
        }

        self.backend.poll();
        if let Some(timing) = self.timing.as_mut() {
            timing.poll_completed(&mut self.backend);
        }
        Ok(())
    }

    fn submit_frame(&mut self, encoder: CommandEncoder) -> GfxResult<()> {
        if self.open_pass.is_some() {
            return Err(GfxError::Protocol("end_frame() with a render pass still open"));
        }
        if let Some(timing) = self.timing.as_mut() {
            timing.resolve_timestamps(&mut self.backend, encoder.id())?;
        }
        let command_buffer = encoder.finish(&mut self.backend)?;
        self.backend.submit(&[command_buffer.into_id()])?;
        if let Some(timing) = self.timing.as_mut() {
            timing.fetch_timestamps(&mut self.backend);
        }
        Ok(())
    }

    /// Submits command buffers recorded outside the frame encoder.
    pub fn submit(&mut self, command_buffers: impl IntoIterator<Item = CommandBuffer>) -> GfxResult<()> {
        let ids: Vec<_> = command_buffers.into_iter().map(CommandBuffer::into_id).collect();
        self.backend.submit(&ids)
    }

    /// Polls until previously submitted work completes, yielding between
    /// polls. Returns `false` if `max_polls` ran out first.
    pub fn wait_for_work_done(&mut self, max_polls: u32) -> bool {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.backend.on_submitted_work_done(Box::new(move || {
            let _ = tx.send(());
        }));
        for _ in 0..max_polls {
            self.backend.poll();
            if rx.try_recv().is_ok() {
                return true;
            }
            std::thread::yield_now();
        }
        log::warn!("submitted work not done after {max_polls} polls");
        false
    }

    /// Releases the context's own resources and hands the backend back.
    pub fn dispose(mut self) -> B {
        if let Some(targets) = self.targets.take() {
            targets.dispose(&mut self.backend);
        }
        if let Some(timing) = self.timing.take() {
            timing.dispose(&mut self.backend);
        }
        if self.frame_view.take().is_some() {
            self.backend.present();
        }
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, RecordingBackend};

    #[test]
    fn msaa_context_builds_a_multisampled_color_target() {
        let config = GfxConfig {
            sample_count: 4,
            ..GfxConfig::default()
        };
        let ctx = GraphicsContext::new(RecordingBackend::new(), config).unwrap();
        let msaa = ctx.targets.as_ref().and_then(|t| t.msaa.as_ref()).unwrap();
        assert_eq!(msaa.sample_count(), 4);
        assert_eq!(msaa.format(), ctx.surface_format());
    }

    #[test]
    fn unsupported_sample_count_is_rejected() {
        let config = GfxConfig {
            sample_count: 2,
            ..GfxConfig::default()
        };
        assert!(GraphicsContext::new(RecordingBackend::new(), config).is_err());
    }

    #[test]
    fn minimized_context_skips_frames() {
        let mut ctx = GraphicsContext::new(RecordingBackend::new(), GfxConfig::default()).unwrap();
        ctx.resize(0, 0).unwrap();
        assert!(ctx.is_minimized());
        assert!(ctx.begin_frame().unwrap().is_none());

        ctx.resize(320, 200).unwrap();
        assert_eq!(ctx.targets.as_ref().unwrap().depth.width(), 320);
        let encoder = ctx.begin_frame().unwrap().unwrap();
        ctx.end_frame(encoder).unwrap();
    }

    #[test]
    fn failed_acquire_skips_one_frame() {
        let mut ctx = GraphicsContext::new(RecordingBackend::new(), GfxConfig::default()).unwrap();
        ctx.backend_mut().fail_next_surface_acquire();
        assert!(ctx.begin_frame().unwrap().is_none());
        let encoder = ctx.begin_frame().unwrap().unwrap();
        ctx.end_frame(encoder).unwrap();
        assert_eq!(ctx.backend().count_where(|c| matches!(c, Command::Present)), 1);
    }

    #[test]
    fn resize_rebuilds_targets_without_leaking() {
        let mut ctx = GraphicsContext::new(RecordingBackend::new(), GfxConfig::default()).unwrap();
        let before = ctx.backend().live_textures();
        ctx.resize(1024, 768).unwrap();
        assert_eq!(ctx.backend().live_textures(), before);
        let backend = ctx.dispose();
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn work_done_wait_is_bounded() {
        let mut ctx = GraphicsContext::new(RecordingBackend::new(), GfxConfig::default()).unwrap();
        assert!(ctx.wait_for_work_done(4));
    }
}
