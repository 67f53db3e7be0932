use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use ouroboros::self_referencing;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use lumen_gfx::backend::WgpuBackend;
use lumen_gfx::device::{GpuInit, SurfaceErrorAction};
use lumen_gfx::{GfxConfig, GfxError, GraphicsContext};

use crate::scene::Scene;

const GPU_REPORT_INTERVAL: Duration = Duration::from_secs(2);

/// Window and graphics configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub gpu_init: GpuInit,
    pub gfx: GfxConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "lumen".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            gpu_init: GpuInit::default(),
            gfx: GfxConfig::default(),
        }
    }
}

pub struct Runtime;

impl Runtime {
    pub fn run(config: RuntimeConfig) -> Result<()> {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(config);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        Ok(())
    }
}

#[self_referencing]
struct WindowEntry {
    started: Instant,
    last_report: Instant,
    scene: Option<Scene>,

    window: Window,

    #[borrows(window)]
    #[not_covariant]
    gfx: GraphicsContext<WgpuBackend<'this>>,
}

fn create_context<'w>(
    window: &'w Window,
    mut init: GpuInit,
    config: GfxConfig,
) -> Result<GraphicsContext<WgpuBackend<'w>>> {
    init.enable_gpu_timing |= config.enable_gpu_timing;
    let backend = pollster::block_on(WgpuBackend::for_window(window, init))?;
    GraphicsContext::new(backend, config).context("failed to create graphics context")
}

/// Outcome of one redraw.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum FrameOutcome {
    Continue,
    Exit,
}

struct AppState {
    config: RuntimeConfig,
    window: Option<WindowEntry>,
    exit_requested: bool,
}

impl AppState {
    fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            window: None,
            exit_requested: false,
        }
    }

    fn create_window_entry(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);
        let window = event_loop.create_window(attrs).context("failed to create window")?;

        let (gpu_init, gfx_config) = (self.config.gpu_init.clone(), self.config.gfx);
        let now = Instant::now();
        let entry = WindowEntryTryBuilder {
            started: now,
            last_report: now,
            scene: None,
            window,
            gfx_builder: |window| create_context(window, gpu_init, gfx_config),
        }
        .try_build()?;

        entry.with_window(|w| w.request_redraw());
        self.window = Some(entry);
        Ok(())
    }

    fn destroy_window_entry(&mut self) {
        if let Some(mut entry) = self.window.take() {
            entry.with_mut(|fields| {
                if let Some(scene) = fields.scene.take() {
                    scene.dispose(fields.gfx.backend_mut());
                }
            });
        }
    }

    fn request_exit(&mut self, event_loop: &ActiveEventLoop) {
        self.exit_requested = true;
        self.destroy_window_entry();
        event_loop.exit();
    }
}

fn redraw(entry: &mut WindowEntry) -> FrameOutcome {
    entry.with_mut(|fields| {
        let gfx = fields.gfx;
        if fields.scene.is_none() {
            match Scene::new(gfx) {
                Ok(scene) => *fields.scene = Some(scene),
                Err(e) => {
                    log::error!("failed to build scene: {e}");
                    return FrameOutcome::Exit;
                }
            }
        }
        let Some(scene) = fields.scene.as_mut() else {
            return FrameOutcome::Exit;
        };

        let t = fields.started.elapsed().as_secs_f32();
        if let Err(e) = draw_frame(gfx, scene, t) {
            log::error!("frame failed: {e}");
            return FrameOutcome::Exit;
        }
        if gfx.backend().last_surface_action() == Some(SurfaceErrorAction::Fatal) {
            log::error!("surface lost beyond recovery");
            return FrameOutcome::Exit;
        }

        if fields.last_report.elapsed() >= GPU_REPORT_INTERVAL {
            *fields.last_report = Instant::now();
            if let Some(us) = gfx.average_gpu_time_us() {
                log::info!("gpu time {us:.1} us/frame, {:?}", scene.stats());
            }
        }
        fields.window.request_redraw();
        FrameOutcome::Continue
    })
}

fn draw_frame(gfx: &mut GraphicsContext<WgpuBackend<'_>>, scene: &mut Scene, t: f32) -> Result<(), GfxError> {
    let Some(encoder) = gfx.begin_frame()? else {
        return Ok(());
    };
    scene.draw(gfx, &encoder, t)?;
    gfx.end_frame(encoder)
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.create_window_entry(event_loop) {
            log::error!("failed to create initial window: {e:#}");
            self.request_exit(event_loop);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }
        event_loop.set_control_flow(ControlFlow::Wait);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }
        let Some(entry) = self.window.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => self.request_exit(event_loop),

            WindowEvent::Resized(size) => {
                let resized = entry.with_gfx_mut(|gfx| gfx.resize(size.width, size.height));
                if let Err(e) = resized {
                    log::error!("resize failed: {e}");
                    self.request_exit(event_loop);
                    return;
                }
                entry.with_window(|w| w.request_redraw());
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                let size = entry.with_window(|w| w.inner_size());
                if let Err(e) = entry.with_gfx_mut(|gfx| gfx.resize(size.width, size.height)) {
                    log::error!("resize failed: {e}");
                    self.request_exit(event_loop);
                }
            }

            WindowEvent::RedrawRequested => {
                if redraw(entry) == FrameOutcome::Exit {
                    self.request_exit(event_loop);
                }
            }

            _ => {}
        }
    }
}
