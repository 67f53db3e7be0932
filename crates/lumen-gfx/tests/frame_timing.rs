use lumen_gfx::backend::{Command, RecordingBackend};
use lumen_gfx::frame::{RenderPassBuilder, Viewport, ViewportMode};
use lumen_gfx::timing::TimingState;
use lumen_gfx::{Color, GfxConfig, GfxError, GraphicsContext};

fn timed_context() -> GraphicsContext<RecordingBackend> {
    let backend = RecordingBackend::new().with_timestamp_period(2.0);
    let config = GfxConfig {
        enable_gpu_timing: true,
        ..GfxConfig::default()
    };
    GraphicsContext::new(backend, config).unwrap()
}

/// One frame with a single clearing pass. Returns false when the frame was skipped.
fn run_frame(ctx: &mut GraphicsContext<RecordingBackend>) -> bool {
    let Some(encoder) = ctx.begin_frame().unwrap() else {
        return false;
    };
    let pass = RenderPassBuilder::new("frame").clear(Some(Color::BLUE)).begin(ctx, &encoder).unwrap();
    pass.end(ctx).unwrap();
    ctx.end_frame(encoder).unwrap();
    true
}

#[test]
fn no_second_readback_while_a_map_is_pending() {
    let mut ctx = timed_context();
    ctx.backend_mut().hold_maps(true);
    ctx.backend_mut().set_next_timestamps(100, 600);

    assert!(run_frame(&mut ctx));
    assert!(run_frame(&mut ctx));
    assert_eq!(ctx.backend().count_where(|c| matches!(c, Command::MapBuffer(_))), 1);
    assert_eq!(ctx.backend().count_where(|c| matches!(c, Command::ResolveQuerySet { .. })), 1);
    assert_eq!(ctx.timing().map(|t| t.state()), Some(TimingState::MapPending));

    ctx.backend_mut().hold_maps(false);
    assert!(run_frame(&mut ctx));
    assert_eq!(ctx.timing().map(|t| t.state()), Some(TimingState::Idle));
    assert_eq!(ctx.timing().map(|t| t.sample_count()), Some(1));
}

#[test]
fn average_is_scaled_by_period_and_resets() {
    let mut ctx = timed_context();
    ctx.backend_mut().set_next_timestamps(1_000, 1_500);
    assert!(run_frame(&mut ctx));
    ctx.backend_mut().set_next_timestamps(1_000, 2_000);
    assert!(run_frame(&mut ctx));

    // (500 + 1000) ticks * 2 ns / 2 samples = 1.5 us
    assert_eq!(ctx.average_gpu_time_us(), Some(1.5));
    assert_eq!(ctx.average_gpu_time_us(), Some(0.0));
}

#[test]
fn timing_is_absent_without_timestamp_support() {
    let backend = RecordingBackend::new().with_timestamps(false);
    let config = GfxConfig {
        enable_gpu_timing: true,
        ..GfxConfig::default()
    };
    let mut ctx = GraphicsContext::new(backend, config).unwrap();
    assert!(run_frame(&mut ctx));
    assert!(ctx.timing().is_none());
    assert_eq!(ctx.average_gpu_time_us(), None);
    assert_eq!(ctx.backend().count_where(|c| matches!(c, Command::ResolveQuerySet { .. })), 0);
}

#[test]
fn minimized_window_skips_frames_until_restored() {
    let mut ctx = GraphicsContext::new(RecordingBackend::new(), GfxConfig::default()).unwrap();
    ctx.resize(0, 0).unwrap();
    assert!(ctx.is_minimized());
    assert!(!run_frame(&mut ctx));

    ctx.resize(1024, 768).unwrap();
    assert!(run_frame(&mut ctx));
    assert_eq!(ctx.size(), (1024, 768));
    assert_eq!(ctx.backend().count_where(|c| matches!(c, Command::Present)), 1);
}

#[test]
fn failed_acquire_skips_one_frame() {
    let mut ctx = GraphicsContext::new(RecordingBackend::new(), GfxConfig::default()).unwrap();
    ctx.backend_mut().fail_next_surface_acquire();
    assert!(!run_frame(&mut ctx));
    assert!(!ctx.in_frame());
    assert!(run_frame(&mut ctx));
}

#[test]
fn resize_inside_a_frame_is_rejected() {
    let mut ctx = GraphicsContext::new(RecordingBackend::new(), GfxConfig::default()).unwrap();
    let encoder = ctx.begin_frame().unwrap().unwrap();
    assert!(matches!(ctx.resize(10, 10), Err(GfxError::Protocol(_))));
    ctx.end_frame(encoder).unwrap();
    ctx.resize(10, 10).unwrap();
}

#[test]
fn fit_viewport_follows_resize() {
    let mut ctx = GraphicsContext::new(RecordingBackend::new(), GfxConfig::default()).unwrap();
    ctx.set_viewport(Some(Viewport::new(ViewportMode::Fit, 400.0, 300.0)));
    ctx.resize(1000, 600).unwrap();
    assert!(run_frame(&mut ctx));

    let viewports: Vec<(f32, f32, f32, f32)> = ctx
        .backend()
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::SetViewport { x, y, width, height, .. } => Some((*x, *y, *width, *height)),
            _ => None,
        })
        .collect();
    // 4:3 world letterboxed into 1000x600
    assert_eq!(viewports, vec![(100.0, 0.0, 800.0, 600.0)]);
}

#[test]
fn submitted_work_completes() {
    let mut ctx = GraphicsContext::new(RecordingBackend::new(), GfxConfig::default()).unwrap();
    assert!(run_frame(&mut ctx));
    assert!(ctx.wait_for_work_done(4));
}

#[test]
fn dispose_returns_backend_with_targets_released() {
    let config = GfxConfig {
        sample_count: 4,
        ..GfxConfig::default()
    };
    let mut ctx = GraphicsContext::new(RecordingBackend::new(), config).unwrap();
    assert!(run_frame(&mut ctx));
    let backend = ctx.dispose();
    assert_eq!(backend.live_textures(), 0);
    assert_eq!(backend.live_buffers(), 0);
}

#[test]
fn failed_end_frame_releases_the_drawable() {
    let mut ctx = timed_context();
    let encoder = ctx.begin_frame().unwrap().unwrap();
    let pass = RenderPassBuilder::new("left open").begin(&mut ctx, &encoder).unwrap();

    assert!(matches!(ctx.end_frame(encoder), Err(GfxError::Protocol(_))));
    assert!(!ctx.in_frame());
    assert_eq!(ctx.backend().count_where(|c| matches!(c, Command::Present)), 1);
    assert_eq!(ctx.backend().count_where(|c| matches!(c, Command::Submit(_))), 0);
    assert_eq!(ctx.timing().map(|t| t.state()), Some(TimingState::Idle));

    pass.end(&mut ctx).unwrap();
    assert!(run_frame(&mut ctx));
    assert_eq!(ctx.backend().count_where(|c| matches!(c, Command::Present)), 2);
}
