use lumen_gfx::backend::{Command, RecordingBackend};
use lumen_gfx::batch::{BatchStats, RoundedRectBatch, ShapeRenderer, SpriteBatch};
use lumen_gfx::frame::CommandEncoder;
use lumen_gfx::resource::Texture;
use lumen_gfx::{Color, GfxConfig, GfxError, GraphicsContext};

fn context() -> GraphicsContext<RecordingBackend> {
    GraphicsContext::new(RecordingBackend::new(), GfxConfig::default()).unwrap()
}

fn white(ctx: &mut GraphicsContext<RecordingBackend>) -> Texture {
    Texture::from_rgba8(ctx.backend_mut(), "white", 2, 2, &[255; 16]).unwrap()
}

fn frame(ctx: &mut GraphicsContext<RecordingBackend>) -> CommandEncoder {
    ctx.begin_frame().unwrap().expect("recording surface is always available")
}

fn count(ctx: &GraphicsContext<RecordingBackend>, pred: impl Fn(&Command) -> bool) -> usize {
    ctx.backend().count_where(pred)
}

fn vertex_buffer_offsets(ctx: &GraphicsContext<RecordingBackend>) -> Vec<u64> {
    ctx.backend()
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::SetVertexBuffer { offset, .. } => Some(*offset),
            _ => None,
        })
        .collect()
}

#[test]
fn draw_before_begin_is_protocol_error() {
    let mut ctx = context();
    let texture = white(&mut ctx);
    let mut sprites = SpriteBatch::new(ctx.backend_mut(), 4).unwrap();
    let mut shapes = ShapeRenderer::new(ctx.backend_mut(), 4).unwrap();
    let mut rects = RoundedRectBatch::new(ctx.backend_mut(), 4).unwrap();

    let err = sprites.draw(&mut ctx, &texture, 0.0, 0.0, 1.0, 1.0).unwrap_err();
    assert!(matches!(err, GfxError::Protocol(_)));
    assert!(matches!(shapes.rect(0.0, 0.0, 1.0, 1.0), Err(GfxError::Protocol(_))));
    assert!(matches!(rects.draw(0.0, 0.0, 1.0, 1.0, 0.5), Err(GfxError::Protocol(_))));
    assert!(matches!(sprites.end(&mut ctx), Err(GfxError::Protocol(_))));
}

#[test]
fn double_begin_fails_without_opening_a_pass() {
    let mut ctx = context();
    let mut sprites = SpriteBatch::new(ctx.backend_mut(), 4).unwrap();
    let encoder = frame(&mut ctx);
    sprites.begin(&mut ctx, &encoder, None).unwrap();
    let passes = count(&ctx, |c| matches!(c, Command::BeginRenderPass { .. }));

    let err = sprites.begin(&mut ctx, &encoder, None).unwrap_err();
    assert!(matches!(err, GfxError::Protocol(_)));
    assert_eq!(count(&ctx, |c| matches!(c, Command::BeginRenderPass { .. })), passes);

    sprites.end(&mut ctx).unwrap();
    ctx.end_frame(encoder).unwrap();
}

#[test]
fn empty_batch_writes_and_draws_nothing() {
    let mut ctx = context();
    let mut shapes = ShapeRenderer::new(ctx.backend_mut(), 4).unwrap();
    let encoder = frame(&mut ctx);
    shapes.begin(&mut ctx, &encoder, None).unwrap();
    ctx.backend_mut().clear_commands();

    shapes.end(&mut ctx).unwrap();
    assert_eq!(count(&ctx, |c| matches!(c, Command::WriteBuffer { .. })), 0);
    assert_eq!(count(&ctx, |c| matches!(c, Command::DrawIndexed { .. })), 0);
    assert_eq!(shapes.stats(), BatchStats::default());
    ctx.end_frame(encoder).unwrap();
}

#[test]
fn full_batch_is_one_write_and_one_draw() {
    let mut ctx = context();
    let texture = white(&mut ctx);
    let mut sprites = SpriteBatch::new(ctx.backend_mut(), 4).unwrap();
    let encoder = frame(&mut ctx);
    sprites.begin(&mut ctx, &encoder, Some(Color::GRAY)).unwrap();
    ctx.backend_mut().clear_commands();

    for i in 0..4 {
        sprites.draw(&mut ctx, &texture, i as f32 * 10.0, 0.0, 8.0, 8.0).unwrap();
    }
    let err = sprites.draw(&mut ctx, &texture, 50.0, 0.0, 8.0, 8.0).unwrap_err();
    assert!(matches!(err, GfxError::Capacity { .. }));
    sprites.end(&mut ctx).unwrap();

    // position, uv and color: 8 floats per vertex
    let vertex_bytes = 4 * 4 * 8 * 4;
    let writes: Vec<u64> = ctx
        .backend()
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::WriteBuffer { len, .. } => Some(*len),
            _ => None,
        })
        .collect();
    assert_eq!(writes, vec![vertex_bytes]);

    let draws: Vec<_> = ctx
        .backend()
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::DrawIndexed { indices, .. } => Some(indices.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(draws, vec![0..24]);
    assert_eq!(sprites.stats(), BatchStats { draw_calls: 1, max_batch_size: 4 });
    assert_eq!(ctx.backend().live_bind_groups(), 0);
    ctx.end_frame(encoder).unwrap();
}

#[test]
fn vertex_offsets_grow_within_a_frame_and_reset_on_begin() {
    let mut ctx = context();
    let mut shapes = ShapeRenderer::new(ctx.backend_mut(), 16).unwrap();

    let encoder = frame(&mut ctx);
    shapes.begin(&mut ctx, &encoder, None).unwrap();
    for i in 0..3 {
        shapes.rect(i as f32, 0.0, 1.0, 1.0).unwrap();
        shapes.flush(&mut ctx).unwrap();
    }
    shapes.end(&mut ctx).unwrap();
    ctx.end_frame(encoder).unwrap();

    let quad_bytes = 4 * 6 * 4;
    assert_eq!(vertex_buffer_offsets(&ctx), vec![0, quad_bytes, 2 * quad_bytes]);
    assert_eq!(shapes.vertex_offset(), 3 * quad_bytes);

    ctx.backend_mut().clear_commands();
    let encoder = frame(&mut ctx);
    shapes.begin(&mut ctx, &encoder, None).unwrap();
    assert_eq!(shapes.vertex_offset(), 0);
    shapes.rect(0.0, 0.0, 1.0, 1.0).unwrap();
    shapes.end(&mut ctx).unwrap();
    ctx.end_frame(encoder).unwrap();
    assert_eq!(vertex_buffer_offsets(&ctx), vec![0]);
}

#[test]
fn frame_total_is_bounded_by_the_vertex_buffer() {
    let mut ctx = context();
    let mut shapes = ShapeRenderer::new(ctx.backend_mut(), 2).unwrap();
    let encoder = frame(&mut ctx);
    shapes.begin(&mut ctx, &encoder, None).unwrap();
    shapes.rect(0.0, 0.0, 1.0, 1.0).unwrap();
    shapes.flush(&mut ctx).unwrap();
    shapes.rect(0.0, 0.0, 1.0, 1.0).unwrap();
    shapes.flush(&mut ctx).unwrap();

    let err = shapes.rect(0.0, 0.0, 1.0, 1.0).unwrap_err();
    assert!(matches!(err, GfxError::Capacity { what: "batch vertex buffer", .. }));
    shapes.end(&mut ctx).unwrap();
    ctx.end_frame(encoder).unwrap();
}

#[test]
fn pipeline_is_rebound_only_when_state_changes() {
    let mut ctx = context();
    let mut shapes = ShapeRenderer::new(ctx.backend_mut(), 16).unwrap();
    let encoder = frame(&mut ctx);
    shapes.begin(&mut ctx, &encoder, None).unwrap();
    shapes.rect(0.0, 0.0, 1.0, 1.0).unwrap();
    shapes.enable_blending(&mut ctx).unwrap();
    shapes.rect(0.0, 0.0, 1.0, 1.0).unwrap();
    shapes.disable_blending(&mut ctx).unwrap();
    shapes.rect(0.0, 0.0, 1.0, 1.0).unwrap();
    shapes.enable_blending(&mut ctx).unwrap();
    shapes.end(&mut ctx).unwrap();
    ctx.end_frame(encoder).unwrap();

    assert_eq!(count(&ctx, |c| matches!(c, Command::SetPipeline { .. })), 3);
    assert_eq!(count(&ctx, |c| matches!(c, Command::CreateRenderPipeline { .. })), 2);
    assert_eq!(shapes.stats().draw_calls, 3);
}

#[test]
fn projection_changes_use_fresh_uniform_slices() {
    let mut ctx = context();
    let mut rects = RoundedRectBatch::new(ctx.backend_mut(), 8).unwrap();
    let encoder = frame(&mut ctx);
    rects.begin(&mut ctx, &encoder, None).unwrap();
    rects.draw(0.0, 0.0, 10.0, 10.0, 2.0).unwrap();
    rects.set_projection_matrix(&mut ctx, glam::Mat4::IDENTITY).unwrap();
    rects.draw(0.0, 0.0, 10.0, 10.0, 2.0).unwrap();
    rects.end(&mut ctx).unwrap();
    ctx.end_frame(encoder).unwrap();

    let uniform_offsets: Vec<u64> = ctx
        .backend()
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::WriteBuffer { offset, len: 64, .. } => Some(*offset),
            _ => None,
        })
        .collect();
    assert_eq!(uniform_offsets, vec![0, 256]);
    assert_eq!(rects.stats().draw_calls, 2);
}

#[test]
fn batches_share_a_frame() {
    let mut ctx = context();
    let texture = white(&mut ctx);
    let mut sprites = SpriteBatch::new(ctx.backend_mut(), 4).unwrap();
    let mut shapes = ShapeRenderer::new(ctx.backend_mut(), 4).unwrap();

    let encoder = frame(&mut ctx);
    sprites.begin(&mut ctx, &encoder, None).unwrap();
    sprites.draw(&mut ctx, &texture, 0.0, 0.0, 4.0, 4.0).unwrap();
    sprites.end(&mut ctx).unwrap();
    shapes.begin(&mut ctx, &encoder, None).unwrap();
    shapes.line(0.0, 0.0, 10.0, 10.0).unwrap();
    shapes.end(&mut ctx).unwrap();
    ctx.end_frame(encoder).unwrap();

    assert_eq!(count(&ctx, |c| matches!(c, Command::BeginRenderPass { .. })), 2);
    assert_eq!(count(&ctx, |c| matches!(c, Command::DrawIndexed { .. })), 2);
    assert_eq!(count(&ctx, |c| matches!(c, Command::Present)), 1);
}
