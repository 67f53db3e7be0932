use glam::Vec2;

use lumen_gfx::backend::GpuBackend;
use lumen_gfx::batch::{BatchStats, RoundedRectBatch, ShapeRenderer, SpriteBatch};
use lumen_gfx::frame::{CommandEncoder, Viewport, ViewportMode};
use lumen_gfx::resource::Texture;
use lumen_gfx::{Color, GfxResult, GraphicsContext};

const WORLD: Vec2 = Vec2::new(1280.0, 720.0);
const SPRITE_COUNT: usize = 200;
const CHECKER_SIZE: u32 = 8;

/// Draw statistics of the last frame, one entry per batcher.
#[derive(Debug, Copy, Clone)]
pub struct SceneStats {
    pub sprites: BatchStats,
    pub shapes: BatchStats,
    pub rects: BatchStats,
}

/// Animated content exercising all three batchers.
pub struct Scene {
    sprites: SpriteBatch,
    shapes: ShapeRenderer,
    rects: RoundedRectBatch,
    checker: Texture,
}

impl Scene {
    pub fn new<B: GpuBackend>(gfx: &mut GraphicsContext<B>) -> GfxResult<Self> {
        gfx.set_viewport(Some(Viewport::new(ViewportMode::Fit, WORLD.x, WORLD.y)));

        let backend = gfx.backend_mut();
        let checker = Texture::from_rgba8(
            backend,
            "checker",
            CHECKER_SIZE,
            CHECKER_SIZE,
            &checker_pixels(CHECKER_SIZE),
        )?;
        Ok(Self {
            sprites: SpriteBatch::new(backend, SPRITE_COUNT)?,
            shapes: ShapeRenderer::new(backend, ShapeRenderer::DEFAULT_CAPACITY)?,
            rects: RoundedRectBatch::new(backend, RoundedRectBatch::DEFAULT_CAPACITY)?,
            checker,
        })
    }

    pub fn draw<B: GpuBackend>(
        &mut self,
        gfx: &mut GraphicsContext<B>,
        encoder: &CommandEncoder,
        t: f32,
    ) -> GfxResult<()> {
        self.rects.begin(gfx, encoder, None)?;
        self.rects.set_drop_shadow(6.0, -6.0);
        for i in 0..4 {
            let x = 80.0 + i as f32 * 290.0;
            self.rects.set_color(Color::rgb(0.25 + 0.15 * i as f32, 0.35, 0.6));
            self.rects.draw(x, 420.0, 240.0, 200.0, 12.0 + 8.0 * i as f32)?;
        }
        self.rects.end(gfx)?;

        self.sprites.begin(gfx, encoder, None)?;
        for i in 0..SPRITE_COUNT {
            let phase = i as f32 * 0.31 + t;
            let pos = Vec2::new(
                WORLD.x * 0.5 + (phase * 0.7).cos() * (120.0 + i as f32 * 2.0),
                WORLD.y * 0.3 + (phase * 1.3).sin() * 150.0,
            );
            let shade = 0.5 + 0.5 * (phase * 2.0).sin();
            self.sprites.set_color(Color::rgba(1.0, shade, 1.0 - shade, 0.85));
            self.sprites.draw(gfx, &self.checker, pos.x, pos.y, 24.0, 24.0)?;
        }
        self.sprites.end(gfx)?;

        self.shapes.begin(gfx, encoder, None)?;
        self.shapes.set_color(Color::GRAY);
        self.shapes.set_line_width(2.0);
        self.shapes.box_outline(20.0, 20.0, WORLD.x - 22.0, WORLD.y - 22.0)?;
        self.shapes.set_color(Color::GREEN);
        let tip = Vec2::new(WORLD.x * 0.5, 380.0) + Vec2::new(t.cos(), t.sin()) * 60.0;
        self.shapes.line(WORLD.x * 0.5, 380.0, tip.x, tip.y)?;
        self.shapes.set_color(Color::RED);
        self.shapes.triangle(100.0, 60.0, 180.0, 60.0, 140.0, 130.0)?;
        self.shapes.rect(WORLD.x - 160.0, 60.0, 80.0, 40.0 + 30.0 * t.sin().abs())?;
        self.shapes.end(gfx)
    }

    pub fn stats(&self) -> SceneStats {
        SceneStats {
            sprites: self.sprites.stats(),
            shapes: self.shapes.stats(),
            rects: self.rects.stats(),
        }
    }

    pub fn dispose<B: GpuBackend>(self, backend: &mut B) {
        self.sprites.dispose(backend);
        self.shapes.dispose(backend);
        self.rects.dispose(backend);
        self.checker.dispose(backend);
    }
}

fn checker_pixels(size: u32) -> Vec<u8> {
    (0..size * size)
        .flat_map(|i| {
            let (x, y) = (i % size, i / size);
            if (x + y) % 2 == 0 { [255, 255, 255, 255] } else { [96, 96, 96, 255] }
        })
        .collect()
}
