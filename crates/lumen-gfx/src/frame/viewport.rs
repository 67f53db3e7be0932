use glam::Mat4;

use super::RenderPass;
use crate::backend::GpuBackend;
use crate::error::{GfxError, GfxResult};

/// How the world area maps onto the screen.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ViewportMode {
    /// World size follows the screen size, one unit per pixel.
    Screen,
    /// Fixed world size stretched over the whole screen.
    Stretch,
    /// Fixed world size scaled uniformly to fit, letterboxed and centered.
    Fit,
    /// Fixed world size scaled uniformly to cover the screen. Bounds are
    /// clipped to the screen, so the overflow is lost rather than cropped.
    Fill,
}

/// Screen rectangle a pass renders into, plus the world size shown in it.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    mode: ViewportMode,
    world_width: f32,
    world_height: f32,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

impl Viewport {
    pub fn new(mode: ViewportMode, world_width: f32, world_height: f32) -> Self {
        Self {
            mode,
            world_width,
            world_height,
            x: 0.0,
            y: 0.0,
            width: world_width,
            height: world_height,
        }
    }

    pub fn screen() -> Self {
        Self::new(ViewportMode::Screen, 0.0, 0.0)
    }

    pub fn mode(&self) -> ViewportMode {
        self.mode
    }

    /// Recomputes the screen bounds for a new drawable size.
    pub fn update(&mut self, screen_width: u32, screen_height: u32) {
        let sw = screen_width as f32;
        let sh = screen_height as f32;
        match self.mode {
            ViewportMode::Screen => {
                self.world_width = sw;
                self.world_height = sh;
                self.set_screen_bounds(0.0, 0.0, sw, sh);
            }
            ViewportMode::Stretch => self.set_screen_bounds(0.0, 0.0, sw, sh),
            ViewportMode::Fit | ViewportMode::Fill => {
                if self.world_width <= 0.0 || self.world_height <= 0.0 || sw <= 0.0 {
                    self.set_screen_bounds(0.0, 0.0, sw, sh);
                    return;
                }
                let target_ratio = sh / sw;
                let source_ratio = self.world_height / self.world_width;
                let width_limited = if self.mode == ViewportMode::Fit {
                    target_ratio > source_ratio
                } else {
                    target_ratio < source_ratio
                };
                let scale = if width_limited {
                    sw / self.world_width
                } else {
                    sh / self.world_height
                };
                let w = (scale * self.world_width).floor();
                let h = (scale * self.world_height).floor();
                let x = ((sw - w) / 2.0).floor();
                let y = ((sh - h) / 2.0).floor();
                self.set_screen_bounds(x.max(0.0), y.max(0.0), w.min(sw), h.min(sh));
            }
        }
    }

    pub fn set_screen_bounds(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.x = x;
        self.y = y;
        self.width = width;
        self.height = height;
    }

    /// `(x, y, width, height)` in physical pixels.
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        (self.x, self.y, self.width, self.height)
    }

    pub fn world_size(&self) -> (f32, f32) {
        (self.world_width, self.world_height)
    }

    /// Orthographic projection with the origin at the bottom-left of the world.
    pub fn projection(&self) -> Mat4 {
        Mat4::orthographic_rh(0.0, self.world_width, 0.0, self.world_height, -1.0, 1.0)
    }

    /// Sets the pass viewport. Bounds outside the pass target are an error.
    pub fn apply<B: GpuBackend>(&self, pass: &RenderPass, backend: &mut B) -> GfxResult<()> {
        let (tw, th) = (pass.width() as f32, pass.height() as f32);
        if self.x < 0.0 || self.y < 0.0 || self.x + self.width > tw || self.y + self.height > th {
            return Err(GfxError::validation(format!(
                "viewport ({}, {}, {}, {}) exceeds {}x{} render target",
                self.x, self.y, self.width, self.height, tw, th
            )));
        }
        backend.set_viewport(pass.id(), self.x, self.y, self.width, self.height, 0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_tracks_the_drawable() {
        let mut v = Viewport::screen();
        v.update(640, 480);
        assert_eq!(v.world_size(), (640.0, 480.0));
        assert_eq!(v.bounds(), (0.0, 0.0, 640.0, 480.0));
    }

    #[test]
    fn fit_letterboxes_and_centers() {
        let mut v = Viewport::new(ViewportMode::Fit, 100.0, 100.0);
        v.update(800, 600);
        assert_eq!(v.bounds(), (100.0, 0.0, 600.0, 600.0));
        v.update(600, 800);
        assert_eq!(v.bounds(), (0.0, 100.0, 600.0, 600.0));
    }

    #[test]
    fn fill_is_clipped_to_the_screen() {
        let mut v = Viewport::new(ViewportMode::Fill, 100.0, 100.0);
        v.update(800, 600);
        assert_eq!(v.bounds(), (0.0, 0.0, 800.0, 600.0));
    }

    #[test]
    fn stretch_keeps_world_size() {
        let mut v = Viewport::new(ViewportMode::Stretch, 320.0, 240.0);
        v.update(1024, 512);
        assert_eq!(v.world_size(), (320.0, 240.0));
        assert_eq!(v.bounds(), (0.0, 0.0, 1024.0, 512.0));
    }

    #[test]
    fn projection_maps_world_corners() {
        let v = Viewport::new(ViewportMode::Stretch, 200.0, 100.0);
        let p = v.projection();
        let top_right = p.project_point3(glam::Vec3::new(200.0, 100.0, 0.0));
        assert!((top_right.x - 1.0).abs() < 1e-6 && (top_right.y - 1.0).abs() < 1e-6);
    }
}
