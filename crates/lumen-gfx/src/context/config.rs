use crate::paint::Color;

/// Settings for a [`GraphicsContext`](super::GraphicsContext).
#[derive(Debug, Clone, Copy)]
pub struct GfxConfig {
    /// MSAA sample count for passes targeting the surface (1 or 4).
    pub sample_count: u32,
    pub enable_gpu_timing: bool,
    pub depth_format: wgpu::TextureFormat,
    /// Used by the first surface pass of a frame that does not request a clear color.
    pub clear_color: Color,
}

impl Default for GfxConfig {
    fn default() -> Self {
        Self {
            sample_count: 1,
            enable_gpu_timing: false,
            depth_format: wgpu::TextureFormat::Depth24Plus,
            clear_color: Color::BLACK,
        }
    }
}
