use crate::backend::GpuBackend;
use crate::error::GfxResult;
use crate::resource::Texture;

/// Default attachments sized to the surface.
#[derive(Debug)]
pub(crate) struct DefaultTargets {
    pub depth: Texture,
    /// Multisampled color target resolved into the surface; present when sample_count > 1.
    pub msaa: Option<Texture>,
}

impl DefaultTargets {
    pub fn new<B: GpuBackend>(
        backend: &mut B,
        width: u32,
        height: u32,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
        sample_count: u32,
    ) -> GfxResult<Self> {
        let depth = Texture::depth(backend, "default depth", width, height, depth_format, sample_count)?;
        let msaa = if sample_count > 1 {
            match Texture::render_target(backend, "default msaa color", width, height, color_format, sample_count) {
                Ok(t) => Some(t),
                Err(e) => {
                    depth.dispose(backend);
                    return Err(e);
                }
            }
        } else {
            None
        };
        log::debug!("default targets rebuilt at {width}x{height} (x{sample_count})");
        Ok(Self { depth, msaa })
    }

    pub fn dispose<B: GpuBackend>(self, backend: &mut B) {
        self.depth.dispose(backend);
        if let Some(msaa) = self.msaa {
            msaa.dispose(backend);
        }
    }
}
