use crate::backend::{
    GpuBackend, SamplerDesc, SamplerId, TextureDesc, TextureId, TextureViewDesc, TextureViewId,
};
use crate::error::{GfxError, GfxResult};

/// A texture together with its default view and, for sampled textures, a sampler.
///
/// Textures compare by identity of the native texture.
#[derive(Debug)]
pub struct Texture {
    label: String,
    texture: TextureId,
    view: TextureViewId,
    sampler: Option<SamplerId>,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    sample_count: u32,
}

impl PartialEq for Texture {
    fn eq(&self, other: &Self) -> bool {
        self.texture == other.texture
    }
}

impl Eq for Texture {}

impl Texture {
    /// Uploads tightly packed RGBA8 pixels into a sampled sRGB texture.
    pub fn from_rgba8<B: GpuBackend>(
        backend: &mut B,
        label: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> GfxResult<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(GfxError::validation(format!(
                "texture '{label}': expected {expected} bytes of RGBA8, got {}",
                pixels.len()
            )));
        }
        let texture = Self::create(
            backend,
            label,
            width,
            height,
            wgpu::TextureFormat::Rgba8UnormSrgb,
            1,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            wgpu::TextureAspect::All,
            true,
        )?;
        backend.write_texture(texture.texture, pixels, width * 4, width, height)?;
        Ok(texture)
    }

    /// Off-screen color target. Single-sampled targets can also be sampled.
    pub fn render_target<B: GpuBackend>(
        backend: &mut B,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        sample_count: u32,
    ) -> GfxResult<Self> {
        let sampled = sample_count == 1;
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if sampled {
            usage |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        Self::create(
            backend,
            label,
            width,
            height,
            format,
            sample_count,
            usage,
            wgpu::TextureAspect::All,
            sampled,
        )
    }

    /// Depth attachment; the view covers the depth aspect only.
    pub fn depth<B: GpuBackend>(
        backend: &mut B,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        sample_count: u32,
    ) -> GfxResult<Self> {
        if !format.is_depth_stencil_format() {
            return Err(GfxError::validation(format!("{format:?} is not a depth format")));
        }
        Self::create(
            backend,
            label,
            width,
            height,
            format,
            sample_count,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
            wgpu::TextureAspect::DepthOnly,
            false,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn create<B: GpuBackend>(
        backend: &mut B,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        sample_count: u32,
        usage: wgpu::TextureUsages,
        aspect: wgpu::TextureAspect,
        with_sampler: bool,
    ) -> GfxResult<Self> {
        let texture = backend.create_texture(&TextureDesc {
            label,
            width,
            height,
            mip_level_count: 1,
            sample_count,
            format,
            usage,
        })?;
        let view = match backend.create_texture_view(texture, &TextureViewDesc { label, aspect }) {
            Ok(view) => view,
            Err(e) => {
                backend.destroy_texture(texture);
                return Err(e);
            }
        };
        let sampler = if with_sampler {
            let desc = SamplerDesc {
                label,
                filter: wgpu::FilterMode::Linear,
                address_mode: wgpu::AddressMode::ClampToEdge,
            };
            Some(backend.create_sampler(&desc)?)
        } else {
            None
        };
        log::debug!("texture '{label}' created ({width}x{height}, {format:?}, x{sample_count})");

        Ok(Self {
            label: label.to_owned(),
            texture,
            view,
            sampler,
            format,
            width,
            height,
            sample_count,
        })
    }

    pub fn id(&self) -> TextureId {
        self.texture
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn view(&self) -> TextureViewId {
        self.view
    }

    pub fn sampler(&self) -> Option<SamplerId> {
        self.sampler
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn dispose<B: GpuBackend>(self, backend: &mut B) {
        if let Some(sampler) = self.sampler {
            backend.release_sampler(sampler);
        }
        backend.release_texture_view(self.view);
        backend.destroy_texture(self.texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn rgba8_upload_checks_pixel_count() {
        let mut backend = RecordingBackend::new();
        assert!(Texture::from_rgba8(&mut backend, "t", 2, 2, &[0; 15]).is_err());
        let t = Texture::from_rgba8(&mut backend, "t", 2, 2, &[255; 16]).unwrap();
        assert!(t.sampler().is_some());
        assert_eq!(t.format(), wgpu::TextureFormat::Rgba8UnormSrgb);
    }

    #[test]
    fn depth_requires_depth_format() {
        let mut backend = RecordingBackend::new();
        let fmt = wgpu::TextureFormat::Rgba8Unorm;
        assert!(Texture::depth(&mut backend, "d", 4, 4, fmt, 1).is_err());
        let d = Texture::depth(&mut backend, "d", 4, 4, wgpu::TextureFormat::Depth24Plus, 4).unwrap();
        assert!(d.sampler().is_none());
        assert_eq!(d.sample_count(), 4);
    }

    #[test]
    fn dispose_releases_everything() {
        let mut backend = RecordingBackend::new();
        let t = Texture::from_rgba8(&mut backend, "t", 1, 1, &[0; 4]).unwrap();
        t.dispose(&mut backend);
        assert_eq!(backend.live_textures(), 0);
        assert_eq!(backend.live_views(), 0);
    }
}
