//! Surface configuration helpers.

/// Picks the surface format, preferring sRGB variants when requested.
///
/// Returns `None` if the surface reports no formats.
pub fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    if prefer_srgb {
        let preferred = [
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ];
        if let Some(f) = preferred.into_iter().find(|f| caps.formats.contains(f)) {
            return Some(f);
        }
    }

    caps.formats.first().copied()
}

/// Maps the vsync flag to a present mode, falling back to `Fifo` (always
/// supported) when `Immediate` is unavailable.
pub fn present_mode_for(caps: &wgpu::SurfaceCapabilities, vsync: bool) -> wgpu::PresentMode {
    if vsync {
        return wgpu::PresentMode::Fifo;
    }
    if caps.present_modes.contains(&wgpu::PresentMode::Immediate) {
        wgpu::PresentMode::Immediate
    } else {
        log::warn!("immediate present mode unsupported; using fifo");
        wgpu::PresentMode::Fifo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(formats: Vec<wgpu::TextureFormat>, modes: Vec<wgpu::PresentMode>) -> wgpu::SurfaceCapabilities {
        wgpu::SurfaceCapabilities {
            formats,
            present_modes: modes,
            alpha_modes: vec![wgpu::CompositeAlphaMode::Opaque],
            usages: wgpu::TextureUsages::RENDER_ATTACHMENT,
        }
    }

    #[test]
    fn srgb_is_preferred_when_listed() {
        let c = caps(
            vec![wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Bgra8UnormSrgb],
            vec![wgpu::PresentMode::Fifo],
        );
        assert_eq!(choose_surface_format(&c, true), Some(wgpu::TextureFormat::Bgra8UnormSrgb));
        assert_eq!(choose_surface_format(&c, false), Some(wgpu::TextureFormat::Bgra8Unorm));
    }

    #[test]
    fn empty_format_list_yields_none() {
        let c = caps(vec![], vec![wgpu::PresentMode::Fifo]);
        assert_eq!(choose_surface_format(&c, true), None);
    }

    #[test]
    fn vsync_off_falls_back_to_fifo() {
        let c = caps(vec![wgpu::TextureFormat::Rgba8Unorm], vec![wgpu::PresentMode::Fifo]);
        assert_eq!(present_mode_for(&c, false), wgpu::PresentMode::Fifo);

        let c = caps(
            vec![wgpu::TextureFormat::Rgba8Unorm],
            vec![wgpu::PresentMode::Fifo, wgpu::PresentMode::Immediate],
        );
        assert_eq!(present_mode_for(&c, false), wgpu::PresentMode::Immediate);
        assert_eq!(present_mode_for(&c, true), wgpu::PresentMode::Fifo);
    }
}
