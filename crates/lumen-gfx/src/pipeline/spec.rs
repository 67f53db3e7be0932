use std::hash::{Hash, Hasher};

use super::{ShaderRef, ShaderSource, VertexAttributes};

/// Common blend configurations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Straight alpha: src-alpha / one-minus-src-alpha on color, destination alpha kept.
    Alpha,
    /// Colors already multiplied by alpha.
    Premultiplied,
    Additive,
    /// Overwrite the target.
    Replace,
}

impl BlendMode {
    pub fn state(self) -> wgpu::BlendState {
        match self {
            BlendMode::Alpha => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::Zero,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            },
            BlendMode::Premultiplied => wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
            BlendMode::Additive => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::Zero,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            },
            BlendMode::Replace => wgpu::BlendState::REPLACE,
        }
    }
}

/// Value description of a render pipeline, used as the pipeline cache key.
///
/// Equality and hashing cover every field except `name`, which is only a
/// debug label. The shader is compared by identity, source text by value.
#[derive(Debug, Clone)]
pub struct PipelineSpecification {
    pub name: String,
    pub vertex_attributes: VertexAttributes,
    /// Caller-owned shader. When `None`, the pipeline compiles `shader_source` itself.
    pub shader: Option<ShaderRef>,
    pub shader_source: Option<ShaderSource>,
    pub depth_test: bool,
    pub blend: wgpu::BlendState,
    pub blending: bool,
    pub cull_mode: Option<wgpu::Face>,
    /// `None` for depth-only pipelines.
    pub color_format: Option<wgpu::TextureFormat>,
    /// `None` for pipelines used in passes without a depth attachment.
    pub depth_format: Option<wgpu::TextureFormat>,
    pub sample_count: u32,
}

impl PipelineSpecification {
    /// Depth testing and alpha blending on, no culling, single-sampled.
    pub fn new(name: &str, vertex_attributes: VertexAttributes) -> Self {
        Self {
            name: name.to_owned(),
            vertex_attributes,
            shader: None,
            shader_source: None,
            depth_test: true,
            blend: BlendMode::Alpha.state(),
            blending: true,
            cull_mode: None,
            color_format: Some(wgpu::TextureFormat::Bgra8UnormSrgb),
            depth_format: Some(wgpu::TextureFormat::Depth24Plus),
            sample_count: 1,
        }
    }

    pub fn with_shader(mut self, shader: ShaderRef) -> Self {
        self.shader = Some(shader);
        self
    }

    pub fn with_source(mut self, source: ShaderSource) -> Self {
        self.shader_source = Some(source);
        self
    }

    pub fn enable_blending(&mut self) {
        self.set_blend_mode(BlendMode::Alpha);
    }

    pub fn disable_blending(&mut self) {
        self.blend = BlendMode::Replace.state();
        self.blending = false;
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend = mode.state();
        self.blending = mode != BlendMode::Replace;
    }

    pub fn enable_depth(&mut self) {
        self.depth_test = true;
    }

    pub fn disable_depth(&mut self) {
        self.depth_test = false;
    }

    pub fn set_cull_mode(&mut self, cull_mode: Option<wgpu::Face>) {
        self.cull_mode = cull_mode;
    }

    /// Blend state handed to the pipeline; `None` writes colors unblended.
    pub fn blend_state(&self) -> Option<wgpu::BlendState> {
        self.blending.then_some(self.blend)
    }

    pub fn depth_compare(&self) -> wgpu::CompareFunction {
        if self.depth_test {
            wgpu::CompareFunction::Less
        } else {
            wgpu::CompareFunction::Always
        }
    }

    #[allow(clippy::type_complexity)]
    fn key(
        &self,
    ) -> (
        &VertexAttributes,
        Option<ShaderRef>,
        Option<&ShaderSource>,
        bool,
        Option<wgpu::BlendState>,
        Option<wgpu::Face>,
        Option<wgpu::TextureFormat>,
        Option<wgpu::TextureFormat>,
        u32,
    ) {
        (
            &self.vertex_attributes,
            self.shader,
            self.shader_source.as_ref(),
            self.depth_test,
            self.blend_state(),
            self.cull_mode,
            self.color_format,
            self.depth_format,
            self.sample_count,
        )
    }
}

impl PartialEq for PipelineSpecification {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for PipelineSpecification {}

impl Hash for PipelineSpecification {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::VertexUsage;

    fn base() -> PipelineSpecification {
        let attrs = VertexAttributes::from_usages(&[VertexUsage::Position2d, VertexUsage::Color]);
        PipelineSpecification::new("a", attrs).with_source(ShaderSource::new("s", "fn vs_main() {}"))
    }

    #[test]
    fn name_does_not_participate_in_equality() {
        let a = base();
        let mut b = base();
        b.name = "b".into();
        assert_eq!(a, b);
    }

    #[test]
    fn every_state_field_distinguishes() {
        let a = base();
        let variants: Vec<Box<dyn Fn(&mut PipelineSpecification)>> = vec![
            Box::new(|s| s.disable_blending()),
            Box::new(|s| s.set_cull_mode(Some(wgpu::Face::Back))),
            Box::new(|s| s.disable_depth()),
            Box::new(|s| s.sample_count = 4),
            Box::new(|s| s.color_format = Some(wgpu::TextureFormat::Rgba8Unorm)),
            Box::new(|s| s.depth_format = None),
            Box::new(|s| s.set_blend_mode(BlendMode::Additive)),
        ];
        for change in variants {
            let mut b = base();
            change(&mut b);
            assert_ne!(a, b);
        }
    }

    #[test]
    fn blending_presets() {
        let mut s = base();
        assert!(s.blend_state().is_some());
        s.disable_blending();
        assert_eq!(s.blend_state(), None);
        s.enable_blending();
        let blend = s.blend_state().unwrap();
        assert_eq!(blend.color.src_factor, wgpu::BlendFactor::SrcAlpha);
        assert_eq!(blend.alpha.dst_factor, wgpu::BlendFactor::One);
    }
}
