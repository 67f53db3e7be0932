use std::sync::Arc;

use super::{Preprocessor, VertexAttributes, VertexUsage};
use crate::backend::{GpuBackend, ShaderId};
use crate::error::GfxResult;

/// Named WGSL source text. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderSource {
    pub name: Arc<str>,
    pub code: Arc<str>,
}

impl ShaderSource {
    pub fn new(name: &str, code: &str) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
        }
    }
}

/// Copyable reference to a compiled [`ShaderProgram`], compared by identity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ShaderRef(ShaderId);

impl ShaderRef {
    pub fn id(self) -> ShaderId {
        self.0
    }
}

/// Compiled shader module built from preprocessed WGSL.
#[derive(Debug)]
pub struct ShaderProgram {
    name: String,
    id: ShaderId,
}

impl ShaderProgram {
    /// Preprocesses `prefix` followed by `source` and compiles the result.
    pub fn new<B: GpuBackend>(
        backend: &mut B,
        name: &str,
        source: &str,
        prefix: &str,
    ) -> GfxResult<Self> {
        let mut full = String::with_capacity(prefix.len() + source.len());
        full.push_str(prefix);
        full.push_str(source);
        let wgsl = Preprocessor::new().process(&full)?;
        let id = backend.create_shader_module(name, &wgsl)?;
        log::debug!("shader '{name}' compiled ({} bytes of WGSL)", wgsl.len());
        Ok(Self {
            name: name.to_owned(),
            id,
        })
    }

    pub fn from_source<B: GpuBackend>(
        backend: &mut B,
        source: &ShaderSource,
        prefix: &str,
    ) -> GfxResult<Self> {
        Self::new(backend, &source.name, &source.code, prefix)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> ShaderRef {
        ShaderRef(self.id)
    }

    pub fn dispose<B: GpuBackend>(self, backend: &mut B) {
        backend.release_shader_module(self.id);
    }
}

/// `#define` lines describing which optional vertex inputs a layout provides.
pub fn shader_prefix(attributes: &VertexAttributes) -> String {
    let mut prefix = String::new();
    if attributes.has_usage(VertexUsage::TextureCoordinate) {
        prefix.push_str("#define TEXTURE_COORDINATE\n");
    }
    if attributes.has_usage(VertexUsage::Color) || attributes.has_usage(VertexUsage::ColorPacked) {
        prefix.push_str("#define COLOR\n");
    }
    if attributes.has_usage(VertexUsage::Normal) {
        prefix.push_str("#define NORMAL\n");
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn prefix_reflects_vertex_usages() {
        let attrs = VertexAttributes::from_usages(&[VertexUsage::Position2d, VertexUsage::Color]);
        assert_eq!(shader_prefix(&attrs), "#define COLOR\n");
        let attrs = VertexAttributes::from_usages(&[
            VertexUsage::Position,
            VertexUsage::TextureCoordinate,
            VertexUsage::Normal,
        ]);
        assert_eq!(shader_prefix(&attrs), "#define TEXTURE_COORDINATE\n#define NORMAL\n");
    }

    #[test]
    fn programs_compile_and_release() {
        let mut backend = RecordingBackend::new();
        let program = ShaderProgram::new(
            &mut backend,
            "flat",
            "#ifdef COLOR\nfn vs_main() {}\n#endif\n",
            "#define COLOR\n",
        )
        .unwrap();
        assert_eq!(backend.live_shaders(), 1);
        program.dispose(&mut backend);
        assert_eq!(backend.live_shaders(), 0);
    }

    #[test]
    fn fully_excluded_source_is_rejected() {
        let mut backend = RecordingBackend::new();
        let result = ShaderProgram::new(&mut backend, "empty", "#ifdef COLOR\nfn vs_main() {}\n#endif\n", "");
        assert!(result.is_err());
    }
}
