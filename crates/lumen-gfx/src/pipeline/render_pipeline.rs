use super::{PipelineSpecification, ShaderProgram, ShaderRef, shader_prefix};
use crate::backend::{DepthStencilDesc, GpuBackend, PipelineId, PipelineLayoutId, RenderPipelineDesc};
use crate::error::{GfxError, GfxResult};

const VERTEX_ENTRY: &str = "vs_main";
const FRAGMENT_ENTRY: &str = "fs_main";

/// Shader used by a pipeline: compiled by the pipeline itself or supplied by the caller.
#[derive(Debug)]
pub enum PipelineShader {
    Owned(ShaderProgram),
    Borrowed(ShaderRef),
}

impl PipelineShader {
    pub fn handle(&self) -> ShaderRef {
        match self {
            PipelineShader::Owned(program) => program.handle(),
            PipelineShader::Borrowed(shader) => *shader,
        }
    }
}

/// A native render pipeline and the specification it was built from.
#[derive(Debug)]
pub struct Pipeline {
    id: PipelineId,
    spec: PipelineSpecification,
    shader: PipelineShader,
}

impl Pipeline {
    pub fn new<B: GpuBackend>(
        backend: &mut B,
        layout: PipelineLayoutId,
        spec: &PipelineSpecification,
    ) -> GfxResult<Self> {
        let shader = match (spec.shader, &spec.shader_source) {
            (Some(shader), _) => PipelineShader::Borrowed(shader),
            (None, Some(source)) => {
                let prefix = shader_prefix(&spec.vertex_attributes);
                PipelineShader::Owned(ShaderProgram::from_source(backend, source, &prefix)?)
            }
            (None, None) => {
                return Err(GfxError::validation(format!(
                    "pipeline '{}' has neither a shader nor shader source",
                    spec.name
                )));
            }
        };

        let attributes = spec.vertex_attributes.wgpu_attributes();
        let desc = RenderPipelineDesc {
            label: &spec.name,
            layout,
            shader: shader.handle().id(),
            vertex_entry: VERTEX_ENTRY,
            fragment_entry: FRAGMENT_ENTRY,
            vertex_stride: spec.vertex_attributes.stride(),
            vertex_attributes: &attributes,
            blend: spec.blend_state(),
            cull_mode: spec.cull_mode,
            color_format: spec.color_format,
            depth_stencil: spec.depth_format.map(|format| DepthStencilDesc {
                format,
                depth_write_enabled: spec.depth_test,
                compare: spec.depth_compare(),
            }),
            sample_count: spec.sample_count,
        };

        match backend.create_render_pipeline(&desc) {
            Ok(id) => {
                log::debug!("pipeline '{}' created", spec.name);
                Ok(Self {
                    id,
                    spec: spec.clone(),
                    shader,
                })
            }
            Err(e) => {
                if let PipelineShader::Owned(program) = shader {
                    program.dispose(backend);
                }
                Err(e)
            }
        }
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    pub fn spec(&self) -> &PipelineSpecification {
        &self.spec
    }

    pub fn shader(&self) -> &PipelineShader {
        &self.shader
    }

    /// Releases the pipeline and, if it compiled its own shader, that shader too.
    pub fn dispose<B: GpuBackend>(self, backend: &mut B) {
        backend.release_render_pipeline(self.id);
        if let PipelineShader::Owned(program) = self.shader {
            program.dispose(backend);
        }
    }
}
