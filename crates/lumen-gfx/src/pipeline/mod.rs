//! Pipeline specification, shader programs, and the pipeline cache.
//!
//! A [`PipelineSpecification`] is a value type describing the fixed-function
//! state of a render pipeline. [`PipelineCache`] resolves equal specifications
//! to the same native pipeline, building new ones on first use.

mod cache;
mod preprocess;
mod render_pipeline;
mod shader;
mod spec;
mod vertex;

pub use cache::PipelineCache;
pub use preprocess::Preprocessor;
pub use render_pipeline::{Pipeline, PipelineShader};
pub use shader::{ShaderProgram, ShaderRef, ShaderSource, shader_prefix};
pub use spec::{BlendMode, PipelineSpecification};
pub use vertex::{VertexAttribute, VertexAttributes, VertexUsage};
