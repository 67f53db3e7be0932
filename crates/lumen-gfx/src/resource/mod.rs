//! Thin wrappers around device resources.
//!
//! Each wrapper owns one backend handle and is released by consuming it with
//! `dispose`, so a released handle cannot be used again.

mod bind_group;
mod buffer;
mod index_buffer;
mod pipeline_layout;
mod texture;
mod uniform_buffer;
mod vertex_buffer;

pub use bind_group::{BindGroup, BindGroupLayout, BindGroupLayoutBuilder};
pub use buffer::{align_to, Buffer};
pub use index_buffer::{IndexBuffer, IndexWidth};
pub use pipeline_layout::PipelineLayout;
pub use texture::Texture;
pub use uniform_buffer::UniformBuffer;
pub use vertex_buffer::VertexBuffer;
