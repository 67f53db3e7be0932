//! Lumen graphics crate.
//!
//! A thin CPU-side layer over wgpu: pipeline specification and caching, resource
//! wrappers, render pass and frame orchestration, GPU timing, and immediate-mode
//! 2D batch renderers. All native calls go through the [`backend::GpuBackend`]
//! seam so the orchestration logic can be exercised without a GPU.

pub mod backend;
pub mod batch;
pub mod context;
pub mod device;
pub mod error;
pub mod frame;
pub mod logging;
pub mod paint;
pub mod pipeline;
pub mod resource;
pub mod timing;

pub use context::{GfxConfig, GraphicsContext};
pub use error::{GfxError, GfxResult};
pub use paint::Color;
