//! Per-frame command recording: encoders, render passes, viewports.

mod encoder;
mod render_pass;
mod viewport;

pub use encoder::{CommandBuffer, CommandEncoder};
pub use render_pass::{RenderPass, RenderPassBuilder, RenderPassType};
pub use viewport::{Viewport, ViewportMode};
