//! Immediate-mode 2D batch renderers.
//!
//! All batchers follow the same protocol: `begin` opens a render pass,
//! `draw`-style calls append quads to a CPU arena, `flush` uploads the arena at
//! an advancing offset into a fixed-size vertex buffer and records one indexed
//! draw, and `end` flushes and closes the pass. Offsets reset at `begin`.
//!
//! Each batcher is meant to run one `begin`/`end` bracket per frame. Queue
//! writes land before the frame's command buffer executes, so a second bracket
//! in the same frame would overwrite vertices the first one still draws from.
//! Use separate batchers for separate passes.

mod common;
mod rounded_rect;
mod shape;
mod sprite;

pub use common::{BatchStats, MAX_QUADS, quad_indices};
pub use rounded_rect::RoundedRectBatch;
pub use shape::ShapeRenderer;
pub use sprite::SpriteBatch;
