//! Error taxonomy for the graphics layer.
//!
//! Protocol and capacity errors are programming errors in the caller; the
//! renderers surface them immediately instead of degrading. Device errors come
//! from the native layer and are not retried.

/// Errors produced by the graphics layer.
#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    /// An API was called in the wrong order (e.g. `draw` before `begin`).
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// A fixed-size resource would be overrun.
    #[error("{what} capacity exceeded: requested {requested}, capacity {capacity}")]
    Capacity {
        what: &'static str,
        requested: u64,
        capacity: u64,
    },

    /// A descriptor or argument was rejected before reaching the device.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The native layer failed to create or use an object.
    #[error("device error: {0}")]
    Device(String),

    /// No drawable could be acquired for this frame.
    #[error("surface unavailable: {0}")]
    Surface(String),

    /// A handle was used after release, or never belonged to this backend.
    #[error("stale or unknown {0} handle")]
    InvalidHandle(&'static str),
}

pub type GfxResult<T> = Result<T, GfxError>;

impl GfxError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        GfxError::Validation(msg.into())
    }

    /// Returns true for errors caused by caller misuse rather than the device.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            GfxError::Protocol(_) | GfxError::Capacity { .. } | GfxError::Validation(_)
        )
    }
}
