//! Device and surface ownership for the wgpu backend.

mod gpu;
mod init;
mod surface;

pub use gpu::{Gpu, SurfaceErrorAction};
pub use init::GpuInit;
pub use surface::{choose_surface_format, present_mode_for};
