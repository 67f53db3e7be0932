//! GPU frame timing through timestamp queries.

mod gpu_timing;

pub use gpu_timing::{GpuTiming, TimingState};
