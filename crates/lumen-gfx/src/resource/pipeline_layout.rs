use super::BindGroupLayout;
use crate::backend::{GpuBackend, PipelineLayoutId};
use crate::error::GfxResult;

/// Ordered set of bind group layouts used by a pipeline.
#[derive(Debug)]
pub struct PipelineLayout {
    id: PipelineLayoutId,
}

impl PipelineLayout {
    pub fn new<B: GpuBackend>(
        backend: &mut B,
        label: &str,
        bind_group_layouts: &[&BindGroupLayout],
    ) -> GfxResult<Self> {
        let ids: Vec<_> = bind_group_layouts.iter().map(|l| l.id()).collect();
        Ok(Self {
            id: backend.create_pipeline_layout(label, &ids)?,
        })
    }

    pub fn id(&self) -> PipelineLayoutId {
        self.id
    }

    pub fn dispose<B: GpuBackend>(self, backend: &mut B) {
        backend.release_pipeline_layout(self.id);
    }
}
