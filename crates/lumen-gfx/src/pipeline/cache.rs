use super::{Pipeline, PipelineSpecification};
use crate::backend::{GpuBackend, PipelineLayoutId};
use crate::error::GfxResult;

/// Pipelines keyed by specification.
///
/// Lookups scan linearly for an equal specification; misses build and append.
/// Entries are never evicted. A cache serves one pipeline layout.
#[derive(Debug, Default)]
pub struct PipelineCache {
    pipelines: Vec<Pipeline>,
    layout: Option<PipelineLayoutId>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pipeline for `spec`, creating it on first request.
    pub fn get<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        layout: PipelineLayoutId,
        spec: &PipelineSpecification,
    ) -> GfxResult<&Pipeline> {
        debug_assert!(
            self.layout.is_none_or(|l| l == layout),
            "pipeline cache used with more than one layout"
        );
        self.layout = Some(layout);

        if let Some(i) = self.pipelines.iter().position(|p| p.spec() == spec) {
            return Ok(&self.pipelines[i]);
        }

        log::debug!("pipeline cache miss for '{}' ({} cached)", spec.name, self.pipelines.len());
        let pipeline = Pipeline::new(backend, layout, spec)?;
        self.pipelines.push(pipeline);
        let last = self.pipelines.len() - 1;
        Ok(&self.pipelines[last])
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Disposes every cached pipeline; later lookups rebuild on demand.
    pub fn clear<B: GpuBackend>(&mut self, backend: &mut B) {
        for pipeline in self.pipelines.drain(..) {
            pipeline.dispose(backend);
        }
        self.layout = None;
    }

    pub fn dispose<B: GpuBackend>(mut self, backend: &mut B) {
        self.clear(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::pipeline::{ShaderSource, VertexAttributes, VertexUsage};
    use crate::resource::{BindGroupLayout, PipelineLayout};

    #[test]
    fn clear_releases_and_allows_rebuild() {
        let mut backend = RecordingBackend::new();
        let bgl = BindGroupLayout::builder("bgl").build(&mut backend).unwrap();
        let layout = PipelineLayout::new(&mut backend, "layout", &[&bgl]).unwrap();
        let spec = PipelineSpecification::new(
            "p",
            VertexAttributes::from_usages(&[VertexUsage::Position2d]),
        )
        .with_source(ShaderSource::new("s", "fn vs_main() {}\nfn fs_main() {}\n"));

        let mut cache = PipelineCache::new();
        cache.get(&mut backend, layout.id(), &spec).unwrap();
        cache.clear(&mut backend);
        assert!(cache.is_empty());
        assert_eq!(backend.live_pipelines(), 0);
        assert_eq!(backend.live_shaders(), 0);

        cache.get(&mut backend, layout.id(), &spec).unwrap();
        assert_eq!(cache.len(), 1);
        cache.dispose(&mut backend);
        assert_eq!(backend.live_pipelines(), 0);
    }
}
