use std::num::NonZeroU64;

use super::{Buffer, UniformBuffer};
use crate::backend::{
    BindGroupEntry, BindGroupId, BindGroupLayoutId, BindingResource, GpuBackend, SamplerId,
    TextureViewId,
};
use crate::error::{GfxError, GfxResult};

/// Bind group layout: the binding slots a shader expects.
#[derive(Debug)]
pub struct BindGroupLayout {
    id: BindGroupLayoutId,
    label: String,
    entries: Vec<wgpu::BindGroupLayoutEntry>,
}

impl BindGroupLayout {
    pub fn builder(label: &str) -> BindGroupLayoutBuilder {
        BindGroupLayoutBuilder {
            label: label.to_owned(),
            entries: Vec::new(),
        }
    }

    pub fn id(&self) -> BindGroupLayoutId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn entries(&self) -> &[wgpu::BindGroupLayoutEntry] {
        &self.entries
    }

    pub fn dispose<B: GpuBackend>(self, backend: &mut B) {
        backend.release_bind_group_layout(self.id);
    }
}

/// Collects layout entries, then creates the layout with [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct BindGroupLayoutBuilder {
    label: String,
    entries: Vec<wgpu::BindGroupLayoutEntry>,
}

impl BindGroupLayoutBuilder {
    pub fn uniform_buffer(
        self,
        binding: u32,
        visibility: wgpu::ShaderStages,
        min_binding_size: u64,
        has_dynamic_offset: bool,
    ) -> Self {
        self.entry(
            binding,
            visibility,
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset,
                min_binding_size: NonZeroU64::new(min_binding_size),
            },
        )
    }

    pub fn storage_buffer(self, binding: u32, visibility: wgpu::ShaderStages, read_only: bool) -> Self {
        self.entry(
            binding,
            visibility,
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        )
    }

    pub fn texture(
        self,
        binding: u32,
        visibility: wgpu::ShaderStages,
        sample_type: wgpu::TextureSampleType,
        view_dimension: wgpu::TextureViewDimension,
        multisampled: bool,
    ) -> Self {
        self.entry(
            binding,
            visibility,
            wgpu::BindingType::Texture {
                sample_type,
                view_dimension,
                multisampled,
            },
        )
    }

    pub fn sampler(
        self,
        binding: u32,
        visibility: wgpu::ShaderStages,
        ty: wgpu::SamplerBindingType,
    ) -> Self {
        self.entry(binding, visibility, wgpu::BindingType::Sampler(ty))
    }

    fn entry(mut self, binding: u32, visibility: wgpu::ShaderStages, ty: wgpu::BindingType) -> Self {
        self.entries.push(wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty,
            count: None,
        });
        self
    }

    pub fn build<B: GpuBackend>(self, backend: &mut B) -> GfxResult<BindGroupLayout> {
        let id = backend.create_bind_group_layout(&self.label, &self.entries)?;
        Ok(BindGroupLayout {
            id,
            label: self.label,
            entries: self.entries,
        })
    }
}

/// Bind group assembled entry by entry.
///
/// `begin` starts a new entry list, the `add_*` calls fill it, and `end`
/// creates the native group. The handle is only available after `end`.
#[derive(Debug)]
pub struct BindGroup {
    label: String,
    layout: BindGroupLayoutId,
    /// Layout bindings, sorted.
    expected: Vec<u32>,
    entries: Vec<BindGroupEntry>,
    handle: Option<BindGroupId>,
    /// Previous handle, released by the next `end` or `dispose`.
    retired: Option<BindGroupId>,
    building: bool,
}

impl BindGroup {
    pub fn new(label: &str, layout: &BindGroupLayout) -> Self {
        Self {
            label: label.to_owned(),
            layout: layout.id(),
            expected: sorted_bindings(layout.entries().iter().map(|e| e.binding)),
            entries: Vec::with_capacity(layout.entries().len()),
            handle: None,
            retired: None,
            building: false,
        }
    }

    pub fn begin(&mut self) -> &mut Self {
        self.entries.clear();
        if let Some(old) = self.handle.take() {
            self.retired = Some(old);
        }
        self.building = true;
        self
    }

    /// Binds `size` bytes of `buffer` starting at `offset`.
    pub fn add_buffer(&mut self, binding: u32, buffer: &Buffer, offset: u64, size: u64) -> &mut Self {
        self.push(
            binding,
            BindingResource::Buffer {
                buffer: buffer.id(),
                offset,
                size: Some(size),
            },
        )
    }

    pub fn add_whole_buffer(&mut self, binding: u32, buffer: &Buffer) -> &mut Self {
        self.push(
            binding,
            BindingResource::Buffer {
                buffer: buffer.id(),
                offset: 0,
                size: None,
            },
        )
    }

    /// Binds one slice of a uniform buffer.
    pub fn add_uniform(&mut self, binding: u32, uniforms: &UniformBuffer, slice: u32) -> &mut Self {
        self.push(binding, uniforms.binding(slice))
    }

    pub fn add_texture(&mut self, binding: u32, view: TextureViewId) -> &mut Self {
        self.push(binding, BindingResource::TextureView(view))
    }

    pub fn add_sampler(&mut self, binding: u32, sampler: SamplerId) -> &mut Self {
        self.push(binding, BindingResource::Sampler(sampler))
    }

    fn push(&mut self, binding: u32, resource: BindingResource) -> &mut Self {
        self.entries.push(BindGroupEntry { binding, resource });
        self
    }

    /// Creates the native bind group from the collected entries.
    pub fn end<B: GpuBackend>(&mut self, backend: &mut B) -> GfxResult<BindGroupId> {
        if let Some(old) = self.retired.take() {
            backend.release_bind_group(old);
        }
        let bindings = sorted_bindings(self.entries.iter().map(|e| e.binding));
        if bindings != self.expected {
            return Err(GfxError::validation(format!(
                "bind group '{}' binds {:?}, layout declares {:?}",
                self.label, bindings, self.expected
            )));
        }
        let id = backend.create_bind_group(&self.label, self.layout, &self.entries)?;
        self.handle = Some(id);
        self.building = false;
        Ok(id)
    }

    pub fn handle(&self) -> GfxResult<BindGroupId> {
        match self.handle {
            Some(id) if !self.building => Ok(id),
            _ => Err(GfxError::Protocol("bind group handle requested before end()")),
        }
    }

    pub fn dispose<B: GpuBackend>(self, backend: &mut B) {
        for id in self.handle.into_iter().chain(self.retired) {
            backend.release_bind_group(id);
        }
    }
}

fn sorted_bindings(bindings: impl Iterator<Item = u32>) -> Vec<u32> {
    let mut out: Vec<u32> = bindings.collect();
    out.sort_unstable();
    out
}
