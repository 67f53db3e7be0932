/// Semantic role of a vertex attribute.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VertexUsage {
    Position,
    Position2d,
    Color,
    ColorPacked,
    TextureCoordinate,
    Normal,
    Tangent,
    Bitangent,
    /// Attribute with no predefined meaning (per-quad parameters and the like).
    Custom,
}

impl VertexUsage {
    pub const fn bit(self) -> u32 {
        match self {
            VertexUsage::Position => 1,
            VertexUsage::Color => 1 << 1,
            VertexUsage::TextureCoordinate => 1 << 2,
            VertexUsage::Normal => 1 << 3,
            VertexUsage::Tangent => 1 << 4,
            VertexUsage::Bitangent => 1 << 5,
            VertexUsage::Position2d => 1 << 6,
            VertexUsage::ColorPacked => 1 << 7,
            VertexUsage::Custom => 1 << 8,
        }
    }

    /// Default label, format and shader location for the usage.
    fn standard(self) -> (&'static str, wgpu::VertexFormat, u32) {
        match self {
            VertexUsage::Position => ("position", wgpu::VertexFormat::Float32x3, 0),
            VertexUsage::Position2d => ("position", wgpu::VertexFormat::Float32x2, 0),
            VertexUsage::TextureCoordinate => ("uv", wgpu::VertexFormat::Float32x2, 1),
            VertexUsage::Normal => ("normal", wgpu::VertexFormat::Float32x3, 2),
            VertexUsage::Tangent => ("tangent", wgpu::VertexFormat::Float32x3, 3),
            VertexUsage::Bitangent => ("bitangent", wgpu::VertexFormat::Float32x3, 4),
            VertexUsage::Color => ("color", wgpu::VertexFormat::Float32x4, 5),
            VertexUsage::ColorPacked => ("color", wgpu::VertexFormat::Unorm8x4, 5),
            VertexUsage::Custom => ("custom", wgpu::VertexFormat::Float32x4, 6),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub usage: VertexUsage,
    pub label: String,
    pub format: wgpu::VertexFormat,
    pub shader_location: u32,
}

/// Ordered, tightly packed vertex layout.
///
/// Attribute offsets follow declaration order; the stride is the sum of the
/// attribute sizes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexAttributes {
    attributes: Vec<VertexAttribute>,
    usage_flags: u32,
}

impl VertexAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layout made of the standard attribute for each usage, in the given order.
    pub fn from_usages(usages: &[VertexUsage]) -> Self {
        usages.iter().fold(Self::new(), |attrs, &usage| {
            let (label, format, location) = usage.standard();
            attrs.with(usage, label, format, location)
        })
    }

    pub fn with(
        mut self,
        usage: VertexUsage,
        label: &str,
        format: wgpu::VertexFormat,
        shader_location: u32,
    ) -> Self {
        self.add(usage, label, format, shader_location);
        self
    }

    pub fn add(
        &mut self,
        usage: VertexUsage,
        label: &str,
        format: wgpu::VertexFormat,
        shader_location: u32,
    ) {
        self.usage_flags |= usage.bit();
        self.attributes.push(VertexAttribute {
            usage,
            label: label.to_owned(),
            format,
            shader_location,
        });
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// Vertex size in bytes.
    pub fn stride(&self) -> u64 {
        self.attributes.iter().map(|a| a.format.size()).sum()
    }

    /// Vertex size in `f32` units, for CPU arenas.
    pub fn floats_per_vertex(&self) -> usize {
        (self.stride() / 4) as usize
    }

    pub fn usage_flags(&self) -> u32 {
        self.usage_flags
    }

    pub fn has_usage(&self, usage: VertexUsage) -> bool {
        self.usage_flags & usage.bit() != 0
    }

    /// Byte offset of the first attribute with `usage`.
    pub fn offset_of(&self, usage: VertexUsage) -> Option<u64> {
        let mut offset = 0;
        for attr in &self.attributes {
            if attr.usage == usage {
                return Some(offset);
            }
            offset += attr.format.size();
        }
        None
    }

    pub fn wgpu_attributes(&self) -> Vec<wgpu::VertexAttribute> {
        let mut offset = 0;
        self.attributes
            .iter()
            .map(|a| {
                let attr = wgpu::VertexAttribute {
                    format: a.format,
                    offset,
                    shader_location: a.shader_location,
                };
                offset += a.format.size();
                attr
            })
            .collect()
    }
}
