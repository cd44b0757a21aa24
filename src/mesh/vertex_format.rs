//! Vertex attribute semantics, encodings and packed layouts.

use std::fmt;

use super::MeshError;

/// Semantic meaning of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexAttribute {
    Position,
    Normal,
    TexCoord0,
    Color,
    Tangent,
}

impl VertexAttribute {
    pub const ALL: [VertexAttribute; 5] = [
        VertexAttribute::Position,
        VertexAttribute::Normal,
        VertexAttribute::TexCoord0,
        VertexAttribute::Color,
        VertexAttribute::Tangent,
    ];

    /// Encoding used when the attribute is first written through a typed setter.
    pub fn default_format(self) -> VertexAttributeFormat {
        match self {
            VertexAttribute::Position => VertexAttributeFormat::Float32x3,
            VertexAttribute::Normal => VertexAttributeFormat::Float32x3,
            VertexAttribute::TexCoord0 => VertexAttributeFormat::Float32x2,
            VertexAttribute::Color => VertexAttributeFormat::Float32x4,
            VertexAttribute::Tangent => VertexAttributeFormat::Float32x4,
        }
    }
}

impl fmt::Display for VertexAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VertexAttribute::Position => "Position",
            VertexAttribute::Normal => "Normal",
            VertexAttribute::TexCoord0 => "TexCoord0",
            VertexAttribute::Color => "Color",
            VertexAttribute::Tangent => "Tangent",
        };
        f.write_str(name)
    }
}

/// Byte encoding of one vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttributeFormat {
    Float32x2,
    Float32x3,
    Float32x4,
    /// Four unsigned bytes, normalized to `[0, 1]`.
    Unorm8x4,
}

impl VertexAttributeFormat {
    pub fn component_count(self) -> usize {
        match self {
            VertexAttributeFormat::Float32x2 => 2,
            VertexAttributeFormat::Float32x3 => 3,
            VertexAttributeFormat::Float32x4 | VertexAttributeFormat::Unorm8x4 => 4,
        }
    }

    /// Size in bytes of one encoded value.
    pub fn size(self) -> usize {
        match self {
            VertexAttributeFormat::Float32x2 => 8,
            VertexAttributeFormat::Float32x3 => 12,
            VertexAttributeFormat::Float32x4 => 16,
            VertexAttributeFormat::Unorm8x4 => 4,
        }
    }

    /// Encode the leading components of `value` into `out`.
    ///
    /// `out` must be exactly [`size`](Self::size) bytes long.
    pub fn encode(self, value: [f32; 4], out: &mut [u8]) {
        debug_assert_eq!(out.len(), self.size());
        match self {
            VertexAttributeFormat::Unorm8x4 => {
                for (byte, v) in out.iter_mut().zip(value) {
                    *byte = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
                }
            }
            _ => {
                for (chunk, v) in out.chunks_exact_mut(4).zip(value) {
                    chunk.copy_from_slice(&v.to_le_bytes());
                }
            }
        }
    }

    /// Decode one value. Components the format does not store come back as `(0, 0, 0, 1)`.
    pub fn decode(self, bytes: &[u8]) -> [f32; 4] {
        debug_assert_eq!(bytes.len(), self.size());
        let mut out = [0.0, 0.0, 0.0, 1.0];
        match self {
            VertexAttributeFormat::Unorm8x4 => {
                for (o, b) in out.iter_mut().zip(bytes) {
                    *o = *b as f32 / 255.0;
                }
            }
            _ => {
                for (o, chunk) in out.iter_mut().zip(bytes.chunks_exact(4)) {
                    *o = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                }
            }
        }
        out
    }
}

/// An (attribute, encoding) pair used to build a [`VertexFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttributeDescriptor {
    pub attribute: VertexAttribute,
    pub format: VertexAttributeFormat,
}

impl VertexAttributeDescriptor {
    pub fn new(attribute: VertexAttribute, format: VertexAttributeFormat) -> Self {
        Self { attribute, format }
    }
}

/// Placement of one attribute inside an interleaved vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttributeLayout {
    pub attribute: VertexAttribute,
    pub format: VertexAttributeFormat,
    pub offset: usize,
}

/// Ordered set of interleaved vertex attributes.
///
/// A format is immutable: adding or removing attributes yields a new format.
/// `Position`, when present, is always the first attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexFormat {
    attributes: Vec<VertexAttributeLayout>,
    stride: usize,
}

impl VertexFormat {
    /// Build a format from descriptors in layout order.
    pub fn new<I>(descriptors: I) -> Result<Self, MeshError>
    where
        I: IntoIterator<Item = VertexAttributeDescriptor>,
    {
        let mut attributes: Vec<VertexAttributeLayout> = Vec::new();
        let mut offset = 0;
        for desc in descriptors {
            if attributes.iter().any(|a| a.attribute == desc.attribute) {
                return Err(MeshError::InvalidVertexFormat(format!(
                    "attribute {} appears more than once",
                    desc.attribute
                )));
            }
            attributes.push(VertexAttributeLayout {
                attribute: desc.attribute,
                format: desc.format,
                offset,
            });
            offset += desc.format.size();
        }

        if let Some(first) = attributes.first() {
            if first.attribute != VertexAttribute::Position {
                return Err(MeshError::InvalidVertexFormat(
                    "the first attribute must be Position".into(),
                ));
            }
        }

        Ok(Self {
            attributes,
            stride: offset,
        })
    }

    /// Size in bytes of one interleaved vertex.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn attributes(&self) -> &[VertexAttributeLayout] {
        &self.attributes
    }

    pub fn contains(&self, attribute: VertexAttribute) -> bool {
        self.layout(attribute).is_some()
    }

    pub fn layout(&self, attribute: VertexAttribute) -> Option<&VertexAttributeLayout> {
        self.attributes.iter().find(|a| a.attribute == attribute)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = VertexAttributeDescriptor> + '_ {
        self.attributes
            .iter()
            .map(|a| VertexAttributeDescriptor::new(a.attribute, a.format))
    }

    /// Copy of this format with `desc` appended, or its encoding replaced in place when
    /// the attribute already exists.
    pub(crate) fn with_attribute(&self, desc: VertexAttributeDescriptor) -> VertexFormat {
        let mut descs: Vec<_> = self.descriptors().collect();
        match descs.iter_mut().find(|d| d.attribute == desc.attribute) {
            Some(existing) => existing.format = desc.format,
            None if desc.attribute == VertexAttribute::Position => descs.insert(0, desc),
            None => descs.push(desc),
        }
        Self::from_valid(descs)
    }

    /// Copy of this format without `attribute`.
    pub(crate) fn without_attribute(&self, attribute: VertexAttribute) -> VertexFormat {
        Self::from_valid(self.descriptors().filter(|d| d.attribute != attribute))
    }

    fn from_valid<I: IntoIterator<Item = VertexAttributeDescriptor>>(descs: I) -> VertexFormat {
        let mut attributes = Vec::new();
        let mut offset = 0;
        for desc in descs {
            attributes.push(VertexAttributeLayout {
                attribute: desc.attribute,
                format: desc.format,
                offset,
            });
            offset += desc.format.size();
        }
        Self {
            attributes,
            stride: offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(attribute: VertexAttribute, format: VertexAttributeFormat) -> VertexAttributeDescriptor {
        VertexAttributeDescriptor::new(attribute, format)
    }

    #[test]
    fn test_offsets_and_stride() {
        let format = VertexFormat::new([
            desc(VertexAttribute::Position, VertexAttributeFormat::Float32x3),
            desc(VertexAttribute::Color, VertexAttributeFormat::Unorm8x4),
            desc(VertexAttribute::TexCoord0, VertexAttributeFormat::Float32x2),
        ])
        .unwrap();

        assert_eq!(format.stride(), 24);
        assert_eq!(format.layout(VertexAttribute::Color).unwrap().offset, 12);
        assert_eq!(format.layout(VertexAttribute::TexCoord0).unwrap().offset, 16);
        assert!(!format.contains(VertexAttribute::Normal));
    }

    #[test]
    fn test_rejects_duplicates_and_missing_leading_position() {
        let dup = VertexFormat::new([
            desc(VertexAttribute::Position, VertexAttributeFormat::Float32x3),
            desc(VertexAttribute::Position, VertexAttributeFormat::Float32x2),
        ]);
        assert!(dup.is_err());

        let no_position = VertexFormat::new([desc(
            VertexAttribute::Normal,
            VertexAttributeFormat::Float32x3,
        )]);
        assert!(no_position.is_err());
    }

    #[test]
    fn test_with_and_without_attribute() {
        let format = VertexFormat::new([desc(
            VertexAttribute::Position,
            VertexAttributeFormat::Float32x3,
        )])
        .unwrap();

        let with_normal = format.with_attribute(desc(
            VertexAttribute::Normal,
            VertexAttributeFormat::Float32x3,
        ));
        assert_eq!(with_normal.stride(), 24);
        assert_eq!(format.stride(), 12);

        let reencoded = with_normal.with_attribute(desc(
            VertexAttribute::Normal,
            VertexAttributeFormat::Unorm8x4,
        ));
        assert_eq!(reencoded.stride(), 16);

        let stripped = reencoded.without_attribute(VertexAttribute::Normal);
        assert_eq!(stripped, format);
    }

    #[test]
    fn test_unorm8_encoding_clamps() {
        let mut bytes = [0u8; 4];
        VertexAttributeFormat::Unorm8x4.encode([-1.0, 0.5, 1.0, 2.0], &mut bytes);
        assert_eq!(bytes, [0, 128, 255, 255]);
        let decoded = VertexAttributeFormat::Unorm8x4.decode(&bytes);
        assert!((decoded[1] - 0.5).abs() <= 1.0 / 255.0);
    }

    #[test]
    fn test_float_decode_fills_missing_components() {
        let mut bytes = [0u8; 8];
        VertexAttributeFormat::Float32x2.encode([1.5, -2.0, 9.0, 9.0], &mut bytes);
        assert_eq!(
            VertexAttributeFormat::Float32x2.decode(&bytes),
            [1.5, -2.0, 0.0, 1.0]
        );
    }
}
