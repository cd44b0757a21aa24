//! Interleaved, re-encodable vertex storage.

use glam::{Vec2, Vec3, Vec4};

use super::vertex_format::{
    VertexAttribute, VertexAttributeDescriptor, VertexAttributeFormat, VertexFormat,
};
use super::MeshError;
use crate::color::Color;

/// A CPU value type that can be stored in a vertex attribute.
///
/// Values travel through a canonical four-component form, which lets any value type be
/// written into any [`VertexAttributeFormat`].
pub trait VertexValue: Copy {
    fn to_components(self) -> [f32; 4];
    fn from_components(c: [f32; 4]) -> Self;
}

impl VertexValue for Vec2 {
    fn to_components(self) -> [f32; 4] {
        [self.x, self.y, 0.0, 1.0]
    }

    fn from_components(c: [f32; 4]) -> Self {
        Vec2::new(c[0], c[1])
    }
}

impl VertexValue for Vec3 {
    fn to_components(self) -> [f32; 4] {
        [self.x, self.y, self.z, 1.0]
    }

    fn from_components(c: [f32; 4]) -> Self {
        Vec3::new(c[0], c[1], c[2])
    }
}

impl VertexValue for Vec4 {
    fn to_components(self) -> [f32; 4] {
        self.to_array()
    }

    fn from_components(c: [f32; 4]) -> Self {
        Vec4::from_array(c)
    }
}

impl VertexValue for Color {
    fn to_components(self) -> [f32; 4] {
        self.to_array()
    }

    fn from_components(c: [f32; 4]) -> Self {
        Color::from(c)
    }
}

/// Byte blob plus the [`VertexFormat`] describing it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexBuffer {
    data: Vec<u8>,
    format: VertexFormat,
    num_verts: usize,
}

impl VertexBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_verts(&self) -> usize {
        self.num_verts
    }

    pub fn format(&self) -> &VertexFormat {
        &self.format
    }

    pub fn stride(&self) -> usize {
        self.format.stride()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn has_attribute(&self, attribute: VertexAttribute) -> bool {
        self.format.contains(attribute)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Resize to `num_verts` vertices laid out as `format`.
    ///
    /// Attributes present in both the old and the new format are re-encoded into the new
    /// layout; anything else is zero-filled.
    pub fn set_params(&mut self, num_verts: usize, format: VertexFormat) {
        if num_verts == self.num_verts && format == self.format {
            return;
        }

        let mut data = vec![0u8; num_verts * format.stride()];
        let kept = num_verts.min(self.num_verts);
        for new_layout in format.attributes() {
            let Some(old_layout) = self.format.layout(new_layout.attribute) else {
                continue;
            };
            for i in 0..kept {
                let src_start = i * self.format.stride() + old_layout.offset;
                let src = &self.data[src_start..src_start + old_layout.format.size()];
                let value = old_layout.format.decode(src);

                let dst_start = i * format.stride() + new_layout.offset;
                let dst = &mut data[dst_start..dst_start + new_layout.format.size()];
                new_layout.format.encode(value, dst);
            }
        }

        self.data = data;
        self.num_verts = if format.is_empty() { 0 } else { num_verts };
        self.format = format;
    }

    /// Re-encode the existing vertices into `format`.
    pub fn reformat(&mut self, format: VertexFormat) {
        self.set_params(self.num_verts, format);
    }

    /// Replace the raw bytes. The size must match `num_verts * stride` exactly.
    pub fn set_data(&mut self, bytes: &[u8]) -> Result<(), MeshError> {
        let expected = self.num_verts * self.stride();
        if bytes.len() != expected {
            return Err(MeshError::BufferSizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        self.data.copy_from_slice(bytes);
        Ok(())
    }

    /// Decode every value of `attribute`. Empty when the attribute is absent.
    pub fn read<T: VertexValue>(&self, attribute: VertexAttribute) -> Vec<T> {
        let Some(layout) = self.format.layout(attribute) else {
            return Vec::new();
        };
        let stride = self.stride();
        (0..self.num_verts)
            .map(|i| {
                let start = i * stride + layout.offset;
                let bytes = &self.data[start..start + layout.format.size()];
                T::from_components(layout.format.decode(bytes))
            })
            .collect()
    }

    /// Decode one vertex's value of `attribute`.
    pub fn read_at<T: VertexValue>(&self, attribute: VertexAttribute, index: usize) -> Option<T> {
        let layout = self.format.layout(attribute)?;
        if index >= self.num_verts {
            return None;
        }
        let start = index * self.stride() + layout.offset;
        let bytes = &self.data[start..start + layout.format.size()];
        Some(T::from_components(layout.format.decode(bytes)))
    }

    /// Write every value of `attribute`.
    ///
    /// - An empty slice removes the attribute. Removing `Position` clears the buffer.
    /// - Non-`Position` writes are ignored unless `Position` exists and the value count
    ///   equals the vertex count.
    /// - A new attribute, or a `Position` write with a new count, reformats the buffer.
    ///
    /// Returns whether the buffer changed.
    pub fn write<T: VertexValue>(&mut self, attribute: VertexAttribute, values: &[T]) -> bool {
        if values.is_empty() {
            return self.remove_attribute(attribute);
        }

        if attribute != VertexAttribute::Position
            && (!self.has_attribute(VertexAttribute::Position) || values.len() != self.num_verts)
        {
            log::debug!(
                "Ignoring {} write of {} values: buffer has {} vertices{}",
                attribute,
                values.len(),
                self.num_verts,
                if self.has_attribute(VertexAttribute::Position) {
                    ""
                } else {
                    " and no positions"
                }
            );
            return false;
        }

        if !self.has_attribute(attribute) || values.len() != self.num_verts {
            let format = match self.format.layout(attribute) {
                Some(_) => self.format.clone(),
                None => self.format.with_attribute(VertexAttributeDescriptor::new(
                    attribute,
                    attribute.default_format(),
                )),
            };
            self.set_params(values.len(), format);
        }

        self.encode_values(attribute, values);
        true
    }

    /// Apply `f` to every value of `attribute` in place.
    pub fn transform<T, F>(&mut self, attribute: VertexAttribute, mut f: F)
    where
        T: VertexValue,
        F: FnMut(T) -> T,
    {
        let values: Vec<T> = self.read::<T>(attribute).into_iter().map(&mut f).collect();
        if !values.is_empty() {
            self.encode_values(attribute, &values);
        }
    }

    fn remove_attribute(&mut self, attribute: VertexAttribute) -> bool {
        if !self.has_attribute(attribute) {
            return false;
        }
        if attribute == VertexAttribute::Position {
            self.clear();
        } else {
            let format = self.format.without_attribute(attribute);
            self.set_params(self.num_verts, format);
        }
        true
    }

    fn encode_values<T: VertexValue>(&mut self, attribute: VertexAttribute, values: &[T]) {
        let Some(layout) = self.format.layout(attribute).copied() else {
            return;
        };
        let stride = self.stride();
        for (i, value) in values.iter().enumerate().take(self.num_verts) {
            let start = i * stride + layout.offset;
            let dst = &mut self.data[start..start + layout.format.size()];
            layout.format.encode(value.to_components(), dst);
        }
    }

    /// Encoding currently used for `attribute`.
    pub fn attribute_format(&self, attribute: VertexAttribute) -> Option<VertexAttributeFormat> {
        self.format.layout(attribute).map(|l| l.format)
    }
}
