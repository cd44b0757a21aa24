use std::sync::Arc;

use glam::UVec2;

use crate::cow::ResourceId;
use crate::texture::ColorSpace;

/// Whether a render texture is a flat image or a cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimensionality {
    #[default]
    Tex2D,
    Cube,
}

/// Samples per pixel. Always a power of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AntiAliasingLevel(u32);

impl AntiAliasingLevel {
    pub const NONE: Self = Self(1);

    /// Round `samples` down to a power of two, minimum one.
    pub fn new(samples: u32) -> Self {
        if samples <= 1 {
            Self::NONE
        } else {
            Self(1 << (31 - samples.leading_zeros()))
        }
    }

    pub fn samples(self) -> u32 {
        self.0
    }

    pub fn is_multisampled(self) -> bool {
        self.0 > 1
    }
}

impl Default for AntiAliasingLevel {
    fn default() -> Self {
        Self::NONE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderTextureFormat {
    #[default]
    Rgba8,
    Red8,
    RgbaFloat16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthStencilFormat {
    #[default]
    Depth24Stencil8,
    Depth32Float,
}

/// Pixel format of one render buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderBufferFormat {
    Color {
        format: RenderTextureFormat,
        color_space: ColorSpace,
    },
    Depth(DepthStencilFormat),
}

impl RenderBufferFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, RenderBufferFormat::Depth(_))
    }
}

/// Everything needed to allocate one render buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderBufferDescriptor {
    pub dimensions: UVec2,
    pub dimensionality: TextureDimensionality,
    pub anti_aliasing_level: AntiAliasingLevel,
    pub format: RenderBufferFormat,
}

#[derive(Debug)]
struct RenderBufferData {
    id: ResourceId,
    descriptor: RenderBufferDescriptor,
}

/// One GPU-backed image that can be rendered into.
///
/// Render buffers are immutable. Changing a [`RenderTexture`] replaces its buffers, so
/// each buffer's id maps to exactly one GPU allocation.
#[derive(Debug, Clone)]
pub struct RenderBuffer {
    data: Arc<RenderBufferData>,
}

impl PartialEq for RenderBuffer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl RenderBuffer {
    pub fn new(descriptor: RenderBufferDescriptor) -> Self {
        let mut descriptor = descriptor;
        descriptor.dimensions = descriptor.dimensions.max(UVec2::ONE);
        if descriptor.dimensionality == TextureDimensionality::Cube {
            descriptor.dimensions.y = descriptor.dimensions.x;
        }
        Self {
            data: Arc::new(RenderBufferData {
                id: ResourceId::next(),
                descriptor,
            }),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.data.id
    }

    pub fn descriptor(&self) -> &RenderBufferDescriptor {
        &self.data.descriptor
    }

    pub fn dimensions(&self) -> UVec2 {
        self.data.descriptor.dimensions
    }

    pub fn dimensionality(&self) -> TextureDimensionality {
        self.data.descriptor.dimensionality
    }

    pub fn anti_aliasing_level(&self) -> AntiAliasingLevel {
        self.data.descriptor.anti_aliasing_level
    }

    pub fn is_depth(&self) -> bool {
        self.data.descriptor.format.is_depth()
    }
}

/// Parameters of a [`RenderTexture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTextureDescriptor {
    pub dimensions: UVec2,
    pub dimensionality: TextureDimensionality,
    pub anti_aliasing_level: AntiAliasingLevel,
    pub color_format: RenderTextureFormat,
    pub depth_stencil_format: DepthStencilFormat,
    /// Color space the color buffer is written and sampled in.
    pub read_write: ColorSpace,
}

impl RenderTextureDescriptor {
    pub fn new(dimensions: UVec2) -> Self {
        Self {
            dimensions,
            dimensionality: TextureDimensionality::Tex2D,
            anti_aliasing_level: AntiAliasingLevel::NONE,
            color_format: RenderTextureFormat::Rgba8,
            depth_stencil_format: DepthStencilFormat::Depth24Stencil8,
            read_write: ColorSpace::Srgb,
        }
    }

    pub fn with_dimensionality(mut self, dimensionality: TextureDimensionality) -> Self {
        self.dimensionality = dimensionality;
        self
    }

    pub fn with_anti_aliasing_level(mut self, level: AntiAliasingLevel) -> Self {
        self.anti_aliasing_level = level;
        self
    }

    pub fn with_color_format(mut self, format: RenderTextureFormat) -> Self {
        self.color_format = format;
        self
    }

    pub fn with_depth_stencil_format(mut self, format: DepthStencilFormat) -> Self {
        self.depth_stencil_format = format;
        self
    }

    pub fn with_read_write(mut self, read_write: ColorSpace) -> Self {
        self.read_write = read_write;
        self
    }

    fn color_buffer_descriptor(&self) -> RenderBufferDescriptor {
        RenderBufferDescriptor {
            dimensions: self.dimensions,
            dimensionality: self.dimensionality,
            anti_aliasing_level: self.anti_aliasing_level,
            format: RenderBufferFormat::Color {
                format: self.color_format,
                color_space: self.read_write,
            },
        }
    }

    fn depth_buffer_descriptor(&self) -> RenderBufferDescriptor {
        RenderBufferDescriptor {
            dimensions: self.dimensions,
            dimensionality: self.dimensionality,
            anti_aliasing_level: self.anti_aliasing_level,
            format: RenderBufferFormat::Depth(self.depth_stencil_format),
        }
    }
}

impl Default for RenderTextureDescriptor {
    fn default() -> Self {
        Self::new(UVec2::ONE)
    }
}

/// A color buffer paired with a depth buffer, usable as a render destination and as a
/// material texture.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTexture {
    descriptor: RenderTextureDescriptor,
    color: RenderBuffer,
    depth: RenderBuffer,
}

impl Default for RenderTexture {
    fn default() -> Self {
        Self::new(RenderTextureDescriptor::default())
    }
}

impl RenderTexture {
    pub fn new(descriptor: RenderTextureDescriptor) -> Self {
        Self {
            color: RenderBuffer::new(descriptor.color_buffer_descriptor()),
            depth: RenderBuffer::new(descriptor.depth_buffer_descriptor()),
            descriptor,
        }
    }

    pub fn descriptor(&self) -> &RenderTextureDescriptor {
        &self.descriptor
    }

    /// Apply a new descriptor. Buffers are replaced only when something changed.
    pub fn reformat(&mut self, descriptor: RenderTextureDescriptor) {
        if descriptor != self.descriptor {
            *self = Self::new(descriptor);
        }
    }

    pub fn color_buffer(&self) -> &RenderBuffer {
        &self.color
    }

    pub fn depth_buffer(&self) -> &RenderBuffer {
        &self.depth
    }

    pub fn dimensions(&self) -> UVec2 {
        self.color.dimensions()
    }

    pub fn set_dimensions(&mut self, dimensions: UVec2) {
        self.reformat(RenderTextureDescriptor {
            dimensions,
            ..self.descriptor
        });
    }

    pub fn dimensionality(&self) -> TextureDimensionality {
        self.descriptor.dimensionality
    }

    pub fn set_dimensionality(&mut self, dimensionality: TextureDimensionality) {
        self.reformat(self.descriptor.with_dimensionality(dimensionality));
    }

    pub fn anti_aliasing_level(&self) -> AntiAliasingLevel {
        self.descriptor.anti_aliasing_level
    }

    pub fn set_anti_aliasing_level(&mut self, level: AntiAliasingLevel) {
        self.reformat(self.descriptor.with_anti_aliasing_level(level));
    }

    pub fn color_format(&self) -> RenderTextureFormat {
        self.descriptor.color_format
    }

    pub fn set_color_format(&mut self, format: RenderTextureFormat) {
        self.reformat(self.descriptor.with_color_format(format));
    }

    pub fn depth_stencil_format(&self) -> DepthStencilFormat {
        self.descriptor.depth_stencil_format
    }

    pub fn set_depth_stencil_format(&mut self, format: DepthStencilFormat) {
        self.reformat(self.descriptor.with_depth_stencil_format(format));
    }

    pub fn read_write(&self) -> ColorSpace {
        self.descriptor.read_write
    }

    pub fn set_read_write(&mut self, read_write: ColorSpace) {
        self.reformat(self.descriptor.with_read_write(read_write));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anti_aliasing_level_rounds_to_power_of_two() {
        assert_eq!(AntiAliasingLevel::new(0).samples(), 1);
        assert_eq!(AntiAliasingLevel::new(3).samples(), 2);
        assert_eq!(AntiAliasingLevel::new(8).samples(), 8);
        assert!(!AntiAliasingLevel::NONE.is_multisampled());
    }

    #[test]
    fn test_unchanged_descriptor_keeps_buffers() {
        let mut rt = RenderTexture::new(RenderTextureDescriptor::new(UVec2::new(64, 32)));
        let color = rt.color_buffer().clone();
        rt.set_dimensions(UVec2::new(64, 32));
        assert_eq!(rt.color_buffer(), &color);

        rt.set_anti_aliasing_level(AntiAliasingLevel::new(4));
        assert_ne!(rt.color_buffer(), &color);
        assert_eq!(rt.depth_buffer().anti_aliasing_level().samples(), 4);
    }

    #[test]
    fn test_cube_buffers_are_square() {
        let rt = RenderTexture::new(
            RenderTextureDescriptor::new(UVec2::new(64, 32))
                .with_dimensionality(TextureDimensionality::Cube),
        );
        assert_eq!(rt.dimensions(), UVec2::new(64, 64));
        assert!(rt.depth_buffer().is_depth());
        assert!(!rt.color_buffer().is_depth());
    }
}
