//! Sampled textures, cubemaps and render textures.

mod cubemap;
mod render_texture;
mod texture2d;

pub use cubemap::{Cubemap, CubemapFace};
pub use render_texture::{
    AntiAliasingLevel, DepthStencilFormat, RenderBuffer, RenderBufferDescriptor,
    RenderBufferFormat, RenderTexture, RenderTextureDescriptor, RenderTextureFormat,
    TextureDimensionality,
};
pub use texture2d::Texture2D;

use crate::color::Color;

/// CPU pixel layout of a [`Texture2D`] or [`Cubemap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    R8,
    #[default]
    Rgba8,
    RgbaFloat,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            TextureFormat::R8 => 1,
            TextureFormat::Rgba8 => 4,
            TextureFormat::RgbaFloat => 16,
        }
    }
}

/// Whether stored texels are already linear or still need the sRGB decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorSpace {
    #[default]
    Srgb,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureWrapMode {
    #[default]
    Repeat,
    Clamp,
    Mirror,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFilterMode {
    Nearest,
    #[default]
    Linear,
    /// Trilinear filtering over a generated mip chain.
    Mipmap,
}

/// Errors raised by texture data setters and loaders.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TextureError {
    #[error("pixel data has {actual} bytes, expected {expected}")]
    PixelDataSizeMismatch { expected: usize, actual: usize },

    #[error("{actual} pixels supplied for a texture of {expected} pixels")]
    PixelCountMismatch { expected: usize, actual: usize },

    #[error("failed to decode image: {0}")]
    Decode(String),
}

pub(crate) fn encode_pixels(format: TextureFormat, pixels: &[Color]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() * format.bytes_per_pixel());
    for p in pixels {
        match format {
            TextureFormat::R8 => out.push(p.to_rgba8()[0]),
            TextureFormat::Rgba8 => out.extend_from_slice(&p.to_rgba8()),
            TextureFormat::RgbaFloat => out.extend_from_slice(bytemuck::bytes_of(p)),
        }
    }
    out
}

pub(crate) fn decode_pixels(format: TextureFormat, bytes: &[u8]) -> Vec<Color> {
    match format {
        TextureFormat::R8 => bytes
            .iter()
            .map(|&r| Color::new(r as f32 / 255.0, 0.0, 0.0, 1.0))
            .collect(),
        TextureFormat::Rgba8 => bytes
            .chunks_exact(4)
            .map(|c| Color::from_rgba8([c[0], c[1], c[2], c[3]]))
            .collect(),
        TextureFormat::RgbaFloat => bytes
            .chunks_exact(16)
            .map(|c| bytemuck::pod_read_unaligned::<Color>(c))
            .collect(),
    }
}
