//! Offscreen targets with several color attachments and one depth attachment.

use glam::UVec2;
use thiserror::Error;

use crate::color::Color;
use crate::texture::{AntiAliasingLevel, RenderBuffer, RenderTexture, TextureDimensionality};

/// What happens to an attachment's contents when a pass starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderBufferLoadAction {
    #[default]
    Clear,
    Load,
}

/// What happens to an attachment's contents when a pass ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderBufferStoreAction {
    /// Keep the contents, resolving multisampled buffers into their readable texture
    #[default]
    Resolve,
    DontCare,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetColorAttachment {
    pub buffer: RenderBuffer,
    pub load_action: RenderBufferLoadAction,
    pub store_action: RenderBufferStoreAction,
    pub clear_color: Color,
}

impl RenderTargetColorAttachment {
    pub fn new(buffer: RenderBuffer) -> Self {
        Self {
            buffer,
            load_action: RenderBufferLoadAction::Clear,
            store_action: RenderBufferStoreAction::Resolve,
            clear_color: Color::CLEAR,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetDepthAttachment {
    pub buffer: RenderBuffer,
    pub load_action: RenderBufferLoadAction,
    pub store_action: RenderBufferStoreAction,
}

impl RenderTargetDepthAttachment {
    pub fn new(buffer: RenderBuffer) -> Self {
        Self {
            buffer,
            load_action: RenderBufferLoadAction::Clear,
            store_action: RenderBufferStoreAction::DontCare,
        }
    }
}

/// Malformed attachment sets
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderTargetError {
    #[error("render target has no color attachments")]
    NoAttachments,

    #[error("attachment is {actual:?} ({actual_kind:?}) but the target is {expected:?} ({expected_kind:?})")]
    DimensionMismatch {
        expected: UVec2,
        actual: UVec2,
        expected_kind: TextureDimensionality,
        actual_kind: TextureDimensionality,
    },

    #[error("attachment has {actual} samples but the target has {expected}")]
    SampleCountMismatch { expected: u32, actual: u32 },

    #[error("depth attachment does not use a depth format")]
    DepthFormatRequired,

    #[error("color attachment {index} uses a depth format")]
    ColorFormatRequired { index: usize },
}

/// A validated set of attachments that a camera can render into.
///
/// Every attachment shares one size, dimensionality and sample count.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTarget {
    colors: Vec<RenderTargetColorAttachment>,
    depth: RenderTargetDepthAttachment,
}

impl RenderTarget {
    pub fn new(
        colors: Vec<RenderTargetColorAttachment>,
        depth: RenderTargetDepthAttachment,
    ) -> Result<Self, RenderTargetError> {
        let first = colors.first().ok_or(RenderTargetError::NoAttachments)?;
        let expected = first.buffer.descriptor();

        for (index, color) in colors.iter().enumerate() {
            if color.buffer.is_depth() {
                return Err(RenderTargetError::ColorFormatRequired { index });
            }
        }
        if !depth.buffer.is_depth() {
            return Err(RenderTargetError::DepthFormatRequired);
        }

        let buffers = colors.iter().map(|c| &c.buffer).chain(Some(&depth.buffer));
        for buffer in buffers {
            let actual = buffer.descriptor();
            if actual.dimensions != expected.dimensions
                || actual.dimensionality != expected.dimensionality
            {
                return Err(RenderTargetError::DimensionMismatch {
                    expected: expected.dimensions,
                    actual: actual.dimensions,
                    expected_kind: expected.dimensionality,
                    actual_kind: actual.dimensionality,
                });
            }
            if actual.anti_aliasing_level != expected.anti_aliasing_level {
                return Err(RenderTargetError::SampleCountMismatch {
                    expected: expected.anti_aliasing_level.samples(),
                    actual: actual.anti_aliasing_level.samples(),
                });
            }
        }

        Ok(Self { colors, depth })
    }

    /// Target drawing into `texture`, clearing color to `clear_color` and depth to far.
    pub fn from_render_texture(texture: &RenderTexture, clear_color: Color) -> Self {
        let mut color = RenderTargetColorAttachment::new(texture.color_buffer().clone());
        color.clear_color = clear_color;
        Self {
            colors: vec![color],
            depth: RenderTargetDepthAttachment::new(texture.depth_buffer().clone()),
        }
    }

    pub fn colors(&self) -> &[RenderTargetColorAttachment] {
        &self.colors
    }

    pub fn depth(&self) -> &RenderTargetDepthAttachment {
        &self.depth
    }

    pub fn dimensions(&self) -> UVec2 {
        self.depth.buffer.dimensions()
    }

    pub fn dimensionality(&self) -> TextureDimensionality {
        self.depth.buffer.dimensionality()
    }

    pub fn anti_aliasing_level(&self) -> AntiAliasingLevel {
        self.depth.buffer.anti_aliasing_level()
    }

    /// Override the load action of every attachment. Used by cameras whose clear flags
    /// leave some buffers untouched.
    pub(crate) fn with_load_actions(
        mut self,
        color: Option<RenderBufferLoadAction>,
        depth: Option<RenderBufferLoadAction>,
    ) -> Self {
        if let Some(action) = color {
            for attachment in &mut self.colors {
                attachment.load_action = action;
            }
        }
        if let Some(action) = depth {
            self.depth.load_action = action;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::{
        DepthStencilFormat, RenderBufferDescriptor, RenderBufferFormat, RenderTextureDescriptor,
        RenderTextureFormat,
    };
    use crate::texture::ColorSpace;

    fn buffer(size: u32, samples: u32, depth: bool) -> RenderBuffer {
        RenderBuffer::new(RenderBufferDescriptor {
            dimensions: UVec2::splat(size),
            dimensionality: TextureDimensionality::Tex2D,
            anti_aliasing_level: AntiAliasingLevel::new(samples),
            format: if depth {
                RenderBufferFormat::Depth(DepthStencilFormat::Depth32Float)
            } else {
                RenderBufferFormat::Color {
                    format: RenderTextureFormat::Rgba8,
                    color_space: ColorSpace::Srgb,
                }
            },
        })
    }

    #[test]
    fn test_valid_target() {
        let target = RenderTarget::new(
            vec![
                RenderTargetColorAttachment::new(buffer(8, 4, false)),
                RenderTargetColorAttachment::new(buffer(8, 4, false)),
            ],
            RenderTargetDepthAttachment::new(buffer(8, 4, true)),
        )
        .unwrap();
        assert_eq!(target.colors().len(), 2);
        assert_eq!(target.dimensions(), UVec2::splat(8));
        assert_eq!(target.anti_aliasing_level().samples(), 4);
    }

    #[test]
    fn test_format_roles_are_checked() {
        assert_eq!(
            RenderTarget::new(
                vec![RenderTargetColorAttachment::new(buffer(8, 1, true))],
                RenderTargetDepthAttachment::new(buffer(8, 1, true)),
            ),
            Err(RenderTargetError::ColorFormatRequired { index: 0 })
        );
        assert_eq!(
            RenderTarget::new(
                vec![RenderTargetColorAttachment::new(buffer(8, 1, false))],
                RenderTargetDepthAttachment::new(buffer(8, 1, false)),
            ),
            Err(RenderTargetError::DepthFormatRequired)
        );
        assert_eq!(
            RenderTarget::new(vec![], RenderTargetDepthAttachment::new(buffer(8, 1, true))),
            Err(RenderTargetError::NoAttachments)
        );
    }

    #[test]
    fn test_from_render_texture_shares_buffers() {
        let texture = RenderTexture::new(RenderTextureDescriptor::new(UVec2::new(4, 2)));
        let target = RenderTarget::from_render_texture(&texture, Color::RED);
        assert_eq!(&target.colors()[0].buffer, texture.color_buffer());
        assert_eq!(&target.depth().buffer, texture.depth_buffer());
        assert_eq!(target.colors()[0].clear_color, Color::RED);
        assert_eq!(target.dimensions(), UVec2::new(4, 2));
    }
}
