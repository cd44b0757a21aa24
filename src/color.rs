//! Authoring-space colors and conversion to linear light.

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

/// An RGBA color.
///
/// Colors handed to the renderer by users (material colors, clear colors) are in the
/// sRGB authoring space. They are converted with [`Color::to_linear`] immediately before
/// reaching a shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl Color {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    pub const RED: Self = Self::new(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Self = Self::new(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Self = Self::new(0.0, 0.0, 1.0, 1.0);
    pub const CLEAR: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color.
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::new(r, g, b, 1.0)
    }

    /// Same color with a different alpha.
    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    /// Convert from sRGB to linear light. Alpha is left untouched.
    pub fn to_linear(self) -> Self {
        Self::new(
            srgb_to_linear(self.r),
            srgb_to_linear(self.g),
            srgb_to_linear(self.b),
            self.a,
        )
    }

    /// Convert from linear light back to sRGB. Alpha is left untouched.
    pub fn to_srgb(self) -> Self {
        Self::new(
            linear_to_srgb(self.r),
            linear_to_srgb(self.g),
            linear_to_srgb(self.b),
            self.a,
        )
    }

    /// Quantize to 8 bits per channel.
    pub fn to_rgba8(self) -> [u8; 4] {
        [
            unorm8(self.r),
            unorm8(self.g),
            unorm8(self.b),
            unorm8(self.a),
        ]
    }

    pub fn from_rgba8(rgba: [u8; 4]) -> Self {
        Self::new(
            rgba[0] as f32 / 255.0,
            rgba[1] as f32 / 255.0,
            rgba[2] as f32 / 255.0,
            rgba[3] as f32 / 255.0,
        )
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl From<Vec4> for Color {
    fn from(v: Vec4) -> Self {
        Self::new(v.x, v.y, v.z, v.w)
    }
}

impl From<Color> for Vec4 {
    fn from(c: Color) -> Self {
        Vec4::new(c.r, c.g, c.b, c.a)
    }
}

impl From<[f32; 4]> for Color {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn unorm8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_conversion_endpoints() {
        assert_eq!(Color::BLACK.to_linear(), Color::BLACK);
        assert_eq!(Color::WHITE.to_linear(), Color::WHITE);
    }

    #[test]
    fn test_mid_grey_is_darker_in_linear() {
        let grey = Color::rgb(0.5, 0.5, 0.5).to_linear();
        assert!((grey.r - 0.214).abs() < 1e-3);
        assert_eq!(grey.a, 1.0);
    }

    #[test]
    fn test_alpha_untouched() {
        let c = Color::new(0.3, 0.6, 0.9, 0.25);
        assert_eq!(c.to_linear().a, 0.25);
    }

    #[test]
    fn test_srgb_round_trip() {
        let c = Color::new(0.1, 0.5, 0.8, 1.0);
        let back = c.to_linear().to_srgb();
        assert!((back.r - c.r).abs() < 1e-5);
        assert!((back.g - c.g).abs() < 1e-5);
        assert!((back.b - c.b).abs() < 1e-5);
    }

    #[test]
    fn test_rgba8_quantization() {
        assert_eq!(Color::RED.to_rgba8(), [255, 0, 0, 255]);
        let c = Color::from_rgba8([128, 0, 255, 64]);
        assert_eq!(c.to_rgba8(), [128, 0, 255, 64]);
    }
}
