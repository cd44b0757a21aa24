use glam::UVec2;
use image::GenericImageView;

use super::{
    decode_pixels, encode_pixels, ColorSpace, TextureError, TextureFilterMode, TextureFormat,
    TextureWrapMode,
};
use crate::color::Color;
use crate::cow::{CopyOnWrite, ResourceId, Version};

#[derive(Debug)]
struct TextureData {
    id: ResourceId,
    version: Version,
    params_version: Version,
    dimensions: UVec2,
    format: TextureFormat,
    color_space: ColorSpace,
    pixels: Vec<u8>,
    wrap_u: TextureWrapMode,
    wrap_v: TextureWrapMode,
    wrap_w: TextureWrapMode,
    filter: TextureFilterMode,
}

impl Clone for TextureData {
    fn clone(&self) -> Self {
        Self {
            id: ResourceId::next(),
            pixels: self.pixels.clone(),
            ..*self
        }
    }
}

/// A 2D image sampled by materials.
///
/// Pixel data changes bump [`version`](Self::version). Sampler parameter changes
/// (wrap and filter modes) bump [`params_version`](Self::params_version) instead, so they
/// never cause a pixel re-upload.
#[derive(Debug, Clone)]
pub struct Texture2D {
    data: CopyOnWrite<TextureData>,
}

impl PartialEq for Texture2D {
    fn eq(&self, other: &Self) -> bool {
        self.data.ptr_eq(&other.data)
    }
}

impl Texture2D {
    /// Zero-filled texture.
    pub fn new(width: u32, height: u32, format: TextureFormat, color_space: ColorSpace) -> Self {
        let dimensions = UVec2::new(width.max(1), height.max(1));
        let len = (dimensions.x * dimensions.y) as usize * format.bytes_per_pixel();
        Self {
            data: CopyOnWrite::new(TextureData {
                id: ResourceId::next(),
                version: Version::default(),
                params_version: Version::default(),
                dimensions,
                format,
                color_space,
                pixels: vec![0; len],
                wrap_u: TextureWrapMode::default(),
                wrap_v: TextureWrapMode::default(),
                wrap_w: TextureWrapMode::default(),
                filter: TextureFilterMode::default(),
            }),
        }
    }

    /// 1x1 texture filled with `color`.
    pub fn from_color(color: Color, color_space: ColorSpace) -> Self {
        let mut texture = Self::new(1, 1, TextureFormat::Rgba8, color_space);
        texture.edit_pixels().pixels = color.to_rgba8().to_vec();
        texture
    }

    /// Decode an encoded image (PNG, JPEG, ...) into an RGBA8 texture.
    pub fn from_image_bytes(bytes: &[u8], color_space: ColorSpace) -> Result<Self, TextureError> {
        let img = image::load_from_memory(bytes).map_err(|e| TextureError::Decode(e.to_string()))?;
        let (width, height) = img.dimensions();
        let rgba = img.to_rgba8().into_raw();

        let mut texture = Self::new(width, height, TextureFormat::Rgba8, color_space);
        texture.set_pixel_data(&rgba)?;
        Ok(texture)
    }

    /// Procedural checkerboard, handy as a placeholder.
    pub fn checkerboard(size: u32, cell: u32, a: Color, b: Color) -> Self {
        let cell = cell.max(1);
        let size = size.max(1);
        let pixels: Vec<Color> = (0..size * size)
            .map(|i| {
                let (x, y) = (i % size, i / size);
                if ((x / cell) + (y / cell)) % 2 == 0 {
                    a
                } else {
                    b
                }
            })
            .collect();
        let mut texture = Self::new(size, size, TextureFormat::Rgba8, ColorSpace::Srgb);
        texture.edit_pixels().pixels = encode_pixels(TextureFormat::Rgba8, &pixels);
        texture
    }

    pub fn id(&self) -> ResourceId {
        self.data.id
    }

    pub fn version(&self) -> Version {
        self.data.version
    }

    pub fn params_version(&self) -> Version {
        self.data.params_version
    }

    pub fn dimensions(&self) -> UVec2 {
        self.data.dimensions
    }

    pub fn width(&self) -> u32 {
        self.data.dimensions.x
    }

    pub fn height(&self) -> u32 {
        self.data.dimensions.y
    }

    pub fn format(&self) -> TextureFormat {
        self.data.format
    }

    pub fn color_space(&self) -> ColorSpace {
        self.data.color_space
    }

    fn edit_pixels(&mut self) -> &mut TextureData {
        let data = self.data.make_mut();
        data.version.bump();
        data
    }

    fn edit_params(&mut self) -> &mut TextureData {
        let data = self.data.make_mut();
        data.params_version.bump();
        data
    }

    pub fn wrap_mode_u(&self) -> TextureWrapMode {
        self.data.wrap_u
    }

    pub fn wrap_mode_v(&self) -> TextureWrapMode {
        self.data.wrap_v
    }

    pub fn wrap_mode_w(&self) -> TextureWrapMode {
        self.data.wrap_w
    }

    /// Set the wrap mode of every axis.
    pub fn set_wrap_mode(&mut self, mode: TextureWrapMode) {
        let data = self.edit_params();
        data.wrap_u = mode;
        data.wrap_v = mode;
        data.wrap_w = mode;
    }

    pub fn set_wrap_mode_u(&mut self, mode: TextureWrapMode) {
        if self.data.wrap_u != mode {
            self.edit_params().wrap_u = mode;
        }
    }

    pub fn set_wrap_mode_v(&mut self, mode: TextureWrapMode) {
        if self.data.wrap_v != mode {
            self.edit_params().wrap_v = mode;
        }
    }

    pub fn set_wrap_mode_w(&mut self, mode: TextureWrapMode) {
        if self.data.wrap_w != mode {
            self.edit_params().wrap_w = mode;
        }
    }

    pub fn filter_mode(&self) -> TextureFilterMode {
        self.data.filter
    }

    pub fn set_filter_mode(&mut self, mode: TextureFilterMode) {
        if self.data.filter != mode {
            self.edit_params().filter = mode;
        }
    }

    /// Raw pixel bytes, row-major, top row first.
    pub fn pixel_data(&self) -> &[u8] {
        &self.data.pixels
    }

    pub fn set_pixel_data(&mut self, bytes: &[u8]) -> Result<(), TextureError> {
        let expected = self.data.pixels.len();
        if bytes.len() != expected {
            return Err(TextureError::PixelDataSizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        self.edit_pixels().pixels.copy_from_slice(bytes);
        Ok(())
    }

    pub fn pixels(&self) -> Vec<Color> {
        decode_pixels(self.data.format, &self.data.pixels)
    }

    pub fn set_pixels(&mut self, pixels: &[Color]) -> Result<(), TextureError> {
        let expected = (self.width() * self.height()) as usize;
        if pixels.len() != expected {
            return Err(TextureError::PixelCountMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        let encoded = encode_pixels(self.data.format, pixels);
        self.edit_pixels().pixels = encoded;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_change_does_not_bump_data_version() {
        let mut texture = Texture2D::new(2, 2, TextureFormat::Rgba8, ColorSpace::Srgb);
        let version = texture.version();
        texture.set_filter_mode(TextureFilterMode::Nearest);
        texture.set_wrap_mode(TextureWrapMode::Clamp);

        assert_eq!(texture.version(), version);
        assert_eq!(texture.params_version().raw(), 2);
        assert_eq!(texture.wrap_mode_v(), TextureWrapMode::Clamp);
    }

    #[test]
    fn test_pixel_change_does_not_bump_params_version() {
        let mut texture = Texture2D::new(1, 1, TextureFormat::Rgba8, ColorSpace::Linear);
        texture.set_pixels(&[Color::GREEN]).unwrap();
        assert_eq!(texture.params_version().raw(), 0);
        assert_eq!(texture.version().raw(), 1);
        assert_eq!(texture.pixels(), vec![Color::GREEN]);
    }

    #[test]
    fn test_pixel_data_size_checked() {
        let mut texture = Texture2D::new(2, 2, TextureFormat::Rgba8, ColorSpace::Srgb);
        assert_eq!(
            texture.set_pixel_data(&[0u8; 3]),
            Err(TextureError::PixelDataSizeMismatch {
                expected: 16,
                actual: 3
            })
        );
        assert!(texture.set_pixels(&[Color::RED; 3]).is_err());
    }

    #[test]
    fn test_clone_detaches_on_write() {
        let a = Texture2D::from_color(Color::RED, ColorSpace::Srgb);
        let mut b = a.clone();
        assert_eq!(a, b);
        b.set_pixels(&[Color::BLUE]).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.pixels(), vec![Color::RED]);
    }

    #[test]
    fn test_decode_error() {
        assert!(matches!(
            Texture2D::from_image_bytes(b"not an image", ColorSpace::Srgb),
            Err(TextureError::Decode(_))
        ));
    }

    #[test]
    fn test_checkerboard() {
        let texture = Texture2D::checkerboard(4, 2, Color::WHITE, Color::BLACK);
        let pixels = texture.pixels();
        assert_eq!(pixels[0], Color::WHITE);
        assert_eq!(pixels[2], Color::BLACK);
        assert_eq!(pixels[8], Color::BLACK);
    }
}
