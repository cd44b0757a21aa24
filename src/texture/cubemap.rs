use super::{ColorSpace, TextureError, TextureFilterMode, TextureFormat, TextureWrapMode};
use crate::cow::{CopyOnWrite, ResourceId, Version};

/// Face of a cubemap, in GPU layer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubemapFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubemapFace {
    pub const ALL: [CubemapFace; 6] = [
        CubemapFace::PositiveX,
        CubemapFace::NegativeX,
        CubemapFace::PositiveY,
        CubemapFace::NegativeY,
        CubemapFace::PositiveZ,
        CubemapFace::NegativeZ,
    ];

    /// Array layer of this face.
    pub fn layer(self) -> u32 {
        self as u32
    }
}

#[derive(Debug)]
struct CubemapData {
    id: ResourceId,
    version: Version,
    params_version: Version,
    width: u32,
    format: TextureFormat,
    color_space: ColorSpace,
    faces: [Vec<u8>; 6],
    wrap_u: TextureWrapMode,
    wrap_v: TextureWrapMode,
    wrap_w: TextureWrapMode,
    filter: TextureFilterMode,
}

impl Clone for CubemapData {
    fn clone(&self) -> Self {
        Self {
            id: ResourceId::next(),
            faces: self.faces.clone(),
            ..*self
        }
    }
}

/// Six square faces sampled by direction.
#[derive(Debug, Clone)]
pub struct Cubemap {
    data: CopyOnWrite<CubemapData>,
}

impl PartialEq for Cubemap {
    fn eq(&self, other: &Self) -> bool {
        self.data.ptr_eq(&other.data)
    }
}

impl Cubemap {
    pub fn new(width: u32, format: TextureFormat, color_space: ColorSpace) -> Self {
        let width = width.max(1);
        let face_len = (width * width) as usize * format.bytes_per_pixel();
        Self {
            data: CopyOnWrite::new(CubemapData {
                id: ResourceId::next(),
                version: Version::default(),
                params_version: Version::default(),
                width,
                format,
                color_space,
                faces: std::array::from_fn(|_| vec![0; face_len]),
                wrap_u: TextureWrapMode::Clamp,
                wrap_v: TextureWrapMode::Clamp,
                wrap_w: TextureWrapMode::Clamp,
                filter: TextureFilterMode::Linear,
            }),
        }
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

    /// Edge length of every face.
    pub fn width(&self) -> u32 {
        self.data.width
    }

    pub fn format(&self) -> TextureFormat {
        self.data.format
    }

    pub fn color_space(&self) -> ColorSpace {
        self.data.color_space
    }

    pub fn pixel_data(&self, face: CubemapFace) -> &[u8] {
        &self.data.faces[face.layer() as usize]
    }

    pub fn set_pixel_data(&mut self, face: CubemapFace, bytes: &[u8]) -> Result<(), TextureError> {
        let expected = self.data.faces[face.layer() as usize].len();
        if bytes.len() != expected {
            return Err(TextureError::PixelDataSizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        let data = self.data.make_mut();
        data.version.bump();
        data.faces[face.layer() as usize].copy_from_slice(bytes);
        Ok(())
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

    pub fn set_wrap_mode(&mut self, mode: TextureWrapMode) {
        let data = self.data.make_mut();
        data.params_version.bump();
        data.wrap_u = mode;
        data.wrap_v = mode;
        data.wrap_w = mode;
    }

    pub fn filter_mode(&self) -> TextureFilterMode {
        self.data.filter
    }

    pub fn set_filter_mode(&mut self, mode: TextureFilterMode) {
        if self.data.filter != mode {
            let data = self.data.make_mut();
            data.params_version.bump();
            data.filter = mode;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_data_size_checked() {
        let mut cube = Cubemap::new(2, TextureFormat::Rgba8, ColorSpace::Srgb);
        assert!(cube.set_pixel_data(CubemapFace::NegativeY, &[0u8; 15]).is_err());
        assert!(cube.set_pixel_data(CubemapFace::NegativeY, &[7u8; 16]).is_ok());
        assert_eq!(cube.pixel_data(CubemapFace::NegativeY), &[7u8; 16]);
        assert_eq!(cube.pixel_data(CubemapFace::PositiveX), &[0u8; 16]);
        assert_eq!(cube.version().raw(), 1);
    }

    #[test]
    fn test_layer_order() {
        let layers: Vec<u32> = CubemapFace::ALL.iter().map(|f| f.layer()).collect();
        assert_eq!(layers, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_filter_change_is_parameter_only() {
        let mut cube = Cubemap::new(1, TextureFormat::Rgba8, ColorSpace::Linear);
        cube.set_filter_mode(TextureFilterMode::Nearest);
        assert_eq!(cube.version().raw(), 0);
        assert_eq!(cube.params_version().raw(), 1);
    }
}
