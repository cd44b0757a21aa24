use std::collections::BTreeMap;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

use crate::color::Color;
use crate::shader::ShaderType;
use crate::texture::{Cubemap, RenderTexture, Texture2D, TextureDimensionality};

/// A typed value stored under a name in a material or property block.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialValue {
    Color(Color),
    ColorArray(Vec<Color>),
    Float(f32),
    FloatArray(Vec<f32>),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
    Mat4Array(Vec<Mat4>),
    Int(i32),
    Bool(bool),
    Texture(Texture2D),
    RenderTexture(RenderTexture),
    Cubemap(Cubemap),
}

impl MaterialValue {
    /// Shader type this value can be bound to. Array values report their element type.
    pub fn shader_type(&self) -> ShaderType {
        match self {
            MaterialValue::Color(_) | MaterialValue::ColorArray(_) | MaterialValue::Vec4(_) => {
                ShaderType::Vec4
            }
            MaterialValue::Float(_) | MaterialValue::FloatArray(_) => ShaderType::Float,
            MaterialValue::Vec2(_) => ShaderType::Vec2,
            MaterialValue::Vec3(_) => ShaderType::Vec3,
            MaterialValue::Mat3(_) => ShaderType::Mat3,
            MaterialValue::Mat4(_) | MaterialValue::Mat4Array(_) => ShaderType::Mat4,
            MaterialValue::Int(_) => ShaderType::Int,
            MaterialValue::Bool(_) => ShaderType::Bool,
            MaterialValue::Texture(_) => ShaderType::Sampler2D,
            MaterialValue::RenderTexture(rt) => match rt.dimensionality() {
                TextureDimensionality::Tex2D => ShaderType::Sampler2D,
                TextureDimensionality::Cube => ShaderType::SamplerCube,
            },
            MaterialValue::Cubemap(_) => ShaderType::SamplerCube,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            MaterialValue::ColorArray(_) | MaterialValue::FloatArray(_) | MaterialValue::Mat4Array(_)
        )
    }

    /// Number of elements, `1` for scalar values.
    pub fn len(&self) -> usize {
        match self {
            MaterialValue::ColorArray(v) => v.len(),
            MaterialValue::FloatArray(v) => v.len(),
            MaterialValue::Mat4Array(v) => v.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for MaterialValue {
                fn from(value: $ty) -> Self {
                    MaterialValue::$variant(value)
                }
            }
        )*
    };
}

impl_from_value! {
    Color => Color,
    Vec<Color> => ColorArray,
    f32 => Float,
    Vec<f32> => FloatArray,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    Mat3 => Mat3,
    Mat4 => Mat4,
    Vec<Mat4> => Mat4Array,
    i32 => Int,
    bool => Bool,
    Texture2D => Texture,
    RenderTexture => RenderTexture,
    Cubemap => Cubemap,
}

/// Name-ordered value store shared by [`Material`](super::Material) and
/// [`MaterialPropertyBlock`](super::MaterialPropertyBlock).
///
/// Iteration order is by name, so binding order is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialValueMap {
    values: BTreeMap<String, MaterialValue>,
}

impl MaterialValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `name`, replacing any previous value of any type.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<MaterialValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&MaterialValue> {
        self.values.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<MaterialValue> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MaterialValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::RenderTextureDescriptor;
    use glam::UVec2;

    #[test]
    fn test_set_overwrites_regardless_of_type() {
        let mut map = MaterialValueMap::new();
        map.set("u_value", 1.5f32);
        map.set("u_value", Color::RED);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("u_value"), Some(&MaterialValue::Color(Color::RED)));
    }

    #[test]
    fn test_shader_types() {
        assert_eq!(MaterialValue::from(Color::RED).shader_type(), ShaderType::Vec4);
        assert_eq!(MaterialValue::from(vec![0.5f32; 3]).shader_type(), ShaderType::Float);
        assert_eq!(MaterialValue::from(vec![0.5f32; 3]).len(), 3);

        let cube = RenderTexture::new(
            RenderTextureDescriptor::new(UVec2::splat(8))
                .with_dimensionality(TextureDimensionality::Cube),
        );
        assert_eq!(
            MaterialValue::from(cube).shader_type(),
            ShaderType::SamplerCube
        );
    }

    #[test]
    fn test_iteration_is_name_ordered() {
        let mut map = MaterialValueMap::new();
        map.set("b", 1);
        map.set("a", 2);
        let names: Vec<&str> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
