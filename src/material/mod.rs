//! Materials and per-draw property overrides.

/// Generates typed getters and setters over a type's [`MaterialValueMap`].
///
/// The type must provide `value_map(&self)` and `value_map_mut(&mut self)`. Getters return
/// `None` when the name is unset or holds a value of another type.
macro_rules! impl_value_accessors {
    ($target:ty) => {
        impl $target {
            pub fn value(&self, name: &str) -> Option<&$crate::material::MaterialValue> {
                self.value_map().get(name)
            }

            pub fn set_value(
                &mut self,
                name: impl Into<String>,
                value: impl Into<$crate::material::MaterialValue>,
            ) {
                self.value_map_mut().set(name, value);
            }

            pub fn unset(&mut self, name: &str) {
                self.value_map_mut().remove(name);
            }

            impl_value_accessors!(@copy color, set_color, Color, $crate::color::Color);
            impl_value_accessors!(@copy float, set_float, Float, f32);
            impl_value_accessors!(@copy vec2, set_vec2, Vec2, glam::Vec2);
            impl_value_accessors!(@copy vec3, set_vec3, Vec3, glam::Vec3);
            impl_value_accessors!(@copy vec4, set_vec4, Vec4, glam::Vec4);
            impl_value_accessors!(@copy mat3, set_mat3, Mat3, glam::Mat3);
            impl_value_accessors!(@copy mat4, set_mat4, Mat4, glam::Mat4);
            impl_value_accessors!(@copy int, set_int, Int, i32);
            impl_value_accessors!(@copy bool, set_bool, Bool, bool);

            impl_value_accessors!(@slice colors, set_colors, ColorArray, $crate::color::Color);
            impl_value_accessors!(@slice floats, set_floats, FloatArray, f32);
            impl_value_accessors!(@slice mat4s, set_mat4s, Mat4Array, glam::Mat4);

            impl_value_accessors!(@shared texture, set_texture, Texture, $crate::texture::Texture2D);
            impl_value_accessors!(
                @shared render_texture,
                set_render_texture,
                RenderTexture,
                $crate::texture::RenderTexture
            );
            impl_value_accessors!(@shared cubemap, set_cubemap, Cubemap, $crate::texture::Cubemap);
        }
    };
    (@copy $get:ident, $set:ident, $variant:ident, $ty:ty) => {
        pub fn $get(&self, name: &str) -> Option<$ty> {
            match self.value(name) {
                Some($crate::material::MaterialValue::$variant(v)) => Some(*v),
                _ => None,
            }
        }

        pub fn $set(&mut self, name: impl Into<String>, value: $ty) {
            self.set_value(name, $crate::material::MaterialValue::$variant(value));
        }
    };
    (@slice $get:ident, $set:ident, $variant:ident, $ty:ty) => {
        pub fn $get(&self, name: &str) -> Option<&[$ty]> {
            match self.value(name) {
                Some($crate::material::MaterialValue::$variant(v)) => Some(v.as_slice()),
                _ => None,
            }
        }

        pub fn $set(&mut self, name: impl Into<String>, values: &[$ty]) {
            self.set_value(name, $crate::material::MaterialValue::$variant(values.to_vec()));
        }
    };
    (@shared $get:ident, $set:ident, $variant:ident, $ty:ty) => {
        pub fn $get(&self, name: &str) -> Option<&$ty> {
            match self.value(name) {
                Some($crate::material::MaterialValue::$variant(v)) => Some(v),
                _ => None,
            }
        }

        pub fn $set(&mut self, name: impl Into<String>, value: &$ty) {
            self.set_value(name, $crate::material::MaterialValue::$variant(value.clone()));
        }
    };
}

mod property_block;
mod value;

#[allow(clippy::module_inception)]
mod material;

pub use material::Material;
pub use property_block::MaterialPropertyBlock;
pub use value::{MaterialValue, MaterialValueMap};

/// Depth comparison used by depth-tested materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthFunction {
    #[default]
    Less,
    LessOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    Off,
    Back,
    Front,
}
