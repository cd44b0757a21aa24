//! Uploading material values to the reflected inputs of a shader.

use glam::{Mat3, Mat4};

use crate::backend::{GraphicsBackend, TextureDimension, TextureHandle};
use crate::color::Color;
use crate::error::RenderError;
use crate::material::{MaterialValue, MaterialValueMap};
use crate::scene::CameraUniforms;
use crate::shader::{Shader, ShaderElement, ShaderType};
use crate::texture::TextureDimensionality;

use super::GraphicsContext;

/// Byte size of a `mat3x3<f32>` column in a uniform block
const MAT3_COLUMN_STRIDE: usize = 16;

impl<B: GraphicsBackend> GraphicsContext<B> {
    /// Bind every value in `values` whose name and type match an input of `shader`.
    ///
    /// Texture values take texture units starting at `*next_unit`, which is advanced past
    /// the units used.
    pub(crate) fn bind_values(
        &mut self,
        shader: &Shader,
        values: &MaterialValueMap,
        next_unit: &mut u32,
    ) -> Result<(), RenderError> {
        for (name, value) in values.iter() {
            let Some(element) = shader.find_property(name) else {
                continue;
            };
            if value.shader_type() != element.shader_type {
                self.diagnostics.debug_once(
                    format!("type:{}:{}", shader.id(), name),
                    format_args!(
                        "Skipping {}: value is {} but shader {} declares {}",
                        name,
                        value.shader_type(),
                        shader.id(),
                        element.shader_type
                    ),
                );
                continue;
            }

            if element.shader_type.is_sampler() {
                self.bind_texture_value(name, value, element, next_unit)?;
            } else if let Some(bytes) = encode_uniform(value, element) {
                self.backend.set_uniform(element.location, &bytes);
            }
        }
        Ok(())
    }

    fn bind_texture_value(
        &mut self,
        name: &str,
        value: &MaterialValue,
        element: &ShaderElement,
        next_unit: &mut u32,
    ) -> Result<(), RenderError> {
        let unit = *next_unit;
        if unit >= self.config.max_texture_units {
            self.diagnostics.warn_once(
                format!("texture-units:{name}"),
                format_args!(
                    "Out of texture units binding {} ({} available)",
                    name, self.config.max_texture_units
                ),
            );
            return Ok(());
        }

        let texture = match value {
            MaterialValue::Texture(texture) => self.resources.texture2d(
                &mut self.backend,
                &mut self.diagnostics,
                texture,
                self.frame,
            )?,
            MaterialValue::Cubemap(cubemap) => self.resources.cubemap(
                &mut self.backend,
                &mut self.diagnostics,
                cubemap,
                self.frame,
            )?,
            MaterialValue::RenderTexture(render_texture) => {
                let buffer = render_texture.color_buffer();
                if self.resources.is_rendered(buffer) {
                    self.resources
                        .render_buffer(
                            &mut self.backend,
                            &mut self.diagnostics,
                            buffer,
                            self.frame,
                        )?
                        .sample_texture()
                } else {
                    self.diagnostics.warn_once(
                        format!("unrendered:{}", buffer.id()),
                        format_args!(
                            "Render texture bound to {} was never rendered, using a fallback",
                            name
                        ),
                    );
                    let dimension = match render_texture.dimensionality() {
                        TextureDimensionality::Tex2D => TextureDimension::D2,
                        TextureDimensionality::Cube => TextureDimension::Cube,
                    };
                    self.resources.fallback(&mut self.backend, dimension)?
                }
            }
            _ => return Ok(()),
        };

        self.bind_texture_handle(unit, element, texture);
        *next_unit += 1;
        Ok(())
    }

    fn bind_texture_handle(&mut self, unit: u32, element: &ShaderElement, texture: TextureHandle) {
        self.backend.bind_texture(unit, element.location, texture);
    }

    /// Set the view and projection uniforms the shader declares
    pub(crate) fn bind_camera_uniforms(&mut self, shader: &Shader, camera: &CameraUniforms) {
        let well_known = shader.well_known();
        let matrices = [
            (well_known.view_mat, camera.view),
            (well_known.proj_mat, camera.projection),
            (well_known.view_proj_mat, camera.view_projection),
        ];
        for (element, matrix) in matrices {
            if let Some(element) = element.filter(|e| e.shader_type == ShaderType::Mat4) {
                self.backend
                    .set_uniform(element.location, bytemuck::bytes_of(&matrix));
            }
        }
    }

    /// Set the per-object model and normal matrix uniforms the shader declares
    pub(crate) fn bind_model_uniforms(&mut self, shader: &Shader, model: &Mat4, normal: &Mat3) {
        let well_known = shader.well_known();
        if let Some(element) = well_known.model_mat {
            if element.shader_type == ShaderType::Mat4 {
                self.backend
                    .set_uniform(element.location, bytemuck::bytes_of(model));
            }
        }
        if let Some(element) = well_known.normal_mat {
            match element.shader_type {
                ShaderType::Mat3 => self.backend.set_uniform(element.location, &encode_mat3(normal)),
                ShaderType::Mat4 => self.backend.set_uniform(
                    element.location,
                    bytemuck::bytes_of(&Mat4::from_mat3(*normal)),
                ),
                _ => {}
            }
        }
    }
}

/// Uniform-block bytes for `value`. Arrays are encoded whole, one element per
/// `array_stride`, so they upload in a single write.
fn encode_uniform(value: &MaterialValue, element: &ShaderElement) -> Option<Vec<u8>> {
    let bytes = match value {
        MaterialValue::Color(c) => bytemuck::bytes_of(&c.to_linear()).to_vec(),
        MaterialValue::Float(v) => v.to_ne_bytes().to_vec(),
        MaterialValue::Vec2(v) => bytemuck::bytes_of(v).to_vec(),
        MaterialValue::Vec3(v) => bytemuck::bytes_of(v).to_vec(),
        MaterialValue::Vec4(v) => bytemuck::bytes_of(v).to_vec(),
        MaterialValue::Mat3(m) => encode_mat3(m),
        MaterialValue::Mat4(m) => bytemuck::bytes_of(m).to_vec(),
        MaterialValue::Int(v) => v.to_ne_bytes().to_vec(),
        MaterialValue::Bool(v) => u32::from(*v).to_ne_bytes().to_vec(),
        MaterialValue::ColorArray(colors) => {
            let linear: Vec<Color> = colors.iter().map(|c| c.to_linear()).collect();
            encode_array(&linear, element)
        }
        MaterialValue::FloatArray(values) => encode_array(values, element),
        MaterialValue::Mat4Array(values) => encode_array(values, element),
        MaterialValue::Texture(_) | MaterialValue::RenderTexture(_) | MaterialValue::Cubemap(_) => {
            return None
        }
    };
    if bytes.is_empty() {
        None
    } else {
        Some(bytes)
    }
}

fn encode_array<T: bytemuck::Pod>(values: &[T], element: &ShaderElement) -> Vec<u8> {
    let count = values.len().min(element.array_size.max(1) as usize);
    let size = std::mem::size_of::<T>();
    let stride = (element.array_stride as usize).max(size);
    let mut out = vec![0u8; count.saturating_sub(1) * stride + if count > 0 { size } else { 0 }];
    for (i, value) in values.iter().take(count).enumerate() {
        out[i * stride..i * stride + size].copy_from_slice(bytemuck::bytes_of(value));
    }
    out
}

/// `mat3x3<f32>` with each column padded to 16 bytes
fn encode_mat3(m: &Mat3) -> Vec<u8> {
    let mut out = vec![0u8; 3 * MAT3_COLUMN_STRIDE];
    for (i, column) in [m.x_axis, m.y_axis, m.z_axis].iter().enumerate() {
        let start = i * MAT3_COLUMN_STRIDE;
        out[start..start + 12].copy_from_slice(bytemuck::bytes_of(column));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_mat3_columns_are_padded() {
        let bytes = encode_mat3(&Mat3::from_cols(Vec3::X, Vec3::Y, Vec3::Z));
        let floats: &[f32] = bytemuck::cast_slice(&bytes);
        assert_eq!(floats.len(), 12);
        assert_eq!(&floats[0..4], &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(&floats[4..8], &[0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_float_array_uses_reflected_stride() {
        let element = ShaderElement::array(32, ShaderType::Float, 4, 16);
        let bytes = encode_uniform(&MaterialValue::FloatArray(vec![1.0, 2.0, 3.0]), &element)
            .unwrap();
        // last element is not padded out
        assert_eq!(bytes.len(), 2 * 16 + 4);
        let floats: &[f32] = bytemuck::cast_slice(&bytes);
        assert_eq!(floats[0], 1.0);
        assert_eq!(floats[4], 2.0);
        assert_eq!(floats[8], 3.0);
    }

    #[test]
    fn test_array_is_truncated_to_declared_size() {
        let element = ShaderElement::array(0, ShaderType::Vec4, 2, 16);
        let bytes = encode_uniform(
            &MaterialValue::ColorArray(vec![Color::WHITE; 5]),
            &element,
        )
        .unwrap();
        assert_eq!(bytes.len(), 32);
    }

    #[test]
    fn test_colors_are_linearized() {
        let element = ShaderElement::new(0, ShaderType::Vec4);
        let bytes =
            encode_uniform(&MaterialValue::Color(Color::rgb(0.5, 0.5, 0.5)), &element).unwrap();
        let floats: &[f32] = bytemuck::cast_slice(&bytes);
        assert!((floats[0] - 0.214).abs() < 1e-3);
        assert_eq!(floats[3], 1.0);
    }
}
