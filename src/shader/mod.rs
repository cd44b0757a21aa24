//! Reflected GPU programs.
//!
//! A [`Shader`] is built from WGSL source. Its uniforms, samplers and vertex inputs are
//! discovered once at load time and stored as [`ShaderElement`] tables so that material
//! values can be matched against them by name and type.
//!
//! Binding conventions:
//! - Every non-sampler uniform lives in one struct bound at `@group(0) @binding(0)`. The
//!   location of a uniform is its byte offset inside that struct.
//! - Textures live in `@group(1)`. The location of a sampler property is the binding of
//!   its texture. The matching `sampler` is expected at the next binding.
//! - Matrix-valued per-instance vertex inputs are declared column by column as
//!   `<name>_c0`, `<name>_c1`, ... and reflected as one matrix attribute.

mod reflection;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::cow::ResourceId;
use crate::mesh::VertexAttribute;

/// Well-known uniform and attribute names.
pub mod names {
    pub const MODEL_MAT: &str = "u_model_mat";
    pub const NORMAL_MAT: &str = "u_normal_mat";
    pub const VIEW_MAT: &str = "u_view_mat";
    pub const PROJ_MAT: &str = "u_proj_mat";
    pub const VIEW_PROJ_MAT: &str = "u_view_proj_mat";

    pub const POSITION: &str = "a_position";
    pub const NORMAL: &str = "a_normal";
    pub const TEX_COORD0: &str = "a_texcoord0";
    pub const COLOR: &str = "a_color";
    pub const TANGENT: &str = "a_tangent";

    pub const INSTANCE_MODEL_MAT: &str = "a_instance_model_mat";
    pub const INSTANCE_NORMAL_MAT: &str = "a_instance_normal_mat";
}

/// Shader attribute name a mesh attribute is fed to.
pub fn attribute_name(attribute: VertexAttribute) -> &'static str {
    match attribute {
        VertexAttribute::Position => names::POSITION,
        VertexAttribute::Normal => names::NORMAL,
        VertexAttribute::TexCoord0 => names::TEX_COORD0,
        VertexAttribute::Color => names::COLOR,
        VertexAttribute::Tangent => names::TANGENT,
    }
}

/// Semantic type of a shader input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderType {
    Float,
    Int,
    UInt,
    Bool,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    Sampler2D,
    SamplerCube,
    Unknown,
}

impl ShaderType {
    pub fn is_sampler(self) -> bool {
        matches!(self, ShaderType::Sampler2D | ShaderType::SamplerCube)
    }
}

impl fmt::Display for ShaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One reflected input of a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderElement {
    /// Byte offset for uniforms, binding index for samplers, `@location` for attributes.
    pub location: u32,
    pub shader_type: ShaderType,
    /// Number of array elements, `1` for scalars.
    pub array_size: u32,
    /// Distance in bytes between array elements (uniform arrays only).
    pub array_stride: u32,
}

impl ShaderElement {
    pub fn new(location: u32, shader_type: ShaderType) -> Self {
        Self {
            location,
            shader_type,
            array_size: 1,
            array_stride: 0,
        }
    }

    pub fn array(location: u32, shader_type: ShaderType, array_size: u32, array_stride: u32) -> Self {
        Self {
            location,
            shader_type,
            array_size,
            array_stride,
        }
    }
}

/// Errors raised while loading a shader.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ShaderError {
    #[error("failed to parse shader:\n{0}")]
    Parse(String),

    #[error("shader has no vertex entry point")]
    NoVertexEntryPoint,

    #[error("shader has no fragment entry point")]
    NoFragmentEntryPoint,
}

/// Well-known elements looked up once at load time.
#[derive(Debug, Clone, Default)]
pub(crate) struct WellKnownElements {
    pub model_mat: Option<ShaderElement>,
    pub normal_mat: Option<ShaderElement>,
    pub view_mat: Option<ShaderElement>,
    pub proj_mat: Option<ShaderElement>,
    pub view_proj_mat: Option<ShaderElement>,
    pub instance_model_mat: Option<ShaderElement>,
    pub instance_normal_mat: Option<ShaderElement>,
}

#[derive(Debug)]
struct ShaderData {
    id: ResourceId,
    source: String,
    vertex_entry: String,
    fragment_entry: String,
    uniform_block_size: u32,
    color_outputs: u32,
    uniforms: HashMap<String, ShaderElement>,
    attributes: HashMap<String, ShaderElement>,
    well_known: WellKnownElements,
}

/// A reflected GPU program. Immutable once loaded; clones share one program.
#[derive(Debug, Clone)]
pub struct Shader {
    data: Arc<ShaderData>,
}

impl PartialEq for Shader {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl Shader {
    /// Parse and reflect WGSL source.
    pub fn from_wgsl(source: impl Into<String>) -> Result<Self, ShaderError> {
        let source = source.into();
        let reflected = reflection::reflect_wgsl(&source)?;

        let find = |table: &HashMap<String, ShaderElement>, name: &str| table.get(name).copied();
        let well_known = WellKnownElements {
            model_mat: find(&reflected.uniforms, names::MODEL_MAT),
            normal_mat: find(&reflected.uniforms, names::NORMAL_MAT),
            view_mat: find(&reflected.uniforms, names::VIEW_MAT),
            proj_mat: find(&reflected.uniforms, names::PROJ_MAT),
            view_proj_mat: find(&reflected.uniforms, names::VIEW_PROJ_MAT),
            instance_model_mat: find(&reflected.attributes, names::INSTANCE_MODEL_MAT),
            instance_normal_mat: find(&reflected.attributes, names::INSTANCE_NORMAL_MAT),
        };

        log::debug!(
            "Reflected shader: {} uniforms, {} attributes, {} byte uniform block",
            reflected.uniforms.len(),
            reflected.attributes.len(),
            reflected.uniform_block_size
        );

        Ok(Self {
            data: Arc::new(ShaderData {
                id: ResourceId::next(),
                source,
                vertex_entry: reflected.vertex_entry,
                fragment_entry: reflected.fragment_entry,
                uniform_block_size: reflected.uniform_block_size,
                color_outputs: reflected.color_outputs,
                uniforms: reflected.uniforms,
                attributes: reflected.attributes,
                well_known,
            }),
        })
    }

    pub fn id(&self) -> ResourceId {
        self.data.id
    }

    pub fn source(&self) -> &str {
        &self.data.source
    }

    pub fn vertex_entry(&self) -> &str {
        &self.data.vertex_entry
    }

    pub fn fragment_entry(&self) -> &str {
        &self.data.fragment_entry
    }

    /// Size in bytes of the uniform block, `0` when there is none.
    pub fn uniform_block_size(&self) -> u32 {
        self.data.uniform_block_size
    }

    /// Number of color targets the fragment stage writes.
    pub fn color_outputs(&self) -> u32 {
        self.data.color_outputs
    }

    /// Uniforms and samplers, keyed by name.
    pub fn properties(&self) -> &HashMap<String, ShaderElement> {
        &self.data.uniforms
    }

    pub fn find_property(&self, name: &str) -> Option<&ShaderElement> {
        self.data.uniforms.get(name)
    }

    /// Vertex inputs, keyed by name.
    pub fn attributes(&self) -> &HashMap<String, ShaderElement> {
        &self.data.attributes
    }

    pub fn find_attribute(&self, name: &str) -> Option<&ShaderElement> {
        self.data.attributes.get(name)
    }

    /// Whether the shader takes per-instance transforms as vertex attributes.
    pub fn supports_instancing(&self) -> bool {
        self.data.well_known.instance_model_mat.is_some()
            || self.data.well_known.instance_normal_mat.is_some()
    }

    pub(crate) fn well_known(&self) -> &WellKnownElements {
        &self.data.well_known
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BASIC_WGSL, INSTANCED_WGSL};

    #[test]
    fn test_uniform_reflection() {
        let shader = Shader::from_wgsl(BASIC_WGSL).unwrap();

        let model = shader.find_property("u_model_mat").unwrap();
        assert_eq!(model.shader_type, ShaderType::Mat4);
        assert_eq!(model.location, 0);

        let normal = shader.find_property("u_normal_mat").unwrap();
        assert_eq!(normal.shader_type, ShaderType::Mat3);
        assert_eq!(normal.location, 128);

        let color = shader.find_property("u_color").unwrap();
        assert_eq!(color.shader_type, ShaderType::Vec4);
        assert_eq!(color.location, 176);

        let palette = shader.find_property("u_palette").unwrap();
        assert_eq!(palette.shader_type, ShaderType::Vec4);
        assert_eq!(palette.array_size, 4);
        assert_eq!(palette.array_stride, 16);

        assert!(shader.uniform_block_size() >= 256);
    }

    #[test]
    fn test_sampler_reflection() {
        let shader = Shader::from_wgsl(BASIC_WGSL).unwrap();
        let diffuse = shader.find_property("u_diffuse").unwrap();
        assert_eq!(diffuse.shader_type, ShaderType::Sampler2D);
        assert_eq!(diffuse.location, 0);

        let env = shader.find_property("u_environment").unwrap();
        assert_eq!(env.shader_type, ShaderType::SamplerCube);
        assert_eq!(env.location, 2);
        assert!(shader.find_property("u_diffuse_sampler").is_none());
    }

    #[test]
    fn test_attribute_reflection_from_struct() {
        let shader = Shader::from_wgsl(BASIC_WGSL).unwrap();
        let uv = shader.find_attribute("a_texcoord0").unwrap();
        assert_eq!(uv.location, 2);
        assert_eq!(uv.shader_type, ShaderType::Vec2);
        assert!(!shader.supports_instancing());
        assert!(shader.well_known().model_mat.is_some());
        assert_eq!(shader.color_outputs(), 1);
    }

    #[test]
    fn test_instance_matrix_columns_fold() {
        let shader = Shader::from_wgsl(INSTANCED_WGSL).unwrap();
        let model = shader.find_attribute(names::INSTANCE_MODEL_MAT).unwrap();
        assert_eq!(model.shader_type, ShaderType::Mat4);
        assert_eq!(model.location, 3);
        assert!(shader.find_attribute("a_instance_model_mat_c1").is_none());
        assert!(shader.supports_instancing());
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            Shader::from_wgsl("fn broken( {"),
            Err(ShaderError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_vertex_entry_point() {
        let src = "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";
        assert!(matches!(
            Shader::from_wgsl(src),
            Err(ShaderError::NoVertexEntryPoint)
        ));
    }
}
