use super::{CullMode, DepthFunction, MaterialValueMap};
use crate::cow::{CopyOnWrite, ResourceId};
use crate::shader::Shader;

#[derive(Debug)]
struct MaterialData {
    id: ResourceId,
    shader: Shader,
    values: MaterialValueMap,
    transparent: bool,
    depth_tested: bool,
    depth_function: DepthFunction,
    wireframe: bool,
    cull_mode: CullMode,
}

impl Clone for MaterialData {
    fn clone(&self) -> Self {
        Self {
            id: ResourceId::next(),
            shader: self.shader.clone(),
            values: self.values.clone(),
            ..*self
        }
    }
}

/// A shader plus the named values and render state it is drawn with.
///
/// Clones share state until one of them is modified. Two materials compare equal only
/// while they share state, which is what the renderer batches on.
#[derive(Debug, Clone)]
pub struct Material {
    data: CopyOnWrite<MaterialData>,
}

impl PartialEq for Material {
    fn eq(&self, other: &Self) -> bool {
        self.data.ptr_eq(&other.data)
    }
}

impl Material {
    /// Opaque, depth-tested, unculled material.
    pub fn new(shader: Shader) -> Self {
        Self {
            data: CopyOnWrite::new(MaterialData {
                id: ResourceId::next(),
                shader,
                values: MaterialValueMap::new(),
                transparent: false,
                depth_tested: true,
                depth_function: DepthFunction::default(),
                wireframe: false,
                cull_mode: CullMode::default(),
            }),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.data.id
    }

    pub fn shader(&self) -> &Shader {
        &self.data.shader
    }

    pub fn set_shader(&mut self, shader: Shader) {
        self.data.make_mut().shader = shader;
    }

    pub fn values(&self) -> &MaterialValueMap {
        &self.data.values
    }

    fn value_map(&self) -> &MaterialValueMap {
        &self.data.values
    }

    fn value_map_mut(&mut self) -> &mut MaterialValueMap {
        &mut self.data.make_mut().values
    }

    pub fn is_transparent(&self) -> bool {
        self.data.transparent
    }

    pub fn set_transparent(&mut self, transparent: bool) {
        self.data.make_mut().transparent = transparent;
    }

    pub fn is_depth_tested(&self) -> bool {
        self.data.depth_tested
    }

    pub fn set_depth_tested(&mut self, depth_tested: bool) {
        self.data.make_mut().depth_tested = depth_tested;
    }

    pub fn depth_function(&self) -> DepthFunction {
        self.data.depth_function
    }

    pub fn set_depth_function(&mut self, depth_function: DepthFunction) {
        self.data.make_mut().depth_function = depth_function;
    }

    pub fn is_wireframe(&self) -> bool {
        self.data.wireframe
    }

    pub fn set_wireframe(&mut self, wireframe: bool) {
        self.data.make_mut().wireframe = wireframe;
    }

    pub fn cull_mode(&self) -> CullMode {
        self.data.cull_mode
    }

    pub fn set_cull_mode(&mut self, cull_mode: CullMode) {
        self.data.make_mut().cull_mode = cull_mode;
    }
}

impl_value_accessors!(Material);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::testing::BASIC_WGSL;

    fn material() -> Material {
        Material::new(Shader::from_wgsl(BASIC_WGSL).unwrap())
    }

    #[test]
    fn test_typed_accessors() {
        let mut m = material();
        m.set_color("u_color", Color::RED);
        m.set_floats("u_weights", &[1.0, 2.0]);

        assert_eq!(m.color("u_color"), Some(Color::RED));
        assert_eq!(m.floats("u_weights"), Some(&[1.0, 2.0][..]));
        assert_eq!(m.float("u_color"), None);

        m.set_float("u_color", 0.5);
        assert_eq!(m.color("u_color"), None);
        assert_eq!(m.float("u_color"), Some(0.5));
    }

    #[test]
    fn test_clone_shares_until_written() {
        let a = material();
        let mut b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());

        b.set_transparent(true);
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
        assert!(!a.is_transparent());
        assert_eq!(a.shader(), b.shader());
    }

    #[test]
    fn test_defaults() {
        let m = material();
        assert!(m.is_depth_tested());
        assert!(!m.is_wireframe());
        assert_eq!(m.cull_mode(), CullMode::Off);
        assert_eq!(m.depth_function(), DepthFunction::Less);
    }
}
