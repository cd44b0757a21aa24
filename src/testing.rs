//! Shared fixtures for unit tests.

pub const BASIC_WGSL: &str = r#"
struct Uniforms {
u_model_mat: mat4x4<f32>,
u_view_proj_mat: mat4x4<f32>,
u_normal_mat: mat3x3<f32>,
u_color: vec4<f32>,
u_shininess: f32,
u_palette: array<vec4<f32>, 4>,
}

@group(0) @binding(0) var<uniform> uniforms: Uniforms;
@group(1) @binding(0) var u_diffuse: texture_2d<f32>;
@group(1) @binding(1) var u_diffuse_sampler: sampler;
@group(1) @binding(2) var u_environment: texture_cube<f32>;
@group(1) @binding(3) var u_environment_sampler: sampler;

struct VertexInput {
@location(0) a_position: vec3<f32>,
@location(1) a_normal: vec3<f32>,
@location(2) a_texcoord0: vec2<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> @builtin(position) vec4<f32> {
return uniforms.u_view_proj_mat * uniforms.u_model_mat * vec4<f32>(input.a_position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
return uniforms.u_color;
}
"#;

pub const INSTANCED_WGSL: &str = r#"
struct Uniforms {
u_view_proj_mat: mat4x4<f32>,
u_color: vec4<f32>,
}

@group(0) @binding(0) var<uniform> uniforms: Uniforms;

@vertex
fn vs_main(
@location(0) a_position: vec3<f32>,
@location(3) a_instance_model_mat_c0: vec4<f32>,
@location(4) a_instance_model_mat_c1: vec4<f32>,
@location(5) a_instance_model_mat_c2: vec4<f32>,
@location(6) a_instance_model_mat_c3: vec4<f32>,
) -> @builtin(position) vec4<f32> {
let model = mat4x4<f32>(
    a_instance_model_mat_c0,
    a_instance_model_mat_c1,
    a_instance_model_mat_c2,
    a_instance_model_mat_c3,
);
return uniforms.u_view_proj_mat * model * vec4<f32>(a_position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
return uniforms.u_color;
}
"#;

static CONTEXT_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Serializes tests that create a [`GraphicsContext`](crate::renderer::GraphicsContext).
/// Bind the guard before the context so the context drops first.
pub fn context_lock() -> std::sync::MutexGuard<'static, ()> {
    CONTEXT_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}
