//! Common utilities for integration tests.
//!
//! Only one graphics context may be alive at a time, so every test that creates one holds
//! the guard returned by [`lock`] for its whole duration.

#![allow(dead_code)]

use std::sync::{Mutex, MutexGuard};

use glam::{Mat4, Vec3};
use scene_renderer::backend::Command;
use scene_renderer::{
    draw, Camera, GraphicsContext, Material, Mesh, RecordingBackend, RendererConfig, Shader,
};

static LOCK: Mutex<()> = Mutex::new(());

/// Serialize context creation. Bind the guard before the context so the context drops first.
pub fn lock() -> MutexGuard<'static, ()> {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// Shader taking per-object model and camera matrices as uniforms
pub const BASIC_WGSL: &str = r#"
struct Uniforms {
    u_model_mat: mat4x4<f32>,
    u_view_proj_mat: mat4x4<f32>,
    u_color: vec4<f32>,
}

@group(0) @binding(0) var<uniform> uniforms: Uniforms;

@vertex
fn vs_main(@location(0) a_position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return uniforms.u_view_proj_mat * uniforms.u_model_mat * vec4<f32>(a_position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return uniforms.u_color;
}
"#;

/// Shader reading model matrices from a per-instance vertex stream
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

pub fn recording_context(config: RendererConfig) -> GraphicsContext<RecordingBackend> {
    GraphicsContext::new(RecordingBackend::new(32, 32), config).unwrap()
}

pub fn basic_material() -> Material {
    Material::new(Shader::from_wgsl(BASIC_WGSL).unwrap())
}

pub fn instanced_material() -> Material {
    Material::new(Shader::from_wgsl(INSTANCED_WGSL).unwrap())
}

pub fn queue_at(camera: &mut Camera, mesh: &Mesh, material: &Material, position: Vec3) {
    draw(mesh, Mat4::from_translation(position), material, camera, None, None).unwrap();
}

/// Instance count of every draw call, in order
pub fn draws(commands: &[Command]) -> Vec<u32> {
    commands
        .iter()
        .filter(|c| c.is_draw())
        .map(|c| c.instance_count())
        .collect()
}

/// Bytes of every uniform write at `location`, in order
pub fn uniform_writes(commands: &[Command], location: u32) -> Vec<Vec<u8>> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::SetUniform { location: l, data } if *l == location => Some(data.clone()),
            _ => None,
        })
        .collect()
}
