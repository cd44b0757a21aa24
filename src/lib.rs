//! Scene Renderer - a retained-queue renderer with state-sorted batching
//!
//! Meshes, materials and transforms are queued on a [`Camera`] with [`draw`]. Rendering the
//! camera flushes its queue through a [`GraphicsContext`]:
//! - objects are split into depth-tested and overlay runs in submission order
//! - opaque objects are batched by material, property block, mesh and sub-mesh
//! - transparent objects are sorted back to front
//! - batches whose shader takes per-instance transforms are drawn instanced
//!
//! GPU work goes through the [`GraphicsBackend`] trait. The `wgpu-backend` feature provides a
//! wgpu implementation; [`RecordingBackend`] records calls without a GPU.

pub mod backend;
pub mod color;
pub mod config;
pub mod cow;
pub mod error;
pub mod geometry;
pub mod material;
pub mod mesh;
pub mod render_target;
pub mod renderer;
pub mod scene;
pub mod shader;
pub mod texture;

#[cfg(test)]
mod testing;

pub use backend::{BackendCapabilities, BackendError, GraphicsBackend, RecordingBackend};
pub use color::Color;
pub use config::{BatchKey, RendererConfig};
pub use error::RenderError;
pub use geometry::{Aabb, Rect, Triangle};
pub use material::{
    CullMode, DepthFunction, Material, MaterialPropertyBlock, MaterialValue, MaterialValueMap,
};
pub use mesh::{
    Mesh, MeshError, MeshTopology, MeshUpdateFlags, SubMeshDescriptor, VertexAttribute,
    VertexAttributeDescriptor, VertexAttributeFormat, VertexFormat,
};
pub use render_target::{
    RenderBufferLoadAction, RenderBufferStoreAction, RenderTarget, RenderTargetColorAttachment,
    RenderTargetDepthAttachment, RenderTargetError,
};
pub use renderer::{FrameStats, GraphicsContext, ScreenshotHandle};
pub use scene::{draw, Camera, CameraClearFlags, CameraProjection, RenderObject, Transform};
pub use shader::{Shader, ShaderElement, ShaderError, ShaderType};
pub use texture::{
    AntiAliasingLevel, ColorSpace, Cubemap, CubemapFace, DepthStencilFormat, RenderBuffer,
    RenderTexture, RenderTextureDescriptor, RenderTextureFormat, Texture2D, TextureDimensionality,
    TextureError, TextureFilterMode, TextureFormat, TextureWrapMode,
};

#[cfg(feature = "wgpu-backend")]
pub use backend::wgpu_backend::WgpuBackend;

/// Install an `env_logger` logger filtered by `RUST_LOG`, defaulting to `info`.
///
/// Does nothing if a logger is already installed.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
