//! Core backend abstraction trait
//!
//! The renderer drives the GPU through [`GraphicsBackend`], an immediate-mode command
//! surface in the style of a classic GL context: programs and pipeline state are bound,
//! uniforms are written by location, textures by unit, then draws are issued. Backends are
//! free to buffer the commands of a render pass and replay them when the pass ends.

use std::ops::Range;

use thiserror::Error;

use crate::backend::types::*;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to acquire next image: {0}")]
    AcquireImageFailed(String),
    #[error("Failed to create program: {0}")]
    ProgramCreationFailed(String),
    #[error("Unknown {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u64 },
    #[error("Readback failed: {0}")]
    ReadbackFailed(String),
    #[error("Render pass misuse: {0}")]
    InvalidPassState(&'static str),
    #[error("Surface lost")]
    SurfaceLost,
    #[error("Out of memory")]
    OutOfMemory,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Main graphics backend trait
pub trait GraphicsBackend {
    /// Get the actual surface size (may be clamped by device limits)
    fn surface_size(&self) -> (u32, u32);

    /// Resize the surface and its depth buffer
    fn resize(&mut self, width: u32, height: u32);

    /// Optional features available on this device
    fn capabilities(&self) -> BackendCapabilities;

    // Resource creation

    /// Compile a program and build its binding layouts
    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle>;

    /// Create a buffer
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;

    /// Create a buffer with initial data
    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8])
        -> BackendResult<BufferHandle>;

    /// Write data to a buffer
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    /// Create a texture with a default sampler
    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Upload one full layer of a texture
    fn write_texture(&mut self, texture: TextureHandle, layer: u32, data: &[u8]);

    /// Replace the sampler used when the texture is bound
    fn set_sampler(&mut self, texture: TextureHandle, desc: &SamplerDescriptor);

    // Command recording and execution

    /// Begin a render pass
    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor);

    /// End the current render pass
    fn end_render_pass(&mut self);

    /// Set viewport
    fn set_viewport(&mut self, viewport: Viewport);

    /// Set scissor rect, `None` disables scissoring
    fn set_scissor_rect(&mut self, rect: Option<ScissorRect>);

    fn set_depth_testing(&mut self, enabled: bool);

    /// Make `program` current. Uniform and texture writes apply to the current program and
    /// persist across draws until overwritten. The bound index buffer stays bound, vertex
    /// buffers must be bound again.
    fn set_program(&mut self, program: ProgramHandle);

    fn set_pipeline_state(&mut self, state: &PipelineState);

    /// Write `data` at byte offset `location` of the current program's uniform block
    fn set_uniform(&mut self, location: u32, data: &[u8]);

    /// Bind a texture and its sampler to the slot at `location`, using texture `unit`
    fn bind_texture(&mut self, unit: u32, location: u32, texture: TextureHandle);

    /// Set vertex buffer
    fn set_vertex_buffer(
        &mut self,
        slot: u32,
        buffer: BufferHandle,
        offset: u64,
        layout: &VertexBufferLayout,
    );

    /// Set index buffer
    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat);

    /// Draw primitives
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);

    /// Draw indexed primitives
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);

    // Transfers, outside of render passes

    /// Resolve a multisampled texture into layer `dst_layer` of a single-sampled one
    fn resolve_texture(&mut self, src: TextureHandle, dst: TextureHandle, dst_layer: u32);

    /// Read one layer of a color texture back to the CPU
    fn read_texture(&mut self, texture: TextureHandle, layer: u32) -> BackendResult<Readback>;

    /// Read the current surface image back to the CPU
    fn read_surface(&mut self) -> BackendResult<Readback>;

    /// Present the surface image
    fn present(&mut self) -> BackendResult<()>;

    // Resource cleanup

    /// Destroy a buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Destroy a texture
    fn destroy_texture(&mut self, texture: TextureHandle);
}
