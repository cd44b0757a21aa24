//! GPU-less backend that records every call.
//!
//! This backend doesn't perform actual GPU operations. It hands out handles, remembers
//! enough about textures to answer readbacks, and appends each call to a command log that
//! tests inspect to check draw order, batching and resolve behaviour.

use std::collections::HashMap;
use std::ops::Range;

use crate::backend::traits::*;
use crate::backend::types::*;

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateProgram { program: ProgramHandle, label: Option<String> },
    CreateBuffer { buffer: BufferHandle, size: u64 },
    WriteBuffer { buffer: BufferHandle, offset: u64, len: usize },
    CreateTexture { texture: TextureHandle, width: u32, height: u32, dimension: TextureDimension, format: TextureFormat, sample_count: u32 },
    WriteTexture { texture: TextureHandle, layer: u32, len: usize },
    SetSampler { texture: TextureHandle, desc: SamplerDescriptor },
    BeginRenderPass(RenderPassDescriptor),
    EndRenderPass,
    SetViewport(Viewport),
    SetScissorRect(Option<ScissorRect>),
    SetDepthTesting(bool),
    SetProgram(ProgramHandle),
    SetPipelineState(PipelineState),
    SetUniform { location: u32, data: Vec<u8> },
    BindTexture { unit: u32, location: u32, texture: TextureHandle },
    SetVertexBuffer { slot: u32, buffer: BufferHandle, offset: u64, layout: VertexBufferLayout },
    SetIndexBuffer { buffer: BufferHandle, format: IndexFormat },
    Draw { vertices: Range<u32>, instances: Range<u32> },
    DrawIndexed { indices: Range<u32>, base_vertex: i32, instances: Range<u32> },
    ResolveTexture { src: TextureHandle, dst: TextureHandle, dst_layer: u32 },
    ReadTexture { texture: TextureHandle, layer: u32 },
    ReadSurface,
    Present,
    DestroyBuffer(BufferHandle),
    DestroyTexture(TextureHandle),
}

impl Command {
    pub fn is_draw(&self) -> bool {
        matches!(self, Command::Draw { .. } | Command::DrawIndexed { .. })
    }

    /// Number of instances drawn, zero for non-draw commands
    pub fn instance_count(&self) -> u32 {
        match self {
            Command::Draw { instances, .. } | Command::DrawIndexed { instances, .. } => {
                instances.end - instances.start
            }
            _ => 0,
        }
    }
}

#[derive(Debug)]
struct RecordedTexture {
    width: u32,
    height: u32,
    /// Last clear color written to each layer, as RGBA8
    layers: Vec<[u8; 4]>,
}

/// Recording backend.
#[derive(Debug)]
pub struct RecordingBackend {
    surface_size: (u32, u32),
    surface_fill: [u8; 4],
    capabilities: BackendCapabilities,
    next_id: u64,
    buffers: HashMap<u64, u64>,
    textures: HashMap<u64, RecordedTexture>,
    in_pass: bool,
    commands: Vec<Command>,
}

impl RecordingBackend {
    /// Create a new recording backend with a surface of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface_size: (width.max(1), height.max(1)),
            surface_fill: [0, 0, 0, 255],
            capabilities: BackendCapabilities::default(),
            next_id: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            in_pass: false,
            commands: Vec::new(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: BackendCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Recording Backend"
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Number of live buffers
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Number of live textures
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    fn record(&mut self, command: Command) {
        log::trace!("RecordingBackend: {:?}", command);
        self.commands.push(command);
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn apply_clears(&mut self, desc: &RenderPassDescriptor) {
        for attachment in &desc.color_attachments {
            let LoadOp::Clear(color) = attachment.load_op else {
                continue;
            };
            let rgba = color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
            match attachment.view {
                AttachmentView::Surface => self.surface_fill = rgba,
                AttachmentView::Texture { texture, layer } => {
                    if let Some(layer) = self
                        .textures
                        .get_mut(&texture.0)
                        .and_then(|t| t.layers.get_mut(layer as usize))
                    {
                        *layer = rgba;
                    }
                }
            }
        }
    }

    fn readback(width: u32, height: u32, fill: [u8; 4]) -> Readback {
        let rgba8 = fill
            .iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect();
        Readback {
            width,
            height,
            rgba8,
        }
    }
}

impl GraphicsBackend for RecordingBackend {
    fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.surface_size = (width, height);
        }
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        let program = ProgramHandle(self.allocate_id());
        self.record(Command::CreateProgram {
            program,
            label: desc.label.clone(),
        });
        Ok(program)
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let buffer = BufferHandle(self.allocate_id());
        self.buffers.insert(buffer.0, desc.size);
        self.record(Command::CreateBuffer {
            buffer,
            size: desc.size,
        });
        Ok(buffer)
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let buffer = self.create_buffer(&BufferDescriptor {
            size: data.len() as u64,
            ..desc.clone()
        })?;
        self.record(Command::WriteBuffer {
            buffer,
            offset: 0,
            len: data.len(),
        });
        Ok(buffer)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        self.record(Command::WriteBuffer {
            buffer,
            offset,
            len: data.len(),
        });
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let texture = TextureHandle(self.allocate_id());
        self.textures.insert(
            texture.0,
            RecordedTexture {
                width: desc.width,
                height: desc.height,
                layers: vec![[0; 4]; desc.dimension.layers() as usize],
            },
        );
        self.record(Command::CreateTexture {
            texture,
            width: desc.width,
            height: desc.height,
            dimension: desc.dimension,
            format: desc.format,
            sample_count: desc.sample_count,
        });
        Ok(texture)
    }

    fn write_texture(&mut self, texture: TextureHandle, layer: u32, data: &[u8]) {
        if let Some(first) = data.get(..4) {
            if let Some(slot) = self
                .textures
                .get_mut(&texture.0)
                .and_then(|t| t.layers.get_mut(layer as usize))
            {
                slot.copy_from_slice(first);
            }
        }
        self.record(Command::WriteTexture {
            texture,
            layer,
            len: data.len(),
        });
    }

    fn set_sampler(&mut self, texture: TextureHandle, desc: &SamplerDescriptor) {
        self.record(Command::SetSampler {
            texture,
            desc: *desc,
        });
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        debug_assert!(!self.in_pass, "render pass already open");
        self.in_pass = true;
        self.apply_clears(desc);
        self.record(Command::BeginRenderPass(desc.clone()));
    }

    fn end_render_pass(&mut self) {
        self.in_pass = false;
        self.record(Command::EndRenderPass);
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.record(Command::SetViewport(viewport));
    }

    fn set_scissor_rect(&mut self, rect: Option<ScissorRect>) {
        self.record(Command::SetScissorRect(rect));
    }

    fn set_depth_testing(&mut self, enabled: bool) {
        self.record(Command::SetDepthTesting(enabled));
    }

    fn set_program(&mut self, program: ProgramHandle) {
        self.record(Command::SetProgram(program));
    }

    fn set_pipeline_state(&mut self, state: &PipelineState) {
        self.record(Command::SetPipelineState(*state));
    }

    fn set_uniform(&mut self, location: u32, data: &[u8]) {
        self.record(Command::SetUniform {
            location,
            data: data.to_vec(),
        });
    }

    fn bind_texture(&mut self, unit: u32, location: u32, texture: TextureHandle) {
        self.record(Command::BindTexture {
            unit,
            location,
            texture,
        });
    }

    fn set_vertex_buffer(
        &mut self,
        slot: u32,
        buffer: BufferHandle,
        offset: u64,
        layout: &VertexBufferLayout,
    ) {
        self.record(Command::SetVertexBuffer {
            slot,
            buffer,
            offset,
            layout: layout.clone(),
        });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat) {
        self.record(Command::SetIndexBuffer { buffer, format });
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        debug_assert!(self.in_pass, "draw outside of a render pass");
        self.record(Command::Draw {
            vertices,
            instances,
        });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        debug_assert!(self.in_pass, "draw outside of a render pass");
        self.record(Command::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }

    fn resolve_texture(&mut self, src: TextureHandle, dst: TextureHandle, dst_layer: u32) {
        let fill = self
            .textures
            .get(&src.0)
            .and_then(|t| t.layers.first().copied());
        if let (Some(fill), Some(slot)) = (
            fill,
            self.textures
                .get_mut(&dst.0)
                .and_then(|t| t.layers.get_mut(dst_layer as usize)),
        ) {
            *slot = fill;
        }
        self.record(Command::ResolveTexture {
            src,
            dst,
            dst_layer,
        });
    }

    fn read_texture(&mut self, texture: TextureHandle, layer: u32) -> BackendResult<Readback> {
        self.record(Command::ReadTexture { texture, layer });
        let recorded = self.textures.get(&texture.0).ok_or(BackendError::InvalidHandle {
            kind: "texture",
            id: texture.0,
        })?;
        let fill = recorded
            .layers
            .get(layer as usize)
            .copied()
            .ok_or_else(|| BackendError::ReadbackFailed(format!("layer {layer} out of range")))?;
        Ok(Self::readback(recorded.width, recorded.height, fill))
    }

    fn read_surface(&mut self) -> BackendResult<Readback> {
        self.record(Command::ReadSurface);
        let (width, height) = self.surface_size;
        Ok(Self::readback(width, height, self.surface_fill))
    }

    fn present(&mut self) -> BackendResult<()> {
        self.record(Command::Present);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
        self.record(Command::DestroyBuffer(buffer));
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
        self.record(Command::DestroyTexture(texture));
    }
}
