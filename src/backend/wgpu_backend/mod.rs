//! wgpu backend implementation
//!
//! wgpu has no notion of a current program or loose uniforms, so the GL-style
//! [`GraphicsBackend`] surface is emulated: each program keeps a CPU copy of its uniform
//! block and its bound textures, and every draw snapshots that state into the pending
//! render pass. When the pass ends the snapshots are turned into bind groups and
//! pipelines and replayed into a real wgpu render pass.

mod conversion;
mod pass;
mod readback;

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::config::RendererConfig;

use self::conversion::*;
use self::pass::{DrawKind, PendingRenderPass, PipelineKey};
use self::readback::DepthResolvePipeline;

/// A texture together with its sampling view and sampler
struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    format: TextureFormat,
    dimension: TextureDimension,
}

/// A compiled program and the state written to it through the GL-style interface
struct GpuProgram {
    module: wgpu::ShaderModule,
    vertex_entry: String,
    fragment_entry: String,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: Option<wgpu::BindGroupLayout>,
    /// Bound in group 0 when the program has no uniform block
    empty_group: Option<wgpu::BindGroup>,
    color_outputs: u32,
    texture_slots: Vec<ProgramTextureSlot>,
    uniforms: Vec<u8>,
    textures: HashMap<u32, TextureHandle>,
}

/// Vertex buffer bound to a slot
#[derive(Clone)]
struct BoundVertexBuffer {
    buffer: BufferHandle,
    offset: u64,
    layout: VertexBufferLayout,
}

/// Where the `Surface` attachment renders to
enum SurfaceTarget {
    Window {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        current: Option<wgpu::SurfaceTexture>,
    },
    Headless {
        texture: wgpu::Texture,
    },
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    capabilities: BackendCapabilities,
    uniform_alignment: u64,

    surface: SurfaceTarget,
    surface_format: wgpu::TextureFormat,
    surface_size: (u32, u32),
    surface_sample_count: u32,
    surface_depth: wgpu::Texture,
    surface_msaa: Option<wgpu::Texture>,

    // Resource storage
    buffers: HashMap<u64, wgpu::Buffer>,
    textures: HashMap<u64, GpuTexture>,
    programs: HashMap<u64, GpuProgram>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    depth_resolve: HashMap<wgpu::TextureFormat, DepthResolvePipeline>,
    next_id: u64,
    fallback_2d: TextureHandle,
    fallback_cube: TextureHandle,

    // Current GL-style state
    program: Option<ProgramHandle>,
    pipeline_state: PipelineState,
    depth_testing: bool,
    vertex_buffers: Vec<Option<BoundVertexBuffer>>,
    index_buffer: Option<(BufferHandle, IndexFormat)>,

    // Commands are buffered here and executed on end_render_pass
    pending_render_pass: Option<PendingRenderPass>,
}

const SURFACE_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

impl WgpuBackend {
    /// Create a backend rendering to `window`
    pub fn new(window: Arc<winit::window::Window>, config: &RendererConfig) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, config))
    }

    /// Create a backend rendering to an offscreen surface of the given size
    pub fn headless(width: u32, height: u32, config: &RendererConfig) -> BackendResult<Self> {
        pollster::block_on(Self::headless_async(width, height, config))
    }

    pub async fn new_async(
        window: Arc<winit::window::Window>,
        config: &RendererConfig,
    ) -> BackendResult<Self> {
        let backends = preferred_backends();
        let instance = create_instance(backends, config);
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;
        let adapter = request_adapter(&instance, Some(&surface)).await;

        // If no adapter found with preferred backend, try with all backends
        let (instance, surface, adapter) = match adapter {
            Some(adapter) => (instance, surface, adapter),
            None if backends != wgpu::Backends::all() => {
                log::warn!("Preferred backend not available, falling back to all backends");
                let instance = create_instance(wgpu::Backends::all(), config);
                let surface = instance
                    .create_surface(window.clone())
                    .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;
                let adapter = request_adapter(&instance, Some(&surface))
                    .await
                    .ok_or_else(|| {
                        BackendError::InitializationFailed("No suitable adapter found".into())
                    })?;
                (instance, surface, adapter)
            }
            None => {
                return Err(BackendError::InitializationFailed(
                    "No suitable adapter found".into(),
                ))
            }
        };
        let (device, queue) = request_device(&adapter).await?;

        let size = window.inner_size();
        let (width, height) = clamp_surface_size(&device, size.width, size.height);
        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| {
                BackendError::SurfaceCreationFailed("Surface reports no formats".into())
            })?;
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if surface_caps.usages.contains(wgpu::TextureUsages::COPY_SRC) {
            usage |= wgpu::TextureUsages::COPY_SRC;
        } else {
            log::warn!("Surface does not support copies, screenshots will fail");
        }
        let surface_config = wgpu::SurfaceConfiguration {
            usage,
            format,
            width,
            height,
            present_mode: if config.vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let target = SurfaceTarget::Window {
            surface,
            config: surface_config,
            current: None,
        };
        Ok(Self::from_parts(
            instance, adapter, device, queue, target, format, (width, height), config,
        ))
    }

    pub async fn headless_async(
        width: u32,
        height: u32,
        config: &RendererConfig,
    ) -> BackendResult<Self> {
        let instance = create_instance(wgpu::Backends::all(), config);
        let adapter = request_adapter(&instance, None).await.ok_or_else(|| {
            BackendError::InitializationFailed("No suitable adapter found".into())
        })?;
        let (device, queue) = request_device(&adapter).await?;

        let format = wgpu::TextureFormat::Rgba8UnormSrgb;
        let (width, height) = clamp_surface_size(&device, width, height);
        let texture = create_headless_texture(&device, format, width, height);
        Ok(Self::from_parts(
            instance,
            adapter,
            device,
            queue,
            SurfaceTarget::Headless { texture },
            format,
            (width, height),
            config,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn from_parts(
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface: SurfaceTarget,
        surface_format: wgpu::TextureFormat,
        surface_size: (u32, u32),
        config: &RendererConfig,
    ) -> Self {
        device.on_uncaptured_error(Box::new(|error: wgpu::Error| {
            log::error!("wgpu error: {error}");
        }));

        let capabilities = detect_capabilities(&adapter, &device);
        log::info!("Backend capabilities: {:?}", capabilities);

        let mut surface_sample_count = config.surface_sample_count.max(1);
        if surface_sample_count > capabilities.max_sample_count {
            log::warn!(
                "{} surface samples requested but the device supports {}, clamping",
                surface_sample_count,
                capabilities.max_sample_count
            );
            surface_sample_count = capabilities.max_sample_count;
        }
        let (surface_depth, surface_msaa) = create_surface_attachments(
            &device,
            surface_format,
            surface_size,
            surface_sample_count,
        );

        let mut textures = HashMap::new();
        let fallback_2d = TextureHandle(1);
        let fallback_cube = TextureHandle(2);
        for (handle, dimension) in [
            (fallback_2d, TextureDimension::D2),
            (fallback_cube, TextureDimension::Cube),
        ] {
            let texture = create_gpu_texture(
                &device,
                &TextureDescriptor {
                    label: Some(format!("Fallback {dimension:?}")),
                    dimension,
                    ..Default::default()
                },
            );
            for layer in 0..dimension.layers() {
                upload_layer(&queue, &texture, layer, &[255; 4]);
            }
            textures.insert(handle.0, texture);
        }

        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        Self {
            instance,
            adapter,
            device,
            queue,
            capabilities,
            uniform_alignment,
            surface,
            surface_format,
            surface_size,
            surface_sample_count,
            surface_depth,
            surface_msaa,
            buffers: HashMap::new(),
            textures,
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            depth_resolve: HashMap::new(),
            next_id: 3,
            fallback_2d,
            fallback_cube,
            program: None,
            pipeline_state: PipelineState::default(),
            depth_testing: true,
            vertex_buffers: Vec::new(),
            index_buffer: None,
            pending_render_pass: None,
        }
    }

    /// Get the wgpu device
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get the wgpu queue
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Acquire the next window image if none is held
    fn acquire_surface_texture(&mut self) -> BackendResult<()> {
        let SurfaceTarget::Window {
            surface,
            config,
            current,
        } = &mut self.surface
        else {
            return Ok(());
        };
        if current.is_some() {
            return Ok(());
        }
        let texture = match surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("Surface outdated, reconfiguring");
                surface.configure(&self.device, config);
                surface.get_current_texture().map_err(|e| match e {
                    wgpu::SurfaceError::Lost => BackendError::SurfaceLost,
                    wgpu::SurfaceError::OutOfMemory => BackendError::OutOfMemory,
                    e => BackendError::AcquireImageFailed(e.to_string()),
                })?
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(BackendError::OutOfMemory),
            Err(e) => return Err(BackendError::AcquireImageFailed(e.to_string())),
        };
        *current = Some(texture);
        Ok(())
    }

    /// The texture the surface color attachment resolves or renders into
    fn surface_texture(&self) -> Option<&wgpu::Texture> {
        match &self.surface {
            SurfaceTarget::Window { current, .. } => current.as_ref().map(|c| &c.texture),
            SurfaceTarget::Headless { texture } => Some(texture),
        }
    }

    fn record_draw(&mut self, kind: DrawKind, instances: Range<u32>) {
        let Some(program) = self.program else {
            log::debug!("Draw without a program, skipping");
            return;
        };
        let mut state = self.pipeline_state;
        if !self.depth_testing {
            state.depth_compare = CompareFunction::Always;
            state.depth_write = false;
        }
        let vertex_buffers = self
            .vertex_buffers
            .iter()
            .enumerate()
            .filter_map(|(slot, bound)| Some((slot as u32, bound.clone()?)))
            .collect::<Vec<_>>();
        self.snapshot_draw(program, state, vertex_buffers, kind, instances);
    }
}

impl GraphicsBackend for WgpuBackend {
    fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let (width, height) = clamp_surface_size(&self.device, width, height);
        match &mut self.surface {
            SurfaceTarget::Window {
                surface,
                config,
                current,
            } => {
                *current = None;
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
            }
            SurfaceTarget::Headless { texture } => {
                *texture =
                    create_headless_texture(&self.device, self.surface_format, width, height);
            }
        }
        self.surface_size = (width, height);
        let (depth, msaa) = create_surface_attachments(
            &self.device,
            self.surface_format,
            self.surface_size,
            self.surface_sample_count,
        );
        self.surface_depth = depth;
        self.surface_msaa = msaa;
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: desc.label.as_deref(),
                source: wgpu::ShaderSource::Wgsl(desc.source.as_str().into()),
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::ProgramCreationFailed(error.to_string()));
        }

        let uniform_entries = if desc.uniform_block_size > 0 {
            vec![wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(desc.uniform_block_size as u64),
                },
                count: None,
            }]
        } else {
            Vec::new()
        };
        let uniform_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Uniform Layout"),
                entries: &uniform_entries,
            });

        let texture_layout = (!desc.textures.is_empty()).then(|| {
            let entries = desc
                .textures
                .iter()
                .flat_map(|slot| {
                    [
                        wgpu::BindGroupLayoutEntry {
                            binding: slot.binding,
                            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension: view_dimension(slot.dimension),
                                multisampled: false,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: slot.binding + 1,
                            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                            count: None,
                        },
                    ]
                })
                .collect::<Vec<_>>();
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Texture Layout"),
                    entries: &entries,
                })
        });

        let mut group_layouts = vec![&uniform_layout];
        group_layouts.extend(texture_layout.as_ref());
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: desc.label.as_deref(),
                bind_group_layouts: &group_layouts,
                push_constant_ranges: &[],
            });
        let empty_group = (desc.uniform_block_size == 0).then(|| {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Empty Uniform Group"),
                layout: &uniform_layout,
                entries: &[],
            })
        });

        let id = self.next_id();
        log::debug!(
            "Created program {} ({:?}): {} uniform bytes, {} textures",
            id,
            desc.label,
            desc.uniform_block_size,
            desc.textures.len()
        );
        self.programs.insert(
            id,
            GpuProgram {
                module,
                vertex_entry: desc.vertex_entry.clone(),
                fragment_entry: desc.fragment_entry.clone(),
                pipeline_layout,
                uniform_layout,
                texture_layout,
                empty_group,
                color_outputs: desc.color_outputs,
                texture_slots: desc.textures.clone(),
                uniforms: vec![0; desc.uniform_block_size as usize],
                textures: HashMap::new(),
            },
        );
        Ok(ProgramHandle(id))
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size: desc.size,
            usage: buffer_usage(desc.usage),
            mapped_at_creation: false,
        });
        let id = self.next_id();
        self.buffers.insert(id, buffer);
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: desc.label.as_deref(),
                contents: data,
                usage: buffer_usage(desc.usage),
            });
        let id = self.next_id();
        self.buffers.insert(id, buffer);
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        if let Some(buf) = self.buffers.get(&buffer.0) {
            self.queue.write_buffer(buf, offset, data);
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let texture = create_gpu_texture(&self.device, desc);
        let id = self.next_id();
        self.textures.insert(id, texture);
        Ok(TextureHandle(id))
    }

    fn write_texture(&mut self, texture: TextureHandle, layer: u32, data: &[u8]) {
        let Some(tex) = self.textures.get(&texture.0) else {
            log::warn!("write_texture: unknown texture {}", texture.0);
            return;
        };
        upload_layer(&self.queue, tex, layer, data);
    }

    fn set_sampler(&mut self, texture: TextureHandle, desc: &SamplerDescriptor) {
        if let Some(tex) = self.textures.get_mut(&texture.0) {
            tex.sampler = create_sampler(&self.device, desc);
        }
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        if self.pending_render_pass.is_some() {
            log::warn!("begin_render_pass called inside a pass, ending the previous one");
            self.end_render_pass();
        }
        self.begin_pass(desc);
    }

    fn end_render_pass(&mut self) {
        let Some(pending) = self.pending_render_pass.take() else {
            return;
        };
        self.execute_pass(pending);
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        if let Some(pass) = &mut self.pending_render_pass {
            pass.set_viewport(viewport);
        }
    }

    fn set_scissor_rect(&mut self, rect: Option<ScissorRect>) {
        if let Some(pass) = &mut self.pending_render_pass {
            pass.set_scissor_rect(rect);
        }
    }

    fn set_depth_testing(&mut self, enabled: bool) {
        self.depth_testing = enabled;
    }

    fn set_program(&mut self, program: ProgramHandle) {
        self.program = Some(program);
        self.vertex_buffers.clear();
    }

    fn set_pipeline_state(&mut self, state: &PipelineState) {
        self.pipeline_state = *state;
    }

    fn set_uniform(&mut self, location: u32, data: &[u8]) {
        let Some(program) = self.program.and_then(|p| self.programs.get_mut(&p.0)) else {
            return;
        };
        let start = location as usize;
        let end = (start + data.len()).min(program.uniforms.len());
        if start >= end {
            log::debug!("Uniform write at {} is outside the uniform block", location);
            return;
        }
        program.uniforms[start..end].copy_from_slice(&data[..end - start]);
    }

    fn bind_texture(&mut self, _unit: u32, location: u32, texture: TextureHandle) {
        if let Some(program) = self.program.and_then(|p| self.programs.get_mut(&p.0)) {
            program.textures.insert(location, texture);
        }
    }

    fn set_vertex_buffer(
        &mut self,
        slot: u32,
        buffer: BufferHandle,
        offset: u64,
        layout: &VertexBufferLayout,
    ) {
        let slot = slot as usize;
        if self.vertex_buffers.len() <= slot {
            self.vertex_buffers.resize(slot + 1, None);
        }
        self.vertex_buffers[slot] = Some(BoundVertexBuffer {
            buffer,
            offset,
            layout: layout.clone(),
        });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat) {
        self.index_buffer = Some((buffer, format));
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.record_draw(DrawKind::Vertices(vertices), instances);
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.record_draw(
            DrawKind::Indexed {
                indices,
                base_vertex,
            },
            instances,
        );
    }

    fn resolve_texture(&mut self, src: TextureHandle, dst: TextureHandle, dst_layer: u32) {
        self.resolve(src, dst, dst_layer);
    }

    fn read_texture(&mut self, texture: TextureHandle, layer: u32) -> BackendResult<Readback> {
        let tex = self.textures.get(&texture.0).ok_or(BackendError::InvalidHandle {
            kind: "texture",
            id: texture.0,
        })?;
        self.read_layer(&tex.texture, layer)
    }

    fn read_surface(&mut self) -> BackendResult<Readback> {
        self.acquire_surface_texture()?;
        if let SurfaceTarget::Window { config, .. } = &self.surface {
            if !config.usage.contains(wgpu::TextureUsages::COPY_SRC) {
                return Err(BackendError::ReadbackFailed(
                    "surface does not support copies".into(),
                ));
            }
        }
        let texture = self
            .surface_texture()
            .ok_or_else(|| BackendError::ReadbackFailed("no surface image".into()))?;
        self.read_layer(texture, 0)
    }

    fn present(&mut self) -> BackendResult<()> {
        if self.pending_render_pass.is_some() {
            return Err(BackendError::InvalidPassState("present inside a render pass"));
        }
        if let SurfaceTarget::Window { current, .. } = &mut self.surface {
            if let Some(texture) = current.take() {
                texture.present();
            }
        }
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(buf) = self.buffers.remove(&buffer.0) {
            buf.destroy();
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if texture == self.fallback_2d || texture == self.fallback_cube {
            return;
        }
        if let Some(tex) = self.textures.remove(&texture.0) {
            tex.texture.destroy();
        }
    }
}

/// On Windows, try Vulkan first to avoid D3D12 debug layer validation errors
fn preferred_backends() -> wgpu::Backends {
    if std::env::var("WGPU_BACKEND").is_ok() {
        return wgpu::Backends::all();
    }
    #[cfg(target_os = "windows")]
    {
        wgpu::Backends::VULKAN
    }
    #[cfg(not(target_os = "windows"))]
    {
        wgpu::Backends::all()
    }
}

fn create_instance(backends: wgpu::Backends, config: &RendererConfig) -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends,
        flags: if config.debug_mode {
            wgpu::InstanceFlags::debugging()
        } else {
            wgpu::InstanceFlags::default()
        },
        ..Default::default()
    })
}

async fn request_adapter(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'static>>,
) -> Option<wgpu::Adapter> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        })
        .await?;
    let info = adapter.get_info();
    log::info!("Selected GPU: {} ({:?} backend)", info.name, info.backend);
    Some(adapter)
}

/// Features used when present, never required
fn optional_features() -> wgpu::Features {
    wgpu::Features::POLYGON_MODE_LINE
        | wgpu::Features::FLOAT32_FILTERABLE
        | wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES
}

async fn request_device(adapter: &wgpu::Adapter) -> BackendResult<(wgpu::Device, wgpu::Queue)> {
    adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Graphics Device"),
                required_features: adapter.features() & optional_features(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        )
        .await
        .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))
}

fn detect_capabilities(adapter: &wgpu::Adapter, device: &wgpu::Device) -> BackendCapabilities {
    let features = device.features();
    let max_sample_count = if features.contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES)
    {
        let color = adapter
            .get_texture_format_features(wgpu::TextureFormat::Rgba8UnormSrgb)
            .flags;
        let depth = adapter
            .get_texture_format_features(SURFACE_DEPTH_FORMAT)
            .flags;
        [16, 8, 4, 2]
            .into_iter()
            .find(|&n| color.sample_count_supported(n) && depth.sample_count_supported(n))
            .unwrap_or(1)
    } else {
        4
    };
    BackendCapabilities {
        wireframe: features.contains(wgpu::Features::POLYGON_MODE_LINE),
        float32_filterable: features.contains(wgpu::Features::FLOAT32_FILTERABLE),
        max_sample_count,
    }
}

/// Clamp to device limits while maintaining aspect ratio
fn clamp_surface_size(device: &wgpu::Device, width: u32, height: u32) -> (u32, u32) {
    let max_size = device.limits().max_texture_dimension_2d;
    if width > max_size || height > max_size {
        let scale = (max_size as f32 / width as f32).min(max_size as f32 / height as f32);
        let new_width = ((width as f32 * scale) as u32).max(1);
        let new_height = ((height as f32 * scale) as u32).max(1);
        (new_width, new_height)
    } else {
        (width.max(1), height.max(1))
    }
}

fn create_headless_texture(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Headless Surface"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

/// Depth buffer for the surface, plus a multisampled color buffer when the surface is
/// rendered with more than one sample
fn create_surface_attachments(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    (width, height): (u32, u32),
    sample_count: u32,
) -> (wgpu::Texture, Option<wgpu::Texture>) {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let depth = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Surface Depth"),
        size,
        mip_level_count: 1,
        sample_count,
        dimension: wgpu::TextureDimension::D2,
        format: SURFACE_DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let msaa = (sample_count > 1).then(|| {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Surface MSAA"),
            size,
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
    });
    (depth, msaa)
}

fn create_gpu_texture(device: &wgpu::Device, desc: &TextureDescriptor) -> GpuTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: desc.label.as_deref(),
        size: wgpu::Extent3d {
            width: desc.width.max(1),
            height: desc.height.max(1),
            depth_or_array_layers: desc.dimension.layers(),
        },
        mip_level_count: 1,
        sample_count: desc.sample_count.max(1),
        dimension: wgpu::TextureDimension::D2,
        format: texture_format(desc.format),
        usage: texture_usage(desc.usage),
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: desc.label.as_deref(),
        dimension: Some(view_dimension(desc.dimension)),
        ..Default::default()
    });
    let sampler = create_sampler(device, &SamplerDescriptor::default());
    GpuTexture {
        texture,
        view,
        sampler,
        format: desc.format,
        dimension: desc.dimension,
    }
}

fn create_sampler(device: &wgpu::Device, desc: &SamplerDescriptor) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Texture Sampler"),
        address_mode_u: address_mode(desc.address_mode_u),
        address_mode_v: address_mode(desc.address_mode_v),
        address_mode_w: address_mode(desc.address_mode_w),
        mag_filter: filter_mode(desc.mag_filter),
        min_filter: filter_mode(desc.min_filter),
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

fn upload_layer(queue: &wgpu::Queue, texture: &GpuTexture, layer: u32, data: &[u8]) {
    let (width, height) = (texture.texture.width(), texture.texture.height());
    let bytes_per_row = width * texture.format.bytes_per_pixel();
    let expected = (bytes_per_row * height) as usize;
    if data.len() != expected || layer >= texture.dimension.layers() {
        log::warn!(
            "Texture upload of {} bytes to layer {} does not match a {}x{} {:?} texture",
            data.len(),
            layer,
            width,
            height,
            texture.format
        );
        return;
    }
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture.texture,
            mip_level: 0,
            origin: wgpu::Origin3d {
                x: 0,
                y: 0,
                z: layer,
            },
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(bytes_per_row),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}
