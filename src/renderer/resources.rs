//! Lazy GPU upload of meshes, textures, programs and render buffers.

use std::collections::HashSet;

use crate::backend::{
    AddressMode, AttachmentView, BackendCapabilities, BackendResult, BufferDescriptor,
    BufferHandle, BufferUsage, FilterMode, GraphicsBackend, IndexFormat, ProgramDescriptor,
    ProgramHandle, ProgramTextureSlot, SamplerDescriptor, TextureDescriptor, TextureDimension,
    TextureFormat as GpuTextureFormat, TextureHandle, TextureUsage,
};
use crate::cow::{ResourceId, Version};
use crate::mesh::Mesh;
use crate::shader::{Shader, ShaderType};
use crate::texture::{
    ColorSpace, Cubemap, CubemapFace, DepthStencilFormat, RenderBuffer, RenderBufferFormat,
    RenderTextureFormat, Texture2D, TextureDimensionality, TextureFilterMode, TextureFormat,
    TextureWrapMode,
};

use super::cache::{GpuCache, Lookup};
use super::diagnostics::Diagnostics;

/// Buffers of an uploaded mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GpuMesh {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub index_format: IndexFormat,
}

/// GPU storage behind one [`RenderBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RenderBufferStorage {
    SingleSampled2D {
        texture: TextureHandle,
    },
    /// Rendered at `msaa`, resolved into `resolve` for sampling and readback
    Multisampled2D {
        msaa: TextureHandle,
        resolve: TextureHandle,
    },
    SingleSampledCube {
        texture: TextureHandle,
    },
    /// Each face is rendered at the 2D `scratch` buffer, then resolved into its layer of
    /// `resolve`
    MultisampledCube {
        scratch: TextureHandle,
        resolve: TextureHandle,
    },
}

impl RenderBufferStorage {
    /// View a pass draws into when rendering cube face `face` (ignored for 2D storage)
    pub fn attachment_view(&self, face: u32) -> AttachmentView {
        match *self {
            RenderBufferStorage::SingleSampled2D { texture } => AttachmentView::Texture {
                texture,
                layer: 0,
            },
            RenderBufferStorage::Multisampled2D { msaa, .. } => AttachmentView::Texture {
                texture: msaa,
                layer: 0,
            },
            RenderBufferStorage::SingleSampledCube { texture } => AttachmentView::Texture {
                texture,
                layer: face,
            },
            RenderBufferStorage::MultisampledCube { scratch, .. } => AttachmentView::Texture {
                texture: scratch,
                layer: 0,
            },
        }
    }

    /// `(source, destination, destination layer)` of the resolve after rendering `face`
    pub fn resolve(&self, face: u32) -> Option<(TextureHandle, TextureHandle, u32)> {
        match *self {
            RenderBufferStorage::Multisampled2D { msaa, resolve } => Some((msaa, resolve, 0)),
            RenderBufferStorage::MultisampledCube { scratch, resolve } => {
                Some((scratch, resolve, face))
            }
            RenderBufferStorage::SingleSampled2D { .. }
            | RenderBufferStorage::SingleSampledCube { .. } => None,
        }
    }

    /// Single-sampled texture holding the final image
    pub fn sample_texture(&self) -> TextureHandle {
        match *self {
            RenderBufferStorage::SingleSampled2D { texture }
            | RenderBufferStorage::SingleSampledCube { texture } => texture,
            RenderBufferStorage::Multisampled2D { resolve, .. }
            | RenderBufferStorage::MultisampledCube { resolve, .. } => resolve,
        }
    }

    fn textures(&self) -> Vec<TextureHandle> {
        match *self {
            RenderBufferStorage::SingleSampled2D { texture }
            | RenderBufferStorage::SingleSampledCube { texture } => vec![texture],
            RenderBufferStorage::Multisampled2D { msaa, resolve } => vec![msaa, resolve],
            RenderBufferStorage::MultisampledCube { scratch, resolve } => vec![scratch, resolve],
        }
    }
}

/// Every GPU object the context created on behalf of CPU resources.
#[derive(Debug, Default)]
pub(crate) struct GpuResources {
    meshes: GpuCache<GpuMesh>,
    textures: GpuCache<TextureHandle>,
    cubemaps: GpuCache<TextureHandle>,
    programs: GpuCache<ProgramHandle>,
    render_buffers: GpuCache<RenderBufferStorage>,
    /// Render buffers that have been a render destination
    rendered: HashSet<ResourceId>,
    retired_buffers: Vec<BufferHandle>,
    retired_textures: Vec<TextureHandle>,
    fallback_2d: Option<TextureHandle>,
    fallback_cube: Option<TextureHandle>,
}

impl GpuResources {
    pub fn program<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        shader: &Shader,
        frame: u64,
    ) -> BackendResult<ProgramHandle> {
        let none = Version::default();
        if let Lookup::Hit(entry) = self.programs.lookup(shader.id(), none, none, frame) {
            return Ok(entry.value);
        }

        let mut textures: Vec<ProgramTextureSlot> = shader
            .properties()
            .values()
            .filter_map(|e| {
                let dimension = match e.shader_type {
                    ShaderType::Sampler2D => TextureDimension::D2,
                    ShaderType::SamplerCube => TextureDimension::Cube,
                    _ => return None,
                };
                Some(ProgramTextureSlot {
                    binding: e.location,
                    dimension,
                })
            })
            .collect();
        textures.sort_by_key(|slot| slot.binding);

        let program = backend.create_program(&ProgramDescriptor {
            label: Some(format!("Shader {}", shader.id())),
            source: shader.source().to_string(),
            vertex_entry: shader.vertex_entry().to_string(),
            fragment_entry: shader.fragment_entry().to_string(),
            uniform_block_size: shader.uniform_block_size(),
            textures,
            color_outputs: shader.color_outputs(),
        })?;
        log::debug!("Created program for shader {}", shader.id());
        self.programs.insert(shader.id(), none, none, frame, program);
        Ok(program)
    }

    /// Upload `mesh` if needed. The caller guarantees it has vertices and indices.
    pub fn mesh<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        mesh: &Mesh,
        frame: u64,
    ) -> BackendResult<GpuMesh> {
        let none = Version::default();
        if let Lookup::Hit(entry) = self.meshes.lookup(mesh.id(), mesh.version(), none, frame) {
            return Ok(entry.value);
        }

        let label = format!("Mesh {}", mesh.id());
        let vertex_buffer = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{label} Vertices")),
                size: 0,
                usage: BufferUsage::VERTEX,
            },
            mesh.vertex_buffer().bytes(),
        )?;
        let index_buffer = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{label} Indices")),
                size: 0,
                usage: BufferUsage::INDEX,
            },
            mesh.indices().as_bytes(),
        )?;
        let gpu = GpuMesh {
            vertex_buffer,
            index_buffer,
            index_format: if mesh.indices().is_u32() {
                IndexFormat::Uint32
            } else {
                IndexFormat::Uint16
            },
        };
        log::debug!(
            "Uploaded mesh {} (version {}, {} vertices, {} indices)",
            mesh.id(),
            mesh.version().raw(),
            mesh.num_verts(),
            mesh.num_indices()
        );

        if let Some(old) = self.meshes.insert(mesh.id(), mesh.version(), none, frame, gpu) {
            self.retired_buffers.push(old.vertex_buffer);
            self.retired_buffers.push(old.index_buffer);
        }
        Ok(gpu)
    }

    pub fn texture2d<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        diagnostics: &mut Diagnostics,
        texture: &Texture2D,
        frame: u64,
    ) -> BackendResult<TextureHandle> {
        let (id, version, params) = (texture.id(), texture.version(), texture.params_version());
        let sampler = sampler_descriptor(
            diagnostics,
            id,
            [texture.wrap_mode_u(), texture.wrap_mode_v(), texture.wrap_mode_w()],
            texture.filter_mode(),
        );
        match self.textures.lookup(id, version, params, frame) {
            Lookup::Hit(entry) => return Ok(entry.value),
            Lookup::ParamsStale(entry) => {
                backend.set_sampler(entry.value, &sampler);
                entry.params_version = params;
                return Ok(entry.value);
            }
            Lookup::Miss => {}
        }

        let capabilities = backend.capabilities();
        let (format, pixels) = upload_format(
            diagnostics,
            capabilities,
            id,
            texture.format(),
            texture.color_space(),
            texture.pixel_data(),
        );
        let handle = backend.create_texture(&TextureDescriptor {
            label: Some(format!("Texture {id}")),
            width: texture.width(),
            height: texture.height(),
            dimension: TextureDimension::D2,
            format,
            sample_count: 1,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        backend.write_texture(handle, 0, &pixels);
        backend.set_sampler(handle, &sampler);
        log::debug!("Uploaded texture {} (version {})", id, version.raw());

        if let Some(old) = self.textures.insert(id, version, params, frame, handle) {
            self.retired_textures.push(old);
        }
        Ok(handle)
    }

    pub fn cubemap<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        diagnostics: &mut Diagnostics,
        cubemap: &Cubemap,
        frame: u64,
    ) -> BackendResult<TextureHandle> {
        let (id, version, params) = (cubemap.id(), cubemap.version(), cubemap.params_version());
        let sampler = sampler_descriptor(
            diagnostics,
            id,
            [cubemap.wrap_mode_u(), cubemap.wrap_mode_v(), cubemap.wrap_mode_w()],
            cubemap.filter_mode(),
        );
        match self.cubemaps.lookup(id, version, params, frame) {
            Lookup::Hit(entry) => return Ok(entry.value),
            Lookup::ParamsStale(entry) => {
                backend.set_sampler(entry.value, &sampler);
                entry.params_version = params;
                return Ok(entry.value);
            }
            Lookup::Miss => {}
        }

        let capabilities = backend.capabilities();
        let mut faces = Vec::with_capacity(6);
        let mut format = GpuTextureFormat::Rgba8Unorm;
        for face in CubemapFace::ALL {
            let (face_format, pixels) = upload_format(
                diagnostics,
                capabilities,
                id,
                cubemap.format(),
                cubemap.color_space(),
                cubemap.pixel_data(face),
            );
            format = face_format;
            faces.push(pixels);
        }

        let handle = backend.create_texture(&TextureDescriptor {
            label: Some(format!("Cubemap {id}")),
            width: cubemap.width(),
            height: cubemap.width(),
            dimension: TextureDimension::Cube,
            format,
            sample_count: 1,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        for (face, pixels) in CubemapFace::ALL.iter().zip(&faces) {
            backend.write_texture(handle, face.layer(), pixels);
        }
        backend.set_sampler(handle, &sampler);
        log::debug!("Uploaded cubemap {} (version {})", id, version.raw());

        if let Some(old) = self.cubemaps.insert(id, version, params, frame, handle) {
            self.retired_textures.push(old);
        }
        Ok(handle)
    }

    /// Storage for `buffer`, allocated on first use
    pub fn render_buffer<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        diagnostics: &mut Diagnostics,
        buffer: &RenderBuffer,
        frame: u64,
    ) -> BackendResult<RenderBufferStorage> {
        let none = Version::default();
        if let Lookup::Hit(entry) = self.render_buffers.lookup(buffer.id(), none, none, frame) {
            return Ok(entry.value);
        }

        let descriptor = buffer.descriptor();
        let max_samples = backend.capabilities().max_sample_count.max(1);
        let mut samples = descriptor.anti_aliasing_level.samples();
        if samples > max_samples {
            diagnostics.warn_once(
                format!("samples:{samples}"),
                format_args!(
                    "{} samples requested but the backend supports {}, clamping",
                    samples, max_samples
                ),
            );
            samples = max_samples;
        }

        let format = render_buffer_format(descriptor.format);
        let readable_usage = if descriptor.format.is_depth() {
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING
        } else {
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_SRC
        };
        let label = format!("RenderBuffer {}", buffer.id());
        let (width, height) = (descriptor.dimensions.x, descriptor.dimensions.y);
        let mut create = |suffix: &str,
                          dimension: TextureDimension,
                          sample_count: u32,
                          usage: TextureUsage| {
            backend.create_texture(&TextureDescriptor {
                label: Some(format!("{label} {suffix}")),
                width,
                height,
                dimension,
                format,
                sample_count,
                usage,
            })
        };

        let msaa_usage = TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING;
        let storage = match (descriptor.dimensionality, samples > 1) {
            (TextureDimensionality::Tex2D, false) => RenderBufferStorage::SingleSampled2D {
                texture: create("Texture", TextureDimension::D2, 1, readable_usage)?,
            },
            (TextureDimensionality::Tex2D, true) => RenderBufferStorage::Multisampled2D {
                msaa: create("MSAA", TextureDimension::D2, samples, msaa_usage)?,
                resolve: create("Resolve", TextureDimension::D2, 1, readable_usage)?,
            },
            (TextureDimensionality::Cube, false) => RenderBufferStorage::SingleSampledCube {
                texture: create("Cube", TextureDimension::Cube, 1, readable_usage)?,
            },
            (TextureDimensionality::Cube, true) => RenderBufferStorage::MultisampledCube {
                scratch: create("MSAA Scratch", TextureDimension::D2, samples, msaa_usage)?,
                resolve: create("Resolve Cube", TextureDimension::Cube, 1, readable_usage)?,
            },
        };
        log::debug!("Allocated {:?} for render buffer {}", storage, buffer.id());
        self.render_buffers.insert(buffer.id(), none, none, frame, storage);
        Ok(storage)
    }

    pub fn mark_rendered(&mut self, buffer: &RenderBuffer) {
        self.rendered.insert(buffer.id());
    }

    pub fn is_rendered(&self, buffer: &RenderBuffer) -> bool {
        self.rendered.contains(&buffer.id())
    }

    /// 1x1 white texture bound where a real one is unavailable
    pub fn fallback<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        dimension: TextureDimension,
    ) -> BackendResult<TextureHandle> {
        let slot = match dimension {
            TextureDimension::D2 => &mut self.fallback_2d,
            TextureDimension::Cube => &mut self.fallback_cube,
        };
        if let Some(handle) = *slot {
            return Ok(handle);
        }
        let handle = backend.create_texture(&TextureDescriptor {
            label: Some(format!("Fallback {dimension:?}")),
            dimension,
            ..Default::default()
        })?;
        for layer in 0..dimension.layers() {
            backend.write_texture(handle, layer, &[255; 4]);
        }
        *slot = Some(handle);
        Ok(handle)
    }

    /// Destroy GPU objects replaced during the frame and those idle for too long
    pub fn collect_garbage<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        frame: u64,
        idle_frames: u64,
    ) {
        for buffer in self.retired_buffers.drain(..) {
            backend.destroy_buffer(buffer);
        }
        for texture in self.retired_textures.drain(..) {
            backend.destroy_texture(texture);
        }

        let mut evicted = 0;
        for (_, mesh) in self.meshes.evict_idle(frame, idle_frames) {
            backend.destroy_buffer(mesh.vertex_buffer);
            backend.destroy_buffer(mesh.index_buffer);
            evicted += 1;
        }
        for (_, texture) in self
            .textures
            .evict_idle(frame, idle_frames)
            .into_iter()
            .chain(self.cubemaps.evict_idle(frame, idle_frames))
        {
            backend.destroy_texture(texture);
            evicted += 1;
        }
        for (id, storage) in self.render_buffers.evict_idle(frame, idle_frames) {
            for texture in storage.textures() {
                backend.destroy_texture(texture);
            }
            self.rendered.remove(&id);
            evicted += 1;
        }
        if evicted > 0 {
            log::debug!("Evicted {} idle GPU resources", evicted);
        }
    }
}

fn render_buffer_format(format: RenderBufferFormat) -> GpuTextureFormat {
    match format {
        RenderBufferFormat::Color {
            format: RenderTextureFormat::Rgba8,
            color_space: ColorSpace::Srgb,
        } => GpuTextureFormat::Rgba8UnormSrgb,
        RenderBufferFormat::Color {
            format: RenderTextureFormat::Rgba8,
            color_space: ColorSpace::Linear,
        } => GpuTextureFormat::Rgba8Unorm,
        RenderBufferFormat::Color {
            format: RenderTextureFormat::Red8,
            ..
        } => GpuTextureFormat::R8Unorm,
        RenderBufferFormat::Color {
            format: RenderTextureFormat::RgbaFloat16,
            ..
        } => GpuTextureFormat::Rgba16Float,
        RenderBufferFormat::Depth(DepthStencilFormat::Depth24Stencil8) => {
            GpuTextureFormat::Depth24PlusStencil8
        }
        RenderBufferFormat::Depth(DepthStencilFormat::Depth32Float) => {
            GpuTextureFormat::Depth32Float
        }
    }
}

/// GPU format and texel bytes for CPU texture data. Float textures are quantized to
/// 8 bits when the backend cannot filter them.
fn upload_format(
    diagnostics: &mut Diagnostics,
    capabilities: BackendCapabilities,
    id: ResourceId,
    format: TextureFormat,
    color_space: ColorSpace,
    pixels: &[u8],
) -> (GpuTextureFormat, Vec<u8>) {
    match (format, color_space) {
        (TextureFormat::R8, _) => (GpuTextureFormat::R8Unorm, pixels.to_vec()),
        (TextureFormat::Rgba8, ColorSpace::Srgb) => {
            (GpuTextureFormat::Rgba8UnormSrgb, pixels.to_vec())
        }
        (TextureFormat::Rgba8, ColorSpace::Linear) => {
            (GpuTextureFormat::Rgba8Unorm, pixels.to_vec())
        }
        (TextureFormat::RgbaFloat, _) if capabilities.float32_filterable => {
            (GpuTextureFormat::Rgba32Float, pixels.to_vec())
        }
        (TextureFormat::RgbaFloat, _) => {
            diagnostics.warn_once(
                format!("float32-filterable:{id}"),
                format_args!(
                    "Float textures are not filterable on this device, texture {} is quantized to 8 bits",
                    id
                ),
            );
            let colors = crate::texture::decode_pixels(TextureFormat::RgbaFloat, pixels);
            (
                GpuTextureFormat::Rgba8Unorm,
                crate::texture::encode_pixels(TextureFormat::Rgba8, &colors),
            )
        }
    }
}

fn sampler_descriptor(
    diagnostics: &mut Diagnostics,
    id: ResourceId,
    wrap: [TextureWrapMode; 3],
    filter: TextureFilterMode,
) -> SamplerDescriptor {
    let address = |mode| match mode {
        TextureWrapMode::Repeat => AddressMode::Repeat,
        TextureWrapMode::Clamp => AddressMode::ClampToEdge,
        TextureWrapMode::Mirror => AddressMode::MirrorRepeat,
    };
    let filter = match filter {
        TextureFilterMode::Nearest => FilterMode::Nearest,
        TextureFilterMode::Linear => FilterMode::Linear,
        TextureFilterMode::Mipmap => {
            diagnostics.warn_once(
                format!("mipmap:{id}"),
                format_args!("Mipmap filtering is unsupported, texture {} uses linear", id),
            );
            FilterMode::Linear
        }
    };
    SamplerDescriptor {
        mag_filter: filter,
        min_filter: filter,
        address_mode_u: address(wrap[0]),
        address_mode_v: address(wrap[1]),
        address_mode_w: address(wrap[2]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, RecordingBackend};
    use crate::texture::{AntiAliasingLevel, RenderTexture, RenderTextureDescriptor};
    use glam::UVec2;
    use rstest::rstest;

    #[test]
    fn test_mesh_upload_is_lazy_and_versioned() {
        let mut backend = RecordingBackend::new(1, 1);
        let mut resources = GpuResources::default();
        let mut mesh = Mesh::cube();

        let first = resources.mesh(&mut backend, &mesh, 0).unwrap();
        let again = resources.mesh(&mut backend, &mesh, 0).unwrap();
        assert_eq!(first, again);
        assert_eq!(backend.buffer_count(), 2);

        mesh.transform_vertices(|v| v * 2.0);
        let updated = resources.mesh(&mut backend, &mesh, 1).unwrap();
        assert_ne!(updated.vertex_buffer, first.vertex_buffer);

        resources.collect_garbage(&mut backend, 1, 100);
        assert_eq!(backend.buffer_count(), 2);
    }

    #[test]
    fn test_sampler_change_does_not_reupload() {
        let mut backend = RecordingBackend::new(1, 1);
        let mut diagnostics = Diagnostics::default();
        let mut resources = GpuResources::default();
        let mut texture = Texture2D::from_color(crate::color::Color::WHITE, ColorSpace::Srgb);

        let handle = resources
            .texture2d(&mut backend, &mut diagnostics, &texture, 0)
            .unwrap();
        backend.clear_commands();

        texture.set_filter_mode(TextureFilterMode::Nearest);
        let same = resources
            .texture2d(&mut backend, &mut diagnostics, &texture, 0)
            .unwrap();
        assert_eq!(handle, same);
        assert!(matches!(backend.commands(), [Command::SetSampler { .. }]));
    }

    #[test]
    fn test_mipmap_falls_back_to_linear() {
        let mut diagnostics = Diagnostics::default();
        let id = ResourceId::next();
        let sampler = sampler_descriptor(
            &mut diagnostics,
            id,
            [TextureWrapMode::Clamp; 3],
            TextureFilterMode::Mipmap,
        );
        assert_eq!(sampler.min_filter, FilterMode::Linear);
        assert_eq!(sampler.address_mode_u, AddressMode::ClampToEdge);
        assert!(diagnostics.was_reported(&format!("mipmap:{id}")));
    }

    #[test]
    fn test_float_textures_degrade_without_capability() {
        let mut diagnostics = Diagnostics::default();
        let capabilities = BackendCapabilities {
            float32_filterable: false,
            ..Default::default()
        };
        let pixels = bytemuck::bytes_of(&crate::color::Color::RED).to_vec();
        let (format, bytes) = upload_format(
            &mut diagnostics,
            capabilities,
            ResourceId::next(),
            TextureFormat::RgbaFloat,
            ColorSpace::Linear,
            &pixels,
        );
        assert_eq!(format, GpuTextureFormat::Rgba8Unorm);
        assert_eq!(bytes, vec![255, 0, 0, 255]);
    }

    #[rstest]
    #[case(TextureDimensionality::Tex2D, 1, "SingleSampled2D")]
    #[case(TextureDimensionality::Tex2D, 4, "Multisampled2D")]
    #[case(TextureDimensionality::Cube, 1, "SingleSampledCube")]
    #[case(TextureDimensionality::Cube, 4, "MultisampledCube")]
    fn test_render_buffer_storage_kind(
        #[case] dimensionality: TextureDimensionality,
        #[case] samples: u32,
        #[case] expected: &str,
    ) {
        let mut backend = RecordingBackend::new(1, 1);
        let mut diagnostics = Diagnostics::default();
        let mut resources = GpuResources::default();
        let texture = RenderTexture::new(
            RenderTextureDescriptor::new(UVec2::splat(4))
                .with_dimensionality(dimensionality)
                .with_anti_aliasing_level(AntiAliasingLevel::new(samples)),
        );

        let storage = resources
            .render_buffer(&mut backend, &mut diagnostics, texture.color_buffer(), 0)
            .unwrap();
        assert!(format!("{storage:?}").starts_with(expected));
        assert_eq!(storage.resolve(0).is_some(), samples > 1);
    }
}
