//! Transfers outside of render passes: multisample resolves and CPU readback

use crate::backend::traits::{BackendError, BackendResult};
use crate::backend::types::{Readback, TextureHandle};

use super::conversion::texture_format;
use super::WgpuBackend;

const COPY_BYTES_PER_ROW_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// Copies sample 0 of a multisampled depth texture into the bound depth attachment
const DEPTH_RESOLVE_WGSL: &str = r#"
@group(0) @binding(0) var source: texture_depth_multisampled_2d;

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    return vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
}

@fragment
fn fs_main(@builtin(position) position: vec4<f32>) -> @builtin(frag_depth) f32 {
    return textureLoad(source, vec2<i32>(position.xy), 0);
}
"#;

/// Full-screen depth copy pipeline for one destination format
pub(super) struct DepthResolvePipeline {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
}

impl WgpuBackend {
    /// Resolve `src` into one layer of `dst` with a load-and-resolve pass
    pub(super) fn resolve(&mut self, src: TextureHandle, dst: TextureHandle, dst_layer: u32) {
        let (Some(src_tex), Some(dst_tex)) =
            (self.textures.get(&src.0), self.textures.get(&dst.0))
        else {
            log::warn!("Resolve between unknown textures {} -> {}", src.0, dst.0);
            return;
        };
        if src_tex.format.is_depth() {
            self.resolve_depth(src, dst, dst_layer);
            return;
        }

        let src_view = src_tex
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let dst_view = dst_tex.texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_array_layer: dst_layer,
            array_layer_count: Some(1),
            ..Default::default()
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Resolve Encoder"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Resolve"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &src_view,
                    resolve_target: Some(&dst_view),
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Depth cannot be a resolve target, so sample 0 is copied with a full-screen pass
    fn resolve_depth(&mut self, src: TextureHandle, dst: TextureHandle, dst_layer: u32) {
        let Some(format) = self.textures.get(&dst.0).map(|t| texture_format(t.format)) else {
            return;
        };
        if !self.depth_resolve.contains_key(&format) {
            let pipeline = create_depth_resolve_pipeline(&self.device, format);
            self.depth_resolve.insert(format, pipeline);
        }
        let (Some(src_tex), Some(dst_tex), Some(resolve)) = (
            self.textures.get(&src.0),
            self.textures.get(&dst.0),
            self.depth_resolve.get(&format),
        ) else {
            return;
        };

        let src_view = src_tex.texture.create_view(&wgpu::TextureViewDescriptor {
            aspect: wgpu::TextureAspect::DepthOnly,
            ..Default::default()
        });
        let dst_view = dst_tex.texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_array_layer: dst_layer,
            array_layer_count: Some(1),
            ..Default::default()
        });
        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Depth Resolve Group"),
            layout: &resolve.layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&src_view),
            }],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Depth Resolve Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Depth Resolve"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &dst_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&resolve.pipeline);
            pass.set_bind_group(0, &group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Copy one layer of `texture` to the CPU as tightly packed RGBA8
    pub(super) fn read_layer(&self, texture: &wgpu::Texture, layer: u32) -> BackendResult<Readback> {
        if texture.sample_count() > 1 {
            return Err(BackendError::ReadbackFailed(
                "multisampled textures must be resolved first".into(),
            ));
        }
        let format = texture.format();
        let bytes_per_pixel = match format {
            wgpu::TextureFormat::R8Unorm => 1,
            wgpu::TextureFormat::Rgba8Unorm
            | wgpu::TextureFormat::Rgba8UnormSrgb
            | wgpu::TextureFormat::Bgra8Unorm
            | wgpu::TextureFormat::Bgra8UnormSrgb => 4,
            other => {
                return Err(BackendError::ReadbackFailed(format!(
                    "cannot read back {other:?} textures"
                )))
            }
        };

        let (width, height) = (texture.width(), texture.height());
        let bytes_per_row = width * bytes_per_pixel;
        let padded_bytes_per_row =
            bytes_per_row.div_ceil(COPY_BYTES_PER_ROW_ALIGNMENT) * COPY_BYTES_PER_ROW_ALIGNMENT;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging Buffer"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?;

        let rgba8 = {
            let mapped = slice.get_mapped_range();
            let mut rgba8 = Vec::with_capacity((width * height * 4) as usize);
            for row in mapped.chunks(padded_bytes_per_row as usize) {
                let row = &row[..bytes_per_row as usize];
                match format {
                    wgpu::TextureFormat::R8Unorm => {
                        rgba8.extend(row.iter().flat_map(|&r| [r, 0, 0, 255]))
                    }
                    wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => {
                        rgba8.extend(row.chunks(4).flat_map(|p| [p[2], p[1], p[0], p[3]]))
                    }
                    _ => rgba8.extend_from_slice(row),
                }
            }
            rgba8
        };
        staging.unmap();

        Ok(Readback {
            width,
            height,
            rgba8,
        })
    }
}

fn create_depth_resolve_pipeline(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
) -> DepthResolvePipeline {
    log::debug!("Creating depth resolve pipeline for {:?}", format);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Depth Resolve"),
        source: wgpu::ShaderSource::Wgsl(DEPTH_RESOLVE_WGSL.into()),
    });
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Depth Resolve Layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Depth,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: true,
            },
            count: None,
        }],
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Depth Resolve"),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Depth Resolve"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &module,
            entry_point: "vs_main",
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &module,
            entry_point: "fs_main",
            targets: &[],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: Some(wgpu::DepthStencilState {
            format,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Always,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    });
    DepthResolvePipeline { layout, pipeline }
}
