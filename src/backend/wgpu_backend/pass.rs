//! Buffered render passes: draw snapshots, pipeline creation and replay

use std::collections::HashMap;
use std::ops::Range;

use wgpu::util::DeviceExt;

use crate::backend::types::*;

use super::conversion::*;
use super::{BoundVertexBuffer, GpuProgram, WgpuBackend, SURFACE_DEPTH_FORMAT};

/// Everything a render pipeline depends on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct PipelineKey {
    program: ProgramHandle,
    state: PipelineState,
    /// Indexed by vertex buffer slot, unused slots have no attributes
    vertex_layouts: Vec<VertexBufferLayout>,
    color_formats: Vec<wgpu::TextureFormat>,
    depth_format: Option<wgpu::TextureFormat>,
    sample_count: u32,
}

pub(super) enum DrawKind {
    Vertices(Range<u32>),
    Indexed { indices: Range<u32>, base_vertex: i32 },
}

/// The program state captured when a draw was issued
struct DrawCall {
    pipeline: PipelineKey,
    program: ProgramHandle,
    uniform_offset: u32,
    textures: Vec<TextureHandle>,
    vertex_buffers: Vec<(u32, BufferHandle, u64)>,
    index_buffer: Option<(BufferHandle, IndexFormat)>,
    kind: DrawKind,
    instances: Range<u32>,
}

enum PassCommand {
    SetViewport(Viewport),
    SetScissorRect(Option<ScissorRect>),
    Draw(Box<DrawCall>),
}

/// Pending render pass with buffered commands
pub(super) struct PendingRenderPass {
    descriptor: RenderPassDescriptor,
    color_formats: Vec<wgpu::TextureFormat>,
    depth_format: Option<wgpu::TextureFormat>,
    sample_count: u32,
    extent: (u32, u32),
    /// Set when an attachment could not be resolved; the pass is dropped
    invalid: Option<String>,
    uniform_data: Vec<u8>,
    commands: Vec<PassCommand>,
}

impl PendingRenderPass {
    pub(super) fn set_viewport(&mut self, viewport: Viewport) {
        self.commands.push(PassCommand::SetViewport(viewport));
    }

    pub(super) fn set_scissor_rect(&mut self, rect: Option<ScissorRect>) {
        self.commands.push(PassCommand::SetScissorRect(rect));
    }
}

/// A draw whose resources all exist, ready to replay
struct PreparedDraw<'a> {
    call: &'a DrawCall,
    pipeline: &'a wgpu::RenderPipeline,
    program: &'a GpuProgram,
    texture_group: Option<usize>,
}

enum Replay<'a> {
    SetViewport(Viewport),
    SetScissorRect(Option<ScissorRect>),
    Draw(PreparedDraw<'a>),
}

impl WgpuBackend {
    /// Describe the attachment formats of `desc` and start buffering its commands
    pub(super) fn begin_pass(&mut self, desc: &RenderPassDescriptor) {
        let mut invalid = None;
        let uses_surface = desc
            .color_attachments
            .iter()
            .map(|a| a.view)
            .chain(desc.depth_stencil_attachment.iter().map(|a| a.view))
            .any(|view| view == AttachmentView::Surface);
        if uses_surface {
            if let Err(e) = self.acquire_surface_texture() {
                invalid = Some(format!("surface unavailable: {e}"));
            }
        }

        let mut describe = |view: AttachmentView, depth: bool| match view {
            AttachmentView::Surface if depth => Some((
                SURFACE_DEPTH_FORMAT,
                self.surface_sample_count,
                self.surface_size,
            )),
            AttachmentView::Surface => Some((
                self.surface_format,
                self.surface_sample_count,
                self.surface_size,
            )),
            AttachmentView::Texture { texture, .. } => match self.textures.get(&texture.0) {
                Some(tex) => Some((
                    tex.texture.format(),
                    tex.texture.sample_count(),
                    (tex.texture.width(), tex.texture.height()),
                )),
                None => {
                    invalid = Some(format!("unknown attachment texture {}", texture.0));
                    None
                }
            },
        };

        let colors = desc
            .color_attachments
            .iter()
            .filter_map(|a| describe(a.view, false))
            .collect::<Vec<_>>();
        let depth = desc
            .depth_stencil_attachment
            .as_ref()
            .and_then(|a| describe(a.view, true));

        let first = colors.first().copied().or(depth);
        let (sample_count, extent) = first.map(|(_, s, e)| (s, e)).unwrap_or((1, (1, 1)));
        self.pending_render_pass = Some(PendingRenderPass {
            descriptor: desc.clone(),
            color_formats: colors.iter().map(|(f, _, _)| *f).collect(),
            depth_format: depth.map(|(f, _, _)| f),
            sample_count,
            extent,
            invalid,
            uniform_data: Vec::new(),
            commands: Vec::new(),
        });
    }

    /// Capture the current program state for a draw
    pub(super) fn snapshot_draw(
        &mut self,
        program: ProgramHandle,
        state: PipelineState,
        vertex_buffers: Vec<(u32, BoundVertexBuffer)>,
        kind: DrawKind,
        instances: Range<u32>,
    ) {
        let Some(pass) = self.pending_render_pass.as_mut() else {
            log::warn!("Draw outside of a render pass, skipping");
            return;
        };
        let Some(gpu_program) = self.programs.get(&program.0) else {
            log::warn!("Draw with unknown program {}, skipping", program.0);
            return;
        };

        let uniform_offset = if gpu_program.uniforms.is_empty() {
            0
        } else {
            let offset = (pass.uniform_data.len() as u64).next_multiple_of(self.uniform_alignment);
            pass.uniform_data.resize(offset as usize, 0);
            pass.uniform_data.extend_from_slice(&gpu_program.uniforms);
            offset as u32
        };

        let textures = gpu_program
            .texture_slots
            .iter()
            .map(|slot| {
                gpu_program
                    .textures
                    .get(&slot.binding)
                    .copied()
                    .filter(|handle| {
                        self.textures
                            .get(&handle.0)
                            .is_some_and(|tex| tex.dimension == slot.dimension)
                    })
                    .unwrap_or(match slot.dimension {
                        TextureDimension::D2 => self.fallback_2d,
                        TextureDimension::Cube => self.fallback_cube,
                    })
            })
            .collect();

        let slot_count = vertex_buffers
            .iter()
            .map(|(slot, _)| *slot as usize + 1)
            .max()
            .unwrap_or(0);
        let mut vertex_layouts = vec![
            VertexBufferLayout {
                array_stride: 0,
                step_mode: VertexStepMode::Vertex,
                attributes: Vec::new(),
            };
            slot_count
        ];
        for (slot, bound) in &vertex_buffers {
            vertex_layouts[*slot as usize] = bound.layout.clone();
        }

        let pipeline = PipelineKey {
            program,
            state,
            vertex_layouts,
            color_formats: pass.color_formats.clone(),
            depth_format: pass.depth_format,
            sample_count: pass.sample_count,
        };
        pass.commands.push(PassCommand::Draw(Box::new(DrawCall {
            pipeline,
            program,
            uniform_offset,
            textures,
            vertex_buffers: vertex_buffers
                .into_iter()
                .map(|(slot, bound)| (slot, bound.buffer, bound.offset))
                .collect(),
            index_buffer: self.index_buffer,
            kind,
            instances,
        })));
    }

    /// Build what the buffered draws need, then record and submit the pass
    pub(super) fn execute_pass(&mut self, pass: PendingRenderPass) {
        if let Some(reason) = &pass.invalid {
            log::warn!(
                "Dropping render pass {:?}: {}",
                pass.descriptor.label,
                reason
            );
            return;
        }

        for command in &pass.commands {
            if let PassCommand::Draw(call) = command {
                if !self.pipelines.contains_key(&call.pipeline) {
                    if let Some(pipeline) = self.create_pipeline(&call.pipeline) {
                        self.pipelines.insert(call.pipeline.clone(), pipeline);
                    }
                }
            }
        }

        let uniform_buffer = (!pass.uniform_data.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Pass Uniforms"),
                    contents: &pass.uniform_data,
                    usage: wgpu::BufferUsages::UNIFORM,
                })
        });

        let mut uniform_groups: HashMap<ProgramHandle, wgpu::BindGroup> = HashMap::new();
        let mut texture_groups: Vec<wgpu::BindGroup> = Vec::new();
        let mut texture_group_index: HashMap<(ProgramHandle, &[TextureHandle]), usize> =
            HashMap::new();
        let mut group_indices = Vec::with_capacity(pass.commands.len());

        for command in &pass.commands {
            let PassCommand::Draw(call) = command else {
                group_indices.push(None);
                continue;
            };
            let Some(program) = self.programs.get(&call.program.0) else {
                group_indices.push(None);
                continue;
            };
            if let Some(buffer) = &uniform_buffer {
                if !program.uniforms.is_empty() && !uniform_groups.contains_key(&call.program) {
                    let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("Uniform Group"),
                        layout: &program.uniform_layout,
                        entries: &[wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                buffer,
                                offset: 0,
                                size: wgpu::BufferSize::new(program.uniforms.len() as u64),
                            }),
                        }],
                    });
                    uniform_groups.insert(call.program, group);
                }
            }

            let index = match &program.texture_layout {
                Some(layout) => {
                    let key = (call.program, call.textures.as_slice());
                    match texture_group_index.get(&key) {
                        Some(index) => Some(*index),
                        None => {
                            let group = self.create_texture_group(program, layout, &call.textures);
                            group.map(|group| {
                                texture_groups.push(group);
                                texture_group_index.insert(key, texture_groups.len() - 1);
                                texture_groups.len() - 1
                            })
                        }
                    }
                }
                None => None,
            };
            group_indices.push(index);
        }

        let mut replay = Vec::with_capacity(pass.commands.len());
        for (command, texture_group) in pass.commands.iter().zip(group_indices) {
            match command {
                PassCommand::SetViewport(viewport) => replay.push(Replay::SetViewport(*viewport)),
                PassCommand::SetScissorRect(rect) => replay.push(Replay::SetScissorRect(*rect)),
                PassCommand::Draw(call) => {
                    if let Some(draw) = self.prepare_draw(call, texture_group) {
                        replay.push(Replay::Draw(draw));
                    }
                }
            }
        }

        let Some((color_views, depth_view)) = self.attachment_views(&pass.descriptor) else {
            log::warn!(
                "Dropping render pass {:?}: attachment views unavailable",
                pass.descriptor.label
            );
            return;
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: pass.descriptor.label.as_deref(),
            });
        {
            let color_attachments = pass
                .descriptor
                .color_attachments
                .iter()
                .zip(&color_views)
                .map(|(attachment, (view, resolve_target))| {
                    Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: resolve_target.as_ref(),
                        ops: wgpu::Operations {
                            load: color_load_op(attachment.load_op),
                            store: store_op(attachment.store_op),
                        },
                    })
                })
                .collect::<Vec<_>>();
            let depth_stencil_attachment = pass
                .descriptor
                .depth_stencil_attachment
                .as_ref()
                .zip(depth_view.as_ref())
                .map(|(attachment, view)| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: match attachment.depth_load_op {
                            LoadOp::Clear(_) => wgpu::LoadOp::Clear(attachment.depth_clear_value),
                            LoadOp::Load => wgpu::LoadOp::Load,
                        },
                        store: store_op(attachment.depth_store_op),
                    }),
                    stencil_ops: None,
                });

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: pass.descriptor.label.as_deref(),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let (width, height) = pass.extent;
            for command in &replay {
                match command {
                    Replay::SetViewport(v) => {
                        render_pass.set_viewport(v.x, v.y, v.width, v.height, 0.0, 1.0)
                    }
                    Replay::SetScissorRect(Some(rect)) => {
                        let x = rect.x.min(width);
                        let y = rect.y.min(height);
                        render_pass.set_scissor_rect(
                            x,
                            y,
                            rect.width.min(width - x),
                            rect.height.min(height - y),
                        );
                    }
                    Replay::SetScissorRect(None) => render_pass.set_scissor_rect(0, 0, width, height),
                    Replay::Draw(draw) => {
                        render_pass.set_pipeline(draw.pipeline);
                        match (&draw.program.empty_group, uniform_groups.get(&draw.call.program)) {
                            (Some(empty), _) => render_pass.set_bind_group(0, empty, &[]),
                            (None, Some(group)) => {
                                render_pass.set_bind_group(0, group, &[draw.call.uniform_offset])
                            }
                            (None, None) => continue,
                        }
                        if let Some(index) = draw.texture_group {
                            render_pass.set_bind_group(1, &texture_groups[index], &[]);
                        }
                        for (slot, buffer, offset) in &draw.call.vertex_buffers {
                            if let Some(buf) = self.buffers.get(&buffer.0) {
                                render_pass.set_vertex_buffer(*slot, buf.slice(*offset..));
                            }
                        }
                        match &draw.call.kind {
                            DrawKind::Vertices(vertices) => {
                                render_pass.draw(vertices.clone(), draw.call.instances.clone())
                            }
                            DrawKind::Indexed {
                                indices,
                                base_vertex,
                            } => {
                                if let Some((buffer, format)) = draw.call.index_buffer {
                                    if let Some(buf) = self.buffers.get(&buffer.0) {
                                        render_pass.set_index_buffer(buf.slice(..), index_format(format));
                                    }
                                }
                                render_pass.draw_indexed(
                                    indices.clone(),
                                    *base_vertex,
                                    draw.call.instances.clone(),
                                );
                            }
                        }
                    }
                }
            }
            // render_pass is dropped here, ending the pass
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Resolve the resources of a buffered draw, or `None` if any are gone
    fn prepare_draw<'a>(
        &'a self,
        call: &'a DrawCall,
        texture_group: Option<usize>,
    ) -> Option<PreparedDraw<'a>> {
        let program = self.programs.get(&call.program.0)?;
        let pipeline = self.pipelines.get(&call.pipeline)?;
        if program.texture_layout.is_some() && texture_group.is_none() {
            return None;
        }
        let buffers_exist = call
            .vertex_buffers
            .iter()
            .all(|(_, buffer, _)| self.buffers.contains_key(&buffer.0));
        if !buffers_exist {
            log::debug!("Draw references a destroyed vertex buffer, skipping");
            return None;
        }
        if let DrawKind::Indexed { .. } = call.kind {
            let (buffer, _) = call.index_buffer?;
            if !self.buffers.contains_key(&buffer.0) {
                log::debug!("Indexed draw without an index buffer, skipping");
                return None;
            }
        }
        Some(PreparedDraw {
            call,
            pipeline,
            program,
            texture_group,
        })
    }

    fn create_texture_group(
        &self,
        program: &GpuProgram,
        layout: &wgpu::BindGroupLayout,
        textures: &[TextureHandle],
    ) -> Option<wgpu::BindGroup> {
        let mut entries = Vec::with_capacity(textures.len() * 2);
        for (slot, handle) in program.texture_slots.iter().zip(textures) {
            let texture = self.textures.get(&handle.0)?;
            entries.push(wgpu::BindGroupEntry {
                binding: slot.binding,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: slot.binding + 1,
                resource: wgpu::BindingResource::Sampler(&texture.sampler),
            });
        }
        Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Texture Group"),
            layout,
            entries: &entries,
        }))
    }

    fn create_pipeline(&self, key: &PipelineKey) -> Option<wgpu::RenderPipeline> {
        let program = self.programs.get(&key.program.0)?;
        log::debug!("Creating pipeline for program {}", key.program.0);

        let attributes = key
            .vertex_layouts
            .iter()
            .map(|layout| {
                layout
                    .attributes
                    .iter()
                    .map(|a| wgpu::VertexAttribute {
                        format: vertex_format(a.format),
                        offset: a.offset,
                        shader_location: a.location,
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let buffers = key
            .vertex_layouts
            .iter()
            .zip(&attributes)
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.array_stride,
                step_mode: step_mode(layout.step_mode),
                attributes,
            })
            .collect::<Vec<_>>();

        let features = self.device.features();
        let targets = key
            .color_formats
            .iter()
            .enumerate()
            .map(|(i, format)| {
                let blendable = format
                    .guaranteed_format_features(features)
                    .flags
                    .contains(wgpu::TextureFormatFeatureFlags::BLENDABLE);
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend: key.state.blend.filter(|_| blendable).map(blend_state),
                    write_mask: if (i as u32) < program.color_outputs {
                        wgpu::ColorWrites::ALL
                    } else {
                        wgpu::ColorWrites::empty()
                    },
                })
            })
            .collect::<Vec<_>>();

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Render Pipeline"),
                layout: Some(&program.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.module,
                    entry_point: &program.vertex_entry,
                    buffers: &buffers,
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.module,
                    entry_point: &program.fragment_entry,
                    targets: &targets,
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: topology(key.state.topology),
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: cull_mode(key.state.cull_mode),
                    unclipped_depth: false,
                    polygon_mode: polygon_mode(key.state.polygon_mode),
                    conservative: false,
                },
                depth_stencil: key.depth_format.map(|format| wgpu::DepthStencilState {
                    format,
                    depth_write_enabled: key.state.depth_write,
                    depth_compare: compare_function(key.state.depth_compare),
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: key.sample_count,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
            });
        Some(pipeline)
    }

    /// Views for each color attachment (with its resolve target) and the depth attachment
    #[allow(clippy::type_complexity)]
    fn attachment_views(
        &self,
        desc: &RenderPassDescriptor,
    ) -> Option<(
        Vec<(wgpu::TextureView, Option<wgpu::TextureView>)>,
        Option<wgpu::TextureView>,
    )> {
        let default_view = wgpu::TextureViewDescriptor::default();
        let layer_view = |texture: TextureHandle, layer: u32| {
            let tex = self.textures.get(&texture.0)?;
            Some(tex.texture.create_view(&wgpu::TextureViewDescriptor {
                dimension: Some(wgpu::TextureViewDimension::D2),
                base_array_layer: layer,
                array_layer_count: Some(1),
                ..Default::default()
            }))
        };

        let mut colors = Vec::with_capacity(desc.color_attachments.len());
        for attachment in &desc.color_attachments {
            let views = match attachment.view {
                AttachmentView::Surface => {
                    let surface = self.surface_texture()?.create_view(&default_view);
                    match &self.surface_msaa {
                        Some(msaa) => (msaa.create_view(&default_view), Some(surface)),
                        None => (surface, None),
                    }
                }
                AttachmentView::Texture { texture, layer } => (layer_view(texture, layer)?, None),
            };
            colors.push(views);
        }
        let depth = match desc.depth_stencil_attachment.as_ref().map(|a| a.view) {
            Some(AttachmentView::Surface) => Some(self.surface_depth.create_view(&default_view)),
            Some(AttachmentView::Texture { texture, layer }) => Some(layer_view(texture, layer)?),
            None => None,
        };
        Some((colors, depth))
    }
}
