//! Turning a camera queue into draw calls.
//!
//! The queue is split into runs of depth-tested and not-depth-tested objects, preserving
//! submission order between runs. Depth-tested runs draw their opaque objects batched by
//! the configured key order, then their transparent objects back to front. Not-depth-tested
//! runs draw in submission order, coalescing neighbours that share every batch key.

use std::ops::Range;

use crate::backend::{
    AttributeFormat, BlendState, CompareFunction, CullMode as GpuCullMode, GraphicsBackend,
    PipelineState, PolygonMode, PrimitiveTopology, ProgramHandle, VertexAttribute as GpuAttribute,
    VertexBufferLayout, VertexStepMode,
};
use crate::config::BatchKey;
use crate::error::RenderError;
use crate::material::{CullMode, DepthFunction, Material, MaterialPropertyBlock};
use crate::mesh::{Mesh, MeshTopology, VertexAttribute, VertexAttributeFormat};
use crate::scene::{CameraUniforms, RenderObject};
use crate::shader::attribute_name;

use super::instancing::InstanceLayout;
use super::resources::GpuMesh;
use super::GraphicsContext;

/// What is currently bound on the backend during one flush
#[derive(Debug, Default)]
struct BoundState {
    material: Option<Material>,
    program: Option<ProgramHandle>,
    /// Texture units taken by the bound material
    material_units: u32,
    block: Option<Option<MaterialPropertyBlock>>,
    /// A property block has overwritten some material values
    block_applied: bool,
    /// Mesh whose index buffer is bound
    mesh: Option<Mesh>,
    /// Mesh and program the per-vertex layout was built for
    vertex_layout: Option<(Mesh, ProgramHandle)>,
    pipeline: Option<PipelineState>,
}

impl<B: GraphicsBackend> GraphicsContext<B> {
    /// Draw every object of `queue` with the given camera matrices.
    pub(crate) fn flush_queue(
        &mut self,
        queue: &[RenderObject],
        camera: &CameraUniforms,
    ) -> Result<(), RenderError> {
        self.stats.objects += queue.len();
        let mut state = BoundState::default();

        for run in queue.chunk_by(|a, b| {
            a.material.is_depth_tested() == b.material.is_depth_tested()
        }) {
            let depth_tested = run[0].material.is_depth_tested();
            self.backend.set_depth_testing(depth_tested);

            if depth_tested {
                self.draw_batched_by_opaqueness(run, camera, &mut state)?;
            } else {
                for batch in run.chunk_by(|a, b| a.same_batch(b)) {
                    let batch: Vec<&RenderObject> = batch.iter().collect();
                    self.handle_batch_with_same_material(&batch, camera, &mut state)?;
                }
            }
        }
        Ok(())
    }

    fn draw_batched_by_opaqueness(
        &mut self,
        run: &[RenderObject],
        camera: &CameraUniforms,
        state: &mut BoundState,
    ) -> Result<(), RenderError> {
        let (opaque, mut transparent): (Vec<&RenderObject>, Vec<&RenderObject>) =
            run.iter().partition(|o| !o.material.is_transparent());

        self.draw_render_objects(opaque, camera, state)?;

        transparent.sort_by(|a, b| {
            let da = a.centroid.distance_squared(camera.position);
            let db = b.centroid.distance_squared(camera.position);
            db.total_cmp(&da)
        });
        for object in transparent {
            self.handle_batch_with_same_material(&[object], camera, state)?;
        }
        Ok(())
    }

    fn draw_render_objects(
        &mut self,
        objects: Vec<&RenderObject>,
        camera: &CameraUniforms,
        state: &mut BoundState,
    ) -> Result<(), RenderError> {
        let mut batches = Vec::new();
        group_by_keys(objects, &self.config.batching_order, &mut batches);
        for batch in batches {
            self.handle_batch_with_same_material(&batch, camera, state)?;
        }
        Ok(())
    }

    fn handle_batch_with_same_material(
        &mut self,
        batch: &[&RenderObject],
        camera: &CameraUniforms,
        state: &mut BoundState,
    ) -> Result<(), RenderError> {
        let material = &batch[0].material;
        if state.material.as_ref() != Some(material) {
            let shader = material.shader();
            let program = self.resources.program(&mut self.backend, shader, self.frame)?;
            if state.program != Some(program) {
                self.backend.set_program(program);
                self.bind_camera_uniforms(shader, camera);
                state.program = Some(program);
                self.stats.state_changes += 1;
            }

            let mut units = 0;
            self.bind_values(shader, material.values(), &mut units)?;
            state.material = Some(material.clone());
            state.material_units = units;
            state.block = None;
            state.block_applied = false;
        }
        self.handle_batch_with_same_property_block(batch, state)
    }

    fn handle_batch_with_same_property_block(
        &mut self,
        batch: &[&RenderObject],
        state: &mut BoundState,
    ) -> Result<(), RenderError> {
        let block = batch[0].block.as_ref();
        if state.block.as_ref().map(Option::as_ref) != Some(block) {
            let material = &batch[0].material;
            let shader = material.shader();
            if state.block_applied {
                let mut units = 0;
                self.bind_values(shader, material.values(), &mut units)?;
                state.block_applied = false;
            }
            if let Some(block) = block {
                let mut units = state.material_units;
                self.bind_values(shader, block.values(), &mut units)?;
                state.block_applied = true;
            }
            state.block = Some(block.cloned());
        }
        self.handle_batch_with_same_mesh(batch, state)
    }

    fn handle_batch_with_same_mesh(
        &mut self,
        batch: &[&RenderObject],
        state: &mut BoundState,
    ) -> Result<(), RenderError> {
        let mesh = &batch[0].mesh;
        if !mesh.has_verts() || mesh.num_indices() == 0 {
            return Ok(());
        }
        let Some(program) = state.program else {
            return Ok(());
        };

        let gpu = self.resources.mesh(&mut self.backend, mesh, self.frame)?;
        let layout_bound =
            matches!(&state.vertex_layout, Some((m, p)) if m == mesh && *p == program);
        if !layout_bound {
            let Some(layout) = self.vertex_layout(batch[0]) else {
                state.vertex_layout = None;
                return Ok(());
            };
            self.backend
                .set_vertex_buffer(0, gpu.vertex_buffer, 0, &layout);
            state.vertex_layout = Some((mesh.clone(), program));
        }
        if state.mesh.as_ref() != Some(mesh) {
            self.backend.set_index_buffer(gpu.index_buffer, gpu.index_format);
            state.mesh = Some(mesh.clone());
        }
        self.handle_batch_with_same_submesh(batch, gpu, state)
    }

    fn handle_batch_with_same_submesh(
        &mut self,
        batch: &[&RenderObject],
        gpu: GpuMesh,
        state: &mut BoundState,
    ) -> Result<(), RenderError> {
        let first = batch[0];
        let mesh = &first.mesh;
        let (indices, topology) = match first.sub_mesh {
            Some(index) => {
                let descriptor = mesh.sub_mesh_descriptor(index).ok_or(
                    RenderError::SubMeshOutOfRange {
                        index,
                        count: mesh.sub_mesh_count(),
                    },
                )?;
                (
                    descriptor.index_start..descriptor.index_start + descriptor.index_count,
                    descriptor.topology,
                )
            }
            None => (0..mesh.num_indices(), mesh.topology()),
        };
        if indices.is_empty() {
            return Ok(());
        }
        if indices.end > mesh.num_indices() {
            self.diagnostics.warn_once(
                format!("range:{}:{:?}", mesh.id(), first.sub_mesh),
                format_args!(
                    "Sub-mesh {:?} of mesh {} reads indices {:?} past the end ({}), skipping",
                    first.sub_mesh,
                    mesh.id(),
                    indices,
                    mesh.num_indices()
                ),
            );
            return Ok(());
        }
        let indices = indices.start as u32..indices.end as u32;

        let pipeline = self.pipeline_state(&first.material, topology);
        if state.pipeline != Some(pipeline) {
            self.backend.set_pipeline_state(&pipeline);
            state.pipeline = Some(pipeline);
            self.stats.state_changes += 1;
        }
        self.stats.batches += 1;

        let shader = first.material.shader();
        match InstanceLayout::for_shader(shader) {
            Some(layout) if self.config.instancing => {
                self.draw_instanced(&layout, batch, indices)?;
            }
            Some(layout) => {
                for object in batch {
                    self.draw_instanced(&layout, &[object], indices.clone())?;
                }
            }
            None => {
                for object in batch {
                    self.bind_model_uniforms(shader, &object.transform, &object.normal_matrix);
                    self.backend.draw_indexed(indices.clone(), 0, 0..1);
                    self.stats.draw_calls += 1;
                }
            }
        }
        log::trace!(
            "Drew batch of {} (mesh {}, index buffer {:?})",
            batch.len(),
            mesh.id(),
            gpu.index_buffer
        );
        Ok(())
    }

    fn draw_instanced(
        &mut self,
        layout: &InstanceLayout,
        objects: &[&RenderObject],
        indices: Range<u32>,
    ) -> Result<(), RenderError> {
        let data = layout.pack(objects);
        let (buffer, offset) = self.instances.write(&mut self.backend, &data)?;
        self.backend
            .set_vertex_buffer(1, buffer, offset, &layout.layout);
        self.backend
            .draw_indexed(indices, 0, 0..objects.len() as u32);
        self.stats.draw_calls += 1;
        if objects.len() > 1 {
            self.stats.instanced_draw_calls += 1;
        }
        Ok(())
    }

    /// Per-vertex layout feeding the attributes the object's shader declares, or `None` if
    /// the mesh lacks one of them.
    fn vertex_layout(&mut self, object: &RenderObject) -> Option<VertexBufferLayout> {
        let shader = object.material.shader();
        let format = object.mesh.vertex_format();
        let mut attributes = Vec::new();
        for attribute in VertexAttribute::ALL {
            let Some(element) = shader.find_attribute(attribute_name(attribute)) else {
                continue;
            };
            let Some(layout) = format.layout(attribute) else {
                self.diagnostics.warn_once(
                    format!("attribute:{}:{}", object.mesh.id(), shader.id()),
                    format_args!(
                        "Mesh {} has no {:?} attribute required by shader {}, skipping",
                        object.mesh.id(),
                        attribute,
                        shader.id()
                    ),
                );
                return None;
            };
            attributes.push(GpuAttribute {
                location: element.location,
                format: attribute_format(layout.format),
                offset: layout.offset as u64,
            });
        }
        Some(VertexBufferLayout {
            array_stride: format.stride() as u64,
            step_mode: VertexStepMode::Vertex,
            attributes,
        })
    }

    fn pipeline_state(&mut self, material: &Material, topology: MeshTopology) -> PipelineState {
        let wireframe = material.is_wireframe() && {
            let supported = self.backend.capabilities().wireframe;
            if !supported {
                self.diagnostics.warn_once(
                    "wireframe",
                    format_args!("Wireframe rendering is unsupported, drawing filled"),
                );
            }
            supported
        };
        let depth_tested = material.is_depth_tested();

        PipelineState {
            topology: match topology {
                MeshTopology::Triangles => PrimitiveTopology::TriangleList,
                MeshTopology::Lines => PrimitiveTopology::LineList,
            },
            blend: material
                .is_transparent()
                .then(BlendState::alpha_blending),
            depth_compare: match (depth_tested, material.depth_function()) {
                (false, _) => CompareFunction::Always,
                (true, DepthFunction::Less) => CompareFunction::Less,
                (true, DepthFunction::LessOrEqual) => CompareFunction::LessEqual,
            },
            depth_write: depth_tested,
            cull_mode: match material.cull_mode() {
                CullMode::Off => GpuCullMode::None,
                CullMode::Back => GpuCullMode::Back,
                CullMode::Front => GpuCullMode::Front,
            },
            polygon_mode: if wireframe {
                PolygonMode::Line
            } else {
                PolygonMode::Fill
            },
        }
    }
}

/// Split `objects` into groups sharing each key in `keys` in turn, appending the innermost
/// groups to `out`. Groups keep the order of their first member.
fn group_by_keys<'a>(
    objects: Vec<&'a RenderObject>,
    keys: &[BatchKey],
    out: &mut Vec<Vec<&'a RenderObject>>,
) {
    let Some((key, rest)) = keys.split_first() else {
        out.push(objects);
        return;
    };

    let mut groups: Vec<Vec<&RenderObject>> = Vec::new();
    for object in objects {
        match groups.iter_mut().find(|g| same_key(*key, g[0], object)) {
            Some(group) => group.push(object),
            None => groups.push(vec![object]),
        }
    }
    for group in groups {
        group_by_keys(group, rest, out);
    }
}

fn same_key(key: BatchKey, a: &RenderObject, b: &RenderObject) -> bool {
    match key {
        BatchKey::Material => a.material == b.material,
        BatchKey::PropertyBlock => a.block == b.block,
        BatchKey::Mesh => a.mesh == b.mesh,
        BatchKey::SubMesh => a.sub_mesh == b.sub_mesh,
    }
}

fn attribute_format(format: VertexAttributeFormat) -> AttributeFormat {
    match format {
        VertexAttributeFormat::Float32x2 => AttributeFormat::Float32x2,
        VertexAttributeFormat::Float32x3 => AttributeFormat::Float32x3,
        VertexAttributeFormat::Float32x4 => AttributeFormat::Float32x4,
        VertexAttributeFormat::Unorm8x4 => AttributeFormat::Unorm8x4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, RecordingBackend, RenderPassDescriptor};
    use crate::config::RendererConfig;
    use crate::shader::Shader;
    use crate::testing::{context_lock, BASIC_WGSL, INSTANCED_WGSL};
    use glam::{Mat4, Vec3};

    fn object(mesh: &Mesh, material: &Material, position: Vec3) -> RenderObject {
        RenderObject::new(
            mesh.clone(),
            Mat4::from_translation(position),
            material.clone(),
            None,
            None,
        )
    }

    fn uniforms_at(position: Vec3) -> CameraUniforms {
        CameraUniforms {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            view_projection: Mat4::IDENTITY,
            position,
        }
    }

    fn context(config: RendererConfig) -> GraphicsContext<RecordingBackend> {
        let mut ctx = GraphicsContext::new(RecordingBackend::new(16, 16), config).unwrap();
        ctx.backend_mut().begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: Vec::new(),
            depth_stencil_attachment: None,
        });
        ctx
    }

    fn draws(commands: &[Command]) -> Vec<u32> {
        commands
            .iter()
            .filter(|c| c.is_draw())
            .map(|c| c.instance_count())
            .collect()
    }

    #[test]
    fn test_group_by_keys_is_stable() {
        let shader = Shader::from_wgsl(BASIC_WGSL).unwrap();
        let (m1, m2) = (Material::new(shader.clone()), Material::new(shader));
        let (x, y) = (Mesh::cube(), Mesh::plane(1.0, 1.0, 1));
        let queue = [
            object(&x, &m2, Vec3::ZERO),
            object(&x, &m1, Vec3::ZERO),
            object(&y, &m2, Vec3::ZERO),
            object(&x, &m2, Vec3::ZERO),
        ];

        let mut batches = Vec::new();
        group_by_keys(queue.iter().collect(), &BatchKey::DEFAULT_ORDER, &mut batches);
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 1, 1]);
        assert!(batches[0][0].material == m2 && batches[0][0].mesh == x);
        assert!(batches[1][0].mesh == y);
        assert!(batches[2][0].material == m1);
    }

    #[test]
    fn test_instanced_batch_is_one_draw() {
        let _guard = context_lock();
        let mut ctx = context(RendererConfig::default());
        let material = Material::new(Shader::from_wgsl(INSTANCED_WGSL).unwrap());
        let mesh = Mesh::cube();
        let queue: Vec<RenderObject> = (0..3)
            .map(|i| object(&mesh, &material, Vec3::X * i as f32))
            .collect();

        ctx.flush_queue(&queue, &uniforms_at(Vec3::ZERO)).unwrap();
        assert_eq!(draws(ctx.backend().commands()), vec![3]);
        assert_eq!(ctx.stats().instanced_draw_calls, 1);
    }

    #[test]
    fn test_instancing_disabled_draws_per_object() {
        let _guard = context_lock();
        let config = RendererConfig::default().with_instancing(false);
        let mut ctx = context(config);
        let material = Material::new(Shader::from_wgsl(INSTANCED_WGSL).unwrap());
        let mesh = Mesh::cube();
        let queue = vec![
            object(&mesh, &material, Vec3::ZERO),
            object(&mesh, &material, Vec3::Y),
        ];

        ctx.flush_queue(&queue, &uniforms_at(Vec3::ZERO)).unwrap();
        assert_eq!(draws(ctx.backend().commands()), vec![1, 1]);
    }

    #[test]
    fn test_uniform_shader_sets_model_per_draw() {
        let _guard = context_lock();
        let mut ctx = context(RendererConfig::default());
        let shader = Shader::from_wgsl(BASIC_WGSL).unwrap();
        let model_location = shader.find_property("u_model_mat").unwrap().location;
        let material = Material::new(shader);
        let mesh = Mesh::cube();
        let queue = vec![
            object(&mesh, &material, Vec3::ZERO),
            object(&mesh, &material, Vec3::Y),
        ];

        ctx.flush_queue(&queue, &uniforms_at(Vec3::ZERO)).unwrap();
        let commands = ctx.backend().commands();
        let model_writes = commands
            .iter()
            .filter(|c| matches!(c, Command::SetUniform { location, .. } if *location == model_location))
            .count();
        assert_eq!(model_writes, 2);
        assert_eq!(draws(commands), vec![1, 1]);
        assert_eq!(ctx.stats().batches, 1);
    }

    #[test]
    fn test_program_switch_rebinds_vertex_layout_only() {
        let _guard = context_lock();
        let mut ctx = context(RendererConfig::default());
        let basic = Material::new(Shader::from_wgsl(BASIC_WGSL).unwrap());
        let instanced = Material::new(Shader::from_wgsl(INSTANCED_WGSL).unwrap());
        let mesh = Mesh::cube();
        let queue = vec![
            object(&mesh, &basic, Vec3::ZERO),
            object(&mesh, &instanced, Vec3::ZERO),
        ];

        ctx.flush_queue(&queue, &uniforms_at(Vec3::ZERO)).unwrap();
        let commands = ctx.backend().commands();
        let index_binds = commands
            .iter()
            .filter(|c| matches!(c, Command::SetIndexBuffer { .. }))
            .count();
        let layout_binds = commands
            .iter()
            .filter(|c| matches!(c, Command::SetVertexBuffer { slot: 0, .. }))
            .count();
        assert_eq!(index_binds, 1);
        assert_eq!(layout_binds, 2);
        assert_eq!(draws(commands), vec![1, 1]);
    }

    #[test]
    fn test_empty_mesh_is_skipped() {
        let _guard = context_lock();
        let mut ctx = context(RendererConfig::default());
        let material = Material::new(Shader::from_wgsl(INSTANCED_WGSL).unwrap());
        let queue = vec![object(&Mesh::new(), &material, Vec3::ZERO)];

        ctx.flush_queue(&queue, &uniforms_at(Vec3::ZERO)).unwrap();
        assert!(draws(ctx.backend().commands()).is_empty());
        assert_eq!(ctx.stats().objects, 1);
    }

    #[test]
    fn test_depth_testing_toggles_between_runs() {
        let _guard = context_lock();
        let mut ctx = context(RendererConfig::default());
        let shader = Shader::from_wgsl(INSTANCED_WGSL).unwrap();
        let tested = Material::new(shader.clone());
        let mut overlay = Material::new(shader);
        overlay.set_depth_tested(false);
        let mesh = Mesh::cube();
        let queue = vec![
            object(&mesh, &tested, Vec3::ZERO),
            object(&mesh, &overlay, Vec3::ZERO),
            object(&mesh, &tested, Vec3::ZERO),
        ];

        ctx.flush_queue(&queue, &uniforms_at(Vec3::ZERO)).unwrap();
        let toggles: Vec<bool> = ctx
            .backend()
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::SetDepthTesting(enabled) => Some(*enabled),
                _ => None,
            })
            .collect();
        assert_eq!(toggles, vec![true, false, true]);
        assert_eq!(draws(ctx.backend().commands()), vec![1, 1, 1]);
    }
}
