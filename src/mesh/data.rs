use glam::{Vec2, Vec3, Vec4};

use super::indices::{IndicesView, MeshIndices};
use super::vertex_buffer::{VertexBuffer, VertexValue};
use super::vertex_format::{VertexAttribute, VertexFormat};
use super::{MeshError, MeshTopology, MeshUpdateFlags, SubMeshDescriptor};
use crate::color::Color;
use crate::cow::{CopyOnWrite, ResourceId, Version};
use crate::geometry::{Aabb, Triangle};

#[derive(Debug)]
struct MeshData {
    id: ResourceId,
    version: Version,
    topology: MeshTopology,
    vertices: VertexBuffer,
    indices: MeshIndices,
    bounds: Aabb,
    sub_meshes: Vec<SubMeshDescriptor>,
}

impl Default for MeshData {
    fn default() -> Self {
        Self {
            id: ResourceId::next(),
            version: Version::default(),
            topology: MeshTopology::default(),
            vertices: VertexBuffer::new(),
            indices: MeshIndices::default(),
            bounds: Aabb::default(),
            sub_meshes: Vec::new(),
        }
    }
}

impl Clone for MeshData {
    fn clone(&self) -> Self {
        Self {
            id: ResourceId::next(),
            version: self.version,
            topology: self.topology,
            vertices: self.vertices.clone(),
            indices: self.indices.clone(),
            bounds: self.bounds,
            sub_meshes: self.sub_meshes.clone(),
        }
    }
}

impl MeshData {
    fn check_indices(&self, indices: &MeshIndices, num_verts: usize) -> Result<(), MeshError> {
        match indices.iter().find(|&i| i as usize >= num_verts) {
            Some(index) => Err(MeshError::IndexOutOfRange { index, num_verts }),
            None => Ok(()),
        }
    }

    fn check_vertex_count(&self, num_verts: usize) -> Result<(), MeshError> {
        match self.indices.max_index() {
            Some(max_index) if max_index as usize >= num_verts => {
                Err(MeshError::VertexCountShrinksBelowIndices {
                    num_verts,
                    max_index,
                })
            }
            _ => Ok(()),
        }
    }

    fn recalculate_bounds(&mut self) {
        let points = self
            .indices
            .iter()
            .filter_map(|i| self.vertices.read_at::<Vec3>(VertexAttribute::Position, i as usize));
        self.bounds = Aabb::from_points(points).unwrap_or_default();
    }

    fn triangle_indices(&self) -> Vec<[usize; 3]> {
        let indices = self.indices.to_vec();
        indices
            .chunks_exact(3)
            .map(|t| [t[0] as usize, t[1] as usize, t[2] as usize])
            .filter(|t| t.iter().all(|&i| i < self.vertices.num_verts()))
            .collect()
    }
}

/// Indexed geometry with lazily uploaded GPU storage.
///
/// `Mesh` is a shared-until-written value: clones share data until one of them is
/// modified. Two meshes are the same mesh (for batching and GPU caching) exactly when
/// they share data.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    data: CopyOnWrite<MeshData>,
}

impl PartialEq for Mesh {
    fn eq(&self, other: &Self) -> bool {
        self.data.ptr_eq(&other.data)
    }
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> ResourceId {
        self.data.id
    }

    /// Content version, bumped on every mutation.
    pub fn version(&self) -> Version {
        self.data.version
    }

    fn edit(&mut self) -> &mut MeshData {
        let data = self.data.make_mut();
        data.version.bump();
        data
    }

    pub fn topology(&self) -> MeshTopology {
        self.data.topology
    }

    pub fn set_topology(&mut self, topology: MeshTopology) {
        if self.data.topology != topology {
            self.edit().topology = topology;
        }
    }

    pub fn num_verts(&self) -> usize {
        self.data.vertices.num_verts()
    }

    pub fn has_verts(&self) -> bool {
        self.num_verts() > 0
    }

    pub fn vertex_buffer(&self) -> &VertexBuffer {
        &self.data.vertices
    }

    pub fn vertex_format(&self) -> &VertexFormat {
        self.data.vertices.format()
    }

    pub fn vertices(&self) -> Vec<Vec3> {
        self.data.vertices.read(VertexAttribute::Position)
    }

    /// Replace vertex positions. This defines the vertex count of the mesh.
    ///
    /// Fails without modifying the mesh if the new count would leave existing indices
    /// pointing past the end of the vertex buffer.
    pub fn set_vertices(&mut self, vertices: &[Vec3]) -> Result<(), MeshError> {
        self.data.check_vertex_count(vertices.len())?;
        let data = self.edit();
        data.vertices.write(VertexAttribute::Position, vertices);
        data.recalculate_bounds();
        Ok(())
    }

    /// Apply `f` to every vertex position.
    pub fn transform_vertices<F: FnMut(Vec3) -> Vec3>(&mut self, f: F) {
        let data = self.edit();
        data.vertices.transform(VertexAttribute::Position, f);
        data.recalculate_bounds();
    }

    pub fn normals(&self) -> Vec<Vec3> {
        self.data.vertices.read(VertexAttribute::Normal)
    }

    pub fn set_normals(&mut self, normals: &[Vec3]) {
        self.write_attribute(VertexAttribute::Normal, normals);
    }

    pub fn tex_coords(&self) -> Vec<Vec2> {
        self.data.vertices.read(VertexAttribute::TexCoord0)
    }

    pub fn set_tex_coords(&mut self, coords: &[Vec2]) {
        self.write_attribute(VertexAttribute::TexCoord0, coords);
    }

    pub fn colors(&self) -> Vec<Color> {
        self.data.vertices.read(VertexAttribute::Color)
    }

    pub fn set_colors(&mut self, colors: &[Color]) {
        self.write_attribute(VertexAttribute::Color, colors);
    }

    pub fn tangents(&self) -> Vec<Vec4> {
        self.data.vertices.read(VertexAttribute::Tangent)
    }

    pub fn set_tangents(&mut self, tangents: &[Vec4]) {
        self.write_attribute(VertexAttribute::Tangent, tangents);
    }

    fn write_attribute<T: VertexValue>(&mut self, attribute: VertexAttribute, values: &[T]) {
        debug_assert_ne!(attribute, VertexAttribute::Position);
        let data = self.edit();
        data.vertices.write(attribute, values);
    }

    /// Resize and re-lay-out the vertex buffer in one step.
    pub fn set_vertex_buffer_params(
        &mut self,
        num_verts: usize,
        format: VertexFormat,
    ) -> Result<(), MeshError> {
        self.data.check_vertex_count(num_verts)?;
        let data = self.edit();
        data.vertices.set_params(num_verts, format);
        data.recalculate_bounds();
        Ok(())
    }

    /// Overwrite the interleaved vertex bytes. The length must match the current layout.
    pub fn set_vertex_buffer_data(
        &mut self,
        bytes: &[u8],
        flags: MeshUpdateFlags,
    ) -> Result<(), MeshError> {
        let expected = self.num_verts() * self.data.vertices.stride();
        if bytes.len() != expected {
            return Err(MeshError::BufferSizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        let data = self.edit();
        data.vertices.set_data(bytes)?;
        if !flags.contains(MeshUpdateFlags::DONT_RECALCULATE_BOUNDS) {
            data.recalculate_bounds();
        }
        Ok(())
    }

    pub fn num_indices(&self) -> usize {
        self.data.indices.len()
    }

    pub fn indices(&self) -> &MeshIndices {
        &self.data.indices
    }

    /// Replace the index buffer.
    ///
    /// Indices are checked against the vertex count unless both
    /// [`MeshUpdateFlags::DONT_VALIDATE_INDICES`] and
    /// [`MeshUpdateFlags::DONT_RECALCULATE_BOUNDS`] are given, because deriving bounds
    /// always needs valid indices. On error the mesh is left unchanged.
    pub fn set_indices<'a, I>(&mut self, indices: I, flags: MeshUpdateFlags) -> Result<(), MeshError>
    where
        I: Into<IndicesView<'a>>,
    {
        let indices = MeshIndices::from_view(indices.into());
        let recalculate_bounds = !flags.contains(MeshUpdateFlags::DONT_RECALCULATE_BOUNDS);
        if !flags.contains(MeshUpdateFlags::DONT_VALIDATE_INDICES) || recalculate_bounds {
            self.data.check_indices(&indices, self.num_verts())?;
        }

        let data = self.edit();
        data.indices = indices;
        if recalculate_bounds {
            data.recalculate_bounds();
        }
        Ok(())
    }

    /// Bounding box of every indexed vertex.
    pub fn bounds(&self) -> Aabb {
        self.data.bounds
    }

    /// Drop all vertex, index and sub-mesh data. Topology is kept.
    pub fn clear(&mut self) {
        let data = self.edit();
        data.vertices.clear();
        data.indices = MeshIndices::default();
        data.bounds = Aabb::default();
        data.sub_meshes.clear();
    }

    pub fn sub_mesh_count(&self) -> usize {
        self.data.sub_meshes.len()
    }

    pub fn push_sub_mesh_descriptor(&mut self, descriptor: SubMeshDescriptor) {
        self.edit().sub_meshes.push(descriptor);
    }

    pub fn sub_mesh_descriptor(&self, index: usize) -> Option<&SubMeshDescriptor> {
        self.data.sub_meshes.get(index)
    }

    pub fn clear_sub_mesh_descriptors(&mut self) {
        if !self.data.sub_meshes.is_empty() {
            self.edit().sub_meshes.clear();
        }
    }

    /// Triangle whose three indices start at `first_index_offset`.
    pub fn get_triangle_at(&self, first_index_offset: usize) -> Result<Triangle, MeshError> {
        if self.topology() != MeshTopology::Triangles {
            return Err(MeshError::NotTriangles);
        }

        let num_indices = self.num_indices();
        let out_of_range = MeshError::TriangleOutOfRange {
            offset: first_index_offset,
            num_indices,
        };
        if first_index_offset.checked_add(3).map_or(true, |end| end > num_indices) {
            return Err(out_of_range);
        }

        let mut points = [Vec3::ZERO; 3];
        for (k, point) in points.iter_mut().enumerate() {
            let index = self
                .data
                .indices
                .get(first_index_offset + k)
                .ok_or_else(|| out_of_range.clone())?;
            *point = self
                .data
                .vertices
                .read_at(VertexAttribute::Position, index as usize)
                .ok_or(MeshError::IndexOutOfRange {
                    index,
                    num_verts: self.num_verts(),
                })?;
        }
        Ok(Triangle::new(points[0], points[1], points[2]))
    }

    /// Recompute vertex normals from the triangle faces.
    ///
    /// The first face touching a vertex overwrites its normal, later faces add to it, and
    /// vertices shared by several faces are renormalized at the end. Degenerate faces
    /// contribute nothing.
    pub fn recalculate_normals(&mut self) {
        if self.topology() != MeshTopology::Triangles {
            log::debug!("Skipping normal recalculation on a non-triangle mesh {}", self.id());
            return;
        }
        if !self.has_verts() {
            return;
        }

        let positions = self.vertices();
        let mut normals = self.normals();
        if normals.len() != positions.len() {
            normals = vec![Vec3::ZERO; positions.len()];
        }

        let mut touch_count = vec![0u32; positions.len()];
        for tri in self.data.triangle_indices() {
            let face = Triangle::new(positions[tri[0]], positions[tri[1]], positions[tri[2]]);
            let Some(normal) = face.normal() else {
                continue;
            };
            for i in tri {
                if touch_count[i] == 0 {
                    normals[i] = normal;
                } else {
                    normals[i] += normal;
                }
                touch_count[i] += 1;
            }
        }

        for (normal, count) in normals.iter_mut().zip(&touch_count) {
            if *count > 1 {
                *normal = normal.normalize_or_zero();
            }
        }

        self.set_normals(&normals);
    }

    /// Recompute per-vertex tangents from texture-coordinate derivatives.
    ///
    /// Requires normals, texture coordinates and indices. The `w` component stores the
    /// handedness of the tangent frame (`1` or `-1`).
    pub fn recalculate_tangents(&mut self) {
        if self.topology() != MeshTopology::Triangles {
            log::debug!("Skipping tangent recalculation on a non-triangle mesh {}", self.id());
            return;
        }
        let positions = self.vertices();
        let normals = self.normals();
        let uvs = self.tex_coords();
        if normals.len() != positions.len() || uvs.len() != positions.len() || self.num_indices() == 0
        {
            log::debug!(
                "Tangent recalculation on mesh {} needs normals, texture coordinates and indices",
                self.id()
            );
            return;
        }

        let mut tangents = vec![Vec3::ZERO; positions.len()];
        let mut bitangents = vec![Vec3::ZERO; positions.len()];
        for [a, b, c] in self.data.triangle_indices() {
            let e1 = positions[b] - positions[a];
            let e2 = positions[c] - positions[a];
            let d1 = uvs[b] - uvs[a];
            let d2 = uvs[c] - uvs[a];

            let det = d1.x * d2.y - d2.x * d1.y;
            if det.abs() <= f32::EPSILON {
                continue;
            }
            let r = 1.0 / det;
            let t = (e1 * d2.y - e2 * d1.y) * r;
            let bt = (e2 * d1.x - e1 * d2.x) * r;
            if !t.is_finite() || !bt.is_finite() {
                continue;
            }
            for i in [a, b, c] {
                tangents[i] += t;
                bitangents[i] += bt;
            }
        }

        let result: Vec<Vec4> = normals
            .iter()
            .zip(tangents.iter().zip(&bitangents))
            .map(|(&n, (&t, &bt))| {
                // Gram-Schmidt against the normal
                let t = (t - n * n.dot(t)).normalize_or_zero();
                let w = if n.cross(t).dot(bt) < 0.0 { -1.0 } else { 1.0 };
                t.extend(w)
            })
            .collect();

        self.set_tangents(&result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.set_vertices(&[
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ])
        .unwrap();
        mesh.set_indices(&[0u16, 1, 2, 0, 2, 3], MeshUpdateFlags::empty())
            .unwrap();
        mesh
    }

    #[test]
    fn test_bounds_follow_indexed_vertices() {
        let mut mesh = quad();
        assert_eq!(mesh.bounds().max, Vec3::new(1.0, 1.0, 0.0));

        // vertex 3 is no longer referenced
        mesh.set_indices(&[0u16, 1, 2], MeshUpdateFlags::empty()).unwrap();
        assert_eq!(mesh.bounds().min, Vec3::ZERO);
        assert_eq!(mesh.bounds().max, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_invalid_indices_rejected_without_mutation() {
        let mut mesh = quad();
        let version = mesh.version();
        let err = mesh.set_indices(&[0u16, 1, 9], MeshUpdateFlags::empty());
        assert_eq!(
            err,
            Err(MeshError::IndexOutOfRange {
                index: 9,
                num_verts: 4
            })
        );
        assert_eq!(mesh.num_indices(), 6);
        assert_eq!(mesh.version(), version);
    }

    #[test]
    fn test_validation_can_be_skipped_with_both_flags() {
        let mut mesh = quad();
        let flags = MeshUpdateFlags::DONT_VALIDATE_INDICES | MeshUpdateFlags::DONT_RECALCULATE_BOUNDS;
        assert!(mesh.set_indices(&[0u16, 1, 9], flags).is_ok());

        // bounds recomputation still checks
        assert!(mesh
            .set_indices(&[0u16, 1, 9], MeshUpdateFlags::DONT_VALIDATE_INDICES)
            .is_err());
    }

    #[test]
    fn test_shrinking_vertices_below_indices_fails() {
        let mut mesh = quad();
        assert!(matches!(
            mesh.set_vertices(&[Vec3::ZERO; 2]),
            Err(MeshError::VertexCountShrinksBelowIndices { max_index: 3, .. })
        ));
        assert_eq!(mesh.num_verts(), 4);
    }

    #[test]
    fn test_mutation_bumps_version_and_detaches_clone() {
        let mut a = quad();
        let b = a.clone();
        assert_eq!(a, b);

        let before = a.version();
        a.set_normals(&[Vec3::Z; 4]);
        assert!(a.version() > before);
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
        assert!(b.normals().is_empty());
    }

    #[test]
    fn test_get_triangle_at() {
        let mesh = quad();
        let tri = mesh.get_triangle_at(3).unwrap();
        assert_eq!(tri.p2, Vec3::new(0.0, 1.0, 0.0));
        assert!(matches!(
            mesh.get_triangle_at(4),
            Err(MeshError::TriangleOutOfRange { .. })
        ));
        assert!(mesh.get_triangle_at(usize::MAX).is_err());
    }

    #[test]
    fn test_get_triangle_at_on_lines_fails() {
        let mut mesh = quad();
        mesh.set_topology(MeshTopology::Lines);
        assert_eq!(mesh.get_triangle_at(0), Err(MeshError::NotTriangles));
    }

    #[test]
    fn test_recalculate_normals_on_flat_quad() {
        let mut mesh = quad();
        mesh.recalculate_normals();
        for n in mesh.normals() {
            assert!((n - Vec3::Z).length() < 1e-5);
        }
    }

    #[test]
    fn test_recalculate_normals_on_closed_tetrahedron_are_unit() {
        let mut mesh = Mesh::new();
        mesh.set_vertices(&[Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z])
            .unwrap();
        mesh.set_indices(
            &[0u16, 2, 1, 0, 1, 3, 0, 3, 2, 1, 2, 3],
            MeshUpdateFlags::empty(),
        )
        .unwrap();

        mesh.recalculate_normals();

        let normals = mesh.normals();
        assert_eq!(normals.len(), 4);
        for n in &normals {
            assert!((n.length() - 1.0).abs() < 1e-5, "{n} is not unit length");
        }
        assert!(normals[0].dot(Vec3::NEG_ONE) > 0.0);
        assert!(normals[3].z > 0.0);
    }

    #[test]
    fn test_recalculate_tangents_handedness() {
        let mut mesh = quad();
        mesh.recalculate_normals();
        mesh.set_tex_coords(&[
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ]);
        mesh.recalculate_tangents();

        let tangents = mesh.tangents();
        assert_eq!(tangents.len(), 4);
        for t in tangents {
            assert!((t.truncate() - Vec3::X).length() < 1e-5);
            assert_eq!(t.w, 1.0);
        }
    }

    #[test]
    fn test_recalculate_tangents_requires_inputs() {
        let mut mesh = quad();
        mesh.recalculate_tangents();
        assert!(mesh.tangents().is_empty());
    }

    #[test]
    fn test_sub_mesh_descriptors() {
        let mut mesh = quad();
        mesh.push_sub_mesh_descriptor(SubMeshDescriptor::new(0, 3, MeshTopology::Triangles));
        mesh.push_sub_mesh_descriptor(SubMeshDescriptor::new(3, 3, MeshTopology::Triangles));
        assert_eq!(mesh.sub_mesh_count(), 2);
        assert_eq!(mesh.sub_mesh_descriptor(1).unwrap().index_start, 3);
        mesh.clear_sub_mesh_descriptors();
        assert_eq!(mesh.sub_mesh_count(), 0);
    }

    #[test]
    fn test_raw_vertex_data_size_checked() {
        let mut mesh = quad();
        assert!(mesh
            .set_vertex_buffer_data(&[0u8; 5], MeshUpdateFlags::empty())
            .is_err());
        let bytes = vec![0u8; 4 * 12];
        assert!(mesh
            .set_vertex_buffer_data(&bytes, MeshUpdateFlags::empty())
            .is_ok());
        assert_eq!(mesh.bounds().dimensions(), Vec3::ZERO);
    }
}
