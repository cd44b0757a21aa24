//! Procedural meshes.

use std::f32::consts::PI;

use glam::{Vec2, Vec3, Vec4};

use super::{Mesh, MeshTopology, MeshUpdateFlags};

#[derive(Default)]
struct GeneratedGeometry {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Vec<Vec2>,
    tangents: Vec<Vec4>,
    indices: Vec<u32>,
}

impl GeneratedGeometry {
    fn push(&mut self, position: Vec3, normal: Vec3, uv: Vec2, tangent: Vec4) {
        self.positions.push(position);
        self.normals.push(normal);
        self.uvs.push(uv);
        self.tangents.push(tangent);
    }

    fn into_mesh(self, topology: MeshTopology) -> Mesh {
        let mut mesh = Mesh::new();
        mesh.set_topology(topology);
        let result = mesh
            .set_vertices(&self.positions)
            .and_then(|_| mesh.set_indices(&self.indices, MeshUpdateFlags::empty()));
        debug_assert!(result.is_ok(), "generated mesh is malformed: {result:?}");
        mesh.set_normals(&self.normals);
        mesh.set_tex_coords(&self.uvs);
        mesh.set_tangents(&self.tangents);
        mesh
    }
}

impl Mesh {
    /// Unit cube centered at the origin, with per-face normals.
    pub fn cube() -> Self {
        let faces = [
            (Vec3::Z, Vec3::X),
            (-Vec3::Z, -Vec3::X),
            (Vec3::X, -Vec3::Z),
            (-Vec3::X, Vec3::Z),
            (Vec3::Y, Vec3::X),
            (-Vec3::Y, Vec3::X),
        ];

        let mut geometry = GeneratedGeometry::default();
        for (normal, right) in faces {
            let up = normal.cross(right);
            let base = geometry.positions.len() as u32;
            let corners = [
                (-right - up, Vec2::new(0.0, 1.0)),
                (right - up, Vec2::new(1.0, 1.0)),
                (right + up, Vec2::new(1.0, 0.0)),
                (-right + up, Vec2::new(0.0, 0.0)),
            ];
            for (offset, uv) in corners {
                geometry.push(0.5 * (normal + offset), normal, uv, right.extend(1.0));
            }
            geometry
                .indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        geometry.into_mesh(MeshTopology::Triangles)
    }

    /// UV sphere of radius 0.5.
    pub fn uv_sphere(segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let segment_angle = 2.0 * PI / segments as f32;
        let ring_angle = PI / rings as f32;

        let mut geometry = GeneratedGeometry::default();
        for ring in 0..=rings {
            let phi = ring as f32 * ring_angle;
            for segment in 0..=segments {
                let theta = segment as f32 * segment_angle;
                let normal = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
                let uv = Vec2::new(
                    segment as f32 / segments as f32,
                    ring as f32 / rings as f32,
                );
                let tangent = Vec3::new(-theta.sin(), 0.0, theta.cos());
                geometry.push(normal * 0.5, normal, uv, tangent.extend(1.0));
            }
        }

        for ring in 0..rings {
            for segment in 0..segments {
                let current = ring * (segments + 1) + segment;
                let next = current + segments + 1;
                geometry.indices.extend_from_slice(&[
                    current,
                    current + 1,
                    next,
                    current + 1,
                    next + 1,
                    next,
                ]);
            }
        }
        geometry.into_mesh(MeshTopology::Triangles)
    }

    /// Subdivided plane on the XZ axis, facing +Y.
    pub fn plane(width: f32, depth: f32, subdivisions: u32) -> Self {
        let subdivisions = subdivisions.max(1);
        let step_x = width / subdivisions as f32;
        let step_z = depth / subdivisions as f32;

        let mut geometry = GeneratedGeometry::default();
        for z in 0..=subdivisions {
            for x in 0..=subdivisions {
                let position = Vec3::new(
                    -0.5 * width + x as f32 * step_x,
                    0.0,
                    -0.5 * depth + z as f32 * step_z,
                );
                let uv = Vec2::new(
                    x as f32 / subdivisions as f32,
                    z as f32 / subdivisions as f32,
                );
                geometry.push(position, Vec3::Y, uv, Vec4::new(1.0, 0.0, 0.0, 1.0));
            }
        }

        for z in 0..subdivisions {
            for x in 0..subdivisions {
                let current = z * (subdivisions + 1) + x;
                let next = current + subdivisions + 1;
                geometry.indices.extend_from_slice(&[
                    current,
                    next,
                    current + 1,
                    current + 1,
                    next,
                    next + 1,
                ]);
            }
        }
        geometry.into_mesh(MeshTopology::Triangles)
    }

    /// Square grid of lines on the XZ plane spanning `[-size/2, size/2]`.
    pub fn grid_lines(size: f32, divisions: u32) -> Self {
        let divisions = divisions.max(1);
        let half = 0.5 * size;
        let step = size / divisions as f32;

        let mut positions = Vec::new();
        for i in 0..=divisions {
            let offset = -half + i as f32 * step;
            positions.push(Vec3::new(offset, 0.0, -half));
            positions.push(Vec3::new(offset, 0.0, half));
            positions.push(Vec3::new(-half, 0.0, offset));
            positions.push(Vec3::new(half, 0.0, offset));
        }
        let indices: Vec<u32> = (0..positions.len() as u32).collect();

        let mut mesh = Mesh::new();
        mesh.set_topology(MeshTopology::Lines);
        let result = mesh
            .set_vertices(&positions)
            .and_then(|_| mesh.set_indices(&indices, MeshUpdateFlags::empty()));
        debug_assert!(result.is_ok(), "generated grid is malformed: {result:?}");
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_layout() {
        let cube = Mesh::cube();
        assert_eq!(cube.num_verts(), 24);
        assert_eq!(cube.num_indices(), 36);
        assert_eq!(cube.bounds().min, Vec3::splat(-0.5));
        assert_eq!(cube.bounds().max, Vec3::splat(0.5));
    }

    #[test]
    fn test_cube_faces_wind_outwards() {
        let cube = Mesh::cube();
        let normals = cube.normals();
        for offset in (0..cube.num_indices()).step_by(3) {
            let tri = cube.get_triangle_at(offset).unwrap();
            let first = cube.indices().get(offset).unwrap() as usize;
            let face_normal = tri.normal().unwrap();
            assert!(face_normal.dot(normals[first]) > 0.99);
        }
    }

    #[test]
    fn test_sphere_normals_unit_length() {
        let sphere = Mesh::uv_sphere(12, 8);
        for n in sphere.normals() {
            assert!((n.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_grid_is_lines() {
        let grid = Mesh::grid_lines(10.0, 10);
        assert_eq!(grid.topology(), MeshTopology::Lines);
        assert_eq!(grid.num_indices(), 44);
    }
}
