use glam::{Mat3, Mat4, Vec3};

use crate::material::{Material, MaterialPropertyBlock};
use crate::mesh::Mesh;

use super::transform::normal_matrix;

/// One queued draw.
///
/// Created by [`draw`](super::draw) and consumed by the next render of the camera it was
/// queued on.
#[derive(Debug, Clone)]
pub struct RenderObject {
    pub(crate) mesh: Mesh,
    pub(crate) transform: Mat4,
    pub(crate) normal_matrix: Mat3,
    pub(crate) material: Material,
    pub(crate) block: Option<MaterialPropertyBlock>,
    pub(crate) sub_mesh: Option<usize>,
    pub(crate) centroid: Vec3,
}

impl RenderObject {
    pub(crate) fn new(
        mesh: Mesh,
        transform: Mat4,
        material: Material,
        block: Option<MaterialPropertyBlock>,
        sub_mesh: Option<usize>,
    ) -> Self {
        let centroid = mesh.bounds().transformed(&transform).centroid();
        Self {
            normal_matrix: normal_matrix(&transform),
            mesh,
            transform,
            material,
            block,
            sub_mesh,
            centroid,
        }
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn property_block(&self) -> Option<&MaterialPropertyBlock> {
        self.block.as_ref()
    }

    pub fn sub_mesh(&self) -> Option<usize> {
        self.sub_mesh
    }

    /// World-space centre of the mesh bounds, fixed at submission time
    pub fn centroid(&self) -> Vec3 {
        self.centroid
    }

    /// Whether both objects can share one innermost batch
    pub(crate) fn same_batch(&self, other: &RenderObject) -> bool {
        self.material == other.material
            && self.block == other.block
            && self.mesh == other.mesh
            && self.sub_mesh == other.sub_mesh
    }
}
