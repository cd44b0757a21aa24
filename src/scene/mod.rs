//! Cameras, transforms and draw submission

mod camera;
mod render_object;
mod transform;

pub use camera::{Camera, CameraClearFlags, CameraProjection};
pub(crate) use camera::CameraUniforms;
pub use render_object::RenderObject;
pub use transform::{normal_matrix, Transform};

use glam::Mat4;

use crate::error::RenderError;
use crate::material::{Material, MaterialPropertyBlock};
use crate::mesh::Mesh;

/// Queue `mesh` for drawing with `material` the next time `camera` renders.
///
/// No GPU work happens here. The mesh, material and block are shared with the queue, so
/// later edits to the caller's copies do not affect queued draws.
pub fn draw(
    mesh: &Mesh,
    transform: impl Into<Mat4>,
    material: &Material,
    camera: &mut Camera,
    block: Option<&MaterialPropertyBlock>,
    sub_mesh: Option<usize>,
) -> Result<(), RenderError> {
    if let Some(index) = sub_mesh {
        let count = mesh.sub_mesh_count();
        if index >= count {
            return Err(RenderError::SubMeshOutOfRange { index, count });
        }
    }

    camera.push(RenderObject::new(
        mesh.clone(),
        transform.into(),
        material.clone(),
        block.cloned(),
        sub_mesh,
    ));
    Ok(())
}
