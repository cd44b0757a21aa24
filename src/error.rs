//! Crate-level error type.

use thiserror::Error;

use crate::backend::BackendError;
use crate::mesh::MeshError;
use crate::render_target::RenderTargetError;
use crate::shader::ShaderError;
use crate::texture::TextureError;

/// Any error the renderer can report
#[derive(Error, Debug, Clone)]
pub enum RenderError {
    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Texture(#[from] TextureError),

    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error(transparent)]
    RenderTarget(#[from] RenderTargetError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("a graphics context already exists")]
    ContextAlreadyExists,

    #[error("sub-mesh index {index} is out of range for a mesh with {count} sub-meshes")]
    SubMeshOutOfRange { index: usize, count: usize },

    #[error("render texture has not been rendered to")]
    RenderTextureNotRendered,
}
