//! CPU-side mesh data model.
//!
//! A [`Mesh`] owns a re-encodable [`VertexBuffer`], an index buffer that picks 16- or
//! 32-bit storage automatically, a topology and optional sub-mesh ranges. GPU upload is
//! lazy: the renderer compares the mesh's content version against its cached copy.

mod data;
mod generators;
mod indices;
mod vertex_buffer;
mod vertex_format;

pub use data::Mesh;
pub use indices::{IndicesView, MeshIndices};
pub use vertex_buffer::{VertexBuffer, VertexValue};
pub use vertex_format::{
    VertexAttribute, VertexAttributeDescriptor, VertexAttributeFormat, VertexAttributeLayout,
    VertexFormat,
};

use bitflags::bitflags;

/// Primitive assembly of a mesh or sub-mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MeshTopology {
    #[default]
    Triangles,
    Lines,
}

/// A drawable index range within one mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubMeshDescriptor {
    pub index_start: usize,
    pub index_count: usize,
    pub topology: MeshTopology,
}

impl SubMeshDescriptor {
    pub fn new(index_start: usize, index_count: usize, topology: MeshTopology) -> Self {
        Self {
            index_start,
            index_count,
            topology,
        }
    }
}

bitflags! {
    /// Opt-outs for the checks normally run when mesh data changes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MeshUpdateFlags: u32 {
        /// Skip checking indices against the vertex count.
        const DONT_VALIDATE_INDICES = 1 << 0;
        /// Skip recomputing the bounding box.
        const DONT_RECALCULATE_BOUNDS = 1 << 1;
    }
}

/// Errors raised by mesh mutation and queries.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshError {
    #[error("index {index} is out of range for a mesh with {num_verts} vertices")]
    IndexOutOfRange { index: u32, num_verts: usize },

    #[error("cannot shrink to {num_verts} vertices while indices reference vertex {max_index}")]
    VertexCountShrinksBelowIndices { num_verts: usize, max_index: u32 },

    #[error("operation requires triangle topology")]
    NotTriangles,

    #[error("no triangle starts at index offset {offset} (mesh has {num_indices} indices)")]
    TriangleOutOfRange { offset: usize, num_indices: usize },

    #[error("raw buffer has {actual} bytes, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("invalid vertex format: {0}")]
    InvalidVertexFormat(String),
}
