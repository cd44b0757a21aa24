//! Per-instance transform streams.

use glam::{Mat3, Mat4};

use crate::backend::{
    AttributeFormat, BackendResult, BufferDescriptor, BufferHandle, BufferUsage, GraphicsBackend,
    VertexAttribute, VertexBufferLayout, VertexStepMode,
};
use crate::scene::RenderObject;
use crate::shader::{Shader, ShaderType};

const MIN_CAPACITY: u64 = 64 * 1024;
const OFFSET_ALIGNMENT: u64 = 16;

/// Which transforms the stream carries, in shader location order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstanceField {
    Model,
    Normal,
}

/// Packing of one shader's instance attributes
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InstanceLayout {
    /// Each field with the format of its columns
    fields: Vec<(InstanceField, AttributeFormat)>,
    pub layout: VertexBufferLayout,
}

impl InstanceLayout {
    /// Layout for the instance attributes `shader` declares, if any
    pub fn for_shader(shader: &Shader) -> Option<Self> {
        let well_known = shader.well_known();
        let mut declared: Vec<(u32, InstanceField, ShaderType)> = Vec::new();
        if let Some(e) = well_known.instance_model_mat {
            declared.push((e.location, InstanceField::Model, e.shader_type));
        }
        if let Some(e) = well_known.instance_normal_mat {
            declared.push((e.location, InstanceField::Normal, e.shader_type));
        }
        if declared.is_empty() {
            return None;
        }
        declared.sort_by_key(|(location, _, _)| *location);

        let mut attributes = Vec::new();
        let mut fields = Vec::new();
        let mut offset = 0;
        for (location, field, shader_type) in declared {
            let (columns, format) = match shader_type {
                ShaderType::Mat3 => (3, AttributeFormat::Float32x3),
                _ => (4, AttributeFormat::Float32x4),
            };
            for column in 0..columns {
                attributes.push(VertexAttribute {
                    location: location + column,
                    format,
                    offset,
                });
                offset += format.size();
            }
            fields.push((field, format));
        }

        Some(Self {
            fields,
            layout: VertexBufferLayout {
                array_stride: offset,
                step_mode: VertexStepMode::Instance,
                attributes,
            },
        })
    }

    /// Pack the transforms of `objects`, one stride per object
    pub fn pack(&self, objects: &[&RenderObject]) -> Vec<u8> {
        let mut out = Vec::with_capacity(objects.len() * self.layout.array_stride as usize);
        for object in objects {
            for (field, format) in &self.fields {
                let mat4 = match field {
                    InstanceField::Model => object.transform,
                    InstanceField::Normal => Mat4::from_mat3(object.normal_matrix),
                };
                if *format == AttributeFormat::Float32x3 {
                    out.extend_from_slice(bytemuck::cast_slice(
                        &Mat3::from_mat4(mat4).to_cols_array(),
                    ));
                } else {
                    out.extend_from_slice(bytemuck::cast_slice(&mat4.to_cols_array()));
                }
            }
        }
        out
    }
}

/// Growable vertex buffer the per-instance streams of one frame are appended to.
///
/// The write cursor persists across the passes of a frame so that earlier passes keep their
/// data, and is reset when the frame is presented.
#[derive(Debug, Default)]
pub(crate) struct InstanceBuffer {
    buffer: Option<BufferHandle>,
    capacity: u64,
    cursor: u64,
    retired: Vec<BufferHandle>,
}

impl InstanceBuffer {
    /// Append `data`, returning the buffer and byte offset it was written at
    pub fn write<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        data: &[u8],
    ) -> BackendResult<(BufferHandle, u64)> {
        let len = data.len() as u64;
        let offset = self.cursor.next_multiple_of(OFFSET_ALIGNMENT);

        let buffer = match self.buffer {
            Some(buffer) if offset + len <= self.capacity => buffer,
            _ => {
                let capacity = (offset + len).next_power_of_two().max(MIN_CAPACITY);
                let buffer = backend.create_buffer(&BufferDescriptor {
                    label: Some("Instance Buffer".to_string()),
                    size: capacity,
                    usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
                })?;
                log::debug!("Instance buffer grown to {} bytes", capacity);
                if let Some(old) = self.buffer.replace(buffer) {
                    self.retired.push(old);
                }
                self.capacity = capacity;
                self.cursor = 0;
                buffer
            }
        };

        let offset = self.cursor.next_multiple_of(OFFSET_ALIGNMENT);
        backend.write_buffer(buffer, offset, data);
        self.cursor = offset + len;
        Ok((buffer, offset))
    }

    /// Start a new frame, destroying buffers outgrown during the last one
    pub fn reset<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        self.cursor = 0;
        for buffer in self.retired.drain(..) {
            backend.destroy_buffer(buffer);
        }
    }
}
