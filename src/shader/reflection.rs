//! WGSL reflection via naga.

use std::collections::HashMap;

use naga::{
    AddressSpace, ArraySize, Binding, ImageClass, ImageDimension, Module, ScalarKind, ShaderStage,
    TypeInner, VectorSize,
};

use super::{ShaderElement, ShaderError, ShaderType};

const UNIFORM_GROUP: u32 = 0;
const UNIFORM_BINDING: u32 = 0;
const TEXTURE_GROUP: u32 = 1;

pub(super) struct ReflectedShader {
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub uniform_block_size: u32,
    pub color_outputs: u32,
    pub uniforms: HashMap<String, ShaderElement>,
    pub attributes: HashMap<String, ShaderElement>,
}

pub(super) fn reflect_wgsl(source: &str) -> Result<ReflectedShader, ShaderError> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| ShaderError::Parse(e.emit_to_string(source)))?;

    let vertex = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == ShaderStage::Vertex)
        .ok_or(ShaderError::NoVertexEntryPoint)?;
    let fragment = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == ShaderStage::Fragment)
        .ok_or(ShaderError::NoFragmentEntryPoint)?;

    let mut uniforms = HashMap::new();
    let uniform_block_size = reflect_uniform_block(&module, &mut uniforms);
    reflect_textures(&module, &mut uniforms);

    let mut attributes = HashMap::new();
    for arg in &vertex.function.arguments {
        match (&arg.binding, module.types[arg.ty].inner.clone()) {
            (Some(Binding::Location { location, .. }), inner) => {
                if let Some(name) = &arg.name {
                    attributes.insert(name.clone(), ShaderElement::new(*location, value_type(&inner)));
                }
            }
            (None, TypeInner::Struct { members, .. }) => {
                for member in members {
                    if let (Some(Binding::Location { location, .. }), Some(name)) =
                        (&member.binding, &member.name)
                    {
                        let ty = value_type(&module.types[member.ty].inner);
                        attributes.insert(name.clone(), ShaderElement::new(*location, ty));
                    }
                }
            }
            _ => {}
        }
    }
    fold_matrix_columns(&mut attributes);

    Ok(ReflectedShader {
        vertex_entry: vertex.name.clone(),
        fragment_entry: fragment.name.clone(),
        uniform_block_size,
        color_outputs: count_color_outputs(&module, &fragment.function),
        uniforms,
        attributes,
    })
}

/// Flatten the uniform struct at (0, 0) into `out`; returns the block size.
fn reflect_uniform_block(module: &Module, out: &mut HashMap<String, ShaderElement>) -> u32 {
    let mut block_size = 0;
    for (_, global) in module.global_variables.iter() {
        if global.space != AddressSpace::Uniform {
            continue;
        }
        let is_block = global
            .binding
            .as_ref()
            .map_or(false, |b| b.group == UNIFORM_GROUP && b.binding == UNIFORM_BINDING);
        if !is_block {
            log::warn!(
                "Uniform {:?} is outside @group({}) @binding({}) and will not be reflected",
                global.name,
                UNIFORM_GROUP,
                UNIFORM_BINDING
            );
            continue;
        }

        match &module.types[global.ty].inner {
            TypeInner::Struct { members, span } => {
                for member in members {
                    let Some(name) = &member.name else {
                        continue;
                    };
                    let element = uniform_element(module, member.ty, member.offset);
                    out.insert(name.clone(), element);
                }
                block_size = *span;
            }
            inner => {
                if let Some(name) = &global.name {
                    out.insert(name.clone(), ShaderElement::new(0, value_type(inner)));
                }
                block_size = inner.size(module.to_ctx());
            }
        }
    }
    block_size
}

fn uniform_element(module: &Module, ty: naga::Handle<naga::Type>, offset: u32) -> ShaderElement {
    match &module.types[ty].inner {
        TypeInner::Array {
            base,
            size: ArraySize::Constant(count),
            stride,
        } => ShaderElement::array(
            offset,
            value_type(&module.types[*base].inner),
            count.get(),
            *stride,
        ),
        inner => ShaderElement::new(offset, value_type(inner)),
    }
}

fn reflect_textures(module: &Module, out: &mut HashMap<String, ShaderElement>) {
    for (_, global) in module.global_variables.iter() {
        let (Some(name), Some(binding)) = (&global.name, &global.binding) else {
            continue;
        };
        if global.space != AddressSpace::Handle || binding.group != TEXTURE_GROUP {
            continue;
        }
        if let TypeInner::Image {
            dim,
            arrayed: false,
            class: ImageClass::Sampled { multi: false, .. },
        } = module.types[global.ty].inner
        {
            let ty = match dim {
                ImageDimension::D2 => ShaderType::Sampler2D,
                ImageDimension::Cube => ShaderType::SamplerCube,
                _ => ShaderType::Unknown,
            };
            out.insert(name.clone(), ShaderElement::new(binding.binding, ty));
        }
    }
}

/// Number of `@location` outputs written by the fragment stage.
fn count_color_outputs(module: &Module, function: &naga::Function) -> u32 {
    let Some(result) = &function.result else {
        return 0;
    };
    match (&result.binding, &module.types[result.ty].inner) {
        (Some(Binding::Location { location, .. }), _) => location + 1,
        (None, TypeInner::Struct { members, .. }) => members
            .iter()
            .filter_map(|m| match m.binding {
                Some(Binding::Location { location, .. }) => Some(location + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0),
        _ => 0,
    }
}

fn value_type(inner: &TypeInner) -> ShaderType {
    match *inner {
        TypeInner::Scalar(scalar) => match scalar.kind {
            ScalarKind::Float => ShaderType::Float,
            ScalarKind::Sint => ShaderType::Int,
            ScalarKind::Uint => ShaderType::UInt,
            ScalarKind::Bool => ShaderType::Bool,
            _ => ShaderType::Unknown,
        },
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float => match size {
            VectorSize::Bi => ShaderType::Vec2,
            VectorSize::Tri => ShaderType::Vec3,
            VectorSize::Quad => ShaderType::Vec4,
        },
        TypeInner::Matrix { columns, rows, .. } => match (columns, rows) {
            (VectorSize::Tri, VectorSize::Tri) => ShaderType::Mat3,
            (VectorSize::Quad, VectorSize::Quad) => ShaderType::Mat4,
            _ => ShaderType::Unknown,
        },
        _ => ShaderType::Unknown,
    }
}

/// Replace `<base>_c0..` column attributes with a single matrix attribute.
fn fold_matrix_columns(attributes: &mut HashMap<String, ShaderElement>) {
    let bases: Vec<String> = attributes
        .keys()
        .filter_map(|name| name.strip_suffix("_c0").map(str::to_owned))
        .collect();

    for base in bases {
        let column = |i: usize| attributes.get(&format!("{base}_c{i}")).copied();
        let Some(first) = column(0) else {
            continue;
        };
        let (count, matrix_type) = match first.shader_type {
            ShaderType::Vec4 => (4, ShaderType::Mat4),
            ShaderType::Vec3 => (3, ShaderType::Mat3),
            _ => continue,
        };
        let consecutive = (0..count).all(|i| {
            column(i).map_or(false, |c| {
                c.shader_type == first.shader_type && c.location == first.location + i as u32
            })
        });
        if !consecutive {
            log::warn!("Matrix attribute {base} has missing or non-consecutive columns");
            continue;
        }

        for i in 0..count {
            attributes.remove(&format!("{base}_c{i}"));
        }
        attributes.insert(base, ShaderElement::new(first.location, matrix_type));
    }
}
