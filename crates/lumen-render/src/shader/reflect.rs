//! Reflection over validated WGSL modules.
//!
//! Binding conventions:
//! - group 0 holds uniforms, one uniform buffer per `var<uniform>` global
//! - group 1 holds texture units; unit `n` is `@binding(2n)` (`texture_2d<f32>`)
//!   and `@binding(2n + 1)` (`sampler`)

use naga::{Handle, Module, Scalar, Type, TypeInner, VectorSize};

pub(crate) const UNIFORM_GROUP: u32 = 0;
pub(crate) const TEXTURE_GROUP: u32 = 1;

/// Host-side type of a uniform, as far as setters are concerned.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum UniformKind {
    Int,
    Float,
    Float2,
    Float3,
    Float4,
    Mat3,
    Mat4,
    /// Array of `i32` or `vec4<i32>`; values land in the first component of
    /// each element.
    IntArray { len: u32, stride: u32 },
    /// Declared with a type no setter writes (e.g. `bool`, nested structs).
    Unsupported,
}

impl UniformKind {
    /// Bytes a setter writes for this kind.
    pub fn size(self) -> u32 {
        match self {
            UniformKind::Int | UniformKind::Float => 4,
            UniformKind::Float2 => 8,
            UniformKind::Float3 => 12,
            UniformKind::Float4 => 16,
            // Three vec3 columns, each padded to 16 bytes.
            UniformKind::Mat3 => 48,
            UniformKind::Mat4 => 64,
            UniformKind::IntArray { len, stride } => len * stride,
            UniformKind::Unsupported => 0,
        }
    }

    pub(crate) fn classify(module: &Module, ty: Handle<Type>) -> Self {
        match &module.types[ty].inner {
            TypeInner::Scalar(s) if *s == Scalar::I32 => UniformKind::Int,
            TypeInner::Scalar(s) if *s == Scalar::F32 => UniformKind::Float,
            TypeInner::Vector { size, scalar } if *scalar == Scalar::F32 => match size {
                VectorSize::Bi => UniformKind::Float2,
                VectorSize::Tri => UniformKind::Float3,
                VectorSize::Quad => UniformKind::Float4,
            },
            TypeInner::Matrix {
                columns: VectorSize::Tri,
                rows: VectorSize::Tri,
                scalar,
            } if *scalar == Scalar::F32 => UniformKind::Mat3,
            TypeInner::Matrix {
                columns: VectorSize::Quad,
                rows: VectorSize::Quad,
                scalar,
            } if *scalar == Scalar::F32 => UniformKind::Mat4,
            TypeInner::Array {
                base,
                size: naga::ArraySize::Constant(len),
                stride,
            } => match &module.types[*base].inner {
                TypeInner::Scalar(s) | TypeInner::Vector { scalar: s, .. } if *s == Scalar::I32 => {
                    UniformKind::IntArray {
                        len: len.get(),
                        stride: *stride,
                    }
                }
                _ => UniformKind::Unsupported,
            },
            _ => UniformKind::Unsupported,
        }
    }
}

/// One named uniform inside a program.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformInfo {
    pub name: String,
    /// Index of the uniform buffer (see [`UniformBlock`]) holding the value.
    pub block: usize,
    /// Byte offset inside the block.
    pub offset: u32,
    pub kind: UniformKind,
}

/// One uniform buffer binding in group 0.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBlock {
    pub binding: u32,
    /// Buffer size in bytes, rounded up to 16.
    pub size: u32,
}

/// A texture unit sampled by a program.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TextureUnit {
    pub unit: u32,
    /// `texture_2d<f32>` declared at `@binding(2 * unit)`.
    pub texture: bool,
    /// `sampler` declared at `@binding(2 * unit + 1)`.
    pub sampler: bool,
}

impl TextureUnit {
    pub fn texture_binding(self) -> u32 {
        self.unit * 2
    }

    pub fn sampler_binding(self) -> u32 {
        self.unit * 2 + 1
    }
}

/// What a resource global is, as far as binding layouts care.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ResourceKind {
    Uniform { size: u32 },
    Texture2d,
    Sampler,
    Other(String),
}

/// A resource global declared by one stage.
#[derive(Debug, Clone)]
pub(crate) struct ResourceDecl {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub kind: ResourceKind,
    /// Uniform names and their offset/kind, for uniform globals.
    pub fields: Vec<(String, u32, UniformKind)>,
}

/// A user-defined stage input or output.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Varying {
    pub location: u32,
    pub ty: TypeInner,
}

pub(crate) fn resources(module: &Module) -> Vec<ResourceDecl> {
    let mut out = Vec::new();

    for (_, global) in module.global_variables.iter() {
        let Some(binding) = &global.binding else { continue };
        let name = global.name.clone().unwrap_or_default();
        let inner = &module.types[global.ty].inner;

        let (kind, fields) = match global.space {
            naga::AddressSpace::Uniform => {
                let size = inner.size(module.to_ctx()).next_multiple_of(16);
                let fields = match inner {
                    TypeInner::Struct { members, .. } => members
                        .iter()
                        .filter_map(|m| {
                            let member = m.name.clone()?;
                            Some((member, m.offset, UniformKind::classify(module, m.ty)))
                        })
                        .collect(),
                    _ => vec![(name.clone(), 0, UniformKind::classify(module, global.ty))],
                };
                (ResourceKind::Uniform { size }, fields)
            }
            naga::AddressSpace::Handle => match inner {
                TypeInner::Image {
                    dim: naga::ImageDimension::D2,
                    arrayed: false,
                    class:
                        naga::ImageClass::Sampled {
                            kind: naga::ScalarKind::Float,
                            multi: false,
                        },
                } => (ResourceKind::Texture2d, Vec::new()),
                TypeInner::Sampler { comparison: false } => (ResourceKind::Sampler, Vec::new()),
                other => (ResourceKind::Other(describe(other)), Vec::new()),
            },
            other => (ResourceKind::Other(format!("{other:?} buffer")), Vec::new()),
        };

        out.push(ResourceDecl {
            name,
            group: binding.group,
            binding: binding.binding,
            kind,
            fields,
        });
    }

    out
}

/// Inputs of an entry point (its located arguments, flattened through structs).
pub(crate) fn inputs(module: &Module, ep: &naga::EntryPoint) -> Vec<Varying> {
    let mut out = Vec::new();
    for arg in &ep.function.arguments {
        collect_located(module, arg.ty, arg.binding.as_ref(), &mut out);
    }
    out.sort_by_key(|v| v.location);
    out
}

/// Outputs of an entry point (its located result, flattened through structs).
pub(crate) fn outputs(module: &Module, ep: &naga::EntryPoint) -> Vec<Varying> {
    let mut out = Vec::new();
    if let Some(result) = &ep.function.result {
        collect_located(module, result.ty, result.binding.as_ref(), &mut out);
    }
    out.sort_by_key(|v| v.location);
    out
}

fn collect_located(
    module: &Module,
    ty: Handle<Type>,
    binding: Option<&naga::Binding>,
    out: &mut Vec<Varying>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => out.push(Varying {
            location: *location,
            ty: module.types[ty].inner.clone(),
        }),
        // Builtins (position, vertex_index, ...) are not part of the interface.
        Some(_) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for m in members {
                    collect_located(module, m.ty, m.binding.as_ref(), out);
                }
            }
        }
    }
}

/// Short WGSL-like spelling of a type, for diagnostics.
pub(crate) fn describe(inner: &TypeInner) -> String {
    fn scalar(s: &Scalar) -> String {
        let prefix = match s.kind {
            naga::ScalarKind::Float => "f",
            naga::ScalarKind::Sint => "i",
            naga::ScalarKind::Uint => "u",
            naga::ScalarKind::Bool => return "bool".to_string(),
            _ => return format!("{:?}", s.kind),
        };
        format!("{prefix}{}", s.width as u32 * 8)
    }

    fn count(size: &VectorSize) -> u32 {
        match size {
            VectorSize::Bi => 2,
            VectorSize::Tri => 3,
            VectorSize::Quad => 4,
        }
    }

    match inner {
        TypeInner::Scalar(s) => scalar(s),
        TypeInner::Vector { size, scalar: s } => format!("vec{}<{}>", count(size), scalar(s)),
        TypeInner::Matrix {
            columns,
            rows,
            scalar: s,
        } => format!("mat{}x{}<{}>", count(columns), count(rows), scalar(s)),
        TypeInner::Image { dim, class, .. } => format!("texture ({dim:?}, {class:?})"),
        TypeInner::Sampler { comparison } => {
            if *comparison {
                "sampler_comparison".to_string()
            } else {
                "sampler".to_string()
            }
        }
        other => format!("{other:?}"),
    }
}
