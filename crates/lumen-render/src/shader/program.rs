use std::cell::RefCell;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

use crate::device::{Bindable, GpuContext, ResourceId};
use crate::error::{ResourceLoadError, ShaderError};
use crate::geometry::QuadVertex;
use crate::texture::TextureGpu;

use super::link::{link, ProgramInterface};
use super::stage::{compile_stage, CompiledStage, ShaderStage};
use super::uniform::{UniformLocation, UniformState, UniformValue};

/// Attachment formats and fixed-function state a program is linked against.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PipelineTarget {
    pub color_format: wgpu::TextureFormat,

    /// `None` disables depth testing.
    pub depth_format: Option<wgpu::TextureFormat>,

    /// Straight-alpha blending (`SrcAlpha, OneMinusSrcAlpha`).
    pub blending: bool,
}

impl Default for PipelineTarget {
    fn default() -> Self {
        Self {
            color_format: wgpu::TextureFormat::Bgra8UnormSrgb,
            depth_format: Some(wgpu::TextureFormat::Depth24Plus),
            blending: true,
        }
    }
}

/// GPU side of a linked program.
///
/// Kept behind `Rc` so binding it on a context keeps it alive after the owning
/// [`ShaderProgram`] is dropped.
pub(crate) struct ProgramGpu {
    id: ResourceId,
    label: String,
    target: PipelineTarget,
    interface: ProgramInterface,

    pipeline: wgpu::RenderPipeline,
    uniform_buffers: Vec<wgpu::Buffer>,
    uniform_bind_group: wgpu::BindGroup,
    texture_layout: Option<wgpu::BindGroupLayout>,

    uniforms: RefCell<UniformState>,
}

impl Bindable for ProgramGpu {
    fn resource_id(&self) -> ResourceId {
        self.id
    }
}

impl Drop for ProgramGpu {
    fn drop(&mut self) {
        log::debug!("shader program {} released", self.label);
    }
}

impl ProgramGpu {
    fn create(
        ctx: &GpuContext,
        vertex: &CompiledStage,
        fragment: &CompiledStage,
        interface: ProgramInterface,
        target: PipelineTarget,
    ) -> Result<Self, ShaderError> {
        let device = ctx.device();
        let id = ResourceId::next();
        let label = format!("{id} ({} + {})", vertex.origin(), fragment.origin());

        // wgpu still validates the pipeline against the target formats; capture
        // what it rejects instead of reaching the uncaptured-error handler.
        let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);

        // Stage modules only live for the duration of pipeline creation.
        let vs_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(vertex.origin()),
            source: wgpu::ShaderSource::Wgsl(vertex.source.as_str().into()),
        });
        let fs_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(fragment.origin()),
            source: wgpu::ShaderSource::Wgsl(fragment.source.as_str().into()),
        });

        // ── group 0: uniforms ──────────────────────────────────────────────

        let uniform_entries: Vec<_> = interface
            .uniform_blocks()
            .iter()
            .map(|block| wgpu::BindGroupLayoutEntry {
                binding: block.binding,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lumen program uniforms bgl"),
            entries: &uniform_entries,
        });

        let uniform_buffers: Vec<_> = interface
            .uniform_blocks()
            .iter()
            .map(|block| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("lumen program uniform buffer"),
                    size: u64::from(block.size.max(16)),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();
        let uniform_bind_entries: Vec<_> = interface
            .uniform_blocks()
            .iter()
            .zip(&uniform_buffers)
            .map(|(block, buffer)| wgpu::BindGroupEntry {
                binding: block.binding,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lumen program uniforms"),
            layout: &uniform_layout,
            entries: &uniform_bind_entries,
        });

        // ── group 1: texture units ─────────────────────────────────────────

        let texture_layout = (!interface.texture_units().is_empty()).then(|| {
            let mut entries = Vec::new();
            for unit in interface.texture_units() {
                if unit.texture {
                    entries.push(wgpu::BindGroupLayoutEntry {
                        binding: unit.texture_binding(),
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    });
                }
                if unit.sampler {
                    entries.push(wgpu::BindGroupLayoutEntry {
                        binding: unit.sampler_binding(),
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    });
                }
            }
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("lumen program textures bgl"),
                entries: &entries,
            })
        });

        let mut layouts = vec![&uniform_layout];
        layouts.extend(texture_layout.as_ref());
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lumen program pipeline layout"),
            bind_group_layouts: &layouts,
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&label),
            layout: Some(&pipeline_layout),

            vertex: wgpu::VertexState {
                module: &vs_module,
                entry_point: Some(interface.vertex_entry()),
                compilation_options: Default::default(),
                buffers: &[QuadVertex::layout()],
            },

            fragment: Some(wgpu::FragmentState {
                module: &fs_module,
                entry_point: Some(interface.fragment_entry()),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target.color_format,
                    blend: target.blending.then_some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: target.depth_format.map(|format| wgpu::DepthStencilState {
                format,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),

            multiview_mask: None,
            cache: None,
        });

        drop(vs_module);
        drop(fs_module);

        if let Some(err) = pollster::block_on(scope.pop()) {
            return Err(ShaderError::Link {
                diagnostic: format!("'{label}' was rejected by the device: {err}"),
            });
        }

        let uniforms = RefCell::new(UniformState::new(&interface));
        log::debug!("shader program {label} linked");

        Ok(Self {
            id,
            label,
            target,
            interface,
            pipeline,
            uniform_buffers,
            uniform_bind_group,
            texture_layout,
            uniforms,
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn target(&self) -> PipelineTarget {
        self.target
    }

    pub fn pipeline(&self) -> &wgpu::RenderPipeline {
        &self.pipeline
    }

    pub fn uniform_bind_group(&self) -> &wgpu::BindGroup {
        &self.uniform_bind_group
    }

    pub fn set(&self, name: &str, value: UniformValue<'_>) {
        self.uniforms
            .borrow_mut()
            .set(&self.interface, name, value, &self.label);
    }

    /// Uploads uniform blocks written since the last flush.
    pub fn flush(&self, queue: &wgpu::Queue) {
        let mut uniforms = self.uniforms.borrow_mut();
        if !uniforms.staging.is_dirty() {
            return;
        }
        uniforms.staging.flush(|block, bytes| {
            if let Some(buffer) = self.uniform_buffers.get(block) {
                queue.write_buffer(buffer, 0, bytes);
            }
        });
    }

    /// Bind group for group 1 built from the context's texture units.
    ///
    /// Units with nothing bound sample `fallback`. `None` if the program
    /// samples no texture.
    pub fn texture_bind_group(
        &self,
        ctx: &GpuContext,
        fallback: &Rc<TextureGpu>,
    ) -> Option<wgpu::BindGroup> {
        let layout = self.texture_layout.as_ref()?;

        let bound: Vec<Rc<TextureGpu>> = self
            .interface
            .texture_units()
            .iter()
            .map(|unit| {
                ctx.bound_texture(unit.unit)
                    .unwrap_or_else(|| Rc::clone(fallback))
            })
            .collect();

        let mut entries = Vec::new();
        for (unit, texture) in self.interface.texture_units().iter().zip(&bound) {
            if unit.texture {
                entries.push(wgpu::BindGroupEntry {
                    binding: unit.texture_binding(),
                    resource: wgpu::BindingResource::TextureView(texture.view()),
                });
            }
            if unit.sampler {
                entries.push(wgpu::BindGroupEntry {
                    binding: unit.sampler_binding(),
                    resource: wgpu::BindingResource::Sampler(texture.sampler()),
                });
            }
        }

        Some(ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lumen program textures"),
            layout,
            entries: &entries,
        }))
    }
}

/// A linked vertex + fragment program and its uniform state.
///
/// Uniform setters write into a CPU copy; the copy is uploaded right before
/// the next draw that uses the program. Names are resolved once and cached per
/// program, including names the program does not declare.
pub struct ShaderProgram {
    gpu: Rc<ProgramGpu>,
    vertex_origin: String,
    fragment_origin: String,
}

impl fmt::Debug for ShaderProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("id", &self.gpu.id)
            .field("vertex", &self.vertex_origin)
            .field("fragment", &self.fragment_origin)
            .finish()
    }
}

impl ShaderProgram {
    /// Compiles and links a program from WGSL source text.
    ///
    /// The vertex stage is compiled first; a vertex failure is reported without
    /// looking at the fragment source.
    pub fn compile(
        ctx: &GpuContext,
        vertex_src: &str,
        fragment_src: &str,
        target: PipelineTarget,
    ) -> Result<Self, ShaderError> {
        Self::build(ctx, (vertex_src, "<vertex>"), (fragment_src, "<fragment>"), target)
    }

    /// Reads both stage sources from disk, then compiles and links them.
    pub fn from_files(
        ctx: &GpuContext,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
        target: PipelineTarget,
    ) -> Result<Self, ShaderError> {
        let vertex_path = vertex_path.as_ref();
        let fragment_path = fragment_path.as_ref();

        let vertex_src = read_source(vertex_path)?;
        let fragment_src = read_source(fragment_path)?;

        Self::build(
            ctx,
            (&vertex_src, &vertex_path.display().to_string()),
            (&fragment_src, &fragment_path.display().to_string()),
            target,
        )
    }

    fn build(
        ctx: &GpuContext,
        (vertex_src, vertex_origin): (&str, &str),
        (fragment_src, fragment_origin): (&str, &str),
        target: PipelineTarget,
    ) -> Result<Self, ShaderError> {
        let linked = compile_stage(ShaderStage::Vertex, vertex_src, vertex_origin)
            .and_then(|vertex| {
                let fragment = compile_stage(ShaderStage::Fragment, fragment_src, fragment_origin)?;
                let interface = link(&vertex, &fragment)?;
                Ok((vertex, fragment, interface))
            });

        let gpu = linked
            .and_then(|(vertex, fragment, interface)| {
                ProgramGpu::create(ctx, &vertex, &fragment, interface, target)
            })
            .inspect_err(|err| log::error!("{err}"))?;

        Ok(Self {
            gpu: Rc::new(gpu),
            vertex_origin: vertex_origin.to_string(),
            fragment_origin: fragment_origin.to_string(),
        })
    }

    /// Makes this program current on `ctx`.
    pub fn bind(&self, ctx: &GpuContext) {
        ctx.bind_program(&self.gpu);
    }

    /// Clears the current program on `ctx`, whichever it is.
    pub fn unbind(&self, ctx: &GpuContext) {
        ctx.unbind_program();
    }

    pub fn id(&self) -> ResourceId {
        self.gpu.id()
    }

    pub fn vertex_origin(&self) -> &str {
        &self.vertex_origin
    }

    pub fn fragment_origin(&self) -> &str {
        &self.fragment_origin
    }

    pub fn target(&self) -> PipelineTarget {
        self.gpu.target()
    }

    pub fn interface(&self) -> &ProgramInterface {
        &self.gpu.interface
    }

    /// Resolves `name` through the program's cache.
    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.gpu
            .uniforms
            .borrow_mut()
            .location(&self.gpu.interface, name, &self.gpu.label)
    }

    /// Lookups that missed the location cache so far.
    pub fn uniform_lookups(&self) -> usize {
        self.gpu.uniforms.borrow().cache.lookups()
    }

    pub fn set_uniform(&self, name: &str, value: UniformValue<'_>) {
        self.gpu.set(name, value);
    }

    pub fn set_int(&self, name: &str, value: i32) {
        self.set_uniform(name, UniformValue::Int(value));
    }

    pub fn set_int_array(&self, name: &str, values: &[i32]) {
        self.set_uniform(name, UniformValue::IntArray(values));
    }

    pub fn set_float(&self, name: &str, value: f32) {
        self.set_uniform(name, UniformValue::Float(value));
    }

    pub fn set_float2(&self, name: &str, value: Vec2) {
        self.set_uniform(name, UniformValue::Float2(value));
    }

    pub fn set_float3(&self, name: &str, value: Vec3) {
        self.set_uniform(name, UniformValue::Float3(value));
    }

    pub fn set_float4(&self, name: &str, value: Vec4) {
        self.set_uniform(name, UniformValue::Float4(value));
    }

    pub fn set_mat3(&self, name: &str, value: Mat3) {
        self.set_uniform(name, UniformValue::Mat3(value));
    }

    pub fn set_mat4(&self, name: &str, value: Mat4) {
        self.set_uniform(name, UniformValue::Mat4(value));
    }

    pub(crate) fn gpu(&self) -> &Rc<ProgramGpu> {
        &self.gpu
    }

    /// Last value written to a `mat4x4<f32>` uniform.
    #[cfg(test)]
    pub(crate) fn staged_mat4(&self, name: &str) -> Option<Mat4> {
        let interface = &self.gpu.interface;
        let info = interface.uniform(interface.find_uniform(name)?)?;
        let uniforms = self.gpu.uniforms.borrow();
        let start = info.offset as usize;
        let bytes = uniforms.staging.block(info.block)?.get(start..start + 64)?;
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Some(Mat4::from_cols_slice(&floats))
    }
}

fn read_source(path: &Path) -> Result<String, ResourceLoadError> {
    std::fs::read_to_string(path).map_err(|source| ResourceLoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}
