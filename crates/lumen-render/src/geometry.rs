//! Quad geometry shared by sprite and solid-color draws.

use std::cell::Cell;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};
use wgpu::util::DeviceExt;

use crate::device::GpuContext;

// ── quad vertex ───────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2], // unit square, 0..1
    pub tex_coord: [f32; 2],
}

impl QuadVertex {
    const ATTRS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        0 => Float32x2, // position
        1 => Float32x2  // tex_coord
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

/// Corners of the unit quad, in vertex order.
const QUAD_CORNERS: [[f32; 2]; 4] = [[0.0, 1.0], [1.0, 0.0], [0.0, 0.0], [1.0, 1.0]];

pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 3, 1];

pub const QUAD_TRIANGLES: u32 = 2;

/// The four quad vertices with texture coordinates spanning `uv_min..uv_max`.
///
/// Positions never change: the quad is placed by the model transform.
pub fn quad_vertices(uv_min: Vec2, uv_max: Vec2) -> [QuadVertex; 4] {
    QUAD_CORNERS.map(|[x, y]| QuadVertex {
        position: [x, y],
        tex_coord: [
            if x == 0.0 { uv_min.x } else { uv_max.x },
            if y == 0.0 { uv_min.y } else { uv_max.y },
        ],
    })
}

/// Model transform of a quad drawn at `position` with `size`, rotated by
/// `rotation_degrees` around its own center.
pub fn model_transform(position: Vec2, size: Vec2, rotation_degrees: f32) -> Mat4 {
    let half = (size * 0.5).extend(0.0);
    Mat4::from_translation(position.extend(0.0))
        * Mat4::from_translation(half)
        * Mat4::from_rotation_z(rotation_degrees.to_radians())
        * Mat4::from_translation(-half)
        * Mat4::from_scale(Vec3::new(size.x, size.y, 1.0))
}

// ── gpu buffers ───────────────────────────────────────────────────────────

/// Vertex and index buffers of one quad.
///
/// The vertex buffer is rewritten per draw so each draw can carry its own
/// texture region.
pub struct QuadGeometry {
    vbo: wgpu::Buffer,
    ibo: wgpu::Buffer,
    uploaded: Cell<[QuadVertex; 4]>,
}

impl QuadGeometry {
    pub fn new(ctx: &GpuContext, label: &str) -> Self {
        let device = ctx.device();

        let vertices = quad_vertices(Vec2::ZERO, Vec2::ONE);
        let vbo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} vbo")),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        let ibo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} ibo")),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        log::trace!("quad geometry '{label}' created");
        Self {
            vbo,
            ibo,
            uploaded: Cell::new(vertices),
        }
    }

    /// Writes the vertices for texture region `uv_min..uv_max`.
    pub fn upload(&self, ctx: &GpuContext, uv_min: Vec2, uv_max: Vec2) {
        let vertices = quad_vertices(uv_min, uv_max);
        ctx.queue()
            .write_buffer(&self.vbo, 0, bytemuck::cast_slice(&vertices));
        self.uploaded.set(vertices);
    }

    /// Vertices most recently written to the vertex buffer.
    pub fn vertices(&self) -> [QuadVertex; 4] {
        self.uploaded.get()
    }

    pub(crate) fn vertex_buffer(&self) -> &wgpu::Buffer {
        &self.vbo
    }

    pub(crate) fn index_buffer(&self) -> &wgpu::Buffer {
        &self.ibo
    }

    pub fn index_count(&self) -> u32 {
        QUAD_INDICES.len() as u32
    }
}
