//! Linking two compiled stages into one program interface.
//!
//! Linking only looks at reflected IR; no GPU object is created here. A program
//! whose stages link is guaranteed to describe a pipeline layout the renderer
//! can build.

use std::collections::HashMap;

use naga::{Scalar, TypeInner, VectorSize};

use crate::device::MAX_TEXTURE_UNITS;
use crate::error::ShaderError;

use super::reflect::{
    self, describe, ResourceDecl, ResourceKind, TextureUnit, UniformBlock, UniformInfo,
    Varying, TEXTURE_GROUP, UNIFORM_GROUP,
};
use super::stage::CompiledStage;
use super::UniformLocation;

/// Vertex attributes the renderer's geometry provides.
///
/// Location 0 is the unit-square position, location 1 the texture coordinate.
const VERTEX_ATTRIBUTES: [u32; 2] = [0, 1];

/// Everything the host side needs to know about a linked program.
#[derive(Debug, Clone)]
pub struct ProgramInterface {
    pub(crate) vertex_entry: String,
    pub(crate) fragment_entry: String,
    pub(crate) uniforms: Vec<UniformInfo>,
    pub(crate) names: HashMap<String, UniformLocation>,
    pub(crate) blocks: Vec<UniformBlock>,
    pub(crate) texture_units: Vec<TextureUnit>,
}

impl ProgramInterface {
    /// Looks a uniform up by name.
    ///
    /// Members of a uniform struct answer to both `member` and `global.member`.
    pub fn find_uniform(&self, name: &str) -> Option<UniformLocation> {
        self.names.get(name).copied()
    }

    pub fn uniform(&self, location: UniformLocation) -> Option<&UniformInfo> {
        self.uniforms.get(location.index())
    }

    pub fn uniforms(&self) -> &[UniformInfo] {
        &self.uniforms
    }

    pub fn uniform_blocks(&self) -> &[UniformBlock] {
        &self.blocks
    }

    /// Texture units the fragment or vertex stage samples, ordered by unit.
    pub fn texture_units(&self) -> &[TextureUnit] {
        &self.texture_units
    }

    pub fn vertex_entry(&self) -> &str {
        &self.vertex_entry
    }

    pub fn fragment_entry(&self) -> &str {
        &self.fragment_entry
    }
}

/// Links a vertex and a fragment stage.
///
/// Every problem found is collected into one diagnostic, one line per problem.
pub fn link(vertex: &CompiledStage, fragment: &CompiledStage) -> Result<ProgramInterface, ShaderError> {
    let mut problems = Vec::new();

    let vertex_ep = vertex.entry_point();
    let fragment_ep = fragment.entry_point();
    if vertex_ep.is_none() {
        problems.push(format!("'{}' declares no @vertex entry point", vertex.origin()));
    }
    if fragment_ep.is_none() {
        problems.push(format!("'{}' declares no @fragment entry point", fragment.origin()));
    }
    let (Some(vertex_ep), Some(fragment_ep)) = (vertex_ep, fragment_ep) else {
        return Err(link_error(problems));
    };

    // Vertex inputs must come from the quad geometry.
    let vec2_f32 = TypeInner::Vector {
        size: VectorSize::Bi,
        scalar: Scalar::F32,
    };
    for input in reflect::inputs(&vertex.module, vertex_ep) {
        if !VERTEX_ATTRIBUTES.contains(&input.location) {
            problems.push(format!(
                "vertex input @location({}) is not provided (available: 0 = position, 1 = tex_coord)",
                input.location
            ));
        } else if input.ty != vec2_f32 {
            problems.push(format!(
                "vertex input @location({}) must be vec2<f32>, found {}",
                input.location,
                describe(&input.ty)
            ));
        }
    }

    // Every fragment input must be written by the vertex stage.
    let produced = reflect::outputs(&vertex.module, vertex_ep);
    for input in reflect::inputs(&fragment.module, fragment_ep) {
        match produced.iter().find(|v| v.location == input.location) {
            None => problems.push(format!(
                "fragment input @location({}) is not written by the vertex stage",
                input.location
            )),
            Some(out) if out.ty != input.ty => problems.push(format!(
                "@location({}) is {} in the vertex stage but {} in the fragment stage",
                input.location,
                describe(&out.ty),
                describe(&input.ty)
            )),
            Some(_) => {}
        }
    }

    // Color targets are normalized formats; the written color must be float.
    let colors = reflect::outputs(&fragment.module, fragment_ep);
    match colors.iter().find(|v: &&Varying| v.location == 0) {
        None => problems.push("fragment stage does not write @location(0)".to_string()),
        Some(color) if !is_f32_color(&color.ty) => problems.push(format!(
            "fragment output @location(0) must be f32 color, found {}",
            describe(&color.ty)
        )),
        Some(_) => {}
    }

    let resources = merge_resources(
        reflect::resources(&vertex.module),
        reflect::resources(&fragment.module),
        &mut problems,
    );

    let mut blocks = Vec::new();
    let mut uniforms = Vec::new();
    let mut names = HashMap::new();
    let mut units: HashMap<u32, TextureUnit> = HashMap::new();

    for decl in &resources {
        match (decl.group, &decl.kind) {
            (UNIFORM_GROUP, ResourceKind::Uniform { size }) => {
                let block = blocks.len();
                blocks.push(UniformBlock {
                    binding: decl.binding,
                    size: *size,
                });

                for (field, offset, kind) in &decl.fields {
                    let location = UniformLocation::new(uniforms.len() as u32);
                    let qualified = format!("{}.{}", decl.name, field);
                    let is_member = *field != decl.name;

                    if names.insert(field.clone(), location).is_some() {
                        problems.push(format!("uniform name '{field}' is declared more than once"));
                    }
                    if is_member {
                        names.insert(qualified, location);
                    }
                    uniforms.push(UniformInfo {
                        name: field.clone(),
                        block,
                        offset: *offset,
                        kind: *kind,
                    });
                }
            }
            (UNIFORM_GROUP, other) => problems.push(format!(
                "'{}' at @group(0) @binding({}) must be a uniform buffer, found {}",
                decl.name,
                decl.binding,
                kind_name(other)
            )),
            (TEXTURE_GROUP, ResourceKind::Texture2d | ResourceKind::Sampler) => {
                let unit = decl.binding / 2;
                let is_texture = matches!(decl.kind, ResourceKind::Texture2d);
                if unit as usize >= MAX_TEXTURE_UNITS {
                    problems.push(format!(
                        "'{}' uses texture unit {unit}; only {MAX_TEXTURE_UNITS} units exist",
                        decl.name
                    ));
                    continue;
                }
                if is_texture != (decl.binding % 2 == 0) {
                    problems.push(format!(
                        "'{}' at @group(1) @binding({}): textures use even bindings, samplers odd ones",
                        decl.name, decl.binding
                    ));
                    continue;
                }
                let entry = units.entry(unit).or_insert(TextureUnit {
                    unit,
                    texture: false,
                    sampler: false,
                });
                if is_texture {
                    entry.texture = true;
                } else {
                    entry.sampler = true;
                }
            }
            (TEXTURE_GROUP, other) => problems.push(format!(
                "'{}' at @group(1) @binding({}) must be a texture_2d<f32> or sampler, found {}",
                decl.name,
                decl.binding,
                kind_name(other)
            )),
            (group, _) => problems.push(format!(
                "'{}' uses @group({group}); only groups 0 (uniforms) and 1 (textures) exist",
                decl.name
            )),
        }
    }

    if !problems.is_empty() {
        return Err(link_error(problems));
    }

    let mut texture_units: Vec<_> = units.into_values().collect();
    texture_units.sort_by_key(|u| u.unit);

    Ok(ProgramInterface {
        vertex_entry: vertex_ep.name.clone(),
        fragment_entry: fragment_ep.name.clone(),
        uniforms,
        names,
        blocks,
        texture_units,
    })
}

/// Merges per-stage resource declarations.
///
/// A binding used by both stages must be declared identically in each.
fn merge_resources(
    vertex: Vec<ResourceDecl>,
    fragment: Vec<ResourceDecl>,
    problems: &mut Vec<String>,
) -> Vec<ResourceDecl> {
    let mut merged: Vec<ResourceDecl> = vertex;

    for decl in fragment {
        match merged
            .iter()
            .find(|m| m.group == decl.group && m.binding == decl.binding)
        {
            Some(existing) => {
                if existing.kind != decl.kind || existing.fields != decl.fields {
                    problems.push(format!(
                        "@group({}) @binding({}) is declared differently by the two stages ('{}' vs '{}')",
                        decl.group, decl.binding, existing.name, decl.name
                    ));
                }
            }
            None => merged.push(decl),
        }
    }

    merged.sort_by_key(|d| (d.group, d.binding));
    merged
}

fn is_f32_color(ty: &TypeInner) -> bool {
    match ty {
        TypeInner::Scalar(scalar) => *scalar == Scalar::F32,
        TypeInner::Vector { scalar, .. } => *scalar == Scalar::F32,
        _ => false,
    }
}

fn kind_name(kind: &ResourceKind) -> String {
    match kind {
        ResourceKind::Uniform { .. } => "a uniform buffer".to_string(),
        ResourceKind::Texture2d => "a texture".to_string(),
        ResourceKind::Sampler => "a sampler".to_string(),
        ResourceKind::Other(what) => what.clone(),
    }
}

fn link_error(problems: Vec<String>) -> ShaderError {
    ShaderError::Link {
        diagnostic: problems.join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::reflect::UniformKind;
    use crate::shader::stage::compile_stage;
    use crate::shader::ShaderStage;

    fn stages(vs: &str, fs: &str) -> (CompiledStage, CompiledStage) {
        (
            compile_stage(ShaderStage::Vertex, vs, "test.vert").unwrap(),
            compile_stage(ShaderStage::Fragment, fs, "test.frag").unwrap(),
        )
    }

    const FLAT_VS: &str = include_str!("shaders/flat.vert.wgsl");
    const FLAT_FS: &str = include_str!("shaders/flat.frag.wgsl");
    const SPRITE_VS: &str = include_str!("shaders/sprite.vert.wgsl");
    const SPRITE_FS: &str = include_str!("shaders/sprite.frag.wgsl");

    // ── built-ins ─────────────────────────────────────────────────────────

    #[test]
    fn flat_program_links() {
        let (v, f) = stages(FLAT_VS, FLAT_FS);
        let iface = link(&v, &f).unwrap();

        let names: Vec<_> = iface.uniforms().iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["u_ViewProjection", "u_Model", "u_Color"]);
        assert!(iface.texture_units().is_empty());
        assert_eq!(iface.vertex_entry(), "vs_main");
        assert_eq!(iface.fragment_entry(), "fs_main");
    }

    #[test]
    fn sprite_program_links_with_one_texture_unit() {
        let (v, f) = stages(SPRITE_VS, SPRITE_FS);
        let iface = link(&v, &f).unwrap();

        assert_eq!(
            iface.texture_units(),
            &[TextureUnit { unit: 0, texture: true, sampler: true }]
        );
        let loc = iface.find_uniform("u_Color").unwrap();
        assert_eq!(iface.uniform(loc).unwrap().kind, UniformKind::Float4);
    }

    #[test]
    fn unknown_uniform_is_not_found() {
        let (v, f) = stages(FLAT_VS, FLAT_FS);
        let iface = link(&v, &f).unwrap();
        assert_eq!(iface.find_uniform("u_Missing"), None);
    }

    // ── struct uniforms ───────────────────────────────────────────────────

    #[test]
    fn struct_members_answer_to_both_names() {
        let vs = r#"
            struct Camera { u_ViewProjection: mat4x4<f32>, u_Time: f32 };
            @group(0) @binding(0) var<uniform> camera: Camera;
            @vertex fn vs_main(@location(0) p: vec2<f32>) -> @builtin(position) vec4<f32> {
                return camera.u_ViewProjection * vec4<f32>(p, camera.u_Time, 1.0);
            }
        "#;
        let (v, f) = stages(vs, FLAT_FS);
        let iface = link(&v, &f).unwrap();

        let bare = iface.find_uniform("u_Time").unwrap();
        assert_eq!(iface.find_uniform("camera.u_Time"), Some(bare));
        let info = iface.uniform(bare).unwrap();
        assert_eq!((info.offset, info.kind), (64, UniformKind::Float));
    }

    // ── link failures ─────────────────────────────────────────────────────

    #[test]
    fn missing_varying_fails_to_link() {
        // The flat vertex stage writes no tex_coord.
        let (v, f) = stages(FLAT_VS, SPRITE_FS);
        let err = link(&v, &f).unwrap_err();
        assert!(err.is_link());
        assert!(err.diagnostic().unwrap().contains("@location(0)"));
    }

    #[test]
    fn varying_type_mismatch_fails_to_link() {
        let fs = r#"
            @fragment fn fs_main(@location(0) uv: vec3<f32>) -> @location(0) vec4<f32> {
                return vec4<f32>(uv, 1.0);
            }
        "#;
        let (v, f) = stages(SPRITE_VS, fs);
        let err = link(&v, &f).unwrap_err();
        let text = err.diagnostic().unwrap();
        assert!(text.contains("vec2<f32>") && text.contains("vec3<f32>"), "{text}");
    }

    #[test]
    fn missing_entry_point_fails_to_link() {
        // Fragment source passed as the vertex stage.
        let (v, f) = stages(FLAT_FS, FLAT_FS);
        let err = link(&v, &f).unwrap_err();
        assert!(err.diagnostic().unwrap().contains("no @vertex entry point"));
    }

    #[test]
    fn conflicting_bindings_fail_to_link() {
        let fs = r#"
            @group(0) @binding(1) var<uniform> u_Tint: vec4<f32>;
            @fragment fn fs_main() -> @location(0) vec4<f32> { return u_Tint; }
        "#;
        let (v, f) = stages(FLAT_VS, fs);
        let err = link(&v, &f).unwrap_err();
        assert!(err.diagnostic().unwrap().contains("@binding(1)"));
    }

    #[test]
    fn unsupported_vertex_input_fails_to_link() {
        let vs = r#"
            @vertex fn vs_main(@location(2) c: vec4<f32>) -> @builtin(position) vec4<f32> {
                return c;
            }
        "#;
        let (v, f) = stages(vs, FLAT_FS);
        let err = link(&v, &f).unwrap_err();
        assert!(err.diagnostic().unwrap().contains("@location(2)"));
    }

    #[test]
    fn integer_color_output_fails_to_link() {
        let fs = r#"
            @fragment fn fs_main() -> @location(0) vec4<i32> { return vec4<i32>(1, 0, 0, 1); }
        "#;
        let (v, f) = stages(FLAT_VS, fs);
        let err = link(&v, &f).unwrap_err();
        let text = err.diagnostic().unwrap();
        assert!(text.contains("must be f32 color") && text.contains("vec4<i32>"), "{text}");
    }

    #[test]
    fn extra_bind_group_fails_to_link() {
        let fs = r#"
            @group(2) @binding(0) var<uniform> u_Extra: vec4<f32>;
            @fragment fn fs_main() -> @location(0) vec4<f32> { return u_Extra; }
        "#;
        let (v, f) = stages(FLAT_VS, fs);
        let err = link(&v, &f).unwrap_err();
        assert!(err.diagnostic().unwrap().contains("@group(2)"));
    }
}
