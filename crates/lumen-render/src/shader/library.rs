use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use crate::device::GpuContext;
use crate::error::ShaderError;

use super::{PipelineTarget, ShaderProgram};

const FLAT_VERTEX: &str = include_str!("shaders/flat.vert.wgsl");
const FLAT_FRAGMENT: &str = include_str!("shaders/flat.frag.wgsl");
const SPRITE_VERTEX: &str = include_str!("shaders/sprite.vert.wgsl");
const SPRITE_FRAGMENT: &str = include_str!("shaders/sprite.frag.wgsl");

/// Shader programs owned by a renderer.
///
/// Holds the two built-in programs plus any number of named custom ones.
/// Sprites receive their program from here instead of building a private one.
pub struct ShaderLibrary {
    target: PipelineTarget,
    flat: Rc<ShaderProgram>,
    textured: Rc<ShaderProgram>,
    custom: HashMap<String, Rc<ShaderProgram>>,
}

impl ShaderLibrary {
    /// Builds the built-in programs for `target`.
    pub fn new(ctx: &GpuContext, target: PipelineTarget) -> Result<Self, ShaderError> {
        let flat = ShaderProgram::compile(ctx, FLAT_VERTEX, FLAT_FRAGMENT, target)?;
        let textured = ShaderProgram::compile(ctx, SPRITE_VERTEX, SPRITE_FRAGMENT, target)?;
        log::debug!(
            "built-in shaders ready: flat {}, textured {}",
            flat.id(),
            textured.id()
        );

        Ok(Self {
            target,
            flat: Rc::new(flat),
            textured: Rc::new(textured),
            custom: HashMap::new(),
        })
    }

    /// Solid-color quad program (`u_Color` tint, no texture).
    pub fn flat(&self) -> &Rc<ShaderProgram> {
        &self.flat
    }

    /// Textured quad program (texture unit 0 times `u_Color`).
    pub fn textured(&self) -> &Rc<ShaderProgram> {
        &self.textured
    }

    pub fn target(&self) -> PipelineTarget {
        self.target
    }

    /// Registers `program` under `name`, returning the one it replaces.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        program: ShaderProgram,
    ) -> Option<Rc<ShaderProgram>> {
        let name = name.into();
        if program.target() != self.target {
            log::warn!(
                "shader '{name}' targets {:?}, library renders to {:?}; its draws will be skipped",
                program.target(),
                self.target
            );
        }
        self.custom.insert(name, Rc::new(program))
    }

    pub fn get(&self, name: &str) -> Option<&Rc<ShaderProgram>> {
        self.custom.get(name)
    }

    /// Compiles a program from files against the library's target and
    /// registers it under `name`.
    pub fn load(
        &mut self,
        ctx: &GpuContext,
        name: impl Into<String>,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> Result<Rc<ShaderProgram>, ShaderError> {
        let name = name.into();
        let program = ShaderProgram::from_files(ctx, vertex_path, fragment_path, self.target)?;
        let program = Rc::new(program);
        self.custom.insert(name, Rc::clone(&program));
        Ok(program)
    }

    pub fn len(&self) -> usize {
        self.custom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.custom.is_empty()
    }
}
