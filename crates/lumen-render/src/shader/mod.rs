//! Shader programs: WGSL compile and link, uniform reflection and setters.

mod library;
mod link;
mod program;
mod reflect;
mod stage;
mod uniform;

pub use library::ShaderLibrary;
pub use link::{link, ProgramInterface};
pub use program::{PipelineTarget, ShaderProgram};
pub use reflect::{TextureUnit, UniformBlock, UniformInfo, UniformKind};
pub use stage::{compile_stage, CompiledStage, ShaderStage};
pub use uniform::{UniformLocation, UniformValue};

pub(crate) use program::ProgramGpu;
