//! Error types of the rendering core.
//!
//! Load, compile and link failures abort construction of the affected resource
//! and are returned to the caller. A uniform that cannot be found is not an
//! error: it is logged once per program and then ignored.

use std::path::PathBuf;

use thiserror::Error;

use crate::renderer::RendererState;
use crate::shader::ShaderStage;

/// A texture or shader source file could not be turned into data.
#[derive(Error, Debug)]
pub enum ResourceLoadError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file was read but is not a decodable image.
    #[error("failed to decode image {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The image decoded to zero pixels.
    #[error("image {} has no pixels", path.display())]
    Empty { path: PathBuf },

    /// Raw pixel data does not match the stated size.
    #[error("{len} bytes do not form a {width}x{height} RGBA8 image ({})", path.display())]
    PixelData {
        path: PathBuf,
        width: u32,
        height: u32,
        len: usize,
    },

    /// The image exceeds the device's 2D texture size limit.
    #[error("image {} is {width}x{height}, the device allows at most {max}x{max}", path.display())]
    TooLarge {
        path: PathBuf,
        width: u32,
        height: u32,
        max: u32,
    },
}

/// Failure to build a shader program.
#[derive(Error, Debug)]
pub enum ShaderError {
    /// A stage source file could not be read.
    #[error(transparent)]
    Load(#[from] ResourceLoadError),

    /// One stage failed to compile. Linking was not attempted.
    #[error("{stage} shader '{origin}' failed to compile:\n{diagnostic}")]
    Compile {
        stage: ShaderStage,
        origin: String,
        diagnostic: String,
    },

    /// Both stages compiled but the program could not be linked.
    #[error("shader program failed to link:\n{diagnostic}")]
    Link { diagnostic: String },
}

impl ShaderError {
    /// Stage that failed to compile, if this is a compile error.
    pub fn stage(&self) -> Option<ShaderStage> {
        match self {
            ShaderError::Compile { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Compiler or linker diagnostic text, if any.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            ShaderError::Compile { diagnostic, .. } | ShaderError::Link { diagnostic } => {
                Some(diagnostic)
            }
            ShaderError::Load(_) => None,
        }
    }

    pub fn is_link(&self) -> bool {
        matches!(self, ShaderError::Link { .. })
    }
}

/// Failure of a renderer lifecycle operation.
#[derive(Error, Debug)]
pub enum RendererError {
    /// A built-in shader failed to build.
    #[error("built-in shader failed: {0}")]
    Shader(#[from] ShaderError),

    /// A built-in texture could not be created.
    #[error("built-in texture failed: {0}")]
    Resource(#[from] ResourceLoadError),

    /// The operation is not valid in the renderer's current state.
    #[error("cannot {operation} while renderer is {state:?}")]
    InvalidState {
        state: RendererState,
        operation: &'static str,
    },
}
