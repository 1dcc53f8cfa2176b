//! Lumen rendering core.
//!
//! This crate owns the GPU-resident pieces of a small 2D renderer: shader
//! programs with reflected uniforms, textures, sprite geometry, and the
//! frame/scene bracketing renderer that submits draws and counts them.
//!
//! Windowing, event dispatch and the run loop live outside this crate. They
//! hand a [`device::GpuContext`] and a per-frame [`device::RenderTarget`] in.

pub mod device;
pub mod logging;

pub mod color;
pub mod error;
pub mod geometry;
pub mod renderer;
pub mod shader;
pub mod sprite;
pub mod texture;

pub use color::Color;
pub use device::{GpuContext, GpuInit, RenderTarget, ResourceId};
pub use error::{RendererError, ResourceLoadError, ShaderError};
pub use renderer::{RenderStats, Renderer, RendererConfig, RendererState};
pub use shader::{PipelineTarget, ShaderLibrary, ShaderProgram, ShaderStage, UniformLocation, UniformValue};
pub use sprite::Sprite;
pub use texture::Texture;
