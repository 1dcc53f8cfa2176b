//! GPU context management.
//!
//! This module is responsible for:
//! - acquiring (or adopting) the wgpu Device/Queue the core renders with
//! - tracking what is bound on the context (program, texture units)
//! - describing the per-frame color target handed in by the windowing layer

mod binding;
mod gpu;
mod id;
mod target;

pub use binding::MAX_TEXTURE_UNITS;
pub use gpu::{GpuContext, GpuInit};
pub use id::ResourceId;
pub use target::RenderTarget;

pub(crate) use binding::{Bindable, BindingState};

#[cfg(test)]
pub(crate) mod test_support;
