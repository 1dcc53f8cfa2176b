use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Context, Result};

use crate::shader::ProgramGpu;
use crate::texture::TextureGpu;

use super::{BindingState, ResourceId};

/// Initialization parameters for a headless GPU context.
///
/// Keep this structure stable and minimal. Add configuration flags only when a
/// concrete platform or backend requirement exists.
#[derive(Debug, Clone)]
pub struct GpuInit {
    /// Backends wgpu may pick an adapter from.
    pub backends: wgpu::Backends,

    /// Adapter preference when several are available.
    pub power_preference: wgpu::PowerPreference,

    /// Ask for a software adapter (useful on CI machines).
    pub force_fallback_adapter: bool,

    /// Required wgpu features.
    ///
    /// Favor an empty set for portability unless a feature is strictly necessary.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    pub required_limits: wgpu::Limits,

    /// Per-backend instance options (GL, DX12, noop).
    pub backend_options: wgpu::BackendOptions,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults(),
            backend_options: wgpu::BackendOptions::default(),
        }
    }
}

/// The GPU context every core operation runs against.
///
/// Owns the logical device and queue plus the context's binding state (the
/// current program and texture units). It is created once by the application
/// entry point and passed down as `Rc<GpuContext>`; it is deliberately not
/// `Sync`, since all calls must come from the thread that owns the context.
pub struct GpuContext {
    /// Logical device.
    device: wgpu::Device,

    /// Command queue.
    queue: wgpu::Queue,

    /// Identification of the adapter the device was created from.
    adapter_info: wgpu::AdapterInfo,

    /// Program and texture units currently bound.
    bindings: RefCell<BindingState<ProgramGpu, TextureGpu>>,
}

impl GpuContext {
    /// Adopts a device that the windowing layer already created.
    pub fn from_parts(
        device: wgpu::Device,
        queue: wgpu::Queue,
        adapter_info: wgpu::AdapterInfo,
    ) -> Self {
        log::debug!(
            "gpu context adopted: {} ({:?})",
            adapter_info.name,
            adapter_info.backend
        );
        Self {
            device,
            queue,
            adapter_info,
            bindings: RefCell::new(BindingState::default()),
        }
    }

    /// Creates a context without any surface, for offscreen rendering and tests.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn headless(init: GpuInit) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: init.backends,
            backend_options: init.backend_options.clone(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: None,
                force_fallback_adapter: init.force_fallback_adapter,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("lumen-render device"),
                required_features: init.required_features,
                required_limits: init.required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        Ok(Self::from_parts(device, queue, adapter.get_info()))
    }

    /// Blocking variant of [`headless`](Self::headless).
    pub fn headless_blocking(init: GpuInit) -> Result<Self> {
        pollster::block_on(Self::headless(init))
    }

    /// Returns a reference to the logical device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the command queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Returns the adapter identification (name, vendor, driver, backend).
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    // ── binding state ──────────────────────────────────────────────────────

    pub(crate) fn bind_program(&self, program: &Rc<ProgramGpu>) {
        self.bindings.borrow_mut().bind_program(Rc::clone(program));
    }

    pub(crate) fn unbind_program(&self) {
        self.bindings.borrow_mut().unbind_program();
    }

    /// Program currently bound, if any.
    pub fn bound_program_id(&self) -> Option<ResourceId> {
        self.bindings.borrow().program_id()
    }

    pub(crate) fn bound_program(&self) -> Option<Rc<ProgramGpu>> {
        self.bindings.borrow().program().cloned()
    }

    pub(crate) fn bind_texture(&self, slot: u32, texture: &Rc<TextureGpu>) -> bool {
        self.bindings
            .borrow_mut()
            .bind_texture(slot, Rc::clone(texture))
    }

    pub(crate) fn unbind_texture(&self, id: ResourceId) {
        self.bindings.borrow_mut().unbind_texture(id);
    }

    /// Texture currently bound to `slot`, if any.
    pub fn bound_texture_id(&self, slot: u32) -> Option<ResourceId> {
        self.bindings.borrow().texture_id(slot)
    }

    pub(crate) fn bound_texture(&self, slot: u32) -> Option<Rc<TextureGpu>> {
        self.bindings.borrow().texture(slot).cloned()
    }

    /// Unbinds the program and every texture unit.
    pub fn reset_bindings(&self) {
        self.bindings.borrow_mut().reset();
    }
}
