//! Shared helpers for tests that need a device.

use std::rc::Rc;

use crate::logging::{init_logging, LoggingConfig};

use super::{GpuContext, GpuInit};

/// Acquires a headless context.
///
/// Without a usable adapter this falls back to wgpu's noop backend, which
/// executes nothing but still validates every call, so GPU-backed tests run
/// on every machine. `None` only if both fail.
pub(crate) fn gpu() -> Option<Rc<GpuContext>> {
    init_logging(LoggingConfig::for_tests());

    let ctx = GpuContext::headless_blocking(GpuInit::default()).or_else(|err| {
        log::info!("no hardware adapter ({err:#}), using the noop backend");
        GpuContext::headless_blocking(noop_init())
    });
    match ctx {
        Ok(ctx) => Some(Rc::new(ctx)),
        Err(err) => {
            log::warn!("skipping GPU-backed test: {err:#}");
            None
        }
    }
}

fn noop_init() -> GpuInit {
    GpuInit {
        backends: wgpu::Backends::NOOP,
        backend_options: wgpu::BackendOptions {
            noop: wgpu::NoopBackendOptions { enable: true },
            ..Default::default()
        },
        ..GpuInit::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_context_is_always_available() {
        let ctx = gpu().expect("hardware or noop adapter");
        assert!(ctx.device().limits().max_texture_dimension_2d > 0);
    }

    #[test]
    fn noop_backend_is_opt_in() {
        assert!(!GpuInit::default().backend_options.noop.enable);
        let noop = noop_init();
        assert_eq!(noop.backends, wgpu::Backends::NOOP);
        assert!(noop.backend_options.noop.enable);
    }
}
