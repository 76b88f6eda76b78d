//! Ties the router, the lifecycle helpers and both engines into one
//! per-frame entry point for a host window.

use std::time::Instant;

use crate::config::BackdropConfig;
use crate::error::EngineError;
use crate::fluid::{FluidBackend, FluidEngine};
use crate::input::{Activation, InputEvent, PointerRouter, Routed};
use crate::lifecycle::{Debouncer, FrameClock, ResizeTracker, VORTEX_RESIZE_DEBOUNCE, backing_size};
use crate::settings::EffectSettings;
use crate::vortex::VortexEngine;

/// What one call to [`Backdrop::frame`] did.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameReport {
    pub fluid_stepped: bool,
    pub vortex_stepped: bool,
    pub dt: f32,
}

pub struct Backdrop<B: FluidBackend> {
    fluid: Option<FluidEngine<B>>,
    vortex: VortexEngine,
    router: PointerRouter,
    fluid_size: ResizeTracker,
    vortex_size: ResizeTracker,
    vortex_resize: Debouncer<(u32, u32)>,
    clock: Option<FrameClock>,
    disposed: bool,
}

impl<B: FluidBackend> Backdrop<B> {
    /// Builds both layers for a window of `client_width`×`client_height`.
    /// `backend` is only called when the fluid layer is enabled; if it or
    /// the engine fails, the fluid layer stays off and the vortex still runs.
    pub fn new(
        config: &BackdropConfig,
        settings: EffectSettings,
        backend: impl FnOnce() -> Result<B, EngineError>,
        client_width: f32,
        client_height: f32,
        pixel_ratio: f32,
    ) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        let (width, height) = backing_size(client_width, client_height, pixel_ratio);

        let fluid = if settings.fluid_enabled {
            match backend().and_then(|b| FluidEngine::new(b, &config.fluid, width, height, seed)) {
                Ok(engine) => Some(engine),
                Err(err) => {
                    log::warn!("fluid layer disabled: {err}");
                    None
                }
            }
        } else {
            log::info!("fluid layer disabled by settings");
            None
        };

        Self {
            fluid,
            vortex: VortexEngine::initialize(&config.vortex, width, height, seed.wrapping_add(1)),
            router: PointerRouter::new(width, height, pixel_ratio, seed.wrapping_add(2)),
            fluid_size: ResizeTracker::with_size(width, height),
            vortex_size: ResizeTracker::with_size(width, height),
            vortex_resize: Debouncer::new(VORTEX_RESIZE_DEBOUNCE),
            clock: None,
            disposed: false,
        }
    }

    pub fn fluid(&self) -> Option<&FluidEngine<B>> {
        self.fluid.as_ref()
    }

    pub fn fluid_mut(&mut self) -> Option<&mut FluidEngine<B>> {
        self.fluid.as_mut()
    }

    pub fn vortex(&self) -> &VortexEngine {
        &self.vortex
    }

    pub fn router(&self) -> &PointerRouter {
        &self.router
    }

    pub fn activation(&self) -> Activation {
        self.router.activation()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn handle_event(&mut self, event: &InputEvent, now: Instant) -> Routed {
        if self.disposed {
            return Routed::Ignored;
        }
        let routed = self.router.handle(event);
        if routed == Routed::Activated {
            log::info!("pointer activity, starting fluid loop");
            self.clock = Some(FrameClock::new(now));
        }
        routed
    }

    /// Window resize. Both layers use the backing size at `pixel_ratio`. The
    /// fluid reallocates right away; the vortex surface follows once resizes
    /// have been quiet for the debounce period.
    pub fn resize(&mut self, client_width: f32, client_height: f32, pixel_ratio: f32, now: Instant) {
        if self.disposed {
            return;
        }
        if let Some((w, h)) = self.fluid_size.update(client_width, client_height, pixel_ratio) {
            self.router.set_surface(w, h, pixel_ratio);
            if let Some(fluid) = self.fluid.as_mut() {
                fluid.resize(w, h);
            }
        }
        if let Some(size) = self.vortex_size.update(client_width, client_height, pixel_ratio) {
            self.vortex_resize.push(now, size);
        }
    }

    pub fn frame(&mut self, now: Instant) -> FrameReport {
        let mut report = FrameReport::default();
        if self.disposed {
            return report;
        }

        if let Some((w, h)) = self.vortex_resize.poll(now) {
            log::debug!("vortex surface resized to {w}x{h}");
            self.vortex.resize(w, h);
        }

        // presses with no running fluid are dropped, not replayed later
        let clicks = self.router.take_clicks();
        if let (Some(fluid), Some(clock)) = (self.fluid.as_mut(), self.clock.as_mut()) {
            let dt = clock.tick(now);
            fluid.update_colors(dt, self.router.pointers_mut());
            fluid.step(dt, self.router.pointers_mut(), &clicks);
            report.fluid_stepped = true;
            report.dt = dt;
        }

        report.vortex_stepped = self.vortex.surface().is_some();
        self.vortex.step();
        report
    }

    /// Stops all frame work and releases the fluid backend.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.fluid = None;
        self.clock = None;
        self.vortex.detach();
        self.vortex_resize.cancel();
        log::debug!("backdrop disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VortexConfig;
    use crate::fluid::cpu::CpuBackend;

    fn small_config() -> BackdropConfig {
        let mut config = BackdropConfig {
            vortex: VortexConfig { particle_count: 20, ..Default::default() },
            seed: Some(5),
            ..Default::default()
        };
        config.fluid.sim_resolution = 16;
        config.fluid.dye_resolution = 32;
        config.fluid.pressure_iterations = 2;
        config
    }

    #[test]
    fn failed_backend_keeps_vortex_running() {
        let mut b: Backdrop<CpuBackend> = Backdrop::new(
            &small_config(),
            EffectSettings::default(),
            || Err(EngineError::UnsupportedFormat { channels: 4 }),
            64.0,
            48.0,
            1.0,
        );
        assert!(b.fluid().is_none());
        let report = b.frame(Instant::now());
        assert!(report.vortex_stepped);
        assert!(!report.fluid_stepped);
    }

    #[test]
    fn disabled_setting_skips_backend() {
        let b: Backdrop<CpuBackend> = Backdrop::new(
            &small_config(),
            EffectSettings { fluid_enabled: false },
            || panic!("backend must not be created"),
            64.0,
            48.0,
            1.0,
        );
        assert!(b.fluid().is_none());
    }
}
