//! Cursor-reactive fluid: a semi-Lagrangian solver over double-buffered
//! fields, driven by pointer splats.

pub mod backend;
pub mod capabilities;
pub mod cpu;
pub mod field;
pub mod gpu;
pub mod resolution;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::color::{Rgb, generate_color};
use crate::config::FluidConfig;
use crate::error::EngineError;
use crate::input::{ClickSplat, Pointer};

pub use backend::{DisplayParams, FluidBackend, SplatParams};
pub use capabilities::{Capabilities, FormatSupport};
pub use field::{DoubleField, FieldData, FieldKind, FieldSet, FieldTarget};
pub use resolution::resolution_for;

/// Color multiplier for click splats.
const CLICK_COLOR_BOOST: f32 = 10.0;

pub struct FluidEngine<B: FluidBackend> {
    backend: B,
    config: FluidConfig,
    fields: Option<FieldSet<B::Field>>,
    canvas: (u32, u32),
    color_timer: f32,
    rng: StdRng,
}

impl<B: FluidBackend> FluidEngine<B> {
    /// Applies the capability fallback to `config` and allocates every
    /// field. An allocation failure here is fatal for the engine.
    pub fn new(
        mut backend: B,
        config: &FluidConfig,
        canvas_width: u32,
        canvas_height: u32,
        seed: u64,
    ) -> Result<Self, EngineError> {
        let caps = *backend.capabilities();
        let config = config.downgraded_for(caps.supports_linear_filtering);
        if !caps.supports_linear_filtering {
            log::warn!(
                "no linear filtering on float targets; dye resolution {} and shading off",
                config.dye_resolution
            );
        }
        let canvas = (canvas_width.max(1), canvas_height.max(1));
        backend.resize_output(canvas.0, canvas.1)?;
        let fields = allocate(&mut backend, &config, canvas, None)?;

        Ok(Self {
            backend,
            config,
            fields: Some(fields),
            canvas,
            color_timer: 0.0,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Effective configuration after the capability fallback.
    pub fn config(&self) -> &FluidConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn canvas(&self) -> (u32, u32) {
        self.canvas
    }

    pub fn fields(&self) -> Option<&FieldSet<B::Field>> {
        self.fields.as_ref()
    }

    pub fn sim_resolution(&self) -> Option<(u32, u32)> {
        self.fields.as_ref().map(|f| f.velocity.size())
    }

    pub fn dye_resolution(&self) -> Option<(u32, u32)> {
        self.fields.as_ref().map(|f| f.dye.size())
    }

    /// Recomputes both resolutions for the new canvas and replaces only the
    /// fields whose size changed. Replaced fields are dropped here.
    pub fn resize(&mut self, canvas_width: u32, canvas_height: u32) {
        let canvas = (canvas_width.max(1), canvas_height.max(1));
        if canvas == self.canvas && self.fields.is_some() {
            return;
        }
        self.canvas = canvas;
        if let Err(err) = self.backend.resize_output(canvas.0, canvas.1) {
            log::warn!("display output reallocation failed: {err}");
        }
        let previous = self.fields.take();
        match allocate(&mut self.backend, &self.config, canvas, previous) {
            Ok(fields) => self.fields = Some(fields),
            Err(err) => log::warn!("field reallocation failed, skipping frames: {err}"),
        }
    }

    /// Advances the pointer color timer; on every whole unit it wraps and
    /// gives each pointer a fresh color.
    pub fn update_colors(&mut self, dt: f32, pointers: &mut [Pointer]) {
        self.color_timer += dt * self.config.color_update_speed;
        if self.color_timer >= 1.0 {
            self.color_timer = wrap(self.color_timer, 0.0, 1.0);
            for p in pointers.iter_mut() {
                p.color = generate_color(&mut self.rng);
            }
        }
    }

    pub fn color_timer(&self) -> f32 {
        self.color_timer
    }

    /// One full solver frame: curl, vorticity, divergence, pressure solve,
    /// gradient subtraction, advection, splats and display.
    pub fn step(&mut self, dt: f32, pointers: &mut [Pointer], clicks: &[ClickSplat]) {
        let Some(fields) = self.fields.as_mut() else {
            return;
        };
        let b = &mut self.backend;
        let cfg = &self.config;

        b.begin_frame();

        b.curl(&fields.velocity.read, &mut fields.curl);

        b.vorticity(&fields.velocity.read, &fields.curl, &mut fields.velocity.write, cfg.curl, dt);
        fields.velocity.swap();

        b.divergence(&fields.velocity.read, &mut fields.divergence);

        b.scale(&fields.pressure.read, &mut fields.pressure.write, cfg.pressure);
        fields.pressure.swap();

        for _ in 0..cfg.pressure_iterations {
            b.jacobi(&fields.pressure.read, &fields.divergence, &mut fields.pressure.write);
            fields.pressure.swap();
        }

        b.subtract_gradient(&fields.pressure.read, &fields.velocity.read, &mut fields.velocity.write);
        fields.velocity.swap();

        b.advect(
            &fields.velocity.read,
            &fields.velocity.read,
            &mut fields.velocity.write,
            dt,
            cfg.velocity_dissipation,
        );
        fields.velocity.swap();

        b.advect(
            &fields.velocity.read,
            &fields.dye.read,
            &mut fields.dye.write,
            dt,
            cfg.density_dissipation,
        );
        fields.dye.swap();

        let aspect_ratio = self.canvas.0 as f32 / self.canvas.1 as f32;
        let radius = correct_radius(cfg.splat_radius / 100.0, aspect_ratio);

        for p in pointers.iter_mut().filter(|p| p.moved) {
            p.moved = false;
            let force = [p.delta[0] * cfg.splat_force, p.delta[1] * cfg.splat_force];
            splat(b, fields, p.texcoord, force, p.color, radius, aspect_ratio);
        }

        for click in clicks {
            let color = generate_color(&mut self.rng).scaled(CLICK_COLOR_BOOST);
            let force = [
                10.0 * (self.rng.gen_range(0.0..1.0f32) - 0.5),
                30.0 * (self.rng.gen_range(0.0..1.0f32) - 0.5),
            ];
            splat(b, fields, click.texcoord, force, color, radius, aspect_ratio);
        }

        let background = (!cfg.transparent).then_some(cfg.back_color);
        b.display(&fields.dye.read, &DisplayParams { shading: cfg.shading, background });

        b.end_frame();
    }

    pub fn read_velocity(&mut self) -> Result<Option<FieldData>, EngineError> {
        self.read(|f| &f.velocity.read)
    }

    pub fn read_dye(&mut self) -> Result<Option<FieldData>, EngineError> {
        self.read(|f| &f.dye.read)
    }

    pub fn read_pressure(&mut self) -> Result<Option<FieldData>, EngineError> {
        self.read(|f| &f.pressure.read)
    }

    pub fn read_divergence(&mut self) -> Result<Option<FieldData>, EngineError> {
        self.read(|f| &f.divergence)
    }

    fn read(
        &mut self,
        select: impl Fn(&FieldSet<B::Field>) -> &B::Field,
    ) -> Result<Option<FieldData>, EngineError> {
        match self.fields.as_ref() {
            Some(fields) => self.backend.read_field(select(fields)).map(Some),
            None => Ok(None),
        }
    }
}

fn splat<B: FluidBackend>(
    b: &mut B,
    fields: &mut FieldSet<B::Field>,
    point: [f32; 2],
    force: [f32; 2],
    color: Rgb,
    radius: f32,
    aspect_ratio: f32,
) {
    let velocity = SplatParams { point, value: [force[0], force[1], 0.0], radius, aspect_ratio };
    b.splat(&fields.velocity.read, &mut fields.velocity.write, &velocity);
    fields.velocity.swap();

    let dye = SplatParams { value: color.to_array(), ..velocity };
    b.splat(&fields.dye.read, &mut fields.dye.write, &dye);
    fields.dye.swap();
}

/// Allocates fields for `canvas`, reusing any from `previous` whose size
/// still matches.
fn allocate<B: FluidBackend>(
    backend: &mut B,
    config: &FluidConfig,
    canvas: (u32, u32),
    previous: Option<FieldSet<B::Field>>,
) -> Result<FieldSet<B::Field>, EngineError> {
    let sim = resolution_for(config.sim_resolution, canvas.0, canvas.1);
    let dye = resolution_for(config.dye_resolution, canvas.0, canvas.1);

    let (velocity, dye_field, pressure, divergence, curl) = match previous {
        Some(p) => (Some(p.velocity), Some(p.dye), Some(p.pressure), Some(p.divergence), Some(p.curl)),
        None => (None, None, None, None, None),
    };

    let fields = FieldSet {
        velocity: reuse_double(backend, velocity, FieldKind::Velocity, sim)?,
        dye: reuse_double(backend, dye_field, FieldKind::Dye, dye)?,
        pressure: reuse_double(backend, pressure, FieldKind::Pressure, sim)?,
        divergence: reuse_single(backend, divergence, FieldKind::Divergence, sim)?,
        curl: reuse_single(backend, curl, FieldKind::Curl, sim)?,
    };
    log::debug!("fluid fields: sim {}x{}, dye {}x{}", sim.0, sim.1, dye.0, dye.1);
    Ok(fields)
}

fn reuse_single<B: FluidBackend>(
    backend: &mut B,
    old: Option<B::Field>,
    kind: FieldKind,
    size: (u32, u32),
) -> Result<B::Field, EngineError> {
    match old {
        Some(field) if field.size() == size => Ok(field),
        old => {
            drop(old);
            log::debug!("allocating {} field {}x{}", kind.label(), size.0, size.1);
            backend.create_field(kind, size.0, size.1)
        }
    }
}

fn reuse_double<B: FluidBackend>(
    backend: &mut B,
    old: Option<DoubleField<B::Field>>,
    kind: FieldKind,
    size: (u32, u32),
) -> Result<DoubleField<B::Field>, EngineError> {
    match old {
        Some(field) if field.size() == size => Ok(field),
        old => {
            drop(old);
            log::debug!("allocating {} double field {}x{}", kind.label(), size.0, size.1);
            Ok(DoubleField::new(
                backend.create_field(kind, size.0, size.1)?,
                backend.create_field(kind, size.0, size.1)?,
            ))
        }
    }
}

/// Widens the splat on landscape canvases so it stays round on screen.
pub fn correct_radius(radius: f32, aspect_ratio: f32) -> f32 {
    if aspect_ratio > 1.0 { radius * aspect_ratio } else { radius }
}

fn wrap(value: f32, min: f32, max: f32) -> f32 {
    let range = max - min;
    if range == 0.0 {
        return min;
    }
    (value - min) % range + min
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_keeps_fraction() {
        assert!((wrap(1.25, 0.0, 1.0) - 0.25).abs() < 1e-6);
        assert!((wrap(3.5, 0.0, 1.0) - 0.5).abs() < 1e-6);
        assert_eq!(wrap(5.0, 2.0, 2.0), 2.0);
    }

    #[test]
    fn radius_widens_on_landscape_only() {
        assert_eq!(correct_radius(0.002, 2.0), 0.004);
        assert_eq!(correct_radius(0.002, 0.5), 0.002);
    }
}
