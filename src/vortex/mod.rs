//! Ambient particle vortex: particles drift through a simplex flow field
//! and leave fading, glowing trails on a raster surface.

pub mod particle;
pub mod raster;

use image::RgbaImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::color::{Rgb, hsl_to_rgb};
use crate::config::VortexConfig;
use crate::noise_field::NoiseField;

pub use particle::{BASE_TTL, PARTICLE_PROP_COUNT, Particle, RANGE_HUE, RANGE_TTL, fade_in_out};

/// Per-frame pull of velocity toward the flow direction. Applied once per
/// frame regardless of frame time.
const VELOCITY_BLEND: f32 = 0.5;
const PARTICLE_SATURATION: f32 = 1.0;
const PARTICLE_LIGHTNESS: f32 = 0.6;
const GLOW_BRIGHTNESS: f32 = 2.0;
const GLOW_PASSES: [f32; 2] = [8.0, 4.0];

pub struct VortexEngine {
    config: VortexConfig,
    background: Rgb,
    noise: NoiseField,
    rng: StdRng,
    particles: Vec<f32>,
    surface: Option<RgbaImage>,
    center: [f32; 2],
    tick: u64,
}

impl VortexEngine {
    /// Allocates the particle buffer and a `width`×`height` surface. A
    /// zero-sized surface leaves the engine idle until [`Self::resize`].
    pub fn initialize(config: &VortexConfig, width: u32, height: u32, seed: u64) -> Self {
        let mut engine = Self {
            background: config.background(),
            config: config.clone(),
            noise: NoiseField::new((seed ^ (seed >> 32)) as u32),
            rng: StdRng::seed_from_u64(seed),
            particles: vec![0.0; config.particle_count * PARTICLE_PROP_COUNT],
            surface: None,
            center: [0.0, 0.0],
            tick: 0,
        };
        engine.resize(width, height);

        for slot in engine.particles.chunks_exact_mut(PARTICLE_PROP_COUNT) {
            spawn(&mut engine.rng, &engine.config, engine.center, width as f32).write(slot);
        }
        log::debug!("vortex: {} particles on {}x{}", config.particle_count, width, height);
        engine
    }

    pub fn config(&self) -> &VortexConfig {
        &self.config
    }

    /// Flat buffer, [`PARTICLE_PROP_COUNT`] floats per particle.
    pub fn particles(&self) -> &[f32] {
        &self.particles
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len() / PARTICLE_PROP_COUNT
    }

    pub fn particle(&self, i: usize) -> Option<Particle> {
        self.particles
            .get(i * PARTICLE_PROP_COUNT..(i + 1) * PARTICLE_PROP_COUNT)
            .map(Particle::read)
    }

    pub fn surface(&self) -> Option<&RgbaImage> {
        self.surface.as_ref()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn center(&self) -> [f32; 2] {
        self.center
    }

    /// Replaces the surface. Particles keep their positions; ones now
    /// outside respawn on their next step.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.center = [0.5 * width as f32, 0.5 * height as f32];
        if width == 0 || height == 0 {
            self.surface = None;
            return;
        }
        let mut surface = RgbaImage::new(width, height);
        raster::fill(&mut surface, self.background);
        self.surface = Some(surface);
    }

    /// Drops the surface; `step` does nothing afterwards.
    pub fn detach(&mut self) {
        self.surface = None;
    }

    pub fn step(&mut self) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        self.tick += 1;
        raster::fill(surface, self.background);

        let (width, height) = (surface.width() as f32, surface.height() as f32);
        for slot in self.particles.chunks_exact_mut(PARTICLE_PROP_COUNT) {
            let p = Particle::read(slot);
            let angle = self.noise.flow_angle(p.x, p.y, self.tick);
            let vx = particle::lerp(p.vx, angle.cos(), VELOCITY_BLEND);
            let vy = particle::lerp(p.vy, angle.sin(), VELOCITY_BLEND);
            let x = p.x + vx * p.speed;
            let y = p.y + vy * p.speed;

            let color = hsl_to_rgb(p.hue, PARTICLE_SATURATION, PARTICLE_LIGHTNESS);
            raster::stroke_segment(surface, [p.x, p.y], [x, y], p.radius, color, p.alpha());

            let moved = Particle { x, y, vx, vy, age: p.age + 1.0, ..p };
            let outside = x > width || x < 0.0 || y > height || y < 0.0;
            if outside || p.age > p.ttl {
                spawn(&mut self.rng, &self.config, self.center, width).write(slot);
            } else {
                moved.write(slot);
            }
        }

        for radius in GLOW_PASSES {
            raster::glow(surface, radius, GLOW_BRIGHTNESS);
        }
    }
}

impl std::fmt::Debug for VortexEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VortexEngine")
            .field("particles", &self.particle_count())
            .field("surface", &self.surface.as_ref().map(|s| s.dimensions()))
            .field("tick", &self.tick)
            .finish()
    }
}

/// `n * U[0, 1)`; safe for `n == 0`.
fn rand(rng: &mut StdRng, n: f32) -> f32 {
    n * rng.gen_range(0.0..1.0f32)
}

/// Fresh particle: anywhere across the width, within `range_y` of the
/// vertical center, at rest with age 0.
fn spawn(rng: &mut StdRng, config: &VortexConfig, center: [f32; 2], width: f32) -> Particle {
    let x = rand(rng, width);
    let y = center[1] + config.range_y - rand(rng, 2.0 * config.range_y);
    Particle {
        x,
        y,
        vx: 0.0,
        vy: 0.0,
        age: 0.0,
        ttl: BASE_TTL + rand(rng, RANGE_TTL),
        speed: config.base_speed + rand(rng, config.range_speed),
        radius: config.base_radius + rand(rng, config.range_radius),
        hue: config.base_hue + rand(rng, RANGE_HUE),
    }
}
