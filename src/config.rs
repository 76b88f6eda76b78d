use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::color::{Rgb, parse_css_color};

/// Tunables for the fluid engine. Fixed for the lifetime of an engine;
/// [`FluidConfig::downgraded_for`] may lower some of them once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluidConfig {
    pub sim_resolution: u32,
    pub dye_resolution: u32,
    pub density_dissipation: f32,
    pub velocity_dissipation: f32,
    /// Factor applied to last frame's pressure before the Jacobi solve.
    pub pressure: f32,
    pub pressure_iterations: u32,
    pub curl: f32,
    pub splat_radius: f32,
    pub splat_force: f32,
    pub shading: bool,
    pub color_update_speed: f32,
    pub back_color: Rgb,
    pub transparent: bool,
}

/// Dye resolution used when the device cannot filter float textures.
pub const FALLBACK_DYE_RESOLUTION: u32 = 256;

impl Default for FluidConfig {
    fn default() -> Self {
        Self {
            sim_resolution: 128,
            dye_resolution: 1440,
            density_dissipation: 3.5,
            velocity_dissipation: 2.0,
            pressure: 0.1,
            pressure_iterations: 20,
            curl: 3.0,
            splat_radius: 0.2,
            splat_force: 6000.0,
            shading: true,
            color_update_speed: 10.0,
            back_color: Rgb::new(0.5, 0.0, 0.0),
            transparent: true,
        }
    }
}

impl FluidConfig {
    /// Applies the capability fallback: without linear filtering the dye
    /// field drops to [`FALLBACK_DYE_RESOLUTION`] and shading is disabled,
    /// whatever was requested.
    pub fn downgraded_for(&self, supports_linear_filtering: bool) -> Self {
        let mut cfg = self.clone();
        if !supports_linear_filtering {
            cfg.dye_resolution = FALLBACK_DYE_RESOLUTION;
            cfg.shading = false;
        }
        cfg.sim_resolution = cfg.sim_resolution.max(1);
        cfg.dye_resolution = cfg.dye_resolution.max(1);
        cfg
    }
}

/// Tunables for the particle vortex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VortexConfig {
    pub particle_count: usize,
    pub range_y: f32,
    pub base_speed: f32,
    pub range_speed: f32,
    pub base_radius: f32,
    pub range_radius: f32,
    pub base_hue: f32,
    /// CSS color string (`#rrggbb`, `#rgb`, `black`, ...).
    pub background_color: String,
}

impl Default for VortexConfig {
    fn default() -> Self {
        Self {
            particle_count: 1000,
            range_y: 200.0,
            base_speed: 0.5,
            range_speed: 2.0,
            base_radius: 1.5,
            range_radius: 3.0,
            base_hue: 220.0,
            background_color: "#000000".into(),
        }
    }
}

impl VortexConfig {
    pub fn background(&self) -> Rgb {
        parse_css_color(&self.background_color).unwrap_or_else(|| {
            log::warn!("unrecognized background color {:?}, using black", self.background_color);
            Rgb::BLACK
        })
    }
}

/// Everything the backdrop needs, as one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackdropConfig {
    pub fluid: FluidConfig,
    pub vortex: VortexConfig,
    /// Seed for every random source; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl BackdropConfig {
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        use anyhow::Context;
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: BackdropConfig =
            serde_json::from_str(r#"{"fluid": {"curl": 30}, "vortex": {"particle_count": 5}}"#)
                .unwrap();
        assert_eq!(cfg.fluid.curl, 30.0);
        assert_eq!(cfg.fluid.pressure_iterations, 20);
        assert_eq!(cfg.vortex.particle_count, 5);
        assert_eq!(cfg.vortex.base_hue, 220.0);
        assert_eq!(cfg.seed, None);
    }

    #[test]
    fn downgrade_without_linear_filtering() {
        let cfg = FluidConfig { dye_resolution: 2048, shading: true, ..Default::default() };
        let low = cfg.downgraded_for(false);
        assert_eq!(low.dye_resolution, FALLBACK_DYE_RESOLUTION);
        assert!(!low.shading);

        let full = cfg.downgraded_for(true);
        assert_eq!(full.dye_resolution, 2048);
        assert!(full.shading);
    }

    #[test]
    fn background_falls_back_to_black() {
        let cfg = VortexConfig { background_color: "mauve-ish".into(), ..Default::default() };
        assert_eq!(cfg.background(), Rgb::BLACK);
    }
}
