use anyhow::{Context, Result, bail};
use backdrop_fx::config::{BackdropConfig, FluidConfig, VortexConfig};
use backdrop_fx::fluid::cpu::CpuBackend;
use backdrop_fx::fluid::gpu::GpuBackend;
use backdrop_fx::fluid::{Capabilities, FieldData, FluidBackend, FluidEngine};
use backdrop_fx::input::{Activation, InputEvent, PointerRouter};
use backdrop_fx::settings::EffectSettings;
use backdrop_fx::{Backdrop, VortexEngine};
use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use std::time::{Duration, Instant};

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Request {
    Probe,
    FluidStep {
        #[serde(default = "default_width")]
        width: u32,
        #[serde(default = "default_height")]
        height: u32,
        #[serde(default = "default_steps")]
        steps: u32,
        #[serde(default = "default_dt")]
        dt: f32,
        #[serde(default)]
        backend: BackendChoice,
        #[serde(default = "default_true")]
        drag: bool,
        #[serde(default)]
        config: FluidConfig,
        snapshot: Option<String>,
    },
    VortexRender {
        #[serde(default = "default_width")]
        width: u32,
        #[serde(default = "default_height")]
        height: u32,
        #[serde(default = "default_steps")]
        frames: u32,
        #[serde(default)]
        config: VortexConfig,
        #[serde(default)]
        seed: u64,
        snapshot: Option<String>,
    },
    BackdropRun {
        #[serde(default = "default_width")]
        width: u32,
        #[serde(default = "default_height")]
        height: u32,
        #[serde(default = "default_frames")]
        frames: u32,
        #[serde(default)]
        backend: BackendChoice,
        /// Frame at which the simulated pointer starts moving.
        #[serde(default = "default_activate_at")]
        activate_at: u32,
        config_path: Option<String>,
        settings_path: Option<String>,
    },
    ToggleFluid {
        settings_path: String,
    },
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
enum BackendChoice {
    #[default]
    Auto,
    Gpu,
    Cpu,
}

fn default_width() -> u32 {
    320
}

fn default_height() -> u32 {
    240
}

fn default_steps() -> u32 {
    60
}

fn default_frames() -> u32 {
    120
}

fn default_activate_at() -> u32 {
    10
}

fn default_dt() -> f32 {
    1.0 / 60.0
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct ProbeResponse {
    ok: bool,
    gpu: Option<GpuInfo>,
    gpu_error: Option<String>,
}

#[derive(Debug, Serialize)]
struct GpuInfo {
    adapter: String,
    backend: String,
    format_rgba: String,
    format_rg: String,
    format_r: String,
    half_float: bool,
    supports_linear_filtering: bool,
}

#[derive(Debug, Serialize)]
struct FluidStepResponse {
    ok: bool,
    backend: &'static str,
    sim_width: u32,
    sim_height: u32,
    dye_width: u32,
    dye_height: u32,
    shading: bool,
    steps: u32,
    elapsed_ms: f64,
    sps: f64,
    avg_speed: f32,
    max_speed: f32,
    avg_divergence: f32,
    max_divergence: f32,
    dye_footprint: f32,
    dye_total: f32,
}

#[derive(Debug, Serialize)]
struct VortexRenderResponse {
    ok: bool,
    width: u32,
    height: u32,
    frames: u32,
    particles: usize,
    elapsed_ms: f64,
    fps: f64,
    mean_luma: f32,
    lit_fraction: f32,
}

#[derive(Debug, Serialize)]
struct BackdropRunResponse {
    ok: bool,
    fluid_enabled: bool,
    activated: bool,
    frames: u32,
    fluid_frames: u32,
    vortex_frames: u32,
    vortex_tick: u64,
    elapsed_ms: f64,
}

#[derive(Debug, Serialize)]
struct ToggleResponse {
    ok: bool,
    fluid_enabled: bool,
    settings_path: String,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Err(err) = run() {
        let out = serde_json::json!({"ok": false, "error": format!("{err:#}")});
        println!(
            "{}",
            serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{\"ok\":false}".into())
        );
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let req: Request = if input.trim().is_empty() {
        Request::Probe
    } else {
        serde_json::from_str(&input).context("invalid JSON request")?
    };

    match req {
        Request::Probe => print(&run_probe())?,
        Request::FluidStep { width, height, steps, dt, backend, drag, config, snapshot } => {
            let params = FluidRun {
                width: width.max(16),
                height: height.max(16),
                steps: steps.max(1),
                dt: dt.clamp(1e-4, 1.0 / 15.0),
                drag,
                snapshot,
            };
            let resp = match pick_backend(backend)? {
                Picked::Gpu(b) => run_fluid_step(b, "wgpu", &config, &params)?,
                Picked::Cpu(b) => run_fluid_step(b, "cpu", &config, &params)?,
            };
            print(&resp)?;
        }
        Request::VortexRender { width, height, frames, config, seed, snapshot } => {
            print(&run_vortex(width.max(1), height.max(1), frames.max(1), &config, seed, snapshot)?)?;
        }
        Request::BackdropRun { width, height, frames, backend, activate_at, config_path, settings_path } => {
            let config = match config_path {
                Some(path) => BackdropConfig::from_path(path)?,
                None => BackdropConfig::default(),
            };
            let settings = match settings_path {
                Some(path) => EffectSettings::load(&path).with_context(|| format!("loading {path}"))?,
                None => EffectSettings::default(),
            };
            let run = BackdropScript { width: width.max(16), height: height.max(16), frames, activate_at };
            let resp = match backend {
                BackendChoice::Cpu => run_backdrop(&config, settings, || Ok(CpuBackend::new()), &run),
                BackendChoice::Gpu => run_backdrop(&config, settings, GpuBackend::new_headless, &run),
                BackendChoice::Auto if !settings.fluid_enabled => {
                    run_backdrop(&config, settings, || Ok(CpuBackend::new()), &run)
                }
                BackendChoice::Auto => match pick_backend(BackendChoice::Auto)? {
                    Picked::Gpu(b) => run_backdrop(&config, settings, move || Ok(b), &run),
                    Picked::Cpu(b) => run_backdrop(&config, settings, move || Ok(b), &run),
                },
            };
            print(&resp)?;
        }
        Request::ToggleFluid { settings_path } => {
            let mut settings = EffectSettings::load(&settings_path)
                .with_context(|| format!("loading {settings_path}"))?;
            settings.toggle();
            settings.save(&settings_path).with_context(|| format!("saving {settings_path}"))?;
            print(&ToggleResponse { ok: true, fluid_enabled: settings.fluid_enabled, settings_path })?;
        }
    }

    Ok(())
}

fn print<T: Serialize>(resp: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(resp)?);
    Ok(())
}

fn run_probe() -> ProbeResponse {
    match GpuBackend::new_headless() {
        Ok(b) => {
            let info = b.adapter_info();
            let caps: Capabilities = *b.capabilities();
            ProbeResponse {
                ok: true,
                gpu: Some(GpuInfo {
                    adapter: info.name,
                    backend: format!("{:?}", info.backend),
                    format_rgba: format!("{:?}", caps.format_rgba),
                    format_rg: format!("{:?}", caps.format_rg),
                    format_r: format!("{:?}", caps.format_r),
                    half_float: caps.half_float,
                    supports_linear_filtering: caps.supports_linear_filtering,
                }),
                gpu_error: None,
            }
        }
        Err(err) => ProbeResponse { ok: true, gpu: None, gpu_error: Some(err.to_string()) },
    }
}

enum Picked {
    Gpu(GpuBackend),
    Cpu(CpuBackend),
}

fn pick_backend(choice: BackendChoice) -> Result<Picked> {
    match choice {
        BackendChoice::Cpu => Ok(Picked::Cpu(CpuBackend::new())),
        BackendChoice::Gpu => Ok(Picked::Gpu(GpuBackend::new_headless().context("GPU backend")?)),
        BackendChoice::Auto => match GpuBackend::new_headless() {
            Ok(b) => Ok(Picked::Gpu(b)),
            Err(err) => {
                log::warn!("no GPU ({err}), using the CPU backend");
                Ok(Picked::Cpu(CpuBackend::new()))
            }
        },
    }
}

/// Display output as an image, whichever backend produced it.
trait Snapshot {
    fn snapshot(&mut self) -> Result<image::RgbaImage>;
}

impl Snapshot for CpuBackend {
    fn snapshot(&mut self) -> Result<image::RgbaImage> {
        Ok(self.output_image())
    }
}

impl Snapshot for GpuBackend {
    fn snapshot(&mut self) -> Result<image::RgbaImage> {
        self.read_output().context("reading display output")
    }
}

struct FluidRun {
    width: u32,
    height: u32,
    steps: u32,
    dt: f32,
    drag: bool,
    snapshot: Option<String>,
}

/// Client-space position of the scripted pointer on `frame`: a circle
/// around the canvas center.
fn orbit(width: u32, height: u32, frame: u32) -> (f32, f32) {
    let t = frame as f32 * 0.12;
    let r = 0.3 * width.min(height) as f32;
    (0.5 * width as f32 + r * t.cos(), 0.5 * height as f32 + r * t.sin())
}

fn run_fluid_step<B: FluidBackend + Snapshot>(
    backend: B,
    name: &'static str,
    config: &FluidConfig,
    run: &FluidRun,
) -> Result<FluidStepResponse> {
    let t0 = Instant::now();
    let mut engine = FluidEngine::new(backend, config, run.width, run.height, 7).context("fluid engine init")?;
    let mut router = PointerRouter::new(run.width, run.height, 1.0, 11);

    for step in 0..run.steps {
        if run.drag {
            let (x, y) = orbit(run.width, run.height, step);
            router.handle(&InputEvent::MouseMove { x, y });
        }
        engine.update_colors(run.dt, router.pointers_mut());
        let clicks = router.take_clicks();
        engine.step(run.dt, router.pointers_mut(), &clicks);
    }

    let velocity = engine.read_velocity()?.context("velocity field missing")?;
    let dye = engine.read_dye()?.context("dye field missing")?;
    let elapsed = t0.elapsed().as_secs_f64();

    if let Some(path) = &run.snapshot {
        engine.backend_mut().snapshot()?.save(path).with_context(|| format!("writing {path}"))?;
    }

    let cells = (velocity.width * velocity.height) as f32;
    let (sum_speed, max_speed) = speed_stats(&velocity);
    let (sum_div, max_div) = divergence_stats(&velocity);

    let mut dye_total = 0.0f32;
    let mut nonzero = 0usize;
    for t in &dye.texels {
        dye_total += t[0] + t[1] + t[2];
        if t[0].max(t[1]).max(t[2]) > 0.01 {
            nonzero += 1;
        }
    }

    Ok(FluidStepResponse {
        ok: true,
        backend: name,
        sim_width: velocity.width,
        sim_height: velocity.height,
        dye_width: dye.width,
        dye_height: dye.height,
        shading: engine.config().shading,
        steps: run.steps,
        elapsed_ms: elapsed * 1000.0,
        sps: (run.steps as f64) / elapsed.max(1e-6),
        avg_speed: sum_speed / cells,
        max_speed,
        avg_divergence: sum_div / cells,
        max_divergence: max_div,
        dye_footprint: nonzero as f32 / dye.texels.len() as f32,
        dye_total,
    })
}

fn speed_stats(velocity: &FieldData) -> (f32, f32) {
    let mut sum = 0.0f32;
    let mut max = 0.0f32;
    for v in &velocity.texels {
        let s = (v[0] * v[0] + v[1] * v[1]).sqrt();
        sum += s;
        max = max.max(s);
    }
    (sum, max)
}

/// Central-difference divergence with clamped neighbors, summed as |div|.
fn divergence_stats(velocity: &FieldData) -> (f32, f32) {
    let (w, h) = (velocity.width, velocity.height);
    let mut sum = 0.0f32;
    let mut max = 0.0f32;
    for y in 0..h {
        let ym = y.saturating_sub(1);
        let yp = (y + 1).min(h - 1);
        for x in 0..w {
            let xm = x.saturating_sub(1);
            let xp = (x + 1).min(w - 1);
            let dx = velocity.at(xp, y)[0] - velocity.at(xm, y)[0];
            let dy = velocity.at(x, yp)[1] - velocity.at(x, ym)[1];
            let d = 0.5 * (dx + dy);
            sum += d.abs();
            max = max.max(d.abs());
        }
    }
    (sum, max)
}

fn run_vortex(
    width: u32,
    height: u32,
    frames: u32,
    config: &VortexConfig,
    seed: u64,
    snapshot: Option<String>,
) -> Result<VortexRenderResponse> {
    let t0 = Instant::now();
    let mut vortex = VortexEngine::initialize(config, width, height, seed);
    for _ in 0..frames {
        vortex.step();
    }
    let elapsed = t0.elapsed().as_secs_f64();

    let Some(surface) = vortex.surface() else {
        bail!("vortex surface missing");
    };
    let mut luma = 0.0f32;
    let mut lit = 0usize;
    for p in surface.pixels() {
        let l = (0.2126 * p[0] as f32 + 0.7152 * p[1] as f32 + 0.0722 * p[2] as f32) / 255.0;
        luma += l;
        if l > 0.05 {
            lit += 1;
        }
    }
    let pixels = (width * height) as f32;

    if let Some(path) = &snapshot {
        surface.save(path).with_context(|| format!("writing {path}"))?;
    }

    Ok(VortexRenderResponse {
        ok: true,
        width,
        height,
        frames,
        particles: vortex.particle_count(),
        elapsed_ms: elapsed * 1000.0,
        fps: frames as f64 / elapsed.max(1e-6),
        mean_luma: luma / pixels,
        lit_fraction: lit as f32 / pixels,
    })
}

struct BackdropScript {
    width: u32,
    height: u32,
    frames: u32,
    activate_at: u32,
}

fn run_backdrop<B: FluidBackend>(
    config: &BackdropConfig,
    settings: EffectSettings,
    backend: impl FnOnce() -> Result<B, backdrop_fx::EngineError>,
    run: &BackdropScript,
) -> BackdropRunResponse {
    let t0 = Instant::now();
    let (w, h) = (run.width as f32, run.height as f32);
    let mut backdrop = Backdrop::new(config, settings, backend, w, h, 1.0);
    let fluid_enabled = backdrop.fluid().is_some();

    let frame_time = Duration::from_micros(16_667);
    let mut now = Instant::now();
    let mut fluid_frames = 0;
    let mut vortex_frames = 0;
    for frame in 0..run.frames {
        if frame >= run.activate_at {
            let (x, y) = orbit(run.width, run.height, frame);
            backdrop.handle_event(&InputEvent::MouseMove { x, y }, now);
        }
        let report = backdrop.frame(now);
        fluid_frames += report.fluid_stepped as u32;
        vortex_frames += report.vortex_stepped as u32;
        now += frame_time;
    }

    let resp = BackdropRunResponse {
        ok: true,
        fluid_enabled,
        activated: backdrop.activation() == Activation::Active,
        frames: run.frames,
        fluid_frames,
        vortex_frames,
        vortex_tick: backdrop.vortex().tick(),
        elapsed_ms: t0.elapsed().as_secs_f64() * 1000.0,
    };
    backdrop.dispose();
    resp
}
