//! Solver scenarios on the CPU backend. The math is the same as the WGSL
//! passes, so these run everywhere without an adapter.

use backdrop_fx::config::{FALLBACK_DYE_RESOLUTION, FluidConfig};
use backdrop_fx::color::Rgb;
use backdrop_fx::fluid::cpu::CpuBackend;
use backdrop_fx::fluid::{Capabilities, FluidEngine};
use backdrop_fx::input::{ClickSplat, InputEvent, PointerRouter};

const DT: f32 = 1.0 / 60.0;

fn small_config() -> FluidConfig {
    FluidConfig { sim_resolution: 32, dye_resolution: 32, pressure_iterations: 10, ..Default::default() }
}

fn engine(config: &FluidConfig, width: u32, height: u32) -> FluidEngine<CpuBackend> {
    FluidEngine::new(CpuBackend::new(), config, width, height, 1).unwrap()
}

#[test]
fn click_splat_stays_local() {
    let mut fluid = engine(&small_config(), 64, 64);
    fluid.step(DT, &mut [], &[ClickSplat { texcoord: [0.5, 0.5] }]);

    let velocity = fluid.read_velocity().unwrap().unwrap();
    let dye = fluid.read_dye().unwrap().unwrap();
    assert_eq!((velocity.width, velocity.height), (32, 32));

    let near = velocity.at(15, 15);
    assert!(near[0].abs() + near[1].abs() > 1e-3, "no force near the click: {near:?}");
    let near_dye = dye.at(16, 16);
    assert!(near_dye[0].max(near_dye[1]).max(near_dye[2]) > 1.0, "{near_dye:?}");

    for (x, y) in [(0, 0), (31, 31), (2, 29), (29, 3)] {
        let v = velocity.at(x, y);
        assert!(v[0].abs() < 1e-6 && v[1].abs() < 1e-6, "({x}, {y}) moved: {v:?}");
        let d = dye.at(x, y);
        assert!(d[0].abs() < 1e-6 && d[1].abs() < 1e-6 && d[2].abs() < 1e-6);
    }
}

#[test]
fn moved_pointer_splats_once() {
    let mut fluid = engine(&small_config(), 64, 64);
    let mut router = PointerRouter::new(64, 64, 1.0, 4);
    router.handle(&InputEvent::MouseMove { x: 20.0, y: 32.0 });
    router.handle(&InputEvent::MouseMove { x: 28.0, y: 32.0 });
    assert!(router.mouse().moved);

    fluid.step(DT, router.pointers_mut(), &[]);
    assert!(!router.mouse().moved);
    let velocity = fluid.read_velocity().unwrap().unwrap();
    // dragged to the right
    assert!(velocity.at(14, 16)[0] > 1.0);
}

#[test]
fn same_aspect_resize_reuses_fields() {
    let mut fluid = engine(&small_config(), 800, 600);
    assert_eq!(fluid.sim_resolution(), Some((43, 32)));
    let live = fluid.backend().live_fields();
    assert_eq!(live, 8);

    fluid.resize(1600, 1200);
    assert_eq!(fluid.canvas(), (1600, 1200));
    assert_eq!(fluid.sim_resolution(), Some((43, 32)));
    assert_eq!(fluid.backend().live_fields(), live);
}

#[test]
fn resize_releases_replaced_fields() {
    let mut fluid = engine(&small_config(), 800, 600);
    fluid.resize(600, 800);
    assert_eq!(fluid.sim_resolution(), Some((32, 43)));
    assert_eq!(fluid.dye_resolution(), Some((32, 43)));
    // every field was replaced and the old ones dropped
    assert_eq!(fluid.backend().live_fields(), 8);

    fluid.step(DT, &mut [], &[ClickSplat { texcoord: [0.2, 0.7] }]);
    let dye = fluid.read_dye().unwrap().unwrap();
    assert!(dye.max_abs(0) + dye.max_abs(1) + dye.max_abs(2) > 0.0);
}

#[test]
fn no_linear_filtering_downgrades_dye_and_shading() {
    let backend = CpuBackend::with_capabilities(Capabilities::full_float(false));
    let config = FluidConfig { sim_resolution: 16, pressure_iterations: 4, ..Default::default() };
    let mut fluid = FluidEngine::new(backend, &config, 64, 64, 2).unwrap();

    assert_eq!(fluid.config().dye_resolution, FALLBACK_DYE_RESOLUTION);
    assert!(!fluid.config().shading);
    assert_eq!(fluid.dye_resolution(), Some((256, 256)));

    fluid.step(DT, &mut [], &[ClickSplat { texcoord: [0.5, 0.5] }]);
    fluid.step(DT, &mut [], &[]);
    let dye = fluid.read_dye().unwrap().unwrap();
    assert!(dye.texels.iter().all(|t| t.iter().all(|c| c.is_finite())));
    assert!(dye.max_abs(0) + dye.max_abs(1) + dye.max_abs(2) > 0.0);
}

#[test]
fn empty_dye_displays_fully_transparent() {
    let mut fluid = engine(&small_config(), 40, 30);
    fluid.step(DT, &mut [], &[]);
    let output = fluid.backend().output();
    assert_eq!(output.len(), 40 * 30);
    assert!(output.iter().all(|px| px[3] == 0.0));
}

#[test]
fn opaque_mode_clears_to_back_color() {
    let config = FluidConfig { transparent: false, back_color: Rgb::new(0.5, 0.0, 0.0), ..small_config() };
    let mut fluid = engine(&config, 16, 16);
    fluid.step(DT, &mut [], &[]);
    let output = fluid.backend().output();
    assert!(output.iter().all(|px| *px == [0.5, 0.0, 0.0, 1.0]));
}

#[test]
fn color_cadence_wraps_and_recolors() {
    let mut fluid = engine(&small_config(), 32, 32);
    let mut router = PointerRouter::new(32, 32, 1.0, 8);
    router.handle(&InputEvent::MouseMove { x: 1.0, y: 1.0 });
    let before = router.mouse().color;

    fluid.update_colors(0.05, router.pointers_mut());
    assert!((fluid.color_timer() - 0.5).abs() < 1e-5);
    assert_eq!(router.mouse().color, before);

    fluid.update_colors(0.06, router.pointers_mut());
    assert!((fluid.color_timer() - 0.1).abs() < 1e-4);
    assert_ne!(router.mouse().color, before);
}

#[test]
fn splat_drives_pressure_solve() {
    let config = FluidConfig { pressure_iterations: 40, curl: 0.0, ..small_config() };
    let mut fluid = engine(&config, 64, 64);
    fluid.step(DT, &mut [], &[ClickSplat { texcoord: [0.5, 0.5] }]);
    let after_splat = fluid.read_velocity().unwrap().unwrap();
    fluid.step(DT, &mut [], &[]);

    // divergence of the splatted field, measured at the start of the second step
    let div = fluid.read_divergence().unwrap().unwrap();
    let pressure = fluid.read_pressure().unwrap().unwrap();
    assert!(div.max_abs(0) > 0.0);
    assert!(pressure.max_abs(0) > 0.0);
    assert!(after_splat.max_abs(0) + after_splat.max_abs(1) > 0.0);
}
