use backdrop_fx::config::{FluidConfig, VortexConfig};
use backdrop_fx::fluid::FluidEngine;
use backdrop_fx::fluid::cpu::CpuBackend;
use backdrop_fx::input::ClickSplat;
use backdrop_fx::vortex::VortexEngine;
use criterion::{Criterion, criterion_group, criterion_main};

fn bench_fluid(c: &mut Criterion) {
    let config = FluidConfig { sim_resolution: 64, dye_resolution: 256, ..Default::default() };
    let mut fluid = FluidEngine::new(CpuBackend::new(), &config, 640, 480, 1).unwrap();
    let clicks = [ClickSplat { texcoord: [0.5, 0.5] }];
    fluid.step(1.0 / 60.0, &mut [], &clicks);

    c.bench_function("fluid_cpu_step_64", |b| b.iter(|| fluid.step(1.0 / 60.0, &mut [], &[])));
}

fn bench_vortex(c: &mut Criterion) {
    let config = VortexConfig { particle_count: 700, ..Default::default() };
    let mut vortex = VortexEngine::initialize(&config, 640, 480, 1);

    c.bench_function("vortex_step_700", |b| b.iter(|| vortex.step()));
}

criterion_group!(benches, bench_fluid, bench_vortex);
criterion_main!(benches);
