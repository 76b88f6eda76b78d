//! Reference implementation of the solver passes on CPU grids.
//!
//! Sampling follows GPU texture rules: texel centers at `(i + 0.5) / n`,
//! clamp-to-edge addressing, bilinear filtering between centers. Each pass
//! mirrors its WGSL counterpart in `gpu/shaders` line for line, so this
//! backend doubles as the parity oracle for the GPU path.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::color::Rgb;
use crate::error::EngineError;
use crate::fluid::backend::{DisplayParams, FluidBackend, SplatParams};
use crate::fluid::capabilities::Capabilities;
use crate::fluid::field::{FieldData, FieldKind, FieldTarget};

/// Counts live fields so callers can check that replaced ones were freed.
#[derive(Debug)]
struct LiveToken(Arc<AtomicUsize>);

impl LiveToken {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(counter))
    }
}

impl Drop for LiveToken {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub struct CpuField {
    width: u32,
    height: u32,
    channels: u32,
    data: Vec<[f32; 4]>,
    _live: LiveToken,
}

impl FieldTarget for CpuField {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

impl CpuField {
    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn texels(&self) -> &[[f32; 4]] {
        &self.data
    }

    /// Overwrites every texel with `f(x, y)`.
    pub fn fill_with(&mut self, f: impl Fn(u32, u32) -> [f32; 4]) {
        for y in 0..self.height {
            for x in 0..self.width {
                let v = f(x, y);
                self.data[(y * self.width + x) as usize] = mask(v, self.channels);
            }
        }
    }

    fn fetch(&self, x: i64, y: i64) -> [f32; 4] {
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        self.data[(y * self.width + x) as usize]
    }

    fn sample_nearest(&self, uv: [f32; 2]) -> [f32; 4] {
        let x = (uv[0] * self.width as f32).floor() as i64;
        let y = (uv[1] * self.height as f32).floor() as i64;
        self.fetch(x, y)
    }

    /// Bilinear between texel centers, clamped at the edges.
    fn sample_linear(&self, uv: [f32; 2]) -> [f32; 4] {
        let sx = uv[0] * self.width as f32 - 0.5;
        let sy = uv[1] * self.height as f32 - 0.5;
        let (x0, y0) = (sx.floor(), sy.floor());
        let (fx, fy) = (sx - x0, sy - y0);
        let (x0, y0) = (x0 as i64, y0 as i64);
        let a = self.fetch(x0, y0);
        let b = self.fetch(x0 + 1, y0);
        let c = self.fetch(x0, y0 + 1);
        let d = self.fetch(x0 + 1, y0 + 1);
        let mut out = [0.0; 4];
        for i in 0..4 {
            let top = a[i] + (b[i] - a[i]) * fx;
            let bottom = c[i] + (d[i] - c[i]) * fx;
            out[i] = top + (bottom - top) * fy;
        }
        out
    }
}

/// Drops the channels a narrower texture format would not store.
fn mask(v: [f32; 4], channels: u32) -> [f32; 4] {
    match channels {
        1 => [v[0], 0.0, 0.0, 1.0],
        2 => [v[0], v[1], 0.0, 1.0],
        _ => v,
    }
}

/// Texture-coordinate view of one output texel and its four neighbors.
#[derive(Debug, Clone, Copy)]
struct Stencil {
    uv: [f32; 2],
    l: [f32; 2],
    r: [f32; 2],
    t: [f32; 2],
    b: [f32; 2],
}

impl Stencil {
    fn new(x: u32, y: u32, width: u32, height: u32, texel: [f32; 2]) -> Self {
        let uv = [(x as f32 + 0.5) / width as f32, (y as f32 + 0.5) / height as f32];
        Self {
            uv,
            l: [uv[0] - texel[0], uv[1]],
            r: [uv[0] + texel[0], uv[1]],
            t: [uv[0], uv[1] + texel[1]],
            b: [uv[0], uv[1] - texel[1]],
        }
    }
}

#[derive(Debug)]
pub struct CpuBackend {
    caps: Capabilities,
    output: Vec<[f32; 4]>,
    output_size: (u32, u32),
    live: Arc<AtomicUsize>,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::full_float(true))
    }

    /// Pretends to run on a device with the given capabilities.
    pub fn with_capabilities(caps: Capabilities) -> Self {
        Self {
            caps,
            output: Vec::new(),
            output_size: (0, 0),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of fields currently allocated by this backend.
    pub fn live_fields(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    /// Premultiplied RGBA of the last display pass.
    pub fn output(&self) -> &[[f32; 4]] {
        &self.output
    }

    pub fn output_size(&self) -> (u32, u32) {
        self.output_size
    }

    pub fn output_image(&self) -> image::RgbaImage {
        let (w, h) = self.output_size;
        image::RgbaImage::from_fn(w, h, |x, y| {
            let px = self.output[(y * w + x) as usize];
            image::Rgba(px.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
        })
    }

    fn linear(&self) -> bool {
        self.caps.supports_linear_filtering
    }

    fn sample(&self, field: &CpuField, uv: [f32; 2]) -> [f32; 4] {
        if self.linear() { field.sample_linear(uv) } else { field.sample_nearest(uv) }
    }

    /// Bilinear built from four nearest fetches, for devices without
    /// hardware filtering.
    fn bilerp(&self, field: &CpuField, uv: [f32; 2]) -> [f32; 4] {
        let tsize = field.texel_size();
        let st = [uv[0] / tsize[0] - 0.5, uv[1] / tsize[1] - 0.5];
        let iuv = [st[0].floor(), st[1].floor()];
        let fuv = [st[0] - iuv[0], st[1] - iuv[1]];
        let at = |ox: f32, oy: f32| {
            field.sample_nearest([(iuv[0] + ox) * tsize[0], (iuv[1] + oy) * tsize[1]])
        };
        let (a, b, c, d) = (at(0.5, 0.5), at(1.5, 0.5), at(0.5, 1.5), at(1.5, 1.5));
        let mut out = [0.0; 4];
        for i in 0..4 {
            let top = a[i] + (b[i] - a[i]) * fuv[0];
            let bottom = c[i] + (d[i] - c[i]) * fuv[0];
            out[i] = top + (bottom - top) * fuv[1];
        }
        out
    }

    fn run(&self, out: &mut CpuField, texel: [f32; 2], kernel: impl Fn(Stencil) -> [f32; 4]) {
        let (w, h) = (out.width, out.height);
        let channels = out.channels;
        for y in 0..h {
            for x in 0..w {
                let v = kernel(Stencil::new(x, y, w, h, texel));
                out.data[(y * w + x) as usize] = mask(v, channels);
            }
        }
    }
}

impl FluidBackend for CpuBackend {
    type Field = CpuField;

    fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    fn create_field(&mut self, kind: FieldKind, width: u32, height: u32) -> Result<CpuField, EngineError> {
        if width == 0 || height == 0 {
            return Err(EngineError::EmptySurface { width, height });
        }
        let channels = kind.channels();
        Ok(CpuField {
            width,
            height,
            channels,
            data: vec![mask([0.0; 4], channels); (width * height) as usize],
            _live: LiveToken::new(&self.live),
        })
    }

    fn resize_output(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        if width == 0 || height == 0 {
            return Err(EngineError::EmptySurface { width, height });
        }
        self.output_size = (width, height);
        self.output = vec![[0.0; 4]; (width * height) as usize];
        Ok(())
    }

    fn curl(&mut self, velocity: &CpuField, out: &mut CpuField) {
        self.run(out, velocity.texel_size(), |s| {
            let c = self.sample(velocity, s.uv);
            let mut l = self.sample(velocity, s.l)[1];
            let mut r = self.sample(velocity, s.r)[1];
            let mut t = self.sample(velocity, s.t)[0];
            let mut b = self.sample(velocity, s.b)[0];
            if s.l[0] < 0.0 {
                l = -c[1];
            }
            if s.r[0] > 1.0 {
                r = -c[1];
            }
            if s.t[1] > 1.0 {
                t = -c[0];
            }
            if s.b[1] < 0.0 {
                b = -c[0];
            }
            let vorticity = r - l - t + b;
            [0.5 * vorticity, 0.0, 0.0, 1.0]
        });
    }

    fn vorticity(
        &mut self,
        velocity: &CpuField,
        curl: &CpuField,
        out: &mut CpuField,
        curl_strength: f32,
        dt: f32,
    ) {
        self.run(out, velocity.texel_size(), |s| {
            let l = self.sample(curl, s.l)[0];
            let r = self.sample(curl, s.r)[0];
            let t = self.sample(curl, s.t)[0];
            let b = self.sample(curl, s.b)[0];
            let c = self.sample(curl, s.uv)[0];

            let mut force = [0.5 * (t.abs() - b.abs()), 0.5 * (r.abs() - l.abs())];
            let len = (force[0] * force[0] + force[1] * force[1]).sqrt() + 0.0001;
            force = [force[0] / len * curl_strength * c, force[1] / len * curl_strength * c];
            force[1] = -force[1];

            let v = self.sample(velocity, s.uv);
            let vx = (v[0] + force[0] * dt).clamp(-1000.0, 1000.0);
            let vy = (v[1] + force[1] * dt).clamp(-1000.0, 1000.0);
            [vx, vy, 0.0, 1.0]
        });
    }

    fn divergence(&mut self, velocity: &CpuField, out: &mut CpuField) {
        self.run(out, velocity.texel_size(), |s| {
            let c = self.sample(velocity, s.uv);
            let mut l = self.sample(velocity, s.l)[0];
            let mut r = self.sample(velocity, s.r)[0];
            let mut t = self.sample(velocity, s.t)[1];
            let mut b = self.sample(velocity, s.b)[1];
            if s.l[0] < 0.0 {
                l = -c[0];
            }
            if s.r[0] > 1.0 {
                r = -c[0];
            }
            if s.t[1] > 1.0 {
                t = -c[1];
            }
            if s.b[1] < 0.0 {
                b = -c[1];
            }
            [0.5 * (r - l + t - b), 0.0, 0.0, 1.0]
        });
    }

    fn scale(&mut self, source: &CpuField, out: &mut CpuField, value: f32) {
        self.run(out, source.texel_size(), |s| self.sample(source, s.uv).map(|c| c * value));
    }

    fn jacobi(&mut self, pressure: &CpuField, divergence: &CpuField, out: &mut CpuField) {
        self.run(out, pressure.texel_size(), |s| {
            let l = self.sample(pressure, s.l)[0];
            let r = self.sample(pressure, s.r)[0];
            let t = self.sample(pressure, s.t)[0];
            let b = self.sample(pressure, s.b)[0];
            let div = self.sample(divergence, s.uv)[0];
            [(l + r + b + t - div) * 0.25, 0.0, 0.0, 1.0]
        });
    }

    fn subtract_gradient(&mut self, pressure: &CpuField, velocity: &CpuField, out: &mut CpuField) {
        self.run(out, velocity.texel_size(), |s| {
            let l = self.sample(pressure, s.l)[0];
            let r = self.sample(pressure, s.r)[0];
            let t = self.sample(pressure, s.t)[0];
            let b = self.sample(pressure, s.b)[0];
            let v = self.sample(velocity, s.uv);
            [v[0] - (r - l), v[1] - (t - b), 0.0, 1.0]
        });
    }

    fn advect(&mut self, velocity: &CpuField, source: &CpuField, out: &mut CpuField, dt: f32, dissipation: f32) {
        let texel = velocity.texel_size();
        let decay = 1.0 + dissipation * dt;
        let manual = !self.linear();
        self.run(out, texel, |s| {
            let result = if manual {
                let v = self.bilerp(velocity, s.uv);
                let coord = [s.uv[0] - dt * v[0] * texel[0], s.uv[1] - dt * v[1] * texel[1]];
                self.bilerp(source, coord)
            } else {
                let v = self.sample(velocity, s.uv);
                let coord = [s.uv[0] - dt * v[0] * texel[0], s.uv[1] - dt * v[1] * texel[1]];
                self.sample(source, coord)
            };
            result.map(|c| c / decay)
        });
    }

    fn splat(&mut self, target: &CpuField, out: &mut CpuField, splat: &SplatParams) {
        self.run(out, target.texel_size(), |s| {
            let px = (s.uv[0] - splat.point[0]) * splat.aspect_ratio;
            let py = s.uv[1] - splat.point[1];
            let falloff = (-(px * px + py * py) / splat.radius).exp();
            let base = self.sample(target, s.uv);
            [
                base[0] + falloff * splat.value[0],
                base[1] + falloff * splat.value[1],
                base[2] + falloff * splat.value[2],
                1.0,
            ]
        });
    }

    fn display(&mut self, dye: &CpuField, params: &DisplayParams) {
        let (w, h) = self.output_size;
        if w == 0 || h == 0 {
            return;
        }
        let texel = [1.0 / w as f32, 1.0 / h as f32];
        let clear = match params.background {
            Some(Rgb { r, g, b }) => [r, g, b, 1.0],
            None => [0.0; 4],
        };
        let mut output = std::mem::take(&mut self.output);
        for y in 0..h {
            for x in 0..w {
                let s = Stencil::new(x, y, w, h, texel);
                let rgb = |uv| {
                    let c = self.sample(dye, uv);
                    [c[0], c[1], c[2]]
                };
                let neighbors = params.shading.then(|| [rgb(s.l), rgb(s.r), rgb(s.t), rgb(s.b)]);
                let src = shade_texel(rgb(s.uv), neighbors, texel);
                let dst = clear;
                // premultiplied source-over into a unorm target
                let out = [0, 1, 2, 3].map(|i| (src[i] + dst[i] * (1.0 - src[3])).clamp(0.0, 1.0));
                output[(y * w + x) as usize] = out;
            }
        }
        self.output = output;
    }

    fn read_field(&mut self, field: &CpuField) -> Result<FieldData, EngineError> {
        Ok(FieldData { width: field.width, height: field.height, texels: field.data.clone() })
    }
}

/// Display shading for one texel: optional relief lighting from the color
/// gradient (`neighbors` = left, right, top, bottom), then alpha = max
/// channel so empty regions come out fully transparent.
pub fn shade_texel(c: [f32; 3], neighbors: Option<[[f32; 3]; 4]>, texel: [f32; 2]) -> [f32; 4] {
    let mut c = c;
    if let Some([lc, rc, tc, bc]) = neighbors {
        let len = |v: [f32; 3]| (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        let dx = len(rc) - len(lc);
        let dy = len(tc) - len(bc);
        let nz = (texel[0] * texel[0] + texel[1] * texel[1]).sqrt();
        let n_len = (dx * dx + dy * dy + nz * nz).sqrt();
        // light straight down the z axis: dot(n, l) = n.z
        let n_dot_l = if n_len > 0.0 { nz / n_len } else { 1.0 };
        let diffuse = (n_dot_l + 0.7).clamp(0.7, 1.0);
        c = c.map(|v| v * diffuse);
    }
    let a = c[0].max(c[1].max(c[2]));
    [c[0], c[1], c[2], a]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(backend: &mut CpuBackend, kind: FieldKind, w: u32, h: u32) -> CpuField {
        backend.create_field(kind, w, h).unwrap()
    }

    #[test]
    fn linear_sampling_hits_texel_centers() {
        let mut b = CpuBackend::new();
        let mut f = field(&mut b, FieldKind::Dye, 4, 1);
        f.fill_with(|x, _| [x as f32, 0.0, 0.0, 0.0]);
        assert_eq!(f.sample_linear([0.125, 0.5])[0], 0.0);
        assert_eq!(f.sample_linear([0.375, 0.5])[0], 1.0);
        assert!((f.sample_linear([0.25, 0.5])[0] - 0.5).abs() < 1e-6);
        // clamp-to-edge past the border
        assert_eq!(f.sample_linear([-0.5, 0.5])[0], 0.0);
        assert_eq!(f.sample_linear([1.5, 0.5])[0], 3.0);
    }

    #[test]
    fn manual_bilerp_matches_hardware_filtering() {
        let mut b = CpuBackend::new();
        let mut f = field(&mut b, FieldKind::Dye, 5, 3);
        f.fill_with(|x, y| [x as f32 * 1.5 - y as f32, y as f32, 0.0, 1.0]);
        for uv in [[0.1, 0.2], [0.5, 0.5], [0.73, 0.91], [0.33, 0.05]] {
            let hw = f.sample_linear(uv);
            let sw = b.bilerp(&f, uv);
            assert!((hw[0] - sw[0]).abs() < 1e-5, "{uv:?}: {hw:?} vs {sw:?}");
            assert!((hw[1] - sw[1]).abs() < 1e-5);
        }
    }

    #[test]
    fn jacobi_is_stable_at_convergence() {
        let mut b = CpuBackend::new();
        let velocity = field(&mut b, FieldKind::Velocity, 8, 8);
        let mut divergence = field(&mut b, FieldKind::Divergence, 8, 8);
        b.divergence(&velocity, &mut divergence);
        assert_eq!(divergence.texels().iter().map(|t| t[0].abs()).sum::<f32>(), 0.0);

        let mut p = field(&mut b, FieldKind::Pressure, 8, 8);
        let mut q = field(&mut b, FieldKind::Pressure, 8, 8);
        p.fill_with(|x, y| [((x * 7 + y * 3) % 5) as f32 * 0.2, 0.0, 0.0, 1.0]);
        for _ in 0..1000 {
            b.jacobi(&p, &divergence, &mut q);
            std::mem::swap(&mut p, &mut q);
        }
        b.jacobi(&p, &divergence, &mut q);
        let change = p
            .texels()
            .iter()
            .zip(q.texels())
            .map(|(a, b)| (a[0] - b[0]).abs())
            .fold(0.0, f32::max);
        assert!(change < 1e-5, "extra iteration moved pressure by {change}");
    }

    #[test]
    fn divergence_of_uniform_flow_is_zero_inside() {
        let mut b = CpuBackend::new();
        let mut v = field(&mut b, FieldKind::Velocity, 6, 6);
        v.fill_with(|_, _| [1.0, 0.0, 0.0, 1.0]);
        let mut d = field(&mut b, FieldKind::Divergence, 6, 6);
        b.divergence(&v, &mut d);
        let at = |x: usize, y: usize| d.texels()[y * 6 + x][0];
        assert_eq!(at(2, 3), 0.0);
        // walls reflect the normal component
        assert!(at(0, 3) > 0.0);
        assert!(at(5, 3) < 0.0);
    }

    #[test]
    fn curl_flips_the_wall_neighbor() {
        let mut b = CpuBackend::new();
        let mut v = field(&mut b, FieldKind::Velocity, 8, 8);
        v.fill_with(|_, _| [0.0, 1.0, 0.0, 1.0]);
        let mut curl = field(&mut b, FieldKind::Curl, 8, 8);
        b.curl(&v, &mut curl);
        let at = |x: usize, y: usize| curl.texels()[y * 8 + x][0];
        assert_eq!(at(3, 4), 0.0);
        // the missing neighbor mirrors the center: 0.5 * (1 - (-1))
        assert_eq!(at(0, 4), 1.0);
        assert_eq!(at(7, 4), -1.0);
    }

    #[test]
    fn vorticity_saturates_velocity() {
        let mut b = CpuBackend::new();
        let velocity = field(&mut b, FieldKind::Velocity, 8, 8);
        let mut out = field(&mut b, FieldKind::Velocity, 8, 8);
        for (sign, expected) in [(1.0, -1000.0), (-1.0, 1000.0)] {
            let mut curl = field(&mut b, FieldKind::Curl, 8, 8);
            curl.fill_with(|x, _| [sign * (x as f32 + 1.0) * 1e6, 0.0, 0.0, 1.0]);
            b.vorticity(&velocity, &curl, &mut out, 1.0, 0.1);

            let v = out.texels()[4 * 8 + 4];
            assert_eq!(v[0], 0.0);
            assert_eq!(v[1], expected);
            assert!(out.texels().iter().all(|t| t[0].abs() <= 1000.0 && t[1].abs() <= 1000.0));
        }
    }

    #[test]
    fn advection_decays_by_dissipation() {
        for linear in [true, false] {
            let mut b = CpuBackend::with_capabilities(Capabilities::full_float(linear));
            let velocity = field(&mut b, FieldKind::Velocity, 6, 6);
            let mut dye = field(&mut b, FieldKind::Dye, 6, 6);
            dye.fill_with(|_, _| [0.8, 0.4, 0.2, 1.0]);
            let mut out = field(&mut b, FieldKind::Dye, 6, 6);
            b.advect(&velocity, &dye, &mut out, 0.5, 2.0);

            // 1 + 2.0 * 0.5
            for t in out.texels() {
                for (got, want) in t.iter().zip([0.4f32, 0.2, 0.1, 0.5]) {
                    assert!((*got - want).abs() < 1e-6, "linear {linear}: {t:?}");
                }
            }
        }
    }

    #[test]
    fn zero_dye_is_fully_transparent() {
        assert_eq!(shade_texel([0.0; 3], None, [0.01, 0.01])[3], 0.0);
        assert_eq!(shade_texel([0.0; 3], Some([[0.0; 3]; 4]), [0.01, 0.01])[3], 0.0);
        let lit = shade_texel([0.2, 0.5, 0.1], None, [0.01, 0.01]);
        assert_eq!(lit[3], 0.5);
    }

    #[test]
    fn shading_darkens_steep_gradients_only() {
        let flat = shade_texel([0.5; 3], Some([[0.5; 3]; 4]), [0.01, 0.01]);
        assert_eq!(flat[0], 0.5);
        let steep = shade_texel([0.5; 3], Some([[0.0; 3], [1.0; 3], [0.5; 3], [0.5; 3]]), [0.01, 0.01]);
        assert!(steep[0] < 0.5 && steep[0] >= 0.35 - 1e-6);
    }

    #[test]
    fn live_counter_tracks_drops() {
        let mut b = CpuBackend::new();
        let a = field(&mut b, FieldKind::Curl, 4, 4);
        let c = field(&mut b, FieldKind::Curl, 4, 4);
        assert_eq!(b.live_fields(), 2);
        drop(a);
        assert_eq!(b.live_fields(), 1);
        drop(c);
        assert_eq!(b.live_fields(), 0);
    }
}
