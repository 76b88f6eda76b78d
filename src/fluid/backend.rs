use crate::color::Rgb;
use crate::error::EngineError;
use crate::fluid::capabilities::Capabilities;
use crate::fluid::field::{FieldData, FieldKind, FieldTarget};

/// One Gaussian injection into a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplatParams {
    /// Center in texture coordinates.
    pub point: [f32; 2],
    /// Added at the center; velocity splats use `[dx, dy, 0]`.
    pub value: [f32; 3],
    /// Gaussian variance in aspect-corrected texcoord units.
    pub radius: f32,
    /// Canvas width / height.
    pub aspect_ratio: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayParams {
    pub shading: bool,
    /// Opaque clear color under the fluid; `None` clears to transparent.
    pub background: Option<Rgb>,
}

/// The full-screen passes the solver is made of. Every pass samples its
/// inputs and renders into `out`, which must not alias an input.
///
/// Implementations: [`crate::fluid::gpu::GpuBackend`] (wgpu) and
/// [`crate::fluid::cpu::CpuBackend`] (reference math on CPU grids).
pub trait FluidBackend {
    type Field: FieldTarget;

    fn capabilities(&self) -> &Capabilities;

    fn create_field(&mut self, kind: FieldKind, width: u32, height: u32) -> Result<Self::Field, EngineError>;

    /// (Re)allocates the display output.
    fn resize_output(&mut self, width: u32, height: u32) -> Result<(), EngineError>;

    /// Called before the first pass of a frame.
    fn begin_frame(&mut self) {}

    /// Called after the display pass; GPU backends submit here.
    fn end_frame(&mut self) {}

    /// Scalar vorticity of `velocity`.
    fn curl(&mut self, velocity: &Self::Field, out: &mut Self::Field);

    fn vorticity(
        &mut self,
        velocity: &Self::Field,
        curl: &Self::Field,
        out: &mut Self::Field,
        curl_strength: f32,
        dt: f32,
    );

    fn divergence(&mut self, velocity: &Self::Field, out: &mut Self::Field);

    /// `out = source * value`.
    fn scale(&mut self, source: &Self::Field, out: &mut Self::Field, value: f32);

    /// One Jacobi relaxation step of the pressure Poisson equation.
    fn jacobi(&mut self, pressure: &Self::Field, divergence: &Self::Field, out: &mut Self::Field);

    fn subtract_gradient(&mut self, pressure: &Self::Field, velocity: &Self::Field, out: &mut Self::Field);

    /// Semi-Lagrangian advection of `source` through `velocity`, decayed by
    /// `1 + dissipation * dt`.
    fn advect(
        &mut self,
        velocity: &Self::Field,
        source: &Self::Field,
        out: &mut Self::Field,
        dt: f32,
        dissipation: f32,
    );

    fn splat(&mut self, target: &Self::Field, out: &mut Self::Field, splat: &SplatParams);

    /// Composites `dye` into the display output.
    fn display(&mut self, dye: &Self::Field, params: &DisplayParams);

    /// Copies a field back to the CPU. Flushes pending GPU work first.
    fn read_field(&mut self, field: &Self::Field) -> Result<FieldData, EngineError>;
}
