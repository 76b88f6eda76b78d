//! wgpu backend: every field is a render-target texture and every pass is
//! a full-screen triangle. A frame is recorded into one command encoder
//! and submitted at [`FluidBackend::end_frame`].

pub mod device;
pub mod programs;
pub mod uniforms;

use crate::error::EngineError;
use crate::fluid::backend::{DisplayParams, FluidBackend, SplatParams};
use crate::fluid::capabilities::Capabilities;
use crate::fluid::field::{FieldData, FieldKind, FieldTarget};

pub use device::{GpuContext, format_support, request_context};
pub use programs::{Keyword, ProgramCache, ShaderKind};
pub use uniforms::{UniformArena, Uniforms};

/// Format of the composited display output.
pub const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const READBACK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

#[derive(Debug)]
pub struct GpuField {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
}

impl FieldTarget for GpuField {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

impl GpuField {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }
}

/// One recorded draw.
struct Pass<'a> {
    kind: ShaderKind,
    keywords: &'a [Keyword],
    target: &'a wgpu::TextureView,
    format: wgpu::TextureFormat,
    inputs: [&'a wgpu::TextureView; 2],
    uniforms: Uniforms,
    clear: wgpu::Color,
}

pub struct GpuBackend {
    ctx: GpuContext,
    caps: Capabilities,
    programs: ProgramCache,
    uniforms: UniformArena,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    encoder: Option<wgpu::CommandEncoder>,
    output: Option<GpuField>,
    external: Option<(wgpu::TextureView, wgpu::TextureFormat)>,
}

impl GpuBackend {
    /// Opens the default adapter and blocks until the device is ready.
    pub fn new_headless() -> Result<Self, EngineError> {
        let ctx = pollster::block_on(request_context())?;
        Self::from_context(ctx)
    }

    pub fn from_context(ctx: GpuContext) -> Result<Self, EngineError> {
        let caps = Capabilities::negotiate(|f| format_support(&ctx, f))?;
        log::info!(
            "fluid formats: rgba {:?}, rg {:?}, r {:?}, linear filtering {}",
            caps.format_rgba,
            caps.format_rg,
            caps.format_r,
            caps.supports_linear_filtering
        );
        let device = &ctx.device;

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniforms"),
            entries: &[UniformArena::bind_group_layout_entry()],
        });

        let filterable = caps.supports_linear_filtering;
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let sampler_type = if filterable {
            wgpu::SamplerBindingType::Filtering
        } else {
            wgpu::SamplerBindingType::NonFiltering
        };
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("textures"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(sampler_type),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("fluid"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let filter = if filterable { wgpu::FilterMode::Linear } else { wgpu::FilterMode::Nearest };
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("fluid"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter,
            min_filter: filter,
            ..Default::default()
        });

        let uniforms = UniformArena::new(device, uniform_layout);
        Ok(Self {
            caps,
            programs: ProgramCache::new(pipeline_layout),
            uniforms,
            texture_layout,
            sampler,
            encoder: None,
            output: None,
            external: None,
            ctx,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.ctx.device
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.ctx.adapter.get_info()
    }

    /// Pipeline variants compiled so far.
    pub fn compiled_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn output(&self) -> Option<&GpuField> {
        self.output.as_ref()
    }

    /// Composites into a caller-owned view (a swapchain image, say) instead
    /// of the offscreen output. The view must have the size last passed to
    /// `resize_output`; `None` switches back to the offscreen output.
    pub fn set_target_view(&mut self, target: Option<(wgpu::TextureView, wgpu::TextureFormat)>) {
        self.external = target;
    }

    /// Reads back the composited output (premultiplied RGBA8).
    pub fn read_output(&mut self) -> Result<image::RgbaImage, EngineError> {
        let Some(output) = self.output.as_ref() else {
            return Err(EngineError::EmptySurface { width: 0, height: 0 });
        };
        let texture = output.texture.clone();
        let (width, height) = output.size();
        let bytes = self.read_texture(&texture, width, height, 4)?;
        image::RgbaImage::from_raw(width, height, bytes)
            .ok_or_else(|| EngineError::Readback("output size mismatch".into()))
    }

    fn texture(
        &self,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Result<GpuField, EngineError> {
        if width == 0 || height == 0 {
            return Err(EngineError::EmptySurface { width, height });
        }
        let max = self.ctx.device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            return Err(EngineError::TooLarge { width, height, max });
        }
        let texture = self.ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuField { texture, view, width, height, format })
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.ctx.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("fluid-frame") })
        })
    }

    fn draw(&mut self, pass: Pass<'_>) {
        let pipeline = self.programs.get(&self.ctx.device, pass.kind, pass.format, pass.keywords);
        let (uniform_group, offset) = self.uniforms.push(&self.ctx.device, &pass.uniforms);
        let textures = self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(pass.kind.label()),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(pass.inputs[0]) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(pass.inputs[1]) },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::Sampler(&self.sampler) },
            ],
        });

        let encoder = self.encoder();
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(pass.kind.label()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: pass.target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations { load: wgpu::LoadOp::Clear(pass.clear), store: wgpu::StoreOp::Store },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        rpass.set_pipeline(&pipeline);
        rpass.set_bind_group(0, &uniform_group, &[offset]);
        rpass.set_bind_group(1, &textures, &[]);
        rpass.draw(0..3, 0..1);
    }

    /// Field pass with the usual single-target setup.
    fn field_pass(
        &mut self,
        kind: ShaderKind,
        keywords: &[Keyword],
        inputs: [&GpuField; 2],
        out: &GpuField,
        uniforms: Uniforms,
    ) {
        self.draw(Pass {
            kind,
            keywords,
            target: &out.view,
            format: out.format,
            inputs: [&inputs[0].view, &inputs[1].view],
            uniforms,
            clear: wgpu::Color::TRANSPARENT,
        });
    }

    fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.uniforms.flush(&self.ctx.queue);
            self.ctx.queue.submit(Some(encoder.finish()));
        }
    }

    /// Copies `texture` to a mappable buffer and returns its tightly packed
    /// rows. Submits everything recorded so far.
    fn read_texture(
        &mut self,
        texture: &wgpu::Texture,
        width: u32,
        height: u32,
        bytes_per_texel: u32,
    ) -> Result<Vec<u8>, EngineError> {
        let unpadded = width * bytes_per_texel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;
        let buffer = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        self.encoder().copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
        self.flush();

        let slice = buffer.slice(..);
        device::map_wait(&self.ctx.device, &slice)?;
        let mapped = slice.get_mapped_range();
        let mut out = Vec::with_capacity((unpadded * height) as usize);
        for row in 0..height as usize {
            let start = row * padded as usize;
            out.extend_from_slice(&mapped[start..start + unpadded as usize]);
        }
        drop(mapped);
        buffer.unmap();
        Ok(out)
    }
}

impl FluidBackend for GpuBackend {
    type Field = GpuField;

    fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    fn create_field(&mut self, kind: FieldKind, width: u32, height: u32) -> Result<GpuField, EngineError> {
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC;
        self.texture(kind.label(), width, height, self.caps.format_for(kind), usage)
    }

    fn resize_output(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        if self.output.as_ref().is_some_and(|o| o.size() == (width, height)) {
            return Ok(());
        }
        // drop the old target before allocating the new one
        self.output = None;
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC;
        self.output = Some(self.texture("display", width, height, OUTPUT_FORMAT, usage)?);
        Ok(())
    }

    fn end_frame(&mut self) {
        self.flush();
    }

    fn curl(&mut self, velocity: &GpuField, out: &mut GpuField) {
        let uniforms = Uniforms { texel_size: velocity.texel_size(), ..Default::default() };
        self.field_pass(ShaderKind::Curl, &[], [velocity, velocity], out, uniforms);
    }

    fn vorticity(&mut self, velocity: &GpuField, curl: &GpuField, out: &mut GpuField, curl_strength: f32, dt: f32) {
        let uniforms = Uniforms { texel_size: velocity.texel_size(), curl: curl_strength, dt, ..Default::default() };
        self.field_pass(ShaderKind::Vorticity, &[], [velocity, curl], out, uniforms);
    }

    fn divergence(&mut self, velocity: &GpuField, out: &mut GpuField) {
        let uniforms = Uniforms { texel_size: velocity.texel_size(), ..Default::default() };
        self.field_pass(ShaderKind::Divergence, &[], [velocity, velocity], out, uniforms);
    }

    fn scale(&mut self, source: &GpuField, out: &mut GpuField, value: f32) {
        let uniforms = Uniforms { texel_size: source.texel_size(), value, ..Default::default() };
        self.field_pass(ShaderKind::Clear, &[], [source, source], out, uniforms);
    }

    fn jacobi(&mut self, pressure: &GpuField, divergence: &GpuField, out: &mut GpuField) {
        let uniforms = Uniforms { texel_size: pressure.texel_size(), ..Default::default() };
        self.field_pass(ShaderKind::Pressure, &[], [pressure, divergence], out, uniforms);
    }

    fn subtract_gradient(&mut self, pressure: &GpuField, velocity: &GpuField, out: &mut GpuField) {
        let uniforms = Uniforms { texel_size: velocity.texel_size(), ..Default::default() };
        self.field_pass(ShaderKind::GradientSubtract, &[], [pressure, velocity], out, uniforms);
    }

    fn advect(&mut self, velocity: &GpuField, source: &GpuField, out: &mut GpuField, dt: f32, dissipation: f32) {
        let uniforms = Uniforms {
            texel_size: velocity.texel_size(),
            dye_texel_size: source.texel_size(),
            dt,
            dissipation,
            ..Default::default()
        };
        let keywords: &[Keyword] =
            if self.caps.supports_linear_filtering { &[] } else { &[Keyword::ManualFiltering] };
        self.field_pass(ShaderKind::Advection, keywords, [velocity, source], out, uniforms);
    }

    fn splat(&mut self, target: &GpuField, out: &mut GpuField, splat: &SplatParams) {
        let [r, g, b] = splat.value;
        let uniforms = Uniforms {
            texel_size: target.texel_size(),
            point: splat.point,
            aspect_ratio: splat.aspect_ratio,
            radius: splat.radius,
            color: [r, g, b, 0.0],
            ..Default::default()
        };
        self.field_pass(ShaderKind::Splat, &[], [target, target], out, uniforms);
    }

    fn display(&mut self, dye: &GpuField, params: &DisplayParams) {
        let Some(output) = self.output.as_ref() else {
            return;
        };
        let (view, format) = match &self.external {
            Some((view, format)) => (view.clone(), *format),
            None => (output.view.clone(), output.format),
        };
        let uniforms = Uniforms { texel_size: output.texel_size(), ..Default::default() };
        let clear = match params.background {
            Some(c) => wgpu::Color { r: c.r as f64, g: c.g as f64, b: c.b as f64, a: 1.0 },
            None => wgpu::Color::TRANSPARENT,
        };
        let keywords: &[Keyword] = if params.shading { &[Keyword::Shading] } else { &[] };
        self.draw(Pass {
            kind: ShaderKind::Display,
            keywords,
            target: &view,
            format,
            inputs: [&dye.view, &dye.view],
            uniforms,
            clear,
        });
    }

    fn read_field(&mut self, field: &GpuField) -> Result<FieldData, EngineError> {
        let (width, height) = field.size();
        let staging = self.texture(
            "readback",
            width,
            height,
            READBACK_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        )?;
        let uniforms = Uniforms { texel_size: field.texel_size(), ..Default::default() };
        self.field_pass(ShaderKind::Copy, &[], [field, field], &staging, uniforms);

        let bytes = self.read_texture(&staging.texture, width, height, 16)?;
        let texels = bytes
            .chunks_exact(16)
            .map(bytemuck::pod_read_unaligned::<[f32; 4]>)
            .collect();
        Ok(FieldData { width, height, texels })
    }
}
