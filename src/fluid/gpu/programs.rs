//! Shader sources and the lazily compiled pipeline variants.

use std::collections::HashMap;

pub const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");
pub const COPY_WGSL: &str = include_str!("shaders/copy.wgsl");
pub const CLEAR_WGSL: &str = include_str!("shaders/clear.wgsl");
pub const DISPLAY_WGSL: &str = include_str!("shaders/display.wgsl");
pub const SPLAT_WGSL: &str = include_str!("shaders/splat.wgsl");
pub const ADVECTION_WGSL: &str = include_str!("shaders/advection.wgsl");
pub const DIVERGENCE_WGSL: &str = include_str!("shaders/divergence.wgsl");
pub const CURL_WGSL: &str = include_str!("shaders/curl.wgsl");
pub const VORTICITY_WGSL: &str = include_str!("shaders/vorticity.wgsl");
pub const PRESSURE_WGSL: &str = include_str!("shaders/pressure.wgsl");
pub const GRADIENT_SUBTRACT_WGSL: &str = include_str!("shaders/gradient_subtract.wgsl");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    Copy,
    Clear,
    Display,
    Splat,
    Advection,
    Divergence,
    Curl,
    Vorticity,
    Pressure,
    GradientSubtract,
}

/// Compile-time switches, applied as WGSL `override` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Keyword {
    Shading,
    ManualFiltering,
}

impl Keyword {
    pub fn constant_name(self) -> &'static str {
        match self {
            Keyword::Shading => "SHADING",
            Keyword::ManualFiltering => "MANUAL_FILTERING",
        }
    }
}

impl ShaderKind {
    pub const ALL: [ShaderKind; 10] = [
        ShaderKind::Copy,
        ShaderKind::Clear,
        ShaderKind::Display,
        ShaderKind::Splat,
        ShaderKind::Advection,
        ShaderKind::Divergence,
        ShaderKind::Curl,
        ShaderKind::Vorticity,
        ShaderKind::Pressure,
        ShaderKind::GradientSubtract,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ShaderKind::Copy => "copy",
            ShaderKind::Clear => "clear",
            ShaderKind::Display => "display",
            ShaderKind::Splat => "splat",
            ShaderKind::Advection => "advection",
            ShaderKind::Divergence => "divergence",
            ShaderKind::Curl => "curl",
            ShaderKind::Vorticity => "vorticity",
            ShaderKind::Pressure => "pressure",
            ShaderKind::GradientSubtract => "gradient-subtract",
        }
    }

    fn fragment_source(self) -> &'static str {
        match self {
            ShaderKind::Copy => COPY_WGSL,
            ShaderKind::Clear => CLEAR_WGSL,
            ShaderKind::Display => DISPLAY_WGSL,
            ShaderKind::Splat => SPLAT_WGSL,
            ShaderKind::Advection => ADVECTION_WGSL,
            ShaderKind::Divergence => DIVERGENCE_WGSL,
            ShaderKind::Curl => CURL_WGSL,
            ShaderKind::Vorticity => VORTICITY_WGSL,
            ShaderKind::Pressure => PRESSURE_WGSL,
            ShaderKind::GradientSubtract => GRADIENT_SUBTRACT_WGSL,
        }
    }

    /// Full module source: shared vertex stage and bindings plus this pass.
    pub fn source(self) -> String {
        format!("{COMMON_WGSL}\n{}", self.fragment_source())
    }

    /// Keywords this shader declares an override for.
    pub fn keywords(self) -> &'static [Keyword] {
        match self {
            ShaderKind::Display => &[Keyword::Shading],
            ShaderKind::Advection => &[Keyword::ManualFiltering],
            _ => &[],
        }
    }

    fn blend(self) -> Option<wgpu::BlendState> {
        match self {
            ShaderKind::Display => Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProgramKey {
    kind: ShaderKind,
    format: wgpu::TextureFormat,
    keywords: Vec<Keyword>,
}

/// Compiles each (shader, target format, keyword set) combination the
/// first time it is drawn with and keeps it for the device's lifetime.
pub struct ProgramCache {
    layout: wgpu::PipelineLayout,
    modules: HashMap<ShaderKind, wgpu::ShaderModule>,
    pipelines: HashMap<ProgramKey, wgpu::RenderPipeline>,
}

impl ProgramCache {
    pub fn new(layout: wgpu::PipelineLayout) -> Self {
        Self { layout, modules: HashMap::new(), pipelines: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn get(
        &mut self,
        device: &wgpu::Device,
        kind: ShaderKind,
        format: wgpu::TextureFormat,
        keywords: &[Keyword],
    ) -> wgpu::RenderPipeline {
        let key = ProgramKey { kind, format, keywords: normalize(kind, keywords) };
        if let Some(pipeline) = self.pipelines.get(&key) {
            return pipeline.clone();
        }

        let module = self
            .modules
            .entry(kind)
            .or_insert_with(|| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(kind.label()),
                    source: wgpu::ShaderSource::Wgsl(kind.source().into()),
                })
            })
            .clone();

        log::debug!("compiling {} for {:?} with {:?}", kind.label(), format, key.keywords);
        let constants: Vec<(&str, f64)> = kind
            .keywords()
            .iter()
            .map(|k| (k.constant_name(), if key.keywords.contains(k) { 1.0 } else { 0.0 }))
            .collect();
        let options = wgpu::PipelineCompilationOptions { constants: &constants, ..Default::default() };

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(kind.label()),
            layout: Some(&self.layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                compilation_options: options.clone(),
                buffers: &[],
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                compilation_options: options,
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: kind.blend(),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });
        self.pipelines.insert(key, pipeline.clone());
        pipeline
    }
}

/// Drops keywords the shader does not declare and sorts the rest, so
/// equivalent requests share one variant.
fn normalize(kind: ShaderKind, keywords: &[Keyword]) -> Vec<Keyword> {
    let mut out: Vec<Keyword> = keywords.iter().copied().filter(|k| kind.keywords().contains(k)).collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_sets_are_canonical() {
        assert_eq!(
            normalize(ShaderKind::Display, &[Keyword::ManualFiltering, Keyword::Shading, Keyword::Shading]),
            vec![Keyword::Shading]
        );
        assert!(normalize(ShaderKind::Curl, &[Keyword::Shading]).is_empty());
    }

    #[test]
    fn every_shader_carries_the_vertex_stage() {
        for kind in ShaderKind::ALL {
            let src = kind.source();
            assert!(src.contains("fn vs_main"), "{}", kind.label());
            assert!(src.contains("fn fs_main"), "{}", kind.label());
            for k in kind.keywords() {
                assert!(src.contains(k.constant_name()));
            }
        }
    }
}
