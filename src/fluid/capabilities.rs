//! Texture format negotiation, resolved once per device and threaded into
//! every field allocation.

use wgpu::TextureFormat;

use crate::error::EngineError;
use crate::fluid::field::FieldKind;

/// What a device can do with one candidate format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatSupport {
    /// Usable as both a render attachment and a sampled texture.
    pub renderable: bool,
    pub filterable: bool,
}

/// Formats chosen for each channel count plus the derived flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub format_rgba: TextureFormat,
    pub format_rg: TextureFormat,
    pub format_r: TextureFormat,
    /// `true` when the RGBA field uses a 16-bit float format.
    pub half_float: bool,
    /// Hardware bilinear filtering works on every chosen format.
    pub supports_linear_filtering: bool,
}

const RGBA_CANDIDATES: &[TextureFormat] = &[TextureFormat::Rgba16Float, TextureFormat::Rgba32Float];
const RG_CANDIDATES: &[TextureFormat] = &[
    TextureFormat::Rg16Float,
    TextureFormat::Rgba16Float,
    TextureFormat::Rg32Float,
    TextureFormat::Rgba32Float,
];
const R_CANDIDATES: &[TextureFormat] = &[
    TextureFormat::R16Float,
    TextureFormat::Rg16Float,
    TextureFormat::Rgba16Float,
    TextureFormat::R32Float,
    TextureFormat::Rg32Float,
    TextureFormat::Rgba32Float,
];

impl Capabilities {
    /// Picks the first renderable candidate per channel count, half-float
    /// before full-float, wider formats as a fallback for narrow ones.
    pub fn negotiate(probe: impl Fn(TextureFormat) -> FormatSupport) -> Result<Self, EngineError> {
        let pick = |candidates: &[TextureFormat], channels: u32| {
            candidates
                .iter()
                .copied()
                .map(|f| (f, probe(f)))
                .find(|(_, s)| s.renderable)
                .ok_or(EngineError::UnsupportedFormat { channels })
        };

        let (format_rgba, rgba) = pick(RGBA_CANDIDATES, 4)?;
        let (format_rg, rg) = pick(RG_CANDIDATES, 2)?;
        let (format_r, r) = pick(R_CANDIDATES, 1)?;

        Ok(Self {
            format_rgba,
            format_rg,
            format_r,
            half_float: format_rgba == TextureFormat::Rgba16Float,
            supports_linear_filtering: rgba.filterable && rg.filterable && r.filterable,
        })
    }

    /// Full-float formats everywhere; what the CPU backend reports.
    pub fn full_float(supports_linear_filtering: bool) -> Self {
        Self {
            format_rgba: TextureFormat::Rgba32Float,
            format_rg: TextureFormat::Rg32Float,
            format_r: TextureFormat::R32Float,
            half_float: false,
            supports_linear_filtering,
        }
    }

    pub fn format_for(&self, kind: FieldKind) -> TextureFormat {
        match kind.channels() {
            4 => self.format_rgba,
            2 => self.format_rg,
            _ => self.format_r,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_supported(_: TextureFormat) -> FormatSupport {
        FormatSupport { renderable: true, filterable: true }
    }

    #[test]
    fn prefers_half_float() {
        let caps = Capabilities::negotiate(all_supported).unwrap();
        assert_eq!(caps.format_rgba, TextureFormat::Rgba16Float);
        assert_eq!(caps.format_rg, TextureFormat::Rg16Float);
        assert_eq!(caps.format_r, TextureFormat::R16Float);
        assert!(caps.half_float);
        assert!(caps.supports_linear_filtering);
    }

    #[test]
    fn narrow_formats_fall_back_to_wider_ones() {
        let caps = Capabilities::negotiate(|f| FormatSupport {
            renderable: matches!(f, TextureFormat::Rgba16Float),
            filterable: true,
        })
        .unwrap();
        assert_eq!(caps.format_r, TextureFormat::Rgba16Float);
        assert_eq!(caps.format_rg, TextureFormat::Rgba16Float);
        assert_eq!(caps.format_for(FieldKind::Pressure), TextureFormat::Rgba16Float);
    }

    #[test]
    fn unfilterable_float_disables_linear_filtering() {
        let caps = Capabilities::negotiate(|f| FormatSupport {
            renderable: matches!(
                f,
                TextureFormat::Rgba32Float | TextureFormat::Rg32Float | TextureFormat::R32Float
            ),
            filterable: false,
        })
        .unwrap();
        assert!(!caps.half_float);
        assert!(!caps.supports_linear_filtering);
        assert_eq!(caps.format_for(FieldKind::Velocity), TextureFormat::Rg32Float);
    }

    #[test]
    fn missing_format_is_fatal() {
        let err = Capabilities::negotiate(|_| FormatSupport::default()).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFormat { channels: 4 }));
    }
}
