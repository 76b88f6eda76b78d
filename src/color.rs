use rand::Rng;
use serde::{Deserialize, Serialize};

/// Linear RGB triple, components nominally in [0, 1] (splat colors may
/// exceed 1).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn scaled(self, k: f32) -> Self {
        Self::new(self.r * k, self.g * k, self.b * k)
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

/// HSV to RGB, all inputs in [0, 1]. Hue wraps.
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb {
    let h6 = h.rem_euclid(1.0) * 6.0;
    let i = h6.floor();
    let f = h6 - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);

    match (i as i32).rem_euclid(6) {
        0 => Rgb::new(v, t, p),
        1 => Rgb::new(q, v, p),
        2 => Rgb::new(p, v, t),
        3 => Rgb::new(p, q, v),
        4 => Rgb::new(t, p, v),
        _ => Rgb::new(v, p, q),
    }
}

/// CSS-style HSL: hue in degrees, saturation and lightness in [0, 1].
pub fn hsl_to_rgb(hue_deg: f32, s: f32, l: f32) -> Rgb {
    let h = hue_deg.rem_euclid(360.0) / 360.0;
    if s <= 0.0 {
        return Rgb::new(l, l, l);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    Rgb::new(
        hue_channel(p, q, h + 1.0 / 3.0),
        hue_channel(p, q, h),
        hue_channel(p, q, h - 1.0 / 3.0),
    )
}

fn hue_channel(p: f32, q: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// Intensity applied to generated pointer colors; full-value colors wash
/// the dye out to white within a few frames.
pub const POINTER_COLOR_INTENSITY: f32 = 0.3;

/// Random fully saturated hue, dimmed to [`POINTER_COLOR_INTENSITY`].
pub fn generate_color<R: Rng + ?Sized>(rng: &mut R) -> Rgb {
    hsv_to_rgb(rng.gen_range(0.0..1.0), 1.0, 1.0).scaled(POINTER_COLOR_INTENSITY)
}

/// Parses `#rgb`, `#rrggbb` or one of a few CSS names used for backgrounds.
pub fn parse_css_color(s: &str) -> Option<Rgb> {
    let s = s.trim();
    match s.to_ascii_lowercase().as_str() {
        "black" => return Some(Rgb::BLACK),
        "white" => return Some(Rgb::new(1.0, 1.0, 1.0)),
        "transparent" => return Some(Rgb::BLACK),
        _ => {}
    }
    let hex = s.strip_prefix('#')?;
    let digit = |i: usize, len: usize| u8::from_str_radix(hex.get(i..i + len)?, 16).ok();
    let (r, g, b) = match hex.len() {
        3 => (digit(0, 1)? * 17, digit(1, 1)? * 17, digit(2, 1)? * 17),
        6 => (digit(0, 2)?, digit(2, 2)?, digit(4, 2)?),
        _ => return None,
    };
    Some(Rgb::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn close(a: Rgb, b: Rgb) -> bool {
        (a.r - b.r).abs() < 1e-5 && (a.g - b.g).abs() < 1e-5 && (a.b - b.b).abs() < 1e-5
    }

    #[test]
    fn hsv_primaries() {
        assert!(close(hsv_to_rgb(0.0, 1.0, 1.0), Rgb::new(1.0, 0.0, 0.0)));
        assert!(close(hsv_to_rgb(1.0 / 3.0, 1.0, 1.0), Rgb::new(0.0, 1.0, 0.0)));
        assert!(close(hsv_to_rgb(2.0 / 3.0, 1.0, 1.0), Rgb::new(0.0, 0.0, 1.0)));
        assert!(close(hsv_to_rgb(1.0, 1.0, 1.0), Rgb::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn hsl_matches_css() {
        // hsl(220, 100%, 60%) = #3377ff
        let c = hsl_to_rgb(220.0, 1.0, 0.6);
        assert!((c.r - 0.2).abs() < 1e-3);
        assert!((c.g - 0.4667).abs() < 1e-3);
        assert!((c.b - 1.0).abs() < 1e-3);
        assert!(close(hsl_to_rgb(0.0, 0.0, 0.25), Rgb::new(0.25, 0.25, 0.25)));
    }

    #[test]
    fn generated_colors_are_dimmed() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let c = generate_color(&mut rng);
            let max = c.r.max(c.g).max(c.b);
            assert!((max - POINTER_COLOR_INTENSITY).abs() < 1e-5);
        }
    }

    #[test]
    fn css_colors() {
        assert_eq!(parse_css_color("black"), Some(Rgb::BLACK));
        assert_eq!(parse_css_color("#000000"), Some(Rgb::BLACK));
        assert_eq!(parse_css_color("#fff"), Some(Rgb::new(1.0, 1.0, 1.0)));
        assert_eq!(parse_css_color("nope"), None);
        assert_eq!(parse_css_color("#12"), None);
    }
}
