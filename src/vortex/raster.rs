//! Just enough of a 2D canvas for the vortex: solid fills, anti-aliased
//! round-capped strokes and an additive blur glow.

use image::{Rgba, RgbaImage, imageops};

use crate::color::Rgb;

fn to_u8(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

pub fn fill(surface: &mut RgbaImage, color: Rgb) {
    let px = Rgba([to_u8(color.r), to_u8(color.g), to_u8(color.b), 255]);
    for p in surface.pixels_mut() {
        *p = px;
    }
}

/// Strokes the segment `a`→`b` with round caps. Coverage falls off over
/// one pixel at the edge; blending is source-over.
pub fn stroke_segment(surface: &mut RgbaImage, a: [f32; 2], b: [f32; 2], width: f32, color: Rgb, alpha: f32) {
    if alpha <= 0.0 || width <= 0.0 || surface.width() == 0 || surface.height() == 0 {
        return;
    }
    let half = 0.5 * width;
    let reach = half + 1.0;
    let x0 = (a[0].min(b[0]) - reach).floor().max(0.0) as u32;
    let y0 = (a[1].min(b[1]) - reach).floor().max(0.0) as u32;
    let x1 = (a[0].max(b[0]) + reach).ceil().min(surface.width() as f32 - 1.0);
    let y1 = (a[1].max(b[1]) + reach).ceil().min(surface.height() as f32 - 1.0);
    if x1 < 0.0 || y1 < 0.0 {
        return;
    }
    let (x1, y1) = (x1 as u32, y1 as u32);

    let src = [color.r, color.g, color.b];
    for y in y0..=y1 {
        for x in x0..=x1 {
            let d = distance_to_segment([x as f32 + 0.5, y as f32 + 0.5], a, b);
            let coverage = (half + 0.5 - d).clamp(0.0, 1.0);
            if coverage > 0.0 {
                blend_over(surface.get_pixel_mut(x, y), src, alpha * coverage);
            }
        }
    }
}

fn distance_to_segment(p: [f32; 2], a: [f32; 2], b: [f32; 2]) -> f32 {
    let ab = [b[0] - a[0], b[1] - a[1]];
    let ap = [p[0] - a[0], p[1] - a[1]];
    let len2 = ab[0] * ab[0] + ab[1] * ab[1];
    let t = if len2 > 0.0 { ((ap[0] * ab[0] + ap[1] * ab[1]) / len2).clamp(0.0, 1.0) } else { 0.0 };
    let dx = ap[0] - ab[0] * t;
    let dy = ap[1] - ab[1] * t;
    (dx * dx + dy * dy).sqrt()
}

fn blend_over(dst: &mut Rgba<u8>, src: [f32; 3], alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    let da = dst[3] as f32 / 255.0;
    let out_a = alpha + da * (1.0 - alpha);
    if out_a <= 0.0 {
        *dst = Rgba([0, 0, 0, 0]);
        return;
    }
    for i in 0..3 {
        let dc = dst[i] as f32 / 255.0;
        dst[i] = to_u8((src[i] * alpha + dc * da * (1.0 - alpha)) / out_a);
    }
    dst[3] = to_u8(out_a);
}

/// Draws a blurred, brightened copy of the surface back onto itself with
/// additive blending.
pub fn glow(surface: &mut RgbaImage, blur_radius: f32, brightness: f32) {
    let blurred = imageops::fast_blur(surface, blur_radius);
    for (dst, src) in surface.pixels_mut().zip(blurred.pixels()) {
        for i in 0..4 {
            let lit = (src[i] as f32 * brightness).min(255.0);
            dst[i] = (dst[i] as f32 + lit).min(255.0) as u8;
        }
    }
}
