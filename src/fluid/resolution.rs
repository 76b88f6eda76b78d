/// Field dimensions for a target resolution on a `width`×`height` canvas.
///
/// The short side gets `round(resolution)`, the long side
/// `round(resolution * aspect)`, and the canvas's longer axis receives the
/// long side so the field keeps the canvas aspect ratio.
pub fn resolution_for(resolution: u32, width: u32, height: u32) -> (u32, u32) {
    let w = width.max(1) as f32;
    let h = height.max(1) as f32;
    let aspect = w / h;
    let aspect = if aspect < 1.0 { 1.0 / aspect } else { aspect };
    let min = (resolution as f32).round().max(1.0) as u32;
    let max = (resolution as f32 * aspect).round().max(1.0) as u32;
    if w > h { (max, min) } else { (min, max) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_canvas_keeps_aspect() {
        let (w, h) = resolution_for(128, 800, 600);
        assert_eq!((w, h), (171, 128));
        assert!(h <= w);
        let ratio = h as f32 / w as f32;
        assert!((ratio - 600.0 / 800.0).abs() < 1.0 / 128.0);
    }

    #[test]
    fn tall_canvas_puts_long_side_vertical() {
        assert_eq!(resolution_for(100, 500, 1000), (100, 200));
    }

    #[test]
    fn square_and_degenerate() {
        assert_eq!(resolution_for(64, 300, 300), (64, 64));
        assert_eq!(resolution_for(64, 0, 0), (64, 64));
    }

    #[test]
    fn aspect_within_rounding_for_many_sizes() {
        for (cw, ch) in [(1920, 1080), (1280, 720), (1024, 768), (2560, 1080), (801, 599)] {
            let (w, h) = resolution_for(256, cw, ch);
            let expected = ch as f32 / cw as f32;
            let got = h as f32 / w as f32;
            assert!((got - expected).abs() <= 1.0 / w as f32 + 1e-6, "{cw}x{ch}: {w}x{h}");
        }
    }
}
