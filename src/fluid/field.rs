/// What a field stores; decides its channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Velocity,
    Dye,
    Pressure,
    Divergence,
    Curl,
}

impl FieldKind {
    pub fn channels(self) -> u32 {
        match self {
            FieldKind::Dye => 4,
            FieldKind::Velocity => 2,
            FieldKind::Pressure | FieldKind::Divergence | FieldKind::Curl => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FieldKind::Velocity => "velocity",
            FieldKind::Dye => "dye",
            FieldKind::Pressure => "pressure",
            FieldKind::Divergence => "divergence",
            FieldKind::Curl => "curl",
        }
    }
}

/// Anything a pass can render into and sample from.
pub trait FieldTarget {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    fn texel_size(&self) -> [f32; 2] {
        [1.0 / self.width() as f32, 1.0 / self.height() as f32]
    }

    fn size(&self) -> (u32, u32) {
        (self.width(), self.height())
    }
}

/// Ping-pong pair: passes sample `read`, render into `write`, then swap.
#[derive(Debug)]
pub struct DoubleField<F> {
    pub read: F,
    pub write: F,
}

impl<F> DoubleField<F> {
    pub fn new(read: F, write: F) -> Self {
        Self { read, write }
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.read, &mut self.write);
    }
}

impl<F: FieldTarget> DoubleField<F> {
    pub fn width(&self) -> u32 {
        self.read.width()
    }

    pub fn height(&self) -> u32 {
        self.read.height()
    }

    pub fn texel_size(&self) -> [f32; 2] {
        self.read.texel_size()
    }

    pub fn size(&self) -> (u32, u32) {
        self.read.size()
    }
}

/// Every field the solver owns.
#[derive(Debug)]
pub struct FieldSet<F> {
    pub velocity: DoubleField<F>,
    pub dye: DoubleField<F>,
    pub pressure: DoubleField<F>,
    pub divergence: F,
    pub curl: F,
}

/// CPU copy of a field, row-major from the top-left texel.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldData {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<[f32; 4]>,
}

impl FieldData {
    pub fn at(&self, x: u32, y: u32) -> [f32; 4] {
        self.texels[(y * self.width + x) as usize]
    }

    /// Texel nearest to the normalized coordinate `uv`.
    pub fn at_uv(&self, uv: [f32; 2]) -> [f32; 4] {
        let x = ((uv[0] * self.width as f32) as u32).min(self.width - 1);
        let y = ((uv[1] * self.height as f32) as u32).min(self.height - 1);
        self.at(x, y)
    }

    pub fn max_abs(&self, channel: usize) -> f32 {
        self.texels.iter().map(|t| t[channel].abs()).fold(0.0, f32::max)
    }

    pub fn sum(&self, channel: usize) -> f32 {
        self.texels.iter().map(|t| t[channel]).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Tag(&'static str);

    #[test]
    fn swap_is_its_own_inverse() {
        let mut d = DoubleField::new(Tag("a"), Tag("b"));
        d.swap();
        assert_eq!((d.read.0, d.write.0), ("b", "a"));
        d.swap();
        assert_eq!((d.read.0, d.write.0), ("a", "b"));
    }

    #[test]
    fn channel_counts() {
        assert_eq!(FieldKind::Velocity.channels(), 2);
        assert_eq!(FieldKind::Dye.channels(), 4);
        assert_eq!(FieldKind::Pressure.channels(), 1);
        assert_eq!(FieldKind::Divergence.channels(), 1);
        assert_eq!(FieldKind::Curl.channels(), 1);
    }

    #[test]
    fn field_data_lookup() {
        let data = FieldData {
            width: 2,
            height: 2,
            texels: vec![[0.0; 4], [1.0; 4], [2.0; 4], [-3.0; 4]],
        };
        assert_eq!(data.at(1, 0)[0], 1.0);
        assert_eq!(data.at_uv([0.9, 0.9])[0], -3.0);
        assert_eq!(data.at_uv([1.0, 1.0])[0], -3.0);
        assert_eq!(data.max_abs(0), 3.0);
        assert_eq!(data.sum(0), 0.0);
    }
}
