pub const BASE_TTL: f32 = 50.0;
pub const RANGE_TTL: f32 = 150.0;
pub const RANGE_HUE: f32 = 100.0;

/// Floats per particle in the flat buffer.
pub const PARTICLE_PROP_COUNT: usize = 9;

/// One particle, unpacked from its 9-float slot:
/// `x, y, vx, vy, age, ttl, speed, radius, hue`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub age: f32,
    pub ttl: f32,
    pub speed: f32,
    pub radius: f32,
    pub hue: f32,
}

impl Particle {
    pub fn read(slot: &[f32]) -> Self {
        Self {
            x: slot[0],
            y: slot[1],
            vx: slot[2],
            vy: slot[3],
            age: slot[4],
            ttl: slot[5],
            speed: slot[6],
            radius: slot[7],
            hue: slot[8],
        }
    }

    pub fn write(&self, slot: &mut [f32]) {
        slot.copy_from_slice(&[
            self.x, self.y, self.vx, self.vy, self.age, self.ttl, self.speed, self.radius, self.hue,
        ]);
    }

    /// Stroke opacity for the current age.
    pub fn alpha(&self) -> f32 {
        fade_in_out(self.age, self.ttl)
    }
}

/// Triangular pulse over `[0, m]`: 0 at both ends, 1 in the middle.
pub fn fade_in_out(t: f32, m: f32) -> f32 {
    let hm = 0.5 * m;
    if hm <= 0.0 {
        return 0.0;
    }
    (((t + hm) % m) - hm).abs() / hm
}

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    (1.0 - t) * a + t * b
}
