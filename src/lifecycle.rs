//! Surface sizing, resize debouncing and frame timing shared by both
//! engines.

use std::time::{Duration, Instant};

/// Largest step the solvers accept; longer gaps (a backgrounded tab, a
/// debugger pause) are clamped to one 60 Hz frame.
pub const MAX_DT: f32 = 0.016666;

/// Resize quiet period for the vortex surface.
pub const VORTEX_RESIZE_DEBOUNCE: Duration = Duration::from_millis(150);

/// Backing-store size for a surface: `floor(client * pixel_ratio)`.
/// A non-positive or non-finite ratio counts as 1.
pub fn backing_size(client_width: f32, client_height: f32, pixel_ratio: f32) -> (u32, u32) {
    let ratio = if pixel_ratio.is_finite() && pixel_ratio > 0.0 { pixel_ratio } else { 1.0 };
    let scale = |v: f32| (v.max(0.0) * ratio).floor() as u32;
    (scale(client_width), scale(client_height))
}

/// Remembers the current backing size and only reports changes.
#[derive(Debug, Clone, Default)]
pub struct ResizeTracker {
    current: Option<(u32, u32)>,
}

impl ResizeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(width: u32, height: u32) -> Self {
        Self { current: Some((width, height)) }
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.current
    }

    /// Returns the new backing size when it differs from the current one.
    pub fn update(&mut self, client_width: f32, client_height: f32, pixel_ratio: f32) -> Option<(u32, u32)> {
        let next = backing_size(client_width, client_height, pixel_ratio);
        self.update_backing(next.0, next.1)
    }

    pub fn update_backing(&mut self, width: u32, height: u32) -> Option<(u32, u32)> {
        if self.current == Some((width, height)) {
            return None;
        }
        self.current = Some((width, height));
        Some((width, height))
    }
}

/// Trailing-edge debounce: a value is released once `delay` has passed
/// without a newer one arriving.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(Instant, T)>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    pub fn push(&mut self, now: Instant, value: T) {
        self.pending = Some((now, value));
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((at, _)) if now.saturating_duration_since(*at) >= self.delay => {
                self.pending.take().map(|(_, v)| v)
            }
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

/// Converts frame callback instants into clamped time steps.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    max_dt: f32,
}

impl FrameClock {
    pub fn new(now: Instant) -> Self {
        Self { last: now, max_dt: MAX_DT }
    }

    pub fn tick(&mut self, now: Instant) -> f32 {
        let dt = now.saturating_duration_since(self.last).as_secs_f32();
        self.last = now;
        dt.min(self.max_dt)
    }
}
