//! Mouse/touch normalization into pointer records.
//!
//! Positions arrive in client (CSS-pixel-like) units, get scaled by the
//! device pixel ratio and divided by the surface's backing size. Texture
//! coordinates use a top-left origin: `(0, 0)` is the top-left corner and
//! `y` grows downward, matching the fluid engine's field layout.

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::color::{Rgb, generate_color};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerId {
    Mouse,
    Touch(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pointer {
    pub id: PointerId,
    pub texcoord: [f32; 2],
    pub prev_texcoord: [f32; 2],
    /// Aspect-corrected texcoord change since the previous move.
    pub delta: [f32; 2],
    pub down: bool,
    /// Set by a move with non-zero delta, cleared when a step splats it.
    pub moved: bool,
    pub color: Rgb,
}

impl Pointer {
    fn new(id: PointerId) -> Self {
        Self {
            id,
            texcoord: [0.0; 2],
            prev_texcoord: [0.0; 2],
            delta: [0.0; 2],
            down: false,
            moved: false,
            color: Rgb::BLACK,
        }
    }
}

/// One touch contact in client coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Touch {
    pub id: i64,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    MouseMove { x: f32, y: f32 },
    MouseDown { x: f32, y: f32 },
    MouseUp,
    TouchStart(Vec<Touch>),
    TouchMove(Vec<Touch>),
    TouchEnd(Vec<i64>),
}

/// Lazy start of the fluid frame loop: nothing runs until the first real
/// pointer interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    #[default]
    Dormant,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// This event moved the router from Dormant to Active.
    Activated,
    Updated,
    /// No pointer matched (e.g. a move for a released touch).
    Ignored,
}

/// A press that should produce one amplified splat on the next step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickSplat {
    pub texcoord: [f32; 2],
}

#[derive(Debug)]
pub struct PointerRouter {
    pointers: Vec<Pointer>,
    activation: Activation,
    width: u32,
    height: u32,
    pixel_ratio: f32,
    clicks: Vec<ClickSplat>,
    rng: StdRng,
}

impl PointerRouter {
    pub fn new(width: u32, height: u32, pixel_ratio: f32, seed: u64) -> Self {
        Self {
            pointers: vec![Pointer::new(PointerId::Mouse)],
            activation: Activation::Dormant,
            width: width.max(1),
            height: height.max(1),
            pixel_ratio: if pixel_ratio > 0.0 { pixel_ratio } else { 1.0 },
            clicks: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn set_surface(&mut self, width: u32, height: u32, pixel_ratio: f32) {
        self.width = width.max(1);
        self.height = height.max(1);
        if pixel_ratio > 0.0 {
            self.pixel_ratio = pixel_ratio;
        }
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn pointers(&self) -> &[Pointer] {
        &self.pointers
    }

    pub fn pointers_mut(&mut self) -> &mut [Pointer] {
        &mut self.pointers
    }

    pub fn pointer(&self, id: PointerId) -> Option<&Pointer> {
        self.pointers.iter().find(|p| p.id == id)
    }

    pub fn mouse(&self) -> &Pointer {
        &self.pointers[0]
    }

    /// Presses queued since the last [`Self::take_clicks`].
    pub fn pending_clicks(&self) -> usize {
        self.clicks.len()
    }

    pub fn take_clicks(&mut self) -> Vec<ClickSplat> {
        std::mem::take(&mut self.clicks)
    }

    pub fn handle(&mut self, event: &InputEvent) -> Routed {
        match event {
            InputEvent::MouseMove { x, y } => {
                let pos = self.texcoord(*x, *y);
                if self.activation == Activation::Dormant {
                    self.activation = Activation::Active;
                    let color = generate_color(&mut self.rng);
                    let mouse = &mut self.pointers[0];
                    mouse.texcoord = pos;
                    mouse.prev_texcoord = pos;
                    mouse.delta = [0.0; 2];
                    mouse.moved = false;
                    mouse.color = color;
                    log::info!("first pointer move, fluid loop activated");
                    return Routed::Activated;
                }
                let aspect = self.aspect();
                let mouse = &mut self.pointers[0];
                let color = mouse.color;
                move_pointer(mouse, pos, color, aspect);
                Routed::Updated
            }
            InputEvent::MouseDown { x, y } => {
                let pos = self.texcoord(*x, *y);
                let color = generate_color(&mut self.rng);
                press_pointer(&mut self.pointers[0], PointerId::Mouse, pos, color);
                self.clicks.push(ClickSplat { texcoord: pos });
                Routed::Updated
            }
            InputEvent::MouseUp => {
                self.pointers[0].down = false;
                Routed::Updated
            }
            InputEvent::TouchStart(touches) => {
                let activated = self.activation == Activation::Dormant;
                self.activation = Activation::Active;
                for touch in touches {
                    let pos = self.texcoord(touch.x, touch.y);
                    let color = generate_color(&mut self.rng);
                    let slot = self.claim_touch_slot(touch.id);
                    press_pointer(&mut self.pointers[slot], PointerId::Touch(touch.id), pos, color);
                }
                if activated {
                    log::info!("first touch, fluid loop activated");
                    Routed::Activated
                } else {
                    Routed::Updated
                }
            }
            InputEvent::TouchMove(touches) => {
                let aspect = self.aspect();
                let mut matched = false;
                for touch in touches {
                    let pos = self.texcoord(touch.x, touch.y);
                    if let Some(p) = self.active_touch_mut(touch.id) {
                        let color = p.color;
                        move_pointer(p, pos, color, aspect);
                        matched = true;
                    }
                }
                if matched { Routed::Updated } else { Routed::Ignored }
            }
            InputEvent::TouchEnd(ids) => {
                let mut matched = false;
                for id in ids {
                    if let Some(p) = self.active_touch_mut(*id) {
                        p.down = false;
                        matched = true;
                    }
                }
                if matched { Routed::Updated } else { Routed::Ignored }
            }
        }
    }

    fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    fn texcoord(&self, client_x: f32, client_y: f32) -> [f32; 2] {
        let px = (client_x * self.pixel_ratio).floor();
        let py = (client_y * self.pixel_ratio).floor();
        [px / self.width as f32, py / self.height as f32]
    }

    fn active_touch_mut(&mut self, id: i64) -> Option<&mut Pointer> {
        self.pointers.iter_mut().find(|p| p.id == PointerId::Touch(id) && p.down)
    }

    /// Same identifier first, then any released touch record, then a new one.
    fn claim_touch_slot(&mut self, id: i64) -> usize {
        if let Some(i) = self.pointers.iter().position(|p| p.id == PointerId::Touch(id)) {
            return i;
        }
        if let Some(i) = self
            .pointers
            .iter()
            .position(|p| matches!(p.id, PointerId::Touch(_)) && !p.down)
        {
            return i;
        }
        self.pointers.push(Pointer::new(PointerId::Touch(id)));
        self.pointers.len() - 1
    }
}

fn press_pointer(p: &mut Pointer, id: PointerId, pos: [f32; 2], color: Rgb) {
    p.id = id;
    p.down = true;
    p.moved = false;
    p.texcoord = pos;
    p.prev_texcoord = pos;
    p.delta = [0.0; 2];
    p.color = color;
}

fn move_pointer(p: &mut Pointer, pos: [f32; 2], color: Rgb, aspect: f32) {
    p.prev_texcoord = p.texcoord;
    p.texcoord = pos;
    p.delta = [
        correct_delta_x(p.texcoord[0] - p.prev_texcoord[0], aspect),
        correct_delta_y(p.texcoord[1] - p.prev_texcoord[1], aspect),
    ];
    p.moved = p.delta[0].abs() > 0.0 || p.delta[1].abs() > 0.0;
    p.color = color;
}

pub fn correct_delta_x(delta: f32, aspect: f32) -> f32 {
    if aspect < 1.0 { delta * aspect } else { delta }
}

pub fn correct_delta_y(delta: f32, aspect: f32) -> f32 {
    if aspect > 1.0 { delta / aspect } else { delta }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> PointerRouter {
        PointerRouter::new(800, 400, 1.0, 3)
    }

    #[test]
    fn mouse_record_always_exists() {
        let r = router();
        assert_eq!(r.pointers().len(), 1);
        assert_eq!(r.mouse().id, PointerId::Mouse);
        assert!(!r.mouse().down);
    }

    #[test]
    fn first_move_activates_with_baseline() {
        let mut r = router();
        assert_eq!(r.activation(), Activation::Dormant);
        assert_eq!(r.handle(&InputEvent::MouseMove { x: 400.0, y: 200.0 }), Routed::Activated);
        assert_eq!(r.activation(), Activation::Active);
        let m = r.mouse();
        assert_eq!(m.texcoord, [0.5, 0.5]);
        assert_eq!(m.prev_texcoord, [0.5, 0.5]);
        assert!(!m.moved);
        assert_ne!(m.color, Rgb::BLACK);
    }

    #[test]
    fn later_moves_set_corrected_delta() {
        let mut r = router();
        r.handle(&InputEvent::MouseMove { x: 400.0, y: 200.0 });
        let color = r.mouse().color;
        assert_eq!(r.handle(&InputEvent::MouseMove { x: 480.0, y: 240.0 }), Routed::Updated);
        let m = r.mouse();
        assert!(m.moved);
        assert!((m.delta[0] - 0.1).abs() < 1e-6);
        // aspect 2: y delta is divided by it
        assert!((m.delta[1] - 0.05).abs() < 1e-6);
        assert_eq!(m.color, color);
    }

    #[test]
    fn mouse_down_queues_click() {
        let mut r = router();
        r.handle(&InputEvent::MouseDown { x: 200.0, y: 100.0 });
        assert!(r.mouse().down);
        let clicks = r.take_clicks();
        assert_eq!(clicks, vec![ClickSplat { texcoord: [0.25, 0.25] }]);
        assert!(r.take_clicks().is_empty());
        r.handle(&InputEvent::MouseUp);
        assert!(!r.mouse().down);
    }

    #[test]
    fn multi_touch_tracks_each_identifier() {
        let mut r = router();
        let started = r.handle(&InputEvent::TouchStart(vec![
            Touch { id: 10, x: 100.0, y: 100.0 },
            Touch { id: 11, x: 700.0, y: 300.0 },
        ]));
        assert_eq!(started, Routed::Activated);
        assert_eq!(r.pointers().len(), 3);

        r.handle(&InputEvent::TouchMove(vec![Touch { id: 11, x: 600.0, y: 300.0 }]));
        let a = r.pointer(PointerId::Touch(10)).unwrap();
        let b = r.pointer(PointerId::Touch(11)).unwrap();
        assert!(!a.moved);
        assert!(b.moved);
        assert!(b.delta[0] < 0.0);

        r.handle(&InputEvent::TouchEnd(vec![10]));
        assert!(!r.pointer(PointerId::Touch(10)).unwrap().down);
        assert!(r.pointer(PointerId::Touch(11)).unwrap().down);
        assert_eq!(
            r.handle(&InputEvent::TouchMove(vec![Touch { id: 10, x: 0.0, y: 0.0 }])),
            Routed::Ignored
        );
    }

    #[test]
    fn released_touch_slot_is_reused() {
        let mut r = router();
        r.handle(&InputEvent::TouchStart(vec![Touch { id: 1, x: 10.0, y: 10.0 }]));
        r.handle(&InputEvent::TouchEnd(vec![1]));
        r.handle(&InputEvent::TouchStart(vec![Touch { id: 2, x: 20.0, y: 20.0 }]));
        assert_eq!(r.pointers().len(), 2);
        assert!(r.pointer(PointerId::Touch(1)).is_none());
        assert!(r.pointer(PointerId::Touch(2)).unwrap().down);
    }

    #[test]
    fn pixel_ratio_scales_positions() {
        let mut r = PointerRouter::new(1600, 800, 2.0, 0);
        r.handle(&InputEvent::MouseDown { x: 400.0, y: 200.0 });
        assert_eq!(r.mouse().texcoord, [0.5, 0.5]);
    }

    #[test]
    fn tall_surfaces_correct_x() {
        assert_eq!(correct_delta_x(0.2, 0.5), 0.1);
        assert_eq!(correct_delta_y(0.2, 0.5), 0.2);
        assert_eq!(correct_delta_x(0.2, 2.0), 0.2);
        assert_eq!(correct_delta_y(0.2, 2.0), 0.1);
    }
}
