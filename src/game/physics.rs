//! Vertical movement and hit-box tests
//!
//! Kinematics run in fixed steps: every simulation tick applies gravity once
//! and moves each body by its velocity once.

/// Height of the ground line; bodies rest here
pub const GROUND_Y: f32 = 40.0;
/// Velocity lost per tick while airborne
pub const GRAVITY: f32 = 0.4;
pub const JUMP_FORCE: f32 = 10.0;
/// Consecutive jumps allowed before touching the ground again
pub const MAX_JUMPS: u8 = 2;
/// Downward velocity forced when sneaking starts mid-air
pub const FAST_FALL_VELOCITY: f32 = -5.0;
/// Runner hit-box edge length
pub const RUNNER_SIZE: f32 = 32.0;
/// Hit-box height lost while sneaking
pub const SNEAK_SHRINK: f32 = 6.0;

/// Axis-aligned box, anchored at its lower-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Strict overlap; touching edges do not count
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.x + other.w
            && self.x + self.w > other.x
            && self.y < other.y + other.h
            && self.y + self.h > other.y
    }
}

/// Result of one vertical step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerticalStep {
    pub y: f32,
    pub vy: f32,
    /// The body touched the ground during this step
    pub landed: bool,
}

/// Physics system for the duel's side-view bodies
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Apply one tick of gravity. Bodies resting on the ground with no
    /// velocity are left alone.
    pub fn step_vertical(y: f32, vy: f32) -> VerticalStep {
        if y <= GROUND_Y && vy == 0.0 {
            return VerticalStep {
                y,
                vy,
                landed: false,
            };
        }

        let vy = vy - GRAVITY;
        let y = y + vy;

        if y <= GROUND_Y {
            VerticalStep {
                y: GROUND_Y,
                vy: 0.0,
                landed: true,
            }
        } else {
            VerticalStep {
                y,
                vy,
                landed: false,
            }
        }
    }

    /// Runner hit-box, shorter while sneaking
    pub fn runner_hitbox(x: f32, y: f32, sneaking: bool) -> Rect {
        let h = if sneaking {
            RUNNER_SIZE - SNEAK_SHRINK
        } else {
            RUNNER_SIZE
        };
        Rect::new(x, y, RUNNER_SIZE, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resting_body_does_not_move() {
        let step = PhysicsSystem::step_vertical(GROUND_Y, 0.0);
        assert_eq!(step.y, GROUND_Y);
        assert!(!step.landed);
    }

    #[test]
    fn jump_arc_returns_to_ground() {
        let (mut y, mut vy) = (GROUND_Y, JUMP_FORCE);
        let mut ticks = 0;
        loop {
            let step = PhysicsSystem::step_vertical(y, vy);
            y = step.y;
            vy = step.vy;
            ticks += 1;
            assert!(y >= GROUND_Y);
            if step.landed {
                break;
            }
            assert!(ticks < 200, "never landed");
        }
        assert_eq!(vy, 0.0);
        // 10 / 0.4 = 25 ticks up, roughly as many down
        assert!((45..=55).contains(&ticks));
    }

    #[test]
    fn sneaking_shrinks_hitbox_height() {
        let standing = PhysicsSystem::runner_hitbox(50.0, GROUND_Y, false);
        let sneaking = PhysicsSystem::runner_hitbox(50.0, GROUND_Y, true);
        assert_eq!(standing.h, 32.0);
        assert_eq!(sneaking.h, 26.0);

        // a bullet at y = 70 clears a sneaking runner but not a standing one
        let bullet = Rect::new(40.0, 70.0, 48.0, 12.0);
        assert!(standing.overlaps(&bullet));
        assert!(!sneaking.overlaps(&bullet));
    }

    #[test]
    fn touching_edges_do_not_collide() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 10.0, 10.0);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&Rect::new(9.9, 9.9, 1.0, 1.0)));
    }
}
