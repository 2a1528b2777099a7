//! Attacker economy and obstacles - stamina, cooldowns, bullets, walls

use crate::util::time::FRAME_MS;
use crate::ws::protocol::{ObstacleKind, ObstacleView};

use super::physics::{Rect, GROUND_Y};

pub const MAX_STAMINA: f32 = 100.0;
/// Stamina regained per nominal frame once regen kicks in
pub const REGEN_PER_FRAME: f32 = 1.0;
/// Idle time after a spend before stamina starts coming back
pub const REGEN_WAIT_MS: u64 = 1000;

/// Recoil hop applied to the attacker when firing
pub const RECOIL_JUMP_FORCE: f32 = 5.0;
pub const RECOIL_DURATION_MS: f32 = 20.0 * FRAME_MS;

/// Obstacles are dropped once they leave this horizontal range
pub const PLAYFIELD_MIN_X: f32 = -100.0;
pub const PLAYFIELD_MAX_X: f32 = 900.0;

/// Cost and shape of each obstacle type
#[derive(Debug, Clone, Copy)]
pub struct ObstacleStats {
    /// Stamina spent on spawn
    pub cost: f32,
    /// Cooldown armed on spawn (ms)
    pub cooldown_ms: f32,
    /// Added to the current round speed
    pub extra_speed: f32,
    pub width: f32,
    pub height: f32,
    /// Spawn height
    pub y: f32,
    /// Horizontal spawn distance in front of the attacker
    pub spawn_offset: f32,
}

impl ObstacleStats {
    pub fn for_kind(kind: ObstacleKind) -> Self {
        match kind {
            ObstacleKind::Bullet => Self {
                cost: 20.0,
                cooldown_ms: 500.0,
                extra_speed: 3.0,
                width: 48.0,
                height: 12.0,
                y: 70.0,
                spawn_offset: 20.0,
            },
            ObstacleKind::Wall => Self {
                cost: 30.0,
                cooldown_ms: 500.0,
                extra_speed: 0.0,
                width: 20.0,
                height: 40.0,
                y: GROUND_Y,
                spawn_offset: 0.0,
            },
        }
    }
}

/// Stamina drained per nominal frame while a wall is charging
pub const WALL_DRAIN_PER_FRAME: f32 = 0.5;

/// An obstacle travelling across the playfield
#[derive(Debug, Clone, PartialEq)]
pub struct Obstacle {
    pub id: u64,
    pub kind: ObstacleKind,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    /// Horizontal velocity per tick; the sign points at the runner
    pub vx: f32,
}

impl Obstacle {
    /// Spawn in front of an attacker standing at `attacker_x`.
    /// `direction` is -1.0 or 1.0, toward the runner.
    pub fn spawn(id: u64, kind: ObstacleKind, attacker_x: f32, direction: f32, speed: f32) -> Self {
        let stats = ObstacleStats::for_kind(kind);
        Self {
            id,
            kind,
            x: attacker_x + direction * stats.spawn_offset,
            y: stats.y,
            w: stats.width,
            h: stats.height,
            vx: direction * (speed + stats.extra_speed),
        }
    }

    /// Advance one tick
    pub fn advance(&mut self) {
        self.x += self.vx;
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.w, self.h)
    }

    pub fn is_out_of_bounds(&self) -> bool {
        self.x < PLAYFIELD_MIN_X || self.x > PLAYFIELD_MAX_X
    }

    pub fn view(&self) -> ObstacleView {
        ObstacleView {
            id: self.id,
            kind: self.kind,
            x: self.x,
            y: self.y,
            w: self.w,
            h: self.h,
            vx: self.vx,
        }
    }
}

/// Why an attacker action was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendError {
    Cooldown,
    InsufficientStamina,
    AlreadyCharging,
}

impl SpendError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Cooldown => "cooldown_active",
            Self::InsufficientStamina => "insufficient_stamina",
            Self::AlreadyCharging => "already_charging",
        }
    }
}

/// Resources shared by whoever is attacking this round
#[derive(Debug, Clone, PartialEq)]
pub struct AttackResources {
    pub stamina: f32,
    pub wall_cooldown: f32,
    pub bullet_cooldown: f32,
    pub is_charging: bool,
    pub charge_start: u64,
    pub recoil_timer: f32,
    /// Time of the last stamina-spending action (ms)
    pub last_action_at: u64,
}

impl Default for AttackResources {
    fn default() -> Self {
        Self {
            stamina: MAX_STAMINA,
            wall_cooldown: 0.0,
            bullet_cooldown: 0.0,
            is_charging: false,
            charge_start: 0,
            recoil_timer: 0.0,
            last_action_at: 0,
        }
    }
}

impl AttackResources {
    fn cooldown_mut(&mut self, kind: ObstacleKind) -> &mut f32 {
        match kind {
            ObstacleKind::Bullet => &mut self.bullet_cooldown,
            ObstacleKind::Wall => &mut self.wall_cooldown,
        }
    }

    /// Check that an obstacle of `kind` can be paid for right now
    pub fn can_spawn(&self, kind: ObstacleKind) -> Result<(), SpendError> {
        let cooldown = match kind {
            ObstacleKind::Bullet => self.bullet_cooldown,
            ObstacleKind::Wall => self.wall_cooldown,
        };
        if cooldown > 0.0 {
            return Err(SpendError::Cooldown);
        }
        if self.stamina < ObstacleStats::for_kind(kind).cost {
            return Err(SpendError::InsufficientStamina);
        }
        Ok(())
    }

    /// Pay for an obstacle and arm its cooldown
    pub fn spend(&mut self, kind: ObstacleKind) -> Result<(), SpendError> {
        self.can_spawn(kind)?;
        let stats = ObstacleStats::for_kind(kind);
        self.stamina = (self.stamina - stats.cost).max(0.0);
        *self.cooldown_mut(kind) = stats.cooldown_ms;
        Ok(())
    }

    pub fn start_charging(&mut self, now: u64) -> Result<(), SpendError> {
        if self.is_charging {
            return Err(SpendError::AlreadyCharging);
        }
        if self.stamina < ObstacleStats::for_kind(ObstacleKind::Wall).cost {
            return Err(SpendError::InsufficientStamina);
        }
        self.is_charging = true;
        self.charge_start = now;
        Ok(())
    }

    /// Regenerate after the idle wait. Never while charging.
    pub fn regen(&mut self, elapsed_ms: f32, now: u64) {
        if self.is_charging || now.saturating_sub(self.last_action_at) <= REGEN_WAIT_MS {
            return;
        }
        if self.stamina < MAX_STAMINA {
            self.stamina =
                (self.stamina + REGEN_PER_FRAME * elapsed_ms / FRAME_MS).min(MAX_STAMINA);
        }
    }

    /// Drain stamina for an active charge. Returns `true` when the charge
    /// ran the tank dry and the wall must be forced out.
    pub fn drain_charge(&mut self, elapsed_ms: f32) -> bool {
        if !self.is_charging {
            return false;
        }
        let cost = WALL_DRAIN_PER_FRAME * elapsed_ms / FRAME_MS;
        if self.stamina >= cost {
            self.stamina -= cost;
            false
        } else {
            true
        }
    }

    /// Count cooldowns and recoil down. Returns `true` when recoil just expired.
    pub fn tick_timers(&mut self, elapsed_ms: f32) -> bool {
        self.wall_cooldown = (self.wall_cooldown - elapsed_ms).max(0.0);
        self.bullet_cooldown = (self.bullet_cooldown - elapsed_ms).max(0.0);

        if self.recoil_timer > 0.0 {
            self.recoil_timer -= elapsed_ms;
            if self.recoil_timer <= 0.0 {
                self.recoil_timer = 0.0;
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bullet_spend_arms_cooldown() {
        let mut res = AttackResources::default();
        assert_eq!(res.spend(ObstacleKind::Bullet), Ok(()));
        assert_eq!(res.stamina, 80.0);
        assert_eq!(res.bullet_cooldown, 500.0);
        assert_eq!(res.spend(ObstacleKind::Bullet), Err(SpendError::Cooldown));

        // walls have their own cooldown
        assert_eq!(res.spend(ObstacleKind::Wall), Ok(()));
        assert_eq!(res.stamina, 50.0);
    }

    #[test]
    fn spend_refused_without_stamina() {
        let mut res = AttackResources {
            stamina: 19.0,
            ..Default::default()
        };
        assert_eq!(
            res.spend(ObstacleKind::Bullet),
            Err(SpendError::InsufficientStamina)
        );
        assert_eq!(res.stamina, 19.0);
    }

    #[test]
    fn regen_waits_for_idle_and_caps() {
        let mut res = AttackResources {
            stamina: 50.0,
            last_action_at: 10_000,
            ..Default::default()
        };
        res.regen(100.0, 10_500);
        assert_eq!(res.stamina, 50.0);

        res.regen(FRAME_MS * 10.0, 11_001);
        assert!((res.stamina - 60.0).abs() < 1e-3);

        res.regen(10_000.0, 30_000);
        assert_eq!(res.stamina, MAX_STAMINA);
    }

    #[test]
    fn drain_reports_exhaustion_instead_of_going_negative() {
        let mut res = AttackResources {
            stamina: 1.0,
            is_charging: true,
            ..Default::default()
        };
        assert!(!res.drain_charge(FRAME_MS));
        assert!((res.stamina - 0.5).abs() < 1e-5);
        assert!(!res.drain_charge(FRAME_MS));
        assert!(res.drain_charge(FRAME_MS));
        assert!(res.stamina >= 0.0);
    }

    #[test]
    fn recoil_expiry_reported_once() {
        let mut res = AttackResources {
            recoil_timer: RECOIL_DURATION_MS,
            bullet_cooldown: 100.0,
            ..Default::default()
        };
        assert!(!res.tick_timers(200.0));
        assert_eq!(res.bullet_cooldown, 0.0);
        assert!(res.tick_timers(200.0));
        assert!(!res.tick_timers(200.0));
    }

    #[test]
    fn obstacles_spawn_toward_runner() {
        let bullet = Obstacle::spawn(1, ObstacleKind::Bullet, 700.0, -1.0, 5.0);
        assert_eq!(bullet.x, 680.0);
        assert_eq!(bullet.vx, -8.0);

        let wall = Obstacle::spawn(2, ObstacleKind::Wall, 700.0, -1.0, 5.0);
        assert_eq!(wall.x, 700.0);
        assert_eq!(wall.y, GROUND_Y);
        assert_eq!(wall.vx, -5.0);
    }
}
