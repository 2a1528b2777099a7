//! Snapshot building and delta compression
//!
//! Every tick the scheduler captures a full view of the session and hands it
//! to the room's [`SnapshotBuilder`]. The builder decides whether the tick
//! goes out as a full snapshot or as a delta against the previous view, and
//! suppresses deltas that would carry nothing but the timestamp.

use crate::ws::protocol::{Cooldowns, PlayerDelta, StatePayload};

use super::session::{GameSession, PlayerState};

/// Round wire floats to two decimals
fn quantize(v: f32) -> f32 {
    (v * 100.0).round() / 100.0
}

fn player_view(p: &PlayerState) -> PlayerDelta {
    PlayerDelta {
        x: Some(quantize(p.x)),
        y: Some(quantize(p.y)),
        vy: Some(quantize(p.vy)),
        is_jumping: Some(p.is_jumping),
        jump_count: Some(p.jump_count),
        is_sneaking: Some(p.is_sneaking),
        role: Some(p.role),
        facing_right: Some(p.facing_right),
        score: Some(p.score),
        character: Some(p.character.clone()),
    }
}

impl GameSession {
    /// Full broadcast view of the session at server time `t`
    pub fn snapshot(&self, t: u64) -> StatePayload {
        StatePayload {
            full: true,
            t,
            timer: Some((self.timer_ms / 1000.0).ceil() as u32),
            round: Some(self.round),
            is_playing: Some(self.is_playing()),
            scores: Some(self.scores),
            stamina: Some(quantize(self.resources.stamina)),
            cooldowns: Some(Cooldowns {
                wall: quantize(self.resources.wall_cooldown),
                bullet: quantize(self.resources.bullet_cooldown),
            }),
            speed: Some(quantize(self.speed)),
            is_charging: Some(self.resources.is_charging),
            p1: Some(player_view(&self.players[0])),
            p2: Some(player_view(&self.players[1])),
            obstacles: Some(
                self.obstacles
                    .iter()
                    .map(|o| {
                        let mut view = o.view();
                        view.x = quantize(view.x);
                        view.y = quantize(view.y);
                        view
                    })
                    .collect(),
            ),
            explosions: Some(self.explosions.clone()),
        }
    }
}

fn changed<T: PartialEq + Clone>(prev: &Option<T>, cur: &Option<T>) -> Option<T> {
    if prev != cur {
        cur.clone()
    } else {
        None
    }
}

fn diff_player(prev: &Option<PlayerDelta>, cur: &Option<PlayerDelta>) -> Option<PlayerDelta> {
    let (prev, cur) = match (prev, cur) {
        (Some(p), Some(c)) => (p, c),
        _ => return cur.clone(),
    };
    let delta = PlayerDelta {
        x: changed(&prev.x, &cur.x),
        y: changed(&prev.y, &cur.y),
        vy: changed(&prev.vy, &cur.vy),
        is_jumping: changed(&prev.is_jumping, &cur.is_jumping),
        jump_count: changed(&prev.jump_count, &cur.jump_count),
        is_sneaking: changed(&prev.is_sneaking, &cur.is_sneaking),
        role: changed(&prev.role, &cur.role),
        facing_right: changed(&prev.facing_right, &cur.facing_right),
        score: changed(&prev.score, &cur.score),
        character: changed(&prev.character, &cur.character),
    };
    (!delta.is_empty()).then_some(delta)
}

/// Delta of `cur` against `prev`, or `None` when nothing but the timestamp moved
fn diff(prev: &StatePayload, cur: &StatePayload) -> Option<StatePayload> {
    let delta = StatePayload {
        full: false,
        t: cur.t,
        timer: changed(&prev.timer, &cur.timer),
        round: changed(&prev.round, &cur.round),
        is_playing: changed(&prev.is_playing, &cur.is_playing),
        scores: changed(&prev.scores, &cur.scores),
        stamina: changed(&prev.stamina, &cur.stamina),
        cooldowns: changed(&prev.cooldowns, &cur.cooldowns),
        speed: changed(&prev.speed, &cur.speed),
        is_charging: changed(&prev.is_charging, &cur.is_charging),
        p1: diff_player(&prev.p1, &cur.p1),
        p2: diff_player(&prev.p2, &cur.p2),
        obstacles: changed(&prev.obstacles, &cur.obstacles),
        // one-shot, never compared
        explosions: cur.explosions.clone().filter(|e| !e.is_empty()),
    };

    let empty = StatePayload {
        full: false,
        t: cur.t,
        ..Default::default()
    };
    (delta != empty).then_some(delta)
}

/// Per-room snapshot state
#[derive(Debug)]
pub struct SnapshotBuilder {
    /// Ticks built so far
    tick: u64,
    /// A full snapshot goes out on every tick divisible by this
    full_interval: u64,
    /// Full view from the previous tick, the delta baseline
    last_sent: Option<StatePayload>,
    force_full: bool,
}

impl SnapshotBuilder {
    pub fn new(full_interval: u64) -> Self {
        Self {
            tick: 0,
            full_interval: full_interval.max(1),
            last_sent: None,
            force_full: false,
        }
    }

    /// Make the next build a full snapshot (round changes, reconnects)
    pub fn force_next(&mut self) {
        self.force_full = true;
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Last full view, retained after the session ends
    pub fn last_sent(&self) -> Option<&StatePayload> {
        self.last_sent.as_ref()
    }

    /// Turn the current full view into the message for this tick.
    /// Returns `None` when the tick would carry no change.
    pub fn build(&mut self, current: StatePayload) -> Option<StatePayload> {
        self.tick += 1;
        let full = self.force_full || self.tick == 1 || self.tick % self.full_interval == 0;
        self.force_full = false;

        let out = match (&self.last_sent, full) {
            (Some(prev), false) => diff(prev, &current),
            _ => Some(StatePayload {
                full: true,
                ..current.clone()
            }),
        };

        self.last_sent = Some(current);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::time::FULL_SNAPSHOT_INTERVAL;
    use crate::ws::protocol::{ExplosionView, PlayerAction};
    use uuid::Uuid;

    fn session() -> (GameSession, Uuid) {
        let a = Uuid::new_v4();
        let mut s = GameSession::new(Uuid::new_v4(), [(a, "mort".into()), (Uuid::new_v4(), "doux".into())]);
        s.start(0);
        (s, a)
    }

    #[test]
    fn first_tick_is_full() {
        let (s, _) = session();
        let mut builder = SnapshotBuilder::new(FULL_SNAPSHOT_INTERVAL);
        let msg = builder.build(s.snapshot(0)).expect("first tick");
        assert!(msg.full);
        assert_eq!(msg.timer, Some(60));
        assert_eq!(msg.stamina, Some(100.0));
        assert!(msg.p1.is_some() && msg.p2.is_some());
        assert_eq!(msg.obstacles, Some(vec![]));
    }

    #[test]
    fn unchanged_tick_is_suppressed() {
        let (s, _) = session();
        let mut builder = SnapshotBuilder::new(FULL_SNAPSHOT_INTERVAL);
        builder.build(s.snapshot(0));
        assert_eq!(builder.build(s.snapshot(16)), None);
        assert_eq!(builder.tick(), 2);
    }

    #[test]
    fn delta_carries_only_changed_fields() {
        let (mut s, a) = session();
        let mut builder = SnapshotBuilder::new(FULL_SNAPSHOT_INTERVAL);
        builder.build(s.snapshot(0));

        s.handle_input(a, PlayerAction::Jump, 0);
        let msg = builder.build(s.snapshot(5)).expect("jump is a change");
        assert!(!msg.full);
        assert_eq!(msg.t, 5);
        assert_eq!(msg.timer, None);
        assert_eq!(msg.stamina, None);
        assert_eq!(msg.obstacles, None);
        assert_eq!(msg.p2, None);

        let p1 = msg.p1.expect("p1 changed");
        assert_eq!(p1.vy, Some(10.0));
        assert_eq!(p1.is_jumping, Some(true));
        assert_eq!(p1.jump_count, Some(1));
        assert_eq!(p1.x, None);
        assert_eq!(p1.y, None);
        assert_eq!(p1.character, None);
    }

    #[test]
    fn moving_obstacles_resend_whole_list() {
        let (mut s, a) = session();
        let mut builder = SnapshotBuilder::new(FULL_SNAPSHOT_INTERVAL);
        builder.build(s.snapshot(0));

        s.spawn_wall(0).expect("fresh stamina pays for a wall");
        let spawned = builder.build(s.snapshot(1)).expect("new obstacle");
        assert!(!spawned.full);
        let first = spawned.obstacles.expect("obstacles sent");
        assert_eq!(first.len(), 1);

        s.update(16);
        assert!(s.is_playing());
        let current = s.snapshot(16).obstacles;
        let moved = builder.build(s.snapshot(16)).expect("obstacle moved");
        assert_eq!(moved.obstacles, current);
        assert_ne!(moved.obstacles, Some(first));

        // Something else changes while the obstacle stays put
        s.handle_input(a, PlayerAction::Jump, 16);
        let msg = builder.build(s.snapshot(17)).expect("jump is a change");
        assert!(!msg.full);
        assert_eq!(msg.obstacles, None);
        assert!(msg.p1.is_some());
    }

    #[test]
    fn every_sixtieth_tick_is_full() {
        let (s, _) = session();
        let mut builder = SnapshotBuilder::new(FULL_SNAPSHOT_INTERVAL);
        let mut fulls = Vec::new();
        for tick in 1..=120u64 {
            if let Some(msg) = builder.build(s.snapshot(tick)) {
                assert!(msg.full, "static state only produces full snapshots");
                fulls.push(tick);
            }
        }
        assert_eq!(fulls, vec![1, 60, 120]);
    }

    #[test]
    fn explosions_sent_once_and_forced_full() {
        let (mut s, _) = session();
        let mut builder = SnapshotBuilder::new(FULL_SNAPSHOT_INTERVAL);
        builder.build(s.snapshot(0));

        s.explosions.push(ExplosionView { id: 1, x: 50.0, y: 40.0 });
        let msg = builder.build(s.snapshot(1)).expect("explosion");
        assert_eq!(msg.explosions.map(|e| e.len()), Some(1));
        s.clear_explosions();
        assert_eq!(builder.build(s.snapshot(2)), None);

        builder.force_next();
        assert!(builder.build(s.snapshot(3)).expect("forced").full);
        assert!(builder.last_sent().is_some());
    }

    #[test]
    fn wire_floats_are_quantized() {
        let (mut s, _) = session();
        s.resources.stamina = 33.333_33;
        s.timer_ms = 1_200.0;
        let view = s.snapshot(0);
        assert_eq!(view.stamina, Some(33.33));
        assert_eq!(view.timer, Some(2));
    }
}
