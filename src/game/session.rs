//! Authoritative state for one duel
//!
//! A session is created when both players in a room are ready and lives for
//! exactly two rounds. Player A runs in round 1 while player B attacks, then
//! the two swap sides. The runner always stands on the left.
//!
//! Inputs are applied immediately by [`GameSession::handle_input`]; everything
//! time-based happens in [`GameSession::update`], which the scheduler calls
//! once per tick with the current time.

use std::fmt;

use tracing::{debug, info};
use uuid::Uuid;

use crate::util::time::elapsed_ms;
use crate::ws::protocol::{ExplosionView, ObstacleKind, PlayerAction, Role, RoundEndReason};

use super::combat::{AttackResources, Obstacle, SpendError, RECOIL_DURATION_MS, RECOIL_JUMP_FORCE};
use super::physics::{PhysicsSystem, FAST_FALL_VELOCITY, GROUND_Y, JUMP_FORCE, MAX_JUMPS};

pub const ROUND_DURATION_MS: f32 = 60_000.0;
pub const MIN_SPEED: f32 = 5.0;
pub const MAX_SPEED: f32 = 10.0;
/// Survival points are paid in chunks of this many milliseconds
pub const SCORE_CHUNK_MS: f32 = 100.0;
/// Bonus for every obstacle that leaves the playfield without a hit
pub const OBSTACLE_PASS_BONUS: u32 = 100;
pub const RUNNER_X: f32 = 50.0;
pub const ATTACKER_X: f32 = 700.0;
pub const LAST_ROUND: u8 = 2;

/// Per-player state (authoritative)
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub user_id: Uuid,
    pub character: String,
    pub x: f32,
    pub y: f32,
    pub vy: f32,
    pub is_jumping: bool,
    pub jump_count: u8,
    pub is_sneaking: bool,
    pub role: Role,
    pub facing_right: bool,
    /// Points earned this round
    pub score: u32,
}

impl PlayerState {
    pub fn new(user_id: Uuid, character: String) -> Self {
        Self {
            user_id,
            character,
            x: RUNNER_X,
            y: GROUND_Y,
            vy: 0.0,
            is_jumping: false,
            jump_count: 0,
            is_sneaking: false,
            role: Role::Runner,
            facing_right: true,
            score: 0,
        }
    }

    /// Put the player on its side of the field for `role`, standing still
    fn place(&mut self, role: Role) {
        self.role = role;
        self.x = match role {
            Role::Runner => RUNNER_X,
            Role::Attacker => ATTACKER_X,
        };
        self.facing_right = role == Role::Runner;
        self.y = GROUND_Y;
        self.vy = 0.0;
        self.is_jumping = false;
        self.jump_count = 0;
        self.is_sneaking = false;
        self.score = 0;
    }
}

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Built but not started
    Created,
    /// A round is running
    Playing,
    /// Round 2 is over
    Finished,
}

/// What happened to an input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    Applied,
    /// Not applicable to the sender's role or the session state
    Ignored,
    /// A spend action was refused; the code goes back to the sender
    Rejected(&'static str),
}

impl From<SpendError> for InputOutcome {
    fn from(err: SpendError) -> Self {
        Self::Rejected(err.code())
    }
}

/// Summary of one finished round
#[derive(Debug, Clone, PartialEq)]
pub struct RoundResult {
    pub round: u8,
    /// Who defended (ran) this round
    pub runner: Uuid,
    pub points: u32,
    pub reason: RoundEndReason,
}

/// Final result handed to the match-over callback
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub room_id: Uuid,
    pub player_ids: [Uuid; 2],
    /// Points per player, same order as `player_ids`
    pub scores: [u32; 2],
    /// `None` on equal scores
    pub winner: Option<Uuid>,
    pub duration_ms: u64,
    pub rounds: Vec<RoundResult>,
}

impl MatchOutcome {
    pub fn duration_secs(&self) -> u32 {
        (self.duration_ms / 1000) as u32
    }
}

/// Terminal events collected during a tick, drained by the scheduler
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    RoundEnded {
        round: u8,
        reason: RoundEndReason,
        scores: [u32; 2],
    },
    MatchOver(MatchOutcome),
}

pub type MatchOverCallback = Box<dyn FnOnce(MatchOutcome) + Send>;

/// One duel's authoritative state machine
pub struct GameSession {
    pub room_id: Uuid,
    pub players: [PlayerState; 2],
    pub phase: SessionPhase,
    pub round: u8,
    /// Time left in the round (ms)
    pub timer_ms: f32,
    pub speed: f32,
    /// Recorded score per player, filled in as rounds end
    pub scores: [u32; 2],
    pub resources: AttackResources,
    pub obstacles: Vec<Obstacle>,
    pub explosions: Vec<ExplosionView>,
    score_accumulator_ms: f32,
    next_entity_id: u64,
    last_update: u64,
    started_at: u64,
    rounds: Vec<RoundResult>,
    events: Vec<SessionEvent>,
    on_match_over: Option<MatchOverCallback>,
}

impl fmt::Debug for GameSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameSession")
            .field("room_id", &self.room_id)
            .field("phase", &self.phase)
            .field("round", &self.round)
            .field("timer_ms", &self.timer_ms)
            .field("scores", &self.scores)
            .finish_non_exhaustive()
    }
}

impl GameSession {
    /// `players[0]` runs first
    pub fn new(room_id: Uuid, players: [(Uuid, String); 2]) -> Self {
        let [(a, a_char), (b, b_char)] = players;
        Self {
            room_id,
            players: [PlayerState::new(a, a_char), PlayerState::new(b, b_char)],
            phase: SessionPhase::Created,
            round: 1,
            timer_ms: ROUND_DURATION_MS,
            speed: MIN_SPEED,
            scores: [0, 0],
            resources: AttackResources::default(),
            obstacles: Vec::new(),
            explosions: Vec::new(),
            score_accumulator_ms: 0.0,
            next_entity_id: 1,
            last_update: 0,
            started_at: 0,
            rounds: Vec::new(),
            events: Vec::new(),
            on_match_over: None,
        }
    }

    /// Register the terminal callback, invoked once when round 2 ends
    pub fn set_on_match_over(&mut self, callback: MatchOverCallback) {
        self.on_match_over = Some(callback);
    }

    pub fn start(&mut self, now: u64) {
        if self.phase != SessionPhase::Created {
            return;
        }
        self.phase = SessionPhase::Playing;
        self.started_at = now;
        self.last_update = now;
        self.start_round(1);
        info!(room_id = %self.room_id, "Game started");
    }

    pub fn is_playing(&self) -> bool {
        self.phase == SessionPhase::Playing
    }

    pub fn is_game_over(&self) -> bool {
        self.phase == SessionPhase::Finished
    }

    pub fn player_ids(&self) -> [Uuid; 2] {
        [self.players[0].user_id, self.players[1].user_id]
    }

    pub fn index_of(&self, user_id: Uuid) -> Option<usize> {
        self.players.iter().position(|p| p.user_id == user_id)
    }

    pub fn runner_index(&self) -> usize {
        if self.players[0].role == Role::Runner {
            0
        } else {
            1
        }
    }

    pub fn attacker_index(&self) -> usize {
        1 - self.runner_index()
    }

    pub fn rounds(&self) -> &[RoundResult] {
        &self.rounds
    }

    /// Drain round-end and match-over events produced since the last call
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn clear_explosions(&mut self) {
        self.explosions.clear();
    }

    fn start_round(&mut self, round: u8) {
        self.round = round;
        self.timer_ms = ROUND_DURATION_MS;
        self.speed = MIN_SPEED;
        self.score_accumulator_ms = 0.0;
        self.resources = AttackResources::default();
        self.obstacles.clear();
        self.explosions.clear();

        let (first, second) = if round == 1 {
            (Role::Runner, Role::Attacker)
        } else {
            (Role::Attacker, Role::Runner)
        };
        self.players[0].place(first);
        self.players[1].place(second);

        debug!(room_id = %self.room_id, round, "Round started");
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    /// Horizontal direction obstacles travel in, from attacker to runner
    fn attack_direction(&self) -> f32 {
        let runner = &self.players[self.runner_index()];
        let attacker = &self.players[self.attacker_index()];
        if runner.x > attacker.x {
            1.0
        } else {
            -1.0
        }
    }

    /// Facing of the attacker when not recoiling: toward the runner
    fn attacker_default_facing(&self) -> bool {
        self.attack_direction() > 0.0
    }

    /// Apply one input from `user_id`
    pub fn handle_input(&mut self, user_id: Uuid, action: PlayerAction, now: u64) -> InputOutcome {
        if !self.is_playing() {
            return InputOutcome::Ignored;
        }
        let Some(idx) = self.index_of(user_id) else {
            return InputOutcome::Ignored;
        };

        match (self.players[idx].role, action) {
            (Role::Runner, PlayerAction::Jump) => self.jump(idx),
            (Role::Runner, PlayerAction::SneakStart) => {
                let player = &mut self.players[idx];
                player.is_sneaking = true;
                if player.y > GROUND_Y {
                    player.vy = FAST_FALL_VELOCITY;
                }
                InputOutcome::Applied
            }
            (Role::Runner, PlayerAction::SneakEnd) => {
                self.players[idx].is_sneaking = false;
                InputOutcome::Applied
            }
            (Role::Attacker, PlayerAction::FireBullet) => self.fire_bullet(idx, now),
            (Role::Attacker, PlayerAction::ChargeStart) => {
                match self.resources.start_charging(now) {
                    Ok(()) => InputOutcome::Applied,
                    Err(e) => e.into(),
                }
            }
            (Role::Attacker, PlayerAction::ChargeEnd) => {
                if !self.resources.is_charging {
                    return InputOutcome::Ignored;
                }
                let spawned = self.spawn_wall(now);
                self.resources.is_charging = false;
                self.resources.last_action_at = now;
                match spawned {
                    Ok(()) => InputOutcome::Applied,
                    Err(e) => e.into(),
                }
            }
            _ => InputOutcome::Ignored,
        }
    }

    fn jump(&mut self, idx: usize) -> InputOutcome {
        let player = &mut self.players[idx];
        if player.jump_count >= MAX_JUMPS {
            return InputOutcome::Ignored;
        }
        player.vy = JUMP_FORCE;
        player.is_jumping = true;
        player.jump_count += 1;

        if player.jump_count == MAX_JUMPS {
            let (x, y) = (player.x, player.y);
            let id = self.next_id();
            self.explosions.push(ExplosionView { id, x, y });
        }
        InputOutcome::Applied
    }

    fn fire_bullet(&mut self, idx: usize, now: u64) -> InputOutcome {
        if let Err(e) = self.resources.spend(ObstacleKind::Bullet) {
            return e.into();
        }
        self.resources.last_action_at = now;
        self.resources.recoil_timer = RECOIL_DURATION_MS;

        let direction = self.attack_direction();
        let facing = self.attacker_default_facing();
        let attacker = &mut self.players[idx];
        attacker.vy = RECOIL_JUMP_FORCE;
        attacker.is_jumping = true;
        attacker.facing_right = !facing;
        let attacker_x = attacker.x;

        let id = self.next_id();
        let bullet = Obstacle::spawn(id, ObstacleKind::Bullet, attacker_x, direction, self.speed);
        self.obstacles.push(bullet);
        InputOutcome::Applied
    }

    /// Pay for and spawn a wall on the attacker's side
    pub fn spawn_wall(&mut self, _now: u64) -> Result<(), SpendError> {
        self.resources.spend(ObstacleKind::Wall)?;
        let direction = self.attack_direction();
        let attacker_x = self.players[self.attacker_index()].x;
        let id = self.next_id();
        let wall = Obstacle::spawn(id, ObstacleKind::Wall, attacker_x, direction, self.speed);
        self.obstacles.push(wall);
        Ok(())
    }

    /// Advance the simulation to `now`
    pub fn update(&mut self, now: u64) {
        if !self.is_playing() {
            return;
        }
        let elapsed = elapsed_ms(self.last_update, now);
        self.last_update = now;

        // Timer and difficulty
        self.timer_ms = (self.timer_ms - elapsed).max(0.0);
        let progress = 1.0 - self.timer_ms / ROUND_DURATION_MS;
        self.speed = (MIN_SPEED + progress * (MAX_SPEED - MIN_SPEED)).clamp(MIN_SPEED, MAX_SPEED);

        // Survival score
        let runner = self.runner_index();
        self.score_accumulator_ms += elapsed;
        if self.score_accumulator_ms >= SCORE_CHUNK_MS {
            let points = (self.score_accumulator_ms / SCORE_CHUNK_MS).floor();
            self.score_accumulator_ms -= points * SCORE_CHUNK_MS;
            self.players[runner].score += points as u32;
        }

        // Stamina
        self.resources.regen(elapsed, now);
        if self.resources.drain_charge(elapsed) {
            // Exhausted mid-charge; the wall goes out if it can still be paid for
            let _ = self.spawn_wall(now);
            self.resources.is_charging = false;
            self.resources.last_action_at = now;
        }

        // Cooldowns and recoil
        if self.resources.tick_timers(elapsed) {
            let facing = self.attacker_default_facing();
            let attacker = self.attacker_index();
            self.players[attacker].facing_right = facing;
        }

        // Gravity
        for player in self.players.iter_mut() {
            let step = PhysicsSystem::step_vertical(player.y, player.vy);
            player.y = step.y;
            player.vy = step.vy;
            if step.landed {
                player.is_jumping = false;
                player.jump_count = 0;
            }
        }

        // Obstacles
        let runner_state = &self.players[runner];
        let hitbox =
            PhysicsSystem::runner_hitbox(runner_state.x, runner_state.y, runner_state.is_sneaking);
        let mut hit = false;
        for obstacle in self.obstacles.iter_mut() {
            obstacle.advance();
            if obstacle.rect().overlaps(&hitbox) {
                hit = true;
                break;
            }
        }
        if hit {
            self.end_round(RoundEndReason::HitObstacle);
            return;
        }

        let before = self.obstacles.len();
        self.obstacles.retain(|o| !o.is_out_of_bounds());
        let passed = (before - self.obstacles.len()) as u32;
        self.players[runner].score += passed * OBSTACLE_PASS_BONUS;

        if self.timer_ms <= 0.0 {
            self.end_round(RoundEndReason::TimeUp);
        }
    }

    /// Client-side hit report. Only the current runner can report being hit.
    pub fn report_collision(&mut self, reporter: Uuid) -> InputOutcome {
        if !self.is_playing() {
            return InputOutcome::Ignored;
        }
        match self.index_of(reporter) {
            Some(idx) if idx == self.runner_index() => {
                self.end_round(RoundEndReason::HitObstacle);
                InputOutcome::Applied
            }
            _ => InputOutcome::Ignored,
        }
    }

    /// Close the current round. Round 1 rolls straight into round 2; round 2
    /// finishes the match.
    pub fn end_round(&mut self, reason: RoundEndReason) {
        if !self.is_playing() {
            return;
        }

        let runner = self.runner_index();
        let points = self.players[runner].score;
        self.scores[runner] = points;
        self.rounds.push(RoundResult {
            round: self.round,
            runner: self.players[runner].user_id,
            points,
            reason,
        });
        self.events.push(SessionEvent::RoundEnded {
            round: self.round,
            reason,
            scores: self.scores,
        });

        info!(
            room_id = %self.room_id,
            round = self.round,
            reason = %reason,
            points,
            "Round ended"
        );

        if self.round < LAST_ROUND {
            self.start_round(self.round + 1);
            return;
        }

        self.phase = SessionPhase::Finished;
        self.resources.is_charging = false;

        let ids = self.player_ids();
        let winner = match self.scores[0].cmp(&self.scores[1]) {
            std::cmp::Ordering::Greater => Some(ids[0]),
            std::cmp::Ordering::Less => Some(ids[1]),
            std::cmp::Ordering::Equal => None,
        };
        let outcome = MatchOutcome {
            room_id: self.room_id,
            player_ids: ids,
            scores: self.scores,
            winner,
            duration_ms: self.last_update.saturating_sub(self.started_at),
            rounds: self.rounds.clone(),
        };

        info!(
            room_id = %self.room_id,
            winner = ?winner,
            scores = ?self.scores,
            "Game over"
        );

        self.events.push(SessionEvent::MatchOver(outcome.clone()));
        if let Some(callback) = self.on_match_over.take() {
            callback(outcome);
        }
    }
}
