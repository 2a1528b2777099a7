//! Elo rating updates applied after every decided match

/// Maximum rating swing per match
pub const K_FACTOR: f64 = 32.0;

/// Probability that a player rated `a` beats one rated `b`
pub fn expected(a: i32, b: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf(f64::from(b - a) / 400.0))
}

/// Rating movement for both sides of a decided match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingChange {
    pub winner_delta: i32,
    pub loser_delta: i32,
    pub winner_new: i32,
    pub loser_new: i32,
}

impl RatingChange {
    /// Compute the update for `winner` beating `loser`.
    /// The loser's new rating never drops below zero.
    pub fn decided(winner: i32, loser: i32) -> Self {
        let winner_delta = (K_FACTOR * (1.0 - expected(winner, loser))).round() as i32;
        let loser_delta = (K_FACTOR * (0.0 - expected(loser, winner))).round() as i32;

        Self {
            winner_delta,
            loser_delta,
            winner_new: winner + winner_delta,
            loser_new: (loser + loser_delta).max(0),
        }
    }
}

/// New ratings for `(a, b)` given the winner, if any. A draw leaves both unchanged.
pub fn apply(a: i32, b: i32, a_won: Option<bool>) -> (i32, i32) {
    match a_won {
        Some(true) => {
            let change = RatingChange::decided(a, b);
            (change.winner_new, change.loser_new)
        }
        Some(false) => {
            let change = RatingChange::decided(b, a);
            (change.loser_new, change.winner_new)
        }
        None => (a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_ratings_move_sixteen_points() {
        let change = RatingChange::decided(1000, 1000);
        assert_eq!(change.winner_delta, 16);
        assert_eq!(change.loser_delta, -16);
        assert_eq!(change.winner_new, 1016);
        assert_eq!(change.loser_new, 984);
    }

    #[test]
    fn expected_scores_sum_to_one() {
        let e = expected(1200, 1000) + expected(1000, 1200);
        assert!((e - 1.0).abs() < 1e-12);
        assert!(expected(1200, 1000) > 0.5);
    }

    #[test]
    fn deltas_are_signed_and_nearly_symmetric() {
        for winner in (0..3000).step_by(137) {
            for loser in (0..3000).step_by(211) {
                let change = RatingChange::decided(winner, loser);
                assert!(change.winner_delta >= 0, "{winner} vs {loser}");
                assert!(change.loser_delta <= 0, "{winner} vs {loser}");
                assert!((change.winner_delta + change.loser_delta).abs() <= 1);
                assert!(change.loser_new >= 0);
            }
        }
    }

    #[test]
    fn loser_rating_is_floored_at_zero() {
        let change = RatingChange::decided(10, 5);
        assert_eq!(change.loser_new, 0);
    }

    #[test]
    fn upset_win_is_worth_more() {
        let upset = RatingChange::decided(900, 1300);
        let expected_win = RatingChange::decided(1300, 900);
        assert!(upset.winner_delta > expected_win.winner_delta);
        assert_eq!(upset.winner_delta, 29);
    }

    #[test]
    fn draw_changes_nothing() {
        assert_eq!(apply(1100, 950, None), (1100, 950));
        assert_eq!(apply(1000, 1000, Some(false)), (984, 1016));
    }
}
