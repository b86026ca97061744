//! Game configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and limit settings shared by every room in a registry.
///
/// The defaults are the ones the game is tuned for; tests and demos
/// override individual fields with struct update syntax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Fraction of the round after which hint 1 is revealed.
    pub first_hint_at: f64,

    /// Fraction of the round after which hint 2 is revealed.
    pub second_hint_at: f64,

    /// Pause between a round ending and the next one starting.
    pub advance_delay: Duration,

    /// Pause between the last round ending and the game-over screen.
    pub finish_delay: Duration,

    /// How long a room with nobody online and no host is kept around.
    pub reap_grace: Duration,

    /// Shortest round a host may ask for, in seconds.
    pub min_round_secs: u32,

    /// Longest round a host may ask for, in seconds.
    pub max_round_secs: u32,

    /// Longest player name, in chars.
    pub max_name_len: usize,

    /// Capacity of each room actor's command channel.
    pub channel_size: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            first_hint_at: 0.5,
            second_hint_at: 0.75,
            advance_delay: Duration::from_secs(5),
            finish_delay: Duration::from_secs(3),
            reap_grace: Duration::from_secs(600),
            min_round_secs: 5,
            max_round_secs: 600,
            max_name_len: 20,
            channel_size: 64,
        }
    }
}

impl GameConfig {
    /// Clamps a requested round count to what the puzzle list allows.
    pub fn clamp_rounds(&self, requested: usize, puzzles: usize) -> usize {
        requested.clamp(1, puzzles.max(1))
    }

    /// Clamps a requested round length.
    pub fn clamp_round_secs(&self, requested: u32) -> u32 {
        requested.clamp(self.min_round_secs, self.max_round_secs)
    }

    /// Delays from round start to hint 1, hint 2, and round end.
    pub fn round_schedule(&self, round_secs: u32) -> [Duration; 3] {
        let total = Duration::from_secs(u64::from(round_secs));
        [
            total.mul_f64(self.first_hint_at),
            total.mul_f64(self.second_hint_at),
            total,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_config_default() {
        let config = GameConfig::default();
        assert_eq!(config.advance_delay, Duration::from_secs(5));
        assert_eq!(config.finish_delay, Duration::from_secs(3));
        assert_eq!(config.reap_grace, Duration::from_secs(600));
        assert_eq!(config.max_name_len, 20);
    }

    #[test]
    fn test_clamp_rounds_to_puzzle_count() {
        let config = GameConfig::default();
        assert_eq!(config.clamp_rounds(0, 4), 1);
        assert_eq!(config.clamp_rounds(3, 4), 3);
        assert_eq!(config.clamp_rounds(99, 4), 4);
    }

    #[test]
    fn test_clamp_round_secs_to_bounds() {
        let config = GameConfig::default();
        assert_eq!(config.clamp_round_secs(1), 5);
        assert_eq!(config.clamp_round_secs(30), 30);
        assert_eq!(config.clamp_round_secs(10_000), 600);
    }

    #[test]
    fn test_round_schedule_thirty_seconds() {
        let [hint1, hint2, end] = GameConfig::default().round_schedule(30);
        assert_eq!(hint1, Duration::from_secs(15));
        assert_eq!(hint2, Duration::from_millis(22_500));
        assert_eq!(end, Duration::from_secs(30));
    }
}
