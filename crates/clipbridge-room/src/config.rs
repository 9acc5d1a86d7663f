//! Relay configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the room registry, relay, and expiry sweeper.
///
/// Every field has a default; deserializing a partial document fills the
/// rest from [`RelayConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Number of characters in a room code.
    pub code_length: usize,

    /// Characters room codes are drawn from. Normalized to uppercase.
    pub code_alphabet: String,

    /// How many random codes to try before giving up with
    /// [`RoomError::Exhausted`](crate::RoomError::Exhausted).
    pub max_code_attempts: u32,

    /// How long an empty room may stay idle before it is evicted.
    pub room_ttl: Duration,

    /// How often the sweeper scans for expired rooms.
    pub sweep_interval: Duration,

    /// Per-connection outbound queue bound. A member whose queue is full
    /// when a broadcast arrives is dropped from the room.
    pub outbound_queue: usize,

    /// Maximum members per room. `None` means unlimited.
    pub max_members: Option<usize>,

    /// Largest payload, in bytes, that will be relayed.
    pub max_payload_bytes: usize,

    /// Command channel size for each room actor.
    pub command_channel_size: usize,

    /// Replay the room's last payload to a device right after it joins.
    pub replay_last_payload: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            code_alphabet: Self::DEFAULT_ALPHABET.to_string(),
            max_code_attempts: 64,
            room_ttl: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
            outbound_queue: 64,
            max_members: None,
            max_payload_bytes: 256 * 1024,
            command_channel_size: 64,
            replay_last_payload: true,
        }
    }
}

impl RelayConfig {
    /// Uppercase alphanumerics without the look-alikes `0 O 1 I L`.
    pub const DEFAULT_ALPHABET: &'static str =
        "ABCDEFGHJKMNPQRSTUVWXYZ23456789";

    /// Fixes out-of-range values so the config is safe to use.
    ///
    /// Called by [`RoomRegistry::new`](crate::RoomRegistry::new). Rules:
    /// - the alphabet is uppercased, stripped of non-alphanumerics and
    ///   duplicates; fewer than two symbols falls back to the default.
    /// - zero lengths, sizes, attempts and durations fall back to defaults
    ///   (tokio channels and intervals reject zero).
    /// - `max_members == Some(0)` is treated as unlimited.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();

        let mut alphabet = String::with_capacity(self.code_alphabet.len());
        for c in self.code_alphabet.chars() {
            let c = c.to_ascii_uppercase();
            if c.is_ascii_alphanumeric() && !alphabet.contains(c) {
                alphabet.push(c);
            }
        }
        if alphabet.len() < 2 {
            tracing::warn!(
                alphabet = %self.code_alphabet,
                "room code alphabet needs at least two symbols, using default"
            );
            alphabet = defaults.code_alphabet.clone();
        }
        self.code_alphabet = alphabet;

        if self.code_length == 0 {
            tracing::warn!("code_length is 0, using default");
            self.code_length = defaults.code_length;
        }
        if self.max_code_attempts == 0 {
            self.max_code_attempts = defaults.max_code_attempts;
        }
        if self.sweep_interval.is_zero() {
            tracing::warn!("sweep_interval is 0, using default");
            self.sweep_interval = defaults.sweep_interval;
        }
        if self.outbound_queue == 0 {
            self.outbound_queue = defaults.outbound_queue;
        }
        if self.command_channel_size == 0 {
            self.command_channel_size = defaults.command_channel_size;
        }
        if self.max_payload_bytes == 0 {
            self.max_payload_bytes = defaults.max_payload_bytes;
        }
        if self.max_members == Some(0) {
            tracing::warn!("max_members is 0, treating as unlimited");
            self.max_members = None;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_config_default() {
        let config = RelayConfig::default();
        assert_eq!(config.code_length, 6);
        assert_eq!(config.room_ttl, Duration::from_secs(86_400));
        assert_eq!(config.max_members, None);
        assert_eq!(config.max_payload_bytes, 262_144);
        assert!(config.replay_last_payload);
    }

    #[test]
    fn test_default_alphabet_has_no_confusable_characters() {
        for c in ['0', 'O', '1', 'I', 'L'] {
            assert!(!RelayConfig::DEFAULT_ALPHABET.contains(c), "{c}");
        }
    }

    #[test]
    fn test_validated_normalizes_alphabet() {
        let config = RelayConfig {
            code_alphabet: "abcabc-12".into(),
            ..RelayConfig::default()
        }
        .validated();
        assert_eq!(config.code_alphabet, "ABC12");
    }

    #[test]
    fn test_validated_rejects_degenerate_alphabet() {
        let config = RelayConfig {
            code_alphabet: "aaaa".into(),
            ..RelayConfig::default()
        }
        .validated();
        assert_eq!(config.code_alphabet, RelayConfig::DEFAULT_ALPHABET);
    }

    #[test]
    fn test_validated_replaces_zero_values() {
        let config = RelayConfig {
            code_length: 0,
            sweep_interval: Duration::ZERO,
            outbound_queue: 0,
            command_channel_size: 0,
            max_members: Some(0),
            ..RelayConfig::default()
        }
        .validated();
        let defaults = RelayConfig::default();
        assert_eq!(config.code_length, defaults.code_length);
        assert_eq!(config.sweep_interval, defaults.sweep_interval);
        assert_eq!(config.outbound_queue, defaults.outbound_queue);
        assert_eq!(config.command_channel_size, defaults.command_channel_size);
        assert_eq!(config.max_members, None);
    }

    #[test]
    fn test_validated_keeps_sane_values() {
        let config = RelayConfig {
            max_members: Some(3),
            room_ttl: Duration::from_secs(60),
            ..RelayConfig::default()
        };
        assert_eq!(config.clone().validated(), config);
    }
}
