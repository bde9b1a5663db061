//! Node configuration.

use crate::clock::SlotTiming;
use crate::consts::{
    CHANNEL_COUNT, CONTROL_SLOTS, DEFAULT_CHANNELS, MAX_CONNECTIONS, SYNC_INTERVAL_PERIODS,
};
use crate::crc::derive_sync_word;
use crate::error::Error;

/// Settings passed to [`start`](crate::node::start).
///
/// ```rust
/// use geode::config::Config;
///
/// let config = Config {
///     sync_word: geode::derive_sync_word(b"\x01\x02\x03\x04"),
///     connections: 8,
///     ..Config::default()
/// };
/// assert_eq!(config.period(), 11);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Config {
    /// Sync word of the network this master runs. Ignored by slaves, which
    /// take it from [`SlaveArgs`](crate::node::SlaveArgs).
    pub sync_word: u32,
    /// Number of connection slots a master serves.
    pub connections: u8,
    /// Hop channel frequencies (Hz), visited in order.
    pub channels: [u32; CHANNEL_COUNT],
    /// A master sends a `Sync` header every this many periods.
    pub sync_interval: u16,
    /// Slot geometry.
    pub timing: SlotTiming,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_word: derive_sync_word(&[]),
            connections: MAX_CONNECTIONS as u8,
            channels: DEFAULT_CHANNELS,
            sync_interval: SYNC_INTERVAL_PERIODS,
            timing: SlotTiming::new(),
        }
    }
}

impl Config {
    /// Period length in slots: three control slots plus one per connection.
    pub fn period(&self) -> u16 {
        CONTROL_SLOTS + u16::from(self.connections)
    }

    /// Checks the configuration of a master with `peers` receive buffers.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] if there are no connection slots, more slots than
    /// buffers or than [`MAX_CONNECTIONS`], a zero sync interval, or a sync word
    /// equal to the discovery word.
    pub fn validate(&self, peers: usize) -> Result<(), Error> {
        let connections = usize::from(self.connections);
        if connections == 0 || connections > peers || connections > MAX_CONNECTIONS {
            return Err(Error::InvalidConfig);
        }
        if self.sync_interval == 0 || self.sync_word == crate::consts::DISCOVERY_SYNC_WORD {
            return Err(Error::InvalidConfig);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_full_size() {
        let config = Config::default();
        assert_eq!(config.period(), 131);
        assert_eq!(config.validate(128), Ok(()));
        assert_eq!(config.validate(4), Err(Error::InvalidConfig));
    }

    #[test]
    fn test_validate_rejects_degenerate_settings() {
        let base = Config {
            connections: 4,
            ..Config::default()
        };
        assert_eq!(base.validate(4), Ok(()));
        let none = Config {
            connections: 0,
            ..base
        };
        assert_eq!(none.validate(4), Err(Error::InvalidConfig));
        let never_sync = Config {
            sync_interval: 0,
            ..base
        };
        assert_eq!(never_sync.validate(4), Err(Error::InvalidConfig));
        let discovery = Config {
            sync_word: crate::consts::DISCOVERY_SYNC_WORD,
            ..base
        };
        assert_eq!(discovery.validate(4), Err(Error::InvalidConfig));
    }
}
