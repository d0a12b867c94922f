//! Engine configuration.

use serde::Deserialize;
use thiserror::Error;

/// How `/sub` requests are authenticated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Any client may attach to any channel.
    #[default]
    None,
    /// Clients must present the channel token issued by `sign`.
    Token,
}

/// Tunables for the channel engine.
///
/// The idle budgets used by the sweeper are derived from the timeouts and
/// the check interval ([`EngineConfig::channel_idles`],
/// [`EngineConfig::polling_idles`]) rather than stored.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of preallocated channel slots.
    pub max_channels: usize,

    /// Parked subscribers allowed per channel.
    pub max_subscribers_per_channel: usize,

    /// Recent messages retained per channel for resume.
    pub max_messages: usize,

    /// Seconds an unsubscribed channel survives without a re-sign.
    pub channel_timeout: u32,

    /// Seconds a parked poll is held before a keep-alive noop.
    pub polling_timeout: u32,

    /// Sweeper period in seconds; one idle tick.
    pub channel_check_interval: u32,

    /// Authentication mode for `/sub`.
    pub auth: AuthMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_channels: 10_000,
            max_subscribers_per_channel: 64,
            max_messages: 8,
            channel_timeout: 120,
            polling_timeout: 60,
            channel_check_interval: 4,
            auth: AuthMode::None,
        }
    }
}

/// Problem with an [`EngineConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `max_channels` was zero.
    #[error("max_channels must be non-zero")]
    NoChannels,

    /// `max_subscribers_per_channel` was zero.
    #[error("max_subscribers_per_channel must be non-zero")]
    NoSubscribers,

    /// `max_messages` was zero.
    #[error("max_messages must be non-zero")]
    NoMessages,

    /// `channel_check_interval` was zero.
    #[error("channel_check_interval must be non-zero")]
    ZeroInterval,
}

impl EngineConfig {
    /// Idle budget of an unsubscribed channel, in sweeper ticks.
    #[must_use]
    pub const fn channel_idles(&self) -> i32 {
        (self.channel_timeout / self.channel_check_interval) as i32
    }

    /// Idle budget of a parked poll, in sweeper ticks.
    #[must_use]
    pub const fn polling_idles(&self) -> i32 {
        (self.polling_timeout / self.channel_check_interval) as i32
    }

    /// Check the limits that must be non-zero for the engine to operate.
    ///
    /// # Errors
    ///
    /// Returns the first zero-valued limit found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_channels == 0 {
            return Err(ConfigError::NoChannels);
        }
        if self.max_subscribers_per_channel == 0 {
            return Err(ConfigError::NoSubscribers);
        }
        if self.max_messages == 0 {
            return Err(ConfigError::NoMessages);
        }
        if self.channel_check_interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}
