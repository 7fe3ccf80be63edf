//! Session layer configuration.

use afkpool_reconnect::ReconnectConfig;

/// Settings shared by every session actor.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Reconnect delays per tier.
    pub reconnect: ReconnectConfig,

    /// Capacity of each session actor's command channel. Callers wait
    /// when it is full.
    pub command_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            command_buffer: 64,
        }
    }
}
