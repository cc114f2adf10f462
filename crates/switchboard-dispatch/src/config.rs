//! Dispatch engine settings.

use std::time::Duration;

/// Settings for a [`DispatchEngine`](crate::DispatchEngine).
///
/// ```rust,ignore
/// let config = DispatchConfig::new()
///     .with_blocked_users([1001, 1002])
///     .with_send_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Users whose updates are dropped before any routing.
    pub blocked_users: Vec<i64>,
    /// Upper bound for a single channel send; `None` waits indefinitely.
    pub send_timeout: Option<Duration>,
    /// Capacity of every registered update channel (at least 1).
    pub channel_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            blocked_users: Vec::new(),
            send_timeout: None,
            channel_capacity: 1,
        }
    }
}

impl DispatchConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the block list.
    pub fn with_blocked_users(mut self, users: impl IntoIterator<Item = i64>) -> Self {
        self.blocked_users = users.into_iter().collect();
        self
    }

    /// Bounds every channel send by `timeout`.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Sets the channel capacity; values below 1 are raised to 1.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}
