use std::time::Duration;

/// Configuration for a workflow synchronizer.
///
/// Use [`SyncConfig::builder()`] for ergonomic construction, or
/// [`SyncConfig::default()`] for the reference cadence (0.5 s while a step
/// is running, 10 s otherwise, WebSocket enabled).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Poll interval while any step is running.
    pub active_poll_interval: Duration,

    /// Poll interval while the pipeline is idle, and after failed fetches.
    pub idle_poll_interval: Duration,

    /// Whether to open the WebSocket event stream. When false the
    /// synchronizer is poll-only.
    pub connect_events: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            active_poll_interval: Duration::from_millis(500),
            idle_poll_interval: Duration::from_secs(10),
            connect_events: true,
        }
    }
}

impl SyncConfig {
    /// Start building a config with the builder pattern.
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }
}

/// Builder for [`SyncConfig`].
#[derive(Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// Set the poll interval used while any step is running.
    pub fn with_active_poll_interval(mut self, interval: Duration) -> Self {
        self.config.active_poll_interval = interval;
        self
    }

    /// Set the poll interval used while the pipeline is idle.
    pub fn with_idle_poll_interval(mut self, interval: Duration) -> Self {
        self.config.idle_poll_interval = interval;
        self
    }

    /// Disable the WebSocket event stream (poll-only operation).
    pub fn without_events(mut self) -> Self {
        self.config.connect_events = false;
        self
    }

    /// Build the final [`SyncConfig`].
    pub fn build(self) -> SyncConfig {
        self.config
    }
}
