//! Tunables recognized by the transport (spec.md §6), collected behind a
//! builder the way the teacher's `core::client::ClientConfig` is assembled.

/// Hard cap on a single frame's `total_length` before the sender must split
/// the payload into `Partial` fragments. Default 1 MiB.
pub const DEFAULT_MAX_MESSAGE_LENGTH: u32 = 1 << 20;

/// Deadline for the full four-message handshake. Default 30 seconds.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 30_000;

/// Server-advertised keepalive period; zero disables keepalive pings.
/// Default 5 seconds.
pub const DEFAULT_PING_INTERVAL_MS: u64 = 5_000;

/// Bound on the reusable send-buffer pool, scaled by the number of
/// available CPUs at the call site (`10 * cpu_count`).
pub const DEFAULT_BUFFER_POOL_MULTIPLIER: usize = 10;

/// Transport-wide configuration, constructed via [`TempestConfig::builder`].
///
/// Every field has a spec-mandated default (spec.md §6), so
/// `TempestConfig::default()` is itself a valid, fully-functional
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempestConfig {
    max_message_length: u32,
    handshake_timeout_ms: u64,
    ping_interval_ms: u64,
    buffer_pool_limit: usize,
    require_encryption: bool,
}

impl Default for TempestConfig {
    fn default() -> Self {
        Self {
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            ping_interval_ms: DEFAULT_PING_INTERVAL_MS,
            buffer_pool_limit: DEFAULT_BUFFER_POOL_MULTIPLIER
                * std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
            require_encryption: true,
        }
    }
}

impl TempestConfig {
    /// Starts building a configuration away from the defaults.
    #[must_use]
    pub fn builder() -> TempestConfigBuilder {
        TempestConfigBuilder::default()
    }

    /// Hard cap on a single frame's `total_length`.
    #[must_use]
    pub const fn max_message_length(&self) -> u32 {
        self.max_message_length
    }

    /// Deadline, in milliseconds, for the four-message handshake.
    #[must_use]
    pub const fn handshake_timeout_ms(&self) -> u64 {
        self.handshake_timeout_ms
    }

    /// Keepalive ping period in milliseconds; `0` disables keepalive.
    #[must_use]
    pub const fn ping_interval_ms(&self) -> u64 {
        self.ping_interval_ms
    }

    /// Bound on the reusable send-buffer pool.
    #[must_use]
    pub const fn buffer_pool_limit(&self) -> usize {
        self.buffer_pool_limit
    }

    /// Whether post-handshake frames lacking both `encrypted` and
    /// `authenticated` flags must be rejected.
    #[must_use]
    pub const fn require_encryption(&self) -> bool {
        self.require_encryption
    }
}

/// Builder for [`TempestConfig`]. Unset fields keep the spec default.
#[derive(Debug, Clone, Copy, Default)]
pub struct TempestConfigBuilder {
    inner: OverrideSet,
}

#[derive(Debug, Clone, Copy, Default)]
struct OverrideSet {
    max_message_length: Option<u32>,
    handshake_timeout_ms: Option<u64>,
    ping_interval_ms: Option<u64>,
    buffer_pool_limit: Option<usize>,
    require_encryption: Option<bool>,
}

impl TempestConfigBuilder {
    /// Overrides `max_message_length`.
    #[must_use]
    pub const fn max_message_length(mut self, value: u32) -> Self {
        self.inner.max_message_length = Some(value);
        self
    }

    /// Overrides `handshake_timeout_ms`.
    #[must_use]
    pub const fn handshake_timeout_ms(mut self, value: u64) -> Self {
        self.inner.handshake_timeout_ms = Some(value);
        self
    }

    /// Overrides `ping_interval_ms`. `0` disables the keepalive.
    #[must_use]
    pub const fn ping_interval_ms(mut self, value: u64) -> Self {
        self.inner.ping_interval_ms = Some(value);
        self
    }

    /// Overrides `buffer_pool_limit`.
    #[must_use]
    pub const fn buffer_pool_limit(mut self, value: usize) -> Self {
        self.inner.buffer_pool_limit = Some(value);
        self
    }

    /// Overrides `require_encryption`.
    #[must_use]
    pub const fn require_encryption(mut self, value: bool) -> Self {
        self.inner.require_encryption = Some(value);
        self
    }

    /// Finalizes the builder, falling back to spec defaults for anything
    /// left unset.
    #[must_use]
    pub fn build(self) -> TempestConfig {
        let defaults = TempestConfig::default();
        TempestConfig {
            max_message_length: self.inner.max_message_length.unwrap_or(defaults.max_message_length),
            handshake_timeout_ms: self
                .inner
                .handshake_timeout_ms
                .unwrap_or(defaults.handshake_timeout_ms),
            ping_interval_ms: self.inner.ping_interval_ms.unwrap_or(defaults.ping_interval_ms),
            buffer_pool_limit: self.inner.buffer_pool_limit.unwrap_or(defaults.buffer_pool_limit),
            require_encryption: self.inner.require_encryption.unwrap_or(defaults.require_encryption),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = TempestConfig::default();
        assert_eq!(config.max_message_length(), 1 << 20);
        assert_eq!(config.handshake_timeout_ms(), 30_000);
        assert_eq!(config.ping_interval_ms(), 5_000);
        assert!(config.require_encryption());
    }

    #[test]
    fn builder_overrides_only_touched_fields() {
        let config = TempestConfig::builder().ping_interval_ms(0).build();
        assert_eq!(config.ping_interval_ms(), 0);
        assert_eq!(config.handshake_timeout_ms(), 30_000);
    }
}
