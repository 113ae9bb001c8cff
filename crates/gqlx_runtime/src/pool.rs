//! Process-wide pool of collectors.
//!
//! Collectors keep their write buffer and node arena between executions.
//! [`PoolConfig`] caps what is retained so one oversized response does not
//! pin its memory for the life of the process.

use crate::collector::Collector;
use std::sync::{Mutex, OnceLock, PoisonError};

/// Limits on retained collector allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Buffers with a larger capacity are dropped instead of pooled.
    pub max_buffer_bytes: usize,
    /// Node arenas with a larger capacity are dropped instead of pooled.
    pub max_nodes: usize,
    /// Maximum number of idle collectors kept.
    pub max_idle: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_buffer_bytes: 1 << 20,
            max_nodes: 1 << 14,
            max_idle: 64,
        }
    }
}

impl PoolConfig {
    pub const ENV_MAX_BUFFER_BYTES: &'static str = "GQLX_POOL_MAX_BUFFER_BYTES";
    pub const ENV_MAX_NODES: &'static str = "GQLX_POOL_MAX_NODES";
    pub const ENV_MAX_IDLE: &'static str = "GQLX_POOL_MAX_IDLE";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads limits from the environment, keeping defaults for unset or
    /// unparsable variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str, default: usize| match lookup(key) {
            None => default,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(key, value = %raw, "ignoring invalid pool limit");
                default
            }),
        };
        let defaults = Self::default();
        Self {
            max_buffer_bytes: read(Self::ENV_MAX_BUFFER_BYTES, defaults.max_buffer_bytes),
            max_nodes: read(Self::ENV_MAX_NODES, defaults.max_nodes),
            max_idle: read(Self::ENV_MAX_IDLE, defaults.max_idle),
        }
    }

    #[must_use]
    pub fn with_max_buffer_bytes(mut self, bytes: usize) -> Self {
        self.max_buffer_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_max_nodes(mut self, nodes: usize) -> Self {
        self.max_nodes = nodes;
        self
    }

    #[must_use]
    pub fn with_max_idle(mut self, idle: usize) -> Self {
        self.max_idle = idle;
        self
    }

    fn retains(&self, collector: &Collector) -> bool {
        collector.buffer_capacity() <= self.max_buffer_bytes
            && collector.node_capacity() <= self.max_nodes
    }
}

static CONFIG: OnceLock<PoolConfig> = OnceLock::new();
static IDLE: Mutex<Vec<Collector>> = Mutex::new(Vec::new());

/// Installs the pool limits. Only the first call takes effect; returns
/// whether this call installed `config`.
pub fn configure(config: PoolConfig) -> bool {
    let installed = CONFIG.set(config).is_ok();
    if installed {
        tracing::debug!(?config, "collector pool configured");
    }
    installed
}

/// The active limits. Defaults apply when [`configure`] was never called.
pub fn config() -> &'static PoolConfig {
    CONFIG.get_or_init(PoolConfig::default)
}

/// Number of idle collectors currently pooled.
pub fn idle_count() -> usize {
    IDLE.lock().unwrap_or_else(PoisonError::into_inner).len()
}

pub(crate) fn acquire() -> Collector {
    IDLE.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop()
        .unwrap_or_default()
}

pub(crate) fn release(mut collector: Collector) {
    let config = config();
    if !config.retains(&collector) {
        return;
    }
    collector.reset();
    let mut idle = IDLE.lock().unwrap_or_else(PoisonError::into_inner);
    if idle.len() < config.max_idle {
        idle.push(collector);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_lookup() {
        let config = PoolConfig::from_lookup(|key| match key {
            PoolConfig::ENV_MAX_NODES => Some("128".into()),
            PoolConfig::ENV_MAX_IDLE => Some("lots".into()),
            _ => None,
        });
        assert_eq!(config.max_nodes, 128);
        assert_eq!(config.max_idle, PoolConfig::default().max_idle);
        assert_eq!(
            config.max_buffer_bytes,
            PoolConfig::default().max_buffer_bytes
        );
    }

    #[test]
    fn test_oversized_collectors_are_not_retained() {
        let config = PoolConfig::new().with_max_buffer_bytes(16).with_max_nodes(4);
        let mut collector = Collector::new();
        let root = collector.root();
        collector.set_string(root, "a string longer than sixteen bytes");
        assert!(!config.retains(&collector));
        assert!(config.retains(&Collector::new()));
    }

    #[test]
    fn test_acquire_returns_a_clean_collector() {
        let mut collector = acquire();
        let root = collector.root();
        collector.set_int(root, 1);
        release(collector);
        let collector = acquire();
        assert!(collector.is_empty());
    }
}
