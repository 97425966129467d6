use crate::error::{PoolError, Result};

/// Smallest size class handed out by default: 64 bytes.
pub const DEFAULT_MIN_BUFFER_SIZE: usize = 64;

/// Largest pooled size class by default: 1 MiB.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// How the pool satisfies requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PoolStrategy {
    /// Recycle returned buffers through per-size-class free lists.
    #[default]
    Pooled,
    /// Allocate on every take and drop on every give.
    Unpooled,
}

/// Controls buffer pool sizing and retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Reuse strategy.
    pub strategy: PoolStrategy,
    /// Smallest size class. Must be a power of two.
    pub min_buffer_size: usize,
    /// Largest size class. Larger requests are allocated exactly and never retained.
    /// Must be a power of two.
    pub max_buffer_size: usize,
    /// Upper bound on the total capacity of idle buffers kept for reuse.
    pub max_pooled_bytes: usize,
    /// Upper bound on idle buffers kept per size class.
    pub max_buffers_per_class: usize,
}

impl PoolConfig {
    /// Configuration for a pool that never recycles.
    pub fn unpooled() -> Self {
        Self {
            strategy: PoolStrategy::Unpooled,
            ..Self::default()
        }
    }

    /// Check that the size class bounds are usable.
    pub fn validate(&self) -> Result<()> {
        if self.min_buffer_size == 0 || !self.min_buffer_size.is_power_of_two() {
            return Err(PoolError::InvalidConfig(format!(
                "min_buffer_size must be a non-zero power of two (got {})",
                self.min_buffer_size
            )));
        }
        if !self.max_buffer_size.is_power_of_two() {
            return Err(PoolError::InvalidConfig(format!(
                "max_buffer_size must be a power of two (got {})",
                self.max_buffer_size
            )));
        }
        if self.min_buffer_size > self.max_buffer_size {
            return Err(PoolError::InvalidConfig(format!(
                "min_buffer_size ({}) exceeds max_buffer_size ({})",
                self.min_buffer_size, self.max_buffer_size
            )));
        }
        Ok(())
    }

    /// Number of size classes between the configured bounds (inclusive).
    pub(crate) fn class_count(&self) -> usize {
        (self.max_buffer_size.trailing_zeros() - self.min_buffer_size.trailing_zeros()) as usize
            + 1
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            strategy: PoolStrategy::Pooled,
            min_buffer_size: DEFAULT_MIN_BUFFER_SIZE,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            max_pooled_bytes: 64 * 1024 * 1024,
            max_buffers_per_class: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = PoolConfig::default();
        cfg.validate().unwrap();
        // 64 B .. 1 MiB
        assert_eq!(cfg.class_count(), 15);
    }

    #[test]
    fn rejects_zero_min() {
        let cfg = PoolConfig {
            min_buffer_size: 0,
            ..PoolConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(PoolError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_non_power_of_two() {
        let cfg = PoolConfig {
            max_buffer_size: 1000,
            ..PoolConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(PoolError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_inverted_bounds() {
        let cfg = PoolConfig {
            min_buffer_size: 4096,
            max_buffer_size: 1024,
            ..PoolConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn single_class_when_bounds_match() {
        let cfg = PoolConfig {
            min_buffer_size: 256,
            max_buffer_size: 256,
            ..PoolConfig::default()
        };
        cfg.validate().unwrap();
        assert_eq!(cfg.class_count(), 1);
    }

    #[test]
    fn unpooled_keeps_default_bounds() {
        let cfg = PoolConfig::unpooled();
        assert_eq!(cfg.strategy, PoolStrategy::Unpooled);
        assert_eq!(cfg.max_buffer_size, DEFAULT_MAX_BUFFER_SIZE);
    }
}
