//! Transfer parameters.
//!
//! A [`TransferConfig`] is fixed for the lifetime of one transfer.  It is
//! validated once, up front, so a zero window or zero timeout never reaches
//! the round loop (a zero timeout would otherwise spin on immediate expiry).

use std::time::Duration;

use crate::error::ConfigError;

/// Window size used when none is given.
pub const DEFAULT_WINDOW_SIZE: usize = 5;

/// Per-round deadline used when none is given.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Sender-side knobs for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Maximum number of stream units sent per round.
    pub window_size: usize,
    /// How long the sender waits for a verdict before retrying the round.
    pub timeout: Duration,
    /// Consecutive timeouts/rejections of one round before the transfer is
    /// abandoned.  `None` (the default) retries forever.
    pub max_retries: Option<u32>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            timeout: DEFAULT_TIMEOUT,
            max_retries: None,
        }
    }
}

impl TransferConfig {
    /// Build and validate a config that retries each round indefinitely.
    pub fn new(window_size: usize, timeout: Duration) -> Result<Self, ConfigError> {
        let config = Self {
            window_size,
            timeout,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Replace the retry budget.
    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let c = TransferConfig::default();
        assert_eq!(c.validate(), Ok(()));
        assert_eq!(c.window_size, 5);
        assert_eq!(c.timeout, Duration::from_secs(2));
        assert_eq!(c.max_retries, None);
    }

    #[test]
    fn zero_window_rejected() {
        assert_eq!(
            TransferConfig::new(0, Duration::from_secs(1)),
            Err(ConfigError::ZeroWindow)
        );
    }

    #[test]
    fn zero_timeout_rejected() {
        assert_eq!(
            TransferConfig::new(4, Duration::ZERO),
            Err(ConfigError::ZeroTimeout)
        );
    }

    #[test]
    fn sub_second_timeout_is_fine() {
        let c = TransferConfig::new(3, Duration::from_millis(50)).unwrap();
        assert_eq!(c.timeout, Duration::from_millis(50));
    }

    #[test]
    fn retry_budget_is_opt_in() {
        let c = TransferConfig::new(3, Duration::from_secs(1)).unwrap();
        assert_eq!(c.max_retries, None);
        let c = c.with_max_retries(Some(4));
        assert_eq!(c.max_retries, Some(4));
        assert!(c.validate().is_ok());
    }
}
