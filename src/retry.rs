//! Bounded retry for fallible async operations.
//!
//! Attempts are numbered from 1. Every attempt but the last swallows its
//! error, logs it and sleeps; the last attempt's error is returned to the
//! caller. The sleep is either a fixed interval or a fresh random draw in
//! `[min_seconds, max_seconds]` before each wait.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_MIN_SECONDS: u64 = 10;
pub const DEFAULT_MAX_SECONDS: u64 = 20;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RetryError {
    #[error("The minSeconds should be less than or equal to the maxSeconds")]
    InvalidBounds { min_seconds: u64, max_seconds: u64 },
    #[error("minSeconds and maxSeconds cannot be undefined when attemptsInterval isn't provided")]
    MissingInterval,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub min_seconds: Option<u64>,
    pub max_seconds: Option<u64>,
    pub fixed_interval_seconds: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_seconds: Some(DEFAULT_MIN_SECONDS),
            max_seconds: Some(DEFAULT_MAX_SECONDS),
            fixed_interval_seconds: None,
        }
    }
}

impl RetryConfig {
    pub fn fixed(max_attempts: u32, interval_seconds: u64) -> Self {
        Self {
            max_attempts,
            min_seconds: None,
            max_seconds: None,
            fixed_interval_seconds: Some(interval_seconds),
        }
    }
}

/// Source of the random wait between attempts.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait RandomSource: Send + Sync {
    /// Uniform integer in `min..=max`.
    fn seconds_between(&self, min: u64, max: u64) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn seconds_between(&self, min: u64, max: u64) -> u64 {
        rand::rng().random_range(min..=max)
    }
}

pub struct RetryHelper {
    config: RetryConfig,
    random: Arc<dyn RandomSource>,
}

impl std::fmt::Debug for RetryHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryHelper").field("config", &self.config).finish()
    }
}

impl RetryHelper {
    pub fn new(config: RetryConfig) -> Result<Self, RetryError> {
        Self::with_random(config, Arc::new(ThreadRandom))
    }

    /// Fails when both bounds are given and `min_seconds > max_seconds`.
    pub fn with_random(config: RetryConfig, random: Arc<dyn RandomSource>) -> Result<Self, RetryError> {
        if let (Some(min_seconds), Some(max_seconds)) = (config.min_seconds, config.max_seconds) {
            if min_seconds > max_seconds {
                return Err(RetryError::InvalidBounds {
                    min_seconds,
                    max_seconds,
                });
            }
        }
        Ok(Self { config, random })
    }

    pub async fn execute<T, E, F, Fut>(&self, mut action: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<RetryError> + Display,
    {
        let mut attempt = 1;
        while attempt < self.config.max_attempts {
            match action().await {
                Ok(value) => return Ok(value),
                Err(e) => info!("{}", e),
            }

            let seconds = self.sleep_amount()?;
            info!("Waiting {} seconds before trying again", seconds);
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            attempt += 1;
        }

        debug!(attempt, "Final attempt");
        action().await
    }

    fn sleep_amount(&self) -> Result<u64, RetryError> {
        if let Some(interval) = self.config.fixed_interval_seconds {
            return Ok(interval);
        }
        match (self.config.min_seconds, self.config.max_seconds) {
            (Some(min), Some(max)) => Ok(self.random.seconds_between(min, max)),
            _ => Err(RetryError::MissingInterval),
        }
    }
}

/// Three attempts with 10 to 20 second waits.
pub async fn execute_with_defaults<T, E, F, Fut>(action: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<RetryError> + Display,
{
    RetryHelper::new(RetryConfig::default())?.execute(action).await
}
