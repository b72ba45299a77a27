//! Reconciliation runtime configuration

use lodestar_core::{LodestarError, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// Retry
// =============================================================================

/// Backoff for whole passes that fail on a retryable store error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay_ms: u64,
    /// Cap on any single delay
    pub max_delay_ms: u64,
    /// Add up to 10% random jitter
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Exponential policy matching this configuration
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::exponential()
            .with_max_attempts(self.max_attempts)
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_jitter(self.jitter)
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Reconciliation engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Upper bound on devices pushed at once
    pub max_concurrent_pushes: usize,

    /// Re-read devices after a successful push so `actual` tracks `applied`
    pub refresh_actual_after_push: bool,

    /// Deadline for one device write or read
    pub push_timeout_ms: u64,

    /// Pass-level retry
    pub retry: RetryConfig,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_concurrent_pushes: 8,
            refresh_actual_after_push: true,
            push_timeout_ms: 30_000,
            retry: RetryConfig::default(),
        }
    }
}

impl ReconcileConfig {
    /// Push deadline as a duration
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), LodestarError> {
        if self.max_concurrent_pushes == 0 {
            return Err(LodestarError::configuration(
                "reconcile.max_concurrent_pushes must be at least 1",
            ));
        }
        if self.push_timeout_ms == 0 {
            return Err(LodestarError::configuration(
                "reconcile.push_timeout_ms must be at least 1",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(LodestarError::configuration(
                "reconcile.retry.max_attempts must be at least 1",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Drift
// =============================================================================

/// Periodic drift detection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Seconds between sync rounds in watch mode
    pub interval_secs: u64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl DriftConfig {
    /// Interval as a duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Reject a zero interval
    pub fn validate(&self) -> Result<(), LodestarError> {
        if self.interval_secs == 0 {
            return Err(LodestarError::configuration(
                "drift.interval_secs must be at least 1",
            ));
        }
        Ok(())
    }
}
