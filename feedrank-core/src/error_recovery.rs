//! Recovery policy for failures raised while building a feed.
//!
//! Caller mistakes are surfaced, transient data-access failures are retried,
//! and everything else degrades to the non-personalized fallback feed.

use crate::{ErrorExt, FeedError};

/// Recovery strategy for handling errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Retry the operation with exponential backoff
    RetryWithBackoff,
    /// Serve the degraded fallback feed
    Fallback,
    /// Surface the error to the caller
    Fail,
}

/// Outcome of resolving a feed request against the recovery policy
#[derive(Debug)]
pub enum RecoveryResult<T> {
    /// The personalized path produced a value
    Recovered(T),
    /// The personalized path failed and a degraded value was produced instead
    Degraded(T),
    /// The error must be propagated
    Failed(FeedError),
}

impl<T> RecoveryResult<T> {
    /// Returns true if the operation was successfully recovered
    pub fn is_recovered(&self) -> bool {
        matches!(self, RecoveryResult::Recovered(_))
    }

    /// Returns true if the operation continued with degraded functionality
    pub fn is_degraded(&self) -> bool {
        matches!(self, RecoveryResult::Degraded(_))
    }

    /// Returns true if the operation failed and error should be propagated
    pub fn is_failed(&self) -> bool {
        matches!(self, RecoveryResult::Failed(_))
    }

    pub fn into_result(self) -> Result<T, FeedError> {
        match self {
            RecoveryResult::Recovered(value) | RecoveryResult::Degraded(value) => Ok(value),
            RecoveryResult::Failed(error) => Err(error),
        }
    }
}

pub struct ErrorRecovery;

impl ErrorRecovery {
    /// Determine the appropriate recovery strategy for a given error
    pub fn determine_strategy(error: &FeedError) -> RecoveryStrategy {
        if error.is_client_error() {
            return RecoveryStrategy::Fail;
        }
        if error.is_retryable() {
            return RecoveryStrategy::RetryWithBackoff;
        }
        RecoveryStrategy::Fallback
    }

    /// Strategy once retries are exhausted: never retry again.
    pub fn after_retries(error: &FeedError) -> RecoveryStrategy {
        match Self::determine_strategy(error) {
            RecoveryStrategy::RetryWithBackoff => RecoveryStrategy::Fallback,
            other => other,
        }
    }
}
