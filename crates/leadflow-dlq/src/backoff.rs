// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry scheduling.

use chrono::{DateTime, Duration, Utc};

use leadflow_config::model::RetryConfig;

/// What to do with an entry after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { next_retry_at: DateTime<Utc> },
    GiveUp,
}

/// Stepped backoff indexed by retry count, clamped to the last step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    steps: Vec<Duration>,
    max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl BackoffPolicy {
    pub fn new(backoff_minutes: &[u64], max_retries: u32) -> Self {
        let steps = backoff_minutes
            .iter()
            .map(|&m| Duration::minutes(i64::try_from(m).unwrap_or(i64::MAX / 60_000)))
            .collect();
        Self { steps, max_retries }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(&config.backoff_minutes, config.max_retries)
    }

    /// Default attempt budget for new entries.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the attempt following `retry_count` failures.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let index = (retry_count as usize).min(self.steps.len().saturating_sub(1));
        self.steps.get(index).copied().unwrap_or_else(Duration::zero)
    }

    /// Schedule the next attempt for an entry that has failed `retry_count`
    /// times out of `max_retries`.
    pub fn decide(&self, retry_count: u32, max_retries: u32, now: DateTime<Utc>) -> RetryDecision {
        if retry_count >= max_retries {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry {
                next_retry_at: now + self.delay_for(retry_count),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn default_schedule_matches_configured_minutes() {
        let policy = BackoffPolicy::default();
        let minutes: Vec<i64> = (0..5).map(|n| policy.delay_for(n).num_minutes()).collect();
        assert_eq!(minutes, vec![1, 5, 15, 60, 240]);
        assert_eq!(policy.max_retries(), 5);
    }

    #[test]
    fn delay_is_clamped_to_last_step() {
        let policy = BackoffPolicy::new(&[2, 10], 8);
        assert_eq!(policy.delay_for(1).num_minutes(), 10);
        assert_eq!(policy.delay_for(7).num_minutes(), 10);
    }

    #[test]
    fn empty_schedule_retries_immediately() {
        let policy = BackoffPolicy::new(&[], 3);
        assert_eq!(policy.delay_for(0), Duration::zero());
    }

    #[test]
    fn decide_gives_up_at_max() {
        let policy = BackoffPolicy::default();
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 15, 0, 0).unwrap();

        assert_eq!(
            policy.decide(4, 5, now),
            RetryDecision::Retry {
                next_retry_at: now + Duration::minutes(240)
            }
        );
        assert_eq!(policy.decide(5, 5, now), RetryDecision::GiveUp);
        assert_eq!(policy.decide(1, 1, now), RetryDecision::GiveUp);
    }
}
