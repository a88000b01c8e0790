//! Transient-failure retry policy (spec.md §4.10): up to 2 retries with
//! exponential backoff, base 30s, for stage failures whose exit code is in a
//! small configured retry set.

use std::time::Duration;

use recon_models::ReconError;

/// Exit codes the external toolchain is known to use for transient
/// conditions (resource contention, signal-induced termination) rather than
/// a genuine modeling failure.
const RETRYABLE_EXIT_CODES: [i32; 3] = [1, 124, 137];

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay: Duration::from_secs(30) }
    }
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Whether `error` is a transient condition this policy should retry
    /// (spec.md §7: `StageFailed` with a retriable exit code, or `IoError`).
    pub fn is_retryable(&self, error: &ReconError) -> bool {
        match error {
            ReconError::StageFailed { exit_code: Some(code), .. } => RETRYABLE_EXIT_CODES.contains(code),
            ReconError::IoError { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_models::StageKind;

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy { max_retries: 2, base_delay: Duration::from_secs(30) };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(120));
    }

    #[test]
    fn only_configured_exit_codes_are_retryable() {
        let policy = RetryPolicy::default();
        let retryable = ReconError::StageFailed { stage: StageKind::Features, exit_code: Some(1), tail: String::new() };
        let not_retryable = ReconError::StageFailed { stage: StageKind::Features, exit_code: Some(42), tail: String::new() };
        assert!(policy.is_retryable(&retryable));
        assert!(!policy.is_retryable(&not_retryable));
        assert!(!policy.is_retryable(&ReconError::StageCancelled));
    }
}
