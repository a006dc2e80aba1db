//! Retry with a fixed back-off.
//!
//! Every blocking wait in the node (association, sensor bring-up, gas sensor
//! warm-up) is a variation of "try, wait a fixed interval, try again", either
//! forever or up to a bound. This module is that policy, independent of the
//! timer behind the [`DelayNs`] implementation.

use embedded_hal_async::delay::DelayNs;

/// How often and how long to retry an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between a failed attempt and the next one.
    pub interval_ms: u32,
    /// `None` retries until the operation succeeds.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub const fn unbounded(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            max_attempts: None,
        }
    }

    pub const fn bounded(interval_ms: u32, max_attempts: u32) -> Self {
        Self {
            interval_ms,
            max_attempts: Some(max_attempts),
        }
    }

    fn exhausted_after(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }
}

/// Returned when a bounded policy runs out of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted<E> {
    pub attempts: u32,
    /// Error of the final attempt.
    pub last: E,
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// `op` receives the 1-based attempt number. No delay follows the final
/// attempt of a bounded policy.
pub async fn retry<T, E, D, F>(
    policy: RetryPolicy,
    delay: &mut D,
    mut op: F,
) -> Result<T, Exhausted<E>>
where
    D: DelayNs,
    F: AsyncFnMut(u32) -> Result<T, E>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(last) => {
                if policy.exhausted_after(attempt) {
                    return Err(Exhausted {
                        attempts: attempt,
                        last,
                    });
                }
                if policy.interval_ms > 0 {
                    delay.delay_ms(policy.interval_ms).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDelay;
    use embassy_futures::block_on;

    #[test]
    fn test_succeeds_on_first_attempt_without_waiting() {
        let mut delay = MockDelay::default();
        let result: Result<u8, Exhausted<()>> =
            block_on(retry(RetryPolicy::bounded(100, 3), &mut delay, async |_| Ok(7)));

        assert_eq!(result, Ok(7));
        assert!(delay.calls.is_empty());
    }

    #[test]
    fn test_unbounded_retries_until_success() {
        let mut delay = MockDelay::default();
        let result: Result<u32, Exhausted<&str>> = block_on(retry(
            RetryPolicy::unbounded(500),
            &mut delay,
            async |attempt| if attempt < 40 { Err("not yet") } else { Ok(attempt) },
        ));

        assert_eq!(result, Ok(40));
        assert_eq!(delay.calls.len(), 39);
        assert_eq!(delay.total_ms(), 39 * 500);
    }

    #[test]
    fn test_bounded_reports_last_error_and_skips_trailing_delay() {
        let mut delay = MockDelay::default();
        let result: Result<(), Exhausted<u32>> = block_on(retry(
            RetryPolicy::bounded(10, 4),
            &mut delay,
            async |attempt| Err(attempt * 2),
        ));

        assert_eq!(
            result,
            Err(Exhausted {
                attempts: 4,
                last: 8
            })
        );
        assert_eq!(delay.calls, vec![10, 10, 10]);
    }

    #[test]
    fn test_zero_interval_never_touches_delay() {
        let mut delay = MockDelay::default();
        let result: Result<(), Exhausted<()>> =
            block_on(retry(RetryPolicy::bounded(0, 5), &mut delay, async |_| Err(())));

        assert_eq!(result.unwrap_err().attempts, 5);
        assert!(delay.calls.is_empty());
    }
}
