// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// How the delay between retry attempts evolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Every retry waits the initial delay.
    Fixed,

    /// The delay doubles on every retry: the k-th retry waits `initial << k`.
    ///
    /// > **Note**: this is linear in name only - the name is kept for compatibility
    /// > with the scheme it was ported from, but the growth is geometric.
    Linear,

    /// The k-th retry (of `attempts` total) waits `initial * 2^(attempts - k)`:
    /// the longest delays come first and taper off as the budget runs out.
    Exponential,
}

/// Computes the delay to sleep after attempt `attempt` (1-based) has failed.
///
/// The result is capped by `remaining_budget`; overflowing shifts saturate.
pub(crate) fn next_delay(
    strategy: BackoffStrategy,
    initial_delay: Duration,
    attempt: u32,
    attempts: u32,
    remaining_budget: Duration,
) -> Duration {
    let delay = match strategy {
        BackoffStrategy::Fixed => initial_delay,
        BackoffStrategy::Linear => initial_delay.saturating_mul(pow2(attempt)),
        BackoffStrategy::Exponential => {
            initial_delay.saturating_mul(pow2(attempts.saturating_sub(attempt)))
        }
    };

    delay.min(remaining_budget)
}

fn pow2(exponent: u32) -> u32 {
    1_u32.checked_shl(exponent).unwrap_or(u32::MAX)
}
