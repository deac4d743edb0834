// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Daily reimport scheduling.
//!
//! Pure duration math over an injected "now", so the worker loop can be
//! tested against a virtual clock.

use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use rand::Rng;

/// Duration from `now` until the next daily occurrence of `at` (UTC),
/// plus `jitter`. If today's occurrence is already past (or exactly now),
/// the next one is tomorrow's.
#[must_use]
pub fn until_next_daily(now: DateTime<Utc>, at: NaiveTime, jitter: Duration) -> Duration {
    let today = now.date_naive().and_time(at).and_utc();
    let next = if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    };
    let base = (next - now).to_std().unwrap_or(Duration::ZERO);
    base + jitter
}

/// Uniform random jitter in `[0, max)`. Spreads reimport start across a
/// window so replicas do not hit the source in lockstep.
#[must_use]
pub fn random_jitter(max: Duration) -> Duration {
    let secs = max.as_secs();
    if secs == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs(rand::thread_rng().gen_range(0..secs))
}
