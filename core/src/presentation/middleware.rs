// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Auth and rate-limit hooks, applied before JSON-RPC dispatch.
//!
//! Both are optional. The auth hook compares bearer keys in constant
//! time; the rate limiter is a token bucket per agent id (source IP
//! when no agent id is supplied), refilled linearly.

use std::collections::HashMap;
use std::sync::Mutex;

/// API key check against a configured set.
pub struct ApiKeyValidator {
    keys: Vec<String>,
}

impl ApiKeyValidator {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }

    /// Accepts an `Authorization: Bearer <key>` header value.
    pub fn validate(&self, authorization: Option<&str>) -> bool {
        let Some(value) = authorization else {
            return false;
        };
        let Some(candidate) = value.strip_prefix("Bearer ") else {
            return false;
        };
        self.keys
            .iter()
            .any(|key| constant_time_eq(key.as_bytes(), candidate.as_bytes()))
    }
}

/// Length check first, then a full scan regardless of where the first
/// mismatch is, so timing does not reveal the matching prefix.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

struct TokenBucket {
    tokens: f64,
    last_refill_ms: i64,
}

/// Token bucket per caller key. Capacity is `max_per_window`, refilled
/// linearly at `max_per_window / window_ms`.
pub struct RateLimiter {
    max_per_window: u32,
    window_ms: i64,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    pub fn per_minute(max: u32) -> Self {
        Self::new(max, 60_000)
    }

    pub fn new(max_per_window: u32, window_ms: i64) -> Self {
        Self {
            max_per_window,
            window_ms,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Consume one token for `key` at `now_ms`. On rejection returns the
    /// milliseconds until a token is available.
    pub fn check_at(&self, key: &str, now_ms: i64) -> Result<(), i64> {
        let max = self.max_per_window as f64;
        let refill_per_ms = max / self.window_ms as f64;

        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let bucket = buckets.entry(key.to_string()).or_insert(TokenBucket {
            tokens: max,
            last_refill_ms: now_ms,
        });

        let elapsed = (now_ms - bucket.last_refill_ms).max(0);
        bucket.tokens = (bucket.tokens + elapsed as f64 * refill_per_ms).min(max);
        bucket.last_refill_ms = now_ms;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - bucket.tokens;
            Err((deficit / refill_per_ms).ceil() as i64)
        }
    }
}
