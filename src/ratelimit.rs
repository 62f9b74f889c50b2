//! Request rate limiting — fixed windows per operation class.
//!
//! Three buckets, each keyed by `(operation class, session id or client
//! IP)`. Buckets live in memory and are evicted lazily once their window
//! has passed.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::advisor::AdvisorError;

/// Evict expired buckets once the map grows past this many entries.
const EVICTION_THRESHOLD: usize = 4096;

// ─── Operation Classes ──────────────────────────────────────────────────────

/// The three rate-limited operation classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    /// Chat turns: 20 per 60 s.
    Chat,
    /// Matching runs: 3 per 300 s.
    Matching,
    /// Everything else: 100 per 900 s.
    General,
}

impl OperationClass {
    pub fn bucket_name(&self) -> &'static str {
        match self {
            OperationClass::Chat => "chat",
            OperationClass::Matching => "matching",
            OperationClass::General => "general",
        }
    }

    fn window(&self) -> Duration {
        match self {
            OperationClass::Chat => Duration::from_secs(60),
            OperationClass::Matching => Duration::from_secs(300),
            OperationClass::General => Duration::from_secs(900),
        }
    }

    fn max_operations(&self) -> u32 {
        match self {
            OperationClass::Chat => 20,
            OperationClass::Matching => 3,
            OperationClass::General => 100,
        }
    }
}

// ─── RateLimiter ────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Bucket {
    window_start: Instant,
    count: u32,
}

/// In-memory fixed-window limiter shared across handlers.
#[derive(Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<(OperationClass, String), Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one operation, rejecting it when the bucket is exhausted.
    pub fn check(&self, class: OperationClass, key: &str) -> Result<(), AdvisorError> {
        self.check_at(class, key, Instant::now())
    }

    fn check_at(
        &self,
        class: OperationClass,
        key: &str,
        now: Instant,
    ) -> Result<(), AdvisorError> {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());

        if buckets.len() > EVICTION_THRESHOLD {
            buckets.retain(|(class, _), bucket| {
                now.duration_since(bucket.window_start) < class.window()
            });
        }

        let bucket = buckets
            .entry((class, key.to_string()))
            .or_insert(Bucket {
                window_start: now,
                count: 0,
            });

        if now.duration_since(bucket.window_start) >= class.window() {
            bucket.window_start = now;
            bucket.count = 0;
        }

        if bucket.count >= class.max_operations() {
            return Err(AdvisorError::RateLimited {
                bucket: class.bucket_name().to_string(),
            });
        }

        bucket.count += 1;
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
