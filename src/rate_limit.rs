// Per-client fixed-window admission control for the public endpoints.
//
// Each client gets one counter and the wall-clock start of its window. The
// window resets on the first request after it has run for `window_ms`, so a
// client can land up to `2 * max_requests` across a boundary. State lives in
// this process only; with N instances the effective ceiling is N times the
// configured one.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::clock::{Clock, SystemClock};
use crate::config::RateLimitConfig;
use crate::metrics::RATE_LIMIT_ENTRIES;

// Key shared by every request whose origin could not be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

const NEVER_SWEPT: u64 = u64::MAX;

fn client_key(client_id: &str) -> &str {
    if client_id.is_empty() {
        UNKNOWN_CLIENT
    } else {
        client_id
    }
}

// Rate limit entry - tracks requests per client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: u64,
}

impl RateLimitEntry {
    fn fresh(now_ms: u64) -> Self {
        Self {
            count: 1,
            window_start: now_ms,
        }
    }

    fn is_expired(&self, now_ms: u64, window_ms: u64) -> bool {
        now_ms.saturating_sub(self.window_start) >= window_ms
    }
}

// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Admission {
    pub allowed: bool,
    pub remaining: u32,
}

impl Admission {
    fn allowed(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
        }
    }

    fn denied() -> Self {
        Self {
            allowed: false,
            remaining: 0,
        }
    }
}

pub struct AdmissionController {
    entries: DashMap<String, RateLimitEntry>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    last_sweep_ms: AtomicU64,
    // label for the entries gauge
    name: &'static str,
}

impl AdmissionController {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            clock,
            last_sweep_ms: AtomicU64::new(NEVER_SWEPT),
            name: "chat",
        }
    }

    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    // Number of tracked clients, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Check `client_id` against its window and record the request if admitted.
    pub fn check_and_record(&self, client_id: &str) -> Admission {
        self.check_and_record_at(client_id, self.clock.now_ms())
    }

    pub fn check_and_record_at(&self, client_id: &str, now_ms: u64) -> Admission {
        let key = client_key(client_id);
        let max = self.config.max_requests;
        let window_ms = self.config.window_ms;

        // the entry guard holds the shard lock, so read-compare-increment is atomic per key
        let admission = match self.entries.entry(key.to_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(RateLimitEntry::fresh(now_ms));
                Admission::allowed(max.saturating_sub(1))
            }
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                if entry.is_expired(now_ms, window_ms) {
                    *entry = RateLimitEntry::fresh(now_ms);
                    Admission::allowed(max.saturating_sub(1))
                } else if entry.count < max {
                    entry.count += 1;
                    Admission::allowed(max - entry.count)
                } else {
                    // rejected requests neither count nor extend the window
                    Admission::denied()
                }
            }
        };

        // guard is dropped above; retain() needs every shard lock
        if self.entries.len() > self.config.gc_threshold && self.claim_sweep(now_ms) {
            let removed = self.sweep_expired(now_ms);
            tracing::debug!(removed, remaining = self.entries.len(), "rate limiter sweep");
        }
        RATE_LIMIT_ENTRIES
            .with_label_values(&[self.name])
            .set(self.entries.len() as f64);

        admission
    }

    // At most one sweep per window; the winning caller does the work
    fn claim_sweep(&self, now_ms: u64) -> bool {
        let last = self.last_sweep_ms.load(Ordering::Acquire);
        if last != NEVER_SWEPT && now_ms.saturating_sub(last) < self.config.window_ms {
            return false;
        }
        self.last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    // Drop every entry whose window has expired at `now_ms`. Returns how many went.
    pub fn sweep_expired(&self, now_ms: u64) -> usize {
        let window_ms = self.config.window_ms;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.is_expired(now_ms, window_ms));
        before.saturating_sub(self.entries.len())
    }

    // Milliseconds until `client_id`'s current window ends, 0 when it has none.
    pub fn retry_after_ms(&self, client_id: &str) -> u64 {
        self.retry_after_ms_at(client_id, self.clock.now_ms())
    }

    pub fn retry_after_ms_at(&self, client_id: &str, now_ms: u64) -> u64 {
        self.entry(client_id)
            .map(|e| e.window_start.saturating_add(self.config.window_ms).saturating_sub(now_ms))
            .unwrap_or(0)
    }

    // Current entry for a client, for diagnostics.
    pub fn entry(&self, client_id: &str) -> Option<RateLimitEntry> {
        self.entries.get(client_key(client_id)).map(|e| *e)
    }
}
