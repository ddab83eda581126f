//! Fixed-window counter store shared by every limiter shape.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use postline_core::ports::RateLimitResult;

/// How a window expires and when a request crosses the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowPolicy {
    /// Window ends at `reset_at`; the count is incremented first and the
    /// request is rejected once it exceeds the limit. Rejected requests keep
    /// counting.
    #[default]
    ResetAnchored,
    /// Window is measured from the first request; a request is rejected when
    /// the count already reached the limit, and is not counted.
    FirstRequestAnchored,
}

/// One tracked identifier's current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    /// Epoch milliseconds of the first request in the window.
    pub window_start: i64,
    /// Epoch milliseconds at which the window expires.
    pub reset_at: i64,
}

impl RateLimitEntry {
    fn open(now: i64, window_ms: i64) -> Self {
        Self {
            count: 1,
            window_start: now,
            reset_at: now.saturating_add(window_ms),
        }
    }

    /// Whether the window no longer applies at `now`.
    pub fn is_expired(&self, policy: WindowPolicy, now: i64, window_ms: i64) -> bool {
        match policy {
            WindowPolicy::ResetAnchored => self.reset_at < now,
            WindowPolicy::FirstRequestAnchored => now.saturating_sub(self.window_start) > window_ms,
        }
    }
}

/// Limit and window applied by a store check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRule {
    pub limit: u32,
    pub window: Duration,
    pub policy: WindowPolicy,
}

impl WindowRule {
    fn window_ms(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Identifier to window map.
///
/// Every check runs under the entry's shard lock, so concurrent checks on the
/// same key never lose increments.
#[derive(Debug, Default)]
pub struct RateLimitStore {
    entries: DashMap<String, RateLimitEntry>,
}

impl RateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request for `key` at `now` and decide whether it is admitted.
    pub fn check_and_record(&self, key: &str, now: i64, rule: &WindowRule) -> RateLimitResult {
        let window_ms = rule.window_ms();

        let (entry, allowed) = match self.entries.entry(key.to_string()) {
            Entry::Vacant(vacant) => (*vacant.insert(RateLimitEntry::open(now, window_ms)), true),
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired(rule.policy, now, window_ms) {
                    *entry = RateLimitEntry::open(now, window_ms);
                    (*entry, true)
                } else {
                    match rule.policy {
                        WindowPolicy::ResetAnchored => {
                            entry.count = entry.count.saturating_add(1);
                            (*entry, entry.count <= rule.limit)
                        }
                        WindowPolicy::FirstRequestAnchored => {
                            if entry.count >= rule.limit {
                                (*entry, false)
                            } else {
                                entry.count += 1;
                                (*entry, true)
                            }
                        }
                    }
                }
            }
        };

        let retry_after_ms = entry.reset_at.saturating_sub(now).max(0).unsigned_abs();

        RateLimitResult {
            allowed,
            limit: rule.limit,
            count: entry.count,
            remaining: rule.limit.saturating_sub(entry.count),
            reset_at: entry.reset_at,
            retry_after: Duration::from_millis(retry_after_ms),
        }
    }

    /// Remove every entry whose window has expired at `now`.
    /// Returns the number of removed entries.
    pub fn sweep_expired(&self, now: i64, rule: &WindowRule) -> usize {
        let window_ms = rule.window_ms();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.is_expired(rule.policy, now, window_ms));
        before.saturating_sub(self.entries.len())
    }

    pub fn get(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.get(key).map(|entry| *entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
