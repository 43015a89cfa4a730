//! Local per-application usage aggregation.
//!
//! The aggregator turns a sequence of activation events into accumulated
//! active time per application. Exactly one application is "open" at a time;
//! switching to another application closes the open interval and credits it
//! to the previous entry.
//!
//! Totals only ever grow. Entries are never removed for the lifetime of the
//! aggregator.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::types::AppName;

/// Accumulated active time for a single application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageEntry {
    /// The application this entry tracks.
    pub app_name: AppName,

    /// Total closed-interval active time in milliseconds.
    pub total_ms: i64,

    /// Start of the currently open interval, if this is the active app.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_start: Option<DateTime<Utc>>,
}

impl UsageEntry {
    fn new(app_name: AppName) -> Self {
        Self {
            app_name,
            total_ms: 0,
            last_start: None,
        }
    }

    /// Closed-interval total as a duration.
    pub fn total(&self) -> Duration {
        Duration::milliseconds(self.total_ms)
    }

    /// Closed-interval total in whole seconds.
    pub const fn total_secs(&self) -> i64 {
        self.total_ms / 1000
    }

    pub const fn is_active(&self) -> bool {
        self.last_start.is_some()
    }

    /// Total including the still-open interval, as of `now`.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> Duration {
        let running = self
            .last_start
            .map_or(0, |start| clamped_elapsed_ms(start, now));
        Duration::milliseconds(self.total_ms + running)
    }
}

/// Records per-application active time from activation events.
#[derive(Debug, Default, Clone)]
pub struct UsageAggregator {
    /// Entries in first-seen order. Used as the tie-breaker when sorting.
    entries: Vec<UsageEntry>,
    index: HashMap<AppName, usize>,
    /// Index of the entry with an open interval.
    active: Option<usize>,
}

impl UsageAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `app_name` became the foreground application at `now`.
    ///
    /// Closes the interval of the previously active application (if any) and
    /// opens a new one. Returns `false` without touching any state when
    /// `app_name` is already the active application.
    pub fn record_activation(&mut self, app_name: &AppName, now: DateTime<Utc>) -> bool {
        if self.active().is_some_and(|active| active == app_name) {
            return false;
        }

        self.close(now);

        let idx = match self.index.get(app_name) {
            Some(&idx) => idx,
            None => {
                let idx = self.entries.len();
                self.entries.push(UsageEntry::new(app_name.clone()));
                self.index.insert(app_name.clone(), idx);
                idx
            }
        };
        self.entries[idx].last_start = Some(now);
        self.active = Some(idx);
        true
    }

    /// Flushes the open interval without opening a new one.
    ///
    /// Safe to call when no application is active.
    pub fn close(&mut self, now: DateTime<Utc>) {
        let Some(idx) = self.active.take() else {
            return;
        };
        let entry = &mut self.entries[idx];
        let Some(start) = entry.last_start.take() else {
            return;
        };

        let elapsed_ms = clamped_elapsed_ms(start, now);
        entry.total_ms = entry.total_ms.saturating_add(elapsed_ms);
        tracing::debug!(
            app = %entry.app_name,
            elapsed_ms,
            total_ms = entry.total_ms,
            "recorded app time"
        );
    }

    /// Returns the currently active application.
    pub fn active(&self) -> Option<&AppName> {
        self.active.map(|idx| &self.entries[idx].app_name)
    }

    /// Returns a single entry by name.
    pub fn get(&self, app_name: &str) -> Option<&UsageEntry> {
        self.index.get(app_name).map(|&idx| &self.entries[idx])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns all entries sorted by total time, descending.
    ///
    /// Entries with equal totals keep first-seen order.
    pub fn snapshot(&self) -> Vec<UsageEntry> {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| b.total_ms.cmp(&a.total_ms));
        entries
    }

    /// Sum of all closed-interval totals in milliseconds.
    pub fn total_ms(&self) -> i64 {
        self.entries.iter().map(|entry| entry.total_ms).sum()
    }
}

/// Milliseconds from `start` to `end`, clamped at zero for clock skew.
fn clamped_elapsed_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_milliseconds().max(0)
}
