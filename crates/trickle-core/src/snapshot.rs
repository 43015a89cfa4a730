//! Server-confirmed session state.
//!
//! A [`SessionSnapshot`] is a complete, authoritative copy of the server's view
//! of the current session. It is never patched field by field: every decoded
//! `status-updated` message produces a fresh snapshot that replaces the old
//! one.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::focus_state::FocusState;

/// A complete server status at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Current focus classification.
    pub state: FocusState,
    /// Aggregated session totals.
    pub summary: SessionSummary,
    /// Per-category application breakdown.
    pub app_usage: AppUsage,
    /// Deprecated garden block, kept only when the server still sends it.
    pub garden: Legacy<Garden>,
}

impl SessionSnapshot {
    /// Focus time minus distraction time, in seconds. Negative when the user
    /// has been distracted for longer than focused.
    pub fn net_productivity(&self) -> i64 {
        self.summary.net_productivity()
    }
}

/// Session-level totals as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub focus_secs: u64,
    pub distraction_secs: u64,
    pub longest_streak_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl SessionSummary {
    pub fn net_productivity(&self) -> i64 {
        saturating_i64(self.focus_secs).saturating_sub(saturating_i64(self.distraction_secs))
    }
}

/// Application usage split by focus category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppUsage {
    pub focus: Category,
    pub distraction: Category,
}

/// Applications attributed to one category, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Category {
    pub total_secs: u64,
    pub apps: Vec<AppTime>,
}

/// Time the server attributes to a single application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppTime {
    pub name: String,
    pub secs: u64,
}

/// A field from an older server schema that may or may not be sent.
///
/// Decoding never fails because of a legacy field: a missing or unreadable
/// value becomes [`Legacy::Absent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Legacy<T> {
    Present(T),
    Absent,
}

impl<T> Legacy<T> {
    pub const fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub const fn as_present(&self) -> Option<&T> {
        match self {
            Self::Present(value) => Some(value),
            Self::Absent => None,
        }
    }
}

impl<T> From<Option<T>> for Legacy<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Self::Present)
    }
}

/// Deprecated garden visualisation state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Garden {
    pub tree: Legacy<Tree>,
}

/// Deprecated tree growth state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tree {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_to_next_level: Option<f64>,
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
