//! Foreground-application activation events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::AppName;

/// A normalized notification that an application became the foreground one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppActivated {
    /// The application that became active.
    pub app_name: AppName,
    /// When the switch happened.
    pub at: DateTime<Utc>,
}

impl AppActivated {
    pub const fn new(app_name: AppName, at: DateTime<Utc>) -> Self {
        Self { app_name, at }
    }
}

/// Converts raw activation notifications into [`AppActivated`] events.
///
/// Raw sources may report an application without a usable name, or report the
/// same application repeatedly. Both are filtered out here so downstream
/// consumers only see real switches.
#[derive(Debug, Default)]
pub struct ActivationNormalizer {
    current: Option<AppName>,
}

impl ActivationNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an event when `raw_name` is a valid name that differs from the
    /// last accepted one.
    pub fn normalize(&mut self, raw_name: Option<&str>, at: DateTime<Utc>) -> Option<AppActivated> {
        let app_name = match AppName::new(raw_name?) {
            Ok(name) => name,
            Err(e) => {
                tracing::trace!(error = %e, "skipping activation without a name");
                return None;
            }
        };

        if self.current.as_ref() == Some(&app_name) {
            return None;
        }

        self.current = Some(app_name.clone());
        Some(AppActivated::new(app_name, at))
    }

    /// The last application accepted by the normalizer.
    pub const fn current(&self) -> Option<&AppName> {
        self.current.as_ref()
    }
}
