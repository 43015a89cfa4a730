//! Core domain logic for the Trickle focus tracker.
//!
//! This crate contains the pure, I/O-free parts of the client:
//! - Usage aggregation: local per-application active time
//! - Activation normalization: turning raw focus notifications into events
//! - Session snapshots: the server's view of the current session and its decoder

pub mod activation;
pub mod decode;
pub mod focus_state;
pub mod format;
pub mod snapshot;
mod types;
pub mod usage;

pub use activation::{ActivationNormalizer, AppActivated};
pub use decode::{
    DecodeError, DecodeErrorKind, decode_status, decode_status_args, decode_status_slice,
    decode_status_str,
};
pub use focus_state::{FocusState, UnknownFocusState};
pub use snapshot::{AppTime, AppUsage, Category, Garden, Legacy, SessionSnapshot, SessionSummary, Tree};
pub use types::{AppName, ValidationError};
pub use usage::{UsageAggregator, UsageEntry};
