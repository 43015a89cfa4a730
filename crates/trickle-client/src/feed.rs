//! Activation events from a line-oriented source.
//!
//! Each line is either `APP` (stamped with the time it was read) or
//! `RFC3339<TAB>APP`. Blank lines and repeats of the current app are dropped.

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use trickle_core::{ActivationNormalizer, AppActivated};

/// Reads activations until EOF or until the receiver goes away.
///
/// Returns how many events were forwarded.
pub async fn read_activations<R>(reader: R, events: mpsc::Sender<AppActivated>) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut normalizer = ActivationNormalizer::new();
    let mut lines = reader.lines();
    let mut forwarded = 0;

    while let Some(line) = lines.next_line().await? {
        let (at, name) = parse_line(&line, Utc::now());
        let Some(event) = normalizer.normalize(Some(name), at) else {
            continue;
        };
        tracing::debug!(app = %event.app_name, at = %event.at, "activation");
        if events.send(event).await.is_err() {
            tracing::debug!("activation receiver closed; stopping feed");
            break;
        }
        forwarded += 1;
    }
    Ok(forwarded)
}

/// Splits a feed line into its timestamp and application name.
///
/// A leading field that is not a valid RFC 3339 timestamp is treated as part
/// of the name.
pub fn parse_line(line: &str, now: DateTime<Utc>) -> (DateTime<Utc>, &str) {
    if let Some((stamp, name)) = line.split_once('\t') {
        if let Ok(at) = DateTime::parse_from_rfc3339(stamp.trim()) {
            return (at.with_timezone(&Utc), name);
        }
    }
    (now, line)
}
