//! Human-readable duration formatting.

/// Formats whole seconds at minute resolution: `1h 5m` or `12m`.
///
/// Used for server-side session totals, which only matter at a coarse grain.
pub fn format_duration_coarse(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Formats whole seconds down to the second: `1h 5m`, `4m 10s` or `9s`.
///
/// Used for locally tracked application time, where short switches matter.
pub fn format_duration_fine(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Formats a signed second count with an explicit sign, e.g. `+1h 5m`.
pub fn format_signed_coarse(secs: i64) -> String {
    let sign = if secs < 0 { '-' } else { '+' };
    format!("{sign}{}", format_duration_coarse(secs.unsigned_abs()))
}
