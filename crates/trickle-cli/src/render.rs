//! Plain-text rendering of session state for the terminal.

use std::fmt::Write;

use trickle_client::ConnectionState;
use trickle_core::format::{format_duration_coarse, format_duration_fine, format_signed_coarse};
use trickle_core::{Category, SessionSnapshot, UsageEntry};

/// Renders a server snapshot.
pub fn render_snapshot(snapshot: &SessionSnapshot) -> String {
    let summary = &snapshot.summary;
    let mut out = String::new();

    writeln!(out, "State: {}", snapshot.state).unwrap();
    writeln!(
        out,
        "Focus: {}  Distraction: {}  Net: {}",
        format_duration_coarse(summary.focus_secs),
        format_duration_coarse(summary.distraction_secs),
        format_signed_coarse(snapshot.net_productivity()),
    ).unwrap();
    writeln!(
        out,
        "Longest streak: {}",
        format_duration_coarse(summary.longest_streak_secs)
    ).unwrap();
    if let Some(updated) = summary.last_updated {
        writeln!(out, "Updated: {}", updated.format("%Y-%m-%d %H:%M:%S UTC")).unwrap();
    }

    render_category(&mut out, "Focus apps", &snapshot.app_usage.focus);
    render_category(&mut out, "Distraction apps", &snapshot.app_usage.distraction);

    if let Some(tree) = snapshot.garden.as_present().and_then(|g| g.tree.as_present()) {
        let mut parts = Vec::new();
        if let Some(level) = tree.level {
            parts.push(format!("level {level}"));
        }
        if let Some(health) = tree.health {
            parts.push(format!("health {health:.0}%"));
        }
        if let Some(progress) = tree.progress_to_next_level {
            parts.push(format!("{progress:.0}% to next level"));
        }
        if !parts.is_empty() {
            writeln!(out, "Tree: {}", parts.join(", ")).unwrap();
        }
    }
    out
}

fn render_category(out: &mut String, title: &str, category: &Category) {
    if category.apps.is_empty() {
        return;
    }
    writeln!(out, "{title} ({}):", format_duration_coarse(category.total_secs)).unwrap();
    let width = category.apps.iter().map(|a| a.name.len()).max().unwrap_or(0);
    for app in &category.apps {
        writeln!(
            out,
            "  {:<width$}  {}",
            app.name,
            format_duration_coarse(app.secs)
        ).unwrap();
    }
}

/// Renders the local usage report, most used first.
pub fn render_usage(usage: &[UsageEntry]) -> String {
    let mut out = String::new();
    if usage.is_empty() {
        out.push_str("No application usage recorded.\n");
        return out;
    }
    let total: i64 = usage.iter().map(|e| e.total_ms).sum();
    writeln!(out, "App usage ({}):", format_duration_fine(secs(total))).unwrap();
    let width = usage.iter().map(|e| e.app_name.as_str().len()).max().unwrap_or(0);
    for entry in usage {
        writeln!(
            out,
            "  {:<width$}  {}",
            entry.app_name.as_str(),
            format_duration_fine(secs(entry.total_ms))
        ).unwrap();
    }
    out
}

pub fn render_connection(state: &ConnectionState) -> String {
    match state {
        ConnectionState::Failed(reason) => {
            format!("connection: failed ({reason}); update the token and run again")
        }
        other => format!("connection: {other}"),
    }
}

fn secs(ms: i64) -> u64 {
    u64::try_from(ms / 1000).unwrap_or(0)
}
