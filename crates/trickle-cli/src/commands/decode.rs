//! Decode command: turn a raw `status-updated` payload into readable output.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use trickle_core::decode_status_slice;

use crate::render::render_snapshot;

pub fn run<R: Read, W: Write>(mut input: R, writer: &mut W, json: bool) -> Result<()> {
    let mut payload = Vec::new();
    input
        .read_to_end(&mut payload)
        .context("failed to read payload")?;

    let snapshot = decode_status_slice(&payload)?;
    if json {
        let rendered = serde_json::to_string_pretty(&snapshot)?;
        writeln!(writer, "{rendered}")?;
    } else {
        write!(writer, "{}", render_snapshot(&snapshot))?;
    }
    Ok(())
}
