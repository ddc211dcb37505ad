//! Elapsed-time formatting.

use std::time::Duration;

/// Render a duration as `H:MM:SS.mmm`.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_ms = elapsed.as_millis();
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    format!("{hours}:{minutes:02}:{seconds:02}.{millis:03}")
}
