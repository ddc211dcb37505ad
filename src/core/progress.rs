//! Session progress reporting.

use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

/// Running completion count of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Items finished so far, successfully or not.
    pub completed: usize,
    /// Items submitted to the session.
    pub total: usize,
}

impl Progress {
    /// Whether every item has finished.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.completed >= self.total
    }
}

/// Callback invoked once per finished item.
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// Monotonic completion counter shared by the workers of one session.
pub(crate) struct ProgressTracker {
    total: usize,
    completed: Mutex<usize>,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub(crate) fn new(total: usize, callback: Option<ProgressCallback>) -> Self {
        Self {
            total,
            completed: Mutex::new(0),
            callback,
        }
    }

    /// Count one finished item and notify the callback.
    ///
    /// The callback runs under the counter lock, so successive calls observe
    /// strictly increasing counts. A panicking callback is logged and ignored.
    pub(crate) fn record(&self) -> Progress {
        let mut completed = self.completed.lock();
        *completed += 1;
        let progress = Progress {
            completed: *completed,
            total: self.total,
        };
        if let Some(callback) = &self.callback {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(progress))).is_err() {
                warn!(completed = progress.completed, "progress callback panicked");
            }
        }
        progress
    }
}

/// Render a progress line, e.g. `done  7 / 12 tiles`.
#[must_use]
pub fn format_progress(progress: Progress, unit: &str) -> String {
    let width = progress.total.to_string().len();
    format!(
        "done {:>width$} / {} {unit}",
        progress.completed, progress.total
    )
}

/// Callback that keeps a single, self-overwriting progress line on stdout.
///
/// Intermediate states are followed by backspaces so the next update replaces
/// them; the final state ends the line.
#[must_use]
pub fn console_progress(unit: &'static str) -> ProgressCallback {
    Arc::new(move |progress| {
        let mut status = format_progress(progress, unit);
        if progress.is_done() {
            status.push('\n');
        } else {
            let len = status.len();
            status.push_str(&"\u{8}".repeat(len));
        }
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(status.as_bytes());
        let _ = stdout.flush();
    })
}
