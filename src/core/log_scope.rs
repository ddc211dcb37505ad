//! Item-scoped log sinks.
//!
//! While a work item runs, the worker thread's default dispatcher is replaced
//! with one that writes to the item's own log file, so concurrent items never
//! interleave into a shared stream. The previous dispatcher comes back when the
//! scope is dropped, on success, error or panic alike.

use std::fs::{self, OpenOptions};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Mutex;

use tracing::level_filters::LevelFilter;
use tracing::span::EnteredSpan;
use tracing::subscriber::DefaultGuard;
use tracing::{error, Level};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::prelude::*;

use crate::core::{TaskError, TaskExecutor, WorkItem, WorkerContext};

/// How per-item logs are mirrored to stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogIsolation {
    /// Mirror every event to stderr instead of errors only.
    pub debug: bool,
}

impl LogIsolation {
    /// Isolation settings with the given debug flag.
    #[must_use]
    pub const fn new(debug: bool) -> Self {
        Self { debug }
    }
}

/// Active item-scoped log sink. Dropping it restores the previous dispatcher.
#[must_use = "the previous log sink is restored as soon as the scope is dropped"]
pub struct TaskLogScope {
    // Field order matters: the span must close before the dispatcher is swapped back.
    _span: EnteredSpan,
    _guard: DefaultGuard,
}

impl TaskLogScope {
    /// Redirect this thread's logging to `log_path` until the scope drops.
    ///
    /// Events at INFO and above go to the file. Stderr receives everything in
    /// debug mode and only errors otherwise, each line carrying `label`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the log file or its directory cannot be created.
    pub fn enter(label: &str, log_path: &Path, isolation: LogIsolation) -> io::Result<Self> {
        Self::enter_with_mirror(label, log_path, isolation, io::stderr)
    }

    /// Same as [`TaskLogScope::enter`], mirroring to `mirror` instead of stderr.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the log file or its directory cannot be created.
    pub fn enter_with_mirror<W>(
        label: &str,
        log_path: &Path,
        isolation: LogIsolation,
        mirror: W,
    ) -> io::Result<Self>
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(true)
            .with_filter(LevelFilter::INFO);

        let mirror_max = if isolation.debug {
            Level::INFO
        } else {
            Level::ERROR
        };
        let mirror_layer = fmt::layer()
            .with_writer(mirror)
            .without_time()
            .with_target(true)
            .with_filter(filter_fn(move |meta| {
                meta.is_span() || *meta.level() <= mirror_max
            }));

        let subscriber = tracing_subscriber::registry()
            .with(file_layer)
            .with(mirror_layer);
        let guard = tracing::subscriber::set_default(subscriber);
        let span = tracing::info_span!("tile", label = %label).entered();

        Ok(Self {
            _span: span,
            _guard: guard,
        })
    }
}

/// Run one item inside its log scope and turn every failure into a [`TaskError`].
///
/// Errors and panics are recorded to the item's log before the scope closes.
pub(crate) fn run_isolated<P, R, E>(
    executor: &E,
    item: WorkItem<P>,
    ctx: &WorkerContext,
    isolation: LogIsolation,
) -> Result<R, TaskError>
where
    E: TaskExecutor<P, R> + ?Sized,
{
    let WorkItem {
        id,
        label,
        log_path,
        payload,
    } = item;

    let _scope = match &log_path {
        Some(path) => Some(TaskLogScope::enter(&label, path, isolation).map_err(|source| {
            TaskError::LogSetup {
                work_id: id.clone(),
                path: path.clone(),
                source,
            }
        })?),
        None => None,
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| executor.execute(payload, ctx)))
        .unwrap_or_else(|panic| Err(anyhow::anyhow!("task panicked: {}", panic_message(&*panic))));

    outcome.map_err(|source| {
        let chain = format!("{source:#}");
        error!(work_id = %id, error = %chain, "exception in task");
        TaskError::Execution {
            work_id: id,
            log_path,
            source,
        }
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
