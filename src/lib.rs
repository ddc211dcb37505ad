//! # Tile Scheduler
//!
//! Admission-controlled task scheduling for tile-based stereo reconstruction.
//!
//! A satellite stereo pipeline splits a scene into thousands of tiles and runs
//! the same per-tile function on each of them. Most of that work is CPU-bound
//! and parallelises trivially, but some correlators run on the GPU, whose
//! memory cannot be oversubscribed. This crate provides the two pieces that
//! make that safe:
//!
//! - **Admission Controller**: a multi-unit semaphore over a declared GPU
//!   memory budget, counted in fixed-size quanta. Requests are all-or-nothing,
//!   never block when they can never fit, and always release on drop.
//! - **Scheduler**: runs a list of work items across a fixed worker pool (or
//!   sequentially with one worker), gives each item its own log file, reports
//!   progress, bounds each wait with a timeout and keeps one item's failure
//!   from affecting its siblings.
//!
//! ```rust,ignore
//! use tile_scheduler::builders::{build_scheduler, Stage};
//! use tile_scheduler::config::SchedulerConfig;
//! use tile_scheduler::core::{console_progress, fail_fast, WorkItem, WorkerContext};
//!
//! let cfg = SchedulerConfig::from_json_str(r#"{"gpu_total_memory": 32000}"#)?;
//! let scheduler = build_scheduler(&cfg, Stage::StereoMatching)?
//!     .with_progress(console_progress("tiles"));
//!
//! let items = tiles.iter().map(|t| WorkItem::for_tile(&t.dir, None, t.clone())).collect();
//! let results = scheduler.schedule(
//!     |tile: Tile, ctx: &WorkerContext| {
//!         let _gpu = ctx.admission().request(tile.estimated_mb())?;
//!         tile.compute_disparity()
//!     },
//!     items,
//! )?;
//! let disparities = fail_fast(results)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Admission control, work items and the session scheduler.
pub mod core;
/// Configuration models for worker counts, budgets and timeouts.
pub mod config;
/// Builders to construct schedulers from configuration.
pub mod builders;
/// Shared utilities.
pub mod util;
