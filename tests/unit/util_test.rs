//! Tests for utility functions

use std::path::Path;
use std::time::Duration;

use tile_scheduler::core::{format_progress, tile_label_from_dir, Progress};
use tile_scheduler::util::{format_elapsed, init_tracing};

#[test]
fn test_format_elapsed_rolls_over() {
    assert_eq!(format_elapsed(Duration::from_millis(3_599_999)), "0:59:59.999");
    assert_eq!(format_elapsed(Duration::from_secs(3600)), "1:00:00.000");
}

#[test]
fn test_format_progress_pads_count() {
    let line = format_progress(
        Progress {
            completed: 7,
            total: 1200,
        },
        "tiles",
    );
    assert_eq!(line, "done    7 / 1200 tiles");
}

#[test]
fn test_tile_label_from_dir() {
    assert_eq!(
        tile_label_from_dir(Path::new("/out/tiles/row_0000512/col_0001024")),
        "row_0000512/col_0001024"
    );
    assert_eq!(tile_label_from_dir(Path::new("col_0")), "col_0");
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    assert!(tracing::dispatcher::has_been_set());
}
