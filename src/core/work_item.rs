//! Work items and tile labelling.

use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the per-item log file written inside each tile directory.
pub const TILE_LOG_FILE: &str = "stdout.log";

/// Identifier used to label logs and correlate progress for one work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkId(String);

impl WorkId {
    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for WorkId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for WorkId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// One schedulable unit of work.
///
/// The payload is moved into exactly one worker. The label only names logs
/// and progress output, it never affects scheduling.
#[derive(Debug)]
pub struct WorkItem<P> {
    /// Identifier of the item.
    pub id: WorkId,
    /// Human-readable label, used as the stderr prefix of the item's log lines.
    pub label: String,
    /// Dedicated log destination. `None` runs the item without log isolation.
    pub log_path: Option<PathBuf>,
    /// Arguments handed to the target function.
    pub payload: P,
}

impl<P> WorkItem<P> {
    /// Item without a dedicated log; label defaults to the identifier.
    pub fn new(id: impl Into<WorkId>, payload: P) -> Self {
        let id = id.into();
        Self {
            label: id.to_string(),
            id,
            log_path: None,
            payload,
        }
    }

    /// Item for one tile (or one pair of a tile).
    ///
    /// The label is the tile's `row_*/col_*` suffix, extended with `pair_<n>`
    /// when `pair` is set; the log goes to `stdout.log` inside the tile (or
    /// pair) directory.
    pub fn for_tile(tile_dir: impl AsRef<Path>, pair: Option<u32>, payload: P) -> Self {
        let tile_dir = tile_dir.as_ref();
        let mut label = tile_label_from_dir(tile_dir);
        let mut dir = tile_dir.to_path_buf();
        if let Some(pair) = pair {
            let pair_dir = format!("pair_{pair}");
            dir.push(&pair_dir);
            if label.is_empty() {
                label = pair_dir;
            } else {
                label = format!("{label}/{pair_dir}");
            }
        }
        Self {
            id: WorkId::from(label.clone()),
            label,
            log_path: Some(dir.join(TILE_LOG_FILE)),
            payload,
        }
    }

    /// Override the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Attach a dedicated log destination.
    #[must_use]
    pub fn with_log(mut self, log_path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(log_path.into());
        self
    }
}

/// Label a tile directory by its last two components.
///
/// `/out/tiles/row_0002145_height_715/col_0000000_width_667` becomes
/// `row_0002145_height_715/col_0000000_width_667`.
#[must_use]
pub fn tile_label_from_dir(tile_dir: &Path) -> String {
    let parts: Vec<_> = tile_dir
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect();
    let start = parts.len().saturating_sub(2);
    parts[start..].join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_label_keeps_row_and_col() {
        let dir = Path::new("/path/to/output_s2p/tiles/row_0002145_height_715/col_0000000_width_667");
        assert_eq!(
            tile_label_from_dir(dir),
            "row_0002145_height_715/col_0000000_width_667"
        );
    }

    #[test]
    fn test_tile_label_short_paths() {
        assert_eq!(tile_label_from_dir(Path::new("col_0")), "col_0");
        assert_eq!(tile_label_from_dir(Path::new("/")), "");
    }

    #[test]
    fn test_for_tile_without_pair() {
        let item = WorkItem::for_tile("/out/tiles/row_1/col_2", None, 7u8);
        assert_eq!(item.id.as_str(), "row_1/col_2");
        assert_eq!(item.label, "row_1/col_2");
        assert_eq!(
            item.log_path.as_deref(),
            Some(Path::new("/out/tiles/row_1/col_2/stdout.log"))
        );
        assert_eq!(item.payload, 7);
    }

    #[test]
    fn test_for_tile_with_pair() {
        let item = WorkItem::for_tile("/out/tiles/row_1/col_2", Some(3), ());
        assert_eq!(item.label, "row_1/col_2/pair_3");
        assert_eq!(
            item.log_path.as_deref(),
            Some(Path::new("/out/tiles/row_1/col_2/pair_3/stdout.log"))
        );
    }

    #[test]
    fn test_plain_item_has_no_log() {
        let item = WorkItem::new("merge-heights", ()).with_label("merge");
        assert_eq!(item.id.to_string(), "merge-heights");
        assert_eq!(item.label, "merge");
        assert!(item.log_path.is_none());
    }
}
