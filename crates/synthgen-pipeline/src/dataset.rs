//! Dataset split bookkeeping and on-disk layout.
//!
//! Output shape per split: `{split}/images/{split}_NNNNNN.jpg` and
//! `{split}/labels/{split}_NNNNNN.txt`. Indices continue from whatever a
//! previous run left behind, so repeated invocations append instead of
//! overwriting.

use glob::glob;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{ConfigError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitCounts {
    pub train: u32,
    pub val: u32,
    pub test: u32,
}

impl SplitCounts {
    pub fn get(&self, split: Split) -> u32 {
        match split {
            Split::Train => self.train,
            Split::Val => self.val,
            Split::Test => self.test,
        }
    }

    pub fn total(&self) -> u32 {
        self.train + self.val + self.test
    }
}

/// Train and val floor their ratios; test takes the remainder, so the three
/// always sum exactly to `total`.
pub fn split_counts(total: u32, train_ratio: f64, val_ratio: f64) -> SplitCounts {
    let train = (total as f64 * train_ratio).floor() as u32;
    let val = (total as f64 * val_ratio).floor() as u32;
    SplitCounts {
        train,
        val,
        test: total - train - val,
    }
}

/// Paths under the output root.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self, split: Split) -> PathBuf {
        self.root.join(split.name()).join("images")
    }

    pub fn labels_dir(&self, split: Split) -> PathBuf {
        self.root.join(split.name()).join("labels")
    }

    pub fn preview_dir(&self) -> PathBuf {
        self.root.join("preview")
    }

    pub fn visualizations_dir(&self, split: Split) -> PathBuf {
        self.root.join("visualizations").join(split.name())
    }

    pub fn classes_path(&self) -> PathBuf {
        self.root.join("classes.txt")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Creates the image/label directory pair for every split.
    pub fn ensure_structure(&self) -> Result<()> {
        for split in Split::ALL {
            for dir in [self.images_dir(split), self.labels_dir(split)] {
                std::fs::create_dir_all(&dir).map_err(|source| ConfigError::Io {
                    path: dir.display().to_string(),
                    source,
                })?;
            }
        }
        Ok(())
    }
}

/// Next free image ordinal for a split: one past the highest existing
/// `{split}_NNNNNN` file in `images_dir`, or 0 when the directory is empty
/// or missing. Each split is scanned independently.
pub fn next_index(images_dir: &Path, split: Split) -> u32 {
    let pattern = images_dir.join(format!("{split}_*.jpg"));
    let Some(pattern) = pattern.to_str().map(String::from) else {
        return 0;
    };

    let mut next = 0u32;
    let Ok(entries) = glob(&pattern) else {
        return 0;
    };
    for path in entries.flatten() {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(ordinal) = stem
            .rsplit('_')
            .next()
            .and_then(|digits| digits.parse::<u32>().ok())
        else {
            continue;
        };
        next = next.max(ordinal + 1);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn counts_always_sum_to_total() {
        for total in [0u32, 1, 2, 3, 7, 10, 99, 100, 101, 1000] {
            for (tr, va) in [(0.7, 0.15), (1.0, 0.0), (0.0, 0.0), (0.333, 0.333)] {
                let counts = split_counts(total, tr, va);
                assert_eq!(counts.total(), total, "T={total} tr={tr} va={va}");
            }
        }
    }

    #[test]
    fn train_and_val_floor_their_share() {
        let counts = split_counts(10, 0.7, 0.15);
        assert_eq!(counts.train, 7);
        assert_eq!(counts.val, 1);
        assert_eq!(counts.test, 2);
    }

    #[test]
    fn full_train_split_leaves_others_empty() {
        let counts = split_counts(3, 1.0, 0.0);
        assert_eq!((counts.train, counts.val, counts.test), (3, 0, 0));
    }

    #[test]
    fn next_index_on_missing_dir_is_zero() {
        let dir = tempdir().unwrap();
        assert_eq!(next_index(&dir.path().join("absent"), Split::Train), 0);
    }

    #[test]
    fn next_index_continues_after_existing_files() {
        let dir = tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("train_{i:06}.jpg")), b"").unwrap();
        }
        // Another split's files must not influence the count.
        std::fs::write(dir.path().join("val_000099.jpg"), b"").unwrap();

        assert_eq!(next_index(dir.path(), Split::Train), 5);
        assert_eq!(next_index(dir.path(), Split::Val), 100);
        assert_eq!(next_index(dir.path(), Split::Test), 0);
    }

    #[test]
    fn next_index_skips_unparseable_names() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("train_abc.jpg"), b"").unwrap();
        std::fs::write(dir.path().join("train_000002.jpg"), b"").unwrap();
        assert_eq!(next_index(dir.path(), Split::Train), 3);
    }
}
