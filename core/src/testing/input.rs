use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};

use crate::config::INPUT_EXTENSION;

/// Ordered, single-pass source of test inputs.
pub trait TestInput {
    /// Returns the next input and advances. Must not be called more than
    /// `test_count()` times.
    fn next(&mut self) -> anyhow::Result<String>;

    /// Identity of the input most recently returned by `next()`.
    fn current_name(&self) -> &str;

    fn test_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct InputFromFiles {
    ins: Vec<PathBuf>,
    names: Vec<String>,
    next_index: usize,
}

impl InputFromFiles {
    pub fn new(mut ins: Vec<PathBuf>) -> Self {
        fsutil::sort_paths(&mut ins);
        let names = ins
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        Self {
            ins,
            names,
            next_index: 0,
        }
    }

    /// Every `*.in` file below `group_dir`.
    pub fn discover(group_dir: impl AsRef<Path>) -> fsutil::Result<Self> {
        fsutil::find_files_with_extension(group_dir, INPUT_EXTENSION).map(Self::new)
    }
}

impl TestInput for InputFromFiles {
    fn next(&mut self) -> anyhow::Result<String> {
        let Some(path) = self.ins.get(self.next_index) else {
            bail!("All {} inputs have already been consumed", self.ins.len())
        };
        self.next_index += 1;
        fsutil::read_to_string(path).context("Failed to read test input")
    }

    fn current_name(&self) -> &str {
        self.next_index
            .checked_sub(1)
            .and_then(|i| self.names.get(i))
            .map_or("", String::as_str)
    }

    fn test_count(&self) -> usize {
        self.ins.len()
    }
}
