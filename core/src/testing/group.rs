use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use crate::config::{GroupPattern, INPUT_EXTENSION};

/// Name of the subdirectory that conventionally holds the inputs of a leaf group.
pub const INPUT_DIR_NAME: &str = "in";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKind {
    /// Holds testcases directly (or nothing at all).
    Leaf,
    /// Holds only sub-groups.
    Composite(Vec<Group>),
}

/// A node of the group tree, built eagerly from the file system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub path: PathBuf,
    pub kind: GroupKind,
}

impl Group {
    /// Reads `dir` and, when it is composite, all of its descendants.
    /// Every directory is listed exactly once.
    pub fn scan(dir: impl Into<PathBuf>) -> fsutil::Result<Self> {
        let path = dir.into();
        let entries = fsutil::list_dir_sorted(&path)?;

        let mut subdirs = Vec::new();
        let mut has_direct_input = false;
        let mut has_input_dir = false;
        for entry in &entries {
            let entry_path = entry.path();
            if entry.file_name() == INPUT_DIR_NAME {
                has_input_dir = true;
            }
            if entry_path.is_dir() {
                subdirs.push(entry_path);
            } else if entry_path.extension().map_or(false, |e| e == INPUT_EXTENSION) {
                has_direct_input = true;
            }
        }

        let is_leaf = has_direct_input || has_input_dir || subdirs.is_empty();
        let kind = if is_leaf {
            GroupKind::Leaf
        } else {
            let children = subdirs
                .into_iter()
                .map(Group::scan)
                .collect::<fsutil::Result<Vec<_>>>()?;
            GroupKind::Composite(children)
        };
        Ok(Self { path, kind })
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, GroupKind::Leaf)
    }

    /// Leaf groups of this subtree, in tree order.
    pub fn leaves(&self) -> Vec<&Group> {
        let mut res = Vec::new();
        self.collect_leaves(&mut res);
        res
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Group>) {
        match &self.kind {
            GroupKind::Leaf => out.push(self),
            GroupKind::Composite(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }
}

/// Builds the group trees for the top-level directories of `test_dir` whose
/// name fully matches at least one of `patterns`.
/// Sub-groups of a selected composite group are always taken entirely.
pub fn resolve_groups(
    test_dir: impl AsRef<Path>,
    patterns: &[GroupPattern],
) -> fsutil::Result<Vec<Group>> {
    let mut groups = Vec::new();
    for dir in fsutil::list_subdirs(&test_dir)? {
        let name = dir
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if patterns.is_empty() || patterns.iter().any(|p| p.is_full_match(&name)) {
            groups.push(Group::scan(dir)?);
        } else {
            log::debug!("Skipping unselected group '{}'", name);
        }
    }
    Ok(groups)
}

/// Leaf groups to run, deduplicated by their canonical path, in a stable order.
pub fn resolve_leaf_groups(
    test_dir: impl AsRef<Path>,
    patterns: &[GroupPattern],
) -> fsutil::Result<Vec<PathBuf>> {
    let trees = self::resolve_groups(test_dir, patterns)?;

    let mut seen = HashSet::new();
    let mut res = Vec::new();
    for leaf in trees.iter().flat_map(Group::leaves) {
        let canonical = fsutil::canonicalize_path(&leaf.path)?;
        if seen.insert(canonical) {
            res.push(leaf.path.clone());
        }
    }
    log::debug!("Resolved {} leaf group(s): {:?}", res.len(), res);
    Ok(res)
}
