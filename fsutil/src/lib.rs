use std::{
    fs::{self, ReadDir},
    path::{Path, PathBuf},
};

pub mod error {
    use std::{io, path::PathBuf};

    pub type Result<T> = std::result::Result<T, self::Error>;

    type Msg = &'static str;

    #[derive(Debug, thiserror::Error)]
    pub enum Error {
        #[error("{0} ({1}): {2}")]
        SingleIO(Msg, PathBuf, #[source] io::Error),

        #[error("Failed to canonicalize path '{0}': {1}")]
        CanonicalizePath(PathBuf, #[source] io::Error),

        #[error("Invalid glob '{0}': {1}")]
        InvalidGlob(String, #[source] ::glob::PatternError),

        #[error("Cannot access '{}' while globbing: {}", .0.path().to_string_lossy(), .0.error())]
        Glob(#[source] ::glob::GlobError),
    }
}
pub use error::{Error, Result};

#[must_use]
pub fn mkdir_all(path: impl AsRef<Path>) -> Result<()> {
    let dir = path.as_ref();
    fs::create_dir_all(dir).map_err(|e| Error::SingleIO("Cannot create dir", dir.to_owned(), e))
}

#[must_use]
pub fn write<P, C>(filepath: P, contents: C) -> Result<()>
where
    P: AsRef<Path>,
    C: AsRef<[u8]>,
{
    fs::write(&filepath, contents)
        .map_err(|e| Error::SingleIO("Cannot write file", filepath.as_ref().to_owned(), e))
}

#[must_use]
pub fn write_with_mkdir<P, C>(filepath: P, contents: C) -> Result<()>
where
    P: AsRef<Path>,
    C: AsRef<[u8]>,
{
    if let Some(dir) = filepath.as_ref().parent() {
        self::mkdir_all(dir)?;
    }
    self::write(filepath, contents)
}

#[must_use]
pub fn read_to_string(filepath: impl AsRef<Path>) -> Result<String> {
    fs::read_to_string(&filepath)
        .map_err(|e| Error::SingleIO("Cannot read file", filepath.as_ref().to_owned(), e))
}

#[must_use]
pub fn read_dir(dir: impl AsRef<Path>) -> Result<ReadDir> {
    fs::read_dir(&dir).map_err(|e| Error::SingleIO("Cannot read dir", dir.as_ref().to_owned(), e))
}

pub fn canonicalize_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    path.canonicalize()
        .map_err(|e| Error::CanonicalizePath(path.to_owned(), e))
}

/// Immediate entries of `dir`, sorted by path.
#[must_use]
pub fn list_dir_sorted(dir: impl AsRef<Path>) -> Result<Vec<fs::DirEntry>> {
    let dir = dir.as_ref();
    let mut entries = Vec::new();
    for entry in self::read_dir(dir)? {
        let entry =
            entry.map_err(|e| Error::SingleIO("Cannot access dir entry", dir.to_owned(), e))?;
        entries.push(entry);
    }
    entries.sort_by_key(|e| e.path());
    Ok(entries)
}

/// Immediate subdirectories of `dir` (symlinks followed), sorted by path.
#[must_use]
pub fn list_subdirs(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    Ok(self::list_dir_sorted(dir)?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect())
}

/// Sorts by the plain string form of the paths, not component-wise:
/// `a.b/1.in` comes before `a/1.in`.
pub fn sort_paths(paths: &mut [PathBuf]) {
    paths.sort_by_cached_key(|p| p.to_string_lossy().into_owned());
}

/// Finds every file below `dir` (recursively) whose extension is `ext`.
/// The result is sorted lexicographically by path.
///
/// ```
/// # let tmp = tempfile::tempdir().unwrap();
/// # let dir = tmp.path();
/// fsutil::write_with_mkdir(dir.join("b/2.in"), "").unwrap();
/// fsutil::write_with_mkdir(dir.join("a.in"), "").unwrap();
/// fsutil::write_with_mkdir(dir.join("a.out"), "").unwrap();
///
/// let found = fsutil::find_files_with_extension(dir, "in").unwrap();
/// assert_eq!(found, vec![dir.join("a.in"), dir.join("b/2.in")]);
/// ```
#[must_use]
pub fn find_files_with_extension(dir: impl AsRef<Path>, ext: &str) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let pattern = format!(
        "{}/**/*.{}",
        ::glob::Pattern::escape(&dir.to_string_lossy()),
        ::glob::Pattern::escape(ext),
    );
    let paths = ::glob::glob(&pattern).map_err(|e| Error::InvalidGlob(pattern.clone(), e))?;

    let mut res = Vec::new();
    for path in paths {
        let path = path.map_err(Error::Glob)?;
        if path.is_file() {
            res.push(path);
        }
    }
    self::sort_paths(&mut res);
    log::trace!("{} file(s) matched '{}'", res.len(), pattern);
    Ok(res)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn list_subdirs_should_skip_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        mkdir_all(dir.join("grp2")).unwrap();
        mkdir_all(dir.join("grp1")).unwrap();
        write(dir.join("README"), "hello").unwrap();

        let subdirs = list_subdirs(dir).unwrap();
        assert_eq!(subdirs, vec![dir.join("grp1"), dir.join("grp2")]);
    }

    #[test]
    fn find_files_with_extension_should_sort_by_path() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        for name in ["in/3.in", "in/1.in", "in/2.in", "out/1.out", "1.input"] {
            write_with_mkdir(dir.join(name), name).unwrap();
        }

        let found = find_files_with_extension(dir, "in").unwrap();
        assert_eq!(
            found,
            vec![dir.join("in/1.in"), dir.join("in/2.in"), dir.join("in/3.in")]
        );
    }

    #[test]
    fn found_files_should_be_in_plain_string_order() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        write_with_mkdir(dir.join("a/1.in"), "").unwrap();
        write_with_mkdir(dir.join("a.b/1.in"), "").unwrap();

        let found = find_files_with_extension(dir, "in").unwrap();
        assert_eq!(found, vec![dir.join("a.b/1.in"), dir.join("a/1.in")]);
    }

    #[test]
    fn read_dir_should_fail_on_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let err = read_dir(tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::SingleIO(_, _, _)));
    }
}
