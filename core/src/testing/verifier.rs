use std::{
    io,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use difference::{Changeset, Difference};
use sha2::{Digest as _, Sha256};
use tokio::{io::AsyncWriteExt as _, process::Command};

use super::result::{ProcessOutput, Status};
use crate::config::{Config, Verification, OUTPUT_EXTENSION};

#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    #[error("No reference output for test #{index} (found only {available} '.out' files)")]
    MissingReference { index: usize, available: usize },

    #[error(transparent)]
    Fs(#[from] fsutil::Error),

    #[error("Failed to spawn verifier '{cmd}': {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to communicate with verifier: {0}")]
    Io(#[source] io::Error),

    #[error("Verifier exited abnormally (exitcode={status:?}): {stderr}")]
    Failed { status: Option<i32>, stderr: String },

    #[error("Verifier printed unknown status '{0}' (expected one of OK, ANS, TLE, RTE)")]
    UnknownStatus(String),
}

/// Judges the produced output of each test of one group.
///
/// For each test, in input order, exactly one of `handle_output` or
/// `skip_test` is called; `summary` once after the group completes.
#[async_trait]
pub trait OutputVerifier: Send {
    async fn handle_output(&mut self, input: &str, output: &str) -> Result<Status, VerifierError>;

    /// The test ended without an output to judge (RTE, TLE, unreadable input).
    fn skip_test(&mut self) {}

    fn summary(&self) -> Option<String> {
        None
    }
}

/// Creates the verifier selected by `cfg` for the leaf group at `group_dir`,
/// which holds `test_count` inputs.
pub fn from_config(
    cfg: &Config,
    group_dir: impl AsRef<Path>,
    test_count: usize,
) -> fsutil::Result<Box<dyn OutputVerifier>> {
    Ok(match &cfg.verification {
        Verification::FileDiff => {
            let v = OutputFromFiles::discover(&group_dir)?;
            if v.reference_count() != test_count {
                log::warn!(
                    "{} has {} input(s) but {} reference output(s)",
                    group_dir.as_ref().to_string_lossy(),
                    test_count,
                    v.reference_count()
                );
            }
            Box::new(v)
        }
        Verification::Checksum => Box::new(OutputChecksum::new()),
        Verification::External { verifier } => {
            Box::new(OutputToVerifier::new(verifier.clone()).shell(cfg.shell.clone()))
        }
    })
}

pub fn remove_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn normalized_lines(s: &str) -> Vec<String> {
    s.lines()
        .map(remove_whitespace)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Line diff between whitespace-normalized `produced` and `expected`.
pub fn diff_ignoring_whitespace(produced: &str, expected: &str) -> Changeset {
    Changeset::new(
        &normalized_lines(produced).join("\n"),
        &normalized_lines(expected).join("\n"),
        "\n",
    )
}

pub fn outputs_match(produced: &str, expected: &str) -> bool {
    self::diff_ignoring_whitespace(produced, expected)
        .diffs
        .iter()
        .all(|d| matches!(d, Difference::Same(_)))
}

/// Compares each output against the reference file at the same position.
#[derive(Debug, Clone)]
pub struct OutputFromFiles {
    outs: Vec<PathBuf>,
    next_index: usize,
}

impl OutputFromFiles {
    pub fn new(mut outs: Vec<PathBuf>) -> Self {
        fsutil::sort_paths(&mut outs);
        Self {
            outs,
            next_index: 0,
        }
    }

    /// Every `*.out` file below `group_dir`.
    pub fn discover(group_dir: impl AsRef<Path>) -> fsutil::Result<Self> {
        fsutil::find_files_with_extension(group_dir, OUTPUT_EXTENSION).map(Self::new)
    }

    pub fn reference_count(&self) -> usize {
        self.outs.len()
    }
}

#[async_trait]
impl OutputVerifier for OutputFromFiles {
    async fn handle_output(&mut self, _input: &str, output: &str) -> Result<Status, VerifierError> {
        let index = self.next_index;
        self.next_index += 1;

        let path = self
            .outs
            .get(index)
            .ok_or(VerifierError::MissingReference {
                index,
                available: self.outs.len(),
            })?;
        let expected = fsutil::read_to_string(path)?;

        let changeset = self::diff_ignoring_whitespace(output, &expected);
        if changeset.diffs.iter().all(|d| matches!(d, Difference::Same(_))) {
            return Ok(Status::OK);
        }
        log::debug!(
            "Output differs from '{}':\n{}",
            path.to_string_lossy(),
            changeset
        );
        Ok(Status::ANS)
    }

    fn skip_test(&mut self) {
        self.next_index += 1;
    }
}

/// Accumulates a SHA-256 over the whitespace-stripped outputs.
#[derive(Clone, Default)]
pub struct OutputChecksum {
    hasher: Sha256,
}

impl OutputChecksum {
    pub const DIGEST_PREFIX_LEN: usize = 8;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn hexdigest(&self) -> String {
        format!("{:x}", self.hasher.clone().finalize())
    }
}

#[async_trait]
impl OutputVerifier for OutputChecksum {
    async fn handle_output(&mut self, _input: &str, output: &str) -> Result<Status, VerifierError> {
        self.hasher.update(remove_whitespace(output).as_bytes());
        Ok(Status::OK)
    }

    fn summary(&self) -> Option<String> {
        let digest = self.hexdigest();
        Some(format!(
            "sha-256 checksum: {}",
            &digest[..Self::DIGEST_PREFIX_LEN]
        ))
    }
}

/// Delegates the verdict to an external command.
/// The command reads the input followed by the output on its stdin, and
/// prints the name of the status on its stdout.
#[derive(Debug, Clone)]
pub struct OutputToVerifier {
    cmd: String,
    shell: PathBuf,
}

impl OutputToVerifier {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            shell: Config::default_shell(),
        }
    }

    pub fn shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }
}

#[async_trait]
impl OutputVerifier for OutputToVerifier {
    async fn handle_output(&mut self, input: &str, output: &str) -> Result<Status, VerifierError> {
        log::debug!("Running verifier: {}", self.cmd);
        let mut proc = Command::new(&self.shell)
            .args(["-c", &self.cmd])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| VerifierError::Spawn {
                cmd: self.cmd.clone(),
                source,
            })?;

        let mut stdin = proc.stdin.take().ok_or_else(|| {
            VerifierError::Io(io::Error::new(io::ErrorKind::Other, "Failed to open stdin"))
        })?;
        let data = format!("{}{}", input, output);
        let feed = async move {
            let res = stdin.write_all(data.as_bytes()).await;
            drop(stdin);
            match res {
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                res => res,
            }
        };

        let (fed, out) = tokio::join!(feed, proc.wait_with_output());
        let out = ProcessOutput::from(out.map_err(VerifierError::Io)?);
        fed.map_err(VerifierError::Io)?;

        if out.status != Some(0) {
            return Err(VerifierError::Failed {
                status: out.status,
                stderr: out.stderr,
            });
        }
        let name = out.stdout.trim();
        name.parse::<Status>()
            .map_err(|_| VerifierError::UnknownStatus(name.to_owned()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn remove_whitespace_should_drop_all_whitespace() {
        assert_eq!(remove_whitespace("1 2 3"), "123");
        assert_eq!(remove_whitespace("1\n2\n3"), "123");
        assert_eq!(remove_whitespace(" \t1\r\n2 3\n"), "123");
        assert_eq!(remove_whitespace("123"), "123");
    }

    #[test]
    fn comparison_should_ignore_whitespace_within_lines() {
        assert!(outputs_match("1 2 3\n", "123"));
        assert!(outputs_match("1  2\t3  \n\n\n4\n", "1 2 3\n4"));
        assert!(outputs_match("", "\n \n"));
    }

    #[test]
    fn comparison_should_respect_line_boundaries() {
        assert!(!outputs_match("1 2\n3", "1\n23"));
        assert!(!outputs_match("1\n2", "1\n2\n3"));
        assert!(!outputs_match("hello", "world"));
    }

    #[tokio::test]
    async fn file_diff_should_check_references_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        fsutil::write_with_mkdir(dir.join("out/1.out"), "1 2\n").unwrap();
        fsutil::write_with_mkdir(dir.join("out/2.out"), "hello\n").unwrap();

        let mut v = OutputFromFiles::discover(dir).unwrap();
        assert_eq!(v.reference_count(), 2);
        assert_eq!(v.handle_output("", "1  2 \n").await.unwrap(), Status::OK);
        assert_eq!(v.handle_output("", "hell0\n").await.unwrap(), Status::ANS);

        let err = v.handle_output("", "extra\n").await.unwrap_err();
        assert!(matches!(
            err,
            VerifierError::MissingReference {
                index: 2,
                available: 2
            }
        ));
        assert_eq!(v.summary(), None);
    }

    #[tokio::test]
    async fn skipped_test_should_keep_references_paired() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        fsutil::write_with_mkdir(dir.join("1.out"), "1\n").unwrap();
        fsutil::write_with_mkdir(dir.join("2.out"), "2\n").unwrap();

        let mut v = OutputFromFiles::discover(dir).unwrap();
        v.skip_test();
        assert_eq!(v.handle_output("", "2\n").await.unwrap(), Status::OK);
    }

    #[tokio::test]
    async fn checksum_should_always_be_ok_and_deterministic() {
        let mut a = OutputChecksum::new();
        assert_eq!(a.handle_output("x", "1 2\n").await.unwrap(), Status::OK);
        assert_eq!(a.handle_output("y", "3\n").await.unwrap(), Status::OK);

        let mut b = OutputChecksum::new();
        b.handle_output("", "123").await.unwrap();

        // sha256("123")
        assert_eq!(a.summary().unwrap(), "sha-256 checksum: a665a459");
        assert_eq!(a.summary(), b.summary());
        assert!(a
            .hexdigest()
            .starts_with("a665a45920422f9d417e4867efdc4fb8"));
    }

    #[tokio::test]
    async fn external_verifier_should_read_input_then_output() {
        let mut v = OutputToVerifier::new("tail -n 1 | grep -qx 3 && echo OK || echo ANS");
        assert_eq!(v.handle_output("1 2\n", "3\n").await.unwrap(), Status::OK);
        assert_eq!(v.handle_output("1 2\n", "4\n").await.unwrap(), Status::ANS);
    }

    #[tokio::test]
    async fn external_verifier_can_report_any_status() {
        for name in ["OK", "ANS", "TLE", "RTE"] {
            let mut v = OutputToVerifier::new(format!("cat > /dev/null; echo {}", name));
            let status = v.handle_output("in\n", "out\n").await.unwrap();
            assert_eq!(status.to_string(), name);
        }
    }

    #[tokio::test]
    async fn external_verifier_contract_violations_should_be_errors() {
        let mut v = OutputToVerifier::new("echo WA");
        let err = v.handle_output("", "").await.unwrap_err();
        assert!(matches!(err, VerifierError::UnknownStatus(s) if s == "WA"));

        let mut v = OutputToVerifier::new("echo OK; exit 3");
        let err = v.handle_output("", "").await.unwrap_err();
        assert!(matches!(err, VerifierError::Failed { status: Some(3), .. }));

        let mut v = OutputToVerifier::new("true").shell("/nonexistent/shell");
        let err = v.handle_output("", "").await.unwrap_err();
        assert!(matches!(err, VerifierError::Spawn { .. }));
    }
}
