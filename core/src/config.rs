use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;
use regex::Regex;
use serde::Deserialize;

pub const INPUT_EXTENSION: &str = "in";
pub const OUTPUT_EXTENSION: &str = "out";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No directory `{}`", .0.to_string_lossy())]
    NoTestDir(PathBuf),

    #[error("Invalid timeout {0}: must be a positive number of seconds")]
    InvalidTimeout(f64),

    #[error("Invalid group pattern '{pattern}': {source}")]
    InvalidGroupPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Cannot calculate checksum and use a verifier ('{0}') at the same time")]
    ConflictingVerification(String),
}

/// How the produced output of each test is judged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Compare against the `.out` reference file paired with the input.
    FileDiff,
    /// Accumulate a SHA-256 over the outputs instead of verifying.
    Checksum,
    /// Delegate to an external command reporting the status name.
    External { verifier: String },
}

/// Group selection pattern. Matches only when the whole name matches.
#[derive(Debug, Clone)]
pub struct GroupPattern {
    source: String,
    re: Regex,
}

impl GroupPattern {
    pub const MATCH_ALL: &str = ".*";

    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        Regex::new(&format!("^(?:{})$", pattern))
            .map(|re| Self {
                source: pattern.to_owned(),
                re,
            })
            .map_err(|source| ConfigError::InvalidGroupPattern {
                pattern: pattern.to_owned(),
                source,
            })
    }

    pub fn match_all() -> Self {
        Self {
            source: Self::MATCH_ALL.to_owned(),
            re: Regex::clone(lazy_regex::regex!("^(?:.*)$")),
        }
    }

    pub fn is_full_match(&self, name: &str) -> bool {
        self.re.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for GroupPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Resolved, validated run parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub program: String,
    pub test_dir: PathBuf,
    pub groups: Vec<GroupPattern>,
    pub break_on_error: bool,
    pub timeout: Option<Duration>,
    pub timer: bool,
    pub verification: Verification,
    pub shell: PathBuf,
}

impl Config {
    pub const FILENAME: &str = "checker.toml";

    pub fn default_program() -> &'static str {
        if cfg!(windows) {
            "main"
        } else {
            "./main"
        }
    }

    pub fn default_test_dir() -> PathBuf {
        PathBuf::from("tests")
    }

    pub fn default_shell() -> PathBuf {
        PathBuf::from("/bin/sh")
    }

    /// Find config file in ancestor dirs, including current dir.
    pub fn find_file_in_ancestors(cur_dir: impl AsRef<Path>) -> Option<PathBuf> {
        cur_dir
            .as_ref()
            .ancestors()
            .map(|dir| dir.join(Self::FILENAME))
            .find(|path| path.is_file())
    }

    fn group_string(&self) -> String {
        self.groups
            .iter()
            .map(GroupPattern::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn timeout_string(&self) -> String {
        match self.timeout {
            Some(t) => format!("{}s", t.as_secs_f64()),
            None => "unset".to_owned(),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "program: {}", self.program)?;
        writeln!(f, "test_dir: {}", self.test_dir.to_string_lossy())?;
        writeln!(f, "groups: {}", self.group_string())?;
        writeln!(f, "break on error: {}", self.break_on_error)?;
        write!(f, "timeout: {}", self.timeout_string())?;

        match &self.verification {
            Verification::FileDiff => {}
            Verification::Checksum => write!(f, "\nCalculating SHA-256 instead of verifying.")?,
            Verification::External { verifier } => write!(f, "\nverifier: {}", verifier)?,
        }
        if self.timer {
            write!(f, "\nReading execution time from stderr")?;
        }
        Ok(())
    }
}

/// One layer of configuration: a config file or the command line.
/// Later layers override earlier ones field by field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialConfig {
    pub program: Option<String>,
    pub test_dir: Option<PathBuf>,
    pub groups: Option<Vec<String>>,
    pub verifier: Option<String>,
    pub break_on_error: Option<bool>,
    pub timeout: Option<f64>,
    pub timer: Option<bool>,
    pub sha: Option<bool>,
    pub shell: Option<PathBuf>,
}

impl PartialConfig {
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn from_toml_file(filepath: impl AsRef<Path>) -> anyhow::Result<Self> {
        let filepath = filepath.as_ref();
        let toml = fsutil::read_to_string(filepath).context("Cannot read a config file")?;
        Self::from_toml(&toml).with_context(|| format!("Invalid config TOML: {:?}", filepath))
    }

    /// Overlays `upper` on `self`; every field set in `upper` wins.
    pub fn merge(self, upper: PartialConfig) -> Self {
        Self {
            program: upper.program.or(self.program),
            test_dir: upper.test_dir.or(self.test_dir),
            groups: upper.groups.or(self.groups),
            verifier: upper.verifier.or(self.verifier),
            break_on_error: upper.break_on_error.or(self.break_on_error),
            timeout: upper.timeout.or(self.timeout),
            timer: upper.timer.or(self.timer),
            sha: upper.sha.or(self.sha),
            shell: upper.shell.or(self.shell),
        }
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        let test_dir = self.test_dir.unwrap_or_else(Config::default_test_dir);
        if !test_dir.is_dir() {
            return Err(ConfigError::NoTestDir(test_dir));
        }

        let timeout = match self.timeout {
            None => None,
            Some(t) if t > 0.0 => Some(
                Duration::try_from_secs_f64(t).map_err(|_| ConfigError::InvalidTimeout(t))?,
            ),
            Some(t) => return Err(ConfigError::InvalidTimeout(t)),
        };

        let groups = match self.groups {
            Some(pats) if !pats.is_empty() => pats
                .iter()
                .map(|p| GroupPattern::parse(p))
                .collect::<Result<Vec<_>, _>>()?,
            _ => vec![GroupPattern::match_all()],
        };

        let sha = self.sha.unwrap_or(false);
        let verification = match (sha, self.verifier) {
            (true, Some(v)) => return Err(ConfigError::ConflictingVerification(v)),
            (true, None) => Verification::Checksum,
            (false, Some(verifier)) => Verification::External { verifier },
            (false, None) => Verification::FileDiff,
        };

        Ok(Config {
            program: self
                .program
                .unwrap_or_else(|| Config::default_program().to_owned()),
            test_dir,
            groups,
            break_on_error: self.break_on_error.unwrap_or(true),
            timeout,
            timer: self.timer.unwrap_or(false),
            verification,
            shell: self.shell.unwrap_or_else(Config::default_shell),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn existing_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn group_pattern_should_require_full_match() {
        let p = GroupPattern::parse("grp1").unwrap();
        assert!(p.is_full_match("grp1"));
        assert!(!p.is_full_match("grp10"));
        assert!(!p.is_full_match("xgrp1"));

        let p = GroupPattern::parse("grp1|sub.*").unwrap();
        assert!(p.is_full_match("grp1"));
        assert!(p.is_full_match("subtask3"));
        assert!(!p.is_full_match("grp1x"));

        assert!(GroupPattern::match_all().is_full_match("anything"));
    }

    #[test]
    fn invalid_group_pattern_should_be_error() {
        let err = GroupPattern::parse("(unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidGroupPattern { .. }));
    }

    #[test]
    fn build_should_apply_defaults() {
        let dir = existing_dir();
        let cfg = PartialConfig {
            test_dir: Some(dir.path().to_owned()),
            ..Default::default()
        }
        .build()
        .unwrap();

        assert_eq!(cfg.program, Config::default_program());
        assert_eq!(cfg.groups, vec![GroupPattern::match_all()]);
        assert!(cfg.break_on_error);
        assert_eq!(cfg.timeout, None);
        assert!(!cfg.timer);
        assert_eq!(cfg.verification, Verification::FileDiff);
        assert_eq!(cfg.shell, Path::new("/bin/sh"));
    }

    #[test]
    fn missing_test_dir_should_be_error() {
        let dir = existing_dir();
        let err = PartialConfig {
            test_dir: Some(dir.path().join("missing")),
            ..Default::default()
        }
        .build()
        .unwrap_err();
        assert!(matches!(err, ConfigError::NoTestDir(_)));
    }

    #[test]
    fn non_positive_timeout_should_be_error() {
        let dir = existing_dir();
        for t in [0.0, -1.5, f64::NAN] {
            let err = PartialConfig {
                test_dir: Some(dir.path().to_owned()),
                timeout: Some(t),
                ..Default::default()
            }
            .build()
            .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidTimeout(_)));
        }
    }

    #[test]
    fn verification_mode_should_be_derived_from_flags() {
        let dir = existing_dir();
        let base = PartialConfig {
            test_dir: Some(dir.path().to_owned()),
            ..Default::default()
        };

        let cfg = base
            .clone()
            .merge(PartialConfig {
                sha: Some(true),
                ..Default::default()
            })
            .build()
            .unwrap();
        assert_eq!(cfg.verification, Verification::Checksum);

        let cfg = base
            .clone()
            .merge(PartialConfig {
                verifier: Some("./verify".into()),
                ..Default::default()
            })
            .build()
            .unwrap();
        assert_eq!(
            cfg.verification,
            Verification::External {
                verifier: "./verify".into()
            }
        );

        let err = base
            .merge(PartialConfig {
                sha: Some(true),
                verifier: Some("./verify".into()),
                ..Default::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ConflictingVerification(_)));
    }

    #[test]
    fn upper_layer_should_win_on_merge() {
        let file = PartialConfig::from_toml(
            r#"
            program = "python3 main.py"
            groups = ["grp1", "grp2"]
            timeout = 2.5
            break_on_error = false
            "#,
        )
        .unwrap();
        let args = PartialConfig {
            timeout: Some(1.0),
            timer: Some(true),
            ..Default::default()
        };

        let merged = file.merge(args);
        assert_eq!(merged.program.as_deref(), Some("python3 main.py"));
        assert_eq!(
            merged.groups,
            Some(vec!["grp1".to_owned(), "grp2".to_owned()])
        );
        assert_eq!(merged.timeout, Some(1.0));
        assert_eq!(merged.break_on_error, Some(false));
        assert_eq!(merged.timer, Some(true));
    }

    #[test]
    fn unknown_key_in_toml_should_be_rejected() {
        assert!(PartialConfig::from_toml("colour = true").is_err());
    }

    #[test]
    fn display_should_echo_config() {
        let dir = existing_dir();
        let cfg = PartialConfig {
            program: Some("./a.out".into()),
            test_dir: Some(dir.path().to_owned()),
            groups: Some(vec!["g1".into(), "g2".into()]),
            timeout: Some(1.5),
            sha: Some(true),
            timer: Some(true),
            ..Default::default()
        }
        .build()
        .unwrap();

        let s = cfg.to_string();
        assert!(s.starts_with("program: ./a.out\n"), "{}", s);
        assert!(s.contains("groups: g1 g2\n"), "{}", s);
        assert!(s.contains("break on error: true\n"), "{}", s);
        assert!(s.contains("timeout: 1.5s"), "{}", s);
        assert!(s.contains("Calculating SHA-256 instead of verifying."), "{}", s);
        assert!(s.ends_with("Reading execution time from stderr"), "{}", s);
    }

    #[test]
    fn config_file_should_be_found_in_ancestors() {
        let dir = existing_dir();
        let nested = dir.path().join("a/b/c");
        fsutil::mkdir_all(&nested).unwrap();
        assert_eq!(Config::find_file_in_ancestors(&nested), None);

        fsutil::write(dir.path().join("a").join(Config::FILENAME), "").unwrap();
        assert_eq!(
            Config::find_file_in_ancestors(&nested),
            Some(dir.path().join("a").join(Config::FILENAME))
        );
    }
}
