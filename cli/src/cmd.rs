use std::path::PathBuf;

use anyhow::Context as _;
use checker_core::{action, config::PartialConfig};

use crate::{config, util};

#[derive(Debug, clap::Parser)]
#[command(author, version, about = "Simple test runner", long_about = None)]
pub struct Args {
    /// Path to the tested program (run through the shell)
    #[arg(short = 'p', value_name = "PROGRAM")]
    pub program: Option<String>,

    /// Path to the directory containing tests
    #[arg(short = 'd', value_name = "DIRECTORY")]
    pub test_dir: Option<PathBuf>,

    /// Groups in the test directory that should be tested (regular expressions)
    #[arg(short = 'g', value_name = "GROUPS", num_args = 1..)]
    pub groups: Option<Vec<String>>,

    /// Path to a custom verifier
    #[arg(short = 'v', value_name = "VERIFIER", conflicts_with = "sha")]
    pub verifier: Option<String>,

    /// Break on failed tests
    #[arg(short = 'b', value_name = "true|false")]
    pub break_on_error: Option<bool>,

    /// Time limit in seconds after which TLE is raised
    #[arg(short = 't', value_name = "SECONDS")]
    pub timeout: Option<f64>,

    /// The program writes a line 'Time: <seconds>' on stderr; use it as the execution time
    #[arg(long)]
    pub timer: bool,

    /// Calculate SHA-256 of the outputs instead of verifying
    #[arg(long)]
    pub sha: bool,

    /// Shell used to launch the program and the verifier
    #[arg(long, value_name = "SHELL")]
    pub shell: Option<PathBuf>,

    /// Config file to use instead of the nearest checker.toml
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Do not draw progress bars
    #[arg(long)]
    pub no_progress: bool,
}

impl Args {
    /// The command line as the topmost configuration layer.
    /// Flags that are not given leave the lower layers untouched.
    pub fn to_partial_config(&self) -> PartialConfig {
        PartialConfig {
            program: self.program.clone(),
            test_dir: self.test_dir.clone(),
            groups: self.groups.clone(),
            verifier: self.verifier.clone(),
            break_on_error: self.break_on_error,
            timeout: self.timeout,
            timer: self.timer.then_some(true),
            sha: self.sha.then_some(true),
            shell: self.shell.clone(),
        }
    }

    pub async fn exec(&self) -> anyhow::Result<()> {
        let layers = config::resolve_layers(
            self.config_file.as_deref(),
            util::current_dir(),
            self.to_partial_config(),
        )?;
        let cfg = layers.build().context("Invalid configuration")?;

        let _ = action::run_tests(&cfg, !self.no_progress).await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser as _;

    #[test]
    fn args_should_map_to_partial_config() {
        let args = Args::try_parse_from([
            "checker", "-p", "./a.out", "-d", "cases", "-g", "grp1", "grp2", "-b", "false", "-t",
            "1.5", "--timer",
        ])
        .unwrap();
        let p = args.to_partial_config();

        assert_eq!(p.program.as_deref(), Some("./a.out"));
        assert_eq!(p.test_dir, Some(PathBuf::from("cases")));
        assert_eq!(p.groups, Some(vec!["grp1".to_owned(), "grp2".to_owned()]));
        assert_eq!(p.break_on_error, Some(false));
        assert_eq!(p.timeout, Some(1.5));
        assert_eq!(p.timer, Some(true));
        assert_eq!(p.sha, None);
        assert_eq!(p.verifier, None);
    }

    #[test]
    fn absent_flags_should_not_override() {
        let args = Args::try_parse_from(["checker"]).unwrap();
        assert_eq!(args.to_partial_config(), PartialConfig::default());
    }

    #[test]
    fn sha_and_verifier_should_conflict() {
        let res = Args::try_parse_from(["checker", "--sha", "-v", "./verify"]);
        assert!(res.is_err());
    }

    #[test]
    fn break_flag_accepts_only_true_or_false() {
        assert!(Args::try_parse_from(["checker", "-b", "true"]).is_ok());
        assert!(Args::try_parse_from(["checker", "-b", "maybe"]).is_err());
    }
}
