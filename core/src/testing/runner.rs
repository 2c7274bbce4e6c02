use std::{io, path::PathBuf, process::Stdio, time::Duration};

use anyhow::Context as _;
use lazy_regex::{lazy_regex, Lazy, Regex};
use tokio::{io::AsyncWriteExt as _, process::Command};

use super::{result::*, verifier::OutputVerifier};
use crate::config::Config;

static RE_TIME_MARKER: Lazy<Regex> =
    lazy_regex!(r"Time:\s*([+-]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?)");

/// Raw result of running the program once, before output verification.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub status: Status,
    pub elapsed: Duration,
    /// `None` when the process was killed on timeout.
    pub output: Option<ProcessOutput>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestOutcome {
    pub verdict: TestVerdict,
    pub output: Option<ProcessOutput>,
    /// Why the harness could not judge the test normally, if it could not.
    pub note: Option<String>,
}

impl TestOutcome {
    /// RTE for a test the harness could not carry out, e.g. because the
    /// program could not be spawned or its input could not be read.
    pub fn harness_failure(e: &anyhow::Error) -> Self {
        Self {
            verdict: TestVerdict::new(Status::RTE, Duration::ZERO),
            output: None,
            note: Some(format!("{:#}", e)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestRunner {
    program: String,
    shell: PathBuf,
    timeout: Option<Duration>,
    read_time_from_stderr: bool,
}

impl TestRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            shell: Config::default_shell(),
            timeout: None,
            read_time_from_stderr: false,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.program.clone())
            .shell(cfg.shell.clone())
            .timeout(cfg.timeout)
            .read_time_from_stderr(cfg.timer)
    }

    pub fn shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn read_time_from_stderr(mut self, enabled: bool) -> Self {
        self.read_time_from_stderr = enabled;
        self
    }

    pub fn get_program(&self) -> &str {
        &self.program
    }

    /// Runs the program once with `input` on its stdin and classifies the
    /// process-level result: OK, RTE (nonzero exit) or TLE.
    pub async fn execute(&self, input: &str) -> anyhow::Result<Execution> {
        let start_at = tokio::time::Instant::now();

        let mut cmd = Command::new(&self.shell);
        cmd.args(["-c", &self.program])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // own process group, killed as a whole on timeout
        #[cfg(unix)]
        cmd.process_group(0);

        let mut proc = cmd.spawn().with_context(|| {
            format!(
                "Failed to spawn '{} -c {}'",
                self.shell.to_string_lossy(),
                &self.program
            )
        })?;
        let mut group = ProcessGroup(proc.id());
        let mut stdin = proc.stdin.take().context("Failed to open stdin")?;
        let mut stdout = proc.stdout.take().context("Failed to open stdout")?;
        let mut stderr = proc.stderr.take().context("Failed to open stderr")?;

        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();

        let res = {
            let fut_stdin = async {
                let res = stdin.write_all(input.as_bytes()).await;
                // closing stdin lets the program see EOF
                drop(stdin);
                match res {
                    // the program is free not to read its input
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                    res => res,
                }
            };
            let fut_stdout = tokio::io::copy(&mut stdout, &mut stdout_buf);
            let fut_stderr = tokio::io::copy(&mut stderr, &mut stderr_buf);
            let fut_exit_status = proc.wait();
            let fut_all = async {
                tokio::try_join!(fut_stdin, fut_stdout, fut_stderr, fut_exit_status)
                    .context("Failed to communicate with subprocess")
            };

            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, fut_all).await,
                None => Ok(fut_all.await),
            }
        };

        let elapsed = start_at.elapsed();

        match res {
            Err(_) => {
                group.kill();
                proc.kill()
                    .await
                    .unwrap_or_else(|e| log::warn!("Failed to kill TLE process: {:#}", e));
                Ok(Execution {
                    status: Status::TLE,
                    // TLE always reports exactly the limit
                    elapsed: self.timeout.unwrap_or(elapsed),
                    output: None,
                })
            }

            Ok(Err(e)) => Err(e),

            Ok(Ok((_, _, _, exit_status))) => {
                let status = if exit_status.success() {
                    Status::OK
                } else {
                    Status::RTE
                };
                Ok(Execution {
                    status,
                    elapsed,
                    output: Some(ProcessOutput {
                        status: exit_status.code(),
                        stdout: String::from_utf8_lossy(&stdout_buf).into(),
                        stderr: String::from_utf8_lossy(&stderr_buf).into(),
                    }),
                })
            }
        }
    }

    /// Runs one test: executes the program, then lets `verifier` judge the
    /// output when the process itself succeeded.
    pub async fn run(&self, input: &str, verifier: &mut dyn OutputVerifier) -> TestOutcome {
        let exec = match self.execute(input).await {
            Ok(exec) => exec,
            Err(e) => {
                log::error!("{:#}", e);
                verifier.skip_test();
                return TestOutcome::harness_failure(&e);
            }
        };

        let output = match exec.output {
            Some(output) if exec.status.is_ok() => output,
            output => {
                verifier.skip_test();
                return TestOutcome {
                    verdict: TestVerdict::new(exec.status, exec.elapsed),
                    output,
                    note: None,
                }
            }
        };

        let mut elapsed = exec.elapsed;
        if self.read_time_from_stderr {
            if let Some(reported) = self::parse_reported_time(&output.stderr) {
                elapsed = reported;
            }
        }

        match verifier.handle_output(input, &output.stdout).await {
            Ok(status) => TestOutcome {
                verdict: TestVerdict::new(status, elapsed),
                output: Some(output),
                note: None,
            },
            Err(e) => TestOutcome {
                verdict: TestVerdict::new(Status::RTE, elapsed),
                output: Some(output),
                note: Some(format!("Verification failed: {}", e)),
            },
        }
    }
}

/// Process group led by the spawned shell. Killed as a whole when dropped,
/// which also takes down programs the shell left running in the background.
struct ProcessGroup(Option<u32>);

impl ProcessGroup {
    fn kill(&mut self) {
        let Some(id) = self.0.take() else {
            return
        };
        #[cfg(unix)]
        {
            use rustix::{
                io::Errno,
                process::{kill_process_group, Pid, Signal},
            };
            let Some(pgid) = i32::try_from(id).ok().and_then(Pid::from_raw) else {
                return
            };
            match kill_process_group(pgid, Signal::KILL) {
                // nothing left in the group
                Ok(()) | Err(Errno::SRCH) => {}
                Err(e) => log::warn!("Failed to kill process group {}: {}", id, e),
            }
        }
        #[cfg(not(unix))]
        let _ = id;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Execution time the program reported about itself on stderr as a line
/// containing `Time: <seconds>`. The last such line wins.
pub fn parse_reported_time(stderr: &str) -> Option<Duration> {
    stderr
        .lines()
        .filter_map(|line| RE_TIME_MARKER.captures(line))
        .filter_map(|caps| caps[1].parse::<f64>().ok())
        .filter_map(|secs| Duration::try_from_secs_f64(secs).ok())
        .last()
}
