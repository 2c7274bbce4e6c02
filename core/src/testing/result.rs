use std::{collections::BTreeMap, fmt, process, time::Duration};

use strum::IntoEnumIterator as _;

use crate::style::{self, Palette, SemanticColor as _};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl From<process::Output> for ProcessOutput {
    fn from(out: process::Output) -> Self {
        Self {
            status: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into(),
            stderr: String::from_utf8_lossy(&out.stderr).into(),
        }
    }
}

/// Terminal status of a single test.
#[allow(clippy::upper_case_acronyms)]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum Status {
    /// Output accepted.
    OK,
    /// Wrong answer.
    ANS,
    /// Time limit exceeded.
    TLE,
    /// Runtime error: nonzero exit or process-level failure.
    RTE,
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Status::OK
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestVerdict {
    pub status: Status,
    pub elapsed: Duration,
}

impl TestVerdict {
    pub fn new(status: Status, elapsed: Duration) -> Self {
        Self { status, elapsed }
    }
}

/// Running tally of the verdicts of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupResult {
    status_count: BTreeMap<Status, usize>,
    test_count: usize,
    times: Vec<Duration>,
}

impl Default for GroupResult {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupResult {
    pub fn new() -> Self {
        Self {
            status_count: Status::iter().map(|s| (s, 0)).collect(),
            test_count: 0,
            times: Vec::new(),
        }
    }

    pub fn update(&mut self, verdict: TestVerdict) {
        self.times.push(verdict.elapsed);
        *self.status_count.entry(verdict.status).or_default() += 1;
        self.test_count += 1;
    }

    /// Folds `other` into `self`, as if its verdicts had been applied here.
    pub fn merge(&mut self, other: &GroupResult) {
        for (&status, &cnt) in &other.status_count {
            *self.status_count.entry(status).or_default() += cnt;
        }
        self.test_count += other.test_count;
        self.times.extend_from_slice(&other.times);
    }

    pub fn count(&self, status: Status) -> usize {
        self.status_count.get(&status).copied().unwrap_or(0)
    }

    pub fn test_count(&self) -> usize {
        self.test_count
    }

    pub fn times(&self) -> &[Duration] {
        &self.times
    }

    pub fn all_passed(&self) -> bool {
        self.count(Status::OK) == self.test_count
    }

    pub fn time_summary(&self) -> Option<TimeSummary> {
        TimeSummary::new(&self.times)
    }

    pub fn summary(&self) -> String {
        let counts = self
            .status_count
            .iter()
            .map(|(status, cnt)| format!("{} : {}/{}", status, cnt, self.test_count))
            .collect::<Vec<_>>()
            .join("\n");
        let color = if self.all_passed() {
            Palette.success()
        } else {
            Palette.error()
        };
        let counts = style::paint(&counts, color);

        match self.time_summary() {
            Some(t) => format!("{}\n{}", counts, t),
            None => counts,
        }
    }
}

/// Run time statistics, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSummary {
    pub mean: f64,
    pub max: f64,
    pub stdev: f64,
}

impl TimeSummary {
    /// `None` when no time has been recorded.
    pub fn new(times: &[Duration]) -> Option<Self> {
        if times.is_empty() {
            return None;
        }
        let secs: Vec<f64> = times.iter().map(Duration::as_secs_f64).collect();
        let n = secs.len() as f64;
        let mean = secs.iter().sum::<f64>() / n;
        let max = secs.iter().copied().fold(f64::MIN, f64::max);

        // sample standard deviation; a single sample has none
        let stdev = if secs.len() > 1 {
            let var = secs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
            var.sqrt()
        } else {
            0.0
        };

        Some(Self { mean, max, stdev })
    }
}

fn round4(x: f64) -> f64 {
    (x * 1e4).round() / 1e4
}

impl fmt::Display for TimeSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Mean time: {}s", round4(self.mean))?;
        writeln!(f, "Max time: {}s", round4(self.max))?;
        write!(f, "Standard deviation: {}s", round4(self.stdev))
    }
}
