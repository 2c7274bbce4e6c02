use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use crossterm::terminal;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Config;
use crate::print_error;
use crate::style;
use crate::testing::{
    group, verifier, GroupResult, InputFromFiles, TestInput, TestOutcome, TestRunner,
    TestVerdict,
};

#[derive(Debug, Clone, PartialEq)]
pub struct GroupReport {
    pub group: PathBuf,
    /// `None` when the group has no input or could not be set up.
    pub result: Option<GroupResult>,
    /// Verdicts in input order, with the name of their input.
    pub verdicts: Vec<(String, TestVerdict)>,
    pub verifier_summary: Option<String>,
    /// Why the group could not be run at all.
    pub error: Option<String>,
}

impl GroupReport {
    fn empty(group: impl Into<PathBuf>) -> Self {
        Self {
            group: group.into(),
            result: None,
            verdicts: Vec::new(),
            verifier_summary: None,
            error: None,
        }
    }

    fn failed(group: impl Into<PathBuf>, e: &anyhow::Error) -> Self {
        Self {
            error: Some(format!("{:#}", e)),
            ..Self::empty(group)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_none()
    }
}

/// Runs every selected leaf group, one after another.
pub async fn run_tests(cfg: &Config, show_progress: bool) -> Result<Vec<GroupReport>> {
    println!("Testing config:");
    println!("{}", cfg);
    println!();

    let groups = group::resolve_leaf_groups(&cfg.test_dir, &cfg.groups)
        .context("Failed to resolve test groups")?;
    if groups.is_empty() {
        log::warn!("No group matched in {}", cfg.test_dir.to_string_lossy());
    }

    let mut reports = Vec::with_capacity(groups.len());
    for g in &groups {
        let report = match self::run_group(g, cfg, show_progress).await {
            Ok(report) => report,
            Err(e) => {
                print_error!("Error: {:#}", e);
                println!();
                GroupReport::failed(g, &e)
            }
        };
        reports.push(report);
    }

    let completed: Vec<_> = reports.iter().filter_map(|r| r.result.as_ref()).collect();
    if completed.len() > 1 {
        let total = completed.iter().fold(GroupResult::new(), |mut acc, r| {
            acc.merge(r);
            acc
        });
        println!("Total:");
        println!("{}", total.summary());
    }
    Ok(reports)
}

/// Runs the tests of one leaf group in input order.
/// With `break_on_error`, stops at the first test that is not OK.
pub async fn run_group(
    group_dir: impl AsRef<Path>,
    cfg: &Config,
    show_progress: bool,
) -> Result<GroupReport> {
    let group_dir = group_dir.as_ref();
    println!("Group: {}", group_dir.to_string_lossy());

    let mut input = InputFromFiles::discover(group_dir).context("Failed to find test inputs")?;
    let test_count = input.test_count();
    if test_count == 0 {
        print_error!("Error: empty group");
        println!();
        return Ok(GroupReport::empty(group_dir));
    }

    let mut verifier = verifier::from_config(cfg, group_dir, test_count)
        .context("Failed to prepare output verification")?;
    let runner = TestRunner::from_config(cfg);
    log::debug!("Running: {}", runner.get_program());

    let bar = self::new_progress_bar(test_count, show_progress);
    let mut result = GroupResult::new();
    let mut verdicts = Vec::with_capacity(test_count);

    for i in 0..test_count {
        let outcome = match input.next() {
            Ok(data) => runner.run(&data, verifier.as_mut()).await,
            Err(e) => {
                log::error!("{:#}", e);
                verifier.skip_test();
                TestOutcome::harness_failure(&e)
            }
        };
        let verdict = outcome.verdict;
        result.update(verdict);
        verdicts.push((input.current_name().to_owned(), verdict));

        if !verdict.status.is_ok() {
            bar.suspend(|| {
                println!(
                    "{} on {}",
                    style::status_icon(verdict.status),
                    input.current_name()
                );
                if let Some(note) = &outcome.note {
                    print_error!("{}", note);
                }
            });
            if cfg.break_on_error {
                break;
            }
        }
        bar.set_position((i + 1) as u64);
    }
    bar.finish_and_clear();

    let verifier_summary = verifier.summary();
    println!("{}", result.summary());
    if let Some(s) = &verifier_summary {
        println!("{}", s);
    }
    println!();

    Ok(GroupReport {
        group: group_dir.to_owned(),
        result: Some(result),
        verdicts,
        verifier_summary,
        error: None,
    })
}

fn new_progress_bar(total: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    // room for the "<pos>/<len>" counter
    let digits = total.to_string().len();
    let counter_width = 4 + 2 * digits;
    let (cols, _) = terminal::size().unwrap_or((80, 24));
    let bar_len = 80.min((cols as usize).saturating_sub(10 + counter_width)).max(1);

    let style = ProgressStyle::default_bar()
        .template(&format!("[{{bar:{}}}] {{pos:>{}}} / {{len}}", bar_len, digits))
        .unwrap_or_else(|e| {
            log::warn!("Invalid progress bar template: {}", e);
            ProgressStyle::default_bar()
        })
        .progress_chars("#>-");
    ProgressBar::new(total as u64).with_style(style)
}
