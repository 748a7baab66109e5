//! `weld sweep` — bulk-close stale issues whose gating custom field was
//! never filled in.
//!
//! Issues already in a terminal status are left alone, as are issues in
//! excluded sub-projects. The transition suppresses notification mail
//! and zeroes the survey-flag field so nobody gets surveyed about an
//! administrative cleanup.

use crate::config::Config;
use crate::output::{OutputMode, render};
use crate::redmine::RedmineClient;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use weld_core::record::Issue;
use weld_core::runner::StatusFilter;

/// Statuses that mean the issue already reached an end state.
const TERMINAL_STATUSES: [&str; 5] = [
    "Closed",
    "Rejected",
    "Resolved",
    "Feedback",
    "Declined by client",
];

#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Project name, sub-projects included.
    #[arg(short, long)]
    pub project: String,

    /// Custom field whose absence marks an issue as sweepable.
    #[arg(short, long, default_value = "WABI ID")]
    pub gate_field: String,

    /// Status id to transition swept issues to.
    #[arg(short = 't', long, default_value_t = 6)]
    pub to_status: u32,

    /// Note recorded on each swept issue.
    #[arg(short, long, default_value = "Cleaning out old issues.")]
    pub note: String,

    /// Survey-flag custom field id zeroed on transition.
    #[arg(long, default_value_t = 22)]
    pub survey_flag: u64,

    /// Comma-separated sub-project names to skip.
    #[arg(short, long)]
    pub exclude: Option<String>,

    /// Report what would be swept without updating anything.
    #[arg(short, long)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
struct SweptIssue {
    issue_id: u64,
    project: String,
    subject: String,
}

#[derive(Debug, Serialize)]
struct SweepReport {
    swept: Vec<SweptIssue>,
    skipped: usize,
    failures: Vec<String>,
    dry_run: bool,
}

fn sweepable(issue: &Issue, gate_field: &str, exclude: &[String]) -> bool {
    if TERMINAL_STATUSES.contains(&issue.status.name.as_str()) {
        return false;
    }
    if exclude.iter().any(|name| name == &issue.project.name) {
        return false;
    }
    issue.custom_field(gate_field).is_empty()
}

pub fn run_sweep(args: &SweepArgs, config: &Config, output: OutputMode) -> anyhow::Result<()> {
    let client = RedmineClient::new(config);
    let project_id = client.find_project_id(&args.project)?;
    let exclude: Vec<String> = args
        .exclude
        .as_deref()
        .map(|raw| raw.split(',').map(|s| s.trim().to_owned()).collect())
        .unwrap_or_default();

    let issues = client.issues(project_id, &StatusFilter::Open, &[])?;
    let mut report = SweepReport {
        swept: Vec::new(),
        skipped: 0,
        failures: Vec::new(),
        dry_run: args.dry_run,
    };

    for issue in &issues {
        if !sweepable(issue, &args.gate_field, &exclude) {
            report.skipped += 1;
            continue;
        }
        if args.dry_run {
            tracing::info!(issue = issue.id, subject = %issue.subject, "dry run: would sweep");
        } else if let Err(err) =
            client.update_status(issue, args.to_status, &args.note, Some(args.survey_flag))
        {
            tracing::warn!(issue = issue.id, error = %err, "sweep failed");
            report
                .failures
                .push(format!("#{}: {err}", issue.id));
            continue;
        }
        report.swept.push(SweptIssue {
            issue_id: issue.id,
            project: issue.project.name.clone(),
            subject: issue.subject.clone(),
        });
    }

    render(output, &report, |report, out| print_report(report, out))
}

fn print_report(report: &SweepReport, out: &mut dyn Write) -> std::io::Result<()> {
    let prefix = if report.dry_run { "would sweep" } else { "swept" };
    for issue in &report.swept {
        writeln!(
            out,
            "{prefix} {} - issue #{} - '{}'",
            issue.project, issue.issue_id, issue.subject
        )?;
    }
    for failure in &report.failures {
        writeln!(out, "failed {failure}")?;
    }
    writeln!(
        out,
        "\n{} {prefix}, {} skipped, {} failed",
        report.swept.len(),
        report.skipped,
        report.failures.len()
    )
}
