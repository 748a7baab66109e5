//! `weld spent` — issue-lifespan statistics from logged time entries.
//!
//! For every issue with time logged in the window, the span from the
//! first to the last spent-on date is bucketed into lifespan
//! categories. Two adjustments keep the buckets honest: issues created
//! before the window start their span at creation, and issues still
//! open at the window end either extend to the window end (when already
//! long-running) or are dropped as not yet classifiable.

use crate::config::Config;
use crate::output::{OutputMode, render};
use crate::redmine::{RedmineClient, TimeEntry};
use chrono::{NaiveDate, NaiveDateTime};
use clap::Args;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use weld_core::record::Issue;
use weld_core::runner::StatusFilter;

const BUCKET_LABELS: [&str; 5] = ["<1 day", "<1 week", "<1 month", "<6 months", "6+ months"];

/// Statuses meaning the issue is still being worked.
const OPEN_STATUSES: [&str; 3] = ["New", "In Progress", "Pending"];

/// An open issue running at least this long lands in the last bucket
/// regardless of what happens to it later.
const LONG_RUNNING_DAYS: i64 = 180;

#[derive(Args, Debug)]
pub struct SpentArgs {
    /// Project name, sub-projects included.
    #[arg(short, long)]
    pub project: String,

    /// Window start, YYYY-MM-DD.
    #[arg(short, long)]
    pub from: NaiveDate,

    /// Window end, YYYY-MM-DD.
    #[arg(short, long)]
    pub to: NaiveDate,

    /// Only count time entries logged under this activity name.
    #[arg(short, long)]
    pub activity: Option<String>,

    /// List the issue ids inside each bucket.
    #[arg(short, long)]
    pub long_output: bool,
}

/// First and last spent-on date observed for one issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    first: NaiveDate,
    last: NaiveDate,
}

impl Span {
    fn days(self) -> i64 {
        (self.last - self.first).num_days()
    }
}

#[derive(Debug, Serialize)]
struct BucketLine {
    label: &'static str,
    count: usize,
    issue_ids: Vec<u64>,
}

#[derive(Debug, Serialize)]
struct SpentReport {
    from: NaiveDate,
    to: NaiveDate,
    classified: usize,
    unclassified_open: usize,
    buckets: Vec<BucketLine>,
}

fn bucket_index(days: i64) -> usize {
    if days < 1 {
        0
    } else if days < 7 {
        1
    } else if days < 30 {
        2
    } else if days < LONG_RUNNING_DAYS {
        3
    } else {
        4
    }
}

fn bucket_for(days: i64) -> &'static str {
    BUCKET_LABELS[bucket_index(days)]
}

/// Fold time entries into per-issue first/last spans. Entries without
/// an issue reference or with an unparseable date are dropped.
fn collect_spans(entries: &[TimeEntry], activity: Option<&str>) -> BTreeMap<u64, Span> {
    let mut spans: BTreeMap<u64, Span> = BTreeMap::new();
    for entry in entries {
        if let Some(wanted) = activity {
            let matches = entry
                .activity
                .as_ref()
                .is_some_and(|a| a.name == wanted);
            if !matches {
                continue;
            }
        }
        let Some(issue) = &entry.issue else { continue };
        let Ok(date) = NaiveDate::parse_from_str(&entry.spent_on, "%Y-%m-%d") else {
            tracing::warn!(issue = issue.id, spent_on = %entry.spent_on, "bad spent-on date");
            continue;
        };
        spans
            .entry(issue.id)
            .and_modify(|span| {
                span.first = span.first.min(date);
                span.last = span.last.max(date);
            })
            .or_insert(Span { first: date, last: date });
    }
    spans
}

fn creation_date(issue: &Issue) -> Option<NaiveDate> {
    issue
        .created_on
        .as_deref()
        .and_then(|raw| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%SZ").ok())
        .map(|dt| dt.date())
}

/// Clamp spans to reality: work that started before the window starts
/// at issue creation, and still-open issues either extend to the window
/// end or are dropped as not yet classifiable.
fn adjust_spans(
    spans: &mut BTreeMap<u64, Span>,
    issues: &BTreeMap<u64, Issue>,
    from: NaiveDate,
    to: NaiveDate,
) -> usize {
    let mut too_young = Vec::new();
    for (id, span) in spans.iter_mut() {
        let Some(issue) = issues.get(id) else { continue };

        if let Some(created) = creation_date(issue) {
            if created < from {
                span.first = created;
            }
        }

        if OPEN_STATUSES.contains(&issue.status.name.as_str()) {
            if (to - span.first).num_days() > LONG_RUNNING_DAYS {
                span.last = to;
            } else {
                tracing::debug!(issue = id, "still open and young, not classifiable yet");
                too_young.push(*id);
            }
        }
    }
    for id in &too_young {
        spans.remove(id);
    }
    too_young.len()
}

fn build_report(
    spans: &BTreeMap<u64, Span>,
    from: NaiveDate,
    to: NaiveDate,
    unclassified_open: usize,
) -> SpentReport {
    let mut buckets: Vec<BucketLine> = BUCKET_LABELS
        .iter()
        .map(|label| BucketLine {
            label,
            count: 0,
            issue_ids: Vec::new(),
        })
        .collect();

    for (&issue_id, span) in spans {
        let line = &mut buckets[bucket_index(span.days())];
        line.count += 1;
        line.issue_ids.push(issue_id);
    }

    SpentReport {
        from,
        to,
        classified: spans.len(),
        unclassified_open,
        buckets,
    }
}

pub fn run_spent(args: &SpentArgs, config: &Config, output: OutputMode) -> anyhow::Result<()> {
    let client = RedmineClient::new(config);
    let project_id = client.find_project_id(&args.project)?;

    let from = args.from.format("%Y-%m-%d").to_string();
    let to = args.to.format("%Y-%m-%d").to_string();
    let entries = client.time_entries(project_id, &from, &to)?;
    let mut spans = collect_spans(&entries, args.activity.as_deref());
    tracing::info!(
        entries = entries.len(),
        issues = spans.len(),
        "time entries collected"
    );

    let issues = if spans.is_empty() {
        BTreeMap::new()
    } else {
        let id_list = spans
            .keys()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        client
            .issues(
                project_id,
                &StatusFilter::All,
                &[("issue_id".to_owned(), id_list)],
            )?
            .into_iter()
            .map(|issue| (issue.id, issue))
            .collect()
    };

    let dropped = adjust_spans(&mut spans, &issues, args.from, args.to);
    let report = build_report(&spans, args.from, args.to, dropped);

    let long_output = args.long_output;
    render(output, &report, |report, out| {
        print_report(report, long_output, out)
    })
}

fn print_report(
    report: &SpentReport,
    long_output: bool,
    out: &mut dyn Write,
) -> std::io::Result<()> {
    writeln!(out, "issue lifespans, {} to {}:", report.from, report.to)?;
    for line in &report.buckets {
        writeln!(out, "  {:<10} {}", line.label, line.count)?;
        if long_output && !line.issue_ids.is_empty() {
            let ids: Vec<String> = line.issue_ids.iter().map(|id| format!("#{id}")).collect();
            writeln!(out, "             {}", ids.join(", "))?;
        }
    }
    writeln!(
        out,
        "\n{} classified, {} open issues too young to classify",
        report.classified, report.unclassified_open
    )
}
