//! `weld survey` — queue feedback-survey mail for recently finished
//! issues.
//!
//! Issues are selected either explicitly by id or by walking each
//! candidate's change history for the status transition that resolved
//! or closed it inside the requested date window. For every selected
//! issue with a contact email on file, the survey message is written to
//! the outbox, a dispatch note is appended to the issue description,
//! and the survey flag is zeroed so the issue is never surveyed twice.

use crate::config::Config;
use crate::mail::{FileOutbox, MailSender, Message};
use crate::output::{OutputMode, render};
use crate::redmine::{Journal, RedmineClient};
use anyhow::bail;
use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use weld_core::record::Issue;
use weld_core::runner::StatusFilter;

/// Status ids counting as "finished" for survey purposes.
const RESOLVED: u32 = 3;
const CLOSED: u32 = 5;

#[derive(Args, Debug)]
pub struct SurveyArgs {
    /// Project names to scan (repeatable).
    #[arg(short, long)]
    pub project: Vec<String>,

    /// Window start, YYYY-MM-DD.
    #[arg(short, long)]
    pub start_date: Option<NaiveDate>,

    /// Window end, YYYY-MM-DD.
    #[arg(short, long)]
    pub end_date: Option<NaiveDate>,

    /// Comma-separated issue ids to survey instead of a date window.
    #[arg(short, long)]
    pub issues: Option<String>,

    /// Link to the survey form, included in the message body.
    #[arg(short, long)]
    pub form_url: String,

    /// Custom field id holding the contact email.
    #[arg(long, default_value_t = 18)]
    pub contact_field: u64,

    /// Survey-flag custom field id; selects candidates and is zeroed
    /// after dispatch.
    #[arg(long, default_value_t = 22)]
    pub survey_flag: u64,

    /// Skip issues whose subject starts with this prefix.
    #[arg(long)]
    pub skip_prefix: Option<String>,

    /// Directory the rendered messages are written into.
    #[arg(short, long, default_value = "outbox")]
    pub outbox: PathBuf,

    /// Render messages and report without writing or updating anything.
    #[arg(short, long)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
struct SurveyReport {
    queued: Vec<QueuedSurvey>,
    no_contact: Vec<u64>,
    skipped: usize,
    failures: Vec<String>,
    dry_run: bool,
}

#[derive(Debug, Serialize)]
struct QueuedSurvey {
    issue_id: u64,
    to: String,
}

/// Date the issue was last moved to a finished status, if that change
/// falls inside the window. Walks the history newest-first and judges
/// only the most recent status change, so reopened issues are not
/// surveyed off an old transition.
fn finished_within(journals: &[Journal], start: NaiveDate, end: NaiveDate) -> Option<NaiveDate> {
    for journal in journals.iter().rev() {
        for detail in &journal.details {
            if detail.name != "status_id" {
                continue;
            }
            let finished = detail
                .new_value
                .as_deref()
                .and_then(|v| v.parse::<u32>().ok())
                .is_some_and(|v| v == RESOLVED || v == CLOSED);
            if !finished {
                return None;
            }
            let date = NaiveDateTime::parse_from_str(&journal.created_on, "%Y-%m-%dT%H:%M:%SZ")
                .ok()?
                .date();
            return (date >= start && date <= end).then_some(date);
        }
    }
    None
}

fn contact_email(issue: &Issue, contact_field: u64) -> Option<String> {
    issue
        .custom_fields
        .iter()
        .find(|field| field.id == contact_field)
        .and_then(|field| field.value.as_str())
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .map(str::to_owned)
}

fn render_message(issue: &Issue, to: &str, form_url: &str) -> Message {
    let body = format!(
        "Thank you for using our support recently in your project '{subject}'. \
To help us improve our services, we kindly ask that you fill out a short, \
~2 minutes, anonymous survey.\n\n\
Survey link:  {form_url}\n\n\
If someone else was the main contact for your project, please feel free to \
get their input on any question where applicable.\n\
Thanks in advance and have a nice day!\n\n\
Best regards,\nThe Support Team",
        subject = issue.subject
    );
    Message {
        to: to.to_owned(),
        subject: format!("User Survey - Feedback for '{}'", issue.subject),
        body,
    }
}

fn parse_issue_ids(raw: &str) -> anyhow::Result<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>()
                .map_err(|_| anyhow::anyhow!("invalid issue id '{part}'"))
        })
        .collect()
}

pub fn run_survey(args: &SurveyArgs, config: &Config, output: OutputMode) -> anyhow::Result<()> {
    let window = match (&args.issues, args.start_date, args.end_date) {
        (Some(_), None, None) => None,
        (None, Some(start), Some(end)) if !args.project.is_empty() => Some((start, end)),
        (None, Some(_), Some(_)) => {
            bail!("date-window selection needs at least one --project")
        }
        (Some(_), _, _) => bail!("--issues and a date window are mutually exclusive"),
        _ => bail!("provide either --start-date and --end-date, or --issues"),
    };

    let client = RedmineClient::new(config);
    let outbox = FileOutbox::new(&args.outbox);

    let candidates = match window {
        None => {
            let mut found = Vec::new();
            for issue_id in parse_issue_ids(args.issues.as_deref().unwrap_or_default())? {
                match client.fetch_issue(issue_id)? {
                    Some(issue) => found.push(issue),
                    None => tracing::warn!(issue = issue_id, "issue not found, skipping"),
                }
            }
            found
        }
        Some((start, end)) => select_by_window(&client, args, start, end)?,
    };

    let mut report = SurveyReport {
        queued: Vec::new(),
        no_contact: Vec::new(),
        skipped: 0,
        failures: Vec::new(),
        dry_run: args.dry_run,
    };

    for issue in &candidates {
        let Some(email) = contact_email(issue, args.contact_field) else {
            tracing::warn!(issue = issue.id, "no contact email on file");
            report.no_contact.push(issue.id);
            continue;
        };
        let message = render_message(issue, &email, &args.form_url);

        if args.dry_run {
            tracing::info!(issue = issue.id, to = %email, "dry run: would queue survey");
            report.queued.push(QueuedSurvey {
                issue_id: issue.id,
                to: email,
            });
            continue;
        }

        if let Err(err) = dispatch(&client, &outbox, issue, &message, args.survey_flag) {
            tracing::warn!(issue = issue.id, error = %err, "survey dispatch failed");
            report.failures.push(format!("#{}: {err}", issue.id));
            continue;
        }
        report.queued.push(QueuedSurvey {
            issue_id: issue.id,
            to: email,
        });
    }

    render(output, &report, |report, out| print_report(report, out))
}

/// Issues in finished statuses whose closing transition falls inside
/// the window, restricted to those still flagged for survey.
fn select_by_window(
    client: &RedmineClient,
    args: &SurveyArgs,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<Vec<Issue>> {
    let flag_param = format!("cf_{}", args.survey_flag);
    let mut selected = Vec::new();

    for project in &args.project {
        let project_id = client.find_project_id(project)?;
        let mut candidates = Vec::new();
        for status in [RESOLVED, CLOSED] {
            candidates.extend(client.issues(
                project_id,
                &StatusFilter::Id(status),
                &[
                    ("updated_on".to_owned(), format!(">={start}")),
                    (flag_param.clone(), "1".to_owned()),
                ],
            )?);
        }

        for issue in candidates {
            if let Some(prefix) = args.skip_prefix.as_deref() {
                if issue.subject.starts_with(prefix) {
                    tracing::debug!(issue = issue.id, "subject prefix excluded");
                    continue;
                }
            }
            let journals = client.journals(issue.id)?;
            match finished_within(&journals, start, end) {
                Some(date) => {
                    tracing::debug!(issue = issue.id, %date, "finished inside window");
                    selected.push(issue);
                }
                None => tracing::debug!(issue = issue.id, "finished outside window"),
            }
        }
    }
    Ok(selected)
}

fn dispatch(
    client: &RedmineClient,
    outbox: &FileOutbox,
    issue: &Issue,
    message: &Message,
    survey_flag: u64,
) -> anyhow::Result<()> {
    outbox.send(message)?;
    let note = format!(
        "Survey email sent to {} on {}.",
        message.to,
        Local::now().format("%Y-%m-%d")
    );
    client.append_description_note(issue, &note, Some(survey_flag))?;
    Ok(())
}

fn print_report(report: &SurveyReport, out: &mut dyn Write) -> std::io::Result<()> {
    let prefix = if report.dry_run { "would queue" } else { "queued" };
    for queued in &report.queued {
        writeln!(out, "{prefix} survey for #{} -> {}", queued.issue_id, queued.to)?;
    }
    for issue_id in &report.no_contact {
        writeln!(out, "no contact email for #{issue_id}")?;
    }
    for failure in &report.failures {
        writeln!(out, "failed {failure}")?;
    }
    writeln!(
        out,
        "\n{} {prefix}, {} without contact, {} failed",
        report.queued.len(),
        report.no_contact.len(),
        report.failures.len()
    )
}
