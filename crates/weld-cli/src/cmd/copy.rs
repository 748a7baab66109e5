//! `weld copy` — reconcile one issue field into another across a whole
//! project.
//!
//! The classic use is pulling the current assignee into an "All
//! assignees" list field, but any pair of fields works, including
//! differently-delimited list fields. With `--user-ids` the source
//! tokens are display names and the target stores user ids, mapped
//! through the project's membership directory.

use crate::config::Config;
use crate::output::{OutputMode, render};
use crate::redmine::RedmineClient;
use clap::Args;
use std::io::Write;
use weld_core::field::Separator;
use weld_core::runner::{BatchRunner, CopyOptions, RunSummary, StatusFilter};
use weld_core::UserDirectory;

#[derive(Args, Debug)]
pub struct CopyArgs {
    /// Project name, sub-projects included.
    #[arg(short, long)]
    pub project: String,

    /// Field to read values from.
    #[arg(short = 'f', long, default_value = "assigned_to")]
    pub from_field: String,

    /// Custom field to write values into.
    #[arg(short = 't', long, default_value = "All assignees")]
    pub to_field: String,

    /// Delimiter splitting the source field's value (`\n` for lines).
    #[arg(short, long)]
    pub separator: Option<String>,

    /// Delimiter for the target field; defaults to the source delimiter.
    #[arg(short = 'n', long)]
    pub new_separator: Option<String>,

    /// Treat source values as display names and store user ids.
    #[arg(short, long)]
    pub user_ids: bool,

    /// Status restriction: open, closed, all, or a numeric status id.
    #[arg(short = 'w', long, default_value = "open")]
    pub status: StatusFilter,

    /// Only touch this one issue (debugging aid).
    #[arg(short, long)]
    pub only_issue: Option<u64>,

    /// Comma-separated assignee names to skip.
    #[arg(short = 'x', long)]
    pub exclude_users: Option<String>,

    /// Comma-separated sub-project names to skip.
    #[arg(short = 'e', long)]
    pub exclude_projects: Option<String>,

    /// Compute and report changes without writing anything.
    #[arg(short, long)]
    pub dry_run: bool,

    /// Also list issues that needed no change.
    #[arg(short, long)]
    pub long_output: bool,
}

fn split_csv(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_owned)
            .collect()
    })
    .unwrap_or_default()
}

pub fn run_copy(args: &CopyArgs, config: &Config, output: OutputMode) -> anyhow::Result<()> {
    let client = RedmineClient::new(config);
    let project_id = client.find_project_id(&args.project)?;

    let directory = if args.user_ids {
        let memberships = client.memberships(project_id)?;
        Some(UserDirectory::build(&memberships))
    } else {
        None
    };

    let source_separator = args.separator.as_deref().map(Separator::parse);
    let target_separator = args
        .new_separator
        .as_deref()
        .map(Separator::parse)
        .or_else(|| source_separator.clone());

    let options = CopyOptions {
        from_field: args.from_field.clone(),
        to_field: args.to_field.clone(),
        source_separator,
        target_separator,
        user_ids: args.user_ids,
        status: args.status.clone(),
        only_issue: args.only_issue,
        exclude_assignees: split_csv(args.exclude_users.as_deref()),
        exclude_projects: split_csv(args.exclude_projects.as_deref()),
        dry_run: args.dry_run,
        verbose: args.long_output,
    };

    let mut runner = BatchRunner::new(&client, &client, directory.as_ref(), options);
    let summary = runner.run(project_id)?;

    render(output, &summary, |summary, out| {
        print_summary(summary, directory.as_ref(), args.long_output, out)
    })?;

    tracing::debug!(requests = client.request_count(), "api requests issued");
    Ok(())
}

fn print_summary(
    summary: &RunSummary,
    directory: Option<&UserDirectory>,
    long_output: bool,
    out: &mut dyn Write,
) -> std::io::Result<()> {
    let prefix = if summary.dry_run { "would update" } else { "updated" };
    for update in &summary.updated {
        let added: Vec<&str> = update
            .added
            .iter()
            .map(|token| directory.map_or(token.as_str(), |dir| dir.display(token)))
            .collect();
        writeln!(out, "{prefix} #{}: added {}", update.issue_id, added.join(", "))?;
    }

    if long_output {
        for issue_id in &summary.already_present {
            writeln!(out, "unchanged #{issue_id}: all values already present")?;
        }
    }
    if !summary.missing_source.is_empty() {
        writeln!(out, "\nissues with no source value:")?;
        for issue_id in &summary.missing_source {
            writeln!(out, "  #{issue_id}")?;
        }
    }
    if !summary.failures.is_empty() {
        writeln!(out, "\nfailed issues:")?;
        for failure in &summary.failures {
            writeln!(
                out,
                "  #{} ('{}'): {}",
                failure.issue_id, failure.token, failure.cause
            )?;
        }
    }

    writeln!(
        out,
        "\n{} scanned, {} {prefix}, {} unchanged, {} skipped, {} failed",
        summary.scanned,
        summary.updated.len(),
        summary.already_present.len(),
        summary.skipped_excluded + summary.missing_source.len(),
        summary.failures.len()
    )
}
