//! Batch runner: thin orchestration over the codec, directory, and
//! reconciliation engine.
//!
//! Issues arrive from an [`IssueSource`] collaborator, each one is
//! decoded, reconciled, and (unless dry-run) written back through an
//! [`IssueUpdater`]. Per-issue failures never abort the batch; they are
//! ledgered in the [`RunSummary`] and the offending source token is
//! memoized so later issues carrying the same value short-circuit
//! without another lookup or remote call.

use crate::directory::UserDirectory;
use crate::error::WeldError;
use crate::field::{self, FieldValue, Separator};
use crate::reconcile::{self, Outcome};
use crate::record::{Issue, Membership};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Status restriction pushed down to the tracker query.
///
/// One consistent representation: the keywords `open`, `closed`, `all`
/// (or `*`), or a numeric status id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    Open,
    Closed,
    All,
    Id(u32),
}

impl StatusFilter {
    /// Value for the tracker's `status_id` query parameter.
    #[must_use]
    pub fn as_query_value(&self) -> String {
        match self {
            Self::Open => "open".to_owned(),
            Self::Closed => "closed".to_owned(),
            Self::All => "*".to_owned(),
            Self::Id(id) => id.to_string(),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = WeldError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "all" | "*" => Ok(Self::All),
            other => other.parse::<u32>().map(Self::Id).map_err(|_| {
                WeldError::Config(format!(
                    "invalid status filter '{other}': expected open, closed, all, or a status id"
                ))
            }),
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            other => write!(f, "{}", other.as_query_value()),
        }
    }
}

/// Issue stream collaborator (pagination is its concern, not ours).
pub trait IssueSource {
    fn list_issues(
        &self,
        project_id: u64,
        status: &StatusFilter,
        extra: &[(String, String)],
    ) -> Result<Vec<Issue>, WeldError>;
}

/// Issue mutation collaborator. Server-side quirks (null text fields,
/// stray whitespace) are its concern; a rejection surfaces here as
/// `RemoteRejected`.
pub trait IssueUpdater {
    fn update_custom_field(
        &self,
        issue: &Issue,
        field_name: &str,
        value: &FieldValue,
    ) -> Result<(), WeldError>;
}

/// Membership stream collaborator, used only to build the directory.
pub trait MembershipSource {
    fn list_memberships(&self, project_id: u64) -> Result<Vec<Membership>, WeldError>;
}

/// Everything one `copy` invocation needs beyond the collaborators.
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    pub from_field: String,
    pub to_field: String,
    /// Splits the source field's scalar content.
    pub source_separator: Option<Separator>,
    /// Splits and re-joins the target field's content; may differ from
    /// the source separator.
    pub target_separator: Option<Separator>,
    /// Map source display names to user ids through the directory.
    pub user_ids: bool,
    pub status: StatusFilter,
    /// Debug selection: only touch this issue.
    pub only_issue: Option<u64>,
    /// Skip issues currently assigned to these display names.
    pub exclude_assignees: Vec<String>,
    /// Skip issues living in these sub-projects.
    pub exclude_projects: Vec<String>,
    /// Compute verdicts but never call the updater.
    pub dry_run: bool,
    /// Also ledger issues whose values were already present.
    pub verbose: bool,
}

/// One applied (or would-be, in dry-run) update.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateRecord {
    pub issue_id: u64,
    /// Tokens newly introduced to the target.
    pub added: Vec<String>,
    /// Full merged target content as written.
    pub merged: Vec<String>,
}

/// One failed issue with its offending token and cause.
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub issue_id: u64,
    pub token: String,
    pub cause: String,
}

/// Per-run ledgers, reported at end of run.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    /// Issues that passed the exclusion filters.
    pub scanned: usize,
    pub updated: Vec<UpdateRecord>,
    pub already_present: Vec<u64>,
    pub missing_source: Vec<u64>,
    pub skipped_excluded: usize,
    pub failures: Vec<Failure>,
    pub dry_run: bool,
}

impl RunSummary {
    /// True when nothing failed and nothing was skipped for lack of a
    /// source value.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.missing_source.is_empty()
    }
}

/// Sequential, single-pass reconciliation over a project's issues.
pub struct BatchRunner<'a, S, U> {
    source: &'a S,
    updater: &'a U,
    directory: Option<&'a UserDirectory>,
    options: CopyOptions,
    /// Source tokens that already failed once this run (unresolved user
    /// or remote rejection), keyed to their original cause; consulted
    /// before any lookup or write.
    failed_tokens: HashMap<String, String>,
}

impl<'a, S: IssueSource, U: IssueUpdater> BatchRunner<'a, S, U> {
    pub fn new(
        source: &'a S,
        updater: &'a U,
        directory: Option<&'a UserDirectory>,
        options: CopyOptions,
    ) -> Self {
        Self {
            source,
            updater,
            directory,
            options,
            failed_tokens: HashMap::new(),
        }
    }

    /// Run the full pipeline over every issue of the project.
    ///
    /// Only collaborator failures while listing issues propagate; any
    /// per-issue failure is converted into a ledger entry.
    pub fn run(&mut self, project_id: u64) -> Result<RunSummary, WeldError> {
        let issues = self
            .source
            .list_issues(project_id, &self.options.status, &[])?;
        info!(
            total = issues.len(),
            status = %self.options.status,
            from = %self.options.from_field,
            to = %self.options.to_field,
            dry_run = self.options.dry_run,
            "starting reconciliation batch"
        );

        let mut summary = RunSummary {
            dry_run: self.options.dry_run,
            ..RunSummary::default()
        };

        for issue in &issues {
            if self.excluded(issue) {
                summary.skipped_excluded += 1;
                continue;
            }
            summary.scanned += 1;
            self.run_issue(issue, &mut summary);
        }

        info!(
            scanned = summary.scanned,
            updated = summary.updated.len(),
            failed = summary.failures.len(),
            missing_source = summary.missing_source.len(),
            "batch finished"
        );
        Ok(summary)
    }

    fn excluded(&self, issue: &Issue) -> bool {
        if let Some(only) = self.options.only_issue {
            if issue.id != only {
                return true;
            }
        }
        if self
            .options
            .exclude_projects
            .iter()
            .any(|name| name == &issue.project.name)
        {
            return true;
        }
        self.options
            .exclude_assignees
            .iter()
            .any(|name| name == issue.assignee_name())
    }

    fn run_issue(&mut self, issue: &Issue, summary: &mut RunSummary) {
        let raw_source = issue.field(&self.options.from_field);
        let source = field::decode(&raw_source, self.options.source_separator.as_ref());

        // A value already known bad this run fails fast, without a
        // directory lookup or remote call. The original cause is kept
        // so the end-of-run report stays diagnosable.
        if let Some((token, cause)) = source
            .iter()
            .find_map(|t| self.failed_tokens.get_key_value(t))
        {
            debug!(issue = issue.id, token, "short-circuit on known-bad token");
            summary.failures.push(Failure {
                issue_id: issue.id,
                token: token.clone(),
                cause: format!("failed earlier in this run: {cause}"),
            });
            return;
        }

        let raw_target = issue.field(&self.options.to_field);
        let target = field::decode(&raw_target, self.options.target_separator.as_ref());

        let directory = self.options.user_ids.then_some(self.directory).flatten();
        match reconcile::reconcile(&source, &target, directory) {
            Outcome::SkipNoSource => {
                debug!(issue = issue.id, field = %self.options.from_field, "no source value");
                summary.missing_source.push(issue.id);
            }
            Outcome::AlreadyPresent { present } => {
                if self.options.verbose {
                    info!(
                        issue = issue.id,
                        present = ?present,
                        "all values already in target field"
                    );
                }
                summary.already_present.push(issue.id);
            }
            Outcome::UnresolvedUser { token } => {
                warn!(issue = issue.id, token, "user not in project directory");
                let cause = WeldError::UnresolvedUser {
                    token: token.clone(),
                }
                .to_string();
                self.failed_tokens.insert(token.clone(), cause.clone());
                summary.failures.push(Failure {
                    issue_id: issue.id,
                    token,
                    cause,
                });
            }
            Outcome::Update { merged, added } => {
                self.apply_update(issue, &source, merged, added, summary);
            }
        }
    }

    fn apply_update(
        &mut self,
        issue: &Issue,
        source: &field::TokenSet,
        merged: field::TokenSet,
        added: field::TokenSet,
        summary: &mut RunSummary,
    ) {
        let encoded = field::encode(&merged, self.options.target_separator.as_ref());
        let record = UpdateRecord {
            issue_id: issue.id,
            added: added.iter().cloned().collect(),
            merged: merged.iter().cloned().collect(),
        };

        if self.options.dry_run {
            info!(issue = issue.id, added = ?record.added, "dry run: would update");
            summary.updated.push(record);
            return;
        }

        match self
            .updater
            .update_custom_field(issue, &self.options.to_field, &encoded)
        {
            Ok(()) => {
                info!(issue = issue.id, added = ?record.added, "updated");
                summary.updated.push(record);
            }
            Err(err) => {
                // Remember the first source token so repeated occurrences
                // of a rejected value skip the remote call entirely.
                let token = source.iter().next().cloned().unwrap_or_default();
                let cause = err.to_string();
                warn!(issue = issue.id, token, error = %cause, "update rejected");
                self.failed_tokens.insert(token.clone(), cause.clone());
                summary.failures.push(Failure {
                    issue_id: issue.id,
                    token,
                    cause,
                });
            }
        }
    }
}
