//! Redmine REST client and the collaborator-trait implementations the
//! core's batch runner consumes.
//!
//! Synchronous ureq calls with `X-Redmine-API-Key` auth. Pagination is
//! handled here, uniformly via offset/limit, so callers always see the
//! complete collection. Update payloads are pre-sanitized: the server
//! refuses null text fields and custom-field values with stray
//! leading/trailing whitespace, so both are fixed up in the same PUT.

use crate::config::Config;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Value, json};
use std::cell::Cell;
use tracing::{debug, warn};
use weld_core::field::FieldValue;
use weld_core::record::{Issue, Membership};
use weld_core::runner::{IssueSource, IssueUpdater, MembershipSource, StatusFilter};
use weld_core::WeldError;

const PAGE_LIMIT: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub identifier: Option<String>,
}

/// One change-history entry on an issue.
#[derive(Debug, Clone, Deserialize)]
pub struct Journal {
    pub created_on: String,
    #[serde(default)]
    pub details: Vec<JournalDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JournalDetail {
    pub name: String,
    #[serde(default)]
    pub new_value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeEntry {
    #[serde(default)]
    pub issue: Option<IdRef>,
    pub spent_on: String,
    pub hours: f64,
    #[serde(default)]
    pub activity: Option<ActivityRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdRef {
    pub id: u64,
}

pub struct RedmineClient {
    base_url: String,
    api_key: String,
    requests: Cell<usize>,
}

impl RedmineClient {
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: config.base_url().to_owned(),
            api_key: config.api_key.clone(),
            requests: Cell::new(0),
        }
    }

    /// Number of HTTP requests issued so far, for end-of-run reporting.
    pub fn request_count(&self) -> usize {
        self.requests.get()
    }

    fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value, WeldError> {
        self.requests.set(self.requests.get() + 1);
        let url = format!("{}/{path}", self.base_url);
        let mut request = ureq::get(&url).set("X-Redmine-API-Key", &self.api_key);
        for (key, value) in params {
            request = request.query(key, value);
        }
        debug!(%url, "GET");
        let response = request.call().map_err(from_ureq)?;
        response
            .into_json::<Value>()
            .map_err(|err| WeldError::Decode(err.to_string()))
    }

    fn put(&self, path: &str, payload: &Value) -> Result<(), WeldError> {
        self.requests.set(self.requests.get() + 1);
        let url = format!("{}/{path}", self.base_url);
        debug!(%url, "PUT");
        ureq::put(&url)
            .set("X-Redmine-API-Key", &self.api_key)
            .send_json(payload.clone())
            .map_err(from_ureq)?;
        Ok(())
    }

    /// Fetch a paginated collection whole, 100 records at a time.
    fn get_paged<T: DeserializeOwned>(
        &self,
        path: &str,
        key: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, WeldError> {
        let mut collected = Vec::new();
        let mut offset = 0usize;

        loop {
            let mut page_params = params.to_vec();
            page_params.push(("offset", offset.to_string()));
            page_params.push(("limit", PAGE_LIMIT.to_string()));

            let body = self.get(path, &page_params)?;
            let batch = body
                .get(key)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let fetched = batch.len();
            for item in batch {
                collected.push(
                    serde_json::from_value(item)
                        .map_err(|err| WeldError::Decode(format!("{path}: {err}")))?,
                );
            }

            let total = body
                .get("total_count")
                .and_then(Value::as_u64)
                .unwrap_or(collected.len() as u64);
            offset += fetched;
            if collected.len() as u64 >= total || fetched == 0 {
                break;
            }
        }

        Ok(collected)
    }

    pub fn projects(&self) -> Result<Vec<Project>, WeldError> {
        self.get_paged("projects.json", "projects", &[])
    }

    /// Resolve a project name to its id; a miss is a setup failure that
    /// aborts the run.
    pub fn find_project_id(&self, name: &str) -> Result<u64, WeldError> {
        let projects = self.projects()?;
        projects
            .iter()
            .find(|project| {
                project.name == name || project.identifier.as_deref() == Some(name)
            })
            .map(|project| project.id)
            .ok_or_else(|| WeldError::ProjectNotFound(name.to_owned()))
    }

    /// All issues of a project (sub-projects included), restricted by
    /// status and any extra query filters.
    pub fn issues(
        &self,
        project_id: u64,
        status: &StatusFilter,
        extra: &[(String, String)],
    ) -> Result<Vec<Issue>, WeldError> {
        let mut params = vec![
            ("project_id", project_id.to_string()),
            ("status_id", status.as_query_value()),
        ];
        for (key, value) in extra {
            params.push((key.as_str(), value.clone()));
        }
        self.get_paged("issues.json", "issues", &params)
    }

    /// Fetch one issue by id; `Ok(None)` when the tracker has no such
    /// issue.
    pub fn fetch_issue(&self, issue_id: u64) -> Result<Option<Issue>, WeldError> {
        match self.get(&format!("issues/{issue_id}.json"), &[]) {
            Ok(body) => parse_issue(&body).map(Some),
            Err(WeldError::RemoteRejected {
                status: Some(404), ..
            }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn memberships(&self, project_id: u64) -> Result<Vec<Membership>, WeldError> {
        self.get_paged(
            &format!("projects/{project_id}/memberships.json"),
            "memberships",
            &[],
        )
    }

    /// Change-history entries for one issue, oldest first.
    pub fn journals(&self, issue_id: u64) -> Result<Vec<Journal>, WeldError> {
        let body = self.get(
            &format!("issues/{issue_id}.json"),
            &[("include", "journals".to_owned())],
        )?;
        parse_journals(&body)
    }

    /// Spent-time records for a project within an inclusive date range.
    pub fn time_entries(
        &self,
        project_id: u64,
        from: &str,
        to: &str,
    ) -> Result<Vec<TimeEntry>, WeldError> {
        self.get_paged(
            "time_entries.json",
            "time_entries",
            &[
                ("project_id", project_id.to_string()),
                ("spent_on", format!("><{from}|{to}")),
            ],
        )
    }

    /// Write one custom field, carrying the whitespace/null fixes for
    /// every other field in the same PUT.
    pub fn update_custom_field(
        &self,
        issue: &Issue,
        field_name: &str,
        value: &FieldValue,
    ) -> Result<(), WeldError> {
        let payload = custom_field_update_payload(issue, field_name, value)?;
        self.put(&format!("issues/{}.json", issue.id), &payload)
    }

    /// Transition an issue's status, suppressing notification mail and
    /// optionally zeroing a survey-flag custom field.
    pub fn update_status(
        &self,
        issue: &Issue,
        status_id: u32,
        note: &str,
        clear_flag: Option<u64>,
    ) -> Result<(), WeldError> {
        let payload = status_update_payload(issue, status_id, note, clear_flag);
        self.put(&format!("issues/{}.json", issue.id), &payload)
    }

    /// Append a note to an issue's description, optionally zeroing a
    /// flag custom field in the same PUT.
    pub fn append_description_note(
        &self,
        issue: &Issue,
        note: &str,
        clear_flag: Option<u64>,
    ) -> Result<(), WeldError> {
        let description = match issue.description.as_deref() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n\n{note}"),
            _ => note.to_owned(),
        };
        let overrides: Vec<(u64, Value)> = clear_flag
            .map(|id| vec![(id, json!("0"))])
            .unwrap_or_default();
        let payload = json!({
            "issue": {
                "description": description,
                "custom_fields": sanitized_custom_fields(issue, &overrides),
            }
        });
        self.put(&format!("issues/{}.json", issue.id), &payload)
    }
}

impl IssueSource for RedmineClient {
    fn list_issues(
        &self,
        project_id: u64,
        status: &StatusFilter,
        extra: &[(String, String)],
    ) -> Result<Vec<Issue>, WeldError> {
        self.issues(project_id, status, extra)
    }
}

impl IssueUpdater for RedmineClient {
    fn update_custom_field(
        &self,
        issue: &Issue,
        field_name: &str,
        value: &FieldValue,
    ) -> Result<(), WeldError> {
        Self::update_custom_field(self, issue, field_name, value)
    }
}

impl MembershipSource for RedmineClient {
    fn list_memberships(&self, project_id: u64) -> Result<Vec<Membership>, WeldError> {
        self.memberships(project_id)
    }
}

fn from_ureq(err: ureq::Error) -> WeldError {
    match err {
        ureq::Error::Status(code, response) => {
            let detail = response
                .into_string()
                .unwrap_or_default()
                .trim()
                .to_owned();
            WeldError::RemoteRejected {
                status: Some(code),
                detail: if detail.is_empty() {
                    "no response body".to_owned()
                } else {
                    detail
                },
            }
        }
        transport => WeldError::Http(transport.to_string()),
    }
}

fn parse_issue(body: &Value) -> Result<Issue, WeldError> {
    let issue = body
        .get("issue")
        .cloned()
        .ok_or_else(|| WeldError::Decode("response has no 'issue' member".to_owned()))?;
    serde_json::from_value(issue).map_err(|err| WeldError::Decode(err.to_string()))
}

fn parse_journals(body: &Value) -> Result<Vec<Journal>, WeldError> {
    let journals = body
        .get("issue")
        .and_then(|issue| issue.get("journals"))
        .cloned()
        .unwrap_or_else(|| json!([]));
    serde_json::from_value(journals).map_err(|err| WeldError::Decode(err.to_string()))
}

/// Whitespace/null fixes for every custom field on the issue, with
/// explicit overrides taking precedence over fixes for the same field.
fn sanitized_custom_fields(issue: &Issue, overrides: &[(u64, Value)]) -> Vec<Value> {
    let mut entries: Vec<(u64, Value)> = overrides.to_vec();
    for field in &issue.custom_fields {
        if entries.iter().any(|(id, _)| *id == field.id) {
            continue;
        }
        match &field.value {
            Value::Null => entries.push((field.id, json!(""))),
            Value::String(s) if s.trim() != s => entries.push((field.id, json!(s.trim()))),
            _ => {}
        }
    }
    entries
        .into_iter()
        .map(|(id, value)| json!({"id": id, "value": value}))
        .collect()
}

fn custom_field_update_payload(
    issue: &Issue,
    field_name: &str,
    value: &FieldValue,
) -> Result<Value, WeldError> {
    let field_id = issue
        .custom_fields
        .iter()
        .find(|field| field.name == field_name)
        .map(|field| field.id)
        .ok_or_else(|| {
            warn!(issue = issue.id, field = field_name, "custom field not on issue");
            WeldError::RemoteRejected {
                status: None,
                detail: format!("issue #{} has no custom field '{field_name}'", issue.id),
            }
        })?;

    let mut issue_fields = serde_json::Map::new();
    issue_fields.insert(
        "custom_fields".to_owned(),
        Value::Array(sanitized_custom_fields(issue, &[(field_id, value.to_json())])),
    );
    if issue.description.is_none() {
        // Null text fields crash the tracker on update.
        issue_fields.insert("description".to_owned(), json!(""));
    }
    Ok(json!({ "issue": Value::Object(issue_fields) }))
}

fn status_update_payload(
    issue: &Issue,
    status_id: u32,
    note: &str,
    clear_flag: Option<u64>,
) -> Value {
    let overrides: Vec<(u64, Value)> = clear_flag
        .map(|id| vec![(id, json!("0"))])
        .unwrap_or_default();

    let mut issue_fields = serde_json::Map::new();
    issue_fields.insert("status_id".to_owned(), json!(status_id));
    issue_fields.insert("notes".to_owned(), json!(note));
    issue_fields.insert(
        "custom_fields".to_owned(),
        Value::Array(sanitized_custom_fields(issue, &overrides)),
    );
    if issue.description.is_none() {
        issue_fields.insert("description".to_owned(), json!(""));
    }

    json!({
        "suppress_mail": "1",
        "issue": Value::Object(issue_fields),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue_with_fields(fields: Value) -> Issue {
        serde_json::from_value(json!({
            "id": 55,
            "subject": "payload test",
            "project": {"id": 1, "name": "Support"},
            "status": {"id": 1, "name": "New"},
            "custom_fields": fields
        }))
        .expect("issue fixture should deserialize")
    }

    #[test]
    fn sanitize_fixes_null_and_whitespace_values() {
        let issue = issue_with_fields(json!([
            {"id": 1, "name": "A", "value": null},
            {"id": 2, "name": "B", "value": " pi@example.org "},
            {"id": 3, "name": "C", "value": "clean"}
        ]));
        let fixed = sanitized_custom_fields(&issue, &[]);
        assert_eq!(fixed.len(), 2);
        assert_eq!(fixed[0], json!({"id": 1, "value": ""}));
        assert_eq!(fixed[1], json!({"id": 2, "value": "pi@example.org"}));
    }

    #[test]
    fn sanitize_overrides_win_over_fixes() {
        let issue = issue_with_fields(json!([
            {"id": 1, "name": "A", "value": null}
        ]));
        let fixed = sanitized_custom_fields(&issue, &[(1, json!("set"))]);
        assert_eq!(fixed, vec![json!({"id": 1, "value": "set"})]);
    }

    #[test]
    fn custom_field_update_targets_the_named_field() {
        let issue = issue_with_fields(json!([
            {"id": 10, "name": "All assignees", "value": ["7"]}
        ]));
        let payload = custom_field_update_payload(
            &issue,
            "All assignees",
            &FieldValue::List(vec!["7".into(), "9".into()]),
        )
        .expect("payload should build");

        let fields = &payload["issue"]["custom_fields"];
        assert_eq!(fields[0], json!({"id": 10, "value": ["7", "9"]}));
        // The issue's description is null, so the payload clears it.
        assert_eq!(payload["issue"]["description"], json!(""));
    }

    #[test]
    fn custom_field_update_rejects_unknown_field() {
        let issue = issue_with_fields(json!([]));
        let err = custom_field_update_payload(&issue, "Missing", &FieldValue::Empty)
            .expect_err("unknown field must fail");
        assert!(matches!(err, WeldError::RemoteRejected { status: None, .. }));
    }

    #[test]
    fn status_update_suppresses_mail_and_clears_flag() {
        let issue = issue_with_fields(json!([
            {"id": 22, "name": "Send survey when closed", "value": "1"}
        ]));
        let payload = status_update_payload(&issue, 6, "Cleaning out old issues.", Some(22));

        assert_eq!(payload["suppress_mail"], json!("1"));
        assert_eq!(payload["issue"]["status_id"], json!(6));
        assert_eq!(payload["issue"]["notes"], json!("Cleaning out old issues."));
        assert_eq!(
            payload["issue"]["custom_fields"][0],
            json!({"id": 22, "value": "0"})
        );
    }

    #[test]
    fn parse_journals_tolerates_missing_member() {
        let journals = parse_journals(&json!({"issue": {"id": 1}})).expect("empty ok");
        assert!(journals.is_empty());

        let body = json!({"issue": {"journals": [
            {"created_on": "2026-02-01T10:00:00Z", "details": [
                {"name": "status_id", "new_value": "5", "old_value": "2"}
            ]}
        ]}});
        let journals = parse_journals(&body).expect("journals parse");
        assert_eq!(journals.len(), 1);
        assert_eq!(journals[0].details[0].new_value.as_deref(), Some("5"));
    }
}
