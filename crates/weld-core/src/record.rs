//! Issue-tracker record model.
//!
//! JSON shapes are dictated by the tracker's REST API and treated as an
//! externally-versioned contract; only the members the tooling reads are
//! modeled, everything else is ignored on deserialize.

use crate::field::FieldValue;
use serde::Deserialize;
use serde_json::Value;

/// `{"id": 5, "name": "..."}` reference embedded in other records.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamedRef {
    pub id: u64,
    pub name: String,
}

/// One project-configurable attribute attached to an issue.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomField {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub id: u64,
    pub subject: String,
    pub project: NamedRef,
    pub status: NamedRef,
    #[serde(default)]
    pub assigned_to: Option<NamedRef>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_on: Option<String>,
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
}

impl Issue {
    /// Value of a named field: built-in fields first, then custom fields
    /// by name. Unknown fields read as `Empty`.
    #[must_use]
    pub fn field(&self, name: &str) -> FieldValue {
        match name {
            "subject" => FieldValue::scalar(self.subject.clone()),
            "project" => FieldValue::scalar(self.project.name.clone()),
            "status" => FieldValue::scalar(self.status.name.clone()),
            "assigned_to" => self
                .assigned_to
                .as_ref()
                .map_or(FieldValue::Empty, |user| FieldValue::scalar(user.name.clone())),
            "description" => self
                .description
                .as_deref()
                .map_or(FieldValue::Empty, FieldValue::scalar),
            _ => self.custom_field(name),
        }
    }

    /// Value of a custom field addressed by name.
    #[must_use]
    pub fn custom_field(&self, name: &str) -> FieldValue {
        self.custom_fields
            .iter()
            .find(|field| field.name == name)
            .map_or(FieldValue::Empty, |field| FieldValue::from_json(&field.value))
    }

    /// Display name of the current assignee, blank when unassigned.
    #[must_use]
    pub fn assignee_name(&self) -> &str {
        self.assigned_to.as_ref().map_or("", |user| user.name.as_str())
    }
}

/// Project membership record. Group memberships carry no `user` member,
/// so the user is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct Membership {
    #[serde(default)]
    pub user: Option<NamedRef>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_issue() -> Issue {
        serde_json::from_value(json!({
            "id": 101,
            "subject": "Fix importer",
            "project": {"id": 1, "name": "Support"},
            "status": {"id": 2, "name": "In Progress"},
            "assigned_to": {"id": 7, "name": "alice"},
            "custom_fields": [
                {"id": 10, "name": "All assignees", "value": ["7", "9"]},
                {"id": 11, "name": "WABI ID", "value": null},
                {"id": 12, "name": "PI email", "value": "pi@example.org"}
            ]
        }))
        .expect("issue should deserialize")
    }

    #[test]
    fn built_in_field_reads_display_name() {
        let issue = sample_issue();
        assert_eq!(
            issue.field("assigned_to"),
            FieldValue::Scalar("alice".into())
        );
        assert_eq!(issue.field("status"), FieldValue::Scalar("In Progress".into()));
    }

    #[test]
    fn custom_field_by_name() {
        let issue = sample_issue();
        assert_eq!(
            issue.field("All assignees"),
            FieldValue::List(vec!["7".into(), "9".into()])
        );
        assert_eq!(
            issue.field("PI email"),
            FieldValue::Scalar("pi@example.org".into())
        );
    }

    #[test]
    fn null_custom_field_and_unknown_field_are_empty() {
        let issue = sample_issue();
        assert!(issue.field("WABI ID").is_empty());
        assert!(issue.field("No Such Field").is_empty());
    }

    #[test]
    fn unassigned_issue_has_blank_assignee() {
        let issue: Issue = serde_json::from_value(json!({
            "id": 102,
            "subject": "Orphan",
            "project": {"id": 1, "name": "Support"},
            "status": {"id": 1, "name": "New"}
        }))
        .expect("minimal issue should deserialize");
        assert_eq!(issue.assignee_name(), "");
        assert!(issue.field("assigned_to").is_empty());
    }

    #[test]
    fn membership_without_user_deserializes() {
        let membership: Membership =
            serde_json::from_value(json!({"group": {"id": 3, "name": "devs"}}))
                .expect("group membership should deserialize");
        assert!(membership.user.is_none());
    }
}
