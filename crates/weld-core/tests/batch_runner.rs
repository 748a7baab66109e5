//! Batch runner behavior against in-memory collaborators: failure
//! containment, dry-run, exclusion filters, and the failed-token
//! short-circuit.

use serde_json::json;
use std::cell::RefCell;
use std::collections::HashSet;
use weld_core::field::{FieldValue, Separator};
use weld_core::runner::{
    BatchRunner, CopyOptions, IssueSource, IssueUpdater, StatusFilter,
};
use weld_core::{Issue, Membership, UserDirectory, WeldError};

struct FakeTracker {
    issues: Vec<Issue>,
    /// Issue ids whose updates the fake server rejects.
    reject: HashSet<u64>,
    writes: RefCell<Vec<(u64, String, FieldValue)>>,
}

impl FakeTracker {
    fn new(issues: Vec<Issue>) -> Self {
        Self {
            issues,
            reject: HashSet::new(),
            writes: RefCell::new(Vec::new()),
        }
    }

    fn rejecting(mut self, issue_id: u64) -> Self {
        self.reject.insert(issue_id);
        self
    }

    fn write_count(&self) -> usize {
        self.writes.borrow().len()
    }
}

impl IssueSource for FakeTracker {
    fn list_issues(
        &self,
        _project_id: u64,
        _status: &StatusFilter,
        _extra: &[(String, String)],
    ) -> Result<Vec<Issue>, WeldError> {
        Ok(self.issues.clone())
    }
}

impl IssueUpdater for FakeTracker {
    fn update_custom_field(
        &self,
        issue: &Issue,
        field_name: &str,
        value: &FieldValue,
    ) -> Result<(), WeldError> {
        if self.reject.contains(&issue.id) {
            return Err(WeldError::RemoteRejected {
                status: Some(422),
                detail: "rejected by fake server".into(),
            });
        }
        self.writes
            .borrow_mut()
            .push((issue.id, field_name.to_owned(), value.clone()));
        Ok(())
    }
}

fn issue(id: u64, assignee: Option<&str>, target: serde_json::Value) -> Issue {
    let assigned_to = assignee.map(|name| json!({"id": 1, "name": name}));
    serde_json::from_value(json!({
        "id": id,
        "subject": format!("issue {id}"),
        "project": {"id": 1, "name": "Support"},
        "status": {"id": 1, "name": "New"},
        "assigned_to": assigned_to,
        "custom_fields": [
            {"id": 10, "name": "All assignees", "value": target}
        ]
    }))
    .expect("issue fixture should deserialize")
}

fn copy_options() -> CopyOptions {
    CopyOptions {
        from_field: "assigned_to".into(),
        to_field: "All assignees".into(),
        ..CopyOptions::default()
    }
}

#[test]
fn copies_missing_value_and_skips_present_one() {
    let tracker = FakeTracker::new(vec![
        issue(1, Some("alice"), json!([])),
        issue(2, Some("bob"), json!(["bob"])),
    ]);

    let mut runner = BatchRunner::new(&tracker, &tracker, None, copy_options());
    let summary = runner.run(1).expect("run should succeed");

    assert_eq!(summary.scanned, 2);
    assert_eq!(summary.updated.len(), 1);
    assert_eq!(summary.updated[0].issue_id, 1);
    assert_eq!(summary.updated[0].added, vec!["alice".to_owned()]);
    assert_eq!(summary.already_present, vec![2]);
    assert!(summary.is_clean());

    let writes = tracker.writes.borrow();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].1, "All assignees");
    assert_eq!(writes[0].2, FieldValue::List(vec!["alice".into()]));
}

#[test]
fn missing_source_is_ledgered_not_failed() {
    let tracker = FakeTracker::new(vec![issue(3, None, json!([]))]);
    let mut runner = BatchRunner::new(&tracker, &tracker, None, copy_options());
    let summary = runner.run(1).expect("run should succeed");

    assert_eq!(summary.missing_source, vec![3]);
    assert!(summary.failures.is_empty());
    assert_eq!(tracker.write_count(), 0);
}

#[test]
fn one_rejected_update_does_not_abort_the_batch() {
    let tracker = FakeTracker::new(vec![
        issue(1, Some("alice"), json!([])),
        issue(2, Some("bob"), json!([])),
    ])
    .rejecting(1);

    let mut runner = BatchRunner::new(&tracker, &tracker, None, copy_options());
    let summary = runner.run(1).expect("run should succeed");

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].issue_id, 1);
    assert_eq!(summary.failures[0].token, "alice");
    assert!(summary.failures[0].cause.contains("422"));
    // Issue 2 still went through.
    assert_eq!(summary.updated.len(), 1);
    assert_eq!(summary.updated[0].issue_id, 2);
}

#[test]
fn rejected_token_short_circuits_later_issues() {
    // Both issues carry the same source value; the first write is
    // rejected, so the second issue must not reach the server at all.
    let tracker = FakeTracker::new(vec![
        issue(1, Some("alice"), json!([])),
        issue(2, Some("alice"), json!([])),
    ])
    .rejecting(1)
    .rejecting(2);

    let mut runner = BatchRunner::new(&tracker, &tracker, None, copy_options());
    let summary = runner.run(1).expect("run should succeed");

    assert_eq!(summary.failures.len(), 2);
    // The short-circuit entry keeps the original rejection as its cause.
    assert!(summary.failures[1].cause.starts_with("failed earlier in this run"));
    assert!(summary.failures[1].cause.contains("422"), "{}", summary.failures[1].cause);
    assert_eq!(tracker.write_count(), 0);
}

#[test]
fn unresolved_user_fails_closed_and_is_memoized() {
    let memberships: Vec<Membership> =
        serde_json::from_value(json!([{"user": {"id": 7, "name": "alice"}}]))
            .expect("memberships fixture");
    let directory = UserDirectory::build(&memberships);

    let tracker = FakeTracker::new(vec![
        issue(1, Some("carol"), json!([])),
        issue(2, Some("carol"), json!([])),
        issue(3, Some("alice"), json!([])),
    ]);

    let options = CopyOptions {
        user_ids: true,
        ..copy_options()
    };
    let mut runner = BatchRunner::new(&tracker, &tracker, Some(&directory), options);
    let summary = runner.run(1).expect("run should succeed");

    assert_eq!(summary.failures.len(), 2);
    assert_eq!(summary.failures[0].token, "carol");
    assert!(summary.failures[0].cause.contains("carol"));
    // Second occurrence short-circuited before the directory, keeping
    // the unresolved-user cause.
    assert!(summary.failures[1].cause.starts_with("failed earlier in this run"));
    assert!(summary.failures[1].cause.contains("carol"), "{}", summary.failures[1].cause);

    // Resolvable issue still updated, with the mapped user id written.
    assert_eq!(summary.updated.len(), 1);
    let writes = tracker.writes.borrow();
    assert_eq!(writes[0].2, FieldValue::List(vec!["7".into()]));
}

#[test]
fn dry_run_never_calls_the_updater() {
    let tracker = FakeTracker::new(vec![issue(1, Some("alice"), json!([]))]);
    let options = CopyOptions {
        dry_run: true,
        ..copy_options()
    };
    let mut runner = BatchRunner::new(&tracker, &tracker, None, options);
    let summary = runner.run(1).expect("run should succeed");

    assert!(summary.dry_run);
    assert_eq!(summary.updated.len(), 1);
    assert_eq!(tracker.write_count(), 0);
}

#[test]
fn exclusion_filters_apply_before_reconciliation() {
    let tracker = FakeTracker::new(vec![
        issue(1, Some("alice"), json!([])),
        issue(2, Some("robot"), json!([])),
    ]);
    let options = CopyOptions {
        exclude_assignees: vec!["robot".into()],
        ..copy_options()
    };
    let mut runner = BatchRunner::new(&tracker, &tracker, None, options);
    let summary = runner.run(1).expect("run should succeed");

    assert_eq!(summary.skipped_excluded, 1);
    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.updated.len(), 1);
    assert_eq!(summary.updated[0].issue_id, 1);
}

#[test]
fn only_issue_restricts_to_a_single_issue() {
    let tracker = FakeTracker::new(vec![
        issue(1, Some("alice"), json!([])),
        issue(2, Some("bob"), json!([])),
    ]);
    let options = CopyOptions {
        only_issue: Some(2),
        ..copy_options()
    };
    let mut runner = BatchRunner::new(&tracker, &tracker, None, options);
    let summary = runner.run(1).expect("run should succeed");

    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.updated.len(), 1);
    assert_eq!(summary.updated[0].issue_id, 2);
}

#[test]
fn second_run_over_written_state_is_a_no_op() {
    // Simulate the idempotence property end to end: run once, feed the
    // written value back as the target, run again.
    let tracker = FakeTracker::new(vec![issue(1, Some("alice"), json!([]))]);
    let mut runner = BatchRunner::new(&tracker, &tracker, None, copy_options());
    let summary = runner.run(1).expect("first run");
    assert_eq!(summary.updated.len(), 1);

    let written = tracker.writes.borrow()[0].2.clone();
    let target_json = match &written {
        FieldValue::List(items) => json!(items),
        FieldValue::Scalar(s) => json!(s),
        FieldValue::Empty => json!(null),
    };
    let tracker2 = FakeTracker::new(vec![issue(1, Some("alice"), target_json)]);
    let mut runner2 = BatchRunner::new(&tracker2, &tracker2, None, copy_options());
    let summary2 = runner2.run(1).expect("second run");

    assert!(summary2.updated.is_empty());
    assert_eq!(summary2.already_present, vec![1]);
    assert_eq!(tracker2.write_count(), 0);
}

#[test]
fn trailing_separator_source_converges_after_one_write() {
    // "alice," decodes without the empty fragment, so the written value
    // fed back as the target makes the second run a no-op instead of
    // re-adding a phantom empty token forever.
    let record = |target: serde_json::Value| -> Issue {
        serde_json::from_value(json!({
            "id": 4,
            "subject": "trailing separator",
            "project": {"id": 1, "name": "Support"},
            "status": {"id": 1, "name": "New"},
            "custom_fields": [
                {"id": 20, "name": "Contacts", "value": "alice,"},
                {"id": 21, "name": "Mailing list", "value": target}
            ]
        }))
        .expect("issue fixture should deserialize")
    };
    let options = || CopyOptions {
        from_field: "Contacts".into(),
        to_field: "Mailing list".into(),
        source_separator: Some(Separator::parse(",")),
        target_separator: Some(Separator::parse(",")),
        ..CopyOptions::default()
    };

    let tracker = FakeTracker::new(vec![record(json!(null))]);
    let mut runner = BatchRunner::new(&tracker, &tracker, None, options());
    let summary = runner.run(1).expect("first run");
    assert_eq!(summary.updated.len(), 1);
    let written = tracker.writes.borrow()[0].2.clone();
    assert_eq!(written, FieldValue::Scalar("alice".into()));

    let FieldValue::Scalar(written) = written else {
        panic!("expected scalar write");
    };
    let tracker2 = FakeTracker::new(vec![record(json!(written))]);
    let mut runner2 = BatchRunner::new(&tracker2, &tracker2, None, options());
    let summary2 = runner2.run(1).expect("second run");

    assert!(summary2.updated.is_empty());
    assert_eq!(summary2.already_present, vec![4]);
    assert_eq!(tracker2.write_count(), 0);
}

#[test]
fn separators_decode_source_and_target_independently() {
    let record: Issue = serde_json::from_value(json!({
        "id": 9,
        "subject": "mixed separators",
        "project": {"id": 1, "name": "Support"},
        "status": {"id": 1, "name": "New"},
        "custom_fields": [
            {"id": 20, "name": "Contacts", "value": "a,b,c"},
            {"id": 21, "name": "Mailing list", "value": "b;c;d"}
        ]
    }))
    .expect("issue fixture should deserialize");

    let tracker = FakeTracker::new(vec![record]);
    let options = CopyOptions {
        from_field: "Contacts".into(),
        to_field: "Mailing list".into(),
        source_separator: Some(Separator::parse(",")),
        target_separator: Some(Separator::parse(";")),
        ..CopyOptions::default()
    };
    let mut runner = BatchRunner::new(&tracker, &tracker, None, options);
    let summary = runner.run(1).expect("run should succeed");

    assert_eq!(summary.updated.len(), 1);
    assert_eq!(summary.updated[0].added, vec!["a".to_owned()]);
    let writes = tracker.writes.borrow();
    // Sorted union, re-joined with the target's separator.
    assert_eq!(writes[0].2, FieldValue::Scalar("a;b;c;d".into()));
}
