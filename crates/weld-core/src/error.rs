use thiserror::Error;

/// Error taxonomy for a reconciliation run.
///
/// Only the configuration variants are fatal; everything else is
/// contained at the batch-runner boundary and turned into a ledger
/// entry for the end-of-run report.
#[derive(Debug, Error)]
pub enum WeldError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("project '{0}' not found")]
    ProjectNotFound(String),

    #[error("user '{token}' not found in the project member directory")]
    UnresolvedUser { token: String },

    #[error("remote rejected update{}: {detail}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    RemoteRejected { status: Option<u16>, detail: String },

    #[error("http transport error: {0}")]
    Http(String),

    #[error("failed to decode API response: {0}")]
    Decode(String),
}

impl WeldError {
    /// Machine-readable code for JSON output and agent-friendly parsing.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_invalid",
            Self::ProjectNotFound(_) => "project_not_found",
            Self::UnresolvedUser { .. } => "unresolved_user",
            Self::RemoteRejected { .. } => "remote_rejected",
            Self::Http(_) => "http_transport",
            Self::Decode(_) => "decode_failed",
        }
    }

    /// Optional remediation hint surfaced next to the error message.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Config(_) => Some("Check the YAML config file (url, api_key) and retry."),
            Self::ProjectNotFound(_) => {
                Some("Project names are matched exactly; check spelling and case.")
            }
            Self::UnresolvedUser { .. } => {
                Some("Inactive users are absent from project memberships.")
            }
            Self::RemoteRejected { .. } | Self::Http(_) => None,
            Self::Decode(_) => Some("The tracker API may have changed shape; check its version."),
        }
    }

    /// Fatal errors abort the run before any issue is processed.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::ProjectNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::WeldError;
    use std::collections::HashSet;

    fn all_variants() -> Vec<WeldError> {
        vec![
            WeldError::Config("bad".into()),
            WeldError::ProjectNotFound("Ghost".into()),
            WeldError::UnresolvedUser {
                token: "carol".into(),
            },
            WeldError::RemoteRejected {
                status: Some(422),
                detail: "unprocessable".into(),
            },
            WeldError::Http("timed out".into()),
            WeldError::Decode("not json".into()),
        ]
    }

    #[test]
    fn codes_are_unique() {
        let mut seen = HashSet::new();
        for err in all_variants() {
            assert!(seen.insert(err.error_code()), "duplicate {}", err.error_code());
        }
    }

    #[test]
    fn only_setup_errors_are_fatal() {
        for err in all_variants() {
            let expect_fatal = matches!(
                err,
                WeldError::Config(_) | WeldError::ProjectNotFound(_)
            );
            assert_eq!(err.is_fatal(), expect_fatal, "{err}");
        }
    }

    #[test]
    fn remote_rejected_display_includes_status() {
        let err = WeldError::RemoteRejected {
            status: Some(422),
            detail: "whitespace in email".into(),
        };
        let text = err.to_string();
        assert!(text.contains("422"), "{text}");
        assert!(text.contains("whitespace"), "{text}");

        let bare = WeldError::RemoteRejected {
            status: None,
            detail: "no field".into(),
        };
        assert!(!bare.to_string().contains("HTTP"));
    }
}
