use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("missing credential {0}: set it in the environment or a .env file")]
    MissingCredential(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("malformed front matter: {0}")]
    MalformedFrontMatter(String),

    #[error("invalid ADF block for {field}: {reason}")]
    InvalidAdf { field: String, reason: String },

    #[error("missing required field '{field}' for {issue_type}")]
    MissingField { field: String, issue_type: String },

    #[error("unknown issue type '{0}'")]
    UnknownIssueType(String),

    #[error("issue type mismatch: record is {expected}, Jira issue is {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("subtask parent_key {parent} does not match the story's jira_key {story}")]
    ParentMismatch { story: String, parent: String },

    #[error("already created as {0}")]
    AlreadyCreated(String),

    #[error("draft has no Jira key: run 'jirasync create' first")]
    IsDraft,

    #[error("no files matched the given paths or patterns")]
    NoFiles,

    #[error("cannot rename {} to {}: target already exists", .from.display(), .to.display())]
    RenameConflict { from: PathBuf, to: PathBuf },

    #[error("authentication failed: check JIRA_EMAIL and JIRA_API_TOKEN")]
    Auth,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("Jira rejected the request: {}", describe_rejection(.fields, .messages))]
    InvalidField {
        fields: BTreeMap<String, String>,
        messages: Vec<String>,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no available transition from '{current}' to '{target}' for {key}. Available: [{}]", .available.join(", "))]
    NoTransition {
        key: String,
        current: String,
        target: String,
        available: Vec<String>,
    },

    #[error("transient failure, retry later: {0}")]
    Transient(String),

    #[error("unexpected response (HTTP {status}): {body}")]
    Http { status: u16, body: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Coarse grouping used in batch reports and for exit handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Config,
    Validation,
    Conflict,
    Remote,
    Transient,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Config => "config",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::Remote => "remote",
            ErrorCategory::Transient => "transient",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SyncError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::MissingCredential(_) | SyncError::Config(_) | SyncError::NoFiles => {
                ErrorCategory::Config
            }
            SyncError::MalformedFrontMatter(_)
            | SyncError::InvalidAdf { .. }
            | SyncError::MissingField { .. }
            | SyncError::UnknownIssueType(_)
            | SyncError::TypeMismatch { .. }
            | SyncError::ParentMismatch { .. }
            | SyncError::AlreadyCreated(_)
            | SyncError::IsDraft
            | SyncError::Yaml(_)
            | SyncError::Json(_)
            | SyncError::Io(_) => ErrorCategory::Validation,
            SyncError::RenameConflict { .. } => ErrorCategory::Conflict,
            SyncError::Auth
            | SyncError::PermissionDenied(_)
            | SyncError::InvalidField { .. }
            | SyncError::NotFound(_)
            | SyncError::NoTransition { .. }
            | SyncError::Http { .. } => ErrorCategory::Remote,
            SyncError::Transient(_) => ErrorCategory::Transient,
        }
    }

    /// Fatal for the whole run rather than a single file.
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Config
    }

    /// Field ids Jira named in a 400 rejection.
    pub fn rejected_fields(&self) -> Vec<&str> {
        match self {
            SyncError::InvalidField { fields, .. } => fields.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// True when any message in a 400 rejection mentions `needle`.
    pub fn rejection_mentions(&self, needle: &str) -> bool {
        match self {
            SyncError::InvalidField { fields, messages } => {
                let needle = needle.to_lowercase();
                fields
                    .values()
                    .chain(messages.iter())
                    .any(|m| m.to_lowercase().contains(&needle))
            }
            _ => false,
        }
    }
}

fn describe_rejection(fields: &BTreeMap<String, String>, messages: &[String]) -> String {
    let mut parts: Vec<String> = messages.to_vec();
    parts.extend(fields.iter().map(|(k, v)| format!("{k}: {v}")));
    if parts.is_empty() {
        "no details returned".to_string()
    } else {
        parts.join("; ")
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Transient(format!("request timed out: {err}"))
        } else if err.is_connect() || err.is_request() {
            SyncError::Transient(format!("network error: {err}"))
        } else if err.is_decode() {
            SyncError::Http {
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                body: format!("could not decode response: {err}"),
            }
        } else {
            SyncError::Transient(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_taxonomy() {
        assert_eq!(
            SyncError::MissingCredential("JIRA_EMAIL").category(),
            ErrorCategory::Config
        );
        assert_eq!(SyncError::IsDraft.category(), ErrorCategory::Validation);
        assert_eq!(SyncError::Auth.category(), ErrorCategory::Remote);
        assert_eq!(
            SyncError::Transient("503".into()).category(),
            ErrorCategory::Transient
        );
        assert_eq!(
            SyncError::RenameConflict {
                from: "a.md".into(),
                to: "b.md".into()
            }
            .category(),
            ErrorCategory::Conflict
        );
    }

    #[test]
    fn no_transition_lists_available() {
        let err = SyncError::NoTransition {
            key: "WOR-1".into(),
            current: "To Do".into(),
            target: "Done".into(),
            available: vec!["In Progress".into(), "Blocked".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("no available transition"));
        assert!(msg.contains("[In Progress, Blocked]"));
    }

    #[test]
    fn invalid_field_message_and_lookup() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "customfield_10020".to_string(),
            "Issue can be assigned only active or future sprints.".to_string(),
        );
        let err = SyncError::InvalidField {
            fields,
            messages: vec![],
        };
        assert!(err.to_string().contains("customfield_10020"));
        assert_eq!(err.rejected_fields(), vec!["customfield_10020"]);
        assert!(err.rejection_mentions("active or future sprints"));
        assert!(!SyncError::Auth.rejection_mentions("sprint"));
    }

    #[test]
    fn fatal_errors() {
        assert!(SyncError::MissingCredential("JIRA_BASE_URL").is_fatal());
        assert!(SyncError::NoFiles.is_fatal());
        assert!(!SyncError::Auth.is_fatal());
        assert!(!SyncError::NotFound("WOR-9".into()).is_fatal());
    }
}
