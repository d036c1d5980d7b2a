//! Field values: reading them from a record or a Jira issue, comparing them,
//! and encoding them for the REST API.

use crate::adf;
use chrono::{DateTime, SecondsFormat, Utc};
use crate::error::Result;
use crate::record::{RecordFile, Slot};
use crate::schema::{FieldKind, FieldSpec, Location, TEXT_LIMIT};
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Empty,
    Text(String),
    List(Vec<String>),
    Doc(Value),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Empty => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Doc(doc) => adf::is_empty_doc(doc),
        }
    }

    fn text(s: Option<String>) -> Self {
        match s {
            Some(s) if !s.trim().is_empty() => FieldValue::Text(s.trim().to_string()),
            _ => FieldValue::Empty,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Short human form for reports.
    pub fn preview(&self) -> String {
        match self {
            FieldValue::Empty => "(empty)".to_string(),
            FieldValue::Text(s) => truncate(s, 60),
            FieldValue::List(items) => format!("[{}]", items.join(", ")),
            FieldValue::Doc(doc) => {
                let text = adf::plain_text(doc).replace('\n', " ");
                format!("(document) {}", truncate(&text, 50))
            }
        }
    }
}

/// Cut `s` to `max` characters, marking the cut with `...`.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

// ---------------------------------------------------------------------------
// Local values
// ---------------------------------------------------------------------------

/// Read the value of `spec` for `slot` from the record.
pub fn local_value(record: &RecordFile, slot: Slot, spec: &FieldSpec) -> Result<FieldValue> {
    let value = match spec.location() {
        Location::FrontMatter => match spec.kind {
            FieldKind::Labels => {
                let items = record.get_list(slot, spec.name);
                if items.is_empty() {
                    FieldValue::Empty
                } else {
                    FieldValue::List(items)
                }
            }
            _ => FieldValue::text(record.get(slot, spec.name)),
        },
        Location::Section => {
            let prose = record
                .section_prose(slot, spec.name)
                .filter(|p| p.trim() != crate::markdown::PLACEHOLDER);
            match spec.kind {
                FieldKind::Summary => {
                    FieldValue::text(prose.map(|p| p.split_whitespace().collect::<Vec<_>>().join(" ")))
                }
                _ => FieldValue::text(prose),
            }
        }
        Location::AdfBlock => match record.read_adf(slot, &spec.jira_id)? {
            Some(doc) => FieldValue::Doc(doc),
            None if record.has_adf_block(slot, &spec.jira_id)? => FieldValue::Empty,
            // Drafts usually carry only prose; it is sent as plain paragraphs.
            None => match record
                .section_prose(slot, spec.name)
                .filter(|p| !p.trim().is_empty() && p.trim() != crate::markdown::PLACEHOLDER)
            {
                Some(prose) => FieldValue::Doc(adf::from_plain_text(&prose)),
                None => FieldValue::Empty,
            },
        },
    };
    Ok(value)
}

// ---------------------------------------------------------------------------
// Remote values
// ---------------------------------------------------------------------------

/// Read the value of `spec` from an issue's `fields` object.
pub fn remote_value(fields: &Map<String, Value>, spec: &FieldSpec) -> FieldValue {
    let raw = fields.get(&spec.jira_id).unwrap_or(&Value::Null);
    match spec.kind {
        FieldKind::Summary | FieldKind::ParentLink | FieldKind::PlainText => {
            FieldValue::text(raw.as_str().map(str::to_string))
        }
        FieldKind::Timestamp => FieldValue::text(raw.as_str().map(normalize_timestamp)),
        FieldKind::Status => FieldValue::text(
            raw.get("name").and_then(Value::as_str).map(str::to_string),
        ),
        FieldKind::Number => FieldValue::text(raw.as_f64().map(format_number)),
        FieldKind::Sprint => FieldValue::text(current_sprint(raw)),
        FieldKind::Team => FieldValue::text(match raw {
            Value::String(s) => Some(s.clone()),
            other => other.get("id").and_then(scalar_id),
        }),
        FieldKind::Labels => {
            let items: Vec<String> = raw
                .as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            if items.is_empty() {
                FieldValue::Empty
            } else {
                FieldValue::List(items)
            }
        }
        FieldKind::User => FieldValue::text(
            raw.get("emailAddress")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .or_else(|| raw.get("accountId").and_then(Value::as_str))
                .map(str::to_string),
        ),
        FieldKind::Parent => FieldValue::text(
            raw.get("key").and_then(Value::as_str).map(str::to_string),
        ),
        FieldKind::Doc => {
            if raw.is_object() {
                FieldValue::Doc(raw.clone())
            } else {
                FieldValue::Empty
            }
        }
    }
}

/// Jira timestamps (`2024-01-15T10:30:00.000+0000`) as UTC RFC 3339.
pub fn normalize_timestamp(raw: &str) -> String {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|t| t.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|_| raw.to_string())
}

fn scalar_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn sprint_ids(raw: &Value) -> Vec<String> {
    match raw {
        Value::Array(items) => items
            .iter()
            .filter_map(|s| s.get("id").and_then(scalar_id))
            .collect(),
        Value::Object(_) => raw.get("id").and_then(scalar_id).into_iter().collect(),
        other => scalar_id(other).into_iter().collect(),
    }
}

/// The active sprint if there is one, otherwise the most recent.
fn current_sprint(raw: &Value) -> Option<String> {
    if let Value::Array(items) = raw {
        let active = items.iter().find(|s| {
            s.get("state")
                .and_then(Value::as_str)
                .is_some_and(|st| st.eq_ignore_ascii_case("active"))
        });
        return active
            .or_else(|| items.last())
            .and_then(|s| s.get("id"))
            .and_then(scalar_id);
    }
    sprint_ids(raw).into_iter().next()
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// Whether a non-empty local value already matches the remote field.
pub fn matches_remote(spec: &FieldSpec, local: &FieldValue, fields: &Map<String, Value>) -> bool {
    let raw = fields.get(&spec.jira_id).unwrap_or(&Value::Null);
    let remote = remote_value(fields, spec);
    match (spec.kind, local) {
        (FieldKind::Number, FieldValue::Text(l)) => match (l.parse::<f64>(), raw.as_f64()) {
            (Ok(a), Some(b)) => (a - b).abs() < 1e-9,
            _ => false,
        },
        (FieldKind::Sprint, FieldValue::Text(l)) => sprint_ids(raw).iter().any(|id| id == l),
        (FieldKind::User, FieldValue::Text(l)) => ["emailAddress", "accountId"].iter().any(|k| {
            raw.get(*k)
                .and_then(Value::as_str)
                .is_some_and(|v| v.eq_ignore_ascii_case(l))
        }),
        (FieldKind::Labels, FieldValue::List(l)) => {
            let a: BTreeSet<&str> = l.iter().map(String::as_str).collect();
            let b: BTreeSet<&str> = match &remote {
                FieldValue::List(r) => r.iter().map(String::as_str).collect(),
                _ => BTreeSet::new(),
            };
            a == b
        }
        (FieldKind::Doc, FieldValue::Doc(l)) => match &remote {
            FieldValue::Doc(r) => adf::normalize_for_write(l) == adf::normalize_for_write(r),
            _ => false,
        },
        (FieldKind::Status | FieldKind::Parent | FieldKind::ParentLink, FieldValue::Text(l)) => {
            remote.as_text().is_some_and(|r| r.eq_ignore_ascii_case(l))
        }
        (FieldKind::Summary | FieldKind::PlainText, FieldValue::Text(l)) => {
            remote.as_text().is_some_and(|r| {
                truncate(&collapse(l), TEXT_LIMIT) == truncate(&collapse(r), TEXT_LIMIT)
            })
        }
        (_, l) => *l == remote,
    }
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Resolves a person reference (email or account id) to a Jira account id.
pub trait UserLookup {
    fn account_id(&self, who: &str) -> Result<Option<String>>;
}

static ACCOUNT_ID_RE: OnceLock<Regex> = OnceLock::new();

/// Account ids are opaque tokens; anything with `@` is treated as an email.
pub fn looks_like_account_id(s: &str) -> bool {
    let re = ACCOUNT_ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9:_-]{10,}$").unwrap());
    !s.contains('@') && re.is_match(s)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Encoded {
    Value(Value),
    /// Field left out of the payload, with the reason.
    Skip(String),
}

/// Encode a non-empty local value for a create or update payload.
pub fn encode(spec: &FieldSpec, value: &FieldValue, users: &dyn UserLookup) -> Result<Encoded> {
    let text = value.as_text().unwrap_or_default();
    let encoded = match (spec.kind, value) {
        (FieldKind::Summary | FieldKind::PlainText, _) => {
            Encoded::Value(Value::String(truncate(text, TEXT_LIMIT)))
        }
        (FieldKind::Number, _) => match text.parse::<f64>() {
            Ok(n) if n.fract() == 0.0 && n.abs() < 1e15 => Encoded::Value(json!(n as i64)),
            Ok(n) => Encoded::Value(json!(n)),
            Err(_) => Encoded::Skip(format!("{} '{text}' is not a number", spec.name)),
        },
        (FieldKind::Sprint, _) => match text.parse::<i64>() {
            Ok(id) => Encoded::Value(json!(id)),
            Err(_) => Encoded::Skip(format!("{} '{text}' is not a sprint id", spec.name)),
        },
        (FieldKind::Team | FieldKind::ParentLink, _) => Encoded::Value(Value::String(text.to_string())),
        (FieldKind::Labels, FieldValue::List(items)) => Encoded::Value(json!(items)),
        (FieldKind::User, _) => match users.account_id(text)? {
            Some(id) => Encoded::Value(json!({ "accountId": id })),
            None => Encoded::Skip(format!("{} '{text}' did not match a Jira user", spec.name)),
        },
        (FieldKind::Parent, _) => Encoded::Value(json!({ "key": text })),
        (FieldKind::Doc, FieldValue::Doc(doc)) => Encoded::Value(adf::normalize_for_write(doc)),
        (FieldKind::Status | FieldKind::Timestamp, _) => {
            Encoded::Skip(format!("{} is not written through field updates", spec.name))
        }
        _ => Encoded::Skip(format!("{} has an unexpected value shape", spec.name)),
    };
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::schema::{IssueSchema, IssueType};
    use std::path::Path;

    struct NoUsers;

    impl UserLookup for NoUsers {
        fn account_id(&self, who: &str) -> Result<Option<String>> {
            if looks_like_account_id(who) {
                return Ok(Some(who.to_string()));
            }
            Ok((who == "dev@example.com").then(|| "acc-123456789".to_string()))
        }
    }

    fn spec(t: IssueType, name: &str) -> FieldSpec {
        IssueSchema::for_type(t, &Config::default())
            .fields
            .into_iter()
            .find(|f| f.name == name && f.push)
            .unwrap()
    }

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn remote_sprint_prefers_active() {
        let f = fields(json!({ "customfield_10020": [
            { "id": 7, "state": "closed" },
            { "id": 9, "state": "active" },
            { "id": 11, "state": "future" }
        ]}));
        let s = spec(IssueType::Story, "sprint_id");
        assert_eq!(remote_value(&f, &s), FieldValue::Text("9".into()));

        let closed = fields(json!({ "customfield_10020": [{ "id": 3, "state": "closed" }, { "id": 4, "state": "closed" }] }));
        assert_eq!(remote_value(&closed, &s), FieldValue::Text("4".into()));
        assert!(matches_remote(&s, &FieldValue::Text("3".into()), &closed));
    }

    #[test]
    fn remote_user_prefers_email() {
        let s = spec(IssueType::Epic, "assignee");
        let f = fields(json!({ "assignee": { "accountId": "acc-1", "emailAddress": "a@x.io" } }));
        assert_eq!(remote_value(&f, &s), FieldValue::Text("a@x.io".into()));
        assert!(matches_remote(&s, &FieldValue::Text("acc-1".into()), &f));
        assert!(matches_remote(&s, &FieldValue::Text("A@X.io".into()), &f));

        let hidden = fields(json!({ "assignee": { "accountId": "acc-1" } }));
        assert_eq!(remote_value(&hidden, &s), FieldValue::Text("acc-1".into()));
    }

    #[test]
    fn numbers_and_labels_compare_loosely() {
        let sp = spec(IssueType::Story, "story_points");
        let f = fields(json!({ "customfield_10037": 3.0, "labels": ["b", "a"] }));
        assert_eq!(remote_value(&f, &sp), FieldValue::Text("3".into()));
        assert!(matches_remote(&sp, &FieldValue::Text("3".into()), &f));
        assert!(!matches_remote(&sp, &FieldValue::Text("5".into()), &f));

        let labels = spec(IssueType::Story, "labels");
        assert!(matches_remote(
            &labels,
            &FieldValue::List(vec!["a".into(), "b".into()]),
            &f
        ));
    }

    #[test]
    fn team_reads_id_object() {
        let s = spec(IssueType::Feature, "team_id");
        let f = fields(json!({ "customfield_10001": { "id": "team-uuid", "name": "Core" } }));
        assert_eq!(remote_value(&f, &s), FieldValue::Text("team-uuid".into()));
    }

    #[test]
    fn doc_comparison_ignores_write_normalization() {
        let s = spec(IssueType::Story, "Acceptance Criteria");
        let remote_doc = json!({ "type": "doc", "version": 1, "content": [{ "type": "paragraph", "content": [
            { "type": "text", "text": "x", "marks": [{ "type": "code" }, { "type": "strong" }] }
        ]}]});
        let f = fields(json!({ "customfield_10256": remote_doc.clone() }));
        assert!(matches_remote(&s, &FieldValue::Doc(remote_doc), &f));
    }

    #[test]
    fn encode_shapes() {
        let sprint = spec(IssueType::Story, "sprint_id");
        assert_eq!(
            encode(&sprint, &FieldValue::Text("42".into()), &NoUsers).unwrap(),
            Encoded::Value(json!(42))
        );
        assert!(matches!(
            encode(&sprint, &FieldValue::Text("Sprint 4".into()), &NoUsers).unwrap(),
            Encoded::Skip(_)
        ));

        let sp = spec(IssueType::Story, "story_points");
        assert_eq!(
            encode(&sp, &FieldValue::Text("1.5".into()), &NoUsers).unwrap(),
            Encoded::Value(json!(1.5))
        );

        let assignee = spec(IssueType::Story, "assignee");
        assert_eq!(
            encode(&assignee, &FieldValue::Text("dev@example.com".into()), &NoUsers).unwrap(),
            Encoded::Value(json!({ "accountId": "acc-123456789" }))
        );
        assert!(matches!(
            encode(&assignee, &FieldValue::Text("ghost@example.com".into()), &NoUsers).unwrap(),
            Encoded::Skip(_)
        ));

        let parent = spec(IssueType::Feature, "parent_key");
        assert_eq!(
            encode(&parent, &FieldValue::Text("WOR-1".into()), &NoUsers).unwrap(),
            Encoded::Value(json!({ "key": "WOR-1" }))
        );
    }

    #[test]
    fn summary_is_truncated() {
        let s = spec(IssueType::Epic, "Summary");
        let long = "x".repeat(300);
        let Encoded::Value(Value::String(out)) =
            encode(&s, &FieldValue::Text(long), &NoUsers).unwrap()
        else {
            panic!("expected string");
        };
        assert_eq!(out.chars().count(), 255);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn timestamps_are_normalized_to_utc() {
        assert_eq!(
            normalize_timestamp("2024-01-15T10:30:00.000+0200"),
            "2024-01-15T08:30:00Z"
        );
        assert_eq!(normalize_timestamp("yesterday"), "yesterday");
        let s = spec(IssueType::Epic, "Summary");
        let created = IssueSchema::for_type(IssueType::Epic, &Config::default())
            .fields
            .into_iter()
            .find(|f| f.name == "created_at")
            .unwrap();
        let f = fields(json!({ "created": "2024-01-15T10:30:00.000+0000", "summary": "x" }));
        assert_eq!(
            remote_value(&f, &created),
            FieldValue::Text("2024-01-15T10:30:00Z".into())
        );
        assert_eq!(remote_value(&f, &s), FieldValue::Text("x".into()));
    }

    #[test]
    fn account_id_detection() {
        assert!(looks_like_account_id("5b10ac8d82e05b22cc7d4ef5"));
        assert!(looks_like_account_id("712020:abcd-ef01"));
        assert!(!looks_like_account_id("dev@example.com"));
        assert!(!looks_like_account_id("short"));
    }

    #[test]
    fn doc_without_block_reads_prose() {
        let rec = RecordFile::parse(
            Path::new("DRAFT - Story - Login.md"),
            "---\njira_key: \"\"\n---\n## Acceptance Criteria (customfield_10256)\n\nUser can log in\n\n## Technical Notes (customfield_10356)\n\n[To be populated from Jira]\n",
        )
        .unwrap();
        let slot = rec.primary().unwrap();
        let ac = local_value(&rec, slot, &spec(IssueType::Story, "Acceptance Criteria")).unwrap();
        let FieldValue::Doc(doc) = ac else {
            panic!("expected a document");
        };
        assert_eq!(adf::plain_text(&doc).trim(), "User can log in");
        let notes = local_value(&rec, slot, &spec(IssueType::Story, "Technical Notes")).unwrap();
        assert!(notes.is_empty());
    }

    #[test]
    fn subtask_story_points_are_its_own() {
        let rec = RecordFile::parse(
            Path::new("WOR-1 - Login.md"),
            "---\nuser_story:\n  jira_key: \"WOR-1\"\n  story_points: \"5\"\nsubtask:\n  jira_key: \"WOR-2\"\n---\n# User Story\n\n# Subtask\n",
        )
        .unwrap();
        let slots = rec.slots().unwrap();
        let sp = spec(IssueType::Subtask, "story_points");
        assert_eq!(local_value(&rec, slots[1], &sp).unwrap(), FieldValue::Empty);
        let story_sp = spec(IssueType::Story, "story_points");
        assert_eq!(
            local_value(&rec, slots[0], &story_sp).unwrap(),
            FieldValue::Text("5".into())
        );
    }
}
