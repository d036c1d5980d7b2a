//! Blocking Jira Cloud REST v3 client.

use crate::config::Credentials;
use crate::error::{Result, SyncError};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const USER_SEARCH_LIMIT: &str = "20";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Issue {
    pub key: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Issue {
    pub fn status(&self) -> Option<&str> {
        self.fields
            .get("status")
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
    }

    pub fn type_name(&self) -> Option<&str> {
        self.fields
            .get("issuetype")
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedIssue {
    #[serde(default)]
    pub id: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub to: Option<StatusRef>,
}

#[derive(Debug, Deserialize)]
struct TransitionList {
    #[serde(default)]
    transitions: Vec<Transition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "accountId")]
    pub account_id: String,
    #[serde(rename = "emailAddress", default)]
    pub email: Option<String>,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
}

// ---------------------------------------------------------------------------
// JiraApi
// ---------------------------------------------------------------------------

/// The remote operations the sync engine needs.
pub trait JiraApi {
    fn get_issue(&self, key: &str, fields: &[String]) -> Result<Issue>;
    fn create_issue(&self, fields: &Map<String, Value>) -> Result<CreatedIssue>;
    fn update_issue(&self, key: &str, fields: &Map<String, Value>) -> Result<()>;
    fn get_transitions(&self, key: &str) -> Result<Vec<Transition>>;
    fn transition_issue(&self, key: &str, transition_id: &str) -> Result<()>;
    fn search_users(&self, query: &str) -> Result<Vec<User>>;
}

// ---------------------------------------------------------------------------
// JiraClient
// ---------------------------------------------------------------------------

pub struct JiraClient {
    http: Client,
    base_url: String,
    email: String,
    api_token: String,
}

impl JiraClient {
    pub fn new(creds: &Credentials) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("jirasync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: creds.base_url.trim_end_matches('/').to_string(),
            email: creds.email.clone(),
            api_token: creds.api_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/api/3/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        tracing::debug!(%method, path, "jira request");
        self.http
            .request(method, self.url(path))
            .basic_auth(&self.email, Some(&self.api_token))
            .header("Accept", "application/json")
    }

    fn send_json<T: DeserializeOwned>(&self, rb: RequestBuilder) -> Result<T> {
        let resp = check(rb.send()?)?;
        Ok(resp.json::<T>()?)
    }

    fn send_empty(&self, rb: RequestBuilder) -> Result<()> {
        check(rb.send()?)?;
        Ok(())
    }
}

/// Map non-success responses onto categorized errors.
fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(error_for_status(status, &body))
}

pub(crate) fn error_for_status(status: StatusCode, body: &str) -> SyncError {
    let (fields, messages) = parse_error_body(body);
    let summary = || {
        let mut parts = messages.clone();
        parts.extend(fields.iter().map(|(k, v)| format!("{k}: {v}")));
        if parts.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("no details")
                .to_string()
        } else {
            parts.join("; ")
        }
    };
    match status {
        StatusCode::UNAUTHORIZED => SyncError::Auth,
        StatusCode::FORBIDDEN => SyncError::PermissionDenied(summary()),
        StatusCode::NOT_FOUND => SyncError::NotFound(summary()),
        StatusCode::BAD_REQUEST => SyncError::InvalidField { fields, messages },
        StatusCode::TOO_MANY_REQUESTS => SyncError::Transient(format!("rate limited: {}", summary())),
        s if s.is_server_error() => SyncError::Transient(format!("HTTP {}: {}", s.as_u16(), summary())),
        s => SyncError::Http {
            status: s.as_u16(),
            body: truncate_body(body),
        },
    }
}

/// Jira error bodies: `{"errorMessages": [...], "errors": {field: message}}`.
fn parse_error_body(body: &str) -> (BTreeMap<String, String>, Vec<String>) {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        let trimmed = body.trim();
        let messages = if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![truncate_body(trimmed)]
        };
        return (BTreeMap::new(), messages);
    };
    let messages = value
        .get("errorMessages")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let fields = value
        .get("errors")
        .and_then(Value::as_object)
        .map(|o| {
            o.iter()
                .map(|(k, v)| {
                    let msg = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                    (k.clone(), msg)
                })
                .collect()
        })
        .unwrap_or_default();
    (fields, messages)
}

fn truncate_body(body: &str) -> String {
    crate::field::truncate(body, 300)
}

impl JiraApi for JiraClient {
    fn get_issue(&self, key: &str, fields: &[String]) -> Result<Issue> {
        let mut rb = self.request(reqwest::Method::GET, &format!("issue/{key}"));
        if !fields.is_empty() {
            rb = rb.query(&[("fields", fields.join(","))]);
        }
        self.send_json(rb)
    }

    fn create_issue(&self, fields: &Map<String, Value>) -> Result<CreatedIssue> {
        let rb = self
            .request(reqwest::Method::POST, "issue")
            .json(&json!({ "fields": fields }));
        let created: CreatedIssue = self.send_json(rb)?;
        tracing::info!(key = %created.key, "created issue");
        Ok(created)
    }

    fn update_issue(&self, key: &str, fields: &Map<String, Value>) -> Result<()> {
        let rb = self
            .request(reqwest::Method::PUT, &format!("issue/{key}"))
            .json(&json!({ "fields": fields }));
        self.send_empty(rb)?;
        tracing::info!(key, fields = fields.len(), "updated issue");
        Ok(())
    }

    fn get_transitions(&self, key: &str) -> Result<Vec<Transition>> {
        let rb = self.request(reqwest::Method::GET, &format!("issue/{key}/transitions"));
        let list: TransitionList = self.send_json(rb)?;
        Ok(list.transitions)
    }

    fn transition_issue(&self, key: &str, transition_id: &str) -> Result<()> {
        let rb = self
            .request(reqwest::Method::POST, &format!("issue/{key}/transitions"))
            .json(&json!({ "transition": { "id": transition_id } }));
        self.send_empty(rb)?;
        tracing::info!(key, transition_id, "transitioned issue");
        Ok(())
    }

    fn search_users(&self, query: &str) -> Result<Vec<User>> {
        let rb = self
            .request(reqwest::Method::GET, "user/search")
            .query(&[("query", query), ("maxResults", USER_SEARCH_LIMIT)]);
        self.send_json(rb)
    }
}
