//! In-memory [`JiraApi`] that records every call.

use crate::client::{CreatedIssue, Issue, JiraApi, StatusRef, Transition, User};
use crate::error::{Result, SyncError};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

pub(crate) struct FakeJira {
    pub issues: Mutex<HashMap<String, Issue>>,
    pub transitions: Mutex<HashMap<String, Vec<Transition>>>,
    pub users: Mutex<Vec<User>>,
    /// Payloads sent to `create_issue`, in order.
    pub created: Mutex<Vec<Map<String, Value>>>,
    /// `(key, payload)` pairs sent to `update_issue`, in order.
    pub updates: Mutex<Vec<(String, Map<String, Value>)>>,
    /// Errors returned by the next update calls, front first.
    pub update_errors: Mutex<VecDeque<SyncError>>,
    /// Creates are rejected once the next key number reaches this value.
    pub fail_creates_from: Mutex<Option<u32>>,
    calls: Mutex<Vec<String>>,
    next_key: Mutex<u32>,
}

impl FakeJira {
    pub fn new() -> Self {
        Self {
            issues: Mutex::new(HashMap::new()),
            transitions: Mutex::new(HashMap::new()),
            users: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            update_errors: Mutex::new(VecDeque::new()),
            fail_creates_from: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            next_key: Mutex::new(100),
        }
    }

    pub fn put_issue(&self, key: &str, fields: Value) {
        let fields = fields.as_object().cloned().unwrap_or_default();
        self.issues.lock().unwrap().insert(
            key.to_string(),
            Issue {
                key: key.to_string(),
                fields,
            },
        );
    }

    pub fn add_transition(&self, key: &str, id: &str, name: &str, to: &str) {
        self.transitions
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push(Transition {
                id: id.to_string(),
                name: name.to_string(),
                to: Some(StatusRef {
                    name: to.to_string(),
                }),
            });
    }

    pub fn add_user(&self, account_id: &str, email: Option<&str>) {
        self.users.lock().unwrap().push(User {
            account_id: account_id.to_string(),
            email: email.map(str::to_string),
            display_name: None,
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    /// Calls that would change remote state.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with("POST") || c.starts_with("PUT"))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl JiraApi for FakeJira {
    fn get_issue(&self, key: &str, _fields: &[String]) -> Result<Issue> {
        self.record(format!("GET {key}"));
        self.issues
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("issue {key} does not exist")))
    }

    fn create_issue(&self, fields: &Map<String, Value>) -> Result<CreatedIssue> {
        self.record("POST issue".to_string());
        let mut next = self.next_key.lock().unwrap();
        if self.fail_creates_from.lock().unwrap().is_some_and(|n| *next >= n) {
            return Err(SyncError::InvalidField {
                fields: [("summary".to_string(), "rejected".to_string())].into(),
                messages: Vec::new(),
            });
        }
        let key = format!("WOR-{}", *next);
        *next += 1;
        self.created.lock().unwrap().push(fields.clone());
        self.issues.lock().unwrap().insert(
            key.clone(),
            Issue {
                key: key.clone(),
                fields: fields.clone(),
            },
        );
        Ok(CreatedIssue {
            id: next.to_string(),
            key,
        })
    }

    fn update_issue(&self, key: &str, fields: &Map<String, Value>) -> Result<()> {
        self.record(format!("PUT {key}"));
        if let Some(err) = self.update_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.updates
            .lock()
            .unwrap()
            .push((key.to_string(), fields.clone()));
        Ok(())
    }

    fn get_transitions(&self, key: &str) -> Result<Vec<Transition>> {
        self.record(format!("GET transitions {key}"));
        Ok(self
            .transitions
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    fn transition_issue(&self, key: &str, transition_id: &str) -> Result<()> {
        self.record(format!("POST transition {key} {transition_id}"));
        Ok(())
    }

    fn search_users(&self, query: &str) -> Result<Vec<User>> {
        self.record(format!("GET users {query}"));
        let q = query.to_lowercase();
        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .filter(|u| {
                u.email.as_deref().is_some_and(|e| e.to_lowercase().contains(&q))
                    || u.display_name
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&q))
            })
            .cloned()
            .collect())
    }
}
