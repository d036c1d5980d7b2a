//! Create, pull and push over a batch of record files.
//!
//! Every file is processed on its own: its failure is recorded in the
//! [`BatchReport`] and the next file is attempted. Nothing learned while
//! processing one file is carried into the next.

mod create;
mod pull;
mod push;

#[cfg(test)]
pub(crate) mod fake;

use crate::client::{Issue, JiraApi};
use crate::config::Config;
use crate::error::{ErrorCategory, Result, SyncError};
use crate::field::{looks_like_account_id, FieldValue, UserLookup};
use crate::record::{Layout, RecordFile, Slot};
use crate::schema::IssueType;
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Options and reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Pull,
    Push,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Pull => "pull",
            Operation::Push => "push",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Report what would change without any POST or PUT.
    pub dry_run: bool,
    /// Push field changes but leave workflow status alone.
    pub no_transition: bool,
    /// Only process records of this type; others are skipped.
    pub only_type: Option<IssueType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Skipped,
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Succeeded => "ok",
            Outcome::Skipped => "skipped",
            Outcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub from: String,
    pub to: String,
}

impl FieldChange {
    pub(crate) fn new(field: &str, from: &FieldValue, to: &FieldValue) -> Self {
        Self {
            field: field.to_string(),
            from: from.preview(),
            to: to.preview(),
        }
    }
}

/// What happened to one issue inside a record.
#[derive(Debug, Clone, Serialize)]
pub struct IssueReport {
    pub label: &'static str,
    pub issue_type: IssueType,
    pub key: Option<String>,
    pub created: bool,
    pub changes: Vec<FieldChange>,
    /// `"<from> -> <to>"` when a workflow transition was (or would be) applied.
    pub transition: Option<String>,
    /// Payloads a dry-run create would send.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl IssueReport {
    pub(crate) fn new(slot: Slot, key: Option<String>) -> Self {
        Self {
            label: slot.label(),
            issue_type: slot.issue_type,
            key,
            created: false,
            changes: Vec::new(),
            transition: None,
            payload: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: Outcome,
    pub issues: Vec<IssueReport>,
    pub renamed_to: Option<PathBuf>,
    pub warnings: Vec<String>,
    /// Why the file was skipped.
    pub note: Option<String>,
    pub error: Option<String>,
    pub category: Option<ErrorCategory>,
}

impl FileReport {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            outcome: Outcome::Succeeded,
            issues: Vec::new(),
            renamed_to: None,
            warnings: Vec::new(),
            note: None,
            error: None,
            category: None,
        }
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(path = %self.path.display(), "{message}");
        self.warnings.push(message);
    }

    pub(crate) fn skip(&mut self, note: impl Into<String>) -> Outcome {
        self.note = Some(note.into());
        Outcome::Skipped
    }

    fn fail(&mut self, err: &SyncError) {
        self.outcome = Outcome::Failed;
        self.category = Some(err.category());
        self.error = Some(err.to_string());
    }

    /// Number of field changes across the record's issues.
    pub fn change_count(&self) -> usize {
        self.issues.iter().map(|i| i.changes.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub operation: Operation,
    pub dry_run: bool,
    pub files: Vec<FileReport>,
}

impl BatchReport {
    fn count(&self, outcome: Outcome) -> usize {
        self.files.iter().filter(|f| f.outcome == outcome).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(Outcome::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(Outcome::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(Outcome::Skipped)
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine<'a> {
    pub(crate) api: &'a dyn JiraApi,
    pub(crate) cfg: &'a Config,
    pub(crate) opts: SyncOptions,
}

impl<'a> Engine<'a> {
    pub fn new(api: &'a dyn JiraApi, cfg: &'a Config, opts: SyncOptions) -> Self {
        Self { api, cfg, opts }
    }

    pub fn run(&self, op: Operation, paths: &[PathBuf]) -> BatchReport {
        let files = paths.iter().map(|p| self.run_file(op, p)).collect();
        BatchReport {
            operation: op,
            dry_run: self.opts.dry_run,
            files,
        }
    }

    fn run_file(&self, op: Operation, path: &Path) -> FileReport {
        let mut report = FileReport::new(path);
        let span = tracing::info_span!("file", op = op.as_str(), path = %path.display());
        let _guard = span.enter();

        match self.process(op, path, &mut report) {
            Ok(outcome) => report.outcome = outcome,
            Err(err) => {
                tracing::warn!(error = %err, "file failed");
                report.fail(&err);
            }
        }
        report
    }

    fn process(&self, op: Operation, path: &Path, report: &mut FileReport) -> Result<Outcome> {
        let record = RecordFile::load(path)?;
        if let Some(wanted) = self.opts.only_type {
            if !matches_type(&record, wanted)? {
                let found = record.issue_type()?;
                return Ok(report.skip(format!("{found} record, --type is {wanted}")));
            }
        }
        match op {
            Operation::Create => create::create_record(self, record, report),
            Operation::Pull => pull::pull_record(self, record, report),
            Operation::Push => push::push_record(self, record, report),
        }
    }
}

/// A combined record answers to both Story and Subtask.
fn matches_type(record: &RecordFile, wanted: IssueType) -> Result<bool> {
    if record.layout() == Layout::Combo {
        return Ok(matches!(wanted, IssueType::Story | IssueType::Subtask));
    }
    Ok(record.issue_type()? == wanted)
}

/// Refuse a remote issue whose type differs from the record's.
pub(crate) fn check_remote_type(issue: &Issue, expected: IssueType) -> Result<()> {
    let Some(name) = issue.type_name() else {
        return Ok(());
    };
    match name.parse::<IssueType>() {
        Ok(t) if t == expected => Ok(()),
        _ => Err(SyncError::TypeMismatch {
            expected: expected.to_string(),
            found: name.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Offline check
// ---------------------------------------------------------------------------

/// One issue of a record as seen without contacting Jira.
#[derive(Debug, Clone, Serialize)]
pub struct SlotCheck {
    pub label: &'static str,
    pub issue_type: IssueType,
    pub key: Option<String>,
    /// Required fields a draft is still missing.
    pub missing: Vec<String>,
}

/// Parse every field of every issue in the record.
///
/// Malformed front matter or ADF fails the whole record. Missing required
/// fields are listed per draft issue.
pub fn check_record(record: &RecordFile, cfg: &Config) -> Result<Vec<SlotCheck>> {
    use crate::schema::{IssueSchema, PARENT_KEY, SUMMARY};

    let mut out = Vec::new();
    for slot in record.slots()? {
        let schema = IssueSchema::for_type(slot.issue_type, cfg);
        let key = record.key(slot);
        let mut missing = Vec::new();
        for spec in &schema.fields {
            let value = crate::field::local_value(record, slot, spec)?;
            if key.is_some() || !value.is_empty() || !schema.required.contains(&spec.name) {
                continue;
            }
            // Values create fills in on its own.
            let derived = match spec.name {
                SUMMARY => slot.issue_type == IssueType::Story,
                PARENT_KEY => slot.is_subtask_half(),
                _ => false,
            };
            if !derived && !missing.iter().any(|m| m == spec.name) {
                missing.push(spec.name.to_string());
            }
        }
        out.push(SlotCheck {
            label: slot.label(),
            issue_type: slot.issue_type,
            key,
            missing,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// User resolution
// ---------------------------------------------------------------------------

/// Email to account id through user search, cached for one record.
pub(crate) struct Users<'a> {
    api: &'a dyn JiraApi,
    cache: RefCell<HashMap<String, Option<String>>>,
}

impl<'a> Users<'a> {
    pub(crate) fn new(api: &'a dyn JiraApi) -> Self {
        Self {
            api,
            cache: RefCell::new(HashMap::new()),
        }
    }
}

impl UserLookup for Users<'_> {
    fn account_id(&self, who: &str) -> Result<Option<String>> {
        if looks_like_account_id(who) {
            return Ok(Some(who.to_string()));
        }
        let needle = who.to_lowercase();
        if let Some(hit) = self.cache.borrow().get(&needle) {
            return Ok(hit.clone());
        }
        let found = match self.api.search_users(who) {
            Ok(users) => users
                .iter()
                .find(|u| u.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(who)))
                .or_else(|| users.first())
                .map(|u| u.account_id.clone()),
            // Some sites hide user search from API tokens.
            Err(SyncError::PermissionDenied(msg)) => {
                tracing::warn!(user = who, "user search denied: {msg}");
                None
            }
            Err(e) => return Err(e),
        };
        self.cache.borrow_mut().insert(needle, found.clone());
        Ok(found)
    }
}
