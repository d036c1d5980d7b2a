//! The issue-type table.
//!
//! Every operation is driven by the [`FieldSpec`] rows returned by
//! [`IssueSchema::for_type`]; nothing else in the crate special-cases an
//! issue type's fields.

use crate::config::Config;
use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// IssueType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueType {
    Epic,
    Feature,
    Story,
    Subtask,
}

impl IssueType {
    pub fn all() -> &'static [IssueType] {
        &[
            IssueType::Epic,
            IssueType::Feature,
            IssueType::Story,
            IssueType::Subtask,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IssueType::Epic => "Epic",
            IssueType::Feature => "Feature",
            IssueType::Story => "Story",
            IssueType::Subtask => "Subtask",
        }
    }

    /// Name Jira uses for the type.
    pub fn jira_name(self) -> &'static str {
        match self {
            IssueType::Subtask => "Sub-task",
            other => other.as_str(),
        }
    }

    pub fn type_id(self, cfg: &Config) -> &str {
        match self {
            IssueType::Epic => &cfg.issue_types.epic,
            IssueType::Feature => &cfg.issue_types.feature,
            IssueType::Story => &cfg.issue_types.story,
            IssueType::Subtask => &cfg.issue_types.subtask,
        }
    }

    /// The `issuetype` value for a create payload.
    pub fn create_ref(self, cfg: &Config) -> serde_json::Value {
        let id = self.type_id(cfg);
        if id.is_empty() {
            serde_json::json!({ "name": self.jira_name() })
        } else {
            serde_json::json!({ "id": id })
        }
    }

    pub fn parent_type(self) -> Option<IssueType> {
        match self {
            IssueType::Epic => None,
            IssueType::Feature => Some(IssueType::Epic),
            IssueType::Story => Some(IssueType::Feature),
            IssueType::Subtask => Some(IssueType::Story),
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IssueType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "epic" => Ok(IssueType::Epic),
            "feature" => Ok(IssueType::Feature),
            "story" | "user story" | "user_story" => Ok(IssueType::Story),
            "subtask" | "sub-task" => Ok(IssueType::Subtask),
            _ => Err(SyncError::UnknownIssueType(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// FieldSpec
// ---------------------------------------------------------------------------

/// How a field's value is shaped locally and on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `## Summary` section ↔ `summary`.
    Summary,
    /// Front matter status; changed through workflow transitions.
    Status,
    /// Decimal number (story points).
    Number,
    /// Sprint id; written as an integer, read from a sprint list.
    Sprint,
    /// Team id; written as a string, read as `{id}`.
    Team,
    Labels,
    /// Email or account id locally, `{accountId}` on the wire.
    User,
    /// `parent: {key}`.
    Parent,
    /// Issue key stored in a plain custom field.
    ParentLink,
    /// Read-only timestamp.
    Timestamp,
    /// ADF document kept in a fenced block under a body section.
    Doc,
    /// Plain string kept as a body section.
    PlainText,
}

/// Whether a field is sent in the create call, in the update that follows, or not at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatePhase {
    Initial,
    FollowUp,
    Never,
}

/// Where a field lives in the record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    FrontMatter,
    Section,
    AdfBlock,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Front matter key, or body section title for section-backed kinds.
    pub name: &'static str,
    /// Jira field id (`summary`, `customfield_10256`, ...).
    pub jira_id: String,
    pub kind: FieldKind,
    pub create: CreatePhase,
    pub push: bool,
    pub pull: bool,
    /// On an update rejection naming only soft fields, retry once without them.
    pub soft: bool,
}

impl FieldSpec {
    fn new(name: &'static str, jira_id: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name,
            jira_id: jira_id.into(),
            kind,
            create: CreatePhase::Initial,
            push: true,
            pull: true,
            soft: false,
        }
    }

    fn follow_up(mut self) -> Self {
        self.create = CreatePhase::FollowUp;
        self
    }

    fn create_only(mut self) -> Self {
        self.push = false;
        self
    }

    fn pull_only(mut self) -> Self {
        self.create = CreatePhase::Never;
        self.push = false;
        self
    }

    fn no_create(mut self) -> Self {
        self.create = CreatePhase::Never;
        self
    }

    fn soft(mut self) -> Self {
        self.soft = true;
        self
    }

    fn no_pull(mut self) -> Self {
        self.pull = false;
        self
    }

    pub fn location(&self) -> Location {
        match self.kind {
            FieldKind::Summary | FieldKind::PlainText => Location::Section,
            FieldKind::Doc => Location::AdfBlock,
            _ => Location::FrontMatter,
        }
    }

    /// Heading used when a section has to be created for this field.
    pub fn heading(&self) -> String {
        if self.jira_id.starts_with("customfield_") && self.kind == FieldKind::Doc {
            format!("{} ({})", self.name, self.jira_id)
        } else {
            self.name.to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// IssueSchema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct IssueSchema {
    pub issue_type: IssueType,
    pub fields: Vec<FieldSpec>,
    /// Local field names that must be non-empty before create.
    pub required: Vec<&'static str>,
}

pub const SUMMARY: &str = "Summary";
pub const STATUS: &str = "status";
pub const PARENT_KEY: &str = "parent_key";
pub const STORY_POINTS: &str = "story_points";

/// Maximum length Jira accepts for summaries and single-line text fields.
pub const TEXT_LIMIT: usize = 255;

impl IssueSchema {
    pub fn for_type(issue_type: IssueType, cfg: &Config) -> Self {
        let f = &cfg.fields;
        let summary = FieldSpec::new(SUMMARY, "summary", FieldKind::Summary);
        let status = FieldSpec::new(STATUS, "status", FieldKind::Status).no_create();
        let assignee = FieldSpec::new("assignee", "assignee", FieldKind::User);
        let reporter = FieldSpec::new("reporter", "reporter", FieldKind::User).pull_only();
        let pm_owner = FieldSpec::new("pm_owner", &f.pm_owner, FieldKind::User);
        let team = FieldSpec::new("team_id", &f.team, FieldKind::Team);
        let sprint = FieldSpec::new("sprint_id", &f.sprint, FieldKind::Sprint).soft();
        let labels = FieldSpec::new("labels", "labels", FieldKind::Labels);
        let created = FieldSpec::new("created_at", "created", FieldKind::Timestamp).pull_only();
        let updated = FieldSpec::new("updated_at", "updated", FieldKind::Timestamp).pull_only();

        let (fields, required) = match issue_type {
            IssueType::Epic => (
                vec![
                    summary,
                    status,
                    assignee,
                    reporter,
                    pm_owner,
                    team,
                    sprint,
                    FieldSpec::new(STORY_POINTS, &f.story_points_epic, FieldKind::Number),
                    labels,
                    created,
                    updated,
                    FieldSpec::new("Description", "description", FieldKind::Doc).follow_up(),
                    FieldSpec::new("Problem Statement", &f.problem_statement, FieldKind::PlainText)
                        .follow_up(),
                ],
                vec![SUMMARY],
            ),
            IssueType::Feature => (
                vec![
                    summary,
                    status,
                    FieldSpec::new(PARENT_KEY, "parent", FieldKind::Parent),
                    assignee,
                    reporter,
                    pm_owner,
                    team,
                    sprint,
                    FieldSpec::new(STORY_POINTS, &f.story_points_epic, FieldKind::Number),
                    labels,
                    created,
                    updated,
                    FieldSpec::new("Description", "description", FieldKind::Doc).follow_up(),
                    FieldSpec::new("Business Problem", &f.business_problem, FieldKind::Doc)
                        .follow_up(),
                    FieldSpec::new("High-Level Scope", &f.high_level_scope, FieldKind::Doc)
                        .follow_up(),
                    FieldSpec::new("Success Metrics", &f.success_metrics, FieldKind::Doc)
                        .follow_up(),
                    FieldSpec::new("Technical Notes", &f.tech_notes, FieldKind::Doc).follow_up(),
                ],
                vec![SUMMARY, PARENT_KEY],
            ),
            IssueType::Story => (
                vec![
                    summary,
                    status,
                    // Story -> Feature goes through a link field on create; the
                    // resulting hierarchy is read back from `parent`.
                    FieldSpec::new(PARENT_KEY, &f.parent_link, FieldKind::ParentLink)
                        .create_only()
                        .no_pull(),
                    FieldSpec::new(PARENT_KEY, "parent", FieldKind::Parent)
                        .pull_only(),
                    assignee,
                    reporter,
                    pm_owner,
                    team,
                    sprint,
                    FieldSpec::new(STORY_POINTS, &f.story_points_story, FieldKind::Number),
                    labels,
                    created,
                    updated,
                    FieldSpec::new("Acceptance Criteria", &f.acceptance, FieldKind::Doc)
                        .follow_up(),
                    FieldSpec::new("Technical Notes", &f.tech_notes, FieldKind::Doc).follow_up(),
                ],
                vec![SUMMARY, PARENT_KEY],
            ),
            IssueType::Subtask => (
                vec![
                    summary,
                    status,
                    FieldSpec::new(PARENT_KEY, "parent", FieldKind::Parent).soft(),
                    assignee,
                    reporter,
                    FieldSpec::new(STORY_POINTS, &f.story_points_subtask, FieldKind::Number),
                    labels,
                    created,
                    updated,
                    FieldSpec::new("Acceptance Criteria", &f.acceptance, FieldKind::Doc)
                        .follow_up(),
                    FieldSpec::new("Technical Notes", &f.tech_notes, FieldKind::Doc).follow_up(),
                    FieldSpec::new("QA Test", &f.qa_test, FieldKind::Doc).follow_up(),
                ],
                vec![SUMMARY, PARENT_KEY],
            ),
        };

        Self {
            issue_type,
            fields,
            required,
        }
    }

    /// Jira field ids to request on fetch.
    pub fn fetch_fields(&self) -> Vec<String> {
        let mut ids: Vec<String> = vec!["issuetype".to_string()];
        for spec in &self.fields {
            if (spec.pull || spec.push) && !ids.contains(&spec.jira_id) {
                ids.push(spec.jira_id.clone());
            }
        }
        ids
    }

    pub fn docs(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|s| s.kind == FieldKind::Doc)
    }

    pub fn soft_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|s| s.soft)
            .map(|s| s.jira_id.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
