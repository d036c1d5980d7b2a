use crate::error::{Result, SyncError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// IssueTypeIds
// ---------------------------------------------------------------------------

/// Jira issue type ids used on create. An empty id means "send the type by name".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueTypeIds {
    #[serde(default = "default_epic_type")]
    pub epic: String,
    #[serde(default)]
    pub feature: String,
    #[serde(default = "default_story_type")]
    pub story: String,
    #[serde(default = "default_subtask_type")]
    pub subtask: String,
}

fn default_epic_type() -> String {
    "10186".to_string()
}

fn default_story_type() -> String {
    "10007".to_string()
}

fn default_subtask_type() -> String {
    "10184".to_string()
}

impl Default for IssueTypeIds {
    fn default() -> Self {
        Self {
            epic: default_epic_type(),
            feature: String::new(),
            story: default_story_type(),
            subtask: default_subtask_type(),
        }
    }
}

// ---------------------------------------------------------------------------
// FieldIds
// ---------------------------------------------------------------------------

/// Instance-specific custom field ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldIds {
    #[serde(default = "default_team")]
    pub team: String,
    #[serde(default = "default_sprint")]
    pub sprint: String,
    #[serde(default = "default_parent_link")]
    pub parent_link: String,
    #[serde(default = "default_pm_owner")]
    pub pm_owner: String,
    #[serde(default = "default_story_points_epic")]
    pub story_points_epic: String,
    #[serde(default = "default_story_points_story")]
    pub story_points_story: String,
    #[serde(default = "default_story_points_subtask")]
    pub story_points_subtask: String,
    #[serde(default = "default_acceptance")]
    pub acceptance: String,
    #[serde(default = "default_tech_notes")]
    pub tech_notes: String,
    #[serde(default = "default_qa_test")]
    pub qa_test: String,
    #[serde(default = "default_problem_statement")]
    pub problem_statement: String,
    #[serde(default = "default_business_problem")]
    pub business_problem: String,
    #[serde(default = "default_high_level_scope")]
    pub high_level_scope: String,
    #[serde(default = "default_success_metrics")]
    pub success_metrics: String,
}

fn default_team() -> String {
    "customfield_10001".to_string()
}
fn default_sprint() -> String {
    "customfield_10020".to_string()
}
fn default_parent_link() -> String {
    "customfield_10014".to_string()
}
fn default_pm_owner() -> String {
    "customfield_10246".to_string()
}
fn default_story_points_epic() -> String {
    "customfield_10026".to_string()
}
fn default_story_points_story() -> String {
    "customfield_10037".to_string()
}
fn default_story_points_subtask() -> String {
    "customfield_10016".to_string()
}
fn default_acceptance() -> String {
    "customfield_10256".to_string()
}
fn default_tech_notes() -> String {
    "customfield_10356".to_string()
}
fn default_qa_test() -> String {
    "customfield_10462".to_string()
}
fn default_problem_statement() -> String {
    "customfield_10322".to_string()
}
fn default_business_problem() -> String {
    "customfield_10255".to_string()
}
fn default_high_level_scope() -> String {
    "customfield_10323".to_string()
}
fn default_success_metrics() -> String {
    "customfield_10391".to_string()
}

impl Default for FieldIds {
    fn default() -> Self {
        Self {
            team: default_team(),
            sprint: default_sprint(),
            parent_link: default_parent_link(),
            pm_owner: default_pm_owner(),
            story_points_epic: default_story_points_epic(),
            story_points_story: default_story_points_story(),
            story_points_subtask: default_story_points_subtask(),
            acceptance: default_acceptance(),
            tech_notes: default_tech_notes(),
            qa_test: default_qa_test(),
            problem_statement: default_problem_statement(),
            business_problem: default_business_problem(),
            high_level_scope: default_high_level_scope(),
            success_metrics: default_success_metrics(),
        }
    }
}

impl FieldIds {
    fn entries(&self) -> [(&'static str, &str); 14] {
        [
            ("team", &self.team),
            ("sprint", &self.sprint),
            ("parent_link", &self.parent_link),
            ("pm_owner", &self.pm_owner),
            ("story_points_epic", &self.story_points_epic),
            ("story_points_story", &self.story_points_story),
            ("story_points_subtask", &self.story_points_subtask),
            ("acceptance", &self.acceptance),
            ("tech_notes", &self.tech_notes),
            ("qa_test", &self.qa_test),
            ("problem_statement", &self.problem_statement),
            ("business_problem", &self.business_problem),
            ("high_level_scope", &self.high_level_scope),
            ("success_metrics", &self.success_metrics),
        ]
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Contents of `jirasync.yaml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_project_key")]
    pub project_key: String,
    #[serde(default)]
    pub issue_types: IssueTypeIds,
    #[serde(default)]
    pub fields: FieldIds,
}

fn default_project_key() -> String {
    "WOR".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_key: default_project_key(),
            issue_types: IssueTypeIds::default(),
            fields: FieldIds::default(),
        }
    }
}

impl Config {
    /// Load `<root>/jirasync.yaml`, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)
            .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn validate(&self) -> Result<()> {
        if self.project_key.trim().is_empty() {
            return Err(SyncError::Config("project_key must not be empty".into()));
        }
        for (name, id) in self.fields.entries() {
            if id.trim().is_empty() {
                return Err(SyncError::Config(format!("fields.{name} must not be empty")));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

pub const ENV_BASE_URL: &str = "JIRA_BASE_URL";
pub const ENV_EMAIL: &str = "JIRA_EMAIL";
pub const ENV_API_TOKEN: &str = "JIRA_API_TOKEN";

#[derive(Clone)]
pub struct Credentials {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &'static str| -> Result<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(SyncError::MissingCredential(key))
        };
        let base_url = get(ENV_BASE_URL)?.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(SyncError::Config(format!(
                "{ENV_BASE_URL} must start with http:// or https://, got '{base_url}'"
            )));
        }
        Ok(Self {
            base_url,
            email: get(ENV_EMAIL)?,
            api_token: get(ENV_API_TOKEN)?,
        })
    }
}

/// Load the first env file found into the process environment.
///
/// Search order: `explicit`, `<cwd>/.env`, `<root>/.env`. Variables that are
/// already set are not overridden. An explicit path that does not exist is an
/// error; the implicit locations are optional.
pub fn load_env_file(explicit: Option<&Path>, root: &Path) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(SyncError::Config(format!(
                "env file not found: {}",
                path.display()
            )));
        }
        load_dotenv(path)?;
        return Ok(Some(path.to_path_buf()));
    }

    let mut candidates = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(paths::ENV_FILE));
    }
    candidates.push(root.join(paths::ENV_FILE));

    for path in candidates {
        if path.is_file() {
            load_dotenv(&path)?;
            return Ok(Some(path));
        }
    }
    Ok(None)
}

fn load_dotenv(path: &Path) -> Result<()> {
    dotenvy::from_path(path)
        .map_err(|e| SyncError::Config(format!("cannot read {}: {e}", path.display())))?;
    tracing::debug!(path = %path.display(), "loaded env file");
    Ok(())
}
