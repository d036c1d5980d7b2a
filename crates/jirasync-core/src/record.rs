use crate::error::{Result, SyncError};
use crate::frontmatter::{self, Envelope, FmValue, FrontMatter};
use crate::markdown;
use crate::paths;
use crate::config::Config;
use crate::schema::{CreatePhase, FieldKind, IssueSchema, IssueType, Location};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Front matter section holding the story half of a combined record.
pub const STORY_SECTION: &str = "user_story";
/// Front matter section holding the subtask half of a combined record.
pub const SUBTASK_SECTION: &str = "subtask";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One issue, keys at the top level of the front matter.
    Flat,
    /// Story plus optional subtask in `user_story:` / `subtask:` sections.
    Combo,
}

/// One issue inside a record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub issue_type: IssueType,
    section: Option<&'static str>,
    part: usize,
}

impl Slot {
    pub fn is_subtask_half(&self) -> bool {
        self.section == Some(SUBTASK_SECTION)
    }

    /// Label used in reports: `story`, `subtask` or the lowercase type.
    pub fn label(&self) -> &'static str {
        match self.section {
            Some(SUBTASK_SECTION) => "subtask",
            Some(_) => "story",
            None => match self.issue_type {
                IssueType::Epic => "epic",
                IssueType::Feature => "feature",
                IssueType::Story => "story",
                IssueType::Subtask => "subtask",
            },
        }
    }
}

/// A Markdown issue record loaded from disk.
#[derive(Debug, Clone)]
pub struct RecordFile {
    pub path: PathBuf,
    front: FrontMatter,
    layout: Layout,
    parts: Vec<String>,
    envelope: Envelope,
}

impl RecordFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(path, &content)
    }

    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let frontmatter::Split {
            yaml,
            body,
            envelope,
        } = frontmatter::split(content)?;
        let front = FrontMatter::parse(&yaml)?;
        let layout = if front.has_section(STORY_SECTION) {
            Layout::Combo
        } else {
            Layout::Flat
        };
        let parts = match layout {
            Layout::Flat => vec![body],
            Layout::Combo => {
                let (story, subtask) = markdown::split_regions(&body);
                vec![story, subtask]
            }
        };
        let record = Self {
            path: path.to_path_buf(),
            front,
            layout,
            parts,
            envelope,
        };
        record.check_subtask_parent()?;
        Ok(record)
    }

    /// Once both exist, a combined record's subtask must hang off its own story.
    fn check_subtask_parent(&self) -> Result<()> {
        if self.layout != Layout::Combo {
            return Ok(());
        }
        let story = self.front.get(Some(STORY_SECTION), "jira_key");
        let parent = self.front.get(Some(SUBTASK_SECTION), "parent_key");
        match (story, parent) {
            (Some(story), Some(parent)) if !story.eq_ignore_ascii_case(&parent) => {
                Err(SyncError::ParentMismatch { story, parent })
            }
            _ => Ok(()),
        }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Issue type of the record's primary issue.
    pub fn issue_type(&self) -> Result<IssueType> {
        if self.layout == Layout::Combo {
            return Ok(IssueType::Story);
        }
        if let Some(t) = self.front.get(None, "issue_type") {
            return t.parse();
        }
        // Drafts may carry the type only in their file name.
        let name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if let Some(rest) = name.strip_prefix(paths::DRAFT_PREFIX) {
            if let Some((candidate, _)) = rest.split_once(" - ") {
                if let Ok(t) = candidate.parse() {
                    return Ok(t);
                }
            }
        }
        Err(SyncError::MissingField {
            field: "issue_type".into(),
            issue_type: "record".into(),
        })
    }

    /// Primary issue first; a combined record adds its subtask half when present.
    pub fn slots(&self) -> Result<Vec<Slot>> {
        match self.layout {
            Layout::Flat => Ok(vec![Slot {
                issue_type: self.issue_type()?,
                section: None,
                part: 0,
            }]),
            Layout::Combo => {
                let mut slots = vec![Slot {
                    issue_type: IssueType::Story,
                    section: Some(STORY_SECTION),
                    part: 0,
                }];
                if self.front.has_section(SUBTASK_SECTION) || !self.parts[1].trim().is_empty() {
                    slots.push(Slot {
                        issue_type: IssueType::Subtask,
                        section: Some(SUBTASK_SECTION),
                        part: 1,
                    });
                }
                Ok(slots)
            }
        }
    }

    pub fn primary(&self) -> Result<Slot> {
        let slots = self.slots()?;
        slots
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::MalformedFrontMatter("record has no issue".into()))
    }

    /// The story half of a combined record, for subtask fallbacks.
    pub fn story_slot(&self) -> Option<Slot> {
        (self.layout == Layout::Combo).then_some(Slot {
            issue_type: IssueType::Story,
            section: Some(STORY_SECTION),
            part: 0,
        })
    }

    pub fn title(&self) -> String {
        paths::title_from_filename(&self.path)
    }

    // ----- front matter -----

    pub fn get(&self, slot: Slot, key: &str) -> Option<String> {
        self.front.get(slot.section, key)
    }

    pub fn get_list(&self, slot: Slot, key: &str) -> Vec<String> {
        self.front.get_list(slot.section, key)
    }

    pub fn set(&mut self, slot: Slot, key: &str, value: &FmValue) -> Result<()> {
        self.front.set(slot.section, key, value)
    }

    pub fn key(&self, slot: Slot) -> Option<String> {
        self.get(slot, "jira_key")
    }

    pub fn is_draft(&self) -> Result<bool> {
        Ok(self.key(self.primary()?).is_none())
    }

    /// Project key for `slot`, falling back to the top-level value.
    pub fn project(&self, slot: Slot) -> Option<String> {
        self.get(slot, "project")
            .or_else(|| self.front.get(None, "project"))
    }

    // ----- body -----

    pub fn section_prose(&self, slot: Slot, title: &str) -> Option<String> {
        markdown::section_prose(&self.parts[slot.part], title)
    }

    pub fn set_section_prose(
        &mut self,
        slot: Slot,
        title: &str,
        heading: &str,
        prose: &str,
        at_top: bool,
    ) {
        markdown::set_section_prose(&mut self.parts[slot.part], title, heading, prose, at_top);
    }

    pub fn read_adf(&self, slot: Slot, field_id: &str) -> Result<Option<Value>> {
        markdown::read_adf(&self.parts[slot.part], field_id)
    }

    pub fn has_adf_block(&self, slot: Slot, field_id: &str) -> Result<bool> {
        Ok(markdown::find_adf_block(&self.parts[slot.part], field_id)?.is_some())
    }

    pub fn write_adf(
        &mut self,
        slot: Slot,
        title: &str,
        heading: &str,
        field_id: &str,
        doc: &Value,
        prose: &str,
    ) -> Result<()> {
        markdown::write_adf(&mut self.parts[slot.part], title, heading, field_id, doc, prose)
    }

    // ----- persistence -----

    pub fn render(&self) -> String {
        let mut out = String::from("---\n");
        out.push_str(&self.front.render());
        out.push_str(self.envelope.closing);
        out.push('\n');
        for part in &self.parts {
            out.push_str(part);
        }
        self.envelope.wrap(&out)
    }

    pub fn save(&self) -> Result<()> {
        crate::io::atomic_write(&self.path, self.render().as_bytes())
    }
}

/// Front matter and section skeleton for a new draft of `issue_type`.
pub fn draft_template(issue_type: IssueType, title: &str, cfg: &Config) -> String {
    let schema = IssueSchema::for_type(issue_type, cfg);
    let mut out = String::from("---\njira_key: \"\"\n");
    out.push_str(&format!("issue_type: \"{issue_type}\"\n"));
    out.push_str(&format!("project: \"{}\"\n", cfg.project_key));

    let mut seen: Vec<&str> = Vec::new();
    for spec in &schema.fields {
        let writable = spec.push || spec.create != CreatePhase::Never;
        if spec.location() != Location::FrontMatter || !writable || seen.contains(&spec.name) {
            continue;
        }
        seen.push(spec.name);
        let value = match spec.kind {
            FieldKind::Labels => "[]",
            FieldKind::Status => "\"To Do\"",
            _ => "\"\"",
        };
        out.push_str(&format!("{}: {value}\n", spec.name));
    }

    out.push_str(&format!("---\n# {title}\n"));
    for spec in &schema.fields {
        match spec.location() {
            Location::Section if spec.kind == FieldKind::Summary => {
                out.push_str(&format!("\n## {}\n\n{title}\n", spec.heading()));
            }
            Location::Section | Location::AdfBlock => {
                out.push_str(&format!("\n## {}\n\n\n", spec.heading()));
            }
            Location::FrontMatter => {}
        }
    }
    out.push_str(&format!("\n## {}\n\n", markdown::RESERVED_SECTIONS[0]));
    out
}
