use super::{Engine, FileReport, IssueReport, Outcome, Users};
use crate::adf;
use crate::error::{Result, SyncError};
use crate::field::{self, Encoded, FieldValue};
use crate::frontmatter::FmValue;
use crate::record::{RecordFile, Slot};
use crate::schema::{CreatePhase, IssueSchema, IssueType, PARENT_KEY, STORY_POINTS, SUMMARY};
use crate::{io, paths};
use serde_json::{json, Map, Value};

/// Key placeholder for a combined record's subtask before its story exists.
const PENDING_STORY: &str = "<new story>";

/// Payloads for one issue, built and validated before anything is sent.
struct CreatePlan {
    slot: Slot,
    initial: Map<String, Value>,
    follow_up: Map<String, Value>,
    /// Summary was made up from the parent key rather than read from the record.
    derived_summary: bool,
}

impl CreatePlan {
    fn preview(&self) -> Value {
        json!({ "create": self.initial, "update": self.follow_up })
    }

    /// Point a subtask planned before its story existed at the new story.
    fn attach_to_story(&mut self, key: &str) {
        self.initial.insert("parent".into(), json!({ "key": key }));
        if self.derived_summary {
            self.initial
                .insert("summary".into(), json!(format!("Subtask for {key}")));
        }
    }
}

pub(super) fn create_record(
    eng: &Engine<'_>,
    mut record: RecordFile,
    report: &mut FileReport,
) -> Result<Outcome> {
    let primary = record.primary()?;
    if let Some(key) = record.key(primary) {
        return Ok(report.skip(SyncError::AlreadyCreated(key).to_string()));
    }

    let users = Users::new(eng.api);
    let story_plan = plan(eng, &record, primary, None, &users, report)?;
    let subtask_plan = match record.slots()?.get(1).copied() {
        Some(sub) if record.key(sub).is_none() => {
            Some(plan(eng, &record, sub, Some(PENDING_STORY), &users, report)?)
        }
        _ => None,
    };

    if eng.opts.dry_run {
        for p in [Some(&story_plan), subtask_plan.as_ref()].into_iter().flatten() {
            let mut ir = IssueReport::new(p.slot, None);
            ir.payload = Some(p.preview());
            report.issues.push(ir);
        }
        return Ok(Outcome::Succeeded);
    }

    let key = submit(eng, &story_plan, report)?;
    record.set(primary, "jira_key", &FmValue::Str(key.clone()))?;
    record.save()?;
    let mut ir = IssueReport::new(primary, Some(key.clone()));
    ir.created = true;
    report.issues.push(ir);

    if let Some(mut sub) = subtask_plan {
        sub.attach_to_story(&key);
        match submit(eng, &sub, report) {
            Ok(sub_key) => {
                record.set(sub.slot, "jira_key", &FmValue::Str(sub_key.clone()))?;
                record.set(sub.slot, PARENT_KEY, &FmValue::Str(key.clone()))?;
                record.save()?;
                let mut ir = IssueReport::new(sub.slot, Some(sub_key));
                ir.created = true;
                report.issues.push(ir);
            }
            Err(e) => report.warn(format!("story {key} created but its subtask failed: {e}")),
        }
    }

    if let Some(target) = paths::renamed_path(&record.path, &key) {
        if target != record.path {
            io::rename_no_clobber(&record.path, &target)?;
            tracing::info!(from = %record.path.display(), to = %target.display(), "renamed record");
            report.renamed_to = Some(target);
        }
    }
    Ok(Outcome::Succeeded)
}

/// Create the issue, then send the fields the create screen does not accept.
fn submit(eng: &Engine<'_>, plan: &CreatePlan, report: &mut FileReport) -> Result<String> {
    let created = eng.api.create_issue(&plan.initial)?;
    if !plan.follow_up.is_empty() {
        if let Err(e) = eng.api.update_issue(&created.key, &plan.follow_up) {
            report.warn(format!(
                "{} created but its follow-up update failed: {e}",
                created.key
            ));
        }
    }
    Ok(created.key)
}

fn plan(
    eng: &Engine<'_>,
    record: &RecordFile,
    slot: Slot,
    parent_override: Option<&str>,
    users: &Users<'_>,
    report: &mut FileReport,
) -> Result<CreatePlan> {
    let schema = IssueSchema::for_type(slot.issue_type, eng.cfg);
    let project = record
        .project(slot)
        .unwrap_or_else(|| eng.cfg.project_key.clone());

    let mut initial = Map::new();
    initial.insert("project".into(), json!({ "key": project }));
    initial.insert("issuetype".into(), slot.issue_type.create_ref(eng.cfg));
    let mut follow_up = Map::new();
    let mut derived_summary = false;

    for spec in schema.fields.iter().filter(|s| s.create != CreatePhase::Never) {
        let mut value = field::local_value(record, slot, spec)?;
        if spec.name == PARENT_KEY {
            if let Some(parent) = parent_override {
                value = FieldValue::Text(parent.to_string());
            }
        }
        // A new subtask without its own estimate starts with the story's.
        if spec.name == STORY_POINTS && value.is_empty() && slot.is_subtask_half() {
            if let Some(story) = record.story_slot() {
                value = field::local_value(record, story, spec)?;
            }
        }
        if spec.name == SUMMARY && value.is_empty() {
            value = fallback_summary(record, slot, parent_override, eng)?;
            derived_summary = slot.is_subtask_half();
        }
        if value.is_empty() {
            if schema.required.contains(&spec.name) {
                return Err(SyncError::MissingField {
                    field: spec.name.to_string(),
                    issue_type: slot.issue_type.to_string(),
                });
            }
            continue;
        }
        match field::encode(spec, &value, users)? {
            Encoded::Value(v) => {
                let target = match spec.create {
                    CreatePhase::FollowUp => &mut follow_up,
                    _ => &mut initial,
                };
                target.insert(spec.jira_id.clone(), v);
            }
            Encoded::Skip(reason) => report.warn(format!("{}: {reason}", slot.label())),
        }
    }

    Ok(CreatePlan {
        slot,
        initial,
        follow_up,
        derived_summary,
    })
}

/// Summary for a record without a `## Summary` section.
fn fallback_summary(
    record: &RecordFile,
    slot: Slot,
    parent_override: Option<&str>,
    eng: &Engine<'_>,
) -> Result<FieldValue> {
    if slot.is_subtask_half() {
        let story = parent_override.unwrap_or(PENDING_STORY);
        return Ok(FieldValue::Text(format!("Subtask for {story}")));
    }
    if slot.issue_type != IssueType::Story {
        return Ok(FieldValue::Empty);
    }

    let prose = record
        .section_prose(slot, "Acceptance Criteria")
        .filter(|p| p.trim() != crate::markdown::PLACEHOLDER && !p.trim().is_empty());
    let text = match prose {
        Some(p) => Some(p),
        None => record
            .read_adf(slot, &eng.cfg.fields.acceptance)?
            .map(|doc| adf::plain_text(&doc)),
    };
    if let Some(line) = text.as_deref().and_then(first_line) {
        return Ok(FieldValue::Text(line));
    }

    let title = record.title();
    Ok(if title.is_empty() {
        FieldValue::Empty
    } else {
        FieldValue::Text(title)
    })
}

/// First non-empty line with list, heading and checkbox markers removed.
fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(|l| {
            l.trim()
                .trim_start_matches(['#', '-', '*', '+', '>', ' '])
                .trim_start_matches("[ ]")
                .trim_start_matches("[x]")
                .trim()
                .replace("**", "")
        })
        .find(|l| !l.is_empty())
}
