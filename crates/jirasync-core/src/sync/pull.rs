use super::{check_remote_type, Engine, FieldChange, FileReport, IssueReport, Outcome};
use crate::adf;
use crate::error::{Result, SyncError};
use crate::field::{self, FieldValue};
use crate::frontmatter::FmValue;
use crate::markdown::PLACEHOLDER;
use crate::record::{RecordFile, Slot};
use crate::schema::{FieldKind, FieldSpec, IssueSchema, Location};
use serde_json::Value;

pub(super) fn pull_record(
    eng: &Engine<'_>,
    mut record: RecordFile,
    report: &mut FileReport,
) -> Result<Outcome> {
    if record.is_draft()? {
        return Err(SyncError::IsDraft);
    }

    let mut changed = false;
    for slot in record.slots()? {
        let Some(key) = record.key(slot) else {
            report.warn(format!("{} has no Jira key yet; not pulled", slot.label()));
            continue;
        };
        let schema = IssueSchema::for_type(slot.issue_type, eng.cfg);
        let issue = eng.api.get_issue(&key, &schema.fetch_fields())?;
        check_remote_type(&issue, slot.issue_type)?;

        let mut ir = IssueReport::new(slot, Some(key));
        for spec in schema.fields.iter().filter(|s| s.pull) {
            let remote = field::remote_value(&issue.fields, spec);
            if let Some(change) = apply(&mut record, slot, spec, &remote)? {
                ir.changes.push(change);
                changed = true;
            }
        }
        report.issues.push(ir);
    }

    if changed && !eng.opts.dry_run {
        record.save()?;
        tracing::info!(path = %record.path.display(), "record updated from Jira");
    }
    Ok(Outcome::Succeeded)
}

/// Write one remote value into the record; returns the change when there was one.
fn apply(
    record: &mut RecordFile,
    slot: Slot,
    spec: &FieldSpec,
    remote: &FieldValue,
) -> Result<Option<FieldChange>> {
    match spec.location() {
        Location::FrontMatter => {
            let local = field::local_value(record, slot, spec)?;
            if local == *remote {
                return Ok(None);
            }
            let value = match remote {
                FieldValue::List(items) => FmValue::List(items.clone()),
                FieldValue::Empty if spec.kind == FieldKind::Labels => FmValue::List(Vec::new()),
                other => FmValue::Str(other.as_text().unwrap_or_default().to_string()),
            };
            record.set(slot, spec.name, &value)?;
            Ok(Some(FieldChange::new(spec.name, &local, remote)))
        }
        Location::Section => {
            let Some(text) = remote.as_text() else {
                return clear_section(record, slot, spec);
            };
            let current = record.section_prose(slot, spec.name).unwrap_or_default();
            if current.trim() == text.trim() {
                return Ok(None);
            }
            let at_top = spec.kind == FieldKind::Summary;
            record.set_section_prose(slot, spec.name, &spec.heading(), text, at_top);
            Ok(Some(FieldChange::new(
                spec.name,
                &FieldValue::Text(current),
                remote,
            )))
        }
        Location::AdfBlock => {
            let previous = record.read_adf(slot, &spec.jira_id)?;
            let (doc, mirror) = match remote {
                FieldValue::Doc(doc) => {
                    if previous.as_ref() == Some(doc) {
                        return Ok(None);
                    }
                    (doc.clone(), adf::to_markdown(doc))
                }
                // Jira holds nothing: leave an empty block so the prose is not sent.
                _ => {
                    if field::local_value(record, slot, spec)?.is_empty() {
                        return Ok(None);
                    }
                    (Value::Null, PLACEHOLDER.to_string())
                }
            };
            let prose = record.section_prose(slot, spec.name);
            let refresh = match (&prose, &previous) {
                (None, _) => false,
                (Some(p), _) if p.trim().is_empty() || p.trim() == PLACEHOLDER => true,
                (Some(p), Some(prev)) => p.trim() == adf::to_markdown(prev).trim(),
                (Some(_), None) => false,
            };
            record.write_adf(slot, spec.name, &spec.heading(), &spec.jira_id, &doc, &mirror)?;
            if refresh {
                record.set_section_prose(slot, spec.name, &spec.heading(), &mirror, false);
            }
            let before = previous.map(FieldValue::Doc).unwrap_or(FieldValue::Empty);
            Ok(Some(FieldChange::new(spec.name, &before, remote)))
        }
    }
}

/// Blank a prose section Jira holds no value for.
fn clear_section(record: &mut RecordFile, slot: Slot, spec: &FieldSpec) -> Result<Option<FieldChange>> {
    let local = field::local_value(record, slot, spec)?;
    if local.is_empty() {
        return Ok(None);
    }
    record.set_section_prose(slot, spec.name, &spec.heading(), PLACEHOLDER, false);
    Ok(Some(FieldChange::new(spec.name, &local, &FieldValue::Empty)))
}

#[cfg(test)]
mod tests {
    use super::super::fake::FakeJira;
    use super::super::{Engine, Operation, Outcome, SyncOptions};
    use crate::config::Config;
    use crate::error::ErrorCategory;
    use serde_json::json;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const STORY: &str = "---\njira_key: \"WOR-7\"\nissue_type: \"Story\" # hand note\nstatus: \"To Do\"\nassignee: \"\"\nlabels: []\n---\n# Login\n\n## Summary\n\nLogin form\n\n## Acceptance Criteria (customfield_10256)\n\nMy own wording.\n\n<details>\n<summary>ADF Version (customfield_10256)</summary>\n\n```json\n{\"type\":\"doc\",\"version\":1,\"content\":[]}\n```\n</details>\n\n## Local Notes\n\nkeep me\n";

    fn remote_story() -> serde_json::Value {
        json!({
            "issuetype": { "name": "Story" },
            "summary": "Login form v2",
            "status": { "name": "In Progress" },
            "assignee": { "accountId": "acc-1", "emailAddress": "dev@example.com" },
            "parent": { "key": "WOR-2" },
            "labels": ["auth", "web"],
            "customfield_10037": 5.0,
            "customfield_10020": [{ "id": 12, "state": "active" }],
            "customfield_10256": {
                "type": "doc", "version": 1,
                "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": "Remote AC" }] }]
            },
            "customfield_10356": {
                "type": "doc", "version": 1,
                "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": "Use OAuth" }] }]
            },
            "created": "2024-01-15T10:30:00.000+0000"
        })
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn pull(api: &FakeJira, opts: SyncOptions, files: &[PathBuf]) -> super::super::BatchReport {
        let cfg = Config::default();
        Engine::new(api, &cfg, opts).run(Operation::Pull, files)
    }

    #[test]
    fn pull_overwrites_metadata_and_keeps_local_prose() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "WOR-7 - Login.md", STORY);
        let api = FakeJira::new();
        api.put_issue("WOR-7", remote_story());

        let report = pull(&api, SyncOptions::default(), &[path.clone()]);
        assert_eq!(report.files[0].outcome, Outcome::Succeeded, "{:?}", report.files[0].error);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("issue_type: \"Story\" # hand note\n"));
        assert!(text.contains("status: \"In Progress\"\n"));
        assert!(text.contains("assignee: \"dev@example.com\"\n"));
        assert!(text.contains("labels: [\"auth\", \"web\"]\n"));
        assert!(text.contains("parent_key: \"WOR-2\""));
        assert!(text.contains("sprint_id: \"12\""));
        assert!(text.contains("story_points: \"5\""));
        assert!(text.contains("created_at: \"2024-01-15T10:30:00Z\""));
        assert!(text.contains("## Summary\n\nLogin form v2\n"));
        // Hand-written prose stays; the machine block is replaced.
        assert!(text.contains("My own wording."));
        assert!(text.contains("\"text\": \"Remote AC\""));
        // New rich-text section lands before the reserved notes.
        let tech = text.find("## Technical Notes (customfield_10356)").unwrap();
        let notes = text.find("## Local Notes").unwrap();
        assert!(tech < notes);
        assert!(text.contains("Use OAuth"));
        assert!(text.ends_with("## Local Notes\n\nkeep me\n"));
        assert!(api.mutations().is_empty());
    }

    #[test]
    fn generated_mirror_is_refreshed() {
        let dir = TempDir::new().unwrap();
        let first = write(dir.path(), "WOR-7 - Login.md", STORY.replace("My own wording.", "[To be populated from Jira]").as_str());
        let api = FakeJira::new();
        api.put_issue("WOR-7", remote_story());
        pull(&api, SyncOptions::default(), &[first.clone()]);
        let text = std::fs::read_to_string(&first).unwrap();
        assert!(!text.contains("[To be populated from Jira]"));
        assert!(text.contains("## Acceptance Criteria (customfield_10256)\n\nRemote AC\n"));

        // A later remote edit rewrites the mirror it generated.
        let mut next = remote_story();
        next["customfield_10256"]["content"][0]["content"][0]["text"] = json!("Remote AC v2");
        api.put_issue("WOR-7", next);
        pull(&api, SyncOptions::default(), &[first.clone()]);
        let text = std::fs::read_to_string(&first).unwrap();
        assert!(text.contains("## Acceptance Criteria (customfield_10256)\n\nRemote AC v2\n"));
    }

    #[test]
    fn mirror_headings_stay_inside_their_section() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "WOR-10 - Billing.md",
            "---\njira_key: \"WOR-10\"\nissue_type: \"Epic\"\n---\n## Summary\n\nBilling\n\n## Description\n\n[To be populated from Jira]\n\n## Local Notes\n\nmine\n",
        );
        let epic = |text: &str| {
            json!({
                "issuetype": { "name": "Epic" },
                "summary": "Billing",
                "description": {
                    "type": "doc", "version": 1,
                    "content": [
                        { "type": "heading", "attrs": { "level": 2 }, "content": [{ "type": "text", "text": "Goals" }] },
                        { "type": "paragraph", "content": [{ "type": "text", "text": text }] }
                    ]
                }
            })
        };
        let api = FakeJira::new();
        api.put_issue("WOR-10", epic("Ship v1"));
        pull(&api, SyncOptions::default(), &[path.clone()]);
        api.put_issue("WOR-10", epic("Ship v2"));
        pull(&api, SyncOptions::default(), &[path.clone()]);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("## Description\n\n#### Goals\n\nShip v2\n"));
        assert!(!text.contains("Ship v1"));
        assert!(!text.contains("\n## Goals"));
        assert!(text.ends_with("## Local Notes\n\nmine\n"));

        let report = pull(&api, SyncOptions::default(), &[path]);
        assert_eq!(report.files[0].change_count(), 0);
    }

    #[test]
    fn prose_cleared_in_jira_is_cleared_locally() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "WOR-10 - Billing.md",
            "---\njira_key: \"WOR-10\"\nissue_type: \"Epic\"\n---\n## Summary\n\nBilling\n\n## Problem Statement\n\nSlow invoices\n",
        );
        let api = FakeJira::new();
        api.put_issue(
            "WOR-10",
            json!({ "issuetype": { "name": "Epic" }, "summary": "Billing" }),
        );
        let report = pull(&api, SyncOptions::default(), &[path.clone()]);
        let changes = &report.files[0].issues[0].changes;
        assert!(changes.iter().any(|c| c.field == "Problem Statement"));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("## Problem Statement\n\n[To be populated from Jira]\n"));
        let again = pull(&api, SyncOptions::default(), &[path]);
        assert_eq!(again.files[0].change_count(), 0);
    }

    #[test]
    fn second_pull_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "WOR-7 - Login.md", STORY);
        let api = FakeJira::new();
        api.put_issue("WOR-7", remote_story());
        pull(&api, SyncOptions::default(), &[path.clone()]);
        let before = std::fs::read_to_string(&path).unwrap();

        let report = pull(&api, SyncOptions::default(), &[path.clone()]);
        assert_eq!(report.files[0].change_count(), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn dry_run_reports_without_writing() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "WOR-7 - Login.md", STORY);
        let api = FakeJira::new();
        api.put_issue("WOR-7", remote_story());
        let opts = SyncOptions {
            dry_run: true,
            ..SyncOptions::default()
        };
        let report = pull(&api, opts, &[path.clone()]);
        let changes = &report.files[0].issues[0].changes;
        assert!(changes.iter().any(|c| c.field == "status" && c.to == "In Progress"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), STORY);
    }

    #[test]
    fn drafts_are_refused() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "DRAFT - Epic - New.md",
            "---\njira_key: \"\"\nissue_type: \"Epic\"\n---\n",
        );
        let api = FakeJira::new();
        let report = pull(&api, SyncOptions::default(), &[path]);
        assert_eq!(report.files[0].outcome, Outcome::Failed);
        assert_eq!(report.files[0].category, Some(ErrorCategory::Validation));
        assert!(api.calls().is_empty());
    }

    #[test]
    fn missing_issue_is_a_remote_failure() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "WOR-7 - Login.md", STORY);
        let api = FakeJira::new();
        let report = pull(&api, SyncOptions::default(), &[path]);
        assert_eq!(report.files[0].category, Some(ErrorCategory::Remote));
        assert!(report.files[0].error.as_deref().unwrap().contains("WOR-7"));
    }

    #[test]
    fn combo_pulls_both_halves() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "WOR-7 - Login.md",
            "---\nuser_story:\n  jira_key: \"WOR-7\"\n  status: \"\"\nsubtask:\n  jira_key: \"WOR-8\"\n  status: \"\"\n---\n# User Story\n\n## Summary\n\nLogin form\n\n# Subtask\n\n## Summary\n\nBuild it\n",
        );
        let api = FakeJira::new();
        api.put_issue("WOR-7", remote_story());
        api.put_issue(
            "WOR-8",
            json!({
                "issuetype": { "name": "Sub-task" },
                "summary": "Build it",
                "status": { "name": "Done" },
                "parent": { "key": "WOR-7" }
            }),
        );
        let report = pull(&api, SyncOptions::default(), &[path.clone()]);
        assert_eq!(report.files[0].issues.len(), 2);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("user_story:\n  jira_key: \"WOR-7\"\n  status: \"In Progress\"\n"));
        assert!(text.contains("subtask:\n  jira_key: \"WOR-8\"\n  status: \"Done\"\n"));
        assert!(text.contains("# Subtask\n\n## Summary\n\nBuild it\n"));
    }
}
