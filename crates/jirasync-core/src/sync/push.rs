use super::{check_remote_type, Engine, FieldChange, FileReport, IssueReport, Outcome, Users};
use crate::client::{Issue, Transition};
use crate::error::{Result, SyncError};
use crate::field::{self, Encoded, FieldValue};
use crate::record::{RecordFile, Slot};
use crate::schema::{FieldKind, IssueSchema, PARENT_KEY, STATUS};
use serde_json::{Map, Value};

/// Rejection messages Jira gives for sprint and parent values it will not move.
const SOFT_REJECTIONS: &[&str] = &["active or future sprints", "parent"];

pub(super) fn push_record(
    eng: &Engine<'_>,
    record: RecordFile,
    report: &mut FileReport,
) -> Result<Outcome> {
    if record.is_draft()? {
        return Err(SyncError::IsDraft);
    }

    let users = Users::new(eng.api);
    let story_key = record.story_slot().and_then(|s| record.key(s));
    // Each half is pushed even when the other fails; the first error fails the file.
    let mut failed: Option<SyncError> = None;
    for slot in record.slots()? {
        let Some(key) = record.key(slot) else {
            report.warn(format!("{} has no Jira key yet; not pushed", slot.label()));
            continue;
        };
        if let Err(e) = push_issue(eng, &record, slot, &key, story_key.as_deref(), &users, report) {
            tracing::warn!(key = %key, error = %e, "push failed");
            if failed.is_some() {
                report.warn(format!("{}: {e}", slot.label()));
            } else {
                failed = Some(e);
            }
        }
    }
    match failed {
        Some(e) => Err(e),
        None => Ok(Outcome::Succeeded),
    }
}

fn push_issue(
    eng: &Engine<'_>,
    record: &RecordFile,
    slot: Slot,
    key: &str,
    story_key: Option<&str>,
    users: &Users<'_>,
    report: &mut FileReport,
) -> Result<()> {
    let schema = IssueSchema::for_type(slot.issue_type, eng.cfg);
    let issue = eng.api.get_issue(key, &schema.fetch_fields())?;
    check_remote_type(&issue, slot.issue_type)?;

    let mut ir = IssueReport::new(slot, Some(key.to_string()));
    let mut payload = Map::new();
    for spec in schema
        .fields
        .iter()
        .filter(|s| s.push && s.kind != FieldKind::Status)
    {
        let mut local = field::local_value(record, slot, spec)?;
        if local.is_empty() && spec.name == PARENT_KEY && slot.is_subtask_half() {
            if let Some(story) = story_key {
                local = FieldValue::Text(story.to_string());
            }
        }
        if local.is_empty() || field::matches_remote(spec, &local, &issue.fields) {
            continue;
        }
        match field::encode(spec, &local, users)? {
            Encoded::Value(v) => {
                let remote = field::remote_value(&issue.fields, spec);
                ir.changes.push(FieldChange::new(spec.name, &remote, &local));
                payload.insert(spec.jira_id.clone(), v);
            }
            Encoded::Skip(reason) => report.warn(format!("{key}: {reason}")),
        }
    }

    if !payload.is_empty() && !eng.opts.dry_run {
        update_with_retry(eng, key, payload, &schema, &mut ir, report)?;
    }

    let status = if eng.opts.no_transition {
        Ok(())
    } else {
        transition(eng, record, slot, &issue, &mut ir)
    };
    report.issues.push(ir);
    status
}

/// Send the update; on a rejection naming only soft fields, retry once without them.
fn update_with_retry(
    eng: &Engine<'_>,
    key: &str,
    mut payload: Map<String, Value>,
    schema: &IssueSchema,
    ir: &mut IssueReport,
    report: &mut FileReport,
) -> Result<()> {
    let err = match eng.api.update_issue(key, &payload) {
        Ok(()) => return Ok(()),
        Err(e @ SyncError::InvalidField { .. }) => e,
        Err(e) => return Err(e),
    };

    let soft = schema.soft_fields();
    let rejected = err.rejected_fields();
    let droppable: Vec<String> = if !rejected.is_empty() {
        if !rejected.iter().all(|f| soft.contains(f)) {
            return Err(err);
        }
        rejected.iter().map(|f| f.to_string()).collect()
    } else if SOFT_REJECTIONS.iter().any(|m| err.rejection_mentions(m)) {
        soft.iter().map(|f| f.to_string()).collect()
    } else {
        return Err(err);
    };

    let dropped: Vec<String> = droppable
        .into_iter()
        .filter(|f| payload.remove(f).is_some())
        .collect();
    if dropped.is_empty() {
        return Err(err);
    }
    report.warn(format!("{key}: Jira rejected {}; retried without them ({err})", dropped.join(", ")));
    let names: Vec<&str> = schema
        .fields
        .iter()
        .filter(|s| dropped.contains(&s.jira_id))
        .map(|s| s.name)
        .collect();
    ir.changes.retain(|c| !names.contains(&c.field.as_str()));

    if payload.is_empty() {
        return Ok(());
    }
    eng.api.update_issue(key, &payload)
}

/// Move the issue to the record's status when it differs from Jira's.
fn transition(
    eng: &Engine<'_>,
    record: &RecordFile,
    slot: Slot,
    issue: &Issue,
    ir: &mut IssueReport,
) -> Result<()> {
    let Some(target) = record.get(slot, STATUS) else {
        return Ok(());
    };
    let current = issue.status().unwrap_or_default().to_string();
    if current.eq_ignore_ascii_case(&target) {
        return Ok(());
    }

    let available = eng.api.get_transitions(&issue.key)?;
    let Some(chosen) = pick_transition(&available, &target) else {
        return Err(SyncError::NoTransition {
            key: issue.key.clone(),
            current,
            target,
            available: available
                .iter()
                .map(|t| match &t.to {
                    Some(to) => to.name.clone(),
                    None => t.name.clone(),
                })
                .collect(),
        });
    };

    ir.transition = Some(format!("{current} -> {target}"));
    if !eng.opts.dry_run {
        eng.api.transition_issue(&issue.key, &chosen.id)?;
    }
    Ok(())
}

/// Match on the destination status first, then on the transition's own name.
fn pick_transition<'t>(available: &'t [Transition], target: &str) -> Option<&'t Transition> {
    available
        .iter()
        .find(|t| {
            t.to
                .as_ref()
                .is_some_and(|to| to.name.eq_ignore_ascii_case(target))
        })
        .or_else(|| available.iter().find(|t| t.name.eq_ignore_ascii_case(target)))
}
