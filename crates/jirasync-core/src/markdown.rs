//! Record body editing: `##` sections and fenced ADF blocks.
//!
//! All functions work on one body region (a whole flat record, or the story
//! or subtask half of a combined record) and only touch the bytes they own.

use crate::error::{Result, SyncError};
use serde_json::Value;

/// Sections that stay at the end of a region and are never written by sync.
pub const RESERVED_SECTIONS: &[&str] = &["Local Notes", "References"];

pub const PLACEHOLDER: &str = "[To be populated from Jira]";

struct Line<'a> {
    start: usize,
    end: usize,
    text: &'a str,
    fenced: bool,
}

fn lines(text: &str) -> Vec<Line<'_>> {
    let mut out = Vec::new();
    let mut pos = 0;
    let mut in_fence = false;
    for raw in text.split_inclusive('\n') {
        let body = raw.trim_end_matches(['\n', '\r']);
        let is_fence = body.trim_start().starts_with("```");
        out.push(Line {
            start: pos,
            end: pos + raw.len(),
            text: body,
            fenced: in_fence || is_fence,
        });
        if is_fence {
            in_fence = !in_fence;
        }
        pos += raw.len();
    }
    out
}

fn h2_title<'a>(line: &Line<'a>) -> Option<&'a str> {
    if line.fenced {
        return None;
    }
    line.text.strip_prefix("## ").map(str::trim)
}

fn is_heading_break(line: &Line<'_>) -> bool {
    !line.fenced && (line.text.starts_with("## ") || line.text.starts_with("# "))
}

/// `Acceptance Criteria` matches `## Acceptance Criteria (customfield_10256)`.
fn heading_matches(heading: &str, title: &str) -> bool {
    if heading.eq_ignore_ascii_case(title) {
        return true;
    }
    match heading.rfind(" (") {
        Some(i) if heading.ends_with(')') => heading[..i].trim().eq_ignore_ascii_case(title),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpan {
    /// Start of the `## ` line.
    pub heading: usize,
    /// First byte after the heading line.
    pub body: usize,
    /// Start of the next heading, or end of text.
    pub end: usize,
}

pub fn find_section(text: &str, title: &str) -> Option<SectionSpan> {
    let ls = lines(text);
    let idx = ls
        .iter()
        .position(|l| h2_title(l).is_some_and(|h| heading_matches(h, title)))?;
    let end = ls[idx + 1..]
        .iter()
        .find(|l| is_heading_break(l))
        .map(|l| l.start)
        .unwrap_or(text.len());
    Some(SectionSpan {
        heading: ls[idx].start,
        body: ls[idx].end,
        end,
    })
}

/// Byte range of a section's prose: everything before its first ADF block.
fn prose_range(text: &str, span: SectionSpan) -> (usize, usize) {
    let inner = &text[span.body..span.end];
    let cut = lines(inner)
        .iter()
        .find(|l| !l.fenced && (l.text.trim() == "<details>" || l.text.contains("ADF Version (")))
        .map(|l| span.body + l.start)
        .unwrap_or(span.end);
    (span.body, cut)
}

/// Human text of a section, without any ADF block.
pub fn section_prose(text: &str, title: &str) -> Option<String> {
    let span = find_section(text, title)?;
    let (a, b) = prose_range(text, span);
    Some(text[a..b].trim().to_string())
}

/// Replace a section's prose, creating the section when missing.
///
/// A missing section is placed at the top of the region when `at_top` is set,
/// otherwise before the reserved trailing sections.
pub fn set_section_prose(text: &mut String, title: &str, heading: &str, prose: &str, at_top: bool) {
    match find_section(text, title) {
        Some(span) => {
            let (a, b) = prose_range(text, span);
            let tail_gap = if b == text.len() { "" } else { "\n" };
            let replacement = format!("\n{}\n{tail_gap}", prose.trim());
            text.replace_range(a..b, &replacement);
        }
        None => {
            let section = format!("## {heading}\n\n{}\n", prose.trim());
            if at_top {
                insert_at_top(text, &section);
            } else {
                insert_before_reserved(text, &section);
            }
        }
    }
}

fn insert_at_top(text: &mut String, section: &str) {
    // Keep a region's own `# ` heading and any leading prose above the first `##`.
    let ls = lines(text);
    let at = ls
        .iter()
        .find(|l| h2_title(l).is_some())
        .map(|l| l.start)
        .unwrap_or(text.len());
    let mut block = String::new();
    if at > 0 && !text[..at].ends_with("\n\n") {
        block.push('\n');
    }
    block.push_str(section);
    block.push('\n');
    text.insert_str(at, &block);
}

fn insert_before_reserved(text: &mut String, section: &str) {
    let ls = lines(text);
    let at = ls
        .iter()
        .find(|l| {
            h2_title(l).is_some_and(|h| RESERVED_SECTIONS.iter().any(|r| heading_matches(h, r)))
        })
        .map(|l| l.start);
    match at {
        Some(at) => {
            let mut block = String::new();
            if at > 0 && !text[..at].ends_with("\n\n") {
                block.push('\n');
            }
            block.push_str(section);
            block.push('\n');
            text.insert_str(at, &block);
        }
        None => {
            let trimmed = text.trim_end_matches(['\n', ' ']).len();
            text.truncate(trimmed);
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(section);
        }
    }
}

// ---------------------------------------------------------------------------
// ADF blocks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdfSpan {
    /// Start of the `<details>` line (or the summary line when inline).
    pub start: usize,
    /// End of the `</details>` line.
    pub end: usize,
    json_start: usize,
    json_end: usize,
}

fn marker(field_id: &str) -> String {
    format!("ADF Version ({field_id})")
}

pub fn find_adf_block(text: &str, field_id: &str) -> Result<Option<AdfSpan>> {
    let ls = lines(text);
    let needle = marker(field_id);
    let Some(idx) = ls.iter().position(|l| !l.fenced && l.text.contains(&needle)) else {
        return Ok(None);
    };
    let invalid = |reason: &str| SyncError::InvalidAdf {
        field: field_id.to_string(),
        reason: reason.to_string(),
    };

    let mut start = ls[idx].start;
    if let Some(prev) = ls[..idx].iter().rev().find(|l| !l.text.trim().is_empty()) {
        if prev.text.trim() == "<details>" {
            start = prev.start;
        }
    }

    let open = ls[idx + 1..]
        .iter()
        .position(|l| l.text.trim_start().starts_with("```"))
        .map(|p| idx + 1 + p)
        .ok_or_else(|| invalid("missing ```json fence"))?;
    let close = ls[open + 1..]
        .iter()
        .position(|l| l.text.trim() == "```")
        .map(|p| open + 1 + p)
        .ok_or_else(|| invalid("unterminated ```json fence"))?;

    let mut end = ls[close].end;
    if let Some(after) = ls[close + 1..].iter().find(|l| !l.text.trim().is_empty()) {
        if after.text.trim() == "</details>" {
            end = after.end;
        }
    }

    Ok(Some(AdfSpan {
        start,
        end,
        json_start: ls[open].end,
        json_end: ls[close].start,
    }))
}

/// Parse the ADF block for `field_id`. An empty block reads as `None`.
pub fn read_adf(text: &str, field_id: &str) -> Result<Option<Value>> {
    let Some(span) = find_adf_block(text, field_id)? else {
        return Ok(None);
    };
    let raw = text[span.json_start..span.json_end].trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(raw).map_err(|e| SyncError::InvalidAdf {
        field: field_id.to_string(),
        reason: e.to_string(),
    })?;
    if value.is_null() {
        return Ok(None);
    }
    if !crate::adf::is_doc(&value) {
        return Err(SyncError::InvalidAdf {
            field: field_id.to_string(),
            reason: "expected an object with \"type\": \"doc\"".into(),
        });
    }
    Ok(Some(value))
}

pub fn render_adf_block(field_id: &str, doc: &Value) -> String {
    let pretty = serde_json::to_string_pretty(doc).unwrap_or_else(|_| doc.to_string());
    format!(
        "<details>\n<summary>{}</summary>\n\n```json\n{pretty}\n```\n</details>\n",
        marker(field_id)
    )
}

/// Write `doc` into the ADF block for `field_id`.
///
/// An existing block is replaced in place. Otherwise the block is appended to
/// the section titled `title`, or a new section with `heading` and `prose` is
/// added before the reserved trailing sections.
pub fn write_adf(
    text: &mut String,
    title: &str,
    heading: &str,
    field_id: &str,
    doc: &Value,
    prose: &str,
) -> Result<()> {
    let block = render_adf_block(field_id, doc);
    if let Some(span) = find_adf_block(text, field_id)? {
        text.replace_range(span.start..span.end, &block);
        return Ok(());
    }
    match find_section(text, title) {
        Some(span) => {
            let mut content_end = span.end;
            while content_end > span.body && text.as_bytes()[content_end - 1].is_ascii_whitespace() {
                content_end -= 1;
            }
            let tail = if span.end == text.len() { "" } else { "\n" };
            let insert = format!("\n\n{block}{tail}");
            text.replace_range(content_end..span.end, &insert);
        }
        None => {
            let section = format!("## {heading}\n\n{}\n\n{block}", prose.trim());
            insert_before_reserved(text, &section);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Regions
// ---------------------------------------------------------------------------

pub const STORY_HEADING: &str = "User Story";
pub const SUBTASK_HEADING: &str = "Subtask";

/// Split a combined record body at its `# Subtask` heading.
///
/// Returns `(story part, subtask part)`; the story part keeps any preamble.
pub fn split_regions(body: &str) -> (String, String) {
    let ls = lines(body);
    let at = ls
        .iter()
        .find(|l| {
            !l.fenced
                && l.text
                    .strip_prefix("# ")
                    .is_some_and(|h| h.trim().eq_ignore_ascii_case(SUBTASK_HEADING))
        })
        .map(|l| l.start);
    match at {
        Some(at) => (body[..at].to_string(), body[at..].to_string()),
        None => (body.to_string(), String::new()),
    }
}
