//! Atlassian Document Format helpers.
//!
//! Jira returns rich-text fields as ADF trees. Records keep the tree verbatim
//! next to a Markdown rendering for humans.

use serde_json::{json, Value};

/// Rewrite a document into a shape Jira accepts on write.
///
/// Text nodes carrying both `code` and `strong` marks are rejected by the
/// update endpoint even though Jira itself produces them; such nodes keep only
/// the `code` mark.
pub fn normalize_for_write(doc: &Value) -> Value {
    let mut out = doc.clone();
    normalize_node(&mut out);
    out
}

fn normalize_node(node: &mut Value) {
    match node {
        Value::Object(obj) => {
            if let Some(Value::Array(marks)) = obj.get_mut("marks") {
                let has = |t: &str, marks: &[Value]| {
                    marks
                        .iter()
                        .any(|m| m.get("type").and_then(Value::as_str) == Some(t))
                };
                if has("code", marks) && has("strong", marks) {
                    marks.retain(|m| m.get("type").and_then(Value::as_str) == Some("code"));
                }
            }
            for (_, child) in obj.iter_mut() {
                if child.is_object() || child.is_array() {
                    normalize_node(child);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                normalize_node(item);
            }
        }
        _ => {}
    }
}

/// Basic structural check: an object with `"type": "doc"`.
pub fn is_doc(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some("doc")
}

/// True for a doc with no text at all.
pub fn is_empty_doc(value: &Value) -> bool {
    plain_text(value).trim().is_empty()
}

/// Wrap plain paragraphs into a document.
pub fn from_plain_text(text: &str) -> Value {
    let content: Vec<Value> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            let mut inline = Vec::new();
            for (i, line) in p.lines().enumerate() {
                if i > 0 {
                    inline.push(json!({ "type": "hardBreak" }));
                }
                inline.push(json!({ "type": "text", "text": line }));
            }
            json!({ "type": "paragraph", "content": inline })
        })
        .collect();
    json!({ "type": "doc", "version": 1, "content": content })
}

// ---------------------------------------------------------------------------
// Plain text
// ---------------------------------------------------------------------------

/// Flatten a document to text, one line per block.
pub fn plain_text(value: &Value) -> String {
    let mut out = String::new();
    collect_text(value, &mut out);
    out.trim().to_string()
}

fn collect_text(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => out.push_str(s),
        Value::Array(items) => items.iter().for_each(|v| collect_text(v, out)),
        Value::Object(obj) => {
            let kind = obj.get("type").and_then(Value::as_str).unwrap_or_default();
            match kind {
                "text" => {
                    if let Some(t) = obj.get("text").and_then(Value::as_str) {
                        out.push_str(t);
                    }
                }
                "hardBreak" => out.push('\n'),
                "mention" | "emoji" | "status" => {
                    if let Some(t) = obj
                        .get("attrs")
                        .and_then(|a| a.get("text"))
                        .and_then(Value::as_str)
                    {
                        out.push_str(t);
                    }
                }
                _ => {
                    if let Some(content) = obj.get("content") {
                        collect_text(content, out);
                    }
                    if is_block(kind) && !out.ends_with('\n') {
                        out.push('\n');
                    }
                }
            }
        }
        _ => {}
    }
}

fn is_block(kind: &str) -> bool {
    matches!(
        kind,
        "paragraph" | "heading" | "codeBlock" | "listItem" | "blockquote" | "tableRow" | "panel"
    )
}

// ---------------------------------------------------------------------------
// Markdown rendering
// ---------------------------------------------------------------------------

/// Render a document as Markdown for the human-readable mirror.
pub fn to_markdown(doc: &Value) -> String {
    let blocks = children(doc);
    render_blocks(blocks, 0).trim_end().to_string()
}

fn children(node: &Value) -> &[Value] {
    node.get("content")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn node_type(node: &Value) -> &str {
    node.get("type").and_then(Value::as_str).unwrap_or_default()
}

fn attr<'a>(node: &'a Value, name: &str) -> Option<&'a Value> {
    node.get("attrs").and_then(|a| a.get(name))
}

fn render_blocks(blocks: &[Value], indent: usize) -> String {
    let rendered: Vec<String> = blocks
        .iter()
        .map(|b| render_block(b, indent))
        .filter(|s| !s.is_empty())
        .collect();
    rendered.join("\n\n")
}

fn render_block(node: &Value, indent: usize) -> String {
    match node_type(node) {
        "paragraph" => render_inline(children(node)),
        "heading" => {
            // Mirrors live under a `##` field heading; keep theirs below it.
            let level = attr(node, "level").and_then(Value::as_u64).unwrap_or(1).clamp(1, 6);
            format!(
                "{} {}",
                "#".repeat((level as usize + 2).min(6)),
                render_inline(children(node))
            )
        }
        "bulletList" => render_list(node, indent, None),
        "orderedList" => {
            let start = attr(node, "order").and_then(Value::as_u64).unwrap_or(1);
            render_list(node, indent, Some(start))
        }
        "codeBlock" => {
            let lang = attr(node, "language")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let text: String = children(node)
                .iter()
                .filter_map(|t| t.get("text").and_then(Value::as_str))
                .collect();
            format!("```{lang}\n{text}\n```")
        }
        "blockquote" | "panel" => render_blocks(children(node), 0)
            .lines()
            .map(|l| {
                if l.is_empty() {
                    ">".to_string()
                } else {
                    format!("> {l}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n"),
        "rule" => "---".to_string(),
        "table" => render_table(node),
        "mediaSingle" | "mediaGroup" | "media" => "[attachment]".to_string(),
        _ => {
            let inner = children(node);
            if inner.iter().any(|c| node_type(c) == "text") {
                render_inline(inner)
            } else {
                render_blocks(inner, indent)
            }
        }
    }
}

fn render_list(node: &Value, indent: usize, start: Option<u64>) -> String {
    let pad = " ".repeat(indent);
    let mut lines = Vec::new();
    for (i, item) in children(node).iter().enumerate() {
        let marker = match start {
            Some(n) => format!("{}. ", n + i as u64),
            None => "- ".to_string(),
        };
        let mut first = true;
        for block in children(item) {
            let t = node_type(block);
            if t == "bulletList" || t == "orderedList" {
                lines.push(render_block(block, indent + marker.len()));
                continue;
            }
            let text = render_block(block, indent + marker.len());
            for (j, line) in text.lines().enumerate() {
                if first && j == 0 {
                    lines.push(format!("{pad}{marker}{line}"));
                } else {
                    lines.push(format!("{pad}{}{line}", " ".repeat(marker.len())));
                }
            }
            first = false;
        }
        if first {
            lines.push(format!("{pad}{}", marker.trim_end()));
        }
    }
    lines.join("\n")
}

fn render_table(node: &Value) -> String {
    let rows: Vec<Vec<String>> = children(node)
        .iter()
        .map(|row| {
            children(row)
                .iter()
                .map(|cell| {
                    render_blocks(children(cell), 0)
                        .replace('\n', " ")
                        .replace('|', "\\|")
                })
                .collect()
        })
        .collect();
    let Some(header) = rows.first() else {
        return String::new();
    };
    let mut out = vec![
        format!("| {} |", header.join(" | ")),
        format!("|{}|", vec![" --- "; header.len()].join("|")),
    ];
    for row in rows.iter().skip(1) {
        out.push(format!("| {} |", row.join(" | ")));
    }
    out.join("\n")
}

fn render_inline(nodes: &[Value]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node_type(node) {
            "text" => {
                let text = node.get("text").and_then(Value::as_str).unwrap_or_default();
                out.push_str(&apply_marks(text, node.get("marks")));
            }
            "hardBreak" => out.push('\n'),
            "mention" => {
                let label = attr(node, "text")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| {
                        attr(node, "id")
                            .and_then(Value::as_str)
                            .map(|id| format!("@{id}"))
                    })
                    .unwrap_or_default();
                out.push_str(&label);
            }
            "emoji" => {
                let e = attr(node, "text")
                    .or_else(|| attr(node, "shortName"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                out.push_str(e);
            }
            "inlineCard" => {
                if let Some(url) = attr(node, "url").and_then(Value::as_str) {
                    out.push_str(&format!("<{url}>"));
                }
            }
            "status" => {
                if let Some(t) = attr(node, "text").and_then(Value::as_str) {
                    out.push_str(&format!("[{t}]"));
                }
            }
            "date" => {
                if let Some(ts) = attr(node, "timestamp").and_then(Value::as_str) {
                    out.push_str(ts);
                }
            }
            _ => out.push_str(&render_inline(children(node))),
        }
    }
    out
}

fn apply_marks(text: &str, marks: Option<&Value>) -> String {
    let Some(marks) = marks.and_then(Value::as_array) else {
        return text.to_string();
    };
    let has = |t: &str| marks.iter().any(|m| node_type(m) == t);
    let mut s = text.to_string();
    if has("code") {
        s = format!("`{s}`");
    }
    if has("em") {
        s = format!("*{s}*");
    }
    if has("strong") {
        s = format!("**{s}**");
    }
    if has("strike") {
        s = format!("~~{s}~~");
    }
    if let Some(link) = marks.iter().find(|m| node_type(m) == "link") {
        if let Some(href) = attr(link, "href").and_then(Value::as_str) {
            s = format!("[{s}]({href})");
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: Value) -> Value {
        json!({ "type": "doc", "version": 1, "content": content })
    }

    #[test]
    fn normalize_drops_strong_next_to_code() {
        let input = doc(json!([{
            "type": "paragraph",
            "content": [
                { "type": "text", "text": "run", "marks": [{ "type": "code" }, { "type": "strong" }] },
                { "type": "text", "text": " now", "marks": [{ "type": "strong" }] }
            ]
        }]));
        let out = normalize_for_write(&input);
        let content = &out["content"][0]["content"];
        assert_eq!(content[0]["marks"], json!([{ "type": "code" }]));
        assert_eq!(content[1]["marks"], json!([{ "type": "strong" }]));
        // Input untouched.
        assert_eq!(input["content"][0]["content"][0]["marks"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn normalize_recurses_into_lists() {
        let input = doc(json!([{
            "type": "bulletList",
            "content": [{ "type": "listItem", "content": [{
                "type": "paragraph",
                "content": [{ "type": "text", "text": "x", "marks": [{ "type": "strong" }, { "type": "code" }] }]
            }]}]
        }]));
        let out = normalize_for_write(&input);
        assert_eq!(
            out["content"][0]["content"][0]["content"][0]["content"][0]["marks"],
            json!([{ "type": "code" }])
        );
    }

    #[test]
    fn markdown_rendering() {
        let input = doc(json!([
            { "type": "heading", "attrs": { "level": 3 }, "content": [{ "type": "text", "text": "Scope" }] },
            { "type": "paragraph", "content": [
                { "type": "text", "text": "Use " },
                { "type": "text", "text": "cargo", "marks": [{ "type": "code" }] },
                { "type": "text", "text": " and ", "marks": [] },
                { "type": "text", "text": "docs", "marks": [{ "type": "link", "attrs": { "href": "https://x.dev" } }] }
            ]},
            { "type": "bulletList", "content": [
                { "type": "listItem", "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": "one" }] }] },
                { "type": "listItem", "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": "two" }] }] }
            ]},
            { "type": "orderedList", "content": [
                { "type": "listItem", "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": "first" }] }] }
            ]},
            { "type": "codeBlock", "attrs": { "language": "rust" }, "content": [{ "type": "text", "text": "fn main() {}" }] }
        ]));
        let md = to_markdown(&input);
        assert_eq!(
            md,
            "##### Scope\n\nUse `cargo` and [docs](https://x.dev)\n\n- one\n- two\n\n1. first\n\n```rust\nfn main() {}\n```"
        );
    }

    #[test]
    fn top_level_headings_nest_under_the_field_section() {
        let input = doc(json!([
            { "type": "heading", "attrs": { "level": 1 }, "content": [{ "type": "text", "text": "Goals" }] },
            { "type": "heading", "attrs": { "level": 2 }, "content": [{ "type": "text", "text": "Scope" }] },
            { "type": "heading", "attrs": { "level": 6 }, "content": [{ "type": "text", "text": "Deep" }] }
        ]));
        assert_eq!(to_markdown(&input), "### Goals\n\n#### Scope\n\n###### Deep");
    }

    #[test]
    fn nested_list_indents() {
        let input = doc(json!([{ "type": "bulletList", "content": [{
            "type": "listItem",
            "content": [
                { "type": "paragraph", "content": [{ "type": "text", "text": "parent" }] },
                { "type": "bulletList", "content": [{ "type": "listItem", "content": [
                    { "type": "paragraph", "content": [{ "type": "text", "text": "child" }] }
                ]}]}
            ]
        }]}]));
        assert_eq!(to_markdown(&input), "- parent\n  - child");
    }

    #[test]
    fn table_rendering() {
        let cell = |t: &str| json!({ "type": "tableCell", "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": t }] }] });
        let input = doc(json!([{ "type": "table", "content": [
            { "type": "tableRow", "content": [cell("a"), cell("b")] },
            { "type": "tableRow", "content": [cell("1"), cell("2")] }
        ]}]));
        assert_eq!(to_markdown(&input), "| a | b |\n| --- | --- |\n| 1 | 2 |");
    }

    #[test]
    fn plain_text_and_roundtrip_from_text() {
        let d = from_plain_text("Line one\nLine two\n\nSecond para");
        assert!(is_doc(&d));
        assert_eq!(plain_text(&d), "Line one\nLine two\nSecond para");
        assert!(is_empty_doc(&doc(json!([]))));
        assert!(!is_empty_doc(&d));
    }
}
