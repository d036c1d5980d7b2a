//! YAML front matter that survives edits.
//!
//! Reads go through `serde_yaml`. Writes patch individual `key: value` lines so
//! comments, ordering and untouched keys stay exactly as the author left them.

use crate::error::{Result, SyncError};
use serde_yaml::{Mapping, Value};

/// Byte-level details of a record file that parsing normalizes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub bom: bool,
    pub crlf: bool,
    /// `---` or `...`.
    pub closing: &'static str,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            bom: false,
            crlf: false,
            closing: "---",
        }
    }
}

impl Envelope {
    /// Put normalized (`\n`, no BOM) text back into the file's own form.
    pub fn wrap(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + 8);
        if self.bom {
            out.push('\u{feff}');
        }
        if self.crlf {
            out.push_str(&text.replace('\n', "\r\n"));
        } else {
            out.push_str(text);
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct Split {
    pub yaml: String,
    pub body: String,
    pub envelope: Envelope,
}

/// Split a record into its front matter text and body.
///
/// A BOM is dropped and CRLF endings become `\n`; both are recorded in the
/// returned [`Envelope`] along with the closing delimiter.
pub fn split(content: &str) -> Result<Split> {
    let (bom, content) = match content.strip_prefix('\u{feff}') {
        Some(rest) => (true, rest),
        None => (false, content),
    };
    let crlf = content.contains("\r\n");
    let normalized;
    let content = if crlf {
        normalized = content.replace("\r\n", "\n");
        normalized.as_str()
    } else {
        content
    };

    let mut lines = content.split_inclusive('\n');
    let first = lines.next().unwrap_or_default();
    if first.trim_end() != "---" {
        return Err(SyncError::MalformedFrontMatter(
            "file must start with a '---' line".into(),
        ));
    }
    let mut yaml = String::new();
    let mut consumed = first.len();
    for line in lines {
        consumed += line.len();
        let closing = match line.trim_end() {
            "---" => "---",
            "..." => "...",
            _ => {
                yaml.push_str(line);
                continue;
            }
        };
        return Ok(Split {
            yaml,
            body: content[consumed..].to_string(),
            envelope: Envelope { bom, crlf, closing },
        });
    }
    Err(SyncError::MalformedFrontMatter(
        "no closing '---' after front matter".into(),
    ))
}

/// A value written into front matter.
#[derive(Debug, Clone, PartialEq)]
pub enum FmValue {
    Str(String),
    List(Vec<String>),
}

impl FmValue {
    fn render(&self) -> String {
        match self {
            FmValue::Str(s) => quote(s),
            FmValue::List(items) => {
                let inner: Vec<String> = items.iter().map(|s| quote(s)).collect();
                format!("[{}]", inner.join(", "))
            }
        }
    }
}

fn quote(s: &str) -> String {
    // A JSON string is a valid YAML double-quoted scalar.
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s.replace('"', "'")))
}

#[derive(Debug, Clone)]
pub struct FrontMatter {
    lines: Vec<String>,
    map: Mapping,
}

impl FrontMatter {
    pub fn parse(text: &str) -> Result<Self> {
        let map = parse_mapping(text)?;
        Ok(Self {
            lines: text.lines().map(str::to_string).collect(),
            map,
        })
    }

    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    fn scope(&self, section: Option<&str>) -> Option<&Mapping> {
        match section {
            None => Some(&self.map),
            Some(name) => self.map.get(name).and_then(Value::as_mapping),
        }
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.scope(Some(section)).is_some()
    }

    /// Scalar value as a trimmed string; missing and null read as `None`.
    pub fn get(&self, section: Option<&str>, key: &str) -> Option<String> {
        let value = self.scope(section)?.get(key)?;
        scalar_string(value)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn get_list(&self, section: Option<&str>, key: &str) -> Vec<String> {
        let Some(value) = self.scope(section).and_then(|m| m.get(key)) else {
            return Vec::new();
        };
        match value {
            Value::Sequence(items) => items
                .iter()
                .filter_map(scalar_string)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            other => scalar_string(other)
                .map(|s| {
                    s.split(',')
                        .map(|p| p.trim().to_string())
                        .filter(|p| !p.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Set `key` (inside `section` when given), keeping surrounding lines intact.
    pub fn set(&mut self, section: Option<&str>, key: &str, value: &FmValue) -> Result<()> {
        let (start, end, child_indent) = match section {
            None => (0, self.lines.len(), String::new()),
            Some(name) => match self.section_range(name) {
                Some(range) => range,
                None => {
                    self.trim_trailing_blank();
                    self.lines.push(format!("{name}:"));
                    let n = self.lines.len();
                    (n, n, "  ".to_string())
                }
            },
        };

        let rendered = value.render();
        let mut i = start;
        while i < end {
            let line = &self.lines[i];
            if indent_of(line) == child_indent.len() {
                if let Some(rest) = key_rest(line.trim_start(), key) {
                    let comment = trailing_comment(rest);
                    let mut new_line = format!("{child_indent}{key}: {rendered}");
                    if let Some(c) = comment {
                        new_line.push(' ');
                        new_line.push_str(c);
                    }
                    let block_items = if strip_comment(rest).is_empty() {
                        self.block_items_after(i, end, child_indent.len())
                    } else {
                        0
                    };
                    self.lines[i] = new_line;
                    self.lines.drain(i + 1..i + 1 + block_items);
                    return self.reparse();
                }
            }
            i += 1;
        }

        // Insert after the last non-blank line of the scope.
        let mut at = end;
        while at > start && self.lines[at - 1].trim().is_empty() {
            at -= 1;
        }
        self.lines
            .insert(at, format!("{child_indent}{key}: {rendered}"));
        self.reparse()
    }

    /// `(first child line, end, child indent)` of a top-level mapping key.
    fn section_range(&self, name: &str) -> Option<(usize, usize, String)> {
        let header = self.lines.iter().position(|l| {
            indent_of(l) == 0 && key_rest(l, name).is_some_and(|r| strip_comment(r).is_empty())
        })?;
        let start = header + 1;
        let mut end = start;
        let mut indent: Option<usize> = None;
        while end < self.lines.len() {
            let line = &self.lines[end];
            let blank = line.trim().is_empty() || line.trim_start().starts_with('#');
            if !blank && indent_of(line) == 0 {
                break;
            }
            if !blank && indent.is_none() {
                indent = Some(indent_of(line));
            }
            end += 1;
        }
        Some((start, end, " ".repeat(indent.unwrap_or(2))))
    }

    /// Count block-sequence item lines (`- x`) that belong to the key at `line`.
    fn block_items_after(&self, line: usize, end: usize, key_indent: usize) -> usize {
        let mut n = 0;
        for l in &self.lines[line + 1..end] {
            let t = l.trim_start();
            let is_item = (t.starts_with("- ") || t == "-") && indent_of(l) >= key_indent;
            let nested = indent_of(l) > key_indent && !t.is_empty();
            if is_item || nested {
                n += 1;
            } else {
                break;
            }
        }
        n
    }

    fn trim_trailing_blank(&mut self) {
        while self.lines.last().is_some_and(|l| l.trim().is_empty()) {
            self.lines.pop();
        }
    }

    fn reparse(&mut self) -> Result<()> {
        self.map = parse_mapping(&self.lines.join("\n"))?;
        Ok(())
    }
}

fn parse_mapping(text: &str) -> Result<Mapping> {
    if text.trim().is_empty() {
        return Ok(Mapping::new());
    }
    let value: Value = serde_yaml::from_str(text)
        .map_err(|e| SyncError::MalformedFrontMatter(e.to_string()))?;
    match value {
        Value::Mapping(m) => Ok(m),
        Value::Null => Ok(Mapping::new()),
        _ => Err(SyncError::MalformedFrontMatter(
            "front matter must be a mapping".into(),
        )),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

/// Text after `key:` when `line` (already de-indented) declares `key`.
fn key_rest<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(key)?.trim_start_matches(' ');
    let rest = rest.strip_prefix(':')?;
    if rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t') {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// Byte index where the value ends, honoring quotes and flow sequences.
fn value_end(rest: &str) -> usize {
    let bytes = rest.as_bytes();
    match bytes.first() {
        Some(b'"') => {
            let mut i = 1;
            while i < bytes.len() {
                match bytes[i] {
                    b'\\' => i += 2,
                    b'"' => return i + 1,
                    _ => i += 1,
                }
            }
            bytes.len()
        }
        Some(b'\'') => {
            let mut i = 1;
            while i < bytes.len() {
                if bytes[i] == b'\'' {
                    if bytes.get(i + 1) == Some(&b'\'') {
                        i += 2;
                        continue;
                    }
                    return i + 1;
                }
                i += 1;
            }
            bytes.len()
        }
        Some(b'[') => {
            let mut depth = 0;
            let mut quote: Option<u8> = None;
            for (i, &b) in bytes.iter().enumerate() {
                match (quote, b) {
                    (Some(q), c) if c == q => quote = None,
                    (Some(_), _) => {}
                    (None, b'"') | (None, b'\'') => quote = Some(b),
                    (None, b'[') => depth += 1,
                    (None, b']') => {
                        depth -= 1;
                        if depth == 0 {
                            return i + 1;
                        }
                    }
                    _ => {}
                }
            }
            bytes.len()
        }
        _ => rest.find(" #").unwrap_or(rest.len()),
    }
}

fn trailing_comment(rest: &str) -> Option<&str> {
    let tail = rest[value_end(rest)..].trim();
    tail.starts_with('#').then_some(tail)
}

fn strip_comment(rest: &str) -> &str {
    if rest.starts_with('#') {
        return "";
    }
    rest[..value_end(rest)].trim()
}
