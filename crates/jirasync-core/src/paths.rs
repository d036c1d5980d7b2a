use crate::error::{Result, SyncError};
use crate::schema::IssueType;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

// ---------------------------------------------------------------------------
// File constants
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = "jirasync.yaml";
pub const ENV_FILE: &str = ".env";
pub const ENV_EXAMPLE_FILE: &str = ".env.example";
pub const DRAFT_PREFIX: &str = "DRAFT - ";

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

// ---------------------------------------------------------------------------
// Record file names
// ---------------------------------------------------------------------------

static DRAFT_RE: OnceLock<Regex> = OnceLock::new();
static KEYED_RE: OnceLock<Regex> = OnceLock::new();
static ISSUE_KEY_RE: OnceLock<Regex> = OnceLock::new();

fn draft_re() -> &'static Regex {
    DRAFT_RE.get_or_init(|| {
        Regex::new(r"^DRAFT\s*-\s*(?:(?i:epic|feature|story|subtask|sub-task)\s*-\s*)?(.+?)\.md$")
            .unwrap()
    })
}

fn keyed_re() -> &'static Regex {
    KEYED_RE.get_or_init(|| Regex::new(r"^([A-Z][A-Z0-9_]*-\d+)\s*-\s*(.+?)\.md$").unwrap())
}

fn issue_key_re() -> &'static Regex {
    ISSUE_KEY_RE.get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9_]*-\d+$").unwrap())
}

pub fn is_issue_key(s: &str) -> bool {
    issue_key_re().is_match(s)
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

pub fn is_draft_filename(path: &Path) -> bool {
    draft_re().is_match(file_name(path))
}

/// Human title embedded in a record file name, without draft/key/type prefixes.
pub fn title_from_filename(path: &Path) -> String {
    let name = file_name(path);
    if let Some(caps) = draft_re().captures(name) {
        return caps[1].trim().to_string();
    }
    if let Some(caps) = keyed_re().captures(name) {
        return caps[2].trim().to_string();
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .trim()
        .to_string()
}

pub fn keyed_filename(key: &str, title: &str) -> String {
    format!("{key} - {title}.md")
}

pub fn draft_filename(issue_type: IssueType, title: &str) -> String {
    format!("{DRAFT_PREFIX}{} - {}.md", issue_type, sanitize_title(title))
}

/// Target of the post-create rename, or `None` when the file is not a draft name.
pub fn renamed_path(path: &Path, key: &str) -> Option<PathBuf> {
    if !is_draft_filename(path) {
        return None;
    }
    let title = title_from_filename(path);
    Some(path.with_file_name(keyed_filename(key, &title)))
}

pub fn sanitize_title(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c => c,
        })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Glob expansion
// ---------------------------------------------------------------------------

fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Translate a glob over `/`-separated relative paths into an anchored regex.
///
/// `*` and `?` stay inside one component; `**` spans any number of them.
fn pattern_regex(pattern: &str) -> Result<Regex> {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    re.push_str("(?:[^/]*/)*");
                } else {
                    re.push_str(".*");
                }
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            '[' => {
                re.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    re.push('^');
                }
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    if c == '\\' || c == '[' {
                        re.push('\\');
                    }
                    re.push(c);
                }
                re.push(']');
            }
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| SyncError::Config(format!("bad pattern '{pattern}': {e}")))
}

/// Split a pattern into the literal directory it starts from and the glob
/// part below it.
fn split_base(pattern: &str) -> (PathBuf, String) {
    let mut base = PathBuf::new();
    let mut rest: Vec<String> = Vec::new();
    for component in Path::new(pattern).components() {
        match component {
            Component::Normal(p) if rest.is_empty() && !has_glob_meta(&p.to_string_lossy()) => {
                base.push(p);
            }
            Component::Normal(p) => rest.push(p.to_string_lossy().into_owned()),
            other if rest.is_empty() => base.push(other.as_os_str()),
            _ => {}
        }
    }
    (base, rest.join("/"))
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|n| n.starts_with('.'))
}

/// Expand one glob pattern (`*`, `?`, `[..]`, `**`) into existing files.
///
/// Hidden entries are skipped unless the pattern names one. A directory that
/// cannot be read is an error, not an empty match.
pub fn glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let (base, rest) = split_base(pattern);
    let re = pattern_regex(&rest)?;
    let wants_hidden = rest.starts_with('.') || rest.contains("/.");
    let root = if base.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        base.clone()
    };
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut walker = WalkDir::new(&root).min_depth(1).sort_by_file_name();
    if !rest.contains("**") {
        walker = walker.max_depth(rest.split('/').count());
    }

    let mut files = Vec::new();
    for entry in walker
        .into_iter()
        .filter_entry(|e| wants_hidden || e.depth() == 0 || !is_hidden(e))
    {
        let entry = entry.map_err(|e| SyncError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(&root) else {
            continue;
        };
        let rel: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if re.is_match(&rel.join("/")) {
            files.push(rel.iter().fold(base.clone(), |p, c| p.join(c)));
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Resolve CLI arguments to record files.
///
/// Literal paths are kept even when missing so the per-file report can name
/// them. Patterns that match nothing are logged and skipped.
pub fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut out: Vec<PathBuf> = Vec::new();
    for pattern in patterns {
        if has_glob_meta(pattern) {
            let matches = glob(pattern)?;
            if matches.is_empty() {
                tracing::warn!(pattern = %pattern, "pattern matched no files");
            }
            for m in matches {
                if !out.contains(&m) {
                    out.push(m);
                }
            }
        } else {
            let p = PathBuf::from(pattern);
            if !out.contains(&p) {
                out.push(p);
            }
        }
    }
    if out.is_empty() {
        return Err(SyncError::NoFiles);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn draft_names() {
        assert!(is_draft_filename(Path::new("x/DRAFT - Story - Login form.md")));
        assert!(is_draft_filename(Path::new("DRAFT - Login form.md")));
        assert!(!is_draft_filename(Path::new("WOR-12 - Login form.md")));
        assert!(!is_draft_filename(Path::new("notes.md")));
    }

    #[test]
    fn titles_strip_prefixes() {
        assert_eq!(
            title_from_filename(Path::new("DRAFT - Epic - Billing revamp.md")),
            "Billing revamp"
        );
        assert_eq!(
            title_from_filename(Path::new("DRAFT - Billing revamp.md")),
            "Billing revamp"
        );
        assert_eq!(
            title_from_filename(Path::new("WOR-42 - Billing revamp.md")),
            "Billing revamp"
        );
        assert_eq!(title_from_filename(Path::new("loose.md")), "loose");
    }

    #[test]
    fn rename_target_embeds_key() {
        let p = Path::new("records/DRAFT - Feature - Search.md");
        assert_eq!(
            renamed_path(p, "WOR-9").unwrap(),
            Path::new("records/WOR-9 - Search.md")
        );
        assert!(renamed_path(Path::new("records/Search.md"), "WOR-9").is_none());
    }

    #[test]
    fn draft_filename_sanitizes() {
        assert_eq!(
            draft_filename(IssueType::Story, "A/B: test"),
            "DRAFT - Story - A-B- test.md"
        );
    }

    #[test]
    fn issue_keys() {
        assert!(is_issue_key("WOR-123"));
        assert!(!is_issue_key("wor-1"));
        assert!(!is_issue_key("WOR-"));
    }

    #[test]
    fn glob_matches_files() {
        let dir = TempDir::new().unwrap();
        let base = dir.path();
        std::fs::create_dir_all(base.join("stories/nested")).unwrap();
        std::fs::write(base.join("stories/WOR-1 - A.md"), "").unwrap();
        std::fs::write(base.join("stories/WOR-2 - B.md"), "").unwrap();
        std::fs::write(base.join("stories/readme.txt"), "").unwrap();
        std::fs::write(base.join("stories/nested/WOR-3 - C.md"), "").unwrap();

        let pattern = format!("{}/stories/*.md", base.display());
        let found = glob(&pattern).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("WOR-1 - A.md"));

        let deep = format!("{}/**/WOR-?*.md", base.display());
        assert_eq!(glob(&deep).unwrap().len(), 3);
    }

    #[test]
    fn glob_skips_hidden_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/WOR-1 - A.md"), "").unwrap();
        std::fs::write(dir.path().join("WOR-2 - B.md"), "").unwrap();

        let found = glob(&format!("{}/**/*.md", dir.path().display())).unwrap();
        assert_eq!(found, vec![dir.path().join("WOR-2 - B.md")]);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_directory_is_an_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::write(locked.join("WOR-1 - A.md"), "").unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        // Root reads through permission bits; nothing to assert then.
        let readable = std::fs::read_dir(&locked).is_ok();
        let result = glob(&format!("{}/**/*.md", dir.path().display()));
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        if readable {
            return;
        }
        assert!(matches!(result.unwrap_err(), SyncError::Io(_)));
    }

    #[test]
    fn expand_keeps_literals_and_rejects_empty() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.md").display().to_string();
        let out = expand_patterns(&[missing.clone()]).unwrap();
        assert_eq!(out, vec![PathBuf::from(missing)]);

        let none = format!("{}/*.md", dir.path().display());
        assert!(matches!(
            expand_patterns(&[none]).unwrap_err(),
            SyncError::NoFiles
        ));
    }
}
