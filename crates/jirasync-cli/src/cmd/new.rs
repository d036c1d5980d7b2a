use crate::output::print_json;
use anyhow::Context;
use jirasync_core::config::Config;
use jirasync_core::paths;
use jirasync_core::record::draft_template;
use jirasync_core::schema::IssueType;
use std::path::Path;

pub fn run(
    root: &Path,
    issue_type: &str,
    title: &str,
    dir: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let issue_type: IssueType = issue_type.parse()?;
    let title = paths::sanitize_title(title);
    if title.is_empty() {
        anyhow::bail!("title must not be empty");
    }
    let cfg = Config::load(root)?;

    let dir = match dir {
        Some(d) => d.to_path_buf(),
        None => std::env::current_dir().context("cannot read current directory")?,
    };
    let path = dir.join(paths::draft_filename(issue_type, &title));
    let content = draft_template(issue_type, &title, &cfg);
    let written = jirasync_core::io::write_if_missing(&path, content.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    if !written {
        anyhow::bail!("{} already exists", path.display());
    }

    if json {
        print_json(&serde_json::json!({
            "path": path,
            "issue_type": issue_type,
        }))?;
    } else {
        println!("Created draft: {}", path.display());
        println!("Next: fill in the sections, then jirasync create \"{}\"", path.display());
    }
    Ok(())
}
