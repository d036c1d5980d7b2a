use crate::output::{file_name, print_json, print_table};
use jirasync_core::config::Config;
use jirasync_core::paths;
use jirasync_core::record::RecordFile;
use jirasync_core::sync::{check_record, SlotCheck};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct FileCheck {
    path: PathBuf,
    issues: Vec<SlotCheck>,
    error: Option<String>,
}

impl FileCheck {
    fn ok(&self) -> bool {
        self.error.is_none() && self.issues.iter().all(|i| i.missing.is_empty())
    }
}

pub fn run(root: &Path, files: &[String], json: bool) -> anyhow::Result<()> {
    let cfg = Config::load(root)?;
    let paths = paths::expand_patterns(files)?;

    let checks: Vec<FileCheck> = paths
        .into_iter()
        .map(|path| {
            let result = RecordFile::load(&path).and_then(|rec| check_record(&rec, &cfg));
            match result {
                Ok(issues) => FileCheck {
                    path,
                    issues,
                    error: None,
                },
                Err(e) => FileCheck {
                    path,
                    issues: Vec::new(),
                    error: Some(e.to_string()),
                },
            }
        })
        .collect();

    if json {
        print_json(&checks)?;
    } else {
        let mut rows = Vec::new();
        for c in &checks {
            if let Some(err) = &c.error {
                rows.push(vec![
                    file_name(&c.path),
                    "-".into(),
                    "-".into(),
                    format!("error: {err}"),
                ]);
                continue;
            }
            for issue in &c.issues {
                let state = if !issue.missing.is_empty() {
                    format!("draft, missing {}", issue.missing.join(", "))
                } else if issue.key.is_some() {
                    "synced".to_string()
                } else {
                    "draft".to_string()
                };
                rows.push(vec![
                    file_name(&c.path),
                    issue.issue_type.to_string(),
                    issue.key.clone().unwrap_or_else(|| "-".into()),
                    state,
                ]);
            }
        }
        print_table(&["FILE", "TYPE", "KEY", "STATE"], rows);
    }

    let bad = checks.iter().filter(|c| !c.ok()).count();
    if bad > 0 {
        anyhow::bail!("{bad} of {} file(s) have problems", checks.len());
    }
    Ok(())
}
