use jirasync_core::sync::{BatchReport, FileReport, Outcome};
use serde::Serialize;
use std::path::Path;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  ").trim_end());

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  ").trim_end());
    }
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn detail(file: &FileReport) -> String {
    match file.outcome {
        Outcome::Failed => {
            let category = file.category.map(|c| c.as_str()).unwrap_or("error");
            format!("[{category}] {}", file.error.as_deref().unwrap_or_default())
        }
        Outcome::Skipped => file.note.clone().unwrap_or_default(),
        Outcome::Succeeded => {
            let mut parts = Vec::new();
            for issue in &file.issues {
                if issue.created {
                    parts.push(format!("created {}", issue.key.as_deref().unwrap_or("?")));
                }
                if let Some(t) = &issue.transition {
                    parts.push(t.clone());
                }
            }
            let changes = file.change_count();
            if changes > 0 {
                parts.push(format!("{changes} field change(s)"));
            }
            if let Some(to) = &file.renamed_to {
                parts.push(format!("renamed to {}", file_name(to)));
            }
            if parts.is_empty() {
                "up to date".to_string()
            } else {
                parts.join(", ")
            }
        }
    }
}

/// Human form of a batch: one row per file, then per-field detail.
pub fn print_report(report: &BatchReport) -> anyhow::Result<()> {
    if report.dry_run {
        println!("Dry run: nothing is sent to Jira or written to disk.\n");
    }

    let rows = report
        .files
        .iter()
        .map(|f| {
            let keys: Vec<&str> = f.issues.iter().filter_map(|i| i.key.as_deref()).collect();
            vec![
                file_name(&f.path),
                f.outcome.as_str().to_string(),
                keys.join(", "),
                detail(f),
            ]
        })
        .collect();
    print_table(&["FILE", "RESULT", "KEYS", "DETAIL"], rows);

    for file in &report.files {
        let has_detail = file.change_count() > 0
            || !file.warnings.is_empty()
            || file.issues.iter().any(|i| i.payload.is_some());
        if !has_detail {
            continue;
        }
        println!("\n{}", file_name(&file.path));
        for issue in &file.issues {
            let who = issue.key.as_deref().unwrap_or(issue.label);
            for c in &issue.changes {
                println!("  {who} {}: {} -> {}", c.field, c.from, c.to);
            }
            if let Some(payload) = &issue.payload {
                println!("  {} {} payload:", issue.issue_type, issue.label);
                for line in serde_json::to_string_pretty(payload)?.lines() {
                    println!("    {line}");
                }
            }
        }
        for w in &file.warnings {
            println!("  warning: {w}");
        }
    }

    println!(
        "\nSummary: {} succeeded, {} failed, {} skipped",
        report.succeeded(),
        report.failed(),
        report.skipped()
    );
    Ok(())
}
