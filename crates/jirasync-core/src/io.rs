use crate::error::{Result, SyncError};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// A crash mid-write leaves the previous record intact.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Write a file only if it does not already exist. Returns true if written.
///
/// The existence check and the create are one `create_new` open, so a file
/// that appears concurrently is never replaced.
pub fn write_if_missing(path: &Path, data: &[u8]) -> Result<bool> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut f = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    if let Err(e) = f.write_all(data).and_then(|()| f.sync_all()) {
        drop(f);
        let _ = std::fs::remove_file(path);
        return Err(e.into());
    }
    Ok(true)
}

/// Rename `from` to `to`, refusing to replace an existing file.
///
/// The new name is claimed with a hard link, which fails when `to` exists;
/// only then is the old name removed. Filesystems without hard links fall
/// back to a checked rename.
pub fn rename_no_clobber(from: &Path, to: &Path) -> Result<()> {
    if from == to {
        return Ok(());
    }
    let conflict = || SyncError::RenameConflict {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
    };
    match std::fs::hard_link(from, to) {
        Ok(()) => {
            std::fs::remove_file(from)?;
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(conflict()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(e.into()),
        Err(_) => {
            if to.exists() {
                return Err(conflict());
            }
            std::fs::rename(from, to)?;
            Ok(())
        }
    }
}

/// Add `entry` to `root/.gitignore` if it isn't already present.
pub fn ensure_gitignore_entry(root: &Path, entry: &str) -> Result<()> {
    let gitignore = root.join(".gitignore");
    let existing = if gitignore.exists() {
        std::fs::read_to_string(&gitignore)?
    } else {
        String::new()
    };
    if existing.lines().any(|l| l.trim() == entry) {
        return Ok(());
    }
    let sep = if existing.is_empty() || existing.ends_with('\n') {
        ""
    } else {
        "\n"
    };
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&gitignore)?;
    writeln!(f, "{sep}{entry}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("WOR-1 - Title.md");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn write_if_missing_keeps_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("draft.md");
        assert!(write_if_missing(&path, b"one").unwrap());
        assert!(!write_if_missing(&path, b"two").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one");
    }

    #[test]
    fn rename_refuses_to_clobber() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("DRAFT - Login.md");
        let to = dir.path().join("WOR-7 - Login.md");
        std::fs::write(&from, "draft").unwrap();
        std::fs::write(&to, "existing").unwrap();

        let err = rename_no_clobber(&from, &to).unwrap_err();
        assert!(matches!(err, SyncError::RenameConflict { .. }));
        assert_eq!(std::fs::read_to_string(&to).unwrap(), "existing");
        assert!(from.exists());
    }

    #[test]
    fn rename_moves_file() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("DRAFT - Login.md");
        let to = dir.path().join("WOR-7 - Login.md");
        std::fs::write(&from, "draft").unwrap();
        rename_no_clobber(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read_to_string(&to).unwrap(), "draft");
    }

    #[test]
    fn write_if_missing_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("epics/DRAFT - Epic - Billing.md");
        assert!(write_if_missing(&path, b"draft").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "draft");
    }

    #[test]
    fn rename_of_missing_source_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("DRAFT - Gone.md");
        let to = dir.path().join("WOR-8 - Gone.md");
        let err = rename_no_clobber(&from, &to).unwrap_err();
        assert!(matches!(err, SyncError::Io(_)));
        assert!(!to.exists());
    }

    #[test]
    fn gitignore_entry_added_once() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "target").unwrap();
        ensure_gitignore_entry(dir.path(), ".env").unwrap();
        ensure_gitignore_entry(dir.path(), ".env").unwrap();
        let content = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(content, "target\n.env\n");
    }
}
