// Backup markers: timestamped copies of the source taken before a
// destructive write.
//
// A marker is a file next to the source named `<stem>.backup-*` or
// `<stem>_backup_*`, or a file named `<stem>` plus a separator and anything
// inside a sibling `backups/` directory. Only markers modified within the max age count.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use wasteaudit_config::{BackupPolicy, BackupSettings};

use crate::error::StoreError;

fn stem_of(source: &Path) -> String {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn is_marker_name(name: &str, stem: &str) -> bool {
    name.starts_with(&format!("{stem}.backup-")) || name.starts_with(&format!("{stem}_backup_"))
}

/// Names in `backups/`: the stem must end at a separator, so `Portfolio2`
/// is not a copy of `Portfolio`.
fn is_backups_dir_name(name: &str, stem: &str) -> bool {
    name.strip_prefix(stem)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| matches!(c, '.' | '_' | '-' | ' '))
}

fn candidates(source: &Path) -> Vec<PathBuf> {
    let stem = stem_of(source);
    let parent = source.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let mut out = Vec::new();

    if let Ok(entries) = fs::read_dir(parent) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if is_marker_name(&name, &stem) {
                out.push(entry.path());
            }
        }
    }
    if let Ok(entries) = fs::read_dir(parent.join("backups")) {
        for entry in entries.flatten() {
            if is_backups_dir_name(&entry.file_name().to_string_lossy(), &stem) {
                out.push(entry.path());
            }
        }
    }
    out
}

/// Newest backup marker of `source` no older than `max_age`.
pub fn find_recent_backup(source: &Path, max_age: Duration, now: SystemTime) -> Option<PathBuf> {
    candidates(source)
        .into_iter()
        .filter(|p| p.is_file())
        .filter_map(|p| {
            let modified = fs::metadata(&p).and_then(|m| m.modified()).ok()?;
            // Clock skew: a marker from the future counts as fresh.
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            (age <= max_age).then_some((modified, p))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, p)| p)
}

/// Apply the backup policy before overwriting `target`.
pub fn check_backup(target: &Path, settings: &BackupSettings) -> Result<Option<PathBuf>, StoreError> {
    if settings.policy == BackupPolicy::Off {
        return Ok(None);
    }
    let max_age = Duration::from_secs(settings.max_age_hours.saturating_mul(3600));
    match find_recent_backup(target, max_age, SystemTime::now()) {
        Some(marker) => {
            log::debug!("backup marker for {}: {}", target.display(), marker.display());
            Ok(Some(marker))
        }
        None if settings.policy == BackupPolicy::Warn => {
            log::warn!(
                "no backup of {} from the last {}h; writing anyway",
                target.display(),
                settings.max_age_hours
            );
            Ok(None)
        }
        None => Err(StoreError::BackupMissing {
            path: target.to_path_buf(),
            max_age_hours: settings.max_age_hours,
        }),
    }
}

/// Copy `source` to `<stem>.backup-YYYYMMDD-HHMMSS.<ext>` beside it.
pub fn create_backup(source: &Path) -> Result<PathBuf, StoreError> {
    if !source.is_file() {
        return Err(StoreError::SourceUnavailable {
            path: source.to_path_buf(),
            reason: "not a file".to_string(),
        });
    }
    let stem = stem_of(source);
    let ext = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let parent = source.parent().unwrap_or(Path::new("."));

    let mut dest = parent.join(format!("{stem}.backup-{stamp}{ext}"));
    let mut n = 1;
    while dest.exists() {
        dest = parent.join(format!("{stem}.backup-{stamp}-{n}{ext}"));
        n += 1;
    }

    fs::copy(source, &dest)?;
    log::info!("backed up {} to {}", source.display(), dest.display());
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn settings(policy: BackupPolicy) -> BackupSettings {
        BackupSettings { policy, max_age_hours: 24 }
    }

    #[test]
    fn created_backup_counts_as_marker() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("Portfolio.xlsx");
        fs::write(&source, b"data").unwrap();

        assert!(check_backup(&source, &settings(BackupPolicy::Require)).is_err());
        let backup = create_backup(&source).unwrap();
        assert!(backup.file_name().unwrap().to_string_lossy().starts_with("Portfolio.backup-"));
        assert_eq!(fs::read(&backup).unwrap(), b"data");
        assert_eq!(check_backup(&source, &settings(BackupPolicy::Require)).unwrap(), Some(backup));
    }

    #[test]
    fn backups_directory_and_underscore_names() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("Portfolio.xlsx");
        fs::write(&source, b"data").unwrap();
        fs::write(dir.path().join("Other_backup_20250101.xlsx"), b"x").unwrap();
        assert!(find_recent_backup(&source, Duration::from_secs(3600), SystemTime::now()).is_none());

        fs::create_dir(dir.path().join("backups")).unwrap();
        fs::write(dir.path().join("backups").join("Portfolio 2025-01-01.xlsx"), b"x").unwrap();
        assert!(find_recent_backup(&source, Duration::from_secs(3600), SystemTime::now()).is_some());

        fs::write(dir.path().join("Portfolio_backup_20250101.xlsx"), b"x").unwrap();
        assert_eq!(candidates(&source).len(), 2);
    }

    #[test]
    fn backups_directory_requires_separator_after_stem() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("Portfolio.xlsx");
        fs::write(&source, b"data").unwrap();
        let backups = dir.path().join("backups");
        fs::create_dir(&backups).unwrap();
        fs::write(backups.join("Portfolio2.xlsx"), b"x").unwrap();
        fs::write(backups.join("PortfolioOld.xlsx"), b"x").unwrap();
        assert!(candidates(&source).is_empty());

        fs::write(backups.join("Portfolio.xlsx"), b"x").unwrap();
        fs::write(backups.join("Portfolio-2025-01-01.xlsx"), b"x").unwrap();
        assert_eq!(candidates(&source).len(), 2);
    }

    #[test]
    fn stale_backup_does_not_count() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("Portfolio.xlsx");
        fs::write(&source, b"data").unwrap();
        let marker = dir.path().join("Portfolio.backup-20240101-000000.xlsx");
        fs::write(&marker, b"old").unwrap();
        let two_days_ago = SystemTime::now() - Duration::from_secs(48 * 3600);
        fs::File::options().write(true).open(&marker).unwrap().set_modified(two_days_ago).unwrap();

        let err = check_backup(&source, &settings(BackupPolicy::Require)).unwrap_err();
        assert!(matches!(err, StoreError::BackupMissing { max_age_hours: 24, .. }));
        assert_eq!(check_backup(&source, &settings(BackupPolicy::Warn)).unwrap(), None);
        assert_eq!(check_backup(&source, &settings(BackupPolicy::Off)).unwrap(), None);
    }

    #[test]
    fn backup_of_missing_file_fails() {
        let dir = tempdir().unwrap();
        assert!(create_backup(&dir.path().join("nope.xlsx")).is_err());
    }
}
