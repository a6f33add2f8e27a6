//! Migration file discovery.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{MigrateError, Result};

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+.*_.*\.\w+$").expect("Invalid migration file regex"))
}

/// Returns `true` when `file_name` follows the `<digits>..._<name>.<ext>`
/// convention.
#[must_use]
pub fn is_migration_file(file_name: &str) -> bool {
    pattern().is_match(file_name)
}

/// Lists the migration identifiers in `path`, sorted. An identifier is the
/// file name without its extension.
///
/// # Errors
///
/// Returns [`MigrateError::MigrationsDirNotFound`] when `path` is not a
/// directory, or the IO failure while reading it.
pub fn discover(path: &Path) -> Result<Vec<String>> {
    if !path.is_dir() {
        return Err(MigrateError::MigrationsDirNotFound(path.to_path_buf()));
    }
    let mut identifiers = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if !is_migration_file(file_name) {
            continue;
        }
        if let Some(stem) = Path::new(file_name).file_stem().and_then(|s| s.to_str()) {
            identifiers.push(stem.to_string());
        }
    }
    identifiers.sort();
    Ok(identifiers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naming_convention() {
        assert!(is_migration_file("1_a.rs"));
        assert!(is_migration_file("2024_01_15_093000_create_users_table.rs"));
        assert!(!is_migration_file("README.md"));
        assert!(!is_migration_file("a_1.rs"));
        assert!(!is_migration_file("1_a"));
    }

    #[test]
    fn test_discover_sorts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["2_b.rs", "1_a.rs", "10_c.rs", "mod.rs", "notes.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("3_dir.d")).unwrap();

        assert_eq!(discover(dir.path()).unwrap(), vec!["10_c", "1_a", "2_b"]);
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover(&dir.path().join("missing")),
            Err(MigrateError::MigrationsDirNotFound(_))
        ));
    }
}
