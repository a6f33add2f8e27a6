//! Migration file generation for `make:migration`.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{Local, NaiveDateTime};
use regex::Regex;
use tracing::info;

use crate::error::{MigrateError, Result};
use crate::files;
use crate::migration::class_name;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("Invalid migration name regex"))
}

/// Which template a new migration starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stub {
    /// Empty `up` and `down`.
    Blank,
    /// Creates the table in `up` and drops it in `down`.
    Create(String),
    /// Alters an existing table.
    Update(String),
}

impl Stub {
    /// Picks the template for the `--table` and `--create` options;
    /// `--create` wins when both are given.
    #[must_use]
    pub fn from_options(table: Option<&str>, create: Option<&str>) -> Self {
        match (create, table) {
            (Some(table), _) => Self::Create(table.to_string()),
            (None, Some(table)) => Self::Update(table.to_string()),
            (None, None) => Self::Blank,
        }
    }
}

/// Writes new migration files into a directory.
#[derive(Debug, Clone)]
pub struct MigrationCreator {
    path: PathBuf,
}

impl MigrationCreator {
    /// Creates a creator writing into `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The target directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes a migration named `name` stamped with the current local time.
    ///
    /// # Errors
    ///
    /// See [`Self::create_at`].
    pub fn create(&self, name: &str, stub: &Stub) -> Result<PathBuf> {
        self.create_at(name, stub, Local::now().naive_local())
    }

    /// Writes `<YYYY_MM_DD_HHMMSS>_<name>.rs` from `stub`, creating the
    /// directory when needed.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::InvalidName`] unless `name` is a snake_case
    /// identifier, [`MigrateError::MigrationExists`] when a migration with
    /// the same class name is already in the directory, or the IO failure.
    pub fn create_at(&self, name: &str, stub: &Stub, now: NaiveDateTime) -> Result<PathBuf> {
        if !name_pattern().is_match(name) {
            return Err(MigrateError::InvalidName(name.to_string()));
        }
        let class = class_name(name);

        if self.path.is_dir() {
            if let Some(existing) = files::discover(&self.path)?
                .into_iter()
                .find(|identifier| class_name(identifier) == class)
            {
                return Err(MigrateError::MigrationExists(
                    self.path.join(format!("{existing}.rs")),
                ));
            }
        } else {
            std::fs::create_dir_all(&self.path)?;
        }

        let file = self
            .path
            .join(format!("{}_{name}.rs", now.format("%Y_%m_%d_%H%M%S")));
        std::fs::write(&file, render(&class, stub))?;
        info!(path = %file.display(), "Created migration");
        Ok(file)
    }
}

/// Renders the Rust source of a migration named `class`.
#[must_use]
pub fn render(class: &str, stub: &Stub) -> String {
    let (up, down) = match stub {
        Stub::Blank => (String::from("        Ok(())\n"), String::from("        Ok(())\n")),
        Stub::Create(table) => (
            format!(
                "        connection\n\
                 \x20           .schema()\n\
                 \x20           .create(\"{table}\", |table| {{\n\
                 \x20               table.increments(\"id\");\n\
                 \x20               table.timestamps();\n\
                 \x20           }})\n\
                 \x20           .await\n"
            ),
            format!("        connection.schema().drop(\"{table}\").await\n"),
        ),
        Stub::Update(table) => {
            let body = format!(
                "        connection\n\
                 \x20           .schema()\n\
                 \x20           .table(\"{table}\", |table| {{\n\
                 \x20               let _ = table;\n\
                 \x20           }})\n\
                 \x20           .await\n"
            );
            (body.clone(), body)
        }
    };

    format!(
        "use async_trait::async_trait;\n\
         use quarry_core::Connection;\n\
         use quarry_migrate::Migration;\n\
         \n\
         pub struct {class};\n\
         \n\
         #[async_trait]\n\
         impl Migration for {class} {{\n\
         \x20   async fn up(&self, connection: &Connection) -> quarry_core::Result<()> {{\n\
         {up}\
         \x20   }}\n\
         \n\
         \x20   async fn down(&self, connection: &Connection) -> quarry_core::Result<()> {{\n\
         {down}\
         \x20   }}\n\
         }}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 1, 15)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .unwrap()
    }

    #[test]
    fn test_stub_selection() {
        assert_eq!(Stub::from_options(None, None), Stub::Blank);
        assert_eq!(
            Stub::from_options(Some("users"), None),
            Stub::Update("users".into())
        );
        assert_eq!(
            Stub::from_options(Some("users"), Some("posts")),
            Stub::Create("posts".into())
        );
    }

    #[test]
    fn test_create_writes_stub() {
        let dir = tempfile::tempdir().unwrap();
        let creator = MigrationCreator::new(dir.path().join("migrations"));
        let path = creator
            .create_at("create_users_table", &Stub::Create("users".into()), stamp())
            .unwrap();

        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("2024_01_15_093000_create_users_table.rs")
        );
        let source = std::fs::read_to_string(&path).unwrap();
        assert!(source.contains("pub struct CreateUsersTable;"));
        assert!(source.contains(".create(\"users\", |table| {"));
        assert!(source.contains("connection.schema().drop(\"users\").await"));
        assert_eq!(
            files::discover(creator.path()).unwrap(),
            vec!["2024_01_15_093000_create_users_table"]
        );
    }

    #[test]
    fn test_rejects_duplicates_and_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        let creator = MigrationCreator::new(dir.path());
        creator.create_at("add_votes", &Stub::Blank, stamp()).unwrap();

        assert!(matches!(
            creator.create_at("add_votes", &Stub::Blank, stamp()),
            Err(MigrateError::MigrationExists(_))
        ));
        for name in ["AddVotes", "add-votes", "1_add", ""] {
            assert!(matches!(
                creator.create_at(name, &Stub::Blank, stamp()),
                Err(MigrateError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn test_blank_render() {
        let source = render("AddVotes", &Stub::Blank);
        assert!(source.contains("impl Migration for AddVotes {"));
        assert_eq!(source.matches("        Ok(())\n").count(), 2);
    }
}
