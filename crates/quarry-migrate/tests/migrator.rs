//! Migrator tests against an in-memory SQLite database.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::{Connection, ConnectionConfig, DatabaseConfig, DatabaseManager};
use quarry_migrate::cli::{dispatch, Cli};
use quarry_migrate::{
    MigrateError, Migration, MigrationRecord, MigrationRegistry, MigrationRepository,
    MigrationStatus, Migrator, DEFAULT_TABLE,
};

/// Creates `<table>` on the way up and drops it on the way down, counting
/// both and remembering the transaction level `up` saw.
struct CreateTable {
    table: &'static str,
    transactional: bool,
    ups: Arc<AtomicUsize>,
    downs: Arc<AtomicUsize>,
    level: Arc<AtomicUsize>,
}

impl CreateTable {
    fn new(table: &'static str) -> Self {
        Self {
            table,
            transactional: true,
            ups: Arc::default(),
            downs: Arc::default(),
            level: Arc::default(),
        }
    }

    fn non_transactional(mut self) -> Self {
        self.transactional = false;
        self
    }

    fn counters(&self) -> (Arc<AtomicUsize>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        (
            Arc::clone(&self.ups),
            Arc::clone(&self.downs),
            Arc::clone(&self.level),
        )
    }
}

#[async_trait]
impl Migration for CreateTable {
    async fn up(&self, connection: &Connection) -> quarry_core::Result<()> {
        self.ups.fetch_add(1, Ordering::SeqCst);
        self.level
            .store(connection.transaction_level(), Ordering::SeqCst);
        connection
            .schema()
            .create(self.table, |table| {
                table.increments("id");
                table.string("name");
            })
            .await
    }

    async fn down(&self, connection: &Connection) -> quarry_core::Result<()> {
        self.downs.fetch_add(1, Ordering::SeqCst);
        connection.schema().drop(self.table).await
    }

    fn transactional(&self) -> bool {
        self.transactional
    }
}

fn manager() -> Arc<DatabaseManager> {
    Arc::new(quarry_sqlx::manager(DatabaseConfig::single(
        "main",
        ConnectionConfig::sqlite(":memory:"),
    )))
}

fn migrations_dir(names: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in names {
        std::fs::write(dir.path().join(format!("{name}.rs")), "").unwrap();
    }
    dir
}

async fn migrator(manager: &Arc<DatabaseManager>, registry: MigrationRegistry) -> Migrator {
    let repository = MigrationRepository::new(Arc::clone(manager), DEFAULT_TABLE);
    repository.create_repository().await.unwrap();
    Migrator::new(repository, registry, Arc::clone(manager))
}

async fn has_table(manager: &DatabaseManager, table: &str) -> bool {
    let connection = manager.connection(None).await.unwrap();
    connection.schema().has_table(table).await.unwrap()
}

#[tokio::test]
async fn test_run_and_rollback_batch() {
    let manager = manager();
    let dir = migrations_dir(&["1_a", "2_b"]);
    let registry = MigrationRegistry::new()
        .with("A", CreateTable::new("alpha"))
        .with("B", CreateTable::new("beta"));
    let mut migrator = migrator(&manager, registry).await;

    assert!(migrator.repository_exists().await.unwrap());
    assert_eq!(migrator.run(dir.path(), false).await.unwrap(), 2);
    assert_eq!(migrator.notes(), ["Migrated: 1_a", "Migrated: 2_b"]);
    assert_eq!(migrator.repository().get_ran().await.unwrap(), ["1_a", "2_b"]);
    assert_eq!(migrator.repository().get_last_batch_number().await.unwrap(), 1);
    assert!(has_table(&manager, "alpha").await);
    assert!(has_table(&manager, "beta").await);

    assert_eq!(migrator.rollback(false).await.unwrap(), 2);
    assert_eq!(migrator.notes(), ["Rolled back: 2_b", "Rolled back: 1_a"]);
    assert!(migrator.repository().get_ran().await.unwrap().is_empty());
    assert!(!has_table(&manager, "alpha").await);

    assert_eq!(migrator.rollback(false).await.unwrap(), 0);
    assert_eq!(migrator.notes(), ["Nothing to rollback."]);
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let manager = manager();
    let dir = migrations_dir(&["1_a"]);
    let migration = CreateTable::new("alpha");
    let (ups, _, _) = migration.counters();
    let mut migrator = migrator(&manager, MigrationRegistry::new().with("A", migration)).await;

    migrator.run(dir.path(), false).await.unwrap();
    assert_eq!(migrator.run(dir.path(), false).await.unwrap(), 0);
    assert_eq!(migrator.notes(), ["Nothing to migrate."]);
    assert_eq!(ups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_batches_roll_back_one_at_a_time() {
    let manager = manager();
    let dir = migrations_dir(&["1_a"]);
    let registry = MigrationRegistry::new()
        .with("A", CreateTable::new("alpha"))
        .with("B", CreateTable::new("beta"));
    let mut migrator = migrator(&manager, registry).await;

    migrator.run(dir.path(), false).await.unwrap();
    std::fs::write(dir.path().join("2_b.rs"), "").unwrap();
    migrator.run(dir.path(), false).await.unwrap();

    assert_eq!(
        migrator.repository().get_last().await.unwrap(),
        [MigrationRecord {
            migration: "2_b".into(),
            batch: 2
        }]
    );
    assert_eq!(migrator.rollback(false).await.unwrap(), 1);
    assert_eq!(migrator.repository().get_ran().await.unwrap(), ["1_a"]);
    assert!(!has_table(&manager, "beta").await);

    migrator.run(dir.path(), false).await.unwrap();
    assert_eq!(migrator.reset(false).await.unwrap(), 2);
    assert_eq!(migrator.notes(), ["Rolled back: 2_b", "Rolled back: 1_a"]);
    assert!(!has_table(&manager, "alpha").await);
}

#[tokio::test]
async fn test_pretend_runs_nothing() {
    let manager = manager();
    let dir = migrations_dir(&["1_a"]);
    let migration = CreateTable::new("alpha");
    let (ups, _, _) = migration.counters();
    let mut migrator = migrator(&manager, MigrationRegistry::new().with("A", migration)).await;

    assert_eq!(migrator.run(dir.path(), true).await.unwrap(), 0);
    assert_eq!(ups.load(Ordering::SeqCst), 1);
    assert_eq!(migrator.notes().len(), 1);
    assert!(migrator.notes()[0].starts_with("A: CREATE TABLE \"alpha\""));

    assert!(migrator.repository().get_ran().await.unwrap().is_empty());
    assert!(!has_table(&manager, "alpha").await);

    migrator.run(dir.path(), false).await.unwrap();
    assert_eq!(migrator.rollback(true).await.unwrap(), 0);
    assert!(migrator.notes()[0].starts_with("A: DROP TABLE \"alpha\""));
    assert_eq!(migrator.reset(true).await.unwrap(), 0);
    assert_eq!(migrator.repository().get_ran().await.unwrap(), ["1_a"]);
    assert!(has_table(&manager, "alpha").await);
}

#[tokio::test]
async fn test_transactional_flag() {
    let manager = manager();
    let dir = migrations_dir(&["1_a", "2_b"]);
    let wrapped = CreateTable::new("alpha");
    let bare = CreateTable::new("beta").non_transactional();
    let (_, _, wrapped_level) = wrapped.counters();
    let (_, _, bare_level) = bare.counters();
    let registry = MigrationRegistry::new().with("A", wrapped).with("B", bare);
    let mut migrator = migrator(&manager, registry).await;

    migrator.run(dir.path(), false).await.unwrap();
    assert_eq!(wrapped_level.load(Ordering::SeqCst), 1);
    assert_eq!(bare_level.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unresolvable_migration() {
    let manager = manager();
    let dir = migrations_dir(&["1_a", "2_missing_class"]);
    let mut migrator = migrator(
        &manager,
        MigrationRegistry::new().with("A", CreateTable::new("alpha")),
    )
    .await;

    match migrator.run(dir.path(), false).await {
        Err(MigrateError::Resolution { identifier, class }) => {
            assert_eq!(identifier, "2_missing_class");
            assert_eq!(class, "MissingClass");
        }
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
    assert_eq!(migrator.repository().get_ran().await.unwrap(), ["1_a"]);
}

#[tokio::test]
async fn test_status() {
    let manager = manager();
    let dir = migrations_dir(&["1_a"]);
    let mut migrator = migrator(
        &manager,
        MigrationRegistry::new()
            .with("A", CreateTable::new("alpha"))
            .with("B", CreateTable::new("beta")),
    )
    .await;
    migrator.run(dir.path(), false).await.unwrap();
    std::fs::write(dir.path().join("2_b.rs"), "").unwrap();

    assert_eq!(
        migrator.status(dir.path()).await.unwrap(),
        [
            MigrationStatus {
                migration: "1_a".into(),
                ran: true
            },
            MigrationStatus {
                migration: "2_b".into(),
                ran: false
            },
        ]
    );
}

async fn cli(
    args: &[&str],
    path: &Path,
    registry: MigrationRegistry,
    manager: &Arc<DatabaseManager>,
) -> Vec<String> {
    use clap::Parser;

    let path = path.to_string_lossy().into_owned();
    let mut argv = vec!["quarry", "--path", path.as_str(), "--env", "local"];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv).unwrap();
    dispatch(&cli, registry, Arc::clone(manager)).await.unwrap()
}

#[tokio::test]
async fn test_cli_commands() {
    let manager = manager();
    let dir = migrations_dir(&["1_a"]);
    let registry = || MigrationRegistry::new().with("A", CreateTable::new("alpha"));

    assert_eq!(
        cli(&["migrations:install"], dir.path(), registry(), &manager).await,
        ["Migration table created successfully."]
    );
    assert_eq!(
        cli(&["migrations:install"], dir.path(), registry(), &manager).await,
        ["Migration table already exists."]
    );
    assert_eq!(
        cli(&["migrations:status"], dir.path(), registry(), &manager).await,
        ["[N] 1_a"]
    );
    assert_eq!(
        cli(&["migrations:run"], dir.path(), registry(), &manager).await,
        ["Migrated: 1_a"]
    );
    assert_eq!(
        cli(&["migrations:refresh"], dir.path(), registry(), &manager).await,
        ["Rolled back: 1_a", "Migrated: 1_a"]
    );
    assert_eq!(
        cli(&["migrations:status"], dir.path(), registry(), &manager).await,
        ["[Y] 1_a"]
    );

    let created = cli(
        &["make:migration", "add_votes_to_alpha", "--table", "alpha"],
        dir.path(),
        registry(),
        &manager,
    )
    .await;
    assert_eq!(created.len(), 1);
    assert!(created[0].starts_with("Created migration: "));
    assert!(created[0].ends_with("_add_votes_to_alpha.rs"));
    assert_eq!(quarry_migrate::files::discover(dir.path()).unwrap().len(), 2);
}

#[tokio::test]
async fn test_production_requires_force() {
    use clap::Parser;

    let manager = manager();
    let dir = migrations_dir(&["1_a"]);
    let path = dir.path().to_string_lossy().into_owned();
    let cli = Cli::try_parse_from([
        "quarry",
        "migrations:reset",
        "--path",
        path.as_str(),
        "--env",
        "production",
    ])
    .unwrap();

    let lines = dispatch(&cli, MigrationRegistry::new(), Arc::clone(&manager))
        .await
        .unwrap();
    assert_eq!(
        lines,
        ["Application in production: use --force to run this command."]
    );
    assert!(!has_table(&manager, DEFAULT_TABLE).await);
}
