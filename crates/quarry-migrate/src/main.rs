//! quarry CLI
//!
//! Runs with an empty registry: install, status and make:migration work,
//! while running migrations needs a binary that registers them through
//! [`quarry_migrate::cli::run`].

use quarry_migrate::{cli, MigrationRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::run(MigrationRegistry::new()).await
}
