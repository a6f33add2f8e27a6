mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Script, ScriptedConnector};
use quarry_core::connection::{Connector, Driver, Role};
use quarry_core::{ConnectionConfig, DatabaseConfig, DatabaseManager, Error, Result};
use tokio::sync::Notify;

fn manager() -> (DatabaseManager, Arc<ScriptedConnector>) {
    let mut connections = HashMap::new();
    connections.insert(String::from("main"), ConnectionConfig::sqlite(":memory:"));
    connections.insert(
        String::from("reports"),
        ConnectionConfig::postgres("reports").with_prefix("r_"),
    );
    let config = DatabaseConfig {
        default: String::from("main"),
        connections,
    };
    let connector = Arc::new(ScriptedConnector::new(Script::new()));
    (DatabaseManager::new(config, connector.clone()), connector)
}

#[tokio::test]
async fn test_connections_are_cached() {
    let (manager, connector) = manager();
    let first = manager.connection(None).await.unwrap();
    let again = manager.connection(Some("main")).await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(first.get_name(), "main");
    assert_eq!(connector.connects(), 1);

    let reports = manager.connection(Some("reports")).await.unwrap();
    assert_eq!(reports.get_table_prefix(), "r_");
    assert_eq!(reports.driver_name(), "postgres");
    assert_eq!(connector.connects(), 2);
    assert_eq!(manager.connection_names(), vec!["main", "reports"]);
}

#[tokio::test]
async fn test_unknown_connection_is_a_config_error() {
    let (manager, _) = manager();
    assert!(matches!(
        manager.connection(Some("ghost")).await,
        Err(Error::Config(_))
    ));
}

#[tokio::test]
async fn test_default_can_change() {
    let (manager, _) = manager();
    manager.set_default_connection("reports");
    assert_eq!(manager.connection(None).await.unwrap().get_name(), "reports");
}

#[tokio::test]
async fn test_purge_forgets_and_reconnect_reopens() {
    let (manager, connector) = manager();
    let first = manager.connection(None).await.unwrap();
    manager.reconnect(None).await.unwrap();
    assert_eq!(connector.connects(), 2);

    manager.purge(None).await;
    let second = manager.connection(None).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(connector.connects(), 3);

    manager.disconnect(None).await;
    second.statement("SELECT 1", &[]).await.unwrap();
    assert_eq!(connector.connects(), 4);
}

/// Holds connects to the `slow` database until the gate opens.
#[derive(Debug, Default)]
struct GatedConnector {
    inner: ScriptedConnector,
    gate: Notify,
}

#[async_trait]
impl Connector for GatedConnector {
    async fn connect(&self, config: &ConnectionConfig, role: Role) -> Result<Box<dyn Driver>> {
        if config.database == "slow" {
            self.gate.notified().await;
        }
        self.inner.connect(config, role).await
    }
}

#[tokio::test]
async fn test_slow_connect_does_not_block_other_connections() {
    let mut connections = HashMap::new();
    connections.insert(String::from("main"), ConnectionConfig::sqlite(":memory:"));
    connections.insert(String::from("slow"), ConnectionConfig::sqlite("slow"));
    let config = DatabaseConfig {
        default: String::from("main"),
        connections,
    };
    let connector = Arc::new(GatedConnector::default());
    let manager = DatabaseManager::new(config, connector.clone());

    let slow = manager.connection(Some("slow"));
    let main = async {
        let main = manager.connection(Some("main")).await;
        connector.gate.notify_one();
        main
    };
    let (slow, main) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(slow, main)
    })
    .await
    .unwrap();

    assert_eq!(slow.unwrap().get_name(), "slow");
    assert_eq!(main.unwrap().get_name(), "main");
    assert_eq!(connector.inner.connects(), 2);

    let again = manager.connection(Some("slow")).await.unwrap();
    assert_eq!(again.get_name(), "slow");
    assert_eq!(connector.inner.connects(), 2);
}
