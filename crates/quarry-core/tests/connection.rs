//! Connection state machine tests over a scripted driver.

mod common;

use std::sync::Arc;

use common::{row, sqlite, Script, ScriptedConnector};
use quarry_core::connection::Role;
use quarry_core::{record, Connection, ConnectionConfig, Error, SqlValue};

#[tokio::test]
async fn test_select_runs_compiled_sql_with_bindings() {
    let (conn, script) = sqlite();
    conn.table("users")
        .where_eq("id", 1)
        .where_("name", "=", "john")
        .get()
        .await
        .unwrap();

    let state = script.state();
    assert_eq!(
        state.seen[0].sql,
        "SELECT * FROM \"users\" WHERE \"id\" = ? AND \"name\" = ?"
    );
    assert_eq!(
        state.seen[0].bindings,
        vec![SqlValue::Int(1), SqlValue::Text("john".into())]
    );
}

#[tokio::test]
async fn test_nested_commits_reach_driver_once() {
    let (conn, script) = sqlite();
    for _ in 0..3 {
        conn.begin_transaction().await.unwrap();
    }
    assert_eq!(conn.transaction_level(), 3);
    for _ in 0..3 {
        conn.commit().await.unwrap();
    }
    assert_eq!(conn.transaction_level(), 0);

    let state = script.state();
    assert_eq!((state.begins, state.commits, state.rollbacks), (1, 1, 0));
}

#[tokio::test]
async fn test_commit_without_transaction_is_an_error() {
    let (conn, _script) = sqlite();
    assert!(matches!(conn.commit().await, Err(Error::InvalidArgument(_))));
    conn.rollback().await.unwrap();
    assert_eq!(conn.transaction_level(), 0);
}

#[tokio::test]
async fn test_nested_scoped_failure_rolls_back_once() {
    let (conn, script) = sqlite();
    let result: Result<(), Error> = conn
        .transaction(|outer| {
            Box::pin(async move {
                outer.table("users").insert(record! { "name" => "a" }).await?;
                outer
                    .transaction(|inner| {
                        Box::pin(async move {
                            inner.table("users").insert(record! { "name" => "b" }).await?;
                            Err::<(), _>(Error::invalid("boom"))
                        })
                    })
                    .await
            })
        })
        .await;

    assert!(result.is_err());
    assert_eq!(conn.transaction_level(), 0);
    let state = script.state();
    assert_eq!((state.begins, state.commits, state.rollbacks), (1, 0, 1));
    assert_eq!(state.seen.len(), 2);
}

#[tokio::test]
async fn test_scoped_transaction_commits() {
    let (conn, script) = sqlite();
    let id = conn
        .transaction(|c| {
            Box::pin(async move {
                c.table("users")
                    .insert_get_id(record! { "name" => "a" }, None)
                    .await
            })
        })
        .await
        .unwrap();

    assert_eq!(id, 7);
    let state = script.state();
    assert_eq!((state.begins, state.commits, state.rollbacks), (1, 1, 0));
}

#[tokio::test]
async fn test_failed_commit_rolls_back() {
    let (conn, script) = sqlite();
    script.state().fail_commit = true;
    let result = conn
        .transaction(|c| Box::pin(async move { c.statement("SELECT 1", &[]).await }))
        .await;

    assert!(matches!(result, Err(Error::Driver(_))));
    assert_eq!(conn.transaction_level(), 0);
    assert_eq!(script.state().rollbacks, 1);
}

#[tokio::test]
async fn test_pretend_captures_without_running() {
    let (conn, script) = sqlite();
    conn.enable_query_log();
    conn.statement("SELECT 1", &[]).await.unwrap();

    let queries = conn
        .pretend(|c| {
            Box::pin(async move {
                c.table("users").where_eq("id", 5).delete().await?;
                c.begin_transaction().await?;
                c.table("users").insert(record! { "name" => "x" }).await?;
                c.commit().await?;
                Ok::<_, Error>(())
            })
        })
        .await
        .unwrap();

    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].sql, "DELETE FROM \"users\" WHERE \"id\" = ?");
    assert_eq!(queries[0].bindings, vec![SqlValue::Int(5)]);
    assert!(queries.iter().all(|q| q.elapsed_ms.is_none()));

    assert!(!conn.is_pretending());
    assert!(conn.logging());
    assert_eq!(conn.get_query_log().len(), 1);
    let state = script.state();
    assert_eq!(state.seen.len(), 1);
    assert_eq!((state.begins, state.commits), (0, 0));
}

#[tokio::test]
async fn test_pretend_restores_mode_on_error() {
    let (conn, script) = sqlite();
    let result = conn
        .pretend(|c| {
            Box::pin(async move {
                c.statement("DROP TABLE users", &[]).await?;
                Err::<(), _>(Error::invalid("stop"))
            })
        })
        .await;

    assert!(result.is_err());
    assert!(!conn.is_pretending());
    assert!(!conn.logging());
    assert!(conn.get_query_log().is_empty());
    assert!(script.state().seen.is_empty());
}

#[tokio::test]
async fn test_query_log_records_elapsed() {
    let (conn, _script) = sqlite();
    conn.statement("SELECT 1", &[]).await.unwrap();
    assert!(conn.get_query_log().is_empty());

    conn.enable_query_log();
    conn.select("SELECT ?", &[SqlValue::Int(1)]).await.unwrap();
    let log = conn.get_query_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].bindings, vec![SqlValue::Int(1)]);
    assert!(log[0].elapsed_ms.is_some_and(|ms| ms >= 0.0));

    conn.flush_query_log();
    conn.disable_query_log();
    assert!(conn.get_query_log().is_empty());
}

#[tokio::test]
async fn test_lost_connection_reconnects_once() {
    let script = Script::new();
    let connector = Arc::new(ScriptedConnector::new(script.clone()));
    let conn = Connection::connect(
        "main",
        ConnectionConfig::sqlite(":memory:"),
        connector.clone(),
    )
    .await
    .unwrap();
    assert_eq!(connector.connects(), 1);

    script.fail_next("SQLSTATE[HY000]: MySQL server has gone away");
    assert!(conn.statement("UPDATE t SET a = 1", &[]).await.unwrap());
    assert_eq!(connector.connects(), 2);
    assert_eq!(script.statements(), vec!["UPDATE t SET a = 1"]);

    conn.disconnect().await;
    conn.select("SELECT 1", &[]).await.unwrap();
    assert_eq!(connector.connects(), 3);
}

#[tokio::test]
async fn test_lost_connection_inside_transaction_is_not_retried() {
    let script = Script::new();
    let connector = Arc::new(ScriptedConnector::new(script.clone()));
    let conn = Connection::connect("main", ConnectionConfig::sqlite(":memory:"), connector.clone())
        .await
        .unwrap();

    conn.begin_transaction().await.unwrap();
    conn.insert("INSERT INTO a VALUES (1)", &[]).await.unwrap();
    script.fail_next("SQLSTATE[HY000]: MySQL server has gone away");
    let error = conn
        .insert("INSERT INTO a VALUES (2)", &[])
        .await
        .unwrap_err();
    match error {
        Error::Query { sql, .. } => assert_eq!(sql, "INSERT INTO a VALUES (2)"),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(connector.connects(), 1);
    assert_eq!(conn.transaction_level(), 1);
    assert_eq!(script.statements(), vec!["INSERT INTO a VALUES (1)"]);

    conn.rollback().await.unwrap();
    assert_eq!(script.state().rollbacks, 1);
    assert_eq!(conn.transaction_level(), 0);

    script.fail_next("SQLSTATE[HY000]: MySQL server has gone away");
    conn.insert("INSERT INTO a VALUES (3)", &[]).await.unwrap();
    assert_eq!(connector.connects(), 2);
}

#[tokio::test]
async fn test_lost_connection_without_reconnector_is_a_query_error() {
    let (conn, script) = sqlite();
    script.fail_next("Lost connection to MySQL server during query");
    let error = conn
        .select("SELECT * FROM t WHERE a = ?", &[SqlValue::Int(3)])
        .await
        .unwrap_err();
    match error {
        Error::Query { sql, bindings, .. } => {
            assert_eq!(sql, "SELECT * FROM t WHERE a = ?");
            assert_eq!(bindings, vec![SqlValue::Int(3)]);
        }
        other => panic!("unexpected error {other:?}"),
    }

    conn.disconnect().await;
    assert!(matches!(conn.select("SELECT 1", &[]).await, Err(Error::Query { .. })));
    assert!(matches!(conn.reconnect().await, Err(Error::LostConnection(_))));
}

#[tokio::test]
async fn test_other_failures_are_not_retried() {
    let script = Script::new();
    let connector = Arc::new(ScriptedConnector::new(script.clone()));
    let conn = Connection::connect("main", ConnectionConfig::sqlite(":memory:"), connector.clone())
        .await
        .unwrap();
    script.fail_next("UNIQUE constraint failed: users.email");
    let error = conn.statement("INSERT", &[]).await.unwrap_err();
    assert!(error.to_string().contains("UNIQUE constraint failed"));
    assert_eq!(connector.connects(), 1);
}

#[tokio::test]
async fn test_set_connection_refused_inside_transaction() {
    let (conn, script) = sqlite();
    conn.begin_transaction().await.unwrap();
    let result = conn.set_connection(script.driver(Role::Write)).await;
    assert!(matches!(result, Err(Error::TransactionActive(1))));
    conn.rollback().await.unwrap();
    conn.set_connection(script.driver(Role::Write)).await.unwrap();
}

#[tokio::test]
async fn test_reads_use_write_driver_inside_transactions() {
    let script = Script::new();
    let conn = Connection::new(
        "split",
        ConnectionConfig::mysql("app"),
        script.driver(Role::Write),
        Some(script.driver(Role::Read)),
    )
    .unwrap();

    conn.table("users").get().await.unwrap();
    conn.table("users").insert(record! { "a" => 1 }).await.unwrap();
    conn.begin_transaction().await.unwrap();
    conn.table("users").get().await.unwrap();
    conn.commit().await.unwrap();

    let roles: Vec<Role> = script.state().seen.iter().map(|s| s.role).collect();
    assert_eq!(roles, vec![Role::Read, Role::Write, Role::Write]);
}

#[tokio::test]
async fn test_exists_and_aggregates_read_rows() {
    let (conn, script) = sqlite();
    script.push_rows(vec![row("exists", SqlValue::Int(1))]);
    script.push_rows(vec![row("aggregate", SqlValue::Int(42))]);
    assert!(conn.table("users").exists().await.unwrap());
    assert_eq!(conn.table("users").count().await.unwrap(), 42);
    assert_eq!(
        script.statements()[1],
        "SELECT COUNT(*) AS aggregate FROM \"users\""
    );
}

#[tokio::test]
async fn test_unknown_driver_is_rejected() {
    let script = Script::new();
    let result = Connection::new(
        "bad",
        ConnectionConfig::new("oracle", "x"),
        script.driver(Role::Write),
        None,
    );
    assert!(matches!(result, Err(Error::UnsupportedDriver(_))));
}
