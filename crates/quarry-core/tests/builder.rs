//! Query builder execution through a connection.

mod common;

use common::{connection, row, sqlite};
use futures::TryStreamExt;
use quarry_core::query::Direction;
use quarry_core::{record, ConnectionConfig, Row, SqlValue};

fn ids(values: &[i64]) -> Vec<Row> {
    values.iter().map(|id| row("id", SqlValue::Int(*id))).collect()
}

#[tokio::test]
async fn test_where_in_binds_each_value() {
    let (conn, script) = sqlite();
    conn.table("users").where_in("id", [1, 2, 3]).get().await.unwrap();
    conn.table("users")
        .where_in("id", Vec::<i64>::new())
        .get()
        .await
        .unwrap();

    let state = script.state();
    assert_eq!(state.seen[0].sql, "SELECT * FROM \"users\" WHERE \"id\" IN (?, ?, ?)");
    assert_eq!(
        state.seen[0].bindings,
        vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3)]
    );
    assert_eq!(state.seen[1].sql, "SELECT * FROM \"users\" WHERE 0 = 1");
    assert!(state.seen[1].bindings.is_empty());
}

#[tokio::test]
async fn test_multi_row_insert_per_dialect() {
    let rows = || vec![record! { "a" => 1, "b" => 2 }, record! { "a" => 3, "b" => 4 }];
    let expected = vec![
        SqlValue::Int(1),
        SqlValue::Int(2),
        SqlValue::Int(3),
        SqlValue::Int(4),
    ];

    let (conn, script) = sqlite();
    conn.table("t").insert_many(rows()).await.unwrap();
    let seen = script.state().seen[0].clone();
    assert_eq!(
        seen.sql,
        "INSERT INTO \"t\" (\"a\", \"b\") SELECT ? AS \"a\", ? AS \"b\" \
         UNION ALL SELECT ? AS \"a\", ? AS \"b\""
    );
    assert_eq!(seen.bindings, expected);

    let (conn, script) = connection(ConnectionConfig::mysql("app"));
    conn.table("t").insert_many(rows()).await.unwrap();
    assert_eq!(
        script.statements(),
        vec!["INSERT INTO `t` (`a`, `b`) VALUES (?, ?), (?, ?)"]
    );

    let (conn, script) = connection(ConnectionConfig::postgres("app"));
    conn.table("t").insert_many(rows()).await.unwrap();
    assert_eq!(
        script.statements(),
        vec!["INSERT INTO \"t\" (\"a\", \"b\") VALUES (%s, %s), (%s, %s)"]
    );
}

#[tokio::test]
async fn test_union_with_raw_orders_binds_in_marker_order() {
    let expected = vec![
        SqlValue::Int(1),
        SqlValue::Int(2),
        SqlValue::Int(3),
        SqlValue::Int(4),
    ];

    let (conn, script) = connection(ConnectionConfig::mysql("app"));
    conn.table("a")
        .where_eq("x", 1)
        .order_by_raw("FIELD(id, ?)", vec![SqlValue::Int(2)])
        .union(conn.table("b").where_eq("y", 3))
        .order_by_raw("FIELD(id, ?)", vec![SqlValue::Int(4)])
        .get()
        .await
        .unwrap();
    let seen = script.state().seen[0].clone();
    assert_eq!(
        seen.sql,
        "(SELECT * FROM `a` WHERE `x` = ? ORDER BY FIELD(id, ?)) \
         UNION (SELECT * FROM `b` WHERE `y` = ?) ORDER BY FIELD(id, ?)"
    );
    assert_eq!(seen.bindings, expected);

    let (conn, script) = connection(ConnectionConfig::postgres("app"));
    conn.table("a")
        .where_eq("x", 1)
        .order_by_raw("position(%s in name)", vec![SqlValue::Int(2)])
        .union(conn.table("b").where_eq("y", 3))
        .order_by_raw("position(%s in name)", vec![SqlValue::Int(4)])
        .get()
        .await
        .unwrap();
    let seen = script.state().seen[0].clone();
    assert_eq!(
        seen.sql,
        "SELECT * FROM \"a\" WHERE \"x\" = %s ORDER BY position(%s in name) \
         UNION SELECT * FROM \"b\" WHERE \"y\" = %s ORDER BY position(%s in name)"
    );
    assert_eq!(seen.bindings, expected);
}

#[tokio::test]
async fn test_postgres_insert_get_id_reads_returning_row() {
    let (conn, script) = connection(ConnectionConfig::postgres("app"));
    script.push_rows(vec![row("id", SqlValue::Int(41))]);
    let id = conn
        .table("users")
        .insert_get_id(record! { "email" => "a@b.c" }, None)
        .await
        .unwrap();
    assert_eq!(id, 41);
    assert_eq!(
        script.statements(),
        vec!["INSERT INTO \"users\" (\"email\") VALUES (%s) RETURNING \"id\""]
    );
}

#[tokio::test]
async fn test_update_binds_values_before_wheres() {
    let (conn, script) = sqlite();
    conn.table("users")
        .where_eq("id", 9)
        .update(record! { "name" => "bob" })
        .await
        .unwrap();
    let seen = script.state().seen[0].clone();
    assert_eq!(seen.sql, "UPDATE \"users\" SET \"name\" = ? WHERE \"id\" = ?");
    assert_eq!(
        seen.bindings,
        vec![SqlValue::Text("bob".into()), SqlValue::Int(9)]
    );
}

#[tokio::test]
async fn test_paginate_restores_window() {
    let (conn, script) = sqlite();
    script.push_rows(vec![row("aggregate", SqlValue::Int(5))]);
    script.push_rows(ids(&[3, 4]));

    let page = conn
        .table("users")
        .order_by("id", Direction::Asc)
        .paginate(2, 2)
        .await
        .unwrap();

    assert_eq!(page.total, 5);
    assert_eq!(page.last_page, 3);
    assert_eq!(page.items.len(), 2);
    assert!(page.has_more_pages());
    assert_eq!(
        script.statements(),
        vec![
            "SELECT COUNT(*) AS aggregate FROM \"users\"",
            "SELECT * FROM \"users\" ORDER BY \"id\" ASC LIMIT 2 OFFSET 2",
        ]
    );
}

#[tokio::test]
async fn test_count_for_pagination_keeps_ordering() {
    let (conn, script) = sqlite();
    script.push_rows(vec![row("aggregate", SqlValue::Int(3))]);
    let mut builder = conn
        .table("users")
        .order_by("name", Direction::Desc)
        .limit(10)
        .offset(20);
    let before = builder.to_sql().unwrap();
    assert_eq!(builder.get_count_for_pagination().await.unwrap(), 3);
    assert_eq!(builder.to_sql().unwrap(), before);
    assert_eq!(script.statements()[0], "SELECT COUNT(*) AS aggregate FROM \"users\"");
}

#[tokio::test]
async fn test_chunk_stops_on_short_page() {
    let (conn, script) = sqlite();
    script.push_rows(ids(&[1, 2]));
    script.push_rows(ids(&[3]));

    let chunks: Vec<Vec<Row>> = conn
        .table("users")
        .order_by("id", Direction::Asc)
        .chunk(2)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[1].len(), 1);
    assert_eq!(script.statements().len(), 2);
}

#[tokio::test]
async fn test_first_and_lists() {
    let (conn, script) = sqlite();
    script.push_rows(ids(&[7]));
    script.push_rows(ids(&[1, 2]));

    let first = conn.table("users").first().await.unwrap().unwrap();
    assert_eq!(first.get("id"), Some(&SqlValue::Int(7)));
    let values = conn.table("users").lists("id").await.unwrap();
    assert_eq!(values, vec![SqlValue::Int(1), SqlValue::Int(2)]);
    assert_eq!(script.statements()[0], "SELECT * FROM \"users\" LIMIT 1");
}

#[tokio::test]
async fn test_truncate_and_increment() {
    let (conn, script) = sqlite();
    conn.table("users").truncate().await.unwrap();
    conn.table("users")
        .where_eq("id", 1)
        .increment("votes", 5)
        .await
        .unwrap();

    let statements = script.statements();
    assert_eq!(statements[0], "DELETE FROM sqlite_sequence WHERE name = ?");
    assert_eq!(statements[1], "DELETE FROM \"users\"");
    assert_eq!(
        statements[2],
        "UPDATE \"users\" SET \"votes\" = \"votes\" + 5 WHERE \"id\" = ?"
    );
}
