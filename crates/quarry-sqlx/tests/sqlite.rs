//! End-to-end tests against an in-memory SQLite database.

use quarry_core::query::Direction;
use quarry_core::{record, Connection, ConnectionConfig, Error, SqlValue};

async fn users() -> Connection {
    let conn = quarry_sqlx::connect("test", ConnectionConfig::sqlite(":memory:"))
        .await
        .unwrap();
    conn.schema()
        .create("users", |table| {
            table.increments("id");
            table.string("email").unique();
            table.integer("votes").default(0);
            table.nullable_timestamps();
        })
        .await
        .unwrap();
    conn
}

#[tokio::test]
async fn test_create_insert_and_select() {
    let conn = users().await;
    assert!(conn.schema().has_table("users").await.unwrap());
    assert!(!conn.schema().has_table("posts").await.unwrap());
    assert_eq!(
        conn.schema().get_column_listing("users").await.unwrap(),
        vec!["id", "email", "votes", "created_at", "updated_at"]
    );

    let first = conn
        .table("users")
        .insert_get_id(record! { "email" => "a@example.com", "votes" => 3 }, None)
        .await
        .unwrap();
    let second = conn
        .table("users")
        .insert_get_id(record! { "email" => "b@example.com" }, None)
        .await
        .unwrap();
    assert_eq!((first, second), (1, 2));

    let rows = conn
        .table("users")
        .where_("votes", ">", 1)
        .order_by("id", Direction::Asc)
        .get()
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("email"), Some(&SqlValue::Text("a@example.com".into())));
    assert_eq!(rows[0].get("created_at"), Some(&SqlValue::Null));

    assert_eq!(conn.table("users").count().await.unwrap(), 2);
    assert_eq!(conn.table("users").sum("votes").await.unwrap(), SqlValue::Int(3));
}

#[tokio::test]
async fn test_unique_index_is_enforced() {
    let conn = users().await;
    conn.table("users")
        .insert(record! { "email" => "a@example.com" })
        .await
        .unwrap();
    let error = conn
        .table("users")
        .insert(record! { "email" => "a@example.com" })
        .await
        .unwrap_err();
    assert!(matches!(error, Error::Query { .. }));
}

#[tokio::test]
async fn test_rolled_back_transaction_leaves_no_rows() {
    let conn = users().await;
    let result = conn
        .transaction(|c| {
            Box::pin(async move {
                c.table("users")
                    .insert(record! { "email" => "gone@example.com" })
                    .await?;
                Err::<(), _>(Error::invalid("abort"))
            })
        })
        .await;
    assert!(result.is_err());
    assert_eq!(conn.table("users").count().await.unwrap(), 0);

    conn.transaction(|c| {
        Box::pin(async move {
            c.table("users")
                .insert(record! { "email" => "kept@example.com" })
                .await
        })
    })
    .await
    .unwrap();
    assert_eq!(conn.table("users").count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_alter_table_keeps_data() {
    let conn = users().await;
    conn.table("users")
        .insert(record! { "email" => "a@example.com", "votes" => 5 })
        .await
        .unwrap();

    conn.schema()
        .table("users", |table| {
            table.string("name").nullable();
        })
        .await
        .unwrap();
    assert!(conn.schema().has_column("users", "name").await.unwrap());

    conn.schema()
        .table("users", |table| {
            table.rename_column("name", "nickname");
        })
        .await
        .unwrap();
    assert!(conn.schema().has_column("users", "nickname").await.unwrap());

    conn.schema()
        .table("users", |table| {
            table.drop_column(["votes"]);
        })
        .await
        .unwrap();
    assert!(!conn.schema().has_column("users", "votes").await.unwrap());
    assert!(conn.schema().has_column("users", "email").await.unwrap());
    assert_eq!(conn.table("users").count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_update_delete_and_truncate() {
    let conn = users().await;
    conn.table("users")
        .insert_many(vec![
            record! { "email" => "a@example.com", "votes" => 1 },
            record! { "email" => "b@example.com", "votes" => 2 },
        ])
        .await
        .unwrap();

    let changed = conn
        .table("users")
        .where_eq("email", "a@example.com")
        .increment("votes", 10)
        .await
        .unwrap();
    assert_eq!(changed, 1);
    let votes = conn
        .table("users")
        .where_eq("email", "a@example.com")
        .pluck("votes")
        .await
        .unwrap();
    assert_eq!(votes, Some(SqlValue::Int(11)));

    assert_eq!(conn.table("users").where_eq("votes", 2).delete().await.unwrap(), 1);
    conn.table("users").truncate().await.unwrap();
    assert_eq!(conn.table("users").count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_drop_if_exists() {
    let conn = users().await;
    conn.schema().drop_if_exists("users").await.unwrap();
    conn.schema().drop_if_exists("users").await.unwrap();
    assert!(!conn.schema().has_table("users").await.unwrap());
}
