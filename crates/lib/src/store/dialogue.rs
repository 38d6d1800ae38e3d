//! The `line_dialogue` table: one row per inbound text message.
//!
//! Rows are unique on (user_id, message, date, group_id); re-inserting the same message is
//! reported as [`InsertOutcome::Duplicate`]. Column names passed to the generic helpers are
//! checked against the table's columns and all values are bound as parameters.

use crate::channels::InboundMessage;
use crate::store::pool::{ConnectionPool, PoolOptions};
use crate::store::{InsertOutcome, MessageStore, StoreError};
use async_trait::async_trait;
use base64::Engine;
use chrono::FixedOffset;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, params_from_iter, ErrorCode, Transaction};
use serde::Serialize;
use std::path::Path;

pub const TABLE: &str = "line_dialogue";

const COLUMNS: &[&str] = &["id", "user_id", "message", "date", "group_id"];

const SCHEMA: &str = "PRAGMA journal_mode=WAL;
     CREATE TABLE IF NOT EXISTS line_dialogue (
         id       INTEGER PRIMARY KEY AUTOINCREMENT,
         user_id  TEXT NOT NULL,
         message  TEXT NOT NULL,
         date     TEXT NOT NULL,
         group_id TEXT NOT NULL DEFAULT '',
         UNIQUE (user_id, message, date, group_id)
     );
     CREATE INDEX IF NOT EXISTS idx_line_dialogue_user ON line_dialogue(user_id);";

const INSERT_SQL: &str =
    "INSERT INTO line_dialogue (user_id, message, date, group_id) VALUES (?1, ?2, ?3, ?4)";

/// A generic query result row: column name to JSON value, in select order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Values written for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueRecord {
    pub user_id: String,
    pub message: String,
    /// Formatted `%Y-%m-%d %H:%M:%S`.
    pub date: String,
    /// Empty for one-to-one chats.
    pub group_id: String,
}

impl DialogueRecord {
    pub fn from_message(msg: &InboundMessage, offset: FixedOffset) -> Self {
        Self {
            user_id: msg.sender_id.clone(),
            message: msg.text.clone(),
            date: msg.formatted_date(offset),
            group_id: msg.conversation_id.clone(),
        }
    }
}

/// A stored row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredDialogue {
    pub id: i64,
    pub user_id: String,
    pub message: String,
    pub date: String,
    pub group_id: String,
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn check_column(name: &str) -> Result<(), StoreError> {
    if COLUMNS.contains(&name) {
        Ok(())
    } else {
        Err(StoreError::UnknownColumn(name.to_string()))
    }
}

/// `a = ?N AND b = ?N+1 ...` starting at placeholder `first`.
fn where_clause(filter: &[(String, Value)], first: usize) -> Result<String, StoreError> {
    let mut parts = Vec::with_capacity(filter.len());
    for (i, (col, _)) in filter.iter().enumerate() {
        check_column(col)?;
        parts.push(format!("{} = ?{}", col, first + i));
    }
    Ok(parts.join(" AND "))
}

fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => i.into(),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned().into(),
        ValueRef::Blob(b) => base64::engine::general_purpose::STANDARD.encode(b).into(),
    }
}

fn insert_record(
    conn: &rusqlite::Connection,
    record: &DialogueRecord,
) -> Result<InsertOutcome, StoreError> {
    match conn.execute(
        INSERT_SQL,
        params![record.user_id, record.message, record.date, record.group_id],
    ) {
        Ok(_) => Ok(InsertOutcome::Inserted(conn.last_insert_rowid())),
        Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
        Err(e) => Err(e.into()),
    }
}

/// Dialogue table access over a [`ConnectionPool`].
#[derive(Clone)]
pub struct DialogueStore {
    pool: ConnectionPool,
}

impl DialogueStore {
    /// Open (or create) the database at `path` and ensure the table exists.
    pub fn open(path: impl AsRef<Path>, options: PoolOptions) -> Result<Self, StoreError> {
        let pool = ConnectionPool::open(path, options, SCHEMA)?;
        Ok(Self { pool })
    }

    /// Insert one row; an identical existing row yields `Duplicate`.
    pub async fn insert_message(
        &self,
        record: DialogueRecord,
    ) -> Result<InsertOutcome, StoreError> {
        self.pool.run(move |conn| insert_record(conn, &record)).await
    }

    /// Insert several rows in one transaction, skipping duplicates. Returns the number stored.
    pub async fn insert_many(&self, records: Vec<DialogueRecord>) -> Result<usize, StoreError> {
        self.transaction(move |tx| {
            let mut stored = 0;
            for record in &records {
                if let InsertOutcome::Inserted(_) = insert_record(tx, record)? {
                    stored += 1;
                }
            }
            Ok(stored)
        })
        .await
    }

    /// Most recent rows for a sender, newest first.
    pub async fn recent_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredDialogue>, StoreError> {
        let user_id = user_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.pool
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, message, date, group_id FROM line_dialogue
                     WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![user_id, limit], |row| {
                    Ok(StoredDialogue {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        message: row.get(2)?,
                        date: row.get(3)?,
                        group_id: row.get(4)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        self.pool
            .run(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM line_dialogue", [], |r| r.get(0))?)
            })
            .await
    }

    /// Run a parametrized statement; returns affected rows.
    pub async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<usize, StoreError> {
        let sql = sql.to_string();
        self.pool
            .run(move |conn| Ok(conn.execute(&sql, params_from_iter(params.iter()))?))
            .await
    }

    /// Run a parametrized query and return every row.
    pub async fn query_all(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, StoreError> {
        let sql = sql.to_string();
        self.pool
            .run(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let names: Vec<String> =
                    stmt.column_names().into_iter().map(String::from).collect();
                let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
                    let mut out = Row::new();
                    for (i, name) in names.iter().enumerate() {
                        out.insert(name.clone(), value_to_json(row.get_ref(i)?));
                    }
                    Ok(out)
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
    }

    /// Like [`query_all`](Self::query_all) but returns only the first row.
    pub async fn query_one(
        &self,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Option<Row>, StoreError> {
        Ok(self.query_all(sql, params).await?.into_iter().next())
    }

    /// `UPDATE line_dialogue SET ... WHERE ...`; an empty filter updates every row.
    pub async fn update(
        &self,
        set: Vec<(String, Value)>,
        filter: Vec<(String, Value)>,
    ) -> Result<usize, StoreError> {
        if set.is_empty() {
            return Err(StoreError::EmptyUpdate);
        }
        let mut assignments = Vec::with_capacity(set.len());
        for (i, (col, _)) in set.iter().enumerate() {
            check_column(col)?;
            assignments.push(format!("{} = ?{}", col, i + 1));
        }
        let mut sql = format!("UPDATE {} SET {}", TABLE, assignments.join(", "));
        if !filter.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause(&filter, set.len() + 1)?);
        }
        let params: Vec<Value> = set.into_iter().chain(filter).map(|(_, v)| v).collect();
        self.execute(&sql, params).await
    }

    /// `DELETE FROM line_dialogue WHERE ...`; at least one filter column is required.
    pub async fn delete(&self, filter: Vec<(String, Value)>) -> Result<usize, StoreError> {
        if filter.is_empty() {
            return Err(StoreError::EmptyFilter);
        }
        let sql = format!("DELETE FROM {} WHERE {}", TABLE, where_clause(&filter, 1)?);
        let params: Vec<Value> = filter.into_iter().map(|(_, v)| v).collect();
        self.execute(&sql, params).await
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
    pub async fn transaction<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        self.pool
            .run(move |conn| {
                let tx = conn.transaction()?;
                match f(&tx) {
                    Ok(v) => {
                        tx.commit()?;
                        Ok(v)
                    }
                    Err(e) => {
                        if let Err(rb) = tx.rollback() {
                            log::warn!("store: rollback failed: {}", rb);
                        }
                        Err(e)
                    }
                }
            })
            .await
    }
}

#[async_trait]
impl MessageStore for DialogueStore {
    async fn record(&self, record: DialogueRecord) -> Result<InsertOutcome, StoreError> {
        self.insert_message(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_db() -> PathBuf {
        std::env::temp_dir()
            .join(format!("marquee-store-test-{}", uuid::Uuid::new_v4()))
            .join("dialogue.db")
    }

    fn open() -> DialogueStore {
        DialogueStore::open(temp_db(), PoolOptions::default()).unwrap()
    }

    fn record(user: &str, text: &str, date: &str) -> DialogueRecord {
        DialogueRecord {
            user_id: user.to_string(),
            message: text.to_string(),
            date: date.to_string(),
            group_id: String::new(),
        }
    }

    #[tokio::test]
    async fn second_identical_insert_is_duplicate() {
        let store = open();
        let r = record("U1", "hello", "2023-05-31 17:48:51");
        let first = store.insert_message(r.clone()).await.unwrap();
        assert!(matches!(first, InsertOutcome::Inserted(_)));
        assert_eq!(store.insert_message(r).await.unwrap(), InsertOutcome::Duplicate);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn same_text_in_other_group_is_a_new_row() {
        let store = open();
        let r = record("U1", "hello", "2023-05-31 17:48:51");
        let mut in_group = r.clone();
        in_group.group_id = "C1".to_string();
        store.insert_message(r).await.unwrap();
        let outcome = store.insert_message(in_group).await.unwrap();
        assert!(matches!(outcome, InsertOutcome::Inserted(_)));
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn insert_many_skips_duplicates() {
        let store = open();
        store
            .insert_message(record("U1", "a", "2023-01-01 00:00:00"))
            .await
            .unwrap();
        let stored = store
            .insert_many(vec![
                record("U1", "a", "2023-01-01 00:00:00"),
                record("U1", "b", "2023-01-01 00:00:01"),
                record("U2", "c", "2023-01-01 00:00:02"),
            ])
            .await
            .unwrap();
        assert_eq!(stored, 2);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn recent_for_user_is_newest_first_and_limited() {
        let store = open();
        for i in 0..5 {
            store
                .insert_message(record("U1", &format!("m{}", i), "2023-01-01 00:00:00"))
                .await
                .unwrap();
        }
        store
            .insert_message(record("U2", "other", "2023-01-01 00:00:00"))
            .await
            .unwrap();
        let rows = store.recent_for_user("U1", 3).await.unwrap();
        let texts: Vec<_> = rows.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(texts, vec!["m4", "m3", "m2"]);
    }

    #[tokio::test]
    async fn update_and_query_one_use_bound_values() {
        let store = open();
        store
            .insert_message(record("U1", "it's", "2023-01-01 00:00:00"))
            .await
            .unwrap();
        let changed = store
            .update(
                vec![("group_id".to_string(), Value::Text("C'9".to_string()))],
                vec![("user_id".to_string(), Value::Text("U1".to_string()))],
            )
            .await
            .unwrap();
        assert_eq!(changed, 1);
        let row = store
            .query_one(
                "SELECT message, group_id FROM line_dialogue WHERE user_id = ?1",
                vec![Value::Text("U1".to_string())],
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["message"], "it's");
        assert_eq!(row["group_id"], "C'9");
    }

    #[tokio::test]
    async fn unknown_columns_are_rejected() {
        let store = open();
        let err = store
            .update(
                vec![("message; DROP TABLE line_dialogue".to_string(), Value::Null)],
                vec![],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn(_)));
        assert!(matches!(store.delete(vec![]).await.unwrap_err(), StoreError::EmptyFilter));
    }

    #[tokio::test]
    async fn delete_by_filter() {
        let store = open();
        store
            .insert_message(record("U1", "a", "2023-01-01 00:00:00"))
            .await
            .unwrap();
        store
            .insert_message(record("U2", "b", "2023-01-01 00:00:00"))
            .await
            .unwrap();
        let removed = store
            .delete(vec![("user_id".to_string(), Value::Text("U1".to_string()))])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_transaction_rolls_back() {
        let store = open();
        let err = store
            .transaction(|tx| {
                insert_record(tx, &record("U1", "a", "2023-01-01 00:00:00"))?;
                Err::<(), _>(StoreError::EmptyUpdate)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::EmptyUpdate));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stored_rows_serialize_by_column_name() {
        let store = open();
        let mut r = record("U1", "hello", "2023-05-31 17:48:51");
        r.group_id = "C1".to_string();
        store.insert_message(r).await.unwrap();
        let rows = store.recent_for_user("U1", 1).await.unwrap();
        let json = serde_json::to_value(&rows).unwrap();
        assert_eq!(
            json[0],
            serde_json::json!({
                "id": rows[0].id,
                "user_id": "U1",
                "message": "hello",
                "date": "2023-05-31 17:48:51",
                "group_id": "C1"
            })
        );
    }

    #[tokio::test]
    async fn query_all_maps_column_types() {
        let store = open();
        let rows = store
            .query_all("SELECT 1 AS n, 2.5 AS f, 'x' AS s, NULL AS z", vec![])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["n"], 1);
        assert_eq!(rows[0]["f"], 2.5);
        assert_eq!(rows[0]["s"], "x");
        assert!(rows[0]["z"].is_null());
    }
}
