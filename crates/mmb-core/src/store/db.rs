use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, types::Value, OptionalExtension};

use crate::{store::pool::Pool, Result};

const SCHEMA_SQL: &str = include_str!("schema.sql");

const USER_COLUMNS: &str = "id, balance, paid_requests, is_premium, premium_since, is_admin, last_model";

/// One stored row of the `Users` table.
///
/// `remaining_requests` is deliberately absent: the quota counter is
/// transient and re-derived from the plan limits on every load.
#[derive(Clone, Debug, PartialEq)]
pub struct UserRow {
    pub id: i64,
    pub balance: f64,
    pub paid_requests: i64,
    pub is_premium: bool,
    pub premium_since: Option<DateTime<Utc>>,
    pub is_admin: bool,
    pub last_model: Option<String>,
}

impl UserRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let premium_since: Option<String> = row.get(4)?;
        let premium_since = premium_since
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            4,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })
            })
            .transpose()?;

        Ok(Self {
            id: row.get(0)?,
            balance: row.get(1)?,
            paid_requests: row.get(2)?,
            is_premium: row.get(3)?,
            premium_since,
            is_admin: row.get(5)?,
            last_model: row.get(6)?,
        })
    }
}

/// Data-access layer: one parameterized statement per pooled unit of work.
///
/// Every public method is async and offloads the blocking SQLite call to
/// `spawn_blocking` so storage never stalls the runtime.
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl Database {
    /// Wraps the pool and runs idempotent schema setup.
    pub fn new(pool: Pool) -> Result<Self> {
        let conn = pool.acquire()?;
        conn.execute_batch(SCHEMA_SQL)?;
        conn.commit()?;
        Ok(Self { pool })
    }

    /// Executes exactly one parameterized statement and returns all result
    /// rows in order. Variable data must go through `params`, never into the
    /// statement text.
    pub async fn execute(&self, sql: &'static str, params: Vec<Value>) -> Result<Vec<Vec<Value>>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Vec<Value>>> {
            let conn = pool.acquire()?;
            let rows = {
                let mut stmt = conn.prepare(sql)?;
                let columns = stmt.column_count();
                let mut rows = stmt.query(params_from_iter(params))?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    let mut tuple = Vec::with_capacity(columns);
                    for i in 0..columns {
                        tuple.push(row.get::<_, Value>(i)?);
                    }
                    out.push(tuple);
                }
                out
            };
            conn.commit()?;
            Ok(rows)
        })
        .await?
    }

    /// Inserts a row with default field values. Fails with a constraint
    /// violation if the row already exists; callers must confirm absence
    /// first.
    pub async fn create_user(&self, id: i64) -> Result<()> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = pool.acquire()?;
            conn.execute("INSERT INTO Users (id) VALUES (?1)", params![id])?;
            conn.commit()
        })
        .await?
    }

    /// Never an error for "not found".
    pub async fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<UserRow>> {
            let conn = pool.acquire()?;
            let row = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM Users WHERE id = ?1"),
                    params![id],
                    UserRow::from_row,
                )
                .optional()?;
            conn.commit()?;
            Ok(row)
        })
        .await?
    }

    /// Atomic insert-or-replace of all persisted columns, keyed by id.
    pub async fn upsert_user(&self, row: UserRow) -> Result<()> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = pool.acquire()?;
            conn.execute(
                "INSERT OR REPLACE INTO Users \
                 (id, balance, paid_requests, is_premium, premium_since, is_admin, last_model) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    row.id,
                    row.balance,
                    row.paid_requests,
                    row.is_premium,
                    row.premium_since.map(|dt| dt.to_rfc3339()),
                    row.is_admin,
                    row.last_model,
                ],
            )?;
            conn.commit()
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_db(capacity: usize) -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let pool = Pool::open(dir.path().join("users.db"), capacity).unwrap();
        (dir, Database::new(pool).unwrap())
    }

    #[tokio::test]
    async fn missing_user_is_none_not_an_error() {
        let (_dir, db) = scratch_db(1);
        assert_eq!(db.get_user(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn create_then_get_yields_default_row() {
        let (_dir, db) = scratch_db(1);
        db.create_user(42).await.unwrap();

        let row = db.get_user(42).await.unwrap().unwrap();
        assert_eq!(row.id, 42);
        assert_eq!(row.balance, 0.0);
        assert_eq!(row.paid_requests, 0);
        assert!(!row.is_premium);
        assert_eq!(row.premium_since, None);
        assert!(!row.is_admin);
        assert_eq!(row.last_model, None);
    }

    #[tokio::test]
    async fn duplicate_create_surfaces_constraint_violation() {
        let (_dir, db) = scratch_db(1);
        db.create_user(7).await.unwrap();

        let err = db.create_user(7).await.unwrap_err();
        assert!(matches!(err, crate::Error::Storage(_)), "got: {err}");
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let (_dir, db) = scratch_db(2);
        db.create_user(5).await.unwrap();

        let mut row = db.get_user(5).await.unwrap().unwrap();
        row.balance = 12.5;
        row.is_premium = true;
        row.premium_since = Some(Utc::now());
        row.last_model = Some("LLaMA-70b".to_string());

        db.upsert_user(row.clone()).await.unwrap();
        let loaded = db.get_user(5).await.unwrap().unwrap();

        db.upsert_user(loaded.clone()).await.unwrap();
        let reloaded = db.get_user(5).await.unwrap().unwrap();

        assert_eq!(loaded, reloaded);
        assert_eq!(loaded.balance, 12.5);
        assert!(loaded.is_premium);
        assert_eq!(loaded.last_model.as_deref(), Some("LLaMA-70b"));
    }

    #[tokio::test]
    async fn execute_returns_ordered_rows() {
        let (_dir, db) = scratch_db(1);
        for id in [3_i64, 1, 2] {
            db.create_user(id).await.unwrap();
        }

        let rows = db
            .execute("SELECT id FROM Users WHERE id > ?1 ORDER BY id", vec![Value::Integer(1)])
            .await
            .unwrap();

        let ids: Vec<_> = rows
            .iter()
            .map(|tuple| match tuple[0] {
                Value::Integer(v) => v,
                ref other => panic!("unexpected value: {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec![2, 3]);
    }
}
