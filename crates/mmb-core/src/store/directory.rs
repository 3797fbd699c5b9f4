use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, RwLock};

use crate::{
    errors::Error,
    store::{
        db::Database,
        profile::{PlanLimits, UserProfile},
    },
    Result,
};

/// Process-wide cache + coordinator mapping user id to profile entity.
///
/// The single source of truth for "the" `UserProfile` per id: lazy
/// load-or-create with per-id single-flight, so N simultaneous first contacts
/// with the same id (duplicate delivery, multi-device) issue at most one row
/// creation, while first touches for unrelated ids proceed fully in parallel.
///
/// No eviction: once a slot becomes resident it stays resident for the life
/// of the process.
pub struct UserDirectory {
    db: Database,
    limits: PlanLimits,
    users: RwLock<HashMap<i64, Arc<UserProfile>>>,
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl UserDirectory {
    pub fn new(db: Database, limits: PlanLimits) -> Self {
        Self {
            db,
            limits,
            users: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the resident entity for `id`, loading or creating it on first
    /// touch. Never returns a partially initialized entity: the cache is only
    /// updated after a fully successful load.
    pub async fn get_or_create(&self, id: i64) -> Result<Arc<UserProfile>> {
        // Fast path: resident entity, no per-id serialization, no I/O.
        if let Some(user) = self.users.read().await.get(&id) {
            return Ok(user.clone());
        }

        let slot = self.lock_for(id).await;
        let _guard = slot.lock().await;

        // Double-check: another caller may have finished the slow path while
        // we waited for the id lock.
        if let Some(user) = self.users.read().await.get(&id) {
            return Ok(user.clone());
        }

        let row = match self.db.get_user(id).await? {
            Some(row) => row,
            None => {
                self.db.create_user(id).await?;
                tracing::debug!(user_id = id, "created user row");
                // Re-query rather than trusting our insert's input values, so
                // the cached entity reflects exactly what storage persisted.
                self.db.get_user(id).await?.ok_or_else(|| {
                    Error::Inconsistent(format!("user {id} missing immediately after insert"))
                })?
            }
        };

        let user = Arc::new(UserProfile::from_row(self.db.clone(), self.limits, row));
        self.users.write().await.insert(id, user.clone());
        Ok(user)
    }

    /// One mutex per id, created on first reference. Locks for different ids
    /// never block each other.
    async fn lock_for(&self, id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::pool::Pool;
    use rusqlite::types::Value;

    const LIMITS: PlanLimits = PlanLimits {
        free: 5,
        premium: 100,
    };

    fn scratch_db(capacity: usize) -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let pool = Pool::open(dir.path().join("users.db"), capacity).unwrap();
        (dir, Database::new(pool).unwrap())
    }

    async fn user_count(db: &Database) -> i64 {
        let rows = db
            .execute("SELECT COUNT(*) FROM Users", vec![])
            .await
            .unwrap();
        match rows[0][0] {
            Value::Integer(n) => n,
            ref other => panic!("unexpected value: {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_first_touch_creates_exactly_one_row() {
        let (_dir, db) = scratch_db(2);
        let directory = Arc::new(UserDirectory::new(db.clone(), LIMITS));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let directory = directory.clone();
            handles.push(tokio::spawn(
                async move { directory.get_or_create(42).await },
            ));
        }

        let mut users = Vec::new();
        for h in handles {
            // Every caller succeeds: a second insert attempt would have
            // surfaced as a constraint violation.
            users.push(h.await.unwrap().unwrap());
        }

        assert_eq!(user_count(&db).await, 1);

        let first = users[0].snapshot().await;
        assert_eq!(first.id, 42);
        for user in &users {
            assert!(Arc::ptr_eq(&users[0], user));
            assert_eq!(user.snapshot().await, first);
        }
    }

    #[tokio::test]
    async fn capacity_one_pool_still_single_creates() {
        let (_dir, db) = scratch_db(1);
        let directory = Arc::new(UserDirectory::new(db.clone(), LIMITS));

        let (a, b) = tokio::join!(
            {
                let d = directory.clone();
                async move { d.get_or_create(42).await }
            },
            {
                let d = directory.clone();
                async move { d.get_or_create(42).await }
            },
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(user_count(&db).await, 1);
        assert!(Arc::ptr_eq(&a, &b));

        let snap = a.snapshot().await;
        assert_eq!(snap.id, 42);
        assert_eq!(snap.balance, 0.0);
        assert!(!snap.is_premium);
        assert_eq!(snap.remaining_requests, LIMITS.free);
    }

    #[tokio::test]
    async fn cache_converges_to_one_entity_per_id() {
        let (_dir, db) = scratch_db(1);
        let directory = UserDirectory::new(db, LIMITS);

        let first = directory.get_or_create(7).await.unwrap();
        let second = directory.get_or_create(7).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other = directory.get_or_create(8).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[tokio::test]
    async fn quota_resets_on_reload_because_it_is_not_persisted() {
        let (_dir, db) = scratch_db(1);

        {
            let directory = UserDirectory::new(db.clone(), LIMITS);
            let user = directory.get_or_create(7).await.unwrap();
            while user.can_make_request().await {}
            assert_eq!(user.snapshot().await.remaining_requests, 0);
            user.save().await.unwrap();
        }

        // Fresh cache over the same file: the counter starts at the plan
        // limit again.
        let directory = UserDirectory::new(db, LIMITS);
        let user = directory.get_or_create(7).await.unwrap();
        assert_eq!(user.snapshot().await.remaining_requests, LIMITS.free);
    }

    #[tokio::test]
    async fn premium_survives_restart_and_rederives_limit() {
        let (_dir, db) = scratch_db(1);

        {
            let directory = UserDirectory::new(db.clone(), LIMITS);
            let user = directory.get_or_create(7).await.unwrap();
            user.set_premium(true).await;
            user.save().await.unwrap();
        }

        let directory = UserDirectory::new(db, LIMITS);
        let user = directory.get_or_create(7).await.unwrap();
        let snap = user.snapshot().await;
        assert!(snap.is_premium);
        assert!(snap.premium_since.is_some());
        assert_eq!(snap.remaining_requests, LIMITS.premium);
    }

    #[tokio::test]
    async fn existing_row_is_loaded_not_recreated() {
        let (_dir, db) = scratch_db(1);
        db.create_user(3).await.unwrap();

        let directory = UserDirectory::new(db.clone(), LIMITS);
        let user = directory.get_or_create(3).await.unwrap();
        assert_eq!(user.id(), 3);
        assert_eq!(user_count(&db).await, 1);
    }
}
