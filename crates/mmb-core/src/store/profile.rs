use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    store::db::{Database, UserRow},
    Result,
};

/// Per-plan request limits, supplied by configuration.
#[derive(Clone, Copy, Debug)]
pub struct PlanLimits {
    pub free: i64,
    pub premium: i64,
}

impl PlanLimits {
    pub fn for_plan(&self, is_premium: bool) -> i64 {
        if is_premium {
            self.premium
        } else {
            self.free
        }
    }
}

#[derive(Clone, Debug)]
struct ProfileState {
    balance: f64,
    paid_requests: i64,
    is_premium: bool,
    premium_since: Option<DateTime<Utc>>,
    is_admin: bool,
    last_model: Option<String>,
    /// Transient: derived from the plan on load, never persisted.
    remaining_requests: i64,
}

/// Consistent copy of a profile for rendering and tests.
#[derive(Clone, Debug, PartialEq)]
pub struct ProfileSnapshot {
    pub id: i64,
    pub balance: f64,
    pub paid_requests: i64,
    pub is_premium: bool,
    pub premium_since: Option<DateTime<Utc>>,
    pub is_admin: bool,
    pub last_model: Option<String>,
    pub remaining_requests: i64,
}

/// In-memory representation of one user's quota/billing/model state.
///
/// Shared via `Arc` by every task touching the same user; all mutation goes
/// through the internal mutex. Field changes are in-memory only until an
/// explicit [`UserProfile::save`].
pub struct UserProfile {
    id: i64,
    db: Database,
    limits: PlanLimits,
    state: Mutex<ProfileState>,
}

impl UserProfile {
    /// Reconstructs the entity from a stored row. The quota counter starts at
    /// the plan's current limit regardless of any depletion recorded by a
    /// previous in-memory instance.
    pub fn from_row(db: Database, limits: PlanLimits, row: UserRow) -> Self {
        let remaining_requests = limits.for_plan(row.is_premium);
        Self {
            id: row.id,
            db,
            limits,
            state: Mutex::new(ProfileState {
                balance: row.balance,
                paid_requests: row.paid_requests,
                is_premium: row.is_premium,
                premium_since: row.premium_since,
                is_admin: row.is_admin,
                last_model: row.last_model,
                remaining_requests,
            }),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// Consumes one unit of quota if available and returns whether the
    /// request is permitted. Exhaustion is not an error.
    pub async fn can_make_request(&self) -> bool {
        let mut st = self.state.lock().await;
        if st.remaining_requests <= 0 {
            return false;
        }
        st.remaining_requests -= 1;
        true
    }

    pub async fn set_premium(&self, value: bool) {
        let mut st = self.state.lock().await;
        st.is_premium = value;
        st.premium_since = if value { Some(Utc::now()) } else { None };
        st.remaining_requests = self.limits.for_plan(value);
    }

    pub async fn set_last_model(&self, model: impl Into<String>) {
        self.state.lock().await.last_model = Some(model.into());
    }

    pub async fn set_balance(&self, balance: f64) {
        self.state.lock().await.balance = balance;
    }

    /// Bumped when the user buys additional requests.
    pub async fn add_paid_requests(&self, count: i64) {
        self.state.lock().await.paid_requests += count;
    }

    pub async fn set_admin(&self, value: bool) {
        self.state.lock().await.is_admin = value;
    }

    pub async fn is_premium(&self) -> bool {
        self.state.lock().await.is_premium
    }

    pub async fn is_admin(&self) -> bool {
        self.state.lock().await.is_admin
    }

    pub async fn last_model(&self) -> Option<String> {
        self.state.lock().await.last_model.clone()
    }

    /// Persists all stored fields (insert-or-replace). Must be called after
    /// mutating fields for changes to survive a restart.
    pub async fn save(&self) -> Result<()> {
        let row = {
            let st = self.state.lock().await;
            UserRow {
                id: self.id,
                balance: st.balance,
                paid_requests: st.paid_requests,
                is_premium: st.is_premium,
                premium_since: st.premium_since,
                is_admin: st.is_admin,
                last_model: st.last_model.clone(),
            }
        };
        self.db.upsert_user(row).await
    }

    pub async fn snapshot(&self) -> ProfileSnapshot {
        let st = self.state.lock().await;
        ProfileSnapshot {
            id: self.id,
            balance: st.balance,
            paid_requests: st.paid_requests,
            is_premium: st.is_premium,
            premium_since: st.premium_since,
            is_admin: st.is_admin,
            last_model: st.last_model.clone(),
            remaining_requests: st.remaining_requests,
        }
    }
}
