//! SQLite-backed user store.
//!
//! Layering, top down: [`directory::UserDirectory`] (process-wide cache +
//! single-flight coordinator) over [`db::Database`] (parameterized
//! statements) over [`pool::Pool`] (validated connections, commit-or-rollback
//! guard).

pub mod db;
pub mod directory;
pub mod pool;
pub mod profile;

pub use db::{Database, UserRow};
pub use directory::UserDirectory;
pub use pool::{Pool, PooledConn};
pub use profile::{PlanLimits, ProfileSnapshot, UserProfile};
