use async_trait::async_trait;

use crate::models::users::{NewUser, User};

pub mod memory;
pub mod users;

pub const LEADERBOARD_LIMIT: i64 = 10;

/// Outcome of a balance increment.
#[derive(Clone, Debug)]
pub enum BalanceUpdate {
    Applied(User),
    /// The user exists but the result would have been negative; nothing changed.
    Refused(User),
    NotFound,
}

/// Persistence seam for user records.
///
/// Lookups and updates report a missing row as `Ok(None)` (or
/// `BalanceUpdate::NotFound`); `Err` is reserved for failures of the store itself.
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// Creates the user unless the username is already taken, in which case
    /// `Ok(None)` is returned. The check and the insert are one atomic step.
    async fn insert_user(&self, new_user: NewUser) -> Result<Option<User>, anyhow::Error>;

    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, anyhow::Error>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, anyhow::Error>;

    /// Adds `amount` to the stored balance in a single store-side step,
    /// unless the balance would drop below zero.
    async fn increment_balance(&self, id: i64, amount: i64)
        -> Result<BalanceUpdate, anyhow::Error>;

    async fn set_referrer(&self, id: i64, referrer_id: i64)
        -> Result<Option<User>, anyhow::Error>;

    /// Highest balances first, ties by ascending id.
    async fn top_by_balance(&self, limit: i64) -> Result<Vec<User>, anyhow::Error>;
}
