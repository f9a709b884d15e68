use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};

use super::{BalanceUpdate, UserStore};
use crate::models::users::{NewUser, User};

/// In-process store with the same atomicity guarantees as the Postgres one.
///
/// Lock order is always `usernames` before `users`.
#[derive(Default)]
pub struct MemoryUserRepository {
    users: DashMap<i64, User>,
    usernames: DashMap<String, i64>,
    last_id: AtomicI64,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserRepository {
    async fn insert_user(&self, new_user: NewUser) -> Result<Option<User>, anyhow::Error> {
        if new_user.username.is_empty() {
            return Err(anyhow!("username must not be empty"));
        }

        match self.usernames.entry(new_user.username.clone()) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(slot) => {
                let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
                let now = Utc::now();
                let user = User {
                    id,
                    username: new_user.username,
                    password_hash: new_user.password_hash,
                    balance: 0,
                    referrer: new_user.referrer,
                    created_at: now,
                    updated_at: now,
                };

                self.users.insert(id, user.clone());
                slot.insert(id);

                Ok(Some(user))
            }
        }
    }

    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, anyhow::Error> {
        Ok(self.users.get(&id).map(|user| user.clone()))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, anyhow::Error> {
        let id = match self.usernames.get(username) {
            Some(id) => *id,
            None => return Ok(None),
        };

        self.get_user_by_id(id).await
    }

    async fn increment_balance(
        &self,
        id: i64,
        amount: i64,
    ) -> Result<BalanceUpdate, anyhow::Error> {
        let Some(mut user) = self.users.get_mut(&id) else {
            return Ok(BalanceUpdate::NotFound);
        };

        let balance = user
            .balance
            .checked_add(amount)
            .ok_or_else(|| anyhow!("balance out of range for user {}", id))?;
        if balance < 0 {
            return Ok(BalanceUpdate::Refused(user.clone()));
        }

        user.balance = balance;
        user.updated_at = Utc::now();

        Ok(BalanceUpdate::Applied(user.clone()))
    }

    async fn set_referrer(
        &self,
        id: i64,
        referrer_id: i64,
    ) -> Result<Option<User>, anyhow::Error> {
        if id == referrer_id {
            return Err(anyhow!("user {} cannot refer itself", id));
        }

        let Some(mut user) = self.users.get_mut(&id) else {
            return Ok(None);
        };

        user.referrer = Some(referrer_id);
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }

    async fn top_by_balance(&self, limit: i64) -> Result<Vec<User>, anyhow::Error> {
        let mut users: Vec<User> = self.users.iter().map(|entry| entry.value().clone()).collect();
        users.sort_by(|a, b| b.balance.cmp(&a.balance).then(a.id.cmp(&b.id)));
        users.truncate(usize::try_from(limit).unwrap_or(0));

        Ok(users)
    }
}
