use crate::models::users::{NewUser, User};

use super::{BalanceUpdate, UserStore};

use async_trait::async_trait;
use sqlx::PgPool;

#[derive(Clone)]
pub struct UserRepository {
    conn: PgPool,
}

impl UserRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    pub async fn migrate(&self) -> Result<(), anyhow::Error> {
        sqlx::migrate!("./migrations").run(&self.conn).await?;

        Ok(())
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn insert_user(&self, new_user: NewUser) -> Result<Option<User>, anyhow::Error> {
        let result = sqlx::query_as::<_, User>(
            r#"
                INSERT INTO users (username, password_hash, referrer)
                VALUES ($1, $2, $3)
                ON CONFLICT (username) DO NOTHING
                RETURNING *
            "#,
        )
        .bind(&new_user.username)
        .bind(&new_user.password_hash)
        .bind(new_user.referrer)
        .fetch_optional(&self.conn)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user)
    }

    async fn increment_balance(
        &self,
        id: i64,
        amount: i64,
    ) -> Result<BalanceUpdate, anyhow::Error> {
        let updated = sqlx::query_as::<_, User>(
            r#"
                UPDATE users
                SET balance = balance + $1, updated_at = CURRENT_TIMESTAMP
                WHERE id = $2 AND balance + $1 >= 0
                RETURNING *
            "#,
        )
        .bind(amount)
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        if let Some(user) = updated {
            return Ok(BalanceUpdate::Applied(user));
        }

        match self.get_user_by_id(id).await? {
            Some(user) => Ok(BalanceUpdate::Refused(user)),
            None => Ok(BalanceUpdate::NotFound),
        }
    }

    async fn set_referrer(
        &self,
        id: i64,
        referrer_id: i64,
    ) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET referrer = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
        )
        .bind(referrer_id)
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(user)
    }

    async fn top_by_balance(&self, limit: i64) -> Result<Vec<User>, anyhow::Error> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users ORDER BY balance DESC, id ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.conn)
        .await?;

        Ok(users)
    }
}
