//! Users repository for database operations

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres};

use super::is_unique_violation;
use crate::{
    error::{AppError, AppResult},
    models::user::{NewUser, UpdateUser, User, UserRow},
    repository::UserStore,
};

const USER_COLUMNS: &str = "username, email, password_hash, role, blocked, first_name, last_name, \
                            phone, created_at, updated_at";

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn get_required(&self, username: &str) -> AppResult<User> {
        self.get(username)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", username)))
    }
}

#[async_trait]
impl UserStore for UsersRepository {
    async fn insert(&self, user: NewUser) -> AppResult<User> {
        let now = Utc::now();

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (
                username, email, password_hash, role, blocked,
                first_name, last_name, phone, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, FALSE, $5, $6, $7, $8, $8)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::DuplicateIdentity("Username or email already exists".to_string())
            } else {
                AppError::Database(e)
            }
        })?;

        row.try_into()
    }

    async fn get(&self, username: &str) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE username = LOWER($1)",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users ORDER BY username",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn identity_taken(&self, username: &str, email: &str) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = LOWER($1) OR email = LOWER($2))",
        )
        .bind(username)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn email_taken(&self, email: &str, except_username: &str) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = LOWER($1) AND username != LOWER($2))",
        )
        .bind(email)
        .bind(except_username)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn update_profile(&self, username: &str, update: &UpdateUser) -> AppResult<User> {
        // COALESCE keeps the stored value for every field left out of the request
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET
                first_name = COALESCE($1, first_name),
                last_name = COALESCE($2, last_name),
                phone = COALESCE($3, phone),
                email = COALESCE(LOWER($4), email),
                role = COALESCE($5, role),
                updated_at = $6
            WHERE username = LOWER($7)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.phone)
        .bind(&update.email)
        .bind(update.role.map(|r| r.as_str()))
        .bind(Utc::now())
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::DuplicateIdentity("Email already exists".to_string())
            } else {
                AppError::Database(e)
            }
        })?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", username)))?;

        row.try_into()
    }

    async fn set_blocked(&self, username: &str, blocked: bool) -> AppResult<User> {
        sqlx::query("UPDATE users SET blocked = $1, updated_at = $2 WHERE username = LOWER($3)")
            .bind(blocked)
            .bind(Utc::now())
            .bind(username)
            .execute(&self.pool)
            .await?;

        self.get_required(username).await
    }

    async fn set_password(&self, username: &str, password_hash: &str) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $1, updated_at = $2 WHERE username = LOWER($3)",
        )
        .bind(password_hash)
        .bind(Utc::now())
        .bind(username)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", username)));
        }
        Ok(())
    }

    async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
