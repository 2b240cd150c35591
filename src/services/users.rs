//! Authentication and user management service

use std::time::Duration;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use validator::Validate;

use super::within;
use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{
        normalize_username, ChangePasswordRequest, LoginRequest, NewUser, RegisterRequest, Role,
        UpdateUser, User, UserClaims,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
    timeout: Duration,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig, timeout: Duration) -> Self {
        Self {
            repository,
            config,
            timeout,
        }
    }

    /// Check credentials and issue a JWT.
    ///
    /// The password is verified before the blocked flag, so a blocked account
    /// is only revealed to someone who knows its password.
    pub async fn authenticate(&self, request: LoginRequest) -> AppResult<(String, User)> {
        request.validate()?;
        let username = normalize_username(&request.username);

        let user = within(self.timeout, self.repository.users.get(&username))
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !verify_password(&user.password_hash, &request.password)? {
            return Err(AppError::InvalidCredentials);
        }

        if user.blocked {
            tracing::info!(username = %user.username, "Login refused for blocked account");
            return Err(AppError::AccountBlocked);
        }

        let token = self.create_token(&user)?;
        tracing::info!(username = %user.username, role = %user.role, "User logged in");
        Ok((token, user))
    }

    /// Create a regular account
    pub async fn register(&self, request: RegisterRequest) -> AppResult<User> {
        let request = request.normalized();
        request.validate()?;
        if request.password != request.confirm_password {
            return Err(AppError::Validation("Passwords do not match".to_string()));
        }

        if within(
            self.timeout,
            self.repository
                .users
                .identity_taken(&request.username, &request.email),
        )
        .await?
        {
            return Err(AppError::DuplicateIdentity(
                "Username or email already exists".to_string(),
            ));
        }

        let user = within(
            self.timeout,
            self.repository.users.insert(NewUser {
                username: request.username,
                email: request.email,
                password_hash: hash_password(&request.password)?,
                role: Role::User,
                first_name: request.first_name,
                last_name: request.last_name,
                phone: request.phone.unwrap_or_default(),
            }),
        )
        .await?;

        tracing::info!(username = %user.username, "User registered");
        Ok(user)
    }

    pub async fn change_password(&self, request: ChangePasswordRequest) -> AppResult<()> {
        request.validate()?;
        if request.new_password != request.confirm_password {
            return Err(AppError::Validation("Passwords do not match".to_string()));
        }
        if request.new_password == request.current_password {
            return Err(AppError::Validation(
                "New password must differ from the current one".to_string(),
            ));
        }

        let username = normalize_username(&request.username);
        let user = within(self.timeout, self.repository.users.get(&username))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", username)))?;

        if !verify_password(&user.password_hash, &request.current_password)? {
            return Err(AppError::InvalidCredentials);
        }

        let hash = hash_password(&request.new_password)?;
        within(
            self.timeout,
            self.repository.users.set_password(&user.username, &hash),
        )
        .await?;

        tracing::info!(username = %user.username, "Password changed");
        Ok(())
    }

    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        within(self.timeout, self.repository.users.list()).await
    }

    /// Edit profile fields. Users may edit themselves; only admins may edit
    /// others or change a role.
    pub async fn update_user(
        &self,
        actor: &UserClaims,
        username: &str,
        mut update: UpdateUser,
    ) -> AppResult<User> {
        actor.require_self_or_admin(username)?;
        if update.role.is_some() {
            actor.require_admin()?;
        }

        update.email = update.email.map(|e| e.trim().to_lowercase());
        update.validate()?;

        if let Some(ref email) = update.email {
            if within(self.timeout, self.repository.users.email_taken(email, username)).await? {
                return Err(AppError::DuplicateIdentity("Email already exists".to_string()));
            }
        }

        let user = within(
            self.timeout,
            self.repository.users.update_profile(username, &update),
        )
        .await?;

        tracing::info!(username = %user.username, actor = %actor.sub, "User updated");
        Ok(user)
    }

    /// Block or unblock an account. Admins cannot block themselves.
    pub async fn set_blocked(&self, actor: &UserClaims, username: &str, block: bool) -> AppResult<User> {
        actor.require_admin()?;
        if block && actor.sub.eq_ignore_ascii_case(username) {
            return Err(AppError::Validation("You cannot block your own account".to_string()));
        }

        let user = within(
            self.timeout,
            self.repository.users.set_blocked(username, block),
        )
        .await?;

        tracing::info!(username = %user.username, blocked = block, actor = %actor.sub, "Block state changed");
        Ok(user)
    }

    fn create_token(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = UserClaims {
            sub: user.username.clone(),
            role: user.role,
            exp: now + (self.config.jwt_expiration_hours as i64 * 3600),
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
