//! Authentication and user management endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::user::{
        BlockRequest, ChangePasswordRequest, LoginRequest, RegisterRequest, UpdateUser, User,
    },
};

use super::{AuthenticatedUser, MessageResponse};

/// Successful login
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub user: User,
}

/// Account created or changed
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub message: String,
    pub user: User,
}

/// Log in and receive a bearer token
#[utoipa::path(
    post,
    path = "/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse),
        (status = 403, description = "Account blocked", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<crate::AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let (token, user) = state.services.users.authenticate(request).await?;
    Ok(Json(LoginResponse {
        message: format!("Welcome, {}", user.first_name),
        token,
        user,
    }))
}

/// Create an account with the `user` role
#[utoipa::path(
    post,
    path = "/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Username or email already exists")
    )
)]
pub async fn register(
    State(state): State<crate::AppState>,
    Json(request): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let user = state.services.users.register(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            message: "Account created".to_string(),
            user,
        }),
    ))
}

/// Change a password; the current password authorizes the change
#[utoipa::path(
    post,
    path = "/change-password",
    tag = "auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Current password is wrong")
    )
)]
pub async fn change_password(
    State(state): State<crate::AppState>,
    Json(request): Json<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    state.services.users.change_password(request).await?;
    Ok(Json(MessageResponse {
        message: "Password changed".to_string(),
    }))
}

/// List all accounts
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All users", body = Vec<User>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Administrator role required")
    )
)]
pub async fn list_users(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<User>>> {
    claims.require_admin()?;

    let users = state.services.users.list_users().await?;
    Ok(Json(users))
}

/// Edit profile fields
#[utoipa::path(
    put,
    path = "/users/{username}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("username" = String, Path, description = "Username")
    ),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Email already exists")
    )
)]
pub async fn update_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(username): Path<String>,
    Json(update): Json<UpdateUser>,
) -> AppResult<Json<User>> {
    let user = state
        .services
        .users
        .update_user(&claims, &username, update)
        .await?;
    Ok(Json(user))
}

/// Block or unblock an account
#[utoipa::path(
    post,
    path = "/users/{username}/block",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("username" = String, Path, description = "Username")
    ),
    request_body = BlockRequest,
    responses(
        (status = 200, description = "Block state changed", body = UserResponse),
        (status = 400, description = "Cannot block yourself"),
        (status = 403, description = "Administrator role required"),
        (status = 404, description = "User not found")
    )
)]
pub async fn block_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(username): Path<String>,
    Json(request): Json<BlockRequest>,
) -> AppResult<Json<UserResponse>> {
    let user = state
        .services
        .users
        .set_blocked(&claims, &username, request.block)
        .await?;
    let message = if user.blocked {
        format!("User {} blocked", user.username)
    } else {
        format!("User {} unblocked", user.username)
    };
    Ok(Json(UserResponse { message, user }))
}
