//! Catalog endpoints

use std::path::Path as FsPath;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::Multipart;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookPatch, CreateBook},
};

use super::AuthenticatedUser;

/// Result of a mutation on a single book
#[derive(Debug, Serialize, ToSchema)]
pub struct BookActionResponse {
    pub message: String,
    pub book: Book,
}

/// List every book, ordered by id
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    responses(
        (status = 200, description = "All books", body = Vec<Book>)
    )
)]
pub async fn list_books(State(state): State<crate::AppState>) -> AppResult<Json<Vec<Book>>> {
    let books = state.services.catalog.list_books().await?;
    Ok(Json(books))
}

/// Get a single book
#[utoipa::path(
    get,
    path = "/books/{book_id}",
    tag = "books",
    params(
        ("book_id" = String, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    Path(book_id): Path<String>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.get_book(&book_id).await?;
    Ok(Json(book))
}

/// Add a book (multipart form)
///
/// Text fields: `bookId`, `title`, `author`, `isbn`, `quantity`, `category`,
/// `description`, `username`. `coverImage` is either an uploaded file or a URL.
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body(content = String, content_type = "multipart/form-data", description = "Book fields and optional cover image"),
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Missing or invalid fields"),
        (status = 403, description = "Administrator role required"),
        (status = 409, description = "Book ID already exists")
    )
)]
pub async fn create_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<Book>)> {
    claims.require_admin()?;

    let mut request = CreateBook::default();
    let mut actor = claims.sub.clone();
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "coverImage" {
            if let Some(file_name) = field.file_name().map(str::to_string) {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid cover image: {}", e)))?;
                if !bytes.is_empty() {
                    upload = Some((file_name, bytes.to_vec()));
                }
                continue;
            }
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::Validation(format!("Invalid field {}: {}", name, e)))?;
        match name.as_str() {
            "bookId" => request.book_id = Some(value),
            "title" => request.title = Some(value),
            "author" => request.author = Some(value),
            "isbn" => request.isbn = Some(value),
            "quantity" => request.quantity = Some(value),
            "category" => request.category = Some(value),
            "description" => request.description = Some(value),
            "coverImage" => request.cover_image = Some(value),
            "username" if !value.trim().is_empty() => actor = value.trim().to_string(),
            _ => {}
        }
    }

    let stored = match upload {
        Some((file_name, bytes)) => {
            let stored = save_cover(&state.config.storage.uploads_dir, &file_name, &bytes).await?;
            request.cover_image = Some(format!("/uploads/{}", stored));
            Some(stored)
        }
        None => None,
    };

    match state.services.catalog.create_book(&actor, request).await {
        Ok(book) => Ok((StatusCode::CREATED, Json(book))),
        Err(e) => {
            if let Some(stored) = stored {
                let path = state.config.storage.uploads_dir.join(stored);
                if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                    tracing::warn!(path = %path.display(), error = %remove_err, "Failed to remove orphaned cover");
                }
            }
            Err(e)
        }
    }
}

/// Update a book
#[utoipa::path(
    put,
    path = "/books/{book_id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("book_id" = String, Path, description = "Book ID")
    ),
    request_body = BookPatch,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn update_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<String>,
    Json(patch): Json<BookPatch>,
) -> AppResult<Json<Book>> {
    claims.require_admin()?;

    let book = state
        .services
        .catalog
        .edit_book(&claims.sub, &book_id, patch)
        .await?;
    Ok(Json(book))
}

/// Delete a book
#[utoipa::path(
    delete,
    path = "/books/{book_id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("book_id" = String, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book deleted", body = BookActionResponse),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book has open loans")
    )
)]
pub async fn delete_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<String>,
) -> AppResult<Json<BookActionResponse>> {
    claims.require_admin()?;

    let book = state.services.catalog.delete_book(&claims.sub, &book_id).await?;
    Ok(Json(BookActionResponse {
        message: format!("Book {} deleted", book.book_id),
        book,
    }))
}

/// Write an uploaded cover under a fresh name and return that name
async fn save_cover(dir: &FsPath, original_name: &str, bytes: &[u8]) -> AppResult<String> {
    let extension = FsPath::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_lowercase);

    let name = match extension {
        Some(ext) => format!("{}.{}", uuid::Uuid::new_v4(), ext),
        None => uuid::Uuid::new_v4().to_string(),
    };

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create uploads directory: {}", e)))?;
    tokio::fs::write(dir.join(&name), bytes)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to store cover image: {}", e)))?;

    Ok(name)
}
