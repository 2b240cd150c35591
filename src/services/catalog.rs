//! Catalog management service

use std::time::Duration;

use chrono::Utc;

use super::{record_audit, within};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookPatch, CreateBook},
        ledger::{LoanStatus, NewAuditRecord},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    timeout: Duration,
}

impl CatalogService {
    pub fn new(repository: Repository, timeout: Duration) -> Self {
        Self {
            repository,
            timeout,
        }
    }

    /// All books, ordered by id
    pub async fn list_books(&self) -> AppResult<Vec<Book>> {
        within(self.timeout, self.repository.catalog.list()).await
    }

    pub async fn get_book(&self, book_id: &str) -> AppResult<Book> {
        within(self.timeout, self.repository.catalog.get(book_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", book_id)))
    }

    /// Add a book with every copy available
    pub async fn create_book(&self, actor: &str, request: CreateBook) -> AppResult<Book> {
        let new_book = request.validate()?;
        let book = within(
            self.timeout,
            self.repository.catalog.insert(Book::new(new_book, Utc::now())),
        )
        .await?;

        tracing::info!(book_id = %book.book_id, quantity = book.quantity, actor, "Book created");
        self.audit(actor, &book, LoanStatus::Created).await;
        Ok(book)
    }

    pub async fn edit_book(&self, actor: &str, book_id: &str, patch: BookPatch) -> AppResult<Book> {
        patch.validate()?;
        let book = within(self.timeout, self.repository.catalog.update(book_id, &patch)).await?;

        tracing::info!(
            book_id = %book.book_id,
            quantity = book.quantity,
            available_copies = book.available_copies,
            actor,
            "Book edited"
        );
        self.audit(actor, &book, LoanStatus::Edited).await;
        Ok(book)
    }

    /// Remove a book. Refused with `Conflict` while copies are out on loan.
    pub async fn delete_book(&self, actor: &str, book_id: &str) -> AppResult<Book> {
        let book = within(self.timeout, self.repository.catalog.remove(book_id)).await?;

        tracing::info!(book_id = %book.book_id, actor, "Book deleted");
        self.audit(actor, &book, LoanStatus::Deleted).await;
        Ok(book)
    }

    /// Round trip to storage for the readiness check
    pub async fn ping(&self) -> AppResult<()> {
        within(self.timeout, self.repository.catalog.ping()).await
    }

    async fn audit(&self, actor: &str, book: &Book, status: LoanStatus) {
        record_audit(
            self.repository.ledger.as_ref(),
            self.timeout,
            NewAuditRecord {
                username: actor.to_lowercase(),
                book_id: book.book_id.clone(),
                book_title: book.title.clone(),
                status,
                occurred_at: Utc::now(),
            },
        )
        .await;
    }
}
