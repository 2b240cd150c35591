//! Books repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::is_unique_violation;
use crate::{
    error::{AppError, AppResult},
    models::book::{compare_book_ids, Book, BookPatch, BookRow},
    repository::CatalogStore,
};

const BOOK_COLUMNS: &str = "book_id, title, author, isbn, category, description, cover_image, \
                            quantity, available_copies, created_at";

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for BooksRepository {
    async fn insert(&self, book: Book) -> AppResult<Book> {
        let row = sqlx::query_as::<_, BookRow>(&format!(
            r#"
            INSERT INTO books (
                book_id, title, author, isbn, category, description, cover_image,
                quantity, available_copies, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(&book.book_id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.category)
        .bind(&book.description)
        .bind(&book.cover_image)
        .bind(book.quantity)
        .bind(book.available_copies)
        .bind(book.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::DuplicateId(format!("Book with id {} already exists", book.book_id))
            } else {
                AppError::Database(e)
            }
        })?;

        Ok(row.into())
    }

    async fn get(&self, book_id: &str) -> AppResult<Option<Book>> {
        let row = sqlx::query_as::<_, BookRow>(&format!(
            "SELECT {} FROM books WHERE book_id = $1",
            BOOK_COLUMNS
        ))
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Book::from))
    }

    async fn list(&self) -> AppResult<Vec<Book>> {
        let rows = sqlx::query_as::<_, BookRow>(&format!("SELECT {} FROM books", BOOK_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        // ORDER BY would sort "B10" before "B2"
        let mut books: Vec<Book> = rows.into_iter().map(Book::from).collect();
        books.sort_by(|a, b| compare_book_ids(&a.book_id, &b.book_id));
        Ok(books)
    }

    async fn update(&self, book_id: &str, patch: &BookPatch) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        // Row lock: concurrent checkouts wait until the new counts are committed
        let mut book: Book = sqlx::query_as::<_, BookRow>(&format!(
            "SELECT {} FROM books WHERE book_id = $1 FOR UPDATE",
            BOOK_COLUMNS
        ))
        .bind(book_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book {} not found", book_id)))?
        .into();

        book.apply_patch(patch);

        sqlx::query(
            r#"
            UPDATE books SET
                title = $1, author = $2, isbn = $3, category = $4, description = $5,
                cover_image = $6, quantity = $7, available_copies = $8
            WHERE book_id = $9
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.category)
        .bind(&book.description)
        .bind(&book.cover_image)
        .bind(book.quantity)
        .bind(book.available_copies)
        .bind(book_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(book)
    }

    async fn remove(&self, book_id: &str) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        let book: Book = sqlx::query_as::<_, BookRow>(&format!(
            "SELECT {} FROM books WHERE book_id = $1 FOR UPDATE",
            BOOK_COLUMNS
        ))
        .bind(book_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book {} not found", book_id)))?
        .into();

        // Counted after the lock so loans committed meanwhile are seen
        let open_loans: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loan_events WHERE book_id = $1 AND kind = 'loan' AND returned_at IS NULL",
        )
        .bind(book_id)
        .fetch_one(&mut *tx)
        .await?;

        if open_loans > 0 {
            return Err(AppError::Conflict(format!(
                "Book {} has {} open loan(s) and cannot be deleted",
                book_id, open_loans
            )));
        }

        sqlx::query("DELETE FROM books WHERE book_id = $1")
            .bind(book_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(book)
    }

    async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
