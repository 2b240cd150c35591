//! Loan ledger repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use super::is_unique_violation;
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookRow},
        ledger::{
            Checkout, LedgerEntry, LoanEvent, LoanEventRow, LoanOutcome, LoanStatus,
            NewAuditRecord,
        },
    },
    repository::LoanLedger,
};

const EVENT_COLUMNS: &str =
    "id, kind, username, book_id, book_title, status, occurred_at, returned_at";

#[derive(Clone)]
pub struct LedgerRepository {
    pool: Pool<Postgres>,
}

impl LedgerRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn fetch_entries(&self, query: &str, username: Option<&str>) -> AppResult<Vec<LedgerEntry>> {
        let mut builder = sqlx::query_as::<_, LoanEventRow>(query);
        if let Some(username) = username {
            builder = builder.bind(username);
        }
        builder
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(LedgerEntry::try_from)
            .collect()
    }
}

fn into_loan_event(row: LoanEventRow) -> AppResult<LoanEvent> {
    match LedgerEntry::try_from(row)? {
        LedgerEntry::ActiveLoan(event) => Ok(event),
        LedgerEntry::AuditRecord(event) => Err(AppError::Internal(format!(
            "Ledger entry {} is an audit record, expected a loan",
            event.id
        ))),
    }
}

#[async_trait]
impl LoanLedger for LedgerRepository {
    async fn checkout(&self, checkout: &Checkout) -> AppResult<LoanOutcome> {
        let mut tx = self.pool.begin().await?;

        // Serializes checkouts per user so the limit below is exact
        let user_exists: Option<String> =
            sqlx::query_scalar("SELECT username FROM users WHERE username = $1 FOR UPDATE")
                .bind(&checkout.username)
                .fetch_optional(&mut *tx)
                .await?;
        if user_exists.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", checkout.username)));
        }

        let current: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loan_events WHERE username = $1 AND kind = 'loan' AND returned_at IS NULL",
        )
        .bind(&checkout.username)
        .fetch_one(&mut *tx)
        .await?;
        if current >= checkout.max_active_loans {
            return Err(AppError::LoanLimitExceeded {
                current,
                max: checkout.max_active_loans,
            });
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE book_id = $1)")
            .bind(&checkout.book_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(AppError::NotFound(format!("Book {} not found", checkout.book_id)));
        }

        let already_open: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM loan_events
                WHERE username = $1 AND book_id = $2 AND kind = 'loan' AND returned_at IS NULL
            )
            "#,
        )
        .bind(&checkout.username)
        .bind(&checkout.book_id)
        .fetch_one(&mut *tx)
        .await?;
        if already_open {
            return Err(AppError::AlreadyBorrowed(format!(
                "{} already has book {} on loan",
                checkout.username, checkout.book_id
            )));
        }

        // Conditional decrement: no row back means the last copy went elsewhere
        let book: Book = sqlx::query_as::<_, BookRow>(
            r#"
            UPDATE books SET available_copies = available_copies - 1
            WHERE book_id = $1 AND available_copies > 0
            RETURNING book_id, title, author, isbn, category, description, cover_image,
                      quantity, available_copies, created_at
            "#,
        )
        .bind(&checkout.book_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            AppError::BookUnavailable(format!("No copies of {} available for loan", checkout.book_id))
        })?
        .into();

        let row = sqlx::query_as::<_, LoanEventRow>(&format!(
            r#"
            INSERT INTO loan_events (kind, username, book_id, book_title, status, occurred_at)
            VALUES ('loan', $1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            EVENT_COLUMNS
        ))
        .bind(&checkout.username)
        .bind(&checkout.book_id)
        .bind(&book.title)
        .bind(LoanStatus::Borrowed.as_str())
        .bind(checkout.occurred_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::AlreadyBorrowed(format!(
                    "{} already has book {} on loan",
                    checkout.username, checkout.book_id
                ))
            } else {
                AppError::Database(e)
            }
        })?;

        tx.commit().await?;

        Ok(LoanOutcome {
            book,
            loan: into_loan_event(row)?,
        })
    }

    async fn checkin(
        &self,
        username: &str,
        book_id: &str,
        returned_at: DateTime<Utc>,
    ) -> AppResult<LoanOutcome> {
        let mut tx = self.pool.begin().await?;

        let loan_id: i64 = sqlx::query_scalar(
            r#"
            SELECT id FROM loan_events
            WHERE username = $1 AND book_id = $2 AND kind = 'loan' AND returned_at IS NULL
            ORDER BY occurred_at DESC, id DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(username)
        .bind(book_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            AppError::NoActiveLoan(format!("{} has no active loan for book {}", username, book_id))
        })?;

        let row = sqlx::query_as::<_, LoanEventRow>(&format!(
            "UPDATE loan_events SET status = $1, returned_at = $2 WHERE id = $3 RETURNING {}",
            EVENT_COLUMNS
        ))
        .bind(LoanStatus::Returned.as_str())
        .bind(returned_at)
        .bind(loan_id)
        .fetch_one(&mut *tx)
        .await?;

        let book: Book = sqlx::query_as::<_, BookRow>(
            r#"
            UPDATE books SET available_copies = LEAST(available_copies + 1, quantity)
            WHERE book_id = $1
            RETURNING book_id, title, author, isbn, category, description, cover_image,
                      quantity, available_copies, created_at
            "#,
        )
        .bind(book_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book {} not found", book_id)))?
        .into();

        tx.commit().await?;

        Ok(LoanOutcome {
            book,
            loan: into_loan_event(row)?,
        })
    }

    async fn append_audit(&self, record: &NewAuditRecord) -> AppResult<LedgerEntry> {
        let row = sqlx::query_as::<_, LoanEventRow>(&format!(
            r#"
            INSERT INTO loan_events (kind, username, book_id, book_title, status, occurred_at)
            VALUES ('audit', $1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            EVENT_COLUMNS
        ))
        .bind(&record.username)
        .bind(&record.book_id)
        .bind(&record.book_title)
        .bind(record.status.as_str())
        .bind(record.occurred_at)
        .fetch_one(&self.pool)
        .await?;

        LedgerEntry::try_from(row)
    }

    async fn active_loan_count(&self, username: &str) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loan_events WHERE username = $1 AND kind = 'loan' AND returned_at IS NULL",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn open_loan_for(&self, username: &str, book_id: &str) -> AppResult<Option<LoanEvent>> {
        let row = sqlx::query_as::<_, LoanEventRow>(&format!(
            r#"
            SELECT {} FROM loan_events
            WHERE username = $1 AND book_id = $2 AND kind = 'loan' AND returned_at IS NULL
            ORDER BY occurred_at DESC, id DESC
            LIMIT 1
            "#,
            EVENT_COLUMNS
        ))
        .bind(username)
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(into_loan_event).transpose()
    }

    async fn open_loans_for_user(&self, username: &str) -> AppResult<Vec<LoanEvent>> {
        let rows = sqlx::query_as::<_, LoanEventRow>(&format!(
            r#"
            SELECT {} FROM loan_events
            WHERE username = $1 AND kind = 'loan' AND returned_at IS NULL
            ORDER BY occurred_at, id
            "#,
            EVENT_COLUMNS
        ))
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(into_loan_event).collect()
    }

    async fn history_for_user(&self, username: &str) -> AppResult<Vec<LedgerEntry>> {
        self.fetch_entries(
            &format!(
                "SELECT {} FROM loan_events WHERE kind = 'audit' AND username = $1 \
                 ORDER BY occurred_at DESC, id DESC",
                EVENT_COLUMNS
            ),
            Some(username),
        )
        .await
    }

    async fn full_history(&self) -> AppResult<Vec<LedgerEntry>> {
        self.fetch_entries(
            &format!(
                "SELECT {} FROM loan_events WHERE kind = 'audit' ORDER BY occurred_at DESC, id DESC",
                EVENT_COLUMNS
            ),
            None,
        )
        .await
    }
}
