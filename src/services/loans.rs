//! Loan management service

use std::time::Duration;

use chrono::Utc;

use super::{record_audit, within};
use crate::{
    config::LoansConfig,
    error::{AppError, AppResult},
    models::{
        ledger::{Checkout, LedgerEntry, LoanDetails, LoanOutcome, LoanStatus, NewAuditRecord},
        user::{normalize_username, User},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    config: LoansConfig,
    timeout: Duration,
}

impl LoansService {
    pub fn new(repository: Repository, config: LoansConfig, timeout: Duration) -> Self {
        Self {
            repository,
            config,
            timeout,
        }
    }

    pub fn max_active_loans(&self) -> i64 {
        i64::from(self.config.max_active_loans)
    }

    /// Borrow one copy of a book.
    ///
    /// The limit check, stock decrement and loan entry are applied by the
    /// ledger as one unit; the history entry is written afterwards.
    pub async fn borrow(&self, username: &str, book_id: &str) -> AppResult<LoanOutcome> {
        let user = self.active_user(username).await?;

        let outcome = within(
            self.timeout,
            self.repository.ledger.checkout(&Checkout {
                username: user.username.clone(),
                book_id: book_id.to_string(),
                max_active_loans: self.max_active_loans(),
                occurred_at: Utc::now(),
            }),
        )
        .await?;

        tracing::info!(
            username = %user.username,
            book_id,
            available_copies = outcome.book.available_copies,
            "Book borrowed"
        );
        self.audit(&outcome, LoanStatus::Borrowed).await;
        Ok(outcome)
    }

    /// Return a borrowed copy, closing the newest open loan for the pair
    pub async fn return_book(&self, username: &str, book_id: &str) -> AppResult<LoanOutcome> {
        let user = self.active_user(username).await?;

        let outcome = within(
            self.timeout,
            self.repository
                .ledger
                .checkin(&user.username, book_id, Utc::now()),
        )
        .await?;

        tracing::info!(
            username = %user.username,
            book_id,
            available_copies = outcome.book.available_copies,
            "Book returned"
        );
        self.audit(&outcome, LoanStatus::Returned).await;
        Ok(outcome)
    }

    pub async fn active_loan_count(&self, username: &str) -> AppResult<i64> {
        within(
            self.timeout,
            self.repository.ledger.active_loan_count(&normalize_username(username)),
        )
        .await
    }

    /// Open loans with their due dates
    pub async fn open_loans(&self, username: &str) -> AppResult<Vec<LoanDetails>> {
        let loans = within(
            self.timeout,
            self.repository
                .ledger
                .open_loans_for_user(&normalize_username(username)),
        )
        .await?;

        let now = Utc::now();
        Ok(loans
            .into_iter()
            .map(|loan| LoanDetails::from_event(loan, self.config.loan_period_days, now))
            .collect())
    }

    /// The open loan a user holds on one book, with its due date
    pub async fn open_loan_for(&self, username: &str, book_id: &str) -> AppResult<LoanDetails> {
        let username = normalize_username(username);
        let loan = within(
            self.timeout,
            self.repository.ledger.open_loan_for(&username, book_id),
        )
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("{} has no open loan for book {}", username, book_id))
        })?;

        Ok(LoanDetails::from_event(
            loan,
            self.config.loan_period_days,
            Utc::now(),
        ))
    }

    pub async fn history_for_user(&self, username: &str) -> AppResult<Vec<LedgerEntry>> {
        within(
            self.timeout,
            self.repository.ledger.history_for_user(&normalize_username(username)),
        )
        .await
    }

    pub async fn full_history(&self) -> AppResult<Vec<LedgerEntry>> {
        within(self.timeout, self.repository.ledger.full_history()).await
    }

    /// Blocked state is read from storage on every call, so a token issued
    /// before the account was blocked cannot move stock.
    async fn active_user(&self, username: &str) -> AppResult<User> {
        let username = normalize_username(username);
        let user = within(self.timeout, self.repository.users.get(&username))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", username)))?;

        if user.blocked {
            return Err(AppError::AccountBlocked);
        }
        Ok(user)
    }

    async fn audit(&self, outcome: &LoanOutcome, status: LoanStatus) {
        record_audit(
            self.repository.ledger.as_ref(),
            self.timeout,
            NewAuditRecord {
                username: outcome.loan.username.clone(),
                book_id: outcome.loan.book_id.clone(),
                book_title: outcome.loan.book_title.clone(),
                status,
                occurred_at: Utc::now(),
            },
        )
        .await;
    }
}
