//! Repository layer: storage traits and their backends
//!
//! Services only see the traits below. `postgres` keeps state in a database
//! through sqlx; `memory` keeps it in-process for development and tests.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookPatch},
        ledger::{Checkout, LedgerEntry, LoanEvent, LoanOutcome, NewAuditRecord},
        user::{NewUser, UpdateUser, User},
    },
};

/// Owns book records and their stock counts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Fails with `DuplicateId` when the id is taken
    async fn insert(&self, book: Book) -> AppResult<Book>;

    async fn get(&self, book_id: &str) -> AppResult<Option<Book>>;

    /// All books ordered by id, digit runs compared numerically
    async fn list(&self) -> AppResult<Vec<Book>>;

    /// Fails with `NotFound` when absent
    async fn update(&self, book_id: &str, patch: &BookPatch) -> AppResult<Book>;

    /// Fails with `NotFound` when absent and `Conflict` while open loans
    /// reference the book. Returns the removed record.
    async fn remove(&self, book_id: &str) -> AppResult<Book>;

    async fn count(&self) -> AppResult<i64>;

    /// Cheap round trip used by the readiness check
    async fn ping(&self) -> AppResult<()>;
}

/// Owns loan events. Checkout and checkin also move the book's stock, in the
/// same atomic step as the ledger write.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoanLedger: Send + Sync {
    /// Open a loan and take one copy.
    ///
    /// Checks, in order: the user's open loan count against
    /// `max_active_loans` (`LoanLimitExceeded`), book existence (`NotFound`),
    /// an existing open loan on the same pair (`AlreadyBorrowed`), and stock
    /// (`BookUnavailable`). Either every effect is applied or none is.
    async fn checkout(&self, checkout: &Checkout) -> AppResult<LoanOutcome>;

    /// Close the newest open loan for the pair and put one copy back (capped
    /// at quantity). Fails with `NoActiveLoan` when there is nothing to close.
    async fn checkin(
        &self,
        username: &str,
        book_id: &str,
        returned_at: DateTime<Utc>,
    ) -> AppResult<LoanOutcome>;

    async fn append_audit(&self, record: &NewAuditRecord) -> AppResult<LedgerEntry>;

    /// Open, non-history loans held by the user
    async fn active_loan_count(&self, username: &str) -> AppResult<i64>;

    /// Newest open loan for the pair
    async fn open_loan_for(&self, username: &str, book_id: &str) -> AppResult<Option<LoanEvent>>;

    /// Open loans held by the user, oldest first
    async fn open_loans_for_user(&self, username: &str) -> AppResult<Vec<LoanEvent>>;

    /// History-only entries for the user, newest first
    async fn history_for_user(&self, username: &str) -> AppResult<Vec<LedgerEntry>>;

    /// Every history-only entry, newest first
    async fn full_history(&self) -> AppResult<Vec<LedgerEntry>>;
}

/// Owns user accounts; usernames and emails are stored lower-cased
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `DuplicateIdentity` when username or email is taken
    async fn insert(&self, user: NewUser) -> AppResult<User>;

    async fn get(&self, username: &str) -> AppResult<Option<User>>;

    async fn list(&self) -> AppResult<Vec<User>>;

    /// Whether the username or the email already belongs to an account
    async fn identity_taken(&self, username: &str, email: &str) -> AppResult<bool>;

    /// Whether another account than `except_username` uses the email
    async fn email_taken(&self, email: &str, except_username: &str) -> AppResult<bool>;

    async fn update_profile(&self, username: &str, update: &UpdateUser) -> AppResult<User>;

    async fn set_blocked(&self, username: &str, blocked: bool) -> AppResult<User>;

    async fn set_password(&self, username: &str, password_hash: &str) -> AppResult<()>;

    async fn count(&self) -> AppResult<i64>;
}

/// The three stores handed to the services
#[derive(Clone)]
pub struct Repository {
    pub catalog: Arc<dyn CatalogStore>,
    pub ledger: Arc<dyn LoanLedger>,
    pub users: Arc<dyn UserStore>,
}

impl Repository {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        ledger: Arc<dyn LoanLedger>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            users,
        }
    }

    /// Repository backed by a Postgres pool
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self {
            catalog: Arc::new(postgres::BooksRepository::new(pool.clone())),
            ledger: Arc::new(postgres::LedgerRepository::new(pool.clone())),
            users: Arc::new(postgres::UsersRepository::new(pool)),
        }
    }

    /// Repository backed by process memory; state is lost on exit
    pub fn in_memory() -> Self {
        let store = Arc::new(memory::MemoryStore::default());
        Self {
            catalog: store.clone(),
            ledger: store.clone(),
            users: store,
        }
    }
}
