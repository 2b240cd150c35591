//! Postgres backend

mod books;
mod ledger;
mod users;

pub use books::BooksRepository;
pub use ledger::LedgerRepository;
pub use users::UsersRepository;

/// SQLSTATE for unique constraint violations
const UNIQUE_VIOLATION: &str = "23505";

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == UNIQUE_VIOLATION)
        .unwrap_or(false)
}
