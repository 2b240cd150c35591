//! Data models for Biblio

pub mod book;
pub mod ledger;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookPatch, CreateBook, NewBook};
pub use ledger::{LedgerEntry, LoanEvent, LoanStatus};
pub use user::{Role, User, UserClaims};
