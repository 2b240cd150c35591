//! Loan ledger entries: open/closed loans and history-only audit records

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::error::AppError;

/// What happened in a ledger event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Borrowed,
    Returned,
    Created,
    Edited,
    Deleted,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Borrowed => "borrowed",
            LoanStatus::Returned => "returned",
            LoanStatus::Created => "created",
            LoanStatus::Edited => "edited",
            LoanStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "borrowed" => Ok(LoanStatus::Borrowed),
            "returned" => Ok(LoanStatus::Returned),
            "created" => Ok(LoanStatus::Created),
            "edited" => Ok(LoanStatus::Edited),
            "deleted" => Ok(LoanStatus::Deleted),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

/// Fields shared by every ledger entry
#[derive(Debug, Clone, PartialEq)]
pub struct LoanEvent {
    pub id: i64,
    pub username: String,
    pub book_id: String,
    /// Title of the book when the event was recorded, not a live reference
    pub book_title: String,
    pub status: LoanStatus,
    pub occurred_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

/// One row of the ledger.
///
/// `ActiveLoan` entries carry loan state: an entry with status `Borrowed` and
/// no `returned_at` is an open loan. `AuditRecord` entries are history only and
/// never count toward availability or loan limits.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEntry {
    ActiveLoan(LoanEvent),
    AuditRecord(LoanEvent),
}

impl LedgerEntry {
    pub fn event(&self) -> &LoanEvent {
        match self {
            LedgerEntry::ActiveLoan(event) | LedgerEntry::AuditRecord(event) => event,
        }
    }

    pub fn is_history_only(&self) -> bool {
        matches!(self, LedgerEntry::AuditRecord(_))
    }

    /// Open loan: an active-loan entry still `Borrowed` with no return date
    pub fn is_open_loan(&self) -> bool {
        match self {
            LedgerEntry::ActiveLoan(event) => {
                event.status == LoanStatus::Borrowed && event.returned_at.is_none()
            }
            LedgerEntry::AuditRecord(_) => false,
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            LedgerEntry::ActiveLoan(_) => EntryKind::Loan,
            LedgerEntry::AuditRecord(_) => EntryKind::Audit,
        }
    }
}

/// Discriminant stored with each ledger row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Loan,
    Audit,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Loan => "loan",
            EntryKind::Audit => "audit",
        }
    }
}

/// Database row for the `loan_events` table
#[derive(Debug, Clone, FromRow)]
pub struct LoanEventRow {
    id: i64,
    kind: String,
    username: String,
    book_id: String,
    book_title: String,
    status: String,
    occurred_at: DateTime<Utc>,
    returned_at: Option<DateTime<Utc>>,
}

impl TryFrom<LoanEventRow> for LedgerEntry {
    type Error = AppError;

    fn try_from(row: LoanEventRow) -> Result<Self, Self::Error> {
        let event = LoanEvent {
            id: row.id,
            username: row.username,
            book_id: row.book_id,
            book_title: row.book_title,
            status: row.status.parse().map_err(AppError::Internal)?,
            occurred_at: row.occurred_at,
            returned_at: row.returned_at,
        };
        match row.kind.as_str() {
            "loan" => Ok(LedgerEntry::ActiveLoan(event)),
            "audit" => Ok(LedgerEntry::AuditRecord(event)),
            other => Err(AppError::Internal(format!("Invalid ledger entry kind: {}", other))),
        }
    }
}

/// A history-only record to append
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditRecord {
    pub username: String,
    pub book_id: String,
    pub book_title: String,
    pub status: LoanStatus,
    pub occurred_at: DateTime<Utc>,
}

/// A borrow request as handed to the ledger, which applies it atomically
/// together with the stock decrement
#[derive(Debug, Clone, PartialEq)]
pub struct Checkout {
    pub username: String,
    pub book_id: String,
    pub max_active_loans: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Result of a successful checkout or checkin
#[derive(Debug, Clone, PartialEq)]
pub struct LoanOutcome {
    pub book: crate::models::book::Book,
    pub loan: LoanEvent,
}

/// Ledger entry as returned by the API
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoanEventResponse {
    pub id: i64,
    pub kind: EntryKind,
    pub is_history_only: bool,
    pub username: String,
    pub book_id: String,
    pub book_title: String,
    pub status: LoanStatus,
    pub occurred_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl From<LedgerEntry> for LoanEventResponse {
    fn from(entry: LedgerEntry) -> Self {
        let kind = entry.kind();
        let is_history_only = entry.is_history_only();
        let event = match entry {
            LedgerEntry::ActiveLoan(event) | LedgerEntry::AuditRecord(event) => event,
        };
        LoanEventResponse {
            id: event.id,
            kind,
            is_history_only,
            username: event.username,
            book_id: event.book_id,
            book_title: event.book_title,
            status: event.status,
            occurred_at: event.occurred_at,
            returned_at: event.returned_at,
        }
    }
}

/// Open loan with its presentation-only due date
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoanDetails {
    pub id: i64,
    pub username: String,
    pub book_id: String,
    pub book_title: String,
    pub occurred_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub is_overdue: bool,
}

impl LoanDetails {
    pub fn from_event(event: LoanEvent, loan_period_days: i64, now: DateTime<Utc>) -> Self {
        let due_at = event.occurred_at + Duration::days(loan_period_days);
        LoanDetails {
            id: event.id,
            username: event.username,
            book_id: event.book_id,
            book_title: event.book_title,
            occurred_at: event.occurred_at,
            due_at,
            is_overdue: due_at < now,
        }
    }
}

/// Newest first; ids break ties between events recorded in the same instant
pub fn newest_first(a: &LedgerEntry, b: &LedgerEntry) -> std::cmp::Ordering {
    let (a, b) = (a.event(), b.event());
    b.occurred_at.cmp(&a.occurred_at).then_with(|| b.id.cmp(&a.id))
}
