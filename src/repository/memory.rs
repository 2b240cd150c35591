//! In-process storage backend
//!
//! All state sits behind one `RwLock`. Every mutation runs its whole
//! check-and-mutate sequence under the write guard without awaiting, so a
//! dropped request can never leave half an update behind.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{compare_book_ids, Book, BookPatch},
        ledger::{
            newest_first, Checkout, LedgerEntry, LoanEvent, LoanOutcome, LoanStatus,
            NewAuditRecord,
        },
        user::{NewUser, UpdateUser, User},
    },
    repository::{CatalogStore, LoanLedger, UserStore},
};

#[derive(Debug, Default)]
struct MemoryState {
    books: HashMap<String, Book>,
    events: Vec<LedgerEntry>,
    next_event_id: i64,
    users: HashMap<String, User>,
}

impl MemoryState {
    fn push_event(&mut self, make: impl FnOnce(LoanEvent) -> LedgerEntry, event: LoanEvent) -> LedgerEntry {
        self.next_event_id += 1;
        let entry = make(LoanEvent {
            id: self.next_event_id,
            ..event
        });
        self.events.push(entry.clone());
        entry
    }

    fn open_loans<'a>(&'a self, username: &'a str) -> impl Iterator<Item = &'a LoanEvent> + 'a {
        self.events
            .iter()
            .filter(|entry| entry.is_open_loan())
            .map(LedgerEntry::event)
            .filter(move |event| event.username == username)
    }

    fn open_loans_on(&self, book_id: &str) -> usize {
        self.events
            .iter()
            .filter(|entry| entry.is_open_loan() && entry.event().book_id == book_id)
            .count()
    }

    /// Index of the newest open loan for the pair
    fn newest_open_loan(&self, username: &str, book_id: &str) -> Option<usize> {
        self.events
            .iter()
            .enumerate()
            .filter(|(_, entry)| {
                entry.is_open_loan()
                    && entry.event().username == username
                    && entry.event().book_id == book_id
            })
            .max_by(|(_, a), (_, b)| newest_first(b, a))
            .map(|(index, _)| index)
    }

    fn audit_entries<'a>(&'a self, username: Option<&'a str>) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = self
            .events
            .iter()
            .filter(|entry| entry.is_history_only())
            .filter(|entry| username.map_or(true, |u| entry.event().username == u))
            .cloned()
            .collect();
        entries.sort_by(newest_first);
        entries
    }
}

/// Implements every storage trait over shared process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn insert(&self, book: Book) -> AppResult<Book> {
        let mut state = self.state.write().await;
        if state.books.contains_key(&book.book_id) {
            return Err(AppError::DuplicateId(format!(
                "Book with id {} already exists",
                book.book_id
            )));
        }
        state.books.insert(book.book_id.clone(), book.clone());
        Ok(book)
    }

    async fn get(&self, book_id: &str) -> AppResult<Option<Book>> {
        Ok(self.state.read().await.books.get(book_id).cloned())
    }

    async fn list(&self) -> AppResult<Vec<Book>> {
        let mut books: Vec<Book> = self.state.read().await.books.values().cloned().collect();
        books.sort_by(|a, b| compare_book_ids(&a.book_id, &b.book_id));
        Ok(books)
    }

    async fn update(&self, book_id: &str, patch: &BookPatch) -> AppResult<Book> {
        let mut state = self.state.write().await;
        let book = state
            .books
            .get_mut(book_id)
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", book_id)))?;
        book.apply_patch(patch);
        Ok(book.clone())
    }

    async fn remove(&self, book_id: &str) -> AppResult<Book> {
        let mut state = self.state.write().await;
        if !state.books.contains_key(book_id) {
            return Err(AppError::NotFound(format!("Book {} not found", book_id)));
        }
        let open_loans = state.open_loans_on(book_id);
        if open_loans > 0 {
            return Err(AppError::Conflict(format!(
                "Book {} has {} open loan(s) and cannot be deleted",
                book_id, open_loans
            )));
        }
        state
            .books
            .remove(book_id)
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", book_id)))
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.state.read().await.books.len() as i64)
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl LoanLedger for MemoryStore {
    async fn checkout(&self, checkout: &Checkout) -> AppResult<LoanOutcome> {
        let mut state = self.state.write().await;

        if !state.users.contains_key(&checkout.username) {
            return Err(AppError::NotFound(format!("User {} not found", checkout.username)));
        }

        let current = state.open_loans(&checkout.username).count() as i64;
        if current >= checkout.max_active_loans {
            return Err(AppError::LoanLimitExceeded {
                current,
                max: checkout.max_active_loans,
            });
        }

        if !state.books.contains_key(&checkout.book_id) {
            return Err(AppError::NotFound(format!("Book {} not found", checkout.book_id)));
        }

        if state
            .newest_open_loan(&checkout.username, &checkout.book_id)
            .is_some()
        {
            return Err(AppError::AlreadyBorrowed(format!(
                "{} already has book {} on loan",
                checkout.username, checkout.book_id
            )));
        }

        let book = state
            .books
            .get_mut(&checkout.book_id)
            .and_then(|book| book.take_copy().then(|| book.clone()))
            .ok_or_else(|| {
                AppError::BookUnavailable(format!(
                    "No copies of {} available for loan",
                    checkout.book_id
                ))
            })?;

        let entry = state.push_event(
            LedgerEntry::ActiveLoan,
            LoanEvent {
                id: 0,
                username: checkout.username.clone(),
                book_id: checkout.book_id.clone(),
                book_title: book.title.clone(),
                status: LoanStatus::Borrowed,
                occurred_at: checkout.occurred_at,
                returned_at: None,
            },
        );

        Ok(LoanOutcome {
            book,
            loan: entry.event().clone(),
        })
    }

    async fn checkin(
        &self,
        username: &str,
        book_id: &str,
        returned_at: DateTime<Utc>,
    ) -> AppResult<LoanOutcome> {
        let mut state = self.state.write().await;

        let index = state.newest_open_loan(username, book_id).ok_or_else(|| {
            AppError::NoActiveLoan(format!("{} has no active loan for book {}", username, book_id))
        })?;

        // Checked before closing the loan so a failure leaves nothing changed
        if !state.books.contains_key(book_id) {
            return Err(AppError::NotFound(format!("Book {} not found", book_id)));
        }

        let loan = match &mut state.events[index] {
            LedgerEntry::ActiveLoan(event) | LedgerEntry::AuditRecord(event) => {
                event.status = LoanStatus::Returned;
                event.returned_at = Some(returned_at);
                event.clone()
            }
        };

        let book = state
            .books
            .get_mut(book_id)
            .map(|book| {
                book.put_back_copy();
                book.clone()
            })
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", book_id)))?;

        Ok(LoanOutcome { book, loan })
    }

    async fn append_audit(&self, record: &NewAuditRecord) -> AppResult<LedgerEntry> {
        let mut state = self.state.write().await;
        Ok(state.push_event(
            LedgerEntry::AuditRecord,
            LoanEvent {
                id: 0,
                username: record.username.clone(),
                book_id: record.book_id.clone(),
                book_title: record.book_title.clone(),
                status: record.status,
                occurred_at: record.occurred_at,
                returned_at: None,
            },
        ))
    }

    async fn active_loan_count(&self, username: &str) -> AppResult<i64> {
        Ok(self.state.read().await.open_loans(username).count() as i64)
    }

    async fn open_loan_for(&self, username: &str, book_id: &str) -> AppResult<Option<LoanEvent>> {
        let state = self.state.read().await;
        Ok(state
            .newest_open_loan(username, book_id)
            .map(|index| state.events[index].event().clone()))
    }

    async fn open_loans_for_user(&self, username: &str) -> AppResult<Vec<LoanEvent>> {
        let state = self.state.read().await;
        let mut loans: Vec<LoanEvent> = state.open_loans(username).cloned().collect();
        loans.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at).then_with(|| a.id.cmp(&b.id)));
        Ok(loans)
    }

    async fn history_for_user(&self, username: &str) -> AppResult<Vec<LedgerEntry>> {
        Ok(self.state.read().await.audit_entries(Some(username)))
    }

    async fn full_history(&self) -> AppResult<Vec<LedgerEntry>> {
        Ok(self.state.read().await.audit_entries(None))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: NewUser) -> AppResult<User> {
        let mut state = self.state.write().await;
        let username = user.username.to_lowercase();
        let email = user.email.to_lowercase();
        if state.users.contains_key(&username) || state.users.values().any(|u| u.email == email) {
            return Err(AppError::DuplicateIdentity(
                "Username or email already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let user = User {
            username: username.clone(),
            email,
            password_hash: user.password_hash,
            role: user.role,
            blocked: false,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(username, user.clone());
        Ok(user)
    }

    async fn get(&self, username: &str) -> AppResult<Option<User>> {
        Ok(self
            .state
            .read()
            .await
            .users
            .get(&username.to_lowercase())
            .cloned())
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        let mut users: Vec<User> = self.state.read().await.users.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn identity_taken(&self, username: &str, email: &str) -> AppResult<bool> {
        let state = self.state.read().await;
        let email = email.to_lowercase();
        Ok(state.users.contains_key(&username.to_lowercase())
            || state.users.values().any(|u| u.email == email))
    }

    async fn email_taken(&self, email: &str, except_username: &str) -> AppResult<bool> {
        let state = self.state.read().await;
        let email = email.to_lowercase();
        let except = except_username.to_lowercase();
        Ok(state
            .users
            .values()
            .any(|u| u.email == email && u.username != except))
    }

    async fn update_profile(&self, username: &str, update: &UpdateUser) -> AppResult<User> {
        let mut state = self.state.write().await;
        let key = username.to_lowercase();
        let new_email = update.email.as_ref().map(|e| e.to_lowercase());

        if let Some(ref email) = new_email {
            if state
                .users
                .values()
                .any(|u| &u.email == email && u.username != key)
            {
                return Err(AppError::DuplicateIdentity("Email already exists".to_string()));
            }
        }

        let user = state
            .users
            .get_mut(&key)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", username)))?;

        if let Some(ref first_name) = update.first_name {
            user.first_name = first_name.clone();
        }
        if let Some(ref last_name) = update.last_name {
            user.last_name = last_name.clone();
        }
        if let Some(ref phone) = update.phone {
            user.phone = phone.clone();
        }
        if let Some(email) = new_email {
            user.email = email;
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn set_blocked(&self, username: &str, blocked: bool) -> AppResult<User> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&username.to_lowercase())
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", username)))?;
        user.blocked = blocked;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn set_password(&self, username: &str, password_hash: &str) -> AppResult<()> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&username.to_lowercase())
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", username)))?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.state.read().await.users.len() as i64)
    }
}
