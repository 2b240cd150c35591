//! Book model and stock arithmetic

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// Ids that collide with fixed routes under `/books/`
const RESERVED_BOOK_IDS: &[&str] = &["history"];

/// A catalog entry with its stock counts
///
/// `available_copies` always stays within `0..=quantity`; it is only changed
/// through [`Book::take_copy`], [`Book::put_back_copy`] and [`Book::apply_patch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub book_id: String,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: String,
    pub description: String,
    pub cover_image: String,
    /// Copies owned by the library
    pub quantity: i32,
    /// Copies not currently on loan
    pub available_copies: i32,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}

impl Book {
    pub fn new(new_book: NewBook, created_at: DateTime<Utc>) -> Self {
        Self {
            book_id: new_book.book_id,
            title: new_book.title,
            author: new_book.author,
            isbn: new_book.isbn,
            category: new_book.category,
            description: new_book.description,
            cover_image: new_book.cover_image,
            quantity: new_book.quantity,
            available_copies: new_book.quantity,
            is_available: new_book.quantity > 0,
            created_at,
        }
    }

    /// Hand out one copy. Returns false (and changes nothing) when none is left.
    pub fn take_copy(&mut self) -> bool {
        if self.available_copies <= 0 {
            return false;
        }
        self.available_copies -= 1;
        self.refresh_availability();
        true
    }

    /// Take one copy back, never exceeding the owned quantity
    pub fn put_back_copy(&mut self) {
        if self.available_copies < self.quantity {
            self.available_copies += 1;
        }
        self.refresh_availability();
    }

    /// Apply an admin edit. A quantity change shifts `available_copies` by the
    /// same delta, clamped to `0..=quantity`.
    pub fn apply_patch(&mut self, patch: &BookPatch) {
        if let Some(title) = non_empty(&patch.title) {
            self.title = title;
        }
        if let Some(author) = non_empty(&patch.author) {
            self.author = author;
        }
        if let Some(isbn) = non_empty(&patch.isbn) {
            self.isbn = isbn;
        }
        if let Some(category) = non_empty(&patch.category) {
            self.category = category;
        }
        if let Some(ref description) = patch.description {
            self.description = description.clone();
        }
        if let Some(ref cover_image) = patch.cover_image {
            self.cover_image = cover_image.clone();
        }
        if let Some(quantity) = patch.quantity {
            let delta = quantity - self.quantity;
            self.quantity = quantity;
            self.available_copies = (self.available_copies + delta).clamp(0, quantity.max(0));
        }
        self.refresh_availability();
    }

    fn refresh_availability(&mut self) {
        self.is_available = self.available_copies > 0;
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Database row for the `books` table
#[derive(Debug, Clone, FromRow)]
pub struct BookRow {
    book_id: String,
    title: String,
    author: String,
    isbn: String,
    category: String,
    description: String,
    cover_image: String,
    quantity: i32,
    available_copies: i32,
    created_at: DateTime<Utc>,
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        Book {
            book_id: row.book_id,
            title: row.title,
            author: row.author,
            isbn: row.isbn,
            category: row.category,
            description: row.description,
            cover_image: row.cover_image,
            quantity: row.quantity,
            available_copies: row.available_copies,
            is_available: row.available_copies > 0,
            created_at: row.created_at,
        }
    }
}

/// Validated input for adding a book
#[derive(Debug, Clone)]
pub struct NewBook {
    pub book_id: String,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: String,
    pub description: String,
    pub cover_image: String,
    pub quantity: i32,
}

/// Raw fields of an add-book request (multipart form)
#[derive(Debug, Clone, Default)]
pub struct CreateBook {
    pub book_id: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub quantity: Option<String>,
}

impl CreateBook {
    /// Check required fields and parse the quantity
    pub fn validate(self) -> AppResult<NewBook> {
        let book_id = non_empty(&self.book_id);
        let title = non_empty(&self.title);
        let author = non_empty(&self.author);
        let isbn = non_empty(&self.isbn);
        let quantity = non_empty(&self.quantity);

        let (Some(book_id), Some(title), Some(author), Some(isbn), Some(quantity)) =
            (book_id, title, author, isbn, quantity)
        else {
            return Err(AppError::Validation(
                "bookId, title, author, isbn and quantity are required".to_string(),
            ));
        };

        if RESERVED_BOOK_IDS.contains(&book_id.as_str()) || book_id.contains('/') {
            return Err(AppError::Validation(format!(
                "\"{}\" cannot be used as a book id",
                book_id
            )));
        }

        let quantity: i32 = quantity
            .parse()
            .map_err(|_| AppError::Validation("quantity must be a whole number".to_string()))?;
        if quantity < 1 {
            return Err(AppError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }

        Ok(NewBook {
            book_id,
            title,
            author,
            isbn,
            category: non_empty(&self.category).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            description: self.description.unwrap_or_default(),
            cover_image: self.cover_image.unwrap_or_default(),
            quantity,
        })
    }
}

/// Partial update of a book; absent or blank text fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub quantity: Option<i32>,
}

impl BookPatch {
    pub fn validate(&self) -> AppResult<()> {
        match self.quantity {
            Some(q) if q < 0 => Err(AppError::Validation(
                "quantity cannot be negative".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Compare book ids the way a person reads them: digit runs compare by
/// numeric value, so "B2" sorts before "B10".
pub fn compare_book_ids(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars().peekable();
    let mut b_chars = b.chars().peekable();

    loop {
        match (a_chars.peek().copied(), b_chars.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() => {
                let da = take_digits(&mut a_chars);
                let db = take_digits(&mut b_chars);
                let ta = da.trim_start_matches('0');
                let tb = db.trim_start_matches('0');
                let ord = ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(ca), Some(cb)) => {
                let ord = ca
                    .to_lowercase()
                    .cmp(cb.to_lowercase())
                    .then_with(|| ca.cmp(&cb));
                if ord != Ordering::Equal {
                    return ord;
                }
                a_chars.next();
                b_chars.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
        digits.push(c);
        chars.next();
    }
    digits
}
