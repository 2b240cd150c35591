//! First-run data: an admin account and a few sample books

use chrono::Utc;

use crate::{
    config::SeedConfig,
    error::AppResult,
    models::{
        book::{Book, NewBook},
        user::{NewUser, Role},
    },
    repository::Repository,
    services::users::hash_password,
};

struct SampleBook {
    book_id: &'static str,
    title: &'static str,
    author: &'static str,
    isbn: &'static str,
    category: &'static str,
    quantity: i32,
}

const SAMPLE_BOOKS: [SampleBook; 3] = [
    SampleBook {
        book_id: "B001",
        title: "Cien Años de Soledad",
        author: "Gabriel García Márquez",
        isbn: "978-0307474728",
        category: "Novel",
        quantity: 5,
    },
    SampleBook {
        book_id: "B002",
        title: "El Principito",
        author: "Antoine de Saint-Exupéry",
        isbn: "978-0156013926",
        category: "Fable",
        quantity: 3,
    },
    SampleBook {
        book_id: "B003",
        title: "1984",
        author: "George Orwell",
        isbn: "978-0451524935",
        category: "Dystopia",
        quantity: 7,
    },
];

/// Seed only stores that are still empty, so restarts never duplicate data
pub async fn seed(repository: &Repository, config: &SeedConfig) -> AppResult<()> {
    if !config.enabled {
        return Ok(());
    }

    if repository.users.count().await? == 0 {
        repository
            .users
            .insert(NewUser {
                username: "admin".to_string(),
                email: "admin@biblio.local".to_string(),
                password_hash: hash_password(&config.admin_password)?,
                role: Role::Admin,
                first_name: "Admin".to_string(),
                last_name: "Biblio".to_string(),
                phone: String::new(),
            })
            .await?;
        tracing::info!("Seeded admin account");
    }

    if repository.catalog.count().await? == 0 {
        let now = Utc::now();
        for sample in &SAMPLE_BOOKS {
            repository
                .catalog
                .insert(Book::new(
                    NewBook {
                        book_id: sample.book_id.to_string(),
                        title: sample.title.to_string(),
                        author: sample.author.to_string(),
                        isbn: sample.isbn.to_string(),
                        category: sample.category.to_string(),
                        description: String::new(),
                        cover_image: String::new(),
                        quantity: sample.quantity,
                    },
                    now,
                ))
                .await?;
        }
        tracing::info!(count = SAMPLE_BOOKS.len(), "Seeded sample books");
    }

    Ok(())
}
