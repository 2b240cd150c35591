//! Shared helpers: an app with seeded data, tokens and request plumbing

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::Value;
use tower::ServiceExt;

use biblio_server::{
    api,
    config::{AppConfig, SeedConfig},
    models::{
        book::{Book, NewBook},
        user::{NewUser, Role, UserClaims},
    },
    repository::Repository,
    seed, AppState,
};

pub const MULTIPART_BOUNDARY: &str = "biblio-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub repository: Repository,
    pub config: AppConfig,
}

/// App over fresh memory storage, seeded with the admin account (password
/// "admin") and books B001 (5 copies), B002 (3) and B003 (7).
pub async fn spawn_app() -> TestApp {
    let mut config = AppConfig::default();
    config.storage.uploads_dir =
        std::env::temp_dir().join(format!("biblio-uploads-{}", uuid::Uuid::new_v4()));
    config.seed = SeedConfig {
        enabled: true,
        admin_password: "admin".to_string(),
    };

    let repository = Repository::in_memory();
    seed::seed(&repository, &config.seed)
        .await
        .expect("Failed to seed test data");

    let state = AppState::new(config.clone(), repository.clone());
    TestApp {
        router: api::router(state),
        repository,
        config,
    }
}

impl TestApp {
    /// Sign a token directly, skipping the password round trip
    pub fn token_for(&self, username: &str, role: Role) -> String {
        let now = Utc::now().timestamp();
        UserClaims {
            sub: username.to_string(),
            role,
            exp: now + 3600,
            iat: now,
        }
        .create_token(&self.config.auth.jwt_secret)
        .expect("Failed to sign token")
    }

    pub fn admin_token(&self) -> String {
        self.token_for("admin", Role::Admin)
    }

    /// Store a reader account with an unusable password hash. Such accounts
    /// act through signed tokens only.
    pub async fn add_reader(&self, username: &str) -> String {
        self.repository
            .users
            .insert(NewUser {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                password_hash: "unusable".to_string(),
                role: Role::User,
                first_name: username.to_string(),
                last_name: "Reader".to_string(),
                phone: String::new(),
            })
            .await
            .expect("Failed to add reader");
        self.token_for(username, Role::User)
    }

    pub async fn add_book(&self, book_id: &str, quantity: i32) {
        self.repository
            .catalog
            .insert(Book::new(
                NewBook {
                    book_id: book_id.to_string(),
                    title: format!("Title {}", book_id),
                    author: "Test Author".to_string(),
                    isbn: "000-0000000000".to_string(),
                    category: "Test".to_string(),
                    description: String::new(),
                    cover_image: String::new(),
                    quantity,
                },
                Utc::now(),
            ))
            .await
            .expect("Failed to add book");
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        self.dispatch(request).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    /// Send a multipart form; `file` is (field name, file name, bytes)
    pub async fn post_multipart(
        &self,
        uri: &str,
        token: &str,
        fields: &[(&str, &str)],
        file: Option<(&str, &str, &[u8])>,
    ) -> (StatusCode, Value) {
        let mut body: Vec<u8> = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{b}\r\nContent-Disposition: form-data; name=\"{n}\"\r\n\r\n{v}\r\n",
                    b = MULTIPART_BOUNDARY,
                    n = name,
                    v = value
                )
                .as_bytes(),
            );
        }
        if let Some((name, file_name, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{b}\r\nContent-Disposition: form-data; name=\"{n}\"; filename=\"{f}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    b = MULTIPART_BOUNDARY,
                    n = name,
                    f = file_name
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
            )
            .body(Body::from(body))
            .expect("Failed to build request");

        self.dispatch(request).await
    }

    async fn dispatch(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub async fn book(&self, book_id: &str) -> Value {
        let (status, body) = self.get(&format!("/api/books/{}", book_id), None).await;
        assert_eq!(status, StatusCode::OK, "book {} should exist", book_id);
        body
    }
}
