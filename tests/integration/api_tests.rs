//! Catalog, account and access-control endpoints

use axum::http::{Method, StatusCode};
use biblio_server::models::user::Role;
use serde_json::json;

use crate::common::spawn_app;

fn registration(username: &str, email: &str) -> serde_json::Value {
    json!({
        "username": username,
        "password": "secret1",
        "confirmPassword": "secret1",
        "firstName": "Ana",
        "lastName": "Lectora",
        "email": email
    })
}

#[tokio::test]
async fn test_health_and_readiness() {
    let app = spawn_app().await;

    let (status, body) = app.get("/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.get("/api/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_books_are_listed_in_natural_id_order() {
    let app = spawn_app().await;
    app.add_book("B10", 1).await;
    app.add_book("B9", 1).await;

    let (status, body) = app.get("/api/books", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .expect("array of books")
        .iter()
        .map(|b| b["bookId"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["B001", "B002", "B003", "B9", "B10"]);
}

#[tokio::test]
async fn test_unknown_book_is_not_found() {
    let app = spawn_app().await;
    let (status, body) = app.get("/api/books/B404", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].as_str().unwrap().contains("B404"));
}

#[tokio::test]
async fn test_register_rejects_short_username() {
    let app = spawn_app().await;
    let (status, body) = app
        .post("/api/register", None, registration("ab", "ab@example.com"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
}

#[tokio::test]
async fn test_register_then_login() {
    let app = spawn_app().await;

    let (status, body) = app
        .post("/api/register", None, registration("  Lectora ", "Lectora@Example.com"))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["username"], "lectora");
    assert_eq!(body["user"]["email"], "lectora@example.com");
    assert_eq!(body["user"]["role"], "user");
    assert!(body["user"].get("passwordHash").is_none());

    let (status, _) = app
        .post("/api/register", None, registration("LECTORA", "other@example.com"))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .post(
            "/api/login",
            None,
            json!({ "username": "Lectora", "password": "secret1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
    assert_eq!(body["user"]["username"], "lectora");

    let (status, body) = app
        .post(
            "/api/login",
            None,
            json!({ "username": "lectora", "password": "wrong-password" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.get("token").is_none());
}

#[tokio::test]
async fn test_blocked_user_gets_no_token() {
    let app = spawn_app().await;
    let admin = app.admin_token();
    app.post("/api/register", None, registration("lector", "lector@example.com"))
        .await;

    let (status, body) = app
        .post("/api/users/lector/block", Some(&admin), json!({ "block": true }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["blocked"], true);

    let (status, body) = app
        .post(
            "/api/login",
            None,
            json!({ "username": "lector", "password": "secret1" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "AccountBlocked");
    assert!(body.get("token").is_none());
}

#[tokio::test]
async fn test_admin_cannot_block_self_and_readers_cannot_block() {
    let app = spawn_app().await;
    let reader = app.add_reader("lector").await;

    let (status, _) = app
        .post("/api/users/admin/block", Some(&app.admin_token()), json!({ "block": true }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post("/api/users/admin/block", Some(&reader), json!({ "block": true }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_change_password() {
    let app = spawn_app().await;

    let (status, _) = app
        .post(
            "/api/change-password",
            None,
            json!({
                "username": "admin",
                "currentPassword": "not-admin",
                "newPassword": "n3w-pass",
                "confirmPassword": "n3w-pass"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post(
            "/api/change-password",
            None,
            json!({
                "username": "admin",
                "currentPassword": "admin",
                "newPassword": "n3w-pass",
                "confirmPassword": "n3w-pass"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post(
            "/api/login",
            None,
            json!({ "username": "admin", "password": "n3w-pass" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_profile_update_rules() {
    let app = spawn_app().await;
    let reader = app.add_reader("lector").await;
    app.add_reader("otro").await;

    let (status, body) = app
        .send(
            Method::PUT,
            "/api/users/lector",
            Some(&reader),
            Some(json!({ "phone": "555-0101" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phone"], "555-0101");

    let (status, _) = app
        .send(
            Method::PUT,
            "/api/users/lector",
            Some(&reader),
            Some(json!({ "role": "admin" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            Method::PUT,
            "/api/users/lector",
            Some(&reader),
            Some(json!({ "email": "OTRO@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send(
            Method::PUT,
            "/api/users/otro",
            Some(&reader),
            Some(json!({ "phone": "1" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_user_list_is_admin_only() {
    let app = spawn_app().await;
    let reader = app.add_reader("lector").await;

    let (status, _) = app.get("/api/users", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/users", Some(&reader)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.get("/api/users", Some(&app.admin_token())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_create_book_from_form() {
    let app = spawn_app().await;
    let admin = app.admin_token();

    let (status, body) = app
        .post_multipart(
            "/api/books",
            &admin,
            &[
                ("bookId", "B004"),
                ("title", "Rayuela"),
                ("author", "Julio Cortázar"),
                ("isbn", "978-8437604572"),
                ("quantity", "2"),
                ("username", "admin"),
            ],
            Some(("coverImage", "rayuela.jpg", b"jpeg-bytes")),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["availableCopies"], 2);
    assert_eq!(body["isAvailable"], true);
    assert_eq!(body["category"], "Uncategorized");
    let cover = body["coverImage"].as_str().unwrap().to_string();
    assert!(cover.starts_with("/uploads/") && cover.ends_with(".jpg"));

    let (status, _) = app
        .post_multipart(
            "/api/books",
            &admin,
            &[
                ("bookId", "B004"),
                ("title", "Otra"),
                ("author", "Alguien"),
                ("isbn", "1"),
                ("quantity", "1"),
            ],
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app.get("/api/books/history", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["status"], "created");
    assert_eq!(body[0]["bookTitle"], "Rayuela");
    assert_eq!(body[0]["isHistoryOnly"], true);
}

#[tokio::test]
async fn test_route_name_is_refused_as_book_id() {
    let app = spawn_app().await;
    let admin = app.admin_token();

    let (status, body) = app
        .post_multipart(
            "/api/books",
            &admin,
            &[
                ("bookId", "history"),
                ("title", "Historia"),
                ("author", "Heródoto"),
                ("isbn", "978-8424935863"),
                ("quantity", "1"),
            ],
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");

    let (_, books) = app.get("/api/books", None).await;
    assert_eq!(books.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_book_mutations_require_admin() {
    let app = spawn_app().await;
    let reader = app.add_reader("lector").await;

    let (status, _) = app
        .post_multipart(
            "/api/books",
            &reader,
            &[("bookId", "B005"), ("title", "X"), ("author", "Y"), ("isbn", "Z"), ("quantity", "1")],
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(Method::DELETE, "/api/books/B001", Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send(Method::DELETE, "/api/books/B001", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_quantity_edit_moves_available_copies() {
    let app = spawn_app().await;
    let admin = app.admin_token();
    let reader = app.add_reader("lector").await;

    app.post("/api/books/B002/loan", Some(&reader), json!({})).await;

    let (status, body) = app
        .send(
            Method::PUT,
            "/api/books/B002",
            Some(&admin),
            Some(json!({ "quantity": 6, "title": "" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quantity"], 6);
    assert_eq!(body["availableCopies"], 5);
    assert_eq!(body["title"], "El Principito");

    let (status, _) = app
        .send(
            Method::PUT,
            "/api/books/B404",
            Some(&admin),
            Some(json!({ "quantity": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_is_refused_while_on_loan() {
    let app = spawn_app().await;
    let admin = app.admin_token();
    let reader = app.add_reader("lector").await;

    app.post("/api/books/B003/loan", Some(&reader), json!({})).await;

    let (status, body) = app
        .send(Method::DELETE, "/api/books/B003", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "BookHasOpenLoans");

    app.post("/api/books/B003/return", Some(&reader), json!({})).await;

    let (status, body) = app
        .send(Method::DELETE, "/api/books/B003", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["book"]["bookId"], "B003");

    let (status, _) = app
        .send(Method::DELETE, "/api/books/B003", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // History keeps the title of the deleted book
    let (_, history) = app.get("/api/books/user/lector/history", Some(&reader)).await;
    assert_eq!(history[0]["bookTitle"], "1984");
}

#[tokio::test]
async fn test_token_with_wrong_secret_is_rejected() {
    let app = spawn_app().await;
    let forged = biblio_server::models::user::UserClaims {
        sub: "admin".to_string(),
        role: Role::Admin,
        exp: chrono::Utc::now().timestamp() + 600,
        iat: chrono::Utc::now().timestamp(),
    }
    .create_token("not-the-server-secret")
    .unwrap();

    let (status, _) = app.get("/api/users", Some(&forged)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
