//! Borrow/return lifecycle, limits and concurrency

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;

use crate::common::spawn_app;

#[tokio::test]
async fn test_borrow_then_return_restores_stock() {
    let app = spawn_app().await;
    let alice = app.add_reader("alice").await;

    let (status, body) = app
        .post("/api/books/B001/loan", Some(&alice), json!({ "username": "alice" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["book"]["availableCopies"], 4);
    assert_eq!(body["book"]["isAvailable"], true);
    assert!(body["message"].as_str().unwrap().contains("Cien Años de Soledad"));

    let (status, body) = app
        .post("/api/books/B001/return", Some(&alice), json!({ "username": "alice" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["book"]["availableCopies"], 5);
    assert_eq!(app.book("B001").await["availableCopies"], 5);
}

#[tokio::test]
async fn test_second_return_has_no_active_loan() {
    let app = spawn_app().await;
    let alice = app.add_reader("alice").await;

    app.post("/api/books/B002/loan", Some(&alice), json!({})).await;
    let (status, _) = app.post("/api/books/B002/return", Some(&alice), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.post("/api/books/B002/return", Some(&alice), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "NoActiveLoan");
    assert_eq!(app.book("B002").await["availableCopies"], 3);
}

#[tokio::test]
async fn test_return_without_loan_is_rejected() {
    let app = spawn_app().await;
    let alice = app.add_reader("alice").await;

    let (status, body) = app.post("/api/books/B003/return", Some(&alice), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "NoActiveLoan");
    assert_eq!(app.book("B003").await["availableCopies"], 7);
}

#[tokio::test]
async fn test_last_copy_flips_availability() {
    let app = spawn_app().await;
    app.add_book("B050", 1).await;
    let alice = app.add_reader("alice").await;
    let bob = app.add_reader("bob").await;

    let (status, body) = app.post("/api/books/B050/loan", Some(&alice), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["book"]["availableCopies"], 0);
    assert_eq!(body["book"]["isAvailable"], false);

    let (status, body) = app.post("/api/books/B050/loan", Some(&bob), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BookUnavailable");
}

#[tokio::test]
async fn test_sixth_loan_exceeds_limit() {
    let app = spawn_app().await;
    let alice = app.add_reader("alice").await;
    for id in ["B004", "B005", "B006"] {
        app.add_book(id, 2).await;
    }

    for id in ["B001", "B002", "B003", "B004", "B005"] {
        let (status, _) = app
            .post(&format!("/api/books/{}/loan", id), Some(&alice), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK, "loan of {} should succeed", id);
    }

    let (status, body) = app.post("/api/books/B006/loan", Some(&alice), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["currentLoans"], 5);
    assert_eq!(body["maxLoans"], 5);
    assert!(body["message"].is_string());
    assert_eq!(app.book("B006").await["availableCopies"], 2);

    // Returning one frees a slot
    app.post("/api/books/B001/return", Some(&alice), json!({})).await;
    let (status, _) = app.post("/api/books/B006/loan", Some(&alice), json!({})).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_same_book_cannot_be_borrowed_twice() {
    let app = spawn_app().await;
    let alice = app.add_reader("alice").await;

    app.post("/api/books/B001/loan", Some(&alice), json!({})).await;
    let (status, body) = app.post("/api/books/B001/loan", Some(&alice), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "AlreadyBorrowed");
    assert_eq!(app.book("B001").await["availableCopies"], 4);
}

#[tokio::test]
async fn test_readers_act_only_for_themselves() {
    let app = spawn_app().await;
    let alice = app.add_reader("alice").await;
    app.add_reader("bob").await;

    let (status, _) = app
        .post("/api/books/B001/loan", Some(&alice), json!({ "username": "bob" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/api/books/user/bob/loans", Some(&alice)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/api/books/history", Some(&alice)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Admins may act on behalf of a reader
    let (status, body) = app
        .post(
            "/api/books/B001/loan",
            Some(&app.admin_token()),
            json!({ "username": "bob" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["book"]["availableCopies"], 4);
}

#[tokio::test]
async fn test_blocked_reader_cannot_borrow_with_old_token() {
    let app = spawn_app().await;
    let alice = app.add_reader("alice").await;

    let (status, _) = app
        .post(
            "/api/users/alice/block",
            Some(&app.admin_token()),
            json!({ "block": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.post("/api/books/B001/loan", Some(&alice), json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "AccountBlocked");
    assert_eq!(app.book("B001").await["availableCopies"], 5);
}

#[tokio::test]
async fn test_open_loans_and_history() {
    let app = spawn_app().await;
    let alice = app.add_reader("alice").await;

    app.post("/api/books/B001/loan", Some(&alice), json!({})).await;
    app.post("/api/books/B002/loan", Some(&alice), json!({})).await;
    app.post("/api/books/B001/return", Some(&alice), json!({})).await;

    let (status, body) = app.get("/api/books/user/alice/loans", Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["activeLoans"], 1);
    assert_eq!(body["maxLoans"], 5);
    let loans = body["loans"].as_array().unwrap();
    assert_eq!(loans.len(), 1);
    assert_eq!(loans[0]["bookId"], "B002");
    assert_eq!(loans[0]["isOverdue"], false);
    assert!(loans[0]["dueAt"].is_string());

    let (status, body) = app.get("/api/books/user/alice/history", Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    let statuses: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["returned", "borrowed", "borrowed"]);
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .all(|e| e["isHistoryOnly"] == true && e["kind"] == "audit"));
}

#[tokio::test]
async fn test_current_loan_lookup() {
    let app = spawn_app().await;
    let alice = app.add_reader("alice").await;
    let bob = app.add_reader("bob").await;

    app.post("/api/books/B001/loan", Some(&alice), json!({})).await;

    let (status, body) = app.get("/api/books/B001/loan", Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["bookId"], "B001");
    assert!(body["dueAt"].is_string());

    let (status, _) = app.get("/api/books/B002/loan", Some(&alice)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .get("/api/books/B001/loan?username=alice", Some(&bob))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .get("/api/books/B001/loan?username=Alice", Some(&app.admin_token()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");

    app.post("/api/books/B001/return", Some(&alice), json!({})).await;
    let (status, _) = app.get("/api/books/B001/loan", Some(&alice)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_borrows_of_last_copy() {
    let app = Arc::new(spawn_app().await);
    app.add_book("B099", 1).await;

    let mut tokens = Vec::new();
    for i in 0..10 {
        tokens.push(app.add_reader(&format!("reader{}", i)).await);
    }

    let handles: Vec<_> = tokens
        .into_iter()
        .map(|token| {
            let app = app.clone();
            tokio::spawn(async move {
                app.post("/api/books/B099/loan", Some(&token), json!({}))
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        if status == StatusCode::OK {
            successes += 1;
        } else {
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "BookUnavailable");
        }
    }

    assert_eq!(successes, 1);
    let book = app.book("B099").await;
    assert_eq!(book["availableCopies"], 0);
    assert_eq!(book["isAvailable"], false);
}
