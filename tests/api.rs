//! HTTP level tests driving the router directly, without binding a socket.
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use book_swap::{
    api::{AppState, router},
    identity::User,
    ledger::{Book, BookLedger},
    store::SledStore,
    types::BookId,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::{TempDir, tempdir};
use tower::ServiceExt;

struct Fixture {
    _dir: TempDir,
    store: Arc<SledStore>,
    alice: User,
    carol: User,
    dune: BookId,
}

fn fixture(name: &str) -> Fixture {
    let dir = tempdir().unwrap();
    let store = Arc::new(SledStore::open(dir.path().join(name)).unwrap());

    let alice = User::new("Alice", "alice@example.com").unwrap();
    let carol = User::new("Carol", "carol@example.com").unwrap();
    store.put_user(&alice).unwrap();
    store.put_user(&carol).unwrap();

    let dune = Book::new("Dune", "Frank Herbert", alice.id.clone())
        .unwrap()
        .set_photo("covers/dune.png");
    store.put_book(&dune).unwrap();

    Fixture {
        _dir: dir,
        store,
        alice,
        carol,
        dune: dune.id,
    }
}

async fn call(
    store: &Arc<SledStore>,
    method: &str,
    uri: &str,
    caller: Option<&User>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = caller {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", user.id));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = router(AppState::new(Arc::clone(store)))
        .oneshot(request)
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn initiate_returns_populated_trade() {
    let fx = fixture("initiate.db");

    let (status, body) = call(
        &fx.store,
        "POST",
        "/trades",
        Some(&fx.carol),
        Some(json!({ "requestedBookId": fx.dune, "notes": "please" })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["owner"]["name"], "Alice");
    assert_eq!(body["requester"]["email"], "carol@example.com");
    assert_eq!(body["requestedBook"]["title"], "Dune");
    assert_eq!(body["requestedBook"]["photo"], "covers/dune.png");
    assert_eq!(body["notesFromRequester"], "please");
    assert_eq!(body["counterAcceptedByRequester"], false);
    assert!(body["tradeDate"].is_null());
}

#[tokio::test]
async fn missing_credentials_are_unauthorized() {
    let fx = fixture("unauthorized.db");

    let (status, body) = call(&fx.store, "GET", "/trades", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].is_string());

    let stranger = User::new("Mallory", "mallory@example.com").unwrap();
    let (status, _) = call(&fx.store, "GET", "/trades", Some(&stranger), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn accept_flow_maps_errors_to_status_codes() {
    let fx = fixture("accept_flow.db");

    let (_, created) = call(
        &fx.store,
        "POST",
        "/trades",
        Some(&fx.carol),
        Some(json!({ "requestedBookId": fx.dune })),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_owned();

    // requester cannot accept
    let (status, body) = call(
        &fx.store,
        "PUT",
        &format!("/trades/{id}/accept"),
        Some(&fx.carol),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "You are not authorized to accept this trade.");

    let (status, body) = call(
        &fx.store,
        "PUT",
        &format!("/trades/{id}/accept"),
        Some(&fx.alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Trade accepted successfully!");
    assert_eq!(fx.store.fetch_book(&fx.dune).unwrap().unwrap().owner, fx.carol.id);

    let (status, body) = call(
        &fx.store,
        "PUT",
        &format!("/trades/{id}/accept"),
        Some(&fx.alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Trade is not in a pending state.");

    let (status, _) = call(
        &fx.store,
        "DELETE",
        &format!("/trades/{id}"),
        Some(&fx.carol),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &fx.store,
        "PUT",
        &format!("/trades/{id}/complete"),
        Some(&fx.carol),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert!(body["tradeDate"].is_string());

    let (status, body) = call(
        &fx.store,
        "GET",
        &format!("/trades/{id}/history"),
        Some(&fx.alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let actions: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["kind"]["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, vec!["initiate", "accept", "complete"]);
}

#[tokio::test]
async fn respond_validates_status_and_trade() {
    let fx = fixture("respond.db");

    let (status, body) = call(
        &fx.store,
        "PUT",
        "/trades/trade_ghost",
        Some(&fx.alice),
        Some(json!({ "status": "accepted" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Trade request not found.");

    let (_, created) = call(
        &fx.store,
        "POST",
        "/trades",
        Some(&fx.carol),
        Some(json!({ "requestedBookId": fx.dune })),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_owned();

    let (status, body) = call(
        &fx.store,
        "PUT",
        &format!("/trades/{id}"),
        Some(&fx.alice),
        Some(json!({ "status": "completed" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid trade status.");

    let (status, body) = call(
        &fx.store,
        "PUT",
        &format!("/trades/{id}"),
        Some(&fx.alice),
        Some(json!({ "status": "rejected", "notes": "keeping it" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["notesFromOwner"], "keeping it");

    let (status, body) = call(&fx.store, "GET", "/trades", Some(&fx.carol), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn own_book_request_is_bad_request() {
    let fx = fixture("own_book.db");

    let (status, body) = call(
        &fx.store,
        "POST",
        "/trades",
        Some(&fx.alice),
        Some(json!({ "requestedBookId": fx.dune })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "You cannot request a book you already own.");
}

#[tokio::test]
async fn malformed_bodies_are_bad_request() {
    let fx = fixture("malformed.db");

    // requestedBookId is required
    let (status, body) = call(
        &fx.store,
        "POST",
        "/trades",
        Some(&fx.carol),
        Some(json!({ "notes": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("requestedBookId"));

    let (_, created) = call(
        &fx.store,
        "POST",
        "/trades",
        Some(&fx.carol),
        Some(json!({ "requestedBookId": fx.dune })),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_owned();

    // status is required
    let (status, body) = call(
        &fx.store,
        "PUT",
        &format!("/trades/{id}"),
        Some(&fx.alice),
        Some(json!({ "notes": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("status"));

    let (_, trade) = call(
        &fx.store,
        "GET",
        &format!("/trades/{id}"),
        Some(&fx.alice),
        None,
    )
    .await;
    assert_eq!(trade["status"], "pending");
}
