//! End-to-end CRUD tests against the router with the in-memory store

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use klinika_api::build_memory_router;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_category(app: &Router, name: &str) -> i64 {
    let (status, body) = send(
        app,
        "POST",
        "/api/HelpCenterCategory/create",
        Some(json!({ "name": name, "createdBy": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().unwrap()
}

fn ticket(category_id: i64, subject: &str) -> Value {
    json!({
        "email": "a@b.com",
        "name": "Ann",
        "subject": subject,
        "message": "M",
        "categoryId": category_id
    })
}

#[tokio::test]
async fn test_create_returns_generated_id_and_same_fields() {
    let app = build_memory_router().unwrap();
    let category_id = create_category(&app, "General").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/HelpCenter/create",
        Some(ticket(category_id, "S")),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], 1);
    assert_eq!(body["email"], "a@b.com");
    assert_eq!(body["name"], "Ann");
    assert_eq!(body["subject"], "S");
    assert_eq!(body["message"], "M");
    assert_eq!(body["categoryId"], category_id);
    assert!(body["creationDate"].is_string());
}

#[tokio::test]
async fn test_paginate_twenty_five_help_centers() {
    let app = build_memory_router().unwrap();
    let category_id = create_category(&app, "General").await;
    for i in 0..25 {
        let (status, _) = send(
            &app,
            "POST",
            "/api/HelpCenter/create",
            Some(ticket(category_id, &format!("Subject {i}"))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(
        &app,
        "GET",
        "/api/HelpCenter/paginate?page=1&pageSize=10&search=",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 10);
    assert_eq!(body["totalPages"], 3);
    assert_eq!(body["totalCount"], 25);
}

#[tokio::test]
async fn test_search_is_case_insensitive() {
    let app = build_memory_router().unwrap();
    let category_id = create_category(&app, "General").await;
    send(&app, "POST", "/api/HelpCenter/create", Some(ticket(category_id, "Billing"))).await;
    send(&app, "POST", "/api/HelpCenter/create", Some(ticket(category_id, "Parking"))).await;

    let (_, body) = send(&app, "GET", "/api/HelpCenter/paginate?search=BILL", None).await;
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["subject"], "Billing");
}

#[tokio::test]
async fn test_invalid_payload_is_rejected_with_field() {
    let app = build_memory_router().unwrap();
    let category_id = create_category(&app, "General").await;
    let mut payload = ticket(category_id, "S");
    payload["email"] = json!("not-an-email");

    let (status, body) = send(&app, "POST", "/api/HelpCenter/create", Some(payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["details"]["field"], "email");
}

#[tokio::test]
async fn test_unknown_category_is_validation_error() {
    let app = build_memory_router().unwrap();

    let (status, body) = send(&app, "POST", "/api/HelpCenter/create", Some(ticket(77, "S"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"]["field"], "categoryId");
}

#[tokio::test]
async fn test_get_update_and_repeat_delete() {
    let app = build_memory_router().unwrap();
    let category_id = create_category(&app, "General").await;
    let (_, created) = send(&app, "POST", "/api/HelpCenter/create", Some(ticket(category_id, "S"))).await;
    let id = created["id"].as_i64().unwrap();

    let (status, updated) = send(
        &app,
        "PUT",
        &format!("/api/HelpCenter/update/{id}"),
        Some(ticket(category_id, "Changed")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["subject"], "Changed");
    assert_eq!(updated["creationDate"], created["creationDate"]);

    let (status, fetched) = send(&app, "GET", &format!("/api/HelpCenter/get/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, updated);

    let (status, body) = send(&app, "DELETE", &format!("/api/HelpCenter/delete/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);

    let (status, body) = send(&app, "DELETE", &format!("/api/HelpCenter/delete/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_update_missing_record_is_not_found() {
    let app = build_memory_router().unwrap();
    let category_id = create_category(&app, "General").await;

    let (status, _) = send(
        &app,
        "PUT",
        "/api/HelpCenter/update/999",
        Some(ticket(category_id, "S")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bulk_delete_is_all_or_nothing() {
    let app = build_memory_router().unwrap();
    let a = create_category(&app, "A").await;
    let b = create_category(&app, "B").await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/HelpCenterCategory/bulkDelete",
        Some(json!([a, b, 999])),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, all) = send(&app, "GET", "/api/HelpCenterCategory/getAll", None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (status, body) = send(
        &app,
        "POST",
        "/api/HelpCenterCategory/bulkDelete",
        Some(json!([a, b])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 2);
}

#[tokio::test]
async fn test_bulk_delete_rejects_non_array_body() {
    let app = build_memory_router().unwrap();
    let (status, body) = send(
        &app,
        "POST",
        "/api/HelpCenterCategory/bulkDelete",
        Some(json!({ "ids": [1] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_deleting_specialization_removes_blocks() {
    let app = build_memory_router().unwrap();
    let (_, cardiology) = send(
        &app,
        "POST",
        "/api/Specialization/create",
        Some(json!({ "name": "Cardiology", "createdBy": "admin" })),
    )
    .await;
    let cardiology_id = cardiology["id"].as_i64().unwrap();
    let (status, _) = send(
        &app,
        "POST",
        "/api/Block/create",
        Some(json!({ "name": "North", "specializationId": cardiology_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    send(&app, "DELETE", &format!("/api/Specialization/delete/{cardiology_id}"), None).await;

    let (_, blocks) = send(&app, "GET", "/api/Block/getAll", None).await;
    assert!(blocks.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_bulk_delete_nested_blocks() {
    let app = build_memory_router().unwrap();
    let (_, cardiology) = send(
        &app,
        "POST",
        "/api/Specialization/create",
        Some(json!({ "name": "Cardiology", "createdBy": "admin" })),
    )
    .await;
    let cardiology_id = cardiology["id"].as_i64().unwrap();
    let (_, parent) = send(
        &app,
        "POST",
        "/api/Block/create",
        Some(json!({ "name": "North", "specializationId": cardiology_id })),
    )
    .await;
    let (_, child) = send(
        &app,
        "POST",
        "/api/Block/create",
        Some(json!({
            "name": "North wing",
            "parentBlockId": parent["id"],
            "specializationId": cardiology_id
        })),
    )
    .await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/Block/bulkDelete",
        Some(json!([parent["id"], child["id"]])),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 2);
    let (_, blocks) = send(&app, "GET", "/api/Block/getAll", None).await;
    assert!(blocks.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_user_lifecycle_hides_password() {
    let app = build_memory_router().unwrap();
    let (status, user) = send(
        &app,
        "POST",
        "/api/User/create",
        Some(json!({
            "email": "pat@klinika.test",
            "firstName": "Pat",
            "lastName": "Lee",
            "gender": "other",
            "birthDate": "1990-05-01",
            "role": "patient",
            "password": "long enough"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(user.get("password").is_none());
    assert!(user.get("passwordHash").is_none());

    let id = user["id"].as_str().unwrap();
    let (status, fetched) = send(&app, "GET", &format!("/api/User/get/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["birthDate"], "1990-05-01");

    let (status, _) = send(&app, "GET", "/api/User/get/42", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_paging_is_bad_request() {
    let app = build_memory_router().unwrap();
    let (status, _) = send(&app, "GET", "/api/HelpCenter/paginate?page=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "GET", "/api/HelpCenter/paginate?pageSize=5000", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"]["field"], "pageSize");
}

#[tokio::test]
async fn test_health_and_unknown_route() {
    let app = build_memory_router().unwrap();

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"]["backend"], "memory");

    let (status, body) = send(&app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);

    let (status, body) = send(&app, "GET", "/api/Nope/paginate", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "ROUTE_NOT_FOUND");
}
