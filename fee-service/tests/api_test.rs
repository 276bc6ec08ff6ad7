mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{date, TestApp, SCHOOL_ID, STUDENTS_A, USER_ID};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::util::ServiceExt;

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-school-id", SCHOOL_ID)
        .header("x-user-id", USER_ID);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}

#[tokio::test]
async fn health_check_works() {
    let app = TestApp::spawn().await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn readiness_reports_the_store() {
    let app = TestApp::spawn().await;

    let (status, body) = send(&app.router, "GET", "/ready", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn tenant_headers_are_required() {
    let app = TestApp::spawn().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/fee-types")
                .header("x-school-id", SCHOOL_ID)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_body_is_unprocessable() {
    let app = TestApp::spawn().await;

    let (status, body) = send(&app.router, "POST", "/fee-types", Some(json!({ "name": "" }))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = TestApp::spawn().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/fee-types")
                .header("x-school-id", SCHOOL_ID)
                .header("x-user-id", USER_ID)
                .header("content-type", "application/json")
                .body(Body::from("{ not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_fee_type_conflicts() {
    let app = TestApp::spawn().await;
    let body = json!({ "name": "Library" });

    let (first, _) = send(&app.router, "POST", "/fee-types", Some(body.clone())).await;
    let (second, error) = send(&app.router, "POST", "/fee-types", Some(body)).await;

    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(error["kind"], "conflict");
}

#[tokio::test]
async fn schedule_dates_use_the_active_academic_year() {
    let app = TestApp::spawn().await;

    let (status, body) = send(
        &app.router,
        "POST",
        "/fee-schedules",
        Some(json!({ "name": "Half-yearly", "day": 5, "months": [4, 10] })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["scheduled_dates"], json!(["2026-04-05", "2026-10-05"]));
}

#[tokio::test]
async fn unknown_receipt_is_not_found() {
    let app = TestApp::spawn().await;

    let (status, body) = send(&app.router, "GET", "/receipts/AC01012600001", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn structure_payment_and_cancellation_over_http() {
    let app = TestApp::spawn().await;
    let fee_type = app.fee_type("Tuition").await;
    let schedule = app.schedule("Termly", vec![4, 8]).await;

    let (status, structure) = send(
        &app.router,
        "POST",
        "/fee-structures",
        Some(json!({
            "name": "Class 5",
            "category_id": "general",
            "classes": ["sec-5a"],
            "fee_rows": [{
                "fee_type_id": fee_type,
                "schedule_type_id": schedule,
                "scheduled_dates": [
                    { "date": "2099-04-10", "amount": "1500" },
                    { "date": "2099-08-10", "amount": "1500" }
                ]
            }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(structure.get("_id").is_none());
    assert_eq!(structure["expected_installments"], 4);
    let structure_id = structure["id"].as_str().unwrap().to_string();
    app.wait_for_materialization(&structure_id).await;

    let (status, installments) = send(
        &app.router,
        "GET",
        &format!("/installments?student_id={}", STUDENTS_A[0]),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let installments = installments.as_array().unwrap().clone();
    assert_eq!(installments.len(), 2);
    let installment_id = installments
        .iter()
        .find(|i| i["due_date"] == "2099-04-10")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, receipt) = send(
        &app.router,
        "POST",
        "/payments",
        Some(json!({
            "student_id": STUDENTS_A[0],
            "category": "academic",
            "items": [{ "installment_id": installment_id, "paid_amount": "1500" }],
            "payment": { "method": "upi", "transaction_id": "UPI-42" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(decimal(&receipt["paid_amount"]), dec!(1500));
    assert_eq!(receipt["issued_by"], USER_ID);
    assert!(receipt["id"].is_string());
    assert!(receipt.get("_id").is_none());
    let receipt_id = receipt["receipt_id"].as_str().unwrap().to_string();

    let (status, installment) =
        send(&app.router, "GET", &format!("/installments/{}", installment_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(installment["status"], "paid");
    assert_eq!(installment["id"], installment_id.as_str());
    assert!(installment.get("_id").is_none());
    assert_eq!(decimal(&installment["outstanding"]), Decimal::ZERO);

    let (status, overpaid) = send(
        &app.router,
        "POST",
        "/payments",
        Some(json!({
            "student_id": STUDENTS_A[0],
            "items": [{ "installment_id": installment_id, "paid_amount": "1" }],
            "payment": { "method": "cash" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(overpaid["error"].as_str().unwrap().contains("Tuition"));

    let (status, cancelled) = send(
        &app.router,
        "POST",
        &format!("/receipts/{}/cancel", receipt_id),
        Some(json!({ "reason": "Paid twice by mistake" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (_, installment) =
        send(&app.router, "GET", &format!("/installments/{}", installment_id), None).await;
    assert_eq!(installment["status"], "upcoming");
    assert_eq!(decimal(&installment["paid_amount"]), Decimal::ZERO);
}

#[tokio::test]
async fn sweep_endpoint_reports_the_cutoff() {
    let app = TestApp::spawn().await;
    app.tuition_structure(&[date(2099, 4, 10)], dec!(1000)).await;

    let (status, body) = send(
        &app.router,
        "POST",
        "/installments/sweep",
        Some(json!({ "as_of": "2099-05-01" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["as_of"], "2099-05-01");
    assert_eq!(body["updated"], 2);
}
