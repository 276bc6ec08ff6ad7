mod common;

use common::{date, TestApp, SCHOOL_ID, STUDENTS_A, USER_ID};
use fee_service::dtos::{
    CancelReceiptRequest, CollectionParams, CreateDonorRequest, PaymentItemRequest,
    ReceiptListParams, RecordPaymentRequest,
};
use fee_service::error::FeeError;
use fee_service::models::{
    FeeReceipt, InstallmentStatus, PaymentMethod, ReceiptCategory, ReceiptStatus,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

async fn setup() -> TestApp {
    let app = TestApp::spawn().await;
    app.tuition_structure(&[date(2099, 4, 10), date(2099, 8, 10)], dec!(1500))
        .await;
    app
}

async fn pay(
    app: &TestApp,
    student_id: &str,
    amount: Decimal,
    method: PaymentMethod,
    donor_id: Option<String>,
) -> FeeReceipt {
    let first = app.installments_of(student_id).await.remove(0);
    app.fees
        .record_payment(
            &app.scope(),
            RecordPaymentRequest {
                student_id: student_id.to_string(),
                category: ReceiptCategory::Academic,
                items: vec![PaymentItemRequest {
                    installment_id: first.id,
                    paid_amount: amount,
                }],
                payment: method,
                remarks: Some("Term 1".to_string()),
                donor_id,
            },
        )
        .await
        .expect("Failed to record payment")
}

fn cancel(reason: &str) -> CancelReceiptRequest {
    CancelReceiptRequest {
        reason: reason.to_string(),
    }
}

#[tokio::test]
async fn cancellation_reverses_the_payment() {
    let app = setup().await;
    let receipt = pay(&app, STUDENTS_A[0], dec!(1500), PaymentMethod::Cash, None).await;
    let inst_id = receipt.items[0].installment_id.clone();
    assert_eq!(app.installment(&inst_id).await.status, InstallmentStatus::Paid);

    let cancelled = app
        .fees
        .cancel_receipt(&app.scope(), &receipt.receipt_id, cancel("Cheque bounced"))
        .await
        .unwrap();

    assert_eq!(cancelled.status, ReceiptStatus::Cancelled);
    let cancellation = cancelled.cancellation.unwrap();
    assert_eq!(cancellation.reason, "Cheque bounced");
    assert_eq!(cancellation.cancelled_by, USER_ID);

    let inst = app.installment(&inst_id).await;
    assert_eq!(inst.paid_amount, Decimal::ZERO);
    assert_eq!(inst.status, InstallmentStatus::Upcoming);
}

#[tokio::test]
async fn cancelling_twice_conflicts() {
    let app = setup().await;
    let receipt = pay(&app, STUDENTS_A[0], dec!(200), PaymentMethod::Cash, None).await;

    app.fees
        .cancel_receipt(&app.scope(), &receipt.receipt_id, cancel("Entered twice"))
        .await
        .unwrap();
    let err = app
        .fees
        .cancel_receipt(&app.scope(), &receipt.receipt_id, cancel("Entered twice"))
        .await
        .unwrap_err();

    assert!(matches!(err, FeeError::Conflict(_)));
    let inst = app.installment(&receipt.items[0].installment_id).await;
    assert_eq!(inst.paid_amount, Decimal::ZERO);
}

#[tokio::test]
async fn cancellation_needs_a_reason() {
    let app = setup().await;
    let receipt = pay(&app, STUDENTS_A[0], dec!(200), PaymentMethod::Cash, None).await;

    let err = app
        .fees
        .cancel_receipt(&app.scope(), &receipt.receipt_id, cancel("  "))
        .await
        .unwrap_err();

    assert!(matches!(err, FeeError::Validation(_)));
}

#[tokio::test]
async fn cancellation_reverses_the_donor_contribution() {
    let app = setup().await;
    let donor = app
        .fees
        .create_donor(
            SCHOOL_ID,
            CreateDonorRequest {
                name: "Alumni Trust".to_string(),
            },
        )
        .await
        .unwrap();
    let receipt = pay(&app, STUDENTS_A[0], dec!(400), PaymentMethod::Cash, Some(donor.id.clone())).await;

    app.fees
        .cancel_receipt(&app.scope(), &receipt.receipt_id, cancel("Donor withdrew"))
        .await
        .unwrap();

    let donor = app.fees.get_donor(SCHOOL_ID, &donor.id).await.unwrap();
    assert_eq!(donor.total_donated, Decimal::ZERO);
    assert!(donor.donations.is_empty());
}

#[tokio::test]
async fn unknown_receipt_is_not_found() {
    let app = setup().await;

    let err = app
        .fees
        .cancel_receipt(&app.scope(), "AC01012600001", cancel("Typo"))
        .await
        .unwrap_err();

    assert!(matches!(err, FeeError::NotFound { .. }));
}

#[tokio::test]
async fn cancelled_receipts_are_hidden_unless_asked_for() {
    let app = setup().await;
    let kept = pay(&app, STUDENTS_A[0], dec!(200), PaymentMethod::Cash, None).await;
    let dropped = pay(&app, STUDENTS_A[1], dec!(300), PaymentMethod::Cash, None).await;
    app.fees
        .cancel_receipt(&app.scope(), &dropped.receipt_id, cancel("Wrong student"))
        .await
        .unwrap();

    let active = app
        .fees
        .list_receipts(SCHOOL_ID, ReceiptListParams::default())
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].receipt_id, kept.receipt_id);

    let all = app
        .fees
        .list_receipts(
            SCHOOL_ID,
            ReceiptListParams {
                include_cancelled: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let for_student = app
        .fees
        .list_receipts(
            SCHOOL_ID,
            ReceiptListParams {
                student_id: Some(STUDENTS_A[1].to_string()),
                include_cancelled: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(for_student.len(), 1);
    assert_eq!(for_student[0].status, ReceiptStatus::Cancelled);
}

#[tokio::test]
async fn collection_summary_counts_active_receipts_only() {
    let app = setup().await;
    pay(&app, STUDENTS_A[0], dec!(200), PaymentMethod::Cash, None).await;
    pay(
        &app,
        STUDENTS_A[1],
        dec!(300),
        PaymentMethod::Upi {
            transaction_id: "UPI-1".to_string(),
        },
        None,
    )
    .await;
    let dropped = pay(&app, STUDENTS_A[1], dec!(50), PaymentMethod::Cash, None).await;
    app.fees
        .cancel_receipt(&app.scope(), &dropped.receipt_id, cancel("Duplicate"))
        .await
        .unwrap();

    let summary = app
        .fees
        .collection_summary(SCHOOL_ID, CollectionParams::default())
        .await
        .unwrap();

    assert_eq!(summary.total_receipts, 2);
    assert_eq!(summary.total_amount, dec!(500));
    let cash = summary.buckets.iter().find(|b| b.method == "cash").unwrap();
    assert_eq!(cash.amount, dec!(200));
    let upi = summary.buckets.iter().find(|b| b.method == "upi").unwrap();
    assert_eq!(upi.receipts, 1);
}

#[tokio::test]
async fn collection_summary_rejects_inverted_range() {
    let app = setup().await;

    let err = app
        .fees
        .collection_summary(
            SCHOOL_ID,
            CollectionParams {
                from: Some(date(2026, 10, 2)),
                to: Some(date(2026, 10, 1)),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FeeError::Validation(_)));
}
