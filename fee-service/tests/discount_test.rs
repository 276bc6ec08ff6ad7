//! Discount categories: application, budget accounting, updates, approval.

mod common;

use common::{date, TestApp, SCHOOL_ID, STUDENTS_A};
use fee_service::dtos::{
    ApplyDiscountRequest, ApproveDiscountRequest, CreateDiscountCategoryRequest,
    DiscountRowRequest, PaymentItemRequest, RecordPaymentRequest,
};
use fee_service::error::FeeError;
use fee_service::models::{
    DiscountCategory, FeeStructure, FragmentStatus, PaymentMethod, ReceiptCategory,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

async fn setup(budget: Decimal) -> (TestApp, FeeStructure, DiscountCategory) {
    let app = TestApp::spawn().await;
    let structure = app
        .tuition_structure(
            &[date(2099, 4, 10), date(2099, 8, 10), date(2099, 12, 10)],
            dec!(1500),
        )
        .await;
    let category = app
        .fees
        .create_discount_category(
            SCHOOL_ID,
            CreateDiscountCategoryRequest {
                name: "Sibling concession".to_string(),
                description: None,
                budget_allocated: budget,
            },
        )
        .await
        .unwrap();
    (app, structure, category)
}

fn request(row_id: &str, is_percentage: bool, value: Decimal, students: &[&str]) -> ApplyDiscountRequest {
    ApplyDiscountRequest {
        rows: vec![DiscountRowRequest {
            row_id: row_id.to_string(),
            is_percentage,
            value,
            breakdown: None,
        }],
        student_ids: students.iter().map(|s| s.to_string()).collect(),
    }
}

#[tokio::test]
async fn fixed_discount_reduces_every_installment_and_the_budget() {
    let (app, structure, category) = setup(dec!(10000)).await;
    let row_id = structure.fee_rows[0].id.clone();

    let updated = app
        .fees
        .apply_discount(&app.scope(), &category.id, request(&row_id, false, dec!(500), &[STUDENTS_A[0]]))
        .await
        .unwrap();

    assert_eq!(updated.budget_remaining, dec!(8500));
    assert_eq!(updated.total_students, 1);
    assert_eq!(updated.total_pending, 1);
    assert_eq!(updated.class_list.len(), 1);
    assert_eq!(updated.class_list[0].breakdown, 3);
    assert_eq!(updated.class_list[0].discount_amount, dec!(500));

    for inst in app.installments_of(STUDENTS_A[0]).await {
        assert_eq!(inst.total_discount_amount, dec!(500));
        assert_eq!(inst.net_amount, dec!(1000));
        assert_eq!(inst.discounts[0].status, FragmentStatus::Pending);
    }
    for inst in app.installments_of(STUDENTS_A[1]).await {
        assert!(inst.discounts.is_empty());
        assert_eq!(inst.net_amount, dec!(1500));
    }
}

#[tokio::test]
async fn percentage_discount_uses_the_row_amount() {
    let (app, structure, category) = setup(dec!(10000)).await;
    let row_id = structure.fee_rows[0].id.clone();

    let updated = app
        .fees
        .apply_discount(&app.scope(), &category.id, request(&row_id, true, dec!(10), &STUDENTS_A))
        .await
        .unwrap();

    // 10% of 1500, three installments, two students
    assert_eq!(updated.budget_remaining, dec!(10000) - dec!(900));
    assert_eq!(updated.total_students, 2);
    for inst in app.installments_of(STUDENTS_A[1]).await {
        assert_eq!(inst.net_amount, dec!(1350));
    }
}

#[tokio::test]
async fn applying_twice_to_the_same_student_conflicts() {
    let (app, structure, category) = setup(dec!(10000)).await;
    let row_id = structure.fee_rows[0].id.clone();
    let req = || request(&row_id, false, dec!(100), &[STUDENTS_A[0]]);

    app.fees.apply_discount(&app.scope(), &category.id, req()).await.unwrap();
    let err = app
        .fees
        .apply_discount(&app.scope(), &category.id, req())
        .await
        .unwrap_err();

    assert!(matches!(err, FeeError::Conflict(_)));
}

#[tokio::test]
async fn discount_beyond_budget_is_rejected_without_changes() {
    let (app, structure, category) = setup(dec!(1000)).await;
    let row_id = structure.fee_rows[0].id.clone();

    let err = app
        .fees
        .apply_discount(&app.scope(), &category.id, request(&row_id, false, dec!(500), &STUDENTS_A))
        .await
        .unwrap_err();

    match err {
        FeeError::InsufficientBudget { remaining, required } => {
            assert_eq!(remaining, dec!(1000));
            assert_eq!(required, dec!(3000));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let stored = app.fees.get_discount_category(SCHOOL_ID, &category.id).await.unwrap();
    assert_eq!(stored.budget_remaining, dec!(1000));
    for inst in app.installments_of(STUDENTS_A[0]).await {
        assert!(inst.discounts.is_empty());
    }
}

#[tokio::test]
async fn discount_larger_than_the_installment_is_rejected() {
    let (app, structure, category) = setup(dec!(100000)).await;
    let row_id = structure.fee_rows[0].id.clone();

    let err = app
        .fees
        .apply_discount(&app.scope(), &category.id, request(&row_id, false, dec!(2000), &[STUDENTS_A[0]]))
        .await
        .unwrap_err();

    assert!(matches!(err, FeeError::Validation(_)));
}

#[tokio::test]
async fn wrong_breakdown_is_rejected() {
    let (app, structure, category) = setup(dec!(10000)).await;
    let mut req = request(&structure.fee_rows[0].id, false, dec!(100), &[STUDENTS_A[0]]);
    req.rows[0].breakdown = Some(12);

    let err = app
        .fees
        .apply_discount(&app.scope(), &category.id, req)
        .await
        .unwrap_err();

    assert!(matches!(err, FeeError::Validation(_)));
}

#[tokio::test]
async fn update_reverts_students_left_out_and_restores_budget() {
    let (app, structure, category) = setup(dec!(10000)).await;
    let row_id = structure.fee_rows[0].id.clone();

    app.fees
        .apply_discount(&app.scope(), &category.id, request(&row_id, false, dec!(500), &STUDENTS_A))
        .await
        .unwrap();

    let updated = app
        .fees
        .update_discount(&app.scope(), &category.id, request(&row_id, false, dec!(200), &[STUDENTS_A[1]]))
        .await
        .unwrap();

    assert_eq!(updated.total_students, 1);
    assert_eq!(updated.budget_remaining, dec!(10000) - dec!(600));
    for inst in app.installments_of(STUDENTS_A[0]).await {
        assert!(inst.discounts.is_empty());
        assert_eq!(inst.net_amount, dec!(1500));
    }
    for inst in app.installments_of(STUDENTS_A[1]).await {
        assert_eq!(inst.net_amount, dec!(1300));
    }
}

#[tokio::test]
async fn approval_marks_fragments_and_survives_updates() {
    let (app, structure, category) = setup(dec!(10000)).await;
    let row_id = structure.fee_rows[0].id.clone();

    app.fees
        .apply_discount(&app.scope(), &category.id, request(&row_id, false, dec!(100), &STUDENTS_A))
        .await
        .unwrap();
    let approved = app
        .fees
        .approve_discount(
            &app.scope(),
            &category.id,
            ApproveDiscountRequest {
                student_ids: vec![STUDENTS_A[0].to_string()],
            },
        )
        .await
        .unwrap();
    assert_eq!(approved.total_approved, 1);
    assert_eq!(approved.total_pending, 1);

    app.fees
        .update_discount(&app.scope(), &category.id, request(&row_id, false, dec!(150), &STUDENTS_A))
        .await
        .unwrap();

    for inst in app.installments_of(STUDENTS_A[0]).await {
        assert_eq!(inst.discounts[0].status, FragmentStatus::Approved);
        assert_eq!(inst.discounts[0].discount_amount, dec!(150));
    }
}

#[tokio::test]
async fn approving_a_student_without_the_discount_fails() {
    let (app, _structure, category) = setup(dec!(10000)).await;

    let err = app
        .fees
        .approve_discount(
            &app.scope(),
            &category.id,
            ApproveDiscountRequest {
                student_ids: vec![STUDENTS_A[0].to_string()],
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FeeError::Validation(_)));
}

#[tokio::test]
async fn discount_cannot_push_net_below_what_was_paid() {
    let (app, structure, category) = setup(dec!(10000)).await;
    let first = app.installments_of(STUDENTS_A[0]).await.remove(0);

    app.fees
        .record_payment(
            &app.scope(),
            RecordPaymentRequest {
                student_id: STUDENTS_A[0].to_string(),
                category: ReceiptCategory::Academic,
                items: vec![PaymentItemRequest {
                    installment_id: first.id.clone(),
                    paid_amount: dec!(1400),
                }],
                payment: PaymentMethod::Cash,
                remarks: None,
                donor_id: None,
            },
        )
        .await
        .unwrap();

    let err = app
        .fees
        .apply_discount(
            &app.scope(),
            &category.id,
            request(&structure.fee_rows[0].id, false, dec!(500), &[STUDENTS_A[0]]),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FeeError::Conflict(_)));
    assert!(app.installment(&first.id).await.discounts.is_empty());
}
