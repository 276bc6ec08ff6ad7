mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{date, TestApp, SCHOOL_ID, SECTION_A, STUDENTS_A};
use fee_service::config::SweeperConfig;
use fee_service::dtos::{
    DuesReportParams, InstallmentListParams, PaymentItemRequest, RecordPaymentRequest,
    UpdateInstallmentRequest,
};
use fee_service::error::FeeError;
use fee_service::models::{
    InstallmentStatus, MaterializationState, MaterializationStatus, PaymentMethod, ReceiptCategory,
};
use fee_service::services::FeeStore;
use fee_service::workers::DueSweeper;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

async fn setup() -> TestApp {
    let app = TestApp::spawn().await;
    app.tuition_structure(
        &[date(2099, 4, 10), date(2099, 8, 10), date(2099, 12, 10)],
        dec!(1500),
    )
    .await;
    app
}

async fn pay_in_full(app: &TestApp, student_id: &str, installment_id: &str) {
    app.fees
        .record_payment(
            &app.scope(),
            RecordPaymentRequest {
                student_id: student_id.to_string(),
                category: ReceiptCategory::Academic,
                items: vec![PaymentItemRequest {
                    installment_id: installment_id.to_string(),
                    paid_amount: dec!(1500),
                }],
                payment: PaymentMethod::Cash,
                remarks: None,
                donor_id: None,
            },
        )
        .await
        .expect("Failed to record payment");
}

#[tokio::test]
async fn sweep_marks_only_installments_that_fell_due() {
    let app = setup().await;

    let moved = app
        .fees
        .sweep_due_installments(Some(SCHOOL_ID), date(2099, 8, 10))
        .await
        .unwrap();

    // two students, two dates on or before the cutoff
    assert_eq!(moved, 4);
    let installments = app.installments_of(STUDENTS_A[0]).await;
    assert_eq!(installments[0].status, InstallmentStatus::Due);
    assert_eq!(installments[1].status, InstallmentStatus::Due);
    assert_eq!(installments[2].status, InstallmentStatus::Upcoming);

    let again = app
        .fees
        .sweep_due_installments(Some(SCHOOL_ID), date(2099, 8, 10))
        .await
        .unwrap();
    assert_eq!(again, 0);
}

#[tokio::test]
async fn sweep_of_another_school_touches_nothing() {
    let app = setup().await;

    let moved = app
        .fees
        .sweep_due_installments(Some("school-2"), date(2099, 12, 31))
        .await
        .unwrap();

    assert_eq!(moved, 0);
}

#[tokio::test]
async fn paying_a_due_installment_settles_it_late() {
    let app = setup().await;
    let first = app.installments_of(STUDENTS_A[0]).await.remove(0);
    app.fees
        .sweep_due_installments(None, date(2099, 4, 30))
        .await
        .unwrap();

    pay_in_full(&app, STUDENTS_A[0], &first.id).await;

    assert_eq!(app.installment(&first.id).await.status, InstallmentStatus::Late);
}

#[tokio::test]
async fn paid_installments_are_not_swept() {
    let app = setup().await;
    let first = app.installments_of(STUDENTS_A[0]).await.remove(0);
    pay_in_full(&app, STUDENTS_A[0], &first.id).await;

    let moved = app
        .fees
        .sweep_due_installments(None, date(2099, 4, 30))
        .await
        .unwrap();

    assert_eq!(moved, 1);
    assert_eq!(app.installment(&first.id).await.status, InstallmentStatus::Paid);
}

#[tokio::test]
async fn installment_listing_filters_by_status() {
    let app = setup().await;
    app.fees
        .sweep_due_installments(None, date(2099, 4, 30))
        .await
        .unwrap();

    let due = app
        .fees
        .list_installments(
            &app.scope(),
            InstallmentListParams {
                status: Some(InstallmentStatus::Due),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(due.len(), 2);
    assert!(due.iter().all(|i| i.due_date == date(2099, 4, 10)));
}

#[tokio::test]
async fn amount_update_recomputes_net_and_settles() {
    let app = setup().await;
    let first = app.installments_of(STUDENTS_A[0]).await.remove(0);
    app.fees
        .record_payment(
            &app.scope(),
            RecordPaymentRequest {
                student_id: STUDENTS_A[0].to_string(),
                category: ReceiptCategory::Academic,
                items: vec![PaymentItemRequest {
                    installment_id: first.id.clone(),
                    paid_amount: dec!(1200),
                }],
                payment: PaymentMethod::Cash,
                remarks: None,
                donor_id: None,
            },
        )
        .await
        .unwrap();

    let updated = app
        .fees
        .update_installment_amount(
            SCHOOL_ID,
            &first.id,
            UpdateInstallmentRequest {
                total_amount: dec!(1200),
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.net_amount, dec!(1200));
    assert_eq!(updated.status, InstallmentStatus::Paid);
    assert_eq!(updated.revision, first.revision + 2);

    let err = app
        .fees
        .update_installment_amount(
            SCHOOL_ID,
            &first.id,
            UpdateInstallmentRequest {
                total_amount: dec!(1000),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FeeError::Conflict(_)));
}

#[tokio::test]
async fn raising_the_amount_reopens_a_paid_installment() {
    let app = setup().await;
    let first = app.installments_of(STUDENTS_A[0]).await.remove(0);
    pay_in_full(&app, STUDENTS_A[0], &first.id).await;

    let updated = app
        .fees
        .update_installment_amount(
            SCHOOL_ID,
            &first.id,
            UpdateInstallmentRequest {
                total_amount: dec!(1800),
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.outstanding(), dec!(300));
    assert_eq!(updated.status, InstallmentStatus::Upcoming);
}

#[tokio::test]
async fn amount_update_of_unknown_installment_is_not_found() {
    let app = setup().await;

    let err = app
        .fees
        .update_installment_amount(
            SCHOOL_ID,
            "missing",
            UpdateInstallmentRequest {
                total_amount: dec!(10),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FeeError::NotFound { .. }));
}

#[tokio::test]
async fn dues_report_totals_outstanding_per_student() {
    let app = setup().await;
    let first = app.installments_of(STUDENTS_A[0]).await.remove(0);
    pay_in_full(&app, STUDENTS_A[0], &first.id).await;

    let report = app
        .fees
        .dues_report(
            &app.scope(),
            DuesReportParams {
                section_id: Some(SECTION_A.to_string()),
                as_of: Some(date(2099, 8, 31)),
            },
        )
        .await
        .unwrap();

    assert_eq!(report.students.len(), 2);
    let paid_student = report
        .students
        .iter()
        .find(|s| s.student_id == STUDENTS_A[0])
        .unwrap();
    assert_eq!(paid_student.installments, 2);
    assert_eq!(paid_student.outstanding, dec!(1500));
    assert_eq!(report.total_outstanding, dec!(4500));

    let nothing_due = app
        .fees
        .dues_report(
            &app.scope(),
            DuesReportParams {
                section_id: None,
                as_of: Some(date(2099, 1, 1)),
            },
        )
        .await
        .unwrap();
    assert!(nothing_due.students.is_empty());
    assert_eq!(nothing_due.total_outstanding, Decimal::ZERO);
}

#[tokio::test]
async fn sweeper_requeues_stale_pending_structures() {
    let app = setup().await;
    let structure = app
        .fees
        .list_fee_structures(&app.scope())
        .await
        .unwrap()
        .remove(0);
    let attempts = structure.materialization.attempts;

    let mut stuck = MaterializationState::pending("lost-job".to_string());
    stuck.attempts = attempts;
    stuck.updated_at = Utc::now() - ChronoDuration::hours(2);
    let claimed = app
        .store
        .set_materialization(
            &structure.id,
            structure.materialization.job_id.as_deref(),
            &stuck,
        )
        .await
        .unwrap();
    assert!(claimed);

    let sweeper = DueSweeper::new(
        app.fees.clone(),
        SweeperConfig {
            enabled: true,
            interval_secs: 3600,
            stale_after_secs: 60,
        },
    );
    let report = sweeper.run_once().await.unwrap();
    assert_eq!(report.requeued, 1);

    let recovered = app.wait_for_materialization(&structure.id).await;
    assert_eq!(recovered.materialization.status, MaterializationStatus::Succeeded);
    assert_eq!(recovered.materialization.attempts, attempts + 1);
    assert_ne!(recovered.materialization.job_id.as_deref(), Some("lost-job"));
    assert_eq!(recovered.materialization.installments_created, 0);
    assert_eq!(app.installments_of(STUDENTS_A[0]).await.len(), 3);
}

#[tokio::test]
async fn sweeper_leaves_fresh_pending_structures_alone() {
    let app = setup().await;
    let structure = app
        .fees
        .list_fee_structures(&app.scope())
        .await
        .unwrap()
        .remove(0);
    app.store
        .set_materialization(
            &structure.id,
            structure.materialization.job_id.as_deref(),
            &MaterializationState::pending("in-flight".to_string()),
        )
        .await
        .unwrap();

    let sweeper = DueSweeper::new(app.fees.clone(), SweeperConfig::default());
    let report = sweeper.run_once().await.unwrap();

    assert_eq!(report.requeued, 0);
}
