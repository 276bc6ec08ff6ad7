//! Fee types and fee schedules.

mod common;

use common::{date, TestApp, SCHOOL_ID};
use fee_service::dtos::{CreateFeeScheduleRequest, CreateFeeTypeRequest, UpdateFeeScheduleRequest};
use fee_service::error::FeeError;

fn fiscal_order() -> Vec<u32> {
    vec![4, 5, 6, 7, 8, 9, 10, 11, 12, 1, 2, 3]
}

fn schedule_request(name: &str, day: u32, months: Vec<u32>) -> CreateFeeScheduleRequest {
    CreateFeeScheduleRequest {
        name: name.to_string(),
        description: None,
        day,
        months,
        existing_month_order: fiscal_order(),
        year: None,
    }
}

#[tokio::test]
async fn schedule_dates_follow_fiscal_order_and_roll_into_next_year() {
    let app = TestApp::spawn().await;

    let schedule = app
        .fees
        .create_fee_schedule(SCHOOL_ID, 2026, schedule_request("Termly", 15, vec![1, 11, 4]))
        .await
        .unwrap();

    assert_eq!(schedule.months, vec![4, 11, 1]);
    assert_eq!(
        schedule.scheduled_dates,
        vec![date(2026, 4, 15), date(2026, 11, 15), date(2027, 1, 15)]
    );
}

#[tokio::test]
async fn day_past_month_end_clamps_to_last_day() {
    let app = TestApp::spawn().await;

    let schedule = app
        .fees
        .create_fee_schedule(SCHOOL_ID, 2026, schedule_request("Month end", 31, vec![4, 2, 6]))
        .await
        .unwrap();

    assert_eq!(
        schedule.scheduled_dates,
        vec![date(2026, 4, 30), date(2026, 6, 30), date(2027, 2, 28)]
    );
}

#[tokio::test]
async fn explicit_year_anchors_the_first_due_date() {
    let app = TestApp::spawn().await;

    let mut req = schedule_request("Leap", 29, vec![2]);
    req.existing_month_order = vec![];
    req.year = Some(2028);
    let schedule = app.fees.create_fee_schedule(SCHOOL_ID, 2026, req).await.unwrap();

    assert_eq!(schedule.scheduled_dates, vec![date(2028, 2, 29)]);
}

#[tokio::test]
async fn invalid_months_are_rejected() {
    let app = TestApp::spawn().await;

    let err = app
        .fees
        .create_fee_schedule(SCHOOL_ID, 2026, schedule_request("Bad", 10, vec![4, 13]))
        .await
        .unwrap_err();
    assert!(matches!(err, FeeError::Validation(_)));

    let err = app
        .fees
        .create_fee_schedule(SCHOOL_ID, 2026, schedule_request("Repeat", 10, vec![4, 4]))
        .await
        .unwrap_err();
    assert!(matches!(err, FeeError::Validation(_)));
}

#[tokio::test]
async fn schedule_names_are_unique_per_school() {
    let app = TestApp::spawn().await;

    app.fees
        .create_fee_schedule(SCHOOL_ID, 2026, schedule_request("Quarterly", 10, vec![4, 7, 10, 1]))
        .await
        .unwrap();
    let err = app
        .fees
        .create_fee_schedule(SCHOOL_ID, 2026, schedule_request("Quarterly", 5, vec![4]))
        .await
        .unwrap_err();

    assert!(matches!(err, FeeError::DuplicateName { .. }));
}

#[tokio::test]
async fn updating_the_day_recomputes_dates_in_the_same_year() {
    let app = TestApp::spawn().await;
    let created = app
        .fees
        .create_fee_schedule(SCHOOL_ID, 2026, schedule_request("Half yearly", 10, vec![4, 10]))
        .await
        .unwrap();

    let updated = app
        .fees
        .update_fee_schedule(
            SCHOOL_ID,
            &created.id,
            2030,
            UpdateFeeScheduleRequest {
                name: None,
                description: Some("Mid-month".to_string()),
                day: Some(20),
                months: None,
                existing_month_order: None,
                year: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.scheduled_dates, vec![date(2026, 4, 20), date(2026, 10, 20)]);
    assert_eq!(updated.description.as_deref(), Some("Mid-month"));

    let stored = app.fees.get_fee_schedule(SCHOOL_ID, &created.id).await.unwrap();
    assert_eq!(stored.day, 20);
}

#[tokio::test]
async fn fee_type_names_are_unique_per_school() {
    let app = TestApp::spawn().await;
    let req = || CreateFeeTypeRequest {
        name: "Transport".to_string(),
        description: None,
    };

    app.fees.create_fee_type(SCHOOL_ID, req()).await.unwrap();
    let err = app.fees.create_fee_type(SCHOOL_ID, req()).await.unwrap_err();
    assert!(matches!(err, FeeError::DuplicateName { .. }));

    app.fees.create_fee_type("school-2", req()).await.unwrap();
    assert_eq!(app.fees.list_fee_types(SCHOOL_ID).await.unwrap().len(), 1);
}
