//! Test helpers for fee-service integration tests.
//!
//! Everything runs in-process over `InMemoryStore`, seeded with one school,
//! two sections of class 5 and an active 2026-27 academic year.

#![allow(dead_code)]

use axum::Router;
use chrono::NaiveDate;
use fee_service::config::WorkerConfig;
use fee_service::dtos::{
    CreateFeeScheduleRequest, CreateFeeStructureRequest, CreateFeeTypeRequest, FeeRowRequest,
    ScheduledEntryRequest,
};
use fee_service::models::{
    AcademicYear, FeeInstallment, FeeStructure, MaterializationStatus, Parent, School, Section,
    Student,
};
use fee_service::services::{
    AcademicYearResolver, FeeService, FeeStore, InMemoryStore, InstallmentFilter, Scope,
};
use fee_service::workers::WorkerOrchestrator;
use fee_service::{build_router, AppState};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

pub const SCHOOL_ID: &str = "school-1";
pub const USER_ID: &str = "clerk-1";
pub const ACADEMIC_YEAR_ID: &str = "ay-2026";
pub const SECTION_A: &str = "sec-5a";
pub const SECTION_B: &str = "sec-5b";

/// Students in section A.
pub const STUDENTS_A: [&str; 2] = ["stu-1", "stu-2"];
/// Students in section B.
pub const STUDENTS_B: [&str; 1] = ["stu-3"];

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn academic_year() -> AcademicYear {
    AcademicYear {
        id: ACADEMIC_YEAR_ID.to_string(),
        school_id: SCHOOL_ID.to_string(),
        name: "2026-27".to_string(),
        is_active: true,
        starts_on: date(2026, 4, 1),
        ends_on: date(2027, 3, 31),
    }
}

pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub fees: FeeService,
    pub router: Router,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(WorkerConfig {
            retry_max_elapsed_ms: 2_000,
            ..WorkerConfig::default()
        })
        .await
    }

    pub async fn spawn_with(worker: WorkerConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        seed(&store).await;

        let dyn_store: Arc<dyn FeeStore> = store.clone();
        let (orchestrator, queue) = WorkerOrchestrator::new(worker, dyn_store.clone());
        orchestrator.start();

        let fees = FeeService::new(dyn_store.clone(), queue);
        let state = AppState {
            fees: fees.clone(),
            academic_years: AcademicYearResolver::new(dyn_store.clone(), Duration::from_secs(60)),
            store: dyn_store,
        };

        Self {
            store,
            fees,
            router: build_router(state),
        }
    }

    pub fn scope(&self) -> Scope {
        Scope::new(SCHOOL_ID, USER_ID, academic_year())
    }

    pub async fn fee_type(&self, name: &str) -> String {
        self.fees
            .create_fee_type(
                SCHOOL_ID,
                CreateFeeTypeRequest {
                    name: name.to_string(),
                    description: None,
                },
            )
            .await
            .expect("Failed to create fee type")
            .id
    }

    pub async fn schedule(&self, name: &str, months: Vec<u32>) -> String {
        self.fees
            .create_fee_schedule(
                SCHOOL_ID,
                2026,
                CreateFeeScheduleRequest {
                    name: name.to_string(),
                    description: None,
                    day: 10,
                    months,
                    existing_month_order: vec![],
                    year: None,
                },
            )
            .await
            .expect("Failed to create schedule")
            .id
    }

    /// A fee row billing `amount` on each of `dates`.
    pub fn row(fee_type_id: &str, schedule_id: &str, dates: &[NaiveDate], amount: Decimal) -> FeeRowRequest {
        FeeRowRequest {
            fee_type_id: fee_type_id.to_string(),
            schedule_type_id: schedule_id.to_string(),
            scheduled_dates: dates
                .iter()
                .map(|d| ScheduledEntryRequest { date: *d, amount })
                .collect(),
        }
    }

    /// Creates a structure over section A with one tuition row and waits for
    /// its installments.
    pub async fn tuition_structure(&self, dates: &[NaiveDate], amount: Decimal) -> FeeStructure {
        let fee_type = self.fee_type("Tuition").await;
        let schedule = self.schedule("Termly", vec![4, 8, 12]).await;
        let structure = self
            .fees
            .create_fee_structure(
                &self.scope(),
                CreateFeeStructureRequest {
                    name: "Class 5 fees".to_string(),
                    category_id: "general".to_string(),
                    classes: vec![SECTION_A.to_string()],
                    fee_rows: vec![Self::row(&fee_type, &schedule, dates, amount)],
                    roster: None,
                },
            )
            .await
            .expect("Failed to create fee structure");
        self.wait_for_materialization(&structure.id).await
    }

    /// Polls until the structure's materialization reaches a final state.
    pub async fn wait_for_materialization(&self, structure_id: &str) -> FeeStructure {
        for _ in 0..200 {
            let structure = self
                .fees
                .get_fee_structure(SCHOOL_ID, structure_id)
                .await
                .expect("Failed to load fee structure");
            if matches!(
                structure.materialization.status,
                MaterializationStatus::Succeeded | MaterializationStatus::Failed
            ) {
                return structure;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("Materialization of {} did not finish", structure_id);
    }

    pub async fn installments_of(&self, student_id: &str) -> Vec<FeeInstallment> {
        let mut installments = self
            .store
            .find_installments(&InstallmentFilter {
                student_id: Some(student_id.to_string()),
                ..InstallmentFilter::for_school(SCHOOL_ID)
            })
            .await
            .expect("Failed to load installments");
        installments.sort_by_key(|i| i.due_date);
        installments
    }

    pub async fn installment(&self, installment_id: &str) -> FeeInstallment {
        self.fees
            .get_installment(SCHOOL_ID, installment_id)
            .await
            .expect("Failed to load installment")
    }
}

async fn seed(store: &InMemoryStore) {
    store
        .seed_school(School {
            id: SCHOOL_ID.to_string(),
            name: "Green Valley Public School".to_string(),
            address: Some("12 Lake Road".to_string()),
        })
        .await;
    store.seed_academic_year(academic_year()).await;

    for (id, section_name) in [(SECTION_A, "A"), (SECTION_B, "B")] {
        store
            .seed_section(Section {
                id: id.to_string(),
                school_id: SCHOOL_ID.to_string(),
                class_name: "5".to_string(),
                section_name: section_name.to_string(),
            })
            .await;
    }

    let students = STUDENTS_A
        .iter()
        .map(|id| (*id, SECTION_A))
        .chain(STUDENTS_B.iter().map(|id| (*id, SECTION_B)));
    for (n, (id, section)) in students.enumerate() {
        store
            .seed_student(Student {
                id: id.to_string(),
                school_id: SCHOOL_ID.to_string(),
                section_id: section.to_string(),
                name: format!("Student {}", n + 1),
                admission_no: format!("ADM-{:03}", n + 1),
                parent: Some(Parent {
                    name: format!("Parent {}", n + 1),
                    phone: Some("9800000000".to_string()),
                }),
            })
            .await;
    }
}
