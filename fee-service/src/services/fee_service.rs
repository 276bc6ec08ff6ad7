use super::store::FeeStore;
use crate::dtos::{
    CreateDonorRequest, CreateFeeScheduleRequest, CreateFeeTypeRequest, UpdateFeeScheduleRequest,
};
use crate::engine::compute_scheduled_dates;
use crate::error::FeeError;
use crate::models::{AcademicYear, Donor, FeeSchedule, FeeType};
use crate::workers::MaterializationQueue;
use chrono::{Datelike, NaiveDate, Utc};
use std::sync::Arc;

/// Upper bound on optimistic retries after a lost compare-and-swap.
pub(crate) const MAX_COMMIT_ATTEMPTS: usize = 5;

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// The acting user and the tenant context every operation runs in.
#[derive(Debug, Clone)]
pub struct Scope {
    pub school_id: String,
    pub user_id: String,
    pub academic_year: AcademicYear,
}

impl Scope {
    pub fn new(school_id: impl Into<String>, user_id: impl Into<String>, year: AcademicYear) -> Self {
        Self {
            school_id: school_id.into(),
            user_id: user_id.into(),
            academic_year: year,
        }
    }

    pub fn academic_year_id(&self) -> &str {
        &self.academic_year.id
    }
}

/// Fee ledger operations. Split by concern across `structures`,
/// `discounts`, `payments`, `installments` and `reports`.
#[derive(Clone)]
pub struct FeeService {
    pub(crate) store: Arc<dyn FeeStore>,
    pub(crate) jobs: MaterializationQueue,
}

impl FeeService {
    pub fn new(store: Arc<dyn FeeStore>, jobs: MaterializationQueue) -> Self {
        Self { store, jobs }
    }

    pub fn store(&self) -> &Arc<dyn FeeStore> {
        &self.store
    }

    pub async fn create_fee_type(
        &self,
        school_id: &str,
        req: CreateFeeTypeRequest,
    ) -> Result<FeeType, FeeError> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(FeeError::validation("Fee type name is required"));
        }
        let fee_type = FeeType::new(school_id.to_string(), name, req.description);
        self.store.insert_fee_type(&fee_type).await?;

        tracing::info!(
            school_id = %school_id,
            fee_type_id = %fee_type.id,
            name = %fee_type.name,
            "Fee type created"
        );
        Ok(fee_type)
    }

    pub async fn list_fee_types(&self, school_id: &str) -> Result<Vec<FeeType>, FeeError> {
        self.store.list_fee_types(school_id).await
    }

    pub async fn create_fee_schedule(
        &self,
        school_id: &str,
        current_year: i32,
        req: CreateFeeScheduleRequest,
    ) -> Result<FeeSchedule, FeeError> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(FeeError::validation("Schedule name is required"));
        }
        let (months, dates) = compute_scheduled_dates(
            &req.months,
            req.day,
            &req.existing_month_order,
            req.year.unwrap_or(current_year),
        )?;

        let schedule = FeeSchedule::new(
            school_id.to_string(),
            name,
            req.description,
            req.day,
            months,
            dates,
        );
        self.store.insert_schedule(&schedule).await?;

        tracing::info!(
            school_id = %school_id,
            schedule_id = %schedule.id,
            due_dates = schedule.scheduled_dates.len(),
            "Fee schedule created"
        );
        Ok(schedule)
    }

    /// Dates are recomputed whenever the day, the months or their order
    /// change. The year anchor stays on the schedule's first due date
    /// unless the request names one.
    pub async fn update_fee_schedule(
        &self,
        school_id: &str,
        schedule_id: &str,
        current_year: i32,
        req: UpdateFeeScheduleRequest,
    ) -> Result<FeeSchedule, FeeError> {
        let mut schedule = self
            .store
            .find_schedule(school_id, schedule_id)
            .await?
            .ok_or_else(|| FeeError::not_found("Fee schedule", schedule_id))?;

        if let Some(name) = req.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(FeeError::validation("Schedule name is required"));
            }
            schedule.name = name;
        }
        if req.description.is_some() {
            schedule.description = req.description;
        }

        let recompute = req.day.is_some()
            || req.months.is_some()
            || req.existing_month_order.is_some()
            || req.year.is_some();
        if recompute {
            let day = req.day.unwrap_or(schedule.day);
            let months = req.months.unwrap_or_else(|| schedule.months.clone());
            let order = req.existing_month_order.unwrap_or_default();
            let year = req.year.unwrap_or_else(|| {
                schedule
                    .scheduled_dates
                    .first()
                    .map(|d| d.year())
                    .unwrap_or(current_year)
            });
            let (months, dates) = compute_scheduled_dates(&months, day, &order, year)?;
            schedule.day = day;
            schedule.months = months;
            schedule.scheduled_dates = dates;
        }
        schedule.updated_at = Utc::now();
        self.store.replace_schedule(&schedule).await?;

        tracing::info!(
            school_id = %school_id,
            schedule_id = %schedule.id,
            recomputed = recompute,
            "Fee schedule updated"
        );
        Ok(schedule)
    }

    pub async fn get_fee_schedule(
        &self,
        school_id: &str,
        schedule_id: &str,
    ) -> Result<FeeSchedule, FeeError> {
        self.store
            .find_schedule(school_id, schedule_id)
            .await?
            .ok_or_else(|| FeeError::not_found("Fee schedule", schedule_id))
    }

    pub async fn list_fee_schedules(&self, school_id: &str) -> Result<Vec<FeeSchedule>, FeeError> {
        self.store.list_schedules(school_id).await
    }

    pub async fn create_donor(
        &self,
        school_id: &str,
        req: CreateDonorRequest,
    ) -> Result<Donor, FeeError> {
        let donor = Donor::new(school_id.to_string(), req.name.trim().to_string());
        self.store.insert_donor(&donor).await?;
        tracing::info!(school_id = %school_id, donor_id = %donor.id, "Donor registered");
        Ok(donor)
    }

    pub async fn get_donor(&self, school_id: &str, donor_id: &str) -> Result<Donor, FeeError> {
        self.store
            .find_donor(school_id, donor_id)
            .await?
            .ok_or_else(|| FeeError::not_found("Donor", donor_id))
    }
}
