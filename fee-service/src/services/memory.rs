//! Process-local [`FeeStore`] used by tests and `STORE_BACKEND=memory`.
//!
//! One mutex guards all collections, so every `commit_*` is trivially
//! atomic. Revision checks mirror the MongoDB store.

use super::store::{
    CancellationCommit, DiscountCommit, FeeStore, InsertOutcome, InstallmentFilter, PaymentCommit,
    ReceiptFilter, RemovalCommit,
};
use crate::engine::counter_key;
use crate::error::FeeError;
use crate::models::{
    AcademicYear, DiscountCategory, Donor, FeeInstallment, FeeReceipt, FeeSchedule, FeeStructure,
    FeeType, InstallmentStatus, MaterializationState, MaterializationStatus, ReceiptCategory,
    ReceiptStatus, School, Section, Student,
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    schools: HashMap<String, School>,
    academic_years: HashMap<String, AcademicYear>,
    sections: HashMap<String, Section>,
    students: HashMap<String, Student>,
    fee_types: HashMap<String, FeeType>,
    schedules: HashMap<String, FeeSchedule>,
    structures: HashMap<String, FeeStructure>,
    installments: HashMap<String, FeeInstallment>,
    installment_keys: HashSet<(String, String, NaiveDate)>,
    discounts: HashMap<String, DiscountCategory>,
    receipts: HashMap<String, FeeReceipt>,
    counters: HashMap<String, i64>,
    donors: HashMap<String, Donor>,
}

impl State {
    fn check_installment(&self, inst: &FeeInstallment) -> Result<(), FeeError> {
        match self.installments.get(&inst.id) {
            Some(stored) if stored.revision == inst.revision => Ok(()),
            Some(_) => Err(FeeError::ConcurrentModification(format!(
                "Installment {}",
                inst.id
            ))),
            None => Err(FeeError::not_found("Installment", &inst.id)),
        }
    }

    fn check_donor(&self, donor: &Donor) -> Result<(), FeeError> {
        match self.donors.get(&donor.id) {
            Some(stored) if stored.revision == donor.revision => Ok(()),
            Some(_) => Err(FeeError::ConcurrentModification(format!("Donor {}", donor.id))),
            None => Err(FeeError::not_found("Donor", &donor.id)),
        }
    }

    fn put_installments(&mut self, installments: Vec<FeeInstallment>) {
        for mut inst in installments {
            inst.revision += 1;
            self.installments.insert(inst.id.clone(), inst);
        }
    }

    fn remove_installment(&mut self, id: &str) -> Option<FeeInstallment> {
        let inst = self.installments.remove(id)?;
        self.installment_keys
            .remove(&(inst.student_id.clone(), inst.row_id.clone(), inst.due_date));
        Some(inst)
    }

    fn put_donor(&mut self, donor: Option<Donor>) {
        if let Some(mut donor) = donor {
            donor.revision += 1;
            self.donors.insert(donor.id.clone(), donor);
        }
    }
}

fn sorted_by<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(|i| key(i));
    items
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    failing_inserts: AtomicU32,
    insert_delay_ms: AtomicU64,
    inserts_in_flight: AtomicU32,
    max_inserts_in_flight: AtomicU32,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_school(&self, school: School) {
        self.state
            .lock()
            .await
            .schools
            .insert(school.id.clone(), school);
    }

    pub async fn seed_academic_year(&self, year: AcademicYear) {
        self.state
            .lock()
            .await
            .academic_years
            .insert(year.id.clone(), year);
    }

    pub async fn seed_section(&self, section: Section) {
        self.state
            .lock()
            .await
            .sections
            .insert(section.id.clone(), section);
    }

    pub async fn seed_student(&self, student: Student) {
        self.state
            .lock()
            .await
            .students
            .insert(student.id.clone(), student);
    }

    /// Makes the next `count` calls to `insert_installments` fail with a
    /// store error before writing anything.
    pub fn fail_next_installment_inserts(&self, count: u32) {
        self.failing_inserts.store(count, Ordering::SeqCst);
    }

    /// Deletes a student's installments on a structure without touching
    /// the structure, leaving it short of its expected count.
    pub async fn drop_installments(&self, structure_id: &str, student_id: &str) -> u64 {
        let mut state = self.state.lock().await;
        let ids: Vec<String> = state
            .installments
            .values()
            .filter(|i| i.fee_structure_id == structure_id && i.student_id == student_id)
            .map(|i| i.id.clone())
            .collect();
        for id in &ids {
            state.remove_installment(id);
        }
        ids.len() as u64
    }

    /// Holds every `insert_installments` call for `delay` before writing.
    pub fn delay_installment_inserts(&self, delay: Duration) {
        self.insert_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Highest number of `insert_installments` calls seen running at once.
    pub fn max_concurrent_installment_inserts(&self) -> u32 {
        self.max_inserts_in_flight.load(Ordering::SeqCst)
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl FeeStore for InMemoryStore {
    async fn health_check(&self) -> Result<(), FeeError> {
        Ok(())
    }

    async fn find_school(&self, school_id: &str) -> Result<Option<School>, FeeError> {
        Ok(self.state.lock().await.schools.get(school_id).cloned())
    }

    async fn find_active_academic_year(
        &self,
        school_id: &str,
    ) -> Result<Option<AcademicYear>, FeeError> {
        Ok(self
            .state
            .lock()
            .await
            .academic_years
            .values()
            .find(|y| y.school_id == school_id && y.is_active)
            .cloned())
    }

    async fn find_section(
        &self,
        school_id: &str,
        section_id: &str,
    ) -> Result<Option<Section>, FeeError> {
        Ok(self
            .state
            .lock()
            .await
            .sections
            .get(section_id)
            .filter(|s| s.school_id == school_id)
            .cloned())
    }

    async fn find_students(
        &self,
        school_id: &str,
        student_ids: &[String],
    ) -> Result<Vec<Student>, FeeError> {
        let state = self.state.lock().await;
        Ok(student_ids
            .iter()
            .filter_map(|id| state.students.get(id))
            .filter(|s| s.school_id == school_id)
            .cloned()
            .collect())
    }

    async fn find_students_in_sections(
        &self,
        school_id: &str,
        section_ids: &[String],
    ) -> Result<Vec<Student>, FeeError> {
        let state = self.state.lock().await;
        let students = state
            .students
            .values()
            .filter(|s| s.school_id == school_id && section_ids.contains(&s.section_id))
            .cloned()
            .collect();
        Ok(sorted_by(students, |s: &Student| s.id.clone()))
    }

    async fn insert_fee_type(&self, fee_type: &FeeType) -> Result<(), FeeError> {
        let mut state = self.state.lock().await;
        if state
            .fee_types
            .values()
            .any(|t| t.school_id == fee_type.school_id && t.name == fee_type.name)
        {
            return Err(FeeError::DuplicateName {
                entity: "Fee type",
                name: fee_type.name.clone(),
            });
        }
        state.fee_types.insert(fee_type.id.clone(), fee_type.clone());
        Ok(())
    }

    async fn list_fee_types(&self, school_id: &str) -> Result<Vec<FeeType>, FeeError> {
        let state = self.state.lock().await;
        let types = state
            .fee_types
            .values()
            .filter(|t| t.school_id == school_id)
            .cloned()
            .collect();
        Ok(sorted_by(types, |t: &FeeType| t.name.clone()))
    }

    async fn insert_schedule(&self, schedule: &FeeSchedule) -> Result<(), FeeError> {
        let mut state = self.state.lock().await;
        if state
            .schedules
            .values()
            .any(|s| s.school_id == schedule.school_id && s.name == schedule.name)
        {
            return Err(FeeError::DuplicateName {
                entity: "Fee schedule",
                name: schedule.name.clone(),
            });
        }
        state.schedules.insert(schedule.id.clone(), schedule.clone());
        Ok(())
    }

    async fn replace_schedule(&self, schedule: &FeeSchedule) -> Result<(), FeeError> {
        let mut state = self.state.lock().await;
        if state.schedules.values().any(|s| {
            s.school_id == schedule.school_id && s.name == schedule.name && s.id != schedule.id
        }) {
            return Err(FeeError::DuplicateName {
                entity: "Fee schedule",
                name: schedule.name.clone(),
            });
        }
        match state.schedules.get_mut(&schedule.id) {
            Some(stored) if stored.school_id == schedule.school_id => {
                *stored = schedule.clone();
                Ok(())
            }
            _ => Err(FeeError::not_found("Fee schedule", &schedule.id)),
        }
    }

    async fn find_schedule(
        &self,
        school_id: &str,
        schedule_id: &str,
    ) -> Result<Option<FeeSchedule>, FeeError> {
        Ok(self
            .state
            .lock()
            .await
            .schedules
            .get(schedule_id)
            .filter(|s| s.school_id == school_id)
            .cloned())
    }

    async fn list_schedules(&self, school_id: &str) -> Result<Vec<FeeSchedule>, FeeError> {
        let state = self.state.lock().await;
        let schedules = state
            .schedules
            .values()
            .filter(|s| s.school_id == school_id)
            .cloned()
            .collect();
        Ok(sorted_by(schedules, |s: &FeeSchedule| s.name.clone()))
    }

    async fn insert_structure(&self, structure: &FeeStructure) -> Result<(), FeeError> {
        let mut state = self.state.lock().await;
        if state.structures.values().any(|s| {
            s.school_id == structure.school_id
                && s.academic_year_id == structure.academic_year_id
                && s.name == structure.name
        }) {
            return Err(FeeError::DuplicateName {
                entity: "Fee structure",
                name: structure.name.clone(),
            });
        }
        state
            .structures
            .insert(structure.id.clone(), structure.clone());
        Ok(())
    }

    async fn replace_structure(&self, structure: &FeeStructure) -> Result<(), FeeError> {
        let mut state = self.state.lock().await;
        match state.structures.get_mut(&structure.id) {
            Some(stored) if stored.revision == structure.revision => {
                *stored = structure.clone();
                stored.revision += 1;
                Ok(())
            }
            Some(_) => Err(FeeError::ConcurrentModification(format!(
                "Fee structure {}",
                structure.id
            ))),
            None => Err(FeeError::not_found("Fee structure", &structure.id)),
        }
    }

    async fn commit_student_removal(&self, commit: RemovalCommit) -> Result<(), FeeError> {
        let mut state = self.state.lock().await;
        let structure = &commit.structure;
        match state.structures.get(&structure.id) {
            Some(stored) if stored.revision == structure.revision => {}
            Some(_) => {
                return Err(FeeError::ConcurrentModification(format!(
                    "Fee structure {}",
                    structure.id
                )))
            }
            None => return Err(FeeError::not_found("Fee structure", &structure.id)),
        }
        for inst in &commit.installments {
            state.check_installment(inst)?;
        }
        let listed: HashSet<&str> = commit.installments.iter().map(|i| i.id.as_str()).collect();
        let unlisted = state.installments.values().any(|i| {
            i.school_id == structure.school_id
                && i.fee_structure_id == structure.id
                && commit.removed_students.contains(&i.student_id)
                && !listed.contains(i.id.as_str())
        });
        if unlisted {
            return Err(FeeError::ConcurrentModification(format!(
                "Fee structure {} installments",
                structure.id
            )));
        }

        for inst in &commit.installments {
            state.remove_installment(&inst.id);
        }
        let mut next = commit.structure;
        next.revision += 1;
        state.structures.insert(next.id.clone(), next);
        Ok(())
    }

    async fn find_structure(
        &self,
        school_id: &str,
        structure_id: &str,
    ) -> Result<Option<FeeStructure>, FeeError> {
        Ok(self
            .state
            .lock()
            .await
            .structures
            .get(structure_id)
            .filter(|s| s.school_id == school_id)
            .cloned())
    }

    async fn list_structures(
        &self,
        school_id: &str,
        academic_year_id: &str,
    ) -> Result<Vec<FeeStructure>, FeeError> {
        let state = self.state.lock().await;
        let structures = state
            .structures
            .values()
            .filter(|s| s.school_id == school_id && s.academic_year_id == academic_year_id)
            .cloned()
            .collect();
        Ok(sorted_by(structures, |s: &FeeStructure| s.created_at))
    }

    async fn set_materialization(
        &self,
        structure_id: &str,
        expected_job_id: Option<&str>,
        state_update: &MaterializationState,
    ) -> Result<bool, FeeError> {
        let mut state = self.state.lock().await;
        let structure = state
            .structures
            .get_mut(structure_id)
            .ok_or_else(|| FeeError::not_found("Fee structure", structure_id))?;
        if structure.materialization.job_id.as_deref() != expected_job_id {
            return Ok(false);
        }
        structure.materialization = state_update.clone();
        structure.revision += 1;
        Ok(true)
    }

    async fn list_structures_by_materialization(
        &self,
        statuses: &[MaterializationStatus],
    ) -> Result<Vec<FeeStructure>, FeeError> {
        let state = self.state.lock().await;
        let structures = state
            .structures
            .values()
            .filter(|s| statuses.contains(&s.materialization.status))
            .cloned()
            .collect();
        Ok(sorted_by(structures, |s: &FeeStructure| s.created_at))
    }

    async fn insert_installments(
        &self,
        installments: Vec<FeeInstallment>,
    ) -> Result<InsertOutcome, FeeError> {
        if self.take_injected_failure() {
            return Err(FeeError::Store(anyhow::anyhow!(
                "injected installment insert failure"
            )));
        }
        let in_flight = self.inserts_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inserts_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        let delay = self.insert_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let mut state = self.state.lock().await;
        self.inserts_in_flight.fetch_sub(1, Ordering::SeqCst);
        let mut outcome = InsertOutcome::default();
        for inst in installments {
            let key = (inst.student_id.clone(), inst.row_id.clone(), inst.due_date);
            if !state.installment_keys.insert(key) {
                outcome.duplicates += 1;
                continue;
            }
            state.installments.insert(inst.id.clone(), inst);
            outcome.inserted += 1;
        }
        Ok(outcome)
    }

    async fn find_installments(
        &self,
        filter: &InstallmentFilter,
    ) -> Result<Vec<FeeInstallment>, FeeError> {
        let state = self.state.lock().await;
        let found = state
            .installments
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        Ok(sorted_by(found, |i: &FeeInstallment| {
            (i.due_date, i.student_id.clone(), i.id.clone())
        }))
    }

    async fn count_installments(&self, filter: &InstallmentFilter) -> Result<u64, FeeError> {
        let state = self.state.lock().await;
        Ok(state
            .installments
            .values()
            .filter(|i| filter.matches(i))
            .count() as u64)
    }

    async fn find_installment(
        &self,
        school_id: &str,
        installment_id: &str,
    ) -> Result<Option<FeeInstallment>, FeeError> {
        Ok(self
            .state
            .lock()
            .await
            .installments
            .get(installment_id)
            .filter(|i| i.school_id == school_id)
            .cloned())
    }

    async fn find_row_anchor(
        &self,
        school_id: &str,
        row_id: &str,
    ) -> Result<Option<FeeInstallment>, FeeError> {
        let state = self.state.lock().await;
        Ok(state
            .installments
            .values()
            .filter(|i| i.school_id == school_id && i.row_id == row_id)
            .min_by_key(|i| (i.due_date, i.created_at))
            .cloned())
    }

    async fn replace_installment(&self, installment: &FeeInstallment) -> Result<(), FeeError> {
        let mut state = self.state.lock().await;
        state.check_installment(installment)?;
        state.put_installments(vec![installment.clone()]);
        Ok(())
    }

    async fn sweep_due(
        &self,
        school_id: Option<&str>,
        as_of: NaiveDate,
    ) -> Result<u64, FeeError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut moved = 0;
        for inst in state.installments.values_mut() {
            if school_id.map_or(true, |s| s == inst.school_id)
                && inst.status == InstallmentStatus::Upcoming
                && inst.due_date <= as_of
            {
                inst.status = InstallmentStatus::Due;
                inst.revision += 1;
                inst.updated_at = now;
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn insert_discount_category(&self, category: &DiscountCategory) -> Result<(), FeeError> {
        let mut state = self.state.lock().await;
        if state
            .discounts
            .values()
            .any(|d| d.school_id == category.school_id && d.name == category.name)
        {
            return Err(FeeError::DuplicateName {
                entity: "Discount category",
                name: category.name.clone(),
            });
        }
        state.discounts.insert(category.id.clone(), category.clone());
        Ok(())
    }

    async fn find_discount_category(
        &self,
        school_id: &str,
        discount_id: &str,
    ) -> Result<Option<DiscountCategory>, FeeError> {
        Ok(self
            .state
            .lock()
            .await
            .discounts
            .get(discount_id)
            .filter(|d| d.school_id == school_id)
            .cloned())
    }

    async fn list_discount_categories(
        &self,
        school_id: &str,
    ) -> Result<Vec<DiscountCategory>, FeeError> {
        let state = self.state.lock().await;
        let categories = state
            .discounts
            .values()
            .filter(|d| d.school_id == school_id)
            .cloned()
            .collect();
        Ok(sorted_by(categories, |d: &DiscountCategory| d.name.clone()))
    }

    async fn commit_discount(&self, commit: DiscountCommit) -> Result<(), FeeError> {
        let mut state = self.state.lock().await;
        match state.discounts.get(&commit.category.id) {
            Some(stored) if stored.revision == commit.category.revision => {}
            Some(_) => {
                return Err(FeeError::ConcurrentModification(format!(
                    "Discount category {}",
                    commit.category.id
                )))
            }
            None => return Err(FeeError::not_found("Discount category", &commit.category.id)),
        }
        for inst in &commit.installments {
            state.check_installment(inst)?;
        }

        let mut category = commit.category;
        category.revision += 1;
        state.discounts.insert(category.id.clone(), category);
        state.put_installments(commit.installments);
        Ok(())
    }

    async fn next_sequence(
        &self,
        school_id: &str,
        category: ReceiptCategory,
    ) -> Result<i64, FeeError> {
        let mut state = self.state.lock().await;
        let seq = state
            .counters
            .entry(counter_key(school_id, category))
            .or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    async fn commit_payment(&self, commit: PaymentCommit) -> Result<(), FeeError> {
        let mut state = self.state.lock().await;
        for inst in &commit.installments {
            state.check_installment(inst)?;
        }
        if let Some(donor) = &commit.donor {
            state.check_donor(donor)?;
        }
        if state.receipts.values().any(|r| {
            r.school_id == commit.receipt.school_id && r.receipt_id == commit.receipt.receipt_id
        }) {
            return Err(FeeError::Integrity(format!(
                "Receipt id {} already issued",
                commit.receipt.receipt_id
            )));
        }

        state.put_installments(commit.installments);
        state.put_donor(commit.donor);
        state
            .receipts
            .insert(commit.receipt.id.clone(), commit.receipt);
        Ok(())
    }

    async fn commit_cancellation(&self, commit: CancellationCommit) -> Result<(), FeeError> {
        let mut state = self.state.lock().await;
        match state.receipts.get(&commit.receipt.id) {
            Some(stored)
                if stored.revision == commit.receipt.revision
                    && stored.status == ReceiptStatus::Active => {}
            Some(_) => {
                return Err(FeeError::ConcurrentModification(format!(
                    "Receipt {}",
                    commit.receipt.receipt_id
                )))
            }
            None => return Err(FeeError::not_found("Receipt", &commit.receipt.receipt_id)),
        }
        for inst in &commit.installments {
            state.check_installment(inst)?;
        }
        if let Some(donor) = &commit.donor {
            state.check_donor(donor)?;
        }

        state.put_installments(commit.installments);
        state.put_donor(commit.donor);
        let mut receipt = commit.receipt;
        receipt.revision += 1;
        state.receipts.insert(receipt.id.clone(), receipt);
        Ok(())
    }

    async fn find_receipt(
        &self,
        school_id: &str,
        receipt_id: &str,
    ) -> Result<Option<FeeReceipt>, FeeError> {
        Ok(self
            .state
            .lock()
            .await
            .receipts
            .values()
            .find(|r| r.school_id == school_id && r.receipt_id == receipt_id)
            .cloned())
    }

    async fn list_receipts(&self, filter: &ReceiptFilter) -> Result<Vec<FeeReceipt>, FeeError> {
        let state = self.state.lock().await;
        let receipts = state
            .receipts
            .values()
            .filter(|r| r.school_id == filter.school_id)
            .filter(|r| filter.student_id.as_ref().map_or(true, |s| &r.student.student_id == s))
            .filter(|r| filter.issued_from.map_or(true, |from| r.issued_on >= from))
            .filter(|r| filter.issued_to.map_or(true, |to| r.issued_on <= to))
            .filter(|r| filter.include_cancelled || r.status == ReceiptStatus::Active)
            .cloned()
            .collect();
        Ok(sorted_by(receipts, |r: &FeeReceipt| {
            (r.issued_at, r.sequence)
        }))
    }

    async fn insert_donor(&self, donor: &Donor) -> Result<(), FeeError> {
        self.state
            .lock()
            .await
            .donors
            .insert(donor.id.clone(), donor.clone());
        Ok(())
    }

    async fn find_donor(
        &self,
        school_id: &str,
        donor_id: &str,
    ) -> Result<Option<Donor>, FeeError> {
        Ok(self
            .state
            .lock()
            .await
            .donors
            .get(donor_id)
            .filter(|d| d.school_id == school_id)
            .cloned())
    }
}
