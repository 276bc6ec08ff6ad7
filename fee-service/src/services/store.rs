use crate::error::FeeError;
use crate::models::{
    AcademicYear, DiscountCategory, Donor, FeeInstallment, FeeReceipt, FeeSchedule, FeeStructure,
    FeeType, InstallmentStatus, MaterializationState, MaterializationStatus, ReceiptCategory,
    School, Section, Student,
};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Result of a bulk installment insert. Rows whose
/// (student, row, due date) key already existed are counted, not failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted: u64,
    pub duplicates: u64,
}

/// Installment query. Every field but `school_id` is optional and the
/// set fields are combined with AND.
#[derive(Debug, Clone, Default)]
pub struct InstallmentFilter {
    pub school_id: String,
    pub academic_year_id: Option<String>,
    pub student_id: Option<String>,
    pub section_id: Option<String>,
    pub fee_structure_id: Option<String>,
    pub row_ids: Option<Vec<String>>,
    pub student_ids: Option<Vec<String>>,
    pub installment_ids: Option<Vec<String>>,
    /// Installments carrying a fragment of this discount.
    pub discount_id: Option<String>,
    pub status: Option<InstallmentStatus>,
    pub due_on_or_before: Option<NaiveDate>,
}

impl InstallmentFilter {
    pub fn for_school(school_id: impl Into<String>) -> Self {
        Self {
            school_id: school_id.into(),
            ..Default::default()
        }
    }

    pub fn matches(&self, inst: &FeeInstallment) -> bool {
        fn within(set: &Option<Vec<String>>, value: &String) -> bool {
            set.as_ref().map_or(true, |s| s.contains(value))
        }
        fn equals(expected: &Option<String>, value: &String) -> bool {
            expected.as_ref().map_or(true, |e| e == value)
        }

        inst.school_id == self.school_id
            && equals(&self.academic_year_id, &inst.academic_year_id)
            && equals(&self.student_id, &inst.student_id)
            && equals(&self.section_id, &inst.section_id)
            && equals(&self.fee_structure_id, &inst.fee_structure_id)
            && within(&self.row_ids, &inst.row_id)
            && within(&self.student_ids, &inst.student_id)
            && within(&self.installment_ids, &inst.id)
            && self
                .discount_id
                .as_ref()
                .map_or(true, |d| inst.discount(d).is_some())
            && self.status.map_or(true, |s| s == inst.status)
            && self.due_on_or_before.map_or(true, |d| inst.due_date <= d)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReceiptFilter {
    pub school_id: String,
    pub student_id: Option<String>,
    /// Inclusive range over `issued_on`.
    pub issued_from: Option<NaiveDate>,
    pub issued_to: Option<NaiveDate>,
    pub include_cancelled: bool,
}

/// Writes of one discount operation, committed together.
#[derive(Debug, Clone)]
pub struct DiscountCommit {
    pub category: DiscountCategory,
    pub installments: Vec<FeeInstallment>,
}

/// Drops students from a structure. The structure and every listed
/// installment are checked at the revision the caller read; the commit
/// also fails when the students hold installments that are not listed.
#[derive(Debug, Clone)]
pub struct RemovalCommit {
    pub structure: FeeStructure,
    pub removed_students: Vec<String>,
    pub installments: Vec<FeeInstallment>,
}

#[derive(Debug, Clone)]
pub struct PaymentCommit {
    pub installments: Vec<FeeInstallment>,
    pub receipt: FeeReceipt,
    pub donor: Option<Donor>,
}

#[derive(Debug, Clone)]
pub struct CancellationCommit {
    pub installments: Vec<FeeInstallment>,
    pub receipt: FeeReceipt,
    pub donor: Option<Donor>,
}

/// Persistence for the fee ledger.
///
/// Documents carrying a `revision` are written compare-and-swap: the store
/// only applies the write when the stored revision still equals the one on
/// the value passed in, and stores `revision + 1`. A lost race surfaces as
/// [`FeeError::ConcurrentModification`]. `commit_*` methods apply all of
/// their writes or none.
#[async_trait]
pub trait FeeStore: Send + Sync {
    async fn health_check(&self) -> Result<(), FeeError>;

    async fn find_school(&self, school_id: &str) -> Result<Option<School>, FeeError>;
    async fn find_active_academic_year(
        &self,
        school_id: &str,
    ) -> Result<Option<AcademicYear>, FeeError>;
    async fn find_section(
        &self,
        school_id: &str,
        section_id: &str,
    ) -> Result<Option<Section>, FeeError>;
    async fn find_students(
        &self,
        school_id: &str,
        student_ids: &[String],
    ) -> Result<Vec<Student>, FeeError>;
    async fn find_students_in_sections(
        &self,
        school_id: &str,
        section_ids: &[String],
    ) -> Result<Vec<Student>, FeeError>;

    async fn insert_fee_type(&self, fee_type: &FeeType) -> Result<(), FeeError>;
    async fn list_fee_types(&self, school_id: &str) -> Result<Vec<FeeType>, FeeError>;

    async fn insert_schedule(&self, schedule: &FeeSchedule) -> Result<(), FeeError>;
    async fn replace_schedule(&self, schedule: &FeeSchedule) -> Result<(), FeeError>;
    async fn find_schedule(
        &self,
        school_id: &str,
        schedule_id: &str,
    ) -> Result<Option<FeeSchedule>, FeeError>;
    async fn list_schedules(&self, school_id: &str) -> Result<Vec<FeeSchedule>, FeeError>;

    async fn insert_structure(&self, structure: &FeeStructure) -> Result<(), FeeError>;
    async fn replace_structure(&self, structure: &FeeStructure) -> Result<(), FeeError>;
    /// Replaces the structure and deletes the removed students'
    /// installments in one commit.
    async fn commit_student_removal(&self, commit: RemovalCommit) -> Result<(), FeeError>;
    async fn find_structure(
        &self,
        school_id: &str,
        structure_id: &str,
    ) -> Result<Option<FeeStructure>, FeeError>;
    async fn list_structures(
        &self,
        school_id: &str,
        academic_year_id: &str,
    ) -> Result<Vec<FeeStructure>, FeeError>;
    /// Overwrites the job state and bumps the structure revision, but only
    /// while the stored state still belongs to `expected_job_id`. Returns
    /// `false` when another job has taken the structure over.
    async fn set_materialization(
        &self,
        structure_id: &str,
        expected_job_id: Option<&str>,
        state: &MaterializationState,
    ) -> Result<bool, FeeError>;
    /// Across all schools; used by startup recovery and the sweeper.
    async fn list_structures_by_materialization(
        &self,
        statuses: &[MaterializationStatus],
    ) -> Result<Vec<FeeStructure>, FeeError>;

    async fn insert_installments(
        &self,
        installments: Vec<FeeInstallment>,
    ) -> Result<InsertOutcome, FeeError>;
    async fn find_installments(
        &self,
        filter: &InstallmentFilter,
    ) -> Result<Vec<FeeInstallment>, FeeError>;
    async fn count_installments(&self, filter: &InstallmentFilter) -> Result<u64, FeeError>;
    async fn find_installment(
        &self,
        school_id: &str,
        installment_id: &str,
    ) -> Result<Option<FeeInstallment>, FeeError>;
    /// Earliest-due installment of a fee row; percentage discounts are
    /// computed from its amount.
    async fn find_row_anchor(
        &self,
        school_id: &str,
        row_id: &str,
    ) -> Result<Option<FeeInstallment>, FeeError>;
    async fn replace_installment(&self, installment: &FeeInstallment) -> Result<(), FeeError>;
    /// Moves `Upcoming` installments due on or before `as_of` to `Due`.
    async fn sweep_due(&self, school_id: Option<&str>, as_of: NaiveDate)
        -> Result<u64, FeeError>;

    async fn insert_discount_category(&self, category: &DiscountCategory) -> Result<(), FeeError>;
    async fn find_discount_category(
        &self,
        school_id: &str,
        discount_id: &str,
    ) -> Result<Option<DiscountCategory>, FeeError>;
    async fn list_discount_categories(
        &self,
        school_id: &str,
    ) -> Result<Vec<DiscountCategory>, FeeError>;
    async fn commit_discount(&self, commit: DiscountCommit) -> Result<(), FeeError>;

    /// Atomically increments and returns the school's counter for a series.
    async fn next_sequence(
        &self,
        school_id: &str,
        category: ReceiptCategory,
    ) -> Result<i64, FeeError>;
    async fn commit_payment(&self, commit: PaymentCommit) -> Result<(), FeeError>;
    async fn commit_cancellation(&self, commit: CancellationCommit) -> Result<(), FeeError>;
    async fn find_receipt(
        &self,
        school_id: &str,
        receipt_id: &str,
    ) -> Result<Option<FeeReceipt>, FeeError>;
    async fn list_receipts(&self, filter: &ReceiptFilter) -> Result<Vec<FeeReceipt>, FeeError>;

    async fn insert_donor(&self, donor: &Donor) -> Result<(), FeeError>;
    async fn find_donor(&self, school_id: &str, donor_id: &str)
        -> Result<Option<Donor>, FeeError>;
}
