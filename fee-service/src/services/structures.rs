use super::fee_service::{FeeService, Scope, MAX_COMMIT_ATTEMPTS};
use super::metrics;
use super::store::{InstallmentFilter, RemovalCommit};
use crate::dtos::{
    CreateFeeStructureRequest, FeeRowRequest, StructureAuditResponse, UpdateFeeStructureRequest,
};
use crate::error::FeeError;
use crate::models::{
    FeeInstallment, FeeRow, FeeStructure, MaterializationState, MaterializationStatus,
    RosterEntry, ScheduledEntry, Student,
};
use crate::workers::{JobScope, MaterializationJob};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashSet;
use uuid::Uuid;

fn ensure_unique(ids: &[String], what: &str) -> Result<(), FeeError> {
    let mut seen = HashSet::new();
    match ids.iter().find(|id| !seen.insert(id.as_str())) {
        Some(dup) => Err(FeeError::validation(format!("{} {} is listed twice", what, dup))),
        None => Ok(()),
    }
}

impl FeeService {
    async fn build_rows(
        &self,
        school_id: &str,
        requests: Vec<FeeRowRequest>,
    ) -> Result<Vec<FeeRow>, FeeError> {
        let fee_types: HashSet<String> = self
            .store
            .list_fee_types(school_id)
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();

        let mut rows = Vec::with_capacity(requests.len());
        for req in requests {
            if !fee_types.contains(&req.fee_type_id) {
                return Err(FeeError::not_found("Fee type", &req.fee_type_id));
            }
            if self
                .store
                .find_schedule(school_id, &req.schedule_type_id)
                .await?
                .is_none()
            {
                return Err(FeeError::not_found("Fee schedule", &req.schedule_type_id));
            }
            if req.scheduled_dates.is_empty() {
                return Err(FeeError::validation(
                    "Every fee row needs at least one scheduled entry",
                ));
            }
            let mut dates = HashSet::new();
            for entry in &req.scheduled_dates {
                if entry.amount <= Decimal::ZERO {
                    return Err(FeeError::validation(format!(
                        "Amount for {} must be greater than zero",
                        entry.date
                    )));
                }
                if !dates.insert(entry.date) {
                    return Err(FeeError::validation(format!(
                        "Due date {} appears twice in one fee row",
                        entry.date
                    )));
                }
            }
            rows.push(FeeRow::new(
                req.fee_type_id,
                req.schedule_type_id,
                req.scheduled_dates
                    .into_iter()
                    .map(|e| ScheduledEntry {
                        date: e.date,
                        amount: e.amount,
                    })
                    .collect(),
            ));
        }
        Ok(rows)
    }

    /// Loads the named students, requiring each to exist and to sit in one
    /// of the structure's classes.
    async fn roster_entries(
        &self,
        school_id: &str,
        classes: &[String],
        student_ids: &[String],
    ) -> Result<Vec<RosterEntry>, FeeError> {
        let students = self.store.find_students(school_id, student_ids).await?;
        let mut entries = Vec::with_capacity(student_ids.len());
        for id in student_ids {
            let student: &Student = students
                .iter()
                .find(|s| &s.id == id)
                .ok_or_else(|| FeeError::not_found("Student", id))?;
            if !classes.contains(&student.section_id) {
                return Err(FeeError::validation(format!(
                    "Student {} is not in any class of this fee structure",
                    id
                )));
            }
            entries.push(RosterEntry {
                student_id: student.id.clone(),
                section_id: student.section_id.clone(),
            });
        }
        Ok(entries)
    }

    fn enqueue(&self, structure: &FeeStructure, scope: JobScope) {
        let job_id = structure
            .materialization
            .job_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let job = MaterializationJob {
            job_id,
            school_id: structure.school_id.clone(),
            structure_id: structure.id.clone(),
            scope,
        };
        self.jobs.submit(job);
    }

    fn next_pending(previous: &MaterializationState) -> MaterializationState {
        let mut state = MaterializationState::pending(Uuid::new_v4().to_string());
        state.attempts = previous.attempts;
        state
    }

    pub async fn create_fee_structure(
        &self,
        scope: &Scope,
        req: CreateFeeStructureRequest,
    ) -> Result<FeeStructure, FeeError> {
        let school_id = scope.school_id.as_str();
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(FeeError::validation("Fee structure name is required"));
        }
        if req.classes.is_empty() {
            return Err(FeeError::validation("At least one class is required"));
        }
        if req.fee_rows.is_empty() {
            return Err(FeeError::validation("At least one fee row is required"));
        }
        ensure_unique(&req.classes, "Class")?;
        for section_id in &req.classes {
            if self.store.find_section(school_id, section_id).await?.is_none() {
                return Err(FeeError::not_found("Section", section_id));
            }
        }

        let fee_rows = self.build_rows(school_id, req.fee_rows).await?;

        let roster = match req.roster {
            Some(ids) => {
                ensure_unique(&ids, "Student")?;
                self.roster_entries(school_id, &req.classes, &ids).await?
            }
            None => self
                .store
                .find_students_in_sections(school_id, &req.classes)
                .await?
                .into_iter()
                .map(|s| RosterEntry {
                    student_id: s.id,
                    section_id: s.section_id,
                })
                .collect(),
        };

        let now = Utc::now();
        let structure = FeeStructure {
            id: Uuid::new_v4().to_string(),
            school_id: school_id.to_string(),
            academic_year_id: scope.academic_year_id().to_string(),
            name,
            category_id: req.category_id,
            classes: req.classes,
            fee_rows,
            roster,
            materialization: MaterializationState::pending(Uuid::new_v4().to_string()),
            revision: 0,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_structure(&structure).await?;

        tracing::info!(
            school_id = %school_id,
            academic_year_id = %structure.academic_year_id,
            structure_id = %structure.id,
            rows = structure.fee_rows.len(),
            students = structure.roster.len(),
            expected_installments = structure.expected_installments(),
            created_by = %scope.user_id,
            "Fee structure created; materialization queued"
        );
        self.enqueue(&structure, JobScope::Full);
        Ok(structure)
    }

    /// Grows or shrinks a structure. Additions are materialized by a delta
    /// job; removed students lose their installments right away.
    pub async fn update_fee_structure(
        &self,
        scope: &Scope,
        structure_id: &str,
        req: UpdateFeeStructureRequest,
    ) -> Result<FeeStructure, FeeError> {
        let school_id = scope.school_id.as_str();
        if req.added_rows.is_empty() && req.added_students.is_empty() && req.removed_students.is_empty()
        {
            return Err(FeeError::validation("Nothing to update"));
        }
        ensure_unique(&req.added_students, "Student")?;
        ensure_unique(&req.removed_students, "Student")?;
        if let Some(both) = req
            .added_students
            .iter()
            .find(|id| req.removed_students.contains(id))
        {
            return Err(FeeError::validation(format!(
                "Student {} cannot be added and removed at once",
                both
            )));
        }

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let mut structure = self
                .store
                .find_structure(school_id, structure_id)
                .await?
                .ok_or_else(|| FeeError::not_found("Fee structure", structure_id))?;

            for id in &req.added_students {
                if structure.has_student(id) {
                    return Err(FeeError::Conflict(format!(
                        "Student {} is already on this fee structure",
                        id
                    )));
                }
            }
            for id in &req.removed_students {
                if !structure.has_student(id) {
                    return Err(FeeError::validation(format!(
                        "Student {} is not on this fee structure",
                        id
                    )));
                }
            }

            let doomed = if req.removed_students.is_empty() {
                Vec::new()
            } else {
                self.removable_installments(&structure, &req.removed_students)
                    .await?
            };

            let added_rows = self.build_rows(school_id, req.added_rows.clone()).await?;
            let added_roster = self
                .roster_entries(school_id, &structure.classes, &req.added_students)
                .await?;
            let added_row_ids: Vec<String> = added_rows.iter().map(|r| r.id.clone()).collect();
            let has_additions = !added_rows.is_empty() || !added_roster.is_empty();

            structure.fee_rows.extend(added_rows);
            structure.roster.extend(added_roster);
            structure
                .roster
                .retain(|e| !req.removed_students.contains(&e.student_id));
            if has_additions {
                structure.materialization = Self::next_pending(&structure.materialization);
            }
            structure.updated_at = Utc::now();

            let deleted = doomed.len();
            let committed = if req.removed_students.is_empty() {
                self.store.replace_structure(&structure).await
            } else {
                self.store
                    .commit_student_removal(RemovalCommit {
                        structure: structure.clone(),
                        removed_students: req.removed_students.clone(),
                        installments: doomed,
                    })
                    .await
            };
            match committed {
                Ok(()) => structure.revision += 1,
                Err(FeeError::ConcurrentModification(_)) => {
                    tracing::debug!(structure_id = %structure_id, attempt, "Retrying fee structure update");
                    continue;
                }
                Err(e) => return Err(e),
            }

            if !req.removed_students.is_empty() {
                tracing::info!(
                    school_id = %school_id,
                    structure_id = %structure.id,
                    students = req.removed_students.len(),
                    deleted,
                    "Removed students from fee structure"
                );
            }

            if has_additions {
                tracing::info!(
                    school_id = %school_id,
                    structure_id = %structure.id,
                    rows_added = added_row_ids.len(),
                    students_added = req.added_students.len(),
                    updated_by = %scope.user_id,
                    "Fee structure extended; delta materialization queued"
                );
                self.enqueue(
                    &structure,
                    JobScope::Delta {
                        row_ids: added_row_ids,
                        student_ids: req.added_students.clone(),
                    },
                );
            }
            return Ok(structure);
        }
        Err(FeeError::ConcurrentModification(format!(
            "Fee structure {}",
            structure_id
        )))
    }

    /// Installments of students leaving a structure. Students with payments
    /// or discounts on it cannot leave.
    async fn removable_installments(
        &self,
        structure: &FeeStructure,
        student_ids: &[String],
    ) -> Result<Vec<FeeInstallment>, FeeError> {
        let installments = self
            .store
            .find_installments(&InstallmentFilter {
                fee_structure_id: Some(structure.id.clone()),
                student_ids: Some(student_ids.to_vec()),
                ..InstallmentFilter::for_school(&structure.school_id)
            })
            .await?;
        if let Some(paid) = installments.iter().find(|i| i.paid_amount > Decimal::ZERO) {
            return Err(FeeError::StudentHasPayments {
                student_id: paid.student_id.clone(),
            });
        }
        if let Some(discounted) = installments.iter().find(|i| !i.discounts.is_empty()) {
            return Err(FeeError::Conflict(format!(
                "Student {} has discounts on this fee structure; remove them first",
                discounted.student_id
            )));
        }
        Ok(installments)
    }

    pub async fn get_fee_structure(
        &self,
        school_id: &str,
        structure_id: &str,
    ) -> Result<FeeStructure, FeeError> {
        self.store
            .find_structure(school_id, structure_id)
            .await?
            .ok_or_else(|| FeeError::not_found("Fee structure", structure_id))
    }

    pub async fn list_fee_structures(&self, scope: &Scope) -> Result<Vec<FeeStructure>, FeeError> {
        self.store
            .list_structures(&scope.school_id, scope.academic_year_id())
            .await
    }

    /// Queues a full (idempotent) materialization of a structure that is
    /// not currently running.
    pub async fn retry_materialization(
        &self,
        school_id: &str,
        structure_id: &str,
    ) -> Result<FeeStructure, FeeError> {
        let mut structure = self.get_fee_structure(school_id, structure_id).await?;
        if structure.materialization.status == MaterializationStatus::Running {
            return Err(FeeError::Conflict(format!(
                "Materialization of fee structure {} is already running",
                structure_id
            )));
        }
        let next = Self::next_pending(&structure.materialization);
        let claimed = self
            .store
            .set_materialization(
                &structure.id,
                structure.materialization.job_id.as_deref(),
                &next,
            )
            .await?;
        if !claimed {
            return Err(FeeError::ConcurrentModification(format!(
                "Materialization of fee structure {}",
                structure_id
            )));
        }
        structure.materialization = next;
        structure.revision += 1;

        tracing::info!(
            school_id = %school_id,
            structure_id = %structure.id,
            attempts = structure.materialization.attempts,
            "Materialization re-queued"
        );
        self.enqueue(&structure, JobScope::Full);
        Ok(structure)
    }

    /// Compares the persisted installment count with `roster × entries`.
    /// Missing installments on a structure that is not being materialized
    /// are an integrity error and trigger a repair job.
    pub async fn audit_structure(
        &self,
        school_id: &str,
        structure_id: &str,
    ) -> Result<StructureAuditResponse, FeeError> {
        let mut structure = self.get_fee_structure(school_id, structure_id).await?;
        let expected = structure.expected_installments();
        let actual = self
            .store
            .count_installments(&InstallmentFilter {
                fee_structure_id: Some(structure.id.clone()),
                ..InstallmentFilter::for_school(school_id)
            })
            .await?;

        let in_flight = matches!(
            structure.materialization.status,
            MaterializationStatus::Pending | MaterializationStatus::Running
        );
        let mut requeued_job_id = None;

        if actual != expected && !in_flight {
            metrics::record_integrity_error("installment_count");
            tracing::error!(
                school_id = %school_id,
                structure_id = %structure.id,
                expected,
                actual,
                "Installment count does not match fee structure"
            );
            if actual < expected {
                let next = Self::next_pending(&structure.materialization);
                let claimed = self
                    .store
                    .set_materialization(
                        &structure.id,
                        structure.materialization.job_id.as_deref(),
                        &next,
                    )
                    .await?;
                if claimed {
                    structure.materialization = next;
                    structure.revision += 1;
                    requeued_job_id = structure.materialization.job_id.clone();
                    self.enqueue(&structure, JobScope::Full);
                }
            }
        }

        Ok(StructureAuditResponse {
            structure_id: structure.id,
            expected_installments: expected,
            actual_installments: actual,
            consistent: actual == expected,
            requeued_job_id,
        })
    }
}
