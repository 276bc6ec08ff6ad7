use super::store::{
    CancellationCommit, DiscountCommit, FeeStore, InsertOutcome, InstallmentFilter, PaymentCommit,
    ReceiptFilter, RemovalCommit,
};
use crate::engine::counter_key;
use crate::error::FeeError;
use crate::models::{
    AcademicYear, DiscountCategory, Donor, FeeInstallment, FeeReceipt, FeeSchedule, FeeStructure,
    FeeType, InstallmentStatus, MaterializationState, MaterializationStatus, ReceiptCategory,
    ReceiptStatus, School, Section, SequenceCounter, Student,
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, to_bson, Document},
    error::{ErrorKind, WriteFailure},
    options::{
        FindOneAndUpdateOptions, FindOneOptions, FindOptions, IndexOptions, InsertManyOptions,
        ReturnDocument,
    },
    Client as MongoClient, ClientSession, Collection, Database, IndexModel,
};
use service_core::error::AppError;

const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref e)) if e.code == DUPLICATE_KEY
    )
}

fn duplicate_name(err: mongodb::error::Error, entity: &'static str, name: &str) -> FeeError {
    if is_duplicate_key(&err) {
        FeeError::DuplicateName {
            entity,
            name: name.to_string(),
        }
    } else {
        FeeError::from(err)
    }
}

fn installment_query(filter: &InstallmentFilter) -> Document {
    let mut query = doc! { "school_id": &filter.school_id };
    if let Some(v) = &filter.academic_year_id {
        query.insert("academic_year_id", v.as_str());
    }
    if let Some(v) = &filter.student_id {
        query.insert("student_id", v.as_str());
    }
    if let Some(v) = &filter.section_id {
        query.insert("section_id", v.as_str());
    }
    if let Some(v) = &filter.fee_structure_id {
        query.insert("fee_structure_id", v.as_str());
    }
    if let Some(v) = &filter.row_ids {
        query.insert("row_id", doc! { "$in": v.clone() });
    }
    if let Some(v) = &filter.student_ids {
        // student_id equality and membership can both be set
        if filter.student_id.is_none() {
            query.insert("student_id", doc! { "$in": v.clone() });
        } else {
            query.insert("$and", vec![doc! { "student_id": { "$in": v.clone() } }]);
        }
    }
    if let Some(v) = &filter.installment_ids {
        query.insert("_id", doc! { "$in": v.clone() });
    }
    if let Some(v) = &filter.discount_id {
        query.insert("discounts.discount_id", v.as_str());
    }
    if let Some(status) = filter.status {
        query.insert("status", status.as_str());
    }
    if let Some(date) = filter.due_on_or_before {
        // ISO dates compare correctly as strings
        query.insert("due_date", doc! { "$lte": date.to_string() });
    }
    query
}

fn revision_guard(id: &str, revision: i64) -> Document {
    doc! { "_id": id, "revision": revision }
}

#[derive(Clone)]
pub struct MongoDb {
    client: MongoClient,
    db: Database,
}

impl MongoDb {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!(uri = %uri, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB at {}: {}", uri, e);
            AppError::from(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    async fn create_index<T: Send + Sync>(
        &self,
        collection: &Collection<T>,
        keys: Document,
        name: &str,
        unique: bool,
    ) -> Result<(), AppError> {
        let index = IndexModel::builder()
            .keys(keys)
            .options(
                IndexOptions::builder()
                    .name(name.to_string())
                    .unique(unique)
                    .build(),
            )
            .build();
        collection.create_index(index, None).await.map_err(|e| {
            tracing::error!(
                "Failed to create index {} on {}: {}",
                name,
                collection.name(),
                e
            );
            AppError::from(e)
        })?;
        tracing::info!("Created index {}.{}", collection.name(), name);
        Ok(())
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for fee-service");

        // One receivable per (student, fee row, due date); materialization
        // retries rely on this to skip rows they already wrote.
        self.create_index(
            &self.installments(),
            doc! { "student_id": 1, "row_id": 1, "due_date": 1 },
            "installment_dedup",
            true,
        )
        .await?;
        self.create_index(
            &self.installments(),
            doc! { "school_id": 1, "academic_year_id": 1, "student_id": 1 },
            "installment_student_lookup",
            false,
        )
        .await?;
        self.create_index(
            &self.installments(),
            doc! { "school_id": 1, "fee_structure_id": 1 },
            "installment_structure_lookup",
            false,
        )
        .await?;
        self.create_index(
            &self.installments(),
            doc! { "school_id": 1, "status": 1, "due_date": 1 },
            "installment_due_sweep",
            false,
        )
        .await?;
        self.create_index(
            &self.installments(),
            doc! { "school_id": 1, "discounts.discount_id": 1 },
            "installment_discount_lookup",
            false,
        )
        .await?;

        self.create_index(
            &self.fee_types(),
            doc! { "school_id": 1, "name": 1 },
            "fee_type_name",
            true,
        )
        .await?;
        self.create_index(
            &self.schedules(),
            doc! { "school_id": 1, "name": 1 },
            "fee_schedule_name",
            true,
        )
        .await?;
        self.create_index(
            &self.structures(),
            doc! { "school_id": 1, "academic_year_id": 1, "name": 1 },
            "fee_structure_name",
            true,
        )
        .await?;
        self.create_index(
            &self.structures(),
            doc! { "materialization.status": 1 },
            "fee_structure_materialization",
            false,
        )
        .await?;
        self.create_index(
            &self.discounts(),
            doc! { "school_id": 1, "name": 1 },
            "discount_category_name",
            true,
        )
        .await?;
        self.create_index(
            &self.receipts(),
            doc! { "school_id": 1, "receipt_id": 1 },
            "receipt_number",
            true,
        )
        .await?;
        self.create_index(
            &self.receipts(),
            doc! { "school_id": 1, "student.student_id": 1, "issued_on": 1 },
            "receipt_student_lookup",
            false,
        )
        .await?;

        Ok(())
    }

    pub fn client(&self) -> &MongoClient {
        &self.client
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn schools(&self) -> Collection<School> {
        self.db.collection("schools")
    }

    fn academic_years(&self) -> Collection<AcademicYear> {
        self.db.collection("academic_years")
    }

    fn sections(&self) -> Collection<Section> {
        self.db.collection("sections")
    }

    fn students(&self) -> Collection<Student> {
        self.db.collection("students")
    }

    fn fee_types(&self) -> Collection<FeeType> {
        self.db.collection("fee_types")
    }

    fn schedules(&self) -> Collection<FeeSchedule> {
        self.db.collection("fee_schedules")
    }

    fn structures(&self) -> Collection<FeeStructure> {
        self.db.collection("fee_structures")
    }

    fn installments(&self) -> Collection<FeeInstallment> {
        self.db.collection("fee_installments")
    }

    fn discounts(&self) -> Collection<DiscountCategory> {
        self.db.collection("discount_categories")
    }

    fn receipts(&self) -> Collection<FeeReceipt> {
        self.db.collection("fee_receipts")
    }

    fn counters(&self) -> Collection<SequenceCounter> {
        self.db.collection("counters")
    }

    fn donors(&self) -> Collection<Donor> {
        self.db.collection("donors")
    }

    /// Runs `body` inside a transaction, aborting on any error.
    async fn in_transaction<F>(&self, body: F) -> Result<(), FeeError>
    where
        F: for<'s> FnOnce(
            &'s Self,
            &'s mut ClientSession,
        ) -> futures::future::BoxFuture<'s, Result<(), FeeError>>,
    {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        match body(self, &mut session).await {
            Ok(()) => {
                session.commit_transaction().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(abort) = session.abort_transaction().await {
                    tracing::warn!(error = %abort, "Failed to abort transaction");
                }
                Err(e)
            }
        }
    }

    async fn swap_installments(
        &self,
        installments: &[FeeInstallment],
        session: &mut ClientSession,
    ) -> Result<(), FeeError> {
        for inst in installments {
            let mut next = inst.clone();
            next.revision += 1;
            let result = self
                .installments()
                .replace_one_with_session(
                    revision_guard(&inst.id, inst.revision),
                    &next,
                    None,
                    session,
                )
                .await?;
            if result.matched_count == 0 {
                return Err(FeeError::ConcurrentModification(format!(
                    "Installment {}",
                    inst.id
                )));
            }
        }
        Ok(())
    }

    async fn swap_donor(
        &self,
        donor: Option<&Donor>,
        session: &mut ClientSession,
    ) -> Result<(), FeeError> {
        let Some(donor) = donor else {
            return Ok(());
        };
        let mut next = donor.clone();
        next.revision += 1;
        let result = self
            .donors()
            .replace_one_with_session(
                revision_guard(&donor.id, donor.revision),
                &next,
                None,
                session,
            )
            .await?;
        if result.matched_count == 0 {
            return Err(FeeError::ConcurrentModification(format!(
                "Donor {}",
                donor.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl FeeStore for MongoDb {
    async fn health_check(&self) -> Result<(), FeeError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                FeeError::from(e)
            })?;
        Ok(())
    }

    async fn find_school(&self, school_id: &str) -> Result<Option<School>, FeeError> {
        Ok(self.schools().find_one(doc! { "_id": school_id }, None).await?)
    }

    async fn find_active_academic_year(
        &self,
        school_id: &str,
    ) -> Result<Option<AcademicYear>, FeeError> {
        Ok(self
            .academic_years()
            .find_one(doc! { "school_id": school_id, "is_active": true }, None)
            .await?)
    }

    async fn find_section(
        &self,
        school_id: &str,
        section_id: &str,
    ) -> Result<Option<Section>, FeeError> {
        Ok(self
            .sections()
            .find_one(doc! { "_id": section_id, "school_id": school_id }, None)
            .await?)
    }

    async fn find_students(
        &self,
        school_id: &str,
        student_ids: &[String],
    ) -> Result<Vec<Student>, FeeError> {
        let cursor = self
            .students()
            .find(
                doc! { "school_id": school_id, "_id": { "$in": student_ids.to_vec() } },
                None,
            )
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_students_in_sections(
        &self,
        school_id: &str,
        section_ids: &[String],
    ) -> Result<Vec<Student>, FeeError> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let cursor = self
            .students()
            .find(
                doc! { "school_id": school_id, "section_id": { "$in": section_ids.to_vec() } },
                options,
            )
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert_fee_type(&self, fee_type: &FeeType) -> Result<(), FeeError> {
        self.fee_types()
            .insert_one(fee_type, None)
            .await
            .map_err(|e| duplicate_name(e, "Fee type", &fee_type.name))?;
        Ok(())
    }

    async fn list_fee_types(&self, school_id: &str) -> Result<Vec<FeeType>, FeeError> {
        let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
        let cursor = self
            .fee_types()
            .find(doc! { "school_id": school_id }, options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert_schedule(&self, schedule: &FeeSchedule) -> Result<(), FeeError> {
        self.schedules()
            .insert_one(schedule, None)
            .await
            .map_err(|e| duplicate_name(e, "Fee schedule", &schedule.name))?;
        Ok(())
    }

    async fn replace_schedule(&self, schedule: &FeeSchedule) -> Result<(), FeeError> {
        let result = self
            .schedules()
            .replace_one(
                doc! { "_id": &schedule.id, "school_id": &schedule.school_id },
                schedule,
                None,
            )
            .await
            .map_err(|e| duplicate_name(e, "Fee schedule", &schedule.name))?;
        if result.matched_count == 0 {
            return Err(FeeError::not_found("Fee schedule", &schedule.id));
        }
        Ok(())
    }

    async fn find_schedule(
        &self,
        school_id: &str,
        schedule_id: &str,
    ) -> Result<Option<FeeSchedule>, FeeError> {
        Ok(self
            .schedules()
            .find_one(doc! { "_id": schedule_id, "school_id": school_id }, None)
            .await?)
    }

    async fn list_schedules(&self, school_id: &str) -> Result<Vec<FeeSchedule>, FeeError> {
        let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
        let cursor = self
            .schedules()
            .find(doc! { "school_id": school_id }, options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert_structure(&self, structure: &FeeStructure) -> Result<(), FeeError> {
        self.structures()
            .insert_one(structure, None)
            .await
            .map_err(|e| duplicate_name(e, "Fee structure", &structure.name))?;
        Ok(())
    }

    async fn replace_structure(&self, structure: &FeeStructure) -> Result<(), FeeError> {
        let mut next = structure.clone();
        next.revision += 1;
        let result = self
            .structures()
            .replace_one(revision_guard(&structure.id, structure.revision), &next, None)
            .await?;
        if result.matched_count == 0 {
            return Err(FeeError::ConcurrentModification(format!(
                "Fee structure {}",
                structure.id
            )));
        }
        Ok(())
    }

    async fn commit_student_removal(&self, commit: RemovalCommit) -> Result<(), FeeError> {
        self.in_transaction(|db, session| {
            Box::pin(async move {
                let structure = &commit.structure;
                let mut next = structure.clone();
                next.revision += 1;
                let result = db
                    .structures()
                    .replace_one_with_session(
                        revision_guard(&structure.id, structure.revision),
                        &next,
                        None,
                        session,
                    )
                    .await?;
                if result.matched_count == 0 {
                    return Err(FeeError::ConcurrentModification(format!(
                        "Fee structure {}",
                        structure.id
                    )));
                }

                for inst in &commit.installments {
                    let result = db
                        .installments()
                        .delete_one_with_session(
                            revision_guard(&inst.id, inst.revision),
                            None,
                            session,
                        )
                        .await?;
                    if result.deleted_count == 0 {
                        return Err(FeeError::ConcurrentModification(format!(
                            "Installment {}",
                            inst.id
                        )));
                    }
                }

                let remaining = db
                    .installments()
                    .count_documents_with_session(
                        doc! {
                            "school_id": &structure.school_id,
                            "fee_structure_id": &structure.id,
                            "student_id": { "$in": commit.removed_students.clone() },
                        },
                        None,
                        session,
                    )
                    .await?;
                if remaining > 0 {
                    return Err(FeeError::ConcurrentModification(format!(
                        "Fee structure {} installments",
                        structure.id
                    )));
                }
                Ok(())
            })
        })
        .await
    }

    async fn find_structure(
        &self,
        school_id: &str,
        structure_id: &str,
    ) -> Result<Option<FeeStructure>, FeeError> {
        Ok(self
            .structures()
            .find_one(doc! { "_id": structure_id, "school_id": school_id }, None)
            .await?)
    }

    async fn list_structures(
        &self,
        school_id: &str,
        academic_year_id: &str,
    ) -> Result<Vec<FeeStructure>, FeeError> {
        let options = FindOptions::builder().sort(doc! { "created_at": 1 }).build();
        let cursor = self
            .structures()
            .find(
                doc! { "school_id": school_id, "academic_year_id": academic_year_id },
                options,
            )
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn set_materialization(
        &self,
        structure_id: &str,
        expected_job_id: Option<&str>,
        state: &MaterializationState,
    ) -> Result<bool, FeeError> {
        let result = self
            .structures()
            .update_one(
                doc! { "_id": structure_id, "materialization.job_id": expected_job_id },
                doc! {
                    "$set": { "materialization": to_bson(state)? },
                    "$inc": { "revision": 1_i64 },
                },
                None,
            )
            .await?;
        if result.matched_count == 0 {
            let exists = self
                .structures()
                .count_documents(doc! { "_id": structure_id }, None)
                .await?;
            if exists == 0 {
                return Err(FeeError::not_found("Fee structure", structure_id));
            }
            return Ok(false);
        }
        Ok(true)
    }

    async fn list_structures_by_materialization(
        &self,
        statuses: &[MaterializationStatus],
    ) -> Result<Vec<FeeStructure>, FeeError> {
        let statuses: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let cursor = self
            .structures()
            .find(doc! { "materialization.status": { "$in": statuses } }, None)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert_installments(
        &self,
        installments: Vec<FeeInstallment>,
    ) -> Result<InsertOutcome, FeeError> {
        let attempted = installments.len() as u64;
        if attempted == 0 {
            return Ok(InsertOutcome::default());
        }
        let options = InsertManyOptions::builder().ordered(false).build();
        match self.installments().insert_many(installments, options).await {
            Ok(result) => Ok(InsertOutcome {
                inserted: result.inserted_ids.len() as u64,
                duplicates: 0,
            }),
            Err(err) => {
                let duplicates = match *err.kind {
                    ErrorKind::BulkWrite(ref failure) if failure.write_concern_error.is_none() => {
                        let errors = failure.write_errors.as_deref().unwrap_or_default();
                        if errors.iter().all(|e| e.code == DUPLICATE_KEY) {
                            Some(errors.len() as u64)
                        } else {
                            None
                        }
                    }
                    _ => None,
                };
                match duplicates {
                    Some(duplicates) => Ok(InsertOutcome {
                        inserted: attempted - duplicates,
                        duplicates,
                    }),
                    None => Err(err.into()),
                }
            }
        }
    }

    async fn find_installments(
        &self,
        filter: &InstallmentFilter,
    ) -> Result<Vec<FeeInstallment>, FeeError> {
        let options = FindOptions::builder()
            .sort(doc! { "due_date": 1, "student_id": 1, "_id": 1 })
            .build();
        let cursor = self
            .installments()
            .find(installment_query(filter), options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count_installments(&self, filter: &InstallmentFilter) -> Result<u64, FeeError> {
        Ok(self
            .installments()
            .count_documents(installment_query(filter), None)
            .await?)
    }

    async fn find_installment(
        &self,
        school_id: &str,
        installment_id: &str,
    ) -> Result<Option<FeeInstallment>, FeeError> {
        Ok(self
            .installments()
            .find_one(doc! { "_id": installment_id, "school_id": school_id }, None)
            .await?)
    }

    async fn find_row_anchor(
        &self,
        school_id: &str,
        row_id: &str,
    ) -> Result<Option<FeeInstallment>, FeeError> {
        let options = FindOneOptions::builder()
            .sort(doc! { "due_date": 1, "created_at": 1 })
            .build();
        Ok(self
            .installments()
            .find_one(doc! { "school_id": school_id, "row_id": row_id }, options)
            .await?)
    }

    async fn replace_installment(&self, installment: &FeeInstallment) -> Result<(), FeeError> {
        let mut next = installment.clone();
        next.revision += 1;
        let result = self
            .installments()
            .replace_one(
                revision_guard(&installment.id, installment.revision),
                &next,
                None,
            )
            .await?;
        if result.matched_count == 0 {
            return Err(FeeError::ConcurrentModification(format!(
                "Installment {}",
                installment.id
            )));
        }
        Ok(())
    }

    async fn sweep_due(
        &self,
        school_id: Option<&str>,
        as_of: NaiveDate,
    ) -> Result<u64, FeeError> {
        let mut query = doc! {
            "status": InstallmentStatus::Upcoming.as_str(),
            "due_date": { "$lte": as_of.to_string() },
        };
        if let Some(school_id) = school_id {
            query.insert("school_id", school_id);
        }
        let result = self
            .installments()
            .update_many(
                query,
                doc! {
                    "$set": {
                        "status": InstallmentStatus::Due.as_str(),
                        "updated_at": to_bson(&Utc::now())?,
                    },
                    "$inc": { "revision": 1_i64 },
                },
                None,
            )
            .await?;
        Ok(result.modified_count)
    }

    async fn insert_discount_category(&self, category: &DiscountCategory) -> Result<(), FeeError> {
        self.discounts()
            .insert_one(category, None)
            .await
            .map_err(|e| duplicate_name(e, "Discount category", &category.name))?;
        Ok(())
    }

    async fn find_discount_category(
        &self,
        school_id: &str,
        discount_id: &str,
    ) -> Result<Option<DiscountCategory>, FeeError> {
        Ok(self
            .discounts()
            .find_one(doc! { "_id": discount_id, "school_id": school_id }, None)
            .await?)
    }

    async fn list_discount_categories(
        &self,
        school_id: &str,
    ) -> Result<Vec<DiscountCategory>, FeeError> {
        let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
        let cursor = self
            .discounts()
            .find(doc! { "school_id": school_id }, options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn commit_discount(&self, commit: DiscountCommit) -> Result<(), FeeError> {
        self.in_transaction(|db, session| {
            Box::pin(async move {
                let mut category = commit.category.clone();
                category.revision += 1;
                let result = db
                    .discounts()
                    .replace_one_with_session(
                        revision_guard(&commit.category.id, commit.category.revision),
                        &category,
                        None,
                        session,
                    )
                    .await?;
                if result.matched_count == 0 {
                    return Err(FeeError::ConcurrentModification(format!(
                        "Discount category {}",
                        commit.category.id
                    )));
                }
                db.swap_installments(&commit.installments, session).await
            })
        })
        .await
    }

    async fn next_sequence(
        &self,
        school_id: &str,
        category: ReceiptCategory,
    ) -> Result<i64, FeeError> {
        let key = counter_key(school_id, category);
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let counter = self
            .counters()
            .find_one_and_update(doc! { "_id": &key }, doc! { "$inc": { "seq": 1_i64 } }, options)
            .await?
            .ok_or_else(|| FeeError::Integrity(format!("Receipt counter {} missing", key)))?;
        Ok(counter.seq)
    }

    async fn commit_payment(&self, commit: PaymentCommit) -> Result<(), FeeError> {
        self.in_transaction(|db, session| {
            Box::pin(async move {
                db.swap_installments(&commit.installments, session).await?;
                db.swap_donor(commit.donor.as_ref(), session).await?;
                db.receipts()
                    .insert_one_with_session(&commit.receipt, None, session)
                    .await
                    .map_err(|e| {
                        if is_duplicate_key(&e) {
                            FeeError::Integrity(format!(
                                "Receipt id {} already issued",
                                commit.receipt.receipt_id
                            ))
                        } else {
                            FeeError::from(e)
                        }
                    })?;
                Ok(())
            })
        })
        .await
    }

    async fn commit_cancellation(&self, commit: CancellationCommit) -> Result<(), FeeError> {
        self.in_transaction(|db, session| {
            Box::pin(async move {
                let mut receipt = commit.receipt.clone();
                receipt.revision += 1;
                let mut guard = revision_guard(&commit.receipt.id, commit.receipt.revision);
                guard.insert("status", to_bson(&ReceiptStatus::Active)?);
                let result = db
                    .receipts()
                    .replace_one_with_session(guard, &receipt, None, session)
                    .await?;
                if result.matched_count == 0 {
                    return Err(FeeError::ConcurrentModification(format!(
                        "Receipt {}",
                        commit.receipt.receipt_id
                    )));
                }
                db.swap_installments(&commit.installments, session).await?;
                db.swap_donor(commit.donor.as_ref(), session).await
            })
        })
        .await
    }

    async fn find_receipt(
        &self,
        school_id: &str,
        receipt_id: &str,
    ) -> Result<Option<FeeReceipt>, FeeError> {
        Ok(self
            .receipts()
            .find_one(doc! { "school_id": school_id, "receipt_id": receipt_id }, None)
            .await?)
    }

    async fn list_receipts(&self, filter: &ReceiptFilter) -> Result<Vec<FeeReceipt>, FeeError> {
        let mut query = doc! { "school_id": &filter.school_id };
        if let Some(student_id) = &filter.student_id {
            query.insert("student.student_id", student_id.as_str());
        }
        let mut issued = Document::new();
        if let Some(from) = filter.issued_from {
            issued.insert("$gte", from.to_string());
        }
        if let Some(to) = filter.issued_to {
            issued.insert("$lte", to.to_string());
        }
        if !issued.is_empty() {
            query.insert("issued_on", issued);
        }
        if !filter.include_cancelled {
            query.insert("status", to_bson(&ReceiptStatus::Active)?);
        }
        let options = FindOptions::builder()
            .sort(doc! { "issued_at": 1, "sequence": 1 })
            .build();
        let cursor = self.receipts().find(query, options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert_donor(&self, donor: &Donor) -> Result<(), FeeError> {
        self.donors().insert_one(donor, None).await?;
        Ok(())
    }

    async fn find_donor(
        &self,
        school_id: &str,
        donor_id: &str,
    ) -> Result<Option<Donor>, FeeError> {
        Ok(self
            .donors()
            .find_one(doc! { "_id": donor_id, "school_id": school_id }, None)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installment_query_combines_fields() {
        let filter = InstallmentFilter {
            student_id: Some("s1".to_string()),
            status: Some(InstallmentStatus::Due),
            due_on_or_before: NaiveDate::from_ymd_opt(2026, 10, 18),
            discount_id: Some("d1".to_string()),
            ..InstallmentFilter::for_school("school")
        };
        let query = installment_query(&filter);
        assert_eq!(query.get_str("school_id").unwrap(), "school");
        assert_eq!(query.get_str("student_id").unwrap(), "s1");
        assert_eq!(query.get_str("status").unwrap(), "due");
        assert_eq!(query.get_str("discounts.discount_id").unwrap(), "d1");
        assert_eq!(
            query
                .get_document("due_date")
                .unwrap()
                .get_str("$lte")
                .unwrap(),
            "2026-10-18"
        );
    }

    #[test]
    fn installment_query_without_options_is_tenant_only() {
        let query = installment_query(&InstallmentFilter::for_school("school"));
        assert_eq!(query.len(), 1);
    }
}
