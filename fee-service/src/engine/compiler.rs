use crate::models::{FeeInstallment, FeeRow, InstallmentStatus, RosterEntry};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    pub school_id: &'a str,
    pub academic_year_id: &'a str,
    pub fee_structure_id: &'a str,
}

/// An installment that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallmentDraft {
    pub student_id: String,
    pub section_id: String,
    pub school_id: String,
    pub academic_year_id: String,
    pub fee_structure_id: String,
    pub row_id: String,
    pub fee_type_id: String,
    pub schedule_type_id: String,
    pub due_date: NaiveDate,
    pub amount: Decimal,
}

impl InstallmentDraft {
    /// Identity of the receivable: a student owes a row once per due date.
    pub fn key(&self) -> (&str, &str, NaiveDate) {
        (&self.student_id, &self.row_id, self.due_date)
    }

    /// Fresh installment with no discount: net equals gross.
    pub fn into_installment(self, now: DateTime<Utc>) -> FeeInstallment {
        FeeInstallment {
            id: Uuid::new_v4().to_string(),
            student_id: self.student_id,
            section_id: self.section_id,
            school_id: self.school_id,
            academic_year_id: self.academic_year_id,
            fee_type_id: self.fee_type_id,
            schedule_type_id: self.schedule_type_id,
            fee_structure_id: self.fee_structure_id,
            row_id: self.row_id,
            due_date: self.due_date,
            total_amount: self.amount,
            total_discount_amount: Decimal::ZERO,
            net_amount: self.amount,
            paid_amount: Decimal::ZERO,
            discounts: Vec::new(),
            status: InstallmentStatus::Upcoming,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

fn drafts_for<'a, I>(
    rows: I,
    students: &'a [RosterEntry],
    ctx: CompileContext<'a>,
) -> impl Iterator<Item = InstallmentDraft> + 'a
where
    I: IntoIterator<Item = &'a FeeRow>,
    I::IntoIter: 'a,
{
    rows.into_iter().flat_map(move |row| {
        row.scheduled_dates.iter().flat_map(move |entry| {
            students.iter().map(move |student| InstallmentDraft {
                student_id: student.student_id.clone(),
                section_id: student.section_id.clone(),
                school_id: ctx.school_id.to_string(),
                academic_year_id: ctx.academic_year_id.to_string(),
                fee_structure_id: ctx.fee_structure_id.to_string(),
                row_id: row.id.clone(),
                fee_type_id: row.fee_type_id.clone(),
                schedule_type_id: row.schedule_type_id.clone(),
                due_date: entry.date,
                amount: entry.amount,
            })
        })
    })
}

/// Full cross product: every row, every scheduled entry, every student.
pub fn compile(
    rows: &[FeeRow],
    roster: &[RosterEntry],
    ctx: CompileContext<'_>,
) -> Vec<InstallmentDraft> {
    drafts_for(rows, roster, ctx).collect()
}

/// Drafts owed after a structure grows: existing students get the new rows,
/// new students get every row. The two sets never overlap.
pub fn compile_delta(
    rows: &[FeeRow],
    new_row_ids: &[String],
    existing_roster: &[RosterEntry],
    new_students: &[RosterEntry],
    ctx: CompileContext<'_>,
) -> Vec<InstallmentDraft> {
    let new_rows = rows.iter().filter(|r| new_row_ids.contains(&r.id));
    let existing: Vec<RosterEntry> = existing_roster
        .iter()
        .filter(|e| !new_students.iter().any(|n| n.student_id == e.student_id))
        .cloned()
        .collect();

    let mut drafts: Vec<InstallmentDraft> = drafts_for(new_rows, &existing, ctx).collect();
    drafts.extend(drafts_for(rows, new_students, ctx));
    drafts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScheduledEntry;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    const CTX: CompileContext<'static> = CompileContext {
        school_id: "school-1",
        academic_year_id: "ay-2026",
        fee_structure_id: "fs-1",
    };

    fn row(entries: &[(u32, Decimal)]) -> FeeRow {
        FeeRow::new(
            "tuition".to_string(),
            "schedule".to_string(),
            entries
                .iter()
                .map(|(m, a)| ScheduledEntry {
                    date: NaiveDate::from_ymd_opt(2026, *m, 10).unwrap(),
                    amount: *a,
                })
                .collect(),
        )
    }

    fn roster(n: usize) -> Vec<RosterEntry> {
        (0..n)
            .map(|i| RosterEntry {
                student_id: format!("student-{}", i),
                section_id: "section-a".to_string(),
            })
            .collect()
    }

    #[test]
    fn produces_students_times_entries() {
        let rows = vec![
            row(&[(4, dec!(2000)), (8, dec!(2000)), (12, dec!(2000))]),
            row(&[(6, dec!(500))]),
        ];
        let drafts = compile(&rows, &roster(7), CTX);

        assert_eq!(drafts.len(), 7 * 4);
        let keys: HashSet<_> = drafts.iter().map(|d| d.key()).collect();
        assert_eq!(keys.len(), drafts.len());
        assert!(drafts.iter().all(|d| d.school_id == "school-1"));
    }

    #[test]
    fn empty_inputs_produce_nothing() {
        assert!(compile(&[], &roster(3), CTX).is_empty());
        assert!(compile(&[row(&[(4, dec!(1))])], &[], CTX).is_empty());
    }

    #[test]
    fn drafts_start_without_discount() {
        let drafts = compile(&[row(&[(4, dec!(2000))])], &roster(1), CTX);
        let inst = drafts[0].clone().into_installment(Utc::now());
        assert_eq!(inst.net_amount, inst.total_amount);
        assert_eq!(inst.total_discount_amount, Decimal::ZERO);
        assert_eq!(inst.status, InstallmentStatus::Upcoming);
    }

    #[test]
    fn delta_covers_new_rows_and_new_students_once() {
        let old = row(&[(4, dec!(100)), (5, dec!(100))]);
        let added = row(&[(9, dec!(300))]);
        let rows = vec![old.clone(), added.clone()];
        let existing = roster(3);
        let newcomers = vec![RosterEntry {
            student_id: "student-new".to_string(),
            section_id: "section-b".to_string(),
        }];

        let drafts = compile_delta(&rows, &[added.id.clone()], &existing, &newcomers, CTX);

        // 3 existing students x 1 new entry + 1 new student x 3 entries
        assert_eq!(drafts.len(), 3 + 3);
        let keys: HashSet<_> = drafts.iter().map(|d| d.key()).collect();
        assert_eq!(keys.len(), drafts.len());
        assert!(drafts
            .iter()
            .filter(|d| d.student_id != "student-new")
            .all(|d| d.row_id == added.id));
    }
}
