use crate::error::FeeError;
use crate::models::{
    ClassDiscount, DiscountCategory, DiscountFragment, FeeInstallment, FragmentStatus,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Requested discount on one fee row.
#[derive(Debug, Clone)]
pub struct DiscountRow {
    pub row_id: String,
    pub is_percentage: bool,
    pub value: Decimal,
    /// When given, must match the row's installment count.
    pub breakdown: Option<u32>,
}

/// What a percentage is taken of, read from the row's authoritative
/// (earliest) installment and its fee structure.
#[derive(Debug, Clone)]
pub struct RowBase {
    pub total_amount: Decimal,
    pub fee_type_id: String,
    pub breakdown: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// Add students/rows to the discount; touching an installment that
    /// already carries it is a conflict.
    Append,
    /// The request becomes the discount's whole assignment.
    Replace,
}

/// Everything one discount commit writes.
#[derive(Debug, Clone)]
pub struct DiscountPlan {
    pub category: DiscountCategory,
    /// Only installments whose discount fields changed, still holding the
    /// revision they were read at.
    pub installments: Vec<FeeInstallment>,
}

pub fn discount_amount(base: Decimal, is_percentage: bool, value: Decimal) -> Decimal {
    if is_percentage {
        (base * value / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    } else {
        value
    }
}

/// Checks every row before anything is read or written.
pub fn validate_rows(rows: &[DiscountRow], student_ids: &[String]) -> Result<(), FeeError> {
    if rows.is_empty() {
        return Err(FeeError::validation("At least one fee row is required"));
    }
    if student_ids.is_empty() {
        return Err(FeeError::validation("At least one student is required"));
    }
    let mut seen = HashSet::new();
    for row in rows {
        if row.row_id.trim().is_empty() {
            return Err(FeeError::validation("Every discount row needs a row_id"));
        }
        if !seen.insert(row.row_id.as_str()) {
            return Err(FeeError::validation(format!(
                "Fee row {} is listed twice",
                row.row_id
            )));
        }
        if row.value <= Decimal::ZERO {
            return Err(FeeError::validation(format!(
                "Discount value for row {} must be greater than zero",
                row.row_id
            )));
        }
        if row.is_percentage && row.value > Decimal::ONE_HUNDRED {
            return Err(FeeError::validation(format!(
                "Percentage discount for row {} cannot exceed 100",
                row.row_id
            )));
        }
    }
    let unique: HashSet<_> = student_ids.iter().collect();
    if unique.len() != student_ids.len() {
        return Err(FeeError::validation("Students must not repeat"));
    }
    Ok(())
}

/// Computes the post-commit state of a discount and its installments.
///
/// `carriers` are all installments currently carrying the discount and
/// `targets` the installments of the requested rows for the requested
/// students; the two may overlap.
#[allow(clippy::too_many_arguments)]
pub fn plan(
    category: &DiscountCategory,
    rows: &[DiscountRow],
    bases: &HashMap<String, RowBase>,
    student_ids: &[String],
    carriers: Vec<FeeInstallment>,
    targets: Vec<FeeInstallment>,
    mode: Assignment,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<DiscountPlan, FeeError> {
    validate_rows(rows, student_ids)?;

    for row in rows {
        let base = bases
            .get(&row.row_id)
            .ok_or_else(|| FeeError::not_found("Fee row installments", &row.row_id))?;
        if let Some(breakdown) = row.breakdown {
            if breakdown != base.breakdown {
                return Err(FeeError::validation(format!(
                    "Fee row {} has {} installments, request says {}",
                    row.row_id, base.breakdown, breakdown
                )));
            }
        }
    }

    let discount_id = category.id.as_str();
    let previous_status: HashMap<String, FragmentStatus> = carriers
        .iter()
        .filter_map(|i| i.discount(discount_id).map(|f| (i.student_id.clone(), f.status)))
        .collect();
    let used_before: Decimal = carriers
        .iter()
        .filter_map(|i| i.discount(discount_id))
        .map(|f| f.discount_amount)
        .sum();

    let target_ids: BTreeSet<String> = targets
        .iter()
        .filter(|i| student_ids.contains(&i.student_id))
        .filter(|i| rows.iter().any(|r| r.row_id == i.row_id))
        .map(|i| i.id.clone())
        .collect();

    for student_id in student_ids {
        let covered = targets
            .iter()
            .any(|i| &i.student_id == student_id && target_ids.contains(&i.id));
        if !covered {
            return Err(FeeError::validation(format!(
                "Student {} has no installments on the selected fee rows",
                student_id
            )));
        }
    }

    let mut working: BTreeMap<String, FeeInstallment> = BTreeMap::new();
    for inst in carriers.into_iter().chain(targets) {
        working.entry(inst.id.clone()).or_insert(inst);
    }
    let originals = working.clone();

    match mode {
        Assignment::Append => {
            if let Some(taken) = target_ids
                .iter()
                .filter_map(|id| working.get(id))
                .find(|i| i.discount(discount_id).is_some())
            {
                return Err(FeeError::Conflict(format!(
                    "Student {} already has this discount on fee row {}",
                    taken.student_id, taken.row_id
                )));
            }
        }
        Assignment::Replace => {
            for inst in working.values_mut() {
                inst.discounts.retain(|d| d.discount_id != discount_id);
            }
        }
    }

    for id in &target_ids {
        let Some(inst) = working.get_mut(id) else {
            continue;
        };
        let Some(row) = rows.iter().find(|r| r.row_id == inst.row_id) else {
            continue;
        };
        let base = &bases[&row.row_id];
        inst.discounts.push(DiscountFragment {
            discount_id: discount_id.to_string(),
            discount_amount: discount_amount(base.total_amount, row.is_percentage, row.value),
            is_percentage: row.is_percentage,
            value: row.value,
            status: previous_status
                .get(&inst.student_id)
                .copied()
                .unwrap_or(FragmentStatus::Pending),
        });
    }

    let mut changed = Vec::new();
    for (id, mut inst) in working.clone() {
        if originals.get(&id).map(|o| &o.discounts) == Some(&inst.discounts) {
            continue;
        }
        inst.recompute_net();
        if inst.net_amount < Decimal::ZERO {
            return Err(FeeError::validation(format!(
                "Discount exceeds the amount of installment {} (student {})",
                inst.id, inst.student_id
            )));
        }
        if inst.paid_amount > inst.net_amount {
            return Err(FeeError::Conflict(format!(
                "Student {} has already paid {} on an installment that would be reduced to {}",
                inst.student_id, inst.paid_amount, inst.net_amount
            )));
        }
        inst.resettle(today);
        inst.updated_at = now;
        working.insert(id, inst.clone());
        changed.push(inst);
    }

    let mut next = category.clone();
    summarize(&mut next, working.values(), bases);
    let used_after = next.budget_allocated - next.budget_remaining;
    if next.budget_remaining < Decimal::ZERO {
        return Err(FeeError::InsufficientBudget {
            remaining: category.budget_remaining,
            required: used_after - used_before,
        });
    }
    next.updated_at = now;

    Ok(DiscountPlan {
        category: next,
        installments: changed,
    })
}

/// Marks the students' fragments approved.
pub fn approve(
    category: &DiscountCategory,
    carriers: Vec<FeeInstallment>,
    student_ids: &[String],
    now: DateTime<Utc>,
) -> Result<DiscountPlan, FeeError> {
    if student_ids.is_empty() {
        return Err(FeeError::validation("At least one student is required"));
    }
    let discount_id = category.id.as_str();
    for student_id in student_ids {
        if !carriers.iter().any(|i| &i.student_id == student_id) {
            return Err(FeeError::validation(format!(
                "Student {} does not carry this discount",
                student_id
            )));
        }
    }

    let mut all = Vec::with_capacity(carriers.len());
    let mut changed = Vec::new();
    for mut inst in carriers {
        if student_ids.contains(&inst.student_id) {
            let mut touched = false;
            for fragment in inst.discounts.iter_mut() {
                if fragment.discount_id == discount_id && fragment.status != FragmentStatus::Approved
                {
                    fragment.status = FragmentStatus::Approved;
                    touched = true;
                }
            }
            if touched {
                inst.updated_at = now;
                changed.push(inst.clone());
            }
        }
        all.push(inst);
    }

    let mut next = category.clone();
    summarize(&mut next, all.iter(), &HashMap::new());
    next.updated_at = now;
    Ok(DiscountPlan {
        category: next,
        installments: changed,
    })
}

/// Re-derives budget, class list and counters from the installments that
/// carry the discount. Installments without it are ignored.
pub fn summarize<'a>(
    category: &mut DiscountCategory,
    installments: impl Iterator<Item = &'a FeeInstallment>,
    bases: &HashMap<String, RowBase>,
) {
    let discount_id = category.id.clone();
    let mut used = Decimal::ZERO;
    let mut groups: BTreeMap<(String, String), (ClassDiscount, HashSet<String>, u32)> =
        BTreeMap::new();
    let mut student_states: HashMap<String, bool> = HashMap::new();

    for inst in installments {
        let Some(fragment) = inst.discount(&discount_id) else {
            continue;
        };
        used += fragment.discount_amount;

        let approved = student_states.entry(inst.student_id.clone()).or_insert(true);
        *approved &= fragment.status == FragmentStatus::Approved;

        let entry = groups
            .entry((inst.row_id.clone(), inst.section_id.clone()))
            .or_insert_with(|| {
                (
                    ClassDiscount {
                        row_id: inst.row_id.clone(),
                        section_id: inst.section_id.clone(),
                        fee_type_id: inst.fee_type_id.clone(),
                        is_percentage: fragment.is_percentage,
                        value: fragment.value,
                        breakdown: 0,
                        discount_amount: fragment.discount_amount,
                        total_students: 0,
                    },
                    HashSet::new(),
                    0,
                )
            });
        entry.1.insert(inst.student_id.clone());
        entry.2 += 1;
    }

    category.class_list = groups
        .into_values()
        .map(|(mut class, students, installments)| {
            class.total_students = students.len() as i64;
            class.breakdown = bases
                .get(&class.row_id)
                .map(|b| b.breakdown)
                .unwrap_or(installments / students.len().max(1) as u32)
                as i32;
            class
        })
        .collect();
    category.budget_remaining = category.budget_allocated - used;
    category.total_students = student_states.len() as i64;
    category.total_approved = student_states.values().filter(|a| **a).count() as i64;
    category.total_pending = category.total_students - category.total_approved;
}
