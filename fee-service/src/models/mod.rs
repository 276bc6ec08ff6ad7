pub mod discount;
pub mod donor;
pub mod installment;
pub mod receipt;
pub mod reference;
pub mod schedule;
pub mod structure;

pub use discount::{ClassDiscount, DiscountCategory};
pub use donor::{Donation, Donor};
pub use installment::{DiscountFragment, FeeInstallment, FragmentStatus, InstallmentStatus};
pub use receipt::{
    AcademicYearSnapshot, Cancellation, FeeReceipt, PaymentMethod, ReceiptCategory, ReceiptItem,
    ReceiptStatus, SchoolSnapshot, SequenceCounter, StudentSnapshot,
};
pub use reference::{AcademicYear, FeeType, Parent, School, Section, Student};
pub use schedule::FeeSchedule;
pub use structure::{
    FeeRow, FeeStructure, MaterializationState, MaterializationStatus, RosterEntry, ScheduledEntry,
};
