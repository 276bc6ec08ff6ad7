//! Fee ledger services: persistence, the operations exposed over HTTP,
//! and the metrics they record.

pub mod academic_year;
pub mod database;
mod discounts;
pub mod fee_service;
mod installments;
pub mod memory;
pub mod metrics;
mod payments;
mod reports;
pub mod store;
mod structures;

pub use academic_year::AcademicYearResolver;
pub use database::MongoDb;
pub use fee_service::{FeeService, Scope};
pub use memory::InMemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use store::{FeeStore, InstallmentFilter, ReceiptFilter, RemovalCommit};
