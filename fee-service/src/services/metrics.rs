//! Metrics collection and Prometheus export.
//!
//! Installs the Prometheus recorder, serves the /metrics text and wraps the
//! fee-domain counters so call sites stay one line.

use crate::models::{PaymentMethod, ReceiptCategory};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::OnceLock;
use std::time::Duration;

/// Global handle to the Prometheus recorder.
pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the recorder. Later calls are no-ops.
pub fn init_metrics() -> Result<(), anyhow::Error> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {}", e))?;
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

/// Get the current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized".to_string())
}

pub fn record_materialization(outcome: &'static str, inserted: u64, duplicates: u64, elapsed: Duration) {
    metrics::counter!("fee_materialization_jobs_total", "outcome" => outcome).increment(1);
    metrics::counter!("fee_installments_created_total").increment(inserted);
    metrics::counter!("fee_installments_duplicate_total").increment(duplicates);
    metrics::histogram!("fee_materialization_duration_seconds", "outcome" => outcome)
        .record(elapsed.as_secs_f64());
}

pub fn record_payment(category: ReceiptCategory, method: &PaymentMethod, amount: Decimal) {
    metrics::counter!(
        "fee_receipts_issued_total",
        "category" => category.code(),
        "method" => method.name()
    )
    .increment(1);
    metrics::histogram!("fee_payment_amount", "method" => method.name())
        .record(amount.to_f64().unwrap_or_default());
}

pub fn record_payment_rejected(reason: &'static str) {
    metrics::counter!("fee_payments_rejected_total", "reason" => reason).increment(1);
}

pub fn record_payment_retry() {
    metrics::counter!("fee_payment_retries_total").increment(1);
}

pub fn record_receipt_cancelled(category: ReceiptCategory) {
    metrics::counter!("fee_receipts_cancelled_total", "category" => category.code()).increment(1);
}

pub fn record_discount_commit(operation: &'static str, installments: usize) {
    metrics::counter!("fee_discount_commits_total", "operation" => operation).increment(1);
    metrics::counter!("fee_discount_installments_touched_total", "operation" => operation)
        .increment(installments as u64);
}

pub fn record_sweep(moved: u64) {
    metrics::counter!("fee_due_sweeps_total").increment(1);
    metrics::counter!("fee_installments_marked_due_total").increment(moved);
}

pub fn record_integrity_error(check: &'static str) {
    metrics::counter!("fee_integrity_errors_total", "check" => check).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_recorder_is_harmless() {
        // Recording without an installed recorder must not panic.
        record_sweep(3);
        record_integrity_error("installment_count");
        assert!(!get_metrics().is_empty());
    }
}
