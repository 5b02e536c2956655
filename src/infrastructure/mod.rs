//! Adapters for the domain ports: storage backends, the outbound HTTP client
//! and the notification sinks.

pub mod http;
pub mod in_memory;
pub mod notifier;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;

use crate::domain::ports::StatusUpdate;
use crate::domain::transaction::PaymentTransaction;
use chrono::Utc;

/// Writes a won status transition onto the stored record.
pub(crate) fn apply_status_update(tx: &mut PaymentTransaction, update: StatusUpdate) {
    tx.status = update.status;
    tx.error_message = update.error_message;
    if let Some(raw) = update.raw_callback {
        tx.raw_callback = Some(raw);
    }
    tx.updated_at = Utc::now();
}
