//! Traits for storage abstraction and extensibility

use async_trait::async_trait;

use crate::types::*;

/// Storage abstraction for raw records and reconciliation runs
///
/// Every method is an independent operation. An implementation only has to make
/// each call atomic on its own; a reconciliation run reads transactions and
/// settlements with two separate calls, so it may observe ingestion that landed
/// between them (read-committed per collection, not a run-wide snapshot).
#[async_trait]
pub trait SettlementRepository: Send + Sync {
    /// Insert or replace transactions by ID, returning how many IDs were new
    async fn add_transactions(&self, transactions: &[Transaction]) -> ReconcileResult<usize>;

    /// Insert or replace settlement records by ID, returning how many IDs were new
    async fn add_settlements(&self, settlements: &[SettlementRecord]) -> ReconcileResult<usize>;

    /// Get a transaction by ID
    async fn get_transaction(&self, transaction_id: &str) -> ReconcileResult<Option<Transaction>>;

    /// Get a settlement record by ID
    async fn get_settlement(&self, settlement_id: &str)
        -> ReconcileResult<Option<SettlementRecord>>;

    /// Snapshot of all transactions, in no particular order
    async fn list_transactions(&self) -> ReconcileResult<Vec<Transaction>>;

    /// Snapshot of all settlement records, in no particular order
    async fn list_settlements(&self) -> ReconcileResult<Vec<SettlementRecord>>;

    /// Insert or replace a reconciliation run
    async fn save_run(&self, run: &ReconciliationRun) -> ReconcileResult<()>;

    /// Get a reconciliation run by ID
    async fn get_run(&self, run_id: &str) -> ReconcileResult<Option<ReconciliationRun>>;

    /// List all stored runs, in no particular order
    async fn list_runs(&self) -> ReconcileResult<Vec<ReconciliationRun>>;

    /// Remove all records and runs
    async fn clear(&self) -> ReconcileResult<()>;
}

/// Trait for implementing custom ingestion rules
pub trait RecordValidator: Send + Sync {
    /// Validate a transaction before it is stored
    fn validate_transaction(&self, transaction: &Transaction) -> ReconcileResult<()>;

    /// Validate a settlement record before it is stored
    fn validate_settlement(&self, settlement: &SettlementRecord) -> ReconcileResult<()>;
}

/// Default validator: identifiers present and a usable currency code
pub struct DefaultRecordValidator;

impl RecordValidator for DefaultRecordValidator {
    fn validate_transaction(&self, transaction: &Transaction) -> ReconcileResult<()> {
        if transaction.id.trim().is_empty() {
            return Err(ReconcileError::Validation(
                "Transaction ID cannot be empty".to_string(),
            ));
        }

        if transaction.currency.trim().is_empty() {
            return Err(ReconcileError::Validation(format!(
                "Transaction '{}' has no currency",
                transaction.id
            )));
        }

        Ok(())
    }

    fn validate_settlement(&self, settlement: &SettlementRecord) -> ReconcileResult<()> {
        if settlement.id.trim().is_empty() {
            return Err(ReconcileError::Validation(
                "Settlement ID cannot be empty".to_string(),
            ));
        }

        if settlement.currency.trim().is_empty() {
            return Err(ReconcileError::Validation(format!(
                "Settlement '{}' has no currency",
                settlement.id
            )));
        }

        Ok(())
    }
}
