//! Upload handling for raw transactions and settlement records

use log::info;
use serde::{Deserialize, Serialize};

use crate::traits::*;
use crate::types::*;

/// Result of an upload: records received and how many IDs were new
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub received: usize,
    pub new: usize,
}

/// Validates uploads and writes them to the repository
pub struct RecordIngestor<R: SettlementRepository> {
    repository: R,
    validator: Box<dyn RecordValidator>,
}

impl<R: SettlementRepository> RecordIngestor<R> {
    /// Create an ingestor with the default validator
    pub fn new(repository: R) -> Self {
        Self {
            repository,
            validator: Box::new(DefaultRecordValidator),
        }
    }

    /// Create an ingestor with a custom validator
    pub fn with_validator(repository: R, validator: Box<dyn RecordValidator>) -> Self {
        Self {
            repository,
            validator,
        }
    }

    /// Validate and store a batch of transactions. The whole batch is rejected if
    /// any record is invalid.
    pub async fn ingest_transactions(
        &self,
        transactions: &[Transaction],
    ) -> ReconcileResult<IngestSummary> {
        if transactions.is_empty() {
            return Err(ReconcileError::Validation(
                "empty transaction list".to_string(),
            ));
        }

        for transaction in transactions {
            self.validator.validate_transaction(transaction)?;
        }

        let new = self.repository.add_transactions(transactions).await?;
        info!(
            "Uploaded {} transactions ({} new)",
            transactions.len(),
            new
        );

        Ok(IngestSummary {
            received: transactions.len(),
            new,
        })
    }

    /// Validate and store a batch of settlement records. The whole batch is
    /// rejected if any record is invalid.
    pub async fn ingest_settlements(
        &self,
        settlements: &[SettlementRecord],
    ) -> ReconcileResult<IngestSummary> {
        if settlements.is_empty() {
            return Err(ReconcileError::Validation(
                "empty settlement list".to_string(),
            ));
        }

        for settlement in settlements {
            self.validator.validate_settlement(settlement)?;
        }

        let new = self.repository.add_settlements(settlements).await?;
        info!(
            "Uploaded {} settlement records ({} new)",
            settlements.len(),
            new
        );

        Ok(IngestSummary {
            received: settlements.len(),
            new,
        })
    }
}
