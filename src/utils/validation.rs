//! Validation utilities

use bigdecimal::BigDecimal;

use crate::traits::*;
use crate::types::*;

/// Validate that an amount is not negative
pub fn validate_non_negative_amount(field: &str, amount: &BigDecimal) -> ReconcileResult<()> {
    if *amount < BigDecimal::from(0) {
        Err(ReconcileError::Validation(format!(
            "{} cannot be negative, got {}",
            field, amount
        )))
    } else {
        Ok(())
    }
}

/// Validate that a record identifier is usable as a storage key
pub fn validate_record_id(kind: &str, id: &str) -> ReconcileResult<()> {
    if id.trim().is_empty() {
        return Err(ReconcileError::Validation(format!(
            "{} ID cannot be empty",
            kind
        )));
    }

    if id.len() > 64 {
        return Err(ReconcileError::Validation(format!(
            "{} ID cannot exceed 64 characters",
            kind
        )));
    }

    Ok(())
}

/// Validate an ISO 4217 style code: three uppercase ASCII letters
pub fn validate_currency_code(currency: &str) -> ReconcileResult<()> {
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ReconcileError::Validation(format!(
            "Currency '{}' is not a three-letter uppercase code",
            currency
        )));
    }

    Ok(())
}

/// Validate the processor half of the primary matching key
pub fn validate_processor_reference(
    processor_name: &str,
    processor_txn_id: &str,
) -> ReconcileResult<()> {
    if processor_name.trim().is_empty() {
        return Err(ReconcileError::Validation(
            "Processor name cannot be empty".to_string(),
        ));
    }

    if processor_txn_id.trim().is_empty() {
        return Err(ReconcileError::Validation(format!(
            "Processor transaction ID cannot be empty for processor '{}'",
            processor_name
        )));
    }

    Ok(())
}

/// Stricter validator used at the upload boundary
pub struct EnhancedRecordValidator;

impl RecordValidator for EnhancedRecordValidator {
    fn validate_transaction(&self, transaction: &Transaction) -> ReconcileResult<()> {
        DefaultRecordValidator.validate_transaction(transaction)?;

        validate_record_id("Transaction", &transaction.id)?;
        validate_processor_reference(&transaction.processor_name, &transaction.processor_txn_id)?;
        validate_currency_code(&transaction.currency)?;
        validate_non_negative_amount("Transaction amount", &transaction.amount)?;

        if let Some(captured_at) = transaction.captured_at {
            if captured_at < transaction.authorized_at {
                return Err(ReconcileError::Validation(format!(
                    "Transaction '{}' was captured before it was authorized",
                    transaction.id
                )));
            }
        }

        Ok(())
    }

    fn validate_settlement(&self, settlement: &SettlementRecord) -> ReconcileResult<()> {
        DefaultRecordValidator.validate_settlement(settlement)?;

        validate_record_id("Settlement", &settlement.id)?;
        validate_processor_reference(&settlement.processor_name, &settlement.processor_txn_id)?;
        validate_currency_code(&settlement.currency)?;
        validate_non_negative_amount("Settlement fee", &settlement.fee_amount)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_code() {
        assert!(validate_currency_code("MXN").is_ok());
        assert!(validate_currency_code("mxn").is_err());
        assert!(validate_currency_code("US").is_err());
        assert!(validate_currency_code("").is_err());
    }

    #[test]
    fn test_record_id() {
        assert!(validate_record_id("Transaction", "TXN-001").is_ok());
        assert!(validate_record_id("Transaction", "   ").is_err());
        assert!(validate_record_id("Transaction", &"X".repeat(65)).is_err());
    }

    #[test]
    fn test_negative_amount() {
        assert!(validate_non_negative_amount("fee", &BigDecimal::from(0)).is_ok());
        assert!(validate_non_negative_amount("fee", &BigDecimal::from(-1)).is_err());
    }
}
