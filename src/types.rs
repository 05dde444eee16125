//! Core types and data structures for the reconciliation system

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::utils::decimal;

/// Lifecycle state of an internal payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Authorized,
    Captured,
    Failed,
}

/// Internal payment authorization/capture record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier for the transaction
    pub id: String,
    /// Merchant order this payment belongs to
    pub order_id: String,
    /// Processor that handled the payment
    pub processor_name: String,
    /// Identifier the processor assigned to the payment
    pub processor_txn_id: String,
    /// Authorized amount
    #[serde(deserialize_with = "decimal::deserialize")]
    pub amount: BigDecimal,
    /// ISO 4217 code of `amount`
    pub currency: String,
    /// ISO 3166 country of the payer
    pub country: String,
    pub status: TransactionStatus,
    pub authorized_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub customer_email: String,
    #[serde(default)]
    pub payment_method: String,
}

impl Transaction {
    /// Composite `processor_name:processor_txn_id` key used for primary matching
    pub fn processor_key(&self) -> String {
        processor_key(&self.processor_name, &self.processor_txn_id)
    }
}

/// Line item from a processor's settlement file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub id: String,
    pub processor_name: String,
    pub processor_txn_id: String,
    /// Merchant order reference echoed back by the processor
    #[serde(default)]
    pub order_reference: String,
    #[serde(deserialize_with = "decimal::deserialize")]
    pub gross_amount: BigDecimal,
    #[serde(default, deserialize_with = "decimal::deserialize")]
    pub fee_amount: BigDecimal,
    #[serde(deserialize_with = "decimal::deserialize")]
    pub net_amount: BigDecimal,
    pub currency: String,
    pub settled_at: DateTime<Utc>,
    #[serde(default)]
    pub settlement_batch_id: String,
}

impl SettlementRecord {
    /// Composite `processor_name:processor_txn_id` key used for primary matching
    pub fn processor_key(&self) -> String {
        processor_key(&self.processor_name, &self.processor_txn_id)
    }
}

/// Build the primary matching key shared by transactions and settlements
pub fn processor_key(processor_name: &str, processor_txn_id: &str) -> String {
    format!("{}:{}", processor_name, processor_txn_id)
}

/// Classification of a single reconciled record. Exactly one applies per outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    /// Settled amount agrees with the authorization (within the rounding floor,
    /// the configured tolerance, or explained by the processor fee)
    Matched,
    /// Paired with a transaction but the amounts disagree
    MatchedWithVariance,
    /// Transaction with no settlement
    Unsettled,
    /// Settlement with no transaction
    UnexpectedSettlement,
    /// Settlement whose processor key appears more than once
    Duplicate,
}

impl ReconciliationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationStatus::Matched => "matched",
            ReconciliationStatus::MatchedWithVariance => "matched_with_variance",
            ReconciliationStatus::Unsettled => "unsettled",
            ReconciliationStatus::UnexpectedSettlement => "unexpected_settlement",
            ReconciliationStatus::Duplicate => "duplicate",
        }
    }

    /// Whether the record was paired with a transaction, with or without variance
    pub fn is_reconciled(&self) -> bool {
        matches!(
            self,
            ReconciliationStatus::Matched | ReconciliationStatus::MatchedWithVariance
        )
    }
}

impl std::fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for a single settlement or unmatched transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_id: Option<String>,
    pub processor_name: String,
    pub status: ReconciliationStatus,
    /// Authorized amount, converted into the settlement currency when one exists
    pub expected_amount: BigDecimal,
    pub settled_gross_amount: BigDecimal,
    pub settled_net_amount: BigDecimal,
    pub fee_amount: BigDecimal,
    /// Settled gross minus expected amount
    pub variance_amount: BigDecimal,
    pub currency: String,
    /// Empty when no transaction is known for the record
    #[serde(default)]
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorized_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_to_settle: Option<i64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

/// Aggregate statistics over a set of outcomes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_transactions: usize,
    pub total_settlements: usize,
    pub matched: usize,
    pub matched_with_variance: usize,
    pub unsettled: usize,
    pub unexpected_settlements: usize,
    pub duplicates: usize,
    pub total_expected_amount: BigDecimal,
    pub total_settled_gross: BigDecimal,
    pub total_settled_net: BigDecimal,
    pub total_variance_amount: BigDecimal,
    pub total_fees: BigDecimal,
    #[serde(rename = "reconciliation_rate_pct")]
    pub reconciliation_rate: f64,
}

impl ReportSummary {
    /// Number of outcomes counted into this summary
    pub fn total_outcomes(&self) -> usize {
        self.matched
            + self.matched_with_variance
            + self.unsettled
            + self.unexpected_settlements
            + self.duplicates
    }
}

/// Result of a reconciliation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub summary: ReportSummary,
    pub by_currency: BTreeMap<String, ReportSummary>,
    pub by_country: BTreeMap<String, ReportSummary>,
    pub by_processor: BTreeMap<String, ReportSummary>,
    pub results: Vec<ReconciliationOutcome>,
    #[serde(rename = "high_priority_discrepancies")]
    pub high_priority: Vec<ReconciliationOutcome>,
}

impl ReconciliationReport {
    /// Outcomes with the given status, in report order
    pub fn outcomes_with_status(
        &self,
        status: ReconciliationStatus,
    ) -> impl Iterator<Item = &ReconciliationOutcome> {
        self.results.iter().filter(move |r| r.status == status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A single reconciliation execution as kept by the repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRun {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ReconciliationReport>,
}

impl ReconciliationRun {
    /// Create a run in the `running` state
    pub fn started(id: String) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            status: RunStatus::Running,
            report: None,
        }
    }

    /// Attach the finished report and mark the run completed
    pub fn complete(&mut self, report: ReconciliationReport) {
        self.status = RunStatus::Completed;
        self.report = Some(report);
    }
}

/// Errors that can occur outside the (infallible) matching core
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Reconciliation run not found: {0}")]
    RunNotFound(String),
    #[error("Report not available for run: {0}")]
    ReportUnavailable(String),
    #[error("Reconciliation run already exists: {0}")]
    RunExists(String),
}

/// Result type for repository, ingestion and configuration operations
pub type ReconcileResult<T> = Result<T, ReconcileError>;
