//! Reconciliation of internal transactions against processor settlements
//!
//! [`ReconciliationEngine::run`] is a pure function of its inputs apart from the
//! report timestamp: it never fails, and every transaction and settlement ends up
//! in at least one outcome.

pub mod fx;
pub mod matching;
pub mod report;

pub use fx::FxConverter;
pub use matching::{match_records, OutcomeIds};
pub use report::aggregate;

use log::info;

use crate::config::ReconciliationConfig;
use crate::types::*;

/// Matching engine bound to a configuration
#[derive(Debug, Clone, Default)]
pub struct ReconciliationEngine {
    config: ReconciliationConfig,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ReconciliationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    /// Match the given snapshots and aggregate the outcomes into a report
    pub fn run(
        &self,
        run_id: &str,
        transactions: &[Transaction],
        settlements: &[SettlementRecord],
    ) -> ReconciliationReport {
        info!(
            "Reconciliation {} started: transactions={}, settlements={}",
            run_id,
            transactions.len(),
            settlements.len()
        );

        let mut ids = OutcomeIds::new(run_id);
        let outcomes = match_records(transactions, settlements, &self.config, &mut ids);
        let report = aggregate(
            run_id,
            transactions.len(),
            settlements.len(),
            outcomes,
            &self.config,
        );

        let summary = &report.summary;
        info!(
            "Reconciliation {} completed: matched={}, matched_with_variance={}, unsettled={}, unexpected={}, duplicates={}, high_priority={}, rate={:.2}%",
            run_id,
            summary.matched,
            summary.matched_with_variance,
            summary.unsettled,
            summary.unexpected_settlements,
            summary.duplicates,
            report.high_priority.len(),
            summary.reconciliation_rate
        );

        report
    }
}
