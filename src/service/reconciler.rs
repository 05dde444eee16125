//! Reconciliation service that ties the repository, ingestion and engine together

use log::{error, info};

use crate::config::{ConfigOverrides, ReconciliationConfig};
use crate::reconciliation::ReconciliationEngine;
use crate::service::{IngestSummary, RecordIngestor};
use crate::traits::*;
use crate::types::*;

/// Main service that orchestrates uploads, runs and report queries
pub struct Reconciler<R: SettlementRepository> {
    repository: R,
    ingestor: RecordIngestor<R>,
    config: ReconciliationConfig,
    run_seq: u64,
}

impl<R: SettlementRepository + Clone> Reconciler<R> {
    /// Create a service with the default configuration and validator
    pub fn new(repository: R) -> Self {
        Self {
            ingestor: RecordIngestor::new(repository.clone()),
            repository,
            config: ReconciliationConfig::default(),
            run_seq: 0,
        }
    }

    /// Create a service with a custom base configuration and validator
    pub fn with_config(
        repository: R,
        config: ReconciliationConfig,
        validator: Box<dyn RecordValidator>,
    ) -> ReconcileResult<Self> {
        config.validate()?;
        Ok(Self {
            ingestor: RecordIngestor::with_validator(repository.clone(), validator),
            repository,
            config,
            run_seq: 0,
        })
    }
}

impl<R: SettlementRepository> Reconciler<R> {
    /// Repository backing this service
    pub fn repository(&self) -> &R {
        &self.repository
    }

    // Ingestion
    /// Validate and store internal transactions
    pub async fn upload_transactions(
        &self,
        transactions: &[Transaction],
    ) -> ReconcileResult<IngestSummary> {
        self.ingestor.ingest_transactions(transactions).await
    }

    /// Validate and store processor settlement records
    pub async fn upload_settlements(
        &self,
        settlements: &[SettlementRecord],
    ) -> ReconcileResult<IngestSummary> {
        self.ingestor.ingest_settlements(settlements).await
    }

    // Configuration
    /// Base configuration used when a run has no overrides
    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    /// Replace the base configuration
    pub fn update_config(&mut self, config: ReconciliationConfig) -> ReconcileResult<()> {
        config.validate()?;
        info!("Reconciliation configuration updated: {:?}", config);
        self.config = config;
        Ok(())
    }

    // Runs
    /// Next sequential run ID not already taken by a caller-chosen run
    async fn next_run_id(&mut self) -> ReconcileResult<String> {
        loop {
            self.run_seq += 1;
            let run_id = format!("RUN-{:04}", self.run_seq);
            if self.repository.get_run(&run_id).await?.is_none() {
                return Ok(run_id);
            }
        }
    }

    /// Run a reconciliation under the next sequential run ID, merging `overrides`
    /// into the base configuration
    pub async fn run(
        &mut self,
        overrides: Option<&ConfigOverrides>,
    ) -> ReconcileResult<ReconciliationReport> {
        let config = match overrides {
            Some(overrides) => self.config.merged_with(overrides),
            None => self.config.clone(),
        };
        config.validate()?;

        let run_id = self.next_run_id().await?;
        self.run_with_id(&run_id, &config).await
    }

    /// Run a reconciliation under a caller-chosen run ID, which must not already
    /// be stored
    ///
    /// Transactions and settlements are read with two separate repository calls;
    /// uploads landing between them are visible to one read and not the other.
    pub async fn run_with_id(
        &self,
        run_id: &str,
        config: &ReconciliationConfig,
    ) -> ReconcileResult<ReconciliationReport> {
        if self.repository.get_run(run_id).await?.is_some() {
            return Err(ReconcileError::RunExists(run_id.to_string()));
        }

        let mut run = ReconciliationRun::started(run_id.to_string());
        self.repository.save_run(&run).await?;

        let snapshot = match self.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Reconciliation {} failed reading records: {}", run_id, e);
                run.status = RunStatus::Failed;
                self.repository.save_run(&run).await?;
                return Err(e);
            }
        };
        let (transactions, settlements) = snapshot;

        let engine = ReconciliationEngine::with_config(config.clone());
        let report = engine.run(run_id, &transactions, &settlements);

        run.complete(report.clone());
        self.repository.save_run(&run).await?;

        Ok(report)
    }

    async fn snapshot(&self) -> ReconcileResult<(Vec<Transaction>, Vec<SettlementRecord>)> {
        let transactions = self.repository.list_transactions().await?;
        let settlements = self.repository.list_settlements().await?;
        Ok((transactions, settlements))
    }

    /// Get a run by ID
    pub async fn get_run(&self, run_id: &str) -> ReconcileResult<ReconciliationRun> {
        self.repository
            .get_run(run_id)
            .await?
            .ok_or_else(|| ReconcileError::RunNotFound(run_id.to_string()))
    }

    /// Get the report of a finished run
    pub async fn get_report(&self, run_id: &str) -> ReconcileResult<ReconciliationReport> {
        self.get_run(run_id)
            .await?
            .report
            .ok_or_else(|| ReconcileError::ReportUnavailable(run_id.to_string()))
    }

    /// All runs, oldest first
    pub async fn list_runs(&self) -> ReconcileResult<Vec<ReconciliationRun>> {
        let mut runs = self.repository.list_runs().await?;
        runs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(runs)
    }

    /// Every outcome, across all stored runs, that references a transaction
    pub async fn transaction_reconciliation(
        &self,
        transaction_id: &str,
    ) -> ReconcileResult<Vec<ReconciliationOutcome>> {
        if self
            .repository
            .get_transaction(transaction_id)
            .await?
            .is_none()
        {
            return Err(ReconcileError::TransactionNotFound(
                transaction_id.to_string(),
            ));
        }

        let outcomes = self
            .list_runs()
            .await?
            .into_iter()
            .filter_map(|run| run.report)
            .flat_map(|report| report.results)
            .filter(|outcome| outcome.transaction_id.as_deref() == Some(transaction_id))
            .collect();
        Ok(outcomes)
    }

    /// Drop all records and runs
    pub async fn clear(&self) -> ReconcileResult<()> {
        self.repository.clear().await
    }
}
