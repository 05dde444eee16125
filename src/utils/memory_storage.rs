//! In-memory repository implementation for testing and single-process use

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::traits::*;
use crate::types::*;

/// In-memory repository. Each collection sits behind its own lock, so two reads
/// of different collections are not taken at a single instant.
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    transactions: Arc<RwLock<HashMap<String, Transaction>>>,
    settlements: Arc<RwLock<HashMap<String, SettlementRecord>>>,
    runs: Arc<RwLock<HashMap<String, ReconciliationRun>>>,
}

impl MemoryRepository {
    /// Create a new, empty repository
    pub fn new() -> Self {
        Self {
            transactions: Arc::new(RwLock::new(HashMap::new())),
            settlements: Arc::new(RwLock::new(HashMap::new())),
            runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> ReconcileResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|e| ReconcileError::Storage(format!("lock poisoned: {}", e)))
}

fn write<T>(lock: &RwLock<T>) -> ReconcileResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|e| ReconcileError::Storage(format!("lock poisoned: {}", e)))
}

/// Upsert by ID, counting IDs that were not present before
fn upsert<T: Clone>(
    map: &mut HashMap<String, T>,
    records: &[T],
    id_of: impl Fn(&T) -> &str,
) -> usize {
    let mut new = 0;
    for record in records {
        if map.insert(id_of(record).to_string(), record.clone()).is_none() {
            new += 1;
        }
    }
    new
}

#[async_trait]
impl SettlementRepository for MemoryRepository {
    async fn add_transactions(&self, transactions: &[Transaction]) -> ReconcileResult<usize> {
        let mut stored = write(&self.transactions)?;
        Ok(upsert(&mut stored, transactions, |t| t.id.as_str()))
    }

    async fn add_settlements(&self, settlements: &[SettlementRecord]) -> ReconcileResult<usize> {
        let mut stored = write(&self.settlements)?;
        Ok(upsert(&mut stored, settlements, |s| s.id.as_str()))
    }

    async fn get_transaction(&self, transaction_id: &str) -> ReconcileResult<Option<Transaction>> {
        Ok(read(&self.transactions)?.get(transaction_id).cloned())
    }

    async fn get_settlement(
        &self,
        settlement_id: &str,
    ) -> ReconcileResult<Option<SettlementRecord>> {
        Ok(read(&self.settlements)?.get(settlement_id).cloned())
    }

    async fn list_transactions(&self) -> ReconcileResult<Vec<Transaction>> {
        Ok(read(&self.transactions)?.values().cloned().collect())
    }

    async fn list_settlements(&self) -> ReconcileResult<Vec<SettlementRecord>> {
        Ok(read(&self.settlements)?.values().cloned().collect())
    }

    async fn save_run(&self, run: &ReconciliationRun) -> ReconcileResult<()> {
        write(&self.runs)?.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> ReconcileResult<Option<ReconciliationRun>> {
        Ok(read(&self.runs)?.get(run_id).cloned())
    }

    async fn list_runs(&self) -> ReconcileResult<Vec<ReconciliationRun>> {
        Ok(read(&self.runs)?.values().cloned().collect())
    }

    async fn clear(&self) -> ReconcileResult<()> {
        write(&self.transactions)?.clear();
        write(&self.settlements)?.clear();
        write(&self.runs)?.clear();
        Ok(())
    }
}
