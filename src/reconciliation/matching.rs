//! Three-phase settlement matching
//!
//! 1. Duplicate detection: every settlement whose processor key occurs more than
//!    once is reported as `duplicate`.
//! 2. Settlement matching: remaining settlements are paired with a transaction
//!    by processor key, falling back to order reference, and classified by
//!    variance.
//! 3. Unsettled detection: transactions nothing consumed are reported as
//!    `unsettled`.
//!
//! Inputs are walked in ID order and duplicate groups in key order, so the same
//! records always produce the same outcomes, in the same order, with the same IDs.

use bigdecimal::BigDecimal;
use log::debug;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::ReconciliationConfig;
use crate::reconciliation::fx::FxConverter;
use crate::types::*;

/// Variances at or below one cent are rounding noise
fn rounding_floor() -> BigDecimal {
    BigDecimal::from(1) / BigDecimal::from(100)
}

fn money(amount: &BigDecimal) -> BigDecimal {
    amount.round(2)
}

/// Sequential outcome identifiers for a single run: `RR-<run_id>-0001`, ...
#[derive(Debug, Clone)]
pub struct OutcomeIds {
    run_id: String,
    issued: usize,
}

impl OutcomeIds {
    pub fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            issued: 0,
        }
    }

    pub fn next_id(&mut self) -> String {
        self.issued += 1;
        format!("RR-{}-{:04}", self.run_id, self.issued)
    }

    /// Number of identifiers handed out so far
    pub fn issued(&self) -> usize {
        self.issued
    }
}

/// Lookup of transactions by primary and fallback keys. On key collisions the
/// transaction with the greatest ID wins.
struct TransactionIndex<'a> {
    by_processor_key: HashMap<String, &'a Transaction>,
    by_order_id: HashMap<&'a str, &'a Transaction>,
}

impl<'a> TransactionIndex<'a> {
    fn build(transactions: &[&'a Transaction]) -> Self {
        let mut by_processor_key = HashMap::with_capacity(transactions.len());
        let mut by_order_id = HashMap::with_capacity(transactions.len());
        for &txn in transactions {
            by_processor_key.insert(txn.processor_key(), txn);
            by_order_id.insert(txn.order_id.as_str(), txn);
        }
        Self {
            by_processor_key,
            by_order_id,
        }
    }

    /// Primary match on processor key, then fallback on order reference
    fn find(&self, processor_key: &str, order_reference: &str) -> Option<&'a Transaction> {
        if let Some(txn) = self.by_processor_key.get(processor_key) {
            return Some(*txn);
        }
        if order_reference.is_empty() {
            return None;
        }
        self.by_order_id.get(order_reference).copied()
    }
}

/// Transaction-derived fields attached to a duplicate settlement
struct DuplicateEnrichment {
    transaction_id: String,
    expected_amount: BigDecimal,
    variance_amount: BigDecimal,
    country: String,
    authorized_at: chrono::DateTime<chrono::Utc>,
    days_to_settle: i64,
}

impl DuplicateEnrichment {
    fn for_settlement(
        txn: &Transaction,
        settlement: &SettlementRecord,
        fx: &FxConverter<'_>,
    ) -> Self {
        let expected_amount = fx.convert(&txn.amount, &txn.currency, &settlement.currency);
        let variance_amount = &settlement.gross_amount - &expected_amount;
        Self {
            transaction_id: txn.id.clone(),
            expected_amount,
            variance_amount,
            country: txn.country.clone(),
            authorized_at: txn.authorized_at,
            days_to_settle: days_between(txn, settlement),
        }
    }
}

fn days_between(txn: &Transaction, settlement: &SettlementRecord) -> i64 {
    (settlement.settled_at - txn.authorized_at).num_days()
}

/// Outcome carrying only the settlement's own fields
fn settlement_outcome(
    id: String,
    settlement: &SettlementRecord,
    status: ReconciliationStatus,
) -> ReconciliationOutcome {
    ReconciliationOutcome {
        id,
        transaction_id: None,
        settlement_id: Some(settlement.id.clone()),
        processor_name: settlement.processor_name.clone(),
        status,
        expected_amount: BigDecimal::from(0),
        settled_gross_amount: settlement.gross_amount.clone(),
        settled_net_amount: settlement.net_amount.clone(),
        fee_amount: settlement.fee_amount.clone(),
        variance_amount: BigDecimal::from(0),
        currency: settlement.currency.clone(),
        country: String::new(),
        authorized_at: None,
        settled_at: Some(settlement.settled_at),
        days_to_settle: None,
        notes: String::new(),
    }
}

/// Decide the status of a paired settlement from its variance
fn classify_variance(
    txn: &Transaction,
    settlement: &SettlementRecord,
    expected_amount: &BigDecimal,
    variance: &BigDecimal,
    tolerance: &BigDecimal,
) -> (ReconciliationStatus, String) {
    let abs_variance = variance.abs();
    if abs_variance <= rounding_floor() {
        return (ReconciliationStatus::Matched, String::new());
    }

    if abs_variance <= expected_amount * tolerance {
        return (
            ReconciliationStatus::Matched,
            format!(
                "Variance of {} {} within tolerance ({}%)",
                money(variance),
                settlement.currency,
                (tolerance * &BigDecimal::from(100)).round(1)
            ),
        );
    }

    if txn.currency != settlement.currency {
        return (
            ReconciliationStatus::MatchedWithVariance,
            format!(
                "Cross-currency: authorized {} {}, settled {} {} (expected ~{} {} after FX)",
                money(&txn.amount),
                txn.currency,
                money(&settlement.gross_amount),
                settlement.currency,
                money(expected_amount),
                settlement.currency
            ),
        );
    }

    let fee = &settlement.fee_amount;
    if *fee > BigDecimal::from(0) && (variance + fee).abs() <= rounding_floor() {
        return (
            ReconciliationStatus::Matched,
            format!(
                "Variance of {} {} matches fee deduction of {}",
                money(variance),
                settlement.currency,
                money(fee)
            ),
        );
    }

    (
        ReconciliationStatus::MatchedWithVariance,
        format!(
            "Amount variance: expected {}, settled gross {} (diff: {} {})",
            money(expected_amount),
            money(&settlement.gross_amount),
            money(variance),
            settlement.currency
        ),
    )
}

/// Run all three phases and return one outcome per settlement plus one per
/// unconsumed transaction
pub fn match_records(
    transactions: &[Transaction],
    settlements: &[SettlementRecord],
    config: &ReconciliationConfig,
    ids: &mut OutcomeIds,
) -> Vec<ReconciliationOutcome> {
    let fx = FxConverter::new(&config.fx_rates);

    let mut transactions: Vec<&Transaction> = transactions.iter().collect();
    transactions.sort_by(|a, b| a.id.cmp(&b.id));
    let mut settlements: Vec<&SettlementRecord> = settlements.iter().collect();
    settlements.sort_by(|a, b| a.id.cmp(&b.id));

    let index = TransactionIndex::build(&transactions);

    let mut groups: BTreeMap<String, Vec<&SettlementRecord>> = BTreeMap::new();
    for &settlement in &settlements {
        groups
            .entry(settlement.processor_key())
            .or_default()
            .push(settlement);
    }

    let mut consumed_transactions: HashSet<&str> = HashSet::new();
    let mut consumed_settlements: HashSet<&str> = HashSet::new();
    let mut duplicate_keys: HashSet<&str> = HashSet::new();
    let mut outcomes = Vec::with_capacity(settlements.len() + transactions.len());

    // Phase 1: duplicates
    for (key, group) in groups.iter().filter(|(_, group)| group.len() > 1) {
        duplicate_keys.insert(key.as_str());
        let txn = index.find(key, &group[0].order_reference);

        debug!(
            "Duplicate processor key {}: {} settlements, transaction={:?}",
            key,
            group.len(),
            txn.map(|t| t.id.as_str())
        );

        for &settlement in group {
            let mut outcome =
                settlement_outcome(ids.next_id(), settlement, ReconciliationStatus::Duplicate);
            outcome.notes = format!(
                "Duplicate settlement for processor key {} ({} occurrences)",
                key,
                group.len()
            );

            if let Some(txn) = txn {
                let enrichment = DuplicateEnrichment::for_settlement(txn, settlement, &fx);
                outcome.transaction_id = Some(enrichment.transaction_id);
                outcome.expected_amount = enrichment.expected_amount;
                outcome.variance_amount = enrichment.variance_amount;
                outcome.country = enrichment.country;
                outcome.authorized_at = Some(enrichment.authorized_at);
                outcome.days_to_settle = Some(enrichment.days_to_settle);
                consumed_transactions.insert(txn.id.as_str());
            }

            consumed_settlements.insert(settlement.id.as_str());
            outcomes.push(outcome);
        }
    }

    // Phase 2: pair the remaining settlements
    for &settlement in &settlements {
        if consumed_settlements.contains(settlement.id.as_str()) {
            continue;
        }
        let key = settlement.processor_key();
        if duplicate_keys.contains(key.as_str()) {
            continue;
        }
        consumed_settlements.insert(settlement.id.as_str());

        let Some(txn) = index.find(&key, &settlement.order_reference) else {
            let mut outcome = settlement_outcome(
                ids.next_id(),
                settlement,
                ReconciliationStatus::UnexpectedSettlement,
            );
            outcome.variance_amount = settlement.gross_amount.clone();
            outcome.notes = "Settlement record has no matching internal transaction".to_string();
            outcomes.push(outcome);
            continue;
        };
        consumed_transactions.insert(txn.id.as_str());

        let expected_amount = fx.convert(&txn.amount, &txn.currency, &settlement.currency);
        let variance = &settlement.gross_amount - &expected_amount;
        let (status, mut notes) = classify_variance(
            txn,
            settlement,
            &expected_amount,
            &variance,
            &config.variance_tolerance_pct,
        );

        let days = days_between(txn, settlement);
        if days > config.late_settlement_days {
            if !notes.is_empty() {
                notes.push_str("; ");
            }
            notes.push_str(&format!(
                "Late settlement: {} days (threshold: {})",
                days, config.late_settlement_days
            ));
        }

        outcomes.push(ReconciliationOutcome {
            id: ids.next_id(),
            transaction_id: Some(txn.id.clone()),
            settlement_id: Some(settlement.id.clone()),
            processor_name: txn.processor_name.clone(),
            status,
            expected_amount,
            settled_gross_amount: settlement.gross_amount.clone(),
            settled_net_amount: settlement.net_amount.clone(),
            fee_amount: settlement.fee_amount.clone(),
            variance_amount: variance,
            currency: settlement.currency.clone(),
            country: txn.country.clone(),
            authorized_at: Some(txn.authorized_at),
            settled_at: Some(settlement.settled_at),
            days_to_settle: Some(days),
            notes,
        });
    }

    // Phase 3: transactions nothing settled
    for &txn in &transactions {
        if consumed_transactions.contains(txn.id.as_str()) {
            continue;
        }
        outcomes.push(ReconciliationOutcome {
            id: ids.next_id(),
            transaction_id: Some(txn.id.clone()),
            settlement_id: None,
            processor_name: txn.processor_name.clone(),
            status: ReconciliationStatus::Unsettled,
            expected_amount: txn.amount.clone(),
            settled_gross_amount: BigDecimal::from(0),
            settled_net_amount: BigDecimal::from(0),
            fee_amount: BigDecimal::from(0),
            variance_amount: BigDecimal::from(0),
            currency: txn.currency.clone(),
            country: txn.country.clone(),
            authorized_at: Some(txn.authorized_at),
            settled_at: None,
            days_to_settle: None,
            notes: "No settlement record found for this transaction".to_string(),
        });
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn txn(id: &str, processor_txn_id: &str, amount: &str, currency: &str) -> Transaction {
        Transaction {
            id: id.to_string(),
            order_id: format!("ORD-{}", id),
            processor_name: "PaySureMX".to_string(),
            processor_txn_id: processor_txn_id.to_string(),
            amount: dec(amount),
            currency: currency.to_string(),
            country: "MX".to_string(),
            status: TransactionStatus::Captured,
            authorized_at: Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap(),
            captured_at: None,
            customer_email: String::new(),
            payment_method: String::new(),
        }
    }

    fn settlement(
        id: &str,
        processor_txn_id: &str,
        order_reference: &str,
        gross: &str,
        fee: &str,
        currency: &str,
    ) -> SettlementRecord {
        let gross = dec(gross);
        let fee = dec(fee);
        SettlementRecord {
            id: id.to_string(),
            processor_name: "PaySureMX".to_string(),
            processor_txn_id: processor_txn_id.to_string(),
            order_reference: order_reference.to_string(),
            net_amount: &gross - &fee,
            gross_amount: gross,
            fee_amount: fee,
            currency: currency.to_string(),
            settled_at: Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap() + Duration::hours(48),
            settlement_batch_id: "BATCH-1".to_string(),
        }
    }

    fn run(
        transactions: &[Transaction],
        settlements: &[SettlementRecord],
        config: &ReconciliationConfig,
    ) -> Vec<ReconciliationOutcome> {
        let mut ids = OutcomeIds::new("T");
        match_records(transactions, settlements, config, &mut ids)
    }

    #[test]
    fn test_outcome_ids_are_sequential() {
        let mut ids = OutcomeIds::new("RUN-0001");
        assert_eq!(ids.next_id(), "RR-RUN-0001-0001");
        assert_eq!(ids.next_id(), "RR-RUN-0001-0002");
        assert_eq!(ids.issued(), 2);
    }

    #[test]
    fn test_tolerance_boundary() {
        let config = ReconciliationConfig::default().with_tolerance(dec("0.02"));
        let transactions = [txn("T1", "P1", "100.00", "MXN")];

        let at_boundary = run(
            &transactions,
            &[settlement("S1", "P1", "", "98.00", "0", "MXN")],
            &config,
        );
        assert_eq!(at_boundary[0].status, ReconciliationStatus::Matched);
        assert!(at_boundary[0].notes.contains("within tolerance (2.0%)"));

        let beyond = run(
            &transactions,
            &[settlement("S1", "P1", "", "97.99", "0", "MXN")],
            &config,
        );
        assert_eq!(beyond[0].status, ReconciliationStatus::MatchedWithVariance);
    }

    #[test]
    fn test_rounding_floor() {
        let config = ReconciliationConfig::default();
        let outcomes = run(
            &[txn("T1", "P1", "100.00", "MXN")],
            &[settlement("S1", "P1", "", "100.01", "0", "MXN")],
            &config,
        );
        assert_eq!(outcomes[0].status, ReconciliationStatus::Matched);
        assert!(outcomes[0].notes.is_empty());
    }

    #[test]
    fn test_fee_explained_variance_is_matched() {
        let config = ReconciliationConfig::default();
        let outcomes = run(
            &[txn("T1", "P1", "100.00", "MXN")],
            &[settlement("S1", "P1", "", "97.00", "3.00", "MXN")],
            &config,
        );
        assert_eq!(outcomes[0].status, ReconciliationStatus::Matched);
        assert_eq!(outcomes[0].variance_amount, dec("-3"));
        assert!(outcomes[0].notes.contains("matches fee deduction of 3.00"));
    }

    #[test]
    fn test_fee_override_needs_same_currency() {
        let config = ReconciliationConfig::default();
        // 500 MXN -> 29 USD; settled 26 with a 3 fee, but across currencies
        let outcomes = run(
            &[txn("T1", "P1", "500.00", "MXN")],
            &[settlement("S1", "P1", "", "26.00", "3.00", "USD")],
            &config,
        );
        assert_eq!(outcomes[0].status, ReconciliationStatus::MatchedWithVariance);
        assert_eq!(outcomes[0].expected_amount, dec("29"));
        assert_eq!(outcomes[0].variance_amount, dec("-3"));
        assert!(outcomes[0].notes.starts_with("Cross-currency"));
    }

    #[test]
    fn test_cross_currency_match() {
        let config = ReconciliationConfig::default();
        let outcomes = run(
            &[txn("T1", "P1", "1000.00", "BRL")],
            &[settlement("S1", "P1", "", "200.00", "0", "USD")],
            &config,
        );
        assert_eq!(outcomes[0].status, ReconciliationStatus::Matched);
        assert_eq!(outcomes[0].expected_amount, dec("200"));
        assert_eq!(outcomes[0].currency, "USD");
    }

    #[test]
    fn test_unexpected_settlement_variance_is_gross() {
        let config = ReconciliationConfig::default();
        let outcomes = run(
            &[],
            &[settlement("S1", "P9", "NOPE", "500.00", "12.50", "COP")],
            &config,
        );
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, ReconciliationStatus::UnexpectedSettlement);
        assert_eq!(outcomes[0].variance_amount, dec("500"));
        assert_eq!(outcomes[0].expected_amount, BigDecimal::from(0));
        assert!(outcomes[0].country.is_empty());
        assert!(outcomes[0].transaction_id.is_none());
    }

    #[test]
    fn test_duplicate_group_consumes_transaction() {
        let config = ReconciliationConfig::default();
        let outcomes = run(
            &[txn("T1", "P1", "300.00", "MXN")],
            &[
                settlement("S1", "P1", "ORD-T1", "300.00", "0", "MXN"),
                settlement("S2", "P1", "ORD-T1", "300.00", "0", "MXN"),
            ],
            &config,
        );
        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            assert_eq!(outcome.status, ReconciliationStatus::Duplicate);
            assert_eq!(outcome.transaction_id.as_deref(), Some("T1"));
            assert_eq!(outcome.country, "MX");
            assert_eq!(outcome.days_to_settle, Some(2));
            assert!(outcome.notes.contains("(2 occurrences)"));
        }
    }

    #[test]
    fn test_duplicate_without_transaction() {
        let config = ReconciliationConfig::default();
        let outcomes = run(
            &[],
            &[
                settlement("S1", "P1", "", "10.00", "0", "MXN"),
                settlement("S2", "P1", "", "10.00", "0", "MXN"),
            ],
            &config,
        );
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.transaction_id.is_none()));
        assert!(outcomes.iter().all(|o| o.days_to_settle.is_none()));
    }

    #[test]
    fn test_days_to_settle_truncates() {
        let config = ReconciliationConfig::default();
        let mut late = settlement("S1", "P1", "", "100.00", "0", "MXN");
        late.settled_at = Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap()
            + Duration::days(8)
            + Duration::hours(23);
        let outcomes = run(&[txn("T1", "P1", "100.00", "MXN")], &[late], &config);
        assert_eq!(outcomes[0].days_to_settle, Some(8));
        assert_eq!(outcomes[0].status, ReconciliationStatus::Matched);
        assert_eq!(outcomes[0].notes, "Late settlement: 8 days (threshold: 7)");
    }

    #[test]
    fn test_order_is_deterministic() {
        let config = ReconciliationConfig::default();
        let transactions = [
            txn("T2", "P2", "10.00", "MXN"),
            txn("T1", "P1", "10.00", "MXN"),
            txn("T3", "P3", "10.00", "MXN"),
        ];
        let settlements = [
            settlement("S2", "P2", "", "10.00", "0", "MXN"),
            settlement("S1", "P1", "", "10.00", "0", "MXN"),
        ];
        let mut reversed_t = transactions.clone();
        reversed_t.reverse();
        let mut reversed_s = settlements.clone();
        reversed_s.reverse();

        let first = run(&transactions, &settlements, &config);
        let second = run(&reversed_t, &reversed_s, &config);
        assert_eq!(first, second);
        assert_eq!(first[0].settlement_id.as_deref(), Some("S1"));
        assert_eq!(first[2].transaction_id.as_deref(), Some("T3"));
    }

    #[test]
    fn test_duplicates_linked_by_order_reference() {
        let config = ReconciliationConfig::default();
        let transactions = [
            txn("T1", "P1", "100.00", "MXN"),
            txn("T2", "P2", "50.00", "MXN"),
        ];
        let settlements = [
            settlement("S1", "P-RESENT", "ORD-T1", "100.00", "0", "MXN"),
            settlement("S2", "P-RESENT", "", "100.00", "0", "MXN"),
        ];

        let outcomes = run(&transactions, &settlements, &config);
        assert_eq!(outcomes.len(), 3);

        let duplicates: Vec<_> = outcomes
            .iter()
            .filter(|o| o.status == ReconciliationStatus::Duplicate)
            .collect();
        assert_eq!(duplicates.len(), 2);
        for outcome in &duplicates {
            assert_eq!(outcome.transaction_id.as_deref(), Some("T1"));
            assert_eq!(outcome.expected_amount, dec("100.00"));
            assert_eq!(outcome.country, "MX");
            assert_eq!(outcome.days_to_settle, Some(2));
        }

        // T1 is consumed by the duplicate group, only T2 stays unsettled
        let unsettled: Vec<_> = outcomes
            .iter()
            .filter(|o| o.status == ReconciliationStatus::Unsettled)
            .collect();
        assert_eq!(unsettled.len(), 1);
        assert_eq!(unsettled[0].transaction_id.as_deref(), Some("T2"));
    }
}
