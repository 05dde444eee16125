//! Summary, breakdown and high-priority aggregation over run outcomes

use chrono::Utc;
use std::collections::BTreeMap;

use crate::config::ReconciliationConfig;
use crate::types::*;

impl ReportSummary {
    /// Count one outcome and add its amounts
    pub fn add_outcome(&mut self, outcome: &ReconciliationOutcome) {
        match outcome.status {
            ReconciliationStatus::Matched => self.matched += 1,
            ReconciliationStatus::MatchedWithVariance => self.matched_with_variance += 1,
            ReconciliationStatus::Unsettled => self.unsettled += 1,
            ReconciliationStatus::UnexpectedSettlement => self.unexpected_settlements += 1,
            ReconciliationStatus::Duplicate => self.duplicates += 1,
        }
        self.total_expected_amount += &outcome.expected_amount;
        self.total_settled_gross += &outcome.settled_gross_amount;
        self.total_settled_net += &outcome.settled_net_amount;
        self.total_variance_amount += &outcome.variance_amount;
        self.total_fees += &outcome.fee_amount;
    }

    /// Percentage of outcomes that were paired, with or without variance.
    /// Zero when nothing was counted.
    pub fn compute_reconciliation_rate(&self) -> f64 {
        let total = self.total_outcomes();
        if total == 0 {
            return 0.0;
        }
        (self.matched + self.matched_with_variance) as f64 / total as f64 * 100.0
    }
}

fn add_to_breakdown(
    breakdown: &mut BTreeMap<String, ReportSummary>,
    key: &str,
    outcome: &ReconciliationOutcome,
) {
    if key.is_empty() {
        return;
    }
    breakdown
        .entry(key.to_string())
        .or_default()
        .add_outcome(outcome);
}

fn is_high_priority(outcome: &ReconciliationOutcome, config: &ReconciliationConfig) -> bool {
    let large_variance = outcome.status != ReconciliationStatus::Matched
        && outcome.variance_amount.abs() >= config.high_priority_threshold;
    let late = outcome
        .days_to_settle
        .is_some_and(|days| days > config.late_settlement_days);
    large_variance || late
}

/// Build the run report from the engine's outcomes
///
/// Breakdown buckets are skipped for empty keys, so an outcome with no known
/// country only counts toward the currency and processor breakdowns. The
/// high-priority list holds each qualifying outcome once, ordered by descending
/// absolute variance with ties kept in outcome order.
pub fn aggregate(
    run_id: &str,
    transaction_count: usize,
    settlement_count: usize,
    outcomes: Vec<ReconciliationOutcome>,
    config: &ReconciliationConfig,
) -> ReconciliationReport {
    let mut summary = ReportSummary {
        total_transactions: transaction_count,
        total_settlements: settlement_count,
        ..Default::default()
    };
    let mut by_currency = BTreeMap::new();
    let mut by_country = BTreeMap::new();
    let mut by_processor = BTreeMap::new();
    let mut high_priority = Vec::new();

    for outcome in &outcomes {
        summary.add_outcome(outcome);
        add_to_breakdown(&mut by_currency, &outcome.currency, outcome);
        add_to_breakdown(&mut by_country, &outcome.country, outcome);
        add_to_breakdown(&mut by_processor, &outcome.processor_name, outcome);

        if is_high_priority(outcome, config) {
            high_priority.push(outcome.clone());
        }
    }

    summary.reconciliation_rate = summary.compute_reconciliation_rate();
    for breakdown in [&mut by_currency, &mut by_country, &mut by_processor] {
        for bucket in breakdown.values_mut() {
            bucket.reconciliation_rate = bucket.compute_reconciliation_rate();
        }
    }

    // sort_by is stable
    high_priority.sort_by(|a, b| b.variance_amount.abs().cmp(&a.variance_amount.abs()));

    ReconciliationReport {
        run_id: run_id.to_string(),
        generated_at: Utc::now(),
        summary,
        by_currency,
        by_country,
        by_processor,
        results: outcomes,
        high_priority,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    fn outcome(id: &str, status: ReconciliationStatus, variance: i64) -> ReconciliationOutcome {
        ReconciliationOutcome {
            id: id.to_string(),
            transaction_id: None,
            settlement_id: Some(format!("S-{}", id)),
            processor_name: "LatamPay".to_string(),
            status,
            expected_amount: BigDecimal::from(0),
            settled_gross_amount: BigDecimal::from(variance),
            settled_net_amount: BigDecimal::from(variance),
            fee_amount: BigDecimal::from(0),
            variance_amount: BigDecimal::from(variance),
            currency: "USD".to_string(),
            country: String::new(),
            authorized_at: None,
            settled_at: None,
            days_to_settle: None,
            notes: String::new(),
        }
    }

    #[test]
    fn test_empty_run() {
        let report = aggregate("RUN-0001", 0, 0, Vec::new(), &ReconciliationConfig::default());
        assert_eq!(report.summary.reconciliation_rate, 0.0);
        assert!(report.results.is_empty());
        assert!(report.high_priority.is_empty());
        assert!(report.by_currency.is_empty());
    }

    #[test]
    fn test_rate_formula() {
        let outcomes = vec![
            outcome("1", ReconciliationStatus::Matched, 0),
            outcome("2", ReconciliationStatus::MatchedWithVariance, 5),
            outcome("3", ReconciliationStatus::Unsettled, 0),
            outcome("4", ReconciliationStatus::Duplicate, 0),
        ];
        let report = aggregate("R", 2, 3, outcomes, &ReconciliationConfig::default());
        assert_eq!(report.summary.reconciliation_rate, 50.0);
        assert_eq!(report.summary.total_transactions, 2);
        assert_eq!(report.summary.total_settlements, 3);
        assert_eq!(report.summary.total_variance_amount, BigDecimal::from(5));
    }

    #[test]
    fn test_empty_country_skipped_from_country_breakdown() {
        let mut with_country = outcome("1", ReconciliationStatus::Matched, 0);
        with_country.country = "BR".to_string();
        let without_country = outcome("2", ReconciliationStatus::UnexpectedSettlement, 10);

        let report = aggregate(
            "R",
            1,
            2,
            vec![with_country, without_country],
            &ReconciliationConfig::default(),
        );
        assert_eq!(report.by_country.len(), 1);
        assert_eq!(report.by_country["BR"].matched, 1);
        assert_eq!(report.by_currency["USD"].total_outcomes(), 2);
        assert_eq!(report.by_processor["LatamPay"].unexpected_settlements, 1);
        assert_eq!(report.by_currency["USD"].reconciliation_rate, 50.0);
    }

    #[test]
    fn test_high_priority_selection_and_order() {
        let config = ReconciliationConfig::default();
        let mut late_and_large = outcome("late", ReconciliationStatus::MatchedWithVariance, -1500);
        late_and_large.days_to_settle = Some(12);
        let mut late_matched = outcome("late-ok", ReconciliationStatus::Matched, 0);
        late_matched.days_to_settle = Some(9);

        let outcomes = vec![
            outcome("small", ReconciliationStatus::MatchedWithVariance, -20),
            outcome("first-2000", ReconciliationStatus::UnexpectedSettlement, 2000),
            outcome("matched-big", ReconciliationStatus::Matched, 5000),
            late_and_large,
            outcome("second-2000", ReconciliationStatus::Duplicate, -2000),
            late_matched,
        ];

        let report = aggregate("R", 0, 0, outcomes, &config);
        let ids: Vec<&str> = report.high_priority.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["first-2000", "second-2000", "late", "late-ok"]);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let config = ReconciliationConfig::default();
        let outcomes = vec![
            outcome("at", ReconciliationStatus::MatchedWithVariance, 1000),
            outcome("below", ReconciliationStatus::MatchedWithVariance, 999),
        ];
        let report = aggregate("R", 0, 0, outcomes, &config);
        assert_eq!(report.high_priority.len(), 1);
        assert_eq!(report.high_priority[0].id, "at");
    }
}
