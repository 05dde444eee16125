//! Reconcile a small multi-processor dataset and print the report

use bigdecimal::BigDecimal;
use chrono::{Duration, TimeZone, Utc};
use settlement_reconciler::utils::{EnhancedRecordValidator, MemoryRepository};
use settlement_reconciler::{
    ConfigOverrides, ReconciliationConfig, Reconciler, SettlementRecord, Transaction,
    TransactionStatus,
};
use std::str::FromStr;

fn amount(s: &str) -> Result<BigDecimal, Box<dyn std::error::Error>> {
    Ok(BigDecimal::from_str(s)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let reconciler_config = ReconciliationConfig::default();
    let mut reconciler = Reconciler::with_config(
        MemoryRepository::new(),
        reconciler_config,
        Box::new(EnhancedRecordValidator),
    )?;

    let authorized_at = Utc
        .with_ymd_and_hms(2025, 1, 15, 10, 0, 0)
        .single()
        .ok_or("invalid base timestamp")?;

    let txn = |id: &str, processor: &str, ptx: &str, amt: &str, currency: &str, country: &str| {
        Ok::<_, Box<dyn std::error::Error>>(Transaction {
            id: id.to_string(),
            order_id: format!("ORD-{}", id),
            processor_name: processor.to_string(),
            processor_txn_id: ptx.to_string(),
            amount: amount(amt)?,
            currency: currency.to_string(),
            country: country.to_string(),
            status: TransactionStatus::Captured,
            authorized_at,
            captured_at: Some(authorized_at + Duration::hours(1)),
            customer_email: format!("{}@example.com", id.to_lowercase()),
            payment_method: "card".to_string(),
        })
    };

    let settle = |id: &str,
                  processor: &str,
                  ptx: &str,
                  order: &str,
                  gross: &str,
                  fee: &str,
                  currency: &str,
                  days: i64| {
        let gross = amount(gross)?;
        let fee = amount(fee)?;
        Ok::<_, Box<dyn std::error::Error>>(SettlementRecord {
            id: id.to_string(),
            processor_name: processor.to_string(),
            processor_txn_id: ptx.to_string(),
            order_reference: order.to_string(),
            net_amount: &gross - &fee,
            gross_amount: gross,
            fee_amount: fee,
            currency: currency.to_string(),
            settled_at: authorized_at + Duration::days(days),
            settlement_batch_id: "BATCH-2025-01-17".to_string(),
        })
    };

    let transactions = vec![
        txn("TXN-001", "PaySureMX", "PSM-001", "1500.00", "MXN", "MX")?,
        txn("TXN-002", "PaySureMX", "PSM-002", "820.00", "MXN", "MX")?,
        txn("TXN-003", "LatamPay", "LP-003", "250.00", "BRL", "BR")?,
        txn("TXN-004", "LatamPay", "LP-004", "90000.00", "COP", "CO")?,
        txn("TXN-005", "GlobalTransact", "GT-005", "75.00", "USD", "MX")?,
        txn("TXN-006", "GlobalTransact", "GT-006", "5400.00", "USD", "CO")?,
    ];
    let settlements = vec![
        settle("STL-001", "PaySureMX", "PSM-001", "ORD-TXN-001", "1500.00", "43.50", "MXN", 2)?,
        settle("STL-002", "PaySureMX", "PSM-002", "ORD-TXN-002", "796.40", "23.60", "MXN", 2)?,
        settle("STL-003", "LatamPay", "LP-003", "ORD-TXN-003", "50.00", "1.50", "USD", 3)?,
        settle("STL-004", "LatamPay", "LP-004-X", "ORD-TXN-004", "88000.00", "0", "COP", 11)?,
        settle("STL-005", "GlobalTransact", "GT-005", "ORD-TXN-005", "75.00", "2.10", "USD", 1)?,
        settle("STL-006", "GlobalTransact", "GT-005", "ORD-TXN-005", "75.00", "2.10", "USD", 4)?,
        settle("STL-007", "GlobalTransact", "GT-999", "ORD-UNKNOWN", "1200.00", "30.00", "USD", 2)?,
    ];

    let uploaded = reconciler.upload_transactions(&transactions).await?;
    println!("Transactions: {} received, {} new", uploaded.received, uploaded.new);
    let uploaded = reconciler.upload_settlements(&settlements).await?;
    println!("Settlements:  {} received, {} new\n", uploaded.received, uploaded.new);

    let overrides = ConfigOverrides {
        variance_tolerance_pct: Some(amount("0.01")?),
        ..Default::default()
    };
    let report = reconciler.run(Some(&overrides)).await?;

    println!("Run {} ({:.1}% reconciled)", report.run_id, report.summary.reconciliation_rate);
    for outcome in &report.results {
        println!(
            "  {:<18} {:<22} {:>12} {}  {}",
            outcome.id,
            outcome.status.as_str(),
            outcome.variance_amount.round(2),
            outcome.currency,
            outcome.notes
        );
    }

    println!("\nHigh priority:");
    for outcome in &report.high_priority {
        println!(
            "  {} {} variance {} {}",
            outcome.id,
            outcome.status,
            outcome.variance_amount.round(2),
            outcome.currency
        );
    }

    println!("\n{}", serde_json::to_string_pretty(&report.by_processor)?);

    Ok(())
}
