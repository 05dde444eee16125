//! # Settlement Reconciler
//!
//! Reconciles internal payment authorizations against the settlement files
//! payment processors send back, classifying every record and summarizing the
//! discrepancies.
//!
//! ## Features
//!
//! - **Three-phase matching**: duplicate detection, settlement pairing by processor
//!   key with order-reference fallback, and unsettled detection
//! - **Variance policy**: one-cent rounding floor, configurable tolerance fraction,
//!   and fee-explained variances
//! - **Multi-currency**: static FX table with bridging through USD (fails open when
//!   no rate exists)
//! - **Reporting**: overall summary, breakdowns by currency, country and processor,
//!   and a high-priority list of large or late discrepancies
//! - **Storage abstraction**: repository trait with an in-memory implementation
//!
//! ## Quick Start
//!
//! ```rust
//! use settlement_reconciler::{ReconciliationConfig, ReconciliationEngine};
//!
//! let engine = ReconciliationEngine::with_config(ReconciliationConfig::default());
//! let report = engine.run("RUN-0001", &[], &[]);
//! assert!(report.results.is_empty());
//! assert_eq!(report.summary.reconciliation_rate, 0.0);
//! ```

pub mod config;
pub mod reconciliation;
pub mod service;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::*;
pub use reconciliation::{FxConverter, ReconciliationEngine};
pub use service::*;
pub use traits::*;
pub use types::*;
