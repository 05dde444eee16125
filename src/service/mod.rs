//! Service layer: uploads, runs and report queries over a repository

pub mod ingest;
pub mod reconciler;

pub use ingest::*;
pub use reconciler::*;
