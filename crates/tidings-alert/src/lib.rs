//! Alert check engine for saved searches.
//!
//! [`checker::AlertChecker`] walks every stored alert, asks a
//! [`search::SearchProvider`] for results newer than the alert's
//! `notified_at` cursor, and records at most one notification per alert per
//! cycle. Re-running a cycle without new matching activity emits nothing.

pub mod checker;
pub mod search;

#[cfg(test)]
mod tests;

pub use checker::{AlertChecker, AlertOutcome, CheckOptions, CheckSummary};
pub use search::{SearchError, SearchProvider, SearchRequest, SearchResults};
