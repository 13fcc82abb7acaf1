//! FundWatch Core: ingestion, feature helpers and models for credit-fund supervision.
//!
//! This crate holds everything the pipelines compute with:
//! - Table schemas and polars-backed CSV ingestion
//! - Closed-form ratio and period-change helpers
//! - Statistical models (standard scaler, isolation forest, multinomial
//!   logistic regression, least squares) and evaluation metrics
//! - Deterministic RNG hierarchy and dataset fingerprinting

pub mod data;
pub mod features;
pub mod fingerprint;
pub mod ml;
pub mod rng;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: fitted models and tables can cross thread boundaries.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Data
        require_send::<data::RawTable>();
        require_sync::<data::RawTable>();
        require_send::<data::TableSchema>();
        require_sync::<data::TableSchema>();

        // Models
        require_send::<ml::StandardScaler>();
        require_sync::<ml::StandardScaler>();
        require_send::<ml::IsolationForest>();
        require_sync::<ml::IsolationForest>();
        require_send::<ml::MultinomialLogistic>();
        require_sync::<ml::MultinomialLogistic>();
        require_send::<ml::LinearRegression>();
        require_sync::<ml::LinearRegression>();
        require_send::<ml::ClassificationReport>();
        require_sync::<ml::ClassificationReport>();

        // RNG
        require_send::<rng::RngHierarchy>();
        require_sync::<rng::RngHierarchy>();
    }
}
