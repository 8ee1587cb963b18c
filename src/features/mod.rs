//! Feature extraction seam
//!
//! Each model kind has a fixed, positional feature-name table. Domain code
//! supplies a [`FeatureExtractor`] that loads raw records for a date range
//! and turns each one into a [`LabeledSample`] laid out per that table; the
//! pipeline never touches storage itself.

mod tabular;

pub use tabular::{load_csv, ColumnMapping, TabularExtractor, TabularRecord};

use crate::dataset::LabeledSample;
use crate::error::Result;
use crate::training::{DateRange, ModelKind};

/// Credit-scoring features, in vector order
pub const CREDIT_FEATURES: &[&str] = &[
    "monthly_income",
    "income_stability",
    "avg_balance",
    "min_balance",
    "overdraft_count",
    "on_time_payment_ratio",
    "debt_to_income",
    "account_age_months",
    "transaction_count",
    "savings_rate",
];

/// Fraud-detection features, in vector order
pub const FRAUD_FEATURES: &[&str] = &[
    "amount",
    "amount_zscore",
    "hour_of_day",
    "is_weekend",
    "merchant_risk",
    "velocity_1h",
    "velocity_24h",
    "distance_from_home_km",
    "new_device",
    "failed_attempts_24h",
];

/// Numeric side of the categorization features, in vector order
pub const CATEGORIZATION_FEATURES: &[&str] = &["amount", "is_debit", "hour_of_day", "day_of_week"];

/// Feature-name table for a model kind
pub fn feature_table(kind: ModelKind) -> &'static [&'static str] {
    match kind {
        ModelKind::CreditScoring => CREDIT_FEATURES,
        ModelKind::FraudDetection => FRAUD_FEATURES,
        ModelKind::Categorization => CATEGORIZATION_FEATURES,
    }
}

/// Owned copy of [`feature_table`]
pub fn feature_names(kind: ModelKind) -> Vec<String> {
    feature_table(kind).iter().map(|s| s.to_string()).collect()
}

/// Turns raw historical records into labeled samples for one model kind.
///
/// `extract` must be deterministic. Per-record failures are returned as
/// errors; the pipeline skips those records instead of aborting.
pub trait FeatureExtractor {
    type Record;

    fn kind(&self) -> ModelKind;

    /// Names of the positions in every extracted vector
    fn feature_names(&self) -> Vec<String>;

    /// Category names indexed by categorization labels
    fn categories(&self) -> Vec<String> {
        Vec::new()
    }

    /// Raw records whose date falls inside `range`
    fn records(&self, range: &DateRange) -> Result<Vec<Self::Record>>;

    fn extract(&self, record: &Self::Record) -> Result<LabeledSample>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tables_have_unique_names() {
        for kind in ModelKind::ALL {
            let table = feature_table(kind);
            let unique: HashSet<_> = table.iter().collect();
            assert_eq!(unique.len(), table.len(), "{} has duplicate features", kind);
        }
    }

    #[test]
    fn test_feature_names_match_table() {
        assert_eq!(feature_names(ModelKind::FraudDetection).len(), FRAUD_FEATURES.len());
        assert_eq!(feature_names(ModelKind::CreditScoring)[0], "monthly_income");
    }
}
