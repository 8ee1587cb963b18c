//! Merchant keyword rules
//!
//! A static table mapping description tokens to categories. A category named
//! by any matching rule receives a fixed additive boost at scoring time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Additive score boost for a keyword-matched category
pub const KEYWORD_BOOST: f64 = 2.0;

/// Built-in keyword → category table
pub const MERCHANT_KEYWORDS: &[(&str, &str)] = &[
    ("airtime", "MOBILE_MONEY.AIRTIME"),
    ("topup", "MOBILE_MONEY.AIRTIME"),
    ("recharge", "MOBILE_MONEY.AIRTIME"),
    ("mpesa", "MOBILE_MONEY.TRANSFER"),
    ("momo", "MOBILE_MONEY.TRANSFER"),
    ("uber", "TRANSPORTATION.RIDESHARE"),
    ("bolt", "TRANSPORTATION.RIDESHARE"),
    ("taxi", "TRANSPORTATION.RIDESHARE"),
    ("fuel", "TRANSPORTATION.FUEL"),
    ("petrol", "TRANSPORTATION.FUEL"),
    ("supermarket", "FOOD_AND_DRINK.GROCERIES"),
    ("grocery", "FOOD_AND_DRINK.GROCERIES"),
    ("shoprite", "FOOD_AND_DRINK.GROCERIES"),
    ("restaurant", "FOOD_AND_DRINK.RESTAURANTS"),
    ("cafe", "FOOD_AND_DRINK.RESTAURANTS"),
    ("electricity", "UTILITIES.ELECTRICITY"),
    ("prepaid", "UTILITIES.ELECTRICITY"),
    ("water", "UTILITIES.WATER"),
    ("netflix", "ENTERTAINMENT.STREAMING"),
    ("spotify", "ENTERTAINMENT.STREAMING"),
    ("salary", "INCOME.SALARY"),
    ("payroll", "INCOME.SALARY"),
    ("pharmacy", "MEDICAL.PHARMACY"),
    ("clinic", "MEDICAL.CLINIC"),
    ("hospital", "MEDICAL.CLINIC"),
];

/// Keyword rule set carried by a categorization model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRules {
    rules: Vec<(String, String)>,
    boost: f64,
}

impl Default for KeywordRules {
    fn default() -> Self {
        Self::from_pairs(MERCHANT_KEYWORDS)
    }
}

impl KeywordRules {
    /// Rules from `(keyword, category)` pairs with the default boost
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            rules: pairs
                .iter()
                .map(|(k, c)| (k.to_lowercase(), c.to_string()))
                .collect(),
            boost: KEYWORD_BOOST,
        }
    }

    /// No rules at all
    pub fn none() -> Self {
        Self {
            rules: Vec::new(),
            boost: KEYWORD_BOOST,
        }
    }

    pub fn boost(&self) -> f64 {
        self.boost
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Categories named by at least one rule whose keyword is among `tokens`
    pub fn matched_categories<'a>(&'a self, tokens: &[String]) -> BTreeSet<&'a str> {
        self.rules
            .iter()
            .filter(|(keyword, _)| tokens.iter().any(|t| t == keyword))
            .map(|(_, category)| category.as_str())
            .collect()
    }
}
