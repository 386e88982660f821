//! Customer attributes tested by segment rules

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::Field;

/// The attributes of one customer that rules can reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfile {
    #[serde(default)]
    pub total_spend: f64,

    #[serde(default)]
    pub visit_count: u64,

    #[serde(default)]
    pub last_purchase: Option<DateTime<Utc>>,
}

/// Reading of one attribute of a customer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttributeValue {
    Number(f64),
    Date(NaiveDate),
    Missing,
}

impl CustomerProfile {
    pub fn attribute(&self, field: Field) -> AttributeValue {
        match field {
            Field::TotalSpend => AttributeValue::Number(self.total_spend),
            Field::VisitCount => AttributeValue::Number(self.visit_count as f64),
            Field::LastPurchase => self
                .last_purchase
                .map(|dt| AttributeValue::Date(dt.date_naive()))
                .unwrap_or(AttributeValue::Missing),
        }
    }
}
