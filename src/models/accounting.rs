use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::de::{day, optional_day, optional_number};
use super::required;
use crate::error::ClinicError;
use crate::storage::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
}

/// One ledger line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(deserialize_with = "day")]
    pub date: NaiveDate,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: f64,
}

impl Document for Transaction {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionRequest {
    #[serde(default, deserialize_with = "optional_day")]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<TransactionType>,
    #[serde(default, deserialize_with = "optional_number")]
    pub amount: Option<f64>,
}

impl TransactionRequest {
    pub fn into_transaction(self, id: String) -> Result<Transaction, ClinicError> {
        let (Some(date), Some(description), Some(kind), Some(amount)) =
            (self.date, required(self.description), self.kind, self.amount)
        else {
            return Err(ClinicError::Validation("All fields are required".to_string()));
        };

        if !amount.is_finite() || amount <= 0.0 {
            return Err(ClinicError::Validation("Amount must be a positive number".to_string()));
        }

        Ok(Transaction {
            id,
            date,
            description,
            kind,
            amount,
        })
    }
}
