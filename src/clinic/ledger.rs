//! Ledger filtering and totals
//!
//! Pure functions over transactions; `today` is passed in so callers decide
//! which calendar the ledger follows.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ClinicError;
use crate::models::de::optional_day;
use crate::models::{Transaction, TransactionType};

/// Which transactions a ledger view covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedgerFilter {
    #[default]
    All,
    Today,
    /// The last seven days up to and including today
    Weekly,
    /// The calendar month containing today
    Monthly,
    /// Inclusive on both ends
    Range { from: NaiveDate, to: NaiveDate },
}

/// Query string of the ledger endpoints: `?filter=range&from=..&to=..`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LedgerQuery {
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default, deserialize_with = "optional_day")]
    pub from: Option<NaiveDate>,
    #[serde(default, deserialize_with = "optional_day")]
    pub to: Option<NaiveDate>,
}

impl LedgerQuery {
    pub fn to_filter(&self) -> Result<LedgerFilter, ClinicError> {
        match self.filter.as_deref().map(str::trim) {
            None | Some("") | Some("all") => Ok(LedgerFilter::All),
            Some("today") => Ok(LedgerFilter::Today),
            Some("weekly") | Some("week") => Ok(LedgerFilter::Weekly),
            Some("monthly") | Some("month") => Ok(LedgerFilter::Monthly),
            Some("range") => match (self.from, self.to) {
                (Some(from), Some(to)) if from <= to => Ok(LedgerFilter::Range { from, to }),
                (Some(_), Some(_)) => Err(ClinicError::Validation(
                    "Range start must not be after its end".to_string(),
                )),
                _ => Err(ClinicError::Validation(
                    "Range filter needs both from and to dates".to_string(),
                )),
            },
            Some(other) => Err(ClinicError::Validation(format!("Unknown ledger filter: {}", other))),
        }
    }
}

impl LedgerFilter {
    pub fn matches(&self, date: NaiveDate, today: NaiveDate) -> bool {
        match *self {
            LedgerFilter::All => true,
            LedgerFilter::Today => date == today,
            LedgerFilter::Weekly => date >= today - Duration::days(7) && date <= today,
            LedgerFilter::Monthly => date.year() == today.year() && date.month() == today.month(),
            LedgerFilter::Range { from, to } => date >= from && date <= to,
        }
    }
}

/// Totals over a set of transactions
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    pub total_income: f64,
    pub total_expenses: f64,
    pub balance: f64,
    pub count: usize,
}

pub fn filter_transactions<'a>(
    transactions: &'a [Transaction],
    filter: LedgerFilter,
    today: NaiveDate,
) -> Vec<&'a Transaction> {
    transactions
        .iter()
        .filter(|t| filter.matches(t.date, today))
        .collect()
}

pub fn summarize<'a, I>(transactions: I) -> LedgerSummary
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut summary = LedgerSummary::default();
    for transaction in transactions {
        match transaction.kind {
            TransactionType::Income => summary.total_income += transaction.amount,
            TransactionType::Expense => summary.total_expenses += transaction.amount,
        }
        summary.count += 1;
    }
    summary.balance = summary.total_income - summary.total_expenses;
    summary
}
