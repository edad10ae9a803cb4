use chrono::{Local, NaiveDate};
use tracing::info;

use super::ledger::{filter_transactions, summarize, LedgerFilter, LedgerSummary};
use super::ClinicService;
use crate::error::{ClinicError, Result};
use crate::models::{new_id, Transaction, TransactionRequest};

/// The ledger follows the clinic's local calendar
fn today() -> NaiveDate {
    Local::now().date_naive()
}

impl ClinicService {
    /// Transactions matching `filter`, newest date first
    pub fn list_transactions(&self, filter: LedgerFilter) -> Result<Vec<Transaction>> {
        self.list_transactions_on(filter, today())
    }

    pub fn list_transactions_on(&self, filter: LedgerFilter, today: NaiveDate) -> Result<Vec<Transaction>> {
        let mut selected = self.storage.transactions.view(|all| {
            filter_transactions(all, filter, today)
                .into_iter()
                .cloned()
                .collect::<Vec<_>>()
        })?;
        // Stable, so same-day entries keep insertion order
        selected.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(selected)
    }

    pub fn ledger_summary(&self, filter: LedgerFilter) -> Result<LedgerSummary> {
        let today = today();
        Ok(self
            .storage
            .transactions
            .view(|all| summarize(filter_transactions(all, filter, today)))?)
    }

    pub fn create_transaction(&self, request: TransactionRequest) -> Result<Transaction> {
        let transaction = request.into_transaction(new_id())?;
        let transaction = self.storage.transactions.insert(transaction)?;
        info!(id = %transaction.id, kind = ?transaction.kind, amount = transaction.amount, "transaction recorded");
        Ok(transaction)
    }

    pub fn delete_transaction(&self, id: &str) -> Result<Transaction> {
        let removed = self
            .storage
            .transactions
            .remove(id)?
            .ok_or_else(|| ClinicError::not_found("Transaction"))?;
        info!(id, "transaction deleted");
        Ok(removed)
    }
}
