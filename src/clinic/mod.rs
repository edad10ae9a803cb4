//! Clinic operations
//!
//! `ClinicService` implements every operation the REST API exposes, one
//! resource per submodule:
//! - patients and their visits
//! - symptom categories and history taxonomies
//! - doctors
//! - the income/expense ledger
//! - patient images on the external host

pub mod accounting;
pub mod doctors;
pub mod images;
pub mod ledger;
pub mod patients;
pub mod taxonomy;

use std::sync::Arc;

use crate::imagehost::ImageHost;
use crate::storage::StorageEngine;

pub use ledger::{LedgerFilter, LedgerQuery, LedgerSummary};
pub use patients::{next_serial, SERIAL_SEED};

pub struct ClinicService {
    storage: Arc<StorageEngine>,
    images: Arc<dyn ImageHost>,
}

impl ClinicService {
    pub fn new(storage: Arc<StorageEngine>, images: Arc<dyn ImageHost>) -> Self {
        ClinicService { storage, images }
    }

    pub fn storage(&self) -> &StorageEngine {
        &self.storage
    }
}
