//! Embedded document store
//!
//! Handles the fundamental storage operations including:
//! - One in-memory collection per resource
//! - Write-ahead logging of every mutation
//! - Periodic JSON snapshots and recovery on startup

mod collection;
mod persistence;

pub use collection::Collection;
pub use persistence::{CollectionFiles, PersistenceManager, WriteAheadLog};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::models::{Category, Doctor, HistoryEntry, ImageRecord, Patient, Transaction};

/// A record stored in a `Collection`
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Collection lock poisoned")]
    LockPoisoned,
}

/// Every collection the clinic keeps
#[derive(Debug)]
pub struct StorageEngine {
    pub patients: Collection<Patient>,
    pub categories: Collection<Category>,
    pub history: Collection<HistoryEntry>,
    pub doctors: Collection<Doctor>,
    pub transactions: Collection<Transaction>,
    pub images: Collection<ImageRecord>,
}

impl StorageEngine {
    pub fn new(config: &Config) -> Result<Self, StorageError> {
        if config.storage.memory_only {
            info!("storage running in memory only");
            return Ok(Self::in_memory());
        }

        let persistence = PersistenceManager::new(&config.storage.path)?;
        let every = config.storage.snapshot_every;
        info!(path = %persistence.base_path().display(), "opening storage");

        Ok(StorageEngine {
            patients: Collection::open("patients", &persistence, every)?,
            categories: Collection::open("categories", &persistence, every)?,
            history: Collection::open("history", &persistence, every)?,
            doctors: Collection::open("doctors", &persistence, every)?,
            transactions: Collection::open("transactions", &persistence, every)?,
            images: Collection::open("images", &persistence, every)?,
        })
    }

    pub fn in_memory() -> Self {
        StorageEngine {
            patients: Collection::in_memory("patients"),
            categories: Collection::in_memory("categories"),
            history: Collection::in_memory("history"),
            doctors: Collection::in_memory("doctors"),
            transactions: Collection::in_memory("transactions"),
            images: Collection::in_memory("images"),
        }
    }

    /// Snapshot every collection and clear the WALs
    pub fn flush_all(&self) -> Result<(), StorageError> {
        self.patients.flush()?;
        self.categories.flush()?;
        self.history.flush()?;
        self.doctors.flush()?;
        self.transactions.flush()?;
        self.images.flush()?;
        Ok(())
    }
}
