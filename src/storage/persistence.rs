use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use super::StorageError;

/// Manages snapshot files and write-ahead logs for all collections
#[derive(Debug)]
pub struct PersistenceManager {
    base_path: PathBuf,
}

impl PersistenceManager {
    pub fn new(base_path: impl AsRef<Path>) -> io::Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        fs::create_dir_all(base_path.join("collections"))?;
        fs::create_dir_all(base_path.join("wal"))?;

        Ok(PersistenceManager { base_path })
    }

    /// Open the snapshot path and WAL for one named collection
    pub fn open_collection(&self, name: &str) -> Result<CollectionFiles, StorageError> {
        let snapshot_path = self
            .base_path
            .join("collections")
            .join(format!("{}.json", name));
        let wal = WriteAheadLog::new(self.base_path.join("wal"), name)?;

        Ok(CollectionFiles { snapshot_path, wal })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

/// On-disk state of a single collection
#[derive(Debug)]
pub struct CollectionFiles {
    snapshot_path: PathBuf,
    wal: WriteAheadLog,
}

impl CollectionFiles {
    /// Save a full snapshot of the collection
    pub fn save_snapshot<T: Serialize>(&self, docs: &[T]) -> Result<(), StorageError> {
        let serialized = serde_json::to_vec(docs)?;

        // Write to a temporary file first, then rename over the old snapshot
        let temp_path = self.snapshot_path.with_extension("tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(&serialized)?;
        file.sync_all()?;

        fs::rename(&temp_path, &self.snapshot_path)?;
        Ok(())
    }

    /// Load the last snapshot; a collection that was never saved is empty
    pub fn load_snapshot<T: DeserializeOwned>(&self) -> Result<Vec<T>, StorageError> {
        let mut file = match File::open(&self.snapshot_path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Ok(serde_json::from_slice(&buffer)?)
    }

    pub fn wal(&self) -> &WriteAheadLog {
        &self.wal
    }
}

/// Write-ahead log for crash recovery
#[derive(Debug)]
pub struct WriteAheadLog {
    log_path: PathBuf,
    log_file: Mutex<File>,
}

impl WriteAheadLog {
    pub fn new(wal_dir: impl AsRef<Path>, name: &str) -> io::Result<Self> {
        let wal_dir = wal_dir.as_ref();
        fs::create_dir_all(wal_dir)?;

        let log_path = wal_dir.join(format!("{}.wal", name));
        let log_file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&log_path)?;

        Ok(WriteAheadLog {
            log_path,
            log_file: Mutex::new(log_file),
        })
    }

    /// Append one entry to the WAL
    pub fn append<E: Serialize>(&self, entry: &E) -> Result<(), StorageError> {
        let serialized = serde_json::to_vec(entry)?;
        let entry_size = serialized.len() as u32;

        let mut log_file = self.log_file.lock().map_err(|_| StorageError::LockPoisoned)?;

        // 4-byte size header followed by the entry
        log_file.write_all(&entry_size.to_be_bytes())?;
        log_file.write_all(&serialized)?;
        log_file.sync_data()?;

        Ok(())
    }

    /// Replay the WAL from the start. A torn final record is cut off so
    /// later appends start on a record boundary.
    pub fn replay<E: DeserializeOwned>(&self) -> Result<Vec<E>, StorageError> {
        let mut log_file = self.log_file.lock().map_err(|_| StorageError::LockPoisoned)?;
        let file_len = log_file.metadata()?.len();
        log_file.seek(SeekFrom::Start(0))?;

        let mut entries = Vec::new();
        // End of the last complete record
        let mut valid_end: u64 = 0;

        while valid_end < file_len {
            let remaining = file_len - valid_end;
            if remaining < 4 {
                break;
            }

            let mut size_buf = [0u8; 4];
            log_file.read_exact(&mut size_buf)?;
            let entry_size = u32::from_be_bytes(size_buf) as u64;
            if entry_size > remaining - 4 {
                break;
            }

            let mut entry_data = vec![0u8; entry_size as usize];
            log_file.read_exact(&mut entry_data)?;
            entries.push(serde_json::from_slice(&entry_data)?);
            valid_end += 4 + entry_size;
        }

        if valid_end < file_len {
            // A crash mid-append leaves a torn tail
            warn!(
                wal = %self.log_path.display(),
                dropped_bytes = file_len - valid_end,
                "truncating torn WAL entry"
            );
            log_file.set_len(valid_end)?;
            log_file.sync_all()?;
        }

        Ok(entries)
    }

    /// Truncate the WAL once its entries are covered by a snapshot
    pub fn truncate(&self) -> Result<(), StorageError> {
        let mut log_file = self.log_file.lock().map_err(|_| StorageError::LockPoisoned)?;
        log_file.set_len(0)?;
        log_file.seek(SeekFrom::Start(0))?;
        log_file.sync_all()?;

        Ok(())
    }
}
