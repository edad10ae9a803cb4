use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::persistence::{CollectionFiles, PersistenceManager};
use super::{Document, StorageError};

/// One logged mutation
#[derive(Debug, Deserialize)]
#[serde(tag = "op", content = "doc", rename_all = "lowercase")]
enum WalEntry<T> {
    Put(T),
    Delete(String),
}

/// Borrowing twin of `WalEntry`, written on the hot path
#[derive(Serialize)]
#[serde(tag = "op", content = "doc", rename_all = "lowercase")]
enum WalEntryRef<'a, T> {
    Put(&'a T),
    Delete(&'a str),
}

/// An ordered set of documents of one kind.
///
/// Documents live in memory in insertion order. When backed by files, every
/// mutation is appended to the WAL before it becomes visible, and a snapshot
/// replaces the WAL every `snapshot_every` mutations.
#[derive(Debug)]
pub struct Collection<T: Document> {
    name: &'static str,
    docs: RwLock<Vec<T>>,
    files: Option<CollectionFiles>,
    pending: AtomicUsize,
    snapshot_every: usize,
}

impl<T: Document> Collection<T> {
    pub fn in_memory(name: &'static str) -> Self {
        Collection {
            name,
            docs: RwLock::new(Vec::new()),
            files: None,
            pending: AtomicUsize::new(0),
            snapshot_every: usize::MAX,
        }
    }

    /// Load the snapshot and replay the WAL on top of it
    pub fn open(
        name: &'static str,
        persistence: &PersistenceManager,
        snapshot_every: usize,
    ) -> Result<Self, StorageError> {
        let files = persistence.open_collection(name)?;
        let mut docs: Vec<T> = files.load_snapshot()?;
        let snapshot_len = docs.len();

        let entries: Vec<WalEntry<T>> = files.wal().replay()?;
        let replayed = entries.len();
        for entry in entries {
            match entry {
                WalEntry::Put(doc) => put(&mut docs, doc),
                WalEntry::Delete(id) => docs.retain(|d| d.id() != id),
            }
        }

        info!(
            collection = name,
            snapshot = snapshot_len,
            replayed,
            documents = docs.len(),
            "collection recovered"
        );

        Ok(Collection {
            name,
            docs: RwLock::new(docs),
            files: Some(files),
            pending: AtomicUsize::new(replayed),
            snapshot_every: snapshot_every.max(1),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn all(&self) -> Result<Vec<T>, StorageError> {
        Ok(self.read()?.clone())
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.read()?.is_empty())
    }

    pub fn get(&self, id: &str) -> Result<Option<T>, StorageError> {
        Ok(self.read()?.iter().find(|d| d.id() == id).cloned())
    }

    pub fn filter<P>(&self, predicate: P) -> Result<Vec<T>, StorageError>
    where
        P: Fn(&T) -> bool,
    {
        Ok(self.read()?.iter().filter(|d| predicate(d)).cloned().collect())
    }

    /// Run a read-only computation over the current documents
    pub fn view<R, F>(&self, f: F) -> Result<R, StorageError>
    where
        F: FnOnce(&[T]) -> R,
    {
        Ok(f(&self.read()?))
    }

    pub fn insert(&self, doc: T) -> Result<T, StorageError> {
        self.insert_with(|_| Ok::<_, StorageError>(doc))
    }

    /// Build and insert a document while holding the write lock, so the
    /// builder can check the existing documents without racing other writers.
    pub fn insert_with<E, F>(&self, build: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&[T]) -> Result<T, E>,
    {
        let mut docs = self.write()?;
        let doc = build(&docs)?;

        self.log(&WalEntryRef::Put(&doc))?;
        docs.push(doc.clone());
        debug!(collection = self.name, id = doc.id(), "inserted");

        self.committed(&docs);
        Ok(doc)
    }

    /// Return the first document matching `matches`, or insert the one
    /// produced by `build`. The flag is true when a document was inserted.
    pub fn find_or_insert_with<E, M, F>(&self, matches: M, build: F) -> Result<(T, bool), E>
    where
        E: From<StorageError>,
        M: Fn(&T) -> bool,
        F: FnOnce() -> Result<T, E>,
    {
        let mut docs = self.write()?;
        if let Some(existing) = docs.iter().find(|d| matches(d)) {
            return Ok((existing.clone(), false));
        }

        let doc = build()?;
        self.log(&WalEntryRef::Put(&doc))?;
        docs.push(doc.clone());
        debug!(collection = self.name, id = doc.id(), "inserted");

        self.committed(&docs);
        Ok((doc, true))
    }

    pub fn update<E, F>(&self, id: &str, apply: F) -> Result<Option<T>, E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut T) -> Result<(), E>,
    {
        self.update_with(id, |doc, _| apply(doc))
    }

    /// Modify one document in place. `apply` works on a copy and also sees
    /// every stored document (the target included, unmodified); the copy
    /// replaces the stored one only if `apply` succeeds and the WAL append
    /// goes through. Returns `None` when no document has this id.
    pub fn update_with<E, F>(&self, id: &str, apply: F) -> Result<Option<T>, E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut T, &[T]) -> Result<(), E>,
    {
        let mut docs = self.write()?;
        let Some(index) = docs.iter().position(|d| d.id() == id) else {
            return Ok(None);
        };

        let mut updated = docs[index].clone();
        apply(&mut updated, &docs)?;

        self.log(&WalEntryRef::Put(&updated))?;
        docs[index] = updated.clone();
        debug!(collection = self.name, id, "updated");

        self.committed(&docs);
        Ok(Some(updated))
    }

    pub fn remove(&self, id: &str) -> Result<Option<T>, StorageError> {
        let mut docs = self.write()?;
        let Some(index) = docs.iter().position(|d| d.id() == id) else {
            return Ok(None);
        };

        self.log(&WalEntryRef::<T>::Delete(id))?;
        let removed = docs.remove(index);
        debug!(collection = self.name, id, "removed");

        self.committed(&docs);
        Ok(Some(removed))
    }

    /// Write a snapshot and clear the WAL
    pub fn flush(&self) -> Result<(), StorageError> {
        let docs = self.write()?;
        self.snapshot(&docs)
    }

    fn snapshot(&self, docs: &[T]) -> Result<(), StorageError> {
        if let Some(files) = &self.files {
            files.save_snapshot(docs)?;
            files.wal().truncate()?;
            self.pending.store(0, Ordering::SeqCst);
            debug!(collection = self.name, documents = docs.len(), "snapshot written");
        }
        Ok(())
    }

    fn log(&self, entry: &WalEntryRef<'_, T>) -> Result<(), StorageError> {
        match &self.files {
            Some(files) => files.wal().append(entry),
            None => Ok(()),
        }
    }

    /// Count a logged mutation; past the threshold, fold the WAL into a
    /// snapshot. A failed snapshot leaves the WAL in place.
    fn committed(&self, docs: &[T]) {
        if self.files.is_none() {
            return;
        }
        let pending = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        if pending >= self.snapshot_every {
            if let Err(e) = self.snapshot(docs) {
                warn!(collection = self.name, error = %e, "snapshot failed, keeping WAL");
            }
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<T>>, StorageError> {
        self.docs.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<T>>, StorageError> {
        self.docs.write().map_err(|_| StorageError::LockPoisoned)
    }
}

fn put<T: Document>(docs: &mut Vec<T>, doc: T) {
    match docs.iter().position(|d| d.id() == doc.id()) {
        Some(index) => docs[index] = doc,
        None => docs.push(doc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        text: String,
    }

    impl Document for Note {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn note(id: &str, text: &str) -> Note {
        Note {
            id: id.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_basic_operations() {
        let notes = Collection::in_memory("notes");
        notes.insert(note("a", "first")).unwrap();
        notes.insert(note("b", "second")).unwrap();

        assert_eq!(notes.len().unwrap(), 2);
        assert_eq!(notes.get("b").unwrap(), Some(note("b", "second")));

        let updated = notes
            .update("a", |n: &mut Note| {
                n.text = "edited".to_string();
                Ok::<_, StorageError>(())
            })
            .unwrap();
        assert_eq!(updated, Some(note("a", "edited")));

        assert_eq!(notes.remove("b").unwrap(), Some(note("b", "second")));
        assert_eq!(notes.all().unwrap(), vec![note("a", "edited")]);
    }

    #[test]
    fn test_failed_update_leaves_document_untouched() {
        let notes = Collection::in_memory("notes");
        notes.insert(note("a", "first")).unwrap();

        let result = notes.update("a", |n: &mut Note| {
            n.text = "half done".to_string();
            Err(StorageError::LockPoisoned)
        });

        assert!(result.is_err());
        assert_eq!(notes.get("a").unwrap(), Some(note("a", "first")));
    }

    #[test]
    fn test_find_or_insert_is_idempotent() {
        let notes = Collection::in_memory("notes");

        let (first, created) = notes
            .find_or_insert_with(|n: &Note| n.text == "same", || Ok::<_, StorageError>(note("a", "same")))
            .unwrap();
        assert!(created);

        let (second, created) = notes
            .find_or_insert_with(|n: &Note| n.text == "same", || Ok::<_, StorageError>(note("b", "same")))
            .unwrap();
        assert!(!created);
        assert_eq!(first, second);
        assert_eq!(notes.len().unwrap(), 1);
    }

    #[test]
    fn test_recovery_from_wal_and_snapshot() {
        let dir = tempfile::tempdir().unwrap();

        {
            let persistence = PersistenceManager::new(dir.path()).unwrap();
            let notes: Collection<Note> = Collection::open("notes", &persistence, 3).unwrap();
            notes.insert(note("a", "first")).unwrap();
            notes.insert(note("b", "second")).unwrap();
            // The third mutation triggers a snapshot
            notes.remove("a").unwrap();
            // These two only reach the WAL
            notes.insert(note("c", "third")).unwrap();
            notes
                .update("c", |n: &mut Note| {
                    n.text = "third, edited".to_string();
                    Ok::<_, StorageError>(())
                })
                .unwrap();
        }

        let persistence = PersistenceManager::new(dir.path()).unwrap();
        let notes: Collection<Note> = Collection::open("notes", &persistence, 3).unwrap();
        assert_eq!(
            notes.all().unwrap(),
            vec![note("b", "second"), note("c", "third, edited")]
        );
    }

    #[test]
    fn test_write_after_torn_recovery_survives_restart() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        {
            let persistence = PersistenceManager::new(dir.path()).unwrap();
            let notes: Collection<Note> = Collection::open("notes", &persistence, 100).unwrap();
            notes.insert(note("a", "first")).unwrap();
        }

        // Crash mid-append: a header promising 100 bytes, then 5
        let mut raw = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("wal").join("notes.wal"))
            .unwrap();
        raw.write_all(&100u32.to_be_bytes()).unwrap();
        raw.write_all(b"{\"op\"").unwrap();
        drop(raw);

        {
            let persistence = PersistenceManager::new(dir.path()).unwrap();
            let notes: Collection<Note> = Collection::open("notes", &persistence, 100).unwrap();
            assert_eq!(notes.len().unwrap(), 1);
            notes.insert(note("b", "second")).unwrap();
        }

        let persistence = PersistenceManager::new(dir.path()).unwrap();
        let notes: Collection<Note> = Collection::open("notes", &persistence, 100).unwrap();
        assert_eq!(notes.all().unwrap(), vec![note("a", "first"), note("b", "second")]);
    }

    #[test]
    fn test_flush_writes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = PersistenceManager::new(dir.path()).unwrap();

        let notes: Collection<Note> = Collection::open("notes", &persistence, 100).unwrap();
        notes.insert(note("a", "first")).unwrap();
        notes.flush().unwrap();

        let files = persistence.open_collection("notes").unwrap();
        let snapshot: Vec<Note> = files.load_snapshot().unwrap();
        let wal: Vec<serde_json::Value> = files.wal().replay().unwrap();
        assert_eq!(snapshot, vec![note("a", "first")]);
        assert!(wal.is_empty());
    }
}
