//! Durable store adapter over redb.
//!
//! All persistent state lives in a single redb table. Logical buckets are
//! encoded as key prefixes (path segments joined by a NUL separator), so a
//! prefix scan over a bucket yields keys in stable lexicographic byte order.
//! Transactions commit on success and abort on any error.

use std::path::Path;

use redb::{Database, ReadOnlyTable, ReadableTable, Table, TableDefinition};
use thiserror::Error;

const KV: TableDefinition<&[u8], &[u8]> = TableDefinition::new("kv");

/// Separator between bucket path segments and the final key.
const SEP: u8 = 0;

/// Errors reported by the durable store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Open(#[from] redb::DatabaseError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),
}

/// A nested namespace within the store, resolved to a key prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket(Vec<u8>);

impl Bucket {
    /// Resolve a bucket from path segments
    pub fn new<S: AsRef<str>>(segments: &[S]) -> Self {
        let mut prefix = Vec::new();
        for segment in segments {
            prefix.extend_from_slice(segment.as_ref().as_bytes());
            prefix.push(SEP);
        }
        Bucket(prefix)
    }

    fn prefix(&self) -> &[u8] {
        &self.0
    }

    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = self.0.clone();
        full.extend_from_slice(key);
        full
    }
}

/// Embedded transactional key-value store
pub struct Store {
    db: Database,
}

impl Store {
    /// Open (or create) the store at the given path
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Database::create(path)?;

        // Ensure the table exists so read transactions never fail on a
        // fresh database.
        let txn = db.begin_write()?;
        txn.open_table(KV)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Run a closure inside a read transaction
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&ReadView) -> Result<T, E>,
        E: From<StoreError>,
    {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| E::from(StoreError::from(e)))?;
        let table = txn
            .open_table(KV)
            .map_err(|e| E::from(StoreError::from(e)))?;
        f(&ReadView { table })
    }

    /// Run a closure inside a write transaction. The transaction commits
    /// when the closure succeeds and aborts when it returns an error, so
    /// callers never observe partial writes.
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut WriteView<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| E::from(StoreError::from(e)))?;

        let result = {
            let table = match txn.open_table(KV) {
                Ok(table) => table,
                Err(e) => return Err(E::from(StoreError::from(e))),
            };
            let mut view = WriteView { table };
            f(&mut view)
        };

        match result {
            Ok(value) => {
                txn.commit().map_err(|e| E::from(StoreError::from(e)))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = txn.abort() {
                    tracing::warn!(error = %abort_err, "failed to abort write transaction");
                }
                Err(err)
            }
        }
    }
}

/// Read-only view of the store within a transaction
pub struct ReadView {
    table: ReadOnlyTable<&'static [u8], &'static [u8]>,
}

impl ReadView {
    /// Get the value stored at `key` within `bucket`
    pub fn get(&self, bucket: &Bucket, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        get_in(&self.table, bucket, key)
    }

    /// All (key, value) pairs in `bucket`, in lexicographic key order
    pub fn scan(&self, bucket: &Bucket) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        scan_in(&self.table, bucket)
    }
}

/// Read-write view of the store within a transaction
pub struct WriteView<'txn> {
    table: Table<'txn, &'static [u8], &'static [u8]>,
}

impl WriteView<'_> {
    /// Get the value stored at `key` within `bucket`
    pub fn get(&self, bucket: &Bucket, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        get_in(&self.table, bucket, key)
    }

    /// All (key, value) pairs in `bucket`, in lexicographic key order
    pub fn scan(&self, bucket: &Bucket) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        scan_in(&self.table, bucket)
    }

    /// Store `value` at `key` within `bucket`, overwriting any prior value
    pub fn put(&mut self, bucket: &Bucket, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let full = bucket.full_key(key);
        self.table.insert(full.as_slice(), value)?;
        Ok(())
    }

    /// Remove `key` from `bucket`. Removing an absent key is a no-op.
    pub fn delete(&mut self, bucket: &Bucket, key: &[u8]) -> Result<(), StoreError> {
        let full = bucket.full_key(key);
        self.table.remove(full.as_slice())?;
        Ok(())
    }
}

fn get_in<T>(table: &T, bucket: &Bucket, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let full = bucket.full_key(key);
    let value = table.get(full.as_slice())?;
    Ok(value.map(|guard| guard.value().to_vec()))
}

fn scan_in<T>(table: &T, bucket: &Bucket) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let prefix = bucket.prefix();
    let end = prefix_end(prefix);

    let range = if end.is_empty() {
        table.range::<&[u8]>(prefix..)?
    } else {
        table.range::<&[u8]>(prefix..end.as_slice())?
    };

    let mut pairs = Vec::new();
    for entry in range {
        let (key, value) = entry?;
        pairs.push((key.value()[prefix.len()..].to_vec(), value.value().to_vec()));
    }
    Ok(pairs)
}

/// Smallest byte string greater than every key carrying `prefix`.
/// Empty result means the scan is unbounded above.
fn prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.last_mut() {
        if *last < u8::MAX {
            *last += 1;
            return end;
        }
        end.pop();
    }
    end
}
