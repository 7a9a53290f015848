use std::path::Path;
use std::sync::Mutex;

use rocksdb::{Direction, IteratorMode, Options, ReadOptions, WriteOptions, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::contracts::{
    AccountingContact, Contact, LockResultExt, Party, RecordStore, Slip, SlipKind,
    SlipNumberConfig, StorageError,
};

/// Key prefix for counter rows
const COUNTER_PREFIX: &str = "cfg";
/// Key prefix for slips
const SLIP_PREFIX: &str = "slip";
/// Key prefix for clients and suppliers
const PARTY_PREFIX: &str = "party";
/// Key prefix for client contacts
const CONTACT_PREFIX: &str = "contact";
/// Key prefix for accounting contacts
const ACCOUNTING_PREFIX: &str = "acct";

/// How hard a write waits for the disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Durability {
    /// WAL write only; survives a process crash, not an OS crash.
    Buffered,
    /// WAL fsynced before the write returns.
    Synced,
}

/// RocksDB-backed record store. Rows are stored as JSON documents.
pub struct RocksDbStore {
    db: DB,
    /// Serializes every counter write so compare-and-swap is atomic.
    counter_lock: Mutex<()>,
    /// Serializes slip existence checks against inserts/updates.
    slip_lock: Mutex<()>,
}

impl RocksDbStore {
    /// Opens or creates a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        // Small working set: a modest write buffer is plenty
        opts.set_write_buffer_size(8 * 1024 * 1024);
        opts.set_wal_dir(path.join("wal"));

        let db = DB::open(&opts, path).map_err(|e| StorageError::RocksDb(e.to_string()))?;
        tracing::debug!(path = %path.display(), "Opened RocksDB record store");

        Ok(Self {
            db,
            counter_lock: Mutex::new(()),
            slip_lock: Mutex::new(()),
        })
    }

    fn counter_key(kind: SlipKind) -> String {
        format!("{}:{}", COUNTER_PREFIX, kind)
    }

    fn slip_key(kind: SlipKind, id: Uuid) -> String {
        format!("{}:{}:{}", SLIP_PREFIX, kind, id)
    }

    fn party_key(id: &str) -> String {
        format!("{}:{}", PARTY_PREFIX, id)
    }

    fn contact_key(party_id: &str, id: Uuid) -> String {
        format!("{}:{}:{}", CONTACT_PREFIX, party_id, id)
    }

    fn accounting_key(party_id: &str) -> String {
        format!("{}:{}", ACCOUNTING_PREFIX, party_id)
    }

    /// Counter rows are written `Synced` so an issued number is never handed
    /// out again after an OS crash. Everything else is `Buffered`.
    fn durability(key: &str) -> Durability {
        match key.split_once(':') {
            Some((COUNTER_PREFIX, _)) => Durability::Synced,
            _ => Durability::Buffered,
        }
    }

    fn write_options(durability: Durability) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(durability == Durability::Synced);
        opts
    }

    fn read_options_with_bound(upper_bound: &[u8]) -> ReadOptions {
        let mut opts = ReadOptions::default();
        opts.fill_cache(true);
        opts.set_iterate_upper_bound(upper_bound.to_vec());
        opts
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.db.get(key.as_bytes()) {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::RocksDb(e.to_string())),
        }
    }

    fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.db
            .put_opt(
                key.as_bytes(),
                bytes,
                &Self::write_options(Self::durability(key)),
            )
            .map_err(|e| StorageError::RocksDb(e.to_string()))
    }

    fn put_counter_row(&self, config: &SlipNumberConfig) -> Result<(), StorageError> {
        self.put_json(&Self::counter_key(config.kind), config)
    }

    /// Decodes every value whose key starts with `prefix`.
    ///
    /// `prefix` must end with ':'; the scan stops at the same prefix ending
    /// in ';', which sorts right after it.
    fn scan_json<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>, StorageError> {
        let upper = format!("{};", prefix.trim_end_matches(':'));
        let iter = self.db.iterator_opt(
            IteratorMode::From(prefix.as_bytes(), Direction::Forward),
            Self::read_options_with_bound(upper.as_bytes()),
        );

        let mut values = Vec::new();
        for item in iter {
            let (_, value) = item.map_err(|e| StorageError::RocksDb(e.to_string()))?;
            values.push(
                serde_json::from_slice(&value)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
            );
        }
        Ok(values)
    }
}

impl RecordStore for RocksDbStore {
    fn get_counter(&self, kind: SlipKind) -> Result<Option<SlipNumberConfig>, StorageError> {
        self.get_json(&Self::counter_key(kind))
    }

    fn insert_counter_if_absent(&self, config: &SlipNumberConfig) -> Result<bool, StorageError> {
        let _guard = self.counter_lock.lock().map_lock_err()?;
        let key = Self::counter_key(config.kind);
        if self.get_json::<SlipNumberConfig>(&key)?.is_some() {
            return Ok(false);
        }
        self.put_counter_row(config)?;
        Ok(true)
    }

    fn compare_and_swap_counter(
        &self,
        expected: &SlipNumberConfig,
        new: &SlipNumberConfig,
    ) -> Result<bool, StorageError> {
        if expected.kind != new.kind {
            return Err(StorageError::InvalidInput(format!(
                "counter swap across kinds: {} -> {}",
                expected.kind, new.kind
            )));
        }
        let _guard = self.counter_lock.lock().map_lock_err()?;
        let stored = self.get_json::<SlipNumberConfig>(&Self::counter_key(expected.kind))?;
        if stored.as_ref() != Some(expected) {
            return Ok(false);
        }
        self.put_counter_row(new)?;
        Ok(true)
    }

    fn put_counter(&self, config: &SlipNumberConfig) -> Result<(), StorageError> {
        let _guard = self.counter_lock.lock().map_lock_err()?;
        self.put_counter_row(config)
    }

    fn insert_slip(&self, slip: &Slip) -> Result<(), StorageError> {
        let _guard = self.slip_lock.lock().map_lock_err()?;
        let key = Self::slip_key(slip.kind, slip.id);
        if self.get_json::<Slip>(&key)?.is_some() {
            return Err(StorageError::Duplicate(slip.id.to_string()));
        }
        self.put_json(&key, slip)
    }

    fn get_slip(&self, kind: SlipKind, id: Uuid) -> Result<Option<Slip>, StorageError> {
        self.get_json(&Self::slip_key(kind, id))
    }

    fn update_slip(&self, slip: &Slip) -> Result<(), StorageError> {
        let _guard = self.slip_lock.lock().map_lock_err()?;
        let key = Self::slip_key(slip.kind, slip.id);
        if self.get_json::<Slip>(&key)?.is_none() {
            return Err(StorageError::SlipNotFound {
                kind: slip.kind,
                id: slip.id.to_string(),
            });
        }
        self.put_json(&key, slip)
    }

    fn list_slips(&self, kind: SlipKind) -> Result<Vec<Slip>, StorageError> {
        self.scan_json(&format!("{}:{}:", SLIP_PREFIX, kind))
    }

    fn put_party(&self, party: &Party) -> Result<(), StorageError> {
        self.put_json(&Self::party_key(&party.id), party)
    }

    fn get_party(&self, id: &str) -> Result<Option<Party>, StorageError> {
        self.get_json(&Self::party_key(id))
    }

    fn list_parties(&self) -> Result<Vec<Party>, StorageError> {
        self.scan_json(&format!("{}:", PARTY_PREFIX))
    }

    fn put_contact(&self, contact: &Contact) -> Result<(), StorageError> {
        self.put_json(&Self::contact_key(&contact.party_id, contact.id), contact)
    }

    fn delete_contact(&self, party_id: &str, id: Uuid) -> Result<bool, StorageError> {
        let key = Self::contact_key(party_id, id);
        if self.get_json::<Contact>(&key)?.is_none() {
            return Ok(false);
        }
        self.db
            .delete_opt(key.as_bytes(), &Self::write_options(Self::durability(&key)))
            .map_err(|e| StorageError::RocksDb(e.to_string()))?;
        Ok(true)
    }

    fn list_contacts(&self, party_id: &str) -> Result<Vec<Contact>, StorageError> {
        // Party ids may contain ':', so the key prefix can over-match
        let contacts: Vec<Contact> =
            self.scan_json(&format!("{}:{}:", CONTACT_PREFIX, party_id))?;
        Ok(contacts
            .into_iter()
            .filter(|c| c.party_id == party_id)
            .collect())
    }

    fn put_accounting_contact(&self, contact: &AccountingContact) -> Result<(), StorageError> {
        self.put_json(&Self::accounting_key(&contact.party_id), contact)
    }

    fn get_accounting_contact(
        &self,
        party_id: &str,
    ) -> Result<Option<AccountingContact>, StorageError> {
        self.get_json(&Self::accounting_key(party_id))
    }
}
