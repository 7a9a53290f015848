use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::contracts::{
    AccountingContact, Contact, LockResultExt, Party, RecordStore, Slip, SlipKind,
    SlipNumberConfig, StorageError,
};

/// In-process record store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    counters: RwLock<HashMap<SlipKind, SlipNumberConfig>>,
    slips: RwLock<HashMap<(SlipKind, Uuid), Slip>>,
    parties: RwLock<HashMap<String, Party>>,
    contacts: RwLock<HashMap<(String, Uuid), Contact>>,
    accounting_contacts: RwLock<HashMap<String, AccountingContact>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn get_counter(&self, kind: SlipKind) -> Result<Option<SlipNumberConfig>, StorageError> {
        Ok(self.counters.read().map_lock_err()?.get(&kind).cloned())
    }

    fn insert_counter_if_absent(&self, config: &SlipNumberConfig) -> Result<bool, StorageError> {
        let mut counters = self.counters.write().map_lock_err()?;
        if counters.contains_key(&config.kind) {
            return Ok(false);
        }
        counters.insert(config.kind, config.clone());
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
        let mut counters = self.counters.write().map_lock_err()?;
        match counters.get_mut(&expected.kind) {
            Some(row) if *row == *expected => {
                *row = new.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn put_counter(&self, config: &SlipNumberConfig) -> Result<(), StorageError> {
        self.counters
            .write()
            .map_lock_err()?
            .insert(config.kind, config.clone());
        Ok(())
    }

    fn insert_slip(&self, slip: &Slip) -> Result<(), StorageError> {
        let mut slips = self.slips.write().map_lock_err()?;
        let key = (slip.kind, slip.id);
        if slips.contains_key(&key) {
            return Err(StorageError::Duplicate(slip.id.to_string()));
        }
        slips.insert(key, slip.clone());
        Ok(())
    }

    fn get_slip(&self, kind: SlipKind, id: Uuid) -> Result<Option<Slip>, StorageError> {
        Ok(self.slips.read().map_lock_err()?.get(&(kind, id)).cloned())
    }

    fn update_slip(&self, slip: &Slip) -> Result<(), StorageError> {
        let mut slips = self.slips.write().map_lock_err()?;
        match slips.get_mut(&(slip.kind, slip.id)) {
            Some(existing) => {
                *existing = slip.clone();
                Ok(())
            }
            None => Err(StorageError::SlipNotFound {
                kind: slip.kind,
                id: slip.id.to_string(),
            }),
        }
    }

    fn list_slips(&self, kind: SlipKind) -> Result<Vec<Slip>, StorageError> {
        Ok(self
            .slips
            .read()
            .map_lock_err()?
            .values()
            .filter(|s| s.kind == kind)
            .cloned()
            .collect())
    }

    fn put_party(&self, party: &Party) -> Result<(), StorageError> {
        self.parties
            .write()
            .map_lock_err()?
            .insert(party.id.clone(), party.clone());
        Ok(())
    }

    fn get_party(&self, id: &str) -> Result<Option<Party>, StorageError> {
        Ok(self.parties.read().map_lock_err()?.get(id).cloned())
    }

    fn list_parties(&self) -> Result<Vec<Party>, StorageError> {
        Ok(self.parties.read().map_lock_err()?.values().cloned().collect())
    }

    fn put_contact(&self, contact: &Contact) -> Result<(), StorageError> {
        self.contacts
            .write()
            .map_lock_err()?
            .insert((contact.party_id.clone(), contact.id), contact.clone());
        Ok(())
    }

    fn delete_contact(&self, party_id: &str, id: Uuid) -> Result<bool, StorageError> {
        Ok(self
            .contacts
            .write()
            .map_lock_err()?
            .remove(&(party_id.to_string(), id))
            .is_some())
    }

    fn list_contacts(&self, party_id: &str) -> Result<Vec<Contact>, StorageError> {
        Ok(self
            .contacts
            .read()
            .map_lock_err()?
            .values()
            .filter(|c| c.party_id == party_id)
            .cloned()
            .collect())
    }

    fn put_accounting_contact(&self, contact: &AccountingContact) -> Result<(), StorageError> {
        self.accounting_contacts
            .write()
            .map_lock_err()?
            .insert(contact.party_id.clone(), contact.clone());
        Ok(())
    }

    fn get_accounting_contact(
        &self,
        party_id: &str,
    ) -> Result<Option<AccountingContact>, StorageError> {
        Ok(self
            .accounting_contacts
            .read()
            .map_lock_err()?
            .get(party_id)
            .cloned())
    }
}
