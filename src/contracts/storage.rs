use uuid::Uuid;

use crate::contracts::error::StorageError;
use crate::contracts::{AccountingContact, Contact, Party, Slip, SlipKind, SlipNumberConfig};

/// Durable table store behind the allocator and the slip service.
///
/// # Invariants
/// - Counter rows are keyed by kind; at most one row per kind
/// - `compare_and_swap_counter` is atomic with respect to every other counter write
/// - Slips are keyed by (kind, id); transport and freight never share a table
/// - Contacts are keyed by (party id, contact id); a party has at most one
///   accounting contact
pub trait RecordStore: Send + Sync {
    /// Point lookup of the counter row for `kind`.
    fn get_counter(&self, kind: SlipKind) -> Result<Option<SlipNumberConfig>, StorageError>;

    /// Inserts `config` unless a row for its kind already exists.
    /// Returns true if this call created the row.
    fn insert_counter_if_absent(&self, config: &SlipNumberConfig) -> Result<bool, StorageError>;

    /// Replaces the counter row with `new` only if the stored row (prefix and
    /// number) still equals `expected`. Returns false on a lost race or a
    /// missing row.
    fn compare_and_swap_counter(
        &self,
        expected: &SlipNumberConfig,
        new: &SlipNumberConfig,
    ) -> Result<bool, StorageError>;

    /// Unconditionally writes the counter row. Seeding and restores only;
    /// the allocator goes through `compare_and_swap_counter`.
    fn put_counter(&self, config: &SlipNumberConfig) -> Result<(), StorageError>;

    /// Inserts a new slip. Fails with `Duplicate` if the id is taken.
    fn insert_slip(&self, slip: &Slip) -> Result<(), StorageError>;

    /// Fetches a slip by kind and id.
    fn get_slip(&self, kind: SlipKind, id: Uuid) -> Result<Option<Slip>, StorageError>;

    /// Replaces an existing slip. Fails with `SlipNotFound` if absent.
    fn update_slip(&self, slip: &Slip) -> Result<(), StorageError>;

    /// Lists every slip of a kind, in no particular order.
    fn list_slips(&self, kind: SlipKind) -> Result<Vec<Slip>, StorageError>;

    /// Inserts or replaces a client/supplier.
    fn put_party(&self, party: &Party) -> Result<(), StorageError>;

    /// Fetches a client/supplier by id.
    fn get_party(&self, id: &str) -> Result<Option<Party>, StorageError>;

    /// Lists every client/supplier, in no particular order.
    fn list_parties(&self) -> Result<Vec<Party>, StorageError>;

    /// Inserts or replaces a contact.
    fn put_contact(&self, contact: &Contact) -> Result<(), StorageError>;

    /// Removes a contact. Returns false if it did not exist.
    fn delete_contact(&self, party_id: &str, id: Uuid) -> Result<bool, StorageError>;

    /// Lists the contacts of one party.
    fn list_contacts(&self, party_id: &str) -> Result<Vec<Contact>, StorageError>;

    /// Inserts or replaces the accounting contact of `contact.party_id`.
    fn put_accounting_contact(&self, contact: &AccountingContact) -> Result<(), StorageError>;

    fn get_accounting_contact(
        &self,
        party_id: &str,
    ) -> Result<Option<AccountingContact>, StorageError>;
}

impl<S: RecordStore + ?Sized> RecordStore for std::sync::Arc<S> {
    fn get_counter(&self, kind: SlipKind) -> Result<Option<SlipNumberConfig>, StorageError> {
        (**self).get_counter(kind)
    }

    fn insert_counter_if_absent(&self, config: &SlipNumberConfig) -> Result<bool, StorageError> {
        (**self).insert_counter_if_absent(config)
    }

    fn compare_and_swap_counter(
        &self,
        expected: &SlipNumberConfig,
        new: &SlipNumberConfig,
    ) -> Result<bool, StorageError> {
        (**self).compare_and_swap_counter(expected, new)
    }

    fn put_counter(&self, config: &SlipNumberConfig) -> Result<(), StorageError> {
        (**self).put_counter(config)
    }

    fn insert_slip(&self, slip: &Slip) -> Result<(), StorageError> {
        (**self).insert_slip(slip)
    }

    fn get_slip(&self, kind: SlipKind, id: Uuid) -> Result<Option<Slip>, StorageError> {
        (**self).get_slip(kind, id)
    }

    fn update_slip(&self, slip: &Slip) -> Result<(), StorageError> {
        (**self).update_slip(slip)
    }

    fn list_slips(&self, kind: SlipKind) -> Result<Vec<Slip>, StorageError> {
        (**self).list_slips(kind)
    }

    fn put_party(&self, party: &Party) -> Result<(), StorageError> {
        (**self).put_party(party)
    }

    fn get_party(&self, id: &str) -> Result<Option<Party>, StorageError> {
        (**self).get_party(id)
    }

    fn list_parties(&self) -> Result<Vec<Party>, StorageError> {
        (**self).list_parties()
    }

    fn put_contact(&self, contact: &Contact) -> Result<(), StorageError> {
        (**self).put_contact(contact)
    }

    fn delete_contact(&self, party_id: &str, id: Uuid) -> Result<bool, StorageError> {
        (**self).delete_contact(party_id, id)
    }

    fn list_contacts(&self, party_id: &str) -> Result<Vec<Contact>, StorageError> {
        (**self).list_contacts(party_id)
    }

    fn put_accounting_contact(&self, contact: &AccountingContact) -> Result<(), StorageError> {
        (**self).put_accounting_contact(contact)
    }

    fn get_accounting_contact(
        &self,
        party_id: &str,
    ) -> Result<Option<AccountingContact>, StorageError> {
        (**self).get_accounting_contact(party_id)
    }
}
