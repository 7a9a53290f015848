use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::contracts::{
    AccountingContact, ActivitySummary, BordereauError, Contact, ContactDetails, Party,
    RecordStore, Slip, SlipFields, SlipKind, SlipNumberAllocator, SlipStatus, SlipUpdate,
    StorageError,
};

/// Contacts of one client, as shown on its contact sheet.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PartyContacts {
    pub party: Party,
    pub contacts: Vec<Contact>,
    pub accounting_contact: Option<AccountingContact>,
}

/// Slip lifecycle on top of a record store and a number allocator.
pub struct SlipService<S: RecordStore, A: SlipNumberAllocator> {
    store: S,
    allocator: Arc<A>,
}

impl<S: RecordStore, A: SlipNumberAllocator> SlipService<S, A> {
    pub fn new(store: S, allocator: Arc<A>) -> Self {
        Self { store, allocator }
    }

    pub fn allocator(&self) -> &Arc<A> {
        &self.allocator
    }

    /// Creates a slip with a freshly allocated number.
    ///
    /// Nothing is written when allocation fails. When the insert fails after a
    /// successful allocation the number stays consumed and shows up as a gap.
    pub fn create(&self, kind: SlipKind, mut fields: SlipFields) -> Result<Slip, BordereauError> {
        let number = self.allocator.allocate(kind)?;

        if kind == SlipKind::Freight {
            fields.recompute_margin();
        }
        let now = Utc::now();
        let slip = Slip {
            id: Uuid::new_v4(),
            kind,
            number,
            status: SlipStatus::Pending,
            fields,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.store.insert_slip(&slip) {
            tracing::warn!(
                kind = %kind,
                number = %slip.number,
                error = %e,
                "Slip insert failed; number is consumed"
            );
            return Err(e.into());
        }

        tracing::info!(kind = %kind, id = %slip.id, number = %slip.number, "Created slip");
        Ok(slip)
    }

    pub fn get(&self, kind: SlipKind, id: Uuid) -> Result<Slip, StorageError> {
        self.store
            .get_slip(kind, id)?
            .ok_or_else(|| StorageError::SlipNotFound {
                kind,
                id: id.to_string(),
            })
    }

    /// Applies a partial update. The slip number is never touched.
    pub fn update(&self, kind: SlipKind, id: Uuid, update: SlipUpdate) -> Result<Slip, StorageError> {
        let mut slip = self.get(kind, id)?;
        update.apply(&mut slip);
        slip.updated_at = Utc::now();
        self.store.update_slip(&slip)?;
        tracing::debug!(kind = %kind, id = %id, "Updated slip");
        Ok(slip)
    }

    pub fn set_status(&self, kind: SlipKind, id: Uuid, status: SlipStatus) -> Result<Slip, StorageError> {
        let mut slip = self.get(kind, id)?;
        slip.status = status;
        slip.updated_at = Utc::now();
        self.store.update_slip(&slip)?;
        tracing::info!(kind = %kind, id = %id, status = ?status, "Slip status changed");
        Ok(slip)
    }

    /// Lists slips newest first, keeping those whose loading date falls in
    /// `[start, end]`. Slips without a loading date only match an open range.
    pub fn list(
        &self,
        kind: SlipKind,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Slip>, StorageError> {
        let mut slips: Vec<Slip> = self
            .store
            .list_slips(kind)?
            .into_iter()
            .filter(|s| {
                let date = s.fields.loading_date;
                start.is_none_or(|from| date.is_some_and(|d| d >= from))
                    && end.is_none_or(|to| date.is_some_and(|d| d <= to))
            })
            .collect();
        slips.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(slips)
    }

    pub fn put_party(&self, party: &Party) -> Result<(), StorageError> {
        if party.id.trim().is_empty() {
            return Err(StorageError::InvalidInput("party id must not be empty".into()));
        }
        self.store.put_party(party)
    }

    pub fn get_party(&self, id: &str) -> Result<Party, StorageError> {
        self.store
            .get_party(id)?
            .ok_or_else(|| StorageError::PartyNotFound(id.to_string()))
    }

    /// Lists parties sorted by name. `search` keeps names containing it,
    /// ignoring case.
    pub fn list_parties(&self, search: Option<&str>) -> Result<Vec<Party>, StorageError> {
        let needle = search.map(str::to_lowercase).filter(|s| !s.is_empty());
        let mut parties: Vec<Party> = self
            .store
            .list_parties()?
            .into_iter()
            .filter(|p| {
                needle
                    .as_deref()
                    .is_none_or(|n| p.name.to_lowercase().contains(n))
            })
            .collect();
        parties.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(parties)
    }

    /// Contact sheet of a party: its contacts sorted by service then name,
    /// plus the accounting contact if one is set.
    pub fn party_contacts(&self, party_id: &str) -> Result<PartyContacts, StorageError> {
        let party = self.get_party(party_id)?;
        let mut contacts = self.store.list_contacts(party_id)?;
        contacts.sort_by(|a, b| {
            (&a.details.service, &a.details.last_name, &a.details.first_name).cmp(&(
                &b.details.service,
                &b.details.last_name,
                &b.details.first_name,
            ))
        });
        Ok(PartyContacts {
            party,
            contacts,
            accounting_contact: self.store.get_accounting_contact(party_id)?,
        })
    }

    pub fn add_contact(&self, party_id: &str, details: ContactDetails) -> Result<Contact, StorageError> {
        self.get_party(party_id)?;
        let contact = Contact {
            id: Uuid::new_v4(),
            party_id: party_id.to_string(),
            details,
        };
        self.store.put_contact(&contact)?;
        tracing::info!(party_id = %party_id, contact_id = %contact.id, "Added contact");
        Ok(contact)
    }

    pub fn update_contact(
        &self,
        party_id: &str,
        id: Uuid,
        details: ContactDetails,
    ) -> Result<Contact, StorageError> {
        let exists = self
            .store
            .list_contacts(party_id)?
            .iter()
            .any(|c| c.id == id);
        if !exists {
            return Err(StorageError::ContactNotFound(id.to_string()));
        }
        let contact = Contact {
            id,
            party_id: party_id.to_string(),
            details,
        };
        self.store.put_contact(&contact)?;
        tracing::debug!(party_id = %party_id, contact_id = %id, "Updated contact");
        Ok(contact)
    }

    pub fn delete_contact(&self, party_id: &str, id: Uuid) -> Result<(), StorageError> {
        if !self.store.delete_contact(party_id, id)? {
            return Err(StorageError::ContactNotFound(id.to_string()));
        }
        tracing::info!(party_id = %party_id, contact_id = %id, "Deleted contact");
        Ok(())
    }

    /// Sets the accounting contact of a party, replacing any previous one.
    pub fn put_accounting_contact(&self, contact: &AccountingContact) -> Result<(), StorageError> {
        self.get_party(&contact.party_id)?;
        self.store.put_accounting_contact(contact)
    }

    /// Counts and freight totals for slips loading within `[start, end]`.
    pub fn summary(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<ActivitySummary, StorageError> {
        let transport = self.list(SlipKind::Transport, start, end)?;
        let freight = self.list(SlipKind::Freight, start, end)?;
        Ok(ActivitySummary {
            start_date: start,
            end_date: end,
            transport_count: transport.len(),
            freight_count: freight.len(),
            freight_margin: freight.iter().filter_map(|s| s.fields.margin).sum(),
            freight_revenue: freight.iter().filter_map(|s| s.fields.selling_price).sum(),
        })
    }

    /// Looks up an optional party reference, treating a dangling id as absent.
    pub fn resolve_party(&self, id: Option<&str>) -> Result<Option<Party>, StorageError> {
        match id {
            Some(id) => self.store.get_party(id),
            None => Ok(None),
        }
    }
}
