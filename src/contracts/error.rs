use std::sync::{MutexGuard, PoisonError, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

use crate::contracts::SlipKind;

#[derive(Error, Debug)]
pub enum BordereauError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Allocation error: {0}")]
    Allocation(#[from] AllocationError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),
}

/// Extension trait for converting lock errors to StorageError.
pub trait LockResultExt<T> {
    /// Converts a lock error to a StorageError.
    fn map_lock_err(self) -> Result<T, StorageError>;
}

impl<'a, T> LockResultExt<RwLockReadGuard<'a, T>>
    for Result<RwLockReadGuard<'a, T>, PoisonError<RwLockReadGuard<'a, T>>>
{
    #[inline]
    fn map_lock_err(self) -> Result<RwLockReadGuard<'a, T>, StorageError> {
        self.map_err(|e| StorageError::LockPoisoned(e.to_string()))
    }
}

impl<'a, T> LockResultExt<RwLockWriteGuard<'a, T>>
    for Result<RwLockWriteGuard<'a, T>, PoisonError<RwLockWriteGuard<'a, T>>>
{
    #[inline]
    fn map_lock_err(self) -> Result<RwLockWriteGuard<'a, T>, StorageError> {
        self.map_err(|e| StorageError::LockPoisoned(e.to_string()))
    }
}

impl<'a, T> LockResultExt<MutexGuard<'a, T>>
    for Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>
{
    #[inline]
    fn map_lock_err(self) -> Result<MutexGuard<'a, T>, StorageError> {
        self.map_err(|e| StorageError::LockPoisoned(e.to_string()))
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("RocksDB error: {0}")]
    RocksDb(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Slip not found: {kind} {id}")]
    SlipNotFound { kind: SlipKind, id: String },

    #[error("Party not found: {0}")]
    PartyNotFound(String),

    #[error("Contact not found: {0}")]
    ContactNotFound(String),

    #[error("Duplicate key: {0}")]
    Duplicate(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Failure to issue a slip number. Always fatal for the enclosing slip creation.
#[derive(Error, Debug)]
pub enum AllocationError {
    #[error("Counter store failure for {kind}: {source}")]
    Store {
        kind: SlipKind,
        #[source]
        source: StorageError,
    },

    #[error("Counter row for {0} vanished after initialization")]
    MissingCounter(SlipKind),

    #[error("Counter for {kind} still contended after {attempts} attempts")]
    Contention { kind: SlipKind, attempts: usize },

    #[error("Sequence overflow for {0}")]
    Overflow(SlipKind),

    #[error(
        "Refusing to move {kind} counter back from {stored} to {requested} under prefix {prefix}"
    )]
    Rewind {
        kind: SlipKind,
        prefix: String,
        stored: u64,
        requested: u64,
    },
}

impl AllocationError {
    pub(crate) fn store(kind: SlipKind) -> impl FnOnce(StorageError) -> Self {
        move |source| AllocationError::Store { kind, source }
    }
}

#[derive(Error, Debug)]
pub enum MailError {
    #[error("SMTP transporter not initialized")]
    NotConfigured,

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("No recipients given")]
    NoRecipients,

    #[error("Invalid attachment {filename}: {reason}")]
    InvalidAttachment { filename: String, reason: String },

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("SMTP error: {0}")]
    Smtp(String),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Rasterizer failed: {0}")]
    Rasterize(String),
}
