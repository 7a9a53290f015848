pub mod error;
pub mod mail;
pub mod render;
pub mod schema;
pub mod sequence;
pub mod storage;

pub use error::{
    AllocationError, BordereauError, LockResultExt, MailError, RenderError, StorageError,
};
pub use mail::{MailAttachment, MailTransport, OutgoingMail};
pub use render::{DocumentRasterizer, PageSize};
pub use schema::{
    AccountingContact, ActivitySummary, Contact, ContactDetails, Party, Slip, SlipFields,
    SlipStatus, SlipUpdate,
};
pub use sequence::{
    Clock, FixedYear, SlipKind, SlipNumber, SlipNumberAllocator, SlipNumberConfig, SystemClock,
};
pub use storage::RecordStore;
