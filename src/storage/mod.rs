mod memory;
mod retry;
mod rocksdb;
mod sequence;
mod slips;

pub use memory::MemoryStore;
pub use retry::AllocatorConfig;
pub use rocksdb::RocksDbStore;
pub use sequence::CounterAllocator;
pub use slips::{PartyContacts, SlipService};
