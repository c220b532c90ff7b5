pub mod short_term;
pub mod types;

pub use short_term::ShortTermStore;
pub use types::{LongTermRecord, MemoryEntry, RecordUpdate, Role};
