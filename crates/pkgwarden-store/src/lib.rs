mod document;
mod layout;
mod lock;
mod store;

pub use document::StateDocument;
pub use layout::{StateLayout, DEFAULT_STATE_ROOT};
pub use lock::{LockError, TaskLock};
pub use store::{FileStore, MemoryStore, Store, StoreError};
