// ── Persistent storage ──

mod disk_cache;
mod key;

pub use disk_cache::{DEFAULT_DEBOUNCE, DiskCache, WriteMode};
pub(crate) use disk_cache::lock;
pub use key::{escape_key, unescape_key};
