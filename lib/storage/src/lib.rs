pub mod memory;
pub mod pin;
pub mod snapshot;
pub mod store;

pub use memory::MemoryStore;
pub use pin::{scope_key, PinnedTaxonomy, TaxonomyPinStore};
pub use snapshot::{load_snapshot, read_json, save_snapshot, write_json_atomic, SnapshotData};
pub use store::RecordStore;
