pub mod error;
pub mod json_bridge;
pub mod schema;
pub mod session;
pub mod store;

pub use error::{Result, StoreError};
pub use json_bridge::{ImportSummary, JournalExport};
pub use session::{SessionStore, default_base_dir, load_config};
pub use store::Store;
