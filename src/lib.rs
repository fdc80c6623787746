pub mod catalog;
pub mod cli;
pub mod config;
pub mod hidden;
pub mod highlight;
pub mod labels;
pub mod model;
pub mod ranking;
pub mod session;
pub mod storage;
pub mod stores;
pub mod urls;
pub mod usage;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use session::{ActionOutcome, PopupSession};
pub use storage::StorageHandle;
