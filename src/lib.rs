pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod example;
pub mod record;
pub mod store;
pub mod transaction;
pub mod value;
pub mod wal;

pub use config::Config;
pub use engine::OpLog;
pub use error::{Error, Result};
pub use record::{OpKind, Operation};
pub use store::{FileStore, Store};
pub use transaction::Transaction;
pub use wal::{FileLog, Log};
