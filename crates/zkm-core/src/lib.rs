pub mod config;
pub mod error;
pub mod types;

pub use error::{ZkmError, ZkmResult};
pub use types::{parse_epoch, Address, Epoch, TxDigest};
