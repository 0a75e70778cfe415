pub mod cbor;
pub mod client;
pub mod crypto;
mod error;
pub mod types;
pub mod validate;

#[cfg(test)]
mod test_support;

pub use client::{ClientError, DirectoryClient};
pub use error::{PlcError, Result};
pub use types::{CreateV1, DidDocument, LogEntry, Operation, PlcOperation, Service, Tombstone};
pub use validate::{
    RECOVERY_GRACE_PERIOD_MS, apply_operation, assure_valid_genesis, did_for_genesis,
    validate_operation_log,
};
