//! Schema version bookkeeping
//!
//! The schema version lives under a reserved key outside the node and edge
//! key spaces. Fresh databases are stamped with the current version.

use crate::error::{Result, StoreError};
use rocksdb::DB;

/// Database version stored in metadata
const DB_VERSION_KEY: &[u8] = b"_schema_version";
pub const CURRENT_VERSION: u32 = 1;

/// Check the stored schema version, stamping fresh databases
pub fn ensure_schema(db: &DB) -> Result<u32> {
    let stored = match db.get(DB_VERSION_KEY)? {
        Some(bytes) => {
            let bytes_slice: &[u8] = bytes.as_ref();
            let version_bytes: [u8; 4] = bytes_slice
                .try_into()
                .map_err(|_| StoreError::other("Invalid schema version format"))?;
            Some(u32::from_le_bytes(version_bytes))
        }
        None => None,
    };

    match stored {
        None => {
            log::debug!("Stamping new database with schema v{}", CURRENT_VERSION);
            db.put(DB_VERSION_KEY, CURRENT_VERSION.to_le_bytes())?;
            db.flush()?;
            Ok(CURRENT_VERSION)
        }
        Some(version) if version == CURRENT_VERSION => Ok(version),
        Some(version) => {
            log::error!(
                "Database schema v{} cannot be opened by this build (v{})",
                version,
                CURRENT_VERSION
            );
            Err(StoreError::IncompatibleSchema {
                found: version,
                supported: CURRENT_VERSION,
            })
        }
    }
}
