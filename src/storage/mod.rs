//! The Store Adapter: a typed wrapper around a SQL store exposing
//! `insert_batch` and `find_by_ip`, with driver errors mapped to the domain
//! error taxonomy.

pub mod postgres;

use async_trait::async_trait;

use crate::errors::GeoError;
use crate::model::Geolocation;

pub use postgres::PostgresStore;

/// The table that persisted geolocation rows live in.
pub const GEOLOCATION_TABLE: &str = "geolocation";

/// Capability the Batch Writer and Lookup Service depend on. Stateless
/// beyond its connection pool; holds no caches.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a batch of records in a single multi-row statement.
    ///
    /// Returns [`GeoError::AlreadyExists`] on a unique-constraint
    /// violation (matched against `ip_address`), or
    /// [`GeoError::StoreFailure`] wrapping any other driver error.
    async fn insert_batch(&self, records: &[Geolocation]) -> Result<(), GeoError>;

    /// Find the single record with the given IP.
    ///
    /// Returns [`GeoError::NotFound`] if no row matches, or
    /// [`GeoError::StoreFailure`] wrapping any other driver error.
    async fn find_by_ip(&self, ip: &str) -> Result<Geolocation, GeoError>;
}

#[cfg(test)]
pub mod test_double {
    //! An in-memory [`Store`] double used by pipeline and lookup tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct InMemoryStore {
        rows: Mutex<HashMap<String, Geolocation>>,
        /// If set, every `insert_batch` call fails with this error instead
        /// of writing anything, to exercise the flush-failure path.
        pub fail_inserts_with: Mutex<Option<String>>,
    }

    impl InMemoryStore {
        pub fn new() -> Self {
            InMemoryStore::default()
        }

        pub fn len(&self) -> usize {
            self.rows.lock().unwrap().len()
        }

        pub fn fail_inserts_with(&self, message: impl Into<String>) {
            *self.fail_inserts_with.lock().unwrap() = Some(message.into());
        }
    }

    #[async_trait]
    impl Store for InMemoryStore {
        async fn insert_batch(&self, records: &[Geolocation]) -> Result<(), GeoError> {
            if let Some(message) = self.fail_inserts_with.lock().unwrap().clone() {
                return Err(GeoError::StoreFailure(message));
            }

            let mut rows = self.rows.lock().unwrap();
            for record in records {
                if rows.contains_key(&record.ip_address) {
                    return Err(GeoError::AlreadyExists);
                }
            }
            for record in records {
                rows.insert(record.ip_address.clone(), record.clone());
            }
            Ok(())
        }

        async fn find_by_ip(&self, ip: &str) -> Result<Geolocation, GeoError> {
            self.rows
                .lock()
                .unwrap()
                .get(ip)
                .cloned()
                .ok_or(GeoError::NotFound)
        }
    }
}
