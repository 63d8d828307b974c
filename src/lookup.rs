//! The Lookup Service: look up a single geolocation record by IP address,
//! independent of the ingest pipeline.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use metrics::counter;

use crate::errors::GeoError;
use crate::metrics::LOOKUP_REQUESTS;
use crate::model::Geolocation;
use crate::storage::Store;

/// Looks up a single record by IP, validating the query before it ever
/// reaches the store.
pub struct LookupService {
    store: Arc<dyn Store>,
}

impl LookupService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        LookupService { store }
    }

    /// Returns [`GeoError::MissingIpAddress`] for an empty query,
    /// [`GeoError::InvalidIpAddress`] for one that doesn't parse, and
    /// otherwise defers to the store, which itself may answer
    /// [`GeoError::NotFound`] or a wrapped [`GeoError::StoreFailure`].
    pub async fn lookup(&self, ip: &str) -> Result<Geolocation, GeoError> {
        let result = self.lookup_inner(ip).await;

        let status = match &result {
            Ok(_) => "ok",
            Err(GeoError::MissingIpAddress) | Err(GeoError::InvalidIpAddress) => "invalid-argument",
            Err(GeoError::NotFound) => "not-found",
            Err(_) => "internal",
        };
        counter!(LOOKUP_REQUESTS, 1, "status" => status);

        result
    }

    async fn lookup_inner(&self, ip: &str) -> Result<Geolocation, GeoError> {
        if ip.is_empty() {
            return Err(GeoError::MissingIpAddress);
        }

        if IpAddr::from_str(ip).is_err() {
            return Err(GeoError::InvalidIpAddress);
        }

        self.store.find_by_ip(ip).await
    }
}
