//! Error-handling utilities and the domain error taxonomy.
//!
//! Row-level errors (decode/validate/duplicate) carry the stable reason
//! strings that the Run Report uses as histogram keys; everything else is a
//! process-fatal [`GeoError`] that propagates out of `main`.

use anyhow::Error;
use thiserror::Error;

/// Domain error taxonomy. Row-level variants carry the exact reason string
/// that ends up as a key in the Run Report's `reasons` map.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeoError {
    /// The raw row didn't have exactly [`crate::model::INPUT_FIELD_COUNT`] fields.
    #[error("not enough fields in input")]
    NotEnoughFields,

    /// Latitude failed to parse as a 64-bit float.
    #[error("parsing latitude")]
    ParsingLatitude,

    /// Longitude failed to parse as a 64-bit float.
    #[error("parsing longitude")]
    ParsingLongitude,

    /// The mystery value failed to parse as a 64-bit float.
    #[error("parsing mystery value")]
    ParsingMysteryValue,

    /// The IP address field was empty.
    #[error("missing ip address")]
    MissingIpAddress,

    /// The IP address field didn't parse as an IPv4/IPv6 literal.
    #[error("invalid ip address")]
    InvalidIpAddress,

    /// The country code field was empty.
    #[error("missing country code")]
    MissingCountryCode,

    /// The country code field wasn't exactly two characters.
    #[error("invalid country code length")]
    InvalidCountryCodeLength,

    /// The country field was empty.
    #[error("missing country")]
    MissingCountry,

    /// The city field was empty.
    #[error("missing city")]
    MissingCity,

    /// Latitude was outside `[-90, 90]`.
    #[error("invalid latitude")]
    InvalidLatitude,

    /// Longitude was outside `[-180, 180]`.
    #[error("invalid longitude")]
    InvalidLongitude,

    /// A record with this IP was already accepted this run, or the store
    /// rejected it as a unique-constraint violation.
    #[error("geolocation already exists")]
    AlreadyExists,

    /// The record wasn't found by a lookup.
    #[error("geolocation not found")]
    NotFound,

    /// Any other storage driver failure. The message is the driver's own,
    /// passed through unmodified so it can become a Run Report reason.
    #[error("{0}")]
    StoreFailure(String),

    /// The ingest run itself could not be set up (source could not be
    /// opened, database could not be reached) or was cancelled.
    #[error("{0}")]
    Setup(String),

    /// A registered service missed the Supervisor's shutdown deadline.
    #[error("shutdown deadline exceeded while waiting for service {0} to shut down")]
    ShutdownDeadlineExceeded(String),
}

impl GeoError {
    /// The stable discard-reason string used as a Run Report histogram key.
    ///
    /// This is just `to_string()`, but naming it keeps call sites honest
    /// about which strings are part of the external contract versus
    /// incidental `Display` output.
    pub fn discard_reason(&self) -> String {
        self.to_string()
    }
}

/// Display an error, plus all the underlying "causes" (ie, wrapped errors), plus a
/// backtrace.
pub fn display_causes_and_backtrace(err: &Error) {
    eprintln!("Error: {}", err);
    for cause in err.chain().skip(1) {
        eprintln!("  caused by: {}", cause);
    }
    eprintln!("{}", err.backtrace());
}
