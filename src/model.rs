//! The geolocation entity: decoding a raw CSV row into a typed, validated
//! record, and the identity (`ip_address`) that the rest of the pipeline
//! keys on.

use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::GeoError;

/// Number of fields expected in a raw input row:
/// `ip, country_code, country, city, latitude, longitude, mystery`.
pub const INPUT_FIELD_COUNT: usize = 7;

/// A validated geolocation record, uniquely identified by `ip_address`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geolocation {
    pub ip_address: String,
    pub country_code: String,
    pub country: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub mystery_value: f64,
}

impl Geolocation {
    /// Decode a raw 7-field row into a `Geolocation`, without validating it.
    ///
    /// Fields 0-3 are copied verbatim; fields 4-6 are parsed as 64-bit
    /// floats, each with its own distinct failure reason.
    pub fn decode(row: &[String]) -> Result<Geolocation, GeoError> {
        if row.len() != INPUT_FIELD_COUNT {
            return Err(GeoError::NotEnoughFields);
        }

        let latitude = row[4].parse::<f64>().map_err(|_| GeoError::ParsingLatitude)?;
        let longitude = row[5].parse::<f64>().map_err(|_| GeoError::ParsingLongitude)?;
        let mystery_value =
            row[6].parse::<f64>().map_err(|_| GeoError::ParsingMysteryValue)?;

        Ok(Geolocation {
            ip_address: row[0].clone(),
            country_code: row[1].clone(),
            country: row[2].clone(),
            city: row[3].clone(),
            latitude,
            longitude,
            mystery_value,
        })
    }

    /// Validate a decoded record. The first failing check short-circuits,
    /// each with its own distinct failure reason.
    pub fn validate(&self) -> Result<(), GeoError> {
        if self.ip_address.is_empty() {
            return Err(GeoError::MissingIpAddress);
        }

        if IpAddr::from_str(&self.ip_address).is_err() {
            return Err(GeoError::InvalidIpAddress);
        }

        if self.country_code.is_empty() {
            return Err(GeoError::MissingCountryCode);
        }

        if self.country_code.chars().count() != 2 {
            return Err(GeoError::InvalidCountryCodeLength);
        }

        if self.country.is_empty() {
            return Err(GeoError::MissingCountry);
        }

        if self.city.is_empty() {
            return Err(GeoError::MissingCity);
        }

        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(GeoError::InvalidLatitude);
        }

        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(GeoError::InvalidLongitude);
        }

        Ok(())
    }

    /// Decode and validate a raw row in one step, as the pipeline's
    /// processor workers do.
    pub fn decode_and_validate(row: &[String]) -> Result<Geolocation, GeoError> {
        let geo = Geolocation::decode(row)?;
        geo.validate()?;
        Ok(geo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_row() -> Vec<String> {
        vec![
            "200.106.141.15".to_owned(),
            "SI".to_owned(),
            "Nepal".to_owned(),
            "DuBuquemouth".to_owned(),
            "-84.87503094689836".to_owned(),
            "7.206435933364332".to_owned(),
            "7823011346".to_owned(),
        ]
    }

    #[test]
    fn decodes_a_valid_row() {
        let geo = Geolocation::decode_and_validate(&valid_row()).unwrap();
        assert_eq!(geo.ip_address, "200.106.141.15");
        assert_eq!(geo.country_code, "SI");
        assert!((geo.latitude - -84.87503094689836).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_wrong_field_count() {
        let mut row = valid_row();
        row.pop();
        assert_eq!(Geolocation::decode(&row).unwrap_err(), GeoError::NotEnoughFields);
    }

    #[test]
    fn rejects_unparseable_latitude() {
        let mut row = valid_row();
        row[4] = "not-a-float".to_owned();
        assert_eq!(Geolocation::decode(&row).unwrap_err(), GeoError::ParsingLatitude);
    }

    #[test]
    fn rejects_unparseable_longitude() {
        let mut row = valid_row();
        row[5] = "not-a-float".to_owned();
        assert_eq!(Geolocation::decode(&row).unwrap_err(), GeoError::ParsingLongitude);
    }

    #[test]
    fn rejects_unparseable_mystery_value() {
        let mut row = valid_row();
        row[6] = "not-a-float".to_owned();
        assert_eq!(Geolocation::decode(&row).unwrap_err(), GeoError::ParsingMysteryValue);
    }

    #[test]
    fn rejects_empty_ip() {
        let mut row = valid_row();
        row[0] = "".to_owned();
        let geo = Geolocation::decode(&row).unwrap();
        assert_eq!(geo.validate().unwrap_err(), GeoError::MissingIpAddress);
    }

    #[test]
    fn rejects_invalid_ip() {
        let mut row = valid_row();
        row[0] = "not-an-ip".to_owned();
        let geo = Geolocation::decode(&row).unwrap();
        assert_eq!(geo.validate().unwrap_err(), GeoError::InvalidIpAddress);
    }

    #[test]
    fn accepts_ipv6() {
        let mut row = valid_row();
        row[0] = "2001:db8::1".to_owned();
        let geo = Geolocation::decode(&row).unwrap();
        assert!(geo.validate().is_ok());
    }

    #[test]
    fn rejects_bad_country_code_length() {
        let mut row = valid_row();
        row[1] = "SVN".to_owned();
        let geo = Geolocation::decode(&row).unwrap();
        assert_eq!(geo.validate().unwrap_err(), GeoError::InvalidCountryCodeLength);
    }

    #[test]
    fn rejects_missing_country() {
        let mut row = valid_row();
        row[2] = "".to_owned();
        let geo = Geolocation::decode(&row).unwrap();
        assert_eq!(geo.validate().unwrap_err(), GeoError::MissingCountry);
    }

    #[test]
    fn rejects_missing_city() {
        let mut row = valid_row();
        row[3] = "".to_owned();
        let geo = Geolocation::decode(&row).unwrap();
        assert_eq!(geo.validate().unwrap_err(), GeoError::MissingCity);
    }

    #[test]
    fn latitude_bounds_are_inclusive() {
        for lat in ["-90", "90"] {
            let mut row = valid_row();
            row[4] = lat.to_owned();
            let geo = Geolocation::decode(&row).unwrap();
            assert!(geo.validate().is_ok(), "latitude {lat} should be valid");
        }
    }

    #[test]
    fn longitude_bounds_are_inclusive() {
        for lon in ["-180", "180"] {
            let mut row = valid_row();
            row[5] = lon.to_owned();
            let geo = Geolocation::decode(&row).unwrap();
            assert!(geo.validate().is_ok(), "longitude {lon} should be valid");
        }
    }

    #[test]
    fn rejects_out_of_range_latitude() {
        let mut row = valid_row();
        row[4] = "90.0001".to_owned();
        let geo = Geolocation::decode(&row).unwrap();
        assert_eq!(geo.validate().unwrap_err(), GeoError::InvalidLatitude);
    }

    #[test]
    fn rejects_out_of_range_longitude() {
        let mut row = valid_row();
        row[5] = "-180.0001".to_owned();
        let geo = Geolocation::decode(&row).unwrap();
        assert_eq!(geo.validate().unwrap_err(), GeoError::InvalidLongitude);
    }

    #[test]
    fn mystery_value_has_no_range_check() {
        let mut row = valid_row();
        row[6] = "99999999999".to_owned();
        let geo = Geolocation::decode(&row).unwrap();
        assert!(geo.validate().is_ok());
    }

    #[test]
    fn round_trips_fields_to_full_precision() {
        let row = valid_row();
        let geo = Geolocation::decode(&row).unwrap();
        assert_eq!(geo.ip_address, row[0]);
        assert_eq!(geo.country_code, row[1]);
        assert_eq!(geo.country, row[2]);
        assert_eq!(geo.city, row[3]);
        assert_eq!(geo.latitude.to_string(), row[4]);
        assert_eq!(geo.longitude.to_string(), row[5]);
        assert_eq!(geo.mystery_value.to_string(), row[6]);
    }
}
