//! Reverse geocoding: turning coordinates into postal addresses.
//!
//! This crate defines the geocoding contract the fix-acquisition core calls
//! through, the [`Placemark`] address type services return, and the display
//! formatting the capture and detail screens use.

#![warn(missing_docs)]

use std::fmt;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees (-90 to 90).
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180).
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.8}, {:.8}", self.latitude, self.longitude)
    }
}

/// A structured postal address returned by a geocoding service.
///
/// Every field is optional; services rarely fill all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placemark {
    /// House or building number ("1" in "1 Infinite Loop").
    pub street_number: Option<String>,
    /// Street name.
    pub street: Option<String>,
    /// City or town.
    pub locality: Option<String>,
    /// State, province, or other administrative area.
    pub admin_area: Option<String>,
    /// Postal or ZIP code.
    pub postal_code: Option<String>,
    /// Country name.
    pub country: Option<String>,
}

impl Placemark {
    /// Create an empty placemark.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the street number.
    #[must_use]
    pub fn street_number(mut self, value: impl Into<String>) -> Self {
        self.street_number = Some(value.into());
        self
    }

    /// Set the street name.
    #[must_use]
    pub fn street(mut self, value: impl Into<String>) -> Self {
        self.street = Some(value.into());
        self
    }

    /// Set the locality.
    #[must_use]
    pub fn locality(mut self, value: impl Into<String>) -> Self {
        self.locality = Some(value.into());
        self
    }

    /// Set the administrative area.
    #[must_use]
    pub fn admin_area(mut self, value: impl Into<String>) -> Self {
        self.admin_area = Some(value.into());
        self
    }

    /// Set the postal code.
    #[must_use]
    pub fn postal_code(mut self, value: impl Into<String>) -> Self {
        self.postal_code = Some(value.into());
        self
    }

    /// Set the country.
    #[must_use]
    pub fn country(mut self, value: impl Into<String>) -> Self {
        self.country = Some(value.into());
        self
    }

    /// True when no field is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.street_number.is_none()
            && self.street.is_none()
            && self.locality.is_none()
            && self.admin_area.is_none()
            && self.postal_code.is_none()
            && self.country.is_none()
    }

    /// Two-line display form: "number street" over "locality area postal".
    ///
    /// Missing fields are skipped without leaving dangling separators; an
    /// entirely empty placemark formats as an empty string.
    #[must_use]
    pub fn address_lines(&self) -> String {
        let mut line1 = String::new();
        append_field(&mut line1, self.street_number.as_deref(), "");
        append_field(&mut line1, self.street.as_deref(), " ");

        let mut line2 = String::new();
        append_field(&mut line2, self.locality.as_deref(), "");
        append_field(&mut line2, self.admin_area.as_deref(), " ");
        append_field(&mut line2, self.postal_code.as_deref(), " ");

        append_field(&mut line1, Some(line2.as_str()), "\n");
        line1
    }

    /// One-line display form with country, comma-separated.
    #[must_use]
    pub fn address_line(&self) -> String {
        let mut text = String::new();
        append_field(&mut text, self.street_number.as_deref(), "");
        append_field(&mut text, self.street.as_deref(), " ");
        append_field(&mut text, self.locality.as_deref(), ", ");
        append_field(&mut text, self.admin_area.as_deref(), ", ");
        append_field(&mut text, self.postal_code.as_deref(), " ");
        append_field(&mut text, self.country.as_deref(), ", ");
        text
    }
}

/// Append `field` to `text`, inserting `separator` when `text` already has
/// content. Absent and empty fields are skipped.
fn append_field(text: &mut String, field: Option<&str>, separator: &str) {
    let Some(field) = field else { return };
    if field.is_empty() {
        return;
    }
    if !text.is_empty() {
        text.push_str(separator);
    }
    text.push_str(field);
}

/// Errors from a reverse-geocoding service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeocodeError {
    /// The service could not be reached.
    #[error("geocoding service unavailable: {0}")]
    Unavailable(String),
    /// The service could not resolve the request.
    #[error("geocoding failed: {0}")]
    Failed(String),
}

/// A reverse-geocoding service.
///
/// Implementations resolve a coordinate into zero or more candidate
/// placemarks, best candidate last. Limiting outstanding requests is the
/// caller's job; the fix-acquisition core issues at most one at a time.
pub trait Geocoder: Send + Sync {
    /// Resolve `coordinate` into candidate placemarks.
    fn reverse_geocode(
        &self,
        coordinate: Coordinate,
    ) -> BoxFuture<'static, Result<Vec<Placemark>, GeocodeError>>;
}
