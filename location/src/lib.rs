//! GPS fix acquisition.
//!
//! This crate drives the "where am I?" part of the tagging flow: it consumes
//! position readings from a pluggable [`SensingBackend`] until one is accurate
//! enough to tag, keeps a single reverse-geocode request in flight for the
//! best fix, and exposes display-ready status through [`FixAcquirer`].
//!
//! The state machine itself is synchronous and assumes serial event delivery;
//! the [`session`] module provides an async runtime that serializes backend
//! events, the session deadline, and geocode completions onto one task.

#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

mod acquirer;
pub mod session;

pub use acquirer::{
    AcquirerConfig, AddressOutcome, AlreadyAcquiring, Directive, FixAcquirer, FixSnapshot,
    GeocodeCompletion, GeocodeRequest, GeocodeTicket, SessionId, StopReason,
};
pub use geotag_geocode::{Coordinate, Placemark};
pub use geotag_permission::PermissionStatus;

/// A single position fix reported by the sensing service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReading {
    /// Where the device was measured to be.
    pub coordinate: Coordinate,
    /// Radius of the confidence circle, in meters. Negative when the fix is
    /// invalid.
    pub horizontal_accuracy: f64,
    /// When the fix was taken.
    pub timestamp: Instant,
}

impl PositionReading {
    /// Create a reading stamped with the current time.
    #[must_use]
    pub fn new(coordinate: Coordinate, horizontal_accuracy: f64) -> Self {
        Self {
            coordinate,
            horizontal_accuracy,
            timestamp: Instant::now(),
        }
    }

    /// Create a reading taken at an explicit time.
    #[must_use]
    pub const fn taken_at(
        coordinate: Coordinate,
        horizontal_accuracy: f64,
        timestamp: Instant,
    ) -> Self {
        Self {
            coordinate,
            horizontal_accuracy,
            timestamp,
        }
    }
}

/// Mean earth radius in meters, spherical model.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates, in meters.
///
/// Uses the haversine formula, accurate at the short ranges the acquisition
/// heuristics care about.
#[must_use]
pub fn distance_meters(from: Coordinate, to: Coordinate) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let delta_lat = (to.latitude - from.latitude).to_radians();
    let delta_lon = (to.longitude - from.longitude).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Errors reported by the sensing service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensingError {
    /// The service cannot produce a fix right now but keeps trying.
    PositionUnknown,
    /// Location permission was not granted.
    PermissionDenied,
    /// Location services are disabled on the device.
    ServicesDisabled,
    /// Acquisition timed out before a usable fix arrived.
    Timeout,
    /// Any other sensing failure.
    Unknown(String),
}

impl SensingError {
    /// True for failures that terminate an acquisition session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::PositionUnknown)
    }
}

impl std::fmt::Display for SensingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PositionUnknown => write!(f, "position currently unknown"),
            Self::PermissionDenied => write!(f, "location permission denied"),
            Self::ServicesDisabled => write!(f, "location services disabled"),
            Self::Timeout => write!(f, "location request timed out"),
            Self::Unknown(msg) => write!(f, "unknown error: {msg}"),
        }
    }
}

impl std::error::Error for SensingError {}

/// An event delivered by the sensing backend.
#[derive(Debug, Clone, PartialEq)]
pub enum SensingEvent {
    /// A new position fix.
    Reading(PositionReading),
    /// The backend failed.
    Failure(SensingError),
}

/// Configuration handed to the sensing backend when updates start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensingConfig {
    /// Accuracy the backend should aim for, in meters.
    pub accuracy_hint: f64,
}

impl Default for SensingConfig {
    fn default() -> Self {
        Self {
            accuracy_hint: 10.0,
        }
    }
}

/// The external position-sensing service.
///
/// Mirrors a platform location stack: the backend owns the hardware session
/// and delivers fixes and failures through the registered delegate.
pub trait SensingBackend: Send + Sync {
    /// Current authorization status for location access.
    fn authorization(&self) -> PermissionStatus;

    /// Whether location services are enabled device-wide.
    fn services_enabled(&self) -> bool;

    /// Register the delegate that receives sensing events.
    fn set_delegate(&self, delegate: Arc<dyn SensingDelegate>);

    /// Begin delivering position updates.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot start producing fixes.
    fn start_updates(&self, config: SensingConfig) -> Result<(), SensingError>;

    /// Stop delivering position updates.
    fn stop_updates(&self);
}

/// Receiver for sensing events.
pub trait SensingDelegate: Send + Sync {
    /// Called for every reading or failure the backend produces.
    fn on_event(&self, event: SensingEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_matches_known_distance() {
        // One degree of latitude is ~111.2 km.
        let from = Coordinate::new(0.0, 0.0);
        let to = Coordinate::new(1.0, 0.0);
        let distance = distance_meters(from, to);
        assert!((distance - 111_195.0).abs() < 100.0, "got {distance}");
    }

    #[test]
    fn haversine_is_zero_for_identical_points() {
        let here = Coordinate::new(53.63, 9.99);
        assert_eq!(distance_meters(here, here), 0.0);
    }

    #[test]
    fn haversine_short_range() {
        // ~1.1m apart at the equator.
        let from = Coordinate::new(0.0, 0.0);
        let to = Coordinate::new(0.00001, 0.0);
        let distance = distance_meters(from, to);
        assert!(distance > 1.0 && distance < 1.3, "got {distance}");
    }

    #[test]
    fn transient_failures_are_not_fatal() {
        assert!(!SensingError::PositionUnknown.is_fatal());
        assert!(SensingError::PermissionDenied.is_fatal());
        assert!(SensingError::Timeout.is_fatal());
        assert!(SensingError::Unknown("radio fell off".into()).is_fatal());
    }
}
