//! # Geotag
//!
//! A location capture and tagging toolkit.
//!
//! Geotag acquires GPS fixes from a pluggable sensing backend until one is
//! accurate enough to tag, reverse-geocodes the fix into a postal address, and
//! persists the tagged record. Platform integration stays on the host's side
//! of the backend traits; this workspace holds the behavior.
//!
//! ## Features
//!
//! Geotag is modular. Enable only the capabilities you need:
//!
//! - `permission`: Authorization status and permission request contracts.
//! - `location`: Fix acquisition state machine and async session runtime.
//! - `geocode`: Reverse-geocoding contracts, placemarks, address formatting.
//! - `store`: Tagged-location records and JSON persistence.
//!
//! Use the `full` feature to enable everything.
//!
//! ## Example
//!
//! ```toml
//! [dependencies]
//! geotag = { version = "0.1", features = ["location", "store"] }
//! ```

#[cfg(feature = "geocode")]
pub use geotag_geocode as geocode;

#[cfg(feature = "location")]
pub use geotag_location as location;

#[cfg(feature = "permission")]
pub use geotag_permission as permission;

#[cfg(feature = "store")]
pub use geotag_store as store;
