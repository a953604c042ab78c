//! Durable storage for tagged locations.
//!
//! A tagged location is the end product of the capture flow: coordinates, the
//! resolved address, a user description, a category from the fixed catalog,
//! and an optional photo. This crate defines the record, the store contract,
//! an in-memory store for tests, and a file-backed [`JsonStore`].

#![warn(missing_docs)]

mod json;

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use geotag_geocode::{Coordinate, Placemark};
use serde::{Deserialize, Serialize};

pub use json::JsonStore;

/// Category assigned to a tagged location.
///
/// Categories come from a fixed catalog; arbitrary strings are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    /// The catalog, in display order.
    pub const CATALOG: &'static [&'static str] = &[
        "No Category",
        "Apple Store",
        "Bar",
        "Bookstore",
        "Club",
        "Grocery Store",
        "Historic Building",
        "House",
        "Icecream Vendor",
        "Landmark",
        "Park",
    ];

    /// Look `name` up in the catalog.
    #[must_use]
    pub fn new(name: &str) -> Option<Self> {
        Self::CATALOG
            .iter()
            .find(|candidate| **candidate == name)
            .map(|candidate| Self((*candidate).to_owned()))
    }

    /// The category's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Default for Category {
    fn default() -> Self {
        Self("No Category".to_owned())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric reference to a stored photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoId(pub u32);

impl PhotoId {
    /// File name the photo bytes are stored under.
    #[must_use]
    pub fn file_name(self) -> String {
        format!("photo{}.jpg", self.0)
    }
}

/// A finalized, user-tagged location record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedLocation {
    /// Free-form description the user entered.
    pub description: String,
    /// Category from the fixed catalog.
    pub category: Category,
    /// Where the location is.
    pub coordinate: Coordinate,
    /// Resolved address, when geocoding succeeded.
    pub placemark: Option<Placemark>,
    /// When the location was tagged, as Unix epoch milliseconds.
    pub tagged_at: u64,
    /// Attached photo, when one was taken.
    pub photo: Option<PhotoId>,
}

impl TaggedLocation {
    /// Create a record stamped with the current time.
    #[must_use]
    pub fn new(description: impl Into<String>, category: Category, coordinate: Coordinate) -> Self {
        Self {
            description: description.into(),
            category,
            coordinate,
            placemark: None,
            tagged_at: epoch_millis(),
            photo: None,
        }
    }

    /// Attach the resolved address.
    #[must_use]
    pub fn with_placemark(mut self, placemark: Placemark) -> Self {
        self.placemark = Some(placemark);
        self
    }

    /// Attach a photo reference.
    #[must_use]
    pub const fn with_photo(mut self, photo: PhotoId) -> Self {
        self.photo = Some(photo);
        self
    }

    /// Address line for display, or the fallback text.
    #[must_use]
    pub fn address_line(&self) -> String {
        self.placemark
            .as_ref()
            .map_or_else(|| "No Address Found".to_owned(), Placemark::address_line)
    }

    /// Whether a photo is attached.
    #[must_use]
    pub const fn has_photo(&self) -> bool {
        self.photo.is_some()
    }
}

/// Errors from a location store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying I/O failure.
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Records could not be encoded or decoded.
    #[error("store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable home for tagged locations.
///
/// Save failures surface to the caller; nothing in the capture flow retries
/// them.
pub trait LocationStore: Send + Sync {
    /// Persist a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be written durably.
    fn save(&self, location: &TaggedLocation) -> Result<(), StoreError>;

    /// All stored records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the records could not be read.
    fn all(&self) -> Result<Vec<TaggedLocation>, StoreError>;

    /// Allocate the next photo id. Ids are never reused.
    fn next_photo_id(&self) -> PhotoId;
}

/// In-memory store for tests and previews.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<TaggedLocation>>,
    next_photo: AtomicU32,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocationStore for MemoryStore {
    fn save(&self, location: &TaggedLocation) -> Result<(), StoreError> {
        self.records
            .lock()
            .expect("poisoned records")
            .push(location.clone());
        Ok(())
    }

    fn all(&self) -> Result<Vec<TaggedLocation>, StoreError> {
        Ok(self.records.lock().expect("poisoned records").clone())
    }

    fn next_photo_id(&self) -> PhotoId {
        PhotoId(self.next_photo.fetch_add(1, Ordering::SeqCst))
    }
}

fn epoch_millis() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lookup_accepts_known_names_only() {
        assert_eq!(Category::new("Bar").map(|c| c.name().to_owned()), Some("Bar".to_owned()));
        assert!(Category::new("Volcano Lair").is_none());
        assert_eq!(Category::default().name(), "No Category");
    }

    #[test]
    fn records_fall_back_when_no_address_was_found() {
        let record = TaggedLocation::new(
            "lunch spot",
            Category::default(),
            Coordinate::new(53.63, 9.99),
        );
        assert_eq!(record.address_line(), "No Address Found");
        assert!(!record.has_photo());
    }

    #[test]
    fn memory_store_round_trips_and_allocates_photo_ids() {
        let store = MemoryStore::new();
        let record = TaggedLocation::new(
            "ferry terminal",
            Category::new("Landmark").expect("catalog name"),
            Coordinate::new(53.54, 9.97),
        )
        .with_photo(store.next_photo_id());

        store.save(&record).expect("memory save cannot fail");

        let all = store.all().expect("memory read cannot fail");
        assert_eq!(all, vec![record]);
        assert_eq!(store.next_photo_id(), PhotoId(1));
    }

    #[test]
    fn photo_ids_name_their_files() {
        assert_eq!(PhotoId(7).file_name(), "photo7.jpg");
    }
}
