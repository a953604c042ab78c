//! File-backed JSON store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::debug;

use crate::{LocationStore, PhotoId, StoreError, TaggedLocation};

/// Stores records as a JSON array in a single file, photo bytes alongside.
///
/// Writes land in a temporary file first and are renamed into place, so a
/// crash mid-write never corrupts existing data. Photo files live next to the
/// store file under the names [`PhotoId::file_name`] produces.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    records: Vec<TaggedLocation>,
    next_photo: u32,
}

impl JsonStore {
    /// Open the store at `path`, creating an empty one if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records: Vec<TaggedLocation> = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        let next_photo = records
            .iter()
            .filter_map(|record| record.photo)
            .map(|photo| photo.0 + 1)
            .max()
            .unwrap_or(0);

        debug!(
            "opened store at {} ({} record(s))",
            path.display(),
            records.len()
        );
        Ok(Self {
            path,
            state: Mutex::new(State {
                records,
                next_photo,
            }),
        })
    }

    /// Directory photo files live in (the store file's parent).
    #[must_use]
    pub fn photo_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Write photo bytes for `id` next to the store file.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be written.
    pub fn save_photo(&self, id: PhotoId, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let path = self.photo_dir().join(id.file_name());
        write_atomically(&path, bytes)?;
        Ok(path)
    }

    fn persist(&self, records: &[TaggedLocation]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(records)?;
        write_atomically(&self.path, &bytes)
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl LocationStore for JsonStore {
    fn save(&self, location: &TaggedLocation) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("poisoned store state");
        state.records.push(location.clone());
        if let Err(err) = self.persist(&state.records) {
            state.records.pop();
            return Err(err);
        }
        debug!("saved tagged location ({} total)", state.records.len());
        Ok(())
    }

    fn all(&self) -> Result<Vec<TaggedLocation>, StoreError> {
        Ok(self.state.lock().expect("poisoned store state").records.clone())
    }

    fn next_photo_id(&self) -> PhotoId {
        let mut state = self.state.lock().expect("poisoned store state");
        let id = PhotoId(state.next_photo);
        state.next_photo += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use geotag_geocode::{Coordinate, Placemark};

    use super::*;
    use crate::Category;

    static SCRATCH: AtomicU32 = AtomicU32::new(0);

    fn scratch_file() -> PathBuf {
        let unique = SCRATCH.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "geotag-store-test-{}-{unique}.json",
            std::process::id()
        ))
    }

    fn sample(description: &str) -> TaggedLocation {
        TaggedLocation::new(
            description,
            Category::new("Park").expect("catalog name"),
            Coordinate::new(53.5636, 9.9872),
        )
        .with_placemark(Placemark::new().locality("Hamburg"))
    }

    #[test]
    fn saves_survive_reopening() {
        let path = scratch_file();
        {
            let store = JsonStore::open(&path).expect("open empty");
            store.save(&sample("planten un blomen")).expect("save");
            store.save(&sample("jenischpark")).expect("save");
        }

        let reopened = JsonStore::open(&path).expect("reopen");
        let all = reopened.all().expect("read");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].description, "planten un blomen");
        assert_eq!(all[1].description, "jenischpark");

        fs::remove_file(&path).expect("cleanup");
    }

    #[test]
    fn photo_ids_resume_after_reopening() {
        let path = scratch_file();
        {
            let store = JsonStore::open(&path).expect("open empty");
            let first = store.next_photo_id();
            assert_eq!(first, PhotoId(0));
            store
                .save(&sample("fish market").with_photo(first))
                .expect("save");
        }

        let reopened = JsonStore::open(&path).expect("reopen");
        assert_eq!(reopened.next_photo_id(), PhotoId(1));

        fs::remove_file(&path).expect("cleanup");
    }

    #[test]
    fn photos_are_written_next_to_the_store() {
        let path = scratch_file();
        let store = JsonStore::open(&path).expect("open empty");

        let id = store.next_photo_id();
        let photo_path = store.save_photo(id, b"jpeg bytes").expect("write photo");

        assert_eq!(photo_path.parent(), path.parent());
        assert_eq!(fs::read(&photo_path).expect("read back"), b"jpeg bytes");

        fs::remove_file(&photo_path).expect("cleanup");
    }

    #[test]
    fn opening_a_missing_file_starts_empty() {
        let path = scratch_file();
        let store = JsonStore::open(&path).expect("open");
        assert!(store.all().expect("read").is_empty());
    }
}
