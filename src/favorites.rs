//! User's favorite movies, persisted as one JSON entry in local storage.
//!
//! Persistence failures never fail a mutation: the in-memory list stays
//! authoritative for the session and the error is logged.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use crate::schema::{Movie, MovieId};

pub const STORAGE_KEY: &str = "moviehub-favorites";
const STORAGE_VERSION: u32 = 0;

/// Named string entries that survive restarts.
pub trait Storage {
    fn get_item(&self, name: &str) -> io::Result<Option<String>>;
    fn set_item(&self, name: &str, value: &str) -> io::Result<()>;
    fn remove_item(&self, name: &str) -> io::Result<()>;
}

/// One `<name>.json` file per entry under `dir`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl Storage for FileStorage {
    fn get_item(&self, name: &str) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.path(name)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    // Write then rename, so a crash never leaves a half-written entry.
    fn set_item(&self, name: &str, value: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path(name);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)
    }

    fn remove_item(&self, name: &str) -> io::Result<()> {
        match std::fs::remove_file(self.path(name)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Process-local storage. Clones share entries, which stands in for a
/// restart in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, name: &str) -> io::Result<Option<String>> {
        Ok(self.items().get(name).cloned())
    }

    fn set_item(&self, name: &str, value: &str) -> io::Result<()> {
        self.items().insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, name: &str) -> io::Result<()> {
        self.items().remove(name);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Persisted {
    state: PersistedState,
    #[serde(default)]
    version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    favorites: Vec<Movie>,
}

/// Ordered favorites, oldest first, at most one per movie id.
#[derive(Debug)]
pub struct FavoritesStore<S: Storage> {
    storage: S,
    favorites: Vec<Movie>,
}

impl<S: Storage> FavoritesStore<S> {
    /// Restore from `storage`. Missing or unreadable data yields an empty list.
    pub fn load(storage: S) -> Self {
        let favorites = match storage.get_item(STORAGE_KEY) {
            Ok(Some(text)) => match serde_json::from_str::<Persisted>(&text) {
                Ok(persisted) => dedupe(persisted.state.favorites),
                Err(e) => {
                    warn!("Ignoring unreadable favorites entry: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read favorites from storage: {}", e);
                Vec::new()
            }
        };
        debug!(count = favorites.len(), "favorites loaded");
        Self { storage, favorites }
    }

    pub fn favorites(&self) -> &[Movie] {
        &self.favorites
    }

    pub fn len(&self) -> usize {
        self.favorites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.favorites.is_empty()
    }

    pub fn is_favorite(&self, id: MovieId) -> bool {
        self.favorites.iter().any(|m| m.id == id)
    }

    /// Append `movie` unless its id is already present. Returns whether it
    /// was added.
    pub fn add(&mut self, movie: &Movie) -> bool {
        if self.is_favorite(movie.id) {
            return false;
        }
        self.favorites.push(movie.clone());
        self.persist();
        true
    }

    /// Returns whether anything was removed.
    pub fn remove(&mut self, id: MovieId) -> bool {
        let before = self.favorites.len();
        self.favorites.retain(|m| m.id != id);
        if self.favorites.len() == before {
            return false;
        }
        self.persist();
        true
    }

    /// Add if absent, remove if present. Returns the new membership.
    pub fn toggle(&mut self, movie: &Movie) -> bool {
        if self.remove(movie.id) {
            false
        } else {
            self.add(movie)
        }
    }

    pub fn clear(&mut self) {
        self.favorites.clear();
        self.persist();
    }

    /// Empty the list and delete the stored entry.
    pub fn reset(&mut self) {
        self.favorites.clear();
        if let Err(e) = self.storage.remove_item(STORAGE_KEY) {
            warn!("Failed to remove favorites from storage: {}", e);
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn persist(&self) {
        let persisted = Persisted {
            state: PersistedState {
                favorites: self.favorites.clone(),
            },
            version: STORAGE_VERSION,
        };
        let text = match serde_json::to_string(&persisted) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode favorites: {}", e);
                return;
            }
        };
        if let Err(e) = self.storage.set_item(STORAGE_KEY, &text) {
            warn!("Failed to persist favorites: {}", e);
        }
    }
}

fn dedupe(movies: Vec<Movie>) -> Vec<Movie> {
    let mut seen = HashSet::new();
    movies.into_iter().filter(|m| seen.insert(m.id)).collect()
}
