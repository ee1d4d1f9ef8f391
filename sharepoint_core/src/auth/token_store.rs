use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::TokenEntry;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("persist error: {0}")]
    Persist(String),
}

/// Persistence for issued tokens, keyed by the cache key's storage form.
pub trait TokenStore: Send + Sync {
    fn load(&self, key: &str) -> Option<TokenEntry>;
    fn save(&self, key: &str, entry: &TokenEntry) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store, mainly for tests.
pub struct MemoryTokenStore {
    map: std::sync::Mutex<HashMap<String, TokenEntry>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self {
            map: std::sync::Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self, key: &str) -> Option<TokenEntry> {
        self.map.lock().ok()?.get(key).cloned()
    }

    fn save(&self, key: &str, entry: &TokenEntry) -> Result<(), StoreError> {
        self.map
            .lock()
            .map_err(|e| StoreError::Persist(format!("lock poisoned: {}", e)))?
            .insert(key.to_string(), entry.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.map
            .lock()
            .map_err(|e| StoreError::Persist(format!("lock poisoned: {}", e)))?
            .remove(key);
        Ok(())
    }
}

/// JSON file store. The file is rewritten on every save with owner-only
/// permissions on Unix.
pub struct FileTokenStore {
    path: PathBuf,
    lock: std::sync::Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| StoreError::Unavailable(format!("{}: {}", dir.display(), e)))?;
        }
        Ok(Self {
            path,
            lock: std::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> HashMap<String, TokenEntry> {
        match std::fs::read_to_string(&self.path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    fn write_map(&self, map: &HashMap<String, TokenEntry>) -> Result<(), StoreError> {
        let s = serde_json::to_string_pretty(map)
            .map_err(|e| StoreError::Persist(format!("serde: {}", e)))?;
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&self.path)
            .map_err(|e| StoreError::Persist(e.to_string()))?;

        // `mode` only applies on creation; tighten files that already existed.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(|e| StoreError::Persist(format!("chmod: {}", e)))?;
        }

        file.write_all(s.as_bytes())
            .map_err(|e| StoreError::Persist(e.to_string()))?;

        Ok(())
    }

    fn update<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut HashMap<String, TokenEntry>),
    {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| StoreError::Persist(format!("lock poisoned: {}", e)))?;
        let mut map = self.read_map();
        f(&mut map);
        self.write_map(&map)
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self, key: &str) -> Option<TokenEntry> {
        self.read_map().remove(key)
    }

    fn save(&self, key: &str, entry: &TokenEntry) -> Result<(), StoreError> {
        self.update(|map| {
            map.insert(key.to_string(), entry.clone());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(|map| {
            map.remove(key);
        })
    }
}
