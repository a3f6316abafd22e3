//! Durable storage for the session token.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};

/// Key under which the token is persisted.
pub const TOKEN_KEY: &str = "token";

/// Storage whose lifetime is independent of the in-memory stores.
pub trait TokenStorage: Send + Sync {
    fn load(&self) -> Option<String>;
    fn store(&self, token: &str) -> io::Result<()>;
    fn remove(&self) -> io::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> Option<String> {
        self.token.lock().ok().and_then(|t| t.clone())
    }

    fn store(&self, token: &str) -> io::Result<()> {
        let mut slot = self.token.lock().map_err(|_| poisoned())?;
        *slot = Some(token.to_string());
        Ok(())
    }

    fn remove(&self) -> io::Result<()> {
        let mut slot = self.token.lock().map_err(|_| poisoned())?;
        *slot = None;
        Ok(())
    }
}

/// Token persisted as a JSON object (`{"token": "..."}`) in a file. Other
/// keys in the file are preserved.
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn read_map(&self) -> io::Result<Map<String, Value>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => Ok(map),
                _ => Ok(Map::new()),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e),
        }
    }

    fn write_map(&self, map: Map<String, Value>) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(&Value::Object(map))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&self.path, raw)
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> Option<String> {
        self.read_map()
            .ok()?
            .get(TOKEN_KEY)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn store(&self, token: &str) -> io::Result<()> {
        let mut map = self.read_map()?;
        map.insert(TOKEN_KEY.to_string(), Value::String(token.to_string()));
        self.write_map(map)
    }

    fn remove(&self) -> io::Result<()> {
        let mut map = self.read_map()?;
        if map.remove(TOKEN_KEY).is_some() {
            self.write_map(map)?;
        }
        Ok(())
    }
}

fn poisoned() -> io::Error {
    io::Error::other("token storage lock poisoned")
}
