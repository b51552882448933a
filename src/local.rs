//! Local files kept next to the configuration.
//!
//! Nothing stored here is a source of truth: the auth token and the echoed
//! activity feed only make restarts faster, and are dropped when unreadable.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StorageError;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Read a JSON file; `Ok(None)` when it does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path)(e)),
    };
    Ok(Some(serde_json::from_str(&data)?))
}

/// Write JSON via temp file + rename.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_string_pretty(value)?;
    let mut f = File::create(&tmp).map_err(io_err(&tmp))?;
    f.write_all(data.as_bytes()).map_err(io_err(&tmp))?;
    f.flush().map_err(io_err(&tmp))?;
    fs::rename(&tmp, path).map_err(io_err(path))?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredSession {
    token: String,
    #[serde(default)]
    email: Option<String>,
}

/// Where the auth token lives between invocations.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(data_dir: &Path) -> Self {
        TokenStore {
            path: data_dir.join("session.json"),
        }
    }

    pub fn load(&self) -> Option<String> {
        match read_json::<StoredSession>(&self.path) {
            Ok(stored) => stored.map(|s| s.token),
            Err(e) => {
                warn!(error = %e, "discarding unreadable session file");
                None
            }
        }
    }

    /// Email remembered by the last successful login, for prefilling prompts.
    pub fn remembered_email(&self) -> Option<String> {
        read_json::<StoredSession>(&self.path).ok().flatten().and_then(|s| s.email)
    }

    pub fn save(&self, token: &str, email: Option<&str>) {
        let stored = StoredSession {
            token: token.to_string(),
            email: email.map(str::to_string),
        };
        if let Err(e) = write_json_atomic(&self.path, &stored) {
            warn!(error = %e, "could not persist session token");
        }
    }

    pub fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, "could not remove session file"),
        }
    }
}
