// On-disk credential persistence.
//
// Layout under the storage root:
//   token/<username>.json   one credential record per identity
//   client-id               durable client identity (UUID v4)
//
// Directories are created on demand. Reads are lenient: a record that
// cannot be read or parsed is treated as absent.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Error;
use crate::models::TokenInfo;

const TOKEN_DIR: &str = "token";
const CLIENT_ID_FILE: &str = "client-id";

/// File-backed store for tokens and the client identity.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    root: PathBuf,
}

impl CredentialStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the token record for `username`.
    pub fn token_path(&self, username: &str) -> PathBuf {
        self.root
            .join(TOKEN_DIR)
            .join(format!("{}.json", urlencoding::encode(username)))
    }

    pub fn client_id_path(&self) -> PathBuf {
        self.root.join(CLIENT_ID_FILE)
    }

    /// Load the persisted token for `username`, if any.
    pub fn load_token(&self, username: &str) -> Option<TokenInfo> {
        let path = self.token_path(username);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read token record");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unparseable token record");
                None
            }
        }
    }

    /// Persist `token` as the record for `username`.
    pub fn save_token(&self, username: &str, token: &TokenInfo) -> Result<(), Error> {
        let path = self.token_path(username);
        ensure_parent(&path)?;
        let json = serde_json::to_string(token).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })?;
        fs::write(&path, json).map_err(|e| Error::storage(&path, e))?;
        debug!(path = %path.display(), "token record saved");
        Ok(())
    }

    /// Read the client identity, creating and persisting a new one if absent.
    ///
    /// Returns the identity and whether it was freshly created.
    pub fn load_or_create_client_id(&self) -> Result<(String, bool), Error> {
        let path = self.client_id_path();
        match fs::read_to_string(&path) {
            Ok(existing) if !existing.trim().is_empty() => {
                return Ok((existing.trim().to_owned(), false));
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::storage(&path, e)),
        }

        let client_id = uuid::Uuid::new_v4().to_string();
        ensure_parent(&path)?;
        fs::write(&path, &client_id).map_err(|e| Error::storage(&path, e))?;
        debug!(path = %path.display(), "created client identity");
        Ok((client_id, true))
    }
}

fn ensure_parent(path: &Path) -> Result<(), Error> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| Error::storage(dir, e))?;
    }
    Ok(())
}
