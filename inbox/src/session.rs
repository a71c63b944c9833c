use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use iloved_common::identity::UserId;
use iloved_common::profile::UserProfile;
use serde::{Deserialize, Serialize};

use crate::error::{InboxError, InboxResult};

/// The signed-in user, passed to every operation that acts on their behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: UserId,
    pub name: String,
    pub is_seller: bool,
}

impl Session {
    pub fn new(user: UserId, name: impl Into<String>, is_seller: bool) -> Self {
        Self {
            user,
            name: name.into(),
            is_seller,
        }
    }

    pub fn from_profile(profile: &UserProfile) -> Self {
        Self::new(profile.email.clone(), profile.name.clone(), profile.is_seller)
    }

    pub fn require_seller(&self) -> InboxResult<()> {
        if !self.is_seller {
            return Err(InboxError::NotSeller(self.user.clone()));
        }
        Ok(())
    }
}

/// JSON file holding the persisted session between runs.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/iloved/session.json`, or under `/tmp` when the platform
    /// has no data directory.
    pub fn default_location() -> Self {
        let data = dirs::data_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        Self::new(data.join("iloved").join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when nobody is signed in.
    pub fn load(&self) -> InboxResult<Option<Session>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let session: Session = serde_json::from_str(&data)?;
        tracing::info!(user = %session.user, path = %self.path.display(), "loaded session");
        Ok(Some(session))
    }

    pub fn save(&self, session: &Session) -> InboxResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(session)?)?;
        tracing::info!(user = %session.user, path = %self.path.display(), "saved session");
        Ok(())
    }

    /// Sign out. Clearing an absent session is not an error.
    pub fn clear(&self) -> InboxResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
