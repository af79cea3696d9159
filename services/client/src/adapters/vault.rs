//! services/client/src/adapters/vault.rs
//!
//! File-backed implementation of the `SessionVault` port. The vault is a
//! directory holding exactly two fixed keys, a `token` file and a
//! `user.json` file, mirroring the two durable-storage keys the session
//! contract requires. Load is both-or-nothing: a missing or unparsable
//! file yields no session rather than an error.

use learnhub_core::domain::{Role, StoredSession, UserAccount};
use learnhub_core::ports::{PortError, PortResult, SessionVault};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

const TOKEN_KEY: &str = "token";
const USER_KEY: &str = "user.json";

/// A session vault persisting to two files in one directory.
pub struct FileVault {
    dir: PathBuf,
}

impl FileVault {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn token_path(&self) -> PathBuf {
        self.dir.join(TOKEN_KEY)
    }

    fn user_path(&self) -> PathBuf {
        self.dir.join(USER_KEY)
    }
}

//=========================================================================================
// "Impure" Stored Record Struct
//=========================================================================================

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserBlob {
    id: u64,
    email: String,
    display_name: String,
    role: String,
}

impl UserBlob {
    fn from_domain(user: &UserAccount) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            role: match user.role {
                Role::Student => "STUDENT",
                Role::Instructor => "INSTRUCTOR",
                Role::Admin => "ADMIN",
            }
            .to_string(),
        }
    }

    fn to_domain(self) -> UserAccount {
        UserAccount {
            id: self.id,
            email: self.email,
            display_name: self.display_name,
            role: match self.role.as_str() {
                "INSTRUCTOR" => Role::Instructor,
                "ADMIN" => Role::Admin,
                _ => Role::Student,
            },
        }
    }
}

//=========================================================================================
// `SessionVault` Trait Implementation
//=========================================================================================

impl SessionVault for FileVault {
    fn load(&self) -> Option<StoredSession> {
        let token = fs::read_to_string(self.token_path()).ok()?;
        let token = token.trim().to_string();
        if token.is_empty() {
            return None;
        }
        let raw = fs::read_to_string(self.user_path()).ok()?;
        let blob: UserBlob = match serde_json::from_str(&raw) {
            Ok(blob) => blob,
            Err(e) => {
                debug!(error = %e, "stored user blob is unparsable, ignoring session");
                return None;
            }
        };
        Some(StoredSession {
            user: blob.to_domain(),
            token,
        })
    }

    fn store(&self, session: &StoredSession) -> PortResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| PortError::Transport(e.to_string()))?;
        let blob = serde_json::to_string(&UserBlob::from_domain(&session.user))
            .map_err(|e| PortError::Transport(e.to_string()))?;
        fs::write(self.token_path(), &session.token)
            .map_err(|e| PortError::Transport(e.to_string()))?;
        fs::write(self.user_path(), blob).map_err(|e| PortError::Transport(e.to_string()))?;
        Ok(())
    }

    fn clear(&self) {
        let _ = fs::remove_file(self.token_path());
        let _ = fs::remove_file(self.user_path());
    }
}
