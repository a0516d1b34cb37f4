//! User registry: identities, their levels, authorized keys and history.
//!
//! The registry is shared by every session. The identity map sits behind an
//! `RwLock`; each record's history has its own `Mutex`, so sessions of different
//! users never contend on history appends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, warn};

use super::{AuthorizedKey, ExecLevel};

/// Why a connection could not authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No user is registered under this identity.
    #[error("unknown user '{identity}'")]
    UnknownUser { identity: String },

    /// The user exists but has no authorized keys at all.
    #[error("user '{identity}' has no authorized keys")]
    NoAuthorizedKeys { identity: String },

    /// The presented key is not in the user's authorized set.
    #[error("public key rejected for user '{identity}'")]
    KeyRejected { identity: String },
}

/// A registered user.
#[derive(Debug)]
struct UserRecord {
    identity: Box<str>,
    level: ExecLevel,
    keys: HashMap<Vec<u8>, AuthorizedKey>,
    history: Mutex<Vec<String>>,
}

/// Point-in-time copy of a user record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSnapshot {
    pub identity: String,
    pub level: ExecLevel,
    pub keys: Vec<AuthorizedKey>,
    pub history: Vec<String>,
}

/// Registry of users allowed to open sessions.
///
/// # Examples
///
/// ```
/// use rsh_console::core::{ExecLevel, UserRegistry};
///
/// let registry = UserRegistry::new();
/// registry.register_user("alice", ExecLevel::Admin, Vec::new(), Vec::new());
///
/// assert_eq!(registry.level_of("alice"), Some(ExecLevel::Admin));
/// registry.append_history("alice", "status");
/// assert_eq!(registry.history("alice"), Some(vec!["status".to_string()]));
/// ```
#[derive(Debug, Default)]
pub struct UserRegistry {
    users: RwLock<HashMap<Box<str>, Arc<UserRecord>>>,
    history_limit: Option<usize>,
}

impl UserRegistry {
    /// Create a new empty registry with unbounded history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that keeps at most `limit` history entries per user.
    ///
    /// When full, the oldest entry is dropped on append.
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            users: RwLock::default(),
            history_limit: Some(limit),
        }
    }

    /// Register a user, replacing any previous entry with the same identity.
    ///
    /// Returns `true` if the identity was newly registered.
    pub fn register_user(
        &self,
        identity: &str,
        level: ExecLevel,
        keys: impl IntoIterator<Item = AuthorizedKey>,
        history: impl IntoIterator<Item = String>,
    ) -> bool {
        let keys: HashMap<_, _> = keys
            .into_iter()
            .map(|key| (key.wire().to_vec(), key))
            .collect();
        if keys.is_empty() {
            warn!(user = identity, "registered without authorized keys, logins will fail");
        }

        let mut history: Vec<String> = history.into_iter().collect();
        if let Some(limit) = self.history_limit {
            let excess = history.len().saturating_sub(limit);
            history.drain(..excess);
        }

        let record = Arc::new(UserRecord {
            identity: identity.into(),
            level,
            keys,
            history: Mutex::new(history),
        });

        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let is_new = users.insert(identity.into(), record).is_none();
        if !is_new {
            warn!(user = identity, "overwriting existing user registration");
        }
        is_new
    }

    fn record(&self, identity: &str) -> Option<Arc<UserRecord>> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        users.get(identity).cloned()
    }

    /// Look up a user. Not finding one is not an error.
    pub fn lookup(&self, identity: &str) -> Option<UserSnapshot> {
        let record = self.record(identity)?;
        let history = record
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Some(UserSnapshot {
            identity: record.identity.to_string(),
            level: record.level,
            keys: record.keys.values().cloned().collect(),
            history,
        })
    }

    /// Check if an identity is registered.
    pub fn contains(&self, identity: &str) -> bool {
        self.record(identity).is_some()
    }

    /// Level of a registered user.
    pub fn level_of(&self, identity: &str) -> Option<ExecLevel> {
        self.record(identity).map(|r| r.level)
    }

    /// Check a presented wire-encoded key against the user's authorized set.
    pub fn authenticate(&self, identity: &str, key: &[u8]) -> Result<AuthorizedKey, AuthError> {
        let record = self.record(identity).ok_or_else(|| AuthError::UnknownUser {
            identity: identity.to_string(),
        })?;

        if record.keys.is_empty() {
            return Err(AuthError::NoAuthorizedKeys {
                identity: identity.to_string(),
            });
        }

        record
            .keys
            .get(key)
            .cloned()
            .ok_or_else(|| AuthError::KeyRejected {
                identity: identity.to_string(),
            })
    }

    /// Append one executed line to a user's history.
    ///
    /// Returns `false` if the identity is not registered.
    pub fn append_history(&self, identity: &str, line: &str) -> bool {
        let Some(record) = self.record(identity) else {
            return false;
        };

        let mut history = record.history.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(limit) = self.history_limit {
            if limit == 0 {
                return true;
            }
            if history.len() >= limit {
                let excess = history.len() + 1 - limit;
                history.drain(..excess);
            }
        }
        history.push(line.to_string());
        debug!(user = identity, entries = history.len(), "history appended");
        true
    }

    /// Copy of a user's history, oldest first.
    pub fn history(&self, identity: &str) -> Option<Vec<String>> {
        let record = self.record(identity)?;
        let history = record.history.lock().unwrap_or_else(PoisonError::into_inner);
        Some(history.clone())
    }

    /// Drop a user's history. Returns the number of entries removed.
    pub fn clear_history(&self, identity: &str) -> Option<usize> {
        let record = self.record(identity)?;
        let mut history = record.history.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = history.len();
        history.clear();
        Some(removed)
    }

    /// All registered identities, sorted.
    pub fn identities(&self) -> Vec<String> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = users.keys().map(|k| k.to_string()).collect();
        names.sort();
        names
    }

    /// Snapshot every user, sorted by identity.
    pub fn snapshot(&self) -> Vec<UserSnapshot> {
        self.identities()
            .iter()
            .filter_map(|identity| self.lookup(identity))
            .collect()
    }

    /// Get the number of registered users.
    pub fn len(&self) -> usize {
        self.users.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check if no users are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-user history cap, if any.
    pub fn history_limit(&self) -> Option<usize> {
        self.history_limit
    }
}
