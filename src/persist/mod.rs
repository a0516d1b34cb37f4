//! Persistence layer for shell configuration.
//!
//! Provides RON-based save/load for session options and the user roster,
//! including each user's authorized keys and command history.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::{ExecLevel, KeyError, UserRegistry, parse_authorized_keys};
use crate::server::SessionOptions;

/// Default config file name.
pub const DEFAULT_CONFIG_FILE: &str = "rsh.ron";

/// Serializable shell configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfigFile {
    /// Prompt written before every read.
    pub prompt: String,
    /// Seconds without input before a session is closed. `None` disables it.
    pub idle_timeout_secs: Option<u64>,
    /// Per-user history cap. `None` keeps everything.
    pub history_limit: Option<usize>,
    pub colored: bool,
    pub greeting: bool,
    pub users: Vec<UserEntry>,
}

/// One user in the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub name: String,
    pub level: ExecLevel,
    /// OpenSSH public key lines, as in an `authorized_keys` file.
    #[serde(default)]
    pub authorized_keys: Vec<String>,
    #[serde(default)]
    pub history: Vec<String>,
}

impl Default for ShellConfigFile {
    fn default() -> Self {
        let options = SessionOptions::default();
        Self {
            prompt: options.prompt,
            idle_timeout_secs: options.idle_timeout.map(|d| d.as_secs()),
            history_limit: None,
            colored: options.colored,
            greeting: options.greeting,
            users: Vec::new(),
        }
    }
}

impl ShellConfigFile {
    /// Create a config with default options and no users.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        ron::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save config to a RON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                    path: parent.display().to_string(),
                    message: e.to_string(),
                })?;
            }
        }

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let contents = ron::ser::to_string_pretty(self, pretty)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, contents).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Load config from file, returning default if file doesn't exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Session options described by this config.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            prompt: self.prompt.clone(),
            idle_timeout: self.idle_timeout_secs.map(Duration::from_secs),
            colored: self.colored,
            greeting: self.greeting,
        }
    }

    /// A registry honoring `history_limit`, seeded with every user.
    pub fn build_registry(&self) -> Result<UserRegistry, ConfigError> {
        let registry = match self.history_limit {
            Some(limit) => UserRegistry::with_history_limit(limit),
            None => UserRegistry::new(),
        };
        self.apply_to_registry(&registry)?;
        Ok(registry)
    }

    /// Register every user in the roster. Keys are validated before anything
    /// is registered, so a bad key leaves the registry untouched.
    ///
    /// Returns the number of users registered.
    pub fn apply_to_registry(&self, registry: &UserRegistry) -> Result<usize, ConfigError> {
        let mut parsed = Vec::with_capacity(self.users.len());
        for user in &self.users {
            let keys = parse_authorized_keys(&user.authorized_keys.join("\n")).map_err(|source| {
                ConfigError::Key {
                    user: user.name.clone(),
                    source,
                }
            })?;
            parsed.push((user, keys));
        }

        for (user, keys) in parsed {
            debug!(user = %user.name, level = %user.level, keys = keys.len(), "loaded user");
            registry.register_user(&user.name, user.level, keys, user.history.iter().cloned());
        }
        info!(users = self.users.len(), "applied user roster");
        Ok(self.users.len())
    }

    /// Copy each listed user's current history back out of `registry`.
    pub fn extract_users(&mut self, registry: &UserRegistry) {
        for user in &mut self.users {
            if let Some(history) = registry.history(&user.name) {
                user.history = history;
            }
        }
    }
}

/// Errors that can occur during config operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("IO error for '{path}': {message}")]
    Io { path: String, message: String },

    #[error("Parse error for '{path}': {message}")]
    Parse { path: String, message: String },

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("user '{user}': {source}")]
    Key {
        user: String,
        #[source]
        source: KeyError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::keys::tests::{ALICE_KEY, BOB_KEY};
    use crate::core::AuthorizedKey;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn sample() -> ShellConfigFile {
        ShellConfigFile {
            prompt: "ops> ".to_string(),
            idle_timeout_secs: Some(300),
            history_limit: Some(100),
            colored: true,
            greeting: false,
            users: vec![
                UserEntry {
                    name: "alice".to_string(),
                    level: ExecLevel::SuperAdmin,
                    authorized_keys: vec![ALICE_KEY.to_string()],
                    history: vec!["whoami".to_string()],
                },
                UserEntry {
                    name: "bob".to_string(),
                    level: ExecLevel::User,
                    authorized_keys: vec![BOB_KEY.to_string()],
                    history: Vec::new(),
                },
            ],
        }
    }

    #[test]
    fn test_config_file_roundtrip() {
        let config = sample();
        let temp = NamedTempFile::new().unwrap();
        config.save(temp.path()).unwrap();

        let loaded = ShellConfigFile::load(temp.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etc").join(DEFAULT_CONFIG_FILE);
        sample().save(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_config_file_load_missing() {
        let result = ShellConfigFile::load("nonexistent_file.ron");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_config_file_load_or_default() {
        let config = ShellConfigFile::load_or_default("nonexistent_file.ron");
        assert!(config.users.is_empty());
        assert_eq!(config.session_options(), SessionOptions::default());
    }

    #[test]
    fn test_config_parse_ron() {
        let ron_content = format!(
            r#"(
    prompt: "rsh$ ",
    idle_timeout_secs: None,
    users: [
        (
            name: "alice",
            level: Admin,
            authorized_keys: ["{}"],
            history: ["status"],
        ),
    ],
)"#,
            ALICE_KEY
        );

        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(ron_content.as_bytes()).unwrap();
        temp.flush().unwrap();

        let config = ShellConfigFile::load(temp.path()).unwrap();
        assert_eq!(config.prompt, "rsh$ ");
        assert_eq!(config.session_options().idle_timeout, None);
        assert!(config.greeting);
        assert_eq!(config.users[0].level, ExecLevel::Admin);
    }

    #[test]
    fn test_config_parse_error() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"(users: [(name: \"x\", level: Root)])").unwrap();
        temp.flush().unwrap();
        assert!(matches!(
            ShellConfigFile::load(temp.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_build_registry() {
        let registry = sample().build_registry().unwrap();
        assert_eq!(registry.identities(), vec!["alice", "bob"]);
        assert_eq!(registry.level_of("alice"), Some(ExecLevel::SuperAdmin));
        assert_eq!(registry.history("alice"), Some(vec!["whoami".to_string()]));
        assert_eq!(registry.history_limit(), Some(100));

        let key = AuthorizedKey::from_openssh(BOB_KEY).unwrap();
        assert!(registry.authenticate("bob", key.wire()).is_ok());
    }

    #[test]
    fn test_bad_key_registers_nobody() {
        let mut config = sample();
        config.users[1].authorized_keys.push("ssh-ed25519 garbage".to_string());

        let registry = UserRegistry::new();
        let err = config.apply_to_registry(&registry).unwrap_err();
        assert!(matches!(err, ConfigError::Key { ref user, .. } if user == "bob"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_extract_users_writes_history_back() {
        let mut config = sample();
        let registry = config.build_registry().unwrap();
        registry.append_history("bob", "status");

        config.extract_users(&registry);
        assert_eq!(config.users[1].history, vec!["status".to_string()]);
        assert_eq!(config.users[0].history, vec!["whoami".to_string()]);
    }
}
