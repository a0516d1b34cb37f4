//! Execution levels for command access control.
//!
//! Provides hierarchical permissions for commands and users.

use std::str::FromStr;

use thiserror::Error;

/// Privilege level of a user, or the level a command requires.
///
/// Levels are ordered from least to most privileged:
/// `User < Admin < SuperAdmin`
///
/// `All` is the "no restriction" sentinel. It sorts below every real level,
/// so a command requiring `All` is satisfied by anyone.
///
/// # Examples
///
/// ```
/// use rsh_console::core::ExecLevel;
///
/// assert!(ExecLevel::Admin.satisfies(ExecLevel::User));
/// assert!(!ExecLevel::Admin.satisfies(ExecLevel::SuperAdmin));
/// assert!(ExecLevel::User.satisfies(ExecLevel::All));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ExecLevel {
    /// Open to every authenticated session.
    All = 0,
    /// Basic user.
    #[default]
    User = 1,
    /// Administrator.
    Admin = 2,
    /// Unrestricted operator.
    SuperAdmin = 3,
}

impl ExecLevel {
    /// Get the display name for this level.
    pub fn name(&self) -> &'static str {
        match self {
            ExecLevel::All => "All",
            ExecLevel::User => "User",
            ExecLevel::Admin => "Admin",
            ExecLevel::SuperAdmin => "SuperAdmin",
        }
    }

    /// Check whether a caller at this level may run something requiring `required`.
    #[inline]
    pub fn satisfies(self, required: ExecLevel) -> bool {
        required == ExecLevel::All || self >= required
    }
}

impl std::fmt::Display for ExecLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Returned when a string does not name an [`ExecLevel`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown exec level '{0}' (expected all, user, admin or superadmin)")]
pub struct UnknownLevel(pub String);

impl FromStr for ExecLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(ExecLevel::All),
            "user" => Ok(ExecLevel::User),
            "admin" => Ok(ExecLevel::Admin),
            "superadmin" | "super_admin" => Ok(ExecLevel::SuperAdmin),
            _ => Err(UnknownLevel(s.to_string())),
        }
    }
}
