//! Resolved repository credentials.

use std::fmt;

/// Credentials used to open a repository.
///
/// Resolved once from configuration before any action runs.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Repository password (direct repositories).
    pub password: Option<String>,
}

impl Credentials {
    pub fn with_password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
