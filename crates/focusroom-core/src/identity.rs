use serde::{Deserialize, Serialize};

/// Opaque user key used to namespace persisted timer state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Key used when no user is signed in.
    pub const GUEST: &'static str = "guest";

    pub fn guest() -> Self {
        Self(Self::GUEST.to_string())
    }

    /// Blank or missing keys map to [`Identity::guest`].
    pub fn from_option(key: Option<&str>) -> Self {
        match key.map(str::trim) {
            Some(k) if !k.is_empty() => Self(k.to_string()),
            _ => Self::guest(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_guest(&self) -> bool {
        self.0 == Self::GUEST
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::guest()
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
