//! Bot account identity.

/// Login identity for one server account.
///
/// Constructed once at process start from configuration; the account's
/// connection transitions through its lifecycle states but the account
/// itself is never recreated.
#[derive(Debug, Clone)]
pub struct BotAccount {
    /// Display name used to log in and shown to other users.
    pub name: String,
    /// Account credential for the login exchange.
    pub password: String,
}

impl BotAccount {
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
        }
    }

    /// Normalized user id for this account.
    pub fn user_id(&self) -> String {
        to_user_id(&self.name)
    }
}

/// Normalize a display name to the server's user id form: lowercase with
/// everything but letters and digits removed. Display names differ in
/// casing and punctuation between what users type and what the server
/// reports, so all comparisons go through this.
pub fn to_user_id(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
