use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin of a persisted channel message. Stored as lowercase text in the
/// `sender_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    System,
    Client,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderType::System => "system",
            SenderType::Client => "client",
        }
    }
}

impl fmt::Display for SenderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role carried by an authenticated caller's token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallerRole {
    Admin,
    User,
}

impl CallerRole {
    /// Maps the free-form `role` claim onto a role. Anything that is not an
    /// admin claim is treated as a regular authenticated user.
    pub fn from_claim(claim: &str) -> Self {
        if claim.eq_ignore_ascii_case("admin") {
            CallerRole::Admin
        } else {
            CallerRole::User
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, CallerRole::Admin)
    }
}

impl fmt::Display for CallerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallerRole::Admin => write!(f, "admin"),
            CallerRole::User => write!(f, "user"),
        }
    }
}

/// What a caller wants to do on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Join,
    Send,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_type_round_trips_through_text() {
        assert_eq!(SenderType::System.as_str(), "system");
        assert_eq!(SenderType::Client.as_str(), "client");
        let parsed: SenderType = serde_json::from_str("\"client\"").unwrap();
        assert_eq!(parsed, SenderType::Client);
    }

    #[test]
    fn caller_role_from_claim_is_case_insensitive() {
        assert_eq!(CallerRole::from_claim("Admin"), CallerRole::Admin);
        assert_eq!(CallerRole::from_claim("ADMIN"), CallerRole::Admin);
        assert_eq!(CallerRole::from_claim("user"), CallerRole::User);
        assert_eq!(CallerRole::from_claim("anything-else"), CallerRole::User);
    }
}
