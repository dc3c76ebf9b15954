use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::enums::CallerRole;

/// JWT claims accepted by this service. Tokens are verified here, never
/// minted; session issuance lives elsewhere.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Username.
    pub sub: String,
    pub user_id: i32,
    #[serde(default)]
    pub role: String,
    pub exp: usize,
}

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i32,
    pub username: String,
    pub role: CallerRole,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: Claims) -> Self {
        Self {
            id: claims.user_id,
            username: claims.sub,
            role: CallerRole::from_claim(&claims.role),
        }
    }
}

/// Body of a client publish request.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub success: bool,
    pub message_id: Uuid,
}
