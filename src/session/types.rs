use serde::{Deserialize, Serialize};

/// Claims embedded in the session JWT.
///
/// `user_id` is the authenticated player's identity; `is_admin` grants the
/// ranked-build check bypass when starting plays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub user_id: String,
    pub is_admin: bool,
    pub exp: usize,
    pub iat: usize,
}

/// Request payload for creating a session token
#[derive(Debug, Deserialize)]
pub struct SessionCreateRequest {
    /// Existing user id to issue a token for; generated when absent
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

/// Response containing the issued bearer token
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    pub user_id: String,
}
