//! Session and user model

use serde::{Deserialize, Serialize};

/// Authenticated CRM user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(alias = "_id")]
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

/// Current user session, injected into the editor environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: User,
    /// Bearer token attached to backend calls, when the backend issued one
    pub token: Option<String>,
}

impl Session {
    pub fn new(user: User) -> Self {
        Self { user, token: None }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Response of the authentication check endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthCheckResponse {
    pub authenticated: bool,
}
