use calview_core::AuthError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::profile::{GraphProfile, GraphProfileClient};

/// Delegated permissions the calendar needs from Microsoft Graph.
pub const GRAPH_SCOPES: &[&str] = &["User.Read", "Calendars.Read", "offline_access"];

/// Signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
    /// Signed in through Microsoft (live calendar available)
    pub microsoft_account: bool,
}

/// Bearer token handed over by the identity platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphToken {
    /// Access token for API requests
    pub access_token: String,

    /// Token expiration timestamp (Unix timestamp), if known
    pub expires_at: Option<i64>,

    /// Scopes granted to this token
    pub scopes: Vec<String>,
}

impl GraphToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
            scopes: GRAPH_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Check if the token needs refresh (within 5 minutes of expiry)
    pub fn needs_refresh(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => chrono::Utc::now().timestamp() >= expires_at - 300,
            None => false,
        }
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => chrono::Utc::now().timestamp() >= expires_at,
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
struct SessionState {
    user: User,
    token: Option<GraphToken>,
}

/// In-memory sign-in state. Nothing is written to disk.
#[derive(Debug, Default)]
pub struct AuthSession {
    state: RwLock<Option<SessionState>>,
}

impl AuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local email/password sign-in. Any well-formed email and non-empty
    /// password is accepted; there is no account store behind it.
    pub fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = email.trim();
        let Some((local, domain)) = email.split_once('@') else {
            return Err(AuthError::InvalidEmail(email.to_string()));
        };
        if local.is_empty() || domain.is_empty() {
            return Err(AuthError::InvalidEmail(email.to_string()));
        }
        if password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let user = User {
            id: format!("local:{}", email.to_lowercase()),
            email: email.to_string(),
            name: local.to_string(),
            avatar: None,
            microsoft_account: false,
        };

        *self.state.write() = Some(SessionState {
            user: user.clone(),
            token: None,
        });
        tracing::info!(user = %user.email, "Signed in with local account");
        Ok(user)
    }

    /// Sign in with a Microsoft token and the profile it belongs to.
    pub fn sign_in_microsoft(&self, token: GraphToken, profile: GraphProfile) -> User {
        let email = profile.email().unwrap_or_default().to_string();
        let name = profile
            .display_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        let user = User {
            id: profile.id,
            email,
            name,
            avatar: None,
            microsoft_account: true,
        };

        *self.state.write() = Some(SessionState {
            user: user.clone(),
            token: Some(token),
        });
        tracing::info!(user = %user.email, "Signed in with Microsoft account");
        user
    }

    /// Look up the profile for `token` and sign in with it.
    pub async fn sign_in_with_graph(
        &self,
        profiles: &GraphProfileClient,
        token: GraphToken,
    ) -> Result<User, AuthError> {
        if token.is_expired() {
            return Err(AuthError::TokenExpired);
        }
        let profile = profiles.fetch_profile(&token.access_token).await?;
        Ok(self.sign_in_microsoft(token, profile))
    }

    pub fn sign_out(&self) {
        if let Some(state) = self.state.write().take() {
            tracing::info!(user = %state.user.email, "Signed out");
        }
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.read().as_ref().map(|s| s.user.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().is_some()
    }

    pub fn is_microsoft_account(&self) -> bool {
        self.state
            .read()
            .as_ref()
            .is_some_and(|s| s.user.microsoft_account)
    }

    /// Bearer credential for live calendar calls.
    ///
    /// `Ok(None)` means the session has no live calendar (signed out, or a
    /// local account). An expired token is an error so the caller can send
    /// the user back to sign-in instead of showing placeholder data.
    pub fn access_token(&self) -> Result<Option<String>, AuthError> {
        let state = self.state.read();
        match state.as_ref().and_then(|s| s.token.as_ref()) {
            None => Ok(None),
            Some(token) if token.is_expired() => Err(AuthError::TokenExpired),
            Some(token) => {
                if token.needs_refresh() {
                    tracing::debug!("Graph token expires within 5 minutes");
                }
                Ok(Some(token.access_token.clone()))
            }
        }
    }
}
