//! Microsoft Graph `/me` profile lookup.

use calview_core::AuthError;
use serde::{Deserialize, Serialize};

const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Subset of the Graph user resource needed to build a [`crate::User`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphProfile {
    pub id: String,
    pub display_name: Option<String>,
    pub mail: Option<String>,
    pub user_principal_name: Option<String>,
}

impl GraphProfile {
    /// Primary mailbox, falling back to the sign-in name for accounts without one.
    pub fn email(&self) -> Option<&str> {
        self.mail
            .as_deref()
            .or(self.user_principal_name.as_deref())
    }
}

pub struct GraphProfileClient {
    client: reqwest::Client,
    base_url: String,
}

impl GraphProfileClient {
    pub fn new() -> Self {
        Self::with_base_url(GRAPH_API_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the signed-in user's profile.
    #[tracing::instrument(skip(self, access_token), level = "info")]
    pub async fn fetch_profile(&self, access_token: &str) -> Result<GraphProfile, AuthError> {
        let url = format!("{}/me", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::ProfileFailed(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Err(AuthError::InvalidToken);
        }
        if status.as_u16() == 403 {
            return Err(AuthError::PermissionDenied);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AuthError::ProfileFailed(format!("{}: {}", status, text)));
        }

        response
            .json::<GraphProfile>()
            .await
            .map_err(|e| AuthError::ProfileFailed(format!("JSON parse error: {}", e)))
    }
}

impl Default for GraphProfileClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_profile() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("Authorization", "Bearer graph_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "user-1",
                "displayName": "Ada Lovelace",
                "mail": null,
                "userPrincipalName": "ada@contoso.com"
            })))
            .mount(&mock_server)
            .await;

        let client = GraphProfileClient::with_base_url(&mock_server.uri());
        let profile = client.fetch_profile("graph_token").await.unwrap();

        assert_eq!(profile.id, "user-1");
        assert_eq!(profile.display_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(profile.email(), Some("ada@contoso.com"));
    }

    #[tokio::test]
    async fn test_fetch_profile_unauthorized() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let client = GraphProfileClient::with_base_url(&mock_server.uri());
        let result = client.fetch_profile("stale").await;

        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_fetch_profile_server_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let client = GraphProfileClient::with_base_url(&mock_server.uri());
        let result = client.fetch_profile("token").await;

        match result {
            Err(AuthError::ProfileFailed(msg)) => assert!(msg.contains("500")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_email_prefers_mail() {
        let profile = GraphProfile {
            id: "1".into(),
            display_name: None,
            mail: Some("mail@contoso.com".into()),
            user_principal_name: Some("upn@contoso.com".into()),
        };
        assert_eq!(profile.email(), Some("mail@contoso.com"));
    }
}
