use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::error::CredentialError;

pub const TWITCH_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// The grant sent to the identity provider's token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    AuthorizationCode { code: String, redirect_uri: String },
    RefreshToken(String),
    ClientCredentials,
}

impl Grant {
    pub fn grant_type(&self) -> &'static str {
        match self {
            Grant::AuthorizationCode { .. } => "authorization_code",
            Grant::RefreshToken(_) => "refresh_token",
            Grant::ClientCredentials => "client_credentials",
        }
    }

    /// Grant-specific form fields, on top of client id / secret / grant_type.
    fn fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            Grant::AuthorizationCode { code, redirect_uri } => {
                vec![("code", code.as_str()), ("redirect_uri", redirect_uri.as_str())]
            }
            Grant::RefreshToken(token) => vec![("refresh_token", token.as_str())],
            Grant::ClientCredentials => vec![],
        }
    }
}

/// Successful token endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

/// A single outbound token exchange. Implementations never retry.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, grant: &Grant) -> Result<TokenResponse, CredentialError>;
}

/// Token exchange against the Twitch identity provider.
pub struct TwitchTokenExchange {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl TwitchTokenExchange {
    pub fn new(
        http: Client,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Self {
        TwitchTokenExchange {
            http,
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }
}

#[async_trait]
impl TokenExchange for TwitchTokenExchange {
    async fn exchange(&self, grant: &Grant) -> Result<TokenResponse, CredentialError> {
        let mut form = vec![
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", grant.grant_type()),
        ];
        form.extend(grant.fields());

        debug!("Requesting {} token from {}", grant.grant_type(), self.token_url);

        let resp = self.http.post(&self.token_url).form(&form).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CredentialError::RenewalFailed(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        Ok(resp.json::<TokenResponse>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_fields() {
        let grant = Grant::AuthorizationCode {
            code: "abc".into(),
            redirect_uri: "http://localhost/cb".into(),
        };
        assert_eq!(grant.grant_type(), "authorization_code");
        assert_eq!(
            grant.fields(),
            vec![("code", "abc"), ("redirect_uri", "http://localhost/cb")]
        );

        let grant = Grant::RefreshToken("r1".into());
        assert_eq!(grant.grant_type(), "refresh_token");
        assert_eq!(grant.fields(), vec![("refresh_token", "r1")]);

        assert!(Grant::ClientCredentials.fields().is_empty());
    }

    #[test]
    fn test_token_response_without_refresh_token() {
        let raw = r#"{"access_token":"app","expires_in":5011271,"token_type":"bearer"}"#;
        let resp: TokenResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.access_token, "app");
        assert_eq!(resp.refresh_token, None);
        assert_eq!(resp.expires_in, 5011271);
    }

    #[test]
    fn test_token_response_with_refresh_token() {
        let raw = r#"{"access_token":"u","refresh_token":"r","expires_in":14124,"scope":[],"token_type":"bearer"}"#;
        let resp: TokenResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.refresh_token.as_deref(), Some("r"));
    }
}
