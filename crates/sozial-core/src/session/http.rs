//! REST identity provider binding.
//!
//! Talks to a hosted auth service: JSON sign-up and password-grant
//! endpoints authenticated with a public API key, plus token revocation on
//! sign-out. Server error messages are extracted and surfaced verbatim.

use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use super::{validate_credentials, AuthError, AuthResult, Identity, IdentityProvider};

/// HTTP [`IdentityProvider`] for the hosted auth API.
pub struct HttpIdentityProvider {
    auth_url: String,
    api_key: String,
    client: Client,
    // Last issued access token, kept so sign-out can revoke it.
    access_token: Mutex<Option<String>>,
}

impl HttpIdentityProvider {
    pub fn new(url: impl AsRef<str>, api_key: impl Into<String>) -> AuthResult<Self> {
        let auth_url = normalize_auth_url(url.as_ref())?;
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Auth API key must not be empty",
            ));
        }

        Ok(Self {
            auth_url,
            api_key,
            client: Client::builder().build()?,
            access_token: Mutex::new(None),
        })
    }

    fn public_request(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn send_auth_request(&self, request: RequestBuilder) -> AuthResult<AuthResponse> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }
        Ok(response.json::<AuthResponse>().await?)
    }

    fn remember_token(&self, token: Option<String>) {
        *self.access_token.lock().expect("token lock poisoned") = token;
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<Identity> {
        validate_credentials(email, password)?;

        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });
        let request = self.public_request(
            self.client
                .post(format!("{}/signup", self.auth_url))
                .json(&payload),
        );

        let response = self.send_auth_request(request).await?;
        self.remember_token(response.access_token.clone());
        response.into_identity()
    }

    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Identity> {
        validate_credentials(email, password)?;

        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });
        let request = self.public_request(
            self.client
                .post(format!("{}/token", self.auth_url))
                .query(&[("grant_type", "password")])
                .json(&payload),
        );

        let response = self.send_auth_request(request).await?;
        self.remember_token(response.access_token.clone());
        response.into_identity()
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let token = self
            .access_token
            .lock()
            .expect("token lock poisoned")
            .clone();
        let Some(token) = token else {
            // Nothing issued by this provider instance; nothing to revoke.
            return Ok(());
        };

        let response = self
            .client
            .post(format!("{}/logout", self.auth_url))
            .header("apikey", &self.api_key)
            .bearer_auth(&token)
            .send()
            .await?;

        // An already-expired token is as signed-out as it gets.
        if !(response.status().is_success() || response.status() == StatusCode::UNAUTHORIZED) {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }

        self.remember_token(None);
        Ok(())
    }
}

fn normalize_auth_url(url: &str) -> AuthResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AuthError::InvalidConfiguration("Auth URL must not be empty"));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(AuthError::InvalidConfiguration(
            "Auth URL must include http:// or https://",
        ));
    }
    if trimmed.ends_with("/auth/v1") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/auth/v1"))
    }
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: Option<String>,
    user: Option<UserPayload>,
}

impl AuthResponse {
    fn into_identity(self) -> AuthResult<Identity> {
        let user = self.user.ok_or_else(|| {
            AuthError::Api("Auth response did not include a user".to_string())
        })?;
        Ok(Identity {
            id: user.id,
            email: user.email,
        })
    }
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
    msg: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorPayload>(body) {
        if let Some(message) = payload
            .message
            .or(payload.msg)
            .or(payload.error_description)
            .or(payload.error)
        {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = crate::util::compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_auth_url_appends_auth_path() {
        let normalized = normalize_auth_url("https://auth.sozial.app").unwrap();
        assert_eq!(normalized, "https://auth.sozial.app/auth/v1");
    }

    #[test]
    fn normalize_auth_url_keeps_existing_auth_path() {
        let normalized = normalize_auth_url("https://auth.sozial.app/auth/v1").unwrap();
        assert_eq!(normalized, "https://auth.sozial.app/auth/v1");
    }

    #[test]
    fn normalize_auth_url_rejects_bare_hosts() {
        assert!(normalize_auth_url("auth.sozial.app").is_err());
        assert!(normalize_auth_url("  ").is_err());
    }

    #[test]
    fn parse_api_error_prefers_server_message() {
        let message = parse_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"msg":"Invalid email or password"}"#,
        );
        assert_eq!(message, "Invalid email or password (400)");
    }

    #[test]
    fn parse_api_error_falls_back_to_status() {
        let message = parse_api_error(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert_eq!(message, "HTTP 500");
    }

    #[test]
    fn response_without_user_is_an_error() {
        let response = AuthResponse {
            access_token: Some("token".to_string()),
            user: None,
        };
        assert!(response.into_identity().is_err());
    }

    #[test]
    fn empty_api_key_rejected() {
        assert!(HttpIdentityProvider::new("https://auth.sozial.app", "  ").is_err());
    }
}
