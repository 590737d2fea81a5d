//! HTTP client for the companion provisioning service
//!
//! `GET /provision/regCode?productId=..&dsn=..` starts a registration and
//! returns `{regCode, sessionId}`; `GET /provision/accessToken?sessionId=..`
//! returns `{access}` once the user has paired the device.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

use super::flow::{AuthError, Authenticator};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegCodeResponse {
    reg_code: String,
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access: String,
}

/// Companion service authenticator
pub struct CompanionAuthenticator {
    client: reqwest::Client,
    base_url: String,
    product_id: String,
    dsn: String,
    /// Registration session returned with the last code
    session_id: Mutex<Option<String>>,
}

impl CompanionAuthenticator {
    pub fn new(base_url: &str, product_id: &str, dsn: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("mirror-voiced/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            product_id: product_id.to_string(),
            dsn: dsn.to_string(),
            session_id: Mutex::new(None),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/provision/{}", self.base_url, path)
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, AuthError> {
        let url = self.endpoint(path);
        debug!(%url, "companion request");

        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Status(status.as_u16()));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Authenticator for CompanionAuthenticator {
    async fn request_registration_code(&self) -> Result<String, AuthError> {
        let response: RegCodeResponse = self
            .get(
                "regCode",
                &[("productId", self.product_id.as_str()), ("dsn", self.dsn.as_str())],
            )
            .await?;

        *self.session_id.lock() = Some(response.session_id);
        Ok(response.reg_code)
    }

    async fn request_access_token(&self) -> Result<String, AuthError> {
        let session_id = self.session_id.lock().clone().ok_or(AuthError::NoSession)?;

        let response: AccessTokenResponse = self
            .get("accessToken", &[("sessionId", session_id.as_str())])
            .await?;

        Ok(response.access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let auth = CompanionAuthenticator::new("https://companion.local:3000/", "mirror", "0001");
        assert_eq!(
            auth.endpoint("regCode"),
            "https://companion.local:3000/provision/regCode"
        );
    }

    #[test]
    fn test_reg_code_response_parsing() {
        let json = r#"{"regCode":"ABC123","sessionId":"a1b2"}"#;
        let response: RegCodeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.reg_code, "ABC123");
        assert_eq!(response.session_id, "a1b2");
    }

    #[test]
    fn test_access_token_response_parsing() {
        let json = r#"{"access":"Atza|token","refresh":"Atzr|refresh"}"#;
        let response: AccessTokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.access, "Atza|token");
    }

    #[tokio::test]
    async fn test_access_token_requires_registration() {
        let auth = CompanionAuthenticator::new("https://companion.local:3000", "mirror", "0001");
        let err = auth.request_access_token().await.unwrap_err();
        assert!(matches!(err, AuthError::NoSession));
    }
}
