//! One-shot device registration
//!
//! `begin` requests a registration code and shows it to the user; once the
//! user has paired the device, `register_device` exchanges the pending
//! registration for an access token and hands it to the assistant client and
//! the display. Failures are returned to the caller without retrying.
//!
//! The flow is shared between IPC clients; no lock is held while the
//! companion service is contacted, so status reads and triggers never wait
//! on a registration in progress.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::config::EndpointSettings;
use crate::events::NotificationSink;
use crate::session::{AssistantClient, SessionCoordinator};

/// Companion authentication service
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Start a registration and return the code the user must enter
    async fn request_registration_code(&self) -> Result<String, AuthError>;

    /// Exchange the pending registration for an access token
    async fn request_access_token(&self) -> Result<String, AuthError>;
}

/// Failures talking to the companion service
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("companion request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("companion service returned status {0}")]
    Status(u16),

    #[error("no pending registration, request a registration code first")]
    NoSession,
}

/// Errors surfaced by the registration flow
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("failed to obtain registration code")]
    RegistrationCode(#[source] AuthError),

    #[error("failed to obtain access token")]
    AccessToken(#[source] AuthError),
}

/// A registration code and the page where it is entered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationCode {
    pub code: String,
    pub url: String,
}

/// Registration state for one run of the flow
pub struct RegistrationFlow {
    authenticator: Arc<dyn Authenticator>,
    assistant: Arc<dyn AssistantClient>,
    sink: Arc<dyn NotificationSink>,
    code: RegistrationCode,
    registered: AtomicBool,
}

impl std::fmt::Debug for RegistrationFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationFlow")
            .field("code", &self.code)
            .field("registered", &self.is_registered())
            .finish()
    }
}

impl RegistrationFlow {
    /// Request a registration code and publish it
    pub async fn begin(
        authenticator: Arc<dyn Authenticator>,
        assistant: Arc<dyn AssistantClient>,
        sink: Arc<dyn NotificationSink>,
        service_url: &str,
    ) -> Result<Self, RegistrationError> {
        let code = authenticator
            .request_registration_code()
            .await
            .map_err(RegistrationError::RegistrationCode)?;

        let url = format!("{}/provision/{}", service_url.trim_end_matches('/'), code);
        info!(%url, "register this device by visiting the companion page");
        sink.registration_code(&code, &url);

        Ok(Self {
            authenticator,
            assistant,
            sink,
            code: RegistrationCode { code, url },
            registered: AtomicBool::new(false),
        })
    }

    /// Exchange the registration for an access token and distribute it
    pub async fn register_device(&self) -> Result<String, RegistrationError> {
        let token = match self.authenticator.request_access_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, code = %self.code.code, "access token request failed");
                return Err(RegistrationError::AccessToken(e));
            }
        };

        self.assistant.on_access_token(&token);
        self.sink.access_token(&token);
        self.registered.store(true, Ordering::Release);
        info!(code = %self.code.code, "device registered");

        Ok(token)
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub fn registration_code(&self) -> &RegistrationCode {
        &self.code
    }

    pub fn assistant(&self) -> Arc<dyn AssistantClient> {
        Arc::clone(&self.assistant)
    }

    /// Build the session coordinator around this flow's assistant client
    pub fn coordinator(&self, settings: EndpointSettings, runtime: Handle) -> SessionCoordinator {
        SessionCoordinator::new(self.assistant(), Arc::clone(&self.sink), settings, runtime)
    }
}
