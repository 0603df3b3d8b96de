//! Player entitlement checks run before allocation

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::error::CoreError;

/// Errors talking to an entitlement service
#[derive(Debug, Error)]
pub enum EntitlementError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service rejected the request: {status}: {message}")]
    Api { status: u16, message: String },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Decides whether an identity may join
#[async_trait]
pub trait EntitlementCheck: Send + Sync {
    /// `Ok(true)` when the identity may join
    async fn is_allowed(&self, identity: &str) -> Result<bool, EntitlementError>;

    /// Short name for logs
    fn check_type(&self) -> &'static str;
}

/// Entitlement service settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitlementConfig {
    /// Check identities before allocating
    pub enabled: bool,
    /// PlayFab title id
    pub title_id: String,
    /// PlayFab developer secret key
    pub secret_key: String,
    /// Base URL override (defaults to the title's PlayFab endpoint)
    pub endpoint: Option<String>,
    /// Request timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Admit players when the service cannot be reached
    pub fail_open: bool,
}

/// Ban lookup against the PlayFab admin API
pub struct PlayFabBanCheck {
    client: reqwest::Client,
    endpoint: String,
    secret_key: String,
}

#[derive(Debug, Serialize)]
struct GetUserBansRequest<'a> {
    #[serde(rename = "PlayFabId")]
    playfab_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct GetUserBansResponse {
    data: Option<GetUserBansData>,
}

#[derive(Debug, Deserialize)]
struct GetUserBansData {
    #[serde(rename = "BanData", default)]
    ban_data: Vec<BanInfo>,
}

#[derive(Debug, Deserialize)]
struct BanInfo {
    #[serde(rename = "Active")]
    active: Option<bool>,
}

impl GetUserBansResponse {
    /// Bans still in force; entries without an `Active` flag count as active
    fn active_bans(&self) -> usize {
        self.data.as_ref().map_or(0, |data| {
            data.ban_data
                .iter()
                .filter(|ban| ban.active.unwrap_or(true))
                .count()
        })
    }
}

impl PlayFabBanCheck {
    /// Build a checker from settings
    ///
    /// # Errors
    ///
    /// Returns an error if the title id or secret key is missing, or the
    /// HTTP client cannot be built
    pub fn from_config(config: &EntitlementConfig) -> Result<Self, EntitlementError> {
        if config.secret_key.is_empty() {
            return Err(EntitlementError::Config("secret_key is required".to_string()));
        }
        let endpoint = match &config.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None if !config.title_id.is_empty() => {
                format!("https://{}.playfabapi.com", config.title_id)
            }
            None => {
                return Err(EntitlementError::Config(
                    "title_id or endpoint is required".to_string(),
                ));
            }
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.unwrap_or(5_000)))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            secret_key: config.secret_key.clone(),
        })
    }
}

#[async_trait]
impl EntitlementCheck for PlayFabBanCheck {
    #[instrument(skip(self))]
    async fn is_allowed(&self, identity: &str) -> Result<bool, EntitlementError> {
        let url = format!("{}/Admin/GetUserBans", self.endpoint);
        let response = self
            .client
            .post(url)
            .header("X-SecretKey", &self.secret_key)
            .json(&GetUserBansRequest {
                playfab_id: identity,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(EntitlementError::Api { status, message });
        }

        let body: GetUserBansResponse = response.json().await?;
        let bans = body.active_bans();
        debug!(bans, "ban lookup finished");
        Ok(bans == 0)
    }

    fn check_type(&self) -> &'static str {
        "playfab"
    }
}

/// Applies the entitlement policy to allocation requests
#[derive(Clone, Default)]
pub struct EntitlementGate {
    check: Option<Arc<dyn EntitlementCheck>>,
    fail_open: bool,
}

impl EntitlementGate {
    /// Gate that admits everyone
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Gate backed by `check`
    #[must_use]
    pub fn new(check: Arc<dyn EntitlementCheck>, fail_open: bool) -> Self {
        Self {
            check: Some(check),
            fail_open,
        }
    }

    /// Gate described by settings
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ConfigError` if checking is enabled but the
    /// service cannot be configured
    pub fn from_config(config: &EntitlementConfig) -> Result<Self, CoreError> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        let check = PlayFabBanCheck::from_config(config)
            .map_err(|e| CoreError::ConfigError(format!("entitlement: {e}")))?;
        Ok(Self::new(Arc::new(check), config.fail_open))
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.check.is_some()
    }

    /// Admit or refuse an identity
    ///
    /// # Errors
    ///
    /// Returns `IdentityRequired` when checking is enabled and no identity
    /// was given, `Denied` for refused identities, and `Entitlement` when
    /// the service failed and the gate fails closed
    pub async fn admit(&self, identity: Option<&str>) -> Result<(), CoreError> {
        let Some(check) = &self.check else {
            return Ok(());
        };
        let identity = identity
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(CoreError::IdentityRequired)?;

        match check.is_allowed(identity).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(CoreError::Denied(format!("{identity} is banned"))),
            Err(e) if self.fail_open => {
                warn!(
                    check = check.check_type(),
                    error = %e,
                    "entitlement service failed, admitting player"
                );
                Ok(())
            }
            Err(e) => {
                warn!(check = check.check_type(), error = %e, "entitlement service failed");
                Err(CoreError::Entitlement(e.to_string()))
            }
        }
    }
}
