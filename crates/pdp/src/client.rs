use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{debug, info};

use chainpolicy_core::config::PdpConfig;
use chainpolicy_core::domain::policy::{ExternalPolicyId, Policy, TimeWindows};
use chainpolicy_core::reconcile::{EnforcementClient, EnforcementError};

use crate::wire::{ErrorResponse, PolicyPayload, SavedPolicyResponse};

#[derive(Debug, Error)]
pub enum PdpClientError {
    #[error("failed to build pdp http client: {0}")]
    Build(#[from] reqwest::Error),
    #[error("invalid pdp base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// HTTP client for the policy decision point.
pub struct PdpClient {
    client: Client,
    base_url: Url,
    api_token: Option<SecretString>,
    windows: TimeWindows,
}

impl PdpClient {
    pub fn new(config: &PdpConfig, windows: TimeWindows) -> Result<Self, PdpClientError> {
        let invalid = |reason: String| PdpClientError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason,
        };
        let base_url = Url::parse(&config.base_url).map_err(|error| invalid(error.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid("url cannot carry a path".to_owned()));
        }

        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self {
            client,
            base_url,
            api_token: config.api_token.clone(),
            windows,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends path segments to the base url. Each segment is percent-encoded,
    /// so user names and ids can never alter the path or query.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, EnforcementError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                EnforcementError::Transport(format!("pdp base url {} has no path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, EnforcementError> {
        self.authorize(request).send().await.map_err(|error| {
            EnforcementError::Transport(format!("connection to pdp failed: {error}"))
        })
    }

    /// The PDP refuses bounded policies for users it has never seen.
    async fn ensure_user_known(&self, policy: &Policy) -> Result<(), EnforcementError> {
        if policy.is_default_policy() {
            return Ok(());
        }

        let url = self.endpoint(&["policies", policy.user.as_str()])?;
        let response = self.send(self.client.get(url)).await?;
        if response.status() != StatusCode::NOT_FOUND {
            return Ok(());
        }

        info!(
            event_name = "pdp.default_policy_bootstrapped",
            user = %policy.user,
            "creating default policy before the first bounded policy"
        );
        self.post_policy(&Policy::baseline_for(policy.user.clone()), "").await?;
        Ok(())
    }

    async fn post_policy(&self, policy: &Policy, external_id: &str) -> Result<String, EnforcementError> {
        let payload = PolicyPayload::from_policy(policy, external_id, &self.windows);
        let url = self.endpoint(&["api", "policies"])?;
        let response = self.send(self.client.post(url).json(&payload)).await?;

        if response.status() != StatusCode::CREATED {
            return Err(rejection(response).await);
        }

        let saved: SavedPolicyResponse = response
            .json()
            .await
            .map_err(|error| EnforcementError::Decode(error.to_string()))?;
        Ok(saved.policy.id)
    }

    async fn save(&self, policy: &Policy, external_id: &str) -> Result<String, EnforcementError> {
        self.ensure_user_known(policy).await?;
        let id = self.post_policy(policy, external_id).await?;
        debug!(event_name = "pdp.policy_saved", user = %policy.user, external_id = %id, "policy saved");
        Ok(id)
    }
}

async fn rejection(response: Response) -> EnforcementError {
    let status = response.status();
    let message = response
        .json::<ErrorResponse>()
        .await
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| format!("pdp returned {status}"));
    EnforcementError::Rejected(message)
}

#[async_trait]
impl EnforcementClient for PdpClient {
    async fn create(&self, policy: &Policy) -> Result<ExternalPolicyId, EnforcementError> {
        let id = self.save(policy, "").await?;
        if id.is_empty() {
            return Err(EnforcementError::Decode("pdp returned an empty policy id".to_owned()));
        }
        Ok(ExternalPolicyId(id))
    }

    async fn update(&self, id: &ExternalPolicyId, policy: &Policy) -> Result<(), EnforcementError> {
        self.save(policy, &id.0).await?;
        Ok(())
    }

    async fn delete(&self, id: &ExternalPolicyId) -> Result<(), EnforcementError> {
        let url = self.endpoint(&["api", "policy", id.0.as_str()])?;
        let response = self.send(self.client.delete(url)).await?;
        let status = response.status();

        if status.is_success() || status == StatusCode::NOT_FOUND {
            debug!(event_name = "pdp.policy_deleted", external_id = %id, status = %status, "policy deleted");
            return Ok(());
        }
        Err(rejection(response).await)
    }
}
