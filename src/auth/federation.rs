// OIDC assertion sources
// Literal tokens and the GitHub Actions ID token endpoint

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::cancellable;
use super::identity::AssertionSource;
use super::types::{AssertionKind, GitHubOidcResponse};
use crate::env::{EnvSource, ACTIONS_ID_TOKEN_REQUEST_TOKEN, ACTIONS_ID_TOKEN_REQUEST_URL};
use crate::error::{AuthError, Result};

/// Audience Entra ID expects on federated credentials
pub const DEFAULT_GITHUB_AUDIENCE: &str = "api://AzureADTokenExchange";

/// Audience to request, falling back to the Entra ID default
pub fn github_audience(configured: Option<&str>) -> String {
    configured
        .filter(|a| !a.is_empty())
        .unwrap_or(DEFAULT_GITHUB_AUDIENCE)
        .to_string()
}

/// Request an OIDC token from the GitHub Actions ID token endpoint
pub async fn fetch_github_oidc_token(
    client: &Client,
    cancel: &CancellationToken,
    request_url: &str,
    request_token: &str,
    audience: &str,
) -> Result<String> {
    let mut url = Url::parse(request_url).map_err(|e| {
        AuthError::FederationFetch(format!("invalid {}: {}", ACTIONS_ID_TOKEN_REQUEST_URL, e))
    })?;
    url.query_pairs_mut().append_pair("audience", audience);

    tracing::debug!("Requesting GitHub Actions OIDC token, audience={}", audience);

    let response = cancellable(cancel, async {
        client
            .get(url)
            .bearer_auth(request_token)
            .send()
            .await
            .map_err(|e| {
                AuthError::FederationFetch(format!("GitHub Actions OIDC request failed: {}", e))
            })
    })
    .await?;

    let status = response.status();
    if status != StatusCode::OK {
        let error_text = cancellable(cancel, async {
            Ok::<_, AuthError>(response.text().await.unwrap_or_default())
        })
        .await?;
        tracing::warn!(
            "GitHub Actions OIDC endpoint returned status={}, body={}",
            status,
            error_text
        );
        return Err(AuthError::FederationFetch(format!(
            "GitHub Actions OIDC endpoint returned {} - {}",
            status, error_text
        )));
    }

    let data: GitHubOidcResponse = cancellable(cancel, async {
        response.json().await.map_err(|e| {
            AuthError::FederationFetch(format!("Failed to parse GitHub Actions OIDC response: {}", e))
        })
    })
    .await?;

    data.value.filter(|v| !v.is_empty()).ok_or_else(|| {
        AuthError::FederationFetch("GitHub Actions OIDC response does not contain value".to_string())
    })
}

/// Assertion known up front
pub struct StaticAssertion(String);

impl StaticAssertion {
    pub fn new(assertion: impl Into<String>) -> Self {
        Self(assertion.into())
    }
}

#[async_trait]
impl AssertionSource for StaticAssertion {
    async fn assertion(&self, cancel: &CancellationToken) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }
        Ok(self.0.clone())
    }
}

/// Assertion fetched from GitHub Actions each time it is requested
///
/// The request URL and token are read from the environment at call time.
pub struct GitHubActionsAssertion {
    client: Client,
    env: Arc<dyn EnvSource>,
    audience: String,
}

impl GitHubActionsAssertion {
    pub fn new(client: Client, env: Arc<dyn EnvSource>, audience: impl Into<String>) -> Self {
        Self {
            client,
            env,
            audience: audience.into(),
        }
    }
}

#[async_trait]
impl AssertionSource for GitHubActionsAssertion {
    async fn assertion(&self, cancel: &CancellationToken) -> Result<String> {
        let require = |key: &str| {
            self.env.var(key).ok_or_else(|| {
                AuthError::FederationFetch(format!(
                    "{} is not set; the workflow needs the id-token: write permission",
                    key
                ))
            })
        };
        let request_url = require(ACTIONS_ID_TOKEN_REQUEST_URL)?;
        let request_token = require(ACTIONS_ID_TOKEN_REQUEST_TOKEN)?;

        fetch_github_oidc_token(
            &self.client,
            cancel,
            &request_url,
            &request_token,
            &self.audience,
        )
        .await
    }
}

/// Build the assertion source for a selected assertion kind
pub fn assertion_source(
    kind: AssertionKind,
    client: &Client,
    env: &Arc<dyn EnvSource>,
) -> Arc<dyn AssertionSource> {
    match kind {
        AssertionKind::Static(token) => Arc::new(StaticAssertion::new(token)),
        AssertionKind::Workload { token, .. } => Arc::new(StaticAssertion::new(token)),
        AssertionKind::GitHubActions { audience } => Arc::new(GitHubActionsAssertion::new(
            client.clone(),
            env.clone(),
            audience,
        )),
    }
}
