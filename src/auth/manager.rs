use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::federation::assertion_source;
use super::identity::{EntraIdentity, IdentityFactory, TokenGetter};
use super::selector::select_strategy;
use super::types::{AuthStrategy, TokenRequestOptions};
use crate::config::AuthConfig;
use crate::env::{EnvSource, ProcessEnv};
use crate::error::{AuthError, Result};

/// Timeout for identity provider and OIDC endpoint requests
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Authentication resolver
/// Turns a provider configuration into an Azure DevOps bearer token
///
/// Every call resolves from scratch; nothing is cached between calls.
#[derive(Clone)]
pub struct AuthResolver {
    /// Builds identity provider credentials
    identity: Arc<dyn IdentityFactory>,

    /// Call-time environment (CI OIDC variables, workload identity token)
    env: Arc<dyn EnvSource>,

    /// HTTP client for CI OIDC endpoint requests
    http: Client,
}

impl AuthResolver {
    /// Create a resolver against Microsoft Entra ID and the process environment
    pub fn new() -> Result<Self> {
        let http = default_http_client()?;
        Ok(Self::with_parts(
            Arc::new(EntraIdentity::new(http.clone())),
            Arc::new(ProcessEnv),
            http,
        ))
    }

    /// Create a resolver from explicit collaborators
    pub fn with_parts(
        identity: Arc<dyn IdentityFactory>,
        env: Arc<dyn EnvSource>,
        http: Client,
    ) -> Self {
        Self {
            identity,
            env,
            http,
        }
    }

    /// Resolve the configuration to an access token
    pub async fn get_auth_token(
        &self,
        cancel: &CancellationToken,
        config: &AuthConfig,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }

        let getter = match select_strategy(config, self.env.as_ref())? {
            AuthStrategy::PersonalAccessToken(token) => return Ok(token),
            AuthStrategy::ClientAssertion {
                principal,
                assertion,
            } => self.identity.new_client_assertion_credential(
                &principal.tenant_id,
                &principal.client_id,
                assertion_source(assertion, &self.http, &self.env),
            )?,
            AuthStrategy::ClientSecret { principal, secret } => self
                .identity
                .new_client_secret_credential(&principal.tenant_id, &principal.client_id, &secret)?,
            AuthStrategy::ClientCertificate { principal, bundle } => {
                self.identity.new_client_certificate_credential(
                    &principal.tenant_id,
                    &principal.client_id,
                    bundle.certificates,
                    bundle.key,
                )?
            }
        };

        request_token(getter.as_ref(), cancel).await
    }
}

/// Resolve a configuration to an access token with the given collaborators
///
/// CI OIDC requests use a fresh HTTP client with the default timeouts.
pub async fn get_auth_token(
    cancel: &CancellationToken,
    config: &AuthConfig,
    identity: Arc<dyn IdentityFactory>,
    env: Arc<dyn EnvSource>,
) -> Result<String> {
    AuthResolver::with_parts(identity, env, default_http_client()?)
        .get_auth_token(cancel, config)
        .await
}

async fn request_token(getter: &dyn TokenGetter, cancel: &CancellationToken) -> Result<String> {
    let token = getter
        .get_token(cancel, &TokenRequestOptions::azure_devops())
        .await?;
    tracing::debug!("Token expires: {}", token.expires_on.to_rfc3339());
    Ok(token.token)
}

fn default_http_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| AuthError::CredentialConstruction(format!("Failed to create HTTP client: {}", e)))
}
