// Identity provider abstraction
// Credential constructors and the token getters they produce

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::certificate::{Certificate, PrivateKey};
use super::exchange::{self, SigningKey};
use super::types::{AccessToken, TokenRequestOptions};
use crate::error::{AuthError, Result};

/// Default Microsoft Entra ID authority
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Produces access tokens for a scope
#[async_trait]
pub trait TokenGetter: Send + Sync {
    async fn get_token(
        &self,
        cancel: &CancellationToken,
        options: &TokenRequestOptions,
    ) -> Result<AccessToken>;
}

/// Produces the OIDC assertion presented to the identity provider
///
/// Called at token request time and possibly more than once, so sources
/// that mint short-lived assertions are not consumed early.
#[async_trait]
pub trait AssertionSource: Send + Sync {
    async fn assertion(&self, cancel: &CancellationToken) -> Result<String>;
}

/// Builds credentials for each supported flow
pub trait IdentityFactory: Send + Sync {
    fn new_client_assertion_credential(
        &self,
        tenant_id: &str,
        client_id: &str,
        assertion: Arc<dyn AssertionSource>,
    ) -> Result<Box<dyn TokenGetter>>;

    fn new_client_secret_credential(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Box<dyn TokenGetter>>;

    fn new_client_certificate_credential(
        &self,
        tenant_id: &str,
        client_id: &str,
        certificates: Vec<Certificate>,
        key: PrivateKey,
    ) -> Result<Box<dyn TokenGetter>>;
}

/// Microsoft Entra ID credentials
#[derive(Clone)]
pub struct EntraIdentity {
    client: Client,
    authority_host: String,
}

impl EntraIdentity {
    pub fn new(client: Client) -> Self {
        Self::with_authority(client, DEFAULT_AUTHORITY_HOST)
    }

    /// Use a different authority, e.g. a sovereign cloud or a test server
    pub fn with_authority(client: Client, authority_host: impl Into<String>) -> Self {
        Self {
            client,
            authority_host: authority_host.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, tenant_id: &str, client_id: &str) -> Result<TokenEndpoint> {
        validate_tenant_id(tenant_id)?;
        if client_id.is_empty() {
            return Err(AuthError::CredentialConstruction(
                "client id must not be empty".to_string(),
            ));
        }

        Ok(TokenEndpoint {
            client: self.client.clone(),
            url: format!("{}/{}/oauth2/v2.0/token", self.authority_host, tenant_id),
            client_id: client_id.to_string(),
        })
    }
}

impl IdentityFactory for EntraIdentity {
    fn new_client_assertion_credential(
        &self,
        tenant_id: &str,
        client_id: &str,
        assertion: Arc<dyn AssertionSource>,
    ) -> Result<Box<dyn TokenGetter>> {
        Ok(Box::new(ClientAssertionCredential {
            endpoint: self.endpoint(tenant_id, client_id)?,
            assertion,
        }))
    }

    fn new_client_secret_credential(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Box<dyn TokenGetter>> {
        if client_secret.is_empty() {
            return Err(AuthError::CredentialConstruction(
                "client secret must not be empty".to_string(),
            ));
        }

        Ok(Box::new(ClientSecretCredential {
            endpoint: self.endpoint(tenant_id, client_id)?,
            secret: client_secret.to_string(),
        }))
    }

    fn new_client_certificate_credential(
        &self,
        tenant_id: &str,
        client_id: &str,
        certificates: Vec<Certificate>,
        key: PrivateKey,
    ) -> Result<Box<dyn TokenGetter>> {
        let endpoint = self.endpoint(tenant_id, client_id)?;
        let leaf = certificates.first().ok_or_else(|| {
            AuthError::CredentialConstruction("at least one certificate is required".to_string())
        })?;
        let signing_key = SigningKey::new(&key, leaf)?;

        Ok(Box::new(ClientCertificateCredential {
            endpoint,
            signing_key,
        }))
    }
}

/// Tenant ids are GUIDs or domain names
fn validate_tenant_id(tenant_id: &str) -> Result<()> {
    if tenant_id.is_empty() {
        return Err(AuthError::CredentialConstruction(
            "tenant id must not be empty".to_string(),
        ));
    }
    if !tenant_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(AuthError::CredentialConstruction(format!(
            "invalid tenant id {:?}: only alphanumerics, '-' and '.' are allowed",
            tenant_id
        )));
    }
    Ok(())
}

struct TokenEndpoint {
    client: Client,
    url: String,
    client_id: String,
}

struct ClientAssertionCredential {
    endpoint: TokenEndpoint,
    assertion: Arc<dyn AssertionSource>,
}

#[async_trait]
impl TokenGetter for ClientAssertionCredential {
    async fn get_token(
        &self,
        cancel: &CancellationToken,
        options: &TokenRequestOptions,
    ) -> Result<AccessToken> {
        let assertion = self.assertion.assertion(cancel).await?;
        exchange::request_with_assertion(
            &self.endpoint.client,
            cancel,
            &self.endpoint.url,
            &self.endpoint.client_id,
            &assertion,
            options,
        )
        .await
    }
}

struct ClientSecretCredential {
    endpoint: TokenEndpoint,
    secret: String,
}

#[async_trait]
impl TokenGetter for ClientSecretCredential {
    async fn get_token(
        &self,
        cancel: &CancellationToken,
        options: &TokenRequestOptions,
    ) -> Result<AccessToken> {
        exchange::request_with_secret(
            &self.endpoint.client,
            cancel,
            &self.endpoint.url,
            &self.endpoint.client_id,
            &self.secret,
            options,
        )
        .await
    }
}

struct ClientCertificateCredential {
    endpoint: TokenEndpoint,
    signing_key: SigningKey,
}

#[async_trait]
impl TokenGetter for ClientCertificateCredential {
    async fn get_token(
        &self,
        cancel: &CancellationToken,
        options: &TokenRequestOptions,
    ) -> Result<AccessToken> {
        // A fresh assertion per request; they expire after ten minutes
        let assertion = self
            .signing_key
            .client_assertion(&self.endpoint.url, &self.endpoint.client_id)?;
        exchange::request_with_assertion(
            &self.endpoint.client,
            cancel,
            &self.endpoint.url,
            &self.endpoint.client_id,
            &assertion,
            options,
        )
        .await
    }
}
