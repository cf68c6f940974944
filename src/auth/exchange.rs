// Token exchange against the Entra ID v2.0 token endpoint

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::cancellable;
use super::certificate::{Certificate, PrivateKey};
use super::types::{AccessToken, EntraErrorResponse, EntraTokenResponse, TokenRequestOptions};
use crate::error::{AuthError, Result};

pub const JWT_BEARER_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Lifetime of certificate-signed client assertions
const ASSERTION_LIFETIME_SECS: i64 = 600;

/// Exchange a client secret for an access token
pub(crate) async fn request_with_secret(
    client: &Client,
    cancel: &CancellationToken,
    url: &str,
    client_id: &str,
    client_secret: &str,
    options: &TokenRequestOptions,
) -> Result<AccessToken> {
    let scope = options.scopes.join(" ");
    let form = [
        ("grant_type", "client_credentials"),
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("scope", scope.as_str()),
    ];
    request_token(client, cancel, url, client_id, &form).await
}

/// Exchange a signed client assertion for an access token
pub(crate) async fn request_with_assertion(
    client: &Client,
    cancel: &CancellationToken,
    url: &str,
    client_id: &str,
    assertion: &str,
    options: &TokenRequestOptions,
) -> Result<AccessToken> {
    let scope = options.scopes.join(" ");
    let form = [
        ("grant_type", "client_credentials"),
        ("client_id", client_id),
        ("client_assertion_type", JWT_BEARER_ASSERTION_TYPE),
        ("client_assertion", assertion),
        ("scope", scope.as_str()),
    ];
    request_token(client, cancel, url, client_id, &form).await
}

async fn request_token(
    client: &Client,
    cancel: &CancellationToken,
    url: &str,
    client_id: &str,
    form: &[(&str, &str)],
) -> Result<AccessToken> {
    tracing::debug!(
        "Entra ID token request: url={}, client_id={}...",
        url,
        client_id.chars().take(8).collect::<String>()
    );

    let response = cancellable(cancel, async {
        client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchange(format!("Failed to send token request: {}", e)))
    })
    .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = cancellable(cancel, async {
            Ok::<_, AuthError>(response.text().await.unwrap_or_default())
        })
        .await?;
        tracing::error!(
            "Entra ID token request failed: status={}, body={}",
            status,
            error_text
        );
        return Err(AuthError::TokenExchange(describe_failure(status, &error_text)));
    }

    let data: EntraTokenResponse = cancellable(cancel, async {
        response.json().await.map_err(|e| {
            AuthError::TokenExchange(format!("Failed to parse token response: {}", e))
        })
    })
    .await?;

    if data.access_token.is_empty() {
        return Err(AuthError::TokenExchange(
            "token response does not contain access_token".to_string(),
        ));
    }

    let expires_in = data.expires_in.unwrap_or(3600);
    let expires_on = expiry_after(expires_in).ok_or_else(|| {
        AuthError::TokenExchange(format!(
            "token response has out of range expires_in: {}",
            expires_in
        ))
    })?;

    tracing::info!(
        "Access token acquired ({}), expires: {}",
        data.token_type.as_deref().unwrap_or("Bearer"),
        expires_on.to_rfc3339()
    );

    Ok(AccessToken {
        token: data.access_token,
        expires_on,
    })
}

/// Instant `expires_in` seconds from now, if representable
fn expiry_after(expires_in: u64) -> Option<DateTime<Utc>> {
    let lifetime = i64::try_from(expires_in)
        .ok()
        .and_then(Duration::try_seconds)?;
    Utc::now().checked_add_signed(lifetime)
}

/// Render a failed response, preferring the identity provider's error fields
fn describe_failure(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(error) = serde_json::from_str::<EntraErrorResponse>(body) {
        match (error.error, error.error_description) {
            (Some(code), Some(description)) => {
                return format!("{} - {}: {}", status, code, description)
            }
            (Some(code), None) => return format!("{} - {}", status, code),
            _ => {}
        }
    }
    format!("{} - {}", status, body)
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    aud: &'a str,
    iss: &'a str,
    sub: &'a str,
    jti: String,
    iat: i64,
    nbf: i64,
    exp: i64,
}

/// Private key that signs client assertions on behalf of a certificate
pub(crate) struct SigningKey {
    key: EncodingKey,
    thumbprint: String,
}

impl SigningKey {
    pub(crate) fn new(key: &PrivateKey, leaf: &Certificate) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.to_pem().as_bytes()).map_err(|e| {
            AuthError::CredentialConstruction(format!("unsupported private key: {}", e))
        })?;

        let signing_key = Self {
            key: encoding_key,
            thumbprint: leaf.thumbprint_sha256(),
        };

        // Unusable keys fail at construction, not at token request time
        signing_key
            .sign("check", "check")
            .map_err(|e| AuthError::CredentialConstruction(format!("unusable private key: {}", e)))?;

        Ok(signing_key)
    }

    /// Build the JWT presented as `client_assertion`
    pub(crate) fn client_assertion(&self, audience: &str, client_id: &str) -> Result<String> {
        self.sign(audience, client_id)
            .map_err(|e| AuthError::TokenExchange(format!("Failed to sign client assertion: {}", e)))
    }

    fn sign(
        &self,
        audience: &str,
        client_id: &str,
    ) -> std::result::Result<String, jsonwebtoken::errors::Error> {
        let mut header = Header::new(Algorithm::RS256);
        header.x5t_s256 = Some(self.thumbprint.clone());

        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            aud: audience,
            iss: client_id,
            sub: client_id,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            nbf: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        jsonwebtoken::encode(&header, &claims, &self.key)
    }
}
