// Authentication types

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Azure DevOps resource scope requested from the identity provider
pub const AZURE_DEVOPS_SCOPE: &str = "499b84ac-1321-427f-aa17-267ca6975798/.default";

/// Access token issued by the identity provider
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"****")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Parameters of a token request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequestOptions {
    pub scopes: Vec<String>,
}

impl TokenRequestOptions {
    pub fn azure_devops() -> Self {
        Self {
            scopes: vec![AZURE_DEVOPS_SCOPE.to_string()],
        }
    }
}

/// HCP Terraform run phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Plan,
    Apply,
    Unspecified,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Plan => write!(f, "plan"),
            RunPhase::Apply => write!(f, "apply"),
            RunPhase::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Tenant and client ids of the identity being authenticated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePrincipal {
    pub tenant_id: String,
    pub client_id: String,
}

/// Where the OIDC assertion comes from
#[derive(Clone, PartialEq, Eq)]
pub enum AssertionKind {
    /// Literal token, inline or read from a file
    Static(String),
    /// Requested from the GitHub Actions OIDC endpoint
    GitHubActions { audience: String },
    /// HCP Terraform workload identity token
    Workload { token: String, phase: RunPhase },
}

impl std::fmt::Debug for AssertionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssertionKind::Static(_) => write!(f, "Static(****)"),
            AssertionKind::GitHubActions { audience } => f
                .debug_struct("GitHubActions")
                .field("audience", audience)
                .finish(),
            AssertionKind::Workload { phase, .. } => f
                .debug_struct("Workload")
                .field("token", &"****")
                .field("phase", phase)
                .finish(),
        }
    }
}

/// Authentication strategy chosen for a configuration
pub enum AuthStrategy {
    PersonalAccessToken(String),
    ClientAssertion {
        principal: ServicePrincipal,
        assertion: AssertionKind,
    },
    ClientSecret {
        principal: ServicePrincipal,
        secret: String,
    },
    ClientCertificate {
        principal: ServicePrincipal,
        bundle: super::certificate::CertificateBundle,
    },
}

impl AuthStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            AuthStrategy::PersonalAccessToken(_) => "personal access token",
            AuthStrategy::ClientAssertion { assertion, .. } => match assertion {
                AssertionKind::Static(_) => "OIDC token",
                AssertionKind::GitHubActions { .. } => "GitHub Actions OIDC",
                AssertionKind::Workload { .. } => "HCP Terraform workload identity",
            },
            AuthStrategy::ClientSecret { .. } => "client secret",
            AuthStrategy::ClientCertificate { .. } => "client certificate",
        }
    }

    /// Identity the strategy authenticates as, if any
    pub fn principal(&self) -> Option<&ServicePrincipal> {
        match self {
            AuthStrategy::PersonalAccessToken(_) => None,
            AuthStrategy::ClientAssertion { principal, .. }
            | AuthStrategy::ClientSecret { principal, .. }
            | AuthStrategy::ClientCertificate { principal, .. } => Some(principal),
        }
    }
}

impl std::fmt::Debug for AuthStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthStrategy::PersonalAccessToken(_) => write!(f, "PersonalAccessToken(****)"),
            AuthStrategy::ClientAssertion {
                principal,
                assertion,
            } => f
                .debug_struct("ClientAssertion")
                .field("principal", principal)
                .field("assertion", assertion)
                .finish(),
            AuthStrategy::ClientSecret { principal, .. } => f
                .debug_struct("ClientSecret")
                .field("principal", principal)
                .field("secret", &"****")
                .finish(),
            AuthStrategy::ClientCertificate { principal, bundle } => f
                .debug_struct("ClientCertificate")
                .field("principal", principal)
                .field("certificates", &bundle.certificates.len())
                .finish(),
        }
    }
}

/// Entra ID token endpoint response
#[derive(Deserialize)]
pub struct EntraTokenResponse {
    pub access_token: String,
    pub expires_in: Option<u64>,
    pub token_type: Option<String>,
}

/// Entra ID token endpoint error body
#[derive(Deserialize)]
pub struct EntraErrorResponse {
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// GitHub Actions OIDC token response
#[derive(Deserialize)]
pub struct GitHubOidcResponse {
    pub value: Option<String>,
}
